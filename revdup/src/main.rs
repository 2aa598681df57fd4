//! revdup - record deduplication for literature reviews
//!
//! Subcommands:
//! - `init`: create the project root with a default `revdup.toml`
//! - `run`: deduplicate `md_prepared` records and promote them
//! - `train`: label candidate pairs and train the classifier
//! - `merge` / `unmerge`: manual merges and their reversal
//! - `info`: store overview, including same-source merges already present
//! - `validate`: applied merges, least certain first

mod console;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use revdup::error::exit_code;
use revdup::learning::{ArtifactPaths, Labeler};
use revdup::merge::{read_merge_log, validation_export};
use revdup::orchestrator::failure_line;
use revdup::report::info_report;
use revdup::store::SqliteRecordStore;
use revdup::{store_path, DedupeConfig, DedupeError, DedupeMode, DedupePipeline, RecordStore};
use revdup_common::config::{init_project_settings, load_project_settings, resolve_root_folder, ROOT_ENV_VAR, SETTINGS_FILE};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Command-line arguments for revdup
#[derive(Parser, Debug)]
#[command(name = "revdup")]
#[command(about = "Record deduplication for literature reviews")]
#[command(version)]
struct Args {
    /// Project root (falls back to REVDUP_ROOT, then the user config file)
    #[arg(short, long, global = true)]
    root: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Auto,
    Simple,
    Trained,
}

impl From<ModeArg> for DedupeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => DedupeMode::Auto,
            ModeArg::Simple => DedupeMode::Simple,
            ModeArg::Trained => DedupeMode::Trained,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the project root with a default revdup.toml
    Init,
    /// Deduplicate md_prepared records
    Run {
        #[arg(long, value_enum, default_value = "auto")]
        mode: ModeArg,

        /// Allow the simple mode beyond its record ceiling
        #[arg(long)]
        force: bool,

        /// Block through an on-disk database regardless of available memory
        #[arg(long)]
        out_of_core: bool,

        /// Ask about potential duplicates instead of leaving them unresolved
        #[arg(long)]
        interactive: bool,
    },
    /// Label candidate pairs and train the classifier
    Train {
        /// Apply the trained classifier right after training
        #[arg(long)]
        apply: bool,
    },
    /// Merge records by id
    Merge {
        /// Pairs as `ID1,ID2`
        #[arg(required = true, value_parser = parse_pair)]
        pairs: Vec<(String, String)>,
    },
    /// Split merged records back apart
    Unmerge {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Show store statistics and same-source merges
    Info,
    /// List applied merges, least certain first
    Validate {
        /// Only show merges scored below this value
        #[arg(long)]
        below: Option<f64>,
    },
}

fn parse_pair(value: &str) -> std::result::Result<(String, String), String> {
    match value.split_once(',') {
        Some((a, b)) if !a.trim().is_empty() && !b.trim().is_empty() => {
            Ok((a.trim().to_string(), b.trim().to_string()))
        }
        _ => Err(format!("expected ID1,ID2, got {}", value)),
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let code = match run(args).await {
        Ok(()) => exit_code::SUCCESS,
        Err(e) => match e.downcast_ref::<DedupeError>() {
            Some(err) => {
                eprintln!("{}", failure_line(err));
                err.exit_code()
            }
            None => {
                eprintln!("Error: {:#}", e);
                exit_code::INCONSISTENT_STORE
            }
        },
    };
    std::process::exit(code);
}

async fn run(args: Args) -> Result<()> {
    let root: PathBuf = resolve_root_folder(args.root.as_deref(), ROOT_ENV_VAR);
    info!("Project root: {}", root.display());

    if let Command::Init = args.command {
        if init_project_settings(&root).context("Failed to initialise project")? {
            println!("Wrote default settings to {}", root.join(SETTINGS_FILE).display());
        } else {
            println!("{} already exists", root.join(SETTINGS_FILE).display());
        }
        return Ok(());
    }

    let project = load_project_settings(&root).context("Failed to load project settings")?;
    let artifacts = ArtifactPaths::in_root(&root);

    if let Command::Validate { below } = &args.command {
        let entries = read_merge_log(&artifacts.merge_log())?;
        for entry in validation_export(&entries)
            .into_iter()
            .filter(|e| below.map(|b| e.score < b).unwrap_or(true))
        {
            println!(
                "{:.4}  {} <- {}{}",
                entry.score,
                entry.primary_id,
                entry.merged_ids.join(", "),
                if entry.same_source { "  [same source]" } else { "" }
            );
        }
        return Ok(());
    }

    let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::open(&store_path(&root)).await?);
    let mut config = DedupeConfig::new(project.dedupe, artifacts);

    match args.command {
        Command::Run {
            mode,
            force,
            out_of_core,
            interactive,
        } => {
            config.mode = mode.into();
            config.force = force;
            if out_of_core {
                config.out_of_core = Some(true);
            }
            let pipeline = DedupePipeline::new(config, store);
            cancel_on_ctrl_c(&pipeline);
            let summary = if interactive {
                let mut console = console::ConsoleLabeler::new();
                let labeler: &mut dyn Labeler = &mut console;
                pipeline.run(Some(labeler)).await?
            } else {
                pipeline.run(None).await?
            };
            println!("{}", summary.display_string());
        }
        Command::Train { apply } => {
            let pipeline = DedupePipeline::new(config.clone(), store.clone());
            cancel_on_ctrl_c(&pipeline);
            let mut labeler = console::ConsoleLabeler::new();
            let outcome = pipeline.train(&mut labeler, None).await?;
            println!("Training finished: {:?}", outcome);
            if apply {
                config.mode = DedupeMode::Trained;
                let summary = DedupePipeline::new(config, store).run(None).await?;
                println!("{}", summary.display_string());
            }
        }
        Command::Merge { pairs } => {
            let summary = DedupePipeline::new(config, store).merge_pairs(&pairs).await?;
            println!("{}", summary.display_string());
        }
        Command::Unmerge { ids } => {
            let report = DedupePipeline::new(config, store).unmerge(&ids).await?;
            for (survivor, restored) in &report.restored {
                println!("{}: restored {}", survivor, restored.join(", "));
            }
            for id in &report.unchanged {
                println!("{}: nothing to unmerge", id);
            }
            for diagnostic in &report.diagnostics {
                println!("{}", diagnostic);
            }
        }
        Command::Info => {
            let loaded = store.load_all().await?;
            for line in info_report(&loaded.state).display_lines() {
                println!("{}", line);
            }
        }
        Command::Init | Command::Validate { .. } => {}
    }
    Ok(())
}

/// Cancel the run on Ctrl+C; buffered labels are saved and no merge is applied
fn cancel_on_ctrl_c(pipeline: &DedupePipeline) {
    let token = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            token.cancel();
        }
    });
}
