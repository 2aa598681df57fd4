//! Test Helper Utilities
//!
//! Record builders, scripted labelers and a project fixture shared by the
//! revdup integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use revdup::learning::{ArtifactPaths, LabelResponse, LabelStats, Labeler};
use revdup::similarity::ComparisonRecord;
use revdup::store::MemoryStore;
use revdup::{DedupeConfig, DedupePipeline, DedupeEvent, StoreState};
use revdup_common::config::DedupeSettings;
use revdup_common::{EntryType, Record, RecordStatus};
use std::collections::VecDeque;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

const LAST_NAMES: &[&str] = &[
    "Anderson", "Becker", "Castillo", "Dubois", "Eriksen", "Fujimoto", "Gallagher", "Haddad",
    "Ivanova", "Jaramillo", "Kowalski", "Lindqvist", "Moreau", "Nakamura", "Okafor", "Petrov",
    "Quintero", "Rasmussen", "Schreiber", "Takahashi", "Uchenna", "Valentini", "Wojcik",
    "Xavier", "Yilmaz", "Zimmermann",
];

const TITLE_WORDS: &[&str] = &[
    "Governance", "Blockchain", "Telemedicine", "Crowdsourcing", "Privacy", "Outsourcing",
    "Gamification", "Sustainability", "Platforms", "Analytics", "Wearables", "Cybersecurity",
    "Microfinance", "Onboarding", "Ecosystems", "Automation", "Misinformation", "Procurement",
    "Fintech", "Agility", "Volunteering", "Recommenders", "Telework", "Interoperability",
    "Ridesharing", "Whistleblowing",
];

const TITLE_TAILS: &[&str] = &[
    "in rural hospitals",
    "among small retailers",
    "for public agencies",
    "across supply chains",
    "during crisis response",
    "in higher education",
    "for family firms",
];

/// Complete journal article at `md_prepared` that passes every quality check
pub fn article(id: &str, origin: &str, overrides: &[(&str, &str)]) -> Record {
    let mut fields: Vec<(String, String)> = [
        ("author", "Smith, John and Doe, Jane"),
        ("title", "Trust violation and repair in online platforms"),
        ("journal", "MIS Quarterly"),
        ("year", "2020"),
        ("volume", "44"),
        ("number", "2"),
        ("pages", "1--20"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (key, value) in overrides {
        match fields.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => fields.push((key.to_string(), value.to_string())),
        }
    }
    Record::from_fields(
        id,
        EntryType::Article,
        RecordStatus::MdPrepared,
        vec![origin.to_string()],
        fields,
        origin.split('/').next().unwrap_or("test"),
    )
    .unwrap()
}

/// Same as `article` with another entry type and status
pub fn record_with(
    id: &str,
    entrytype: EntryType,
    status: RecordStatus,
    origin: &str,
    fields: &[(&str, &str)],
) -> Record {
    Record::from_fields(
        id,
        entrytype,
        status,
        vec![origin.to_string()],
        fields.iter().copied(),
        origin.split('/').next().unwrap_or("test"),
    )
    .unwrap()
}

/// Field overrides that make record `index` clearly different from its neighbours
pub fn distinct_fields(index: usize) -> Vec<(String, String)> {
    let last = LAST_NAMES[index % LAST_NAMES.len()];
    let co = LAST_NAMES[(index * 7 + 3) % LAST_NAMES.len()];
    let word = TITLE_WORDS[index % TITLE_WORDS.len()];
    let tail = TITLE_TAILS[(index / TITLE_WORDS.len() + index) % TITLE_TAILS.len()];
    vec![
        ("author".to_string(), format!("{}, Maria and {}, Peter", last, co)),
        ("title".to_string(), format!("{} {} {}", word, tail, index)),
        ("pages".to_string(), format!("{}--{}", 100 + index * 20, 115 + index * 20)),
    ]
}

/// Article `index` of a family of clearly unrelated articles
pub fn distinct_article(index: usize, id: &str, origin: &str) -> Record {
    let overrides = distinct_fields(index);
    let refs: Vec<(&str, &str)> = overrides.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    article(id, origin, &refs)
}

/// `count` unrelated articles `r000`, `r001`, ... from source `src`
pub fn distinct_articles(count: usize, src: &str) -> Vec<Record> {
    (0..count)
        .map(|i| distinct_article(i, &format!("r{:03}", i), &format!("{}/{:04}", src, i)))
        .collect()
}

/// Temporary project: artifact directory plus an in-memory store
pub struct Project {
    pub dir: TempDir,
    pub store: Arc<MemoryStore>,
}

impl Project {
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            store: Arc::new(MemoryStore::new(StoreState::new(records))),
        }
    }

    pub fn artifacts(&self) -> ArtifactPaths {
        ArtifactPaths::in_root(self.dir.path())
    }

    pub fn config(&self, settings: DedupeSettings) -> DedupeConfig {
        let mut config = DedupeConfig::new(settings, self.artifacts());
        config.out_of_core = Some(false);
        config
    }

    pub fn pipeline(&self) -> DedupePipeline {
        DedupePipeline::new(self.config(DedupeSettings::default()), self.store.clone())
    }

    pub fn pipeline_with(&self, settings: DedupeSettings) -> DedupePipeline {
        DedupePipeline::new(self.config(settings), self.store.clone())
    }

    pub fn pipeline_with_events(&self) -> (DedupePipeline, mpsc::Receiver<DedupeEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let pipeline =
            DedupePipeline::with_events(self.config(DedupeSettings::default()), self.store.clone(), tx);
        (pipeline, rx)
    }

    pub fn state(&self) -> StoreState {
        self.store.state()
    }

    pub fn record(&self, id: &str) -> Record {
        self.state().records[id].clone()
    }
}

/// Drain every event currently buffered in the channel
pub fn drain_events(rx: &mut mpsc::Receiver<DedupeEvent>) -> Vec<DedupeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Labeler replaying a fixed list of answers, then `fallback`
pub struct ScriptedLabeler {
    responses: VecDeque<LabelResponse>,
    fallback: LabelResponse,
    pub presented: Vec<(String, String)>,
    pub accept_finish: bool,
    pub accept_mark_remaining: bool,
}

impl ScriptedLabeler {
    pub fn new(responses: impl IntoIterator<Item = LabelResponse>, fallback: LabelResponse) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            fallback,
            presented: Vec::new(),
            accept_finish: true,
            accept_mark_remaining: false,
        }
    }
}

#[async_trait]
impl Labeler for ScriptedLabeler {
    async fn present(&mut self, pair: (&ComparisonRecord, &ComparisonRecord), _stats: &LabelStats) -> LabelResponse {
        self.presented.push((pair.0.id.clone(), pair.1.id.clone()));
        self.responses.pop_front().unwrap_or(self.fallback)
    }

    async fn confirm_finish(&mut self, _stats: &LabelStats) -> bool {
        self.accept_finish
    }

    async fn confirm_mark_remaining(&mut self, _stats: &LabelStats) -> bool {
        self.accept_mark_remaining
    }
}

/// Labeler that answers like a careful reviewer: same title means duplicate
#[derive(Default)]
pub struct TitleOracle {
    pub presented: usize,
}

#[async_trait]
impl Labeler for TitleOracle {
    async fn present(&mut self, pair: (&ComparisonRecord, &ComparisonRecord), _stats: &LabelStats) -> LabelResponse {
        self.presented += 1;
        if pair.0.title == pair.1.title {
            LabelResponse::Match
        } else {
            LabelResponse::Distinct
        }
    }

    async fn confirm_finish(&mut self, _stats: &LabelStats) -> bool {
        true
    }

    async fn confirm_mark_remaining(&mut self, _stats: &LabelStats) -> bool {
        false
    }
}
