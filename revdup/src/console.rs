//! Terminal labeler for `revdup train` and simple-mode review

use async_trait::async_trait;
use revdup::learning::{LabelResponse, LabelStats, Labeler};
use revdup::similarity::ComparisonRecord;
use tokio::io::{stdin, AsyncBufReadExt, BufReader, Lines, Stdin};

pub struct ConsoleLabeler {
    lines: Lines<BufReader<Stdin>>,
}

impl ConsoleLabeler {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(stdin()).lines(),
        }
    }

    async fn read_answer(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(Some(line)) => Some(line.trim().to_lowercase()),
            _ => None,
        }
    }

    async fn confirm(&mut self, question: &str) -> bool {
        println!("{} [y/n]", question);
        matches!(self.read_answer().await.as_deref(), Some("y") | Some("yes"))
    }
}

fn show(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

fn print_pair(a: &ComparisonRecord, b: &ComparisonRecord) {
    let rows: [(&str, &Option<String>, &Option<String>); 9] = [
        ("author", &a.author, &b.author),
        ("title", &a.title, &b.title),
        ("year", &a.year, &b.year),
        ("container", &a.container_title, &b.container_title),
        ("volume", &a.volume, &b.volume),
        ("number", &a.number, &b.number),
        ("pages", &a.pages, &b.pages),
        ("doi", &a.doi, &b.doi),
        ("isbn", &a.isbn, &b.isbn),
    ];
    println!("{:<10} {}", "id", a.id);
    println!("{:<10} {}", "", b.id);
    for (name, x, y) in rows {
        if x.is_none() && y.is_none() {
            continue;
        }
        let marker = if x == y { " " } else { "*" };
        println!("{}{:<9} {}", marker, name, show(x));
        println!("{:<10} {}", "", show(y));
    }
}

#[async_trait]
impl Labeler for ConsoleLabeler {
    async fn present(&mut self, pair: (&ComparisonRecord, &ComparisonRecord), stats: &LabelStats) -> LabelResponse {
        println!();
        println!(
            "{} match / {} distinct labeled, {} pair(s) left",
            stats.matches, stats.distincts, stats.remaining
        );
        print_pair(pair.0, pair.1);
        loop {
            println!("Duplicate? (y)es / (n)o / (u)nsure / (f)inished / (p)revious / (c)ancel");
            let response = match self.read_answer().await.as_deref() {
                Some("y") => LabelResponse::Match,
                Some("n") => LabelResponse::Distinct,
                Some("u") => LabelResponse::Uncertain,
                Some("f") => LabelResponse::Finished,
                Some("p") => LabelResponse::Previous,
                Some("c") | None => LabelResponse::Cancel,
                Some(_) => continue,
            };
            return response;
        }
    }

    async fn confirm_finish(&mut self, stats: &LabelStats) -> bool {
        self.confirm(&format!(
            "Only {} match / {} distinct label(s) so far. Finish anyway?",
            stats.matches, stats.distincts
        ))
        .await
    }

    async fn confirm_mark_remaining(&mut self, stats: &LabelStats) -> bool {
        self.confirm(&format!(
            "{} distinct label(s) and no match. Mark the remaining {} pair(s) as distinct?",
            stats.distincts, stats.remaining
        ))
        .await
    }
}
