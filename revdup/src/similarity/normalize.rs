//! Comparison projection of records
//!
//! Every record is reduced to the normalized fields the similarity function
//! and the classifier look at. The same projection is what the training file
//! stores for labeled pairs.

use once_cell::sync::Lazy;
use regex::Regex;
use revdup_common::record::UNKNOWN;
use revdup_common::text::{alphanumeric_words, collapse_whitespace, remove_accents};
use revdup_common::{EntryType, Record};
use serde::{Deserialize, Serialize};

/// Values the ingestion sources use for "absent"
const MISSING_MARKERS: &[&str] = &["no issue", "no volume", "no pages", "no author", "nan"];

const AUTHOR_TRUNCATION: usize = 60;

static PAGE_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([0-9a-z]+)\s*[-\u{2013}\u{2014}]+\s*([0-9a-z]+)\s*$").unwrap());
static DOI_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(https?://(dx\.)?doi\.org/|doi:\s*)").unwrap());

/// Normalized comparison fields of one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub id: String,
    pub author: Option<String>,
    pub author_60: Option<String>,
    pub title: Option<String>,
    pub year: Option<String>,
    pub journal: Option<String>,
    pub container_title: Option<String>,
    pub volume: Option<String>,
    pub number: Option<String>,
    pub pages: Option<String>,
    pub doi: Option<String>,
    pub isbn: Option<String>,
    pub colrev_id: Option<String>,
    pub origin: Vec<String>,
}

impl ComparisonRecord {
    /// Project a record onto its comparison fields
    pub fn from_record(record: &Record) -> Self {
        let author = raw(record, "author").map(|a| normalize_authors(&a)).filter(|a| !a.is_empty());
        let author_60 = author
            .as_ref()
            .map(|a| a.chars().take(AUTHOR_TRUNCATION).collect::<String>());

        let (title, inbook_container) = if record.entrytype() == EntryType::Inbook {
            let chapter = raw(record, "chapter").map(|c| text_field(&c));
            let title = raw(record, "title").map(|t| text_field(&t));
            match chapter {
                Some(chapter) => (Some(chapter), title),
                None => (title, None),
            }
        } else {
            (raw(record, "title").map(|t| text_field(&t)), None)
        };

        let journal = raw(record, "journal").map(|j| text_field(&j));
        let booktitle = raw(record, "booktitle").map(|b| text_field(&b));
        let series = raw(record, "series").map(|s| text_field(&s));
        let container_parts: Vec<String> = [inbook_container, journal.clone(), booktitle, series]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect();
        let container_title = if container_parts.is_empty() {
            None
        } else {
            Some(container_parts.join(" "))
        };

        Self {
            id: record.id().to_string(),
            author,
            author_60,
            title: title.filter(|t| !t.is_empty()),
            year: raw(record, "year").map(|y| y.chars().filter(char::is_ascii_digit).collect::<String>()).filter(|y| !y.is_empty()),
            journal: journal.filter(|j| !j.is_empty()),
            container_title,
            volume: raw(record, "volume"),
            number: raw(record, "number"),
            pages: raw(record, "pages").map(|p| normalize_pages(&p)),
            doi: raw(record, "doi").map(|d| DOI_PREFIX.replace(&d, "").trim().to_string()),
            isbn: raw(record, "isbn")
                .map(|i| i.chars().filter(|c| c.is_ascii_digit() || *c == 'x').collect::<String>())
                .filter(|i| !i.is_empty()),
            colrev_id: record.colrev_id().map(str::to_string),
            origin: record.origin().to_vec(),
        }
    }

    /// Last name of the first author
    pub fn first_author_last_name(&self) -> Option<&str> {
        let author = self.author.as_deref()?;
        let first = author.split(" and ").next()?;
        let last = first.split(',').next()?.trim();
        if last.is_empty() {
            None
        } else {
            Some(last)
        }
    }

    /// Whether every compared field is missing
    pub fn is_blank(&self) -> bool {
        self.author_60.is_none()
            && self.title.is_none()
            && self.year.is_none()
            && self.container_title.is_none()
            && self.volume.is_none()
            && self.number.is_none()
            && self.pages.is_none()
    }
}

/// Lowercased, accent-free, trimmed value; `None` for absent markers
fn raw(record: &Record, key: &str) -> Option<String> {
    let value = record.get(key)?;
    if value == UNKNOWN {
        return None;
    }
    let value = collapse_whitespace(&remove_accents(value));
    let value = value.trim_matches(|c| c == '"' || c == '\'').trim().to_lowercase();
    if value.is_empty() || MISSING_MARKERS.contains(&value.as_str()) {
        None
    } else {
        Some(value)
    }
}

fn text_field(value: &str) -> String {
    alphanumeric_words(value)
}

/// `bansal, gaurav and zahedi, f. mariam` → `bansal, g. and zahedi, f. m.`
pub fn normalize_authors(authors: &str) -> String {
    authors
        .replace("; ", " and ")
        .split(" and ")
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(normalize_name)
        .collect::<Vec<_>>()
        .join(" and ")
}

fn normalize_name(name: &str) -> String {
    let (last, given) = match name.split_once(',') {
        Some((last, given)) => (last.trim().to_string(), given.trim().to_string()),
        None => {
            let mut tokens: Vec<&str> = name.split_whitespace().collect();
            match tokens.pop() {
                Some(last) => (last.to_string(), tokens.join(" ")),
                None => return String::new(),
            }
        }
    };
    let initials: Vec<String> = given
        .split(|c: char| c.is_whitespace() || c == '.' || c == '-')
        .filter_map(|part| part.chars().find(|c| c.is_alphabetic()))
        .map(|c| format!("{}.", c))
        .collect();
    if initials.is_empty() {
        last
    } else {
        format!("{}, {}", last, initials.join(" "))
    }
}

/// `42 - 50`, `42–50` → `42--50`
pub fn normalize_pages(pages: &str) -> String {
    match PAGE_RANGE.captures(pages) {
        Some(caps) => format!("{}--{}", &caps[1], &caps[2]),
        None => pages.trim().to_string(),
    }
}
