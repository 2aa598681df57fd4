//! Field keys, entrytypes and per-entrytype field requirements

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel value for masterdata fields known to be missing upstream
pub const UNKNOWN: &str = "UNKNOWN";

/// Fields whose values establish record identity (tracked in `md_prov`)
pub const IDENTIFYING_FIELDS: &[&str] = &[
    "author",
    "title",
    "year",
    "journal",
    "booktitle",
    "volume",
    "number",
    "pages",
    "chapter",
    "series",
    "publisher",
    "school",
    "institution",
    "editor",
];

pub fn is_identifying(key: &str) -> bool {
    IDENTIFYING_FIELDS.contains(&key)
}

/// Bibliographic entrytype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Article,
    Inproceedings,
    Incollection,
    Inbook,
    Book,
    Phdthesis,
    Mastersthesis,
    Techreport,
    Unpublished,
    Misc,
    Software,
    Online,
    Proceedings,
    Conference,
}

impl EntryType {
    pub const ALL: [EntryType; 14] = [
        EntryType::Article,
        EntryType::Inproceedings,
        EntryType::Incollection,
        EntryType::Inbook,
        EntryType::Book,
        EntryType::Phdthesis,
        EntryType::Mastersthesis,
        EntryType::Techreport,
        EntryType::Unpublished,
        EntryType::Misc,
        EntryType::Software,
        EntryType::Online,
        EntryType::Proceedings,
        EntryType::Conference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Article => "article",
            EntryType::Inproceedings => "inproceedings",
            EntryType::Incollection => "incollection",
            EntryType::Inbook => "inbook",
            EntryType::Book => "book",
            EntryType::Phdthesis => "phdthesis",
            EntryType::Mastersthesis => "mastersthesis",
            EntryType::Techreport => "techreport",
            EntryType::Unpublished => "unpublished",
            EntryType::Misc => "misc",
            EntryType::Software => "software",
            EntryType::Online => "online",
            EntryType::Proceedings => "proceedings",
            EntryType::Conference => "conference",
        }
    }

    pub fn is_thesis(&self) -> bool {
        matches!(self, EntryType::Phdthesis | EntryType::Mastersthesis)
    }

    /// Identifying fields that must be present for the entrytype
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            EntryType::Article => &["author", "title", "journal", "year", "volume", "number"],
            EntryType::Inproceedings | EntryType::Conference => {
                &["author", "title", "booktitle", "year"]
            }
            EntryType::Incollection => &["author", "title", "booktitle", "publisher", "year"],
            EntryType::Inbook => &["author", "title", "chapter", "publisher", "year"],
            EntryType::Proceedings => &["booktitle", "editor", "year"],
            EntryType::Book => &["author", "title", "publisher", "year"],
            EntryType::Phdthesis | EntryType::Mastersthesis => {
                &["author", "title", "school", "year"]
            }
            EntryType::Techreport => &["author", "title", "institution", "year"],
            EntryType::Unpublished => &["title", "author", "year"],
            EntryType::Misc => &["author", "title", "year"],
            EntryType::Software | EntryType::Online => &["author", "title", "url"],
        }
    }

    /// Fields that must not appear for the entrytype
    pub fn inconsistent_fields(&self) -> &'static [&'static str] {
        match self {
            EntryType::Article => &["booktitle"],
            EntryType::Inproceedings | EntryType::Conference => &["issue", "number", "journal"],
            EntryType::Incollection => &["journal"],
            EntryType::Book => &["volume", "issue", "number", "journal"],
            EntryType::Phdthesis | EntryType::Mastersthesis => {
                &["volume", "issue", "number", "journal", "booktitle"]
            }
            EntryType::Techreport => &["journal", "booktitle"],
            _ => &[],
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        EntryType::ALL
            .iter()
            .find(|t| t.as_str() == lower)
            .copied()
            .ok_or_else(|| Error::UnknownEntryType(s.to_string()))
    }
}
