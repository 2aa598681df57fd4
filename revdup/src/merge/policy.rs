//! Merge policy: primary selection and legality gates

use once_cell::sync::Lazy;
use regex::Regex;
use revdup_common::{EntryType, Record, RecordStatus};
use serde::Serialize;
use std::fmt;

static PART_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bpart\s+([0-9ivx]+)\s*$").unwrap());

/// Title terms that mark a follow-up item rather than the work itself
const FOLLOW_UP_TERMS: &[&str] = &[
    "erratum",
    "correction",
    "corrigendum",
    "comment",
    "commentary",
    "response",
];

/// Why a merge was blocked
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    CrossLevel,
    SameSource { sources: Vec<String> },
    InvalidMerge { detail: String },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::CrossLevel => write!(f, "cross-level merge"),
            RejectReason::SameSource { sources } => {
                write!(f, "same-source merge ({})", sources.join(", "))
            }
            RejectReason::InvalidMerge { detail } => write!(f, "invalid merge: {}", detail),
        }
    }
}

fn suffix_class(id: &str) -> Option<char> {
    id.chars().last()
}

/// Pick the primary (surviving) record of a pair: returns `true` when `a` survives
pub fn a_is_primary(a: &Record, b: &Record) -> bool {
    if a.status() == b.status() {
        return match (suffix_class(a.id()), suffix_class(b.id())) {
            (Some(x), Some(y)) if x.is_ascii_digit() && !y.is_ascii_digit() => true,
            (Some(x), Some(y)) if !x.is_ascii_digit() && y.is_ascii_digit() => false,
            (Some(x), Some(y)) if !x.is_ascii_digit() && !y.is_ascii_digit() => x <= y,
            _ => true,
        };
    }
    if a.status() == RecordStatus::MdPrepared && b.status() > RecordStatus::MdPrepared {
        return false;
    }
    if b.status() == RecordStatus::MdPrepared && a.status() > RecordStatus::MdPrepared {
        return true;
    }
    if a.status() == RecordStatus::MdProcessed {
        return true;
    }
    if b.status() == RecordStatus::MdProcessed {
        return false;
    }
    // Curated masterdata wins; ties keep A
    !(b.masterdata_is_curated() && !a.masterdata_is_curated())
}

/// Ordered (primary, dupe) pair
pub fn select_primary<'r>(a: &'r Record, b: &'r Record) -> (&'r Record, &'r Record) {
    if a_is_primary(a, b) {
        (a, b)
    } else {
        (b, a)
    }
}

/// Merges across bibliographic levels (a volume and one of its parts)
///
/// Any pairing with a proceedings record counts as cross-level.
pub fn is_cross_level(a: EntryType, b: EntryType) -> bool {
    matches!(
        (a, b),
        (EntryType::Proceedings, _)
            | (_, EntryType::Proceedings)
            | (EntryType::Book, EntryType::Inbook)
            | (EntryType::Inbook, EntryType::Book)
    )
}

/// Outcome of the same-source check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SameSource {
    /// No shared source name
    Disjoint,
    /// Shared metadata sources with identical token sets
    MetadataOnly,
    /// Shared source names that make the merge suspicious
    Conflict(Vec<String>),
}

/// Check whether two records come from the same source
pub fn same_source(a: &Record, b: &Record) -> SameSource {
    let shared: Vec<String> = a
        .origin_sources()
        .intersection(&b.origin_sources())
        .cloned()
        .collect();
    if shared.is_empty() {
        return SameSource::Disjoint;
    }
    let metadata_only = shared
        .iter()
        .all(|s| s.starts_with("md_") && a.origin_tokens_for(s) == b.origin_tokens_for(s));
    if metadata_only {
        SameSource::MetadataOnly
    } else {
        SameSource::Conflict(shared)
    }
}

fn part_number(title: &str) -> Option<String> {
    PART_SUFFIX
        .captures(title.trim_end_matches(|c: char| c == '.' || c.is_whitespace()))
        .map(|caps| caps[1].to_lowercase())
}

fn has_follow_up_term(title: &str) -> bool {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| FOLLOW_UP_TERMS.contains(&word))
}

/// Reasons two records must stay apart even when they look alike
pub fn invalid_merge(a: &Record, b: &Record) -> Option<String> {
    let (title_a, title_b) = (a.get("title").unwrap_or(""), b.get("title").unwrap_or(""));

    if let (Some(x), Some(y)) = (part_number(title_a), part_number(title_b)) {
        if x != y {
            return Some(format!("different parts ({} vs {})", x, y));
        }
    }
    if has_follow_up_term(title_a) != has_follow_up_term(title_b) {
        return Some("only one title is an erratum, comment or response".to_string());
    }
    None
}
