//! Pairwise record similarity
//!
//! Similarity is a pure function of two comparison records. Field
//! similarities are combined with one of three weight sets depending on
//! whether both records are journal articles and whether the title is one of
//! the non-distinctive editorial titles.

pub mod normalize;

pub use normalize::ComparisonRecord;

use revdup_common::config::DedupeSettings;
use serde::{Deserialize, Serialize};

/// Compared fields, in feature order
pub const FIELDS: [&str; 7] = ["author", "title", "year", "container_title", "volume", "number", "pages"];

const JOURNAL_WEIGHTS: [f64; 7] = [0.25, 0.3, 0.13, 0.2, 0.05, 0.05, 0.02];
const NON_DISTINCTIVE_WEIGHTS: [f64; 7] = [0.175, 0.0, 0.175, 0.175, 0.175, 0.175, 0.125];
const NON_JOURNAL_WEIGHTS: [f64; 7] = [0.15, 0.75, 0.05, 0.05, 0.0, 0.0, 0.0];

/// Titles that carry no identity on their own
const NON_DISTINCTIVE_TITLES: &[&str] = &[
    "editorial",
    "editorial introduction",
    "editorial notes",
    "editor s comments",
    "editor's comments",
    "book reviews",
    "editorial note",
    "reviewer acknowledgment",
];

/// Per-field similarities plus "missing on either side" flags
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSimilarities {
    pub values: [f64; 7],
    pub missing: [bool; 7],
}

impl FieldSimilarities {
    /// Feature vector: seven similarities followed by seven missing indicators
    pub fn features(&self) -> [f64; 14] {
        let mut features = [0.0; 14];
        for i in 0..7 {
            features[i] = self.values[i];
            features[7 + i] = if self.missing[i] { 1.0 } else { 0.0 };
        }
        features
    }
}

/// Decision for a scored pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Duplicate,
    PotentialDuplicate,
    NoDuplicate,
}

/// A scored candidate pair (`id_a < id_b`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPair {
    pub id_a: String,
    pub id_b: String,
    pub score: f64,
    pub decision: Decision,
}

impl ScoredPair {
    pub fn new(id_a: &str, id_b: &str, score: f64, decision: Decision) -> Self {
        let (id_a, id_b) = if id_a <= id_b { (id_a, id_b) } else { (id_b, id_a) };
        Self {
            id_a: id_a.to_string(),
            id_b: id_b.to_string(),
            score,
            decision,
        }
    }
}

/// Classify a similarity score against the dedupe thresholds
pub fn classify(score: f64, settings: &DedupeSettings) -> Decision {
    if score <= settings.non_dup_threshold {
        Decision::NoDuplicate
    } else if score >= settings.dup_threshold {
        Decision::Duplicate
    } else {
        Decision::PotentialDuplicate
    }
}

/// Token-sort fuzzy ratio; `None` when either side is missing
fn token_ratio(a: Option<&str>, b: Option<&str>) -> Option<f64> {
    let (a, b) = (a?, b?);
    let sort = |s: &str| {
        let mut tokens: Vec<&str> = s.split_whitespace().collect();
        tokens.sort_unstable();
        tokens.join(" ")
    };
    Some(strsim::normalized_levenshtein(&sort(a), &sort(b)))
}

fn year_similarity(a: Option<&str>, b: Option<&str>) -> Option<f64> {
    let parse = |y: &str| y.get(..4.min(y.len())).and_then(|y| y.parse::<i32>().ok());
    let (a, b) = (parse(a?)?, parse(b?)?);
    Some(match (a - b).abs() {
        0 => 1.0,
        1 => 0.8,
        2 => 0.5,
        _ => 0.0,
    })
}

fn start_page(pages: &str) -> &str {
    pages.split('-').next().unwrap_or(pages)
}

/// Per-field similarities of two comparison records
pub fn field_similarities(a: &ComparisonRecord, b: &ComparisonRecord) -> FieldSimilarities {
    let mut values = [0.0; 7];
    let mut missing = [false; 7];

    let fuzzy = [
        token_ratio(a.author_60.as_deref(), b.author_60.as_deref()),
        token_ratio(a.title.as_deref(), b.title.as_deref()),
        year_similarity(a.year.as_deref(), b.year.as_deref()),
        token_ratio(a.container_title.as_deref(), b.container_title.as_deref()),
    ];
    for (i, sim) in fuzzy.into_iter().enumerate() {
        match sim {
            Some(sim) => values[i] = sim,
            None => missing[i] = true,
        }
    }

    for (i, (x, y)) in [(&a.volume, &b.volume), (&a.number, &b.number)].into_iter().enumerate() {
        values[4 + i] = if x == y { 1.0 } else { 0.0 };
        missing[4 + i] = x.is_none() || y.is_none();
    }

    values[6] = match (&a.pages, &b.pages) {
        (Some(x), Some(y)) if x == y || start_page(x) == start_page(y) => 1.0,
        (Some(_), Some(_)) => 0.0,
        _ => {
            missing[6] = true;
            1.0
        }
    };

    FieldSimilarities { values, missing }
}

fn weights_for(a: &ComparisonRecord, b: &ComparisonRecord) -> &'static [f64; 7] {
    if a.journal.is_some() && b.journal.is_some() {
        let non_distinctive = match (&a.title, &b.title) {
            (Some(x), Some(y)) => x == y && NON_DISTINCTIVE_TITLES.contains(&x.as_str()),
            _ => false,
        };
        if non_distinctive {
            &NON_DISTINCTIVE_WEIGHTS
        } else {
            &JOURNAL_WEIGHTS
        }
    } else {
        &NON_JOURNAL_WEIGHTS
    }
}

/// Weighted similarity in [0, 1], rounded to four decimals
pub fn similarity(a: &ComparisonRecord, b: &ComparisonRecord) -> f64 {
    let sims = field_similarities(a, b);
    let weights = weights_for(a, b);
    let score: f64 = weights.iter().zip(sims.values.iter()).map(|(w, s)| w * s).sum();
    (score.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}
