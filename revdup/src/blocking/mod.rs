//! Candidate pair generation
//!
//! Records sharing a blocking key land in the same block; every pair within a
//! block is a candidate. Keys with an empty component produce no block, and
//! oversized blocks are skipped so a common key cannot blow up the pair count.

mod disk;

pub use disk::{needs_out_of_core, DiskBlockingMap, PairBatches, BYTES_PER_RECORD};

use crate::similarity::ComparisonRecord;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Candidate pair with `.0 < .1`
pub type CandidatePair = (String, String);

fn prefix(value: &str, len: usize) -> String {
    value.chars().take(len).collect()
}

fn join_key(tag: &str, parts: &[Option<&str>]) -> Option<String> {
    let mut key = tag.to_string();
    for part in parts {
        let part = (*part)?;
        if part.trim().is_empty() {
            return None;
        }
        key.push('|');
        key.push_str(part);
    }
    Some(key)
}

/// Blocking keys of a record
pub fn blocking_keys(record: &ComparisonRecord) -> Vec<String> {
    let container = record.container_title.as_deref().map(|c| prefix(c, 8));
    let title = record.title.as_deref().map(|t| prefix(t, 20));
    let year = record.year.as_deref();

    [
        join_key(
            "container",
            &[container.as_deref(), year, record.volume.as_deref(), record.number.as_deref()],
        ),
        join_key("title", &[title.as_deref(), year]),
        join_key("author", &[record.first_author_last_name(), year]),
        join_key("doi", &[record.doi.as_deref()]),
        join_key("isbn", &[record.isbn.as_deref()]),
        join_key("colrev_id", &[record.colrev_id.as_deref()]),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// In-memory blocking: sorted, de-duplicated pairs without self-pairs
pub fn candidate_pairs(records: &[ComparisonRecord], max_block_size: usize) -> Vec<CandidatePair> {
    let mut blocks: HashMap<String, Vec<&str>> = HashMap::new();
    for record in records {
        for key in blocking_keys(record) {
            blocks.entry(key).or_default().push(record.id.as_str());
        }
    }

    let mut pairs = BTreeSet::new();
    let mut skipped = 0usize;
    for (key, ids) in &blocks {
        if ids.len() > max_block_size {
            warn!(block_key = %key, size = ids.len(), max_block_size, "Skipping oversized block");
            skipped += 1;
            continue;
        }
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                if a == b {
                    continue;
                }
                let pair = if a < b { (*a, *b) } else { (*b, *a) };
                pairs.insert((pair.0.to_string(), pair.1.to_string()));
            }
        }
    }

    debug!(
        records = records.len(),
        blocks = blocks.len(),
        skipped_blocks = skipped,
        pairs = pairs.len(),
        "Blocking complete"
    );
    pairs.into_iter().collect()
}
