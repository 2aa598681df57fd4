//! Reversal of merges from store snapshots

use crate::store::StoreState;
use revdup_common::{Record, RecordStatus};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// What an unmerge changed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnmergeReport {
    /// Survivor id -> ids restored next to it (the survivor first)
    pub restored: Vec<(String, Vec<String>)>,
    /// Ids that were never merged (or have no splittable ancestor)
    pub unchanged: Vec<String>,
    pub diagnostics: Vec<String>,
}

impl UnmergeReport {
    pub fn restored_count(&self) -> usize {
        self.restored.iter().map(|(_, ids)| ids.len().saturating_sub(1)).sum()
    }
}

fn origin_set(record: &Record) -> BTreeSet<&str> {
    record.origin().iter().map(String::as_str).collect()
}

/// Newest snapshot holding `id` with a strictly smaller origin set
fn pre_merge_snapshot<'h>(history: &'h [StoreState], current: &Record) -> Option<&'h StoreState> {
    let current_origin = origin_set(current);
    history.iter().find(|snapshot| {
        snapshot
            .records
            .get(current.id())
            .map(|earlier| {
                let earlier_origin = origin_set(earlier);
                earlier_origin.len() < current_origin.len() && earlier_origin.is_subset(&current_origin)
            })
            .unwrap_or(false)
    })
}

/// Split `id` one merge back; returns the ids restored next to it
///
/// `Ok(None)` when no snapshot holds a smaller version of the record, `Err`
/// with a diagnostic when the snapshot cannot be applied.
fn split_once(state: &mut StoreState, history: &[StoreState], id: &str) -> Result<Option<Vec<String>>, String> {
    let Some(current) = state.records.get(id) else {
        return Ok(None);
    };
    let Some(snapshot) = pre_merge_snapshot(history, current) else {
        return Ok(None);
    };
    let Some(earlier) = snapshot.records.get(id) else {
        return Ok(None);
    };

    let current_origin = origin_set(current);
    let complement: BTreeSet<&str> = current_origin
        .difference(&origin_set(earlier))
        .copied()
        .collect();

    let parts: Vec<&Record> = snapshot
        .records
        .values()
        .filter(|r| r.id() != id)
        .filter(|r| !r.origin().is_empty() && r.origin().iter().all(|t| complement.contains(t.as_str())))
        .collect();

    let covered: BTreeSet<&str> = parts
        .iter()
        .flat_map(|r| r.origin().iter().map(String::as_str))
        .collect();
    if covered != complement {
        warn!(record_id = %id, "Unmerge skipped: tokens not covered by snapshot");
        return Err(format!(
            "{}: {} origin token(s) not found in the snapshot, left merged",
            id,
            complement.len() - covered.len()
        ));
    }
    if let Some(clash) = parts.iter().find(|r| state.records.contains_key(r.id())) {
        return Err(format!("{}: {} already exists in the store, left merged", id, clash.id()));
    }

    let mut survivor = earlier.clone();
    survivor.restore_status(RecordStatus::MdProcessed);
    let restored: Vec<Record> = parts
        .into_iter()
        .map(|part| {
            let mut part = part.clone();
            part.restore_status(RecordStatus::MdProcessed);
            part
        })
        .collect();

    state.records.insert(id.to_string(), survivor);
    let mut restored_ids = Vec::with_capacity(restored.len());
    for part in restored {
        state.moved_dupe_ids.remove(part.id());
        restored_ids.push(part.id().to_string());
        state.records.insert(part.id().to_string(), part);
    }
    Ok(Some(restored_ids))
}

/// Split the given survivors back into their pre-merge records
///
/// `history` is newest first. Each survivor, and every record restored next
/// to it, keeps being split against older snapshots until no smaller ancestor
/// is left, so one call undoes every merge that fed the survivor. Restored
/// records come back at `md_processed`. A split is skipped with a diagnostic
/// when the snapshot cannot account for every token the record gained, or
/// when a record to be restored already exists again.
pub fn unmerge(state: &mut StoreState, history: &[StoreState], ids: &[String]) -> UnmergeReport {
    let mut report = UnmergeReport::default();
    if history.is_empty() {
        let message = "no store snapshots available, nothing was unmerged".to_string();
        warn!("{}", message);
        report.diagnostics.push(message);
        return report;
    }

    for id in ids {
        if !state.records.contains_key(id) {
            report.diagnostics.push(format!("{} is not in the store", id));
            continue;
        }

        let mut restored_ids = vec![id.clone()];
        let mut pending = vec![id.clone()];
        while let Some(next) = pending.pop() {
            match split_once(state, history, &next) {
                Ok(Some(parts)) => {
                    pending.push(next);
                    pending.extend(parts.iter().cloned());
                    restored_ids.extend(parts);
                }
                Ok(None) => {}
                Err(message) => report.diagnostics.push(message),
            }
        }

        if restored_ids.len() == 1 {
            report.unchanged.push(id.clone());
        } else {
            info!(record_id = %id, restored = restored_ids.len() - 1, "Record unmerged");
            report.restored.push((id.clone(), restored_ids));
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use revdup_common::EntryType;

    fn record(id: &str, origin: &[&str]) -> Record {
        Record::from_fields(
            id,
            EntryType::Article,
            RecordStatus::MdProcessed,
            origin.iter().map(|s| s.to_string()).collect(),
            [("title", format!("Title of {}", id))],
            "test",
        )
        .unwrap()
    }

    #[test]
    fn test_unmerge_restores_parts() {
        let before = StoreState::new([record("a", &["x/1"]), record("b", &["y/1"]), record("c", &["z/1"])]);
        let mut merged_a = record("a", &["x/1", "y/1"]);
        merged_a.update_field("note", "merged", "test", "", false);
        let mut state = StoreState::new([merged_a, record("c", &["z/1"])]);
        state.moved_dupe_ids.insert("b".into(), "a".into());

        let report = unmerge(&mut state, &[before.clone()], &["a".to_string()]);

        assert_eq!(report.restored, vec![("a".to_string(), vec!["a".to_string(), "b".to_string()])]);
        assert_eq!(state, before);
    }

    #[test]
    fn test_never_merged_is_noop() {
        let before = StoreState::new([record("a", &["x/1"])]);
        let mut state = before.clone();
        let report = unmerge(&mut state, &[before.clone()], &["a".to_string()]);
        assert_eq!(report.unchanged, vec!["a"]);
        assert_eq!(state, before);
    }

    #[test]
    fn test_without_history_leaves_store_unchanged() {
        let mut state = StoreState::new([record("a", &["x/1", "y/1"])]);
        let original = state.clone();
        let report = unmerge(&mut state, &[], &["a".to_string()]);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(state, original);
    }

    #[test]
    fn test_repeated_merges_undone_in_one_call() {
        let first = StoreState::new([record("a", &["x/1"]), record("b", &["y/1"]), record("c", &["z/1"])]);
        let mut second = StoreState::new([record("a", &["x/1", "y/1"]), record("c", &["z/1"])]);
        second.moved_dupe_ids.insert("b".into(), "a".into());
        let mut state = StoreState::new([record("a", &["x/1", "y/1", "z/1"])]);
        state.moved_dupe_ids.insert("b".into(), "a".into());
        state.moved_dupe_ids.insert("c".into(), "a".into());

        let report = unmerge(&mut state, &[second, first.clone()], &["a".to_string()]);

        assert_eq!(report.restored_count(), 2);
        assert!(report.diagnostics.is_empty());
        assert_eq!(state, first);
    }
}
