//! Field fusion of a duplicate into its primary

use revdup_common::record::{is_identifying, CURATED, MERGED_ALT_PREFIX};
use revdup_common::{FieldProvenance, Record};

/// Provenance source of `key` on the dupe, as carried into the primary
fn merged_source(dupe: &Record, key: &str) -> String {
    let source = if dupe.masterdata_is_curated() && is_identifying(key) {
        dupe.md_prov()
            .get(CURATED)
            .map(|p| p.source.clone())
            .unwrap_or_else(|| CURATED.to_string())
    } else {
        dupe.provenance(key)
            .map(|p| p.source.clone())
            .unwrap_or_else(|| "original".to_string())
    };
    format!("{}|merged", source)
}

fn has_preferred_source(record: &Record, key: &str, preferred: &[String]) -> bool {
    let source = if record.masterdata_is_curated() {
        record.md_prov().get(CURATED).map(|p| p.source.as_str())
    } else {
        record.provenance(key).map(|p| p.source.as_str())
    };
    source
        .map(|s| preferred.iter().any(|prefix| s.starts_with(prefix.as_str())))
        .unwrap_or(false)
}

/// Merge `dupe` into `primary`
///
/// Origins are unioned in order. Identifying fields of a curated primary are
/// left alone; otherwise known values win over missing or `UNKNOWN` ones, and
/// on a conflict the dupe's value is taken only when it comes from a
/// preferred source and the primary's does not. Non-identifying conflicts
/// keep the primary's value and leave a `merged-alt:` note.
pub fn merge_into(primary: &mut Record, dupe: &Record, preferred: &[String]) {
    primary.add_origins(dupe.origin());
    let primary_curated = primary.masterdata_is_curated();

    for (key, value) in dupe.fields() {
        if is_identifying(key) {
            if primary_curated || dupe.get_known(key).is_none() {
                continue;
            }
            let take = match primary.get_known(key) {
                None => true,
                Some(current) if current == value => false,
                Some(_) => {
                    has_preferred_source(dupe, key, preferred)
                        && !has_preferred_source(primary, key, preferred)
                }
            };
            if take {
                let provenance = FieldProvenance::new(merged_source(dupe, key), "");
                primary.set_field_with_provenance(key, value, provenance);
            }
            continue;
        }

        match primary.get(key) {
            None => {
                let note = dupe.provenance(key).map(|p| p.note.clone()).unwrap_or_default();
                let provenance = FieldProvenance::new(merged_source(dupe, key), note);
                primary.set_field_with_provenance(key, value, provenance);
            }
            Some(current) if current.is_empty() && !value.is_empty() => {
                let provenance = FieldProvenance::new(merged_source(dupe, key), "");
                primary.set_field_with_provenance(key, value, provenance);
            }
            Some(current) if current != value && !value.is_empty() => {
                let note = format!("{}{}", MERGED_ALT_PREFIX, value.replace(',', ";"));
                primary.add_data_provenance_note(key, &note);
            }
            Some(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revdup_common::{EntryType, RecordStatus};

    fn record(id: &str, origin: &str, fields: &[(&str, &str)], source: &str) -> Record {
        Record::from_fields(
            id,
            EntryType::Article,
            RecordStatus::MdPrepared,
            vec![origin.to_string()],
            fields.iter().copied(),
            source,
        )
        .unwrap()
    }

    #[test]
    fn test_missing_fields_taken_with_merged_provenance() {
        let mut a = record("a", "x/1", &[("title", "Trust"), ("year", "UNKNOWN")], "x");
        let b = record("b", "y/1", &[("title", "Trust"), ("year", "2020"), ("doi", "10.1/abc")], "y");
        merge_into(&mut a, &b, &[]);

        assert_eq!(a.origin(), &["x/1".to_string(), "y/1".to_string()]);
        assert_eq!(a.get("year"), Some("2020"));
        assert_eq!(a.provenance("year").unwrap().source, "y|merged");
        assert_eq!(a.get("doi"), Some("10.1/abc"));
        assert_eq!(a.provenance("title").unwrap().source, "x");
        assert!(a.check_invariants().is_ok());
    }

    #[test]
    fn test_identifying_conflict_prefers_preferred_source() {
        let mut a = record("a", "x/1", &[("title", "Trust in IT")], "pdf");
        let b = record("b", "y/1", &[("title", "Trust in information technology")], "crossref");

        let mut plain = a.clone();
        merge_into(&mut plain, &b, &[]);
        assert_eq!(plain.get("title"), Some("Trust in IT"));

        merge_into(&mut a, &b, &["crossref".to_string()]);
        assert_eq!(a.get("title"), Some("Trust in information technology"));
    }

    #[test]
    fn test_curated_primary_keeps_masterdata() {
        let mut a = record("a", "x/1", &[("title", "Trust")], "x");
        a.set_masterdata_curated("https://curation.example");
        let b = record("b", "y/1", &[("title", "Trust"), ("volume", "12")], "crossref");
        merge_into(&mut a, &b, &["crossref".to_string()]);
        assert_eq!(a.get("volume"), None);
        assert!(a.masterdata_is_curated());
    }

    #[test]
    fn test_non_identifying_conflict_leaves_alt_note() {
        let mut a = record("a", "x/1", &[("title", "T"), ("abstract", "short")], "x");
        let b = record("b", "y/1", &[("title", "T"), ("abstract", "longer, with comma")], "y");
        merge_into(&mut a, &b, &[]);
        assert_eq!(a.get("abstract"), Some("short"));
        assert!(a
            .provenance("abstract")
            .unwrap()
            .has_note("merged-alt:longer; with comma"));
        assert!(!a.has_quality_defects());
    }
}
