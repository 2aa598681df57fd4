//! Bibliographic record model
//!
//! A [`Record`] owns its field map and two provenance maps: `md_prov` for
//! identifying (masterdata) fields and `d_prov` for everything else. All
//! mutation goes through methods so that every present identifying field keeps
//! a provenance entry and curated masterdata is never silently overwritten.

pub mod colrev_id;
pub mod fields;
pub mod status;

pub use fields::{is_identifying, EntryType, IDENTIFYING_FIELDS, UNKNOWN};
pub use status::RecordStatus;

use crate::quality::QualityModel;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// `md_prov` key marking externally curated masterdata
pub const CURATED: &str = "CURATED";

/// Prefix of notes that suppress a defect code on a field
pub const IGNORE_PREFIX: &str = "IGNORE:";

/// Note left on a removed identifying field so `missing` is not raised again
pub const IGNORE_MISSING: &str = "IGNORE:missing";

/// Note on a required field that is legitimately absent (e.g. forthcoming volume)
pub const NOT_MISSING: &str = "not-missing";

/// Prefix of audit notes holding a conflicting value dropped during a merge
pub const MERGED_ALT_PREFIX: &str = "merged-alt:";

/// Provenance of a single field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldProvenance {
    /// `|`-chained list of sources that produced the current value
    pub source: String,
    /// Comma-joined defect codes and sentinels
    #[serde(default)]
    pub note: String,
}

impl FieldProvenance {
    pub fn new(source: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            note: note.into(),
        }
    }

    /// Individual note tokens in insertion order
    pub fn notes(&self) -> impl Iterator<Item = &str> {
        self.note.split(',').map(str::trim).filter(|n| !n.is_empty())
    }

    pub fn has_note(&self, note: &str) -> bool {
        self.notes().any(|n| n == note)
    }

    /// Add a note unless already present
    pub fn add_note(&mut self, note: &str) {
        if note.is_empty() || self.has_note(note) {
            return;
        }
        let mut notes: Vec<&str> = self.notes().collect();
        notes.push(note);
        self.note = notes.join(",");
    }

    pub fn remove_note(&mut self, note: &str) {
        let notes: Vec<&str> = self.notes().filter(|n| *n != note).collect();
        self.note = notes.join(",");
    }
}

/// Whether a note token is a sentinel rather than a defect
pub fn is_sentinel_note(note: &str) -> bool {
    note.starts_with(IGNORE_PREFIX) || note == NOT_MISSING || note.starts_with(MERGED_ALT_PREFIX)
}

/// Source name of an origin token (`crossref/0001` → `crossref`)
pub fn origin_source(token: &str) -> &str {
    token.split_once('/').map(|(source, _)| source).unwrap_or(token)
}

/// A bibliographic record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: String,
    entrytype: EntryType,
    status: RecordStatus,
    origin: Vec<String>,
    #[serde(default)]
    fields: BTreeMap<String, String>,
    #[serde(default)]
    md_prov: BTreeMap<String, FieldProvenance>,
    #[serde(default)]
    d_prov: BTreeMap<String, FieldProvenance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    colrev_id: Option<String>,
}

impl Record {
    /// Create a freshly ingested record (`md_retrieved`, one origin token)
    pub fn new(id: impl Into<String>, entrytype: EntryType, origin_token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entrytype,
            status: RecordStatus::MdRetrieved,
            origin: vec![origin_token.into()],
            fields: BTreeMap::new(),
            md_prov: BTreeMap::new(),
            d_prov: BTreeMap::new(),
            colrev_id: None,
        }
    }

    /// Construct from a field map; every field gets `source` as provenance
    pub fn from_fields<I, K, V>(
        id: impl Into<String>,
        entrytype: EntryType,
        status: RecordStatus,
        origin: Vec<String>,
        fields: I,
        source: &str,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let id = id.into();
        if origin.is_empty() {
            return Err(Error::InvalidInput(format!("record {} has an empty origin", id)));
        }
        let mut record = Self {
            id,
            entrytype,
            status,
            origin: Vec::new(),
            fields: BTreeMap::new(),
            md_prov: BTreeMap::new(),
            d_prov: BTreeMap::new(),
            colrev_id: None,
        };
        record.add_origins(&origin);
        for (key, value) in fields {
            record.update_field(&key.into(), &value.into(), source, "", false);
        }
        Ok(record)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Change the id; only allowed before `md_processed`
    pub fn set_id(&mut self, id: impl Into<String>) -> Result<()> {
        if self.status >= RecordStatus::MdProcessed {
            return Err(Error::InvalidInput(format!(
                "id of {} is immutable at status {}",
                self.id, self.status
            )));
        }
        self.id = id.into();
        Ok(())
    }

    pub fn entrytype(&self) -> EntryType {
        self.entrytype
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    /// Advance status along the lifecycle graph
    pub fn set_status(&mut self, next: RecordStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidInput(format!(
                "status of {} may not move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Set status without lifecycle checks (unmerge restores records this way)
    pub fn restore_status(&mut self, status: RecordStatus) {
        self.status = status;
    }

    pub fn colrev_id(&self) -> Option<&str> {
        self.colrev_id.as_deref()
    }

    pub fn set_colrev_id(&mut self, colrev_id: Option<String>) {
        self.colrev_id = colrev_id;
    }

    // ---------------------------------------------------------------------
    // Origin
    // ---------------------------------------------------------------------

    pub fn origin(&self) -> &[String] {
        &self.origin
    }

    /// Distinct source names of the origin tokens
    pub fn origin_sources(&self) -> BTreeSet<String> {
        self.origin.iter().map(|t| origin_source(t).to_string()).collect()
    }

    /// Origin tokens belonging to a source name
    pub fn origin_tokens_for(&self, source: &str) -> BTreeSet<&str> {
        self.origin
            .iter()
            .filter(|t| origin_source(t) == source)
            .map(String::as_str)
            .collect()
    }

    pub fn has_origin(&self, token: &str) -> bool {
        self.origin.iter().any(|t| t == token)
    }

    /// Ordered union: new tokens are appended in first-appearance order
    pub fn add_origins(&mut self, tokens: &[String]) {
        for token in tokens {
            if !self.has_origin(token) {
                self.origin.push(token.clone());
            }
        }
    }

    // ---------------------------------------------------------------------
    // Fields and provenance
    // ---------------------------------------------------------------------

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Field value unless absent, empty or `UNKNOWN`
    pub fn get_known(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty() && *v != UNKNOWN)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn md_prov(&self) -> &BTreeMap<String, FieldProvenance> {
        &self.md_prov
    }

    pub fn d_prov(&self) -> &BTreeMap<String, FieldProvenance> {
        &self.d_prov
    }

    /// Provenance of a field from the map it belongs to
    pub fn provenance(&self, key: &str) -> Option<&FieldProvenance> {
        if is_identifying(key) {
            self.md_prov.get(key)
        } else {
            self.d_prov.get(key)
        }
    }

    fn prov_map_mut(&mut self, key: &str) -> &mut BTreeMap<String, FieldProvenance> {
        if is_identifying(key) {
            &mut self.md_prov
        } else {
            &mut self.d_prov
        }
    }

    pub fn masterdata_is_curated(&self) -> bool {
        self.md_prov.contains_key(CURATED)
    }

    /// Write a field and maintain its provenance
    ///
    /// With `append_edit` and an existing value, `source` is chained onto the
    /// prior provenance source (`original|` when there was none).
    pub fn update_field(&mut self, key: &str, value: &str, source: &str, note: &str, append_edit: bool) {
        let existed = self.fields.contains_key(key);
        self.fields.insert(key.to_string(), value.to_string());

        if is_identifying(key) && self.masterdata_is_curated() {
            return;
        }
        let prov_map = self.prov_map_mut(key);
        let source = if append_edit && existed {
            match prov_map.get(key) {
                Some(prior) => format!("{}|{}", prior.source, source),
                None => format!("original|{}", source),
            }
        } else {
            source.to_string()
        };
        prov_map.insert(key.to_string(), FieldProvenance::new(source, note));
    }

    /// Write a field together with an explicit provenance entry
    pub fn set_field_with_provenance(&mut self, key: &str, value: &str, provenance: FieldProvenance) {
        self.fields.insert(key.to_string(), value.to_string());
        if is_identifying(key) && self.masterdata_is_curated() {
            return;
        }
        self.prov_map_mut(key).insert(key.to_string(), provenance);
    }

    /// Move a field and its provenance to a new key
    pub fn rename_field(&mut self, old: &str, new: &str) {
        let Some(value) = self.fields.remove(old) else {
            return;
        };
        let prior = self.prov_map_mut(old).remove(old);
        self.fields.insert(new.to_string(), value);

        if is_identifying(new) && self.masterdata_is_curated() {
            return;
        }
        let (source, note) = match prior {
            Some(p) => (p.source, p.note),
            None => ("original".to_string(), String::new()),
        };
        let provenance = FieldProvenance::new(format!("{}|rename-from:{}", source, old), note);
        self.prov_map_mut(new).insert(new.to_string(), provenance);
    }

    /// Drop a field
    ///
    /// With `not_missing_note`, an identifying key keeps an `IGNORE:missing`
    /// provenance entry so the missing-field check stays quiet.
    pub fn remove_field(&mut self, key: &str, not_missing_note: bool, source: &str) {
        self.fields.remove(key);
        if not_missing_note && is_identifying(key) {
            if !self.masterdata_is_curated() {
                self.md_prov
                    .insert(key.to_string(), FieldProvenance::new(source, IGNORE_MISSING));
            }
        } else {
            self.prov_map_mut(key).remove(key);
        }
    }

    pub fn add_masterdata_provenance_note(&mut self, key: &str, note: &str) {
        if self.masterdata_is_curated() {
            return;
        }
        self.md_prov
            .entry(key.to_string())
            .or_insert_with(|| FieldProvenance::new("ORIGINAL", ""))
            .add_note(note);
    }

    pub fn remove_masterdata_provenance_note(&mut self, key: &str, note: &str) {
        if let Some(prov) = self.md_prov.get_mut(key) {
            prov.remove_note(note);
        }
    }

    pub fn add_data_provenance_note(&mut self, key: &str, note: &str) {
        self.d_prov
            .entry(key.to_string())
            .or_insert_with(|| FieldProvenance::new("ORIGINAL", ""))
            .add_note(note);
    }

    pub fn remove_data_provenance_note(&mut self, key: &str, note: &str) {
        if let Some(prov) = self.d_prov.get_mut(key) {
            prov.remove_note(note);
        }
    }

    /// Add a note on whichever provenance map the field belongs to
    pub fn add_field_note(&mut self, key: &str, note: &str) {
        if is_identifying(key) {
            self.add_masterdata_provenance_note(key, note);
        } else {
            self.add_data_provenance_note(key, note);
        }
    }

    /// Remove a note from every provenance entry
    pub fn clear_note_everywhere(&mut self, note: &str) {
        for prov in self.md_prov.values_mut().chain(self.d_prov.values_mut()) {
            prov.remove_note(note);
        }
    }

    /// Drop provenance entries of absent fields that no longer carry a note
    pub fn prune_provenance(&mut self) {
        let fields = &self.fields;
        self.md_prov
            .retain(|k, p| k == CURATED || fields.contains_key(k) || !p.note.is_empty());
        self.d_prov
            .retain(|k, p| fields.contains_key(k) || !p.note.is_empty());
    }

    /// Mark masterdata as externally curated; no-op if already curated
    pub fn set_masterdata_curated(&mut self, source: &str) {
        if self.masterdata_is_curated() {
            return;
        }
        self.md_prov.clear();
        self.md_prov
            .insert(CURATED.to_string(), FieldProvenance::new(source, ""));
    }

    /// Change the entrytype, moving journal/booktitle as the new type expects
    pub fn change_entrytype(&mut self, new_entrytype: &str, quality_model: &QualityModel) -> Result<()> {
        let new_entrytype: EntryType = new_entrytype.parse()?;

        self.clear_note_everywhere("missing");
        self.clear_note_everywhere("inconsistent-with-entrytype");
        self.prune_provenance();

        self.entrytype = new_entrytype;
        match new_entrytype {
            EntryType::Inproceedings | EntryType::Proceedings | EntryType::Conference => {
                if self.contains("journal") && !self.contains("booktitle") {
                    self.rename_field("journal", "booktitle");
                }
            }
            EntryType::Article => {
                if self.contains("booktitle") && !self.contains("journal") {
                    self.rename_field("booktitle", "journal");
                }
            }
            _ => {}
        }

        quality_model.run(self, false);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Defects
    // ---------------------------------------------------------------------

    /// (field, defect code) pairs, sentinels excluded
    pub fn defects(&self) -> Vec<(String, String)> {
        self.md_prov
            .iter()
            .chain(self.d_prov.iter())
            .flat_map(|(key, prov)| {
                prov.notes()
                    .filter(|n| !is_sentinel_note(n))
                    .map(|n| (key.clone(), n.to_string()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn has_quality_defects(&self) -> bool {
        !self.defects().is_empty()
    }

    pub fn has_defect(&self, key: &str, code: &str) -> bool {
        self.md_prov
            .get(key)
            .into_iter()
            .chain(self.d_prov.get(key))
            .any(|p| p.has_note(code))
    }

    /// Check record-local invariants (non-empty origin, masterdata provenance)
    pub fn check_invariants(&self) -> Result<()> {
        if self.origin.is_empty() {
            return Err(Error::InvalidInput(format!("record {} has an empty origin", self.id)));
        }
        let unique: BTreeSet<&String> = self.origin.iter().collect();
        if unique.len() != self.origin.len() {
            return Err(Error::InvalidInput(format!(
                "record {} lists an origin token twice",
                self.id
            )));
        }
        if self.masterdata_is_curated() {
            return Ok(());
        }
        for key in self.fields.keys().filter(|k| is_identifying(k)) {
            if !self.md_prov.contains_key(key) {
                return Err(Error::InvalidInput(format!(
                    "record {} has no provenance for identifying field {}",
                    self.id, key
                )));
            }
        }
        for (key, prov) in &self.md_prov {
            if self.fields.contains_key(key) {
                continue;
            }
            let annotated = prov.has_note(IGNORE_MISSING) || prov.has_note("missing") || prov.has_note(NOT_MISSING);
            if !annotated {
                return Err(Error::InvalidInput(format!(
                    "record {} has provenance for absent field {}",
                    self.id, key
                )));
            }
        }
        Ok(())
    }
}
