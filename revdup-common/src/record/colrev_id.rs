//! colrev_id fingerprints
//!
//! Format: `colrev_id1:|<type>|<container>|<volume>|<number>|<year>|<authors>|<title>`
//! where volume/number are only included for articles. Every part is
//! lowercased, stripped of accents and punctuation, with whitespace turned
//! into hyphens.

use super::{EntryType, Record, IDENTIFYING_FIELDS, UNKNOWN};
use crate::text::remove_accents;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

const PREFIX: &str = "colrev_id1:";

static NON_ID_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9a-zA-Z -]+").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static HYPHENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").unwrap());

/// Titles that are rarely distinct and never yield an identifier
const NON_DISTINCT_TITLES: &[&str] = &["minitrack-introduction"];

fn robust_append(srep: &mut String, to_append: &str) {
    let mut part = to_append.replace('\n', " ").replace('/', " ");
    part = part.trim().replace('–', " ");
    part = part.replace("emph{", "");
    part = part.replace("&amp;", "and");
    part = part.replace(" & ", " and ");
    part = remove_accents(&part);
    part = NON_ID_CHARS.replace_all(&part, "").into_owned();
    part = WHITESPACE.replace_all(&part, "-").into_owned();
    part = HYPHENS.replace_all(&part, "-").into_owned();
    part = part.to_lowercase();
    if part.len() > 1 {
        part = part.trim_end_matches('-').to_string();
    }
    srep.push('|');
    srep.push_str(&part);
}

/// Last names of the author list, space separated
fn format_authors(author: &str) -> String {
    let input = author.replace('\n', " ").replace('\'', "");
    let input = input.replace("; ", " and ");
    let mut last_names = Vec::new();
    for name in input.split(" and ") {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if let Some(last_only) = name.strip_suffix(',') {
            // last names only, e.g. "Webster, and Watson,"
            if last_only.trim().len() > 1 {
                last_names.push(last_only.trim().to_string());
            }
            continue;
        }
        let last = match name.split_once(',') {
            Some((last, _)) => last.trim().to_string(),
            None => name.split_whitespace().last().unwrap_or_default().to_string(),
        };
        if last.len() > 1 {
            last_names.push(last);
        }
    }
    last_names.join(" ")
}

fn container_title(record: &Record) -> Result<&str> {
    let key = match record.entrytype() {
        EntryType::Phdthesis | EntryType::Mastersthesis => "school",
        EntryType::Techreport => "institution",
        EntryType::Inproceedings => "booktitle",
        EntryType::Article => "journal",
        _ if record.contains("series") => "series",
        _ if record.contains("url") => "url",
        _ => return Err(Error::NotEnoughData("no container title".to_string())),
    };
    required(record, key)
}

fn required<'a>(record: &'a Record, key: &str) -> Result<&'a str> {
    record
        .get(key)
        .ok_or_else(|| Error::NotEnoughData(format!("missing field: {}", key)))
}

/// Derive the colrev_id of a record
pub fn create_colrev_id(record: &Record) -> Result<String> {
    for key in IDENTIFYING_FIELDS {
        if record.get(key) == Some(UNKNOWN) {
            return Err(Error::NotEnoughData(format!("{} unknown (maybe required)", key)));
        }
    }

    let mut srep = PREFIX.to_string();
    let type_tag = match record.entrytype() {
        EntryType::Article => "a",
        EntryType::Inproceedings => "p",
        other => other.as_str(),
    };
    robust_append(&mut srep, type_tag);
    robust_append(&mut srep, container_title(record)?);
    if record.entrytype() == EntryType::Article {
        robust_append(&mut srep, record.get("volume").unwrap_or("-"));
        robust_append(&mut srep, record.get("number").unwrap_or("-"));
    }
    robust_append(&mut srep, required(record, "year")?);

    let authors = format_authors(required(record, "author")?);
    if authors.replace('-', "").trim().is_empty() {
        return Err(Error::NotEnoughData("missing field: author".to_string()));
    }
    robust_append(&mut srep, &authors);
    robust_append(&mut srep, required(record, "title")?);
    let srep = srep.replace(';', "");

    let title_part = srep.rsplit('|').next().unwrap_or_default();
    if NON_DISTINCT_TITLES.contains(&title_part) {
        return Err(Error::NotEnoughData("title typically non-distinct".to_string()));
    }
    Ok(srep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordStatus;

    fn record(entrytype: EntryType, fields: &[(&str, &str)]) -> Record {
        Record::from_fields(
            "r1",
            entrytype,
            RecordStatus::MdPrepared,
            vec!["src/1".to_string()],
            fields.iter().copied(),
            "test",
        )
        .unwrap()
    }

    #[test]
    fn test_article_colrev_id() {
        let r = record(
            EntryType::Article,
            &[
                ("author", "Bansal, Gaurav and Zahedi, F. Mariam"),
                ("title", "Trust violation and repair: The information privacy perspective"),
                ("journal", "European Journal of Information Systems"),
                ("volume", "24"),
                ("number", "1"),
                ("year", "2015"),
            ],
        );
        assert_eq!(
            create_colrev_id(&r).unwrap(),
            "colrev_id1:|a|european-journal-of-information-systems|24|1|2015|bansal-zahedi|trust-violation-and-repair-the-information-privacy-perspective"
        );
    }

    #[test]
    fn test_author_formatting_is_stable_across_styles() {
        assert_eq!(format_authors("Bansal, G. and Zahedi, F. M."), "Bansal Zahedi");
        assert_eq!(format_authors("Gaurav Bansal and Mariam Zahedi"), "Bansal Zahedi");
        assert_eq!(format_authors("Webster, and Watson,"), "Webster Watson");
    }

    #[test]
    fn test_inproceedings_uses_booktitle_and_skips_volume() {
        let r = record(
            EntryType::Inproceedings,
            &[
                ("author", "Müller, Jörg"),
                ("title", "A Study"),
                ("booktitle", "ICIS 2019"),
                ("year", "2019"),
                ("volume", "3"),
            ],
        );
        assert_eq!(
            create_colrev_id(&r).unwrap(),
            "colrev_id1:|p|icis-2019|2019|muller|a-study"
        );
    }

    #[test]
    fn test_unknown_field_prevents_id() {
        let r = record(
            EntryType::Article,
            &[
                ("author", "Doe, J."),
                ("title", "T"),
                ("journal", "J"),
                ("year", UNKNOWN),
            ],
        );
        assert!(matches!(create_colrev_id(&r), Err(Error::NotEnoughData(_))));
    }

    #[test]
    fn test_missing_container_prevents_id() {
        let r = record(EntryType::Misc, &[("author", "Doe, J."), ("title", "T"), ("year", "2020")]);
        assert!(create_colrev_id(&r).is_err());
    }

    #[test]
    fn test_minitrack_introduction_rejected() {
        let r = record(
            EntryType::Inproceedings,
            &[
                ("author", "Doe, J."),
                ("title", "Minitrack Introduction"),
                ("booktitle", "HICSS"),
                ("year", "2020"),
            ],
        );
        assert!(create_colrev_id(&r).is_err());
    }
}
