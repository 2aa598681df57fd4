//! Built-in defect checkers

use super::language::is_iso639_3;
use super::{Annotation, Checker, DefectCode};
use crate::record::{Record, UNKNOWN};
use crate::text::uppercase_share;
use once_cell::sync::Lazy;
use regex::Regex;

pub(super) const BUILT_IN: &[(&str, Checker)] = &[
    ("missing-field", missing_field),
    ("mostly-all-caps", mostly_all_caps),
    ("container-title-abbreviated", container_title_abbreviated),
    ("erroneous-symbol-in-field", erroneous_symbol),
    ("erroneous-term-in-field", erroneous_term),
    ("html-tags", html_tags),
    ("html-chars", html_chars),
    ("name-format-separators", name_format_separators),
    ("name-format-titles", name_format_titles),
    ("name-particles", name_particles),
    ("name-abbreviated", name_abbreviated),
    ("incomplete-field", incomplete_field),
    ("identical-values-between-title-and-container", identical_title_container),
    ("inconsistent-content", inconsistent_content),
    ("inconsistent-with-entrytype", inconsistent_with_entrytype),
    ("doi-not-matching-pattern", doi_pattern),
    ("isbn-not-matching-pattern", isbn_pattern),
    ("page-range", page_range),
    ("year-format", year_format),
    ("thesis-with-multiple-authors", thesis_with_multiple_authors),
    ("language-format-error", language_format),
];

const NAME_FIELDS: &[&str] = &["author", "editor"];
const CAPS_FIELDS: &[&str] = &["author", "title", "journal", "booktitle", "editor"];
const CONTAINER_FIELDS: &[&str] = &["journal", "booktitle"];
const TEXT_FIELDS: &[&str] = &[
    "author",
    "title",
    "editor",
    "journal",
    "booktitle",
    "series",
    "publisher",
    "school",
    "institution",
    "abstract",
];

const AUTHOR_TERMS: &[&str] = &[
    "http",
    "University",
    "orcid",
    "student",
    "Harvard",
    "Conference",
    "Mrs",
    "Hochschule",
];
const TITLE_TERMS: &[&str] = &[
    "research paper",
    "completed research",
    "research in progress",
    "full research paper",
];

/// Acronyms that legitimately appear in all caps
const KNOWN_ACRONYMS: &[&str] = &[
    "IEEE", "ACM", "AIS", "IFIP", "ICIS", "ECIS", "PACIS", "AMCIS", "HICSS", "MIS", "IS", "IT",
    "AI", "CSCW", "CHI", "KDD", "SIGMOD", "VLDB", "BMJ", "JAMA", "PLOS", "ONE",
];

static NAME_FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w .'-]+, [\w .'-]+$").unwrap());
static HTML_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#\d+;").unwrap());
static HTML_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[a-zA-Z][a-zA-Z0-9]*(\s[^<>]*)?/?>").unwrap());
static DOI: Lazy<Regex> = Lazy::new(|| Regex::new(r"^10\.\d{4,9}/").unwrap());
static ISBN_10: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{9}[\dX]$").unwrap());
static ISBN_13: Lazy<Regex> = Lazy::new(|| Regex::new(r"^97[89]\d{10}$").unwrap());
static PAGE_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)--(\d+)$").unwrap());
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}$").unwrap());

/// Present, non-UNKNOWN values of the listed fields
fn values<'a>(record: &'a Record, keys: &'a [&'a str]) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    keys.iter()
        .filter_map(move |k| record.get(k).filter(|v| *v != UNKNOWN).map(|v| (*k, v)))
}

fn split_names(value: &str) -> impl Iterator<Item = &str> {
    value.split(" and ").map(str::trim)
}

fn missing_field(record: &Record) -> Vec<Annotation> {
    let forthcoming = record.get("year") == Some("forthcoming");
    record
        .entrytype()
        .required_fields()
        .iter()
        .filter(|k| record.get_known(k).is_none())
        .map(|k| {
            if forthcoming && (*k == "volume" || *k == "number") {
                Annotation::NotMissing { field: k.to_string() }
            } else {
                Annotation::defect(k, DefectCode::Missing)
            }
        })
        .collect()
}

fn mostly_all_caps(record: &Record) -> Vec<Annotation> {
    let mut annotations = Vec::new();
    for (key, value) in values(record, CAPS_FIELDS) {
        if key == "title" && record.entrytype() == crate::record::EntryType::Online && value.len() < 10 {
            continue;
        }
        let words: Vec<&str> = value
            .split_whitespace()
            .filter(|w| *w != "and")
            .filter(|w| !KNOWN_ACRONYMS.contains(&w.trim_matches(|c: char| !c.is_alphanumeric())))
            // initials in name lists are uppercase by definition
            .filter(|w| !(NAME_FIELDS.contains(&key) && w.trim_matches(|c: char| !c.is_alphabetic()).chars().count() <= 1))
            .collect();
        if words.is_empty() {
            continue;
        }
        if uppercase_share(&words.join(" ")) >= 0.7 {
            annotations.push(Annotation::defect(key, DefectCode::MostlyAllCaps));
        }
    }
    annotations
}

fn container_title_abbreviated(record: &Record) -> Vec<Annotation> {
    values(record, CONTAINER_FIELDS)
        .filter(|(_, v)| {
            v.chars().count() < 6
                && v.chars().any(char::is_alphabetic)
                && !v.chars().any(char::is_lowercase)
        })
        .map(|(k, _)| Annotation::defect(k, DefectCode::ContainerTitleAbbreviated))
        .collect()
}

fn erroneous_symbol(record: &Record) -> Vec<Annotation> {
    values(record, &["author", "title", "editor", "journal", "booktitle"])
        .filter(|(_, v)| v.contains('�') || v.contains('™'))
        .map(|(k, _)| Annotation::defect(k, DefectCode::ErroneousSymbolInField))
        .collect()
}

fn erroneous_term(record: &Record) -> Vec<Annotation> {
    let mut annotations = Vec::new();
    if let Some(author) = record.get("author") {
        if AUTHOR_TERMS.iter().any(|t| author.contains(t)) {
            annotations.push(Annotation::defect("author", DefectCode::ErroneousTermInField));
        }
    }
    if let Some(title) = record.get("title") {
        let title = title.to_lowercase();
        if TITLE_TERMS.iter().any(|t| title.contains(t)) {
            annotations.push(Annotation::defect("title", DefectCode::ErroneousTermInField));
        }
    }
    annotations
}

fn html_tags(record: &Record) -> Vec<Annotation> {
    values(record, TEXT_FIELDS)
        .filter(|(_, v)| HTML_TAGS.is_match(v))
        .map(|(k, _)| Annotation::defect(k, DefectCode::HtmlTags))
        .collect()
}

fn html_chars(record: &Record) -> Vec<Annotation> {
    values(record, TEXT_FIELDS)
        .filter(|(_, v)| HTML_CHARS.is_match(v))
        .map(|(k, _)| Annotation::defect(k, DefectCode::HtmlChars))
        .collect()
}

fn name_format_separators(record: &Record) -> Vec<Annotation> {
    values(record, NAME_FIELDS)
        .filter(|(_, v)| {
            v.chars().count() < 5
                || split_names(v).any(|name| {
                    !NAME_FORMAT.is_match(name) || name.chars().filter(|c| c.is_uppercase()).count() < 2
                })
        })
        .map(|(k, _)| Annotation::defect(k, DefectCode::NameFormatSeparators))
        .collect()
}

fn name_format_titles(record: &Record) -> Vec<Annotation> {
    values(record, NAME_FIELDS)
        .filter(|(_, v)| {
            split_names(v).any(|name| {
                name.split(|c: char| c.is_whitespace() || c == '.' || c == ',' || c == '-')
                    .any(|token| matches!(token, "Dr" | "PhD" | "Prof" | "Dipl"))
            })
        })
        .map(|(k, _)| Annotation::defect(k, DefectCode::NameFormatTitles))
        .collect()
}

fn name_particles(record: &Record) -> Vec<Annotation> {
    values(record, NAME_FIELDS)
        .filter(|(_, v)| {
            split_names(v).any(|name| {
                ["von", "vom"].iter().any(|p| {
                    name.starts_with(&format!("{} ", p)) || name.ends_with(&format!(" {}", p))
                })
            })
        })
        .map(|(k, _)| Annotation::defect(k, DefectCode::NameParticles))
        .collect()
}

fn name_abbreviated(record: &Record) -> Vec<Annotation> {
    values(record, NAME_FIELDS)
        .filter(|(_, v)| {
            let v = v.trim_end();
            v.ends_with("and others") || v.ends_with("et al") || v.ends_with("et al.") || v.ends_with("...")
        })
        .map(|(k, _)| Annotation::defect(k, DefectCode::NameAbbreviated))
        .collect()
}

fn incomplete_field(record: &Record) -> Vec<Annotation> {
    values(record, &["title", "journal", "booktitle", "author"])
        .filter(|(k, v)| {
            let v = v.trim_end();
            let truncated = v.ends_with("...") || v.ends_with('…');
            let incomplete_author = *k == "author"
                && (v.ends_with("and others") || v.ends_with("et al.") || v.ends_with(',') || v.ends_with(", and"));
            truncated || incomplete_author
        })
        .map(|(k, _)| Annotation::defect(k, DefectCode::IncompleteField))
        .collect()
}

fn identical_title_container(record: &Record) -> Vec<Annotation> {
    let Some(title) = record.get_known("title") else {
        return Vec::new();
    };
    let title = title.to_lowercase();
    let identical = values(record, CONTAINER_FIELDS).any(|(_, v)| v.to_lowercase() == title);
    if identical {
        vec![Annotation::defect("title", DefectCode::IdenticalValuesBetweenTitleAndContainer)]
    } else {
        Vec::new()
    }
}

fn inconsistent_content(record: &Record) -> Vec<Annotation> {
    let mut annotations = Vec::new();
    if let Some(journal) = record.get_known("journal") {
        let journal = journal.to_lowercase();
        if journal.contains("conference") || journal.contains("workshop") {
            annotations.push(Annotation::defect("journal", DefectCode::InconsistentContent));
        }
    }
    if let Some(booktitle) = record.get_known("booktitle") {
        if booktitle.to_lowercase().contains("journal") {
            annotations.push(Annotation::defect("booktitle", DefectCode::InconsistentContent));
        }
    }
    annotations
}

fn inconsistent_with_entrytype(record: &Record) -> Vec<Annotation> {
    record
        .entrytype()
        .inconsistent_fields()
        .iter()
        .filter(|k| record.contains(k))
        .map(|k| Annotation::defect(k, DefectCode::InconsistentWithEntrytype))
        .collect()
}

fn doi_pattern(record: &Record) -> Vec<Annotation> {
    match record.get_known("doi") {
        Some(doi) if !DOI.is_match(doi) => vec![Annotation::defect("doi", DefectCode::DoiNotMatchingPattern)],
        _ => Vec::new(),
    }
}

fn isbn_pattern(record: &Record) -> Vec<Annotation> {
    let Some(isbn) = record.get_known("isbn") else {
        return Vec::new();
    };
    let invalid = isbn.split(';').any(|candidate| {
        let compact: String = candidate
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect::<String>()
            .to_uppercase();
        !(ISBN_10.is_match(&compact) || ISBN_13.is_match(&compact))
    });
    if invalid {
        vec![Annotation::defect("isbn", DefectCode::IsbnNotMatchingPattern)]
    } else {
        Vec::new()
    }
}

fn page_range(record: &Record) -> Vec<Annotation> {
    let Some(pages) = record.get_known("pages") else {
        return Vec::new();
    };
    let Some(captures) = PAGE_RANGE.captures(pages) else {
        return Vec::new();
    };
    let start = captures[1].parse::<u64>().unwrap_or(0);
    let end = captures[2].parse::<u64>().unwrap_or(u64::MAX);
    if start > end {
        vec![Annotation::defect("pages", DefectCode::PageRange)]
    } else {
        Vec::new()
    }
}

fn year_format(record: &Record) -> Vec<Annotation> {
    match record.get_known("year") {
        Some(year) if year != "forthcoming" && !YEAR.is_match(year) => {
            vec![Annotation::defect("year", DefectCode::YearFormat)]
        }
        _ => Vec::new(),
    }
}

fn thesis_with_multiple_authors(record: &Record) -> Vec<Annotation> {
    match record.get("author") {
        Some(author) if record.entrytype().is_thesis() && author.contains(" and ") => {
            vec![Annotation::defect("author", DefectCode::ThesisWithMultipleAuthors)]
        }
        _ => Vec::new(),
    }
}

fn language_format(record: &Record) -> Vec<Annotation> {
    match record.get("language") {
        Some(language) if !is_iso639_3(language) => {
            vec![Annotation::defect("language", DefectCode::LanguageFormatError)]
        }
        _ => Vec::new(),
    }
}
