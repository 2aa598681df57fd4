//! ISO 639-3 language codes
//!
//! Covers the individual languages that occur in bibliographic metadata
//! feeds; macrolanguage codes are included where feeds use them (`zho`, `ara`,
//! `msa`, `fas`).

use once_cell::sync::Lazy;
use std::collections::HashSet;

const CODES: &[&str] = &[
    "afr", "amh", "ara", "arg", "asm", "aze", "bak", "bel", "ben", "bod", "bos", "bre", "bul",
    "cat", "ces", "cha", "che", "chv", "cor", "cos", "cym", "dan", "deu", "div", "dzo", "ell",
    "eng", "epo", "est", "eus", "fao", "fas", "fij", "fil", "fin", "fra", "fry", "ful", "gla",
    "gle", "glg", "grn", "guj", "hat", "hau", "haw", "heb", "hin", "hrv", "hun", "hye", "ibo",
    "ind", "isl", "ita", "jav", "jpn", "kal", "kan", "kat", "kaz", "khm", "kin", "kir", "kor",
    "kur", "lao", "lat", "lav", "lin", "lit", "ltz", "lug", "mal", "mar", "mkd", "mlg", "mlt",
    "mon", "mri", "msa", "mya", "nep", "nld", "nno", "nob", "nor", "nya", "oci", "ori", "orm",
    "pan", "pol", "por", "pus", "que", "roh", "ron", "run", "rus", "san", "sin", "slk", "slv",
    "sme", "smo", "sna", "snd", "som", "sot", "spa", "sqi", "srd", "srp", "ssw", "sun", "swa",
    "swe", "tah", "tam", "tat", "tel", "tgk", "tgl", "tha", "tir", "ton", "tsn", "tso", "tuk",
    "tur", "uig", "ukr", "urd", "uzb", "vie", "vol", "wln", "wol", "xho", "yid", "yor", "zho",
    "zul",
];

static CODE_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| CODES.iter().copied().collect());

/// Whether `code` is a known ISO 639-3 code (exact, lowercase)
pub fn is_iso639_3(code: &str) -> bool {
    CODE_SET.contains(code)
}
