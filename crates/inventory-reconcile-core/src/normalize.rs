//! Canonical forms of freeform human names.
//!
//! A [`NormalizedName`] is a sequence of uppercase ASCII words with
//! diacritics and punctuation stripped. It is a pure function of its input:
//! equal raw strings always produce equal normalized names, and normalizing
//! the string form of a normalized name yields the same name again.

use std::fmt;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NormalizedName {
    tokens: Vec<String>,
}

impl NormalizedName {
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Tokens joined by single spaces. This is the key used by the
    /// identity index.
    pub fn key(&self) -> String {
        self.tokens.join(" ")
    }

    /// The same tokens in reverse order ("PEREZ JUAN" for "JUAN PEREZ").
    pub fn reversed(&self) -> NormalizedName {
        NormalizedName {
            tokens: self.tokens.iter().rev().cloned().collect(),
        }
    }

    /// Tokens long enough to be indexed individually.
    pub fn significant_tokens(&self) -> impl Iterator<Item = &str> {
        self.tokens
            .iter()
            .map(String::as_str)
            .filter(|t| t.len() > MIN_SIGNIFICANT_TOKEN_LEN)
    }
}

impl fmt::Display for NormalizedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Tokens of this length or shorter ("DE", "LA", initials) are not indexed.
pub const MIN_SIGNIFICANT_TOKEN_LEN: usize = 2;

/// Normalize a raw name: strip diacritics, drop everything that is not an
/// ASCII letter or whitespace, uppercase, split on whitespace.
pub fn normalize(raw: &str) -> NormalizedName {
    let cleaned: String = fold_accents(raw)
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    NormalizedName {
        tokens: cleaned.split_whitespace().map(str::to_string).collect(),
    }
}

/// Decompose and drop combining marks: "Categoría" becomes "Categoria".
/// Everything else, case included, is kept.
pub fn fold_accents(raw: &str) -> String {
    raw.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// [`normalize`] for optional cells. Absent input is an empty name.
pub fn normalize_opt(raw: Option<&str>) -> NormalizedName {
    raw.map(normalize).unwrap_or_default()
}

/// Fixed four-slot decomposition of a name used for weighted comparison.
///
/// Spreadsheet names are usually written as given names followed by two
/// surnames, so the slots are filled as follows:
///
/// | tokens | first1 | first2 | last1 | last2 |
/// |--------|--------|--------|-------|-------|
/// | 0      |        |        |       |       |
/// | 1      | t0     |        |       |       |
/// | 2      | t0     |        | t1    |       |
/// | 3      | t0     |        | t1    | t2    |
/// | ≥4     | t0     | t1     | t2    | t3    |
///
/// Tokens past the fourth are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamePartition {
    pub first1: String,
    pub first2: String,
    pub last1: String,
    pub last2: String,
}

impl NamePartition {
    pub fn from_normalized(name: &NormalizedName) -> Self {
        let t = name.tokens();
        let get = |i: usize| t.get(i).cloned().unwrap_or_default();
        match t.len() {
            0 => NamePartition::default(),
            1 => NamePartition {
                first1: get(0),
                ..Default::default()
            },
            2 => NamePartition {
                first1: get(0),
                last1: get(1),
                ..Default::default()
            },
            3 => NamePartition {
                first1: get(0),
                last1: get(1),
                last2: get(2),
                ..Default::default()
            },
            _ => NamePartition {
                first1: get(0),
                first2: get(1),
                last1: get(2),
                last2: get(3),
            },
        }
    }
}

pub fn partition(raw: &str) -> NamePartition {
    NamePartition::from_normalized(&normalize(raw))
}
