//! Field cleansing for spreadsheet rows: inventory codes, free text, dates,
//! currency values, and category labels.
//!
//! Nothing here fails a row except a missing or non-numeric inventory
//! code. Dates and values fall back to defaults; categories fall back to
//! the configured default label.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;

use crate::error::{LedgerError, LedgerResult};
use crate::normalize::normalize;

/// Day-first formats tried in order. Two-digit years go first: `%Y`
/// happily reads "99" as the year 99.
const DATE_FORMATS: &[&str] = &[
    "%d/%m/%y", "%d-%m-%y", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d",
];

/// Trim a cell; blank cells become `None`.
pub fn clean_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A valid inventory code is a non-empty run of ASCII digits.
pub fn inventory_code(raw: Option<&str>) -> Option<String> {
    let code = raw?.trim();
    if !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) {
        Some(code.to_string())
    } else {
        None
    }
}

/// Parse a received-date cell, day first. Spreadsheet exports with a time
/// part ("2023-05-01 00:00:00") and Excel serial day numbers are accepted.
/// Returns `None` when nothing parses.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed
        .split(|c: char| c.is_whitespace() || c == 'T')
        .next()
        .unwrap_or_default();
    if date_part.is_empty() {
        return None;
    }

    if let Some(d) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
    {
        return Some(d);
    }

    excel_serial(date_part)
}

/// Excel stores dates as days since 1899-12-30, with the time of day as a
/// fraction. Only the plausible range (1950..2100) is accepted so that
/// stray numbers are not taken as dates.
fn excel_serial(s: &str) -> Option<NaiveDate> {
    let whole = match s.split_once('.') {
        Some((whole, fraction)) if fraction.bytes().all(|b| b.is_ascii_digit()) => whole,
        Some(_) => return None,
        None => s,
    };
    let days: u64 = whole.parse().ok()?;
    if !(18_264..=73_051).contains(&days) {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(days))
}

/// [`parse_date`] with a fallback. The flag is `true` when the fallback
/// was used.
pub fn parse_date_or(raw: Option<&str>, fallback: NaiveDate) -> (NaiveDate, bool) {
    match raw.and_then(parse_date) {
        Some(d) => (d, false),
        None => (fallback, true),
    }
}

/// Parse a currency cell by keeping only digits and the decimal point.
/// Anything that still does not parse is zero.
pub fn parse_value(raw: Option<&str>) -> Decimal {
    let kept: String = raw
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if kept.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(&kept).unwrap_or(Decimal::ZERO)
}

/// Label → id mapping for inventory categories, supplied by configuration.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    ids: HashMap<String, i64>,
    default_label: String,
    minor_label: String,
    major_label: String,
}

impl CategoryTable {
    /// `default`, `minor` and `major` must all be present in `ids`.
    pub fn new<I, S>(ids: I, default: &str, minor: &str, major: &str) -> LedgerResult<Self>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: AsRef<str>,
    {
        let ids: HashMap<String, i64> = ids
            .into_iter()
            .map(|(label, id)| (normalize(label.as_ref()).key(), id))
            .collect();

        for label in [default, minor, major] {
            if !ids.contains_key(&normalize(label).key()) {
                return Err(LedgerError::validation(format!(
                    "category label '{}' has no id",
                    label
                )));
            }
        }

        Ok(Self {
            ids,
            default_label: default.to_string(),
            minor_label: minor.to_string(),
            major_label: major.to_string(),
        })
    }

    pub fn id_of(&self, label: &str) -> Option<i64> {
        self.ids.get(&normalize(label).key()).copied()
    }

    pub fn default_id(&self) -> i64 {
        self.label_id(&self.default_label)
    }

    fn label_id(&self, label: &str) -> i64 {
        // Presence is checked in `new`.
        self.id_of(label).unwrap_or_default()
    }

    /// Category of a row from its label cell, falling back to the default.
    pub fn from_label(&self, label: Option<&str>) -> i64 {
        label
            .and_then(|l| self.id_of(l))
            .unwrap_or_else(|| self.default_id())
    }

    /// Category inferred from the file name, used when the sheet has no
    /// category column at all.
    pub fn from_file_name(&self, file_name: &str) -> i64 {
        let lower = file_name.to_lowercase();
        if lower.contains(&self.minor_label.to_lowercase()) {
            self.label_id(&self.minor_label)
        } else if lower.contains(&self.major_label.to_lowercase()) {
            self.label_id(&self.major_label)
        } else {
            self.default_id()
        }
    }

    /// Every label known to the table, with its id (normalized keys).
    pub fn entries(&self) -> impl Iterator<Item = (&str, i64)> {
        self.ids.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CategoryTable {
        CategoryTable::new(
            [("Menores", 1), ("Mayores", 2), ("Intangible", 3)],
            "Intangible",
            "Menores",
            "Mayores",
        )
        .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn inventory_codes_must_be_numeric() {
        assert_eq!(inventory_code(Some(" 004512 ")), Some("004512".to_string()));
        assert_eq!(inventory_code(Some("45-12")), None);
        assert_eq!(inventory_code(Some("ABC")), None);
        assert_eq!(inventory_code(Some("  ")), None);
        assert_eq!(inventory_code(None), None);
    }

    #[test]
    fn dates_are_day_first() {
        assert_eq!(parse_date("03/04/2021"), Some(date(2021, 4, 3)));
        assert_eq!(parse_date("3-4-2021"), Some(date(2021, 4, 3)));
        assert_eq!(parse_date("2021-04-03 00:00:00"), Some(date(2021, 4, 3)));
        assert_eq!(parse_date("2021-04-03T10:00:00"), Some(date(2021, 4, 3)));
        assert_eq!(parse_date("31/12/99"), Some(date(1999, 12, 31)));
        assert_eq!(parse_date("44927"), Some(date(2023, 1, 1)));
        assert_eq!(parse_date("44927.75"), Some(date(2023, 1, 1)));
        assert_eq!(parse_date("44927.x"), None);
    }

    #[test]
    fn unparseable_dates_fall_back() {
        let sentinel = date(2000, 1, 1);
        assert_eq!(parse_date("ayer"), None);
        assert_eq!(parse_date("31/02/2021"), None);
        assert_eq!(parse_date("7"), None);
        assert_eq!(parse_date_or(Some("sin fecha"), sentinel), (sentinel, true));
        assert_eq!(parse_date_or(None, sentinel), (sentinel, true));
        assert_eq!(
            parse_date_or(Some("01/02/2003"), sentinel),
            (date(2003, 2, 1), false)
        );
    }

    #[test]
    fn currency_values() {
        assert_eq!(parse_value(Some("$1,234.56")), Decimal::new(123456, 2));
        assert_eq!(parse_value(Some(" 980 ")), Decimal::new(980, 0));
        assert_eq!(parse_value(Some("-15.5")), Decimal::new(155, 1));
        assert_eq!(parse_value(Some("n/a")), Decimal::ZERO);
        assert_eq!(parse_value(Some("1.2.3")), Decimal::ZERO);
        assert_eq!(parse_value(None), Decimal::ZERO);
    }

    #[test]
    fn category_labels_ignore_case_and_accents() {
        let t = table();
        assert_eq!(t.from_label(Some("mayores")), 2);
        assert_eq!(t.from_label(Some(" MENORES ")), 1);
        assert_eq!(t.from_label(Some("Intangíble")), 3);
        assert_eq!(t.from_label(Some("Vehículos")), 3);
        assert_eq!(t.from_label(None), 3);
    }

    #[test]
    fn category_from_file_name() {
        let t = table();
        assert_eq!(t.from_file_name("Activos_Mayores_2023.csv"), 2);
        assert_eq!(t.from_file_name("activos menores.csv"), 1);
        assert_eq!(t.from_file_name("inventario.csv"), 3);
    }

    #[test]
    fn table_requires_known_labels() {
        let err = CategoryTable::new([("Menores", 1)], "Intangible", "Menores", "Mayores")
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn clean_text_trims() {
        assert_eq!(clean_text(Some("  Dell ")), Some("Dell".to_string()));
        assert_eq!(clean_text(Some("   ")), None);
        assert_eq!(clean_text(None), None);
    }
}
