//! OOXML workbook reading: the first worksheet of an `.xlsx` file as a
//! grid of text cells.
//!
//! Only what an inventory export needs is understood: shared strings,
//! inline strings and literal values. Numbers come back in their stored
//! form, so a date cell yields its Excel serial (`"44635"`), which the
//! cleansing stage already accepts. Formatting, formulas and every sheet
//! after the first are ignored.

use std::io::{Cursor, Read};

use anyhow::{anyhow, bail, Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::ZipArchive;

use crate::sheet::GridRow;

/// Maximum cells to read from the sheet (avoids unbounded memory).
const MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Column XFD.
const MAX_COLUMNS: usize = 16_384;

const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const WORKSHEET_PREFIX: &str = "xl/worksheets/sheet";

type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

/// Rows of the first worksheet that hold at least one non-blank cell,
/// in sheet order.
pub fn read_first_sheet(bytes: &[u8]) -> Result<Vec<GridRow>> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).context("not an xlsx workbook (zip archive)")?;

    let shared = if archive.file_names().any(|n| n == SHARED_STRINGS) {
        let xml = read_zip_entry_bounded(&mut archive, SHARED_STRINGS, MAX_XML_ENTRY_BYTES)?;
        read_shared_strings(&xml)?
    } else {
        Vec::new()
    };

    let sheet =
        first_worksheet_name(&archive).ok_or_else(|| anyhow!("workbook has no worksheets"))?;
    let xml = read_zip_entry_bounded(&mut archive, &sheet, MAX_XML_ENTRY_BYTES)?;
    sheet_rows(&xml, &shared)
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .with_context(|| format!("missing entry {}", name))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .with_context(|| format!("reading {}", name))?;
    if out.len() as u64 >= max_bytes {
        bail!("ZIP entry {} exceeds size limit ({} bytes)", name, max_bytes);
    }
    Ok(out)
}

/// `xl/worksheets/sheetN.xml` with the smallest N.
fn first_worksheet_name(archive: &Archive<'_>) -> Option<String> {
    archive
        .file_names()
        .filter(|n| n.starts_with(WORKSHEET_PREFIX) && n.ends_with(".xml"))
        .min_by_key(|n| {
            n.trim_start_matches(WORKSHEET_PREFIX)
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX)
        })
        .map(str::to_string)
}

/// Each `<si>` becomes one string: the concatenation of its `<t>` runs.
/// Phonetic guides (`<rPh>`) are skipped.
fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_phonetic = true,
                b"t" => in_text = current.is_some() && !in_phonetic,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(te) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape()?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                b"si" => strings.push(current.take().unwrap_or_default()),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

enum CellKind {
    Shared,
    Literal,
}

struct PendingCell {
    column: usize,
    kind: CellKind,
    text: String,
}

impl PendingCell {
    fn open(e: &BytesStart<'_>, next_column: usize) -> Result<Self> {
        let column = match attribute(e, b"r")? {
            Some(r) => column_index(&r).ok_or_else(|| anyhow!("bad cell reference '{}'", r))?,
            None => next_column,
        };
        if column >= MAX_COLUMNS {
            bail!("cell column {} is beyond the last sheet column", column + 1);
        }
        let kind = match attribute(e, b"t")?.as_deref() {
            Some("s") => CellKind::Shared,
            _ => CellKind::Literal,
        };
        Ok(PendingCell {
            column,
            kind,
            text: String::new(),
        })
    }

    fn place(self, row: &mut GridRow, shared: &[String]) {
        let value = match self.kind {
            CellKind::Shared => self
                .text
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| shared.get(i))
                .cloned()
                .unwrap_or_default(),
            CellKind::Literal => self.text,
        };
        if row.cells.len() <= self.column {
            row.cells.resize(self.column + 1, String::new());
        }
        row.cells[self.column] = value;
    }
}

fn sheet_rows(xml: &[u8], shared: &[String]) -> Result<Vec<GridRow>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows = Vec::new();
    let mut row: Option<GridRow> = None;
    let mut cell: Option<PendingCell> = None;
    let mut last_line = 0usize;
    let mut in_value = false;
    let mut cell_count = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    last_line = row_number(&e)?.unwrap_or(last_line + 1);
                    row = Some(GridRow {
                        line: last_line,
                        cells: Vec::new(),
                    });
                }
                b"c" => {
                    let next_column = row.as_ref().map_or(0, |r| r.cells.len());
                    cell = Some(PendingCell::open(&e, next_column)?);
                }
                // `<v>` holds stored values, `<is><t>` inline strings.
                b"v" | b"t" => in_value = cell.is_some(),
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                last_line = row_number(&e)?.unwrap_or(last_line + 1);
            }
            Event::Text(te) if in_value => {
                if let Some(c) = cell.as_mut() {
                    c.text.push_str(&te.unescape()?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let (Some(c), Some(r)) = (cell.take(), row.as_mut()) {
                        cell_count += 1;
                        if cell_count > MAX_CELLS_PER_SHEET {
                            bail!("sheet has more than {} cells", MAX_CELLS_PER_SHEET);
                        }
                        c.place(r, shared);
                    }
                }
                b"row" => {
                    if let Some(r) = row.take() {
                        if r.cells.iter().any(|c| !c.trim().is_empty()) {
                            rows.push(r);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

fn row_number(e: &BytesStart<'_>) -> Result<Option<usize>> {
    Ok(attribute(e, b"r")?.and_then(|r| r.parse().ok()))
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Zero-based column of an A1-style reference: `"A7"` is 0, `"AB12"` is 27.
fn column_index(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let column = letters
        .iter()
        .fold(0usize, |acc, b| acc * 26 + usize::from(b - b'A' + 1));
    Some(column - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_map_to_indices() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("I4"), Some(8));
        assert_eq!(column_index("AB12"), Some(27));
        assert_eq!(column_index("XFD1"), Some(16_383));
        assert_eq!(column_index("12"), None);
    }

    #[test]
    fn shared_strings_join_runs_and_skip_phonetics() {
        let xml = r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<si><t>Portátil</t></si>
<si><r><t>Juan </t></r><r><t>Pérez</t></r><rPh><t>ふりがな</t></rPh></si>
<si/>
<si><t>A &amp; B</t></si>
</sst>"#
            .as_bytes();
        let strings = read_shared_strings(xml).unwrap();
        assert_eq!(strings, vec!["Portátil", "Juan Pérez", "", "A & B"]);
    }

    #[test]
    fn sparse_cells_land_in_their_columns() {
        let xml = br#"<worksheet><sheetData>
<row r="2"><c r="A2" t="s"><v>0</v></c><c r="C2"><v>44635</v></c></row>
<row r="3"><c r="B3" t="inlineStr"><is><t>Silla</t></is></c></row>
<row r="4"><c r="A4" t="s"><v>9</v></c></row>
<row r="5"/>
</sheetData></worksheet>"#;
        let rows = sheet_rows(xml, &["Portátil".to_string()]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].cells, vec!["Portátil", "", "44635"]);
        assert_eq!(rows[1].line, 3);
        assert_eq!(rows[1].cells, vec!["", "Silla"]);
    }

    #[test]
    fn garbage_is_not_a_workbook() {
        assert!(read_first_sheet(b"PK\x03\x04").is_err());
        assert!(read_first_sheet(b"Inventario,Descripcion\n").is_err());
    }
}
