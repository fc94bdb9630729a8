//! Spreadsheet boundary: CSV or `.xlsx` bytes in, an [`ImportBatch`] out.
//!
//! Inventory exports carry a title block above the column headers. The
//! header is the `header_row`-th non-blank row (1-based); rows whose cells
//! are all empty do not count and are never imported, matching how the
//! export tools lay the sheet out. Workbooks are read from their first
//! worksheet (see [`crate::workbook`]).
//!
//! Header cells are matched by [`column_key`] (accents stripped,
//! lowercased, whitespace runs to `_`), so `"Descripción"` and
//! `"FUNCIONARIO QUE RECIBE"` become `descripcion` and
//! `funcionario_que_recibe`. Unknown columns are ignored.

use std::collections::HashMap;
use std::path::Path;

use sha2::{Digest, Sha256};

use inventory_reconcile_core::error::{LedgerError, LedgerResult};
use inventory_reconcile_core::models::{ImportBatch, RawRow};
use inventory_reconcile_core::normalize::fold_accents;

use crate::workbook;

pub const COL_CODE: &str = "inventario";
pub const COL_DESCRIPTION: &str = "descripcion";
pub const COL_BRAND: &str = "marca";
pub const COL_VALUE: &str = "valor";
pub const COL_DATE: &str = "fecha_recibido";
pub const COL_CATEGORY: &str = "categoria";
pub const COL_LOCATION: &str = "ubicacion";
pub const COL_DELIVERED_BY: &str = "funcionario_que_entrega";
pub const COL_RECEIVED_BY: &str = "funcionario_que_recibe";

const REQUIRED: &[&str] = &[COL_CODE, COL_RECEIVED_BY];

/// A sheet read from disk, with the digest of its exact bytes.
#[derive(Debug)]
pub struct LoadedSheet {
    pub batch: ImportBatch,
    pub sha256: String,
}

/// One sheet row as text cells indexed by column. `line` is the CSV line
/// or the worksheet row number, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    pub line: usize,
    pub cells: Vec<String>,
}

impl GridRow {
    fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }
}

/// Normalized key of a header cell.
pub fn column_key(header: &str) -> String {
    fold_accents(header)
        .to_lowercase()
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Read and parse the file at `path`: `.xlsx` as a workbook, anything
/// else as CSV.
pub fn load_sheet(path: &Path, header_row: usize) -> LedgerResult<LoadedSheet> {
    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| LedgerError::validation(format!("{} is not a file", path.display())))?;

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if ext == "xls" {
        return Err(LedgerError::validation(format!(
            "{}: legacy .xls workbooks are not read; save the sheet as .xlsx or CSV",
            source_name
        )));
    }

    let bytes = std::fs::read(path).map_err(|e| {
        LedgerError::validation(format!("cannot read {}: {}", path.display(), e))
    })?;

    let sha256 = format!("{:x}", Sha256::digest(&bytes));
    let batch = if ext == "xlsx" {
        parse_workbook(&bytes, &source_name, header_row)?
    } else {
        parse_sheet(&bytes, &source_name, header_row)?
    };
    Ok(LoadedSheet { batch, sha256 })
}

/// Parse CSV `bytes` named `source_name`.
pub fn parse_sheet(
    bytes: &[u8],
    source_name: &str,
    header_row: usize,
) -> LedgerResult<ImportBatch> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for (index, record) in reader.byte_records().enumerate() {
        let record = record.map_err(|e| {
            LedgerError::validation(format!("{}: malformed CSV: {}", source_name, e))
        })?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(index + 1);
        rows.push(GridRow {
            line,
            cells: record.iter().map(decode_cell).collect(),
        });
    }

    batch_from_grid(rows, source_name, header_row)
}

/// Parse the first worksheet of `.xlsx` `bytes` named `source_name`.
pub fn parse_workbook(
    bytes: &[u8],
    source_name: &str,
    header_row: usize,
) -> LedgerResult<ImportBatch> {
    let rows = workbook::read_first_sheet(bytes).map_err(|e| {
        LedgerError::validation(format!("{}: unreadable workbook: {:#}", source_name, e))
    })?;
    batch_from_grid(rows, source_name, header_row)
}

fn batch_from_grid(
    rows: Vec<GridRow>,
    source_name: &str,
    header_row: usize,
) -> LedgerResult<ImportBatch> {
    if header_row == 0 {
        return Err(LedgerError::validation("header row is 1-based"));
    }

    let mut rows = rows.into_iter().filter(|r| !r.is_blank());
    let header = rows.nth(header_row - 1).ok_or_else(|| {
        LedgerError::validation(format!(
            "{}: no header found at row {}",
            source_name, header_row
        ))
    })?;
    let columns = header_columns(&header.cells, source_name)?;

    Ok(ImportBatch {
        source_name: source_name.to_string(),
        has_category_column: columns.contains_key(COL_CATEGORY),
        rows: rows.map(|row| raw_row(&columns, &row)).collect(),
    })
}

fn raw_row(columns: &HashMap<String, usize>, row: &GridRow) -> RawRow {
    let cell = |name: &str| -> Option<String> {
        columns
            .get(name)
            .and_then(|&i| row.cells.get(i))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    RawRow {
        line: row.line,
        inventory_code: cell(COL_CODE),
        description: cell(COL_DESCRIPTION),
        brand: cell(COL_BRAND),
        value: cell(COL_VALUE),
        received_date: cell(COL_DATE),
        category: cell(COL_CATEGORY),
        location: cell(COL_LOCATION),
        delivered_by: cell(COL_DELIVERED_BY),
        received_by: cell(COL_RECEIVED_BY),
    }
}

fn header_columns(cells: &[String], source_name: &str) -> LedgerResult<HashMap<String, usize>> {
    let mut columns = HashMap::new();
    for (i, cell) in cells.iter().enumerate() {
        let key = column_key(cell);
        if !key.is_empty() {
            // First occurrence wins for repeated headers.
            columns.entry(key).or_insert(i);
        }
    }

    let missing: Vec<&str> = REQUIRED
        .iter()
        .copied()
        .filter(|c| !columns.contains_key(*c))
        .collect();
    if !missing.is_empty() {
        return Err(LedgerError::validation(format!(
            "{}: missing required column(s): {}",
            source_name,
            missing.join(", ")
        )));
    }
    Ok(columns)
}

/// Cells are UTF-8 when the exporter behaves; Windows exports are often
/// Latin-1, which maps byte for byte onto the first 256 code points.
fn decode_cell(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.trim().to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect::<String>().trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const SHEET: &str = "\
INSTITUCION EDUCATIVA,,,
Inventario de activos,,,

Responsable,,,
Inventario,Descripción,Valor,Categoría,Ubicación,FUNCIONARIO QUE ENTREGA,FUNCIONARIO QUE RECIBE,Otra
1001,Portátil, $1.200 ,Mayores,Sala 1,Laura Gómez,Juan Pérez,x
TOTAL,,,,,,,
1002,Silla,,, ,,Juan Perez
";

    #[test]
    fn header_keys_are_normalized() {
        assert_eq!(column_key(" Descripción "), "descripcion");
        assert_eq!(column_key("FUNCIONARIO QUE RECIBE"), "funcionario_que_recibe");
        assert_eq!(column_key("Fecha  Recibido"), "fecha_recibido");
        assert_eq!(column_key("Categoría"), "categoria");
    }

    #[test]
    fn underscores_and_digits_survive_in_header_keys() {
        assert_eq!(column_key("fecha_recibido"), "fecha_recibido");
        assert_eq!(column_key("FUNCIONARIO_QUE_RECIBE"), "funcionario_que_recibe");
        assert_eq!(column_key("Valor 2024 ($)"), "valor_2024");

        let batch = parse_sheet(
            b"inventario,fecha_recibido,funcionario_que_recibe\n7,15/03/2022,Ana\n",
            "x.csv",
            1,
        )
        .unwrap();
        assert_eq!(batch.rows[0].received_date.as_deref(), Some("15/03/2022"));
    }

    #[test]
    fn blank_rows_neither_count_nor_import() {
        let csv = "Titulo,,\n,,\nInventario,Funcionario que recibe\n,,\n5,Ana\n, ,\n";
        let batch = parse_sheet(csv.as_bytes(), "x.csv", 2).unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0].line, 5);
        assert_eq!(batch.rows[0].inventory_code.as_deref(), Some("5"));
    }

    #[test]
    fn skips_title_block_and_maps_columns() {
        let batch = parse_sheet(SHEET.as_bytes(), "activos.csv", 4).unwrap();
        assert_eq!(batch.source_name, "activos.csv");
        assert!(batch.has_category_column);
        assert_eq!(batch.rows.len(), 3);

        let first = &batch.rows[0];
        assert_eq!(first.line, 6);
        assert_eq!(first.inventory_code.as_deref(), Some("1001"));
        assert_eq!(first.description.as_deref(), Some("Portátil"));
        assert_eq!(first.value.as_deref(), Some("$1.200"));
        assert_eq!(first.location.as_deref(), Some("Sala 1"));
        assert_eq!(first.received_by.as_deref(), Some("Juan Pérez"));
        assert_eq!(first.brand, None);

        // Short rows and blank cells become None.
        let last = &batch.rows[2];
        assert_eq!(last.location, None);
        assert_eq!(last.received_by.as_deref(), Some("Juan Perez"));
    }

    #[test]
    fn missing_required_columns_fail() {
        let err = parse_sheet(b"Inventario,Marca\n1,Dell\n", "x.csv", 1).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("funcionario_que_recibe"));
    }

    #[test]
    fn no_header_row_fails() {
        let err = parse_sheet(b"a,b\n", "x.csv", 8).unwrap_err();
        assert!(err.to_string().contains("no header"));
    }

    #[test]
    fn category_column_presence_is_reported() {
        let batch = parse_sheet(
            b"Inventario,Funcionario que recibe\n1,Ana\n",
            "Activos Menores.csv",
            1,
        )
        .unwrap();
        assert!(!batch.has_category_column);
    }

    #[test]
    fn latin1_cells_decode() {
        let mut bytes = b"Inventario,Descripci".to_vec();
        bytes.push(0xF3);
        bytes.extend_from_slice(b"n,Funcionario que recibe\n1,Cami");
        bytes.push(0xF3);
        bytes.extend_from_slice(b"n,Ana\n");
        let batch = parse_sheet(&bytes, "x.csv", 1).unwrap();
        assert_eq!(batch.rows[0].description.as_deref(), Some("Camión"));
    }

    /// Minimal workbook: shared strings plus one worksheet.
    fn xlsx(shared: &[&str], sheet_data: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let items: String = shared
                .iter()
                .map(|s| format!("<si><t>{}</t></si>", s))
                .collect();
            zip.start_file("xl/sharedStrings.xml", SimpleFileOptions::default()).unwrap();
            zip.write_all(format!("<sst>{}</sst>", items).as_bytes())
                .unwrap();
            zip.start_file("xl/worksheets/sheet1.xml", SimpleFileOptions::default()).unwrap();
            zip.write_all(
                format!("<worksheet><sheetData>{}</sheetData></worksheet>", sheet_data).as_bytes(),
            )
            .unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    fn activos_xlsx() -> Vec<u8> {
        xlsx(
            &[
                "INSTITUCION EDUCATIVA",
                "Inventario",
                "Descripción",
                "Fecha Recibido",
                "FUNCIONARIO QUE RECIBE",
                "Portátil",
            ],
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>
<row r="3"><c r="A3" t="s"><v>1</v></c><c r="B3" t="s"><v>2</v></c><c r="C3" t="s"><v>3</v></c><c r="D3" t="s"><v>4</v></c></row>
<row r="4"><c r="A4"><v>1001</v></c><c r="B4" t="s"><v>5</v></c><c r="C4"><v>44635</v></c><c r="D4" t="inlineStr"><is><t>Juan Pérez</t></is></c></row>
<row r="5"><c r="A5"><v>1002</v></c><c r="D5" t="inlineStr"><is><t>Laura Gómez</t></is></c></row>"#,
        )
    }

    #[test]
    fn workbook_rows_map_like_csv_rows() {
        let batch = parse_workbook(&activos_xlsx(), "activos.xlsx", 2).unwrap();
        assert!(!batch.has_category_column);
        assert_eq!(batch.rows.len(), 2);

        let first = &batch.rows[0];
        assert_eq!(first.line, 4);
        assert_eq!(first.inventory_code.as_deref(), Some("1001"));
        assert_eq!(first.description.as_deref(), Some("Portátil"));
        assert_eq!(first.received_date.as_deref(), Some("44635"));
        assert_eq!(first.received_by.as_deref(), Some("Juan Pérez"));

        let second = &batch.rows[1];
        assert_eq!(second.description, None);
        assert_eq!(second.received_by.as_deref(), Some("Laura Gómez"));
    }

    #[test]
    fn xlsx_files_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Activos Mayores.xlsx");
        std::fs::write(&path, activos_xlsx()).unwrap();
        let loaded = load_sheet(&path, 2).unwrap();
        assert_eq!(loaded.sha256.len(), 64);
        assert_eq!(loaded.batch.source_name, "Activos Mayores.xlsx");
        assert_eq!(loaded.batch.rows.len(), 2);
    }

    #[test]
    fn corrupt_and_legacy_workbooks_are_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["activos.xlsx", "activos.xls"] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"PK").unwrap();
            let err = load_sheet(&path, 8).unwrap_err();
            assert_eq!(err.kind(), "validation");
        }
    }

    #[test]
    fn missing_file_is_validation() {
        let err = load_sheet(Path::new("/nonexistent/activos.csv"), 8).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
