//! Excel workbooks (`.xls`, `.xlsx`) → CSV, Markdown or JSON.
//!
//! Every sheet is read with `calamine`, cleaned through [`Table::clean`]
//! and written in the batch's [`SpreadsheetFormat`]. Sheets that are empty
//! after cleaning produce nothing; a sheet that cannot be read is skipped
//! without failing its siblings.

use super::table::{Cell, Table};
use super::{Converter, OutputDir};
use crate::config::SpreadsheetFormat;
use crate::error::ConvertError;
use crate::output::{ConversionResult, InputFile, SkipReason};
use crate::pipeline::naming::{unique_output_name, unique_output_name_with_suffix};
use calamine::{Data, Reader};
use chrono::NaiveDate;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, warn};

/// ZIP local-file header: `.xlsx`.
const MAGIC_ZIP: &[u8] = b"PK\x03\x04";
/// OLE2 compound document: `.xls`.
const MAGIC_OLE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

pub struct SpreadsheetConverter {
    format: SpreadsheetFormat,
}

impl SpreadsheetConverter {
    pub fn new(format: SpreadsheetFormat) -> Self {
        Self { format }
    }
}

impl Converter for SpreadsheetConverter {
    fn name(&self) -> &'static str {
        "spreadsheet"
    }

    fn convert(&self, input: &InputFile, out: &OutputDir) -> ConversionResult {
        let sheets = match read_workbook(&input.path) {
            Ok(sheets) => sheets,
            Err(e) => return ConversionResult::Failed(e),
        };
        if sheets.is_empty() {
            info!("{}: no non-empty sheets, leaving in place", input.path.display());
            return ConversionResult::Skipped(SkipReason::EmptyDocument);
        }

        match self.write(input, out, &sheets) {
            Ok(paths) => ConversionResult::Success(paths),
            Err(e) => ConversionResult::Failed(ConvertError::io(&input.path, e)),
        }
    }
}

impl SpreadsheetConverter {
    fn write(
        &self,
        input: &InputFile,
        out: &OutputDir,
        sheets: &[(String, Table)],
    ) -> std::io::Result<Vec<std::path::PathBuf>> {
        match self.format {
            SpreadsheetFormat::Csv => sheets
                .iter()
                .map(|(name, table)| {
                    let file = unique_output_name_with_suffix(&input.path, name, "csv");
                    out.write_artifact(&file, &to_csv(table)?)
                })
                .collect(),
            SpreadsheetFormat::Markdown => {
                let file = unique_output_name(&input.path, "md");
                Ok(vec![out.write_artifact(&file, to_markdown(sheets).as_bytes())?])
            }
            SpreadsheetFormat::Json => {
                let file = unique_output_name(&input.path, "json");
                let json = serde_json::to_vec_pretty(&to_json(sheets))?;
                Ok(vec![out.write_artifact(&file, &json)?])
            }
        }
    }
}

// ── Reading ──────────────────────────────────────────────────────────────

/// Cleaned, non-empty sheets in workbook order.
fn read_workbook(path: &Path) -> Result<Vec<(String, Table)>, ConvertError> {
    let bytes = std::fs::read(path).map_err(|e| ConvertError::io(path, e))?;
    if !(bytes.starts_with(MAGIC_ZIP) || bytes.starts_with(MAGIC_OLE)) {
        return Err(ConvertError::Format {
            path: path.to_path_buf(),
            detail: "not an Excel workbook (unrecognised magic bytes)".to_string(),
        });
    }

    let mut workbook =
        calamine::open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| ConvertError::Format {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names().to_vec() {
        let range = match workbook.worksheet_range(&name) {
            Ok(range) => range,
            Err(e) => {
                warn!("{}: sheet '{}' unreadable, skipping: {}", path.display(), name, e);
                continue;
            }
        };

        let raw: Vec<Vec<Cell>> = range
            .rows()
            .map(|row| row.iter().map(cell_from_data).collect())
            .collect();
        let mut table = Table::from_rows(raw);
        table.clean();

        if table.is_empty() {
            info!("{}: sheet '{}' is empty, skipping", path.display(), name);
            continue;
        }
        debug!(
            "{}: sheet '{}' → {} rows × {} columns",
            path.display(),
            name,
            table.rows.len(),
            table.headers.len()
        );
        sheets.push((name, table));
    }
    Ok(sheets)
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) if dt.is_duration() => Cell::Number(dt.as_f64()),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(Cell::Date)
            .unwrap_or(Cell::Number(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

/// Excel serial day → calendar date (1900 date system).
///
/// Serial 1 is 1900-01-01. Excel also counts a 1900-02-29 that never
/// existed (serial 60), so from serial 61 on the effective day zero moves
/// back to 1899-12-30. Serial 60 itself has no date.
fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let day = serial.floor() as u64;
    let epoch = match day {
        0..=59 => NaiveDate::from_ymd_opt(1899, 12, 31)?,
        60 => return None,
        _ => NaiveDate::from_ymd_opt(1899, 12, 30)?,
    };
    epoch.checked_add_days(chrono::Days::new(day))
}

// ── Writers ──────────────────────────────────────────────────────────────

fn to_csv(table: &Table) -> std::io::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(Cell::render))?;
    }
    writer.into_inner().map_err(|e| e.into_error())
}

fn escape_md(s: &str) -> String {
    s.replace('|', "\\|").replace(['\r', '\n'], " ")
}

fn to_markdown(sheets: &[(String, Table)]) -> String {
    let mut md = String::new();
    for (i, (name, table)) in sheets.iter().enumerate() {
        if i > 0 {
            md.push('\n');
        }
        md.push_str(&format!("## {name}\n\n"));
        let header: Vec<String> = table.headers.iter().map(|h| escape_md(h)).collect();
        md.push_str(&format!("| {} |\n", header.join(" | ")));
        md.push_str(&format!("|{}\n", " --- |".repeat(table.headers.len())));
        for row in &table.rows {
            let cells: Vec<String> = row.iter().map(|c| escape_md(&c.render())).collect();
            md.push_str(&format!("| {} |\n", cells.join(" | ")));
        }
    }
    md
}

fn to_json(sheets: &[(String, Table)]) -> serde_json::Value {
    let mut doc = serde_json::Map::new();
    for (name, table) in sheets {
        let rows: Vec<serde_json::Value> = table
            .rows
            .iter()
            .map(|row| {
                let obj: serde_json::Map<String, serde_json::Value> = table
                    .headers
                    .iter()
                    .cloned()
                    .zip(row.iter().map(Cell::to_json))
                    .collect();
                serde_json::Value::Object(obj)
            })
            .collect();
        doc.insert(name.clone(), serde_json::Value::Array(rows));
    }
    serde_json::Value::Object(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Inline-string or numeric cell for the sheet XML.
    enum XCell<'a> {
        S(&'a str),
        N(f64),
    }

    fn col_letter(i: usize) -> char {
        (b'A' + i as u8) as char
    }

    fn sheet_xml(rows: &[Vec<XCell<'_>>]) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        );
        for (r, row) in rows.iter().enumerate() {
            xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
            for (c, cell) in row.iter().enumerate() {
                let addr = format!("{}{}", col_letter(c), r + 1);
                match cell {
                    XCell::S(s) => xml.push_str(&format!(
                        r#"<c r="{addr}" t="inlineStr"><is><t>{s}</t></is></c>"#
                    )),
                    XCell::N(n) => xml.push_str(&format!(r#"<c r="{addr}"><v>{n}</v></c>"#)),
                }
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData></worksheet>");
        xml
    }

    /// Minimal `.xlsx` with the given named sheets.
    fn minimal_xlsx(sheets: &[(&str, Vec<Vec<XCell<'_>>>)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let opts = zip::write::SimpleFileOptions::default();

        let mut content_types = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
        );
        let mut workbook = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
        );
        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );

        for (i, (name, rows)) in sheets.iter().enumerate() {
            let n = i + 1;
            content_types.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
            ));
            workbook.push_str(&format!(
                r#"<sheet name="{name}" sheetId="{n}" r:id="rId{n}"/>"#
            ));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
            ));
            zip.start_file(format!("xl/worksheets/sheet{n}.xml"), opts)
                .unwrap();
            zip.write_all(sheet_xml(rows).as_bytes()).unwrap();
        }
        content_types.push_str("</Types>");
        workbook.push_str("</sheets></workbook>");
        rels.push_str("</Relationships>");

        zip.start_file("[Content_Types].xml", opts).unwrap();
        zip.write_all(content_types.as_bytes()).unwrap();
        zip.start_file("_rels/.rels", opts).unwrap();
        zip.write_all(
            br#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
        )
        .unwrap();
        zip.start_file("xl/workbook.xml", opts).unwrap();
        zip.write_all(workbook.as_bytes()).unwrap();
        zip.start_file("xl/_rels/workbook.xml.rels", opts).unwrap();
        zip.write_all(rels.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    fn sales_workbook() -> Vec<u8> {
        use XCell::*;
        minimal_xlsx(&[
            (
                "Sheet1",
                vec![
                    vec![S("Region"), S("Units")],
                    vec![S("North"), N(12.0)],
                    vec![S("South"), N(7.5)],
                ],
            ),
            ("Empty", vec![]),
        ])
    }

    fn convert(format: SpreadsheetFormat, bytes: &[u8]) -> (tempfile::TempDir, ConversionResult) {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("sales.xlsx");
        std::fs::write(&src, bytes).unwrap();
        let out = tmp.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let input = InputFile::from_path(&src).unwrap();
        let result = SpreadsheetConverter::new(format).convert(&input, &OutputDir::new(&out));
        (tmp, result)
    }

    #[test]
    fn csv_one_file_per_non_empty_sheet() {
        let (_tmp, result) = convert(SpreadsheetFormat::Csv, &sales_workbook());
        let ConversionResult::Success(outputs) = result else {
            panic!("expected success, got {result:?}");
        };
        assert_eq!(outputs.len(), 1);
        let name = outputs[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("sales_Sheet1_"), "got {name}");
        let csv = std::fs::read_to_string(&outputs[0]).unwrap();
        assert_eq!(csv, "region,units\nNorth,12\nSouth,7.5\n");
    }

    #[test]
    fn markdown_single_file() {
        let (_tmp, result) = convert(SpreadsheetFormat::Markdown, &sales_workbook());
        let ConversionResult::Success(outputs) = result else {
            panic!("expected success, got {result:?}");
        };
        assert_eq!(outputs.len(), 1);
        let md = std::fs::read_to_string(&outputs[0]).unwrap();
        assert!(md.starts_with("## Sheet1\n\n| region | units |\n| --- | --- |\n"));
        assert!(md.contains("| North | 12 |"));
        assert!(!md.contains("## Empty"));
    }

    #[test]
    fn json_keyed_by_sheet() {
        let (_tmp, result) = convert(SpreadsheetFormat::Json, &sales_workbook());
        let ConversionResult::Success(outputs) = result else {
            panic!("expected success, got {result:?}");
        };
        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&outputs[0]).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "Sheet1": [
                    {"region": "North", "units": 12},
                    {"region": "South", "units": 7.5}
                ]
            })
        );
    }

    #[test]
    fn bad_magic_is_format_error() {
        let (_tmp, result) = convert(SpreadsheetFormat::Csv, b"region,units\nNorth,12\n");
        assert!(matches!(
            result,
            ConversionResult::Failed(ConvertError::Format { .. })
        ));
    }

    #[test]
    fn all_sheets_empty_is_skipped() {
        let bytes = minimal_xlsx(&[("Blank", vec![]), ("AlsoBlank", vec![])]);
        let (_tmp, result) = convert(SpreadsheetFormat::Csv, &bytes);
        assert_eq!(result, ConversionResult::Skipped(SkipReason::EmptyDocument));
    }

    #[test]
    fn markdown_escapes_pipes() {
        let t = Table {
            headers: vec!["a".into()],
            rows: vec![vec![Cell::Text("x|y".into())]],
        };
        let md = to_markdown(&[("S".into(), t)]);
        assert!(md.contains(r"| x\|y |"));
    }

    #[test]
    fn serial_dates() {
        assert_eq!(excel_serial_to_date(45000.0), NaiveDate::from_ymd_opt(2023, 3, 15));
        assert_eq!(excel_serial_to_date(1.0), NaiveDate::from_ymd_opt(1900, 1, 1));
        assert_eq!(excel_serial_to_date(59.0), NaiveDate::from_ymd_opt(1900, 2, 28));
        assert_eq!(excel_serial_to_date(60.0), None);
        assert_eq!(excel_serial_to_date(61.0), NaiveDate::from_ymd_opt(1900, 3, 1));
    }
}
