//
// workbook.rs
// HP-Stats-rs
//
// In-memory workbook model with an Office Open XML (.xlsx) writer and reader, plus CSV
// flattening of every sheet.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{PipelineError, Result};

/// Title of the sheet every new workbook starts with.
pub const DEFAULT_SHEET_TITLE: &str = "Sheet";
const MAX_TITLE_CHARS: usize = 31;

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PACKAGE_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const CT_OFFICE: &str = "application/vnd.openxmlformats-officedocument";
const CT_RELS: &str = "application/vnd.openxmlformats-package.relationships+xml";

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(text) => Some(text),
            _ => None,
        }
    }

    fn csv_field(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(text) => text.clone(),
            Cell::Number(value) => value.to_string(),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<usize> for Cell {
    fn from(value: usize) -> Self {
        Cell::Number(value as f64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    title: String,
    rows: Vec<Vec<Cell>>,
    hidden: bool,
}

impl Sheet {
    pub fn new(title: &str) -> Self {
        Self {
            title: sanitize_title(title),
            rows: Vec::new(),
            hidden: false,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn append(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl Workbook {
    /// A fresh workbook holding only the empty default sheet.
    pub fn new() -> Self {
        Self {
            sheets: vec![Sheet::new(DEFAULT_SHEET_TITLE)],
        }
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet(&self, title: &str) -> Option<&Sheet> {
        let title = sanitize_title(title);
        self.sheets.iter().find(|s| s.title == title)
    }

    /// Returns the sheet titled `title`, appending a new one when absent.
    pub fn sheet_mut(&mut self, title: &str) -> &mut Sheet {
        let title = sanitize_title(title);
        let index = match self.sheets.iter().position(|s| s.title == title) {
            Some(index) => index,
            None => {
                self.sheets.push(Sheet::new(&title));
                self.sheets.len() - 1
            }
        };
        &mut self.sheets[index]
    }

    /// Appends a new sheet titled after `title`, unique (ignoring case) among the existing
    /// sheets and `reserved`. A clash gets a ` (n)` suffix that stays within the title limit.
    pub fn add_sheet(&mut self, title: &str, reserved: &[&str]) -> &mut Sheet {
        let base = sanitize_title(title);
        let taken = |candidate: &str| {
            let candidate = candidate.to_lowercase();
            self.sheets
                .iter()
                .map(|s| s.title.as_str())
                .chain(reserved.iter().copied())
                .any(|existing| existing.to_lowercase() == candidate)
        };

        let mut unique = base.clone();
        let mut n = 2;
        while taken(&unique) {
            let suffix = format!(" ({})", n);
            let stem: String = base
                .chars()
                .take(MAX_TITLE_CHARS - suffix.chars().count())
                .collect();
            unique = format!("{}{}", stem.trim_end(), suffix);
            n += 1;
        }

        self.sheets.push(Sheet {
            title: unique,
            rows: Vec::new(),
            hidden: false,
        });
        let last = self.sheets.len() - 1;
        &mut self.sheets[last]
    }

    pub fn remove_default_sheet(&mut self) {
        self.sheets
            .retain(|s| !(s.title == DEFAULT_SHEET_TITLE && s.is_empty()));
    }

    pub fn hide_sheets_except(&mut self, keep: &[&str]) {
        for sheet in &mut self.sheets {
            sheet.hidden = !keep.contains(&sheet.title.as_str());
        }
    }

    /// Writes the workbook as an `.xlsx` package, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PipelineError::output(parent, e))?;
        }
        let file = File::create(path).map_err(|e| PipelineError::output(path, e))?;
        self.write_package(BufWriter::new(file))
            .map_err(|e| PipelineError::output(path, e))
    }

    pub fn open(path: &Path) -> Result<Workbook> {
        let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
        read_package(file).map_err(|e| PipelineError::io(path, e))
    }

    /// Flattens every non-empty sheet into `<dir>/<prefix>-<sheet title>.csv`.
    pub fn write_csv(&self, dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir).map_err(|e| PipelineError::output(dir, e))?;

        let mut written = Vec::new();
        for sheet in self.sheets.iter().filter(|s| !s.is_empty()) {
            let path = dir.join(format!("{}-{}.csv", prefix, sheet.title));
            write_sheet_csv(sheet, &path).map_err(|e| PipelineError::output(&path, e))?;
            written.push(path);
        }
        Ok(written)
    }

    fn write_package<W: Write + Seek>(&self, writer: W) -> io::Result<()> {
        let default_sheets;
        let sheets: &[Sheet] = if self.sheets.is_empty() {
            default_sheets = [Sheet::new(DEFAULT_SHEET_TITLE)];
            &default_sheets
        } else {
            &self.sheets
        };
        // Spreadsheet applications refuse a workbook without a visible sheet.
        let active = sheets.iter().position(|s| !s.hidden).unwrap_or(0);

        let mut zip = ZipWriter::new(writer);
        write_part(&mut zip, "[Content_Types].xml", &content_types(sheets.len()))?;
        write_part(&mut zip, "_rels/.rels", &root_relationships())?;
        write_part(&mut zip, "xl/workbook.xml", &workbook_part(sheets, active))?;
        write_part(
            &mut zip,
            "xl/_rels/workbook.xml.rels",
            &workbook_relationships(sheets.len()),
        )?;
        for (index, sheet) in sheets.iter().enumerate() {
            let name = format!("xl/worksheets/sheet{}.xml", index + 1);
            write_part(&mut zip, &name, &worksheet_part(sheet))?;
        }
        let mut inner = zip.finish()?;
        inner.flush()
    }
}

/// Applies spreadsheet sheet-title rules: no `[]:*?/\`, at most 31 characters.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .take(MAX_TITLE_CHARS)
        .collect();
    if cleaned.trim().is_empty() {
        DEFAULT_SHEET_TITLE.to_string()
    } else {
        cleaned
    }
}

fn write_sheet_csv(sheet: &Sheet, path: &Path) -> io::Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_path(path)?;
    for row in sheet.rows() {
        writer.write_record(row.iter().map(Cell::csv_field))?;
    }
    writer.flush()
}

fn write_part<W: Write + Seek>(zip: &mut ZipWriter<W>, name: &str, body: &str) -> io::Result<()> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(name, options)?;
    zip.write_all(body.as_bytes())
}

fn content_types(sheet_count: usize) -> String {
    let mut xml = String::from(XML_DECL);
    xml.push_str(
        r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    );
    xml.push_str(&format!(
        r#"<Default Extension="rels" ContentType="{}"/>"#,
        CT_RELS
    ));
    xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
    xml.push_str(&format!(
        r#"<Override PartName="/xl/workbook.xml" ContentType="{}.spreadsheetml.sheet.main+xml"/>"#,
        CT_OFFICE
    ));
    for index in 1..=sheet_count {
        xml.push_str(&format!(
            concat!(
                r#"<Override PartName="/xl/worksheets/sheet{}.xml" "#,
                r#"ContentType="{}.spreadsheetml.worksheet+xml"/>"#
            ),
            index, CT_OFFICE
        ));
    }
    xml.push_str("</Types>");
    xml
}

fn root_relationships() -> String {
    format!(
        concat!(
            r#"{}<Relationships xmlns="{}">"#,
            r#"<Relationship Id="rId1" Type="{}/officeDocument" Target="xl/workbook.xml"/>"#,
            "</Relationships>"
        ),
        XML_DECL, NS_PACKAGE_REL, NS_REL
    )
}

fn workbook_relationships(sheet_count: usize) -> String {
    let mut xml = format!(r#"{}<Relationships xmlns="{}">"#, XML_DECL, NS_PACKAGE_REL);
    for index in 1..=sheet_count {
        xml.push_str(&format!(
            r#"<Relationship Id="rId{0}" Type="{1}/worksheet" Target="worksheets/sheet{0}.xml"/>"#,
            index, NS_REL
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

fn workbook_part(sheets: &[Sheet], active: usize) -> String {
    let mut xml = format!(
        concat!(
            r#"{}<workbook xmlns="{}" xmlns:r="{}">"#,
            r#"<bookViews><workbookView activeTab="{}"/></bookViews><sheets>"#
        ),
        XML_DECL, NS_MAIN, NS_REL, active
    );
    for (index, sheet) in sheets.iter().enumerate() {
        let state = if sheet.hidden && index != active {
            r#" state="hidden""#
        } else {
            ""
        };
        xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}"{} r:id="rId{}"/>"#,
            escape(sheet.title.as_str()),
            index + 1,
            state,
            index + 1
        ));
    }
    xml.push_str("</sheets></workbook>");
    xml
}

fn worksheet_part(sheet: &Sheet) -> String {
    let mut xml = format!(r#"{}<worksheet xmlns="{}"><sheetData>"#, XML_DECL, NS_MAIN);
    for (row_index, row) in sheet.rows.iter().enumerate() {
        xml.push_str(&format!(r#"<row r="{}">"#, row_index + 1));
        for (column, cell) in row.iter().enumerate() {
            let reference = cell_reference(row_index, column);
            match cell {
                Cell::Empty => {}
                Cell::Number(value) if value.is_finite() => {
                    xml.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, reference, value));
                }
                // Non-finite numbers have no numeric cell form; keep them readable as text.
                Cell::Number(value) => push_inline_text(&mut xml, &reference, &value.to_string()),
                Cell::Text(text) => push_inline_text(&mut xml, &reference, text),
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

fn push_inline_text(xml: &mut String, reference: &str, text: &str) {
    xml.push_str(&format!(
        r#"<c r="{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
        reference,
        escape(text)
    ));
}

/// Zero-based column index to spreadsheet letters (`0 -> A`, `26 -> AA`).
fn column_name(mut index: usize) -> String {
    let mut name = String::new();
    loop {
        name.insert(0, char::from(b'A' + (index % 26) as u8));
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name
}

fn cell_reference(row: usize, column: usize) -> String {
    format!("{}{}", column_name(column), row + 1)
}

/// Column part of a reference like `AB12`, as a zero-based index.
fn column_index(reference: &str) -> Option<usize> {
    let letters: String = reference
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let number = letters
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + (b.to_ascii_uppercase() - b'A' + 1) as usize);
    Some(number - 1)
}

fn invalid_data(err: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err.to_string())
}

struct SheetEntry {
    title: String,
    relationship: String,
    hidden: bool,
}

fn read_package<R: Read + Seek>(reader: R) -> io::Result<Workbook> {
    let mut archive = ZipArchive::new(reader)?;
    let workbook_xml = read_part(&mut archive, "xl/workbook.xml")?;
    let relationships =
        parse_relationships(&read_part(&mut archive, "xl/_rels/workbook.xml.rels")?)?;

    let mut sheets = Vec::new();
    for entry in parse_sheet_entries(&workbook_xml)? {
        let target = relationships.get(&entry.relationship).ok_or_else(|| {
            invalid_data(format!("sheet '{}' has no worksheet part", entry.title))
        })?;
        let part = match target.strip_prefix('/') {
            Some(absolute) => absolute.to_string(),
            None => format!("xl/{}", target),
        };
        let rows = parse_sheet_rows(&read_part(&mut archive, &part)?)?;
        sheets.push(Sheet {
            title: entry.title,
            rows,
            hidden: entry.hidden,
        });
    }
    Ok(Workbook { sheets })
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> io::Result<String> {
    let mut part = archive.by_name(name)?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(xml)
}

fn attribute(element: &BytesStart, key: &[u8]) -> io::Result<Option<String>> {
    match element.try_get_attribute(key).map_err(invalid_data)? {
        Some(attr) => Ok(Some(
            attr.unescape_value().map_err(invalid_data)?.into_owned(),
        )),
        None => Ok(None),
    }
}

fn parse_relationships(xml: &str) -> io::Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut targets = HashMap::new();
    loop {
        match reader.read_event().map_err(invalid_data)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let id = attribute(&e, b"Id")?;
                if let (Some(id), Some(target)) = (id, attribute(&e, b"Target")?) {
                    targets.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(targets)
}

fn parse_sheet_entries(xml: &str) -> io::Result<Vec<SheetEntry>> {
    let mut reader = Reader::from_str(xml);
    let mut entries = Vec::new();
    loop {
        match reader.read_event().map_err(invalid_data)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let title = attribute(&e, b"name")?
                    .ok_or_else(|| invalid_data("sheet without a name"))?;
                let relationship = attribute(&e, b"r:id")?
                    .ok_or_else(|| invalid_data(format!("sheet '{}' without r:id", title)))?;
                let hidden = attribute(&e, b"state")?
                    .map_or(false, |state| state == "hidden" || state == "veryHidden");
                entries.push(SheetEntry {
                    title,
                    relationship,
                    hidden,
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(entries)
}

struct PendingCell {
    column: usize,
    kind: Option<String>,
    text: String,
}

fn parse_sheet_rows(xml: &str) -> io::Result<Vec<Vec<Cell>>> {
    let mut reader = Reader::from_str(xml);
    let mut rows: Vec<Vec<Cell>> = Vec::new();
    let mut row_index = 0usize;
    let mut pending: Option<PendingCell> = None;
    let mut capture = false;

    loop {
        match reader.read_event().map_err(invalid_data)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => row_index = open_row(&mut rows, &e)?,
                b"c" => {
                    let column = attribute(&e, b"r")?
                        .and_then(|r| column_index(&r))
                        .unwrap_or_else(|| rows.get(row_index).map_or(0, Vec::len));
                    pending = Some(PendingCell {
                        column,
                        kind: attribute(&e, b"t")?,
                        text: String::new(),
                    });
                }
                b"v" | b"t" => capture = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                open_row(&mut rows, &e)?;
            }
            Event::Text(text) if capture => {
                if let Some(cell) = pending.as_mut() {
                    cell.text.push_str(&text.unescape().map_err(invalid_data)?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    if let Some(cell) = pending.take() {
                        let value = decode_cell(cell.kind.as_deref(), cell.text)?;
                        let row = rows
                            .get_mut(row_index)
                            .ok_or_else(|| invalid_data("cell outside of a row"))?;
                        if row.len() <= cell.column {
                            row.resize(cell.column + 1, Cell::Empty);
                        }
                        row[cell.column] = value;
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rows)
}

fn open_row(rows: &mut Vec<Vec<Cell>>, element: &BytesStart) -> io::Result<usize> {
    let index = match attribute(element, b"r")? {
        Some(r) => r
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .ok_or_else(|| invalid_data(format!("bad row number '{}'", r)))?,
        None => rows.len(),
    };
    if rows.len() <= index {
        rows.resize(index + 1, Vec::new());
    }
    Ok(index)
}

fn decode_cell(kind: Option<&str>, text: String) -> io::Result<Cell> {
    match kind {
        Some("inlineStr") | Some("str") => Ok(Cell::Text(text)),
        Some("s") => Err(invalid_data("shared-string cells are not supported")),
        _ if text.is_empty() => Ok(Cell::Empty),
        _ => Ok(text
            .trim()
            .parse::<f64>()
            .map(Cell::Number)
            .unwrap_or_else(|_| Cell::Text(text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn column_names_follow_spreadsheet_letters() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(27), "AB");
        assert_eq!(column_name(701), "ZZ");
        assert_eq!(column_name(702), "AAA");
        for index in [0, 25, 26, 51, 701, 702, 16383] {
            assert_eq!(column_index(&cell_reference(4, index)), Some(index));
        }
    }

    #[test]
    fn titles_are_sanitized_and_truncated() {
        assert_eq!(sanitize_title("Lac/Pyr [raw]"), "Lac_Pyr _raw_");
        assert_eq!(sanitize_title(&"x".repeat(40)).chars().count(), 31);
        assert_eq!(sanitize_title(""), DEFAULT_SHEET_TITLE);
    }

    #[test]
    fn added_sheets_never_clash_ignoring_case() {
        let mut workbook = Workbook::new();
        workbook.sheet_mut("Raw Signal");
        workbook.add_sheet("snr", &["SNR"]);
        workbook.add_sheet("MetaA", &[]);
        workbook.add_sheet("metaa", &[]);
        workbook.add_sheet("METAA", &[]);
        let long = "x".repeat(40);
        workbook.add_sheet(&long, &[]);
        workbook.add_sheet(&long, &[]);

        let titles: Vec<&str> = workbook.sheets().iter().map(Sheet::title).collect();
        let first = "x".repeat(31);
        let truncated = format!("{} (2)", "x".repeat(27));
        assert_eq!(
            titles,
            [
                "Sheet",
                "Raw Signal",
                "snr (2)",
                "MetaA",
                "metaa (2)",
                "METAA (3)",
                first.as_str(),
                truncated.as_str(),
            ]
        );
        assert!(titles.iter().all(|t| t.chars().count() <= MAX_TITLE_CHARS));
    }

    #[test]
    fn sheet_mut_reuses_existing_sheets() {
        let mut workbook = Workbook::new();
        workbook.sheet_mut("Raw Signal").append(vec!["a".into()]);
        workbook.sheet_mut("Raw Signal").append(vec!["b".into()]);
        assert_eq!(workbook.sheets().len(), 2);
        assert_eq!(workbook.sheet("Raw Signal").expect("sheet").rows().len(), 2);

        workbook.remove_default_sheet();
        let titles: Vec<_> = workbook.sheets().iter().map(Sheet::title).collect();
        assert_eq!(titles, ["Raw Signal"]);
    }

    #[test]
    fn saved_package_reads_back_cells_and_visibility() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested/Cond100.xlsx");

        let mut workbook = Workbook::new();
        workbook.remove_default_sheet();
        {
            let raw = workbook.sheet_mut("Raw Signal");
            raw.append(vec!["MetaA".into()]);
            raw.append(vec!["".into(), "Tumor & <Kidney>".into(), "BG STDEV".into()]);
            raw.append(vec![1usize.into(), Cell::Number(0.1), Cell::Number(1e-7)]);
            raw.append(vec![
                2usize.into(),
                Cell::Number(f64::INFINITY),
                Cell::Empty,
                Cell::Number(3.25),
            ]);
        }
        workbook.sheet_mut("MetaA").append(vec!["Cond100-MetaA_T1".into()]);
        workbook.hide_sheets_except(&["Raw Signal"]);
        workbook.save(&path).expect("save");

        let restored = Workbook::open(&path).expect("open");
        assert_eq!(restored.sheets().len(), 2);
        let raw = restored.sheet("Raw Signal").expect("raw");
        assert!(!raw.is_hidden());
        assert!(restored.sheet("MetaA").expect("aux").is_hidden());

        let rows = raw.rows();
        assert_eq!(rows[0], vec![Cell::Text("MetaA".into())]);
        assert_eq!(rows[1][1], Cell::Text("Tumor & <Kidney>".into()));
        assert_eq!(rows[2][1].as_number(), Some(0.1));
        assert_eq!(rows[2][2].as_number(), Some(1e-7));
        assert_eq!(rows[3][1].as_text(), Some("inf"));
        assert_eq!(rows[3][2], Cell::Empty);
        assert_eq!(rows[3][3].as_number(), Some(3.25));
    }

    #[test]
    fn csv_flattening_writes_one_file_per_non_empty_sheet() {
        let dir = tempdir().expect("tempdir");
        let mut workbook = Workbook::new();
        workbook.sheet_mut("Raw Signal").append(vec!["MetaA".into()]);
        workbook
            .sheet_mut("Raw Signal")
            .append(vec![1usize.into(), Cell::Number(2.5), Cell::Number(3.0)]);
        workbook.sheet_mut("SNR");

        let written = workbook.write_csv(&dir.path().join("CSV"), "Cond100").expect("csv");
        assert_eq!(written, vec![dir.path().join("CSV/Cond100-Raw Signal.csv")]);
        let text = fs::read_to_string(&written[0]).expect("read csv");
        assert_eq!(text, "MetaA\n1,2.5,3\n");
    }

    #[test]
    fn save_to_unwritable_target_reports_output_failure() {
        let dir = tempdir().expect("tempdir");
        // A directory in place of the file makes File::create fail.
        let target = dir.path().join("Cond100.xlsx");
        fs::create_dir_all(&target).expect("mkdir");

        let err = Workbook::new().save(&target).unwrap_err();
        assert!(matches!(err, PipelineError::OutputWrite { .. }));
        assert!(err.to_string().contains("open or used by another application"));
    }
}
