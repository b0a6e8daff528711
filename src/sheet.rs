#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Reading and writing the spreadsheets the grader works on.
//!
//! Workbooks (`.xlsx`, `.xlsm`, `.xls`, `.ods`) are read with calamine and
//! written with rust_xlsxwriter; `.csv` files go through the csv crate. In
//! every format the first row holds the column names.

use std::{collections::HashMap, fmt::Display, path::Path};

use calamine::{Data, Reader, open_workbook_auto};
use rust_xlsxwriter::Workbook;

use crate::error::{GraderError, Result};

/// A single spreadsheet value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    /// No value.
    #[default]
    Empty,
    /// Free text.
    Text(String),
    /// Whole number.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Boolean value.
    Bool(bool),
}

impl Cell {
    /// Returns the cell as text, or `None` when it is empty or only
    /// whitespace.
    pub fn non_blank_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Float(f) if f.is_nan() => None,
            Cell::Text(s) if s.trim().is_empty() => None,
            other => Some(other.to_string()),
        }
    }

    /// Returns true if the cell has no content worth grading.
    pub fn is_blank(&self) -> bool {
        self.non_blank_text().is_none()
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Int(i) => write!(f, "{i}"),
            Cell::Float(x) => write!(f, "{x}"),
            Cell::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&Data> for Cell {
    fn from(value: &Data) -> Self {
        match value {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Int(i) => Cell::Int(*i),
            Data::Float(x) => Cell::Float(*x),
            Data::Bool(b) => Cell::Bool(*b),
            other => Cell::Text(other.to_string()),
        }
    }
}

impl From<Option<i64>> for Cell {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Cell::Empty, Cell::Int)
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

/// On-disk format of a spreadsheet, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SheetFormat {
    /// Any workbook format calamine understands.
    Workbook,
    /// Comma separated values.
    Csv,
}

impl SheetFormat {
    /// Picks the format for `path`.
    fn of(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(SheetFormat::Workbook),
            "csv" => Ok(SheetFormat::Csv),
            _ => Err(GraderError::spreadsheet(
                path,
                format!("unsupported file extension `{ext}` (expected .xlsx or .csv)"),
            )),
        }
    }
}

/// An in-memory, row-oriented copy of one worksheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    /// Column names, in order.
    headers: Vec<String>,
    /// Data rows; every row has exactly `headers.len()` cells.
    rows:    Vec<Vec<Cell>>,
}

impl Sheet {
    /// Creates a sheet from column names and rows, padding or truncating
    /// rows to the header width.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Empty);
                row
            })
            .collect();

        Self { headers, rows }
    }

    /// Loads the first worksheet of `path`.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let sheet = match SheetFormat::of(path)? {
            SheetFormat::Workbook => read_workbook(path)?,
            SheetFormat::Csv => read_csv(path)?,
        };
        tracing::debug!(
            "Read {} rows and {} columns from {}",
            sheet.len(),
            sheet.headers.len(),
            path.display()
        );
        Ok(sheet)
    }

    /// Writes the sheet to `path`, replacing whatever was there.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match SheetFormat::of(path)? {
            SheetFormat::Workbook => write_workbook(self, path),
            SheetFormat::Csv => write_csv(self, path),
        }
    }

    /// Returns the column names.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Returns the number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Finds a column by name. Exact matches win over case-insensitive ones.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .or_else(|| self.headers.iter().position(|h| h.eq_ignore_ascii_case(name)))
    }

    /// Returns the cell at `row` in column `column`, if both exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let col = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[col])
    }

    /// Returns the non-blank text at `row` in column `column`.
    pub fn text(&self, row: usize, column: &str) -> Option<String> {
        self.get(row, column).and_then(Cell::non_blank_text)
    }

    /// Sets a value, appending the column first if it does not exist yet.
    ///
    /// Out of range rows are ignored.
    pub fn set(&mut self, row: usize, column: &str, value: impl Into<Cell>) {
        let col = match self.headers.iter().position(|h| h == column) {
            Some(col) => col,
            None => {
                self.headers.push(column.to_owned());
                for r in &mut self.rows {
                    r.push(Cell::Empty);
                }
                self.headers.len() - 1
            }
        };

        if let Some(r) = self.rows.get_mut(row) {
            r[col] = value.into();
        }
    }

    /// Returns the first data row as a lowercase-keyed reference map.
    pub fn first_record(&self) -> ReferenceMap {
        let Some(first) = self.rows.first() else {
            return ReferenceMap::default();
        };

        ReferenceMap::from_pairs(
            self.headers
                .iter()
                .zip(first)
                .filter_map(|(h, c)| c.non_blank_text().map(|text| (h.clone(), text))),
        )
    }
}

/// Reads the first worksheet of a workbook.
fn read_workbook(path: &Path) -> Result<Sheet> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| GraderError::spreadsheet(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| GraderError::spreadsheet(path, "workbook has no worksheets"))?
        .map_err(|e| GraderError::spreadsheet(path, e))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|r| r.iter().map(|c| c.to_string().trim().to_owned()).collect())
        .unwrap_or_default();
    let mut rows: Vec<Vec<Cell>> = rows.map(|r| r.iter().map(Cell::from).collect()).collect();
    trim_trailing_blank_rows(&mut rows);

    Ok(Sheet::from_rows(headers, rows))
}

/// Reads a csv file with a header row.
fn read_csv(path: &Path) -> Result<Sheet> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| GraderError::spreadsheet(path, e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| GraderError::spreadsheet(path, e))?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| GraderError::spreadsheet(path, e))?;
        let row: Vec<Cell> = record
            .iter()
            .map(|field| {
                if field.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(field.to_owned())
                }
            })
            .collect();
        rows.push(row);
    }
    trim_trailing_blank_rows(&mut rows);

    Ok(Sheet::from_rows(headers, rows))
}

/// Drops blank rows after the last row with content. Blank rows in between
/// are kept so row numbers match the source file.
fn trim_trailing_blank_rows(rows: &mut Vec<Vec<Cell>>) {
    while rows.last().is_some_and(|r| r.iter().all(Cell::is_blank)) {
        rows.pop();
    }
}

/// Writes `sheet` as a single-worksheet xlsx workbook.
fn write_workbook(sheet: &Sheet, path: &Path) -> Result<()> {
    let err = |e: rust_xlsxwriter::XlsxError| GraderError::spreadsheet(path, e);
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, header) in sheet.headers.iter().enumerate() {
        worksheet
            .write_string(0, column_number(path, col)?, header)
            .map_err(err)?;
    }

    for (index, row) in sheet.rows.iter().enumerate() {
        let row_number = u32::try_from(index + 1)
            .map_err(|_| GraderError::spreadsheet(path, "too many rows for a worksheet"))?;
        for (col, cell) in row.iter().enumerate() {
            let col = column_number(path, col)?;
            match cell {
                Cell::Empty => {}
                Cell::Text(s) => {
                    worksheet.write_string(row_number, col, s).map_err(err)?;
                }
                Cell::Int(i) => {
                    worksheet
                        .write_number(row_number, col, *i as f64)
                        .map_err(err)?;
                }
                Cell::Float(x) => {
                    worksheet.write_number(row_number, col, *x).map_err(err)?;
                }
                Cell::Bool(b) => {
                    worksheet.write_boolean(row_number, col, *b).map_err(err)?;
                }
            }
        }
    }

    workbook.save(path).map_err(err)
}

/// Converts a zero based column index to the worksheet column type.
fn column_number(path: &Path, col: usize) -> Result<u16> {
    u16::try_from(col).map_err(|_| GraderError::spreadsheet(path, "too many columns for a worksheet"))
}

/// Writes `sheet` as csv.
fn write_csv(sheet: &Sheet, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| GraderError::spreadsheet(path, e))?;
    writer
        .write_record(&sheet.headers)
        .map_err(|e| GraderError::spreadsheet(path, e))?;
    for row in &sheet.rows {
        writer
            .write_record(row.iter().map(Cell::to_string))
            .map_err(|e| GraderError::spreadsheet(path, e))?;
    }
    writer.flush().map_err(|e| GraderError::spreadsheet(path, e))
}

/// Section name to reference text, taken from the first row of a rubric or
/// answer-key spreadsheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceMap(HashMap<String, String>);

impl ReferenceMap {
    /// Builds a map from `(column, text)` pairs; column names are lowercased.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.as_ref().trim().to_lowercase(), v.into()))
                .collect(),
        )
    }

    /// Looks up the text for `section_name`, ignoring case.
    pub fn get(&self, section_name: &str) -> Option<&str> {
        self.0.get(&section_name.to_lowercase()).map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Loads the rubric and answer key, one flat map per file.
pub fn read_rubric_and_key(
    rubric_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
) -> Result<(ReferenceMap, ReferenceMap)> {
    let rubric = Sheet::read(rubric_path.as_ref())?.first_record();
    let key = Sheet::read(key_path.as_ref())?.first_record();
    tracing::debug!("Loaded {} rubric entries and {} answer-key entries", rubric.len(), key.len());
    Ok((rubric, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Sheet {
        Sheet::from_rows(
            vec!["Name".into(), "HPI".into()],
            vec![
                vec![Cell::Text("a".into()), Cell::Text("cough".into())],
                vec![Cell::Text("b".into())],
            ],
        )
    }

    #[test]
    fn short_rows_are_padded() {
        let sheet = sample();
        assert_eq!(sheet.get(1, "HPI"), Some(&Cell::Empty));
    }

    #[test]
    fn set_appends_unknown_columns() {
        let mut sheet = sample();
        sheet.set(0, "hpi_gpt_score", Some(4));
        assert_eq!(sheet.headers().last().map(String::as_str), Some("hpi_gpt_score"));
        assert_eq!(sheet.get(0, "hpi_gpt_score"), Some(&Cell::Int(4)));
        assert_eq!(sheet.get(1, "hpi_gpt_score"), Some(&Cell::Empty));
    }

    #[test]
    fn lookups_fall_back_to_case_insensitive() {
        let sheet = sample();
        assert_eq!(sheet.text(0, "hpi").as_deref(), Some("cough"));
        assert_eq!(sheet.text(1, "hpi"), None);
        assert_eq!(sheet.text(0, "missing"), None);
    }

    #[test]
    fn whitespace_is_blank() {
        assert!(Cell::Text("  \n".into()).is_blank());
        assert!(Cell::Float(f64::NAN).is_blank());
        assert_eq!(Cell::Int(3).non_blank_text().as_deref(), Some("3"));
    }

    #[test]
    fn first_record_lowercases_keys() {
        let map = sample().first_record();
        assert_eq!(map.get("hpi"), Some("cough"));
        assert_eq!(map.get("HPI"), Some("cough"));
        assert_eq!(map.get("name"), Some("a"));
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let err = Sheet::default().write("notes.txt").unwrap_err();
        assert!(matches!(err, GraderError::Spreadsheet { .. }));
    }
}
