//! Parsers for delimited and spreadsheet exports: gnomAD and ClinVar CSVs, and
//! user-supplied custom files.

use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::io::Read;
use std::path::Path;

use super::utils::get_base_extension;
use crate::data::{DatumType, SourceTable, VariantRecord};
use crate::error::VarMergeError;
use crate::io::file::{require_exists, InputFile};
use crate::traits::SourceParser;
use crate::Source;

/// Build a delimited reader with a header row, which works on gzip-compressed
/// files too.
pub fn build_delimited_reader(
    filepath: impl AsRef<Path>,
    delimiter: u8,
) -> Result<csv::Reader<Box<dyn Read>>, VarMergeError> {
    let stream = InputFile::new(filepath.as_ref()).reader()?;
    let stream: Box<dyn Read> = Box::new(stream);
    let reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .from_reader(stream);
    Ok(reader)
}

/// Read every row of a delimited reader into a table. Empty cells are null.
/// Rows are tagged with `source` when one is given.
pub fn read_delimited<R: Read>(
    mut reader: csv::Reader<R>,
    name: &str,
    source: Option<Source>,
) -> Result<SourceTable, VarMergeError> {
    let columns: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    let mut table = SourceTable::new(name, columns.clone());
    for row in reader.records() {
        let row = row?;
        let mut record = source.map_or_else(VariantRecord::new, VariantRecord::from_source);
        for (column, cell) in columns.iter().zip(row.iter()) {
            record.set(column.as_str(), DatumType::infer_nullable(cell));
        }
        table.push(record);
    }
    Ok(table)
}

fn spreadsheet_cell(cell: &Data) -> DatumType {
    match cell {
        Data::Empty => DatumType::NoValue,
        Data::Int(value) => DatumType::Integer(*value),
        Data::Float(value) => DatumType::Float(*value),
        Data::String(value) if value.is_empty() => DatumType::NoValue,
        Data::String(value) => DatumType::String(value.clone()),
        other => DatumType::infer_nullable(&other.to_string()),
    }
}

/// Read the first sheet of a workbook. The first row is the header.
pub fn read_spreadsheet(
    path: impl AsRef<Path>,
    source: Source,
) -> Result<SourceTable, VarMergeError> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| {
            VarMergeError::ParseError(format!("workbook {} has no sheets", path.display()))
        })??;

    let mut rows = range.rows();
    let columns: Vec<String> = rows
        .next()
        .map(|header| header.iter().map(|cell| cell.to_string()).collect())
        .unwrap_or_default();
    let mut table = SourceTable::new(table_name(path), columns.clone());
    for row in rows {
        let mut record = VariantRecord::from_source(source);
        for (column, cell) in columns.iter().zip(row.iter()) {
            record.set(column.as_str(), spreadsheet_cell(cell));
        }
        table.push(record);
    }
    Ok(table)
}

fn table_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Parses a comma-separated export with a header line (gnomAD, or ClinVar's
/// tabular download).
#[derive(Clone, Debug)]
pub struct TabularParser {
    source: Source,
    delimiter: u8,
}

impl TabularParser {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

impl SourceParser for TabularParser {
    type Output = SourceTable;

    fn parse(&self, path: &Path) -> Result<SourceTable, VarMergeError> {
        let reader = build_delimited_reader(path, self.delimiter)?;
        log::info!("Parsing file {} as a {:?} table.", path.display(), self.source);
        read_delimited(reader, &table_name(path), Some(self.source))
    }
}

/// Parses a custom file, picking the reader from its extension.
#[derive(Clone, Debug)]
pub struct GenericTabularParser {
    source: Source,
}

impl Default for GenericTabularParser {
    fn default() -> Self {
        Self {
            source: Source::Custom,
        }
    }
}

impl GenericTabularParser {
    pub fn new(source: Source) -> Self {
        Self { source }
    }
}

impl SourceParser for GenericTabularParser {
    type Output = SourceTable;

    fn parse(&self, path: &Path) -> Result<SourceTable, VarMergeError> {
        require_exists(path)?;
        let extension = get_base_extension(path)
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();
        log::info!("Parsing file {} as a custom .{} file.", path.display(), extension);
        match extension.as_str() {
            "csv" | "tsv" | "txt" => {
                let delimiter = if extension == "csv" { b',' } else { b'\t' };
                let reader = build_delimited_reader(path, delimiter)?;
                read_delimited(reader, &table_name(path), Some(self.source))
            }
            "xlsx" | "xls" | "ods" => read_spreadsheet(path, self.source),
            _ => Err(VarMergeError::UnsupportedFileFormat(extension)),
        }
    }
}
