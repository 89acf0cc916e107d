//! [`VariantRecord`] and [`SourceTable`], the containers every stage of the
//! pipeline reads and writes.
//!
//! A [`VariantRecord`] is an open, ordered mapping of field names to
//! [`DatumType`] values. Fields only ever accumulate: joins, key fills, and
//! annotation add fields, and nothing downstream removes them.

use indexmap::{IndexMap, IndexSet};
use std::path::Path;

use super::operations::ColumnType;
use super::DatumType;
use crate::error::VarMergeError;
use crate::io::tsv::{TsvConfig, CSV_TSV};
use crate::traits::TsvSerialize;
use crate::Source;

/// A single variant row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VariantRecord {
    fields: IndexMap<String, DatumType>,
    sources: IndexSet<Source>,
}

impl VariantRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new record tagged with the source it came from.
    pub fn from_source(source: Source) -> Self {
        let mut record = Self::default();
        record.sources.insert(source);
        record
    }

    /// Get a field value; `None` if the field was never set.
    pub fn get(&self, field: &str) -> Option<&DatumType> {
        self.fields.get(field)
    }

    /// Get a field value, treating an absent field as null.
    pub fn value(&self, field: &str) -> &DatumType {
        self.fields.get(field).unwrap_or(&DatumType::NoValue)
    }

    /// Get the non-null key string of a field.
    pub fn key(&self, field: &str) -> Option<String> {
        self.fields.get(field).and_then(DatumType::as_key)
    }

    /// Set (or overwrite) a field.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<DatumType>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &DatumType)> {
        self.fields.iter()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// The sources that contributed to this row.
    pub fn sources(&self) -> &IndexSet<Source> {
        &self.sources
    }

    pub fn add_source(&mut self, source: Source) {
        self.sources.insert(source);
    }

    /// Rename a field in-place, preserving its position.
    pub(crate) fn rename_field(&mut self, from: &str, to: &str) {
        if let Some(index) = self.fields.get_index_of(from) {
            let value = self.fields.shift_remove_index(index).map(|(_, v)| v);
            if let Some(value) = value {
                self.fields.shift_insert(index, to.to_string(), value);
            }
        }
    }

    pub(crate) fn get_mut(&mut self, field: &str) -> Option<&mut DatumType> {
        self.fields.get_mut(field)
    }
}

/// A named table of [`VariantRecord`] rows with ordered columns.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceTable {
    pub name: String,
    pub columns: Vec<String>,
    pub records: Vec<VariantRecord>,
    /// Free-text notes attached to this table (LOVD exports only).
    pub notes: Vec<String>,
}

impl SourceTable {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            records: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Get the total number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Return whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Add a column name if it is not present yet.
    pub fn add_column(&mut self, column: impl Into<String>) {
        let column = column.into();
        if !self.has_column(&column) {
            self.columns.push(column);
        }
    }

    /// Push a record, registering any new field names as columns.
    pub fn push(&mut self, record: VariantRecord) {
        for name in record.field_names() {
            if !self.columns.contains(name) {
                self.columns.push(name.clone());
            }
        }
        self.records.push(record);
    }

    /// Tag every row with `source`.
    pub fn tag_source(&mut self, source: Source) {
        for record in self.records.iter_mut() {
            record.add_source(source);
        }
    }

    /// Iterate over the values of one column, absent fields as null.
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a DatumType> {
        self.records.iter().map(move |r| r.value(column))
    }

    /// Count the non-null entries in a column.
    pub fn count_non_null(&self, column: &str) -> usize {
        self.column_values(column).filter(|v| !v.is_null()).count()
    }

    /// Keep only the given columns (used for projections before joining).
    /// Columns that are absent are reported as an error.
    pub fn select(&self, columns: &[&str]) -> Result<SourceTable, VarMergeError> {
        for column in columns {
            if !self.has_column(column) {
                return Err(VarMergeError::MissingColumn(column.to_string()));
            }
        }
        let mut selected = SourceTable::new(
            self.name.clone(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
        for record in &self.records {
            let mut row = VariantRecord::new();
            for source in record.sources() {
                row.add_source(*source);
            }
            for column in columns {
                row.set(*column, record.value(column).clone());
            }
            selected.records.push(row);
        }
        Ok(selected)
    }

    /// Suffix every column not already carrying the source's namespace suffix.
    pub fn namespace(&mut self, source: Source) {
        let suffix = source.suffix();
        if suffix.is_empty() {
            return;
        }
        let renames: Vec<(String, String)> = self
            .columns
            .iter()
            .filter(|c| !c.ends_with(suffix))
            .map(|c| (c.clone(), format!("{}{}", c, suffix)))
            .collect();
        for (from, to) in &renames {
            for record in self.records.iter_mut() {
                record.rename_field(from, to);
            }
        }
        for column in self.columns.iter_mut() {
            if !column.ends_with(suffix) {
                column.push_str(suffix);
            }
        }
    }

    /// Take the first `n` rows (used to cap annotation input size).
    pub fn truncate(&mut self, n: usize) {
        self.records.truncate(n);
    }

    /// Promote each column's values to a common type: all-integer columns stay
    /// integer, and mixed integer and float columns become float.
    ///
    /// Fails with [`VarMergeError::DtypeError`] if a record carries a field that the
    /// table does not declare.
    pub fn convert_dtypes(&mut self) -> Result<(), VarMergeError> {
        for record in &self.records {
            if let Some(undeclared) = record.field_names().find(|f| !self.columns.contains(f)) {
                return Err(VarMergeError::DtypeError {
                    table: self.name.clone(),
                    column: undeclared.clone(),
                });
            }
        }
        for column in &self.columns {
            let column_type = ColumnType::of(self.records.iter().map(|r| r.value(column)));
            if column_type == ColumnType::Float {
                for record in self.records.iter_mut() {
                    if let Some(value) = record.get_mut(column) {
                        if let DatumType::Integer(int) = *value {
                            *value = DatumType::Float(int as f64);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Append the rows of `other`, taking the union of columns.
    pub fn concat(&mut self, other: SourceTable) {
        for column in other.columns {
            self.add_column(column);
        }
        self.records.extend(other.records);
    }

    /// Write this table as CSV with a header row. Null values are empty cells.
    pub fn to_csv(&self, path: impl AsRef<Path>) -> Result<(), VarMergeError> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        self.write_csv(&mut writer, &CSV_TSV)?;
        writer.flush()?;
        Ok(())
    }

    pub(crate) fn write_csv<W: std::io::Write>(
        &self,
        writer: &mut csv::Writer<W>,
        config: &TsvConfig,
    ) -> Result<(), VarMergeError> {
        writer.write_record(&self.columns)?;
        for record in &self.records {
            writer.write_record(self.columns.iter().map(|c| record.value(c).to_tsv(config)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gnomad_like() -> SourceTable {
        let mut table = SourceTable::new(
            "gnomad",
            vec!["variant_id".to_string(), "Allele Frequency".to_string()],
        );
        let mut row = VariantRecord::from_source(Source::Gnomad);
        row.set("variant_id", "6-100-A-G");
        row.set("Allele Frequency", DatumType::Integer(0));
        table.push(row);
        let mut row = VariantRecord::from_source(Source::Gnomad);
        row.set("variant_id", "6-200-C-T");
        row.set("Allele Frequency", DatumType::Float(0.5));
        table.push(row);
        table
    }

    #[test]
    fn test_namespace_suffixes_once() {
        let mut table = gnomad_like();
        table.namespace(Source::Gnomad);
        table.namespace(Source::Gnomad);
        assert_eq!(
            table.columns,
            vec!["variant_id_gnomad", "Allele Frequency_gnomad"]
        );
        assert_eq!(
            table.records[0].key("variant_id_gnomad"),
            Some("6-100-A-G".to_string())
        );
        assert!(table.records[0].get("variant_id").is_none());
    }

    #[test]
    fn test_convert_dtypes_promotes_to_float() {
        let mut table = gnomad_like();
        table.convert_dtypes().unwrap();
        assert_eq!(
            table.records[0].value("Allele Frequency"),
            &DatumType::Float(0.0)
        );
    }

    #[test]
    fn test_convert_dtypes_undeclared_field() {
        let mut table = gnomad_like();
        table.records[0].set("stray", "x");
        let err = table.convert_dtypes().unwrap_err();
        assert!(matches!(err, VarMergeError::DtypeError { .. }));
    }

    #[test]
    fn test_select_missing_column() {
        let table = gnomad_like();
        assert!(table.select(&["variant_id"]).is_ok());
        assert!(matches!(
            table.select(&["nope"]),
            Err(VarMergeError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_concat_union_columns() {
        let mut left = gnomad_like();
        let mut right = SourceTable::new("other", vec!["extra".to_string()]);
        let mut row = VariantRecord::new();
        row.set("extra", "x");
        right.push(row);
        left.concat(right);
        assert_eq!(left.len(), 3);
        assert!(left.has_column("extra"));
        assert!(left.records[0].value("extra").is_null());
    }
}
