//! Collapsing a merged table into one row per canonical key.

use std::collections::BTreeMap;

use crate::data::{DatumType, SourceTable, VariantRecord};
use crate::Source;

/// The key column holding the aggregated canonical key.
pub const GEN_POS: &str = "gen_pos";

/// Which key columns are counted, and which annotation columns are carried.
#[derive(Clone, Debug)]
pub struct AggregateSpec {
    /// `(key column, count column)` pairs, in output order.
    pub count_columns: Vec<(String, String)>,
    /// Count pairs that are only used when their key column exists.
    pub optional_count_columns: Vec<(String, String)>,
    pub annotation_columns: Vec<String>,
}

impl Default for AggregateSpec {
    fn default() -> Self {
        let pair = |key: &str, source: Source| (key.to_string(), source.count_column().to_string());
        Self {
            count_columns: vec![
                pair("hg38_gnomad_format", Source::Lovd),
                pair("variant_id_gnomad", Source::Gnomad),
                pair("hg38_ID_clinvar", Source::Clinvar),
            ],
            optional_count_columns: vec![pair("hg38_data_custom", Source::Custom)],
            annotation_columns: [
                "VariantOnTranscript/DNA",
                "VariantOnTranscript/Protein",
                "malformed",
                "VariantOnGenome/ClinicalClassification",
                "Germline classification_clinvar",
                "Allele Frequency_gnomad",
                "Popmax_gnomad",
                "Popmax population_gnomad",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        }
    }
}

impl AggregateSpec {
    /// The count pairs that apply to `table`.
    fn active_counts(&self, table: &SourceTable) -> Vec<(String, String)> {
        let mut counts = self.count_columns.clone();
        counts.extend(
            self.optional_count_columns
                .iter()
                .filter(|(key, _)| table.has_column(key))
                .cloned(),
        );
        counts
    }
}

struct KeyGroup {
    counts: Vec<i64>,
    annotations: Vec<DatumType>,
}

/// Aggregate `merged` by canonical key.
///
/// Every non-null value of every counted key column contributes one occurrence
/// to its key, including the `?` sentinel. Per key, each annotation column takes
/// the first non-null value, visiting key columns in order and rows in table
/// order within each. The output is sorted by key, with columns `gen_pos`, the
/// annotation columns, then the count columns.
pub fn aggregate_by_key(merged: &SourceTable, spec: &AggregateSpec) -> SourceTable {
    let counts = spec.active_counts(merged);
    let mut groups: BTreeMap<String, KeyGroup> = BTreeMap::new();

    for (i, (key_column, _)) in counts.iter().enumerate() {
        for record in &merged.records {
            let Some(key) = record.key(key_column) else {
                continue;
            };
            let group = groups.entry(key).or_insert_with(|| KeyGroup {
                counts: vec![0; counts.len()],
                annotations: vec![DatumType::NoValue; spec.annotation_columns.len()],
            });
            group.counts[i] += 1;
            for (slot, column) in group.annotations.iter_mut().zip(&spec.annotation_columns) {
                if slot.is_null() {
                    let value = record.value(column);
                    if !value.is_null() {
                        *slot = value.clone();
                    }
                }
            }
        }
    }

    let mut columns = vec![GEN_POS.to_string()];
    columns.extend(spec.annotation_columns.iter().cloned());
    columns.extend(counts.iter().map(|(_, count)| count.clone()));
    let mut aggregated = SourceTable::new("aggregated", columns);

    for (key, group) in groups {
        let mut record = VariantRecord::new();
        record.set(GEN_POS, key);
        for (column, value) in spec.annotation_columns.iter().zip(group.annotations) {
            record.set(column.as_str(), value);
        }
        for ((_, count_column), count) in counts.iter().zip(group.counts) {
            record.set(count_column.as_str(), count);
        }
        aggregated.records.push(record);
    }
    log::info!(
        "aggregated {} merged rows into {} keys",
        merged.len(),
        aggregated.len()
    );
    aggregated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merged() -> SourceTable {
        let columns = ["hg38_gnomad_format", "variant_id_gnomad", "hg38_ID_clinvar", "VariantOnTranscript/DNA"];
        let mut table = SourceTable::new("merged", columns.iter().map(|c| c.to_string()).collect());
        let rows: [[Option<&str>; 4]; 4] = [
            [Some("6-1-A-G"), Some("6-1-A-G"), None, None],
            [Some("6-1-A-G"), None, Some("6-1-A-G"), Some("c.1A>G")],
            [Some("?"), None, None, Some("c.5del")],
            [None, None, Some("6-9-C-T"), None],
        ];
        for row in rows {
            let mut record = VariantRecord::new();
            for (column, value) in columns.iter().zip(row) {
                record.set(*column, DatumType::from(value));
            }
            table.push(record);
        }
        table
    }

    #[test]
    fn test_counts_and_order() {
        let table = merged();
        let aggregated = aggregate_by_key(&table, &AggregateSpec::default());
        let keys: Vec<_> = aggregated
            .records
            .iter()
            .map(|r| r.key(GEN_POS).unwrap())
            .collect();
        assert_eq!(keys, vec!["6-1-A-G", "6-9-C-T", "?"]);
        let first = &aggregated.records[0];
        assert_eq!(first.value("LOVD_count"), &DatumType::Integer(2));
        assert_eq!(first.value("gnomAD_count"), &DatumType::Integer(1));
        assert_eq!(first.value("ClinVar_count"), &DatumType::Integer(1));
        assert_eq!(first.value("VariantOnTranscript/DNA"), &DatumType::from("c.1A>G"));
        assert_eq!(aggregated.records[2].value("LOVD_count"), &DatumType::Integer(1));
        assert!(!aggregated.has_column("Custom_count"));
        assert_eq!(aggregated.columns.first().map(String::as_str), Some(GEN_POS));
        assert_eq!(aggregated.columns.last().map(String::as_str), Some("ClinVar_count"));
    }

    #[test]
    fn test_count_conservation() {
        let table = merged();
        let spec = AggregateSpec::default();
        let aggregated = aggregate_by_key(&table, &spec);
        for (key_column, count_column) in &spec.count_columns {
            let total: f64 = aggregated
                .column_values(count_column)
                .filter_map(DatumType::as_f64)
                .sum();
            assert_eq!(total as usize, table.count_non_null(key_column));
        }
    }

    #[test]
    fn test_custom_counts_when_present() {
        let mut table = merged();
        let mut record = VariantRecord::new();
        record.set("hg38_data_custom", "6-1-A-G");
        table.push(record);
        let aggregated = aggregate_by_key(&table, &AggregateSpec::default());
        assert_eq!(aggregated.columns.last().map(String::as_str), Some("Custom_count"));
        assert_eq!(aggregated.records[0].value("Custom_count"), &DatumType::Integer(1));
        assert_eq!(aggregated.records[1].value("Custom_count"), &DatumType::Integer(0));
    }
}
