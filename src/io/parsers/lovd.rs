//! Parser for LOVD flat-text exports.
//!
//! An export looks like
//!
//! ```text
//! ### LOVD-version 3000-290 ### Full data download ### To import, do not remove or alter this header ###
//! ## Filter: (Gene = DPP6)
//! # charset = UTF-8
//!
//! ## Genes ## Do not remove or alter this header ##
//! ## Count = 1
//! "{{id}}"	"{{name}}"
//! "DPP6"	"dipeptidyl peptidase like 6"
//!
//!
//! ## Transcripts ## Do not remove or alter this header ##
//! ...
//! ```
//!
//! i.e. a four line preamble, then sections of a `## <table> ##` line, note lines,
//! one quoted header line, and quoted data lines, closed by a blank line and one
//! spacer line.

use indexmap::IndexMap;
use std::io::BufRead;
use std::path::Path;

use crate::data::{DatumType, SourceTable, VariantRecord};
use crate::error::VarMergeError;
use crate::io::file::InputFile;
use crate::traits::SourceParser;
use crate::Source;

/// Lines before the first section.
const PREAMBLE_LINES: usize = 4;

/// The table holding one row per transcript-level variant observation.
pub const TRANSCRIPT_TABLE: &str = "Variants_On_Transcripts";

/// The table holding one row per genomic variant.
pub const GENOME_TABLE: &str = "Variants_On_Genome";

/// Drop `n` characters from both ends of `value`.
fn strip_ends(value: &str, n: usize) -> &str {
    let count = value.chars().count();
    if count <= 2 * n {
        return "";
    }
    let start = value.char_indices().nth(n).map_or(0, |(i, _)| i);
    let end = value
        .char_indices()
        .nth(count - n)
        .map_or(value.len(), |(i, _)| i);
    &value[start..end]
}

/// Parses a LOVD export into its tables, keyed and ordered by table name.
#[derive(Clone, Debug, Default)]
pub struct LovdParser;

impl LovdParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse an export from any buffered reader.
    pub fn parse_reader<R: BufRead>(
        &self,
        reader: R,
    ) -> Result<IndexMap<String, SourceTable>, VarMergeError> {
        let mut tables = IndexMap::new();
        let mut lines = reader.lines().skip(PREAMBLE_LINES);

        while let Some(line) = lines.next() {
            let line = line?;
            let table_name = line
                .split("##")
                .nth(1)
                .map(|name| name.trim().to_string())
                .ok_or_else(|| {
                    VarMergeError::ParseError(format!("expected a LOVD table line, got '{}'", line))
                })?;

            let mut notes = Vec::new();
            let header = loop {
                match lines.next().transpose()? {
                    Some(line) if line.starts_with("##") => {
                        notes.push(line.get(3..).unwrap_or("").to_string())
                    }
                    Some(line) => break line,
                    None => {
                        return Err(VarMergeError::ParseError(format!(
                            "LOVD table '{}' has no header line",
                            table_name
                        )))
                    }
                }
            };
            if !notes.is_empty() {
                let listing: String = notes
                    .iter()
                    .enumerate()
                    .map(|(i, note)| format!("\n    - Note {}: {}", i + 1, note))
                    .collect();
                log::info!("[{}]{}", table_name, listing);
            }

            let columns: Vec<String> = header
                .split('\t')
                .map(|cell| strip_ends(cell, 3).to_string())
                .collect();
            let mut table = SourceTable::new(table_name.clone(), columns.clone());
            table.notes = notes;

            for line in lines.by_ref() {
                let line = line?;
                if line.is_empty() {
                    break;
                }
                let mut record = VariantRecord::from_source(Source::Lovd);
                for (column, cell) in columns.iter().zip(line.split('\t')) {
                    record.set(column.as_str(), DatumType::infer(strip_ends(cell, 1)));
                }
                table.push(record);
            }
            log::debug!("parsed LOVD table '{}' with {} rows", table_name, table.len());
            tables.insert(table_name, table);

            // spacer line between sections
            lines.next().transpose()?;
        }
        Ok(tables)
    }
}

impl SourceParser for LovdParser {
    type Output = IndexMap<String, SourceTable>;

    fn parse(&self, path: &Path) -> Result<Self::Output, VarMergeError> {
        let input = InputFile::new(path);
        let reader = input.reader()?;
        log::info!("Parsing file {} as a LOVD export.", path.display());
        self.parse_reader(reader)
    }
}

/// Take a required table out of a parsed export.
pub fn take_table(
    tables: &mut IndexMap<String, SourceTable>,
    name: &str,
) -> Result<SourceTable, VarMergeError> {
    tables
        .shift_remove(name)
        .ok_or_else(|| VarMergeError::MissingTable(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "### LOVD-version 3000-290 ### Full data download ###\n\
## Filter: (Gene = DPP6)\n\
# charset = UTF-8\n\
\n\
## Genes ## Do not remove or alter this header ##\n\
## Count = 1\n\
\"{{id}}\"\t\"{{name}}\"\n\
\"DPP6\"\t\"dipeptidyl peptidase like 6\"\n\
\n\
\n\
## Variants_On_Genome ## Do not remove or alter this header ##\n\
\"{{id}}\"\t\"{{VariantOnGenome/DNA}}\"\t\"{{VariantOnGenome/Frequency}}\"\n\
\"0000001\"\t\"g.153964C>T\"\t\"0.25\"\n\
\"0000002\"\t\"g.154000dup\"\t\"\"\n\
\n\
\n";

    #[test]
    fn test_parse_sections() {
        let tables = LovdParser::new().parse_reader(EXPORT.as_bytes()).unwrap();
        assert_eq!(tables.len(), 2);
        let names: Vec<_> = tables.keys().cloned().collect();
        assert_eq!(names, vec!["Genes", "Variants_On_Genome"]);

        let genes = &tables["Genes"];
        assert_eq!(genes.notes, vec!["Count = 1"]);
        assert_eq!(genes.columns, vec!["id", "name"]);

        let genome = &tables["Variants_On_Genome"];
        assert!(genome.notes.is_empty());
        assert_eq!(genome.len(), 2);
        // leading zeros are dropped by integer inference
        assert_eq!(genome.records[0].value("id"), &DatumType::Integer(1));
        assert_eq!(
            genome.records[0].value("VariantOnGenome/Frequency"),
            &DatumType::Float(0.25)
        );
        assert_eq!(
            genome.records[1].value("VariantOnGenome/Frequency"),
            &DatumType::String(String::new())
        );
    }

    #[test]
    fn test_take_missing_table() {
        let mut tables = LovdParser::new().parse_reader(EXPORT.as_bytes()).unwrap();
        assert!(take_table(&mut tables, GENOME_TABLE).is_ok());
        assert!(matches!(
            take_table(&mut tables, TRANSCRIPT_TABLE),
            Err(VarMergeError::MissingTable(_))
        ));
    }

    #[test]
    fn test_strip_ends() {
        assert_eq!(strip_ends("\"{{id}}\"", 3), "id");
        assert_eq!(strip_ends("\"x\"", 1), "x");
        assert_eq!(strip_ends("\"\"", 1), "");
        assert_eq!(strip_ends("a", 3), "");
    }
}
