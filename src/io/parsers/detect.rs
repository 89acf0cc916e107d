//! Source file type detection.
//!

use std::path::{Path, PathBuf};

use super::{
    clinvar_xml::ClinvarXmlParser,
    lovd::LovdParser,
    tabular::{GenericTabularParser, TabularParser},
    utils::get_base_extension,
};
use crate::data::SourceTable;
use crate::error::VarMergeError;
use crate::io::file::{require_exists, InputFile};
use crate::traits::SourceParser;
use crate::Source;

/// The first characters of every LOVD export.
pub const LOVD_MAGIC: &str = "### LOVD-version";

/// Enum that indicates which parser a source file needs.
#[derive(Debug, PartialEq)]
pub enum SourceFile {
    Lovd(PathBuf),
    Tabular(PathBuf),
    ClinvarXml(PathBuf),
    Generic(PathBuf),
}

impl SourceFile {
    /// Detect the kind of source file we are working with.
    ///
    /// Detection works like this:
    ///  1. A file whose first line starts with `### LOVD-version` is a LOVD export,
    ///     whatever its extension.
    ///  2. Otherwise the extension is used, ignoring compression extensions
    ///     (`.gz` and `.bgz`): `.xml` is ClinVar XML, `.csv` is a comma-separated
    ///     table, and `.tsv`, `.txt`, `.xlsx`, `.xls`, and `.ods` go to the generic
    ///     tabular parser.
    ///  3. Anything else is rejected with [`VarMergeError::UnsupportedFileFormat`].
    pub fn detect(filepath: impl Into<PathBuf>) -> Result<Self, VarMergeError> {
        let filepath: PathBuf = filepath.into();
        require_exists(&filepath)?;

        let extension = get_base_extension(&filepath)
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();

        // binary spreadsheets are not sniffed
        if !matches!(extension.as_str(), "xlsx" | "xls" | "ods") {
            let first_line = InputFile::new(&filepath).first_line().unwrap_or(None);
            if first_line.map_or(false, |line| line.starts_with(LOVD_MAGIC)) {
                return Ok(SourceFile::Lovd(filepath));
            }
        }

        match extension.as_str() {
            "xml" => Ok(SourceFile::ClinvarXml(filepath)),
            "csv" => Ok(SourceFile::Tabular(filepath)),
            "tsv" | "txt" | "xlsx" | "xls" | "ods" => Ok(SourceFile::Generic(filepath)),
            _ => Err(VarMergeError::UnsupportedFileFormat(extension)),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            SourceFile::Lovd(path)
            | SourceFile::Tabular(path)
            | SourceFile::ClinvarXml(path)
            | SourceFile::Generic(path) => path,
        }
    }

    /// Detect a single-table source file and parse it, tagging rows with `source`.
    ///
    /// LOVD exports hold several tables and are parsed with [`LovdParser`]
    /// directly; passing one here is a [`VarMergeError::ParseError`].
    pub fn read_table(filepath: impl Into<PathBuf>, source: Source) -> Result<SourceTable, VarMergeError> {
        match Self::detect(filepath)? {
            SourceFile::Tabular(path) => TabularParser::new(source).parse(&path),
            SourceFile::ClinvarXml(path) => ClinvarXmlParser::new().parse(&path),
            SourceFile::Generic(path) => GenericTabularParser::new(source).parse(&path),
            SourceFile::Lovd(path) => Err(VarMergeError::ParseError(format!(
                "{} is a LOVD export, not a {:?} table",
                path.display(),
                source
            ))),
        }
    }

    /// Parse a LOVD export, checking it looks like one first.
    pub fn read_lovd(
        filepath: impl Into<PathBuf>,
    ) -> Result<indexmap::IndexMap<String, SourceTable>, VarMergeError> {
        match Self::detect(filepath)? {
            SourceFile::Lovd(path) => LovdParser::new().parse(&path),
            other => Err(VarMergeError::ParseError(format!(
                "{} does not start with '{}'",
                other.path().display(),
                LOVD_MAGIC
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utilities::temp_file_with;

    #[test]
    fn test_source_file_detect() {
        let (_dir, lovd) = temp_file_with("export.txt", "### LOVD-version 3000-290 ###\n");
        assert!(matches!(SourceFile::detect(&lovd).unwrap(), SourceFile::Lovd(_)));

        let (_dir, xml) = temp_file_with("clinvar.xml", "<Root/>\n");
        assert!(matches!(SourceFile::detect(&xml).unwrap(), SourceFile::ClinvarXml(_)));

        let (_dir, csv) = temp_file_with("gnomad.csv", "variant_id\n6-1-A-G\n");
        assert!(matches!(SourceFile::detect(&csv).unwrap(), SourceFile::Tabular(_)));

        let (_dir, txt) = temp_file_with("custom.txt", "Chromosome\tPosition\n");
        assert!(matches!(SourceFile::detect(&txt).unwrap(), SourceFile::Generic(_)));

        let (_dir, bed) = temp_file_with("ranges.bed", "chr1\t0\t10\n");
        assert!(matches!(
            SourceFile::detect(&bed),
            Err(VarMergeError::UnsupportedFileFormat(_))
        ));
    }

    #[test]
    fn test_read_lovd_rejects_other_files() {
        let (_dir, csv) = temp_file_with("gnomad.csv", "variant_id\n6-1-A-G\n");
        assert!(matches!(
            SourceFile::read_lovd(&csv),
            Err(VarMergeError::ParseError(_))
        ));
        assert!(matches!(
            SourceFile::detect("tests_data/missing.csv"),
            Err(VarMergeError::NotFound(_))
        ));
    }
}
