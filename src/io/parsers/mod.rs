//! Parsers for the variant sources.
//!
//! Every source is read into [`SourceTable`]s through the [`SourceParser`]
//! trait:
//!
//!  - [`LovdParser`]: the LOVD flat-text export, which holds several tables.
//!  - [`TabularParser`]: comma-separated exports with a header (gnomAD, and
//!    ClinVar's tabular download).
//!  - [`ClinvarXmlParser`]: ClinVar `VariationArchive` XML, streamed.
//!  - [`GenericTabularParser`]: user-supplied CSV, TSV, or spreadsheet files,
//!    chosen by extension.
//!
//! All of these work on plaintext and gzip-compressed files. When the kind of file
//! isn't known up front, [`SourceFile::detect()`] picks the parser.
//!
//! Cell values are typed with [`DatumType::infer()`]: a value containing `.`,
//! `E-`, or `E+` is tried as a float, anything else as an integer, falling back to
//! the original string.
//!
//! [`SourceTable`]: crate::data::SourceTable
//! [`SourceParser`]: crate::traits::SourceParser
//! [`DatumType::infer()`]: crate::data::DatumType::infer

pub mod clinvar_xml;
pub mod detect;
pub mod lovd;
pub mod tabular;
pub mod utils;

pub use clinvar_xml::ClinvarXmlParser;
pub use detect::SourceFile;
pub use lovd::LovdParser;
pub use tabular::{GenericTabularParser, TabularParser};
