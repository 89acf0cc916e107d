//! Traits used by the varmerge library.
//!

use std::path::Path;

use crate::{error::VarMergeError, io::tsv::TsvConfig};

/// Defines how to serialize something to TSV.
pub trait TsvSerialize {
    // Serialize something to a TSV [`String`].
    fn to_tsv(&self, config: &TsvConfig) -> String;
}

/// The shared contract of every source parser: read one file into one or more
/// tables.
///
/// Implementations must raise [`VarMergeError::NotFound`] when the path does not
/// exist, before doing anything else.
pub trait SourceParser {
    type Output;
    fn parse(&self, path: &Path) -> Result<Self::Output, VarMergeError>;
}
