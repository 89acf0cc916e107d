//! # varmerge: harmonize genomic variant records from LOVD, gnomAD, ClinVar, and
//! custom sources into one table keyed by genomic coordinate.
//!
//! The library has two halves:
//!
//!  1. Normalization and merging. Every source notation (LOVD `g.` changes,
//!     ClinVar SPDI triples, gnomAD variant ids, custom chromosome/position/ref/alt
//!     columns) is converted into the canonical key `chrom-pos-ref-alt` (or
//!     `chrom-pos-dup` / `chrom-pos-del`), or the sentinel [`SENTINEL_KEY`].
//!     The [`merge`] module joins the per-source tables on this key and
//!     [`aggregate`] collapses them into one row per key with per-source counts.
//!
//!  2. Annotation. The merged table is serialized to a minimal VCF and scored by
//!     external collaborators: the CADD web service, driven in chunks through a
//!     submit/poll/fetch workflow ([`annotation::chunked`]), and the SpliceAI
//!     command line tool ([`annotation::spliceai`]).
//!

pub use indexmap;

pub mod aggregate;
pub mod annotation;
pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod join;
pub mod key;
pub mod liftover;
pub mod merge;
pub mod reporting;
pub mod test_utilities;
pub mod traits;

pub type Position = u64;

/// The key given to records whose coordinate could not be resolved.
pub const SENTINEL_KEY: &str = "?";

/// The source a record or table came from.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Source {
    Lovd,
    Gnomad,
    Clinvar,
    Custom,
}

impl Source {
    /// The suffix appended to this source's column names when merging.
    pub fn suffix(&self) -> &'static str {
        match self {
            Source::Lovd => "",
            Source::Gnomad => "_gnomad",
            Source::Clinvar => "_clinvar",
            Source::Custom => "_custom",
        }
    }

    /// The name of the per-key occurrence count column.
    pub fn count_column(&self) -> &'static str {
        match self {
            Source::Lovd => "LOVD_count",
            Source::Gnomad => "gnomAD_count",
            Source::Clinvar => "ClinVar_count",
            Source::Custom => "Custom_count",
        }
    }
}

/// Reference genome assemblies.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Assembly {
    GRCh37,
    GRCh38,
}

impl std::fmt::Display for Assembly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Assembly::GRCh37 => write!(f, "GRCh37"),
            Assembly::GRCh38 => write!(f, "GRCh38"),
        }
    }
}

pub mod prelude {
    pub use crate::data::{DatumType, SourceTable, VariantRecord};
    pub use crate::error::VarMergeError;
    pub use crate::join::{join, JoinHow};
    pub use crate::key::{normalize_key, normalize_spdi, parse_key, KeyNormalizer};
    pub use crate::liftover::{ChainConverter, CoordinateConverter};
    pub use crate::merge::{merge_all, MergeSources};
    pub use crate::traits::{SourceParser, TsvSerialize};
    pub use crate::{Assembly, Source, SENTINEL_KEY};
}
