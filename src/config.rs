//! Typed configuration for the merge and annotation pipelines.
//!
//! The command line tool fills these from its arguments (and the `CUDA`,
//! `CUDA_BATCH_SIZE`, `MAX_ENTRIES`, and `CADD_URL` environment variables);
//! library users build them with the `with_*` setters.

use std::path::PathBuf;
use std::time::Duration;

use crate::annotation::retry::RetryPolicy;
use crate::key::DEFAULT_CHROMOSOME;

/// The CADD web service.
pub const DEFAULT_CADD_URL: &str = "https://cadd.bihealth.org";

/// The CADD model used for scoring.
pub const DEFAULT_CADD_VERSION: &str = "GRCh38-v1.7";

/// Rows per CADD chunk.
pub const DEFAULT_CHUNK_ROWS: usize = 1000;

/// Configuration for merging sources.
#[derive(Clone, Debug)]
pub struct MergeConfig {
    /// The chromosome LOVD `g.` notation refers to.
    pub chromosome: String,
    /// Add `Popmax` and `Popmax population` to gnomAD tables that carry
    /// per-population frequencies.
    pub popmax: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            chromosome: DEFAULT_CHROMOSOME.to_string(),
            popmax: true,
        }
    }
}

impl MergeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chromosome(mut self, chromosome: impl Into<String>) -> Self {
        self.chromosome = chromosome.into();
        self
    }

    pub fn with_popmax(mut self, popmax: bool) -> Self {
        self.popmax = popmax;
        self
    }
}

/// Configuration for the chunked CADD pipeline.
#[derive(Clone, Debug)]
pub struct CaddConfig {
    /// Base URL of the CADD service.
    pub base_url: String,
    /// The CADD model version requested on upload.
    pub version: String,
    /// Target rows per chunk; there are always at least two chunks.
    pub chunk_rows: usize,
    /// Threads for the encode and decode phases (0 = use rayon default).
    pub num_threads: usize,
    /// Only the first `max_entries` rows are scored.
    pub max_entries: Option<usize>,
    pub retry: RetryPolicy,
}

impl Default for CaddConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CADD_URL.to_string(),
            version: DEFAULT_CADD_VERSION.to_string(),
            chunk_rows: DEFAULT_CHUNK_ROWS,
            num_threads: 0,
            max_entries: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl CaddConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_chunk_rows(mut self, rows: usize) -> Self {
        self.chunk_rows = rows.max(1);
        self
    }

    pub fn with_num_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the poll budget: `max_attempts` retries after the first poll, `delay`
    /// apart.
    pub fn with_polling(mut self, max_attempts: usize, delay: Duration) -> Self {
        self.retry.max_attempts = max_attempts;
        self.retry.delay = delay;
        self
    }
}

/// Configuration for the SpliceAI command line tool.
#[derive(Clone, Debug)]
pub struct SpliceAiConfig {
    /// The `spliceai` executable.
    pub binary: PathBuf,
    /// Gene annotation, `grch37`, `grch38`, or a path to a custom file.
    pub annotation: String,
    /// Maximum distance between the variant and gained/lost splice site.
    pub distance: u32,
    /// Batch size, passed only when running on CUDA.
    pub batch_size: Option<u32>,
    /// Only the first `max_entries` rows are scored.
    pub max_entries: Option<usize>,
}

impl Default for SpliceAiConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("spliceai"),
            annotation: "grch38".to_string(),
            distance: 500,
            batch_size: None,
            max_entries: None,
        }
    }
}

impl SpliceAiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = annotation.into();
        self
    }

    pub fn with_distance(mut self, distance: u32) -> Self {
        self.distance = distance;
        self
    }

    /// Enable CUDA batching with the given batch size.
    pub fn with_cuda_batch_size(mut self, batch_size: Option<u32>) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }
}
