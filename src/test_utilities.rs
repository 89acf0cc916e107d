//! Test cases and test utility functions.
//!

use flate2::write::GzEncoder;
use flate2::Compression;
use rand::{thread_rng, Rng};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::annotation::retry::Clock;
use crate::annotation::session::{AnnotationSession, SessionFactory};
use crate::annotation::JobHandle;
use crate::data::{DatumType, SourceTable, VariantRecord};
use crate::error::VarMergeError;
use crate::io::InputFile;
use crate::liftover::CoordinateConverter;
use crate::{Assembly, Position, SENTINEL_KEY};

// Stochastic test record defaults
//
// This is the random number of records to use in tests.
// The tradeoff is catching stochastic errors vs test time.
pub const NRANDOM_RECORDS: usize = 5000;

// positions on chromosome 6
pub const MIN_POS: Position = 1;
pub const MAX_POS: Position = 1_000_000;

// chance a key column is null, or the sentinel
pub const NULL_PROB: f64 = 0.3;
pub const SENTINEL_PROB: f64 = 0.05;

const BASES: [&str; 4] = ["A", "C", "G", "T"];

/// Sample a random base.
pub fn random_base() -> &'static str {
    BASES[thread_rng().gen_range(0..BASES.len())]
}

/// Build a random `6-pos-ref-alt` key.
pub fn random_key() -> String {
    let mut rng = thread_rng();
    let pos = rng.gen_range(MIN_POS..=MAX_POS);
    format!("6-{}-{}-{}", pos, random_base(), random_base())
}

fn random_key_value() -> DatumType {
    let mut rng = thread_rng();
    let draw: f64 = rng.gen();
    if draw < NULL_PROB {
        DatumType::NoValue
    } else if draw < NULL_PROB + SENTINEL_PROB {
        DatumType::from(SENTINEL_KEY)
    } else {
        DatumType::from(random_key())
    }
}

/// Build `n` random merged rows, with random (possibly null or sentinel) LOVD,
/// gnomAD, and ClinVar keys.
pub fn random_merged_table(n: usize) -> SourceTable {
    let columns = ["hg38_gnomad_format", "variant_id_gnomad", "hg38_ID_clinvar"];
    let mut table = SourceTable::new("random", columns.iter().map(|c| c.to_string()).collect());
    for _ in 0..n {
        let mut record = VariantRecord::new();
        for column in columns {
            record.set(column, random_key_value());
        }
        table.push(record);
    }
    table
}

/// Build `n` rows with distinct `gen_pos` keys, ready for annotation.
pub fn random_keyed_table(n: usize) -> SourceTable {
    let mut table = SourceTable::new("keyed", vec!["gen_pos".to_string()]);
    for i in 0..n {
        let mut record = VariantRecord::new();
        record.set("gen_pos", format!("6-{}-{}-{}", i + 1, random_base(), random_base()));
        table.push(record);
    }
    table
}

/// Write `contents` to a file called `name` in a new temporary directory.
/// The directory is removed when the returned [`TempDir`] is dropped.
pub fn temp_file_with(name: &str, contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("could not create temporary directory");
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("could not write temporary file");
    (dir, path)
}

/// A GRCh37 to GRCh38 converter that shifts positions by a fixed offset, with
/// optional per-position overrides.
#[derive(Clone, Debug, Default)]
pub struct OffsetConverter {
    offset: Option<Position>,
    mapping: HashMap<Position, Position>,
}

impl OffsetConverter {
    pub fn new(offset: Position) -> Self {
        Self {
            offset: Some(offset),
            mapping: HashMap::new(),
        }
    }

    /// A converter that maps nothing.
    pub fn unmapped() -> Self {
        Self::default()
    }

    pub fn with_mapping(mut self, from: Position, to: Position) -> Self {
        self.mapping.insert(from, to);
        self
    }
}

impl CoordinateConverter for OffsetConverter {
    fn convert(&self, from: Assembly, to: Assembly, _chrom: &str, pos: Position) -> Option<Position> {
        if from == to {
            return Some(pos);
        }
        self.mapping
            .get(&pos)
            .copied()
            .or_else(|| self.offset.map(|offset| pos + offset))
    }
}

/// A [`Clock`] whose sleeps return immediately and only advance its time.
#[derive(Debug, Default)]
pub struct FakeClock {
    elapsed: Mutex<Duration>,
    sleeps: AtomicUsize,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of times `sleep` was called.
    pub fn sleeps(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Clock for FakeClock {
    fn elapsed(&self) -> Duration {
        *self.elapsed.lock().expect("clock lock poisoned")
    }

    fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().expect("clock lock poisoned") += duration;
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }
}

/// What the fake service saw.
#[derive(Clone, Debug, Default)]
pub struct FakeServiceLog {
    pub opened: Vec<usize>,
    /// Variant lines uploaded, per chunk.
    pub submitted: HashMap<usize, Vec<String>>,
    pub polls: usize,
    pub fetched: Vec<usize>,
}

/// A fake scoring service. Every submitted variant is scored with `RawScore`
/// 0.5 and a `PHRED` of its position modulo 100.
#[derive(Clone, Debug, Default)]
pub struct FakeSessionFactory {
    /// Polls until a job is ready (`None` = never).
    pub ready_after: Option<usize>,
    /// The chunk whose upload fails.
    pub fail_submit: Option<usize>,
    pub log: Arc<Mutex<FakeServiceLog>>,
}

impl FakeSessionFactory {
    pub fn ready_after(polls: usize) -> Self {
        Self {
            ready_after: Some(polls),
            ..Self::default()
        }
    }

    pub fn never_ready() -> Self {
        Self::default()
    }

    pub fn with_failing_submit(mut self, chunk_id: usize) -> Self {
        self.fail_submit = Some(chunk_id);
        self
    }

    pub fn service_log(&self) -> FakeServiceLog {
        self.log.lock().expect("log lock poisoned").clone()
    }
}

impl SessionFactory for FakeSessionFactory {
    fn open(&self, chunk_id: usize) -> Result<Box<dyn AnnotationSession>, VarMergeError> {
        self.log.lock().expect("log lock poisoned").opened.push(chunk_id);
        Ok(Box::new(FakeSession {
            chunk_id,
            ready_after: self.ready_after,
            fail_submit: self.fail_submit == Some(chunk_id),
            polls: 0,
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeSession {
    chunk_id: usize,
    ready_after: Option<usize>,
    fail_submit: bool,
    polls: usize,
    log: Arc<Mutex<FakeServiceLog>>,
}

impl AnnotationSession for FakeSession {
    fn submit(&mut self, file: &Path) -> Result<JobHandle, VarMergeError> {
        if self.fail_submit {
            return Err(VarMergeError::AnnotationServiceError(format!(
                "upload of chunk {} rejected",
                self.chunk_id
            )));
        }
        let lines = InputFile::new(file)
            .reader()?
            .lines()
            .collect::<Result<Vec<_>, _>>()?;
        self.log
            .lock()
            .expect("log lock poisoned")
            .submitted
            .insert(self.chunk_id, lines);
        Ok(JobHandle::new(format!("GRCh38-v1.7_{}.tsv.gz", self.chunk_id)))
    }

    fn poll(&mut self, _job: &JobHandle) -> Result<bool, VarMergeError> {
        self.polls += 1;
        self.log.lock().expect("log lock poisoned").polls += 1;
        Ok(self.ready_after.map_or(false, |ready| self.polls >= ready))
    }

    fn fetch(&mut self, job: &JobHandle, dir: &Path) -> Result<PathBuf, VarMergeError> {
        let mut log = self.log.lock().expect("log lock poisoned");
        log.fetched.push(self.chunk_id);
        let lines = log.submitted.get(&self.chunk_id).cloned().unwrap_or_default();
        drop(log);

        let path = dir.join(&job.job_file);
        let mut writer = GzEncoder::new(File::create(&path)?, Compression::default());
        writeln!(writer, "## CADD GRCh38-v1.7 (fake)")?;
        writeln!(writer, "#Chrom\tPos\tRef\tAlt\tRawScore\tPHRED")?;
        for line in lines {
            let fields: Vec<&str> = line.split('\t').collect();
            let phred = fields[1].parse::<u64>().map_or(0, |pos| pos % 100);
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t0.5\t{}",
                fields[0], fields[1], fields[3], fields[4], phred
            )?;
        }
        writer.finish()?;
        Ok(path)
    }
}
