//! The chunked CADD pipeline.
//!
//! Rows are split into contiguous chunks and each chunk goes through:
//!
//!  1. encode (parallel): `input/chunk_<id>.vcf`, gzipped;
//!  2. submit (sequential): one [`AnnotationSession`] per chunk;
//!  3. poll and fetch (sequential): `output/cadd_chunk_<id>.tsv.gz`;
//!  4. decode and merge (parallel): scores joined onto the chunk rows by the
//!     key each row was encoded under.
//!
//! A chunk with nothing to encode is never submitted; its job closes as
//! `Merged` and its rows pass through unscored.
//!
//! Chunk results are concatenated in chunk order. Any failure aborts the whole
//! run, and the chunk work directory is removed either way.

use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use super::codec::{decode_scores, encode, merge_scores, CADD_SCORES};
use super::retry::{poll_until_ready, CancelFlag, Clock};
use super::session::{AnnotationSession, SessionFactory};
use super::{AnnotationJob, JobState};
use crate::config::CaddConfig;
use crate::data::{SourceTable, VariantRecord};
use crate::error::VarMergeError;
use crate::io::file::{gunzip_file, gzip_file};

/// Split `n_rows` into `max(2, n_rows / chunk_rows)` contiguous ranges. The
/// first `n_rows % k` ranges get one extra row.
pub fn partition(n_rows: usize, chunk_rows: usize) -> Vec<Range<usize>> {
    let k = (n_rows / chunk_rows.max(1)).max(2);
    let base = n_rows / k;
    let extra = n_rows % k;
    let mut start = 0;
    (0..k)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// Per-chunk bookkeeping.
struct Chunk {
    id: usize,
    rows: Range<usize>,
    job: AnnotationJob,
    /// The gzipped VCF, `None` when the chunk had nothing to encode.
    input: Option<PathBuf>,
    /// The fetched, renamed score file.
    output: Option<PathBuf>,
}

fn encode_chunk(
    records: &[VariantRecord],
    input_dir: &Path,
    chunk_id: usize,
) -> Result<Option<PathBuf>, VarMergeError> {
    let vcf = input_dir.join(format!("chunk_{}.vcf", chunk_id));
    let mut writer = BufWriter::new(File::create(&vcf)?);
    let report = encode(records, &mut writer, None)?;
    writer.flush()?;
    drop(writer);

    if report.written == 0 {
        log::warn!("chunk {} has no scorable variants, skipping it", chunk_id);
        fs::remove_file(&vcf)?;
        return Ok(None);
    }
    let gz = gzip_file(&vcf)?;
    fs::remove_file(&vcf)?;
    Ok(Some(gz))
}

/// Move every chunk that has not finished to `Failed`.
fn fail_unfinished(chunks: &mut [Chunk]) {
    for chunk in chunks.iter_mut().filter(|c| !c.job.state().is_terminal()) {
        chunk.job.fail();
    }
}

/// Drives rows through a remote scoring service chunk by chunk.
pub struct CaddPipeline<'a> {
    config: CaddConfig,
    factory: &'a dyn SessionFactory,
    clock: &'a dyn Clock,
    cancel: CancelFlag,
}

impl<'a> CaddPipeline<'a> {
    pub fn new(config: CaddConfig, factory: &'a dyn SessionFactory, clock: &'a dyn Clock) -> Self {
        Self {
            config,
            factory,
            clock,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Score `table` and return its rows with `RawScore_cadd` and `PHRED_cadd`
    /// added where the service scored them. Scratch files live in a temporary
    /// directory under `workdir`.
    pub fn run(&self, table: &SourceTable, workdir: &Path) -> Result<SourceTable, VarMergeError> {
        let mut records = table.records.clone();
        if let Some(max_entries) = self.config.max_entries {
            records.truncate(max_entries);
        }

        fs::create_dir_all(workdir)?;
        let scratch = tempfile::Builder::new().prefix("cadd_").tempdir_in(workdir)?;
        let (scored, _) = self.score_chunks(&records, scratch.path())?;

        let mut columns = table.columns.clone();
        columns.extend(CADD_SCORES.iter().map(|(_, name)| name.to_string()));
        let mut annotated = SourceTable::new(table.name.clone(), columns);
        for rows in scored {
            annotated.records.extend(rows);
        }
        log::info!("CADD scoring finished for {} rows", annotated.len());
        Ok(annotated)
    }

    /// Score `records` chunk by chunk under `scratch`, returning each chunk's
    /// rows in order along with its finished job.
    fn score_chunks(
        &self,
        records: &[VariantRecord],
        scratch: &Path,
    ) -> Result<(Vec<Vec<VariantRecord>>, Vec<AnnotationJob>), VarMergeError> {
        let input_dir = scratch.join("input");
        let output_dir = scratch.join("output");
        fs::create_dir_all(&input_dir)?;
        fs::create_dir_all(&output_dir)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.num_threads)
            .build()
            .map_err(|e| VarMergeError::AnnotationServiceError(format!("thread pool: {}", e)))?;

        let ranges = partition(records.len(), self.config.chunk_rows);
        log::info!(
            "scoring {} rows in {} chunks of about {} rows",
            records.len(),
            ranges.len(),
            self.config.chunk_rows
        );

        let inputs = pool.install(|| {
            ranges
                .par_iter()
                .enumerate()
                .map(|(id, rows)| encode_chunk(&records[rows.clone()], &input_dir, id))
                .collect::<Result<Vec<_>, _>>()
        })?;
        let mut chunks: Vec<Chunk> = ranges
            .into_iter()
            .zip(inputs)
            .enumerate()
            .map(|(id, (rows, input))| Chunk {
                id,
                rows,
                job: AnnotationJob::new(id),
                input,
                output: None,
            })
            .collect();

        let result = self
            .submit_and_fetch(&mut chunks, &output_dir)
            .and_then(|()| {
                pool.install(|| {
                    chunks
                        .par_iter_mut()
                        .map(|chunk| decode_chunk(chunk, records))
                        .collect::<Result<Vec<_>, _>>()
                })
            });
        match result {
            Ok(scored) => Ok((scored, chunks.into_iter().map(|c| c.job).collect())),
            Err(e) => {
                fail_unfinished(&mut chunks);
                Err(e)
            }
        }
    }

    fn submit_and_fetch(&self, chunks: &mut [Chunk], output_dir: &Path) -> Result<(), VarMergeError> {
        let mut sessions = Vec::new();
        for chunk in chunks.iter_mut() {
            let Some(input) = chunk.input.take() else {
                chunk.job.skipped()?;
                continue;
            };
            let mut session = self.factory.open(chunk.id)?;
            let handle = session.submit(&input)?;
            chunk.job.submitted(handle)?;
            fs::remove_file(&input)?;
            sessions.push((chunk.id, session));
        }
        log::info!("submitted {} chunks", sessions.len());

        for (id, mut session) in sessions {
            let chunk = &mut chunks[id];
            chunk.output = Some(self.wait_and_fetch(&mut chunk.job, session.as_mut(), output_dir)?);
        }
        Ok(())
    }

    fn wait_and_fetch(
        &self,
        job: &mut AnnotationJob,
        session: &mut dyn AnnotationSession,
        output_dir: &Path,
    ) -> Result<PathBuf, VarMergeError> {
        let handle = job.require_handle()?.clone();
        job.transition(JobState::Polling)?;
        let what = format!("CADD chunk {} ({})", job.chunk_id, handle.job_file);
        poll_until_ready(&self.config.retry, self.clock, &self.cancel, &what, || {
            session.poll(&handle)
        })?;
        job.transition(JobState::Ready)?;

        let fetched = session.fetch(&handle, output_dir)?;
        let renamed = output_dir.join(format!("cadd_chunk_{}.tsv.gz", job.chunk_id));
        fs::rename(&fetched, &renamed)?;
        job.transition(JobState::Fetched)?;
        Ok(renamed)
    }
}

fn decode_chunk(chunk: &mut Chunk, records: &[VariantRecord]) -> Result<Vec<VariantRecord>, VarMergeError> {
    let mut rows = records[chunk.rows.clone()].to_vec();
    let Some(output) = chunk.output.take() else {
        return Ok(rows);
    };
    let tsv = gunzip_file(&output)?;
    let scores = decode_scores(BufReader::new(File::open(&tsv)?), &CADD_SCORES)?;
    fs::remove_file(&output)?;
    fs::remove_file(&tsv)?;
    chunk.job.transition(JobState::Parsed)?;

    let matched = merge_scores(&mut rows, &scores);
    chunk.job.transition(JobState::Merged)?;
    log::debug!(
        "chunk {}: {} scored variants, {} of {} rows matched",
        chunk.id,
        scores.len(),
        matched,
        rows.len()
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::JobHandle;
    use crate::data::DatumType;
    use crate::test_utilities::{random_keyed_table, FakeClock, FakeSessionFactory};

    #[test]
    fn test_partition_sizes() {
        let chunks = partition(1500, 1000);
        assert_eq!(chunks, vec![0..750, 750..1500]);

        let chunks = partition(500, 1000);
        assert_eq!(chunks.len(), 2);

        let chunks = partition(5003, 1000);
        assert_eq!(chunks.len(), 5);
        let lengths: Vec<_> = chunks.iter().map(|r| r.len()).collect();
        assert_eq!(lengths, vec![1001, 1001, 1001, 1000, 1000]);

        let chunks = partition(0, 1000);
        assert!(chunks.iter().all(|r| r.is_empty()));
    }

    fn config() -> CaddConfig {
        CaddConfig::default().with_chunk_rows(10).with_num_threads(2)
    }

    fn workdir_entries(workdir: &Path) -> usize {
        fs::read_dir(workdir).unwrap().count()
    }

    #[test]
    fn test_run_scores_every_row() {
        let table = random_keyed_table(35);
        let factory = FakeSessionFactory::ready_after(2);
        let clock = FakeClock::new();
        let workdir = tempfile::tempdir().unwrap();

        let scored = CaddPipeline::new(config(), &factory, &clock)
            .run(&table, workdir.path())
            .unwrap();
        assert_eq!(scored.len(), 35);
        assert!(scored.has_column("PHRED_cadd"));
        for (i, record) in scored.records.iter().enumerate() {
            assert_eq!(record.key("gen_pos"), table.records[i].key("gen_pos"));
            let phred = ((i + 1) % 100) as f64;
            assert_eq!(record.value("PHRED_cadd"), &DatumType::Float(phred));
        }

        let log = factory.service_log();
        assert_eq!(log.opened, vec![0, 1, 2]);
        assert_eq!(log.submitted[&0].len(), 12);
        assert_eq!(log.polls, 6);
        assert_eq!(clock.sleeps(), 3);
        assert_eq!(workdir_entries(workdir.path()), 0);
    }

    #[test]
    fn test_unscorable_chunk_passes_through() {
        let mut table = random_keyed_table(4);
        for record in table.records.iter_mut().take(2) {
            record.set("gen_pos", "?");
        }
        let factory = FakeSessionFactory::ready_after(1);
        let clock = FakeClock::new();
        let workdir = tempfile::tempdir().unwrap();
        let scored = CaddPipeline::new(config(), &factory, &clock)
            .run(&table, workdir.path())
            .unwrap();
        assert_eq!(scored.len(), 4);
        assert_eq!(factory.service_log().opened, vec![1]);
        assert!(scored.records[0].get("PHRED_cadd").is_none());
        assert!(!scored.records[3].value("PHRED_cadd").is_null());
    }

    #[test]
    fn test_every_job_finishes() {
        let mut table = random_keyed_table(4);
        for record in table.records.iter_mut().take(2) {
            record.set("gen_pos", "?");
        }
        let factory = FakeSessionFactory::ready_after(1);
        let clock = FakeClock::new();
        let scratch = tempfile::tempdir().unwrap();
        let pipeline = CaddPipeline::new(config(), &factory, &clock);
        let (scored, jobs) = pipeline.score_chunks(&table.records, scratch.path()).unwrap();
        assert_eq!(scored.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2]);
        let states: Vec<JobState> = jobs.iter().map(AnnotationJob::state).collect();
        assert_eq!(states, vec![JobState::Merged, JobState::Merged]);
        assert!(jobs[0].handle().is_none());
        assert!(jobs[1].handle().is_some());
    }

    #[test]
    fn test_scores_rows_keyed_by_source_columns() {
        let mut table = SourceTable::new("lovd_gnomad", vec!["hg38_gnomad_format".to_string()]);
        for key in ["6-100-A-G", "6-200-C-T", "?", "6-300-G-A"] {
            let mut record = VariantRecord::new();
            record.set("hg38_gnomad_format", key);
            table.push(record);
        }
        let factory = FakeSessionFactory::ready_after(1);
        let clock = FakeClock::new();
        let workdir = tempfile::tempdir().unwrap();
        let scored = CaddPipeline::new(config(), &factory, &clock)
            .run(&table, workdir.path())
            .unwrap();
        let phred: Vec<&DatumType> = scored.records.iter().map(|r| r.value("PHRED_cadd")).collect();
        assert_eq!(
            phred,
            vec![
                &DatumType::Float(0.0),
                &DatumType::Float(0.0),
                &DatumType::NoValue,
                &DatumType::Float(0.0)
            ]
        );
        assert_eq!(scored.records[0].value("RawScore_cadd"), &DatumType::Float(0.5));
    }

    #[test]
    fn test_never_ready_fails_and_cleans_up() {
        let table = random_keyed_table(20);
        let factory = FakeSessionFactory::never_ready();
        let clock = FakeClock::new();
        let workdir = tempfile::tempdir().unwrap();
        let result = CaddPipeline::new(config(), &factory, &clock).run(&table, workdir.path());
        assert!(matches!(result, Err(VarMergeError::AnnotationServiceError(_))));
        assert_eq!(factory.service_log().polls, 16);
        assert_eq!(clock.sleeps(), 15);
        assert_eq!(workdir_entries(workdir.path()), 0);
    }

    #[test]
    fn test_failed_submit_aborts() {
        let table = random_keyed_table(20);
        let factory = FakeSessionFactory::ready_after(1).with_failing_submit(1);
        let clock = FakeClock::new();
        let workdir = tempfile::tempdir().unwrap();
        let result = CaddPipeline::new(config(), &factory, &clock).run(&table, workdir.path());
        assert!(result.is_err());
        assert!(factory.service_log().fetched.is_empty());
        assert_eq!(workdir_entries(workdir.path()), 0);
    }

    #[test]
    fn test_failed_run_fails_unfinished_jobs() {
        let mut chunks: Vec<Chunk> = (0..3)
            .map(|id| Chunk {
                id,
                rows: id..id + 1,
                job: AnnotationJob::new(id),
                input: None,
                output: None,
            })
            .collect();
        chunks[0].job.skipped().unwrap();
        chunks[1].job.submitted(JobHandle::new("job.tsv.gz")).unwrap();
        fail_unfinished(&mut chunks);
        let states: Vec<JobState> = chunks.iter().map(|c| c.job.state()).collect();
        assert_eq!(states, vec![JobState::Merged, JobState::Failed, JobState::Failed]);
    }

    #[test]
    fn test_partition_covers_rows() {
        for n in [1, 2, 999, 2001, 10_000] {
            let chunks = partition(n, 1000);
            assert_eq!(chunks.iter().map(|r| r.len()).sum::<usize>(), n);
            assert_eq!(chunks.len(), (n / 1000).max(2));
            for pair in chunks.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
            }
        }
    }
}
