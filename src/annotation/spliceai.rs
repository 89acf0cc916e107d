//! Scoring with the SpliceAI command line tool.

use indexmap::IndexMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use super::codec::{encode, record_key, Scores, VcfHeader};
use crate::config::SpliceAiConfig;
use crate::data::operations::max_finite;
use crate::data::{DatumType, SourceTable, VariantRecord};
use crate::error::VarMergeError;
use crate::io::file::require_exists;

/// The SpliceAI input file written into the work directory.
pub const INPUT_VCF: &str = "spliceai_input.vcf";
/// The SpliceAI output file written into the work directory.
pub const OUTPUT_VCF: &str = "spliceai_output.vcf";

/// Score names, in output order. Each becomes a `<name>_spliceai` field.
pub const SCORE_NAMES: [&str; 9] = [
    "Delta score (acceptor gain)",
    "Delta score (acceptor loss)",
    "Delta score (donor gain)",
    "Delta score (donor loss)",
    "Delta position (acceptor gain)",
    "Delta position (acceptor loss)",
    "Delta position (donor gain)",
    "Delta position (donor loss)",
    "Max_Delta_Score",
];

pub const SUFFIX: &str = "_spliceai";

/// The output field names.
pub fn score_fields() -> Vec<String> {
    SCORE_NAMES
        .iter()
        .map(|name| format!("{}{}", name, SUFFIX))
        .collect()
}

/// A command line scorer that reads one VCF and writes another.
pub trait AnnotationTool {
    fn run(&self, input: &Path, output: &Path, reference: &Path) -> Result<(), VarMergeError>;
}

/// Runs `spliceai -I <in> -O <out> -R <fasta> -A <annotation> -D <distance>`,
/// with `-B <batch size>` when CUDA batching is configured.
#[derive(Clone, Debug)]
pub struct SpliceAiCli {
    pub config: SpliceAiConfig,
}

impl SpliceAiCli {
    pub fn new(config: SpliceAiConfig) -> Self {
        Self { config }
    }

    pub fn args(&self, input: &Path, output: &Path, reference: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-I".into(),
            input.display().to_string(),
            "-O".into(),
            output.display().to_string(),
            "-R".into(),
            reference.display().to_string(),
            "-A".into(),
            self.config.annotation.clone(),
            "-D".into(),
            self.config.distance.to_string(),
        ];
        if let Some(batch_size) = self.config.batch_size {
            args.push("-B".into());
            args.push(batch_size.to_string());
        }
        args
    }
}

impl AnnotationTool for SpliceAiCli {
    fn run(&self, input: &Path, output: &Path, reference: &Path) -> Result<(), VarMergeError> {
        require_exists(reference)?;
        let args = self.args(input, output, reference);
        log::info!("running {} {}", self.config.binary.display(), args.join(" "));
        let result = Command::new(&self.config.binary)
            .args(&args)
            .output()
            .map_err(|e| {
                VarMergeError::AnnotationToolError(format!(
                    "could not run '{}': {}",
                    self.config.binary.display(),
                    e
                ))
            })?;
        if !result.status.success() {
            return Err(VarMergeError::AnnotationToolError(format!(
                "SpliceAI failed ({}): {}",
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// The nine scores of one `SpliceAI=` INFO annotation, or `None` if any part
/// of it is missing or non-numeric.
fn parse_annotation(annotation: &str, pos: i64) -> Option<Vec<DatumType>> {
    let fields: Vec<&str> = annotation.split('|').collect();
    if fields.len() < 10 {
        return None;
    }
    let deltas = fields[2..6]
        .iter()
        .map(|v| v.trim().parse::<f64>().ok())
        .collect::<Option<Vec<f64>>>()?;
    let positions = fields[6..10]
        .iter()
        .map(|v| v.trim().parse::<i64>().ok().and_then(|delta| pos.checked_add(delta)))
        .collect::<Option<Vec<i64>>>()?;
    let max_delta = max_finite(&deltas)?;

    let mut scores: Vec<DatumType> = deltas.into_iter().map(DatumType::Float).collect();
    scores.extend(positions.into_iter().map(DatumType::Integer));
    scores.push(DatumType::Float(max_delta));
    Some(scores)
}

/// Read SpliceAI scores from an annotated VCF, keyed by `chrom-pos-ref-alt`.
///
/// Only the first annotation of the first `SpliceAI=` INFO entry is used.
/// Records without one are absent from the result; records whose annotation
/// does not parse map to all-null scores.
pub fn parse_spliceai_vcf<R: BufRead>(reader: R) -> Result<IndexMap<String, Scores>, VarMergeError> {
    let mut parsed = IndexMap::new();
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let columns: Vec<&str> = line.trim_end().split('\t').collect();
        if columns.len() < 8 {
            log::warn!("skipping VCF line with {} columns", columns.len());
            continue;
        }
        let key = format!("{}-{}-{}-{}", columns[0], columns[1], columns[3], columns[4]);
        let Some(entry) = columns[7]
            .split(';')
            .find_map(|part| part.strip_prefix("SpliceAI="))
        else {
            continue;
        };
        let first = entry.split(',').next().unwrap_or_default();
        let values = columns[1]
            .parse::<i64>()
            .ok()
            .and_then(|pos| parse_annotation(first, pos));
        if values.is_none() {
            log::debug!("SpliceAI scores for {} are unavailable: '{}'", key, first);
        }
        let scores: Scores = match values {
            Some(values) => score_fields().into_iter().zip(values).collect(),
            None => score_fields()
                .into_iter()
                .map(|name| (name, DatumType::NoValue))
                .collect(),
        };
        parsed.insert(key, scores);
    }
    Ok(parsed)
}

/// Give every record the nine SpliceAI fields, null where the key it was
/// encoded under was not scored.
pub fn merge_spliceai_scores(records: &mut [VariantRecord], scores: &IndexMap<String, Scores>) {
    let fields = score_fields();
    for record in records.iter_mut() {
        let found = record_key(record).and_then(|key| scores.get(&key));
        for field in &fields {
            let value = found
                .and_then(|scores| scores.get(field))
                .cloned()
                .unwrap_or(DatumType::NoValue);
            record.set(field.as_str(), value);
        }
    }
}

/// Encodes rows, runs an [`AnnotationTool`] over them, and merges its scores
/// back.
pub struct SpliceAiPipeline<'a> {
    tool: &'a dyn AnnotationTool,
    max_entries: Option<usize>,
}

impl<'a> SpliceAiPipeline<'a> {
    pub fn new(tool: &'a dyn AnnotationTool) -> Self {
        Self {
            tool,
            max_entries: None,
        }
    }

    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Score `table` against `reference`, keeping the tool's input and output
    /// VCFs in `workdir`.
    pub fn run(
        &self,
        table: &SourceTable,
        reference: &Path,
        workdir: &Path,
    ) -> Result<SourceTable, VarMergeError> {
        let mut annotated = table.clone();
        if let Some(max_entries) = self.max_entries {
            annotated.truncate(max_entries);
        }
        std::fs::create_dir_all(workdir)?;
        let input: PathBuf = workdir.join(INPUT_VCF);
        let output: PathBuf = workdir.join(OUTPUT_VCF);

        let mut writer = BufWriter::new(File::create(&input)?);
        let report = encode(&annotated.records, &mut writer, Some(&VcfHeader::grch38_today()))?;
        writer.flush()?;
        drop(writer);
        log::info!(
            "wrote {} variants to {} ({} skipped)",
            report.written,
            input.display(),
            report.skipped()
        );

        self.tool.run(&input, &output, reference)?;
        let scores = parse_spliceai_vcf(BufReader::new(File::open(&output)?))?;
        merge_spliceai_scores(&mut annotated.records, &scores);
        for field in score_fields() {
            annotated.add_column(field);
        }
        Ok(annotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VCF: &str = "##fileformat=VCFv4.2\n\
        #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
        6\t1000\t.\tA\tG\t.\t.\tSpliceAI=G|DPP6|0.01|0.00|0.85|0.10|-12|3|2|-40,G|X|0.9|0.9|0.9|0.9|1|1|1|1\n\
        6\t2000\t.\tC\tT\t.\t.\tSpliceAI=T|DPP6|.|.|.|.|.|.|.|.\n\
        6\t3000\t.\tC\tT\t.\t.\t.\n";

    #[test]
    fn test_parse_first_annotation() {
        let scores = parse_spliceai_vcf(VCF.as_bytes()).unwrap();
        assert_eq!(scores.len(), 2);
        let first = &scores["6-1000-A-G"];
        assert_eq!(first["Delta score (donor gain)_spliceai"], DatumType::Float(0.85));
        assert_eq!(first["Delta position (acceptor gain)_spliceai"], DatumType::Integer(988));
        assert_eq!(first["Delta position (donor loss)_spliceai"], DatumType::Integer(960));
        assert_eq!(first["Max_Delta_Score_spliceai"], DatumType::Float(0.85));
        assert!(scores["6-2000-C-T"].values().all(DatumType::is_null));
        assert!(!scores.contains_key("6-3000-C-T"));
    }

    #[test]
    fn test_merge_gives_every_row_every_field() {
        let scores = parse_spliceai_vcf(VCF.as_bytes()).unwrap();
        let mut records = vec![VariantRecord::new(), VariantRecord::new()];
        records[0].set("gen_pos", "6-1000-A-G");
        records[1].set("gen_pos", "6-9-A-G");
        merge_spliceai_scores(&mut records, &scores);
        for record in &records {
            assert_eq!(record.field_names().count(), 10);
        }
        assert_eq!(records[0].value("Delta score (acceptor gain)_spliceai"), &DatumType::Float(0.01));
        assert!(records[1].value("Max_Delta_Score_spliceai").is_null());
    }

    #[test]
    fn test_position_overflow_nulls_scores() {
        let vcf = "6\t9223372036854775800\t.\tC\tT\t.\t.\tSpliceAI=T|DPP6|0.1|0.2|0.3|0.4|1|2|3|100\n";
        let scores = parse_spliceai_vcf(vcf.as_bytes()).unwrap();
        let parsed = &scores["6-9223372036854775800-C-T"];
        assert!(parsed.values().all(DatumType::is_null));
    }

    #[test]
    fn test_merge_by_source_key() {
        let scores = parse_spliceai_vcf(VCF.as_bytes()).unwrap();
        let mut records = vec![VariantRecord::new(), VariantRecord::new()];
        records[0].set("gen_pos", "?");
        records[0].set("hg38_gnomad_format", "6-1000-A-G");
        records[1].set("variant_id_gnomad", "6-1000-A-G");

        let mut buffer = Vec::new();
        let report = encode(&records, &mut buffer, None).unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(String::from_utf8(buffer).unwrap(), "6\t1000\t.\tA\tG\t.\t.\t.\n");

        merge_spliceai_scores(&mut records, &scores);
        for record in &records {
            assert_eq!(record.value("Max_Delta_Score_spliceai"), &DatumType::Float(0.85));
        }
    }

    #[test]
    fn test_cli_args() {
        let cli = SpliceAiCli::new(SpliceAiConfig::default().with_cuda_batch_size(Some(64)));
        let args = cli.args(Path::new("in.vcf"), Path::new("out.vcf"), Path::new("hg38.fa"));
        assert_eq!(
            args,
            ["-I", "in.vcf", "-O", "out.vcf", "-R", "hg38.fa", "-A", "grch38", "-D", "500", "-B", "64"]
        );
        let plain = SpliceAiCli::new(SpliceAiConfig::default());
        assert!(!plain.args(Path::new("a"), Path::new("b"), Path::new("c")).contains(&"-B".to_string()));
    }

    #[test]
    fn test_missing_reference() {
        let cli = SpliceAiCli::new(SpliceAiConfig::default());
        let result = cli.run(Path::new("in.vcf"), Path::new("out.vcf"), Path::new("no/such/hg38.fa"));
        assert!(matches!(result, Err(VarMergeError::NotFound(_))));
    }
}
