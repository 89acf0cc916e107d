//! Scoring a merged table with fake CADD and SpliceAI collaborators.

use std::fs;
use std::io::Write;
use std::path::Path;

use varmerge::{
    aggregate::GEN_POS,
    annotation::{
        chunked::CaddPipeline,
        codec::record_key,
        spliceai::{AnnotationTool, SpliceAiPipeline, INPUT_VCF, OUTPUT_VCF},
    },
    config::{CaddConfig, MergeConfig},
    merge::{merge_all, merge_lovd_gnomad_sources, MergeSources, SourcePaths},
    prelude::*,
    test_utilities::{FakeClock, FakeSessionFactory},
};

fn sources() -> MergeSources {
    let paths = SourcePaths {
        lovd: "tests_data/lovd.txt".into(),
        gnomad: Some("tests_data/gnomad.csv".into()),
        clinvar: Some("tests_data/clinvar.csv".into()),
        custom: None,
    };
    MergeSources::load(&paths).unwrap()
}

fn converter() -> ChainConverter {
    ChainConverter::from_file("tests_data/hg19ToHg38.chain", Assembly::GRCh37, Assembly::GRCh38)
        .unwrap()
}

fn merged() -> SourceTable {
    merge_all(sources(), &MergeConfig::default(), &converter()).unwrap()
}

/// A LOVD and gnomAD merge: rows are keyed by `hg38_gnomad_format` and
/// `variant_id_gnomad`, with no `gen_pos` column.
fn lovd_gnomad() -> SourceTable {
    let table = merge_lovd_gnomad_sources(sources(), &MergeConfig::default(), &converter()).unwrap();
    assert!(!table.has_column(GEN_POS));
    table
}

fn is_scorable(record: &VariantRecord) -> bool {
    record_key(record).map_or(false, |key| parse_key(&key).is_some())
}

#[test]
fn test_cadd_scores_merged_table() {
    let table = merged();
    let factory = FakeSessionFactory::ready_after(1);
    let clock = FakeClock::new();
    let workdir = tempfile::tempdir().unwrap();

    let scored = CaddPipeline::new(CaddConfig::default(), &factory, &clock)
        .run(&table, workdir.path())
        .unwrap();
    assert_eq!(scored.len(), table.len());
    for record in &scored.records {
        let key = record.key(GEN_POS).unwrap();
        let scorable = parse_key(&key).is_some();
        assert_eq!(
            record.value("RawScore_cadd") == &DatumType::Float(0.5),
            scorable,
            "{}",
            key
        );
    }
    // the dup and sentinel rows are never uploaded
    let log = factory.service_log();
    let uploaded: usize = log.submitted.values().map(Vec::len).sum();
    assert_eq!(uploaded, 3);
    assert_eq!(clock.sleeps(), 0);
    assert_eq!(fs::read_dir(workdir.path()).unwrap().count(), 0);
}

#[test]
fn test_cadd_max_entries() {
    let table = merged();
    let factory = FakeSessionFactory::ready_after(1);
    let clock = FakeClock::new();
    let workdir = tempfile::tempdir().unwrap();
    let config = CaddConfig::default().with_max_entries(Some(2));
    let scored = CaddPipeline::new(config, &factory, &clock)
        .run(&table, workdir.path())
        .unwrap();
    assert_eq!(scored.len(), 2);
    assert_eq!(factory.service_log().opened, vec![0, 1]);
}

#[test]
fn test_cadd_scores_rows_without_gen_pos() {
    let table = lovd_gnomad();
    let factory = FakeSessionFactory::ready_after(1);
    let clock = FakeClock::new();
    let workdir = tempfile::tempdir().unwrap();

    let scored = CaddPipeline::new(CaddConfig::default(), &factory, &clock)
        .run(&table, workdir.path())
        .unwrap();
    assert_eq!(scored.len(), table.len());
    let mut n_scored = 0;
    for record in &scored.records {
        let has_score = record.value("RawScore_cadd") == &DatumType::Float(0.5);
        assert_eq!(has_score, is_scorable(record), "{:?}", record_key(record));
        n_scored += usize::from(has_score);
    }
    assert!(n_scored >= 3);
    let uploaded: usize = factory.service_log().submitted.values().map(Vec::len).sum();
    assert!(uploaded > 0);
}

/// Annotates every input variant with fixed SpliceAI scores.
struct FakeSpliceAi;

impl AnnotationTool for FakeSpliceAi {
    fn run(&self, input: &Path, output: &Path, _reference: &Path) -> Result<(), VarMergeError> {
        let vcf = fs::read_to_string(input)?;
        let mut writer = fs::File::create(output)?;
        for line in vcf.lines() {
            if line.starts_with('#') {
                writeln!(writer, "{}", line)?;
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            writeln!(
                writer,
                "{}\tSpliceAI={}|DPP6|0.02|0.00|0.40|0.10|-5|12|1|30",
                fields[..7].join("\t"),
                fields[4]
            )?;
        }
        Ok(())
    }
}

struct BrokenTool;

impl AnnotationTool for BrokenTool {
    fn run(&self, _input: &Path, _output: &Path, _reference: &Path) -> Result<(), VarMergeError> {
        Err(VarMergeError::AnnotationToolError("exit status: 1".to_string()))
    }
}

#[test]
fn test_spliceai_scores_merged_table() {
    let table = merged();
    let workdir = tempfile::tempdir().unwrap();
    let scored = SpliceAiPipeline::new(&FakeSpliceAi)
        .run(&table, Path::new("hg38.fa"), workdir.path())
        .unwrap();

    assert_eq!(scored.len(), table.len());
    assert!(scored.has_column("Max_Delta_Score_spliceai"));
    let row = |key: &str| {
        scored
            .records
            .iter()
            .find(|r| r.key(GEN_POS).as_deref() == Some(key))
            .unwrap()
    };
    let snv = row("6-15406400-C-T");
    assert_eq!(snv.value("Max_Delta_Score_spliceai"), &DatumType::Float(0.4));
    assert_eq!(
        snv.value("Delta position (acceptor gain)_spliceai"),
        &DatumType::Integer(15406395)
    );
    assert!(row("6-15425000-dup").value("Max_Delta_Score_spliceai").is_null());
    assert!(row(SENTINEL_KEY).value("Max_Delta_Score_spliceai").is_null());

    let input = fs::read_to_string(workdir.path().join(INPUT_VCF)).unwrap();
    assert!(input.contains("##reference=GRCh38"));
    assert_eq!(input.lines().filter(|l| !l.starts_with('#')).count(), 3);
    assert!(workdir.path().join(OUTPUT_VCF).exists());
}

#[test]
fn test_spliceai_scores_rows_without_gen_pos() {
    let table = lovd_gnomad();
    let workdir = tempfile::tempdir().unwrap();
    let scored = SpliceAiPipeline::new(&FakeSpliceAi)
        .run(&table, Path::new("hg38.fa"), workdir.path())
        .unwrap();

    assert_eq!(scored.len(), table.len());
    let lifted = scored
        .records
        .iter()
        .find(|r| record_key(r).as_deref() == Some("6-15400100-C-A"))
        .unwrap();
    assert_eq!(lifted.value("Max_Delta_Score_spliceai"), &DatumType::Float(0.4));
    for record in &scored.records {
        assert_eq!(
            !record.value("Max_Delta_Score_spliceai").is_null(),
            is_scorable(record),
            "{:?}",
            record_key(record)
        );
    }
}

#[test]
fn test_spliceai_tool_failure() {
    let table = merged();
    let workdir = tempfile::tempdir().unwrap();
    let result = SpliceAiPipeline::new(&BrokenTool).run(&table, Path::new("hg38.fa"), workdir.path());
    assert!(matches!(result, Err(VarMergeError::AnnotationToolError(_))));
}
