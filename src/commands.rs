//! The command line subcommands, as library functions.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{
    aggregate::GEN_POS,
    annotation::{
        chunked::CaddPipeline,
        codec::{encode_genomic_changes, record_key, VcfHeader},
        retry::SystemClock,
        session::CaddSessionFactory,
        spliceai::{SpliceAiCli, SpliceAiPipeline},
    },
    config::{CaddConfig, MergeConfig, SpliceAiConfig},
    io::file::{require_exists, OutputFile},
    io::parsers::{
        lovd::GENOME_TABLE,
        tabular::{build_delimited_reader, read_delimited},
        ClinvarXmlParser, SourceFile,
    },
    key::DEFAULT_CHROMOSOME,
    liftover::{ChainConverter, CoordinateConverter, NoLiftover},
    merge::{
        merge_all, merge_lovd_clinvar_sources, merge_lovd_gnomad_sources, write_table,
        MergeSources, SourcePaths, GENOME_DNA_HG38, LOVD_KEY, MALFORMED,
    },
    prelude::*,
    reporting::{CommandOutput, Report},
};

/// Which sources a merge combines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeMode {
    /// LOVD, ClinVar, gnomAD (and custom), aggregated by key.
    All,
    LovdGnomad,
    LovdClinvar,
}

fn count_sentinels(table: &SourceTable, column: &str) -> usize {
    table
        .column_values(column)
        .filter(|v| v.as_str() == Some(SENTINEL_KEY))
        .count()
}

/// Merge source files and write the result as CSV.
pub fn varmerge_merge(
    paths: &SourcePaths,
    chain: Option<&PathBuf>,
    mode: MergeMode,
    config: &MergeConfig,
    output: &Path,
    override_existing: bool,
) -> Result<CommandOutput<SourceTable>, VarMergeError> {
    let mut report = Report::new();
    let converter: Box<dyn CoordinateConverter> = match chain {
        Some(chain) => Box::new(ChainConverter::from_file(chain, Assembly::GRCh37, Assembly::GRCh38)?),
        None => {
            report.add_issue(
                "no chain file given: LOVD rows without GRCh38 notation get the '?' key".to_string(),
            );
            Box::new(NoLiftover)
        }
    };

    let sources = MergeSources::load(paths)?;
    let merged = match mode {
        MergeMode::All => {
            let merged = merge_all(sources, config, converter.as_ref())?;
            report.add_count(count_sentinels(&merged, GEN_POS), "row(s) aggregated under the '?' key");
            merged
        }
        MergeMode::LovdGnomad => {
            let merged = merge_lovd_gnomad_sources(sources, config, converter.as_ref())?;
            report.add_count(count_sentinels(&merged, LOVD_KEY), "LOVD row(s) with an unresolved key");
            merged
        }
        MergeMode::LovdClinvar => {
            let merged = merge_lovd_clinvar_sources(sources, config, converter.as_ref())?;
            report.add_count(count_sentinels(&merged, LOVD_KEY), "LOVD row(s) with an unresolved key");
            report.add_count(
                merged.count_non_null(MALFORMED),
                "ClinVar name(s) without transcript notation",
            );
            merged
        }
    };
    let written = write_table(output, merged, override_existing)?;
    log::info!("wrote {} rows to {}", written.len(), output.display());
    Ok(CommandOutput::new(written, report))
}

fn read_csv(path: &Path) -> Result<SourceTable, VarMergeError> {
    require_exists(path)?;
    let reader = build_delimited_reader(path, b',')?;
    let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    read_delimited(reader, &name, None)
}

fn count_unscorable(table: &SourceTable) -> usize {
    table
        .records
        .iter()
        .filter(|r| record_key(r).map_or(true, |key| parse_key(&key).is_none()))
        .count()
}

/// Rows of `table` with no value under `column`, including when the column is
/// absent altogether.
fn count_unscored(table: &SourceTable, column: &str) -> usize {
    table.len().saturating_sub(table.count_non_null(column))
}

/// Score a merged CSV with the CADD web service.
pub fn varmerge_cadd(
    input: &Path,
    workdir: &Path,
    config: CaddConfig,
    output: &Path,
) -> Result<CommandOutput<SourceTable>, VarMergeError> {
    let table = read_csv(input)?;
    let mut report = Report::new();
    report.add_count(count_unscorable(&table), "row(s) without a chrom-pos-ref-alt key were not scored");

    let factory = CaddSessionFactory::new(config.base_url.clone(), config.version.clone());
    let clock = SystemClock::default();
    let scored = CaddPipeline::new(config, &factory, &clock).run(&table, workdir)?;
    report.add_count(
        count_unscored(&scored, "PHRED_cadd"),
        "row(s) have no CADD score",
    );
    let written = write_table(output, scored, true)?;
    Ok(CommandOutput::new(written, report))
}

/// Score a merged CSV with SpliceAI.
pub fn varmerge_spliceai(
    input: &Path,
    fasta: &Path,
    workdir: &Path,
    config: SpliceAiConfig,
    output: &Path,
) -> Result<CommandOutput<SourceTable>, VarMergeError> {
    let table = read_csv(input)?;
    let mut report = Report::new();
    report.add_count(count_unscorable(&table), "row(s) without a chrom-pos-ref-alt key were not scored");

    let max_entries = config.max_entries;
    let tool = SpliceAiCli::new(config);
    let scored = SpliceAiPipeline::new(&tool)
        .with_max_entries(max_entries)
        .run(&table, fasta, workdir)?;
    report.add_count(
        count_unscored(&scored, "Max_Delta_Score_spliceai"),
        "row(s) have no SpliceAI score",
    );
    let written = write_table(output, scored, true)?;
    Ok(CommandOutput::new(written, report))
}

/// Convert a ClinVar XML download to CSV, adding the canonical key.
pub fn varmerge_clinvar_xml(input: &Path, output: &Path) -> Result<CommandOutput<SourceTable>, VarMergeError> {
    let mut table = ClinvarXmlParser::new().parse(input)?;
    crate::merge::fill_clinvar_keys(&mut table)?;
    let mut report = Report::new();
    report.add_count(
        count_unscored(&table, "hg38_ID"),
        "record(s) without a usable canonical SPDI",
    );
    let written = write_table(output, table, true)?;
    Ok(CommandOutput::new(written, report))
}

/// Write the GRCh38 genome notation of a LOVD export as VCF, gzipped when
/// `output` ends in `.gz`.
pub fn varmerge_lovd_vcf(lovd: &Path, output: &Path) -> Result<CommandOutput<()>, VarMergeError> {
    let mut tables = SourceFile::read_lovd(lovd)?;
    let genome = crate::io::parsers::lovd::take_table(&mut tables, GENOME_TABLE)?;
    if !genome.has_column(GENOME_DNA_HG38) {
        return Err(VarMergeError::MissingColumn(GENOME_DNA_HG38.to_string()));
    }
    let mut writer = OutputFile::new(output).writer()?;
    VcfHeader::lovd().write(&mut writer)?;
    let encoded = encode_genomic_changes(genome.column_values(GENOME_DNA_HG38), DEFAULT_CHROMOSOME, &mut writer)?;
    writer.flush()?;

    let mut report = Report::new();
    report.add_count(encoded.malformed, "variant(s) were not single substitutions and were skipped");
    Ok(CommandOutput::new((), report))
}
