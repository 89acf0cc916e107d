//! Preparing per-source tables and merging them on canonical keys.
//!
//! The full merge is:
//!
//! ```text
//! LOVD transcripts ⋈(left, id) LOVD genome     -> fill hg38_gnomad_format
//!     ⋈(outer) ClinVar   on hg38_gnomad_format = hg38_ID_clinvar   -> backfill from Name_clinvar
//!     ⋈(left)  gnomAD    on hg38_gnomad_format = variant_id_gnomad
//! custom ⋈(outer) rest   on hg38_data_custom   = hg38_gnomad_format   (optional)
//!     -> aggregate_by_key
//! ```

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::aggregate::{aggregate_by_key, AggregateSpec};
use crate::config::MergeConfig;
use crate::data::operations::argmax_above;
use crate::data::{DatumType, SourceTable, VariantRecord};
use crate::error::VarMergeError;
use crate::io::parsers::lovd::{take_table, GENOME_TABLE, TRANSCRIPT_TABLE};
use crate::io::parsers::tabular::{build_delimited_reader, read_delimited};
use crate::io::parsers::SourceFile;
use crate::join::{join, JoinHow};
use crate::key::{normalize_spdi, KeyNormalizer};
use crate::liftover::CoordinateConverter;
use crate::Source;

/// Canonical key of a LOVD row.
pub const LOVD_KEY: &str = "hg38_gnomad_format";
/// Canonical key of a ClinVar row, before namespacing.
pub const CLINVAR_KEY: &str = "hg38_ID";
/// Canonical key of a gnomAD row, before namespacing.
pub const GNOMAD_KEY: &str = "variant_id";
/// Canonical key of a custom row, before namespacing.
pub const CUSTOM_KEY: &str = "hg38_data";

pub const LOVD_ID: &str = "id";
pub const GENOME_DNA: &str = "VariantOnGenome/DNA";
pub const GENOME_DNA_HG38: &str = "VariantOnGenome/DNA/hg38";
pub const TRANSCRIPT_DNA: &str = "VariantOnTranscript/DNA";
pub const TRANSCRIPT_PROTEIN: &str = "VariantOnTranscript/Protein";
pub const MALFORMED: &str = "malformed";
pub const CLINVAR_NAME: &str = "Name_clinvar";
pub const CANONICAL_SPDI: &str = "Canonical SPDI";

/// The genome table columns carried onto each transcript row.
pub const GENOME_COLUMNS: [&str; 5] = [
    LOVD_ID,
    GENOME_DNA,
    GENOME_DNA_HG38,
    "VariantOnGenome/ClinicalClassification",
    "VariantOnGenome/ClinicalClassification/Method",
];

/// gnomAD population ids and their readable names, in comparison order.
pub const POPULATIONS: [(&str, &str); 10] = [
    ("afr", "African/African American"),
    ("eas", "East Asian"),
    ("asj", "Ashkenazi Jew"),
    ("sas", "South Asian"),
    ("nfe", "European (non-Finnish)"),
    ("fin", "European (Finnish)"),
    ("mid", "Middle Eastern"),
    ("amr", "Admixed American"),
    ("ami", "Amish"),
    ("remaining", "Remaining"),
];

lazy_static! {
    static ref CODING_CHANGE: Regex = Regex::new(r":(c\.[^ ]+)").unwrap();
    static ref PROTEIN_CHANGE: Regex = Regex::new(r" \((p\.[^)]*)\)").unwrap();
}

/// Join the LOVD transcript and genome tables on `id` and fill the LOVD key.
pub fn prepare_lovd(
    tables: &mut IndexMap<String, SourceTable>,
    normalizer: &KeyNormalizer,
    converter: &dyn CoordinateConverter,
) -> Result<SourceTable, VarMergeError> {
    let transcripts = take_table(tables, TRANSCRIPT_TABLE)?;
    let genome = take_table(tables, GENOME_TABLE)?.select(&GENOME_COLUMNS)?;
    let mut lovd = join(&transcripts, &genome, LOVD_ID, LOVD_ID, JoinHow::Left)?;
    fill_lovd_keys(&mut lovd, normalizer, converter);
    Ok(lovd)
}

/// Set `hg38_gnomad_format` on every LOVD row from its GRCh38 notation, lifting
/// the GRCh37 notation over when the GRCh38 one is missing.
pub fn fill_lovd_keys(
    lovd: &mut SourceTable,
    normalizer: &KeyNormalizer,
    converter: &dyn CoordinateConverter,
) {
    for record in lovd.records.iter_mut() {
        let key = normalizer.lovd_key(record.value(GENOME_DNA_HG38), record.value(GENOME_DNA), converter);
        record.set(LOVD_KEY, key);
    }
    lovd.add_column(LOVD_KEY);
}

/// Set `hg38_ID` on every ClinVar row from its canonical SPDI.
pub fn fill_clinvar_keys(clinvar: &mut SourceTable) -> Result<(), VarMergeError> {
    if !clinvar.has_column(CANONICAL_SPDI) {
        return Err(VarMergeError::MissingColumn(CANONICAL_SPDI.to_string()));
    }
    for record in clinvar.records.iter_mut() {
        let key = record
            .value(CANONICAL_SPDI)
            .as_key()
            .and_then(|spdi| normalize_spdi(&spdi));
        record.set(CLINVAR_KEY, key);
    }
    clinvar.add_column(CLINVAR_KEY);
    Ok(())
}

/// Set `hg38_data` on every custom row from its `Chromosome`, `Position`, `REF`,
/// and `ALT` columns. Rows missing any of them get a null key.
pub fn fill_custom_keys(custom: &mut SourceTable) {
    for record in custom.records.iter_mut() {
        let parts = ["Chromosome", "Position", "REF", "ALT"].map(|c| record.value(c).as_key());
        let key = match parts {
            [Some(chrom), Some(pos), Some(reference), Some(alternate)] => Some(format!(
                "{}-{}-{}-{}",
                chrom.replace("chr", ""),
                pos,
                reference,
                alternate
            )),
            _ => None,
        };
        record.set(CUSTOM_KEY, key);
    }
    custom.add_column(CUSTOM_KEY);
}

/// Add `Popmax` (the highest per-population allele frequency) and `Popmax
/// population` to a gnomAD table with `Allele_Frequency_<population>` columns.
/// Rows where no population has a positive frequency get `0` and an empty name.
pub fn find_popmax(gnomad: &mut SourceTable) {
    let columns: Vec<String> = POPULATIONS
        .iter()
        .map(|(id, _)| format!("Allele_Frequency_{}", id))
        .collect();
    if !columns.iter().any(|c| gnomad.has_column(c)) {
        log::debug!("no per-population frequencies in '{}', skipping popmax", gnomad.name);
        return;
    }
    for record in gnomad.records.iter_mut() {
        let frequencies: Vec<Option<f64>> = columns.iter().map(|c| record.value(c).as_f64()).collect();
        let (popmax, population) = match argmax_above(&frequencies, 0.0) {
            Some((i, frequency)) => (frequency, POPULATIONS[i].1),
            None => (0.0, ""),
        };
        record.set("Popmax", popmax);
        record.set("Popmax population", population);
    }
    gnomad.add_column("Popmax");
    gnomad.add_column("Popmax population");
}

/// Fill missing transcript notation from ClinVar names such as
/// `NM_001.3(DPP6):c.10C>T (p.Arg4Trp)`, and flag rows with a ClinVar name but
/// no transcript notation as `malformed`.
pub fn backfill_from_clinvar_name(merged: &mut SourceTable) {
    for record in merged.records.iter_mut() {
        let name = record.value(CLINVAR_NAME).as_key();
        if let Some(name) = &name {
            if let Some(caps) = CODING_CHANGE.captures(name) {
                fill_blank(record, TRANSCRIPT_DNA, &caps[1]);
            }
            if let Some(caps) = PROTEIN_CHANGE.captures(name) {
                fill_blank(record, TRANSCRIPT_PROTEIN, &caps[1]);
            }
        }
        let malformed = match name {
            Some(name) if is_blank(record.value(TRANSCRIPT_DNA)) => DatumType::String(name),
            _ => DatumType::NoValue,
        };
        record.set(MALFORMED, malformed);
    }
    merged.add_column(TRANSCRIPT_DNA);
    merged.add_column(TRANSCRIPT_PROTEIN);
    merged.add_column(MALFORMED);
}

/// LOVD marks missing cells with empty strings.
fn is_blank(value: &DatumType) -> bool {
    value.as_key().map_or(true, |v| v.is_empty())
}

fn fill_blank(record: &mut VariantRecord, field: &str, value: &str) {
    if is_blank(record.value(field)) {
        record.set(field, value);
    }
}

/// Outer-join prepared LOVD rows with ClinVar rows and backfill notation.
pub fn merge_lovd_clinvar(
    lovd: &SourceTable,
    mut clinvar: SourceTable,
) -> Result<SourceTable, VarMergeError> {
    if !clinvar.has_column(CLINVAR_KEY) && !clinvar.has_column("hg38_ID_clinvar") {
        fill_clinvar_keys(&mut clinvar)?;
    }
    clinvar.namespace(Source::Clinvar);
    let mut merged = join(lovd, &clinvar, LOVD_KEY, "hg38_ID_clinvar", JoinHow::Outer)?;
    backfill_from_clinvar_name(&mut merged);
    Ok(merged)
}

/// Left-join prepared LOVD (or LOVD+ClinVar) rows with gnomAD rows.
pub fn merge_lovd_gnomad(
    lovd: &SourceTable,
    mut gnomad: SourceTable,
) -> Result<SourceTable, VarMergeError> {
    gnomad.namespace(Source::Gnomad);
    join(lovd, &gnomad, LOVD_KEY, "variant_id_gnomad", JoinHow::Left)
}

/// Outer-join a custom table with everything else.
pub fn merge_custom(
    mut custom: SourceTable,
    rest: &SourceTable,
) -> Result<SourceTable, VarMergeError> {
    if !custom.has_column(CUSTOM_KEY) && !custom.has_column("hg38_data_custom") {
        fill_custom_keys(&mut custom);
    }
    custom.namespace(Source::Custom);
    join(&custom, rest, "hg38_data_custom", LOVD_KEY, JoinHow::Outer)
}

/// Paths to the source files of a merge.
#[derive(Clone, Debug)]
pub struct SourcePaths {
    pub lovd: PathBuf,
    pub gnomad: Option<PathBuf>,
    pub clinvar: Option<PathBuf>,
    pub custom: Option<PathBuf>,
}

/// Parsed and typed source tables, ready to merge.
#[derive(Clone, Debug)]
pub struct MergeSources {
    pub lovd: IndexMap<String, SourceTable>,
    pub gnomad: Option<SourceTable>,
    pub clinvar: Option<SourceTable>,
    pub custom: Option<SourceTable>,
}

impl MergeSources {
    /// Parse and type every given source. Missing files fail before anything is
    /// parsed.
    pub fn load(paths: &SourcePaths) -> Result<Self, VarMergeError> {
        for path in std::iter::once(&paths.lovd)
            .chain(paths.gnomad.iter())
            .chain(paths.clinvar.iter())
            .chain(paths.custom.iter())
        {
            crate::io::file::require_exists(path)?;
        }

        let mut lovd = SourceFile::read_lovd(&paths.lovd)?;
        for table in lovd.values_mut() {
            table.convert_dtypes()?;
        }
        Ok(Self {
            lovd,
            gnomad: load_table(paths.gnomad.as_deref(), Source::Gnomad)?,
            clinvar: load_table(paths.clinvar.as_deref(), Source::Clinvar)?,
            custom: load_table(paths.custom.as_deref(), Source::Custom)?,
        })
    }
}

fn load_table(path: Option<&Path>, source: Source) -> Result<Option<SourceTable>, VarMergeError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let mut table = SourceFile::read_table(path, source)?;
    table.convert_dtypes()?;
    Ok(Some(table))
}

fn required(table: Option<SourceTable>, name: &str) -> Result<SourceTable, VarMergeError> {
    table.ok_or_else(|| VarMergeError::MissingTable(name.to_string()))
}

/// Merge every source and aggregate by key.
pub fn merge_all(
    sources: MergeSources,
    config: &MergeConfig,
    converter: &dyn CoordinateConverter,
) -> Result<SourceTable, VarMergeError> {
    let MergeSources {
        mut lovd,
        gnomad,
        clinvar,
        custom,
    } = sources;
    let normalizer = KeyNormalizer::new(config.chromosome.clone());

    let lovd = prepare_lovd(&mut lovd, &normalizer, converter)?;
    let mut gnomad = required(gnomad, "gnomAD")?;
    if config.popmax {
        find_popmax(&mut gnomad);
    }
    let clinvar = required(clinvar, "ClinVar")?;

    let merged = merge_lovd_clinvar(&lovd, clinvar)?;
    let merged = merge_lovd_gnomad(&merged, gnomad)?;
    let merged = match custom {
        Some(custom) => merge_custom(custom, &merged)?,
        None => merged,
    };
    log::info!("merged sources into {} rows", merged.len());
    Ok(aggregate_by_key(&merged, &AggregateSpec::default()))
}

/// Merge LOVD with gnomAD only, without aggregating.
pub fn merge_lovd_gnomad_sources(
    sources: MergeSources,
    config: &MergeConfig,
    converter: &dyn CoordinateConverter,
) -> Result<SourceTable, VarMergeError> {
    let MergeSources { mut lovd, gnomad, .. } = sources;
    let normalizer = KeyNormalizer::new(config.chromosome.clone());
    let lovd = prepare_lovd(&mut lovd, &normalizer, converter)?;
    let mut gnomad = required(gnomad, "gnomAD")?;
    if config.popmax {
        find_popmax(&mut gnomad);
    }
    merge_lovd_gnomad(&lovd, gnomad)
}

/// Merge LOVD with ClinVar only, without aggregating.
pub fn merge_lovd_clinvar_sources(
    sources: MergeSources,
    config: &MergeConfig,
    converter: &dyn CoordinateConverter,
) -> Result<SourceTable, VarMergeError> {
    let MergeSources {
        mut lovd, clinvar, ..
    } = sources;
    let normalizer = KeyNormalizer::new(config.chromosome.clone());
    let lovd = prepare_lovd(&mut lovd, &normalizer, converter)?;
    merge_lovd_clinvar(&lovd, required(clinvar, "ClinVar")?)
}

/// Write `table` as CSV to `path`.
///
/// With `override_existing`, or when `path` does not exist yet, the file is
/// replaced. Otherwise the existing rows are read back and `table` is appended
/// after them, taking the union of columns.
pub fn write_table(
    path: impl AsRef<Path>,
    table: SourceTable,
    override_existing: bool,
) -> Result<SourceTable, VarMergeError> {
    let path = path.as_ref();
    let output = if path.exists() && !override_existing {
        let reader = build_delimited_reader(path, b',')?;
        let mut existing = read_delimited(reader, &table.name, None)?;
        log::info!(
            "appending {} rows to {} existing rows in {}",
            table.len(),
            existing.len(),
            path.display()
        );
        existing.concat(table);
        existing
    } else {
        table
    };
    output.to_csv(path)?;
    Ok(output)
}
