//! Minimal VCF encoding of canonical keys, and decoding of scored files.
//!
//! Encoded lines carry only the coordinate, `CHROM POS . REF ALT . . .`; the
//! annotation collaborators fill in the rest.

use chrono::{Local, NaiveDate};
use indexmap::{IndexMap, IndexSet};
use std::io::{BufRead, Write};

use crate::data::{DatumType, VariantRecord};
use crate::error::VarMergeError;
use crate::key::{parse_key, DEFAULT_CHROMOSOME};
use crate::SENTINEL_KEY;

/// The record fields a key is taken from, in order of preference.
pub const KEY_FIELDS: [&str; 5] = [
    "gen_pos",
    "hg38_gnomad_format",
    "variant_id_gnomad",
    "hg38_ID_clinvar",
    "hg38_data_custom",
];

/// The CADD score columns: `(column index, output field)`.
pub const CADD_SCORES: [(usize, &str); 2] = [(4, "RawScore_cadd"), (5, "PHRED_cadd")];

/// GRCh38 chromosome 6.
pub const CHR6_GRCH38_LENGTH: u64 = 171_115_067;

/// The contig length declared by LOVD genome exports.
pub const LOVD_CONTIG_LENGTH: u64 = 63_719_980;

/// The meta-information lines and column header of a VCF.
#[derive(Clone, Debug, PartialEq)]
pub struct VcfHeader {
    pub file_date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub contig: Option<(String, u64)>,
}

impl VcfHeader {
    /// Just the format line and column header.
    pub fn minimal() -> Self {
        Self {
            file_date: None,
            reference: None,
            contig: None,
        }
    }

    /// The header SpliceAI input carries: today's date, GRCh38, chromosome 6.
    pub fn grch38_today() -> Self {
        Self {
            file_date: Some(Local::now().date_naive()),
            reference: Some("GRCh38".to_string()),
            contig: Some((DEFAULT_CHROMOSOME.to_string(), CHR6_GRCH38_LENGTH)),
        }
    }

    /// The header of LOVD genome exports.
    pub fn lovd() -> Self {
        Self {
            file_date: None,
            reference: None,
            contig: Some((DEFAULT_CHROMOSOME.to_string(), LOVD_CONTIG_LENGTH)),
        }
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), VarMergeError> {
        writeln!(writer, "##fileformat=VCFv4.2")?;
        if let Some(date) = self.file_date {
            writeln!(writer, "##fileDate={}", date.format("%Y%m%d"))?;
        }
        if let Some(reference) = &self.reference {
            writeln!(writer, "##reference={}", reference)?;
        }
        if let Some((id, length)) = &self.contig {
            writeln!(writer, "##contig=<ID={},length={}>", id, length)?;
        }
        writeln!(writer, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO")?;
        Ok(())
    }
}

/// Counts from one encoding pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EncodeReport {
    /// Lines written.
    pub written: usize,
    /// Rows with no usable key at all.
    pub keyless: usize,
    /// Rows whose key is not a four part `chrom-pos-ref-alt` key.
    pub malformed: usize,
    pub duplicates: usize,
}

impl EncodeReport {
    pub fn skipped(&self) -> usize {
        self.keyless + self.malformed + self.duplicates
    }
}

/// The first present, non-sentinel key among [`KEY_FIELDS`].
pub fn record_key(record: &VariantRecord) -> Option<String> {
    KEY_FIELDS
        .iter()
        .filter_map(|field| record.key(field))
        .find(|key| key != SENTINEL_KEY)
}

fn write_line<W: Write>(
    writer: &mut W,
    fields: [&str; 4],
) -> Result<(), VarMergeError> {
    let [chrom, pos, reference, alternate] = fields;
    writeln!(writer, "{}\t{}\t.\t{}\t{}\t.\t.\t.", chrom, pos, reference, alternate)?;
    Ok(())
}

/// Write one VCF line per distinct `(chrom, pos, ref, alt)` among `records`.
///
/// Keys that do not split into four parts (including `-dup`/`-del` keys) are
/// skipped with a warning; they never enter the seen set.
pub fn encode<'a, W: Write>(
    records: impl IntoIterator<Item = &'a VariantRecord>,
    writer: &mut W,
    header: Option<&VcfHeader>,
) -> Result<EncodeReport, VarMergeError> {
    if let Some(header) = header {
        header.write(writer)?;
    }
    let mut report = EncodeReport::default();
    let mut seen: IndexSet<(String, String, String, String)> = IndexSet::new();
    for record in records {
        let Some(key) = record_key(record) else {
            report.keyless += 1;
            continue;
        };
        let Some((chrom, pos, reference, alternate)) = parse_key(&key) else {
            log::warn!("skipping variant with malformed key '{}'", key);
            report.malformed += 1;
            continue;
        };
        let tuple = (
            chrom.to_string(),
            pos.to_string(),
            reference.to_string(),
            alternate.to_string(),
        );
        if seen.contains(&tuple) {
            report.duplicates += 1;
            continue;
        }
        write_line(writer, [chrom, pos, reference, alternate])?;
        seen.insert(tuple);
        report.written += 1;
    }
    log::debug!("encoded {:?}", report);
    Ok(report)
}

/// Write LOVD genome notation (`g.<8-digit position><ref>><alt>`) as VCF lines
/// on `chromosome`. Anything else is skipped with a warning.
pub fn encode_genomic_changes<'a, W: Write>(
    values: impl IntoIterator<Item = &'a DatumType>,
    chromosome: &str,
    writer: &mut W,
) -> Result<EncodeReport, VarMergeError> {
    let mut report = EncodeReport::default();
    for value in values {
        let Some(variant) = value.as_key() else {
            report.keyless += 1;
            continue;
        };
        let bytes = variant.as_bytes();
        if !variant.is_ascii() || bytes.len() != 13 || bytes[11] != b'>' {
            log::warn!("Skipping variant {}", variant);
            report.malformed += 1;
            continue;
        }
        write_line(writer, [chromosome, &variant[2..10], &variant[10..11], &variant[12..13]])?;
        report.written += 1;
    }
    Ok(report)
}

/// Scores of one variant, by output field name.
pub type Scores = IndexMap<String, DatumType>;

/// Read a tab-separated scored file keyed by its first four columns.
///
/// Lines starting with `#` are skipped. Each `(index, name)` in `columns` picks
/// a float score; a non-numeric or absent value is null. Lines with fewer than
/// four columns are skipped with a warning.
pub fn decode_scores<R: BufRead>(
    reader: R,
    columns: &[(usize, &str)],
) -> Result<IndexMap<String, Scores>, VarMergeError> {
    let mut decoded = IndexMap::new();
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            log::warn!("skipping scored line with {} columns: '{}'", fields.len(), line);
            continue;
        }
        let key = fields[..4].join("-");
        let scores = columns
            .iter()
            .map(|(index, name)| {
                let score = fields
                    .get(*index)
                    .and_then(|value| value.trim().parse::<f64>().ok())
                    .map_or(DatumType::NoValue, DatumType::Float);
                (name.to_string(), score)
            })
            .collect();
        decoded.insert(key, scores);
    }
    Ok(decoded)
}

/// Add decoded scores to every record whose [`record_key`] has them, the same
/// key [`encode`] wrote the record under. Returns the number of records that
/// matched.
pub fn merge_scores(records: &mut [VariantRecord], scores: &IndexMap<String, Scores>) -> usize {
    let mut matched = 0;
    for record in records.iter_mut() {
        let Some(found) = record_key(record).and_then(|key| scores.get(&key)) else {
            continue;
        };
        for (name, value) in found {
            record.set(name.as_str(), value.clone());
        }
        matched += 1;
    }
    matched
}
