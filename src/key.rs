//! Canonical variant keys.
//!
//! Every source notation is reduced to one of
//!
//! ```text
//! key := chrom "-" pos "-" ref "-" alt | chrom "-" pos "-dup" | chrom "-" pos "-del" | "?"
//! ```
//!
//! Normalization never fails: anything that cannot be resolved becomes
//! [`SENTINEL_KEY`] and is logged at `debug`.

use lazy_static::lazy_static;
use regex::Regex;

use crate::data::DatumType;
use crate::liftover::CoordinateConverter;
use crate::{Assembly, Position, SENTINEL_KEY};

lazy_static! {
    static ref GENOMIC_DUP: Regex = Regex::new(r"^g\.(\d+)dup$").unwrap();
    static ref GENOMIC_DEL: Regex = Regex::new(r"^g\.(\d+)del$").unwrap();
    static ref GENOMIC_SNV: Regex = Regex::new(r"^g\.(\d+)([A-Z])>([A-Z])$").unwrap();
    static ref GENOMIC_POSITION: Regex = Regex::new(r"g\.(\d+)").unwrap();
    static ref CANONICAL_KEY: Regex =
        Regex::new(r"^[0-9A-Za-z]+-\d+-(dup|del|[A-Za-z]+-[A-Za-z]+)$").unwrap();
}

/// The chromosome LOVD exports are assumed to be on.
pub const DEFAULT_CHROMOSOME: &str = "6";

/// Strip an `NC_` prefix, any version suffix, and leading zeros from a
/// chromosome name: `NC_000006.12` becomes `6`.
pub fn normalize_chromosome(chrom: &str) -> String {
    let chrom = chrom.strip_prefix("NC_").unwrap_or(chrom);
    let chrom = chrom.split('.').next().unwrap_or(chrom);
    let stripped = chrom.trim_start_matches('0');
    if stripped.is_empty() && !chrom.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

/// Convert a ClinVar canonical SPDI (`NC_000006.12:370530:C:T`) to a canonical
/// key (`6-370531-C-T`). SPDI positions are 0-based, so the key carries
/// position + 1.
pub fn normalize_spdi(spdi: &str) -> Option<String> {
    let parts: Vec<&str> = spdi.split(':').collect();
    let [chrom, position, reference, alternate] = parts.as_slice() else {
        log::debug!("SPDI '{}' does not have four fields", spdi);
        return None;
    };
    let Ok(position) = position.parse::<Position>() else {
        log::debug!("SPDI '{}' has a non-integer position", spdi);
        return None;
    };
    let Some(position) = position.checked_add(1) else {
        log::debug!("SPDI '{}' has a position past the end of any chromosome", spdi);
        return None;
    };
    Some(format!(
        "{}-{}-{}-{}",
        normalize_chromosome(chrom),
        position,
        reference,
        alternate
    ))
}

/// Re-normalize an already-canonical key. Canonical keys pass through
/// unchanged; everything else becomes the sentinel.
pub fn normalize_key(key: &str) -> String {
    if CANONICAL_KEY.is_match(key) {
        key.to_string()
    } else {
        SENTINEL_KEY.to_string()
    }
}

/// Split a four part key into `(chrom, pos, ref, alt)`.
pub fn parse_key(key: &str) -> Option<(&str, &str, &str, &str)> {
    let parts: Vec<&str> = key.split('-').collect();
    match parts.as_slice() {
        [chrom, pos, reference, alternate]
            if parts.iter().all(|part| !part.is_empty()) =>
        {
            Some((*chrom, *pos, *reference, *alternate))
        }
        _ => None,
    }
}

/// Converts LOVD genomic-change notation to canonical keys.
#[derive(Clone, Debug)]
pub struct KeyNormalizer {
    chromosome: String,
}

impl Default for KeyNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_CHROMOSOME)
    }
}

impl KeyNormalizer {
    pub fn new(chromosome: impl Into<String>) -> Self {
        Self {
            chromosome: chromosome.into(),
        }
    }

    pub fn chromosome(&self) -> &str {
        &self.chromosome
    }

    /// Convert `g.<pos>dup`, `g.<pos>del`, or `g.<pos><ref>><alt>` into a key.
    /// The shapes are tried in that order; anything else, including interval
    /// ranges such as `g.100_200del`, is the sentinel.
    pub fn normalize_genomic_change(&self, notation: &str) -> String {
        if let Some(caps) = GENOMIC_DUP.captures(notation) {
            return format!("{}-{}-dup", self.chromosome, &caps[1]);
        }
        if let Some(caps) = GENOMIC_DEL.captures(notation) {
            return format!("{}-{}-del", self.chromosome, &caps[1]);
        }
        if let Some(caps) = GENOMIC_SNV.captures(notation) {
            return format!("{}-{}-{}-{}", self.chromosome, &caps[1], &caps[2], &caps[3]);
        }
        log::debug!("unresolvable genomic change '{}'", notation);
        SENTINEL_KEY.to_string()
    }

    /// Return the GRCh38 notation if present, or lift the GRCh37 notation over.
    ///
    /// The lifted notation is `g.<new position>` followed by the last three
    /// characters of the legacy value (the `R>A` substitution). Legacy values
    /// that are missing, describe an interval (contain `_`), carry no position,
    /// or cannot be converted give the sentinel.
    pub fn liftover_if_missing(
        &self,
        modern: &DatumType,
        legacy: &DatumType,
        converter: &dyn CoordinateConverter,
    ) -> String {
        if let Some(modern) = modern.as_key().filter(|m| !m.is_empty()) {
            return modern;
        }
        let Some(legacy) = legacy.as_key().filter(|l| !l.is_empty()) else {
            return SENTINEL_KEY.to_string();
        };
        if legacy.contains('_') {
            return SENTINEL_KEY.to_string();
        }
        let Some(position) = GENOMIC_POSITION
            .captures(&legacy)
            .and_then(|caps| caps[1].parse::<Position>().ok())
        else {
            log::debug!("no genomic position in '{}'", legacy);
            return SENTINEL_KEY.to_string();
        };
        let Some(lifted) =
            converter.convert(Assembly::GRCh37, Assembly::GRCh38, &self.chromosome, position)
        else {
            log::debug!("could not lift '{}' to GRCh38", legacy);
            return SENTINEL_KEY.to_string();
        };
        let tail_start = legacy
            .char_indices()
            .rev()
            .nth(2)
            .map_or(0, |(index, _)| index);
        format!("g.{}{}", lifted, &legacy[tail_start..])
    }

    /// The full LOVD key: liftover if needed, then normalize.
    pub fn lovd_key(
        &self,
        modern: &DatumType,
        legacy: &DatumType,
        converter: &dyn CoordinateConverter,
    ) -> String {
        self.normalize_genomic_change(&self.liftover_if_missing(modern, legacy, converter))
    }
}
