//! Coordinate conversion between reference assemblies.
//!
//! [`CoordinateConverter`] is the seam used by the key normalizer; the merge
//! functions take a `&dyn CoordinateConverter` so a converter is loaded once and
//! reused for a whole batch. [`ChainConverter`] implements it from a UCSC chain
//! file (plain or gzip-compressed).

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use crate::error::VarMergeError;
use crate::io::file::InputFile;
use crate::{Assembly, Position};

/// Maps a position on one assembly to the equivalent position on another.
pub trait CoordinateConverter: Send + Sync {
    /// Returns `None` when the position cannot be mapped, e.g. it falls in a
    /// chain gap or on a contig the converter knows nothing about.
    fn convert(&self, from: Assembly, to: Assembly, chrom: &str, pos: Position)
        -> Option<Position>;
}

/// A converter with no chains: positions only "convert" to their own assembly,
/// so every GRCh37-only LOVD row gets the sentinel key.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLiftover;

impl CoordinateConverter for NoLiftover {
    fn convert(&self, from: Assembly, to: Assembly, _chrom: &str, pos: Position) -> Option<Position> {
        (from == to).then_some(pos)
    }
}

/// Drop a `chr` prefix so `chr6` and `6` name the same contig.
fn contig_name(chrom: &str) -> &str {
    chrom.strip_prefix("chr").unwrap_or(chrom)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strand {
    Plus,
    Minus,
}

impl Strand {
    fn parse(value: &str, line_num: usize) -> Result<Self, VarMergeError> {
        match value {
            "+" => Ok(Strand::Plus),
            "-" => Ok(Strand::Minus),
            _ => Err(VarMergeError::ParseError(format!(
                "invalid strand '{}' in chain file at line {}",
                value, line_num
            ))),
        }
    }
}

/// An ungapped alignment block, followed by the gaps to the next block.
#[derive(Clone, Copy, Debug)]
pub struct ChainBlock {
    pub size: Position,
    pub target_gap: Position,
    pub query_gap: Position,
}

/// One chain: an alignment between a contig in the source assembly (target) and
/// one in the destination assembly (query).
#[derive(Clone, Debug)]
pub struct Chain {
    pub score: u64,
    pub target_name: String,
    pub target_start: Position,
    pub target_end: Position,
    pub query_name: String,
    pub query_size: Position,
    pub query_strand: Strand,
    pub query_start: Position,
    pub blocks: Vec<ChainBlock>,
}

impl Chain {
    pub fn contains(&self, pos: Position) -> bool {
        pos >= self.target_start && pos < self.target_end
    }

    /// Lift a target position to the query. `None` if it falls in a gap.
    pub fn lift(&self, pos: Position) -> Option<Position> {
        if !self.contains(pos) {
            return None;
        }
        let mut t_pos = self.target_start;
        let mut q_pos = self.query_start;
        for block in &self.blocks {
            let block_end = t_pos + block.size;
            if pos < block_end {
                let offset = pos - t_pos;
                return Some(match self.query_strand {
                    Strand::Plus => q_pos + offset,
                    Strand::Minus => self.query_size.checked_sub(q_pos + offset + 1)?,
                });
            }
            t_pos = block_end + block.target_gap;
            q_pos += block.size + block.query_gap;
            if pos < t_pos {
                return None;
            }
        }
        None
    }

    fn parse_header(line: &str, line_num: usize) -> Result<Chain, VarMergeError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 12 {
            return Err(VarMergeError::ParseError(format!(
                "invalid chain header at line {}: expected 12+ fields, got {}",
                line_num,
                parts.len()
            )));
        }
        let number = |index: usize| -> Result<u64, VarMergeError> {
            parts[index].parse::<u64>().map_err(|_| {
                VarMergeError::ParseError(format!(
                    "invalid number '{}' in chain header at line {}",
                    parts[index], line_num
                ))
            })
        };
        Ok(Chain {
            score: number(1)?,
            target_name: contig_name(parts[2]).to_string(),
            target_start: number(5)?,
            target_end: number(6)?,
            query_name: contig_name(parts[7]).to_string(),
            query_size: number(8)?,
            query_strand: Strand::parse(parts[9], line_num)?,
            query_start: number(10)?,
            blocks: Vec::new(),
        })
    }

    fn parse_block(line: &str, line_num: usize) -> Result<ChainBlock, VarMergeError> {
        let parse = |value: &str| -> Result<Position, VarMergeError> {
            value.parse::<Position>().map_err(|_| {
                VarMergeError::ParseError(format!(
                    "invalid block '{}' in chain file at line {}",
                    line, line_num
                ))
            })
        };
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [size] => Ok(ChainBlock {
                size: parse(size)?,
                target_gap: 0,
                query_gap: 0,
            }),
            [size, target_gap, query_gap] => Ok(ChainBlock {
                size: parse(size)?,
                target_gap: parse(target_gap)?,
                query_gap: parse(query_gap)?,
            }),
            _ => Err(VarMergeError::ParseError(format!(
                "invalid block '{}' in chain file at line {}",
                line, line_num
            ))),
        }
    }
}

/// A [`CoordinateConverter`] backed by a UCSC chain file.
#[derive(Clone, Debug)]
pub struct ChainConverter {
    from: Assembly,
    to: Assembly,
    chains: HashMap<String, Vec<Chain>>,
}

impl ChainConverter {
    /// Load a chain file mapping `from` to `to`, e.g. `hg19ToHg38.over.chain.gz`.
    pub fn from_file(
        path: impl AsRef<Path>,
        from: Assembly,
        to: Assembly,
    ) -> Result<Self, VarMergeError> {
        let reader = InputFile::new(path.as_ref()).reader()?;
        let converter = Self::parse(reader, from, to)?;
        log::info!(
            "loaded {} {}→{} chains from {}",
            converter.chain_count(),
            from,
            to,
            path.as_ref().display()
        );
        Ok(converter)
    }

    pub fn parse<R: BufRead>(reader: R, from: Assembly, to: Assembly) -> Result<Self, VarMergeError> {
        let mut chains: HashMap<String, Vec<Chain>> = HashMap::new();
        let mut current: Option<Chain> = None;

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with("chain") {
                if let Some(chain) = current.take() {
                    chains.entry(chain.target_name.clone()).or_default().push(chain);
                }
                current = Some(Chain::parse_header(line, i + 1)?);
            } else if let Some(chain) = current.as_mut() {
                chain.blocks.push(Chain::parse_block(line, i + 1)?);
            }
        }
        if let Some(chain) = current {
            chains.entry(chain.target_name.clone()).or_default().push(chain);
        }
        Ok(Self { from, to, chains })
    }

    pub fn chain_count(&self) -> usize {
        self.chains.values().map(Vec::len).sum()
    }

    /// The highest scoring chain covering a position.
    pub fn best_chain(&self, chrom: &str, pos: Position) -> Option<&Chain> {
        self.chains
            .get(contig_name(chrom))?
            .iter()
            .filter(|c| c.contains(pos))
            .max_by_key(|c| c.score)
    }
}

impl CoordinateConverter for ChainConverter {
    fn convert(
        &self,
        from: Assembly,
        to: Assembly,
        chrom: &str,
        pos: Position,
    ) -> Option<Position> {
        if from == to {
            return Some(pos);
        }
        if from != self.from || to != self.to {
            return None;
        }
        self.best_chain(chrom, pos)?.lift(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN: &str = "chain 1000 chr6 1000 + 0 1000 chr6 1100 + 0 1100 1
100\t10\t20
200\t5\t5
500

chain 10 chr6 1000 + 0 1000 chr6 1000 + 0 1000 2
1000
";

    fn converter() -> ChainConverter {
        ChainConverter::parse(CHAIN.as_bytes(), Assembly::GRCh37, Assembly::GRCh38).unwrap()
    }

    #[test]
    fn test_parse_chains() {
        let converter = converter();
        assert_eq!(converter.chain_count(), 2);
        let best = converter.best_chain("6", 50).unwrap();
        assert_eq!(best.score, 1000);
        assert_eq!(best.blocks.len(), 3);
        assert_eq!(best.blocks[0].query_gap, 20);
    }

    #[test]
    fn test_convert_with_gaps() {
        let converter = converter();
        let (from, to) = (Assembly::GRCh37, Assembly::GRCh38);
        assert_eq!(converter.convert(from, to, "chr6", 50), Some(50));
        // second block starts at target 110, query 120
        assert_eq!(converter.convert(from, to, "6", 110), Some(120));
        // the best chain has a gap at 105
        assert_eq!(converter.convert(from, to, "6", 105), None);
        assert_eq!(converter.convert(from, to, "chr7", 50), None);
        assert_eq!(converter.convert(from, to, "6", 5000), None);
    }

    #[test]
    fn test_convert_wrong_direction() {
        let converter = converter();
        assert_eq!(
            converter.convert(Assembly::GRCh38, Assembly::GRCh37, "6", 50),
            None
        );
        assert_eq!(
            converter.convert(Assembly::GRCh38, Assembly::GRCh38, "6", 50),
            Some(50)
        );
    }

    #[test]
    fn test_bad_header() {
        let result = ChainConverter::parse(
            "chain 1 chr6 1000 +\n".as_bytes(),
            Assembly::GRCh37,
            Assembly::GRCh38,
        );
        assert!(matches!(result, Err(VarMergeError::ParseError(_))));
    }

    #[test]
    fn test_minus_strand() {
        let chain = "chain 5 chr6 100 + 0 100 chr6 100 - 0 100 1\n100\n";
        let converter =
            ChainConverter::parse(chain.as_bytes(), Assembly::GRCh37, Assembly::GRCh38).unwrap();
        assert_eq!(
            converter.convert(Assembly::GRCh37, Assembly::GRCh38, "6", 0),
            Some(99)
        );
    }
}
