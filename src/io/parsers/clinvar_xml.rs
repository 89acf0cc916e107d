//! Streaming parser for ClinVar `VariationArchive` XML releases.
//!
//! The document is read event by event. Each `VariationArchive` element is
//! collected into a small in-memory [`Element`] tree and then flattened into one
//! row by the [`FIELD_RULES`] table, so memory use is bounded by the largest
//! single archive rather than the whole release.

use chrono::NaiveDate;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;
use std::path::Path;

use crate::data::{DatumType, SourceTable, VariantRecord};
use crate::error::VarMergeError;
use crate::io::file::{require_exists, InputFile};
use crate::traits::SourceParser;
use crate::Source;

const ARCHIVE_TAG: &str = "VariationArchive";
const SIMPLE_ALLELE: &str = "ClassifiedRecord/SimpleAllele";
const GERMLINE: &str = "ClassifiedRecord/Classifications/GermlineClassification";

/// A parsed XML element: its attributes, text content, and children.
#[derive(Clone, Debug, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

/// One step of an element path, e.g. `HGVS[@Type='coding']`.
struct Step<'a> {
    name: &'a str,
    predicate: Option<(&'a str, &'a str)>,
}

impl<'a> Step<'a> {
    fn parse(step: &'a str) -> Self {
        let Some((name, rest)) = step.split_once("[@") else {
            return Step {
                name: step,
                predicate: None,
            };
        };
        let predicate = rest
            .strip_suffix(']')
            .and_then(|p| p.split_once('='))
            .map(|(attr, value)| (attr, value.trim_matches('\'')));
        Step { name, predicate }
    }

    fn matches(&self, element: &Element) -> bool {
        element.name == self.name
            && self
                .predicate
                .map_or(true, |(attr, value)| element.attribute(attr) == Some(value))
    }
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All descendants matching a `/`-separated path relative to this element.
    /// An empty path is the element itself.
    pub fn find_all<'e>(&'e self, path: &str) -> Vec<&'e Element> {
        let mut current = vec![self];
        for step in path.split('/').filter(|s| !s.is_empty()).map(Step::parse) {
            current = current
                .into_iter()
                .flat_map(|element| element.children.iter())
                .filter(|child| step.matches(child))
                .collect();
        }
        current
    }

    /// The first descendant matching `path`.
    pub fn find<'e>(&'e self, path: &str) -> Option<&'e Element> {
        self.find_all(path).into_iter().next()
    }

    fn from_start(start: &BytesStart) -> Result<Self, VarMergeError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| malformed(e.to_string()))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).to_string();
            let value = attribute
                .unescape_value()
                .map_err(|e| malformed(e.to_string()))?
                .to_string();
            attributes.push((key, value));
        }
        Ok(Element {
            name,
            attributes,
            ..Default::default()
        })
    }
}

fn malformed(message: impl std::fmt::Display) -> VarMergeError {
    VarMergeError::ParseError(format!("malformed ClinVar XML: {}", message))
}

/// How one output column is extracted from a `VariationArchive` element.
#[derive(Clone, Copy, Debug)]
pub enum Extract {
    /// An attribute of the first element at `path`.
    Attribute {
        path: &'static str,
        attribute: &'static str,
    },
    /// An attribute of every element at `path`, joined by `separator`.
    Attributes {
        path: &'static str,
        attribute: &'static str,
        separator: &'static str,
        dedup: bool,
    },
    /// The text of the first element at `path`.
    Text(&'static str),
    /// The text of every element at `path`, joined by `separator`.
    Texts {
        path: &'static str,
        separator: &'static str,
    },
    /// `start - stop` of a sequence location, or just `start` when they agree.
    Location(&'static str),
    /// `Type` + `ID` of the first cross reference into `db`.
    CrossReference(&'static str),
    /// An ISO date attribute, reformatted as e.g. `Mar 02, 2023`.
    Date {
        path: &'static str,
        attribute: &'static str,
    },
}

/// A column of the flattened ClinVar table.
#[derive(Clone, Copy, Debug)]
pub struct FieldRule {
    pub column: &'static str,
    pub extract: Extract,
}

const fn rule(column: &'static str, extract: Extract) -> FieldRule {
    FieldRule { column, extract }
}

/// The columns of the flattened table, in output order.
pub const FIELD_RULES: &[FieldRule] = &[
    rule("Name", Extract::Attribute { path: "", attribute: "VariationName" }),
    rule(
        "Gene(s)",
        Extract::Attributes {
            path: "ClassifiedRecord/SimpleAllele/GeneList/Gene",
            attribute: "Symbol",
            separator: "|",
            dedup: false,
        },
    ),
    rule(
        "Protein change",
        Extract::Texts { path: "ClassifiedRecord/SimpleAllele/ProteinChange", separator: ", " },
    ),
    rule(
        "Condition(s)",
        Extract::Texts {
            path: "ClassifiedRecord/Classifications/GermlineClassification/ConditionList/TraitSet/Trait/Name/ElementValue[@Type='Preferred']",
            separator: "|",
        },
    ),
    rule("Accession", Extract::Attribute { path: "", attribute: "Accession" }),
    rule(
        "GRCh37Chromosome",
        Extract::Attribute {
            path: "ClassifiedRecord/SimpleAllele/Location/SequenceLocation[@Assembly='GRCh37']",
            attribute: "Chr",
        },
    ),
    rule(
        "GRCh37Location",
        Extract::Location("ClassifiedRecord/SimpleAllele/Location/SequenceLocation[@Assembly='GRCh37']"),
    ),
    rule(
        "GRCh38Chromosome",
        Extract::Attribute {
            path: "ClassifiedRecord/SimpleAllele/Location/SequenceLocation[@Assembly='GRCh38']",
            attribute: "Chr",
        },
    ),
    rule(
        "GRCh38Location",
        Extract::Location("ClassifiedRecord/SimpleAllele/Location/SequenceLocation[@Assembly='GRCh38']"),
    ),
    rule("VariationID", Extract::Attribute { path: "", attribute: "VariationID" }),
    rule("AlleleID(s)", Extract::Attribute { path: SIMPLE_ALLELE, attribute: "AlleleID" }),
    rule("dbSNP ID", Extract::CrossReference("dbSNP")),
    rule("Canonical SPDI", Extract::Text("ClassifiedRecord/SimpleAllele/CanonicalSPDI")),
    rule("Variant type", Extract::Text("ClassifiedRecord/SimpleAllele/VariantType")),
    rule(
        "Molecular consequence",
        Extract::Attributes {
            path: "ClassifiedRecord/SimpleAllele/HGVSlist/HGVS[@Type='coding']/MolecularConsequence",
            attribute: "Type",
            separator: "|",
            dedup: true,
        },
    ),
    rule(
        "Germline classification",
        Extract::Text("ClassifiedRecord/Classifications/GermlineClassification/Description"),
    ),
    rule(
        "Germline review status",
        Extract::Text("ClassifiedRecord/Classifications/GermlineClassification/ReviewStatus"),
    ),
    rule(
        "Germline date last evaluated",
        Extract::Date { path: GERMLINE, attribute: "DateLastEvaluated" },
    ),
];

fn format_date(raw: &str) -> String {
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => date.format("%b %d, %Y").to_string(),
        Err(_) => {
            log::warn!("unparseable ClinVar evaluation date '{}', keeping it as is", raw);
            raw.to_string()
        }
    }
}

impl Extract {
    /// Apply this rule to an archive. Missing elements give an empty string.
    pub fn apply(&self, archive: &Element) -> String {
        match *self {
            Extract::Attribute { path, attribute } => archive
                .find(path)
                .and_then(|e| e.attribute(attribute))
                .unwrap_or_default()
                .to_string(),
            Extract::Attributes {
                path,
                attribute,
                separator,
                dedup,
            } => {
                let mut values: Vec<&str> = Vec::new();
                for value in archive
                    .find_all(path)
                    .into_iter()
                    .filter_map(|e| e.attribute(attribute))
                {
                    if !dedup || !values.contains(&value) {
                        values.push(value);
                    }
                }
                values.join(separator)
            }
            Extract::Text(path) => archive
                .find(path)
                .map(|e| e.text.clone())
                .unwrap_or_default(),
            Extract::Texts { path, separator } => archive
                .find_all(path)
                .iter()
                .map(|e| e.text.as_str())
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join(separator),
            Extract::Location(path) => {
                let Some(location) = archive.find(path) else {
                    return String::new();
                };
                match (
                    location.attribute("display_start"),
                    location.attribute("display_stop"),
                ) {
                    (Some(start), Some(stop)) if start != stop => format!("{} - {}", start, stop),
                    (Some(start), _) => start.to_string(),
                    (None, _) => String::new(),
                }
            }
            Extract::CrossReference(db) => archive
                .find_all("ClassifiedRecord/SimpleAllele/XRefList/XRef")
                .into_iter()
                .find(|xref| xref.attribute("DB") == Some(db))
                .map(|xref| {
                    format!(
                        "{}{}",
                        xref.attribute("Type").unwrap_or_default(),
                        xref.attribute("ID").unwrap_or_default()
                    )
                })
                .unwrap_or_default(),
            Extract::Date { path, attribute } => archive
                .find(path)
                .and_then(|e| e.attribute(attribute))
                .map(format_date)
                .unwrap_or_default(),
        }
    }
}

/// Flatten one archive into a row.
pub fn archive_to_record(archive: &Element) -> VariantRecord {
    let mut record = VariantRecord::from_source(Source::Clinvar);
    for rule in FIELD_RULES {
        record.set(rule.column, DatumType::String(rule.extract.apply(archive)));
    }
    record
}

/// Parses a ClinVar XML release into one row per `VariationArchive`.
#[derive(Clone, Debug, Default)]
pub struct ClinvarXmlParser;

impl ClinvarXmlParser {
    pub fn new() -> Self {
        Self
    }

    pub fn columns() -> Vec<String> {
        FIELD_RULES.iter().map(|r| r.column.to_string()).collect()
    }

    pub fn parse_reader<R: BufRead>(&self, reader: R) -> Result<SourceTable, VarMergeError> {
        let mut reader = Reader::from_reader(reader);
        reader.config_mut().trim_text(true);

        let mut table = SourceTable::new("clinvar", Self::columns());
        // the archive currently being collected, innermost element last
        let mut stack: Vec<Element> = Vec::new();
        let mut buf = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| malformed(format!("at byte {}: {}", reader.buffer_position(), e)))?;
            match event {
                Event::Start(start) => {
                    if !stack.is_empty() || start.name().as_ref() == ARCHIVE_TAG.as_bytes() {
                        stack.push(Element::from_start(&start)?);
                    }
                }
                Event::Empty(start) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Element::from_start(&start)?);
                    }
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        let text = text.unescape().map_err(malformed)?;
                        current.text.push_str(&text);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::End(_) => {
                    if let Some(element) = stack.pop() {
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(element),
                            None => table.push(archive_to_record(&element)),
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        if !stack.is_empty() {
            return Err(malformed("document ended inside a VariationArchive"));
        }
        Ok(table)
    }
}

impl SourceParser for ClinvarXmlParser {
    type Output = SourceTable;

    fn parse(&self, path: &Path) -> Result<SourceTable, VarMergeError> {
        require_exists(path)?;
        let reader = InputFile::new(path).reader()?;
        log::info!("Parsing file {} as ClinVar XML.", path.display());
        let table = self.parse_reader(reader)?;
        log::info!("Parsed {} ClinVar variation archives.", table.len());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARCHIVE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ClinVarVariationRelease>
  <VariationArchive VariationID="1" VariationName="NM_001.3(DPP6):c.10C&gt;T (p.Arg4Trp)" Accession="VCV000000001">
    <ClassifiedRecord>
      <SimpleAllele AlleleID="15000">
        <GeneList>
          <Gene Symbol="DPP6"/>
          <Gene Symbol="DPP6-AS1"/>
        </GeneList>
        <ProteinChange>R4W</ProteinChange>
        <ProteinChange>R3W</ProteinChange>
        <Location>
          <SequenceLocation Assembly="GRCh38" Chr="7" display_start="154000" display_stop="154000"/>
          <SequenceLocation Assembly="GRCh37" Chr="7" display_start="153000" display_stop="153004"/>
        </Location>
        <XRefList>
          <XRef DB="OMIM" ID="1" Type="Allelic variant"/>
          <XRef DB="dbSNP" ID="12345" Type="rs"/>
        </XRefList>
        <CanonicalSPDI>NC_000007.14:153999:C:T</CanonicalSPDI>
        <VariantType>single nucleotide variant</VariantType>
        <HGVSlist>
          <HGVS Type="coding"><MolecularConsequence Type="missense variant"/></HGVS>
          <HGVS Type="coding"><MolecularConsequence Type="missense variant"/></HGVS>
          <HGVS Type="coding"><MolecularConsequence Type="intron variant"/></HGVS>
          <HGVS Type="genomic"><MolecularConsequence Type="ignored"/></HGVS>
        </HGVSlist>
      </SimpleAllele>
      <Classifications>
        <GermlineClassification DateLastEvaluated="2023-03-02">
          <ReviewStatus>criteria provided, single submitter</ReviewStatus>
          <Description>Pathogenic</Description>
          <ConditionList>
            <TraitSet><Trait><Name><ElementValue Type="Preferred">Disease A</ElementValue></Name></Trait></TraitSet>
            <TraitSet><Trait><Name><ElementValue Type="Alternate">Other</ElementValue></Name></Trait></TraitSet>
          </ConditionList>
        </GermlineClassification>
      </Classifications>
    </ClassifiedRecord>
  </VariationArchive>
  <VariationArchive VariationID="2" VariationName="bare" Accession="VCV000000002">
    <ClassifiedRecord>
      <Classifications>
        <GermlineClassification DateLastEvaluated="sometime"/>
      </Classifications>
    </ClassifiedRecord>
  </VariationArchive>
</ClinVarVariationRelease>
"#;

    fn parse() -> SourceTable {
        ClinvarXmlParser::new().parse_reader(ARCHIVE.as_bytes()).unwrap()
    }

    #[test]
    fn test_full_archive() {
        let table = parse();
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns.len(), 18);
        let row = &table.records[0];
        let text = |column: &str| row.value(column).as_str().unwrap().to_string();
        assert_eq!(text("Name"), "NM_001.3(DPP6):c.10C>T (p.Arg4Trp)");
        assert_eq!(text("Gene(s)"), "DPP6|DPP6-AS1");
        assert_eq!(text("Protein change"), "R4W, R3W");
        assert_eq!(text("Condition(s)"), "Disease A");
        assert_eq!(text("Accession"), "VCV000000001");
        assert_eq!(text("GRCh37Location"), "153000 - 153004");
        assert_eq!(text("GRCh38Chromosome"), "7");
        assert_eq!(text("GRCh38Location"), "154000");
        assert_eq!(text("AlleleID(s)"), "15000");
        assert_eq!(text("dbSNP ID"), "rs12345");
        assert_eq!(text("Canonical SPDI"), "NC_000007.14:153999:C:T");
        assert_eq!(text("Molecular consequence"), "missense variant|intron variant");
        assert_eq!(text("Germline classification"), "Pathogenic");
        assert_eq!(text("Germline review status"), "criteria provided, single submitter");
        assert_eq!(text("Germline date last evaluated"), "Mar 02, 2023");
    }

    #[test]
    fn test_missing_elements_are_empty() {
        let table = parse();
        let row = &table.records[1];
        assert_eq!(row.value("Gene(s)").as_str(), Some(""));
        assert_eq!(row.value("GRCh38Location").as_str(), Some(""));
        assert_eq!(row.value("dbSNP ID").as_str(), Some(""));
        // unparseable dates are kept
        assert_eq!(
            row.value("Germline date last evaluated").as_str(),
            Some("sometime")
        );
    }

    #[test]
    fn test_malformed_xml() {
        let bad = "<Root><VariationArchive VariationID=\"1\"><ClassifiedRecord></VariationArchive></Root>";
        let result = ClinvarXmlParser::new().parse_reader(bad.as_bytes());
        assert!(matches!(result, Err(VarMergeError::ParseError(_))));
    }

    #[test]
    fn test_path_predicates() {
        let table = parse();
        assert_eq!(
            table.records[0].value("GRCh37Chromosome").as_str(),
            Some("7")
        );
    }
}
