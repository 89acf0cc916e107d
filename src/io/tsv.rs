//! CSV/TSV serializing configuration.

use crate::{data::DatumType, traits::TsvSerialize};
use lazy_static::lazy_static;

lazy_static! {
    /// The configuration for writing merged tables as CSV, where missing
    /// values are empty cells.
    pub static ref CSV_TSV: TsvConfig = TsvConfig {
        no_value_string: "".to_string(),
    };
}

/// What to print for [`DatumType::NoValue`] when writing delimited output.
pub struct TsvConfig {
    pub no_value_string: String,
}

impl TsvSerialize for DatumType {
    fn to_tsv(&self, config: &TsvConfig) -> String {
        match self {
            DatumType::Float(val) => val.to_string(),
            DatumType::String(val) => val.clone(),
            DatumType::Integer(val) => val.to_string(),
            DatumType::NoValue => config.no_value_string.clone(),
        }
    }
}
