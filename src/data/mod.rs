//! Cell values and the record and table containers built from them.
//!

pub mod operations;
pub mod table;

pub use table::{SourceTable, VariantRecord};

/// These are core supported data types stored in an `enum`, to
/// unify the cell values that come out of the different source parsers.
#[derive(Debug, Clone, PartialEq)]
pub enum DatumType {
    Integer(i64),
    Float(f64),
    String(String),
    NoValue,
}

impl DatumType {
    /// Infer the type of a raw string cell.
    ///
    /// A value containing `.`, `E-`, or `E+` is tried as a float, anything else
    /// as an integer. If neither parse works, the original string is kept.
    pub fn infer(value: &str) -> Self {
        if value.contains('.') || value.contains("E-") || value.contains("E+") {
            value
                .parse::<f64>()
                .map(DatumType::Float)
                .unwrap_or_else(|_| DatumType::String(value.to_string()))
        } else {
            value
                .parse::<i64>()
                .map(DatumType::Integer)
                .unwrap_or_else(|_| DatumType::String(value.to_string()))
        }
    }

    /// Like [`DatumType::infer()`], but empty cells are [`DatumType::NoValue`].
    /// This is how delimited exports mark missing values.
    pub fn infer_nullable(value: &str) -> Self {
        if value.is_empty() {
            DatumType::NoValue
        } else {
            Self::infer(value)
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DatumType::NoValue)
    }

    /// The string form of this value when it is used as a join or lookup key.
    /// Null values never produce a key.
    pub fn as_key(&self) -> Option<String> {
        match self {
            DatumType::NoValue => None,
            DatumType::String(val) => Some(val.clone()),
            DatumType::Integer(val) => Some(val.to_string()),
            DatumType::Float(val) => Some(val.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatumType::String(val) => Some(val),
            _ => None,
        }
    }

    /// Numeric view of this value, used for e.g. allele frequency comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DatumType::Integer(val) => Some(*val as f64),
            DatumType::Float(val) => Some(*val),
            DatumType::String(val) => val.parse().ok(),
            DatumType::NoValue => None,
        }
    }
}

impl From<f64> for DatumType {
    fn from(item: f64) -> Self {
        DatumType::Float(item)
    }
}

impl From<i64> for DatumType {
    fn from(item: i64) -> Self {
        DatumType::Integer(item)
    }
}

impl From<String> for DatumType {
    fn from(item: String) -> Self {
        DatumType::String(item)
    }
}

impl From<&str> for DatumType {
    fn from(item: &str) -> Self {
        DatumType::String(item.to_string())
    }
}

impl<T: Into<DatumType>> From<Option<T>> for DatumType {
    fn from(item: Option<T>) -> Self {
        item.map_or(DatumType::NoValue, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::DatumType;

    #[test]
    fn test_infer_int_float_string() {
        assert_eq!(DatumType::infer("42"), DatumType::Integer(42));
        assert_eq!(DatumType::infer("0.25"), DatumType::Float(0.25));
        assert_eq!(DatumType::infer("1E-5"), DatumType::Float(1e-5));
        assert_eq!(DatumType::infer("3E+2"), DatumType::Float(300.0));
        assert_eq!(
            DatumType::infer("g.370531C>T"),
            DatumType::String("g.370531C>T".to_string())
        );
        assert_eq!(DatumType::infer(""), DatumType::String(String::new()));
    }

    #[test]
    fn test_infer_nullable() {
        assert_eq!(DatumType::infer_nullable(""), DatumType::NoValue);
        assert_eq!(DatumType::infer_nullable("7"), DatumType::Integer(7));
    }

    #[test]
    fn test_as_key() {
        assert_eq!(DatumType::NoValue.as_key(), None);
        assert_eq!(DatumType::Integer(12).as_key(), Some("12".to_string()));
        assert_eq!(
            DatumType::from("6-1-A-G").as_key(),
            Some("6-1-A-G".to_string())
        );
    }
}
