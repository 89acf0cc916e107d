//! Implementations of various operations on data.
//!

use super::DatumType;

/// The common type of a column, used when promoting inferred cell types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    /// Every value is null.
    Empty,
    Integer,
    Float,
    /// At least one string value; numbers are left as they are.
    Mixed,
}

impl ColumnType {
    /// Determine the common type of some column values, ignoring nulls.
    pub fn of<'a>(values: impl Iterator<Item = &'a DatumType>) -> Self {
        let mut column_type = ColumnType::Empty;
        for value in values {
            column_type = match (column_type, value) {
                (current, DatumType::NoValue) => current,
                (_, DatumType::String(_)) | (ColumnType::Mixed, _) => return ColumnType::Mixed,
                (ColumnType::Empty | ColumnType::Integer, DatumType::Integer(_)) => {
                    ColumnType::Integer
                }
                (_, DatumType::Integer(_)) | (_, DatumType::Float(_)) => ColumnType::Float,
            };
        }
        column_type
    }
}

/// Return the maximum of some finite values, or `None` if there are none.
pub fn max_finite(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .filter(|x| x.is_finite())
        .copied()
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Less))
}

/// Return the index and value of the first strictly greatest value that exceeds
/// `floor`, skipping missing values. `None` if no value exceeds `floor`.
pub fn argmax_above(values: &[Option<f64>], floor: f64) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, value) in values.iter().enumerate() {
        if let Some(value) = value {
            let current = best.map_or(floor, |(_, v)| v);
            if *value > current {
                best = Some((i, *value));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type() {
        let ints = [DatumType::Integer(1), DatumType::NoValue, DatumType::Integer(3)];
        assert_eq!(ColumnType::of(ints.iter()), ColumnType::Integer);

        let floats = [DatumType::Integer(1), DatumType::Float(0.5)];
        assert_eq!(ColumnType::of(floats.iter()), ColumnType::Float);

        let mixed = [DatumType::Float(0.5), DatumType::from("x")];
        assert_eq!(ColumnType::of(mixed.iter()), ColumnType::Mixed);

        let empty = [DatumType::NoValue];
        assert_eq!(ColumnType::of(empty.iter()), ColumnType::Empty);
    }

    #[test]
    fn test_max_finite() {
        assert_eq!(max_finite(&[]), None);
        assert_eq!(max_finite(&[0.1, f64::NAN, 0.7, 0.2]), Some(0.7));
        assert_eq!(max_finite(&[-0.5, -0.1]), Some(-0.1));
    }

    #[test]
    fn test_argmax_above() {
        assert_eq!(argmax_above(&[Some(0.1), None, Some(0.3)], 0.0), Some((2, 0.3)));
        assert_eq!(argmax_above(&[Some(0.0), None], 0.0), None);
        // ties keep the first index
        assert_eq!(argmax_above(&[Some(0.2), Some(0.2)], 0.0), Some((0, 0.2)));
    }
}
