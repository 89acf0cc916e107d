//! Relational equi-joins of [`SourceTable`]s on canonical keys.
//!
//! A join is done in two steps: first the [`JoinPlan`] records, for every left
//! row, which right rows share its key (a [`LeftGroupedJoin`]), plus which right
//! rows matched nothing. Then the plan is materialized into a new table.

use indexmap::IndexMap;

use crate::data::{SourceTable, VariantRecord};
use crate::error::VarMergeError;

/// Suffix for right columns whose names collide with left columns.
pub const COLLISION_SUFFIX: &str = "_right";

/// The join semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinHow {
    /// Keep every left row; unmatched rows get null right columns.
    Left,
    /// Like [`JoinHow::Left`], and also append unmatched right rows with null
    /// left columns.
    Outer,
}

/// The right rows whose key equals a focal left row's key.
#[derive(Clone, Debug, PartialEq)]
pub struct LeftGroupedJoin {
    pub left: usize,
    pub rights: Vec<usize>,
}

impl LeftGroupedJoin {
    pub fn has_matches(&self) -> bool {
        !self.rights.is_empty()
    }

    /// The number of output rows this left row produces.
    pub fn output_rows(&self) -> usize {
        self.rights.len().max(1)
    }
}

/// All matches between two tables on a key.
#[derive(Clone, Debug, Default)]
pub struct JoinPlan {
    pub joins: Vec<LeftGroupedJoin>,
    pub unmatched_right: Vec<usize>,
}

impl JoinPlan {
    /// Match left and right rows by the string form of their keys. Null keys never
    /// match anything.
    pub fn new(left: &SourceTable, right: &SourceTable, key_left: &str, key_right: &str) -> Self {
        let mut index: IndexMap<String, Vec<usize>> = IndexMap::new();
        for (i, record) in right.records.iter().enumerate() {
            if let Some(key) = record.key(key_right) {
                index.entry(key).or_default().push(i);
            }
        }

        let mut matched = vec![false; right.len()];
        let joins = left
            .records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let rights = record
                    .key(key_left)
                    .and_then(|key| index.get(&key))
                    .cloned()
                    .unwrap_or_default();
                for &r in &rights {
                    matched[r] = true;
                }
                LeftGroupedJoin { left: i, rights }
            })
            .collect();
        let unmatched_right = matched
            .iter()
            .enumerate()
            .filter(|(_, m)| !**m)
            .map(|(i, _)| i)
            .collect();
        Self {
            joins,
            unmatched_right,
        }
    }

    /// Number of left rows with at least one match.
    pub fn num_matched(&self) -> usize {
        self.joins.iter().filter(|j| j.has_matches()).count()
    }
}

/// Output names for the right table's columns. A key shared by name is kept
/// once (`None`); other collisions get [`COLLISION_SUFFIX`].
fn right_column_names(
    left: &SourceTable,
    right: &SourceTable,
    key_left: &str,
    key_right: &str,
) -> Vec<(String, Option<String>)> {
    right
        .columns
        .iter()
        .map(|column| {
            let renamed = if column == key_right && key_left == key_right {
                None
            } else if left.has_column(column) {
                Some(format!("{}{}", column, COLLISION_SUFFIX))
            } else {
                Some(column.clone())
            };
            (column.clone(), renamed)
        })
        .collect()
}

fn add_right_fields(
    row: &mut VariantRecord,
    right: &VariantRecord,
    names: &[(String, Option<String>)],
) {
    for (column, renamed) in names {
        if let Some(renamed) = renamed {
            row.set(renamed.as_str(), right.value(column).clone());
        }
    }
    for source in right.sources() {
        row.add_source(*source);
    }
}

/// Join `left` and `right` where `left[key_left] == right[key_right]`.
///
/// Output columns are the left columns followed by the right columns. A left
/// row matching `k` right rows yields `k` output rows.
pub fn join(
    left: &SourceTable,
    right: &SourceTable,
    key_left: &str,
    key_right: &str,
    how: JoinHow,
) -> Result<SourceTable, VarMergeError> {
    if !left.has_column(key_left) {
        return Err(VarMergeError::MissingColumn(key_left.to_string()));
    }
    if !right.has_column(key_right) {
        return Err(VarMergeError::MissingColumn(key_right.to_string()));
    }

    let plan = JoinPlan::new(left, right, key_left, key_right);
    let names = right_column_names(left, right, key_left, key_right);

    let mut columns = left.columns.clone();
    columns.extend(names.iter().filter_map(|(_, renamed)| renamed.clone()));
    let mut joined = SourceTable::new(left.name.clone(), columns);
    joined.records.reserve(plan.joins.iter().map(|j| j.output_rows()).sum());

    for group in &plan.joins {
        let left_record = &left.records[group.left];
        if group.rights.is_empty() {
            joined.records.push(left_record.clone());
            continue;
        }
        for &r in &group.rights {
            let mut row = left_record.clone();
            add_right_fields(&mut row, &right.records[r], &names);
            joined.records.push(row);
        }
    }

    if how == JoinHow::Outer {
        for &r in &plan.unmatched_right {
            let right_record = &right.records[r];
            let mut row = VariantRecord::new();
            add_right_fields(&mut row, right_record, &names);
            if key_left == key_right {
                row.set(key_left, right_record.value(key_right).clone());
            }
            joined.records.push(row);
        }
    }

    log::debug!(
        "{:?} join of '{}' ({} rows) and '{}' ({} rows) on {} = {}: {} left rows matched, {} rows out",
        how,
        left.name,
        left.len(),
        right.name,
        right.len(),
        key_left,
        key_right,
        plan.num_matched(),
        joined.len()
    );
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DatumType;
    use crate::Source;

    fn table(name: &str, key: &str, rows: &[(Option<&str>, &str)], extra: &str) -> SourceTable {
        let mut table = SourceTable::new(name, vec![key.to_string(), extra.to_string()]);
        for (k, v) in rows {
            let mut record = VariantRecord::new();
            record.set(key, DatumType::from(*k));
            record.set(extra, *v);
            table.push(record);
        }
        table
    }

    #[test]
    fn test_left_join_duplicates_and_nulls() {
        let left = table("l", "key", &[(Some("a"), "1"), (Some("b"), "2"), (None, "3")], "x");
        let right = table("r", "rkey", &[(Some("a"), "r1"), (Some("a"), "r2"), (None, "r3")], "y");
        let joined = join(&left, &right, "key", "rkey", JoinHow::Left).unwrap();
        assert_eq!(joined.columns, vec!["key", "x", "rkey", "y"]);
        assert_eq!(joined.len(), 4);
        assert_eq!(joined.records[0].value("y"), &DatumType::from("r1"));
        assert_eq!(joined.records[1].value("y"), &DatumType::from("r2"));
        assert!(joined.records[2].value("y").is_null());
        // a null left key never matches a null right key
        assert!(joined.records[3].value("y").is_null());
    }

    #[test]
    fn test_outer_join_disjoint() {
        let left = table("l", "key", &[(Some("a"), "1"), (Some("b"), "2")], "x");
        let right = table("r", "rkey", &[(Some("c"), "r1"), (Some("d"), "r2"), (Some("e"), "r3")], "y");
        let joined = join(&left, &right, "key", "rkey", JoinHow::Outer).unwrap();
        assert_eq!(joined.len(), left.len() + right.len());
        assert!(joined.records[2].value("key").is_null());
        assert_eq!(joined.records[2].value("rkey"), &DatumType::from("c"));
    }

    #[test]
    fn test_shared_key_and_collisions() {
        let left = table("l", "id", &[(Some("1"), "left")], "name");
        let right = table("r", "id", &[(Some("1"), "right"), (Some("2"), "other")], "name");
        let joined = join(&left, &right, "id", "id", JoinHow::Outer).unwrap();
        assert_eq!(joined.columns, vec!["id", "name", "name_right"]);
        assert_eq!(joined.records[0].value("name_right"), &DatumType::from("right"));
        assert_eq!(joined.records[1].value("id"), &DatumType::from("2"));
        assert!(joined.records[1].value("name").is_null());
    }

    #[test]
    fn test_join_carries_sources() {
        let mut left = table("l", "key", &[(Some("a"), "1")], "x");
        left.tag_source(Source::Lovd);
        let mut right = table("r", "rkey", &[(Some("a"), "r1")], "y");
        right.tag_source(Source::Clinvar);
        let joined = join(&left, &right, "key", "rkey", JoinHow::Left).unwrap();
        let sources = joined.records[0].sources();
        assert!(sources.contains(&Source::Lovd) && sources.contains(&Source::Clinvar));
    }

    #[test]
    fn test_missing_key_column() {
        let left = table("l", "key", &[], "x");
        let right = table("r", "rkey", &[], "y");
        assert!(matches!(
            join(&left, &right, "nope", "rkey", JoinHow::Left),
            Err(VarMergeError::MissingColumn(_))
        ));
    }
}
