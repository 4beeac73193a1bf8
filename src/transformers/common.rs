//! Sparse overwrite and fan-out helpers shared by the transformers.

use serde_json::Value;

use crate::entity::{EntityError, EntityRow, PreparedRow};
use crate::extraction::Payload;

/// Builder-style sparse update: `None` leaves the current value untouched
pub trait Overwrite<T> {
    fn overwrite(&mut self, value: Option<T>);
}

impl Overwrite<String> for String {
    fn overwrite(&mut self, value: Option<String>) {
        if let Some(v) = value {
            *self = v;
        }
    }
}

impl Overwrite<String> for Option<String> {
    fn overwrite(&mut self, value: Option<String>) {
        if value.is_some() {
            *self = value;
        }
    }
}

impl Overwrite<f64> for Option<f64> {
    fn overwrite(&mut self, value: Option<f64>) {
        if value.is_some() {
            *self = value;
        }
    }
}

impl Overwrite<i64> for Option<i64> {
    fn overwrite(&mut self, value: Option<i64>) {
        if value.is_some() {
            *self = value;
        }
    }
}

/// Membership change carried by add/remove payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberOp {
    Add,
    Remove,
}

impl MemberOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberOp::Add => "add",
            MemberOp::Remove => "remove",
        }
    }
}

fn non_empty(items: Option<&[Value]>) -> Option<&[Value]> {
    items.filter(|l| !l.is_empty())
}

/// One row per list element layered on `base`; just `base` when the list is absent or empty
pub fn expand<R, F>(base: &R, items: Option<&[Value]>, mut apply: F) -> Result<Vec<R>, EntityError>
where
    R: Clone,
    F: FnMut(&mut R, Payload<'_>) -> Result<(), EntityError>,
{
    let Some(items) = non_empty(items) else {
        return Ok(vec![base.clone()]);
    };

    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let mut row = base.clone();
        apply(&mut row, Payload::new(item))?;
        rows.push(row);
    }
    Ok(rows)
}

/// One row per added member followed by one per removed member
pub fn membership<R, F>(
    base: &R,
    added: Option<&[Value]>,
    removed: Option<&[Value]>,
    mut apply: F,
) -> Result<Vec<R>, EntityError>
where
    R: Clone,
    F: FnMut(&mut R, MemberOp, Payload<'_>) -> Result<(), EntityError>,
{
    let added = non_empty(added).unwrap_or_default();
    let removed = non_empty(removed).unwrap_or_default();
    if added.is_empty() && removed.is_empty() {
        return Ok(vec![base.clone()]);
    }

    let tagged = added
        .iter()
        .map(|m| (MemberOp::Add, m))
        .chain(removed.iter().map(|m| (MemberOp::Remove, m)));

    let mut rows = Vec::with_capacity(added.len() + removed.len());
    for (op, member) in tagged {
        let mut row = base.clone();
        apply(&mut row, op, Payload::new(member))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Cartesian product of two reference lists, left-major.
///
/// With only one list present this is a single-list expansion; with neither
/// it is the base row alone.
pub fn cartesian<R, L, Rt>(
    base: &R,
    left: Option<&[Value]>,
    right: Option<&[Value]>,
    mut apply_left: L,
    mut apply_right: Rt,
) -> Result<Vec<R>, EntityError>
where
    R: Clone,
    L: FnMut(&mut R, Payload<'_>) -> Result<(), EntityError>,
    Rt: FnMut(&mut R, Payload<'_>) -> Result<(), EntityError>,
{
    match (non_empty(left), non_empty(right)) {
        (Some(left), Some(right)) => {
            let mut rows = Vec::with_capacity(left.len() * right.len());
            for l in left {
                for r in right {
                    let mut row = base.clone();
                    apply_left(&mut row, Payload::new(l))?;
                    apply_right(&mut row, Payload::new(r))?;
                    rows.push(row);
                }
            }
            Ok(rows)
        }
        (Some(left), None) => expand(base, Some(left), apply_left),
        (None, Some(right)) => expand(base, Some(right), apply_right),
        (None, None) => Ok(vec![base.clone()]),
    }
}

/// Convert typed rows into prepared rows, preserving order
pub fn prepare<R: EntityRow>(rows: Vec<R>) -> Vec<PreparedRow> {
    rows.into_iter().map(EntityRow::into_prepared).collect()
}

/// Dot-separated segment of an identifier (`ocid.group.x` → `group` for index 1)
pub fn id_segment(id: &str, index: usize) -> Option<String> {
    id.split('.').nth(index).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Row {
        base: String,
        left: String,
        right: String,
        op: String,
    }

    fn base() -> Row {
        Row {
            base: "shared".to_string(),
            ..Default::default()
        }
    }

    fn set_left(row: &mut Row, p: Payload<'_>) -> Result<(), EntityError> {
        row.left.overwrite(p.as_text());
        Ok(())
    }

    fn set_right(row: &mut Row, p: Payload<'_>) -> Result<(), EntityError> {
        row.right.overwrite(p.as_text());
        Ok(())
    }

    #[test]
    fn test_overwrite_is_sparse() {
        let mut name = "default".to_string();
        name.overwrite(None);
        assert_eq!(name, "default");
        name.overwrite(Some("set".to_string()));
        assert_eq!(name, "set");

        let mut risk: Option<f64> = Some(1.0);
        risk.overwrite(None);
        assert_eq!(risk, Some(1.0));
    }

    #[test]
    fn test_membership_add_and_remove() {
        let add = json!(["A", "B"]);
        let remove = json!(["C"]);

        let rows = membership(
            &base(),
            add.as_array().map(Vec::as_slice),
            remove.as_array().map(Vec::as_slice),
            |row, op, member| {
                row.op = op.as_str().to_string();
                set_left(row, member)
            },
        )
        .unwrap();

        let summary: Vec<(&str, &str)> =
            rows.iter().map(|r| (r.left.as_str(), r.op.as_str())).collect();
        assert_eq!(summary, vec![("A", "add"), ("B", "add"), ("C", "remove")]);
        assert!(rows.iter().all(|r| r.base == "shared"));
    }

    #[test]
    fn test_membership_without_members() {
        let empty = json!([]);
        let rows = membership(&base(), empty.as_array().map(Vec::as_slice), None, |_, _, _| Ok(()))
            .unwrap();
        assert_eq!(rows, vec![base()]);
    }

    #[test]
    fn test_cartesian_product() {
        let left = json!(["r1", "r2"]);
        let right = json!(["s1", "s2", "s3"]);

        let rows = cartesian(
            &base(),
            left.as_array().map(Vec::as_slice),
            right.as_array().map(Vec::as_slice),
            set_left,
            set_right,
        )
        .unwrap();

        assert_eq!(rows.len(), 6);
        assert_eq!((rows[0].left.as_str(), rows[0].right.as_str()), ("r1", "s1"));
        assert_eq!((rows[2].left.as_str(), rows[2].right.as_str()), ("r1", "s3"));
        assert_eq!((rows[3].left.as_str(), rows[3].right.as_str()), ("r2", "s1"));
    }

    #[test]
    fn test_cartesian_single_side() {
        let right = json!(["s1", "s2"]);
        let rows = cartesian(&base(), None, right.as_array().map(Vec::as_slice), set_left, set_right)
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.left.is_empty()));

        let rows = cartesian(&base(), None, None, set_left, set_right).unwrap();
        assert_eq!(rows, vec![base()]);
    }

    #[test]
    fn test_id_segment() {
        assert_eq!(id_segment("ocid1.group.oc1", 1).as_deref(), Some("group"));
        assert_eq!(id_segment("plain", 1), None);
    }
}
