//! Point-in-time copies of a manual embedded in revisions.
//!
//! A snapshot is stored as an opaque serialized value, but carries an
//! explicit format version so future consumers can detect and handle older
//! layouts. Once embedded in a revision the stored value is returned
//! verbatim to all readers, never regenerated.

use chrono::NaiveDate;
use diesel::result::Error as DbError;
use failure::Fail;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    ApiError,
    db::{Connection, models as db},
};
use super::chapter::{Chapter, Coordinates};

/// Format version written by [`Snapshot::build`].
pub const FORMAT: i32 = 1;

/// A frozen, self-contained copy of a manual and its chapter tree.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Snapshot {
    /// Layout version of this structure.
    pub format: i32,
    pub manual: ManualData,
    pub chapters: Vec<ChapterNode>,
}

/// Manual metadata captured in a snapshot.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ManualData {
    pub id: Uuid,
    pub title: String,
    pub organization: String,
    pub effective_date: Option<NaiveDate>,
}

/// One chapter, with its content and children. Self-contained: everything a
/// consumer needs is embedded, nothing requires a live join to resolve.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ChapterNode {
    /// Rendered coordinates, e.g. `"2.1.3"`.
    pub number: String,
    pub depth: i16,
    pub title: String,
    pub content: String,
    pub children: Vec<ChapterNode>,
}

impl Snapshot {
    /// Materialize the current state of a manual.
    ///
    /// Deterministic given a fixed database state; reads only through the
    /// enclosing transaction's isolation.
    pub fn build(db: &Connection, manual: &db::Manual)
    -> Result<Snapshot, DbError> {
        let chapters = Chapter::all_of(db, manual.id)?
            .into_iter()
            .map(Chapter::into_db)
            .collect::<Vec<_>>();

        Ok(Snapshot {
            format: FORMAT,
            manual: ManualData {
                id: manual.id,
                title: manual.title.clone(),
                organization: manual.organization.clone(),
                effective_date: manual.effective_date,
            },
            chapters: assemble(&chapters, None),
        })
    }

    /// Serialize for storage.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("invalid snapshot data")
    }

    /// Deserialize a stored snapshot, verifying its format version.
    pub fn from_value(value: &Value) -> Result<Snapshot, ParseSnapshotError> {
        let format = value.get("format")
            .and_then(Value::as_i64)
            .unwrap_or(0) as i32;

        if format != FORMAT {
            return Err(ParseSnapshotError::UnsupportedFormat(format));
        }

        serde_json::from_value(value.clone())
            .map_err(ParseSnapshotError::Malformed)
    }

    /// Coordinates of chapters which differ between two snapshots.
    ///
    /// A chapter counts as changed when its title or content differs, or
    /// when it exists in only one of the two snapshots. Results follow the
    /// coordinate order of `new`, with chapters removed since `old` at
    /// the end.
    pub fn changed_coordinates(old: &Snapshot, new: &Snapshot) -> Vec<String> {
        let mut old_chapters = Vec::new();
        flatten(&old.chapters, &mut old_chapters);
        let mut new_chapters = Vec::new();
        flatten(&new.chapters, &mut new_chapters);

        let mut changed = Vec::new();

        for node in &new_chapters {
            match old_chapters.iter().find(|o| o.number == node.number) {
                Some(o) if o.title == node.title && o.content == node.content => (),
                _ => changed.push(node.number.clone()),
            }
        }

        for node in &old_chapters {
            if !new_chapters.iter().any(|n| n.number == node.number) {
                changed.push(node.number.clone());
            }
        }

        changed
    }
}

/// Nest a coordinate-ordered list of chapter rows into a tree.
fn assemble(rows: &[db::Chapter], parent: Option<i32>) -> Vec<ChapterNode> {
    rows.iter()
        .filter(|row| row.parent == parent)
        .map(|row| ChapterNode {
            number: Coordinates::from_db(row).to_string(),
            depth: row.depth,
            title: row.title.clone(),
            content: row.content.clone(),
            children: assemble(rows, Some(row.id)),
        })
        .collect()
}

fn flatten<'s>(nodes: &'s [ChapterNode], out: &mut Vec<&'s ChapterNode>) {
    for node in nodes {
        out.push(node);
        flatten(&node.children, out);
    }
}

#[derive(ApiError, Debug, Fail)]
pub enum ParseSnapshotError {
    /// Stored value does not match the declared format.
    #[fail(display = "Malformed snapshot: {}", _0)]
    #[api(internal)]
    Malformed(#[cause] serde_json::Error),
    /// Stored value was written by an unknown version of this module.
    #[fail(display = "Unsupported snapshot format {}", _0)]
    #[api(internal)]
    UnsupportedFormat(i32),
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn row(id: i32, chapter: i32, section: Option<i32>, parent: Option<i32>, index: i32)
    -> db::Chapter {
        db::Chapter {
            manual: Uuid::nil(),
            id,
            chapter,
            section,
            subsection: None,
            clause: None,
            depth: if section.is_some() { 1 } else { 0 },
            title: format!("Chapter {}", id),
            content: String::new(),
            parent,
            index,
        }
    }

    fn node(number: &str, title: &str, content: &str, children: Vec<ChapterNode>)
    -> ChapterNode {
        ChapterNode {
            number: number.into(),
            depth: number.matches('.').count() as i16,
            title: title.into(),
            content: content.into(),
            children,
        }
    }

    #[test]
    fn assemble_nests_children_under_parents() {
        let rows = [
            row(0, 0, None, None, 0),
            row(1, 1, None, None, 1),
            row(2, 1, Some(1), Some(1), 0),
            row(3, 1, Some(2), Some(1), 1),
        ];

        let tree = assemble(&rows, None);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].number, "0");
        assert!(tree[0].children.is_empty());
        assert_eq!(tree[1].number, "1");
        assert_eq!(tree[1].children.len(), 2);
        assert_eq!(tree[1].children[0].number, "1.1");
        assert_eq!(tree[1].children[1].number, "1.2");
    }

    #[test]
    fn from_value_refuses_unknown_formats() {
        let value = json!({
            "format": 99,
            "manual": {},
            "chapters": [],
        });

        match Snapshot::from_value(&value) {
            Err(ParseSnapshotError::UnsupportedFormat(99)) => (),
            other => panic!("expected UnsupportedFormat, got {:?}", other),
        }

        match Snapshot::from_value(&json!({})) {
            Err(ParseSnapshotError::UnsupportedFormat(0)) => (),
            other => panic!("expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn stored_snapshots_round_trip() {
        let snapshot = Snapshot {
            format: FORMAT,
            manual: ManualData {
                id: Uuid::nil(),
                title: "Ground Operations Manual".into(),
                organization: "Acme Air".into(),
                effective_date: None,
            },
            chapters: vec![node("0", "General", "scope", vec![])],
        };

        let restored = Snapshot::from_value(&snapshot.to_value()).unwrap();
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn changed_coordinates_reports_edits_additions_and_removals() {
        let old = Snapshot {
            format: FORMAT,
            manual: ManualData {
                id: Uuid::nil(),
                title: "M".into(),
                organization: "O".into(),
                effective_date: None,
            },
            chapters: vec![
                node("0", "General", "", vec![]),
                node("1", "Ops", "old text", vec![
                    node("1.1", "Dispatch", "", vec![]),
                ]),
            ],
        };

        let new = Snapshot {
            chapters: vec![
                node("0", "General", "", vec![]),
                node("1", "Ops", "new text", vec![
                    node("1.2", "Loading", "", vec![]),
                ]),
            ],
            ..old.clone()
        };

        assert_eq!(
            Snapshot::changed_coordinates(&old, &new),
            ["1", "1.2", "1.1"],
        );
    }
}
