//! Per-field before/after audit trail, distinct from the coarser audit log.
//!
//! The tracker is an explicit part of every mutating call path, not a
//! database trigger: model methods pass the pre- and post-image of a record
//! and the tracker persists one write-once row per changed field, inside
//! the caller's transaction. Like the audit log, the storage layer refuses
//! UPDATE and DELETE against recorded entries.

use diesel::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    audit::Actor,
    db::{
        Connection,
        models as db,
        schema::field_history,
        types::ChangeType,
    },
};

/// A database entity whose field-level changes are recorded.
pub trait Tracked: Serialize {
    /// Name of the table the entity lives in.
    const TABLE: &'static str;

    /// Primary key of the entity, rendered as text.
    fn record_id(&self) -> String;
}

impl Tracked for db::Manual {
    const TABLE: &'static str = "manuals";

    fn record_id(&self) -> String {
        self.id.to_string()
    }
}

impl Tracked for db::Chapter {
    const TABLE: &'static str = "chapters";

    fn record_id(&self) -> String {
        format!("{}/{}", self.manual, self.id)
    }
}

impl Tracked for db::Revision {
    const TABLE: &'static str = "revisions";

    fn record_id(&self) -> String {
        self.id.to_string()
    }
}

/// One field-level difference between two images of a record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldDelta {
    pub field: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// Compare two record images field by field.
///
/// Values are compared structurally; array- and object-valued fields are
/// compared as whole values, without descending into elements.
pub fn diff(old: &Value, new: &Value) -> Vec<FieldDelta> {
    let empty = Map::new();
    let old = old.as_object().unwrap_or(&empty);
    let new = new.as_object().unwrap_or(&empty);

    let mut deltas = Vec::new();

    for (field, old_value) in old {
        match new.get(field) {
            Some(new_value) if new_value == old_value => (),
            new_value => deltas.push(FieldDelta {
                field: field.clone(),
                old: Some(old_value.clone()),
                new: new_value.cloned(),
            }),
        }
    }

    for (field, new_value) in new {
        if !old.contains_key(field) {
            deltas.push(FieldDelta {
                field: field.clone(),
                old: None,
                new: Some(new_value.clone()),
            });
        }
    }

    deltas
}

/// Record an update to a tracked entity, one entry per changed field.
///
/// Entries are appended unconditionally; a field oscillating back to an
/// earlier value still produces a new row for every mutation. Unchanged
/// fields produce no rows. Returns the number of entries written.
pub fn record_update<A, T>(
    db: &Connection,
    actor: A,
    old: &T,
    new: &T,
    revision: Option<i32>,
) -> QueryResult<usize>
where
    Actor: From<A>,
    T: Tracked,
{
    let old_image = serde_json::to_value(old).expect("invalid record image");
    let new_image = serde_json::to_value(new).expect("invalid record image");

    let deltas = diff(&old_image, &new_image);
    if deltas.is_empty() {
        return Ok(0);
    }

    let record_id = new.record_id();
    let changed_by = Actor::from(actor).as_db();

    let entries = deltas.iter()
        .map(|delta| db::NewFieldHistoryEntry {
            table_name: T::TABLE,
            record_id: &record_id,
            field_name: &delta.field,
            old_value: delta.old.as_ref(),
            new_value: delta.new.as_ref(),
            change_type: ChangeType::Update,
            changed_by,
            revision,
        })
        .collect::<Vec<_>>();

    diesel::insert_into(field_history::table)
        .values(&entries)
        .execute(db)
}

/// Get all recorded changes to a record, oldest first.
pub fn for_record(db: &Connection, table: &str, record_id: &str)
-> QueryResult<Vec<db::FieldHistoryEntry>> {
    field_history::table
        .filter(field_history::table_name.eq(table)
            .and(field_history::record_id.eq(record_id)))
        .order((field_history::changed_at.asc(), field_history::id.asc()))
        .get_results(db)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unchanged_fields_produce_no_deltas() {
        let old = json!({"title": "GOM", "status": "draft"});
        let new = json!({"title": "GOM", "status": "draft"});
        assert_eq!(diff(&old, &new), []);
    }

    #[test]
    fn each_changed_field_produces_one_delta() {
        let old = json!({"title": "GOM", "status": "draft", "owner": 1});
        let new = json!({"title": "GOM", "status": "in_review", "owner": 2});

        let mut deltas = diff(&old, &new);
        deltas.sort_by(|a, b| a.field.cmp(&b.field));

        assert_eq!(deltas, [
            FieldDelta {
                field: "owner".into(),
                old: Some(json!(1)),
                new: Some(json!(2)),
            },
            FieldDelta {
                field: "status".into(),
                old: Some(json!("draft")),
                new: Some(json!("in_review")),
            },
        ]);
    }

    #[test]
    fn compound_values_are_compared_whole() {
        let old = json!({"affected": ["1.2", "3"]});
        let new = json!({"affected": ["1.2", "3", "4.1"]});

        let deltas = diff(&old, &new);

        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].old, Some(json!(["1.2", "3"])));
        assert_eq!(deltas[0].new, Some(json!(["1.2", "3", "4.1"])));
    }

    #[test]
    fn added_and_removed_fields_are_reported() {
        let old = json!({"gone": 1});
        let new = json!({"added": 2});

        let mut deltas = diff(&old, &new);
        deltas.sort_by(|a, b| a.field.cmp(&b.field));

        assert_eq!(deltas, [
            FieldDelta { field: "added".into(), old: None, new: Some(json!(2)) },
            FieldDelta { field: "gone".into(), old: Some(json!(1)), new: None },
        ]);
    }

    #[test]
    fn oscillating_value_is_a_delta_each_time() {
        let a = json!({"status": "draft"});
        let b = json!({"status": "rejected"});

        assert_eq!(diff(&a, &b).len(), 1);
        assert_eq!(diff(&b, &a).len(), 1);
    }
}
