use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use uuid::Uuid;

use super::schema::*;
use super::types::{ChangeType, ManualStatus};

#[derive(Clone, Debug, Identifiable, Queryable, Serialize)]
pub struct User {
    pub id: i32,
    /// User's email address, used for identification and notifications.
    pub email: String,
    /// User's display name.
    pub name: String,
    /// Is this user an administrator? Administrators hold every permission.
    pub is_super: bool,
    /// Permission bits granted to this user.
    pub permissions: i32,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "users"]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub name: &'a str,
    pub is_super: bool,
    pub permissions: i32,
}

#[derive(Clone, Debug, Identifiable, Queryable, Serialize)]
pub struct Manual {
    /// ID of this manual.
    pub id: Uuid,
    /// Title of this manual.
    pub title: String,
    /// Organization this manual belongs to.
    pub organization: String,
    /// Current lifecycle state. Always consistent with the state of the most
    /// recent revision.
    pub status: ManualStatus,
    /// Number of the most recently approved revision, if any.
    pub current_revision: Option<String>,
    /// Date from which the approved content is effective.
    pub effective_date: Option<NaiveDate>,
    /// ID of the user owning this manual.
    pub owner: i32,
    /// Manuals are never hard-deleted, only archived.
    pub is_archived: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "manuals"]
pub struct NewManual<'a> {
    pub id: Uuid,
    pub title: &'a str,
    pub organization: &'a str,
    pub status: ManualStatus,
    pub owner: i32,
}

#[derive(Associations, Clone, Debug, Identifiable, Queryable, Serialize)]
#[primary_key(manual, id)]
#[belongs_to(Manual, foreign_key = "manual")]
pub struct Chapter {
    /// ID of the manual this chapter belongs to.
    pub manual: Uuid,
    /// ID of this chapter within `manual`.
    pub id: i32,
    /// Top-level coordinate. Every manual has a mandatory chapter 0.
    pub chapter: i32,
    /// Second-level coordinate, populated for depth ≥ 1.
    pub section: Option<i32>,
    /// Third-level coordinate, populated for depth ≥ 2.
    pub subsection: Option<i32>,
    /// Fourth-level coordinate, populated for depth 3.
    pub clause: Option<i32>,
    /// Nesting level, 0 to 3. Coordinates for levels 0..=depth are populated
    /// and none beyond.
    pub depth: i16,
    pub title: String,
    pub content: String,
    /// ID of the parent chapter. `None` for depth-0 chapters.
    pub parent: Option<i32>,
    /// Display order among siblings.
    pub index: i32,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "chapters"]
pub struct NewChapter<'a> {
    pub manual: Uuid,
    pub id: i32,
    pub chapter: i32,
    pub section: Option<i32>,
    pub subsection: Option<i32>,
    pub clause: Option<i32>,
    pub depth: i16,
    pub title: &'a str,
    pub content: &'a str,
    pub parent: Option<i32>,
    pub index: i32,
}

#[derive(Associations, Clone, Debug, Identifiable, Queryable, Serialize)]
#[belongs_to(Manual, foreign_key = "manual")]
pub struct Revision {
    /// ID of this revision.
    pub id: i32,
    /// ID of the manual this revision belongs to.
    pub manual: Uuid,
    /// Revision label, a decimal string. Unique within a manual.
    pub revision_number: String,
    /// Private copy of the manual's lifecycle state at the last transition
    /// involving this revision.
    pub status: ManualStatus,
    /// Frozen snapshot of the manual and its chapter tree, taken when this
    /// revision was created or last (re)submitted. Never regenerated once
    /// the revision is approved or rejected.
    pub snapshot: Value,
    pub changes_summary: String,
    /// Coordinates of chapters affected by this revision.
    pub affected_chapters: Value,
    pub created_at: NaiveDateTime,
    pub submitted_at: Option<NaiveDateTime>,
    pub submitted_by: Option<i32>,
    pub approved_at: Option<NaiveDateTime>,
    pub approved_by: Option<i32>,
    pub rejected_at: Option<NaiveDateTime>,
    pub rejected_by: Option<i32>,
    pub rejection_reason: Option<String>,
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "revisions"]
pub struct NewRevision<'a> {
    pub manual: Uuid,
    pub revision_number: &'a str,
    pub status: ManualStatus,
    pub snapshot: &'a Value,
    pub changes_summary: &'a str,
    pub affected_chapters: &'a Value,
    pub submitted_at: Option<NaiveDateTime>,
    pub submitted_by: Option<i32>,
}

#[derive(Clone, Debug, Identifiable, Queryable, Serialize)]
#[table_name = "field_history"]
pub struct FieldHistoryEntry {
    pub id: i32,
    /// Table the mutated record lives in.
    pub table_name: String,
    /// Primary key of the mutated record, rendered as text.
    pub record_id: String,
    pub field_name: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub change_type: ChangeType,
    /// User who made the change, `None` for the system.
    pub changed_by: Option<i32>,
    pub changed_at: NaiveDateTime,
    /// Revision that was active when the change was made, if any.
    pub revision: Option<i32>,
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "field_history"]
pub struct NewFieldHistoryEntry<'a> {
    pub table_name: &'a str,
    pub record_id: &'a str,
    pub field_name: &'a str,
    pub old_value: Option<&'a Value>,
    pub new_value: Option<&'a Value>,
    pub change_type: ChangeType,
    pub changed_by: Option<i32>,
    pub revision: Option<i32>,
}

#[derive(Clone, Debug, Identifiable, Queryable, Serialize)]
#[table_name = "audit_log"]
pub struct AuditLogEntry {
    pub id: i32,
    /// User responsible for the action, `None` for the system.
    pub actor: Option<i32>,
    /// Short string describing what was done.
    pub action: String,
    /// Type of the entity the action was performed on.
    pub context: String,
    /// Identifier of the entity, rendered as text.
    pub context_id: String,
    /// Additional structured data about the action.
    pub data: Value,
    pub created_at: NaiveDateTime,
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "audit_log"]
pub struct NewAuditLogEntry<'a> {
    pub actor: Option<i32>,
    pub action: &'a str,
    pub context: &'a str,
    pub context_id: &'a str,
    pub data: Value,
}

#[derive(Clone, Debug, Identifiable, Queryable)]
pub struct Event {
    /// ID of this event.
    pub id: i32,
    /// ID of the user for which this event was generated.
    pub user: i32,
    /// Time at which this event was generated.
    pub timestamp: NaiveDateTime,
    /// Short string describing what kind of event is this.
    pub kind: String,
    /// True if the user has not yet reviewed this event.
    pub is_unread: bool,
    /// Actual data for the event, serialized as MessagePack.
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "events"]
pub struct NewEvent<'a> {
    pub user: i32,
    pub kind: &'a str,
    pub data: &'a [u8],
}
