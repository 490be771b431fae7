use chrono::NaiveDateTime;
use diesel::{
    prelude::*,
    result::Error as DbError,
};
use failure::Fail;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    ApiError,
    db::{
        Connection,
        models as db,
        schema::revisions,
        types::ManualStatus,
    },
};
use super::snapshot::{ParseSnapshotError, Snapshot};

/// A record of a manual's state at a lifecycle transition.
///
/// Revisions are mutable only while in `draft` or `in_review`. Once a
/// decision is made they are frozen; a rejected revision remains queryable
/// as history.
#[derive(Debug)]
pub struct Revision {
    data: db::Revision,
}

/// A subset of revision's data that can safely be publicly exposed.
///
/// The embedded snapshot is large and thus served separately.
#[derive(Debug, Serialize)]
pub struct PublicData {
    pub id: i32,
    pub manual: Uuid,
    pub revision_number: String,
    pub status: ManualStatus,
    pub changes_summary: String,
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

impl Revision {
    /// Construct `Revision` from its database counterpart.
    pub(crate) fn from_db(data: db::Revision) -> Revision {
        Revision { data }
    }

    /// Find a revision of a manual by ID.
    pub fn by_id(db: &Connection, manual: Uuid, id: i32)
    -> Result<Revision, FindRevisionError> {
        revisions::table
            .filter(revisions::manual.eq(manual).and(revisions::id.eq(id)))
            .get_result::<db::Revision>(db)
            .optional()?
            .ok_or(FindRevisionError::NotFound)
            .map(Revision::from_db)
    }

    /// Get all revisions of a manual, in creation order.
    pub fn all_of(db: &Connection, manual: Uuid)
    -> Result<Vec<Revision>, DbError> {
        revisions::table
            .filter(revisions::manual.eq(manual))
            .order((revisions::created_at.asc(), revisions::id.asc()))
            .get_results::<db::Revision>(db)
            .map(|v| v.into_iter().map(Revision::from_db).collect())
    }

    /// Get the most recently created revision of a manual, if any.
    pub(crate) fn latest_of(db: &Connection, manual: Uuid)
    -> Result<Option<Revision>, DbError> {
        revisions::table
            .filter(revisions::manual.eq(manual))
            .order((revisions::created_at.desc(), revisions::id.desc()))
            .first::<db::Revision>(db)
            .optional()
            .map(|data| data.map(Revision::from_db))
    }

    /// Compute the next legal revision label for a manual.
    ///
    /// For drafts this is the next free integer slot; promotion to approved
    /// keeps the number already attached to the revision under review.
    pub fn next_number(db: &Connection, manual: Uuid, draft: bool)
    -> Result<String, DbError> {
        let existing = revisions::table
            .filter(revisions::manual.eq(manual))
            .select(revisions::revision_number)
            .get_results::<String>(db)?;

        Ok(next_revision_number(existing.iter().map(String::as_str), draft))
    }

    /// Unpack database data.
    pub fn into_db(self) -> db::Revision {
        self.data
    }

    /// Get the embedded snapshot, exactly as stored.
    pub fn snapshot(&self) -> Result<Snapshot, ParseSnapshotError> {
        Snapshot::from_value(&self.data.snapshot)
    }

    /// Get the public portion of this revision's data.
    pub fn get_public(&self) -> PublicData {
        PublicData {
            id: self.data.id,
            manual: self.data.manual,
            revision_number: self.data.revision_number.clone(),
            status: self.data.status,
            changes_summary: self.data.changes_summary.clone(),
            affected_chapters: self.data.affected_chapters.clone(),
            created_at: self.data.created_at,
            submitted_at: self.data.submitted_at,
            submitted_by: self.data.submitted_by,
            approved_at: self.data.approved_at,
            approved_by: self.data.approved_by,
            rejected_at: self.data.rejected_at,
            rejected_by: self.data.rejected_by,
            rejection_reason: self.data.rejection_reason.clone(),
        }
    }
}

impl std::ops::Deref for Revision {
    type Target = db::Revision;

    fn deref(&self) -> &db::Revision {
        &self.data
    }
}

/// Compute the next legal revision label from existing labels.
///
/// Labels are parsed as either a bare integer or an `"<int>.<int>"` decimal
/// form; decimal sub-revisions never advance the integer base. Labels are
/// rendered as decimal strings, never native integers, so approved labels
/// stay stable text even if future schemes add non-numeric suffixes.
pub fn next_revision_number<'a, I>(existing: I, draft: bool) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let base = existing.into_iter()
        .filter_map(parse_base)
        .max()
        .unwrap_or(0);

    if draft {
        (base + 1).to_string()
    } else {
        base.to_string()
    }
}

/// Extract the integer base of a revision label.
///
/// Returns `None` for labels in neither of the two supported forms; such
/// labels never contribute to numbering.
fn parse_base(label: &str) -> Option<i32> {
    let mut parts = label.splitn(3, '.');

    let base = parts.next()?.parse().ok()?;

    match parts.next() {
        None => Some(base),
        Some(minor) => match (minor.parse::<i32>(), parts.next()) {
            (Ok(_), None) => Some(base),
            _ => None,
        },
    }
}

#[derive(ApiError, Debug, Fail)]
pub enum FindRevisionError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// No revision found matching given criteria.
    #[fail(display = "No such revision")]
    #[api(code = "revision:not-found", status = "NOT_FOUND")]
    NotFound,
}

impl_from! { for FindRevisionError ;
    DbError => |e| FindRevisionError::Database(e),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_draft_is_numbered_one() {
        assert_eq!(next_revision_number(vec![], true), "1");
    }

    #[test]
    fn drafts_take_the_next_integer_slot() {
        assert_eq!(next_revision_number(vec!["1"], true), "2");
        assert_eq!(next_revision_number(vec!["1", "2", "3"], true), "4");
    }

    #[test]
    fn decimal_sub_revisions_do_not_advance_the_base() {
        assert_eq!(next_revision_number(vec!["1", "1.2"], true), "2");
        assert_eq!(next_revision_number(vec!["2.9"], true), "3");
    }

    #[test]
    fn promotion_keeps_the_current_base() {
        assert_eq!(next_revision_number(vec!["1"], false), "1");
        assert_eq!(next_revision_number(vec!["3", "2", "3.1"], false), "3");
    }

    #[test]
    fn unparsable_labels_are_ignored() {
        assert_eq!(next_revision_number(vec!["A", "1.2.3", ""], true), "1");
        assert_eq!(next_revision_number(vec!["2", "rev-7"], true), "3");
    }

    #[test]
    fn parse_base_accepts_both_label_forms() {
        assert_eq!(parse_base("4"), Some(4));
        assert_eq!(parse_base("4.2"), Some(4));
        assert_eq!(parse_base("4.2.1"), None);
        assert_eq!(parse_base("four"), None);
        assert_eq!(parse_base("4.x"), None);
    }
}
