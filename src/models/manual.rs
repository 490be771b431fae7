//! Manuals and their lifecycle.
//!
//! Every lifecycle transition runs as one atomic transaction which re-reads
//! the manual row with a row lock before checking its precondition, so
//! concurrent transitions serialize and the loser fails its guard cleanly
//! instead of double-applying. Audit log and field history writes are part
//! of the same transaction; notification dispatch happens only after commit
//! and is allowed to fail independently.

use chrono::{NaiveDate, Utc};
use diesel::{
    Connection as _Connection,
    prelude::*,
    result::{DatabaseErrorKind, Error as DbError},
};
use failure::Fail;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    ApiError,
    audit,
    db::{
        Connection,
        models as db,
        schema::{manuals, revisions},
        types::ManualStatus,
    },
    events::{EventManager, ReviewRequested, RevisionApproved, RevisionRejected},
    history,
    permissions::{PermissionBits, RequirePermissionsError},
};
use super::{
    chapter::Chapter,
    revision::{FindRevisionError, Revision},
    snapshot::Snapshot,
    user::User,
};

/// A versioned document under management.
#[derive(Debug)]
pub struct Manual {
    data: db::Manual,
}

/// A subset of manual's data that can safely be publicly exposed.
#[derive(Debug, Serialize)]
pub struct PublicData {
    pub id: Uuid,
    pub title: String,
    pub organization: String,
    pub status: ManualStatus,
    pub current_revision: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub owner: i32,
    pub is_archived: bool,
}

/// Changes to a manual's tracked metadata fields.
#[derive(Debug, Default)]
pub struct ManualUpdate<'a> {
    pub title: Option<&'a str>,
    pub organization: Option<&'a str>,
}

impl Manual {
    /// Construct `Manual` from its database counterpart.
    pub(crate) fn from_db(data: db::Manual) -> Manual {
        Manual { data }
    }

    /// Create a new manual, with its mandatory chapter 0 and an initial
    /// draft revision numbered `"1"`.
    pub fn create(
        db: &Connection,
        actor: &User,
        title: &str,
        organization: &str,
    ) -> Result<Manual, CreateManualError> {
        if !actor.is_super {
            actor.permissions().require(PermissionBits::EDIT_MANUAL)?;
        }

        db.transaction(|| {
            let data = diesel::insert_into(manuals::table)
                .values(&db::NewManual {
                    id: Uuid::new_v4(),
                    title,
                    organization,
                    status: ManualStatus::Draft,
                    owner: actor.id,
                })
                .get_result::<db::Manual>(db)?;

            Chapter::create_root(db, &data)?;

            let snapshot = Snapshot::build(db, &data)?.to_value();
            let affected = serde_json::Value::Array(vec![]);

            let revision = diesel::insert_into(revisions::table)
                .values(&db::NewRevision {
                    manual: data.id,
                    revision_number: "1",
                    status: ManualStatus::Draft,
                    snapshot: &snapshot,
                    changes_summary: "",
                    affected_chapters: &affected,
                    submitted_at: None,
                    submitted_by: None,
                })
                .get_result::<db::Revision>(db)?;

            audit::log_db(db, actor, "manuals", data.id, "create", LogNewManual {
                title,
                organization,
                revision: revision.id,
            })?;

            Ok(Manual { data })
        })
    }

    /// Find a manual by ID.
    pub fn by_id(db: &Connection, id: Uuid) -> Result<Manual, FindManualError> {
        manuals::table
            .filter(manuals::id.eq(id))
            .get_result::<db::Manual>(db)
            .optional()?
            .ok_or(FindManualError::NotFound)
            .map(Manual::from_db)
    }

    /// Get all manuals which have not been archived.
    pub fn all(db: &Connection) -> Result<Vec<Manual>, DbError> {
        manuals::table
            .filter(manuals::is_archived.eq(false))
            .order(manuals::created_at.asc())
            .get_results::<db::Manual>(db)
            .map(|v| v.into_iter().map(Manual::from_db).collect())
    }

    /// Get ID of this manual.
    pub fn id(&self) -> Uuid {
        self.data.id
    }

    /// Get the public portion of this manual's data.
    pub fn get_public(&self) -> PublicData {
        PublicData {
            id: self.data.id,
            title: self.data.title.clone(),
            organization: self.data.organization.clone(),
            status: self.data.status,
            current_revision: self.data.current_revision.clone(),
            effective_date: self.data.effective_date,
            owner: self.data.owner,
            is_archived: self.data.is_archived,
        }
    }

    /// Update tracked metadata fields of this manual.
    pub fn update(
        &mut self,
        db: &Connection,
        actor: &User,
        update: ManualUpdate,
    ) -> Result<(), EditManualError> {
        if actor.id != self.data.owner && !actor.is_super {
            actor.permissions().require(PermissionBits::EDIT_MANUAL)?;
        }

        self.data = db.transaction(|| {
            let old = lock_manual(db, self.data.id)?;

            if old.is_archived {
                return Err(EditManualError::Archived);
            }

            let data = diesel::update(&old)
                .set((
                    update.title.map(|t| manuals::title.eq(t)),
                    update.organization.map(|o| manuals::organization.eq(o)),
                    manuals::updated_at.eq(Utc::now().naive_utc()),
                ))
                .get_result::<db::Manual>(db)?;

            history::record_update(db, actor, &old, &data, None)?;
            audit::log_db(db, actor, "manuals", data.id, "update", ())?;

            Ok(data)
        })?;

        Ok(())
    }

    /// Archive this manual. Archived manuals are read-only history; they are
    /// never hard-deleted.
    pub fn archive(&mut self, db: &Connection, actor: &User)
    -> Result<(), EditManualError> {
        if !actor.is_super {
            actor.permissions().require(PermissionBits::ARCHIVE_MANUAL)?;
        }

        self.data = db.transaction(|| {
            let old = lock_manual(db, self.data.id)?;

            if old.is_archived {
                return Err(EditManualError::Archived);
            }

            let data = diesel::update(&old)
                .set((
                    manuals::is_archived.eq(true),
                    manuals::updated_at.eq(Utc::now().naive_utc()),
                ))
                .get_result::<db::Manual>(db)?;

            history::record_update(db, actor, &old, &data, None)?;
            audit::log_db(db, actor, "manuals", data.id, "archive", ())?;

            Ok(data)
        })?;

        Ok(())
    }

    /// Submit this manual for review.
    ///
    /// An existing draft (or rejected) revision is promoted in place: it
    /// keeps its number but receives a fresh snapshot and affected-chapter
    /// list. Otherwise a new revision is created directly in review.
    pub fn submit_for_review(&mut self, db: &Connection, actor: &User)
    -> Result<Revision, SubmitManualError> {
        let revision = db.transaction(|| {
            let data = lock_manual(db, self.data.id)?;

            if data.is_archived {
                return Err(SubmitManualError::Archived);
            }
            if actor.id != data.owner && !actor.is_super {
                actor.permissions().require(PermissionBits::REVIEW_DECISION)?;
            }
            if !data.status.can_submit() {
                return Err(SubmitManualError::BadStatus(data.status));
            }

            let snapshot = Snapshot::build(db, &data)?;
            let affected = affected_since_last_approval(db, data.id, &snapshot)?;
            let snapshot = snapshot.to_value();
            let now = Utc::now().naive_utc();

            let active = Revision::latest_of(db, data.id)?
                .map(Revision::into_db)
                .filter(|rev| rev.status.can_submit());

            let revision = match active {
                Some(old) => {
                    let promoted = diesel::update(
                        revisions::table.filter(revisions::id.eq(old.id)))
                        .set((
                            revisions::status.eq(ManualStatus::InReview),
                            revisions::snapshot.eq(&snapshot),
                            revisions::affected_chapters.eq(&affected),
                            revisions::submitted_at.eq(now),
                            revisions::submitted_by.eq(actor.id),
                        ))
                        .get_result::<db::Revision>(db)?;

                    history::record_update(
                        db, actor, &old, &promoted, Some(promoted.id))?;

                    promoted
                }
                None => {
                    let number = Revision::next_number(db, data.id, true)?;

                    diesel::insert_into(revisions::table)
                        .values(&db::NewRevision {
                            manual: data.id,
                            revision_number: &number,
                            status: ManualStatus::InReview,
                            snapshot: &snapshot,
                            changes_summary: "",
                            affected_chapters: &affected,
                            submitted_at: Some(now),
                            submitted_by: Some(actor.id),
                        })
                        .get_result::<db::Revision>(db)?
                }
            };

            let old = data.clone();
            let data = diesel::update(&old)
                .set((
                    manuals::status.eq(ManualStatus::InReview),
                    manuals::updated_at.eq(now),
                ))
                .get_result::<db::Manual>(db)?;

            history::record_update(db, actor, &old, &data, Some(revision.id))?;
            audit::log_db(
                db, actor, "manuals", data.id, "submit-for-review", LogTransition {
                    revision: revision.id,
                    revision_number: &revision.revision_number,
                })?;

            self.data = data;

            Ok(Revision::from_db(revision))
        })?;

        // The transaction is committed; from here on failures must not undo
        // the transition. Notification errors are logged and swallowed.
        match User::reviewers(db) {
            Ok(reviewers) => for reviewer in reviewers {
                EventManager::notify(reviewer.id, ReviewRequested {
                    manual: self.data.id,
                    title: self.data.title.clone(),
                    revision: revision.id,
                    who: actor.id,
                });
            },
            Err(err) => error!("could not determine reviewers to notify: {}", err),
        }

        Ok(revision)
    }

    /// Approve the revision under review.
    ///
    /// This is the only transition that advances the externally visible
    /// revision label.
    pub fn approve(
        &mut self,
        db: &Connection,
        revision_id: i32,
        actor: &User,
        effective_date: NaiveDate,
        comment: Option<&str>,
    ) -> Result<Revision, DecideManualError> {
        if !actor.is_super {
            actor.permissions().require(PermissionBits::REVIEW_DECISION)?;
        }

        let revision = db.transaction(|| {
            let data = lock_manual(db, self.data.id)?;

            if data.is_archived {
                return Err(DecideManualError::Archived);
            }
            if !data.status.can_decide() {
                return Err(DecideManualError::BadStatus(data.status));
            }

            let old = Revision::by_id(db, data.id, revision_id)?.into_db();

            if old.status != ManualStatus::InReview {
                return Err(DecideManualError::NotUnderReview);
            }

            let now = Utc::now().naive_utc();

            let revision = diesel::update(
                revisions::table.filter(revisions::id.eq(old.id)))
                .set((
                    revisions::status.eq(ManualStatus::Approved),
                    revisions::approved_at.eq(now),
                    revisions::approved_by.eq(actor.id),
                    comment.map(|c| revisions::changes_summary.eq(c)),
                ))
                .get_result::<db::Revision>(db)?;

            history::record_update(db, actor, &old, &revision, Some(revision.id))?;

            let old = data.clone();
            let data = diesel::update(&old)
                .set((
                    manuals::status.eq(ManualStatus::Approved),
                    manuals::current_revision.eq(&revision.revision_number),
                    manuals::effective_date.eq(effective_date),
                    manuals::updated_at.eq(now),
                ))
                .get_result::<db::Manual>(db)?;

            history::record_update(db, actor, &old, &data, Some(revision.id))?;
            audit::log_db(db, actor, "manuals", data.id, "approve", LogTransition {
                revision: revision.id,
                revision_number: &revision.revision_number,
            })?;

            self.data = data;

            Ok(Revision::from_db(revision))
        })?;

        EventManager::notify(self.data.owner, RevisionApproved {
            manual: self.data.id,
            title: self.data.title.clone(),
            revision: revision.id,
            who: actor.id,
        });

        Ok(revision)
    }

    /// Reject the revision under review, with a reason.
    ///
    /// The manual becomes editable again and can be resubmitted; the
    /// rejected revision is then promoted back in place.
    pub fn reject(
        &mut self,
        db: &Connection,
        revision_id: i32,
        actor: &User,
        reason: &str,
    ) -> Result<Revision, DecideManualError> {
        if !actor.is_super {
            actor.permissions().require(PermissionBits::REVIEW_DECISION)?;
        }
        if reason.trim().is_empty() {
            return Err(DecideManualError::MissingReason);
        }

        let revision = db.transaction(|| {
            let data = lock_manual(db, self.data.id)?;

            if data.is_archived {
                return Err(DecideManualError::Archived);
            }
            if !data.status.can_decide() {
                return Err(DecideManualError::BadStatus(data.status));
            }

            let old = Revision::by_id(db, data.id, revision_id)?.into_db();

            if old.status != ManualStatus::InReview {
                return Err(DecideManualError::NotUnderReview);
            }

            let now = Utc::now().naive_utc();

            let revision = diesel::update(
                revisions::table.filter(revisions::id.eq(old.id)))
                .set((
                    revisions::status.eq(ManualStatus::Rejected),
                    revisions::rejected_at.eq(now),
                    revisions::rejected_by.eq(actor.id),
                    revisions::rejection_reason.eq(reason),
                ))
                .get_result::<db::Revision>(db)?;

            history::record_update(db, actor, &old, &revision, Some(revision.id))?;

            let old = data.clone();
            let data = diesel::update(&old)
                .set((
                    manuals::status.eq(ManualStatus::Rejected),
                    manuals::updated_at.eq(now),
                ))
                .get_result::<db::Manual>(db)?;

            history::record_update(db, actor, &old, &data, Some(revision.id))?;
            audit::log_db(db, actor, "manuals", data.id, "reject", LogRejection {
                revision: revision.id,
                reason,
            })?;

            self.data = data;

            Ok(Revision::from_db(revision))
        })?;

        EventManager::notify(self.data.owner, RevisionRejected {
            manual: self.data.id,
            title: self.data.title.clone(),
            revision: revision.id,
            who: actor.id,
            reason: reason.to_string(),
        });

        Ok(revision)
    }

    /// Begin a new revision cycle on an approved manual.
    ///
    /// The new draft revision is initialized from the approved snapshot,
    /// takes the next integer slot, and returns the manual to `draft`. The
    /// approved revision is untouched and remains retrievable.
    pub fn start_next_revision(&mut self, db: &Connection, actor: &User)
    -> Result<Revision, SubmitManualError> {
        db.transaction(|| {
            let data = lock_manual(db, self.data.id)?;

            if data.is_archived {
                return Err(SubmitManualError::Archived);
            }
            if actor.id != data.owner && !actor.is_super {
                actor.permissions().require(PermissionBits::EDIT_MANUAL)?;
            }
            if data.status != ManualStatus::Approved {
                return Err(SubmitManualError::BadStatus(data.status));
            }

            let approved = revisions::table
                .filter(revisions::manual.eq(data.id)
                    .and(revisions::status.eq(ManualStatus::Approved)))
                .order((revisions::created_at.desc(), revisions::id.desc()))
                .first::<db::Revision>(db)?;

            let number = Revision::next_number(db, data.id, true)?;
            let affected = serde_json::Value::Array(vec![]);

            // The new draft starts from the approved snapshot, verbatim.
            let revision = diesel::insert_into(revisions::table)
                .values(&db::NewRevision {
                    manual: data.id,
                    revision_number: &number,
                    status: ManualStatus::Draft,
                    snapshot: &approved.snapshot,
                    changes_summary: "",
                    affected_chapters: &affected,
                    submitted_at: None,
                    submitted_by: None,
                })
                .get_result::<db::Revision>(db)?;

            let old = data.clone();
            let data = diesel::update(&old)
                .set((
                    manuals::status.eq(ManualStatus::Draft),
                    manuals::updated_at.eq(Utc::now().naive_utc()),
                ))
                .get_result::<db::Manual>(db)?;

            history::record_update(db, actor, &old, &data, Some(revision.id))?;
            audit::log_db(
                db, actor, "manuals", data.id, "start-next-revision", LogTransition {
                    revision: revision.id,
                    revision_number: &revision.revision_number,
                })?;

            self.data = data;

            Ok(Revision::from_db(revision))
        })
    }
}

impl std::ops::Deref for Manual {
    type Target = db::Manual;

    fn deref(&self) -> &db::Manual {
        &self.data
    }
}

/// Re-read a manual row, taking a row lock for the rest of the transaction.
///
/// Guard checks must run against this freshly read row, not a cached copy,
/// so two concurrent transitions serialize and the second observes the
/// already-updated status.
fn lock_manual(db: &Connection, id: Uuid) -> Result<db::Manual, DbError> {
    manuals::table
        .filter(manuals::id.eq(id))
        .for_update()
        .get_result::<db::Manual>(db)
}

/// Coordinates of chapters that changed since the last approved revision.
///
/// With no approved revision yet, every chapter counts as affected.
fn affected_since_last_approval(
    db: &Connection,
    manual: Uuid,
    current: &Snapshot,
) -> Result<serde_json::Value, DbError> {
    let prior = revisions::table
        .filter(revisions::manual.eq(manual)
            .and(revisions::status.eq(ManualStatus::Approved)))
        .order((revisions::created_at.desc(), revisions::id.desc()))
        .first::<db::Revision>(db)
        .optional()?;

    let changed = match prior.as_ref().map(|rev| Snapshot::from_value(&rev.snapshot)) {
        Some(Ok(prior)) => Snapshot::changed_coordinates(&prior, current),
        Some(Err(err)) => {
            warn!("cannot read prior snapshot of manual {}: {}", manual, err);
            all_coordinates(current)
        }
        None => all_coordinates(current),
    };

    Ok(serde_json::to_value(changed).expect("invalid affected-chapter list"))
}

fn all_coordinates(snapshot: &Snapshot) -> Vec<String> {
    let empty = Snapshot {
        chapters: vec![],
        ..snapshot.clone()
    };
    Snapshot::changed_coordinates(&empty, snapshot)
}

#[derive(ApiError, Debug, Fail)]
pub enum FindManualError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// No manual found matching given criteria.
    #[fail(display = "No such manual")]
    #[api(code = "manual:not-found", status = "NOT_FOUND")]
    NotFound,
}

impl_from! { for FindManualError ;
    DbError => |e| FindManualError::Database(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum CreateManualError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Actor is not allowed to create manuals.
    #[fail(display = "{}", _0)]
    Permissions(#[cause] RequirePermissionsError),
}

impl_from! { for CreateManualError ;
    DbError => |e| CreateManualError::Database(e),
    RequirePermissionsError => |e| CreateManualError::Permissions(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum EditManualError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Manual has been archived and is read-only.
    #[fail(display = "Manual is archived")]
    #[api(code = "manual:archived", status = "BAD_REQUEST")]
    Archived,
    /// Actor is not allowed to edit this manual.
    #[fail(display = "{}", _0)]
    Permissions(#[cause] RequirePermissionsError),
}

impl_from! { for EditManualError ;
    DbError => |e| EditManualError::Database(e),
    RequirePermissionsError => |e| EditManualError::Permissions(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum SubmitManualError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Manual has been archived and is read-only.
    #[fail(display = "Manual is archived")]
    #[api(code = "manual:archived", status = "BAD_REQUEST")]
    Archived,
    /// Manual's current state does not permit this transition.
    #[fail(display = "Cannot perform this transition from state {}", _0)]
    #[api(code = "manual:bad-status", status = "BAD_REQUEST")]
    BadStatus(ManualStatus),
    /// Another revision cycle concurrently took the same number. The caller
    /// may retry once after re-reading state.
    #[fail(display = "Revision number already taken")]
    #[api(code = "revision:number-taken", status = "CONFLICT")]
    NumberTaken,
    /// Actor is not allowed to submit this manual.
    #[fail(display = "{}", _0)]
    Permissions(#[cause] RequirePermissionsError),
}

impl_from! { for SubmitManualError ;
    DbError => |e| match e {
        DbError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) =>
            SubmitManualError::NumberTaken,
        _ => SubmitManualError::Database(e),
    },
    RequirePermissionsError => |e| SubmitManualError::Permissions(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum DecideManualError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Manual has been archived and is read-only.
    #[fail(display = "Manual is archived")]
    #[api(code = "manual:archived", status = "BAD_REQUEST")]
    Archived,
    /// Manual's current state does not permit a review decision.
    #[fail(display = "Cannot perform this transition from state {}", _0)]
    #[api(code = "manual:bad-status", status = "BAD_REQUEST")]
    BadStatus(ManualStatus),
    /// The specified revision exists but is not the one under review.
    #[fail(display = "Revision is not under review")]
    #[api(code = "revision:not-under-review", status = "BAD_REQUEST")]
    NotUnderReview,
    /// Rejections must carry a non-empty reason.
    #[fail(display = "A rejection reason is required")]
    #[api(code = "manual:reject:no-reason", status = "BAD_REQUEST")]
    MissingReason,
    /// No revision found matching given criteria.
    #[fail(display = "{}", _0)]
    Revision(#[cause] FindRevisionError),
    /// Actor is not allowed to decide reviews.
    #[fail(display = "{}", _0)]
    Permissions(#[cause] RequirePermissionsError),
}

impl_from! { for DecideManualError ;
    DbError => |e| DecideManualError::Database(e),
    FindRevisionError => |e| DecideManualError::Revision(e),
    RequirePermissionsError => |e| DecideManualError::Permissions(e),
}

#[derive(Serialize)]
struct LogNewManual<'a> {
    title: &'a str,
    organization: &'a str,
    revision: i32,
}

#[derive(Serialize)]
struct LogTransition<'a> {
    revision: i32,
    revision_number: &'a str,
}

#[derive(Serialize)]
struct LogRejection<'a> {
    revision: i32,
    reason: &'a str,
}
