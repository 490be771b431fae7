use actix_web::{App, Json, Path, http::Method};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    models::{
        chapter::{Chapter, PublicData as ChapterData},
        manual::{
            EditManualError,
            Manual,
            ManualUpdate,
            PublicData as ManualData,
        },
        revision::{PublicData as RevisionData, Revision},
        user::User,
    },
    permissions::PermissionBits,
};
use super::{
    Error,
    RouteExt,
    RouterExt,
    State,
    util::Identity,
};

/// Configure routes.
pub fn routes(app: App<State>) -> App<State> {
    app
        .resource("/manuals", |r| {
            r.get().api_with(list_manuals);
            r.post().api_with(create_manual);
        })
        .resource("/manuals/{id}", |r| {
            r.get().api_with(get_manual);
            r.put().api_with(update_manual);
            r.delete().api_with(archive_manual);
        })
        .api_route("/manuals/{id}/submit", Method::POST, submit_manual)
        .api_route("/manuals/{id}/approve", Method::POST, approve_manual)
        .api_route("/manuals/{id}/reject", Method::POST, reject_manual)
        .api_route("/manuals/{id}/next-revision", Method::POST, start_next_revision)
        .api_route("/manuals/{id}/revisions", Method::GET, list_revisions)
        .api_route("/manuals/{id}/revisions/{revision}", Method::GET, get_revision)
        .api_route(
            "/manuals/{id}/revisions/{revision}/snapshot",
            Method::GET,
            get_snapshot,
        )
        .resource("/manuals/{id}/chapters", |r| {
            r.get().api_with(list_chapters);
            r.post().api_with(create_chapter);
        })
        .resource("/manuals/{id}/chapters/{chapter}", |r| {
            r.get().api_with(get_chapter);
            r.put().api_with(update_chapter);
            r.delete().api_with(delete_chapter);
        })
}

type Result<T, E=Error> = std::result::Result<T, E>;

/// List all manuals.
///
/// ## Method
///
/// ```text
/// GET /manuals
/// ```
pub fn list_manuals(
    state: actix_web::State<State>,
    _id: Identity,
) -> Result<Json<Vec<ManualData>>> {
    let db = state.db.get()?;
    let manuals = Manual::all(&*db)?;

    Ok(Json(manuals.iter().map(Manual::get_public).collect()))
}

#[derive(Debug, Deserialize)]
pub struct NewManual {
    title: String,
    organization: String,
}

/// Create a new manual.
///
/// ## Method
///
/// ```text
/// POST /manuals
/// ```
pub fn create_manual(
    state: actix_web::State<State>,
    id: Identity,
    data: Json<NewManual>,
) -> Result<Json<ManualData>> {
    let db = state.db.get()?;
    let user = id.user(&*db)?;

    let manual = Manual::create(&*db, &user, &data.title, &data.organization)?;

    Ok(Json(manual.get_public()))
}

/// Get a manual by ID.
///
/// ## Method
///
/// ```text
/// GET /manuals/:id
/// ```
pub fn get_manual(
    state: actix_web::State<State>,
    _id: Identity,
    path: Path<Uuid>,
) -> Result<Json<ManualData>> {
    let db = state.db.get()?;
    let manual = Manual::by_id(&*db, *path)?;

    Ok(Json(manual.get_public()))
}

#[derive(Debug, Deserialize)]
pub struct ManualChange {
    title: Option<String>,
    organization: Option<String>,
}

/// Update a manual's metadata.
///
/// ## Method
///
/// ```text
/// PUT /manuals/:id
/// ```
pub fn update_manual(
    state: actix_web::State<State>,
    id: Identity,
    path: Path<Uuid>,
    data: Json<ManualChange>,
) -> Result<Json<ManualData>> {
    let db = state.db.get()?;
    let user = id.user(&*db)?;
    let mut manual = Manual::by_id(&*db, *path)?;

    manual.update(&*db, &user, ManualUpdate {
        title: data.title.as_ref().map(String::as_str),
        organization: data.organization.as_ref().map(String::as_str),
    })?;

    Ok(Json(manual.get_public()))
}

/// Archive a manual. Manuals are never hard-deleted.
///
/// ## Method
///
/// ```text
/// DELETE /manuals/:id
/// ```
pub fn archive_manual(
    state: actix_web::State<State>,
    id: Identity,
    path: Path<Uuid>,
) -> Result<Json<ManualData>> {
    let db = state.db.get()?;
    let user = id.user(&*db)?;
    let mut manual = Manual::by_id(&*db, *path)?;

    manual.archive(&*db, &user)?;

    Ok(Json(manual.get_public()))
}

/// Submit a manual for review.
///
/// ## Method
///
/// ```text
/// POST /manuals/:id/submit
/// ```
pub fn submit_manual(
    state: actix_web::State<State>,
    id: Identity,
    path: Path<Uuid>,
) -> Result<Json<RevisionData>> {
    let db = state.db.get()?;
    let user = id.user(&*db)?;
    let mut manual = Manual::by_id(&*db, *path)?;

    let revision = manual.submit_for_review(&*db, &user)?;

    Ok(Json(revision.get_public()))
}

#[derive(Debug, Deserialize)]
pub struct Approval {
    revision: i32,
    effective_date: NaiveDate,
    comment: Option<String>,
}

/// Approve the revision under review.
///
/// ## Method
///
/// ```text
/// POST /manuals/:id/approve
/// ```
pub fn approve_manual(
    state: actix_web::State<State>,
    id: Identity,
    path: Path<Uuid>,
    data: Json<Approval>,
) -> Result<Json<RevisionData>> {
    let db = state.db.get()?;
    let user = id.user(&*db)?;
    let mut manual = Manual::by_id(&*db, *path)?;

    let revision = manual.approve(
        &*db,
        data.revision,
        &user,
        data.effective_date,
        data.comment.as_ref().map(String::as_str),
    )?;

    Ok(Json(revision.get_public()))
}

#[derive(Debug, Deserialize)]
pub struct Rejection {
    revision: i32,
    reason: String,
}

/// Reject the revision under review.
///
/// ## Method
///
/// ```text
/// POST /manuals/:id/reject
/// ```
pub fn reject_manual(
    state: actix_web::State<State>,
    id: Identity,
    path: Path<Uuid>,
    data: Json<Rejection>,
) -> Result<Json<RevisionData>> {
    let db = state.db.get()?;
    let user = id.user(&*db)?;
    let mut manual = Manual::by_id(&*db, *path)?;

    let revision = manual.reject(&*db, data.revision, &user, &data.reason)?;

    Ok(Json(revision.get_public()))
}

#[derive(Debug, Serialize)]
pub struct NextRevision {
    manual: ManualData,
    revision_number: String,
}

/// Begin a new revision cycle on an approved manual.
///
/// ## Method
///
/// ```text
/// POST /manuals/:id/next-revision
/// ```
pub fn start_next_revision(
    state: actix_web::State<State>,
    id: Identity,
    path: Path<Uuid>,
) -> Result<Json<NextRevision>> {
    let db = state.db.get()?;
    let user = id.user(&*db)?;
    let mut manual = Manual::by_id(&*db, *path)?;

    let revision = manual.start_next_revision(&*db, &user)?;

    Ok(Json(NextRevision {
        manual: manual.get_public(),
        revision_number: revision.revision_number.clone(),
    }))
}

/// List all revisions of a manual, in creation order.
///
/// ## Method
///
/// ```text
/// GET /manuals/:id/revisions
/// ```
pub fn list_revisions(
    state: actix_web::State<State>,
    _id: Identity,
    path: Path<Uuid>,
) -> Result<Json<Vec<RevisionData>>> {
    let db = state.db.get()?;
    let manual = Manual::by_id(&*db, *path)?;
    let revisions = Revision::all_of(&*db, manual.id())?;

    Ok(Json(revisions.iter().map(Revision::get_public).collect()))
}

/// Get a single revision of a manual.
///
/// ## Method
///
/// ```text
/// GET /manuals/:id/revisions/:revision
/// ```
pub fn get_revision(
    state: actix_web::State<State>,
    _id: Identity,
    path: Path<(Uuid, i32)>,
) -> Result<Json<RevisionData>> {
    let db = state.db.get()?;
    let (manual, revision) = path.into_inner();
    let revision = Revision::by_id(&*db, manual, revision)?;

    Ok(Json(revision.get_public()))
}

/// Get the frozen snapshot embedded in a revision, exactly as stored.
///
/// ## Method
///
/// ```text
/// GET /manuals/:id/revisions/:revision/snapshot
/// ```
pub fn get_snapshot(
    state: actix_web::State<State>,
    _id: Identity,
    path: Path<(Uuid, i32)>,
) -> Result<Json<Value>> {
    let db = state.db.get()?;
    let (manual, revision) = path.into_inner();
    let revision = Revision::by_id(&*db, manual, revision)?;

    Ok(Json(revision.snapshot.clone()))
}

/// List all chapters of a manual, in coordinate order.
///
/// ## Method
///
/// ```text
/// GET /manuals/:id/chapters
/// ```
pub fn list_chapters(
    state: actix_web::State<State>,
    _id: Identity,
    path: Path<Uuid>,
) -> Result<Json<Vec<ChapterData>>> {
    let db = state.db.get()?;
    let manual = Manual::by_id(&*db, *path)?;
    let chapters = Chapter::all_of(&*db, manual.id())?;

    Ok(Json(chapters.iter().map(Chapter::get_public).collect()))
}

#[derive(Debug, Deserialize)]
pub struct NewChapter {
    parent: Option<i32>,
    title: String,
    #[serde(default)]
    content: String,
}

/// Create a new chapter.
///
/// ## Method
///
/// ```text
/// POST /manuals/:id/chapters
/// ```
pub fn create_chapter(
    state: actix_web::State<State>,
    id: Identity,
    path: Path<Uuid>,
    data: Json<NewChapter>,
) -> Result<Json<ChapterData>> {
    let db = state.db.get()?;
    let user = id.user(&*db)?;
    let manual = Manual::by_id(&*db, *path)?;

    ensure_can_edit(&user, &manual)?;

    let chapter = Chapter::create(
        &*db, &user, manual.id(), data.parent, &data.title, &data.content)?;

    Ok(Json(chapter.get_public()))
}

/// Get a chapter by ID.
///
/// ## Method
///
/// ```text
/// GET /manuals/:id/chapters/:chapter
/// ```
pub fn get_chapter(
    state: actix_web::State<State>,
    _id: Identity,
    path: Path<(Uuid, i32)>,
) -> Result<Json<ChapterData>> {
    let db = state.db.get()?;
    let (manual, chapter) = path.into_inner();
    let chapter = Chapter::by_id(&*db, manual, chapter)?;

    Ok(Json(chapter.get_public()))
}

#[derive(Debug, Deserialize)]
pub struct ChapterChange {
    title: Option<String>,
    content: Option<String>,
}

/// Update a chapter.
///
/// ## Method
///
/// ```text
/// PUT /manuals/:id/chapters/:chapter
/// ```
pub fn update_chapter(
    state: actix_web::State<State>,
    id: Identity,
    path: Path<(Uuid, i32)>,
    data: Json<ChapterChange>,
) -> Result<Json<ChapterData>> {
    let db = state.db.get()?;
    let user = id.user(&*db)?;
    let (manual_id, chapter) = path.into_inner();
    let manual = Manual::by_id(&*db, manual_id)?;

    ensure_can_edit(&user, &manual)?;

    let mut chapter = Chapter::by_id(&*db, manual_id, chapter)?;
    let revision = active_revision(&*db, manual_id)?;

    if let Some(ref title) = data.title {
        chapter.set_title(&*db, &user, revision, title)?;
    }
    if let Some(ref content) = data.content {
        chapter.set_content(&*db, &user, revision, content)?;
    }

    Ok(Json(chapter.get_public()))
}

/// Delete a chapter.
///
/// ## Method
///
/// ```text
/// DELETE /manuals/:id/chapters/:chapter
/// ```
pub fn delete_chapter(
    state: actix_web::State<State>,
    id: Identity,
    path: Path<(Uuid, i32)>,
) -> Result<Json<()>> {
    let db = state.db.get()?;
    let user = id.user(&*db)?;
    let (manual_id, chapter) = path.into_inner();
    let manual = Manual::by_id(&*db, manual_id)?;

    ensure_can_edit(&user, &manual)?;

    Chapter::by_id(&*db, manual_id, chapter)?.delete(&*db, &user)?;

    Ok(Json(()))
}

/// Authorization guard for chapter edits: the manual's owner, or anyone
/// holding [`PermissionBits::EDIT_MANUAL`], on a manual that has not been
/// archived.
fn ensure_can_edit(user: &User, manual: &Manual) -> Result<()> {
    if manual.is_archived {
        return Err(EditManualError::Archived.into());
    }

    if user.id != manual.owner && !user.is_super {
        user.permissions().require(PermissionBits::EDIT_MANUAL)
            .map_err(EditManualError::Permissions)?;
    }

    Ok(())
}

/// ID of the revision chapter edits should be attributed to: the latest
/// revision, as long as it is still mutable.
fn active_revision(db: &crate::db::Connection, manual: Uuid)
-> Result<Option<i32>> {
    Ok(Revision::latest_of(db, manual)?
        .filter(|revision| revision.status.can_submit())
        .map(|revision| revision.id))
}
