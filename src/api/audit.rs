use actix_web::{App, Json, Query, http::Method};
use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::{audit, db::models as db};
use super::{Error, RouterExt, State, util::Identity};

/// Configure routes.
pub fn routes(app: App<State>) -> App<State> {
    app
        .api_route("/auditlog", Method::GET, list_audit_log)
}

type Result<T, E=Error> = std::result::Result<T, E>;

#[derive(Debug, Deserialize)]
pub struct AuditLogParams {
    actor: Option<i32>,
    context: Option<String>,
    context_id: Option<String>,
    action: Option<String>,
    since: Option<NaiveDateTime>,
    until: Option<NaiveDateTime>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    audit::MAX_PAGE_SIZE
}

/// Query the audit log, newest entries first.
///
/// ## Method
///
/// ```text
/// GET /auditlog
/// ```
pub fn list_audit_log(
    state: actix_web::State<State>,
    _id: Identity,
    params: Query<AuditLogParams>,
) -> Result<Json<Vec<db::AuditLogEntry>>> {
    let db = state.db.get()?;

    let entries = audit::search(
        &*db,
        &audit::Filter {
            actor: params.actor,
            context: params.context.as_ref().map(String::as_str),
            context_id: params.context_id.as_ref().map(String::as_str),
            action: params.action.as_ref().map(String::as_str),
            since: params.since,
            until: params.until,
        },
        params.limit,
        params.offset,
    )?;

    Ok(Json(entries))
}
