//! Append-only ledger of every mutation to tracked entities.
//!
//! This module only knows how to append and query entries. There is no update
//! or delete operation here, and the storage layer itself refuses UPDATE and
//! DELETE statements against the log (see the `*_append_only` triggers in
//! migrations), so not even a privileged bug can rewrite history.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::db::{
    Connection,
    models as db,
    schema::audit_log,
};

/// Entity responsible for an action.
#[derive(Clone, Copy, Debug)]
pub enum Actor {
    /// System. This actor is used for actions carried automatically by the
    /// system, and actions invoked from the CLI.
    System,
    /// A user.
    User(i32),
}

impl Actor {
    pub(crate) fn as_db(&self) -> Option<i32> {
        match *self {
            Actor::System => None,
            Actor::User(id) => Some(id),
        }
    }
}

impl From<i32> for Actor {
    fn from(id: i32) -> Self {
        Actor::User(id)
    }
}

impl<'a> From<&'a db::User> for Actor {
    fn from(user: &'a db::User) -> Self {
        Actor::User(user.id)
    }
}

/// Identifier of the entity an action was performed on.
pub enum ContextId {
    Integer(i32),
    Uuid(Uuid),
    /// Composite keys, rendered by the caller.
    Text(String),
}

impl ContextId {
    fn into_db(self) -> String {
        match self {
            ContextId::Integer(id) => id.to_string(),
            ContextId::Uuid(id) => id.to_string(),
            ContextId::Text(id) => id,
        }
    }
}

impl From<i32> for ContextId {
    fn from(id: i32) -> Self {
        ContextId::Integer(id)
    }
}

impl From<Uuid> for ContextId {
    fn from(id: Uuid) -> Self {
        ContextId::Uuid(id)
    }
}

impl From<String> for ContextId {
    fn from(id: String) -> Self {
        ContextId::Text(id)
    }
}

/// Append an entry to the audit log, returning its ID.
///
/// This function takes an explicit database connection so the entry becomes
/// visible if and only if the enclosing transaction commits. Callers must
/// propagate the error: a business state change without its audit trail is a
/// correctness violation, not a degraded mode.
pub fn log_db<A, I, D>(
    db: &Connection,
    actor: A,
    context: &str,
    context_id: I,
    action: &str,
    data: D,
) -> QueryResult<i32>
where
    Actor: From<A>,
    ContextId: From<I>,
    D: Serialize,
{
    let actor = Actor::from(actor).as_db();
    let context_id = ContextId::from(context_id).into_db();

    let data = serde_json::to_value(&data).expect("invalid audit log data");

    diesel::insert_into(audit_log::table)
        .values(db::NewAuditLogEntry {
            actor,
            action,
            context,
            context_id: &context_id,
            data,
        })
        .returning(audit_log::id)
        .get_result(db)
}

/// Search criteria for [`search()`]. Empty fields do not constrain results.
#[derive(Clone, Copy, Debug, Default)]
pub struct Filter<'a> {
    pub actor: Option<i32>,
    pub context: Option<&'a str>,
    pub context_id: Option<&'a str>,
    pub action: Option<&'a str>,
    pub since: Option<NaiveDateTime>,
    pub until: Option<NaiveDateTime>,
}

/// Hard cap on the number of entries returned from a single query.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Query the audit log, newest entries first.
pub fn search(
    db: &Connection,
    filter: &Filter,
    limit: i64,
    offset: i64,
) -> QueryResult<Vec<db::AuditLogEntry>> {
    let mut query = audit_log::table.into_boxed();

    if let Some(actor) = filter.actor {
        query = query.filter(audit_log::actor.eq(actor));
    }
    if let Some(context) = filter.context {
        query = query.filter(audit_log::context.eq(context));
    }
    if let Some(context_id) = filter.context_id {
        query = query.filter(audit_log::context_id.eq(context_id));
    }
    if let Some(action) = filter.action {
        query = query.filter(audit_log::action.eq(action));
    }
    if let Some(since) = filter.since {
        query = query.filter(audit_log::created_at.ge(since));
    }
    if let Some(until) = filter.until {
        query = query.filter(audit_log::created_at.lt(until));
    }

    query
        .order((audit_log::created_at.desc(), audit_log::id.desc()))
        .limit(limit.max(1).min(MAX_PAGE_SIZE))
        .offset(offset.max(0))
        .get_results(db)
}
