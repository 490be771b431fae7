use diesel::{
    Connection as _Connection,
    prelude::*,
    result::{DatabaseErrorKind, Error as DbError},
};
use failure::Fail;
use lettre_email::Mailbox;
use serde::Serialize;

use crate::{
    ApiError,
    audit,
    db::{
        Connection,
        models as db,
        schema::users,
    },
    permissions::PermissionBits,
};

/// A known identity. Authentication happens outside this system; users exist
/// here to own manuals, make review decisions, and receive notifications.
#[derive(Debug)]
pub struct User {
    data: db::User,
}

/// A subset of user's data that can safely be publicly exposed.
#[derive(Debug, Serialize)]
pub struct PublicData {
    pub id: i32,
    pub name: String,
    pub is_super: bool,
    pub permissions: i32,
}

impl User {
    /// Construct `User` from its database counterpart.
    pub(crate) fn from_db(data: db::User) -> User {
        User { data }
    }

    /// Find a user by ID.
    pub fn by_id(db: &Connection, id: i32) -> Result<User, FindUserError> {
        users::table
            .filter(users::id.eq(id))
            .get_result::<db::User>(db)
            .optional()?
            .ok_or(FindUserError::NotFound)
            .map(User::from_db)
    }

    /// Find a user by email address.
    pub fn by_email(db: &Connection, email: &str) -> Result<User, FindUserError> {
        users::table
            .filter(users::email.eq(email))
            .get_result::<db::User>(db)
            .optional()?
            .ok_or(FindUserError::NotFound)
            .map(User::from_db)
    }

    /// Get all users.
    pub fn all(db: &Connection) -> Result<Vec<User>, DbError> {
        users::table
            .order(users::id.asc())
            .get_results::<db::User>(db)
            .map(|v| v.into_iter().map(User::from_db).collect())
    }

    /// Get all users who can decide reviews.
    pub fn reviewers(db: &Connection) -> Result<Vec<User>, DbError> {
        Ok(User::all(db)?
            .into_iter()
            .filter(|user| user.permissions()
                .contains(PermissionBits::REVIEW_DECISION))
            .collect())
    }

    /// Create a new user.
    pub fn create<A>(
        db: &Connection,
        actor: A,
        email: &str,
        name: &str,
        is_super: bool,
        permissions: PermissionBits,
    ) -> Result<User, CreateUserError>
    where
        audit::Actor: From<A>,
    {
        let actor = audit::Actor::from(actor);

        db.transaction(|| {
            let data = diesel::insert_into(users::table)
                .values(&db::NewUser {
                    email,
                    name,
                    is_super,
                    permissions: permissions.bits(),
                })
                .get_result::<db::User>(db)?;

            audit::log_db(db, actor, "users", data.id, "create", LogNewUser {
                email,
                name,
                is_super,
            })?;

            Ok(User::from_db(data))
        })
    }

    /// Get the full set of permissions this user has.
    pub fn permissions(&self) -> PermissionBits {
        if self.data.is_super {
            PermissionBits::elevated()
        } else {
            PermissionBits::from_bits_truncate(self.data.permissions)
        }
    }

    /// Change permissions granted to this user.
    pub fn set_permissions<A>(
        &mut self,
        db: &Connection,
        actor: A,
        permissions: PermissionBits,
    ) -> Result<(), DbError>
    where
        audit::Actor: From<A>,
    {
        let actor = audit::Actor::from(actor);

        db.transaction(|| {
            let data = diesel::update(&self.data)
                .set(users::permissions.eq(permissions.bits()))
                .get_result::<db::User>(db)?;

            audit::log_db(
                db, actor, "users", data.id, "set-permissions",
                permissions.bits())?;

            self.data = data;

            Ok(())
        })
    }

    /// Address to send notification emails to.
    pub fn mailbox(&self) -> Mailbox {
        Mailbox::new_with_name(self.data.name.clone(), self.data.email.clone())
    }

    /// Get the public portion of this user's data.
    pub fn get_public(&self) -> PublicData {
        PublicData {
            id: self.data.id,
            name: self.data.name.clone(),
            is_super: self.data.is_super,
            permissions: self.data.permissions,
        }
    }
}

impl std::ops::Deref for User {
    type Target = db::User;

    fn deref(&self) -> &db::User {
        &self.data
    }
}

impl<'a> From<&'a User> for audit::Actor {
    fn from(user: &'a User) -> audit::Actor {
        audit::Actor::User(user.id)
    }
}

#[derive(ApiError, Debug, Fail)]
pub enum FindUserError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Internal(#[cause] DbError),
    /// No user found matching given criteria.
    #[fail(display = "No such user")]
    #[api(code = "user:not-found", status = "NOT_FOUND")]
    NotFound,
}

impl_from! { for FindUserError ;
    DbError => |e| FindUserError::Internal(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum CreateUserError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// A user with this email address already exists.
    #[fail(display = "A user with this email address already exists")]
    #[api(code = "user:new:exists", status = "BAD_REQUEST")]
    Duplicate,
}

impl_from! { for CreateUserError ;
    DbError => |e| match e {
        DbError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) =>
            CreateUserError::Duplicate,
        _ => CreateUserError::Database(e),
    },
}

#[derive(Serialize)]
struct LogNewUser<'a> {
    email: &'a str,
    name: &'a str,
    is_super: bool,
}
