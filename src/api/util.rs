use actix_web::{FromRequest, HttpRequest, error::ErrorUnauthorized};

use crate::models::user::{FindUserError, User};
use super::State;

/// Identity of the user making a request.
///
/// Authentication is not this system's concern: requests arrive through a
/// fronting proxy which verifies the caller and passes the resulting user ID
/// in the `X-User-Id` header. This extractor only resolves that header; the
/// authorization guard proper runs inside each operation.
#[derive(Clone, Copy, Debug)]
pub struct Identity {
    pub user: i32,
}

impl Identity {
    /// Load the full user record for this identity.
    pub fn user(&self, db: &crate::db::Connection)
    -> Result<User, FindUserError> {
        User::by_id(db, self.user)
    }
}

impl FromRequest<State> for Identity {
    type Config = ();
    type Result = Result<Identity, actix_web::Error>;

    fn from_request(req: &HttpRequest<State>, _: &()) -> Self::Result {
        req.headers()
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .map(|user| Identity { user })
            .ok_or_else(|| ErrorUnauthorized("missing or malformed X-User-Id"))
    }
}
