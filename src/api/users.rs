use actix_web::{App, Json, Path};

use crate::models::user::{PublicData as UserData, User};
use super::{Error, RouteExt, State, util::Identity};

/// Configure routes.
pub fn routes(app: App<State>) -> App<State> {
    app
        .resource("/users", |r| {
            r.get().api_with(list_users);
        })
        .resource("/users/{id}", |r| {
            r.get().api_with(get_user);
        })
}

type Result<T, E=Error> = std::result::Result<T, E>;

/// List all users.
///
/// ## Method
///
/// ```text
/// GET /users
/// ```
pub fn list_users(
    state: actix_web::State<State>,
    _id: Identity,
) -> Result<Json<Vec<UserData>>> {
    let db = state.db.get()?;
    let users = User::all(&*db)?;

    Ok(Json(users.iter().map(User::get_public).collect()))
}

/// Get a user by ID.
///
/// ## Method
///
/// ```text
/// GET /users/:id
/// ```
pub fn get_user(
    state: actix_web::State<State>,
    _id: Identity,
    path: Path<i32>,
) -> Result<Json<UserData>> {
    let db = state.db.get()?;
    let user = User::by_id(&*db, *path)?;

    Ok(Json(user.get_public()))
}
