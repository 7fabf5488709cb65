use axum::{
    Json,
    extract::{Query, State},
};
use tower_sessions::Session;

use crate::{
    AppState,
    api::models::{pagination::Pagination, users::UserResponse},
    db::handlers::users::UserFilter,
    errors::Error,
    identity,
};

/// List registered users, oldest first
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    params(Pagination),
    responses(
        (status = 200, description = "Users", body = [UserResponse]),
        (status = 500, description = "Credential store failure"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    mut session: Session,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<UserResponse>>, Error> {
    let filter = UserFilter::new(pagination.skip(), pagination.limit());
    let users = identity::list_users(&state.request_context(&mut session), &filter).await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}
