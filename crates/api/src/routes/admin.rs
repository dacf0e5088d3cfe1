//! Admin API, reachable only with a bearer token

use axum::{
    extract::{Path, State},
    Json,
};
use storefront_shared::{with_deadline, UserId};

use super::api_auth::MessageResponse;
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
    websocket::WsPayload,
};

/// POST /api/admin/all-users/delete/:id
///
/// Deletes the user and tells every connected browser of theirs to log out.
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(admin): AuthUser,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let user_id = UserId(user_id);
    if user_id == admin.id {
        return Err(ApiError::BadRequest("cannot delete your own account".to_string()));
    }

    with_deadline(state.config.db_timeout, state.users.delete_user(user_id)).await?;
    tracing::info!(user_id = %user_id, deleted_by = %admin.id, "User deleted");

    if let Err(e) = state.hub.ingest(WsPayload::delete_user(user_id)) {
        tracing::warn!(user_id = %user_id, error = %e, "Logout notification not queued");
    }

    Ok(MessageResponse::ok("user deleted"))
}
