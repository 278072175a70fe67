use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::ChatError;

const DEFAULT_PAGE_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct SubmitMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagePageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Run one chat turn and return the assistant's persisted reply.
pub async fn submit_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SubmitMessageRequest>,
) -> Result<impl IntoResponse, ChatError> {
    let reply = state
        .orchestrator
        .submit_user_turn(&id, &req.content)
        .await?;
    Ok(Json(reply))
}

/// Messages in timestamp order. Unknown conversations yield an empty page.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(page): Query<MessagePageQuery>,
) -> impl IntoResponse {
    let limit = page.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let offset = page.offset.unwrap_or(0);
    Json(state.store.get_messages(&id, limit, offset).await)
}
