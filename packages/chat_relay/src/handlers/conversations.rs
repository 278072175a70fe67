use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::ChatError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    /// Caller-chosen key, stored as the conversation's `externalKey`
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameConversationRequest {
    pub title: String,
}

pub async fn list_conversations(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.list_conversations().await)
}

pub async fn create_conversation(
    State(state): State<AppState>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ChatError> {
    let conversation = state
        .orchestrator
        .create_conversation(&req.session_id)
        .await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ChatError> {
    Ok(Json(state.store.get_conversation(&id).await?))
}

pub async fn rename_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RenameConversationRequest>,
) -> Result<impl IntoResponse, ChatError> {
    Ok(Json(state.store.rename_conversation(&id, &req.title).await?))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    state.orchestrator.delete_conversation(&id).await;
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedExecutor, test_app_state};
    use axum::{
        Router,
        body::Body,
        http::Request,
        routing::get,
    };
    use tower::ServiceExt;

    fn test_router() -> (Router, AppState) {
        let state = test_app_state(ScriptedExecutor::replying("ok"));
        let router = Router::new()
            .route("/chats", get(list_conversations).post(create_conversation))
            .route(
                "/chats/{id}",
                get(get_conversation)
                    .patch(rename_conversation)
                    .delete(delete_conversation),
            )
            .with_state(state.clone());
        (router, state)
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_empty() {
        let (app, _state) = test_router();
        let resp = app
            .oneshot(Request::builder().uri("/chats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert!(json.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (app, _state) = test_router();

        let resp = app
            .clone()
            .oneshot(json_request("POST", "/chats", r#"{"sessionId":"s1"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created = json_body(resp).await;
        assert_eq!(created["externalKey"], "s1");
        assert_eq!(created["title"], "Chat");
        assert!(created["createdAt"].is_i64());
        assert!(created["lastActivity"].is_i64());
        let id = created["id"].as_str().unwrap().to_string();

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/chats/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["id"], id.as_str());

        let resp = app
            .oneshot(Request::builder().uri("/chats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(resp).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_blank_key_rejected() {
        let (app, _state) = test_router();
        let resp = app
            .oneshot(json_request("POST", "/chats", r#"{"sessionId":"  "}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "invalid_input");
    }

    #[tokio::test]
    async fn test_get_unknown() {
        let (app, _state) = test_router();
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/chats/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rename() {
        let (app, state) = test_router();
        let conversation = state.store.create_conversation("s1").await.unwrap();
        let uri = format!("/chats/{}", conversation.id);

        let resp = app
            .clone()
            .oneshot(json_request("PATCH", &uri, r#"{"title":"Release notes"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["title"], "Release notes");

        let resp = app
            .clone()
            .oneshot(json_request("PATCH", &uri, r#"{"title":""}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .oneshot(json_request("PATCH", "/chats/nope", r#"{"title":"x"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (app, state) = test_router();
        let conversation = state.store.create_conversation("s1").await.unwrap();
        let uri = format!("/chats/{}", conversation.id);

        for _ in 0..2 {
            let resp = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("DELETE")
                        .uri(&uri)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        }
        assert!(state.store.list_conversations().await.is_empty());
    }
}
