use crate::authorization::AuthorizationSelector;
use crate::migration::{BatchMigrationJob, MigrationError};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use shared::config::Listener;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct AppState {
    pub authorization: AuthorizationSelector,
    pub migration: Arc<BatchMigrationJob>,
    pub max_batch_size: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/internal/kessel/migrate-assets", post(migrate_assets))
        .with_state(state)
}

pub async fn serve(listener: &Listener, state: AppState) -> Result<(), ApiError> {
    let app = router(state);

    let listener = TcpListener::bind(listener.addr()).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error_message: String,
}

impl ApiErrorResponse {
    fn respond(status: StatusCode, message: String) -> Response {
        (
            status,
            Json(ApiErrorResponse {
                error_message: message,
            }),
        )
            .into_response()
    }
}

#[derive(Deserialize, Debug, Default)]
struct MigrateParams {
    org_id: Option<String>,
}

async fn health() -> &'static str {
    "ok"
}

async fn migrate_assets(State(state): State<AppState>, body: Bytes) -> Response {
    let params = if body.iter().all(u8::is_ascii_whitespace) {
        MigrateParams::default()
    } else {
        match serde_json::from_slice::<MigrateParams>(&body) {
            Ok(params) => params,
            Err(e) => {
                return ApiErrorResponse::respond(
                    StatusCode::BAD_REQUEST,
                    format!("invalid request body: {e}"),
                );
            }
        }
    };

    match state
        .migration
        .migrate(state.max_batch_size, params.org_id.as_deref())
        .await
    {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

impl IntoResponse for MigrationError {
    fn into_response(self) -> Response {
        let status = match self {
            MigrationError::InvalidBatchSize => StatusCode::BAD_REQUEST,
            MigrationError::Store(_) | MigrationError::CreateTuples { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        ApiErrorResponse::respond(status, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::{Authorization, RbacAuthorization};
    use axum::body::Body;
    use axum::http::Request;
    use kessel::testutils::{FakeRelationsTransport, FakeWorkspaceResolver};
    use routing::RoutingStore;
    use routing::store::MemoryRoutingStore;
    use routing::types::Endpoint;
    use shared::Metrics;
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn setup(
        relations: FakeRelationsTransport,
        max_batch_size: usize,
    ) -> (Router, Arc<FakeRelationsTransport>) {
        let store = Arc::new(MemoryRoutingStore::new());
        let mut tx = store.begin().await.unwrap();
        for org in ["org-1", "org-2"] {
            for i in 0..3 {
                tx.insert_endpoint(&Endpoint {
                    id: Uuid::new_v4(),
                    org_id: org.into(),
                    endpoint_type: "webhook".into(),
                    name: format!("{org}-{i}"),
                    properties: serde_json::Value::Null,
                })
                .await
                .unwrap();
            }
        }
        tx.commit().await.unwrap();

        let workspaces = FakeWorkspaceResolver::new()
            .with_workspace("org-1", Uuid::new_v4())
            .with_workspace("org-2", Uuid::new_v4());
        let relations = Arc::new(relations);
        let rbac: Arc<dyn Authorization> = Arc::new(RbacAuthorization::new(store.clone()));
        let authorization = AuthorizationSelector::new(
            rbac.clone(),
            rbac,
            false,
            Vec::<String>::new(),
        );
        let job = BatchMigrationJob::new(
            store,
            Arc::new(workspaces),
            relations.clone(),
            Metrics::noop(),
            100,
        );

        let app = router(AppState {
            authorization,
            migration: Arc::new(job),
            max_batch_size,
        });
        (app, relations)
    }

    fn migrate_request(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/internal/kessel/migrate-assets")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn error_message(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        json["error_message"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = setup(FakeRelationsTransport::new(), 10).await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_migrate_without_body() {
        let (app, relations) = setup(FakeRelationsTransport::new(), 4).await;
        let response = app.oneshot(migrate_request("")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let sizes: Vec<usize> = relations
            .create_requests()
            .iter()
            .map(|r| r.tuples.len())
            .collect();
        assert_eq!(sizes, vec![4, 2]);
    }

    #[tokio::test]
    async fn test_migrate_single_org() {
        let (app, relations) = setup(FakeRelationsTransport::new(), 10).await;
        let response = app
            .oneshot(migrate_request(r#"{"org_id": "org-2"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let requests = relations.create_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tuples.len(), 3);
    }

    #[tokio::test]
    async fn test_migrate_rejects_malformed_body() {
        let (app, relations) = setup(FakeRelationsTransport::new(), 10).await;
        let response = app.oneshot(migrate_request("{not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(error_message(response).await.starts_with("invalid request body"));
        assert!(relations.create_requests().is_empty());
    }

    #[tokio::test]
    async fn test_migrate_failure_is_server_error() {
        let relations = FakeRelationsTransport::new().failing_create_tuples_from(0);
        let (app, _) = setup(relations, 10).await;
        let response = app.oneshot(migrate_request("")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            error_message(response)
                .await
                .contains("bulk tuple creation failed")
        );
    }
}
