//! The HTTP surface
//!
//! A thin axum adapter over the scheduler, store, and status reporter. Every
//! response is wrapped in the `{success, data?, error?, details?}` envelope;
//! validation maps to 400, unknown resources to 404, everything else to 500.

use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use chrono::Utc;
use reach_common::Signal;
use reach_queue::TaskQueue;
use reach_store::{Campaign, CampaignId, Dispatch, DispatchStatus, Store};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use uuid::Uuid;

use crate::{
    config::ApiConfig,
    error::ApiError,
    scheduler::{CampaignReceipt, CampaignScheduler, CreateCampaignRequest},
    status::{StatusReport, StatusReporter},
};

/// Statuses reported by the scheduled-dispatches listing
const SCHEDULED_STATUSES: [DispatchStatus; 3] = [
    DispatchStatus::Pending,
    DispatchStatus::Scheduled,
    DispatchStatus::RateLimited,
];

/// Statuses reported by the sent-dispatches listing
const SENT_STATUSES: [DispatchStatus; 2] = [DispatchStatus::Sent, DispatchStatus::Failed];

/// Uniform response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl<T> ApiResponse<T> {
    /// Wrap a successful payload
    #[must_use]
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            details: None,
        }
    }

    /// Wrap an error message
    #[must_use]
    pub const fn failure(error: String, details: Option<serde_json::Value>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            details,
        }
    }
}

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub scheduler: Arc<CampaignScheduler>,
    pub store: Arc<dyn Store>,
    pub queue: Arc<TaskQueue>,
    pub reporter: Arc<StatusReporter>,
}

/// The API HTTP server
pub struct ApiServer {
    listener: TcpListener,
    router: Router,
}

impl ApiServer {
    /// Bind the listen address and assemble the router.
    ///
    /// # Errors
    /// Returns an error if binding fails.
    pub async fn new(config: ApiConfig, state: AppState) -> Result<Self, ApiError> {
        let listener = TcpListener::bind(&config.listen_address)
            .await
            .map_err(|e| ApiError::Bind {
                address: config.listen_address.clone(),
                source: e,
            })?;

        tracing::info!(address = %config.listen_address, "API server bound");

        let router = router(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.request_timeout_secs,
            )));

        Ok(Self { listener, router })
    }

    /// Run the server until a shutdown signal is received.
    ///
    /// # Errors
    /// Returns an error if the server loop fails.
    pub async fn serve(
        self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), ApiError> {
        tracing::info!("API server starting");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("API server received shutdown signal");
            })
            .await
            .map_err(|e| ApiError::Server(e.to_string()))?;

        tracing::info!("API server stopped");
        Ok(())
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/campaigns",
            get(list_campaigns).post(create_campaign),
        )
        .route("/api/campaigns/{id}/dispatches", get(campaign_dispatches))
        .route("/api/dispatches/scheduled", get(scheduled_dispatches))
        .route("/api/dispatches/sent", get(sent_dispatches))
        .route("/api/status", get(status))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_id: String,
}

impl UserQuery {
    fn parse(&self) -> Result<Uuid, ApiError> {
        Uuid::parse_str(self.user_id.trim())
            .map_err(|_| ApiError::bad_request("userId must be a valid UUID"))
    }
}

async fn create_campaign(
    State(state): State<AppState>,
    Json(request): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CampaignReceipt>>), ApiError> {
    let receipt = state.scheduler.create_campaign(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(receipt))))
}

async fn list_campaigns(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ApiResponse<Vec<Campaign>>>, ApiError> {
    let user_id = query.parse()?;
    let campaigns = state.store.campaigns_for_user(user_id).await?;
    Ok(Json(ApiResponse::ok(campaigns)))
}

async fn campaign_dispatches(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Dispatch>>>, ApiError> {
    let id = CampaignId::parse(id.trim())
        .map_err(|_| ApiError::bad_request("Campaign id must be a valid UUID"))?;

    // 404 when the campaign itself is unknown
    state.store.campaign(id).await?;

    let dispatches = state.store.dispatches_for_campaign(id).await?;
    Ok(Json(ApiResponse::ok(dispatches)))
}

async fn scheduled_dispatches(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ApiResponse<Vec<Dispatch>>>, ApiError> {
    let user_id = query.parse()?;
    let dispatches = state
        .store
        .dispatches_by_status(user_id, &SCHEDULED_STATUSES)
        .await?;
    Ok(Json(ApiResponse::ok(dispatches)))
}

async fn sent_dispatches(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ApiResponse<Vec<Dispatch>>>, ApiError> {
    let user_id = query.parse()?;
    let dispatches = state
        .store
        .dispatches_by_status(user_id, &SENT_STATUSES)
        .await?;
    Ok(Json(ApiResponse::ok(dispatches)))
}

async fn status(State(state): State<AppState>) -> Json<ApiResponse<StatusReport>> {
    Json(ApiResponse::ok(state.reporter.report().await))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now(),
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use axum::response::IntoResponse;
    use chrono::TimeDelta;
    use reach_queue::MemoryQueueStore;
    use reach_store::MemoryStore;

    use super::*;
    use crate::scheduler::SchedulerConfig;

    fn state() -> AppState {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let queue = Arc::new(TaskQueue::new(Arc::new(MemoryQueueStore::new())));
        let scheduler = Arc::new(CampaignScheduler::new(
            store.clone(),
            queue.clone(),
            SchedulerConfig::default(),
        ));
        let reporter = Arc::new(StatusReporter::new(store.clone(), queue.clone()));

        AppState {
            scheduler,
            store,
            queue,
            reporter,
        }
    }

    fn campaign_request(user_id: Uuid) -> CreateCampaignRequest {
        CreateCampaignRequest {
            user_id: user_id.to_string(),
            subject: "Launch".to_string(),
            body: "Hello there".to_string(),
            recipient_emails: vec!["a@x.io".to_string(), "b@x.io".to_string()],
            start_time: (Utc::now() + TimeDelta::seconds(60)).to_rfc3339(),
            delay_between_ms: Some(2000),
            hourly_limit: None,
        }
    }

    #[tokio::test]
    async fn create_campaign_returns_201_with_envelope() {
        let state = state();
        let user_id = Uuid::new_v4();

        let response = create_campaign(State(state.clone()), Json(campaign_request(user_id)))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["dispatchCount"], 2);
        assert_eq!(body["data"]["totalEmails"], 2);
        assert_eq!(body["data"]["failed"], 0);
        assert_eq!(body["data"]["campaign"]["status"], "IN_PROGRESS");
    }

    #[tokio::test]
    async fn validation_failure_maps_to_400() {
        let state = state();
        let mut request = campaign_request(Uuid::new_v4());
        request.start_time = (Utc::now() - TimeDelta::seconds(120)).to_rfc3339();

        let response = create_campaign(State(state), Json(request))
            .await
            .unwrap_err()
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Start time cannot be in the past");
        assert_eq!(body["details"]["field"], "startTime");
    }

    #[tokio::test]
    async fn listings_filter_by_user_and_status() {
        let state = state();
        let user_id = Uuid::new_v4();

        create_campaign(State(state.clone()), Json(campaign_request(user_id)))
            .await
            .unwrap();

        let campaigns = list_campaigns(
            State(state.clone()),
            Query(UserQuery {
                user_id: user_id.to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(campaigns.0.data.as_ref().unwrap().len(), 1);

        let scheduled = scheduled_dispatches(
            State(state.clone()),
            Query(UserQuery {
                user_id: user_id.to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(scheduled.0.data.as_ref().unwrap().len(), 2);

        let sent = sent_dispatches(
            State(state.clone()),
            Query(UserQuery {
                user_id: user_id.to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(sent.0.data.as_ref().unwrap().is_empty());

        // Unknown user sees nothing
        let none = list_campaigns(
            State(state),
            Query(UserQuery {
                user_id: Uuid::new_v4().to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(none.0.data.as_ref().unwrap().is_empty());
    }

    #[tokio::test]
    async fn campaign_dispatches_404_for_unknown_campaign() {
        let state = state();

        let err = campaign_dispatches(
            State(state.clone()),
            Path(CampaignId::generate().to_string()),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.into_response().status(),
            StatusCode::NOT_FOUND
        );

        let err = campaign_dispatches(State(state), Path("not-a-uuid".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn bad_user_id_maps_to_400() {
        let state = state();
        let err = list_campaigns(
            State(state),
            Query(UserQuery {
                user_id: "nope".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_and_health_respond() {
        let state = state();

        let report = status(State(state)).await;
        let data = report.0.data.unwrap();
        assert_eq!(data.database.status, "up");

        let health = health().await;
        assert_eq!(health.0["status"], "ok");
        assert!(health.0.get("timestamp").is_some());
    }
}
