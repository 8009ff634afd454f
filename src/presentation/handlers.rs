// HTTP request handlers
use crate::application::error::MonitorError;
use crate::application::monitoring_service::StatusView;
use crate::domain::alert::AlertNotification;
use crate::domain::setpoint::{SetpointRange, Setpoints};
use crate::domain::telemetry::{ChartData, TableRow};
use crate::presentation::app_state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use chrono::Utc;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// Error body returned for every failed request
pub struct ApiError(MonitorError);

impl From<MonitorError> for ApiError {
    fn from(err: MonitorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            MonitorError::Connection(_) | MonitorError::HealthCheck(_) => StatusCode::BAD_GATEWAY,
            MonitorError::Query(_) => StatusCode::BAD_GATEWAY,
            MonitorError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MonitorError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MonitorError::NotMonitoring => StatusCode::CONFLICT,
            MonitorError::NoData => StatusCode::NOT_FOUND,
        };
        let body = serde_json::json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SetpointsRequest {
    pub temperature: SetpointRange,
    pub humidity: SetpointRange,
}

#[derive(Debug, Serialize)]
pub struct SetpointsResponse {
    pub setpoints: Setpoints,
    pub alert: Option<AlertNotification>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub inserted: usize,
    pub replaced: usize,
    pub alert: Option<AlertNotification>,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusView> {
    Json(state.monitoring_service.status().await)
}

pub async fn start_monitoring(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusView>, ApiError> {
    state.monitoring_service.start().await?;
    Ok(Json(state.monitoring_service.status().await))
}

pub async fn stop_monitoring(State(state): State<Arc<AppState>>) -> Json<StatusView> {
    state.monitoring_service.stop().await;
    Json(state.monitoring_service.status().await)
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let outcome = state.monitoring_service.refresh().await?;
    Ok(Json(RefreshResponse {
        inserted: outcome.merge.inserted,
        replaced: outcome.merge.replaced,
        alert: outcome.alert,
    }))
}

pub async fn get_setpoints(State(state): State<Arc<AppState>>) -> Json<Setpoints> {
    Json(state.monitoring_service.setpoints().await)
}

pub async fn update_setpoints(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetpointsRequest>,
) -> Result<Json<SetpointsResponse>, ApiError> {
    let alert = state
        .monitoring_service
        .update_setpoints(
            request.temperature.min,
            request.temperature.max,
            request.humidity.min,
            request.humidity.max,
        )
        .await?;

    Ok(Json(SetpointsResponse {
        setpoints: state.monitoring_service.setpoints().await,
        alert,
    }))
}

pub async fn charts(State(state): State<Arc<AppState>>) -> Json<Vec<ChartData>> {
    Json(state.monitoring_service.charts().await)
}

pub async fn table(State(state): State<Arc<AppState>>) -> Json<Vec<TableRow>> {
    Json(state.monitoring_service.table().await)
}

pub async fn alerts(State(state): State<Arc<AppState>>) -> Json<Vec<AlertNotification>> {
    Json(state.monitoring_service.alert_history().await)
}

/// Live alert notifications as server-sent events
pub async fn stream_alerts(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.monitoring_service.subscribe_alerts();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(alert) => match Event::default().event("alert").json_data(&alert) {
                    Ok(event) => {
                        yield Ok::<_, Infallible>(event);
                    }
                    Err(e) => tracing::warn!("Failed to encode alert event: {}", e),
                },
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Alert stream subscriber lagged, {} alerts missed", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn export(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let file = state
        .monitoring_service
        .export(state.exporter.as_ref(), Utc::now())
        .await?;

    let disposition = format!("attachment; filename=\"{}\"", file.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample::Field;
    use crate::domain::setpoint::ValidationError;

    #[test]
    fn test_error_status_codes() {
        let validation = ApiError(MonitorError::Validation(ValidationError::InvertedRange {
            field: Field::Temperature,
            min: 10.0,
            max: 5.0,
        }));
        assert_eq!(validation.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

        let idle = ApiError(MonitorError::NotMonitoring);
        assert_eq!(idle.into_response().status(), StatusCode::CONFLICT);

        let unhealthy = ApiError(MonitorError::HealthCheck("fail".to_string()));
        assert_eq!(unhealthy.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_setpoints_request_shape() {
        let request: SetpointsRequest = serde_json::from_str(
            r#"{"temperature": {"min": 24.0, "max": 30.0}, "humidity": {"min": 50, "max": 70}}"#,
        )
        .unwrap();
        assert_eq!(request.temperature.max, 30.0);
        assert_eq!(request.humidity.min, 50.0);
    }
}
