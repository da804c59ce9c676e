use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub checks: BTreeMap<String, bool>,
}

#[async_trait::async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn check(&self) -> ReadinessReport;
}

pub struct PgRedisReadiness {
    pub pool: PgPool,
    pub redis_client: redis::Client,
}

#[async_trait::async_trait]
impl ReadinessCheck for PgRedisReadiness {
    async fn check(&self) -> ReadinessReport {
        let db_ok = sqlx::query("SELECT 1").execute(&self.pool).await.is_ok();

        let redis_ok = async {
            if let Ok(mut conn) = self.redis_client.get_multiplexed_async_connection().await {
                let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
                return pong.is_ok();
            }
            false
        }
        .await;

        let checks = BTreeMap::from([("db".to_string(), db_ok), ("redis".to_string(), redis_ok)]);
        ReadinessReport {
            ready: db_ok && redis_ok,
            checks,
        }
    }
}

pub struct AlwaysReady;

#[async_trait::async_trait]
impl ReadinessCheck for AlwaysReady {
    async fn check(&self) -> ReadinessReport {
        ReadinessReport {
            ready: true,
            checks: BTreeMap::from([("memory".to_string(), true)]),
        }
    }
}

pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.readiness.check().await;
    let status = if report.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"alive": true}))).into_response()
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
}
