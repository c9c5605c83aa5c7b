//! Solana JSON-RPC client
//!
//! Covers the handful of methods the health poller, watch loop and status
//! command need. Every non-2xx status, `error` object or unexpected `result`
//! is reported as its own `RpcError` kind.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::api_client::build_http_client;
use crate::error::RpcError;

/// Bytes of an error response body kept in `RpcError::Status`
const ERROR_BODY_LIMIT: usize = 2 * 1024;

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// One entry of `getRecentPerformanceSamples`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSample {
    pub slot: u64,
    pub num_transactions: u64,
    pub num_slots: u64,
    pub sample_period_secs: u64,
}

/// Snapshot shown by `status`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RpcMetrics {
    pub slot: u64,
    pub tps: f64,
}

#[derive(Debug, Clone)]
pub struct RpcClient {
    http: Client,
    endpoint: String,
}

impl RpcClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_timeout(endpoint, DEFAULT_RPC_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: build_http_client(timeout),
            endpoint: endpoint.into().trim().to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue one JSON-RPC call and decode its `result`
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        if self.endpoint.is_empty() {
            return Err(RpcError::EmptyEndpoint);
        }

        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|source| RpcError::Transport {
                method: method.to_string(),
                source,
            })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|source| RpcError::Transport {
            method: method.to_string(),
            source,
        })?;

        if !status.is_success() {
            let body = &bytes[..bytes.len().min(ERROR_BODY_LIMIT)];
            return Err(RpcError::Status {
                method: method.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(body).trim().to_string(),
            });
        }

        let envelope: RpcEnvelope = serde_json::from_slice(&bytes).map_err(|e| RpcError::Decode {
            method: method.to_string(),
            message: e.to_string(),
        })?;
        if let Some(error) = envelope.error {
            return Err(RpcError::Rpc {
                method: method.to_string(),
                code: error.code,
                message: error.message,
            });
        }

        let result = envelope
            .result
            .filter(|value| !value.is_null())
            .ok_or_else(|| RpcError::UnexpectedResult {
                method: method.to_string(),
                detail: "missing result".to_string(),
            })?;
        serde_json::from_value(result.clone()).map_err(|e| RpcError::UnexpectedResult {
            method: method.to_string(),
            detail: format!("{result} ({e})"),
        })
    }

    /// `getHealth` must answer the literal string "ok"
    pub async fn get_health(&self) -> Result<(), RpcError> {
        let health: Value = self.call("getHealth", json!([])).await?;
        match health.as_str() {
            Some("ok") => Ok(()),
            _ => Err(RpcError::UnexpectedResult {
                method: "getHealth".to_string(),
                detail: health.to_string(),
            }),
        }
    }

    pub async fn get_slot(&self) -> Result<u64, RpcError> {
        self.call("getSlot", json!([])).await
    }

    pub async fn get_recent_performance_samples(
        &self,
        limit: usize,
    ) -> Result<Vec<PerformanceSample>, RpcError> {
        self.call("getRecentPerformanceSamples", json!([limit])).await
    }

    /// Health, slot and TPS from the latest performance sample
    pub async fn fetch_metrics(&self) -> Result<RpcMetrics, RpcError> {
        self.get_health().await?;
        let slot = self.get_slot().await?;
        let samples = self.get_recent_performance_samples(1).await?;
        let tps = tps_from_samples(&samples)?;
        Ok(RpcMetrics { slot, tps })
    }
}

/// Transactions per second over the newest sample window
pub fn tps_from_samples(samples: &[PerformanceSample]) -> Result<f64, RpcError> {
    let unexpected = |detail: &str| RpcError::UnexpectedResult {
        method: "getRecentPerformanceSamples".to_string(),
        detail: detail.to_string(),
    };
    let sample = samples.first().ok_or_else(|| unexpected("no samples"))?;
    if sample.sample_period_secs == 0 {
        return Err(unexpected("sample period is zero"));
    }
    Ok(sample.num_transactions as f64 / sample.sample_period_secs as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    /// Fake validator answering each method with a fixed body
    fn validator(health: Value) -> Router {
        Router::new().route(
            "/",
            post(move |Json(request): Json<Value>| {
                let health = health.clone();
                async move {
                    let result = match request["method"].as_str() {
                        Some("getHealth") => health,
                        Some("getSlot") => json!(4242),
                        Some("getRecentPerformanceSamples") => json!([{
                            "slot": 4240,
                            "numTransactions": 1200,
                            "numSlots": 150,
                            "samplePeriodSecs": 60
                        }]),
                        _ => Value::Null,
                    };
                    Json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
                }
            }),
        )
    }

    #[tokio::test]
    async fn test_fetch_metrics() {
        let base = serve(validator(json!("ok"))).await;
        let metrics = RpcClient::new(base).fetch_metrics().await.unwrap();
        assert_eq!(metrics.slot, 4242);
        assert!((metrics.tps - 20.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_unhealthy_string_is_unexpected_result() {
        let base = serve(validator(json!("behind"))).await;
        let err = RpcClient::new(base).get_health().await.unwrap_err();
        assert!(matches!(err, RpcError::UnexpectedResult { .. }));
    }

    #[tokio::test]
    async fn test_rpc_error_object_is_surfaced() {
        let router = Router::new().route(
            "/",
            post(|| async {
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": {"code": -32005, "message": "Node is behind by 42 slots"}
                }))
            }),
        );
        let base = serve(router).await;

        let err = RpcClient::new(base).get_slot().await.unwrap_err();
        assert!(matches!(err, RpcError::Rpc { code: -32005, .. }));
    }

    #[tokio::test]
    async fn test_http_error_status_is_surfaced() {
        let router = Router::new().route(
            "/",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let base = serve(router).await;

        let err = RpcClient::new(base).get_slot().await.unwrap_err();
        match err {
            RpcError::Status { status, body, .. } => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wrong_result_type_is_not_coerced() {
        let router = Router::new().route(
            "/",
            post(|| async { Json(json!({"jsonrpc": "2.0", "id": 1, "result": "soon"})) }),
        );
        let base = serve(router).await;

        let err = RpcClient::new(base).get_slot().await.unwrap_err();
        assert!(matches!(err, RpcError::UnexpectedResult { .. }));
    }

    #[tokio::test]
    async fn test_empty_endpoint() {
        let err = RpcClient::new("  ").get_slot().await.unwrap_err();
        assert!(matches!(err, RpcError::EmptyEndpoint));
    }

    #[test]
    fn test_tps_requires_a_nonzero_window() {
        assert!(tps_from_samples(&[]).is_err());

        let sample = PerformanceSample {
            slot: 1,
            num_transactions: 10,
            num_slots: 1,
            sample_period_secs: 0,
        };
        assert!(tps_from_samples(&[sample]).is_err());
    }
}
