//! Access token verification
//!
//! Tokens are checked with a cascade of probes before they are stored. A
//! probe can accept the token, reject it outright, or be inconclusive, in
//! which case the next probe runs. Scoped tokens often fail the cheap
//! capability probe while still being valid, so only a definitive answer or
//! running out of probes ends the cascade.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ApiError, AuthError};
use crate::infrastructure::api_client::contains_any;
use crate::infrastructure::fly::{self, FlyApi};
use crate::infrastructure::RailwayApi;

/// Bodies of 404s produced by the router rather than an authenticated handler
pub const ROUTING_NOT_FOUND_MARKERS: &[&str] = &["404 page not found", "route not found", "no route"];

/// Bodies of 404s produced after the token was accepted
pub const AUTHENTICATED_NOT_FOUND_MARKERS: &[&str] = &["not found", "could not find", "not_found"];

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeVerdict {
    Accepted,
    Rejected(String),
    Inconclusive(String),
}

/// Classify the answer to a lookup of a resource that cannot exist
///
/// 2xx and an authenticated-style 404 accept the token, 401 rejects it, and
/// 403 or a routing 404 leave the decision to the next probe.
pub fn classify_capability_probe(status: u16, body: &str) -> ProbeVerdict {
    match status {
        200..=299 => ProbeVerdict::Accepted,
        401 => ProbeVerdict::Rejected(describe(status, body)),
        404 if is_authenticated_not_found(body) => ProbeVerdict::Accepted,
        _ => ProbeVerdict::Inconclusive(describe(status, body)),
    }
}

fn is_authenticated_not_found(body: &str) -> bool {
    if contains_any(body, ROUTING_NOT_FOUND_MARKERS) {
        return false;
    }
    let is_json_object = serde_json::from_str::<serde_json::Value>(body)
        .map(|value| value.is_object())
        .unwrap_or(false);
    is_json_object && contains_any(body, AUTHENTICATED_NOT_FOUND_MARKERS)
}

fn describe(status: u16, body: &str) -> String {
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    }
}

/// Turn an API failure into a verdict; transport failures stay errors
///
/// `final_probe` decides whether a GraphQL error envelope is a rejection
/// or should fall through to the next probe.
pub fn verdict_from_error(err: ApiError, final_probe: bool) -> Result<ProbeVerdict, ApiError> {
    match err {
        ApiError::Status { status: 401, body, .. } => Ok(ProbeVerdict::Rejected(describe(401, &body))),
        ApiError::Status { status, body, .. } => Ok(ProbeVerdict::Inconclusive(describe(status, &body))),
        ApiError::GraphQl { messages } if final_probe => Ok(ProbeVerdict::Rejected(messages.join("; "))),
        ApiError::GraphQl { messages } => Ok(ProbeVerdict::Inconclusive(messages.join("; "))),
        ApiError::Decode { message, .. } => Ok(ProbeVerdict::Inconclusive(message)),
        other => Err(other),
    }
}

/// One way of asking the platform whether a token is usable
#[async_trait]
pub trait TokenProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn probe(&self) -> Result<ProbeVerdict, ApiError>;
}

/// Run probes in order until one gives a definitive answer
pub async fn verify_with_cascade(
    provider: &'static str,
    probes: &[&dyn TokenProbe],
) -> Result<(), AuthError> {
    let mut last_reason = String::from("no verification probes configured");

    for probe in probes {
        let verdict = probe
            .probe()
            .await
            .map_err(|source| AuthError::Unverifiable { provider, source })?;
        match verdict {
            ProbeVerdict::Accepted => {
                debug!("{} token accepted by {} probe", provider, probe.name());
                return Ok(());
            }
            ProbeVerdict::Rejected(reason) => {
                return Err(AuthError::Rejected { provider, reason });
            }
            ProbeVerdict::Inconclusive(reason) => {
                debug!("{} probe inconclusive: {}", probe.name(), reason);
                last_reason = reason;
            }
        }
    }

    Err(AuthError::Rejected {
        provider,
        reason: last_reason,
    })
}

/// Fly: look up an app name nobody owns
pub struct FlyAppProbe<'a> {
    api: &'a FlyApi,
    app: String,
}

impl<'a> FlyAppProbe<'a> {
    pub fn new(api: &'a FlyApi) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            api,
            app: format!("{}-{}", fly::TOKEN_PROBE_PREFIX, &suffix[..8]),
        }
    }
}

#[async_trait]
impl TokenProbe for FlyAppProbe<'_> {
    fn name(&self) -> &str {
        "machines app lookup"
    }

    async fn probe(&self) -> Result<ProbeVerdict, ApiError> {
        let response = self.api.probe_app(&self.app).await?;
        Ok(classify_capability_probe(response.status, &response.body))
    }
}

/// Fly: identity query over GraphQL
pub struct FlyViewerProbe<'a> {
    api: &'a FlyApi,
}

impl<'a> FlyViewerProbe<'a> {
    pub fn new(api: &'a FlyApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl TokenProbe for FlyViewerProbe<'_> {
    fn name(&self) -> &str {
        "graphql viewer"
    }

    async fn probe(&self) -> Result<ProbeVerdict, ApiError> {
        match self.api.viewer_id().await {
            Ok(_) => Ok(ProbeVerdict::Accepted),
            Err(err) => verdict_from_error(err, true),
        }
    }
}

/// Railway: `me { id }`, unavailable to project tokens
pub struct RailwayMeProbe<'a> {
    api: &'a RailwayApi,
}

impl<'a> RailwayMeProbe<'a> {
    pub fn new(api: &'a RailwayApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl TokenProbe for RailwayMeProbe<'_> {
    fn name(&self) -> &str {
        "me"
    }

    async fn probe(&self) -> Result<ProbeVerdict, ApiError> {
        match self.api.me_id().await {
            Ok(_) => Ok(ProbeVerdict::Accepted),
            Err(err) => verdict_from_error(err, false),
        }
    }
}

/// Railway: project listing, which any valid token can run
pub struct RailwayProjectsProbe<'a> {
    api: &'a RailwayApi,
}

impl<'a> RailwayProjectsProbe<'a> {
    pub fn new(api: &'a RailwayApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl TokenProbe for RailwayProjectsProbe<'_> {
    fn name(&self) -> &str {
        "projects"
    }

    async fn probe(&self) -> Result<ProbeVerdict, ApiError> {
        match self.api.project_ids().await {
            Ok(_) => Ok(ProbeVerdict::Accepted),
            Err(err) => verdict_from_error(err, true),
        }
    }
}

pub async fn verify_fly_token(api: &FlyApi) -> Result<(), AuthError> {
    let app_probe = FlyAppProbe::new(api);
    let viewer_probe = FlyViewerProbe::new(api);
    verify_with_cascade("fly", &[&app_probe, &viewer_probe]).await
}

pub async fn verify_railway_token(api: &RailwayApi) -> Result<(), AuthError> {
    let me_probe = RailwayMeProbe::new(api);
    let projects_probe = RailwayProjectsProbe::new(api);
    verify_with_cascade("railway", &[&me_probe, &projects_probe]).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use secrecy::SecretString;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_classify_capability_probe() {
        assert_eq!(classify_capability_probe(200, "{}"), ProbeVerdict::Accepted);
        assert_eq!(
            classify_capability_probe(404, r#"{"error":"app not found"}"#),
            ProbeVerdict::Accepted
        );
        assert!(matches!(
            classify_capability_probe(401, "unauthorized"),
            ProbeVerdict::Rejected(_)
        ));
        assert!(matches!(
            classify_capability_probe(403, "forbidden"),
            ProbeVerdict::Inconclusive(_)
        ));
        assert!(matches!(
            classify_capability_probe(404, "404 page not found"),
            ProbeVerdict::Inconclusive(_)
        ));
        assert!(matches!(
            classify_capability_probe(404, r#"{"error":"route not found"}"#),
            ProbeVerdict::Inconclusive(_)
        ));
        assert!(matches!(
            classify_capability_probe(500, "oops"),
            ProbeVerdict::Inconclusive(_)
        ));
    }

    /// Fly endpoints answering the app probe with `status` and counting
    /// how often the GraphQL fallback is reached
    async fn fly_endpoints(status: StatusCode, viewer_ok: bool) -> (FlyApi, Arc<AtomicUsize>) {
        let fallbacks = Arc::new(AtomicUsize::new(0));
        let counter = fallbacks.clone();
        let router = Router::new()
            .route("/apps/{app}", get(move || async move { (status, "denied") }))
            .route(
                "/graphql",
                post(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if viewer_ok {
                            Json(json!({"data": {"viewer": {"id": "u1"}}}))
                        } else {
                            Json(json!({"data": null, "errors": [{"message": "Not authorized"}]}))
                        }
                    }
                }),
            );
        let base = serve(router).await;
        let api = FlyApi::with_endpoints(
            SecretString::from("candidate".to_string()),
            &base,
            &format!("{base}/graphql"),
        );
        (api, fallbacks)
    }

    #[tokio::test]
    async fn test_401_rejects_without_fallback() {
        let (api, fallbacks) = fly_endpoints(StatusCode::UNAUTHORIZED, true).await;

        let err = verify_fly_token(&api).await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected { provider: "fly", .. }));
        assert_eq!(fallbacks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_403_runs_exactly_one_fallback() {
        let (api, fallbacks) = fly_endpoints(StatusCode::FORBIDDEN, true).await;

        verify_fly_token(&api).await.unwrap();
        assert_eq!(fallbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_fallbacks_reject() {
        let (api, fallbacks) = fly_endpoints(StatusCode::FORBIDDEN, false).await;

        let err = verify_fly_token(&api).await.unwrap_err();
        match err {
            AuthError::Rejected { reason, .. } => assert!(reason.contains("Not authorized")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fallbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_railway_project_token_accepted_by_fallback() {
        let router = Router::new().route(
            "/graphql",
            post(|Json(request): Json<serde_json::Value>| async move {
                let query = request["query"].as_str().unwrap_or_default();
                if query.contains("me {") {
                    Json(json!({"errors": [{"message": "Not Authorized"}]}))
                } else {
                    Json(json!({"data": {"projects": {"edges": [{"node": {"id": "p1"}}]}}}))
                }
            }),
        );
        let base = serve(router).await;
        let api = RailwayApi::with_endpoint(
            SecretString::from("project-token".to_string()),
            &format!("{base}/graphql"),
        );

        verify_railway_token(&api).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_platform_is_unverifiable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let base = format!("http://{addr}");
        let api = FlyApi::with_endpoints(
            SecretString::from("candidate".to_string()),
            &base,
            &format!("{base}/graphql"),
        );

        let err = verify_fly_token(&api).await.unwrap_err();
        assert!(matches!(err, AuthError::Unverifiable { .. }));
    }
}
