//! HTTP router construction.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::state::AppState;

/// Identity keys are short paths; anything larger is not a key.
const MAX_BODY_BYTES: usize = 4 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/notice", post(api::notice))
        .route("/remind", post(api::remind))
        .route("/balances", get(api::balances_list))
        .route("/balances/{payer_id}", get(api::balance_get))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use rentwatch_core::{Config, FixedClock, LedgerEntry, PayerProfile, PayerRecord};
    use rentwatch_engine::EngineContext;
    use rentwatch_notify::{Dispatcher, Notifier, NotifyError, RetryPolicy, TemplateRenderer};
    use rentwatch_store::{LedgerStore, MemoryIdentityStore, MemoryLedgerStore};

    use super::*;

    const NOW: i64 = 1_756_121_352;
    const WEEK: i64 = 604_800;

    #[derive(Default)]
    struct CountingNotifier {
        calls: AtomicUsize,
        completed: AtomicUsize,
        fail: bool,
        latency: Duration,
    }

    impl CountingNotifier {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn slow(latency: Duration) -> Self {
            Self {
                latency,
                ..Self::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl Notifier for CountingNotifier {
        async fn send(&self, _channel: &str, _text: &str) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.completed.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotifyError::Api {
                    status: 500,
                    message: "down".into(),
                })
            } else {
                Ok(())
            }
        }
        fn channel_name(&self) -> &str {
            "counting"
        }
    }

    struct Fixture {
        app: Router,
        ledger: Arc<MemoryLedgerStore>,
        identities: Arc<MemoryIdentityStore>,
        notifier: Arc<CountingNotifier>,
    }

    fn test_config() -> Config {
        let map: HashMap<&str, &str> = HashMap::from([
            ("ACCOUNT", "1234 5678"),
            ("BSB", "062-000"),
            ("CONTACT_USER_ID", "99"),
            ("NOTICE_MARGIN", "10"),
        ]);
        Config::from_source("", &move |k| map.get(k).map(|v| v.to_string())).unwrap()
    }

    async fn fixture(fail: bool) -> Fixture {
        let notifier = if fail {
            CountingNotifier::failing()
        } else {
            CountingNotifier::default()
        };
        fixture_with(notifier).await
    }

    async fn fixture_with(notifier: CountingNotifier) -> Fixture {
        let config = Arc::new(test_config());
        let ledger = Arc::new(MemoryLedgerStore::new());
        let identities = Arc::new(MemoryIdentityStore::new());
        identities
            .insert(
                "tenant.json",
                PayerRecord {
                    payer_id: "42".into(),
                    notify_channel: "chan-42".into(),
                    notify_email: String::new(),
                    weekly_rate: 260,
                    last_paid_at: NOW - WEEK,
                    display_name: Some("Flat 3".into()),
                },
            )
            .await;
        let notifier = Arc::new(notifier);
        let dispatcher = Dispatcher::new(
            notifier.clone(),
            TemplateRenderer::new().unwrap(),
            RetryPolicy {
                attempts: 2,
                delay: Duration::from_millis(10),
            },
        );
        let ctx = EngineContext {
            ledger: ledger.clone(),
            identities: identities.clone(),
            dispatcher: Arc::new(dispatcher),
            clock: Arc::new(FixedClock::new(NOW)),
            notice: Arc::new(config.notice.clone()),
            policy: config.notice.policy(),
            storage_timeout: config.postgres.storage_timeout(),
        };
        let state = Arc::new(AppState::new(config, ctx, CancellationToken::new()));
        Fixture {
            app: build_router(state),
            ledger,
            identities,
            notifier,
        }
    }

    fn request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn call(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request(method, uri, body)).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn notice_charges_and_reports_outcome() {
        let f = fixture(false).await;
        let (status, body) = call(&f.app, "POST", "/notice", "tenant.json\n").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["payer_id"], "42");
        assert_eq!(body["charged"], 260);
        assert_eq!(body["balance"]["balance"], -260);
        assert_eq!(body["notice"]["status"], "sent");
        assert_eq!(f.notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn notice_rejects_bad_input() {
        let f = fixture(false).await;
        let (status, _) = call(&f.app, "POST", "/notice", "   ").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&f.app, "POST", "/notice", "missing.json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("missing.json"));
        assert!(f.ledger.is_empty().await);
    }

    #[tokio::test]
    async fn notice_failure_is_bad_gateway_but_charge_stands() {
        let f = fixture(true).await;
        let (status, body) = call(&f.app, "POST", "/notice", "tenant.json").await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["notice"]["status"], "failed");
        assert_eq!(f.notifier.calls.load(Ordering::SeqCst), 2);
        assert_eq!(f.ledger.aggregate_for("42").await.unwrap().balance, -260);
    }

    #[tokio::test]
    async fn notice_storage_outage_is_server_error() {
        let f = fixture(false).await;
        f.ledger.set_unavailable(true);
        let (status, _) = call(&f.app, "POST", "/notice", "tenant.json").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_notice_request_still_completes_the_check() {
        let f = fixture_with(CountingNotifier::slow(Duration::from_secs(5))).await;

        let response = tokio::time::timeout(
            Duration::from_secs(1),
            f.app.clone().oneshot(request("POST", "/notice", "tenant.json")),
        )
        .await;
        assert!(response.is_err(), "client gave up before the notice went out");
        assert_eq!(f.notifier.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(f.notifier.completed.load(Ordering::SeqCst), 1);
        assert_eq!(f.ledger.aggregate_for("42").await.unwrap().balance, -260);
        assert_eq!(f.identities.get("tenant.json").await.unwrap().last_paid_at, NOW);

        let (_, body) = call(&f.app, "POST", "/notice", "tenant.json").await;
        assert_eq!(body["charged"], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_remind_request_lets_sends_finish() {
        let f = fixture_with(CountingNotifier::slow(Duration::from_secs(5))).await;
        f.ledger
            .append(&LedgerEntry::charge("7", 5_000, NOW - 2 * 86_400, "rent accrual"))
            .await
            .unwrap();
        f.ledger
            .upsert_payer(&PayerProfile {
                payer_id: "7".into(),
                display_name: "Flat 1".into(),
                notify_channel: "chan-7".into(),
            })
            .await
            .unwrap();

        let response = tokio::time::timeout(
            Duration::from_secs(1),
            f.app.clone().oneshot(request("POST", "/remind", "")),
        )
        .await;
        assert!(response.is_err());

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(f.notifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.notifier.completed.load(Ordering::SeqCst), 1);
        let (status, _) = call(&f.app, "POST", "/remind", "").await;
        assert_eq!(status, StatusCode::OK, "the detached sweep released its guard");
    }

    #[tokio::test]
    async fn remind_returns_sweep_report() {
        let f = fixture(false).await;
        f.ledger
            .upsert_payer(&PayerProfile {
                payer_id: "7".into(),
                display_name: "Flat 1".into(),
                notify_channel: "chan-7".into(),
            })
            .await
            .unwrap();
        f.ledger
            .append(&LedgerEntry::charge("7", 5_000, NOW - 2 * 86_400, "rent accrual"))
            .await
            .unwrap();

        let (status, body) = call(&f.app, "POST", "/remind", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["scanned"], 1);
        assert_eq!(body["notified"], 1);
        assert_eq!(body["cancelled"], false);
    }

    #[tokio::test]
    async fn balances_views() {
        let f = fixture(false).await;
        call(&f.app, "POST", "/notice", "tenant.json").await;

        let (status, body) = call(&f.app, "GET", "/balances", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["display_balance"], "-2.60");

        let (status, body) = call(&f.app, "GET", "/balances/42", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["display_name"], "Flat 3");
        assert_eq!(body["entries"].as_array().unwrap().len(), 1);

        let (status, _) = call(&f.app, "GET", "/balances/nobody", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reflects_ledger() {
        let f = fixture(false).await;
        let (status, body) = call(&f.app, "GET", "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ledger"], "memory");

        f.ledger.set_unavailable(true);
        let (status, body) = call(&f.app, "GET", "/health", "").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "degraded");
    }
}
