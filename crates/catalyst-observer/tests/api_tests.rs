//! Integration tests for the control surface endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. A clock engine stands in for the lattice so the
//! worker's pacing, pause and reset behavior can be observed through HTTP.

#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::cast_precision_loss,
    clippy::arithmetic_side_effects,
    clippy::float_cmp
)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use catalyst_core::config::WorkerConfig;
use catalyst_core::controller::WorkerController;
use catalyst_core::engine::{EngineError, EngineFactory, EngineSnapshot, SimulationEngine};
use catalyst_core::model::{ModelDefinition, ObservableLayout};
use catalyst_observer::router::build_router;
use catalyst_observer::state::AppState;
use serde_json::Value;
use tower::ServiceExt;

/// Advances time by one microsecond per step and reports an empty lattice.
struct ClockEngine {
    layout: ObservableLayout,
    time: f64,
    delay: Duration,
    fail: bool,
}

impl SimulationEngine for ClockEngine {
    fn advance(&mut self, steps: u64) -> Result<(), EngineError> {
        if self.fail {
            return Err(EngineError::Step(String::from("rate table diverged")));
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.time += steps as f64 * 1e-6;
        Ok(())
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            time: self.time,
            occupation: vec![vec![0.0; self.layout.sites.len()]; self.layout.species.len()],
            tof_instant: vec![f64::NAN; self.layout.tof_channels.len()],
            tof_integrated: vec![1.0; self.layout.tof_channels.len()],
            config: vec![-1; self.layout.site_count],
        }
    }

    fn apply_parameters(&mut self, _values: &BTreeMap<String, f64>) -> Result<(), EngineError> {
        Ok(())
    }
}

/// `delay` is slept per step batch; `fail` makes every batch error out.
#[derive(Default)]
struct ClockFactory {
    delay: Duration,
    fail: bool,
}

impl EngineFactory for ClockFactory {
    fn allocate(
        &self,
        model: &ModelDefinition,
        _parameters: &BTreeMap<String, f64>,
    ) -> Result<Box<dyn SimulationEngine>, EngineError> {
        Ok(Box::new(ClockEngine {
            layout: ObservableLayout::from_model(model),
            time: 0.0,
            delay: self.delay,
            fail: self.fail,
        }))
    }
}

const STEPS_PER_FRAME: u64 = 1000;

fn make_router(capacity: usize) -> Router {
    make_router_with(capacity, ClockFactory::default())
}

fn make_router_with(capacity: usize, factory: ClockFactory) -> Router {
    let config = WorkerConfig {
        steps_per_frame: STEPS_PER_FRAME,
        frame_rate_hz: 200.0,
        history_capacity: 30,
        parameter_channel_capacity: capacity,
        seed: None,
    };
    let (controller, _handle) =
        WorkerController::spawn(config, ModelDefinition::methanation(), Arc::new(factory));
    build_router(Arc::new(AppState::new(controller)))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<&str>,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_owned())))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Poll `GET /dynamic` until a bundle matching `accept` arrives.
async fn poll_dynamic(router: &Router, accept: impl Fn(&Value) -> bool) -> Value {
    for _ in 0..400 {
        let (status, json) = send(router, "GET", "/dynamic", None).await;
        if status == StatusCode::OK && accept(&json) {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no matching bundle from /dynamic");
}

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_before_start() {
    let router = make_router(10);

    let response = router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["hasStarted"], false);
    assert_eq!(json["isPaused"], false);
    assert_eq!(json["state"], "stopped");
    assert!(json["failure"].is_null());
    assert!(json["runId"].is_string());
}

#[tokio::test]
async fn test_ready_returns_no_content() {
    let router = make_router(10);

    let response = router
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_nonexistent_route_returns_404() {
    let router = make_router(10);

    let response = router
        .oneshot(Request::get("/does-not-exist").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Run control
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_start_then_second_start_is_not_successful() {
    let router = make_router(10);

    let (status, json) = send(&router, "POST", "/start", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    assert_eq!(json["hasStarted"], true);
    assert_eq!(json["state"], "running");
    assert!(json["startedAt"].is_string());

    let (status, json) = send(&router, "POST", "/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);
    assert!(json["reason"].as_str().unwrap().contains("running"));
}

#[tokio::test]
async fn test_pause_and_resume_transitions() {
    let router = make_router(10);

    // Nothing to pause yet.
    let (status, json) = send(&router, "PUT", "/pause", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);

    send(&router, "POST", "/start", None).await;

    let (status, json) = send(&router, "PUT", "/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["isPaused"], true);

    let (status, json) = send(&router, "PUT", "/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);

    // Start while paused is not a resume.
    let (status, _) = send(&router, "POST", "/start", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(&router, "PUT", "/resume", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "running");

    let (status, json) = send(&router, "PUT", "/resume", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_dynamic_requires_started_run() {
    let router = make_router(10);

    let (status, json) = send(&router, "GET", "/dynamic", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(json["reason"].is_string());

    let (status, _) = send(&router, "GET", "/history", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dynamic_returns_bundle_while_running() {
    let router = make_router(10);
    send(&router, "POST", "/start", None).await;

    let json = poll_dynamic(&router, |_| true).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["fresh"], true);
    assert!(json["iteration"].as_u64().unwrap() >= 1);

    let frame = &json["frame"];
    assert!(frame["time"].as_f64().unwrap() > 0.0);
    // NaN instantaneous rates are reported as zero.
    assert_eq!(frame["tofValues"][0]["instant"], 0.0);
    assert_eq!(frame["tofValues"][0]["integrated"], 1.0);
    assert_eq!(frame["tofValues"].as_array().unwrap().len(), 2);
    assert_eq!(frame["coverageValues"].as_array().unwrap().len(), 7 * 3);
    assert_eq!(json["config"].as_array().unwrap().len(), 20 * 20 * 3);
    assert!(json["history"].as_array().unwrap().len() <= 30);
}

#[tokio::test]
async fn test_dynamic_while_paused_returns_last_bundle() {
    let router = make_router(10);
    send(&router, "POST", "/start", None).await;
    poll_dynamic(&router, |_| true).await;

    let (status, _) = send(&router, "PUT", "/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    // Let any batch in flight finish publishing.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (status, first) = send(&router, "GET", "/dynamic", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let (status, second) = send(&router, "GET", "/dynamic", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["fresh"], false);
    assert_eq!(second["iteration"], first["iteration"]);
    assert_eq!(second["frame"]["time"], first["frame"]["time"]);
}

#[tokio::test]
async fn test_history_is_time_ordered() {
    let router = make_router(10);
    send(&router, "POST", "/start", None).await;
    poll_dynamic(&router, |json| json["iteration"].as_u64().unwrap() >= 5).await;

    let (status, json) = send(&router, "GET", "/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    let history = json["history"].as_array().unwrap();
    assert!(!history.is_empty());
    assert!(history.len() <= 30);
    let times: Vec<f64> = history
        .iter()
        .map(|frame| frame["time"].as_f64().unwrap())
        .collect();
    assert!(times.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[tokio::test]
async fn test_reset_restarts_time_and_history() {
    let router = make_router(10);
    send(&router, "POST", "/start", None).await;
    poll_dynamic(&router, |json| json["iteration"].as_u64().unwrap() >= 10).await;

    let (status, json) = send(&router, "POST", "/reset", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    assert_eq!(json["state"], "stopped");
    let run_id = json["runId"].clone();

    let (status, _) = send(&router, "GET", "/history", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&router, "POST", "/start", None).await;
    assert_eq!(status, StatusCode::CREATED);

    let json = poll_dynamic(&router, |_| true).await;
    assert_eq!(json["runId"], run_id);
    let iteration = json["iteration"].as_u64().unwrap();
    let expected = (iteration * STEPS_PER_FRAME) as f64 * 1e-6;
    assert!((json["frame"]["time"].as_f64().unwrap() - expected).abs() < 1e-9);
    assert!(json["history"].as_array().unwrap().len() as u64 <= iteration);
}

#[tokio::test]
async fn test_reset_from_paused_stops_run() {
    let router = make_router(10);
    let (_, started) = send(&router, "POST", "/start", None).await;
    poll_dynamic(&router, |_| true).await;
    send(&router, "PUT", "/pause", None).await;

    let (status, json) = send(&router, "POST", "/reset", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    assert_eq!(json["state"], "stopped");
    assert_eq!(json["isPaused"], false);
    assert_ne!(json["runId"], started["runId"]);
    let run_id = json["runId"].clone();

    let (status, _) = send(&router, "GET", "/dynamic", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&router, "GET", "/history", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    // A reset run is stopped, not paused.
    let (status, _) = send(&router, "PUT", "/resume", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&router, "POST", "/start", None).await;
    assert_eq!(status, StatusCode::CREATED);
    let json = poll_dynamic(&router, |_| true).await;
    assert_eq!(json["runId"], run_id);
    let iteration = json["iteration"].as_u64().unwrap();
    let expected = (iteration * STEPS_PER_FRAME) as f64 * 1e-6;
    assert!((json["frame"]["time"].as_f64().unwrap() - expected).abs() < 1e-9);
}

#[tokio::test]
async fn test_health_reports_engine_failure() {
    let factory = ClockFactory {
        fail: true,
        ..ClockFactory::default()
    };
    let router = make_router_with(10, factory);

    let (status, _) = send(&router, "POST", "/start", None).await;
    assert_eq!(status, StatusCode::CREATED);

    let mut health = Value::Null;
    for _ in 0..400 {
        let (status, json) = send(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        if json["failure"].is_string() {
            health = json;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let failure = health["failure"].as_str().unwrap();
    assert!(failure.contains("rate table diverged"), "failure {failure:?}");
    assert_eq!(health["state"], "stopped");
    assert_eq!(health["hasStarted"], false);

    let (status, json) = send(&router, "POST", "/start", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(json["reason"].as_str().unwrap().contains("rate table diverged"));

    let (status, _) = send(&router, "POST", "/reset", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_slider_accepts_adjustable_parameter() {
    let router = make_router(10);

    let (status, json) =
        send(&router, "POST", "/slider", Some(r#"{"label":"T","value":550}"#)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);

    let (status, _) = send(
        &router,
        "POST",
        "/slider",
        Some(r#"{"label":"p_COgas","value":"0.5"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_slider_rejections() {
    let router = make_router(10);

    let cases = [
        (None, "missing JSON"),
        (Some("{oops"), "invalid JSON"),
        (Some(r#"{"value":1}"#), "missing label"),
        (Some(r#"{"label":"T"}"#), "missing value"),
        (Some(r#"{"label":"T","value":"warm"}"#), "not numeric"),
        (Some(r#"{"label":"not_a_param","value":0.1}"#), "not_a_param"),
        (Some(r#"{"label":"A","value":1.0}"#), "A"),
        (Some(r#"{"label":"T","value":10000.0}"#), "T"),
    ];

    for (body, fragment) in cases {
        let (status, json) = send(&router, "POST", "/slider", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {body:?}");
        assert_eq!(json["success"], false);
        let reason = json["reason"].as_str().unwrap();
        assert!(reason.contains(fragment), "reason {reason:?} for {body:?}");
        assert!(json.get("retryable").is_none());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slider_after_reset_is_not_lost() {
    let factory = ClockFactory {
        delay: Duration::from_millis(300),
        ..ClockFactory::default()
    };
    let router = make_router_with(10, factory);
    send(&router, "POST", "/start", None).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The first step batch is still running when these arrive.
    let (status, _) = send(&router, "POST", "/reset", None).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&router, "POST", "/slider", Some(r#"{"label":"T","value":650}"#)).await;
    assert_eq!(status, StatusCode::CREATED);

    for _ in 0..400 {
        let (_, json) = send(&router, "GET", "/initial", None).await;
        let slider = json["slider"].as_array().unwrap();
        let t = slider.iter().find(|s| s["label"] == "T").unwrap();
        if t["default"] == 650.0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("slider update accepted after reset was dropped");
}

#[tokio::test]
async fn test_slider_backpressure_is_retryable() {
    // The worker is stopped and idle on its inbox, but a current-thread
    // runtime does not poll it between the two requests below.
    let router = make_router(1);

    let (status, _) = send(&router, "POST", "/slider", Some(r#"{"label":"T","value":500}"#)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) =
        send(&router, "POST", "/slider", Some(r#"{"label":"T","value":510}"#)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["success"], false);
    assert_eq!(json["retryable"], true);
}

// ---------------------------------------------------------------------------
// Initial document
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_initial_before_start() {
    let router = make_router(10);

    let response = router
        .oneshot(Request::get("/initial").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["success"], true);

    let config = json["visualization"]["config"].as_array().unwrap();
    assert_eq!(config.len(), 20 * 20 * 3);
    assert!(config.iter().all(|v| v == -1));
    assert_eq!(json["plots"]["plotData"]["kmcTime"], 0.0);
    assert!(json["visualization"].as_object().unwrap().len() > 1);
}

#[tokio::test]
async fn test_initial_reflects_committed_slider() {
    let router = make_router(10);
    send(&router, "POST", "/slider", Some(r#"{"label":"T","value":650}"#)).await;

    // The stopped worker commits queued updates as they arrive.
    for _ in 0..200 {
        let (_, json) = send(&router, "GET", "/initial", None).await;
        let slider = json["slider"].as_array().unwrap();
        let t = slider.iter().find(|s| s["label"] == "T").unwrap();
        assert_eq!(t["min"], 400.0);
        assert_eq!(t["max"], 800.0);
        if t["default"] == 650.0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("committed slider value never appeared in /initial");
}
