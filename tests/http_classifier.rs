use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use speakez_lib::classifier::{Classifier, HttpClassifier, Sample};
use speakez_lib::error::ClassifierError;
use speakez_lib::settings::ClassifierSettings;

#[derive(Default)]
struct Seen {
    frame_content_type: Option<String>,
    frame_len: usize,
    sensor_body: Option<Value>,
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn classifier_for(base_url: String, device_status: bool) -> HttpClassifier {
    let mut settings = ClassifierSettings {
        base_url,
        ..ClassifierSettings::default()
    };
    if !device_status {
        settings.device_status_path = None;
    }
    HttpClassifier::new(settings, Duration::from_secs(2)).unwrap()
}

fn healthy_backend(seen: Arc<Mutex<Seen>>) -> Router {
    let frames = Arc::clone(&seen);
    let sensors = Arc::clone(&seen);
    Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .route(
            "/esp32/status",
            get(|| async { Json(json!({ "esp32_model_loaded": true, "connected_clients": 1 })) }),
        )
        .route(
            "/predict",
            post(move |headers: HeaderMap, body: Bytes| {
                let seen = Arc::clone(&frames);
                async move {
                    let mut seen = seen.lock().unwrap();
                    seen.frame_content_type = headers
                        .get("content-type")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    seen.frame_len = body.len();
                    Json(json!({ "detected": true, "prediction": "B", "confidence": 0.91 }))
                }
            }),
        )
        .route(
            "/esp32/predict",
            post(move |Json(body): Json<Value>| {
                let seen = Arc::clone(&sensors);
                async move {
                    seen.lock().unwrap().sensor_body = Some(body);
                    Json(json!({ "detected": true, "prediction": "L", "confidence": 1.7 }))
                }
            }),
        )
        .route(
            "/esp32/latest",
            get(|| async { Json(json!({ "detected": false, "prediction": null, "confidence": 0.0 })) }),
        )
}

#[tokio::test]
async fn probe_checks_health_then_device_status() {
    let base = serve(healthy_backend(Arc::default())).await;

    let probe = classifier_for(base.clone(), true).probe().await.unwrap();
    assert!(probe.reachable);
    let device = probe.device.unwrap();
    assert!(device.model_loaded);
    assert_eq!(device.extra.get("connected_clients"), Some(&json!(1)));

    let probe = classifier_for(base, false).probe().await.unwrap();
    assert!(probe.reachable);
    assert!(probe.device.is_none());
}

#[tokio::test]
async fn probe_gets_its_own_time_budget() {
    let app = Router::new().route(
        "/health",
        get(|| async {
            tokio::time::sleep(Duration::from_millis(600)).await;
            Json(json!({ "status": "ok" }))
        }),
    );
    let base = serve(app).await;
    let settings = ClassifierSettings {
        base_url: base,
        device_status_path: None,
        ..ClassifierSettings::default()
    };

    let short = HttpClassifier::new(settings.clone(), Duration::from_millis(200)).unwrap();
    assert_eq!(short.probe().await.unwrap_err(), ClassifierError::Timeout);

    let patient = HttpClassifier::new(settings, Duration::from_millis(200))
        .unwrap()
        .with_probe_timeout(Duration::from_secs(5));
    assert!(patient.probe().await.unwrap().reachable);
}

#[tokio::test]
async fn unhealthy_backend_is_unreachable() {
    let app = Router::new().route(
        "/health",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "model not loaded") }),
    );
    let base = serve(app).await;
    let probe = classifier_for(base, false).probe().await.unwrap();
    assert!(!probe.reachable);
}

#[tokio::test]
async fn closed_port_is_a_probe_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = classifier_for(format!("http://{addr}"), false)
        .probe()
        .await
        .unwrap_err();
    assert!(matches!(err, ClassifierError::Unreachable(_)));
}

#[tokio::test]
async fn frames_are_uploaded_as_multipart() {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let base = serve(healthy_backend(Arc::clone(&seen))).await;

    let result = classifier_for(base, false)
        .classify(&Sample::Frame(vec![0xFF, 0xD8, 0xFF, 0xE0]))
        .await
        .unwrap();
    assert!(result.detected);
    assert_eq!(result.label.as_deref(), Some("B"));
    assert!((result.confidence - 0.91).abs() < 1e-6);

    let seen = seen.lock().unwrap();
    assert!(seen
        .frame_content_type
        .as_deref()
        .unwrap()
        .starts_with("multipart/form-data"));
    assert!(seen.frame_len > 4);
}

#[tokio::test]
async fn sensor_values_are_posted_as_json_and_confidence_clamped() {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let base = serve(healthy_backend(Arc::clone(&seen))).await;

    let result = classifier_for(base, false)
        .classify(&Sample::Sensor(vec![10, 200, 300, 400, 1023]))
        .await
        .unwrap();
    assert_eq!(result.label.as_deref(), Some("L"));
    assert_eq!(result.confidence, 1.0);

    assert_eq!(
        seen.lock().unwrap().sensor_body,
        Some(json!({ "sensor_values": [10, 200, 300, 400, 1023] }))
    );
}

#[tokio::test]
async fn pull_reads_the_latest_device_prediction() {
    let base = serve(healthy_backend(Arc::default())).await;
    let classifier = classifier_for(base, true);

    let result = classifier.classify(&Sample::Pull).await.unwrap();
    assert!(!result.detected);
    assert_eq!(result.label, None);
    assert_eq!(classifier.fetch_latest().await.unwrap(), result);
}

#[tokio::test]
async fn missing_detected_field_is_malformed() {
    let app = Router::new().route(
        "/esp32/latest",
        get(|| async { Json(json!({ "prediction": "A", "confidence": 0.8 })) }),
    );
    let base = serve(app).await;
    let err = classifier_for(base, false).fetch_latest().await.unwrap_err();
    assert!(err.is_malformed());
}

#[tokio::test]
async fn non_json_body_is_malformed() {
    let app = Router::new().route("/esp32/latest", get(|| async { "<html>oops</html>" }));
    let base = serve(app).await;
    let err = classifier_for(base, false).fetch_latest().await.unwrap_err();
    assert!(err.is_malformed());
}

#[tokio::test]
async fn server_error_keeps_status_and_body() {
    let app = Router::new().route(
        "/predict",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
    );
    let base = serve(app).await;
    let err = classifier_for(base, false)
        .classify(&Sample::Frame(vec![1, 2, 3]))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ClassifierError::Status {
            code: 500,
            body: "model crashed".into()
        }
    );
}

#[tokio::test]
async fn backend_error_field_becomes_a_failed_result() {
    let app = Router::new().route(
        "/esp32/latest",
        get(|| async {
            Json(json!({ "detected": false, "prediction": null, "confidence": 0.0, "error": "no device data" }))
        }),
    );
    let base = serve(app).await;
    let result = classifier_for(base, false).fetch_latest().await.unwrap();
    assert!(result.raised_error.is_some());
    assert!(!result.is_success());
}
