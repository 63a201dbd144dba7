//! Integration tests for the vitals-agent HTTP server

#[cfg(feature = "server")]
mod server_tests {
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use synheart_vitals_agent::server::{run, spawn, ServerConfig};
    use synheart_vitals_agent::{DetectionSettings, MemoryStore, Monitor};
    use tokio::sync::oneshot;

    async fn start_server(samples_dir: PathBuf) -> (SocketAddr, oneshot::Sender<()>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let settings = DetectionSettings {
            window_size: 2,
            ..DetectionSettings::default()
        };
        let monitor = Arc::new(Monitor::new(store.clone(), settings));
        let config = ServerConfig::new(0, samples_dir, Duration::from_millis(10));

        // Start server
        let (addr, shutdown_tx) = run(config, monitor).await.expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        (addr, shutdown_tx, store)
    }

    fn empty_samples_dir() -> PathBuf {
        std::env::temp_dir().join("synheart-vitals-server-test-empty")
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, shutdown_tx, _store) = start_server(empty_samples_dir()).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        // Shutdown server
        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_sensor_data_accepts_reading() {
        let (addr, shutdown_tx, store) = start_server(empty_samples_dir()).await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/api/sensor_data", addr))
            .json(&serde_json::json!({
                "subject_id": "alice",
                "sensor": "hr",
                "timestamp": 1_700_000_000_000.0,
                "value": 72.0
            }))
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["ok"], true);
        assert_eq!(store.reading_count(), 1);

        // Legacy field names
        let response = client
            .post(format!("http://{}/api/sensor_data", addr))
            .json(&serde_json::json!({
                "username": "alice",
                "sensor_kind": "temp",
                "value": 36.6
            }))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(store.reading_count(), 2);

        let response = client
            .get(format!("http://{}/api/readings/alice", addr))
            .send()
            .await
            .expect("Failed to send request");
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        let readings = body["readings"].as_array().expect("readings array");
        assert_eq!(readings.len(), 2);
        // Milliseconds are stored as seconds
        assert_eq!(readings[0]["timestamp"], 1_700_000_000.0);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_sensor_data_rejects_bad_input() {
        let (addr, shutdown_tx, store) = start_server(empty_samples_dir()).await;
        let client = reqwest::Client::new();
        let url = format!("http://{}/api/sensor_data", addr);

        let unknown_sensor = client
            .post(&url)
            .json(&serde_json::json!({"subject_id": "alice", "sensor": "spo2", "value": 97.0}))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(unknown_sensor.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = unknown_sensor.json().await.expect("Failed to parse JSON");
        assert_eq!(body["ok"], false);
        assert!(body["error"].as_str().unwrap_or("").contains("spo2"));

        let missing_value = client
            .post(&url)
            .json(&serde_json::json!({"subject_id": "alice", "sensor": "hr"}))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(missing_value.status(), reqwest::StatusCode::BAD_REQUEST);

        let not_json = client
            .post(&url)
            .header("Content-Type", "application/json")
            .body("{not json")
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(not_json.status(), reqwest::StatusCode::BAD_REQUEST);

        assert_eq!(store.reading_count(), 0);

        let status: serde_json::Value = client
            .get(format!("http://{}/api/status", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(status["counters"]["readings_rejected"], 1);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_anomalies_endpoint() {
        let (addr, shutdown_tx, _store) = start_server(empty_samples_dir()).await;
        let client = reqwest::Client::new();

        for (ts, value) in [(1000.0, 130.0), (1001.0, 140.0), (1002.0, 150.0)] {
            let response = client
                .post(format!("http://{}/api/sensor_data", addr))
                .json(&serde_json::json!({
                    "subject_id": "alice",
                    "sensor": "hr",
                    "timestamp": ts,
                    "value": value
                }))
                .send()
                .await
                .expect("Failed to send request");
            assert!(response.status().is_success());
        }

        let body: serde_json::Value = client
            .get(format!("http://{}/api/anomalies?limit=5", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");

        let anomalies = body["anomalies"].as_array().expect("anomalies array");
        assert_eq!(anomalies.len(), 2);
        // Newest first; the first reading alone does not fill the window
        assert_eq!(anomalies[0]["timestamp"], 1002.0);
        assert_eq!(anomalies[0]["sensor_kind"], "hr");
        assert_eq!(anomalies[0]["observed_average"], 145.0);
        assert_eq!(anomalies[1]["observed_average"], 135.0);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_feeder_control() {
        let samples = tempfile::tempdir().expect("tempdir");
        let subject = samples.path().join("alice");
        std::fs::create_dir_all(&subject).unwrap();
        std::fs::write(subject.join("wrist_hr.csv"), "timestamp,value\n1,70\n2,71\n3,72\n").unwrap();

        let (addr, shutdown_tx, store) = start_server(samples.path().to_path_buf()).await;
        let client = reqwest::Client::new();

        let started: serde_json::Value = client
            .post(format!("http://{}/api/feeders/start", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(started["changed"], serde_json::json!(["alice"]));
        assert_eq!(started["feeders"]["alice"], "running");

        // A second start leaves the running feeder alone
        let again: serde_json::Value = client
            .post(format!("http://{}/api/feeders/start", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(again["changed"], serde_json::json!([]));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.reading_count(), 3);

        let stopped: serde_json::Value = client
            .post(format!("http://{}/api/feeders/stop", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(stopped["changed"], serde_json::json!(["alice"]));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let listing: serde_json::Value = client
            .get(format!("http://{}/api/feeders", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(listing["feeders"]["alice"], "stopped");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_feeders() {
        let samples = tempfile::tempdir().expect("tempdir");
        let subject = samples.path().join("alice");
        std::fs::create_dir_all(&subject).unwrap();
        let mut series = String::from("timestamp,value\n");
        for i in 0..10_000 {
            series.push_str(&format!("{},{}\n", 1000 + i, 60 + i % 10));
        }
        std::fs::write(subject.join("wrist_hr.csv"), series).unwrap();

        let store = Arc::new(MemoryStore::new());
        let monitor = Arc::new(Monitor::new(store.clone(), DetectionSettings::default()));
        let config = ServerConfig::new(0, samples.path().to_path_buf(), Duration::from_millis(10));
        let server = spawn(config, monitor).await.expect("Failed to start server");

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/api/feeders/start", server.addr))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.reading_count() > 0);

        let _ = server.shutdown.send(());
        tokio::time::timeout(Duration::from_secs(5), server.finished)
            .await
            .expect("shutdown timed out")
            .expect("server task failed");

        // Every feeder has joined, so nothing else is ingested
        let at_exit = store.reading_count();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.reading_count(), at_exit);
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let (addr, shutdown_tx, _store) = start_server(empty_samples_dir()).await;

        // Send OPTIONS request to check CORS
        let client = reqwest::Client::new();
        let response = client
            .request(reqwest::Method::OPTIONS, format!("http://{}/api/sensor_data", addr))
            .header("Origin", "http://localhost")
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .expect("Failed to send request");

        // CORS preflight should succeed
        assert!(
            response.status().is_success() || response.status() == reqwest::StatusCode::NO_CONTENT,
            "CORS preflight failed: {}",
            response.status()
        );

        let _ = shutdown_tx.send(());
    }
}
