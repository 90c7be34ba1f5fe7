use std::time::Duration;

use futures_util::{Stream, StreamExt};
use roadguard_server::{AppConfig, AppState, build_app};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

async fn start_server() -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let app = build_app(AppState::from_config(AppConfig::default()).expect("state"));

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (addr.to_string(), tx, server)
}

async fn next_message<S>(ws: &mut S) -> Value
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("feed message in time")
            .expect("stream open")
            .expect("valid frame");
        if msg.is_text() {
            return serde_json::from_str(msg.to_text().unwrap()).unwrap();
        }
    }
}

#[tokio::test]
async fn feed_streams_new_and_updated_events() {
    let (addr, shutdown_tx, handle) = start_server().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/hospital-feed"))
        .await
        .expect("connect feed");
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("http://{addr}/report-accident"))
        .json(&json!({
            "userId": "u1",
            "location": {"lat": 12.97, "lng": 77.59},
            "severityScore": 0.8,
            "timestamp": "2026-01-01T10:00:00Z"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = body["eventId"].as_str().unwrap().to_string();

    let created = next_message(&mut ws).await;
    assert_eq!(created["type"], "NEW_EVENT");
    assert_eq!(created["payload"]["id"], id.as_str());
    assert_eq!(created["payload"]["status"], "reported");

    let notified = next_message(&mut ws).await;
    assert_eq!(notified["type"], "UPDATE_EVENT");
    assert_eq!(notified["payload"]["status"], "notified");

    let resp = client
        .post(format!("http://{addr}/events/{id}/ack"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let acked = next_message(&mut ws).await;
    assert_eq!(acked["type"], "UPDATE_EVENT");
    assert_eq!(acked["payload"]["status"], "acknowledged");
    assert_eq!(acked["payload"]["acknowledged"], true);
    assert!(acked["payload"]["version"].as_u64() > notified["payload"]["version"].as_u64());

    let resp = client
        .post(format!("http://{addr}/events/{id}/dispatch"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let dispatched = next_message(&mut ws).await;
    assert_eq!(dispatched["payload"]["status"], "dispatched");

    // A rejected action publishes nothing: the next frame is the repeated dispatch
    let resp = client
        .post(format!("http://{addr}/events/{id}/assign"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let resp = client
        .post(format!("http://{addr}/events/{id}/dispatch"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let repeated = next_message(&mut ws).await;
    assert_eq!(repeated["payload"]["status"], "dispatched");
    assert_eq!(
        repeated["payload"]["version"].as_u64(),
        dispatched["payload"]["version"].as_u64().map(|v| v + 1)
    );

    let _ = ws.close(None).await;
    let _ = shutdown_tx.send(());
    let _ = handle.await;
}
