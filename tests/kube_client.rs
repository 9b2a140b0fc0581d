//! API client and informer against a mock API server.

mod common;

use common::{kubeconfig_for, start_programmable_backend};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

use runtime_registries_config::lifecycle::Shutdown;
use runtime_registries_config::watch::{
    ClusterEndpoint, ConfigMapSource, Informer, InformerConfig, KubeClient, LifecycleEvent,
    SnapshotSource, SourceError,
};

const CONFIG_MAP: &str = r#"{
  "apiVersion": "v1",
  "kind": "ConfigMap",
  "metadata": {"name": "runtime-registry-config", "namespace": "default", "resourceVersion": "1"},
  "data": {"registries": "- original: docker.io\n  mirror: mirror.local\n"}
}"#;

fn list_body(resource_version: &str) -> String {
    format!(
        r#"{{"kind":"ConfigMapList","metadata":{{"resourceVersion":"{resource_version}"}},"items":[{CONFIG_MAP}]}}"#
    )
}

fn client_for(addr: std::net::SocketAddr) -> KubeClient {
    let dir = TempDir::new().unwrap();
    let endpoint = ClusterEndpoint::from_kubeconfig_str(&kubeconfig_for(addr), dir.path()).unwrap();
    KubeClient::new(endpoint).unwrap()
}

#[tokio::test]
async fn test_get_config_map() {
    let addr = start_programmable_backend(|target| {
        if target == "/api/v1/namespaces/default/configmaps/runtime-registry-config" {
            (200, CONFIG_MAP.to_string())
        } else {
            (404, r#"{"kind":"Status","code":404}"#.to_string())
        }
    })
    .await;
    let client = client_for(addr);

    let object = client
        .get_config_map("default", "runtime-registry-config")
        .await
        .unwrap();
    assert_eq!(object.resource_version(), "1");
    assert!(object.value("registries").unwrap().contains("docker.io"));
}

#[tokio::test]
async fn test_get_missing_config_map() {
    let addr =
        start_programmable_backend(|_| (404, r#"{"kind":"Status","code":404}"#.to_string())).await;
    let client = client_for(addr);

    let err = client.get_config_map("default", "absent").await.unwrap_err();
    assert!(matches!(err, SourceError::NotFound { ref name, .. } if name == "absent"));
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let addr = start_programmable_backend(|_| (500, "boom".to_string())).await;
    let client = client_for(addr);

    let err = client
        .list_config_maps("default", "metadata.name=x")
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::Status { ref body, .. } if body == "boom"));
}

#[tokio::test]
async fn test_source_fetches_snapshot() {
    let addr = start_programmable_backend(|_| (200, CONFIG_MAP.to_string())).await;
    let client = Arc::new(client_for(addr));
    let source = ConfigMapSource::new(client, "default", "runtime-registry-config", "registries");

    let snapshot = source.fetch().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.records()[0].original, "docker.io");
    assert_eq!(snapshot.records()[0].mirror, "mirror.local");
    assert!(!snapshot.records()[0].insecure);

    let wrong_key = ConfigMapSource::new(
        Arc::new(client_for(addr)),
        "default",
        "runtime-registry-config",
        "mirrors",
    );
    let err = wrong_key.fetch().await.unwrap_err();
    assert!(matches!(err, SourceError::MissingKey { .. }));
}

#[tokio::test]
async fn test_informer_emits_list_and_watch_events() {
    let addr = start_programmable_backend(|target| {
        if target.contains("watch=true") {
            let modified = CONFIG_MAP.replace(r#""resourceVersion": "1""#, r#""resourceVersion": "2""#);
            let line = serde_json::json!({
                "type": "MODIFIED",
                "object": serde_json::from_str::<serde_json::Value>(&modified).unwrap(),
            });
            (200, format!("{line}\n"))
        } else {
            (200, list_body("1"))
        }
    })
    .await;
    let client = Arc::new(client_for(addr));

    let config = InformerConfig {
        namespace: "default".into(),
        name: "runtime-registry-config".into(),
        watch_timeout: Duration::from_secs(5),
        backoff_base_ms: 10,
        backoff_max_ms: 100,
    };
    let shutdown = Shutdown::new();
    let (tx, mut rx) = mpsc::channel(8);
    let task = tokio::spawn(Informer::new(client, config, tx).run(shutdown.subscribe()));

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, LifecycleEvent::Added(ref object) if object.resource_version() == "1"));

    let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    match second {
        LifecycleEvent::Modified { old, new } => {
            assert_eq!(old.resource_version(), "1");
            assert_eq!(new.resource_version(), "2");
        }
        other => panic!("expected Modified, got {other:?}"),
    }

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}

/// Mock API server counting LIST requests and answering watches with `watch_body`.
async fn counting_backend(watch_body: &'static str) -> (std::net::SocketAddr, Arc<AtomicUsize>) {
    let lists = Arc::new(AtomicUsize::new(0));
    let counter = lists.clone();
    let addr = start_programmable_backend(move |target| {
        if target.contains("watch=true") {
            (200, watch_body.to_string())
        } else {
            counter.fetch_add(1, Ordering::SeqCst);
            (200, list_body("1"))
        }
    })
    .await;
    (addr, lists)
}

/// Run an informer for `window`, then stop it and return every notification.
async fn run_informer_for(
    addr: std::net::SocketAddr,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
    window: Duration,
) -> Vec<LifecycleEvent> {
    let config = InformerConfig {
        namespace: "default".into(),
        name: "runtime-registry-config".into(),
        watch_timeout: Duration::from_secs(30),
        backoff_base_ms,
        backoff_max_ms,
    };
    let shutdown = Shutdown::new();
    let (tx, mut rx) = mpsc::channel(64);
    let task = tokio::spawn(
        Informer::new(Arc::new(client_for(addr)), config, tx).run(shutdown.subscribe()),
    );

    tokio::time::sleep(window).await;
    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_informer_backs_off_when_watch_closes_immediately() {
    let (addr, lists) = counting_backend("").await;

    let events = run_informer_for(addr, 200, 1_000, Duration::from_secs(1)).await;

    // Delays of ~200ms, ~400ms, ~800ms leave room for about three lists.
    let lists = lists.load(Ordering::SeqCst);
    assert!(lists >= 2, "expected a relist, saw {lists}");
    assert!(lists <= 5, "watch reopened without backoff: {lists} lists");
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], LifecycleEvent::Added(_)));
}

#[tokio::test]
async fn test_informer_relists_after_error_event() {
    let gone = concat!(
        r#"{"type":"ERROR","object":{"kind":"Status","code":410,"reason":"Expired","#,
        r#""message":"too old resource version"}}"#,
        "\n"
    );
    let (addr, lists) = counting_backend(gone).await;

    let events = run_informer_for(addr, 50, 200, Duration::from_secs(1)).await;

    let lists = lists.load(Ordering::SeqCst);
    assert!(lists >= 3, "expected relists after 410, saw {lists}");
    assert!(lists <= 20, "relist not backed off: {lists} lists");
    // The store survives relists, so the unchanged object is announced once.
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], LifecycleEvent::Added(_)));
}
