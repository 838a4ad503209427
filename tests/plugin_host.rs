//! Plugin process tests against the bundled status-only plugin binary.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};

use proxiff::comparator::{Comparator, Response};
use proxiff::config::{PluginConfig, ProxyConfig};
use proxiff::lifecycle::{self, load_comparator, Shutdown, StartupError};
use proxiff::plugin::{HandshakeConfig, PluginError, PluginHost, PluginState, PROTOCOL_VERSION};

mod common;

use common::{client, MockBackend};

const STATUS_PLUGIN: &str = env!("CARGO_BIN_EXE_proxiff-status-plugin");
const START_TIMEOUT: Duration = Duration::from_secs(10);

fn response(status: u16, body: &'static str) -> Arc<Response> {
    let mut headers = HeaderMap::new();
    headers.append("x-dup", "1".parse().unwrap());
    headers.append("x-dup", "2".parse().unwrap());
    Arc::new(Response::new(status, headers, body))
}

#[tokio::test]
async fn test_status_plugin_compares_over_the_channel() {
    let (mut host, comparator) =
        PluginHost::launch(STATUS_PLUGIN, &HandshakeConfig::default(), START_TIMEOUT)
            .await
            .unwrap();
    assert_eq!(host.state(), PluginState::Ready);

    let comparison = comparator
        .compare(response(200, "a"), response(500, "a"))
        .await;
    assert!(!comparison.matched());
    assert!(!comparison.is_plugin_error());
    assert_eq!(
        comparison.difference(),
        "Status code differs: newer=200, current=500"
    );
    assert_eq!(comparison.newer().status, 200);
    assert_eq!(comparison.current().status, 500);

    // Bodies are ignored by this plugin.
    let comparison = comparator
        .compare(response(201, "newer"), response(201, "current"))
        .await;
    assert!(comparison.matched());
    assert_eq!(comparison.difference(), "");

    host.shutdown().await;
    assert_eq!(host.state(), PluginState::Terminated);
    host.shutdown().await;
    assert_eq!(host.state(), PluginState::Terminated);
}

#[tokio::test]
async fn test_concurrent_calls_share_one_channel() {
    let (mut host, comparator) =
        PluginHost::launch(STATUS_PLUGIN, &HandshakeConfig::default(), START_TIMEOUT)
            .await
            .unwrap();

    let calls = (0..16u16).map(|i| {
        let comparator = comparator.clone();
        tokio::spawn(async move {
            let status = 200 + i;
            (status, comparator.compare(response(status, "x"), response(200, "x")).await)
        })
    });

    for call in calls {
        let (status, comparison) = call.await.unwrap();
        assert_eq!(comparison.newer().status, status);
        assert_eq!(comparison.matched(), status == 200);
    }

    host.shutdown().await;
}

#[tokio::test]
async fn test_calls_after_shutdown_are_plugin_errors() {
    let (mut host, comparator) =
        PluginHost::launch(STATUS_PLUGIN, &HandshakeConfig::default(), START_TIMEOUT)
            .await
            .unwrap();
    host.shutdown().await;

    let comparison = tokio::time::timeout(
        Duration::from_secs(5),
        comparator.compare(response(200, "a"), response(200, "a")),
    )
    .await
    .unwrap();

    assert!(!comparison.matched());
    assert!(comparison.is_plugin_error());
    assert!(comparison.difference().starts_with("plugin error: "));
}

#[tokio::test]
async fn test_proxy_uses_plugin_verdict() {
    let newer = MockBackend::start(200, &[], "newer body").await;
    let current = MockBackend::start(200, &[], "current body").await;

    let plugin = PluginConfig {
        path: Some(STATUS_PLUGIN.into()),
        ..Default::default()
    };
    let mut loaded = load_comparator(&plugin).await.unwrap();
    assert!(loaded.host.is_some());

    let recorder = Arc::new(Recorder::new(loaded.comparator.clone()));
    let (addr, shutdown) = common::start_proxy(&newer.url(), &current.url(), recorder.clone()).await;

    let response = client()
        .get(format!("http://{}/", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "current body");
    assert_eq!(recorder.matched(), vec![true]);

    shutdown.trigger();
    if let Some(host) = loaded.host.as_mut() {
        host.shutdown().await;
    }
}

#[test]
fn test_plugin_refuses_to_run_without_cookie() {
    let output = std::process::Command::new(STATUS_PLUGIN)
        .env_remove("PROXIFF_PLUGIN")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("PROXIFF_PLUGIN"), "stderr: {stderr}");
}

#[test]
fn test_plugin_refuses_to_run_with_wrong_cookie() {
    let output = std::process::Command::new(STATUS_PLUGIN)
        .env("PROXIFF_PLUGIN", "wrong")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("PROXIFF_PLUGIN"), "stderr: {stderr}");
}

#[cfg(unix)]
#[tokio::test]
async fn test_silent_plugin_times_out_and_is_killed() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pid");
    let script = dir.path().join("silent-plugin");
    std::fs::write(
        &script,
        format!("#!/bin/sh\necho $$ > '{}'\nexec sleep 30\n", pid_file.display()),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let err = PluginHost::launch(&script, &HandshakeConfig::default(), Duration::from_secs(2))
        .await
        .err()
        .unwrap();
    assert!(
        matches!(err, PluginError::HandshakeTimeout(limit) if limit == Duration::from_secs(2)),
        "unexpected error: {err}"
    );

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    let alive = std::process::Command::new("sh")
        .args(["-c", &format!("kill -0 {}", pid.trim())])
        .stderr(std::process::Stdio::null())
        .status()
        .unwrap();
    assert!(!alive.success(), "plugin process {} still running", pid.trim());
}

#[cfg(unix)]
#[tokio::test]
async fn test_plugin_exit_before_handshake_fails_startup_without_listener() {
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut config = ProxyConfig::default();
    config.listener.bind_address = format!("127.0.0.1:{port}");
    config.backends.newer = "http://127.0.0.1:8082".into();
    config.backends.current = "http://127.0.0.1:8081".into();
    config.plugin.path = Some("/bin/false".into());

    let err = lifecycle::run(config, Shutdown::new()).await.unwrap_err();
    assert!(
        matches!(err, StartupError::Plugin(PluginError::ExitedBeforeHandshake { .. })),
        "unexpected error: {err}"
    );
    assert!(tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn test_version_mismatch_fails_launch() {
    use proxiff::plugin::HandshakeError;
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("old-plugin");
    std::fs::write(
        &script,
        format!("#!/bin/sh\necho '{}|tcp|127.0.0.1:1'\nsleep 5\n", PROTOCOL_VERSION + 1),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let err = PluginHost::launch(&script, &HandshakeConfig::default(), START_TIMEOUT)
        .await
        .err()
        .unwrap();
    match err {
        PluginError::Handshake(e) => assert_eq!(
            e,
            HandshakeError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: PROTOCOL_VERSION + 1,
            }
        ),
        other => panic!("unexpected error: {other}"),
    }
}

/// Wraps the plugin comparator so the test can see its verdicts.
struct Recorder {
    inner: Arc<dyn Comparator>,
    matched: std::sync::Mutex<Vec<bool>>,
}

impl Recorder {
    fn new(inner: Arc<dyn Comparator>) -> Self {
        Self {
            inner,
            matched: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn matched(&self) -> Vec<bool> {
        self.matched.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Comparator for Recorder {
    async fn compare(&self, newer: Arc<Response>, current: Arc<Response>) -> proxiff::Comparison {
        let comparison = self.inner.compare(newer, current).await;
        self.matched.lock().unwrap().push(comparison.matched());
        comparison
    }
}
