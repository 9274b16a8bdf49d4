//! Health probes for running services.
//!
//! A probe never fails loudly: an unreachable port, a timeout and a non-2xx
//! response all just mean "unhealthy".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use flotilla_core::{
    DEFAULT_HEALTH_PATH, EventSink, HealthReport, ServiceRegistry, ServiceStatus,
    SupervisorEvent,
};
use futures_util::Stream;
use futures_util::future::join_all;
use reqwest::Client;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::status::StatusTracker;

/// A single liveness check against a local port.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Return true if the service on `port` answers `path` as healthy.
    async fn probe(&self, port: u16, path: &str) -> bool;
}

/// HTTP GET on `127.0.0.1`; only a 2xx counts as healthy.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build health check client, using defaults");
                Client::new()
            });
        Self { client }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, port: u16, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        let url = format!("http://127.0.0.1:{port}/{path}");

        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(%url, status = %response.status(), "Health check returned non-success status");
                false
            }
            Err(e) => {
                debug!(%url, error = %e, "Health check failed");
                false
            }
        }
    }
}

/// Checks every service in a status snapshot.
pub struct HealthChecker {
    probe: Arc<dyn HealthProbe>,
    paths: HashMap<String, String>,
}

impl HealthChecker {
    /// Create a checker using each definition's health path.
    pub fn new(registry: &ServiceRegistry, probe: Arc<dyn HealthProbe>) -> Self {
        let paths = registry
            .definitions()
            .iter()
            .map(|def| (def.name.clone(), def.effective_health_path().to_string()))
            .collect();
        Self { probe, paths }
    }

    /// Probe all Running services with a port, concurrently.
    ///
    /// Services that are not Running, or have no port, are reported
    /// unhealthy without a probe.
    pub async fn check_all(&self, statuses: &[ServiceStatus]) -> HealthReport {
        let checks = statuses.iter().map(|status| async move {
            let healthy = match status.port {
                Some(port) if status.is_running() => {
                    let path = self
                        .paths
                        .get(&status.name)
                        .map_or(DEFAULT_HEALTH_PATH, String::as_str);
                    self.probe.probe(port, path).await
                }
                _ => false,
            };
            (status.name.clone(), healthy)
        });

        join_all(checks).await.into_iter().collect()
    }
}

impl std::fmt::Debug for HealthChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthChecker")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

/// Periodic health monitor.
///
/// Polls at a fixed interval and yields only when the report changes,
/// publishing each change as a `SupervisorEvent::Health`.
pub struct HealthMonitor {
    checker: Arc<HealthChecker>,
    tracker: Arc<StatusTracker>,
    sink: Arc<dyn EventSink>,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl HealthMonitor {
    pub fn new(
        checker: Arc<HealthChecker>,
        tracker: Arc<StatusTracker>,
        sink: Arc<dyn EventSink>,
        check_interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            checker,
            tracker,
            sink,
            interval: check_interval,
            cancel_token,
        }
    }

    /// Start monitoring. The stream completes when the token is cancelled.
    pub fn monitor(self) -> impl Stream<Item = HealthReport> {
        let Self {
            checker,
            tracker,
            sink,
            interval: check_interval,
            cancel_token,
        } = self;

        stream! {
            let mut ticker = interval(check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut last_report: Option<HealthReport> = None;
            debug!(interval_ms = check_interval.as_millis(), "Starting health monitor");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = checker.check_all(&tracker.get_all()).await;

                        if last_report.as_ref() != Some(&report) {
                            debug!(?report, "Health report changed");
                            sink.emit(SupervisorEvent::Health { report: report.clone() });
                            yield report.clone();
                            last_report = Some(report);
                        }
                    }
                    () = cancel_token.cancelled() => {
                        debug!("Health monitor cancelled");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusPatch;
    use flotilla_core::{NoopSink, ServiceDefinition};
    use futures_util::StreamExt;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Probe that answers from a fixed table and records what it was asked.
    #[derive(Default)]
    struct FakeProbe {
        healthy_ports: Vec<u16>,
        calls: Mutex<Vec<(u16, String)>>,
    }

    #[async_trait]
    impl HealthProbe for FakeProbe {
        async fn probe(&self, port: u16, path: &str) -> bool {
            self.calls.lock().unwrap().push((port, path.to_string()));
            self.healthy_ports.contains(&port)
        }
    }

    fn registry() -> ServiceRegistry {
        ServiceRegistry::new(vec![
            ServiceDefinition::managed("api", "api").with_port(8000),
            ServiceDefinition::managed("worker", "worker")
                .with_port(8001)
                .with_health_path("/ping"),
            ServiceDefinition::managed("idle", "idle").with_port(8002),
        ])
        .unwrap()
    }

    fn running(name: &str, port: Option<u16>) -> ServiceStatus {
        let mut status = ServiceStatus::stopped(name);
        StatusPatch::Starting {
            started_at: chrono::Utc::now(),
        }
        .apply(&mut status);
        StatusPatch::Running { pid: Some(1), port }.apply(&mut status);
        status
    }

    /// Serve one canned HTTP response per connection.
    async fn serve(status_line: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response =
                    format!("HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        port
    }

    #[tokio::test]
    async fn test_non_running_services_unhealthy_without_probe() {
        let probe = Arc::new(FakeProbe {
            healthy_ports: vec![8000, 8001, 8002],
            ..FakeProbe::default()
        });
        let checker = HealthChecker::new(&registry(), probe.clone());

        let statuses = vec![
            running("api", Some(8000)),
            running("worker", None),
            ServiceStatus::stopped("idle"),
        ];
        let report = checker.check_all(&statuses).await;

        assert_eq!(report.get("api"), Some(&true));
        assert_eq!(report.get("worker"), Some(&false));
        assert_eq!(report.get("idle"), Some(&false));
        assert_eq!(*probe.calls.lock().unwrap(), vec![(8000, "/health".to_string())]);
    }

    #[tokio::test]
    async fn test_probe_uses_service_health_path() {
        let probe = Arc::new(FakeProbe::default());
        let checker = HealthChecker::new(&registry(), probe.clone());

        let report = checker.check_all(&[running("worker", Some(8001))]).await;

        assert_eq!(report.get("worker"), Some(&false));
        assert_eq!(*probe.calls.lock().unwrap(), vec![(8001, "/ping".to_string())]);
    }

    #[tokio::test]
    async fn test_http_probe_success() {
        let port = serve("200 OK").await;
        let probe = HttpProbe::new(Duration::from_secs(2));
        assert!(probe.probe(port, "/health").await);
    }

    #[tokio::test]
    async fn test_http_probe_non_success_status() {
        let port = serve("503 Service Unavailable").await;
        let probe = HttpProbe::new(Duration::from_secs(2));
        assert!(!probe.probe(port, "health").await);
    }

    #[tokio::test]
    async fn test_http_probe_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = HttpProbe::new(Duration::from_millis(500));
        assert!(!probe.probe(port, "/health").await);
    }

    #[tokio::test]
    async fn test_monitor_yields_only_on_change() {
        let registry = registry();
        let probe = Arc::new(FakeProbe {
            healthy_ports: vec![8000],
            ..FakeProbe::default()
        });
        let checker = Arc::new(HealthChecker::new(&registry, probe));
        let tracker = Arc::new(StatusTracker::new(registry.names(), Arc::new(NoopSink)));
        let cancel = CancellationToken::new();

        let monitor = HealthMonitor::new(
            checker,
            Arc::clone(&tracker),
            Arc::new(NoopSink),
            Duration::from_millis(10),
            cancel.clone(),
        );
        let mut stream = Box::pin(monitor.monitor());

        let first = stream.next().await.unwrap();
        assert!(first.values().all(|healthy| !healthy));

        tracker.set_state(
            "api",
            StatusPatch::Starting {
                started_at: chrono::Utc::now(),
            },
        );
        tracker.set_state(
            "api",
            StatusPatch::Running {
                pid: Some(1),
                port: Some(8000),
            },
        );

        let second = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.get("api"), Some(&true));

        cancel.cancel();
        let end = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap();
        assert!(end.is_none());
    }
}
