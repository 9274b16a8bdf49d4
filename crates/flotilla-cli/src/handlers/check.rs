//! Check command handler: one-shot start, health report, stop.

use anyhow::{Result, bail};
use flotilla_core::{HealthReport, ServiceStatus};
use tracing::warn;

use crate::bootstrap::CliContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Healthy,
    Unhealthy,
    /// Running but with no port to check, e.g. a background worker.
    NoPort,
}

impl Verdict {
    fn label(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::NoPort => "running (no port, not checked)",
        }
    }
}

/// Start everything, check health once, stop everything.
///
/// Fails if the start sequence aborts or any service with a port is
/// unhealthy. Running services without a port are listed but not counted.
pub async fn execute(ctx: &CliContext) -> Result<()> {
    let supervisor = ctx.supervisor();

    if let Err(err) = supervisor.start_all().await {
        supervisor.shutdown().await;
        bail!(err);
    }

    let report = supervisor.check_health().await;
    let statuses = supervisor.status_all();
    supervisor.shutdown().await;

    let verdicts = verdicts(&report, &statuses);
    for (name, verdict) in &verdicts {
        println!("{name:<20} {}", verdict.label());
    }

    let checked = verdicts.iter().filter(|(_, v)| *v != Verdict::NoPort).count();
    let unhealthy = verdicts.iter().filter(|(_, v)| *v == Verdict::Unhealthy).count();
    if unhealthy > 0 {
        warn!(unhealthy, "Health check found unhealthy services");
        bail!("{unhealthy} of {checked} checked service(s) unhealthy");
    }
    Ok(())
}

fn verdicts(report: &HealthReport, statuses: &[ServiceStatus]) -> Vec<(String, Verdict)> {
    report
        .iter()
        .map(|(name, &healthy)| {
            let portless_running = statuses
                .iter()
                .find(|s| &s.name == name)
                .is_some_and(|s| s.is_running() && s.port.is_none());
            let verdict = match (healthy, portless_running) {
                (true, _) => Verdict::Healthy,
                (false, true) => Verdict::NoPort,
                (false, false) => Verdict::Unhealthy,
            };
            (name.clone(), verdict)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_core::ServiceState;

    fn status(name: &str, state: ServiceState, port: Option<u16>) -> ServiceStatus {
        ServiceStatus {
            state,
            port,
            ..ServiceStatus::stopped(name)
        }
    }

    #[test]
    fn test_portless_running_service_is_not_unhealthy() {
        let statuses = vec![
            status("api", ServiceState::Running, Some(8000)),
            status("worker", ServiceState::Running, None),
            status("web", ServiceState::Running, Some(5173)),
        ];
        let report = HealthReport::from([
            ("api".to_string(), true),
            ("worker".to_string(), false),
            ("web".to_string(), false),
        ]);

        assert_eq!(
            verdicts(&report, &statuses),
            vec![
                ("api".to_string(), Verdict::Healthy),
                ("web".to_string(), Verdict::Unhealthy),
                ("worker".to_string(), Verdict::NoPort),
            ]
        );
    }

    #[test]
    fn test_failed_portless_service_is_unhealthy() {
        let statuses = [status("worker", ServiceState::Error, None)];
        let report = HealthReport::from([("worker".to_string(), false)]);

        assert_eq!(
            verdicts(&report, &statuses),
            vec![("worker".to_string(), Verdict::Unhealthy)]
        );
    }
}
