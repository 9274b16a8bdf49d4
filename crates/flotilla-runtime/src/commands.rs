//! Command surface for host UIs.
//!
//! A host forwards a `SupervisorCommand` (usually deserialized from JSON) and
//! relays the `CommandResponse` back. Events flow separately through the
//! broadcaster.

use flotilla_core::SupervisorError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::supervisor::ProcessSupervisor;

/// A lifecycle request from the UI boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum SupervisorCommand {
    StartAll,
    StopAll,
    Start { service: String },
    Stop { service: String },
    Restart { service: String },
    /// One service, or all of them when `service` is absent.
    Status {
        #[serde(default)]
        service: Option<String>,
    },
    CheckHealth,
}

/// Serializable error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl From<&SupervisorError> for CommandError {
    fn from(err: &SupervisorError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            service: err.service().map(str::to_string),
        }
    }
}

/// Result of one command: `{ok: true, data}` or `{ok: false, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandError>,
}

impl CommandResponse {
    pub fn success(data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                ok: true,
                data: Some(data),
                error: None,
            },
            Err(e) => Self::failure(&SupervisorError::Internal(format!(
                "failed to serialize response: {e}"
            ))),
        }
    }

    pub fn failure(err: &SupervisorError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(CommandError::from(err)),
        }
    }

    /// Response for input that could not be parsed as a command.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(CommandError {
                kind: "invalidCommand".to_string(),
                message: message.into(),
                service: None,
            }),
        }
    }

    fn from_result<T: Serialize>(result: Result<T, SupervisorError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(err) => Self::failure(&err),
        }
    }
}

impl ProcessSupervisor {
    /// Execute one command and build its response.
    pub async fn dispatch(&self, command: SupervisorCommand) -> CommandResponse {
        debug!(?command, "Dispatching command");
        match command {
            SupervisorCommand::StartAll => CommandResponse::from_result(self.start_all().await),
            SupervisorCommand::StopAll => CommandResponse::success(self.stop_all().await),
            SupervisorCommand::Start { service } => {
                CommandResponse::from_result(self.start(&service).await)
            }
            SupervisorCommand::Stop { service } => {
                CommandResponse::from_result(self.stop(&service).await)
            }
            SupervisorCommand::Restart { service } => {
                CommandResponse::from_result(self.restart(&service).await)
            }
            SupervisorCommand::Status { service: Some(service) } => {
                CommandResponse::from_result(self.status(&service))
            }
            SupervisorCommand::Status { service: None } => {
                CommandResponse::success(self.status_all())
            }
            SupervisorCommand::CheckHealth => CommandResponse::success(self.check_health().await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_core::{ServiceDefinition, ServiceRegistry, SupervisorSettings};
    use serde_json::json;

    fn supervisor() -> ProcessSupervisor {
        let registry = ServiceRegistry::new(vec![
            ServiceDefinition::external("frontend", 5173),
            ServiceDefinition::external("docs", 3000),
        ])
        .unwrap();
        ProcessSupervisor::new(registry, SupervisorSettings::with_defaults())
    }

    #[test]
    fn test_command_wire_format() {
        let cmd: SupervisorCommand =
            serde_json::from_value(json!({"command": "restart", "service": "api"})).unwrap();
        assert_eq!(
            cmd,
            SupervisorCommand::Restart {
                service: "api".to_string()
            }
        );

        let cmd: SupervisorCommand = serde_json::from_value(json!({"command": "status"})).unwrap();
        assert_eq!(cmd, SupervisorCommand::Status { service: None });

        let cmd: SupervisorCommand =
            serde_json::from_value(json!({"command": "checkHealth"})).unwrap();
        assert_eq!(cmd, SupervisorCommand::CheckHealth);

        assert!(serde_json::from_value::<SupervisorCommand>(json!({"command": "start"})).is_err());
    }

    #[tokio::test]
    async fn test_unknown_service_error_payload() {
        let response = supervisor()
            .dispatch(SupervisorCommand::Stop {
                service: "ghost".to_string(),
            })
            .await;

        assert!(!response.ok);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "ok": false,
                "error": {
                    "kind": "unknownService",
                    "message": "Unknown service: ghost",
                    "service": "ghost"
                }
            })
        );
    }

    #[tokio::test]
    async fn test_start_all_then_status() {
        let sup = supervisor();

        let response = sup.dispatch(SupervisorCommand::StartAll).await;
        assert!(response.ok);
        let data = response.data.unwrap();
        assert_eq!(data[0]["name"], "frontend");
        assert_eq!(data[0]["state"], "running");
        assert_eq!(data[1]["port"], 3000);

        let response = sup
            .dispatch(SupervisorCommand::Status {
                service: Some("docs".to_string()),
            })
            .await;
        assert_eq!(response.data.unwrap()["state"], "running");

        let response = sup.dispatch(SupervisorCommand::StopAll).await;
        assert!(response.ok);
        assert_eq!(response.data.unwrap()[1]["state"], "stopped");
    }

    #[test]
    fn test_invalid_command_response() {
        let response = CommandResponse::invalid("expected value at line 1 column 1");
        assert_eq!(response.error.unwrap().kind, "invalidCommand");
    }
}
