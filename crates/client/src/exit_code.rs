// Consistent exit codes for the docket CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   10 = document not found
//   11 = validation failed
//   12 = conflict (stale modifiedAt)
//   13 = network error

use std::process;

use crate::http::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    NotFound = 10,
    Validation = 11,
    Conflict = 12,
    Network = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(client_error) = cause.downcast_ref::<ClientError>() {
                return match client_error {
                    ClientError::Conflict { .. } => Self::Conflict,
                    ClientError::Api { code, .. } => Self::from_api_code(code),
                    ClientError::Transport(_) => Self::Network,
                    ClientError::InvalidUrl(_) => Self::Usage,
                    ClientError::Cancelled => Self::Error,
                };
            }
            if cause.downcast_ref::<serde_json::Error>().is_some() {
                return Self::Usage;
            }
        }
        Self::Error
    }

    /// Map a server error code to an exit code.
    pub fn from_api_code(code: &str) -> Self {
        match code {
            "NOT_FOUND" => Self::NotFound,
            "VALIDATION_FAILED" | "RECONCILIATION_FAILED" => Self::Validation,
            "OPTIMISTIC_LOCK_ERROR" => Self::Conflict,
            _ => Self::Error,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: &str) -> anyhow::Error {
        anyhow::Error::new(ClientError::Api {
            status: 400,
            code: code.to_string(),
            message: "rejected".to_string(),
            retryable: false,
            details: serde_json::Value::Null,
        })
    }

    #[test]
    fn exit_code_values() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::Error.code(), 1);
        assert_eq!(ExitCode::Usage.code(), 2);
        assert_eq!(ExitCode::NotFound.code(), 10);
        assert_eq!(ExitCode::Validation.code(), 11);
        assert_eq!(ExitCode::Conflict.code(), 12);
        assert_eq!(ExitCode::Network.code(), 13);
    }

    #[test]
    fn from_api_code_maps_server_codes() {
        assert_eq!(ExitCode::from_api_code("NOT_FOUND"), ExitCode::NotFound);
        assert_eq!(ExitCode::from_api_code("VALIDATION_FAILED"), ExitCode::Validation);
        assert_eq!(ExitCode::from_api_code("RECONCILIATION_FAILED"), ExitCode::Validation);
        assert_eq!(ExitCode::from_api_code("INTERNAL_ERROR"), ExitCode::Error);
    }

    #[test]
    fn from_error_finds_client_error_under_context() {
        let err = api_error("NOT_FOUND").context("failed to load quotation");
        assert_eq!(ExitCode::from_error(&err), ExitCode::NotFound);

        let conflict =
            anyhow::Error::new(ClientError::Conflict { stored: None, message: "stale".into() })
                .context("save failed");
        assert_eq!(ExitCode::from_error(&conflict), ExitCode::Conflict);
    }

    #[test]
    fn malformed_snapshot_file_is_usage_error() {
        let parse_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = anyhow::Error::new(parse_error).context("invalid snapshot file");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Usage);
    }

    #[test]
    fn unknown_errors_are_general() {
        assert_eq!(ExitCode::from_error(&anyhow::anyhow!("boom")), ExitCode::Error);
    }

    #[test]
    fn converts_to_process_exit_code() {
        let _: process::ExitCode = ExitCode::Conflict.into();
    }
}
