//! Wire types for the processing service and outcome classification.
//!
//! Classification decides the retry policy: only conditions that clearly
//! clear up by themselves (service unreachable, request timeout, dropped
//! connection) are transient. Authentication problems and explicit
//! rejections are terminal.

use serde::{Deserialize, Serialize};

pub const REASON_UNREACHABLE: &str = "unreachable";
pub const REASON_TIMEOUT: &str = "timeout";
pub const REASON_CONNECTION_RESET: &str = "connectionReset";
pub const REASON_AUTHENTICATION: &str = "authenticationRejected";
pub const REASON_SERVICE_REJECTED: &str = "serviceRejected";

/// Body of `POST /process`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub path: String,
    pub auth_token: Option<String>,
}

/// Body returned by `POST /process`.
///
/// Error responses carry `success: false` and an `error` string instead of
/// `message`; both are read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessResponse {
    pub success: bool,
    #[serde(default)]
    pub duplicate: bool,
    #[serde(default)]
    pub original_filename: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ProcessResponse {
    fn detail(&self) -> Option<String> {
        self.error.clone().or_else(|| self.message.clone())
    }
}

/// Classified result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Duplicate {
        original_filename: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    TransientFailure {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    TerminalFailure {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl Outcome {
    pub fn transient(reason: &str, detail: Option<String>) -> Self {
        Outcome::TransientFailure {
            reason: reason.to_string(),
            detail,
        }
    }

    pub fn terminal(reason: &str, detail: Option<String>) -> Self {
        Outcome::TerminalFailure {
            reason: reason.to_string(),
            detail,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Outcome::TransientFailure { .. })
    }

    /// `reason` or `reason: detail` for failures, `None` otherwise.
    pub fn failure_text(&self) -> Option<String> {
        match self {
            Outcome::TransientFailure { reason, detail }
            | Outcome::TerminalFailure { reason, detail } => Some(match detail {
                Some(d) if !d.is_empty() => format!("{}: {}", reason, d),
                _ => reason.clone(),
            }),
            _ => None,
        }
    }
}

/// Classify an HTTP response from `POST /process`.
pub fn classify_response(status: u16, body: &str) -> Outcome {
    let parsed = serde_json::from_str::<ProcessResponse>(body).ok();
    let detail = parsed.as_ref().and_then(ProcessResponse::detail);

    match status {
        401 | 403 => return Outcome::terminal(REASON_AUTHENTICATION, detail),
        408 | 504 => return Outcome::transient(REASON_TIMEOUT, detail),
        502 | 503 => return Outcome::transient(REASON_UNREACHABLE, detail),
        _ => {}
    }

    match parsed {
        Some(response) if (200..300).contains(&status) && response.success => {
            if response.duplicate {
                Outcome::Duplicate {
                    original_filename: response
                        .original_filename
                        .unwrap_or_else(|| "unknown".to_string()),
                    message: response.message,
                }
            } else {
                Outcome::Success {
                    message: response.message,
                }
            }
        }
        Some(response) => match response.detail() {
            Some(text) => classify_error_text(&text),
            None => Outcome::terminal(REASON_SERVICE_REJECTED, None),
        },
        None if (200..300).contains(&status) => Outcome::terminal(
            REASON_SERVICE_REJECTED,
            Some("malformed response body".to_string()),
        ),
        None => Outcome::terminal(REASON_SERVICE_REJECTED, Some(format!("HTTP {}", status))),
    }
}

/// Classify the error text of a non-success response.
///
/// Authentication wins over connectivity when both appear.
pub fn classify_error_text(text: &str) -> Outcome {
    let lower = text.to_lowercase();
    let detail = Some(text.to_string());

    const AUTH_MARKERS: &[&str] = &[
        "authentication",
        "unauthorized",
        "unauthorised",
        "forbidden",
        "auth token",
        "invalid token",
        "expired token",
        "token expired",
        "missing token",
        "token is required",
        "credential",
    ];
    const TIMEOUT_MARKERS: &[&str] = &["timed out", "timeout"];
    const CONNECTION_MARKERS: &[&str] = &[
        "connection reset",
        "connection refused",
        "connection aborted",
        "connectionerror",
        "broken pipe",
    ];

    if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
        Outcome::terminal(REASON_AUTHENTICATION, detail)
    } else if TIMEOUT_MARKERS.iter().any(|m| lower.contains(m)) {
        Outcome::transient(REASON_TIMEOUT, detail)
    } else if CONNECTION_MARKERS.iter().any(|m| lower.contains(m)) {
        Outcome::transient(REASON_CONNECTION_RESET, detail)
    } else {
        Outcome::terminal(REASON_SERVICE_REJECTED, detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_and_duplicate() {
        let ok = classify_response(
            200,
            r#"{"success": true, "duplicate": false, "message": "File 'a.pdf' uploaded successfully"}"#,
        );
        assert_eq!(
            ok,
            Outcome::Success {
                message: Some("File 'a.pdf' uploaded successfully".into())
            }
        );

        let dup = classify_response(
            200,
            r#"{"success": true, "duplicate": true, "original_filename": "b_v1.zip", "file_hash": "ab12"}"#,
        );
        assert_eq!(
            dup,
            Outcome::Duplicate {
                original_filename: "b_v1.zip".into(),
                message: None
            }
        );
    }

    #[test]
    fn test_duplicate_without_original_name() {
        let dup = classify_response(200, r#"{"success": true, "duplicate": true}"#);
        assert!(matches!(dup, Outcome::Duplicate { ref original_filename, .. } if original_filename == "unknown"));
    }

    #[test]
    fn test_auth_is_terminal() {
        let by_status = classify_response(401, r#"{"success": false, "error": "bad"}"#);
        assert!(matches!(by_status, Outcome::TerminalFailure { ref reason, .. } if reason == REASON_AUTHENTICATION));

        let by_text = classify_response(
            400,
            r#"{"success": false, "error": "Authentication token is required"}"#,
        );
        assert!(matches!(by_text, Outcome::TerminalFailure { ref reason, .. } if reason == REASON_AUTHENTICATION));

        let expired = classify_error_text("Invalid token: signature has expired");
        assert!(matches!(expired, Outcome::TerminalFailure { ref reason, .. } if reason == REASON_AUTHENTICATION));
    }

    #[test]
    fn test_unrelated_token_text_is_not_auth() {
        let parse = classify_response(
            400,
            r#"{"success": false, "error": "Unexpected token '<' in manifest"}"#,
        );
        assert_eq!(
            parse.failure_text().unwrap(),
            "serviceRejected: Unexpected token '<' in manifest"
        );
    }

    #[test]
    fn test_connectivity_errors_are_transient() {
        let timeout = classify_response(
            200,
            r#"{"success": false, "error": "Upload request failed: Read timed out. (read timeout=120)"}"#,
        );
        assert!(matches!(timeout, Outcome::TransientFailure { ref reason, .. } if reason == REASON_TIMEOUT));

        let reset = classify_response(
            500,
            r#"{"success": false, "error": "Connection reset by peer"}"#,
        );
        assert!(matches!(reset, Outcome::TransientFailure { ref reason, .. } if reason == REASON_CONNECTION_RESET));

        assert!(classify_response(503, "").is_transient());
        assert!(classify_response(504, "<html>gateway</html>").is_transient());
    }

    #[test]
    fn test_other_failures_are_service_rejected() {
        let not_found = classify_response(
            404,
            r#"{"success": false, "error": "File not found: /tmp/a.pdf"}"#,
        );
        assert_eq!(
            not_found.failure_text().unwrap(),
            "serviceRejected: File not found: /tmp/a.pdf"
        );

        let bare = classify_response(500, "Internal Server Error");
        assert_eq!(bare.failure_text().unwrap(), "serviceRejected: HTTP 500");

        let malformed = classify_response(200, "{\"ok\":");
        assert!(matches!(malformed, Outcome::TerminalFailure { ref reason, .. } if reason == REASON_SERVICE_REJECTED));

        let silent = classify_response(200, r#"{"success": false}"#);
        assert_eq!(silent.failure_text().unwrap(), "serviceRejected");
    }

    #[test]
    fn test_request_wire_format() {
        let body = serde_json::to_value(ProcessRequest {
            path: "/tmp/a.pdf".into(),
            auth_token: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"path": "/tmp/a.pdf", "auth_token": null}));
    }
}
