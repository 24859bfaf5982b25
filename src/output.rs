//! The JSON envelope every command prints on stdout.

use serde::Serialize;
use serde_json::Value;
use wacli_core::error::WacliError;

/// `{"success": bool, "data": ..., "error": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
}

impl Envelope {
    pub fn success<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                success: true,
                data,
                error: None,
            },
            Err(e) => Self::failure(&WacliError::from(e)),
        }
    }

    pub fn failure(err: &WacliError) -> Self {
        Self::error_message(err.to_string())
    }

    /// A failure with a non-empty message.
    pub fn error_message(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "unknown error".to_string();
        }
        Self {
            success: false,
            data: Value::Null,
            error: Some(message),
        }
    }

    pub fn from_result<T: Serialize>(result: Result<T, WacliError>) -> Self {
        match result {
            Ok(data) => Self::success(&data),
            Err(e) => Self::failure(&e),
        }
    }

    /// Process exit status for this envelope.
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }

    /// Single-line JSON rendering.
    pub fn render(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"success":false,"data":null,"error":{}}}"#,
                Value::String(format!("failed to render response: {e}"))
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_shape() {
        let env = Envelope::success(&json!({"version": "1.0.0"}));
        assert_eq!(
            env.render(),
            r#"{"success":true,"data":{"version":"1.0.0"},"error":null}"#
        );
        assert_eq!(env.exit_code(), 0);
    }

    #[test]
    fn test_empty_list_is_not_null() {
        let env = Envelope::success(&Vec::<String>::new());
        let parsed: Value = serde_json::from_str(&env.render()).unwrap();
        assert_eq!(parsed["data"], json!([]));
    }

    #[test]
    fn test_failure_envelope_shape() {
        let env = Envelope::failure(&WacliError::Validation("message ID is required".into()));
        assert_eq!(
            env.render(),
            r#"{"success":false,"data":null,"error":"message ID is required"}"#
        );
        assert_eq!(env.exit_code(), 1);
    }

    #[test]
    fn test_failure_message_never_empty() {
        let env = Envelope::error_message("  ");
        assert_eq!(env.error.as_deref(), Some("unknown error"));
    }

    #[test]
    fn test_render_is_single_line() {
        let env = Envelope::success(&json!({"text": "line one\nline two"}));
        assert!(!env.render().contains('\n'));
    }
}
