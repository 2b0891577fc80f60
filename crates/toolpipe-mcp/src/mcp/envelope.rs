use serde::Serialize;
use toolpipe_core::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    InvalidParams,
    InvalidUrl,
    NotSupported,
    FetchFailed,
    SearchFailed,
    ToolFailed,
    UnexpectedError,
}

impl ErrorCode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParams => "invalid_params",
            Self::InvalidUrl => "invalid_url",
            Self::NotSupported => "not_supported",
            Self::FetchFailed => "fetch_failed",
            Self::SearchFailed => "search_failed",
            Self::ToolFailed => "tool_failed",
            Self::UnexpectedError => "unexpected_error",
        }
    }

    pub(crate) fn retryable(self) -> bool {
        match self {
            Self::FetchFailed | Self::SearchFailed => true,
            // Bad input and deterministic tool errors fail the same way on retry.
            Self::InvalidParams
            | Self::InvalidUrl
            | Self::NotSupported
            | Self::ToolFailed
            | Self::UnexpectedError => false,
        }
    }

    pub(crate) fn from_error(e: &Error) -> Self {
        match e {
            Error::InvalidParams(_) => Self::InvalidParams,
            Error::InvalidUrl(_) => Self::InvalidUrl,
            Error::NotSupported(_) => Self::NotSupported,
            Error::Fetch(_) => Self::FetchFailed,
            Error::Timeout(_) | Error::Blocked | Error::Http(_) | Error::Transport(_) => {
                Self::SearchFailed
            }
            Error::Tool(_) => Self::ToolFailed,
        }
    }
}

pub(crate) fn add_envelope_fields(payload: &mut serde_json::Value, kind: &str, elapsed_ms: u128) {
    payload["schema_version"] = serde_json::json!(super::SCHEMA_VERSION);
    payload["kind"] = serde_json::json!(kind);
    payload["elapsed_ms"] = serde_json::json!(elapsed_ms);
}

pub(crate) fn error_obj(
    code: ErrorCode,
    message: impl ToString,
    hint: impl ToString,
) -> serde_json::Value {
    #[derive(Serialize)]
    struct ErrorObject {
        code: &'static str,
        message: String,
        hint: String,
        retryable: bool,
    }

    let e = ErrorObject {
        code: code.as_str(),
        message: message.to_string(),
        hint: hint.to_string(),
        retryable: code.retryable(),
    };
    match serde_json::to_value(e) {
        Ok(v) => v,
        Err(_) => serde_json::json!({
            "code": code.as_str(),
            "message": message.to_string(),
            "hint": hint.to_string(),
            "retryable": code.retryable()
        }),
    }
}

pub(crate) fn hint_for(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::InvalidParams => "Check the argument names and ranges in the tool schema.",
        ErrorCode::InvalidUrl => "Pass an absolute URL starting with http:// or https://.",
        ErrorCode::NotSupported => "This operation is not available in this build.",
        ErrorCode::FetchFailed => {
            "The target could not be fetched. Check the URL, or retry if the host was briefly unavailable."
        }
        ErrorCode::SearchFailed => {
            "DuckDuckGo did not return usable results. Retry later, or rephrase the query."
        }
        ErrorCode::ToolFailed => "The input was understood but produced no usable value.",
        ErrorCode::UnexpectedError => "Unexpected internal error.",
    }
}

/// Failure payload for the non-search tools: the flat `{success:false, error}` shape chat clients
/// read, plus a structured `details` object for machine consumers.
pub(crate) fn failure(e: &Error) -> serde_json::Value {
    let code = ErrorCode::from_error(e);
    let message = e.to_string();
    serde_json::json!({
        "success": false,
        "error": message,
        "details": error_obj(code, &message, hint_for(code)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_error_kind() {
        assert_eq!(
            ErrorCode::from_error(&Error::InvalidUrl("x".into())),
            ErrorCode::InvalidUrl
        );
        assert_eq!(ErrorCode::from_error(&Error::Blocked), ErrorCode::SearchFailed);
        assert_eq!(
            ErrorCode::from_error(&Error::Tool("empty expression".into())),
            ErrorCode::ToolFailed
        );
        assert!(ErrorCode::FetchFailed.retryable());
        assert!(!ErrorCode::InvalidParams.retryable());
    }

    #[test]
    fn failure_keeps_flat_error_string() {
        let v = failure(&Error::Fetch("HTTP 404: Not Found".into()));
        assert_eq!(v["success"], false);
        assert_eq!(v["error"], "HTTP 404: Not Found");
        assert_eq!(v["details"]["code"], "fetch_failed");
        assert_eq!(v["details"]["retryable"], true);
        assert!(!v["details"]["hint"].as_str().unwrap_or("").is_empty());
    }
}
