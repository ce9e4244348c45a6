use std::collections::HashMap;

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::Value;

use crate::store::StoreError;

/// Errors caused by the request itself rather than by the server. Each one
/// knows the status it should be answered with.
pub trait ApiRequestError: std::error::Error {
    fn status_code(&self) -> StatusCode;
}

#[derive(Debug)]
pub enum ServerError {
    StoreError(StoreError),
}

impl Serialize for ServerError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        use serde::ser::SerializeMap;
        match self {
            ServerError::StoreError(e) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("message", &e.to_string())?;
                map.end()
            }
        }
    }
}

#[derive(Debug)]
pub enum AppError {
    ServerError {
        error: ServerError,

        #[cfg(debug_assertions)]
        backtrace: Option<backtrace::Backtrace>,
    },
    RequestError {
        status: StatusCode,
        msg: String,
        debug_info: Option<HashMap<&'static str, Value>>,
    },
    Unhandled(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        (msg.into(), StatusCode::NOT_FOUND).into()
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        (msg.into(), StatusCode::BAD_REQUEST).into()
    }

    /// Attaches extra context to a request error. Other variants are left
    /// untouched.
    pub fn with_debug_info(mut self, key: &'static str, value: Value) -> Self {
        if let AppError::RequestError { debug_info, .. } = &mut self {
            debug_info.get_or_insert_with(HashMap::new).insert(key, value);
        }
        self
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ServerError { .. } | AppError::Unhandled(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::RequestError { status, .. } => *status,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    debug_info: Option<HashMap<&'static str, Value>>,
}

fn status_code_name(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("ERR")
        .to_uppercase()
        .replace(' ', "_")
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status_code, error_response) = match self {
            AppError::ServerError {
                error,
                #[cfg(debug_assertions)]
                backtrace,
            } => {
                tracing::error!(?error, "request failed with a server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    #[cfg(debug_assertions)]
                    {
                        let frames_info = backtrace
                            .as_ref()
                            .map(filter_backtrace)
                            .unwrap_or_default();
                        ErrorResponse {
                            code: "DATABASE_ERR".into(),
                            msg: Some("Database error".into()),
                            debug_info: Some(HashMap::from([
                                (
                                    "backtrace",
                                    serde_json::to_value(&frames_info).unwrap_or_default(),
                                ),
                                ("error", serde_json::to_value(&error).unwrap_or_default()),
                            ])),
                        }
                    },
                    #[cfg(not(debug_assertions))]
                    ErrorResponse {
                        code: "SERVER_ERR".into(),
                        msg: Some("Internal server error".into()),
                        debug_info: None,
                    },
                )
            }
            AppError::RequestError {
                status,
                msg,
                debug_info,
            } => (
                status,
                ErrorResponse {
                    code: status_code_name(status),
                    msg: Some(msg),
                    debug_info,
                },
            ),
            AppError::Unhandled(e) => {
                tracing::error!(error = %e, "unhandled error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        code: "ERR".into(),
                        msg: Some(e),
                        debug_info: None,
                    },
                )
            }
        };

        (status_code, Json(error_response)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::ServerError {
            error: ServerError::StoreError(e),

            #[cfg(debug_assertions)]
            backtrace: Some(backtrace::Backtrace::new()),
        }
    }
}

impl From<&'static str> for AppError {
    fn from(e: &'static str) -> Self {
        AppError::Unhandled(e.into())
    }
}

impl From<(&'static str, StatusCode)> for AppError {
    fn from((msg, status): (&'static str, StatusCode)) -> Self {
        (msg.to_string(), status).into()
    }
}

impl From<(String, StatusCode)> for AppError {
    fn from((msg, status): (String, StatusCode)) -> Self {
        AppError::RequestError {
            status,
            msg,
            debug_info: None,
        }
    }
}

/// Turns a typed request error into a response-ready one.
pub fn request_error<E: ApiRequestError>(e: E) -> AppError {
    (e.to_string(), e.status_code()).into()
}

#[derive(Serialize, Debug)]
struct FrameInfo {
    name: String,
    loc: String,
}

fn filter_backtrace(backtrace: &backtrace::Backtrace) -> Vec<FrameInfo> {
    const MODULE_PREFIX: &str = concat!(env!("CARGO_PKG_NAME"), "::");
    let mut frames_info: Vec<FrameInfo> = Vec::new();

    for frame in backtrace.frames() {
        for symbol in frame.symbols() {
            if let (Some(name), Some(filename), Some(lineno)) = (
                symbol.name().map(|n| n.to_string()),
                symbol.filename().map(|f| f.to_owned()),
                symbol.lineno(),
            ) {
                if name.contains(MODULE_PREFIX) {
                    frames_info.push(FrameInfo {
                        name,
                        loc: format!("{}:{}", filename.display(), lineno),
                    });
                }
            }
        }
    }

    frames_info
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_request_errors_keep_their_status() {
        let err = AppError::not_found("No comments here");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: AppError = ("Bad token", StatusCode::BAD_REQUEST).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(status_code_name(StatusCode::BAD_REQUEST), "BAD_REQUEST");
    }

    #[test]
    fn test_debug_info_only_attaches_to_request_errors() {
        let err = AppError::bad_request("Invalid form")
            .with_debug_info("form_errors", serde_json::json!({"name": ["required"]}));
        match err {
            AppError::RequestError { debug_info, .. } => {
                assert!(debug_info.unwrap().contains_key("form_errors"))
            }
            _ => panic!("expected a request error"),
        }

        let err = AppError::Unhandled("boom".into()).with_debug_info("x", Value::Null);
        assert!(matches!(err, AppError::Unhandled(_)));
    }
}
