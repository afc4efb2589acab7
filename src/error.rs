use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::env;
use std::fmt::Debug;

pub const ENV_VAR_CODE: i32 = 1;
pub const DATABASE_CODE: i32 = 2;

pub const INVALID_TRANSITION_CODE: i32 = 100;
pub const INVALID_INPUT_CODE: i32 = 101;
pub const UNAUTHORIZED_CODE: i32 = 102;
pub const ALREADY_ACCEPTED_CODE: i32 = 103;
pub const NOT_FOUND_CODE: i32 = 104;
pub const INVALID_GEOMETRY_CODE: i32 = 105;
pub const CONFIG_MISSING_CODE: i32 = 106;
pub const RIDE_IN_PROGRESS_CODE: i32 = 107;
pub const CAS_CONFLICT_CODE: i32 = 108;

#[derive(Debug)]
pub struct Error {
    pub code: i32,
    pub message: String,
}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        env_var_error(err)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        database_error(err)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match self.code {
            1..=99 => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            ALREADY_ACCEPTED_CODE | CAS_CONFLICT_CODE => {
                (StatusCode::CONFLICT, self.message.as_str())
            }
            NOT_FOUND_CODE => (StatusCode::NOT_FOUND, self.message.as_str()),
            UNAUTHORIZED_CODE => (StatusCode::FORBIDDEN, self.message.as_str()),
            _ => (StatusCode::BAD_REQUEST, self.message.as_str()),
        };

        let body = Json(json!({
            "code": self.code,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub fn env_var_error(_: env::VarError) -> Error {
    Error {
        code: ENV_VAR_CODE,
        message: "environment variable error".into(),
    }
}

pub fn database_error<T: Debug>(_: T) -> Error {
    Error {
        code: DATABASE_CODE,
        message: "database error".into(),
    }
}

pub fn invalid_transition_error() -> Error {
    Error {
        code: INVALID_TRANSITION_CODE,
        message: "invalid ride state transition".into(),
    }
}

pub fn invalid_input_error() -> Error {
    Error {
        code: INVALID_INPUT_CODE,
        message: "invalid input".into(),
    }
}

pub fn unauthorized_error() -> Error {
    Error {
        code: UNAUTHORIZED_CODE,
        message: "unauthorized".into(),
    }
}

pub fn already_accepted_error() -> Error {
    Error {
        code: ALREADY_ACCEPTED_CODE,
        message: "ride already accepted by another driver".into(),
    }
}

pub fn not_found_error() -> Error {
    Error {
        code: NOT_FOUND_CODE,
        message: "not found".into(),
    }
}

pub fn invalid_geometry_error(detail: &str) -> Error {
    Error {
        code: INVALID_GEOMETRY_CODE,
        message: format!("invalid geometry: {}", detail),
    }
}

pub fn config_missing_error() -> Error {
    Error {
        code: CONFIG_MISSING_CODE,
        message: "required configuration is missing".into(),
    }
}

pub fn ride_in_progress_error() -> Error {
    Error {
        code: RIDE_IN_PROGRESS_CODE,
        message: "a started ride must be completed, not cancelled".into(),
    }
}

pub fn cas_conflict_error() -> Error {
    Error {
        code: CAS_CONFLICT_CODE,
        message: "ride state changed concurrently".into(),
    }
}
