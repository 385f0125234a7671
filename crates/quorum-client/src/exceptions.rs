use std::collections::HashMap;

use quorum_core::trailers;
use quorum_core::{Code, Endpoint, Error, ErrorCode, Status, StatusExt};

pub type ExceptionHandler = fn(&Status) -> Error;

/// Translates failed call statuses into domain errors.
///
/// Handlers are keyed by the server error code carried in the `exception`
/// trailer. Statuses without a registered code fall back to their status code.
#[derive(Clone)]
pub struct ExceptionMap {
    handlers: HashMap<ErrorCode, ExceptionHandler>,
}

impl ExceptionMap {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        Self::empty()
            .register(ErrorCode::UserNotFound, user_not_found)
            .register(ErrorCode::NotLeader, not_leader)
            .register(ErrorCode::AccessDenied, access_denied)
    }

    pub fn register(mut self, code: ErrorCode, handler: ExceptionHandler) -> Self {
        self.handlers.insert(code, handler);
        self
    }

    pub fn handles(&self, code: ErrorCode) -> bool {
        self.handlers.contains_key(&code)
    }

    pub fn translate(&self, status: &Status) -> Error {
        if let Some(handler) = status.error_code().and_then(|code| self.handlers.get(&code)) {
            return handler(status);
        }

        let message = status.message().to_string();
        match status.code() {
            Code::Unavailable => Error::Unavailable(message),
            Code::Cancelled => Error::Cancelled,
            Code::DataLoss => Error::Codec(message),
            code => Error::OperationFailed { code, message },
        }
    }
}

impl Default for ExceptionMap {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for ExceptionMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut codes: Vec<_> = self.handlers.keys().map(|c| c.as_str()).collect();
        codes.sort_unstable();
        f.debug_struct("ExceptionMap").field("codes", &codes).finish()
    }
}

fn user_not_found(status: &Status) -> Error {
    Error::UserNotFound {
        login_name: status
            .trailer(trailers::LOGIN_NAME)
            .unwrap_or_default()
            .to_string(),
    }
}

fn not_leader(status: &Status) -> Error {
    let host = status.trailer(trailers::LEADER_ENDPOINT_HOST);
    let port = status
        .trailer(trailers::LEADER_ENDPOINT_PORT)
        .and_then(|p| p.parse::<u16>().ok());

    let leader = match (host, port) {
        (Some(host), Some(port)) if !host.is_empty() => Some(Endpoint::new(host, port)),
        _ => None,
    };
    Error::NotLeader { leader }
}

fn access_denied(status: &Status) -> Error {
    Error::AccessDenied(status.message().to_string())
}
