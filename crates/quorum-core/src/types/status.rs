use tonic::metadata::{Ascii, MetadataValue};
use tonic::Status;

/// Trailer keys servers use to describe a failure.
pub mod trailers {
    pub const EXCEPTION: &str = "exception";
    pub const LOGIN_NAME: &str = "login-name";
    pub const LEADER_ENDPOINT_HOST: &str = "leader-endpoint-host";
    pub const LEADER_ENDPOINT_PORT: &str = "leader-endpoint-port";
}

/// Server-reported error codes with a dedicated domain error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UserNotFound,
    NotLeader,
    AccessDenied,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 3] = [
        ErrorCode::UserNotFound,
        ErrorCode::NotLeader,
        ErrorCode::AccessDenied,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UserNotFound => "user-not-found",
            ErrorCode::NotLeader => "not-leader",
            ErrorCode::AccessDenied => "access-denied",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_str() == s)
    }
}

/// Reading and attaching the failure trailers of a [`Status`].
pub trait StatusExt: Sized {
    fn trailer(&self, key: &str) -> Option<&str>;

    /// Server error code from the `exception` trailer, if it is one we know.
    fn error_code(&self) -> Option<ErrorCode>;

    /// Values that are not valid metadata are dropped.
    fn with_trailer(self, key: &'static str, value: impl AsRef<str>) -> Self;

    fn with_error_code(self, code: ErrorCode) -> Self {
        self.with_trailer(trailers::EXCEPTION, code.as_str())
    }
}

impl StatusExt for Status {
    fn trailer(&self, key: &str) -> Option<&str> {
        self.metadata().get(key).and_then(|value| value.to_str().ok())
    }

    fn error_code(&self) -> Option<ErrorCode> {
        self.trailer(trailers::EXCEPTION).and_then(ErrorCode::parse)
    }

    fn with_trailer(mut self, key: &'static str, value: impl AsRef<str>) -> Self {
        if let Ok(value) = MetadataValue::<Ascii>::try_from(value.as_ref()) {
            self.metadata_mut().insert(key, value);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_error_code_roundtrip_by_name() {
        for code in ErrorCode::ALL {
            assert_eq!(ErrorCode::parse(code.as_str()), Some(code));
        }
        assert_eq!(ErrorCode::parse("stream-deleted"), None);
    }

    #[test]
    fn test_status_error_code() {
        let status = Status::not_found("no such user")
            .with_error_code(ErrorCode::UserNotFound)
            .with_trailer(trailers::LOGIN_NAME, "alice");
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.error_code(), Some(ErrorCode::UserNotFound));
        assert_eq!(status.trailer(trailers::LOGIN_NAME), Some("alice"));
        assert_eq!(Status::unavailable("down").error_code(), None);
    }

    #[test]
    fn test_invalid_trailer_value_dropped() {
        let status = Status::internal("boom").with_trailer(trailers::LOGIN_NAME, "bad\nname");
        assert_eq!(status.trailer(trailers::LOGIN_NAME), None);
    }
}
