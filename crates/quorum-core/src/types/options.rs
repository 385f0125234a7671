use std::fmt;
use std::time::Duration;

pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-call overrides. Each call works on its own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOptions {
    pub timeout_after: Option<Duration>,
    /// When false, server-reported failures produce an empty/default result
    /// instead of an error.
    pub throw_on_failure: bool,
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            timeout_after: Some(DEFAULT_OPERATION_TIMEOUT),
            throw_on_failure: true,
        }
    }
}

impl OperationOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_after = Some(timeout);
        self
    }

    pub fn with_throw_on_failure(mut self, throw_on_failure: bool) -> Self {
        self.throw_on_failure = throw_on_failure;
        self
    }

    /// Copy for a single call with the timeout filled in.
    pub fn resolve(&self, default_timeout: Duration) -> Self {
        Self {
            timeout_after: Some(self.timeout_after.unwrap_or(default_timeout)),
            throw_on_failure: self.throw_on_failure,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_after.unwrap_or(DEFAULT_OPERATION_TIMEOUT)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer(String),
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Credentials::Bearer(token.into())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Bearer(_) => f.debug_tuple("Bearer").field(&"<redacted>").finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = OperationOptions::default();
        assert_eq!(options.timeout_after, Some(Duration::from_secs(5)));
        assert!(options.throw_on_failure);
    }

    #[test]
    fn test_resolve_fills_timeout() {
        let options = OperationOptions {
            timeout_after: None,
            throw_on_failure: false,
        };
        let resolved = options.resolve(Duration::from_secs(2));
        assert_eq!(resolved.timeout_after, Some(Duration::from_secs(2)));
        assert!(!resolved.throw_on_failure);
        assert_eq!(options.timeout_after, None);
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let creds = Credentials::basic("admin", "changeit");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("admin"));
        assert!(!printed.contains("changeit"));

        let token = format!("{:?}", Credentials::bearer("secret-token"));
        assert!(!token.contains("secret-token"));
    }
}
