use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use quorum_core::{Credentials, Error, OperationOptions, Result};

use crate::dispatcher::{CallDispatcher, ResponseStream};

pub mod methods {
    pub const CREATE: &str = "users.create";
    pub const DETAILS: &str = "users.details";
    pub const DELETE: &str = "users.delete";
    pub const ENABLE: &str = "users.enable";
    pub const DISABLE: &str = "users.disable";
    pub const CHANGE_PASSWORD: &str = "users.change_password";
    pub const RESET_PASSWORD: &str = "users.reset_password";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserDetails {
    pub login_name: String,
    pub full_name: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct CreateUser<'a> {
    login_name: &'a str,
    full_name: &'a str,
    groups: &'a [String],
    password: &'a str,
}

#[derive(Serialize)]
struct LoginName<'a> {
    login_name: &'a str,
}

#[derive(Serialize)]
struct ListAll {}

#[derive(Serialize)]
struct ChangePassword<'a> {
    login_name: &'a str,
    current_password: &'a str,
    new_password: &'a str,
}

#[derive(Serialize)]
struct ResetPassword<'a> {
    login_name: &'a str,
    new_password: &'a str,
}

/// User administration on the cluster. Arguments are checked before any
/// network activity.
#[derive(Clone)]
pub struct UserManagementClient {
    dispatcher: CallDispatcher,
    options: Option<OperationOptions>,
}

impl UserManagementClient {
    pub fn new(dispatcher: CallDispatcher) -> Self {
        Self {
            dispatcher,
            options: None,
        }
    }

    pub fn with_options(mut self, options: OperationOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub async fn create_user(
        &self,
        login_name: &str,
        full_name: &str,
        groups: &[String],
        password: &str,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        require("login_name", login_name)?;
        require("full_name", full_name)?;
        require("password", password)?;

        let request = CreateUser {
            login_name,
            full_name,
            groups,
            password,
        };
        self.dispatcher
            .invoke(methods::CREATE, &request, credentials, self.options.as_ref(), cancel)
            .await
    }

    /// Details of one user, taken from the first item the server streams back.
    pub async fn get_user(
        &self,
        login_name: &str,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<UserDetails> {
        require("login_name", login_name)?;

        self.dispatcher
            .invoke(
                methods::DETAILS,
                &LoginName { login_name },
                credentials,
                self.options.as_ref(),
                cancel,
            )
            .await
    }

    pub async fn delete_user(
        &self,
        login_name: &str,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.by_login_name(methods::DELETE, login_name, credentials, cancel)
            .await
    }

    pub async fn enable_user(
        &self,
        login_name: &str,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.by_login_name(methods::ENABLE, login_name, credentials, cancel)
            .await
    }

    pub async fn disable_user(
        &self,
        login_name: &str,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.by_login_name(methods::DISABLE, login_name, credentials, cancel)
            .await
    }

    pub fn list_all(
        &self,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> ResponseStream<UserDetails> {
        self.dispatcher.invoke_streaming(
            methods::DETAILS,
            &ListAll {},
            credentials,
            self.options.as_ref(),
            cancel,
        )
    }

    pub async fn change_password(
        &self,
        login_name: &str,
        current_password: &str,
        new_password: &str,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        require("login_name", login_name)?;
        require("current_password", current_password)?;
        require("new_password", new_password)?;

        let request = ChangePassword {
            login_name,
            current_password,
            new_password,
        };
        self.dispatcher
            .invoke(
                methods::CHANGE_PASSWORD,
                &request,
                credentials,
                self.options.as_ref(),
                cancel,
            )
            .await
    }

    pub async fn reset_password(
        &self,
        login_name: &str,
        new_password: &str,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        require("login_name", login_name)?;
        require("new_password", new_password)?;

        let request = ResetPassword {
            login_name,
            new_password,
        };
        self.dispatcher
            .invoke(
                methods::RESET_PASSWORD,
                &request,
                credentials,
                self.options.as_ref(),
                cancel,
            )
            .await
    }

    async fn by_login_name(
        &self,
        method: &str,
        login_name: &str,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        require("login_name", login_name)?;

        self.dispatcher
            .invoke(
                method,
                &LoginName { login_name },
                credentials,
                self.options.as_ref(),
                cancel,
            )
            .await
    }
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidArgument(format!("{} must not be empty", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require() {
        assert!(require("login_name", "alice").is_ok());
        assert_eq!(
            require("login_name", ""),
            Err(Error::InvalidArgument("login_name must not be empty".into()))
        );
    }

    #[test]
    fn test_user_details_wire_format() {
        let details: UserDetails = serde_json::from_value(serde_json::json!({
            "login_name": "alice",
            "full_name": "Alice Liddell",
            "groups": ["$admins"],
            "last_updated": "2024-03-01T12:00:00Z"
        }))
        .unwrap();

        assert_eq!(details.login_name, "alice");
        assert_eq!(details.groups, vec!["$admins".to_string()]);
        assert!(!details.disabled);
        assert_eq!(
            details.last_updated.unwrap().to_rfc3339(),
            "2024-03-01T12:00:00+00:00"
        );
    }

    #[test]
    fn test_list_all_request_is_empty_object() {
        assert_eq!(serde_json::to_value(ListAll {}).unwrap(), serde_json::json!({}));
    }
}
