use clap::Subcommand;
use futures::StreamExt;
use tabled::{Table, Tabled};
use tokio_util::sync::CancellationToken;

use quorum_client::{ClientSettings, QuorumClient, UserDetails};

#[derive(Subcommand)]
pub enum UserCommands {
    List,
    Get {
        login_name: String,
    },
    Create {
        login_name: String,
        #[arg(long)]
        full_name: String,
        #[arg(long, value_delimiter = ',')]
        groups: Vec<String>,
        #[arg(long)]
        password: String,
    },
    Delete {
        login_name: String,
    },
    Enable {
        login_name: String,
    },
    Disable {
        login_name: String,
    },
    ChangePassword {
        login_name: String,
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
    },
    ResetPassword {
        login_name: String,
        #[arg(long)]
        new: String,
    },
}

#[derive(Debug, Tabled)]
struct UserRow {
    #[tabled(rename = "Login")]
    login_name: String,
    #[tabled(rename = "Name")]
    full_name: String,
    #[tabled(rename = "Groups")]
    groups: String,
    #[tabled(rename = "Disabled")]
    disabled: bool,
    #[tabled(rename = "Updated", display_with = "display_option")]
    last_updated: Option<String>,
}

fn display_option(o: &Option<String>) -> String {
    o.clone().unwrap_or_else(|| "-".to_string())
}

impl From<UserDetails> for UserRow {
    fn from(user: UserDetails) -> Self {
        Self {
            login_name: user.login_name,
            full_name: user.full_name,
            groups: user.groups.join(","),
            disabled: user.disabled,
            last_updated: user.last_updated.map(|t| t.to_rfc3339()),
        }
    }
}

pub async fn execute(command: UserCommands, settings: ClientSettings) -> anyhow::Result<()> {
    let client = QuorumClient::connect(settings)?;
    let users = client.users();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match command {
        UserCommands::List => {
            let mut stream = users.list_all(None, &cancel);
            let mut rows = Vec::new();
            while let Some(user) = stream.next().await {
                rows.push(UserRow::from(user?));
            }

            if rows.is_empty() {
                println!("No users");
            } else {
                println!("{}", Table::new(&rows));
            }
        }

        UserCommands::Get { login_name } => {
            let user = users.get_user(&login_name, None, &cancel).await?;
            println!("{}", Table::new([UserRow::from(user)]));
        }

        UserCommands::Create {
            login_name,
            full_name,
            groups,
            password,
        } => {
            users
                .create_user(&login_name, &full_name, &groups, &password, None, &cancel)
                .await?;
            println!("Created user {}", login_name);
        }

        UserCommands::Delete { login_name } => {
            users.delete_user(&login_name, None, &cancel).await?;
            println!("Deleted user {}", login_name);
        }

        UserCommands::Enable { login_name } => {
            users.enable_user(&login_name, None, &cancel).await?;
            println!("Enabled user {}", login_name);
        }

        UserCommands::Disable { login_name } => {
            users.disable_user(&login_name, None, &cancel).await?;
            println!("Disabled user {}", login_name);
        }

        UserCommands::ChangePassword {
            login_name,
            current,
            new,
        } => {
            users
                .change_password(&login_name, &current, &new, None, &cancel)
                .await?;
            println!("Changed password for {}", login_name);
        }

        UserCommands::ResetPassword { login_name, new } => {
            users.reset_password(&login_name, &new, None, &cancel).await?;
            println!("Reset password for {}", login_name);
        }
    }

    client.dispose();
    Ok(())
}
