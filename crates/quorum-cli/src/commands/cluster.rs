use anyhow::Context;
use clap::Subcommand;
use tabled::{Table, Tabled};

use quorum_client::{ClientSettings, QuorumClient};
use quorum_cluster::GrpcGossipClient;
use quorum_core::{ClusterMember, Endpoint, GossipClient};

#[derive(Subcommand)]
pub enum ClusterCommands {
    /// Run discovery and print the selected node
    Discover,
    /// Gossip one node and print the members it reports
    Members {
        #[arg(short, long)]
        endpoint: Option<String>,
    },
}

#[derive(Debug, Tabled)]
struct MemberRow {
    #[tabled(rename = "Endpoint")]
    endpoint: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Alive")]
    alive: bool,
}

impl From<ClusterMember> for MemberRow {
    fn from(member: ClusterMember) -> Self {
        Self {
            endpoint: member.endpoint.to_string(),
            state: format!("{:?}", member.state),
            alive: member.is_alive,
        }
    }
}

pub async fn execute(command: ClusterCommands, settings: ClientSettings) -> anyhow::Result<()> {
    match command {
        ClusterCommands::Discover => {
            let preference = settings.connectivity.node_preference;
            let client = QuorumClient::connect(settings)?;
            let endpoint = client.current_endpoint().await?;
            client.dispose();

            println!("Selected {} (preference: {})", endpoint, preference);
        }

        ClusterCommands::Members { endpoint } => {
            let target: Endpoint = match endpoint {
                Some(endpoint) => endpoint.parse()?,
                None => settings
                    .connectivity
                    .seeds
                    .iter()
                    .next()
                    .cloned()
                    .context("no seed configured")?,
            };

            let members = GrpcGossipClient::new()
                .fetch_members(&target, settings.connectivity.gossip_timeout)
                .await?;

            if members.is_empty() {
                println!("{} reported no members", target);
            } else {
                let rows: Vec<MemberRow> = members.into_iter().map(MemberRow::from).collect();
                println!("Members reported by {}:", target);
                println!("{}", Table::new(&rows));
            }
        }
    }

    Ok(())
}
