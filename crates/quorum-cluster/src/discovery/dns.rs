use async_trait::async_trait;
use tokio::net::lookup_host;
use tracing::debug;

use quorum_core::{Endpoint, Error, Result, SeedResolver};

/// Expands hostname seeds into one candidate per resolved address.
#[derive(Debug, Clone, Default)]
pub struct DnsResolver;

#[async_trait]
impl SeedResolver for DnsResolver {
    async fn resolve(&self, seed: &Endpoint) -> Result<Vec<Endpoint>> {
        if seed.is_ip_literal() {
            return Ok(vec![seed.clone()]);
        }

        let addrs = lookup_host((seed.host.as_str(), seed.port))
            .await
            .map_err(|e| Error::Unreachable {
                endpoint: seed.to_string(),
                reason: format!("dns lookup failed: {}", e),
            })?;

        let mut endpoints: Vec<Endpoint> = Vec::new();
        for addr in addrs {
            let endpoint = Endpoint::from(addr);
            if !endpoints.contains(&endpoint) {
                endpoints.push(endpoint);
            }
        }

        debug!("dns seed {} resolved to {} addresses", seed, endpoints.len());
        Ok(endpoints)
    }
}
