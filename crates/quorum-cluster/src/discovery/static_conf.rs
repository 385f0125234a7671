use async_trait::async_trait;

use quorum_core::{Endpoint, Result, SeedResolver};

/// Uses every seed as-is, leaving name resolution to the connection.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver;

#[async_trait]
impl SeedResolver for StaticResolver {
    async fn resolve(&self, seed: &Endpoint) -> Result<Vec<Endpoint>> {
        Ok(vec![seed.clone()])
    }
}
