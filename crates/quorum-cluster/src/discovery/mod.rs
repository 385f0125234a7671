mod dns;
mod static_conf;

pub use dns::DnsResolver;
pub use static_conf::StaticResolver;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use quorum_core::{
    ConnectivitySettings, Endpoint, Error, GossipClient, Result, SeedResolver,
};

use crate::selector::NodeSelector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryState {
    Idle,
    Discovering,
    Succeeded(Endpoint),
    Exhausted,
}

type SharedPass = Shared<BoxFuture<'static, Result<Endpoint>>>;

struct InFlight {
    id: u64,
    pass: SharedPass,
}

struct EngineInner {
    settings: ConnectivitySettings,
    gossip: Arc<dyn GossipClient>,
    resolver: Arc<dyn SeedResolver>,
    selector: NodeSelector,
    in_flight: Mutex<Option<InFlight>>,
    state: RwLock<DiscoveryState>,
    next_pass: AtomicU64,
    shutdown: CancellationToken,
}

/// Finds a cluster member matching the configured node preference.
///
/// At most one discovery pass runs at a time. The pass runs on its own task,
/// callers only wait for its result, so dropping a waiting caller never stops
/// a pass other callers depend on.
#[derive(Clone)]
pub struct DiscoveryEngine {
    inner: Arc<EngineInner>,
}

impl DiscoveryEngine {
    pub fn new(
        settings: ConnectivitySettings,
        gossip: Arc<dyn GossipClient>,
        resolver: Arc<dyn SeedResolver>,
    ) -> Self {
        Self::with_selector(settings, gossip, resolver, NodeSelector::new())
    }

    pub fn with_selector(
        settings: ConnectivitySettings,
        gossip: Arc<dyn GossipClient>,
        resolver: Arc<dyn SeedResolver>,
        selector: NodeSelector,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                settings,
                gossip,
                resolver,
                selector,
                in_flight: Mutex::new(None),
                state: RwLock::new(DiscoveryState::Idle),
                next_pass: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn settings(&self) -> &ConnectivitySettings {
        &self.inner.settings
    }

    pub fn state(&self) -> DiscoveryState {
        self.inner.state.read().clone()
    }

    pub fn is_discovering(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Joins the running pass or starts a new one.
    pub async fn discover(&self) -> Result<Endpoint> {
        if self.inner.shutdown.is_cancelled() {
            return Err(Error::Disposed);
        }
        self.join_or_start().await
    }

    /// Whether `endpoint` still reports itself as eligible under the preference.
    pub async fn still_eligible(&self, endpoint: &Endpoint) -> Result<bool> {
        let settings = &self.inner.settings;
        let members = self
            .inner
            .gossip
            .fetch_members(endpoint, settings.gossip_timeout)
            .await?;
        Ok(members
            .iter()
            .any(|m| &m.endpoint == endpoint && settings.node_preference.accepts(m)))
    }

    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    fn join_or_start(&self) -> SharedPass {
        let mut guard = self.inner.in_flight.lock();
        if let Some(in_flight) = guard.as_ref() {
            debug!("joining discovery pass {}", in_flight.id);
            return in_flight.pass.clone();
        }

        let id = self.inner.next_pass.fetch_add(1, Ordering::SeqCst);
        *self.inner.state.write() = DiscoveryState::Discovering;

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                result = inner.run_pass(id) => result,
                _ = inner.shutdown.cancelled() => Err(Error::Disposed),
            };
            inner.finish(id, &result);
            result
        });

        let pass = async move {
            handle
                .await
                .unwrap_or_else(|e| Err(Error::Internal(format!("discovery task failed: {}", e))))
        }
        .boxed()
        .shared();

        *guard = Some(InFlight {
            id,
            pass: pass.clone(),
        });
        pass
    }
}

impl EngineInner {
    async fn run_pass(&self, id: u64) -> Result<Endpoint> {
        let max_attempts = self.settings.max_discover_attempts;
        let mut unreachable = 0usize;

        debug!(
            "discovery pass {} started over {} seeds, preference {}",
            id,
            self.settings.seeds.len(),
            self.settings.node_preference
        );

        let mut delays = backoff(&self.settings);

        for attempt in 1..=max_attempts {
            metrics::counter!("quorum_discovery_attempts_total").increment(1);

            match self.attempt(&mut unreachable).await {
                Ok(endpoint) => {
                    info!(
                        "discovered {} on attempt {}/{}",
                        endpoint, attempt, max_attempts
                    );
                    return Ok(endpoint);
                }
                Err(e) => {
                    debug!("discovery attempt {}/{} failed: {}", attempt, max_attempts, e);
                }
            }

            if attempt < max_attempts {
                if let Some(delay) = delays.next() {
                    sleep(delay).await;
                }
            }
        }

        metrics::counter!("quorum_discovery_failures_total").increment(1);
        warn!(
            "discovery failed after {} attempts, {} unreachable candidates",
            max_attempts, unreachable
        );
        Err(Error::DiscoveryExhausted {
            attempts: max_attempts,
            unreachable,
        })
    }

    /// One pass over every candidate. Unreachable, malformed and ineligible
    /// candidates are all skipped the same way.
    async fn attempt(&self, unreachable: &mut usize) -> Result<Endpoint> {
        let preference = self.settings.node_preference;
        let mut last_error = Error::NoEligibleNode { preference };

        for candidate in self.candidates(unreachable).await {
            match self
                .gossip
                .fetch_members(&candidate, self.settings.gossip_timeout)
                .await
            {
                Ok(members) if members.is_empty() => {
                    debug!("{} returned an empty member list", candidate);
                }
                Ok(members) => match self.selector.select(&members, preference) {
                    Some(endpoint) => return Ok(endpoint),
                    None => last_error = Error::NoEligibleNode { preference },
                },
                Err(e) => {
                    *unreachable += 1;
                    metrics::counter!("quorum_gossip_failures_total").increment(1);
                    debug!("gossip with {} failed: {}", candidate, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn candidates(&self, unreachable: &mut usize) -> Vec<Endpoint> {
        let mut candidates = Vec::new();

        for seed in &self.settings.seeds {
            match timeout(self.settings.gossip_timeout, self.resolver.resolve(seed)).await {
                Ok(Ok(resolved)) if !resolved.is_empty() => {
                    for endpoint in resolved {
                        if !candidates.contains(&endpoint) {
                            candidates.push(endpoint);
                        }
                    }
                }
                Ok(Ok(_)) => {
                    *unreachable += 1;
                    debug!("seed {} resolved to no addresses", seed);
                }
                Ok(Err(e)) => {
                    *unreachable += 1;
                    debug!("seed {} could not be resolved: {}", seed, e);
                }
                Err(_) => {
                    *unreachable += 1;
                    debug!("resolving seed {} timed out", seed);
                }
            }
        }

        candidates
    }

    fn finish(&self, id: u64, result: &Result<Endpoint>) {
        let mut guard = self.in_flight.lock();
        *self.state.write() = match result {
            Ok(endpoint) => DiscoveryState::Succeeded(endpoint.clone()),
            Err(Error::Disposed) => DiscoveryState::Idle,
            Err(_) => DiscoveryState::Exhausted,
        };
        if guard.as_ref().map(|f| f.id) == Some(id) {
            *guard = None;
        }
    }
}

/// Delays between the attempts of one pass: doubling from `discovery_backoff`,
/// capped at `max_discovery_backoff`, one fewer than the attempt count.
fn backoff(settings: &ConnectivitySettings) -> ExponentialBackoff {
    ExponentialBuilder::new()
        .with_min_delay(settings.discovery_backoff)
        .with_max_delay(settings.max_discovery_backoff)
        .with_factor(2.0)
        .with_max_times(settings.max_discover_attempts.saturating_sub(1) as usize)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quorum_core::{ClusterMember, EndpointSet, MemberState, NodePreference};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Clone)]
    enum Reply {
        Unreachable,
        Members(Vec<ClusterMember>),
    }

    #[derive(Default)]
    struct ScriptedGossip {
        // replies are consumed in order, the last one repeats
        replies: Mutex<HashMap<Endpoint, Vec<Reply>>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        calls_by_endpoint: Mutex<HashMap<Endpoint, usize>>,
    }

    impl ScriptedGossip {
        fn new() -> Self {
            Self::default()
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn reply(self, endpoint: &Endpoint, replies: Vec<Reply>) -> Self {
            self.replies.lock().insert(endpoint.clone(), replies);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn calls_to(&self, endpoint: &Endpoint) -> usize {
            self.calls_by_endpoint
                .lock()
                .get(endpoint)
                .copied()
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl GossipClient for ScriptedGossip {
        async fn fetch_members(
            &self,
            endpoint: &Endpoint,
            _timeout: Duration,
        ) -> Result<Vec<ClusterMember>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self
                .calls_by_endpoint
                .lock()
                .entry(endpoint.clone())
                .or_insert(0) += 1;

            if let Some(delay) = self.delay {
                sleep(delay).await;
            }

            let reply = {
                let mut replies = self.replies.lock();
                match replies.get_mut(endpoint) {
                    Some(queue) if queue.len() > 1 => Some(queue.remove(0)),
                    Some(queue) => queue.first().cloned(),
                    None => None,
                }
            };

            match reply {
                Some(Reply::Members(members)) => Ok(members),
                _ => Err(Error::Unreachable {
                    endpoint: endpoint.to_string(),
                    reason: "connection refused".into(),
                }),
            }
        }
    }

    struct ExpandingResolver {
        expansions: HashMap<Endpoint, Vec<Endpoint>>,
    }

    #[async_trait]
    impl SeedResolver for ExpandingResolver {
        async fn resolve(&self, seed: &Endpoint) -> Result<Vec<Endpoint>> {
            self.expansions
                .get(seed)
                .cloned()
                .ok_or_else(|| Error::Unreachable {
                    endpoint: seed.to_string(),
                    reason: "nxdomain".into(),
                })
        }
    }

    fn ep(name: &str) -> Endpoint {
        Endpoint::new(name, 2113)
    }

    fn settings(seeds: &[&str], attempts: u32) -> ConnectivitySettings {
        ConnectivitySettings::new(EndpointSet::new(seeds.iter().map(|s| ep(s))))
            .with_max_discover_attempts(attempts)
            .with_gossip_timeout(Duration::from_secs(1))
            .with_discovery_backoff(Duration::from_millis(1), Duration::from_millis(5))
    }

    fn leader(name: &str) -> Reply {
        Reply::Members(vec![ClusterMember::new(ep(name), MemberState::Leader, true)])
    }

    fn engine(settings: ConnectivitySettings, gossip: Arc<ScriptedGossip>) -> DiscoveryEngine {
        DiscoveryEngine::new(settings, gossip, Arc::new(StaticResolver))
    }

    #[tokio::test]
    async fn test_discovery_skips_unreachable_seeds() {
        let gossip = Arc::new(ScriptedGossip::new().reply(&ep("c"), vec![leader("c")]));
        let engine = engine(settings(&["a", "b", "c"], 3), gossip.clone());

        let endpoint = engine.discover().await.unwrap();
        assert_eq!(endpoint, ep("c"));
        assert_eq!(gossip.calls(), 3);
        assert_eq!(engine.state(), DiscoveryState::Succeeded(ep("c")));
    }

    #[tokio::test]
    async fn test_discovery_stops_at_first_match() {
        let gossip = Arc::new(
            ScriptedGossip::new()
                .reply(&ep("a"), vec![leader("b")])
                .reply(&ep("b"), vec![leader("b")]),
        );
        let engine = engine(settings(&["a", "b"], 1), gossip.clone());

        assert_eq!(engine.discover().await.unwrap(), ep("b"));
        assert_eq!(gossip.calls(), 1);
        assert_eq!(gossip.calls_to(&ep("b")), 0);
    }

    #[tokio::test]
    async fn test_single_attempt_exhausts() {
        let gossip = Arc::new(ScriptedGossip::new());
        let engine = engine(settings(&["a", "b", "c"], 1), gossip.clone());

        let err = engine.discover().await.unwrap_err();
        assert_eq!(
            err,
            Error::DiscoveryExhausted {
                attempts: 1,
                unreachable: 3
            }
        );
        assert_eq!(gossip.calls(), 3);
        assert_eq!(engine.state(), DiscoveryState::Exhausted);
    }

    #[tokio::test]
    async fn test_exactly_n_attempts() {
        let gossip = Arc::new(ScriptedGossip::new());
        let engine = engine(settings(&["a", "b"], 4), gossip.clone());

        match engine.discover().await {
            Err(Error::DiscoveryExhausted {
                attempts,
                unreachable,
            }) => {
                assert_eq!(attempts, 4);
                assert_eq!(unreachable, 8);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(gossip.calls_to(&ep("a")), 4);
        assert_eq!(gossip.calls_to(&ep("b")), 4);
    }

    #[tokio::test]
    async fn test_no_eligible_node_retried_next_attempt() {
        let followers_only = Reply::Members(vec![
            ClusterMember::new(ep("a"), MemberState::Follower, true),
            ClusterMember::new(ep("b"), MemberState::PreLeader, true),
        ]);
        let gossip = Arc::new(
            ScriptedGossip::new().reply(&ep("a"), vec![followers_only, leader("b")]),
        );
        let engine = engine(settings(&["a"], 3), gossip.clone());

        assert_eq!(engine.discover().await.unwrap(), ep("b"));
        assert_eq!(gossip.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_member_list_is_skipped() {
        let gossip = Arc::new(
            ScriptedGossip::new()
                .reply(&ep("a"), vec![Reply::Members(vec![])])
                .reply(&ep("b"), vec![leader("b")]),
        );
        let engine = engine(settings(&["a", "b"], 1), gossip.clone());

        assert_eq!(engine.discover().await.unwrap(), ep("b"));
    }

    #[tokio::test]
    async fn test_follower_preference() {
        let gossip = Arc::new(ScriptedGossip::new().reply(
            &ep("a"),
            vec![Reply::Members(vec![
                ClusterMember::new(ep("a"), MemberState::Leader, true),
                ClusterMember::new(ep("f"), MemberState::Follower, true),
            ])],
        ));
        let engine = engine(
            settings(&["a"], 1).with_node_preference(NodePreference::Follower),
            gossip,
        );

        assert_eq!(engine.discover().await.unwrap(), ep("f"));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_pass() {
        let gossip = Arc::new(
            ScriptedGossip::new()
                .with_delay(Duration::from_millis(50))
                .reply(&ep("a"), vec![leader("a")]),
        );
        let engine = engine(settings(&["a"], 3), gossip.clone());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.discover().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), ep("a"));
        }
        assert_eq!(gossip.calls(), 1);
        assert!(!engine.is_discovering());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_failure() {
        let gossip = Arc::new(ScriptedGossip::new().with_delay(Duration::from_millis(20)));
        let engine = engine(settings(&["a", "b"], 2), gossip.clone());

        let (first, second) = tokio::join!(engine.discover(), engine.discover());
        assert_eq!(first, second);
        assert!(matches!(first, Err(Error::DiscoveryExhausted { .. })));
        assert_eq!(gossip.calls(), 4);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel_pass() {
        let gossip = Arc::new(
            ScriptedGossip::new()
                .with_delay(Duration::from_millis(100))
                .reply(&ep("a"), vec![leader("a")]),
        );
        let engine = engine(settings(&["a"], 1), gossip.clone());

        let impatient = timeout(Duration::from_millis(10), engine.discover()).await;
        assert!(impatient.is_err());
        assert!(engine.is_discovering());

        assert_eq!(engine.discover().await.unwrap(), ep("a"));
        assert_eq!(gossip.calls(), 1);
    }

    #[tokio::test]
    async fn test_new_pass_after_completion() {
        let gossip = Arc::new(ScriptedGossip::new().reply(&ep("a"), vec![leader("a")]));
        let engine = engine(settings(&["a"], 1), gossip.clone());

        engine.discover().await.unwrap();
        engine.discover().await.unwrap();
        assert_eq!(gossip.calls(), 2);
    }

    #[tokio::test]
    async fn test_dns_seed_expands_to_all_addresses() {
        let seed = Endpoint::new("cluster.local", 2113);
        let resolver = ExpandingResolver {
            expansions: HashMap::from([(seed.clone(), vec![ep("10.0.0.1"), ep("10.0.0.2")])]),
        };
        let gossip = Arc::new(ScriptedGossip::new().reply(&ep("10.0.0.2"), vec![leader("10.0.0.2")]));
        let settings = ConnectivitySettings::single(seed)
            .with_max_discover_attempts(1)
            .with_discovery_backoff(Duration::from_millis(1), Duration::from_millis(1));
        let engine = DiscoveryEngine::new(settings, gossip.clone(), Arc::new(resolver));

        assert_eq!(engine.discover().await.unwrap(), ep("10.0.0.2"));
        assert_eq!(gossip.calls_to(&ep("10.0.0.1")), 1);
    }

    #[tokio::test]
    async fn test_unresolvable_seed_counts_as_unreachable() {
        let resolver = ExpandingResolver {
            expansions: HashMap::new(),
        };
        let gossip = Arc::new(ScriptedGossip::new());
        let engine = DiscoveryEngine::new(settings(&["nowhere"], 2), gossip.clone(), Arc::new(resolver));

        assert_eq!(
            engine.discover().await,
            Err(Error::DiscoveryExhausted {
                attempts: 2,
                unreachable: 2
            })
        );
        assert_eq!(gossip.calls(), 0);
    }

    #[tokio::test]
    async fn test_still_eligible() {
        let gossip = Arc::new(ScriptedGossip::new().reply(
            &ep("a"),
            vec![Reply::Members(vec![
                ClusterMember::new(ep("a"), MemberState::Follower, true),
                ClusterMember::new(ep("b"), MemberState::Leader, true),
            ])],
        ));
        let engine = engine(settings(&["a"], 1), gossip);

        assert!(!engine.still_eligible(&ep("a")).await.unwrap());
        assert!(engine.still_eligible(&ep("b")).await.is_err());
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let settings = settings(&["a"], 6)
            .with_discovery_backoff(Duration::from_millis(100), Duration::from_millis(500));

        let delays: Vec<_> = backoff(&settings).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500),
                Duration::from_millis(500),
            ]
        );
    }

    #[test]
    fn test_single_attempt_has_no_backoff() {
        assert_eq!(backoff(&settings(&["a"], 1)).count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_during_pass_returns_to_idle() {
        let gossip = Arc::new(
            ScriptedGossip::new()
                .with_delay(Duration::from_secs(5))
                .reply(&ep("a"), vec![leader("a")]),
        );
        let engine = engine(settings(&["a"], 1), gossip);

        let pending = tokio::spawn({
            let engine = engine.clone();
            async move { engine.discover().await }
        });
        while !engine.is_discovering() {
            tokio::task::yield_now().await;
        }
        engine.shutdown();

        assert_eq!(pending.await.unwrap(), Err(Error::Disposed));
        assert_eq!(engine.state(), DiscoveryState::Idle);
        assert!(!engine.is_discovering());
    }

    #[tokio::test]
    async fn test_discover_after_shutdown() {
        let gossip = Arc::new(ScriptedGossip::new());
        let engine = engine(settings(&["a"], 1), gossip);
        engine.shutdown();
        assert_eq!(engine.discover().await, Err(Error::Disposed));
    }
}
