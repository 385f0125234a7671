use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use quorum_core::{ClusterMember, Endpoint, MemberState, NodePreference};

/// Picks the member a client should talk to.
///
/// The random source is seeded once at construction so that clients spread
/// across followers instead of all landing on the first one.
pub struct NodeSelector {
    rng: Mutex<StdRng>,
}

impl NodeSelector {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn select(
        &self,
        members: &[ClusterMember],
        preference: NodePreference,
    ) -> Option<Endpoint> {
        let selected = match preference {
            NodePreference::Leader => members
                .iter()
                .find(|m| m.is_alive && m.state == MemberState::Leader),
            NodePreference::Follower
            | NodePreference::ReadOnlyReplica
            | NodePreference::Random => {
                let eligible: Vec<&ClusterMember> =
                    members.iter().filter(|m| preference.accepts(m)).collect();
                let mut rng = self.rng.lock();
                eligible.choose(&mut *rng).copied()
            }
        };

        match selected {
            Some(member) => {
                debug!(
                    "selected {} ({:?}) for preference {}",
                    member.endpoint, member.state, preference
                );
                Some(member.endpoint.clone())
            }
            None => {
                debug!(
                    "no eligible member among {} for preference {}",
                    members.len(),
                    preference
                );
                None
            }
        }
    }
}

impl Default for NodeSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn member(port: u16, state: MemberState, alive: bool) -> ClusterMember {
        ClusterMember::new(Endpoint::new("10.0.0.1", port), state, alive)
    }

    #[test]
    fn test_select_single_leader() {
        let members = vec![
            member(1, MemberState::Follower, true),
            member(2, MemberState::Leader, true),
            member(3, MemberState::Follower, true),
        ];
        let selector = NodeSelector::new();
        for _ in 0..50 {
            assert_eq!(
                selector.select(&members, NodePreference::Leader),
                Some(Endpoint::new("10.0.0.1", 2))
            );
        }
    }

    #[test]
    fn test_select_dead_leader_is_ineligible() {
        let members = vec![
            member(1, MemberState::Leader, false),
            member(2, MemberState::Follower, true),
        ];
        let selector = NodeSelector::new();
        assert_eq!(selector.select(&members, NodePreference::Leader), None);
    }

    #[test]
    fn test_select_none_eligible() {
        let members = vec![
            member(1, MemberState::Leader, true),
            member(2, MemberState::Follower, false),
            member(3, MemberState::Manager, true),
        ];
        let selector = NodeSelector::new();
        assert_eq!(selector.select(&members, NodePreference::Follower), None);
        assert_eq!(selector.select(&members, NodePreference::ReadOnlyReplica), None);
        assert_eq!(selector.select(&[], NodePreference::Random), None);
    }

    #[test]
    fn test_select_follower_never_dead() {
        let members = vec![
            member(1, MemberState::Leader, true),
            member(2, MemberState::Follower, true),
            member(3, MemberState::Follower, true),
            member(4, MemberState::Follower, false),
        ];
        let selector = NodeSelector::new();
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let selected = selector
                .select(&members, NodePreference::Follower)
                .unwrap();
            assert_ne!(selected.port, 4);
            assert_ne!(selected.port, 1);
            seen.insert(selected.port);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_select_read_only_replica() {
        let members = vec![
            member(1, MemberState::Leader, true),
            member(2, MemberState::ReadOnlyReplica, true),
        ];
        let selector = NodeSelector::with_seed(7);
        assert_eq!(
            selector.select(&members, NodePreference::ReadOnlyReplica),
            Some(Endpoint::new("10.0.0.1", 2))
        );
    }

    #[test]
    fn test_select_random_spreads_over_alive() {
        let members = vec![
            member(1, MemberState::Leader, true),
            member(2, MemberState::Manager, true),
            member(3, MemberState::Follower, false),
        ];
        let selector = NodeSelector::with_seed(42);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.insert(selector.select(&members, NodePreference::Random).unwrap().port);
        }
        assert_eq!(seen, HashSet::from([1, 2]));
    }

    #[test]
    fn test_seeded_selectors_repeat() {
        let members: Vec<_> = (1..=5)
            .map(|p| member(p, MemberState::Follower, true))
            .collect();
        let a = NodeSelector::with_seed(9);
        let b = NodeSelector::with_seed(9);
        for _ in 0..20 {
            assert_eq!(
                a.select(&members, NodePreference::Follower),
                b.select(&members, NodePreference::Follower)
            );
        }
    }
}
