//! Pool-scoped load balancing (spec §4.2).
//!
//! Grounded on the teacher's node-selection in
//! `examples/twilight-rs-twilight/lavalink/src/client.rs`
//! (`PlayerManagerRef::node` picks the node with the fewest players); this
//! generalizes that single heuristic into a pluggable penalty-provider
//! model, since the spec scores nodes on more than player count.

use crate::region::RegionGroup;

/// Anything the balancer can score and select among.
///
/// Kept as a trait rather than depending on the concrete node type directly
/// so the balancer can be exercised without a live socket or REST client.
pub trait PenalizedNode {
    /// Whether the node is currently usable (spec §3 Node `available`).
    fn is_available(&self) -> bool;

    /// The node's own penalty score, from its [`PenaltyTracker`][crate::penalty::PenaltyTracker].
    fn penalty_total(&self) -> i64;

    /// The voice-region group the node was configured with.
    fn region_group(&self) -> RegionGroup;
}

/// A pluggable contributor to a node's selection score (spec §4.2:
/// "`Σ provider.penalty(node, region)` over all registered providers").
pub trait PenaltyProvider: Send + Sync {
    /// The penalty this provider contributes for `node` in `region`.
    fn penalty(&self, node: &dyn PenalizedNode, region: RegionGroup) -> i64;
}

/// Additional penalty applied when a node's configured region group
/// doesn't match the guild's current voice region (spec §4.1).
#[derive(Clone, Copy, Debug, Default)]
pub struct RegionPenaltyProvider;

/// Soft penalty applied when a node's region group doesn't match the
/// guild's voice region, but neither side is unknown.
pub const SOFT_BLOCK: i64 = 1000;

impl PenaltyProvider for RegionPenaltyProvider {
    fn penalty(&self, node: &dyn PenalizedNode, region: RegionGroup) -> i64 {
        let node_region = node.region_group();

        if node_region == RegionGroup::Unknown || region == RegionGroup::Unknown {
            return 0;
        }

        if node_region == region {
            0
        } else {
            SOFT_BLOCK
        }
    }
}

/// Why [`LoadBalancer::select`] failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SelectError {
    /// The single candidate offered was unavailable.
    Unavailable,
    /// No candidate in the set was available.
    NoAvailableNode,
}

impl std::fmt::Display for SelectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => f.write_str("unavailable"),
            Self::NoAvailableNode => f.write_str("no available node"),
        }
    }
}

impl std::error::Error for SelectError {}

/// Picks among a set of candidate nodes (spec §4.2).
pub struct LoadBalancer {
    providers: Vec<Box<dyn PenaltyProvider>>,
}

impl Default for LoadBalancer {
    /// The default configuration registers the region penalty provider
    /// (spec §4.2).
    fn default() -> Self {
        Self { providers: vec![Box::new(RegionPenaltyProvider)] }
    }
}

impl LoadBalancer {
    /// Start from an empty provider list.
    pub fn empty() -> Self {
        Self { providers: Vec::new() }
    }

    /// Register an extra penalty provider.
    pub fn with_provider(mut self, provider: impl PenaltyProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Select the best candidate for `region`.
    ///
    /// Policy (spec §4.2):
    /// - A single unavailable candidate fails with [`SelectError::Unavailable`].
    /// - Otherwise filter to available candidates and minimize
    ///   `node.penalty_total() + Σ provider.penalty(node, region)`, ties
    ///   broken by first-seen order.
    /// - No available candidate fails with [`SelectError::NoAvailableNode`].
    pub fn select<'a, T: PenalizedNode>(
        &self,
        candidates: &'a [T],
        region: RegionGroup,
    ) -> Result<&'a T, SelectError> {
        if let [only] = candidates {
            if !only.is_available() {
                return Err(SelectError::Unavailable);
            }
        }

        candidates
            .iter()
            .filter(|node| node.is_available())
            .min_by_key(|node| self.score(*node, region))
            .ok_or(SelectError::NoAvailableNode)
    }

    fn score(&self, node: &dyn PenalizedNode, region: RegionGroup) -> i64 {
        let provider_penalty: i64 = self.providers.iter().map(|p| p.penalty(node, region)).sum();
        node.penalty_total() + provider_penalty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeNode {
        available: bool,
        penalty: i64,
        region: RegionGroup,
    }

    impl PenalizedNode for FakeNode {
        fn is_available(&self) -> bool {
            self.available
        }

        fn penalty_total(&self) -> i64 {
            self.penalty
        }

        fn region_group(&self) -> RegionGroup {
            self.region
        }
    }

    #[test]
    fn single_unavailable_candidate_fails_unavailable() {
        let balancer = LoadBalancer::default();
        let candidates =
            [FakeNode { available: false, penalty: 0, region: RegionGroup::Unknown }];

        assert_eq!(
            balancer.select(&candidates, RegionGroup::Unknown).unwrap_err(),
            SelectError::Unavailable
        );
    }

    #[test]
    fn no_available_candidates_fails_no_available_node() {
        let balancer = LoadBalancer::default();
        let candidates = [
            FakeNode { available: false, penalty: 0, region: RegionGroup::Unknown },
            FakeNode { available: false, penalty: 0, region: RegionGroup::Unknown },
        ];

        assert_eq!(
            balancer.select(&candidates, RegionGroup::Unknown).unwrap_err(),
            SelectError::NoAvailableNode
        );
    }

    #[test]
    fn picks_the_lowest_penalty_among_available_nodes() {
        let balancer = LoadBalancer::empty();
        let candidates = [
            FakeNode { available: true, penalty: 50, region: RegionGroup::Unknown },
            FakeNode { available: true, penalty: 5, region: RegionGroup::Unknown },
            FakeNode { available: false, penalty: 0, region: RegionGroup::Unknown },
        ];

        let selected = balancer.select(&candidates, RegionGroup::Unknown).unwrap();
        assert_eq!(selected.penalty, 5);
    }

    #[test]
    fn ties_break_by_first_seen_order() {
        let balancer = LoadBalancer::empty();
        let candidates = [
            FakeNode { available: true, penalty: 5, region: RegionGroup::Unknown },
            FakeNode { available: true, penalty: 5, region: RegionGroup::Unknown },
        ];

        let selected = balancer.select(&candidates, RegionGroup::Unknown).unwrap();
        assert!(std::ptr::eq(selected, &candidates[0]));
    }

    #[test]
    fn region_mismatch_applies_soft_block() {
        let balancer = LoadBalancer::default();
        let candidates = [
            FakeNode { available: true, penalty: 0, region: RegionGroup::Europe },
            FakeNode { available: true, penalty: 0, region: RegionGroup::Us },
        ];

        let selected = balancer.select(&candidates, RegionGroup::Us).unwrap();
        assert_eq!(selected.region, RegionGroup::Us);
    }

    #[test]
    fn unknown_region_on_either_side_applies_no_region_penalty() {
        let provider = RegionPenaltyProvider;
        let node = FakeNode { available: true, penalty: 0, region: RegionGroup::Unknown };

        assert_eq!(provider.penalty(&node, RegionGroup::Europe), 0);

        let node = FakeNode { available: true, penalty: 0, region: RegionGroup::Europe };
        assert_eq!(provider.penalty(&node, RegionGroup::Unknown), 0);
    }
}
