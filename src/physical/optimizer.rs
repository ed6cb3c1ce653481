//! Co-partitioning optimizer.
//!
//! Decides, from partition descriptors and selector identities alone, whether the
//! Shuffle + Gather phase of a map/reduce plan can be replaced by a local group inside each
//! map partition. The answer must be sound, never merely likely: a wrong "skip" splits a
//! reduce key over several partitions and silently yields partial results. Whenever a proof
//! is not available the plan shuffles.
//!
//! The proof used here: the map inputs are sprayed by a named selector `s`, and the reduce
//! selector `r` determines `s` (same selector, or a registered refinement). Map transforms
//! are expected to keep the named spray key of the rows they emit; that is the contract
//! that gives selector names their meaning.

use crate::physical::merge::MergeVariant;
use crate::selector::SelectorInfo;
use std::fmt::{Display, Formatter, Result as FormatResult};
use tracing::{debug, warn};

/// How one map input is sprayed, as far as the planner is concerned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SprayKind {
    RoundRobin,
    EventKey(Option<String>),
    Payload(String),
    Broadcast,
}

impl Display for SprayKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        match self {
            Self::RoundRobin => f.write_str("round-robin"),
            Self::EventKey(Some(name)) => write!(f, "by event key `{name}`"),
            Self::EventKey(None) => f.write_str("by event key"),
            Self::Payload(name) => write!(f, "by payload `{name}`"),
            Self::Broadcast => f.write_str("broadcast"),
        }
    }
}

/// Everything the optimizer needs to know about one map pipeline.
#[derive(Clone, Debug)]
pub struct SideProfile {
    /// Inputs already live inside a partition.
    pub nested: bool,
    /// The map takes two inputs.
    pub binary: bool,
    /// Two-input map whose left input is broadcast.
    pub left_asymmetric: bool,
    pub left_spray: SprayKind,
    pub right_spray: Option<SprayKind>,
    /// Both inputs of a symmetric two-input map are sprayed by the same named selector.
    /// Trivially true for single-input and asymmetric maps.
    pub co_sprayed: bool,
    /// The named selector governing map partitions, if any.
    pub spray_selector: Option<SelectorInfo>,
    pub reduce_key: SelectorInfo,
    /// The reduce selector determines the spray selector.
    pub reduce_compatible: bool,
    /// Map partitions never share an event key.
    pub disjoint_partitions: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShuffleStrategy {
    /// Re-key, route by reduce key hash, then gather lanes.
    Shuffle,
    /// Group by `(key, reduce key)` inside each map partition.
    LocalGroup,
}

impl Display for ShuffleStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        match self {
            Self::Shuffle => f.write_str("shuffle + gather"),
            Self::LocalGroup => f.write_str("local group"),
        }
    }
}

/// The physical shape chosen for one map pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SideLayout {
    pub map_arity: usize,
    pub reduce_arity: usize,
    pub strategy: ShuffleStrategy,
    /// Merge variant for gather trees; unused by the local group.
    pub gather_variant: MergeVariant,
    pub left_spray: SprayKind,
    pub right_spray: Option<SprayKind>,
}

/// Represents a decision taken while laying out a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizationDecision {
    /// The source already lives in a partition; no further fan-out.
    NestedGuard,
    /// A symmetric two-input map whose inputs are not co-sprayed runs in one partition.
    CollapsedMapArity {
        /// Arity that would otherwise have been used.
        requested: usize,
    },
    /// Shuffle + Gather replaced by a local group.
    SkippedShuffle {
        /// Selector the inputs were sprayed by.
        spray: String,
        /// Reduce selector proven to determine it.
        reduce: String,
    },
    /// Shuffle kept because co-partitioning could not be proven.
    KeptShuffle {
        /// Human-readable reason.
        reason: String,
    },
    /// Gather trees use the disjoint merge.
    DisjointGather,
}

impl Display for OptimizationDecision {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        match self {
            Self::NestedGuard => f.write_str("nested source: map and reduce arity forced to 1"),
            Self::CollapsedMapArity { requested } => {
                write!(f, "inputs not co-sprayed: map arity {requested} → 1")
            }
            Self::SkippedShuffle { spray, reduce } => {
                write!(f, "reduce key `{reduce}` determines spray key `{spray}`: shuffle skipped")
            }
            Self::KeptShuffle { reason } => write!(f, "shuffle kept: {reason}"),
            Self::DisjointGather => f.write_str("map partitions are key-disjoint: disjoint gather merge"),
        }
    }
}

fn keep_reason(profile: &SideProfile) -> String {
    if profile.left_asymmetric {
        return "left input is broadcast".to_string();
    }
    if !profile.co_sprayed {
        return "inputs are not sprayed by the same selector".to_string();
    }
    match &profile.spray_selector {
        None => "inputs carry no named spray selector".to_string(),
        Some(s) => format!("`{}` does not determine `{}`", profile.reduce_key.name(), s.name()),
    }
}

/// Lay out a single map pipeline for configured arities `(m, r)`.
pub fn plan_side(profile: &SideProfile, arity: (usize, usize)) -> (SideLayout, Vec<OptimizationDecision>) {
    let (mut m, r) = arity;
    let mut decisions = Vec::new();
    if profile.nested {
        decisions.push(OptimizationDecision::NestedGuard);
    }
    if profile.binary && !profile.left_asymmetric && !profile.co_sprayed && m > 1 {
        warn!(requested = m, "two-input map inputs are not co-sprayed; map arity collapses to 1");
        decisions.push(OptimizationDecision::CollapsedMapArity { requested: m });
        m = 1;
    }
    let (strategy, reduce_arity) = match (&profile.spray_selector, profile.reduce_compatible) {
        (Some(spray), true) => {
            decisions.push(OptimizationDecision::SkippedShuffle {
                spray: spray.name().to_string(),
                reduce: profile.reduce_key.name().to_string(),
            });
            (ShuffleStrategy::LocalGroup, m)
        }
        _ => {
            decisions.push(OptimizationDecision::KeptShuffle {
                reason: keep_reason(profile),
            });
            (ShuffleStrategy::Shuffle, r)
        }
    };
    let gather_variant = if strategy == ShuffleStrategy::Shuffle && profile.disjoint_partitions && m > 1 {
        decisions.push(OptimizationDecision::DisjointGather);
        MergeVariant::Disjoint
    } else {
        MergeVariant::General
    };
    let layout = SideLayout {
        map_arity: m,
        reduce_arity,
        strategy,
        gather_variant,
        left_spray: profile.left_spray.clone(),
        right_spray: profile.right_spray.clone(),
    };
    debug!(?layout, "laid out map pipeline");
    (layout, decisions)
}

/// Lay out the two pipelines of a two-map plan.
///
/// The local group is kept only if both sides qualify on their own, are sprayed by the same
/// selector, and ended up with the same map arity; their partition `i` then holds the same
/// reduce keys. Otherwise both sides shuffle into the same `r` lanes.
pub fn plan_pair(
    first: &SideProfile,
    second: &SideProfile,
    arity: (usize, usize),
) -> (SideLayout, SideLayout, Vec<OptimizationDecision>) {
    let (mut a, mut da) = plan_side(first, arity);
    let (mut b, db) = plan_side(second, arity);
    da.extend(db);
    let same_selector = match (&first.spray_selector, &second.spray_selector) {
        (Some(x), Some(y)) => x.id().is_some() && x.id() == y.id() && x.key_type() == y.key_type(),
        _ => false,
    };
    let both_local = a.strategy == ShuffleStrategy::LocalGroup && b.strategy == ShuffleStrategy::LocalGroup;
    if both_local && same_selector && a.map_arity == b.map_arity {
        debug!("both pipelines co-partitioned; shuffles skipped");
        return (a, b, da);
    }
    if a.strategy == ShuffleStrategy::LocalGroup || b.strategy == ShuffleStrategy::LocalGroup {
        da.retain(|d| !matches!(d, OptimizationDecision::SkippedShuffle { .. }));
        da.push(OptimizationDecision::KeptShuffle {
            reason: "the two pipelines are not co-partitioned with each other".to_string(),
        });
    }
    let r = arity.1;
    for layout in [&mut a, &mut b] {
        layout.strategy = ShuffleStrategy::Shuffle;
        layout.reduce_arity = r;
    }
    (a, b, da)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::SelectorRegistry;

    fn profile(reg: &SelectorRegistry, spray: Option<&str>, reduce: &str) -> SideProfile {
        let spray_sel = spray.map(|n| {
            reg.selector::<u32, u32, _>(n, |v| *v)
                .unwrap()
                .info()
                .clone()
        });
        let reduce_sel = reg.selector::<u32, u32, _>(reduce, |v| *v).unwrap().info().clone();
        let compatible = spray_sel
            .as_ref()
            .is_some_and(|s| reg.determines(&reduce_sel, s));
        SideProfile {
            nested: false,
            binary: false,
            left_asymmetric: false,
            left_spray: spray.map_or(SprayKind::RoundRobin, |n| SprayKind::Payload(n.to_string())),
            right_spray: None,
            co_sprayed: true,
            spray_selector: spray_sel,
            reduce_key: reduce_sel,
            reduce_compatible: compatible,
            disjoint_partitions: false,
        }
    }

    #[test]
    fn compatible_side_skips_shuffle_and_reuses_map_arity() {
        let reg = SelectorRegistry::new();
        let p = profile(&reg, Some("user"), "user");
        let (layout, decisions) = plan_side(&p, (4, 3));
        assert_eq!(layout.strategy, ShuffleStrategy::LocalGroup);
        assert_eq!(layout.reduce_arity, 4);
        assert!(matches!(decisions[0], OptimizationDecision::SkippedShuffle { .. }));
    }

    #[test]
    fn unrelated_selectors_keep_shuffle() {
        let reg = SelectorRegistry::new();
        let p = profile(&reg, Some("user"), "region");
        let (layout, _) = plan_side(&p, (4, 3));
        assert_eq!(layout.strategy, ShuffleStrategy::Shuffle);
        assert_eq!(layout.reduce_arity, 3);
    }

    #[test]
    fn binary_map_without_co_spray_collapses() {
        let reg = SelectorRegistry::new();
        let mut p = profile(&reg, None, "user");
        p.binary = true;
        p.co_sprayed = false;
        let (layout, decisions) = plan_side(&p, (4, 2));
        assert_eq!(layout.map_arity, 1);
        assert!(decisions.contains(&OptimizationDecision::CollapsedMapArity { requested: 4 }));
    }

    #[test]
    fn pair_falls_back_when_only_one_side_qualifies() {
        let reg = SelectorRegistry::new();
        let a = profile(&reg, Some("user"), "user");
        let b = profile(&reg, None, "user");
        let (la, lb, _) = plan_pair(&a, &b, (4, 2));
        assert_eq!(la.strategy, ShuffleStrategy::Shuffle);
        assert_eq!(lb.strategy, ShuffleStrategy::Shuffle);
        assert_eq!(la.reduce_arity, lb.reduce_arity);
    }
}
