//! Mutation selection
//!
//! Picks one applicable kind per draw. Structure-aware kinds are only offered
//! when the scan found a record they can be aimed at, so every selection is a
//! legal request.

use crate::catalog::MutationKind;
use crate::config::MutationConfig;
use crate::rng::RandomnessSource;
use crate::scanner::{OffsetMap, SignatureKind, SignatureOccurrence};

/// A chosen kind and, for structure-aware kinds, its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub kind: MutationKind,
    pub target: Option<SignatureOccurrence>,
}

/// Uniform selector over the enabled kinds
#[derive(Debug, Clone)]
pub struct MutationSelector {
    enabled: [bool; MutationKind::ALL.len()],
}

impl MutationSelector {
    pub fn new(config: &MutationConfig) -> Self {
        let mut enabled = [true; MutationKind::ALL.len()];
        for kind in &config.disabled {
            enabled[kind.index()] = false;
        }
        Self { enabled }
    }

    pub fn is_enabled(&self, kind: MutationKind) -> bool {
        self.enabled[kind.index()]
    }

    /// Enabled kinds that can run against this scan, in catalog order
    pub fn applicable(&self, map: &OffsetMap) -> Vec<MutationKind> {
        MutationKind::ALL
            .into_iter()
            .filter(|&k| self.is_enabled(k))
            .filter(|k| k.required_target().is_none_or(|needs| map.has(needs)))
            .collect()
    }

    /// Draw a kind uniformly among the applicable ones, then a target
    /// uniformly among the matching occurrences.
    ///
    /// Returns `None` only when nothing is applicable, which a validated
    /// config rules out.
    pub fn select(&self, map: &OffsetMap, rng: &mut RandomnessSource) -> Option<Selection> {
        let applicable = self.applicable(map);
        let kind = *rng.choose(&applicable)?;
        let target = match kind.required_target() {
            Some(needs) => Some(pick_target(map, needs, rng)?),
            None => None,
        };
        Some(Selection { kind, target })
    }
}

/// Uniform pick among the occurrences of one kind
pub(crate) fn pick_target(
    map: &OffsetMap,
    needs: SignatureKind,
    rng: &mut RandomnessSource,
) -> Option<SignatureOccurrence> {
    let candidates: Vec<SignatureOccurrence> = map.of_kind(needs).copied().collect();
    rng.choose(&candidates).copied()
}
