//! Mutation engine configuration

use crate::catalog::MutationKind;
use crate::error::{MutationError, Result};
use serde::{Deserialize, Serialize};

/// Tuning knobs for the catalog and selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Kinds the selector must never pick
    pub disabled: Vec<MutationKind>,

    /// Longest run written by `ReplaceRunWithConstant`
    pub max_run_len: usize,

    /// Bias compression method values toward known and clearly-invalid codes
    pub bias_compression_method: bool,

    /// Upper bound on stacked mutations per candidate
    pub max_stack: usize,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            disabled: Vec::new(),
            max_run_len: 64,
            bias_compression_method: true,
            max_stack: 4,
        }
    }
}

impl MutationConfig {
    /// Every kind except header insertion, so output length always matches input
    pub fn length_preserving() -> Self {
        Self {
            disabled: vec![MutationKind::InsertSyntheticHeader],
            ..Default::default()
        }
    }

    /// Builder: disable a kind
    pub fn without(mut self, kind: MutationKind) -> Self {
        if !self.disabled.contains(&kind) {
            self.disabled.push(kind);
        }
        self
    }

    /// Builder: allow only the given kinds
    pub fn only(mut self, kinds: &[MutationKind]) -> Self {
        self.disabled = MutationKind::ALL
            .into_iter()
            .filter(|k| !kinds.contains(k))
            .collect();
        self
    }

    /// Builder: set the run length cap
    pub fn with_max_run_len(mut self, len: usize) -> Self {
        self.max_run_len = len;
        self
    }

    /// Builder: set the stacking cap
    pub fn with_max_stack(mut self, depth: usize) -> Self {
        self.max_stack = depth;
        self
    }

    /// Builder: toggle compression method bias
    pub fn with_compression_bias(mut self, bias: bool) -> Self {
        self.bias_compression_method = bias;
        self
    }

    pub fn is_enabled(&self, kind: MutationKind) -> bool {
        !self.disabled.contains(&kind)
    }

    /// Reject configurations that could leave the selector with nothing to pick
    pub fn validate(&self) -> Result<()> {
        if !MutationKind::ALL
            .into_iter()
            .any(|k| k.required_target().is_none() && self.is_enabled(k))
        {
            return Err(MutationError::InvalidConfig(
                "at least one untargeted mutation kind must stay enabled".into(),
            ));
        }
        if self.max_run_len == 0 {
            return Err(MutationError::InvalidConfig("max_run_len must be at least 1".into()));
        }
        if self.max_stack == 0 {
            return Err(MutationError::InvalidConfig("max_stack must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MutationConfig::default();
        assert!(config.validate().is_ok());
        assert!(MutationKind::ALL.iter().all(|k| config.is_enabled(*k)));
    }

    #[test]
    fn test_builder() {
        let config = MutationConfig::default()
            .without(MutationKind::FlipRandomBits)
            .without(MutationKind::FlipRandomBits)
            .with_max_run_len(8)
            .with_max_stack(2);

        assert_eq!(config.disabled, vec![MutationKind::FlipRandomBits]);
        assert_eq!(config.max_run_len, 8);
        assert_eq!(config.max_stack, 2);
    }

    #[test]
    fn test_rejects_structure_only_selection() {
        let config = MutationConfig::default().only(&[
            MutationKind::MutateChecksum,
            MutationKind::MutateSizeFields,
        ]);
        assert!(matches!(config.validate(), Err(MutationError::InvalidConfig(_))));

        let config = MutationConfig::default().with_max_run_len(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip_with_defaults() {
        let config: MutationConfig =
            serde_json::from_str(r#"{ "disabled": ["set_boundary_byte"] }"#).unwrap();
        assert_eq!(config.disabled, vec![MutationKind::SetBoundaryByte]);
        assert_eq!(config.max_run_len, 64);
    }
}
