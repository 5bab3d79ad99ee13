//! Analysis options shared by every entry point.

use eyre::{eyre, Result};
use flow_data::{Business, EventLedger};
use serde::{Deserialize, Serialize};

use crate::paths::PathLimits;

/// Rows per ranked report.
pub const DEFAULT_TOP: usize = 10;
/// Global cap on enumerated paths and cycles.
pub const DEFAULT_MAX_PATHS: usize = 10_000;
/// Hop cap for general flow tracing.
pub const DEFAULT_PATH_DEPTH: usize = 6;
/// Hop cap for the token-constrained laundering trace.
pub const DEFAULT_LAUNDERING_DEPTH: usize = 7;
/// PageRank damping factor.
pub const DEFAULT_DAMPING: f64 = 0.85;
/// PageRank iteration count (fixed, not convergence-driven).
pub const DEFAULT_ITERATIONS: usize = 25;

/// Restricts single-business analyses to one business.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BusinessSelector {
    /// Owner address (case-insensitive).
    Owner(String),
    /// Brand name (case-insensitive).
    Brand(String),
}

impl BusinessSelector {
    pub fn resolve<'l>(&self, ledger: &'l EventLedger) -> Option<&'l Business> {
        match self {
            BusinessSelector::Owner(owner) => ledger.business_by_owner(owner),
            BusinessSelector::Brand(brand) => ledger.business_by_brand(brand),
        }
    }
}

/// Options recognized by the analyses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisConfig {
    pub top: usize,
    pub max_paths: usize,
    /// Overrides the per-analysis hop cap when set.
    pub max_depth: Option<usize>,
    pub damping: f64,
    pub iterations: usize,
    pub business: Option<BusinessSelector>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top: DEFAULT_TOP,
            max_paths: DEFAULT_MAX_PATHS,
            max_depth: None,
            damping: DEFAULT_DAMPING,
            iterations: DEFAULT_ITERATIONS,
            business: None,
        }
    }
}

impl AnalysisConfig {
    /// Rejects option values that would make an analysis meaningless or unbounded.
    ///
    /// # Errors
    /// Returns error naming the first invalid option.
    pub fn validate(&self) -> Result<()> {
        if self.top == 0 {
            return Err(eyre!("top must be at least 1"));
        }
        if self.max_paths == 0 {
            return Err(eyre!("max-paths must be at least 1"));
        }
        if self.max_depth == Some(0) {
            return Err(eyre!("max-depth must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.damping) {
            return Err(eyre!("damping must be within [0, 1], got {}", self.damping));
        }
        Ok(())
    }

    /// Search caps for an analysis whose own default depth is `default_depth`.
    pub fn path_limits(&self, default_depth: usize) -> PathLimits {
        PathLimits {
            max_depth: self.max_depth.unwrap_or(default_depth),
            max_paths: self.max_paths,
        }
    }

    /// Resolves the configured business selector.
    ///
    /// # Errors
    /// Returns error if no selector is set or it matches no business.
    pub fn selected_business<'l>(&self, ledger: &'l EventLedger) -> Result<&'l Business> {
        let selector = self
            .business
            .as_ref()
            .ok_or_else(|| eyre!("a business owner address or brand is required"))?;
        selector
            .resolve(ledger)
            .ok_or_else(|| eyre!("no business matches {selector:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_report_compatibility_values() {
        let config = AnalysisConfig::default();
        assert_eq!(config.top, 10);
        assert_eq!(config.max_paths, 10_000);
        assert_eq!(config.iterations, 25);
        assert!((config.damping - 0.85).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn depth_override_applies_to_every_analysis() {
        let config = AnalysisConfig {
            max_depth: Some(3),
            ..AnalysisConfig::default()
        };
        assert_eq!(config.path_limits(DEFAULT_PATH_DEPTH).max_depth, 3);
        assert_eq!(config.path_limits(DEFAULT_LAUNDERING_DEPTH).max_depth, 3);
        assert_eq!(
            AnalysisConfig::default()
                .path_limits(DEFAULT_LAUNDERING_DEPTH)
                .max_depth,
            7
        );
    }

    #[test]
    fn invalid_values_rejected() {
        let bad_damping = AnalysisConfig {
            damping: 1.5,
            ..AnalysisConfig::default()
        };
        assert!(bad_damping.validate().is_err());

        let zero_cap = AnalysisConfig {
            max_paths: 0,
            ..AnalysisConfig::default()
        };
        assert!(zero_cap.validate().is_err());
    }

    #[test]
    fn missing_selector_is_an_error() {
        let ledger = EventLedger::default();
        assert!(AnalysisConfig::default().selected_business(&ledger).is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"top":5,"business":{"brand":"Bakery"}}"#).expect("config");
        assert_eq!(config.top, 5);
        assert_eq!(config.iterations, DEFAULT_ITERATIONS);
        assert_eq!(
            config.business,
            Some(BusinessSelector::Brand("Bakery".to_string()))
        );
    }
}
