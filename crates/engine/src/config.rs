// Contour - Execution Trace Reconstruction
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::ExclusionFilter;

/// Number of events the importer buffers before appending them to the model
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Types excluded from the model unless configured otherwise
pub const DEFAULT_EXCLUSIONS: &[&str] = &["java.*", "javax.*", "sun.*", "jdk.*", "com.sun.*"];

/// Configuration for the reconstruction engine.
///
/// Shared by the live dispatcher and the offline importer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Events buffered by the importer per append
    pub batch_size: usize,
    /// Exclusion patterns of the default model filter (`pkg.*` or exact names)
    pub exclusions: Vec<String>,
    /// Skip variable assignments that do not change the observed value
    pub suppress_redundant_assignments: bool,
    /// Replace calls to synthetic accessors with a single field event
    pub collapse_synthetic_accessors: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            exclusions: DEFAULT_EXCLUSIONS.iter().map(|pattern| pattern.to_string()).collect(),
            suppress_redundant_assignments: true,
            collapse_synthetic_accessors: true,
        }
    }
}

impl EngineConfig {
    /// Set the importer batch size (values below 1 are raised to 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Replace the exclusion patterns
    pub fn with_exclusions<I, S>(mut self, exclusions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions = exclusions.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable suppression of redundant variable assignments
    pub fn with_redundant_assignment_suppression(mut self, suppress: bool) -> Self {
        self.suppress_redundant_assignments = suppress;
        self
    }

    /// Enable or disable collapsing of synthetic accessors
    pub fn with_synthetic_accessor_collapsing(mut self, collapse: bool) -> Self {
        self.collapse_synthetic_accessors = collapse;
        self
    }

    /// Model filter built from the exclusion patterns
    pub fn exclusion_filter(&self) -> ExclusionFilter {
        ExclusionFilter::new(&self.exclusions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModelFilter;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.batch_size, 100);
        assert!(config.suppress_redundant_assignments);
        assert!(config.collapse_synthetic_accessors);
        assert!(config.exclusions.iter().any(|p| p == "java.*"));
    }

    #[test]
    fn test_builder_methods() {
        let config = EngineConfig::default()
            .with_batch_size(0)
            .with_exclusions(["org.junit.*"])
            .with_redundant_assignment_suppression(false);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.exclusions, vec!["org.junit.*".to_string()]);
        assert!(!config.suppress_redundant_assignments);

        let filter = config.exclusion_filter();
        assert!(!filter.accepts_type("org.junit.Assert"));
        assert!(filter.accepts_type("java.lang.String"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"batch_size": 25}"#).unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.exclusions.len(), DEFAULT_EXCLUSIONS.len());
    }
}
