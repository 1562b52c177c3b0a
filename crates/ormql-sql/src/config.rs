//! Render-time configuration.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Values a compiled template is rendered against.
///
/// One template is typically rendered many times, each with its own
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlPostCompilerConfiguration {
    /// Placeholder id to rendered text.
    pub placeholder_values: HashMap<String, String>,
    /// Variant ids that render their alternative branch.
    pub alternative_branches: HashSet<String>,
    /// Cycle id to rows; each row feeds `{item:N}` lookups.
    pub dynamic_filter_values: HashMap<String, Vec<Vec<String>>>,
    /// Database name renames for schema-qualified placeholders.
    pub database_mapping: Option<HashMap<String, String>>,
    /// Schema name renames for schema-qualified placeholders.
    pub schema_mapping: Option<HashMap<String, String>>,
}

impl SqlPostCompilerConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_placeholder(mut self, id: impl Into<String>, value: impl Into<String>) -> Self {
        self.placeholder_values.insert(id.into(), value.into());
        self
    }

    pub fn with_alternative(mut self, id: impl Into<String>) -> Self {
        self.alternative_branches.insert(id.into());
        self
    }

    pub fn with_cycle_values(mut self, id: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        self.dynamic_filter_values.insert(id.into(), rows);
        self
    }

    /// Rename database `from` to `to`, creating the mapping if absent.
    pub fn with_database_mapping(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.database_mapping
            .get_or_insert_with(HashMap::new)
            .insert(from.into(), to.into());
        self
    }

    /// Rename schema `from` to `to`, creating the mapping if absent.
    pub fn with_schema_mapping(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.schema_mapping
            .get_or_insert_with(HashMap::new)
            .insert(from.into(), to.into());
        self
    }

    /// Install empty mappings, so qualified names render unchanged.
    pub fn with_identity_mappings(mut self) -> Self {
        self.database_mapping.get_or_insert_with(HashMap::new);
        self.schema_mapping.get_or_insert_with(HashMap::new);
        self
    }

    pub fn is_alternative(&self, id: &str) -> bool {
        self.alternative_branches.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = SqlPostCompilerConfiguration::new()
            .with_placeholder("tbl", "Users")
            .with_alternative("active")
            .with_cycle_values("ids", vec![vec!["1".into()]])
            .with_schema_mapping("dbo", "sales");

        assert_eq!(config.placeholder_values["tbl"], "Users");
        assert!(config.is_alternative("active"));
        assert!(!config.is_alternative("other"));
        assert_eq!(config.dynamic_filter_values["ids"].len(), 1);
        assert!(config.database_mapping.is_none());
        assert_eq!(
            config.schema_mapping.as_ref().map(|m| m["dbo"].as_str()),
            Some("sales")
        );
    }

    #[test]
    fn test_missing_fields_default_when_deserializing() {
        let config: SqlPostCompilerConfiguration =
            serde_json::from_str(r#"{"placeholder_values": {"tbl": "Users"}}"#).unwrap();
        assert_eq!(config.placeholder_values.len(), 1);
        assert!(config.alternative_branches.is_empty());
        assert!(config.schema_mapping.is_none());
    }
}
