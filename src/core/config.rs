//! Diagram configuration.
//!
//! `VisualConfig` is the user-facing color scheme. `DiagramConfig` bundles it
//! with the layout, routing and refresh settings; load it with
//! `DiagramConfig::load()` (reads `.env` via `dotenvy`, then the environment)
//! or `DiagramConfig::from_json()`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::auto_layout::LayoutConfig;
use crate::core::edge_routing::RoutingConfig;
use crate::core::error::ConfigError;
use crate::core::schema::RelationType;

/// Default quiescence delay before edges are recomputed
pub const DEFAULT_REFRESH_DELAY_MS: u64 = 120;

pub const ENV_REFRESH_DELAY_MS: &str = "SCHEMAFLOW_REFRESH_DELAY_MS";
pub const ENV_NODE_WIDTH: &str = "SCHEMAFLOW_NODE_WIDTH";
pub const ENV_HORIZONTAL_SPACING: &str = "SCHEMAFLOW_HORIZONTAL_SPACING";
pub const ENV_VERTICAL_SPACING: &str = "SCHEMAFLOW_VERTICAL_SPACING";

/// Edge color per relationship type
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipColors {
    #[serde(rename = "1:1")]
    pub one_to_one: String,
    #[serde(rename = "1:N")]
    pub one_to_many: String,
    #[serde(rename = "N:M")]
    pub many_to_many: String,
    /// Used for any type not listed above
    pub default: String,
}

impl Default for RelationshipColors {
    fn default() -> Self {
        Self {
            one_to_one: "#10b981".to_string(),
            one_to_many: "#6366f1".to_string(),
            many_to_many: "#f43f5e".to_string(),
            default: "#64748b".to_string(),
        }
    }
}

/// User-facing visual settings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualConfig {
    #[serde(default)]
    pub relationship_colors: RelationshipColors,
}

impl VisualConfig {
    /// Color for a relationship type, falling back to the default color
    pub fn color_for(&self, relation_type: &RelationType) -> &str {
        let colors = &self.relationship_colors;
        match relation_type {
            RelationType::OneToOne => &colors.one_to_one,
            RelationType::OneToMany => &colors.one_to_many,
            RelationType::ManyToMany => &colors.many_to_many,
            RelationType::Other(_) => &colors.default,
        }
    }
}

/// Everything the diagram pipeline can be tuned with
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiagramConfig {
    pub visual: VisualConfig,
    pub layout: LayoutConfig,
    pub routing: RoutingConfig,
    /// Quiescence delay of the edge refresh scheduler, in milliseconds
    pub refresh_delay_ms: u64,
}

impl Default for DiagramConfig {
    fn default() -> Self {
        Self {
            visual: VisualConfig::default(),
            layout: LayoutConfig::default(),
            routing: RoutingConfig::default(),
            refresh_delay_ms: DEFAULT_REFRESH_DELAY_MS,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        })
}

impl DiagramConfig {
    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    /// Parse a JSON config; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply overrides from `(key, value)` pairs; unknown keys are ignored
    pub fn with_overrides<I>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                ENV_REFRESH_DELAY_MS => self.refresh_delay_ms = parse_var(&key, value)?,
                ENV_NODE_WIDTH => {
                    let width: f64 = parse_var(&key, value)?;
                    self.layout.node_width = width;
                    self.routing.fallback_node_width = width;
                }
                ENV_HORIZONTAL_SPACING => {
                    self.layout.horizontal_spacing = parse_var(&key, value)?
                }
                ENV_VERTICAL_SPACING => self.layout.vertical_spacing = parse_var(&key, value)?,
                _ => {}
            }
        }
        Ok(self)
    }

    /// Defaults overridden by `SCHEMAFLOW_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(std::env::vars())
    }

    /// Load `.env` (if present), then read the environment
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let config = Self::from_env()?;
        tracing::info!(
            "Diagram config loaded: refresh_delay={}ms, node_width={}",
            config.refresh_delay_ms,
            config.layout.node_width
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_colors() {
        let visual = VisualConfig::default();
        assert_eq!(visual.color_for(&RelationType::OneToOne), "#10b981");
        assert_eq!(visual.color_for(&RelationType::OneToMany), "#6366f1");
        assert_eq!(visual.color_for(&RelationType::ManyToMany), "#f43f5e");
        assert_eq!(
            visual.color_for(&RelationType::Other("1:0".into())),
            "#64748b"
        );
    }

    #[test]
    fn test_visual_config_json_shape() {
        let json = r##"{"relationshipColors":{"1:1":"#000","1:N":"#111","N:M":"#222","default":"#333"}}"##;
        let visual: VisualConfig = serde_json::from_str(json).unwrap();
        assert_eq!(visual.color_for(&RelationType::OneToMany), "#111");
        assert_eq!(serde_json::to_string(&visual).unwrap(), json);
    }

    #[test]
    fn test_diagram_config_default() {
        let config = DiagramConfig::default();
        assert_eq!(config.refresh_delay(), Duration::from_millis(120));
        assert_eq!(config.layout, LayoutConfig::default());
        assert_eq!(config.routing.fallback_node_width, 320.0);
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            DiagramConfig::from_json(r#"{"refreshDelayMs": 50, "layout": {"nodeWidth": 280}}"#)
                .unwrap();
        assert_eq!(config.refresh_delay_ms, 50);
        assert_eq!(config.layout.node_width, 280.0);
        assert_eq!(config.layout.horizontal_spacing, 250.0);
        assert_eq!(config.visual, VisualConfig::default());
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(matches!(
            DiagramConfig::from_json("not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let config = DiagramConfig::default()
            .with_overrides(vars(&[
                (ENV_REFRESH_DELAY_MS, "200"),
                (ENV_NODE_WIDTH, " 280 "),
                (ENV_VERTICAL_SPACING, "90.5"),
                ("PATH", "/usr/bin"),
            ]))
            .unwrap();

        assert_eq!(config.refresh_delay_ms, 200);
        assert_eq!(config.layout.node_width, 280.0);
        assert_eq!(config.routing.fallback_node_width, 280.0);
        assert_eq!(config.layout.vertical_spacing, 90.5);
        assert_eq!(config.layout.horizontal_spacing, 250.0);
    }

    #[test]
    fn test_invalid_override() {
        let err = DiagramConfig::default()
            .with_overrides(vars(&[(ENV_REFRESH_DELAY_MS, "soon")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for SCHEMAFLOW_REFRESH_DELAY_MS: 'soon'"
        );
    }

    #[test]
    fn test_from_env_returns_config() {
        // Values depend on the environment; only check that loading works
        // when no SCHEMAFLOW_* variable is malformed.
        if std::env::vars().any(|(k, _)| k.starts_with("SCHEMAFLOW_")) {
            return;
        }
        assert_eq!(DiagramConfig::from_env().unwrap(), DiagramConfig::default());
    }
}
