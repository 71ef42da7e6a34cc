//! Agent Routing Module
//!
//! Maps public model identifiers to the Blackbox agent that serves them:
//! - Built-in table for the SYMBI agent line-up
//! - Optional JSON routing file replacing the built-in table at startup
//! - Per-model metadata published by `GET /models`
//!
//! The table is built once and shared read-only; lookups never perform I/O.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::models::model_list::{ModelCard, ModelList};

/// Backend agent selected for a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent identifier understood by the Blackbox (e.g. "intelligence_analyst")
    pub agent: String,
    /// Single-letter sensitivity tag
    pub classification: String,
    /// Access compartments, order preserved
    pub compartments: Vec<String>,
}

impl AgentConfig {
    pub fn new(agent: &str, classification: &str, compartments: &[&str]) -> Self {
        Self {
            agent: agent.to_string(),
            classification: classification.to_string(),
            compartments: compartments.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// One row of the routing table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRoute {
    /// Public model identifier
    pub id: String,

    #[serde(flatten)]
    pub agent: AgentConfig,

    #[serde(default = "default_context_length")]
    pub context_length: u32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_context_length() -> u32 {
    32_768
}

fn default_max_output_tokens() -> u32 {
    4_096
}

fn default_owned_by() -> String {
    "symbi".to_string()
}

impl ModelRoute {
    pub fn new(id: &str, agent: AgentConfig) -> Self {
        Self {
            id: id.to_string(),
            agent,
            context_length: default_context_length(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// On-disk layout of a routing file.
#[derive(Debug, Deserialize)]
struct RoutingFile {
    #[serde(default = "default_owned_by")]
    owned_by: String,
    models: Vec<ModelRoute>,
    #[serde(default)]
    monitored_agents: Vec<String>,
}

/// Immutable model → agent table.
#[derive(Debug, Clone)]
pub struct AgentRoutingTable {
    owned_by: String,
    routes: Vec<ModelRoute>,
    /// Agents reported by the health endpoint without serving a model
    monitored: Vec<String>,
}

impl AgentRoutingTable {
    /// The built-in SYMBI agent line-up.
    pub fn builtin() -> Self {
        Self {
            owned_by: default_owned_by(),
            routes: vec![
                ModelRoute::new(
                    "symbi-intel-analyst-001",
                    AgentConfig::new("intelligence_analyst", "C", &["OPS"]),
                ),
                ModelRoute::new(
                    "symbi-cyber-sentinel-001",
                    AgentConfig::new("cybersecurity_sentinel", "S", &["OPS", "GOVNET"]),
                ),
                ModelRoute::new(
                    "symbi-field-commander-001",
                    AgentConfig::new("field_commander", "C", &["OPS"]),
                ),
            ],
            monitored: vec!["overseer_liaison".to_string()],
        }
    }

    /// Build a table from explicit routes, rejecting ambiguous or malformed rows.
    pub fn from_routes(owned_by: impl Into<String>, routes: Vec<ModelRoute>) -> Result<Self> {
        Self::validate(&routes)?;

        Ok(Self {
            owned_by: owned_by.into(),
            routes,
            monitored: Vec::new(),
        })
    }

    /// Also report `agents` in health listings, after the routed ones.
    pub fn with_monitored_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.monitored = agents
            .into_iter()
            .map(Into::into)
            .filter(|agent: &String| !agent.trim().is_empty())
            .collect();
        self
    }

    fn validate(routes: &[ModelRoute]) -> Result<()> {
        let mut seen = HashSet::new();
        for route in routes {
            if route.id.trim().is_empty() {
                bail!("routing entry with empty model id");
            }
            if !seen.insert(route.id.as_str()) {
                bail!("duplicate model id in routing table: {}", route.id);
            }
            if route.agent.agent.trim().is_empty() {
                bail!("model {} has no agent", route.id);
            }
            let mut chars = route.agent.classification.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => {}
                _ => bail!(
                    "model {} has invalid classification {:?}; expected a single letter",
                    route.id,
                    route.agent.classification
                ),
            }
        }
        Ok(())
    }

    /// Load a routing table from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read routing file {}: {}", path.display(), e))?;
        let file: RoutingFile = serde_json::from_str(&content)
            .map_err(|e| anyhow!("invalid routing file {}: {}", path.display(), e))?;
        let table = Self::from_routes(file.owned_by, file.models)?
            .with_monitored_agents(file.monitored_agents);
        tracing::info!(
            "Loaded {} model routes from {}",
            table.routes.len(),
            path.display()
        );
        Ok(table)
    }

    /// Resolve a public model id to its agent.
    pub fn resolve(&self, model: &str) -> Option<&AgentConfig> {
        self.routes
            .iter()
            .find(|route| route.id == model)
            .map(|route| &route.agent)
    }

    /// All known model ids, in table order.
    pub fn list_models(&self) -> Vec<&str> {
        self.routes.iter().map(|route| route.id.as_str()).collect()
    }

    pub fn routes(&self) -> &[ModelRoute] {
        &self.routes
    }

    pub fn owned_by(&self) -> &str {
        &self.owned_by
    }

    /// Distinct agent ids: routed agents first, then monitored-only ones.
    pub fn agents(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.routes
            .iter()
            .map(|route| route.agent.agent.as_str())
            .chain(self.monitored.iter().map(String::as_str))
            .filter(|agent| seen.insert(*agent))
            .collect()
    }

    /// Render the `GET /models` listing.
    pub fn model_list(&self, created: i64) -> ModelList {
        let data = self
            .routes
            .iter()
            .map(|route| ModelCard {
                id: route.id.clone(),
                object: "model".to_string(),
                created,
                owned_by: self.owned_by.clone(),
                context_length: route.context_length,
                max_output_tokens: route.max_output_tokens,
            })
            .collect();

        ModelList {
            object: "list".to_string(),
            data,
        }
    }
}

impl Default for AgentRoutingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn every_listed_model_resolves() {
        let table = AgentRoutingTable::builtin();
        let models = table.list_models();
        assert_eq!(models.len(), 3);
        for model in models {
            assert!(table.resolve(model).is_some(), "{model} should resolve");
        }
    }

    #[test]
    fn builtin_sentinel_route() {
        let table = AgentRoutingTable::builtin();
        let cfg = table.resolve("symbi-cyber-sentinel-001").unwrap();
        assert_eq!(cfg.agent, "cybersecurity_sentinel");
        assert_eq!(cfg.classification, "S");
        assert_eq!(cfg.compartments, vec!["OPS", "GOVNET"]);
    }

    #[test]
    fn unknown_model_is_not_found() {
        let table = AgentRoutingTable::builtin();
        assert!(table.resolve("gpt-4o").is_none());
        assert!(table.resolve("").is_none());
    }

    #[test]
    fn agents_are_deduplicated_in_order() {
        let table = AgentRoutingTable::from_routes(
            "test",
            vec![
                ModelRoute::new("a", AgentConfig::new("alpha", "C", &[])),
                ModelRoute::new("b", AgentConfig::new("beta", "S", &[])),
                ModelRoute::new("c", AgentConfig::new("alpha", "C", &[])),
            ],
        )
        .unwrap();
        assert_eq!(table.agents(), vec!["alpha", "beta"]);
    }

    #[test]
    fn builtin_health_includes_overseer() {
        let table = AgentRoutingTable::builtin();
        assert_eq!(
            table.agents(),
            vec![
                "intelligence_analyst",
                "cybersecurity_sentinel",
                "field_commander",
                "overseer_liaison"
            ]
        );
        assert!(table.resolve("overseer_liaison").is_none());
    }

    #[test]
    fn monitored_agents_follow_routed_ones_without_duplicates() {
        let table = AgentRoutingTable::from_routes(
            "test",
            vec![ModelRoute::new("a", AgentConfig::new("alpha", "C", &[]))],
        )
        .unwrap()
        .with_monitored_agents(["watcher", "alpha", " "]);
        assert_eq!(table.agents(), vec!["alpha", "watcher"]);
        assert_eq!(table.list_models(), vec!["a"]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = AgentRoutingTable::from_routes(
            "test",
            vec![
                ModelRoute::new("a", AgentConfig::new("alpha", "C", &[])),
                ModelRoute::new("a", AgentConfig::new("beta", "S", &[])),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn classification_must_be_single_letter() {
        let err = AgentRoutingTable::from_routes(
            "test",
            vec![ModelRoute::new("a", AgentConfig::new("alpha", "TS", &[]))],
        )
        .unwrap_err();
        assert!(err.to_string().contains("classification"));
    }

    #[test]
    fn model_list_carries_metadata() {
        let list = AgentRoutingTable::builtin().model_list(1_700_000_000);
        assert_eq!(list.object, "list");
        assert_eq!(list.data.len(), 3);
        let first = &list.data[0];
        assert_eq!(first.id, "symbi-intel-analyst-001");
        assert_eq!(first.object, "model");
        assert_eq!(first.owned_by, "symbi");
        assert_eq!(first.context_length, 32_768);
        assert_eq!(first.max_output_tokens, 4_096);
        assert_eq!(first.created, 1_700_000_000);
    }

    #[test]
    fn loads_routes_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "owned_by": "acme",
                "models": [
                    {{"id": "acme-ops-1", "agent": "ops_bot", "classification": "U",
                      "compartments": ["OPS"], "context_length": 8192}}
                ],
                "monitored_agents": ["ops_overseer"]
            }}"#
        )
        .unwrap();

        let table = AgentRoutingTable::load_from_file(file.path()).unwrap();
        assert_eq!(table.owned_by(), "acme");
        let route = &table.routes()[0];
        assert_eq!(route.context_length, 8192);
        assert_eq!(route.max_output_tokens, 4_096);
        assert_eq!(table.resolve("acme-ops-1").unwrap().agent, "ops_bot");
        assert_eq!(table.agents(), vec!["ops_bot", "ops_overseer"]);
    }
}
