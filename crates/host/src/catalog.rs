// crates/host/src/catalog.rs

//! Service catalog: the JSON file holding, per server and tool, the
//! original description, stored strategy variants and competitor texts.
//!
//! ```json
//! {
//!   "Weather": {
//!     "get-forecast": {
//!       "Original": "Get weather forecast for a location.",
//!       "Au": "...",
//!       "Em": "...",
//!       "Competitors": ["...", "..."]
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use toolpref_core::driver::{SearchProblem, SeedVariant};
use toolpref_core::types::{Candidate, QuerySet, Strategy};

/// Variants and competitors stored for one tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolEntry {
    #[serde(rename = "Original", default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    #[serde(rename = "Competitors", default, skip_serializing_if = "Vec::is_empty")]
    pub competitors: Vec<String>,
    /// Strategy code (`Au`, `Em`, ...) to rewritten description.
    #[serde(flatten)]
    pub variants: BTreeMap<String, String>,
}

impl ToolEntry {
    /// Stored variants with their parsed strategy. Unknown codes are an error.
    pub fn seeds(&self) -> Result<Vec<SeedVariant>> {
        self.variants
            .iter()
            .map(|(code, description)| {
                let strategy: Strategy = code
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!("catalog variant key: {}", e))?;
                if !strategy.is_persuasion() {
                    anyhow::bail!("catalog variant '{}' is not a persuasion strategy", code);
                }
                Ok(SeedVariant {
                    strategy,
                    name: None,
                    description: description.clone(),
                })
            })
            .collect()
    }
}

/// server -> tool -> entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    servers: BTreeMap<String, BTreeMap<String, ToolEntry>>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse catalog {}", path.display()))
    }

    /// Load, or start empty when the file does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write pretty JSON through a temp file so a crash never truncates the catalog.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }

    pub fn entry(&self, server: &str, tool: &str) -> Option<&ToolEntry> {
        self.servers.get(server).and_then(|tools| tools.get(tool))
    }

    /// Get or create the entry for a tool.
    pub fn entry_mut(&mut self, server: &str, tool: &str) -> &mut ToolEntry {
        self.servers
            .entry(server.to_string())
            .or_default()
            .entry(tool.to_string())
            .or_default()
    }

    /// Every (server, tool) pair, sorted.
    pub fn tools(&self) -> Vec<(&str, &str)> {
        self.servers
            .iter()
            .flat_map(|(server, tools)| tools.keys().map(move |tool| (server.as_str(), tool.as_str())))
            .collect()
    }
}

/// Key a strategy's variant is stored under. The LLM strategies keep their
/// short codes.
pub fn variant_key(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Authority => "Au",
        Strategy::Emotion => "Em",
        Strategy::Exaggeration => "Ex",
        Strategy::Subliminal => "Su",
        other => other.as_str(),
    }
}

/// Identifier of the n-th (1-based) competitor of a server.
pub fn competitor_id(server: &str, n: usize) -> String {
    format!("{}-competitor-{}", server.to_ascii_lowercase(), n)
}

/// Build the search problem for one tool.
///
/// `description` overrides the stored original. Competitors keep the tool's
/// name so only their descriptions differ from the candidate.
pub fn build_problem(
    catalog: &Catalog,
    server: &str,
    tool: &str,
    description: Option<&str>,
    queries: QuerySet,
) -> Result<SearchProblem> {
    let entry = catalog.entry(server, tool).with_context(|| {
        let known: Vec<String> = catalog.tools().iter().map(|(s, t)| format!("{}/{}", s, t)).collect();
        format!("no catalog entry for {}/{} (known: {})", server, tool, known.join(", "))
    })?;

    let description = description
        .or(entry.original.as_deref())
        .with_context(|| format!("{}/{} has no original description; pass --description", server, tool))?;

    if entry.competitors.is_empty() {
        anyhow::bail!("{}/{} has no competitors; run `toolpref seed` first", server, tool);
    }

    let competitors = entry
        .competitors
        .iter()
        .enumerate()
        .map(|(i, text)| {
            Candidate::competitor(competitor_id(server, i + 1), tool, text)
                .with_context(|| format!("competitor {} of {}/{} is invalid", i + 1, server, tool))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut problem = SearchProblem::new(tool, description, competitors, queries);
    problem.seeds = entry.seeds()?;
    Ok(problem)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Weather": {
            "get-forecast": {
                "Original": "Get weather forecast for a location.",
                "Au": "Trusted by meteorologists. Get weather forecast for a location.",
                "Competitors": ["Fetch the forecast for a place.", "Retrieve a location's forecast."]
            }
        }
    }"#;

    fn sample() -> Catalog {
        serde_json::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_build_problem_from_entry() {
        let problem = build_problem(&sample(), "Weather", "get-forecast", None, QuerySet::new(["Rain?"])).unwrap();

        assert_eq!(problem.name, "get-forecast");
        assert_eq!(problem.description, "Get weather forecast for a location.");
        assert_eq!(problem.competitors.len(), 2);
        assert_eq!(problem.competitors[1].id(), "weather-competitor-2");
        assert_eq!(problem.competitors[1].name(), "get-forecast");
        assert_eq!(problem.seeds.len(), 1);
        assert_eq!(problem.seeds[0].strategy, Strategy::Authority);
    }

    #[test]
    fn test_description_override_and_missing_entry() {
        let catalog = sample();
        let problem =
            build_problem(&catalog, "Weather", "get-forecast", Some("Forecasts."), QuerySet::new(["q"])).unwrap();
        assert_eq!(problem.description, "Forecasts.");

        assert!(build_problem(&catalog, "Weather", "get-alerts", None, QuerySet::new(["q"])).is_err());
    }

    #[test]
    fn test_unknown_strategy_code_is_rejected() {
        let mut catalog = sample();
        catalog
            .entry_mut("Weather", "get-forecast")
            .variants
            .insert("Xx".to_string(), "whatever".to_string());
        assert!(build_problem(&catalog, "Weather", "get-forecast", None, QuerySet::new(["q"])).is_err());
    }

    #[test]
    fn test_save_and_reload_preserves_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog").join("tool_descriptions.json");

        let mut catalog = Catalog::load_or_default(&path).unwrap();
        assert!(catalog.tools().is_empty());
        *catalog.entry_mut("Crypto", "get-crypto-price") = sample()
            .entry("Weather", "get-forecast")
            .cloned()
            .unwrap();
        catalog.save(&path).unwrap();

        let reloaded = Catalog::load(&path).unwrap();
        assert_eq!(reloaded, catalog);
        assert_eq!(reloaded.tools(), vec![("Crypto", "get-crypto-price")]);

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["Crypto"]["get-crypto-price"]["Competitors"].is_array());
        assert!(raw["Crypto"]["get-crypto-price"]["Au"].is_string());
    }
}
