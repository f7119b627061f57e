//! Behavioural principle knowledge base.
//!
//! Loaded once at startup from static JSON (bundled by default) and
//! read-only afterwards. Declaration order is preserved because the keyword
//! matcher uses it to break ties.

use crate::error::KnowledgeError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// Principle data shipped with the crate
pub const BUNDLED_PRINCIPLES: &str = include_str!("../data/behaviour_principles.json");

/// A named behavioural-economics concept with its triggers and interventions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviouralPrinciple {
    /// Unique key (e.g., "loss_aversion")
    pub id: String,
    /// Display name
    pub name: String,
    /// One or two sentences explaining the principle
    pub description: String,
    /// Keywords/phrases that suggest this principle, in priority order
    #[serde(rename = "typical_triggers", alias = "triggers", default)]
    pub triggers: Vec<String>,
    /// Suggested interventions, best first
    #[serde(default)]
    pub interventions: Vec<String>,
}

impl BehaviouralPrinciple {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            triggers: Vec::new(),
            interventions: Vec::new(),
        }
    }

    pub fn with_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers = triggers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_interventions<I, S>(mut self, interventions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interventions = interventions.into_iter().map(Into::into).collect();
        self
    }

    /// Triggers that occur in `text`, case-insensitive.
    ///
    /// A trigger must start at a word boundary but may end inside a word, so
    /// "stress" matches "stressed" while "lose" does not match "close".
    pub fn matched_triggers(&self, text: &str) -> Vec<String> {
        let haystack = text.to_lowercase();
        self.triggers
            .iter()
            .filter(|t| {
                let needle = t.trim().to_lowercase();
                !needle.is_empty() && starts_word(&haystack, &needle)
            })
            .cloned()
            .collect()
    }
}

/// True when `needle` occurs in `haystack` not preceded by a letter or digit
fn starts_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, _)| {
        haystack[..i]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric())
    })
}

/// On-disk shape of the principles file
#[derive(Debug, Deserialize)]
struct KnowledgeFile {
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    principles: Vec<BehaviouralPrinciple>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Validated, ordered mapping of principle id to principle.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    version: String,
    description: String,
    principles: Vec<BehaviouralPrinciple>,
    index: HashMap<String, usize>,
}

impl KnowledgeBase {
    /// Load the bundled principle set
    pub fn load() -> Result<Self, KnowledgeError> {
        Self::from_json(BUNDLED_PRINCIPLES)
    }

    /// Load principles from a JSON file on disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let kb = Self::from_json(&content)?;
        info!("Loaded {} principles from {}", kb.len(), path.display());
        Ok(kb)
    }

    /// Parse and validate a principles JSON document
    pub fn from_json(content: &str) -> Result<Self, KnowledgeError> {
        let file: KnowledgeFile = serde_json::from_str(content)?;
        let mut kb = Self::from_principles(file.principles)?;
        kb.version = file.version;
        kb.description = file.description;
        Ok(kb)
    }

    /// Build from already-parsed principles.
    ///
    /// Fails on an empty list, an empty or duplicated id, or a principle
    /// without a usable intervention.
    pub fn from_principles(principles: Vec<BehaviouralPrinciple>) -> Result<Self, KnowledgeError> {
        if principles.is_empty() {
            return Err(KnowledgeError::Empty);
        }

        let mut index = HashMap::with_capacity(principles.len());
        for (pos, principle) in principles.iter().enumerate() {
            if principle.id.trim().is_empty() {
                return Err(KnowledgeError::MissingId(pos));
            }
            if !principle.interventions.iter().any(|i| !i.trim().is_empty()) {
                return Err(KnowledgeError::NoInterventions(principle.id.clone()));
            }
            if index.insert(principle.id.clone(), pos).is_some() {
                return Err(KnowledgeError::DuplicateId(principle.id.clone()));
            }
        }

        Ok(Self {
            version: default_version(),
            description: String::new(),
            principles,
            index,
        })
    }

    /// Look up a principle by id
    pub fn lookup(&self, id: &str) -> Option<&BehaviouralPrinciple> {
        self.index.get(id).map(|&pos| &self.principles[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Principles in declaration order
    pub fn principles(&self) -> &[BehaviouralPrinciple] {
        &self.principles
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.principles.iter().map(|p| p.id.as_str())
    }

    /// Declaration position of an id (used for deterministic tie-breaking)
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.principles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principles.is_empty()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Top `limit` interventions for a principle, empty for unknown ids
    pub fn interventions_for(&self, id: &str, limit: usize) -> Vec<String> {
        self.lookup(id)
            .map(|p| p.interventions.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Human-readable explanation of a principle
    pub fn explain(&self, id: &str) -> String {
        match self.lookup(id) {
            Some(p) => format!("{}: {}", p.name, p.description),
            None => "Small, consistent changes grounded in behavioural science tend to \
                     stick better than big resolutions."
                .to_string(),
        }
    }
}
