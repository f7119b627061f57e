//! HabitLedger coaching engine.
//!
//! Detection (remote classifier with keyword fallback), response
//! orchestration, persistence and configuration. The `habitctl` binary is a
//! thin CLI over `CoachService`.

pub mod classifier;
pub mod config;
pub mod detector;
pub mod generator;
pub mod keyword;
pub mod llm_client;
pub mod orchestrator;
pub mod service;
pub mod store;

pub use config::Config;
pub use detector::{Detector, DetectorConfig};
pub use orchestrator::{CoachConfig, Orchestrator};
pub use service::{CoachError, CoachService};
pub use store::{InMemoryStore, JsonFileStore, MemoryStore};

use classifier::LlmClassifier;
use generator::LlmReplyGenerator;
use habit_shared::knowledge::KnowledgeBase;
use llm_client::{HttpLlmClient, LlmClient};
use std::sync::Arc;
use tracing::{info, warn};

/// Load the configured knowledge base, or the bundled one
pub fn load_knowledge_base(config: &Config) -> Result<KnowledgeBase, CoachError> {
    let kb = match &config.knowledge_base {
        Some(path) => KnowledgeBase::from_path(path)?,
        None => KnowledgeBase::load()?,
    };
    Ok(kb)
}

/// Wire up the orchestrator from config: knowledge base, detector, and the
/// remote classifier/generator when the LLM is enabled.
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator, CoachError> {
    let kb = Arc::new(load_knowledge_base(config)?);
    info!("Knowledge base v{} with {} principles", kb.version(), kb.len());

    let client: Option<Arc<dyn LlmClient>> = if config.llm.enabled {
        match HttpLlmClient::new(config.llm.clone()) {
            Ok(client) => {
                info!("Remote classifier enabled ({} at {})", config.llm.model, config.llm.endpoint);
                Some(Arc::new(client))
            }
            Err(e) => {
                warn!("LLM client unavailable, using keywords only: {}", e);
                None
            }
        }
    } else {
        info!("Remote classifier disabled, using keywords only");
        None
    };

    let mut detector = Detector::new(kb.clone(), config.detector.clone());
    if let Some(client) = &client {
        detector = detector.with_classifier(Box::new(LlmClassifier::new(client.clone(), &kb)));
    }

    let mut orchestrator = Orchestrator::new(kb, detector, config.coach.clone());
    if let (Some(client), true) = (client, config.coach.use_generator) {
        orchestrator = orchestrator.with_generator(Box::new(LlmReplyGenerator::new(client)));
    }
    Ok(orchestrator)
}

/// Service backed by the JSON file store from config
pub fn build_service(config: &Config) -> Result<CoachService, CoachError> {
    let orchestrator = build_orchestrator(config)?;
    let store = JsonFileStore::new(config.storage.data_dir.clone());
    Ok(CoachService::new(orchestrator, Box::new(store)))
}
