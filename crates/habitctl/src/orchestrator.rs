//! Response orchestration.
//!
//! Turns a detection into the message the user sees and applies the turn's
//! side effects to memory. Low confidence asks a clarifying question and
//! only touches the conversation; adoption records an intervention and
//! bumps the principle's behaviour pattern.

use crate::detector::Detector;
use crate::generator::{GenerationContext, ReplyGenerator};
use chrono::Utc;
use habit_shared::clarify::{render_clarification, select_question};
use habit_shared::detection::DetectionResult;
use habit_shared::knowledge::{BehaviouralPrinciple, KnowledgeBase};
use habit_shared::memory::{ConversationTurn, ReplyKind, TurnMetadata, UserMemory};
use habit_shared::text::preview;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Orchestrator tuning (`[coach]` section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    /// Below this confidence the coach asks instead of advising
    pub clarification_threshold: f32,
    /// Interventions listed in a templated reply
    pub max_interventions: usize,
    /// Ask the remote generator for adopted replies
    pub use_generator: bool,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            clarification_threshold: 0.6,
            max_interventions: 3,
            use_generator: true,
        }
    }
}

/// What to do with a detection
#[derive(Debug, Clone, Copy, PartialEq)]
enum ReplyPlan<'kb> {
    /// Ask a question; tentative principle if one was matched
    Clarify(Option<&'kb BehaviouralPrinciple>),
    /// Adopt the principle and coach
    Coach(&'kb BehaviouralPrinciple),
}

/// Builds replies and updates memory for one turn
pub struct Orchestrator {
    kb: Arc<KnowledgeBase>,
    detector: Detector,
    generator: Option<Box<dyn ReplyGenerator>>,
    config: CoachConfig,
}

impl Orchestrator {
    pub fn new(kb: Arc<KnowledgeBase>, detector: Detector, config: CoachConfig) -> Self {
        Self {
            kb,
            detector,
            generator: None,
            config,
        }
    }

    pub fn with_generator(mut self, generator: Box<dyn ReplyGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    /// Detect, reply and return the updated memory
    pub fn respond(&self, text: &str, memory: UserMemory) -> (String, UserMemory) {
        let detection = self.detector.detect(text, &memory);
        self.respond_to_detection(text, &detection, memory)
    }

    /// Reply to an already computed detection
    pub fn respond_to_detection(
        &self,
        text: &str,
        detection: &DetectionResult,
        mut memory: UserMemory,
    ) -> (String, UserMemory) {
        let now = Utc::now();
        let plan = self.plan(detection);
        debug!("Reply plan for {:?}: {:?}", detection.principle_id, plan);

        let (reply, metadata) = match plan {
            ReplyPlan::Clarify(principle) => {
                let question = select_question(principle, &memory);
                info!(
                    "Asking clarifying question {} ({:.2} < {:.2})",
                    question.index, detection.confidence, self.config.clarification_threshold
                );
                let reply = render_clarification(&question, principle);
                let metadata = TurnMetadata {
                    kind: ReplyKind::Clarification,
                    principle_id: question.principle_id.clone(),
                    question_index: Some(question.index),
                    confidence: Some(detection.confidence),
                    source: Some(detection.source),
                };
                (reply, metadata)
            }
            ReplyPlan::Coach(principle) => {
                let interventions = self.ranked_interventions(detection, principle);
                let (reply, kind) = match self.generated_reply(text, detection, principle, &interventions, &memory) {
                    Some(reply) => (reply, ReplyKind::Generated),
                    None => (
                        templated_reply(text, principle, &interventions),
                        ReplyKind::Coaching,
                    ),
                };
                info!(
                    "Adopted {} via {} ({:.2})",
                    principle.id, detection.source, detection.confidence
                );

                if let Some(first) = interventions.first() {
                    memory.record_intervention(&principle.id, first, now);
                }
                memory.record_pattern(&principle.id, now);

                let metadata = TurnMetadata {
                    kind,
                    principle_id: Some(principle.id.clone()),
                    question_index: None,
                    confidence: Some(detection.confidence),
                    source: Some(detection.source),
                };
                (reply, metadata)
            }
        };

        memory.push_turn(ConversationTurn::user(text, now));
        memory.push_turn(ConversationTurn::assistant(reply.clone(), now, metadata));
        (reply, memory)
    }

    fn plan<'a>(&'a self, detection: &DetectionResult) -> ReplyPlan<'a> {
        let principle = match detection.principle_id.as_deref() {
            None => return ReplyPlan::Clarify(None),
            Some(id) => match self.kb.lookup(id) {
                Some(p) => p,
                None => {
                    warn!("Detection named unknown principle '{}', asking instead", id);
                    return ReplyPlan::Clarify(None);
                }
            },
        };

        if detection.confidence < self.config.clarification_threshold {
            ReplyPlan::Clarify(Some(principle))
        } else {
            ReplyPlan::Coach(principle)
        }
    }

    /// Detection's interventions, or the principle's when it has none
    fn ranked_interventions(&self, detection: &DetectionResult, principle: &BehaviouralPrinciple) -> Vec<String> {
        let source = if detection.interventions.is_empty() {
            &principle.interventions
        } else {
            &detection.interventions
        };
        source
            .iter()
            .filter(|i| !i.trim().is_empty())
            .take(self.config.max_interventions)
            .cloned()
            .collect()
    }

    fn generated_reply(
        &self,
        text: &str,
        detection: &DetectionResult,
        principle: &BehaviouralPrinciple,
        interventions: &[String],
        memory: &UserMemory,
    ) -> Option<String> {
        if !self.config.use_generator {
            return None;
        }
        let generator = self.generator.as_ref()?;

        let context = GenerationContext {
            user_text: text.to_string(),
            principle_name: principle.name.clone(),
            principle_description: principle.description.clone(),
            interventions: interventions.to_vec(),
            reasoning: detection.reasoning.clone(),
            tone: memory.profile.preferred_tone,
            conversation: memory.conversation_context(self.detector.config().max_context_turns),
        };

        match generator.generate(&context) {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!("Reply generation failed, using template: {}", e);
                None
            }
        }
    }
}

/// Restatement, principle, up to N interventions and a follow-up prompt
pub fn templated_reply(text: &str, principle: &BehaviouralPrinciple, interventions: &[String]) -> String {
    let mut reply = format!(
        "I hear you. \"{}\" is something a lot of people wrestle with, and it's good that you noticed it.\n\n\
         This looks like {}: {}",
        preview(text, 80),
        principle.name,
        principle.description
    );

    if !interventions.is_empty() {
        reply.push_str("\n\nHere are a few things that could help:");
        for (i, intervention) in interventions.iter().enumerate() {
            reply.push_str(&format!("\n{}. {}", i + 1, intervention));
        }
    }

    reply.push_str("\n\nWhich of these feels doable this week? Let me know how it goes.");
    reply
}
