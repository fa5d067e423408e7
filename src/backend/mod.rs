//! Pluggable task backends.
//!
//! Hint semantics and grading differ wildly between cipher tasks, so both
//! decisions live behind this trait; the core only enforces *when* a hint or
//! answer may be submitted and persists the result. Implementations are
//! registered once at startup under the identifier stored in
//! `tasks.backend`.

use std::{collections::HashMap, sync::Arc};

use rust_decimal::Decimal;
use serde_json::{Value, json};

use crate::model::tasks::Task;

pub mod http;
pub mod playfair;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("protocol: {0}")]
    Protocol(String),
}

/// Result of materializing a task instance.
#[derive(Debug, Clone)]
pub struct GeneratedTask {
    /// What the team may see and mutate.
    pub team_data: Value,
    /// Private data holding the canonical solution and grading material.
    pub full_data: Value,
}

/// Result of a hint request. The backend returns fresh values rather than
/// mutating shared state; the caller persists them only on success.
#[derive(Debug, Clone)]
pub struct HintOutcome {
    pub success: bool,
    pub team_data: Value,
    pub full_data: Value,
}

#[derive(Debug, Clone)]
pub struct Grading {
    pub feedback: Value,
    pub score: Decimal,
    pub is_solution: bool,
    pub is_full_solution: bool,
}

impl Grading {
    /// Storage form of the grading; the score travels as a decimal string.
    pub fn to_json(&self) -> Value {
        json!({
            "feedback": self.feedback,
            "score": self.score.to_string(),
            "is_solution": self.is_solution,
            "is_full_solution": self.is_full_solution,
        })
    }
}

pub trait TaskBackend: Send + Sync {
    /// Materialize a task instance. `seed` is deterministic per attempt.
    fn generate(
        &self,
        task: &Task,
        seed: u64,
    ) -> Result<GeneratedTask, BackendError>;

    /// Validate a hint request and, if affordable, reveal part of the
    /// private data into the team data.
    fn grant_hint(
        &self,
        task: &Task,
        full_data: &Value,
        team_data: &Value,
        query: &Value,
    ) -> Result<HintOutcome, BackendError>;

    /// Grade a candidate answer. `Ok(None)` means the submission was not
    /// gradable at all (malformed input).
    fn grade(
        &self,
        task: &Task,
        full_data: &Value,
        team_data: &Value,
        answer: &Value,
    ) -> Result<Option<Grading>, BackendError>;

    /// Return the pristine team data, with hint state and budget restored.
    fn reset_hints(
        &self,
        task: &Task,
        full_data: &Value,
    ) -> Result<Value, BackendError>;
}

/// Task-type identifier to implementation, resolved once at startup.
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn TaskBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry every deployment starts from: the built-in playfair
    /// backend and the generic HTTP relay.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("playfair", Arc::new(playfair::PlayfairBackend));
        registry.register("http", Arc::new(http::HttpTaskBackend::new()));
        registry
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        backend: Arc<dyn TaskBackend>,
    ) {
        self.backends.insert(name.into(), backend);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TaskBackend>> {
        self.backends.get(name)
    }
}
