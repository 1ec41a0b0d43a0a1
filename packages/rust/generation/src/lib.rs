//! Text-generation boundary for MVP Factory.
//!
//! Every phase talks to the model through the [`Generator`] trait. The
//! default implementation is [`GeminiClient`]; tests substitute scripted
//! fakes. Response text is normalized here too: [`extract_content`] turns a
//! raw completion into file content, [`parse_json_response`] into a typed
//! value, and [`flatten_manifest`] folds nested planning trees into a flat
//! path → purpose map.

mod extract;
mod gemini;
mod manifest;

use std::future::Future;

use mvpfactory_shared::{GeminiConfig, Result};

pub use extract::{ExtractedResponse, extract_content, parse_json_response};
pub use gemini::GeminiClient;
pub use manifest::flatten_manifest;

/// Which pipeline step a prompt belongs to. Selects the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelRole {
    Planning,
    Design,
    Frontend,
    Backend,
    Review,
    Docs,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Design => "design",
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Review => "review",
            Self::Docs => "docs",
        }
    }
}

impl std::fmt::Display for ModelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-role model identifiers.
#[derive(Debug, Clone)]
pub struct ModelRoster {
    pub planning: String,
    pub design: String,
    pub frontend: String,
    pub backend: String,
    pub review: String,
    pub docs: String,
}

impl ModelRoster {
    pub fn model_for(&self, role: ModelRole) -> &str {
        match role {
            ModelRole::Planning => &self.planning,
            ModelRole::Design => &self.design,
            ModelRole::Frontend => &self.frontend,
            ModelRole::Backend => &self.backend,
            ModelRole::Review => &self.review,
            ModelRole::Docs => &self.docs,
        }
    }
}

impl From<&GeminiConfig> for ModelRoster {
    fn from(config: &GeminiConfig) -> Self {
        Self {
            planning: config.planning_model.clone(),
            design: config.design_model.clone(),
            frontend: config.frontend_model.clone(),
            backend: config.backend_model.clone(),
            review: config.review_model.clone(),
            docs: config.docs_model.clone(),
        }
    }
}

/// A text-in, text-out model backend.
///
/// Calls are awaited one at a time by the pipeline; implementations need no
/// internal queueing and must not retry on their own.
pub trait Generator: Send + Sync {
    fn generate(&self, role: ModelRole, prompt: &str)
    -> impl Future<Output = Result<String>> + Send;
}
