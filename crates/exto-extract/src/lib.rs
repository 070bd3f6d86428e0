//! Exto Extract — model-backed field extraction.
//!
//! Builds extraction prompts from category templates, talks to an
//! OpenAI-compatible model through the [`CompletionModel`] seam, and turns
//! the replies into typed results.

pub mod analysis;
pub mod config;
pub mod error;
pub mod model;
pub mod openai;
pub mod prompt;
pub mod reply;
pub mod service;

pub use analysis::{DocumentAnalysis, DocumentAnalyzer, DocumentCategory, DocumentPayload};
pub use config::ExtractionConfig;
pub use error::{ExtractError, ExtractResult};
pub use model::{CompletionModel, CompletionRequest, ContentPart};
pub use openai::OpenAiClient;
pub use prompt::TemplateField;
pub use reply::ExtractionOutcome;
pub use service::ExtractionService;
