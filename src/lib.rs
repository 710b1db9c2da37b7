pub mod config;
pub mod diagnose;
pub mod error;
pub mod generator;
pub mod pipeline;
pub mod resolver;
pub mod store;
pub mod template;
pub mod utils;
pub mod validator;

pub use error::{Error, Result, Stage};
pub use generator::{
    BackendError, GeneratedScript, OpenAiBackend, RetryPolicy, ScriptBackend, ScriptGenerator,
};
pub use pipeline::{Handoff, LongRequest, Pipeline, RunState, ShortRequest, VideoFormat};
pub use resolver::{ParameterSet, ResolutionAnomaly, ResolvedPrompt, resolve};
pub use store::TemplateStore;
pub use template::{PromptKey, Template};
pub use validator::{Finding, Subject, ValidationReport, validate};
