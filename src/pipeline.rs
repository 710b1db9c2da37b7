//! Pipeline orchestration.
//!
//! Every prompt goes through the same stage core:
//! `Idle -> TemplateLoaded -> PromptResolved -> ScriptGenerated -> Validated`,
//! and a finished run ends in `Handoff`. The short and long variants only
//! differ in which prompts they run and with which parameters.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::generator::{GeneratedScript, ScriptGenerator};
use crate::resolver::{ParameterSet, ResolutionAnomaly, ResolvedPrompt, resolve};
use crate::store::TemplateStore;
use crate::template::PromptKey;
use crate::utils::{chunk_text, parse_list_lines};
use crate::validator::{Subject, ValidationReport, validate};

/// Terms a resolved short prompt must still mention for the downstream
/// upload and assembly steps.
pub const SHORT_PROMPT_TERMS: [&str; 2] = ["script", "youtube"];

pub const SINGLE_SPEAKER: &str = "a single narrator speaking directly to the viewer";
pub const MULTI_SPEAKER: &str =
    "two hosts in a natural dialogue, every line starting with \"Host 1:\" or \"Host 2:\"";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    TemplateLoaded,
    PromptResolved,
    ScriptGenerated,
    Validated,
    Handoff,
}

impl RunState {
    fn next(self) -> Option<RunState> {
        match self {
            RunState::Idle => Some(RunState::TemplateLoaded),
            RunState::TemplateLoaded => Some(RunState::PromptResolved),
            RunState::PromptResolved => Some(RunState::ScriptGenerated),
            RunState::ScriptGenerated => Some(RunState::Validated),
            RunState::Validated => Some(RunState::Handoff),
            RunState::Handoff => None,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug)]
struct Run<'a> {
    key: &'a str,
    history: Vec<RunState>,
}

impl<'a> Run<'a> {
    fn new(key: &'a str) -> Self {
        Self {
            key,
            history: vec![RunState::Idle],
        }
    }

    fn state(&self) -> RunState {
        self.history.last().copied().unwrap_or(RunState::Idle)
    }

    fn advance(&mut self, to: RunState) {
        debug_assert_eq!(self.state().next(), Some(to), "stage skipped for '{}'", self.key);
        info!("[{}] {} -> {}", self.key, self.state(), to);
        self.history.push(to);
    }
}

/// One prompt to run through the stage core.
#[derive(Debug, Clone, Copy)]
pub struct StageRequest<'a> {
    pub key: &'a str,
    pub params: &'a ParameterSet,
    pub prompt_expectations: &'a [&'a str],
    pub script_expectations: &'a [&'a str],
}

#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub prompt: ResolvedPrompt,
    pub script: GeneratedScript,
    pub report: ValidationReport,
    pub states: Vec<RunState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFormat {
    Short,
    Long,
}

/// Validated output handed to voice synthesis and video assembly.
#[derive(Debug, Clone)]
pub struct Handoff {
    pub title: String,
    pub format: VideoFormat,
    /// Section titles of a long video; empty for shorts.
    pub sections: Vec<String>,
    pub parts: Vec<GeneratedScript>,
    pub reports: Vec<ValidationReport>,
    pub anomalies: Vec<ResolutionAnomaly>,
    pub narration: Vec<String>,
    pub states: Vec<RunState>,
}

impl Handoff {
    pub fn script(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.as_str().trim())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone)]
pub struct ShortRequest {
    pub title: String,
    pub time: u32,
}

#[derive(Debug, Clone)]
pub struct LongRequest {
    pub title: String,
    pub language: String,
    pub multi_speaker: bool,
    pub sections: usize,
}

#[derive(Clone)]
pub struct Pipeline {
    store: Arc<TemplateStore>,
    generator: ScriptGenerator,
    chunk_chars: usize,
    cancel: Option<watch::Receiver<bool>>,
}

impl Pipeline {
    pub fn new(store: Arc<TemplateStore>, generator: ScriptGenerator, chunk_chars: usize) -> Self {
        Self {
            store,
            generator,
            chunk_chars,
            cancel: None,
        }
    }

    /// Abandons in-flight generation once `true` is sent on the channel.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Runs one prompt from template lookup to a validated script.
    pub async fn run_stage(&self, request: StageRequest<'_>) -> Result<StageOutcome> {
        let mut run = Run::new(request.key);

        let template = self.store.get(request.key)?;
        run.advance(RunState::TemplateLoaded);

        let prompt = resolve(template, request.params)?;
        let prompt_report = validate(Subject::Prompt, prompt.as_str(), request.prompt_expectations);
        if !prompt_report.passed() {
            warn!("[{}] {}", request.key, prompt_report);
            return Err(Error::ValidationFailed {
                key: request.key.to_string(),
                report: prompt_report,
            });
        }
        run.advance(RunState::PromptResolved);

        let script = self.generate(&prompt).await?;
        run.advance(RunState::ScriptGenerated);

        let report = validate(Subject::Script, script.as_str(), request.script_expectations);
        if !report.passed() {
            warn!("[{}] {}", request.key, report);
            return Err(Error::ValidationFailed {
                key: request.key.to_string(),
                report,
            });
        }
        run.advance(RunState::Validated);

        Ok(StageOutcome {
            prompt,
            script,
            report,
            states: run.history,
        })
    }

    async fn generate(&self, prompt: &ResolvedPrompt) -> Result<GeneratedScript> {
        match &self.cancel {
            None => self.generator.generate(prompt).await,
            Some(rx) => {
                let mut rx = rx.clone();
                let cancelled = async move {
                    if rx.wait_for(|c| *c).await.is_err() {
                        // Sender gone: nobody can cancel any more.
                        std::future::pending::<()>().await;
                    }
                };
                self.generator.generate_cancellable(prompt, cancelled).await
            }
        }
    }

    pub async fn run_short(&self, request: &ShortRequest) -> Result<Handoff> {
        info!("Short-form run for '{}' ({}s)", request.title, request.time);
        let params = ParameterSet::new()
            .with("title", request.title.clone())
            .with("time", request.time.to_string());

        let outcome = self
            .run_stage(StageRequest {
                key: PromptKey::Short.as_str(),
                params: &params,
                prompt_expectations: &SHORT_PROMPT_TERMS,
                script_expectations: &[],
            })
            .await?;

        let mut states = outcome.states;
        states.push(RunState::Handoff);
        let narration = chunk_text(outcome.script.as_str(), self.chunk_chars);
        info!(
            "Handing off short '{}' ({} narration chunks)",
            request.title,
            narration.len()
        );
        Ok(Handoff {
            title: request.title.clone(),
            format: VideoFormat::Short,
            sections: Vec::new(),
            anomalies: outcome.prompt.anomalies().to_vec(),
            reports: vec![outcome.report],
            parts: vec![outcome.script],
            narration,
            states,
        })
    }

    pub async fn run_long(&self, request: &LongRequest) -> Result<Handoff> {
        info!(
            "Long-form run for '{}' in {} ({} sections)",
            request.title, request.language, request.sections
        );
        let speakers = if request.multi_speaker {
            MULTI_SPEAKER
        } else {
            SINGLE_SPEAKER
        };
        let params = ParameterSet::new()
            .with("title", request.title.clone())
            .with("language", request.language.clone())
            .with("speakers", speakers)
            .with("count", request.sections.to_string());

        let mut reports = Vec::new();
        let mut anomalies = Vec::new();
        let mut parts = Vec::new();
        let mut states = Vec::new();

        let names = self.stage(PromptKey::Names, &params).await?;
        let sections = parse_list_lines(names.script.as_str(), request.sections);
        if sections.is_empty() {
            let report = validate(Subject::Script, "", &[]);
            return Err(Error::ValidationFailed {
                key: PromptKey::Names.as_str().to_string(),
                report,
            });
        }
        info!("Section titles: {:?}", sections);
        reports.push(names.report);
        anomalies.extend_from_slice(names.prompt.anomalies());
        states.extend(names.states);

        let intro = self.stage(PromptKey::Intro, &params).await?;
        absorb(intro, &mut parts, &mut reports, &mut anomalies, &mut states);

        for section in &sections {
            let section_params = params.clone().with("section", section.clone());
            let outcome = self.stage(PromptKey::Text, &section_params).await?;
            absorb(outcome, &mut parts, &mut reports, &mut anomalies, &mut states);
        }

        let outro = self.stage(PromptKey::Outro, &params).await?;
        absorb(outro, &mut parts, &mut reports, &mut anomalies, &mut states);
        states.push(RunState::Handoff);

        let mut handoff = Handoff {
            title: request.title.clone(),
            format: VideoFormat::Long,
            sections,
            parts,
            reports,
            anomalies,
            narration: Vec::new(),
            states,
        };
        handoff.narration = chunk_text(&handoff.script(), self.chunk_chars);
        info!(
            "Handing off long video '{}' ({} parts, {} narration chunks)",
            handoff.title,
            handoff.parts.len(),
            handoff.narration.len()
        );
        Ok(handoff)
    }

    async fn stage(&self, key: PromptKey, params: &ParameterSet) -> Result<StageOutcome> {
        self.run_stage(StageRequest {
            key: key.as_str(),
            params,
            prompt_expectations: &[],
            script_expectations: &[],
        })
        .await
    }

    /// Runs independent short-form requests concurrently. Results come back
    /// in request order; one failure does not stop the others.
    pub async fn run_short_batch(
        self: &Arc<Self>,
        requests: Vec<ShortRequest>,
    ) -> Vec<(ShortRequest, Result<Handoff>)> {
        let mut tasks = JoinSet::new();
        for (index, request) in requests.iter().cloned().enumerate() {
            let pipeline = Arc::clone(self);
            tasks.spawn(async move {
                let result = pipeline.run_short(&request).await;
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<Handoff>>> = requests.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => error!("Batch task did not finish: {}", e),
            }
        }

        requests
            .into_iter()
            .zip(results)
            .map(|(request, result)| {
                let result = result.unwrap_or_else(|| {
                    Err(Error::GenerationUnavailable {
                        key: PromptKey::Short.as_str().to_string(),
                        reason: "task aborted".into(),
                    })
                });
                (request, result)
            })
            .collect()
    }
}

fn absorb(
    outcome: StageOutcome,
    parts: &mut Vec<GeneratedScript>,
    reports: &mut Vec<ValidationReport>,
    anomalies: &mut Vec<ResolutionAnomaly>,
    states: &mut Vec<RunState>,
) {
    anomalies.extend_from_slice(outcome.prompt.anomalies());
    reports.push(outcome.report);
    parts.push(outcome.script);
    states.extend(outcome.states);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_walk_states_in_order() {
        let mut run = Run::new("short_prompt");
        run.advance(RunState::TemplateLoaded);
        run.advance(RunState::PromptResolved);
        run.advance(RunState::ScriptGenerated);
        run.advance(RunState::Validated);
        run.advance(RunState::Handoff);
        assert_eq!(run.state(), RunState::Handoff);
        assert_eq!(run.history.len(), 6);
        assert_eq!(RunState::Handoff.next(), None);
    }

    #[test]
    #[should_panic(expected = "stage skipped")]
    #[cfg(debug_assertions)]
    fn test_should_refuse_skipped_stage() {
        let mut run = Run::new("short_prompt");
        run.advance(RunState::PromptResolved);
    }

    #[test]
    fn test_should_join_parts_into_script() {
        let handoff = Handoff {
            title: "t".into(),
            format: VideoFormat::Long,
            sections: Vec::new(),
            parts: Vec::new(),
            reports: Vec::new(),
            anomalies: Vec::new(),
            narration: Vec::new(),
            states: Vec::new(),
        };
        assert_eq!(handoff.script(), "");
    }
}
