//! Environment and template diagnostic.
//!
//! Runs every check regardless of earlier failures and collects hard errors
//! and soft warnings separately.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::config::{RunConfig, missing_keys};
use crate::error::{Error, Result};
use crate::pipeline::SINGLE_SPEAKER;
use crate::resolver::{ParameterSet, resolve};
use crate::store::TemplateStore;
use crate::template::{PromptKey, Template};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Check {
    pub section: &'static str,
    pub status: Status,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DiagnosticOptions {
    pub prompts: PathBuf,
    pub config: PathBuf,
    /// External programs and the argument used to probe them.
    pub tools: Vec<(String, String)>,
    pub dirs: Vec<PathBuf>,
    pub api_key_present: bool,
}

impl DiagnosticOptions {
    pub fn new(prompts: impl Into<PathBuf>, config: impl Into<PathBuf>) -> Self {
        Self {
            prompts: prompts.into(),
            config: config.into(),
            tools: vec![
                ("ffmpeg".into(), "-version".into()),
                ("piper".into(), "--help".into()),
            ],
            dirs: vec![PathBuf::from("prompts"), PathBuf::from("download_list")],
            api_key_present: std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.trim().is_empty()),
        }
    }
}

#[derive(Debug, Default)]
pub struct DiagnosticReport {
    checks: Vec<Check>,
}

impl DiagnosticReport {
    fn push(&mut self, section: &'static str, status: Status, message: impl Into<String>) {
        let message = message.into();
        debug!("[{}] {:?}: {}", section, status, message);
        self.checks.push(Check {
            section,
            status,
            message,
        });
    }

    pub fn errors(&self) -> Vec<&str> {
        self.with_status(Status::Error)
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.with_status(Status::Warning)
    }

    fn with_status(&self, status: Status) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| c.status == status)
            .map(|c| c.message.as_str())
            .collect()
    }

    pub fn exit_code(&self) -> i32 {
        if self.errors().is_empty() { 0 } else { 1 }
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut section = "";
        for check in &self.checks {
            if check.section != section {
                section = check.section;
                writeln!(f, "\n{section}")?;
            }
            let mark = match check.status {
                Status::Ok => "ok  ",
                Status::Warning => "warn",
                Status::Error => "FAIL",
            };
            writeln!(f, "  [{mark}] {}", check.message)?;
        }

        writeln!(f, "\nSUMMARY")?;
        let errors = self.errors();
        if errors.is_empty() {
            writeln!(f, "No errors found.")?;
        } else {
            writeln!(f, "{} error(s):", errors.len())?;
            for (i, e) in errors.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, e)?;
            }
        }
        let warnings = self.warnings();
        if !warnings.is_empty() {
            writeln!(f, "{} warning(s):", warnings.len())?;
            for (i, w) in warnings.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, w)?;
            }
        }
        Ok(())
    }
}

/// Parameters that satisfy every known prompt.
pub fn sample_parameters() -> ParameterSet {
    ParameterSet::new()
        .with("title", "test topic")
        .with("time", "30")
        .with("count", "3")
        .with("language", "English")
        .with("speakers", SINGLE_SPEAKER)
        .with("section", "getting started")
}

pub fn run(options: &DiagnosticOptions) -> DiagnosticReport {
    let mut report = DiagnosticReport::default();

    check_files(options, &mut report);
    check_tools(options, &mut report);
    check_config(options, &mut report);
    check_credentials(options, &mut report);
    check_prompts(options, &mut report);
    check_dirs(options, &mut report);

    report
}

fn check_files(options: &DiagnosticOptions, report: &mut DiagnosticReport) {
    const SECTION: &str = "Required files";
    for path in [&options.prompts, &options.config] {
        if path.is_file() {
            report.push(SECTION, Status::Ok, path.display().to_string());
        } else {
            report.push(
                SECTION,
                Status::Error,
                format!("Missing required file: {}", path.display()),
            );
        }
    }
}

fn check_tools(options: &DiagnosticOptions, report: &mut DiagnosticReport) {
    const SECTION: &str = "External tools";
    for (tool, probe) in &options.tools {
        let found = Command::new(tool)
            .arg(probe)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok();
        if found {
            report.push(SECTION, Status::Ok, tool.clone());
        } else {
            report.push(
                SECTION,
                Status::Warning,
                format!("{tool} not found on PATH (needed by audio/video stages)"),
            );
        }
    }
}

fn check_config(options: &DiagnosticOptions, report: &mut DiagnosticReport) {
    const SECTION: &str = "Configuration";
    let raw = match fs::read_to_string(&options.config) {
        Ok(raw) => raw,
        Err(e) => {
            report.push(
                SECTION,
                Status::Error,
                format!("Cannot read config file {}: {e}", options.config.display()),
            );
            return;
        }
    };
    match missing_keys(&raw) {
        Ok(missing) => {
            for key in &missing {
                report.push(SECTION, Status::Warning, format!("Missing config key: {key}"));
            }
        }
        Err(e) => {
            report.push(SECTION, Status::Error, format!("Cannot parse config file: {e}"));
            return;
        }
    }
    match RunConfig::from_yaml_str(&raw) {
        Ok(config) => {
            report.push(
                SECTION,
                Status::Ok,
                format!(
                    "topic={:?} time={:?} language={} multi_speaker={}",
                    config.general_topic.as_deref().unwrap_or(""),
                    config.time,
                    config.language(),
                    config.multi_speaker()
                ),
            );
            if let Some(intro) = &config.intro_video {
                if !PathBuf::from(intro).exists() {
                    report.push(
                        SECTION,
                        Status::Warning,
                        format!("intro_video {intro} does not exist"),
                    );
                }
            }
        }
        Err(e) => report.push(SECTION, Status::Error, format!("Invalid config value: {e}")),
    }
}

fn check_credentials(options: &DiagnosticOptions, report: &mut DiagnosticReport) {
    const SECTION: &str = "Credentials";
    if options.api_key_present {
        report.push(SECTION, Status::Ok, "OPENAI_API_KEY");
    } else {
        report.push(SECTION, Status::Warning, "OPENAI_API_KEY is not set");
    }
}

fn check_prompts(options: &DiagnosticOptions, report: &mut DiagnosticReport) {
    const SECTION: &str = "Prompt templates";
    let raw = match fs::read_to_string(&options.prompts) {
        Ok(raw) => raw,
        Err(e) => {
            report.push(
                SECTION,
                Status::Error,
                format!("Cannot load prompts from {}: {e}", options.prompts.display()),
            );
            return;
        }
    };
    let origin = options.prompts.display().to_string();
    let mut entries: BTreeMap<String, Result<Template>> =
        match TemplateStore::inspect(&origin, &raw) {
            Ok(entries) => entries.into_iter().collect(),
            Err(e) => {
                report.push(SECTION, Status::Error, format!("Cannot load prompts: {e}"));
                return;
            }
        };

    let params = sample_parameters();
    for key in PromptKey::ALL {
        let template = match entries.remove(key.as_str()) {
            Some(Ok(t)) => t,
            Some(Err(e)) => {
                report.push(SECTION, Status::Error, format!("Cannot load prompt: {e}"));
                continue;
            }
            None => {
                let missing = Error::TemplateNotFound {
                    key: key.as_str().to_string(),
                };
                report.push(SECTION, Status::Error, format!("Cannot load prompt: {missing}"));
                continue;
            }
        };
        if template.is_empty() {
            report.push(SECTION, Status::Warning, format!("Empty prompt template: {key}"));
            continue;
        }
        match resolve(&template, &params) {
            Ok(_) => report.push(SECTION, Status::Ok, format!("{key} resolves")),
            Err(e) => report.push(
                SECTION,
                Status::Error,
                format!("Prompt has unexpected placeholder: {e}"),
            ),
        }
    }

    // Extra prompts are not used by the pipelines but must still parse.
    for (key, parsed) in entries {
        match parsed {
            Ok(_) => report.push(SECTION, Status::Ok, format!("{key} parses")),
            Err(e) => report.push(SECTION, Status::Error, format!("Cannot load prompt: {e}")),
        }
    }
}

fn check_dirs(options: &DiagnosticOptions, report: &mut DiagnosticReport) {
    const SECTION: &str = "Directories";
    for dir in &options.dirs {
        if dir.is_dir() {
            report.push(SECTION, Status::Ok, format!("{}/", dir.display()));
        } else {
            report.push(
                SECTION,
                Status::Warning,
                format!("Missing directory: {}", dir.display()),
            );
        }
    }
}
