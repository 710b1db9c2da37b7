mod args;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use args::{Args, BackendArgs, Command, LongArgs, OutputArgs, ShortArgs};
use gptube::config::{DEFAULT_LANGUAGE, RunConfig};
use gptube::diagnose::{self, DiagnosticOptions};
use gptube::utils::slugify;
use gptube::{
    Handoff, LongRequest, OpenAiBackend, Pipeline, RetryPolicy, ScriptGenerator, ShortRequest,
    TemplateStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Diagnose => {
            let options = DiagnosticOptions::new(&args.prompts, &args.config);
            let report = diagnose::run(&options);
            println!("{report}");
            std::process::exit(report.exit_code());
        }
        Command::Short(short) => run_short(&args.prompts, &args.config, short).await,
        Command::Long(long) => run_long(&args.prompts, &args.config, long).await,
    }
}

fn build_pipeline(
    prompts: &Path,
    backend: &BackendArgs,
    output: &OutputArgs,
) -> anyhow::Result<Pipeline> {
    let store = TemplateStore::load(prompts)
        .with_context(|| format!("Cannot load prompt templates from {}", prompts.display()))?;

    let api_key = backend
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .context("No API key: pass --api-key or set OPENAI_API_KEY")?;
    let timeout = Duration::from_secs(backend.timeout_secs);
    let client = OpenAiBackend::new(&backend.base_url, api_key, &backend.model, timeout)?;
    let policy = RetryPolicy {
        max_retries: backend.max_retries,
        attempt_timeout: timeout,
        ..RetryPolicy::default()
    };
    info!(
        "Using model {} at {} ({} retries)",
        backend.model, backend.base_url, backend.max_retries
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; abandoning in-flight generation");
            let _ = cancel_tx.send(true);
        }
    });

    let generator = ScriptGenerator::new(Arc::new(client), policy);
    Ok(Pipeline::new(Arc::new(store), generator, output.chunk_chars).with_cancel(cancel_rx))
}

async fn run_short(prompts: &Path, config: &Path, args: ShortArgs) -> anyhow::Result<()> {
    let run_config = RunConfig::load_or_default(config)?;

    let titles = if args.titles.is_empty() {
        vec![
            run_config
                .general_topic
                .clone()
                .context("No topic: pass --title or set general_topic in the config")?,
        ]
    } else {
        args.titles.clone()
    };
    let time = args
        .time
        .or(run_config.time)
        .context("No duration: pass --time or set time in the config")?;

    let pipeline = Arc::new(build_pipeline(prompts, &args.backend, &args.output)?);
    let requests = titles
        .into_iter()
        .map(|title| ShortRequest { title, time })
        .collect();

    let mut failures = 0;
    for (request, result) in pipeline.run_short_batch(requests).await {
        match result {
            Ok(handoff) => emit(&handoff, &args.output)?,
            Err(e) => {
                failures += 1;
                error!("'{}' failed at {} stage: {}", request.title, e.stage(), e);
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{} short-form run(s) failed", failures);
    }
    info!("Process complete.");
    Ok(())
}

async fn run_long(prompts: &Path, config: &Path, args: LongArgs) -> anyhow::Result<()> {
    let run_config = RunConfig::load_or_default(config)?;

    let title = args
        .title
        .clone()
        .or_else(|| run_config.general_topic.clone())
        .context("No topic: pass --title or set general_topic in the config")?;
    let request = LongRequest {
        title,
        language: args
            .language
            .clone()
            .or_else(|| run_config.language.clone())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        multi_speaker: run_config.multi_speaker_with(args.multi_speaker),
        sections: args.sections,
    };

    let pipeline = build_pipeline(prompts, &args.backend, &args.output)?;
    match pipeline.run_long(&request).await {
        Ok(handoff) => emit(&handoff, &args.output)?,
        Err(e) => {
            error!("'{}' failed at {} stage: {}", request.title, e.stage(), e);
            return Err(e.into());
        }
    }
    info!("Process complete.");
    Ok(())
}

fn emit(handoff: &Handoff, output: &OutputArgs) -> anyhow::Result<()> {
    for anomaly in &handoff.anomalies {
        warn!("{}", anomaly);
    }
    let script = handoff.script();
    match &output.out_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create output directory {}", dir.display()))?;
            let path = dir.join(format!("{}.txt", slugify(&handoff.title)));
            fs::write(&path, &script)
                .with_context(|| format!("Cannot write script to {}", path.display()))?;
            info!(
                "Script for '{}' written to {} ({} narration chunks)",
                handoff.title,
                path.display(),
                handoff.narration.len()
            );
        }
        None => {
            println!("# {}\n\n{}\n", handoff.title, script);
        }
    }
    Ok(())
}
