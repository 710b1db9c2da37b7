use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "gptube", about = "Generate narrated YouTube scripts from prompt templates")]
pub struct Args {
    #[clap(long, global = true, default_value = "prompts/prompt.yaml")]
    pub prompts: PathBuf,

    #[clap(long, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate one or more short-form scripts
    Short(ShortArgs),
    /// Generate a long-form, multi-section script
    Long(LongArgs),
    /// Check files, config and prompt templates
    Diagnose,
}

#[derive(ClapArgs, Debug)]
pub struct ShortArgs {
    /// Topic of the short; repeat for a batch. Defaults to general_topic.
    #[clap(long = "title")]
    pub titles: Vec<String>,

    /// Target duration in seconds. Defaults to the config's time.
    #[clap(long)]
    pub time: Option<u32>,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(ClapArgs, Debug)]
pub struct LongArgs {
    #[clap(long)]
    pub title: Option<String>,

    #[clap(long)]
    pub language: Option<String>,

    /// Two hosts instead of one; `--multi-speaker false` overrides the config file
    #[clap(long, num_args = 0..=1, default_missing_value = "true")]
    pub multi_speaker: Option<bool>,

    #[clap(long, default_value_t = 5)]
    pub sections: usize,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(ClapArgs, Debug)]
pub struct OutputArgs {
    /// Write each script to <out-dir>/<title>.txt instead of stdout
    #[clap(long)]
    pub out_dir: Option<PathBuf>,

    #[clap(long, default_value_t = 250)]
    pub chunk_chars: usize,
}

#[derive(ClapArgs, Debug)]
pub struct BackendArgs {
    #[clap(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[clap(long, default_value = "https://api.openai.com/v1")]
    pub base_url: String,

    #[clap(long, default_value = "gpt-4o-mini")]
    pub model: String,

    #[clap(long, default_value_t = 3)]
    pub max_retries: usize,

    #[clap(long, default_value_t = 120)]
    pub timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_flag(argv: &[&str]) -> Option<bool> {
        let args = Args::try_parse_from(argv).unwrap();
        match args.command {
            Command::Long(long) => long.multi_speaker,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_should_parse_multi_speaker_as_tristate() {
        assert_eq!(long_flag(&["gptube", "long"]), None);
        assert_eq!(long_flag(&["gptube", "long", "--multi-speaker"]), Some(true));
        assert_eq!(
            long_flag(&["gptube", "long", "--multi-speaker", "false", "--sections", "3"]),
            Some(false)
        );
    }
}
