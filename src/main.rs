#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # notegrade
//!
//! Grades OSCE post-encounter notes stored in a spreadsheet. Every section of
//! every note is scored by a language model against a rubric and an answer
//! key; explanations and scores are written to a new spreadsheet, and every
//! exchange with the model is appended to a log file next to it.
//!
//! Put the API key in `api_key.txt` (or set `OPENAI_API_KEY`) and run
//! `notegrade grade --rubric rubric.xlsx --answer-key key.xlsx --notes
//! notes.xlsx --output results.xlsx`.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use bpaf::*;
use colored::Colorize;
use dotenvy::dotenv;
use notegrade::{
    completion::OpenAiService,
    config::{ConfigLayer, FailurePolicy, GraderConfig},
    grade_files, summary,
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Grade a batch of notes
    Grade(Option<PathBuf>, ConfigLayer, Vec<PathBuf>),
    /// Print the effective configuration
    ShowConfig(Option<PathBuf>, ConfigLayer),
}

/// Parsed command line.
#[derive(Debug, Clone)]
struct Options {
    /// Log debug events as well
    verbose: bool,
    /// The command to run
    cmd:     Cmd,
}

/// Parse the command line arguments and return the options
fn options() -> Options {
    /// parses the config file path
    fn config_file() -> impl Parser<Option<PathBuf>> {
        long("config")
            .help("JSON file with default settings")
            .argument::<PathBuf>("PATH")
            .optional()
    }

    /// parses settings that override the config file and environment
    fn layer() -> impl Parser<ConfigLayer> {
        let api_base = long("api-base")
            .help("Base URL of an OpenAI-compatible API")
            .argument::<String>("URL")
            .optional();
        let api_key_file = long("api-key-file")
            .help("File containing the API key (default: api_key.txt)")
            .argument::<PathBuf>("PATH")
            .optional();
        let model = long("model")
            .help("Model used for grading and score extraction")
            .argument::<String>("NAME")
            .optional();
        let extraction_model = long("extraction-model")
            .help("Model used for score extraction only")
            .argument::<String>("NAME")
            .optional();
        let temperature = long("temperature")
            .help("Sampling temperature (default: 0.5)")
            .argument::<f32>("T")
            .optional();
        let top_p = long("top-p")
            .help("Nucleus sampling mass (default: 1.0)")
            .argument::<f32>("P")
            .optional();
        let request_timeout_secs = long("timeout")
            .help("Give up on a single request after this many seconds")
            .argument::<u64>("SECS")
            .optional();
        let on_failure = long("on-failure")
            .help("What to do when a request fails: abort or skip")
            .argument::<FailurePolicy>("POLICY")
            .optional();
        let grading_prompt_path = long("prompt")
            .help("File replacing the bundled grading instruction")
            .argument::<PathBuf>("PATH")
            .optional();
        let rubric = long("rubric")
            .help("Rubric spreadsheet")
            .argument::<PathBuf>("PATH")
            .optional();
        let answer_key = long("answer-key")
            .help("Answer-key spreadsheet")
            .argument::<PathBuf>("PATH")
            .optional();
        let notes = long("notes")
            .help("Spreadsheet with the student notes")
            .argument::<PathBuf>("PATH")
            .optional();
        let output = long("output")
            .help("Where to write the graded spreadsheet")
            .argument::<PathBuf>("PATH")
            .optional();

        construct!(ConfigLayer {
            api_base,
            api_key_file,
            model,
            extraction_model,
            temperature,
            top_p,
            request_timeout_secs,
            on_failure,
            grading_prompt_path,
            rubric,
            answer_key,
            notes,
            output,
        })
    }

    /// parses rubric, answer key, notes and output given positionally
    fn paths() -> impl Parser<Vec<PathBuf>> {
        positional::<PathBuf>("PATHS")
            .help("RUBRIC ANSWER_KEY NOTES OUTPUT, in that order; flags take precedence")
            .many()
    }

    let grade = construct!(Cmd::Grade(config_file(), layer(), paths()))
        .to_options()
        .command("grade")
        .help("Grade every note in a spreadsheet");

    let show_config = construct!(Cmd::ShowConfig(config_file(), layer()))
        .to_options()
        .command("show-config")
        .help("Print the effective configuration as JSON");

    let cmd = construct!([grade, show_config]);
    let verbose = short('v')
        .long("verbose")
        .help("Log debug events")
        .switch();

    construct!(Options { verbose, cmd })
        .to_options()
        .descr("Grade OSCE post-encounter notes with a language model")
        .run()
}

/// Fills path settings that were not given as flags from positional
/// arguments, in rubric, answer key, notes, output order.
fn with_positional_paths(mut layer: ConfigLayer, paths: Vec<PathBuf>) -> Result<ConfigLayer> {
    let open: Vec<&mut Option<PathBuf>> = [
        &mut layer.rubric,
        &mut layer.answer_key,
        &mut layer.notes,
        &mut layer.output,
    ]
    .into_iter()
    .filter(|slot| slot.is_none())
    .collect();

    if paths.len() > open.len() {
        bail!(
            "Expected at most {} positional paths (flags already set the others), got {}",
            open.len(),
            paths.len()
        );
    }

    for (slot, path) in open.into_iter().zip(paths) {
        *slot = Some(path);
    }

    Ok(layer)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let Options { verbose, cmd } = options();

    let fmt = fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false);
    let filter_layer = LevelFilter::from_level(if verbose { Level::DEBUG } else { Level::INFO });
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    match cmd {
        Cmd::Grade(config_file, layer, paths) => {
            let layer = with_positional_paths(layer, paths)?;
            let config = GraderConfig::load(config_file.as_deref(), layer)
                .context("Could not resolve configuration")?;

            let api_key = match config.api_key() {
                Ok(key) => key,
                Err(e) => {
                    eprintln!("{} {e}", "Error:".red().bold());
                    std::process::exit(1);
                }
            };

            let service = OpenAiService::new(&config, api_key);
            let report = grade_files(&config, service)
                .await
                .with_context(|| {
                    format!("Grading {} failed", config.notes_path().display())
                })?;

            println!("{}", summary::render(&report.outcomes));
        }
        Cmd::ShowConfig(config_file, layer) => {
            let config = GraderConfig::load(config_file.as_deref(), layer)
                .context("Could not resolve configuration")?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positionals_fill_only_paths_not_given_as_flags() {
        let layer = ConfigLayer {
            rubric: Some(PathBuf::from("r.xlsx")),
            ..Default::default()
        };
        let paths = vec!["key.xlsx".into(), "notes.xlsx".into(), "out.xlsx".into()];

        let layer = with_positional_paths(layer, paths).unwrap();

        assert_eq!(layer.rubric, Some(PathBuf::from("r.xlsx")));
        assert_eq!(layer.answer_key, Some(PathBuf::from("key.xlsx")));
        assert_eq!(layer.notes, Some(PathBuf::from("notes.xlsx")));
        assert_eq!(layer.output, Some(PathBuf::from("out.xlsx")));
    }

    #[test]
    fn positionals_skip_a_flag_in_the_middle() {
        let layer = ConfigLayer {
            notes: Some(PathBuf::from("n.csv")),
            ..Default::default()
        };
        let paths = vec!["r.csv".into(), "k.csv".into()];

        let layer = with_positional_paths(layer, paths).unwrap();

        assert_eq!(layer.rubric, Some(PathBuf::from("r.csv")));
        assert_eq!(layer.answer_key, Some(PathBuf::from("k.csv")));
        assert_eq!(layer.notes, Some(PathBuf::from("n.csv")));
        assert_eq!(layer.output, None);
    }

    #[test]
    fn more_positionals_than_open_paths_is_an_error() {
        let layer = ConfigLayer {
            output: Some(PathBuf::from("o.xlsx")),
            ..Default::default()
        };
        let paths = vec!["a".into(), "b".into(), "c".into(), "d".into()];

        assert!(with_positional_paths(layer, paths).is_err());
    }
}
