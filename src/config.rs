#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Run configuration.
//!
//! Settings are layered, lowest precedence first: built-in defaults, an
//! optional JSON config file, environment variables (a `.env` file is loaded
//! by the binary), then command line flags. The resulting [`GraderConfig`] is
//! passed explicitly to everything that needs it.

use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{GraderError, Result},
    grader::GradingParams,
};

/// Model used for both exchanges unless overridden.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Default OpenAI-compatible endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
/// File holding the API key, relative to the working directory.
pub const DEFAULT_API_KEY_FILE: &str = "api_key.txt";
/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.5;
/// Default nucleus sampling mass.
pub const DEFAULT_TOP_P: f32 = 1.0;
/// Default rubric spreadsheet.
pub const DEFAULT_RUBRIC_PATH: &str = "examples/sample_rubric.xlsx";
/// Default answer-key spreadsheet.
pub const DEFAULT_ANSWER_KEY_PATH: &str = "examples/sample_answer_key.xlsx";
/// Default submissions spreadsheet.
pub const DEFAULT_NOTES_PATH: &str = "examples/sample_notes.xlsx";
/// Default output spreadsheet.
pub const DEFAULT_OUTPUT_PATH: &str = "results.xlsx";

/// Environment variable consulted when the API key file does not exist.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Bundled grading instruction, used unless `grading_prompt_path` is set.
const DEFAULT_GRADING_PROMPT: &str = include_str!("prompts/grading_system.md");

/// What to do when an exchange with the text-generation service fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the whole run; no output spreadsheet is written.
    #[default]
    Abort,
    /// Leave the section ungraded (or its score absent) and keep going.
    SkipSection,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "skip" | "skip-section" | "skip_section" => Ok(FailurePolicy::SkipSection),
            other => Err(format!("unknown failure policy `{other}` (expected `abort` or `skip`)")),
        }
    }
}

impl Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::Abort => f.write_str("abort"),
            FailurePolicy::SkipSection => f.write_str("skip"),
        }
    }
}

/// A partial set of settings; used for the config file, the environment and
/// command line flags alike.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    /// Base URL of the chat completions API.
    pub api_base:             Option<String>,
    /// File holding the API key.
    pub api_key_file:         Option<PathBuf>,
    /// Model for both exchanges.
    pub model:                Option<String>,
    /// Model for the score extraction exchange only.
    pub extraction_model:     Option<String>,
    /// Sampling temperature.
    pub temperature:          Option<f32>,
    /// Nucleus sampling mass.
    pub top_p:                Option<f32>,
    /// Upper bound on a single exchange, in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Failure handling for remote exchanges.
    pub on_failure:           Option<FailurePolicy>,
    /// File replacing the bundled grading instruction.
    pub grading_prompt_path:  Option<PathBuf>,
    /// Rubric spreadsheet.
    pub rubric:               Option<PathBuf>,
    /// Answer-key spreadsheet.
    pub answer_key:           Option<PathBuf>,
    /// Submissions spreadsheet.
    pub notes:                Option<PathBuf>,
    /// Output spreadsheet.
    pub output:               Option<PathBuf>,
}

impl ConfigLayer {
    /// Reads a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            GraderError::Config(format!("could not read config file {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            GraderError::Config(format!("could not parse config file {}: {e}", path.display()))
        })
    }

    /// Collects settings from environment variables, using `lookup` to read
    /// them. Blank or unparsable values are ignored.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        Self {
            api_base: var("OPENAI_ENDPOINT"),
            api_key_file: var("NOTEGRADE_API_KEY_FILE").map(PathBuf::from),
            model: var("OPENAI_MODEL"),
            extraction_model: var("OPENAI_EXTRACTION_MODEL"),
            temperature: var("OPENAI_TEMPERATURE").and_then(|s| s.parse().ok()),
            top_p: var("OPENAI_TOP_P").and_then(|s| s.parse().ok()),
            request_timeout_secs: var("NOTEGRADE_TIMEOUT_SECS").and_then(|s| s.parse().ok()),
            on_failure: var("NOTEGRADE_ON_FAILURE").and_then(|s| s.parse().ok()),
            ..Self::default()
        }
    }

    /// Collects settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(|name| std::env::var(name).ok())
    }
}

/// Fully resolved settings for one grading run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraderConfig {
    /// Base URL of the chat completions API.
    api_base:             String,
    /// File holding the API key.
    api_key_file:         PathBuf,
    /// Model used to generate rationales.
    rationale_model:      String,
    /// Model used to extract scores from rationales.
    extraction_model:     String,
    /// Sampling temperature.
    temperature:          f32,
    /// Nucleus sampling mass.
    top_p:                f32,
    /// Upper bound on a single exchange, in seconds.
    request_timeout_secs: Option<u64>,
    /// Failure handling for remote exchanges.
    on_failure:           FailurePolicy,
    /// File replacing the bundled grading instruction.
    grading_prompt_path:  Option<PathBuf>,
    /// Rubric spreadsheet.
    rubric_path:          PathBuf,
    /// Answer-key spreadsheet.
    answer_key_path:      PathBuf,
    /// Submissions spreadsheet.
    notes_path:           PathBuf,
    /// Output spreadsheet.
    output_path:          PathBuf,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            api_base:             DEFAULT_API_BASE.to_owned(),
            api_key_file:         PathBuf::from(DEFAULT_API_KEY_FILE),
            rationale_model:      DEFAULT_MODEL.to_owned(),
            extraction_model:     DEFAULT_MODEL.to_owned(),
            temperature:          DEFAULT_TEMPERATURE,
            top_p:                DEFAULT_TOP_P,
            request_timeout_secs: None,
            on_failure:           FailurePolicy::Abort,
            grading_prompt_path:  None,
            rubric_path:          PathBuf::from(DEFAULT_RUBRIC_PATH),
            answer_key_path:      PathBuf::from(DEFAULT_ANSWER_KEY_PATH),
            notes_path:           PathBuf::from(DEFAULT_NOTES_PATH),
            output_path:          PathBuf::from(DEFAULT_OUTPUT_PATH),
        }
    }
}

impl GraderConfig {
    /// Resolves the configuration: defaults, then `config_file` (if any), then
    /// the process environment, then `cli`.
    pub fn load(config_file: Option<&Path>, cli: ConfigLayer) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = config_file {
            config.apply(ConfigLayer::from_file(path)?);
        }
        config.apply(ConfigLayer::from_env());
        config.apply(cli);
        config.validate()?;
        Ok(config)
    }

    /// Overrides every setting that `layer` provides.
    ///
    /// `model` sets both models; `extraction_model` then overrides the
    /// extraction model alone.
    pub fn apply(&mut self, layer: ConfigLayer) {
        if let Some(v) = layer.api_base {
            self.api_base = v;
        }
        if let Some(v) = layer.api_key_file {
            self.api_key_file = v;
        }
        if let Some(v) = layer.model {
            self.rationale_model = v.clone();
            self.extraction_model = v;
        }
        if let Some(v) = layer.extraction_model {
            self.extraction_model = v;
        }
        if let Some(v) = layer.temperature {
            self.temperature = v;
        }
        if let Some(v) = layer.top_p {
            self.top_p = v;
        }
        if let Some(v) = layer.request_timeout_secs {
            self.request_timeout_secs = Some(v);
        }
        if let Some(v) = layer.on_failure {
            self.on_failure = v;
        }
        if let Some(v) = layer.grading_prompt_path {
            self.grading_prompt_path = Some(v);
        }
        if let Some(v) = layer.rubric {
            self.rubric_path = v;
        }
        if let Some(v) = layer.answer_key {
            self.answer_key_path = v;
        }
        if let Some(v) = layer.notes {
            self.notes_path = v;
        }
        if let Some(v) = layer.output {
            self.output_path = v;
        }
    }

    /// Rejects sampling values the API would refuse.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(GraderError::Config(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(GraderError::Config(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        Ok(())
    }

    /// Returns the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Returns the API key file path.
    pub fn api_key_file(&self) -> &Path {
        &self.api_key_file
    }

    /// Returns the rationale model.
    pub fn rationale_model(&self) -> &str {
        &self.rationale_model
    }

    /// Returns the extraction model.
    pub fn extraction_model(&self) -> &str {
        &self.extraction_model
    }

    /// Returns the sampling temperature.
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Returns the nucleus sampling mass.
    pub fn top_p(&self) -> f32 {
        self.top_p
    }

    /// Returns the per-exchange timeout, if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Returns the failure policy.
    pub fn on_failure(&self) -> FailurePolicy {
        self.on_failure
    }

    /// Returns the rubric path.
    pub fn rubric_path(&self) -> &Path {
        &self.rubric_path
    }

    /// Returns the answer-key path.
    pub fn answer_key_path(&self) -> &Path {
        &self.answer_key_path
    }

    /// Returns the submissions path.
    pub fn notes_path(&self) -> &Path {
        &self.notes_path
    }

    /// Returns the output path.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Loads the API key, falling back to `OPENAI_API_KEY` when the key file
    /// does not exist.
    pub fn api_key(&self) -> Result<String> {
        resolve_api_key(&self.api_key_file, std::env::var(API_KEY_ENV).ok())
    }

    /// Returns the grading instruction: the configured file, or the bundled
    /// prompt.
    pub fn grading_prompt(&self) -> Result<String> {
        match &self.grading_prompt_path {
            Some(path) => std::fs::read_to_string(path)
                .map(|s| s.trim().to_owned())
                .map_err(|e| {
                    GraderError::Config(format!(
                        "could not read grading prompt {}: {e}",
                        path.display()
                    ))
                }),
            None => Ok(DEFAULT_GRADING_PROMPT.trim().to_owned()),
        }
    }

    /// Bundles the prompt and sampling settings the section grader needs.
    pub fn grading_params(&self) -> Result<GradingParams> {
        Ok(GradingParams::builder()
            .system_prompt(self.grading_prompt()?)
            .rationale_model(self.rationale_model.clone())
            .extraction_model(self.extraction_model.clone())
            .temperature(self.temperature)
            .top_p(self.top_p)
            .build())
    }
}

/// Reads the API key from `path`, trimming surrounding whitespace.
pub fn load_api_key(path: &Path) -> Result<String> {
    let key = std::fs::read_to_string(path).map_err(|e| GraderError::credential(path, e))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(GraderError::credential(path, "the file is empty"));
    }
    Ok(key.to_owned())
}

/// Reads the API key from `path`; when that fails and `fallback` holds a
/// non-blank key, uses the fallback instead.
pub fn resolve_api_key(path: &Path, fallback: Option<String>) -> Result<String> {
    match load_api_key(path) {
        Ok(key) => Ok(key),
        Err(err) => match fallback.map(|k| k.trim().to_owned()).filter(|k| !k.is_empty()) {
            Some(key) => {
                tracing::debug!("{err}; using {API_KEY_ENV} instead");
                Ok(key)
            }
            None => Err(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_layer_sets_both_models() {
        let mut config = GraderConfig::default();
        config.apply(ConfigLayer {
            model: Some("gpt-4o".into()),
            ..Default::default()
        });
        assert_eq!(config.rationale_model(), "gpt-4o");
        assert_eq!(config.extraction_model(), "gpt-4o");

        config.apply(ConfigLayer {
            extraction_model: Some("gpt-4o-mini".into()),
            ..Default::default()
        });
        assert_eq!(config.rationale_model(), "gpt-4o");
        assert_eq!(config.extraction_model(), "gpt-4o-mini");
    }

    #[test]
    fn env_layer_ignores_blank_and_bad_values() {
        let layer = ConfigLayer::from_env_with(|name| match name {
            "OPENAI_MODEL" => Some("  ".into()),
            "OPENAI_TEMPERATURE" => Some("warm".into()),
            "OPENAI_TOP_P" => Some("0.9".into()),
            "NOTEGRADE_ON_FAILURE" => Some("skip".into()),
            _ => None,
        });
        assert_eq!(layer.model, None);
        assert_eq!(layer.temperature, None);
        assert_eq!(layer.top_p, Some(0.9));
        assert_eq!(layer.on_failure, Some(FailurePolicy::SkipSection));
    }

    #[test]
    fn out_of_range_sampling_is_rejected() {
        let mut config = GraderConfig::default();
        config.apply(ConfigLayer {
            top_p: Some(0.0),
            ..Default::default()
        });
        assert!(matches!(config.validate(), Err(GraderError::Config(_))));
    }

    #[test]
    fn failure_policy_parses() {
        assert_eq!("Abort".parse::<FailurePolicy>(), Ok(FailurePolicy::Abort));
        assert_eq!("skip-section".parse::<FailurePolicy>(), Ok(FailurePolicy::SkipSection));
        assert!("retry".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn missing_key_file_without_fallback_is_a_credential_error() {
        let path = Path::new("definitely/not/here/api_key.txt");
        assert!(matches!(resolve_api_key(path, None), Err(GraderError::Credential { .. })));
        assert_eq!(resolve_api_key(path, Some(" sk-test \n".into())).ok().as_deref(), Some("sk-test"));
    }

    #[test]
    fn whitespace_only_key_file_is_a_credential_error() {
        let dir = std::env::temp_dir().join(format!("notegrade-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("api_key.txt");
        std::fs::write(&path, "  \n\t\n").unwrap();

        assert!(matches!(load_api_key(&path), Err(GraderError::Credential { .. })));

        std::fs::write(&path, "\n sk-live \n").unwrap();
        assert_eq!(load_api_key(&path).ok().as_deref(), Some("sk-live"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn bundled_prompt_is_used_by_default() {
        let prompt = GraderConfig::default().grading_prompt().expect("prompt");
        assert!(prompt.starts_with("I am a medical educator"));
        assert!(!prompt.ends_with('\n'));
    }
}
