#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Grades one note section with two exchanges: the first asks for a
//! rationale that ends in a score, the second reduces that rationale to a
//! bare integer.

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::{
    completion::{CompletionRequest, CompletionService},
    config::FailurePolicy,
    error::{GraderError, Result},
    sheet::ReferenceMap,
    transcript::Transcript,
};

/// Text used when the rubric has no entry for a section.
pub const MISSING_RUBRIC: &str = "No rubric available for this section.";

/// System instruction for the extraction exchange.
const EXTRACTION_SYSTEM_PROMPT: &str = include_str!("prompts/extraction_system.md");

/// Prompt and sampling settings shared by every exchange in a run.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct GradingParams {
    /// System instruction for the rationale exchange.
    system_prompt:    String,
    /// Model that writes the rationale.
    rationale_model:  String,
    /// Model that extracts the score.
    extraction_model: String,
    /// Sampling temperature.
    #[builder(default = 0.5)]
    temperature:      f32,
    /// Nucleus sampling mass.
    #[builder(default = 1.0)]
    top_p:            f32,
}

impl GradingParams {
    /// Builds the rationale request for one section.
    pub fn rationale_request(
        &self,
        rubric_text: &str,
        key_text: &str,
        section_name: &str,
        section_text: &str,
    ) -> CompletionRequest {
        CompletionRequest::builder()
            .system(self.system_prompt.clone())
            .user(format!(
                "Refer to the rubric: {rubric_text}.\nHere is the answer key for {section_name}: \
                 {key_text}.\nPlease evaluate the following {section_name} and provide a score: \
                 {section_text}"
            ))
            .model(self.rationale_model.clone())
            .temperature(self.temperature)
            .top_p(self.top_p)
            .build()
    }

    /// Builds the request that reduces `rationale` to a bare integer.
    pub fn extraction_request(&self, rationale: &str) -> CompletionRequest {
        CompletionRequest::builder()
            .system(EXTRACTION_SYSTEM_PROMPT.trim())
            .user(format!(
                "For the following message: '{rationale}', please extract and output only the \
                 numeric score as an integer without any explanation or markdown."
            ))
            .model(self.extraction_model.clone())
            .temperature(self.temperature)
            .top_p(self.top_p)
            .build()
    }
}

/// The outcome of grading one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingResult {
    /// Free-form explanation produced by the first exchange.
    pub explanation: String,
    /// Score extracted by the second exchange; `None` if it was not an
    /// integer.
    pub score:       Option<i64>,
}

/// Parses the output of the extraction exchange.
///
/// Only an optionally signed run of decimal digits, after trimming, counts as
/// a score.
pub fn parse_score(text: &str) -> Option<i64> {
    let text = text.trim();
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Grades sections against a rubric and answer key.
#[derive(Builder)]
pub struct SectionGrader<S: CompletionService> {
    /// Where requests are sent.
    service:    S,
    /// Prompt and sampling settings.
    params:     GradingParams,
    /// Log that receives every exchange.
    transcript: Transcript,
    /// How remote failures are handled.
    #[builder(default)]
    policy:     FailurePolicy,
}

impl<S: CompletionService> SectionGrader<S> {
    /// Returns the completion service.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Returns the prompt and sampling settings.
    pub fn params(&self) -> &GradingParams {
        &self.params
    }

    /// Returns the interaction log.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Returns the failure policy.
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Sends `request`, logging the exchange whether or not it succeeds.
    async fn exchange(&self, request: &CompletionRequest) -> Result<String> {
        match self.service.complete(request).await {
            Ok(text) => {
                self.transcript.record(request, &text)?;
                Ok(text)
            }
            Err(err) => {
                self.transcript.record(request, &format!("[request failed: {err}]"))?;
                Err(err)
            }
        }
    }

    /// First exchange: asks for an explanation of the grade, ending in a
    /// score.
    pub async fn generate_rationale(
        &self,
        rubric_text: &str,
        key_text: &str,
        section_name: &str,
        section_text: &str,
    ) -> Result<String> {
        let request =
            self.params
                .rationale_request(rubric_text, key_text, section_name, section_text);
        self.exchange(&request).await
    }

    /// Second exchange: asks for the score in `rationale` as a bare integer.
    ///
    /// An answer that is not an integer is not an error; it yields `None`.
    pub async fn extract_integer(&self, rationale: &str) -> Result<Option<i64>> {
        let request = self.params.extraction_request(rationale);
        let raw = self.exchange(&request).await?;
        let score = parse_score(&raw);
        if score.is_none() {
            tracing::warn!(
                "Could not convert the response `{}` to an integer. Saving explanation only.",
                raw
            );
        }
        Ok(score)
    }

    /// Grades one section.
    ///
    /// Missing rubric entries become [`MISSING_RUBRIC`], missing answer-key
    /// entries become an empty string. Remote failures propagate under
    /// [`FailurePolicy::Abort`]. Under [`FailurePolicy::SkipSection`] a failed
    /// rationale returns `Ok(None)` and a failed extraction leaves the score
    /// absent.
    pub async fn grade_section(
        &self,
        rubric: &ReferenceMap,
        answer_key: &ReferenceMap,
        section_text: &str,
        section_name: &str,
    ) -> Result<Option<GradingResult>> {
        let rubric_text = rubric.get(section_name).unwrap_or(MISSING_RUBRIC);
        let key_text = answer_key.get(section_name).unwrap_or_default();

        let explanation = match self
            .generate_rationale(rubric_text, key_text, section_name, section_text)
            .await
        {
            Ok(text) => text,
            Err(err) if self.skips(&err) => {
                tracing::warn!("Skipping section `{section_name}`: {err}");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let score = match self.extract_integer(&explanation).await {
            Ok(score) => score,
            Err(err) if self.skips(&err) => {
                tracing::warn!("No score for section `{section_name}`: {err}");
                None
            }
            Err(err) => return Err(err),
        };

        tracing::debug!("Graded `{section_name}`: score {score:?}");
        Ok(Some(GradingResult { explanation, score }))
    }

    /// Returns true if `err` should be tolerated under the current policy.
    fn skips(&self, err: &GraderError) -> bool {
        self.policy == FailurePolicy::SkipSection && err.is_remote()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_score_accepts_bare_integers() {
        assert_eq!(parse_score("7"), Some(7));
        assert_eq!(parse_score(" 12\n"), Some(12));
        assert_eq!(parse_score("-2"), Some(-2));
        assert_eq!(parse_score("+3"), Some(3));
    }

    #[test]
    fn parse_score_rejects_everything_else() {
        assert_eq!(parse_score(""), None);
        assert_eq!(parse_score("7/10"), None);
        assert_eq!(parse_score("Score: 7"), None);
        assert_eq!(parse_score("7.5"), None);
        assert_eq!(parse_score("-"), None);
        assert_eq!(parse_score("99999999999999999999"), None);
    }

    #[test]
    fn rationale_prompt_embeds_every_part() {
        let params = GradingParams::builder()
            .system_prompt("grade")
            .rationale_model("a")
            .extraction_model("b")
            .build();
        let request = params.rationale_request("R", "K", "hpi", "T");

        assert_eq!(request.system, "grade");
        assert_eq!(request.model, "a");
        assert_eq!(
            request.user,
            "Refer to the rubric: R.\nHere is the answer key for hpi: K.\nPlease evaluate the \
             following hpi and provide a score: T"
        );
    }

    #[test]
    fn extraction_prompt_quotes_the_rationale() {
        let params = GradingParams::builder()
            .system_prompt("grade")
            .rationale_model("a")
            .extraction_model("b")
            .temperature(0.0)
            .build();
        let request = params.extraction_request("Good work.\n7");

        assert_eq!(request.model, "b");
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.system, "Your role is to help me complete this very simple task.");
        assert!(request.user.starts_with("For the following message: 'Good work.\n7'"));
    }
}
