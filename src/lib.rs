//! # notegrade
//!
//! Grades OSCE post-encounter notes section by section. Each section is sent
//! to a language model together with its rubric and answer-key entries; the
//! model's rationale and a score extracted from it are written back into the
//! submissions spreadsheet.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Row-by-row, section-by-section grading of a submissions sheet
pub mod batch;
/// The boundary to the text-generation service
pub mod completion;
/// Layered run configuration and API key loading
pub mod config;
/// Error types
pub mod error;
/// Two-exchange grading of a single section
pub mod grader;
/// The fixed set of note sections
pub mod section;
/// Spreadsheet input and output
pub mod sheet;
/// End-of-run score overview
pub mod summary;
/// Append-only interaction log
pub mod transcript;

use std::path::PathBuf;

use batch::{BatchProcessor, RowOutcome};
use completion::CompletionService;
use config::GraderConfig;
use error::Result;
use grader::SectionGrader;
use sheet::{Sheet, read_rubric_and_key};
use transcript::Transcript;

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Per-row scores, in row order.
    pub outcomes:    Vec<RowOutcome>,
    /// Where the augmented spreadsheet was written.
    pub output_path: PathBuf,
    /// Where the interaction log was appended.
    pub log_path:    PathBuf,
}

/// Grades the submissions named in `config` using `service`, then writes the
/// augmented spreadsheet.
///
/// Nothing is written to the output path unless every row was processed.
pub async fn grade_files<S: CompletionService>(
    config: &GraderConfig,
    service: S,
) -> Result<RunReport> {
    let params = config.grading_params()?;
    let (rubric, answer_key) =
        read_rubric_and_key(config.rubric_path(), config.answer_key_path())?;
    let mut sheet = Sheet::read(config.notes_path())?;

    let transcript = Transcript::for_output(config.output_path());
    let log_path = transcript.path().to_path_buf();
    let grader = SectionGrader::builder()
        .service(service)
        .params(params)
        .transcript(transcript)
        .policy(config.on_failure())
        .build();

    let outcomes = BatchProcessor::new(&grader, &rubric, &answer_key)
        .process(&mut sheet)
        .await?;

    sheet.write(config.output_path())?;
    tracing::info!(
        "Grading completed. Results saved to {}. Log saved to {}.",
        config.output_path().display(),
        log_path.display()
    );

    Ok(RunReport {
        outcomes,
        output_path: config.output_path().to_path_buf(),
        log_path,
    })
}
