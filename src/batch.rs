#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Walks the submissions sheet row by row and section by section, writing
//! explanation and score columns back into it.

use itertools::Itertools;
use serde::Serialize;

use crate::{
    completion::CompletionService,
    error::Result,
    grader::{GradingResult, SectionGrader},
    section::{ORGANIZATION_KEY, Section, explanation_column, score_column},
    sheet::{ReferenceMap, Sheet},
};

/// Scores recorded for one row, in grading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowOutcome {
    /// One-based row number, as announced in progress messages.
    pub row:    usize,
    /// `(section key, score)` for every section that was graded.
    pub scores: Vec<(String, Option<i64>)>,
}

/// Stitches present sections into the document graded for organization.
///
/// Each section becomes `"{header}:\n{text}\n\n"`.
pub fn organization_document(sections: &[(Section, String)]) -> String {
    sections
        .iter()
        .map(|(section, text)| format!("{}:\n{}\n\n", section.header(), text))
        .join("")
}

/// Grades every row of a submissions sheet.
pub struct BatchProcessor<'a, S: CompletionService> {
    /// Grader used for every section.
    grader:     &'a SectionGrader<S>,
    /// Rubric entries by section key.
    rubric:     &'a ReferenceMap,
    /// Answer-key entries by section key.
    answer_key: &'a ReferenceMap,
}

impl<'a, S: CompletionService> BatchProcessor<'a, S> {
    /// Creates a processor that grades with `grader` against `rubric` and
    /// `answer_key`.
    pub fn new(
        grader: &'a SectionGrader<S>,
        rubric: &'a ReferenceMap,
        answer_key: &'a ReferenceMap,
    ) -> Self {
        Self {
            grader,
            rubric,
            answer_key,
        }
    }

    /// Grades every row of `sheet` in order, adding
    /// `{key}_gpt_explanation` / `{key}_gpt_score` columns as it goes.
    pub async fn process(&self, sheet: &mut Sheet) -> Result<Vec<RowOutcome>> {
        let total = sheet.len();
        let mut outcomes = Vec::with_capacity(total);

        for index in 0..total {
            tracing::info!("Processing row {}/{}...", index + 1, total);
            outcomes.push(self.process_row(sheet, index).await?);
        }

        Ok(outcomes)
    }

    /// Grades the sections of one row, then its organization.
    async fn process_row(&self, sheet: &mut Sheet, index: usize) -> Result<RowOutcome> {
        let mut outcome = RowOutcome {
            row:    index + 1,
            scores: Vec::new(),
        };

        let present: Vec<(Section, String)> = Section::ALL
            .into_iter()
            .filter_map(|section| sheet.text(index, section.key()).map(|text| (section, text)))
            .collect();

        for (section, text) in &present {
            let graded = self
                .grader
                .grade_section(self.rubric, self.answer_key, text, section.key())
                .await?;
            if let Some(result) = graded {
                record(sheet, index, section.key(), &result, &mut outcome);
            }
        }

        if present.is_empty() {
            tracing::warn!("Row {} has no gradable sections", index + 1);
            return Ok(outcome);
        }

        let combined = organization_document(&present);
        let graded = self
            .grader
            .grade_section(self.rubric, &ReferenceMap::default(), &combined, ORGANIZATION_KEY)
            .await?;
        if let Some(result) = graded {
            record(sheet, index, ORGANIZATION_KEY, &result, &mut outcome);
        }

        Ok(outcome)
    }
}

/// Writes a graded section into the sheet and the row outcome.
fn record(
    sheet: &mut Sheet,
    index: usize,
    key: &str,
    result: &GradingResult,
    outcome: &mut RowOutcome,
) {
    sheet.set(index, &explanation_column(key), result.explanation.clone());
    sheet.set(index, &score_column(key), result.score);
    outcome.scores.push((key.to_owned(), result.score));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn organization_document_uses_headers_and_blank_lines() {
        let doc = organization_document(&[
            (Section::History, "cough x3 days".into()),
            (Section::Plan, "CXR".into()),
        ]);
        assert_eq!(doc, "History of Present Illness:\ncough x3 days\n\nPlan:\nCXR\n\n");
    }

    #[test]
    fn organization_document_of_nothing_is_empty() {
        assert!(organization_document(&[]).is_empty());
    }
}
