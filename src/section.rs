#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The fixed set of note sections that get graded.

use std::fmt::Display;

/// Column key of the synthesized organization pseudo-section.
pub const ORGANIZATION_KEY: &str = "org";

/// One part of an OSCE post-encounter note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    /// History of present illness (`hpi`).
    History,
    /// Physical examination (`pex`).
    Exam,
    /// Summary statement (`sum`).
    Summary,
    /// Differential diagnosis (`ddx`).
    Differential,
    /// Supporting information for the differential (`support`).
    Support,
    /// Diagnostic and management plan (`plan`).
    Plan,
}

impl Section {
    /// Every gradable section, in the order they are graded and concatenated.
    pub const ALL: [Section; 6] = [
        Section::History,
        Section::Exam,
        Section::Summary,
        Section::Differential,
        Section::Support,
        Section::Plan,
    ];

    /// Column name of this section in the submission, rubric and answer-key
    /// spreadsheets.
    pub fn key(self) -> &'static str {
        match self {
            Section::History => "hpi",
            Section::Exam => "pex",
            Section::Summary => "sum",
            Section::Differential => "ddx",
            Section::Support => "support",
            Section::Plan => "plan",
        }
    }

    /// Human readable heading used when sections are stitched together.
    pub fn header(self) -> &'static str {
        match self {
            Section::History => "History of Present Illness",
            Section::Exam => "Physical Examination",
            Section::Summary => "Summary",
            Section::Differential => "Differential Diagnosis",
            Section::Support => "Supporting Information",
            Section::Plan => "Plan",
        }
    }

    /// Looks a section up by its column key, ignoring case.
    pub fn from_key(key: &str) -> Option<Section> {
        Section::ALL
            .into_iter()
            .find(|s| s.key().eq_ignore_ascii_case(key.trim()))
    }
}

impl Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Name of the column that receives the rationale for `key`.
pub fn explanation_column(key: &str) -> String {
    format!("{key}_gpt_explanation")
}

/// Name of the column that receives the extracted score for `key`.
pub fn score_column(key: &str) -> String {
    format!("{key}_gpt_score")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip_case_insensitively() {
        for section in Section::ALL {
            assert_eq!(Section::from_key(&section.key().to_uppercase()), Some(section));
        }
        assert_eq!(Section::from_key("org"), None);
    }

    #[test]
    fn derived_column_names() {
        assert_eq!(explanation_column("hpi"), "hpi_gpt_explanation");
        assert_eq!(score_column(ORGANIZATION_KEY), "org_gpt_score");
    }
}
