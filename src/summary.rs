#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! End-of-run overview of the scores that were extracted.

use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, object::Rows},
};

use crate::batch::RowOutcome;

/// One line of the overview table.
#[derive(Tabled)]
struct ScoreLine {
    /// One-based row number.
    #[tabled(rename = "Row")]
    row:     usize,
    /// Section key.
    #[tabled(rename = "Section")]
    section: String,
    /// Extracted score, or a dash when none could be parsed.
    #[tabled(rename = "Score")]
    score:   String,
}

/// Counts graded sections and how many of them lack a score.
pub fn missing_scores(outcomes: &[RowOutcome]) -> (usize, usize) {
    let graded = outcomes.iter().map(|o| o.scores.len()).sum();
    let missing = outcomes
        .iter()
        .flat_map(|o| &o.scores)
        .filter(|(_, score)| score.is_none())
        .count();
    (graded, missing)
}

/// Renders the scores of every row as a table.
pub fn render(outcomes: &[RowOutcome]) -> String {
    let lines: Vec<ScoreLine> = outcomes
        .iter()
        .flat_map(|o| {
            o.scores.iter().map(move |(section, score)| ScoreLine {
                row:     o.row,
                section: section.clone(),
                score:   score.map_or_else(|| "-".to_owned(), |s| s.to_string()),
            })
        })
        .collect();

    let (graded, missing) = missing_scores(outcomes);

    Table::new(lines)
        .with(Panel::header(format!(
            "{graded} sections graded across {} rows ({missing} without a score)",
            outcomes.len()
        )))
        .with(Style::modern())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcomes() -> Vec<RowOutcome> {
        vec![RowOutcome {
            row:    1,
            scores: vec![("hpi".into(), Some(8)), ("org".into(), None)],
        }]
    }

    #[test]
    fn counts_missing_scores() {
        assert_eq!(missing_scores(&outcomes()), (2, 1));
    }

    #[test]
    fn render_lists_every_section() {
        let table = render(&outcomes());
        assert!(table.contains("hpi"));
        assert!(table.contains("org"));
        assert!(table.contains("2 sections graded across 1 rows (1 without a score)"));
    }
}
