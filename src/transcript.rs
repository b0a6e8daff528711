#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Append-only plain-text log of every exchange with the text-generation
//! service.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use crate::{
    completion::CompletionRequest,
    error::{GraderError, Result},
};

/// Path of the interaction log that accompanies the output at `output`.
pub fn log_path_for(output: &Path) -> PathBuf {
    output.with_extension("log")
}

/// Renders one exchange as a log block.
pub fn format_interaction(request: &CompletionRequest, response: &str) -> String {
    let mut block = String::from("----- Interaction -----\n");
    for (role, content) in request.messages() {
        block.push_str(&format!("{role}: {content}\n"));
    }
    block.push_str(&format!("Response: {response}\n"));
    block.push_str("-----------------------\n\n");
    block
}

/// The interaction log for one grading run.
///
/// The file is opened, appended to and closed on every call; no handle is
/// kept between exchanges.
#[derive(Debug, Clone)]
pub struct Transcript {
    /// Where blocks are appended.
    path: PathBuf,
}

impl Transcript {
    /// Creates a transcript writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates the transcript that belongs next to the output spreadsheet.
    pub fn for_output(output: &Path) -> Self {
        Self::new(log_path_for(output))
    }

    /// Returns the log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one request/response pair.
    pub fn record(&self, request: &CompletionRequest, response: &str) -> Result<()> {
        let err = |source: std::io::Error| GraderError::Transcript {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(err)?;
        file.write_all(format_interaction(request, response).as_bytes())
            .map_err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_path_replaces_extension() {
        assert_eq!(log_path_for(Path::new("out/results.xlsx")), PathBuf::from("out/results.log"));
        assert_eq!(log_path_for(Path::new("results")), PathBuf::from("results.log"));
    }

    #[test]
    fn block_layout() {
        let request = CompletionRequest::builder()
            .system("be brief")
            .user("grade this")
            .model("m")
            .build();

        assert_eq!(
            format_interaction(&request, "7"),
            "----- Interaction -----\nsystem: be brief\nuser: grade this\nResponse: \
             7\n-----------------------\n\n"
        );
    }
}
