#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use notegrade::{
    completion::{CompletionRequest, CompletionService},
    config::{ConfigLayer, FailurePolicy, GraderConfig},
    error::{GraderError, Result},
};
use uuid::Uuid;

/// A fake text-generation service that answers from a closure and remembers
/// every request it saw.
pub struct ScriptedService<F> {
    respond:  F,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl<F> ScriptedService<F>
where
    F: Fn(&CompletionRequest) -> Result<String>,
{
    pub fn new(respond: F) -> Self {
        Self {
            respond,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests poisoned").clone()
    }
}

impl<F> CompletionService for ScriptedService<F>
where
    F: Fn(&CompletionRequest) -> Result<String>,
{
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests
            .lock()
            .expect("requests poisoned")
            .push(request.clone());
        (self.respond)(request)
    }
}

pub fn is_extraction(request: &CompletionRequest) -> bool {
    request.user.starts_with("For the following message:")
}

/// Rationale "Looks fine.\n7", extraction "7".
pub fn always_seven(request: &CompletionRequest) -> Result<String> {
    if is_extraction(request) {
        Ok("7".to_owned())
    } else {
        Ok("Looks fine.\n7".to_owned())
    }
}

pub fn remote_failure(request: &CompletionRequest) -> GraderError {
    GraderError::completion(&request.model, "connection reset")
}

pub fn temp_root() -> PathBuf {
    let root = std::env::temp_dir().join(format!("notegrade-{}", Uuid::new_v4()));
    fs::create_dir_all(&root).expect("create temp root");
    root
}

pub fn write(root: &Path, name: &str, contents: &str) -> PathBuf {
    let path = root.join(name);
    fs::write(&path, contents).expect("write fixture");
    path
}

/// Writes a rubric, answer key and notes file under `root` and returns a
/// config pointing at them, with output going to `results.csv`.
pub fn fixture_config(root: &Path, rubric: &str, key: &str, notes: &str) -> GraderConfig {
    let layer = ConfigLayer {
        rubric: Some(write(root, "rubric.csv", rubric)),
        answer_key: Some(write(root, "key.csv", key)),
        notes: Some(write(root, "notes.csv", notes)),
        output: Some(root.join("results.csv")),
        temperature: Some(0.0),
        ..Default::default()
    };

    let mut config = GraderConfig::default();
    config.apply(layer);
    config.validate().expect("valid config");
    config
}

pub fn with_policy(mut config: GraderConfig, policy: FailurePolicy) -> GraderConfig {
    config.apply(ConfigLayer {
        on_failure: Some(policy),
        ..Default::default()
    });
    config
}

pub const RUBRIC: &str = "hpi,pex,sum,ddx,support,plan,org\n\
                          Onset and duration,Vitals,One line,Three items,Findings,Tests,Flow\n";
pub const KEY: &str = "HPI,PEX,SUM,DDX,SUPPORT,PLAN\n\
                       3 days of cough,Afebrile,Young adult,Pneumonia,Crackles,CXR\n";
