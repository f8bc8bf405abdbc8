use super::{SubmitError, Submission, Submitter};
use crate::{config::SubmitterConfig, job::JobSpec};
use itertools::Itertools;
use std::path::PathBuf;
use tracing::info;

/// Logs the command line instead of running it
#[derive(Debug, Clone)]
pub struct DryRunSubmitter {
    pub exec: PathBuf,
    pub params: Vec<String>,
}

impl DryRunSubmitter {
    pub fn load(config: &SubmitterConfig) -> Self {
        Self {
            exec: config.exec.clone(),
            params: config.params.clone(),
        }
    }

    pub fn command_line(&self, spec: &JobSpec) -> String {
        std::iter::once(self.exec.to_string_lossy().into_owned())
            .chain(self.params.iter().cloned())
            .chain(spec.args().iter().cloned())
            .join(" ")
    }
}

impl Submitter for DryRunSubmitter {
    fn submit(&self, index: usize, spec: &JobSpec) -> Result<Submission, SubmitError> {
        info!(index, "Would run: {}", self.command_line(spec));

        Ok(Submission::default())
    }
}
