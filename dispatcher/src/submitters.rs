pub mod command;
pub mod dry_run;

use crate::{config::DispatchConfig, job::JobSpec};
use std::{io, path::PathBuf, time::Duration};
use thiserror::Error;

/// Per-job submission errors, none of them stop the dispatch loop
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Submission command {0:?} not found")]
    CommandNotFound(PathBuf),
    #[error("Submission rejected with status {status:?}: {stderr}")]
    SubmissionRejected { status: Option<i32>, stderr: String },
    #[error("Submission timed out after {0:?}")]
    SubmissionTimeout(Duration),
    #[error("Failed to communicate with the submission command: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of an accepted submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    // scheduler job id, if the command reported one
    pub job_id: Option<u64>,
}

impl Submission {
    /// parse the output of sbatch, both the default and the `--parsable` form
    pub fn from_stdout(stdout: &str) -> Self {
        let job_id = stdout.lines().map(str::trim).find_map(|line| {
            let id = match line.strip_prefix("Submitted batch job") {
                Some(rest) => rest.split_whitespace().next(),
                // --parsable prints `<id>` or `<id>;<cluster>`
                None => line.split(';').next(),
            };

            id.and_then(|id| id.parse().ok())
        });

        Self { job_id }
    }
}

pub trait Submitter: Sync {
    /// submit a single job, `index` is only used for reporting
    fn submit(&self, index: usize, spec: &JobSpec) -> Result<Submission, SubmitError>;
}

#[derive(Debug, Clone)]
pub enum Submitters {
    Command(command::CommandSubmitter),
    DryRun(dry_run::DryRunSubmitter),
}

impl Submitters {
    pub fn load(config: &DispatchConfig, dry_run: bool) -> Self {
        if dry_run {
            Self::DryRun(dry_run::DryRunSubmitter::load(&config.submitter))
        } else {
            Self::Command(command::CommandSubmitter::load(&config.submitter))
        }
    }
}

impl Submitter for Submitters {
    fn submit(&self, index: usize, spec: &JobSpec) -> Result<Submission, SubmitError> {
        match self {
            Self::Command(submitter) => submitter.submit(index, spec),
            Self::DryRun(submitter) => submitter.submit(index, spec),
        }
    }
}
