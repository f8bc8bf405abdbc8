use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, error, warn};

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(#[from] Error),
    #[error("Failed to read config file {0:?}: {1}")]
    ReadConfig(PathBuf, Error),
    #[error("Config file is not valid YAML: {0}")]
    InvalidConfig(#[from] serde_yaml::Error),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct DispatchConfig {
    // worker script handed to the submission command as its first argument
    pub worker: PathBuf,
    // base directory the workers save their results to
    pub save_path: PathBuf,
    pub env_type: String,
    // only forwarded when set, workers fall back to every environment otherwise
    pub env_name: Option<String>,
    // list of run/env/param sets the workers claim from
    pub set_list: PathBuf,
    // 1 makes the workers clean out and redo unfinished sets
    pub unfinished: u32,
    #[serde(alias = "jobs")]
    pub job_count: usize,
    // number of submissions in flight, 0 uses all cores
    pub threads: usize,
    pub submitter: SubmitterConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct SubmitterConfig {
    // executable performing the submission, resolved via PATH if not a path
    pub exec: PathBuf,
    // parameters placed between the executable and the job arguments
    pub params: Vec<String>,
    // per-call timeout in milliseconds
    pub timeout: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker: PathBuf::from("newInner.sh"),
            save_path: PathBuf::from("/scratch/slayback.d/GDICE"),
            env_type: String::from("POMDP"),
            env_name: None,
            set_list: PathBuf::from("POMDPsToEval.txt"),
            unfinished: 1,
            job_count: 100,
            threads: 1,
            submitter: SubmitterConfig::default(),
        }
    }
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            exec: PathBuf::from("sbatch"),
            params: Vec::new(),
            timeout: 60_000,
        }
    }
}

impl SubmitterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

impl DispatchConfig {
    /// load a config file, fields missing from the file keep their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigErrors::ReadConfig(path.to_path_buf(), e))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigErrors> {
        // an empty document is valid and means "all defaults"
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        Ok(serde_yaml::from_str(content)?)
    }

    /// resolve the number of concurrent submissions
    pub fn thread_count(&self) -> usize {
        if self.threads == 0 {
            let cores = num_cpus::get();
            debug!("threads set to 0, falling back to {cores} threads");

            cores
        } else {
            self.threads
        }
    }

    /// returns true if the config contains at least one error
    pub fn preflight_checks(&mut self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        self.env_type = self.env_type.trim().to_owned();
        if self.env_type.is_empty() {
            error!("env_type must not be empty");
            contains_error = true;
        }

        if let Some(ref name) = self.env_name {
            if name.trim().is_empty() {
                warn!("env_name is set but empty, it will not be forwarded");
                self.env_name = None;
            }
        }

        if self.set_list.as_os_str().is_empty() {
            error!("set_list must point to the list of sets the workers claim from");
            contains_error = true;
        }

        if self.save_path.as_os_str().is_empty() {
            error!("save_path must not be empty");
            contains_error = true;
        }

        if self.unfinished > 1 {
            warn!(
                "unfinished is {}, workers only treat 1 as a request to redo unfinished sets",
                self.unfinished
            );
        }

        if self.job_count == 0 {
            warn!("job_count is 0, nothing will be submitted");
        }

        if self.worker.as_os_str().is_empty() {
            error!("worker must name the script to submit");
            contains_error = true;
        } else if !self.worker.is_file() {
            // the scheduler resolves the script, it may only exist on the submission host
            warn!(
                "Worker script {} was not found locally",
                self.worker.to_string_lossy()
            );
        }

        if self.submitter.exec.as_os_str().is_empty() {
            error!("submitter.exec must not be empty");
            contains_error = true;
        } else if self.submitter.exec.components().count() > 1 {
            // only explicit paths can be checked up front, bare names are looked up in PATH
            match check_executable(&self.submitter.exec) {
                Ok(true) => {}
                Ok(false) => {
                    error!(
                        "Submitter {} is not executable",
                        self.submitter.exec.to_string_lossy()
                    );
                    contains_error = true;
                }
                Err(e) => {
                    error!(
                        "Failed to determine if submitter.exec ({}) is an executable: {e}",
                        self.submitter.exec.to_string_lossy()
                    );
                    contains_error = true;
                }
            }
        }

        if self.submitter.timeout == 0 {
            error!("submitter.timeout cannot be 0, every submission would time out");
            contains_error = true;
        }

        contains_error
    }
}
