use crate::config::DispatchConfig;
use itertools::Itertools;
use std::fmt;

/// Fixed argument vector handed to the submission command for every job.
///
/// The first argument is always the worker script, so a `JobSpec` is never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSpec {
    args: Vec<String>,
}

impl JobSpec {
    /// build the worker invocation from the config
    pub fn from_config(config: &DispatchConfig) -> Self {
        let mut args = vec![
            config.worker.to_string_lossy().into_owned(),
            String::from("--save_path"),
            config.save_path.to_string_lossy().into_owned(),
            String::from("--env_type"),
            config.env_type.clone(),
        ];

        if let Some(ref name) = config.env_name {
            args.push(String::from("--env_name"));
            args.push(name.clone());
        }

        args.extend([
            String::from("--set_list"),
            config.set_list.to_string_lossy().into_owned(),
            String::from("--unfinished"),
            config.unfinished.to_string(),
        ]);

        Self { args }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[cfg(test)]
impl JobSpec {
    /// wrap a raw argument vector, `None` if it is empty
    pub fn from_args<I, S>(args: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args = args.into_iter().map(Into::into).collect_vec();

        if args.is_empty() {
            None
        } else {
            Some(Self { args })
        }
    }
}

impl fmt::Display for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args.iter().join(" "))
    }
}

/// How many times the same job gets submitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchPlan {
    pub count: usize,
    pub spec: JobSpec,
}

impl DispatchPlan {
    pub fn new(count: usize, spec: JobSpec) -> Self {
        Self { count, spec }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.job_count, JobSpec::from_config(config))
    }
}
