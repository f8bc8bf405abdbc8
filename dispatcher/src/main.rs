mod config;
mod dispatcher;
mod job;
mod submitters;

use clap::Parser;
use config::{ConfigErrors, DispatchConfig};
use dispatcher::Dispatcher;
use job::DispatchPlan;
use std::{path::PathBuf, process::ExitCode};
use submitters::Submitters;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Submit the same GDICE worker job to the cluster scheduler a number of times
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML file with dispatch settings, flags below take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Worker script handed to the submission command
    #[arg(long)]
    worker: Option<PathBuf>,
    /// Base directory the workers save results to
    #[arg(long)]
    save_path: Option<PathBuf>,
    #[arg(long)]
    env_type: Option<String>,
    /// Restrict the workers to a single environment
    #[arg(long)]
    env_name: Option<String>,
    /// List of run/environment/parameter sets the workers claim from
    #[arg(long)]
    set_list: Option<PathBuf>,
    /// 1 makes the workers redo unfinished sets
    #[arg(long)]
    unfinished: Option<u32>,
    /// Number of jobs to submit
    #[arg(short = 'n', long)]
    jobs: Option<usize>,
    /// Submission command, e.g., sbatch
    #[arg(long)]
    submitter: Option<PathBuf>,
    /// Extra parameter for the submission command, can be repeated
    #[arg(long = "submitter-param", allow_hyphen_values = true)]
    submitter_params: Vec<String>,
    /// Timeout per submission in milliseconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Concurrent submissions, 0 uses all cores
    #[arg(short, long)]
    threads: Option<usize>,
    /// Log the submission commands instead of running them
    #[arg(long)]
    dry_run: bool,
    /// Increase log verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// layer defaults, the config file and command line flags
    fn load_config(&self) -> Result<DispatchConfig, ConfigErrors> {
        let mut config = match self.config {
            Some(ref path) => DispatchConfig::load(path)?,
            None => DispatchConfig::default(),
        };

        if let Some(ref worker) = self.worker {
            config.worker = worker.clone();
        }
        if let Some(ref save_path) = self.save_path {
            config.save_path = save_path.clone();
        }
        if let Some(ref env_type) = self.env_type {
            config.env_type = env_type.clone();
        }
        if let Some(ref env_name) = self.env_name {
            config.env_name = Some(env_name.clone());
        }
        if let Some(ref set_list) = self.set_list {
            config.set_list = set_list.clone();
        }
        if let Some(unfinished) = self.unfinished {
            config.unfinished = unfinished;
        }
        if let Some(jobs) = self.jobs {
            config.job_count = jobs;
        }
        if let Some(ref submitter) = self.submitter {
            config.submitter.exec = submitter.clone();
        }
        if !self.submitter_params.is_empty() {
            config.submitter.params = self.submitter_params.clone();
        }
        if let Some(timeout) = self.timeout {
            config.submitter.timeout = timeout;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }

        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    ExitCode::from(dispatch(&cli))
}

/// exit status used when nothing was submitted because of the configuration
const INVALID_CONFIG: u8 = 2;

/// load and check the config, submit every job and return the exit status
fn dispatch(cli: &Cli) -> u8 {
    let mut config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config: {e}");
            return INVALID_CONFIG;
        }
    };

    if config.preflight_checks() {
        error!("Configuration contains errors, no jobs were submitted");
        return INVALID_CONFIG;
    }

    if cli.dry_run {
        info!("Dry run, nothing will be submitted");
    }

    let submitter = Submitters::load(&config, cli.dry_run);
    let result = Dispatcher::load(&config).run(DispatchPlan::from_config(&config), &submitter);
    result.report();

    result.exit_status()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn no_arguments_reproduce_the_batch_script() {
        let cli = Cli::parse_from(["gdice-dispatcher"]);

        assert_eq!(cli.load_config().unwrap(), DispatchConfig::default());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatch.yaml");
        fs::write(&path, "job_count: 10\nenv_type: DPOMDP\nthreads: 2\n").unwrap();

        let cli = Cli::parse_from([
            "gdice-dispatcher",
            "--config",
            path.to_str().unwrap(),
            "-n",
            "3",
            "--submitter-param",
            "--partition=short",
            "--submitter-param",
            "--parsable",
            "--timeout",
            "500",
        ]);
        let config = cli.load_config().unwrap();

        assert_eq!(config.job_count, 3);
        assert_eq!(config.env_type, "DPOMDP");
        assert_eq!(config.threads, 2);
        assert_eq!(config.submitter.params, ["--partition=short", "--parsable"]);
        assert_eq!(config.submitter.timeout, 500);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let cli = Cli::parse_from(["gdice-dispatcher", "--config", "/nonexistent/dispatch.yaml"]);

        assert!(matches!(
            cli.load_config(),
            Err(ConfigErrors::ReadConfig(..))
        ));
    }

    #[test]
    fn exit_status_follows_the_outcome() {
        // every job logged, nothing spawned
        let cli = Cli::parse_from(["gdice-dispatcher", "--dry-run", "-n", "3"]);
        assert_eq!(dispatch(&cli), 0);

        // the submission command runs but rejects every job
        let cli = Cli::parse_from(["gdice-dispatcher", "-n", "2", "--submitter", "/bin/false"]);
        assert_eq!(dispatch(&cli), 1);

        let cli = Cli::parse_from(["gdice-dispatcher", "--timeout", "0"]);
        assert_eq!(dispatch(&cli), INVALID_CONFIG);

        let cli = Cli::parse_from(["gdice-dispatcher", "--config", "/nonexistent/dispatch.yaml"]);
        assert_eq!(dispatch(&cli), INVALID_CONFIG);
    }
}
