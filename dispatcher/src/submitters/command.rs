use super::{SubmitError, Submission, Submitter};
use crate::{config::SubmitterConfig, job::JobSpec};
use std::{
    io::{self, ErrorKind, Read},
    path::PathBuf,
    process::{Child, Command, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, trace, warn};
use wait_timeout::ChildExt;

/// Submits jobs by spawning the configured command, e.g., sbatch
#[derive(Debug, Clone)]
pub struct CommandSubmitter {
    pub exec: PathBuf,
    pub params: Vec<String>,
    pub timeout: Duration,
}

impl CommandSubmitter {
    pub fn load(config: &SubmitterConfig) -> Self {
        Self {
            exec: config.exec.clone(),
            params: config.params.clone(),
            timeout: config.timeout(),
        }
    }
}

impl Submitter for CommandSubmitter {
    #[tracing::instrument(level = "debug", skip(self, spec))]
    fn submit(&self, index: usize, spec: &JobSpec) -> Result<Submission, SubmitError> {
        let start = Instant::now();

        let mut child = match Command::new(&self.exec)
            .args(self.params.iter())
            .args(spec.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SubmitError::CommandNotFound(self.exec.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        // drain both pipes while waiting, a chatty command would block on a full pipe otherwise
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        debug!("Submission waiting on {}", child.id());
        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                // child hasn't exited yet, the readers are left to finish on their own
                stop(&mut child);

                return Err(SubmitError::SubmissionTimeout(self.timeout));
            }
            Err(e) => {
                stop(&mut child);

                return Err(e.into());
            }
        };

        let stdout = collect(stdout)?;
        let stderr = collect(stderr)?;

        debug!(
            "Finished in {} ms | status: {}",
            start.elapsed().as_millis(),
            status
        );
        trace!("Output: {stdout}");

        if status.success() {
            Ok(Submission::from_stdout(&stdout))
        } else {
            Err(SubmitError::SubmissionRejected {
                status: status.code(),
                stderr: stderr.trim().to_owned(),
            })
        }
    }
}

/// read a child pipe to the end on its own thread
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buffer)?;
        }

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    })
}

fn collect(reader: JoinHandle<io::Result<String>>) -> io::Result<String> {
    reader
        .join()
        .unwrap_or_else(|_| Err(io::Error::new(ErrorKind::Other, "pipe reader panicked")))
}

/// kill and reap a child that is abandoned
fn stop(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("Failed to kill submission command {}: {e}", child.id());
    }

    if let Err(e) = child.wait() {
        warn!("Failed to reap submission command {}: {e}", child.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    // run through /bin/sh so the scripts never have to be executable
    fn shell(script: &str, extra: &[&str], timeout: Duration) -> CommandSubmitter {
        let mut params = vec![String::from("-c"), script.to_owned()];
        params.extend(extra.iter().map(|param| param.to_string()));

        CommandSubmitter {
            exec: PathBuf::from("/bin/sh"),
            params,
            timeout,
        }
    }

    fn spec() -> JobSpec {
        JobSpec::from_args(["newInner.sh", "--unfinished", "1"]).unwrap()
    }

    #[test]
    fn accepted_submission_reports_job_id() {
        let submitter = shell(
            "echo \"Submitted batch job 4242\"",
            &["sbatch"],
            Duration::from_secs(10),
        );

        assert_eq!(
            submitter.submit(0, &spec()).unwrap(),
            Submission { job_id: Some(4242) }
        );
    }

    #[test]
    fn arguments_are_passed_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("args.log");
        // $0 is the log file, the job arguments follow as $1..
        let submitter = shell(
            "printf '%s\\n' \"$@\" >> \"$0\"",
            &[log.to_str().unwrap()],
            Duration::from_secs(10),
        );

        submitter.submit(0, &spec()).unwrap();
        submitter.submit(1, &spec()).unwrap();

        assert_eq!(
            fs::read_to_string(&log).unwrap(),
            "newInner.sh\n--unfinished\n1\nnewInner.sh\n--unfinished\n1\n"
        );
    }

    #[test]
    fn non_zero_exit_is_rejected() {
        let submitter = shell(
            "echo 'sbatch: error: invalid partition specified' >&2; exit 1",
            &["sbatch"],
            Duration::from_secs(10),
        );

        match submitter.submit(0, &spec()) {
            Err(SubmitError::SubmissionRejected { status, stderr }) => {
                assert_eq!(status, Some(1));
                assert_eq!(stderr, "sbatch: error: invalid partition specified");
            }
            other => panic!("expected a rejection, got {other:?}"),
        }
    }

    #[test]
    fn large_stderr_is_still_rejected() {
        let submitter = shell(
            "head -c 200000 /dev/zero | tr '\\0' x >&2; exit 1",
            &["sbatch"],
            Duration::from_secs(10),
        );

        match submitter.submit(0, &spec()) {
            Err(SubmitError::SubmissionRejected { status, stderr }) => {
                assert_eq!(status, Some(1));
                assert_eq!(stderr.len(), 200000);
            }
            other => panic!("expected a rejection, got {other:?}"),
        }
    }

    #[test]
    fn large_stdout_is_still_accepted() {
        let submitter = shell(
            "head -c 200000 /dev/zero | tr '\\0' x; echo; echo 'Submitted batch job 77'",
            &["sbatch"],
            Duration::from_secs(10),
        );

        assert_eq!(
            submitter.submit(0, &spec()).unwrap(),
            Submission { job_id: Some(77) }
        );
    }

    #[test]
    fn stopped_child_is_reaped() {
        let mut child = Command::new("sleep").arg("10").spawn().unwrap();

        stop(&mut child);

        assert!(child.try_wait().unwrap().is_some());
    }

    #[test]
    fn missing_command_is_reported() {
        let submitter = CommandSubmitter {
            exec: PathBuf::from("/nonexistent/bin/sbatch"),
            params: Vec::new(),
            timeout: Duration::from_secs(1),
        };

        assert!(matches!(
            submitter.submit(0, &spec()),
            Err(SubmitError::CommandNotFound(path)) if path == PathBuf::from("/nonexistent/bin/sbatch")
        ));
    }

    #[test]
    fn hanging_command_times_out() {
        let submitter = shell("exec sleep 10", &["sbatch"], Duration::from_millis(100));
        let start = Instant::now();

        assert!(matches!(
            submitter.submit(0, &spec()),
            Err(SubmitError::SubmissionTimeout(timeout)) if timeout == Duration::from_millis(100)
        ));
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
