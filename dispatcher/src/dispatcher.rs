use crate::{
    config::DispatchConfig,
    job::DispatchPlan,
    submitters::{SubmitError, Submission, Submitter},
};
use itertools::Itertools;
use parking_lot::FairMutex;
use rayon::{prelude::*, ThreadPoolBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info, instrument, warn};


/// Outcome of a whole dispatch, both lists are ordered by job index
#[derive(Debug, Default)]
pub struct DispatchResult {
    pub successes: usize,
    pub submitted: Vec<(usize, Submission)>,
    pub failures: Vec<(usize, SubmitError)>,
}

impl DispatchResult {
    fn from_outcomes(outcomes: Vec<(usize, Result<Submission, SubmitError>)>) -> Self {
        outcomes
            .into_iter()
            .sorted_by_key(|(index, _)| *index)
            .fold(Self::default(), |mut result, (index, outcome)| {
                match outcome {
                    Ok(submission) => {
                        result.successes += 1;
                        result.submitted.push((index, submission));
                    }
                    Err(error) => result.failures.push((index, error)),
                }

                result
            })
    }

    pub fn total(&self) -> usize {
        self.successes + self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// 0 if every job was submitted, 1 otherwise
    pub fn exit_status(&self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// log a summary of the dispatch
    pub fn report(&self) {
        for (index, error) in self.failures.iter() {
            error!(index, "Submission failed: {error}");
        }

        let job_ids = self
            .submitted
            .iter()
            .filter_map(|(_, submission)| submission.job_id)
            .join(", ");
        if !job_ids.is_empty() {
            debug!("Scheduler job ids: {job_ids}");
        }

        if self.is_success() {
            info!("Submitted {}/{} jobs", self.successes, self.total());
        } else {
            warn!(
                "Submitted {}/{} jobs, {} failed",
                self.successes,
                self.total(),
                self.failures.len()
            );
        }
    }
}

/// How the dispatch loop is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatcher {
    Sequential,
    Pool { threads: usize },
}

impl Dispatcher {
    pub fn load(config: &DispatchConfig) -> Self {
        match config.thread_count() {
            0 | 1 => Self::Sequential,
            threads => Self::Pool { threads },
        }
    }

    /// submit `plan.count` copies of the plan's job, never stopping on a failed submission
    #[instrument(skip_all, level = "info", fields(jobs = plan.count, mode = ?self))]
    pub fn run<S: Submitter + ?Sized>(&self, plan: DispatchPlan, submitter: &S) -> DispatchResult {
        info!("Submitting {} jobs: {}", plan.count, plan.spec);
        let processed = AtomicUsize::new(0);

        match *self {
            Self::Sequential => Self::run_sequential(&plan, submitter, &processed),
            Self::Pool { threads } => match ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => {
                    debug!("Started thread pool with {threads} threads");
                    let outcomes = FairMutex::new(Vec::with_capacity(plan.count));

                    pool.install(|| {
                        (0..plan.count).into_par_iter().for_each(|index| {
                            let outcome = Self::submit_one(index, &plan, submitter, &processed);
                            outcomes.lock().push((index, outcome));
                        })
                    });

                    DispatchResult::from_outcomes(outcomes.into_inner())
                }
                Err(e) => {
                    warn!("Failed to start thread pool, submitting sequentially: {e}");

                    Self::run_sequential(&plan, submitter, &processed)
                }
            },
        }
    }

    fn run_sequential<S: Submitter + ?Sized>(
        plan: &DispatchPlan,
        submitter: &S,
        processed: &AtomicUsize,
    ) -> DispatchResult {
        DispatchResult::from_outcomes(
            (0..plan.count)
                .map(|index| (index, Self::submit_one(index, plan, submitter, processed)))
                .collect(),
        )
    }

    fn submit_one<S: Submitter + ?Sized>(
        index: usize,
        plan: &DispatchPlan,
        submitter: &S,
        processed: &AtomicUsize,
    ) -> Result<Submission, SubmitError> {
        let outcome = submitter.submit(index, &plan.spec);

        match outcome {
            Ok(Submission {
                job_id: Some(job_id),
            }) => debug!(index, job_id, "Submitted"),
            Ok(_) => debug!(index, "Submitted"),
            Err(ref e) => warn!(index, "Failed with {e}"),
        }
        info!(
            "Done with {}/{}",
            processed.fetch_add(1, Ordering::SeqCst) + 1,
            plan.count
        );

        outcome
    }
}
