//! Run orchestration: drives N comparisons and aggregates a [`RunSummary`].
//!
//! A run moves `NotStarted -> Running -> Completed`. Configuration and setup
//! faults are raised before `Running`; once running, every sample is
//! compared and recorded, and mismatches never stop the loop.

use crate::adapter::AdapterPair;
use crate::compare::{compare, ComparisonResult, MismatchKind, TolerancePolicy};
use crate::error::{HarnessError, HarnessResult};
use crate::generator::{validate_count, Sample, SampleGenerator};
use crate::report::{Logger, Reporter};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::mpsc;
use std::thread;
use tracing::{debug, info_span};

/// Aggregated results of a run.
///
/// Only [`RunSummary::record`] mutates it, which keeps
/// `total_cases == matched_cases + mismatched_cases.len()`.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct RunSummary {
    total_cases: u64,
    matched_cases: u64,
    mismatched_cases: Vec<ComparisonResult>,
    first_mismatch_index: Option<u64>,
}

impl RunSummary {
    /// Create an empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one comparison into the summary.
    pub fn record(&mut self, result: ComparisonResult) {
        self.total_cases += 1;
        if result.matched() {
            self.matched_cases += 1;
        } else {
            if self.first_mismatch_index.is_none() {
                self.first_mismatch_index = Some(result.input().index());
            }
            self.mismatched_cases.push(result);
        }
    }

    /// Number of comparisons recorded.
    pub fn total_cases(&self) -> u64 {
        self.total_cases
    }

    /// Number of comparisons that matched.
    pub fn matched_cases(&self) -> u64 {
        self.matched_cases
    }

    /// Every unmatched comparison, in sample order.
    pub fn mismatched_cases(&self) -> &[ComparisonResult] {
        &self.mismatched_cases
    }

    /// Sample index of the first mismatch.
    pub fn first_mismatch_index(&self) -> Option<u64> {
        self.first_mismatch_index
    }

    /// Whether no mismatch was recorded.
    pub fn is_clean(&self) -> bool {
        self.mismatched_cases.is_empty()
    }

    /// Mismatches caused by an adapter producing no value.
    pub fn adapter_failures(&self) -> usize {
        self.mismatched_cases
            .iter()
            .filter(|r| {
                matches!(
                    r.mismatch_kind(),
                    Some(MismatchKind::AdapterInvocationFailure { .. })
                )
            })
            .count()
    }

    /// One-line summary.
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{} cases: {} matched, {} mismatched ({} adapter failures)",
            self.total_cases,
            self.matched_cases,
            self.mismatched_cases.len(),
            self.adapter_failures()
        );
        if let Some(first) = self.mismatched_cases.first() {
            line.push_str(&format!(
                "; first divergence at case #{} input={} reference={} target={}",
                first.input().index(),
                first.input().value(),
                first.reference(),
                first.target()
            ));
        }
        line
    }
}

/// Lifecycle of an [`Orchestrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Constructed, nothing executed.
    NotStarted,
    /// Iterating over samples.
    Running,
    /// Every sample was compared and the summary emitted.
    Completed,
}

/// Knobs for a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOptions {
    /// Equality rule applied to every comparison.
    pub tolerance: TolerancePolicy,
    /// Comparison threads. `1` runs sequentially.
    pub workers: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            tolerance: TolerancePolicy::exact(),
            workers: 1,
        }
    }
}

/// Drives one differential run.
#[derive(Debug)]
pub struct Orchestrator {
    options: RunOptions,
    state: RunState,
}

impl Orchestrator {
    /// Create an orchestrator in [`RunState::NotStarted`].
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            state: RunState::NotStarted,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Options this orchestrator runs with.
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Compare `sample_count` generated samples and return the summary.
    ///
    /// Fails before any iteration with [`HarnessError::InvalidConfiguration`]
    /// for a non-positive count, bad tolerance or zero workers; generator
    /// errors propagate unchanged. Exactly `sample_count` samples are drawn
    /// before the run starts: extra samples are never pulled, and a generator
    /// that runs dry is a [`HarnessError::SetupFailure`]. An orchestrator
    /// runs at most once.
    pub fn run(
        &mut self,
        sample_count: i64,
        logger: &dyn Logger,
        adapters: &AdapterPair,
        generator: &dyn SampleGenerator,
    ) -> HarnessResult<RunSummary> {
        if self.state != RunState::NotStarted {
            return Err(HarnessError::invalid(format!(
                "orchestrator already used (state {:?})",
                self.state
            )));
        }
        let count = validate_count(sample_count)?;
        self.options.tolerance.validate()?;
        if self.options.workers == 0 {
            return Err(HarnessError::invalid("workers must be at least 1"));
        }
        let limit = usize::try_from(count).map_err(|_| {
            HarnessError::invalid(format!("sample count {} is too large for this platform", count))
        })?;
        let samples: Vec<Sample> = generator.generate(sample_count)?.take(limit).collect();
        if samples.len() != limit {
            return Err(HarnessError::setup(format!(
                "generator yielded {} of {} samples",
                samples.len(),
                count
            )));
        }

        let reporter = Reporter::new(generator.seed());
        let span = info_span!("run", count, workers = self.options.workers);
        let _guard = span.enter();

        reporter.header(logger, count, adapters, &self.options.tolerance);
        self.state = RunState::Running;
        debug!("run started");

        let summary = if self.options.workers > 1 {
            self.run_parallel(samples, count, logger, adapters, &reporter)
        } else {
            self.run_sequential(samples, count, logger, adapters, &reporter)
        };

        self.state = RunState::Completed;
        debug!(
            matched = summary.matched_cases(),
            mismatched = summary.mismatched_cases().len(),
            "run completed"
        );
        reporter.summary(logger, &summary);
        Ok(summary)
    }

    fn run_sequential(
        &self,
        samples: Vec<Sample>,
        count: u64,
        logger: &dyn Logger,
        adapters: &AdapterPair,
        reporter: &Reporter,
    ) -> RunSummary {
        let mut summary = RunSummary::new();
        for sample in samples {
            let result = compare(
                sample,
                adapters.reference.as_ref(),
                adapters.target.as_ref(),
                &self.options.tolerance,
            );
            reporter.case(logger, &result, count);
            summary.record(result);
        }
        summary
    }

    // Workers only compare; the calling thread is the single collector and
    // records results in sample order, so the summary and log match a
    // sequential run.
    fn run_parallel(
        &self,
        samples: Vec<Sample>,
        count: u64,
        logger: &dyn Logger,
        adapters: &AdapterPair,
        reporter: &Reporter,
    ) -> RunSummary {
        let workers = self.options.workers;
        let mut queues: Vec<Vec<Sample>> = (0..workers).map(|_| Vec::new()).collect();
        for (i, sample) in samples.into_iter().enumerate() {
            queues[i % workers].push(sample);
        }

        let policy = self.options.tolerance;
        let (tx, rx) = mpsc::channel::<ComparisonResult>();
        let mut summary = RunSummary::new();

        thread::scope(|scope| {
            for queue in queues.into_iter().filter(|q| !q.is_empty()) {
                let tx = tx.clone();
                scope.spawn(move || {
                    for sample in queue {
                        let result = compare(
                            sample,
                            adapters.reference.as_ref(),
                            adapters.target.as_ref(),
                            &policy,
                        );
                        if tx.send(result).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            let mut pending: BTreeMap<u64, ComparisonResult> = BTreeMap::new();
            let mut next = 0u64;
            for result in rx {
                pending.insert(result.input().index(), result);
                while let Some(ready) = pending.remove(&next) {
                    reporter.case(logger, &ready, count);
                    summary.record(ready);
                    next += 1;
                }
            }
            // Indices that were not contiguous from zero.
            for (_, result) in std::mem::take(&mut pending) {
                reporter.case(logger, &result, count);
                summary.record(result);
            }
        });

        summary
    }
}

/// Run with default options: exact comparison, one worker.
pub fn run(
    sample_count: i64,
    logger: &dyn Logger,
    adapters: &AdapterPair,
    generator: &dyn SampleGenerator,
) -> HarnessResult<RunSummary> {
    Orchestrator::new(RunOptions::default()).run(sample_count, logger, adapters, generator)
}
