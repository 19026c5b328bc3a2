//! Run reporting.
//!
//! The [`Logger`] seam replaces process-wide logging: the orchestrator and
//! [`Reporter`] write through whatever logger they are handed. The
//! production logger forwards to `tracing`; [`MemoryLogger`] captures lines
//! for inspection.
//!
//! The reporter holds no counters. Rendering the same [`RunSummary`] twice
//! yields the same lines.

use crate::adapter::AdapterPair;
use crate::compare::{ComparisonResult, MismatchKind, TolerancePolicy};
use crate::error::HarnessResult;
use crate::orchestrator::RunSummary;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Minimal logging contract used by the harness.
pub trait Logger {
    /// Informational line.
    fn info(&self, message: &str);
    /// Error line.
    fn error(&self, message: &str);
}

/// Logger that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }
}

/// Severity of a captured line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// From [`Logger::info`].
    Info,
    /// From [`Logger::error`].
    Error,
}

/// Logger that keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl MemoryLogger {
    /// Create an empty logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captured lines.
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().clone()
    }

    /// Remove and return all captured lines.
    pub fn take(&self) -> Vec<(LogLevel, String)> {
        std::mem::take(&mut *self.lines.lock())
    }

    /// Captured lines at `level`.
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Logger for MemoryLogger {
    fn info(&self, message: &str) {
        self.lines.lock().push((LogLevel::Info, message.to_string()));
    }

    fn error(&self, message: &str) {
        self.lines.lock().push((LogLevel::Error, message.to_string()));
    }
}

/// Renders run diagnostics through a [`Logger`].
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    seed: Option<u64>,
}

impl Reporter {
    /// Create a reporter. `seed` is echoed in reproduction hints.
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }

    /// Seed echoed in reports.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Line emitted before the first iteration.
    pub fn header(
        &self,
        logger: &dyn Logger,
        count: u64,
        adapters: &AdapterPair,
        policy: &TolerancePolicy,
    ) {
        let seed = match self.seed {
            Some(seed) => seed.to_string(),
            None => "unseeded".to_string(),
        };
        logger.info(&format!(
            "comparing {} vs {} over {} cases (seed: {}, tolerance: {})",
            adapters.reference.name(),
            adapters.target.name(),
            count,
            seed,
            policy.describe()
        ));
    }

    /// One line per iteration.
    pub fn case(&self, logger: &dyn Logger, result: &ComparisonResult, total: u64) {
        let input = result.input();
        let position = format!("[{}/{}]", input.index() + 1, total);
        if result.matched() {
            logger.info(&format!(
                "{} input={} reference={} target={} match",
                position,
                input.value(),
                result.reference(),
                result.target()
            ));
        } else {
            let divergence = result
                .divergence()
                .map(|d| format!(" divergence={}", d))
                .unwrap_or_default();
            logger.error(&format!(
                "{} input={} reference={} target={} MISMATCH{}",
                position,
                input.value(),
                result.reference(),
                result.target(),
                divergence
            ));
        }
    }

    /// Summary line, followed by a detail block per mismatch.
    pub fn summary(&self, logger: &dyn Logger, summary: &RunSummary) {
        if summary.is_clean() {
            logger.info(&summary.summary_line());
            return;
        }

        logger.error(&summary.summary_line());
        for result in summary.mismatched_cases() {
            logger.error(&self.mismatch_report(result));
        }
    }

    /// Human-readable reproduction block for one mismatch.
    pub fn mismatch_report(&self, result: &ComparisonResult) -> String {
        let kind = match result.mismatch_kind() {
            Some(MismatchKind::AdapterInvocationFailure { side }) => {
                format!("adapter invocation failure ({})", side)
            }
            Some(MismatchKind::ComparisonMismatch) => "outputs differ beyond tolerance".to_string(),
            None => "matched".to_string(),
        };
        let divergence = result
            .divergence()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        let reproduce = match self.seed {
            Some(seed) => format!("rerun with --seed {} (case #{})", seed, result.input().index()),
            None => format!("replay with --value {}", result.input().value()),
        };

        format!(
            "=== Divergence at case #{} ===\nKind: {}\nInput: {}\nReference: {}\nTarget: {}\nDivergence: {}\nReproduce: {}",
            result.input().index(),
            kind,
            result.input().value(),
            result.reference(),
            result.target(),
            divergence,
            reproduce
        )
    }
}

/// Machine-readable run report.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    /// Seed the run was generated from.
    pub seed: Option<u64>,
    /// Tolerance policy, as described in the run header.
    pub tolerance: String,
    /// Reference adapter name.
    pub reference: &'a str,
    /// Target adapter name.
    pub target: &'a str,
    /// Full summary including every mismatch.
    pub summary: &'a RunSummary,
}

impl<'a> RunReport<'a> {
    /// Collect a report.
    pub fn new(
        seed: Option<u64>,
        policy: &TolerancePolicy,
        adapters: &'a AdapterPair,
        summary: &'a RunSummary,
    ) -> Self {
        Self {
            seed,
            tolerance: policy.describe(),
            reference: adapters.reference.name(),
            target: adapters.target.name(),
            summary,
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the JSON report to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> HarnessResult<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ConversionFailure, ConversionOutcome};
    use crate::generator::Sample;

    fn mismatch(index: u64) -> ComparisonResult {
        ComparisonResult::judge(
            Sample::new(index, 10.0),
            ConversionOutcome::Converted(10.0),
            ConversionOutcome::Converted(11.0),
            &TolerancePolicy::exact(),
        )
    }

    fn failure(index: u64) -> ComparisonResult {
        ComparisonResult::judge(
            Sample::new(index, 10.0),
            ConversionOutcome::Converted(10.0),
            ConversionOutcome::Failed(ConversionFailure::TimedOut {
                engine: "target".to_string(),
                timeout_ms: 50,
            }),
            &TolerancePolicy::exact(),
        )
    }

    fn summary_with_mismatches() -> RunSummary {
        let mut summary = RunSummary::new();
        summary.record(ComparisonResult::judge(
            Sample::new(0, 1.0),
            ConversionOutcome::Converted(1.0),
            ConversionOutcome::Converted(1.0),
            &TolerancePolicy::exact(),
        ));
        summary.record(mismatch(1));
        summary.record(failure(2));
        summary
    }

    #[test]
    fn test_memory_logger_levels() {
        let logger = MemoryLogger::new();
        logger.info("a");
        logger.error("b");
        assert_eq!(logger.messages(LogLevel::Info), vec!["a".to_string()]);
        assert_eq!(logger.messages(LogLevel::Error), vec!["b".to_string()]);
        assert_eq!(logger.take().len(), 2);
        assert!(logger.lines().is_empty());
    }

    #[test]
    fn test_case_lines() {
        let reporter = Reporter::new(Some(7));
        let logger = MemoryLogger::new();
        reporter.case(&logger, &mismatch(0), 5);
        let errors = logger.messages(LogLevel::Error);
        assert_eq!(
            errors,
            vec!["[1/5] input=10 reference=10 target=11 MISMATCH divergence=1".to_string()]
        );
    }

    #[test]
    fn test_summary_rendering_is_idempotent() {
        let reporter = Reporter::new(Some(42));
        let summary = summary_with_mismatches();

        let first = MemoryLogger::new();
        reporter.summary(&first, &summary);
        let second = MemoryLogger::new();
        reporter.summary(&second, &summary);

        assert_eq!(first.lines(), second.lines());
        assert_eq!(first.lines().len(), 3);
    }

    #[test]
    fn test_mismatch_report_contents() {
        let seeded = Reporter::new(Some(42));
        let report = seeded.mismatch_report(&failure(2));
        assert!(report.contains("case #2"));
        assert!(report.contains("adapter invocation failure (target)"));
        assert!(report.contains("target timed out after 50 ms"));
        assert!(report.contains("Divergence: n/a"));
        assert!(report.contains("--seed 42"));

        let unseeded = Reporter::new(None);
        let report = unseeded.mismatch_report(&mismatch(1));
        assert!(report.contains("outputs differ beyond tolerance"));
        assert!(report.contains("Divergence: 1"));
        assert!(report.contains("--value 10"));
    }

    #[test]
    fn test_clean_summary_logs_info_only() {
        let mut summary = RunSummary::new();
        summary.record(ComparisonResult::judge(
            Sample::new(0, 1.0),
            ConversionOutcome::Converted(2.0),
            ConversionOutcome::Converted(2.0),
            &TolerancePolicy::exact(),
        ));
        let logger = MemoryLogger::new();
        Reporter::default().summary(&logger, &summary);
        assert!(logger.messages(LogLevel::Error).is_empty());
        assert_eq!(logger.messages(LogLevel::Info).len(), 1);
    }

    #[test]
    fn test_run_report_json() {
        use crate::adapter::{infallible, AdapterPair};

        let adapters = AdapterPair::mirrored(infallible("identity", |x| x));
        let summary = summary_with_mismatches();
        let report = RunReport::new(Some(9), &TolerancePolicy::exact(), &adapters, &summary);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(json["seed"], 9);
        assert_eq!(json["reference"], "identity");
        assert_eq!(json["summary"]["total_cases"], 3);
        assert_eq!(json["summary"]["matched_cases"], 1);
        assert_eq!(json["summary"]["first_mismatch_index"], 1);
        assert_eq!(
            json["summary"]["mismatched_cases"][1]["target"]["failed"]["cause"],
            "timed_out"
        );
    }
}
