//! Conversion adapters: one contract over heterogeneous N2R engines.
//!
//! A [`ConversionEngine`] is the raw, fallible routine. An [`EngineAdapter`]
//! wraps it so that every failure path (returned fault, panic, timeout)
//! becomes a [`ConversionOutcome::Failed`] instead of escaping into the run.

mod curve;
mod process;

pub use curve::{CurveParams, FixedPointEngine, ModelEngine};
pub use process::ProcessEngine;

use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::generator::Sample;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Fault raised by a conversion engine for a single input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineFault {
    /// The routine rejected the computation (overflow, underflow, revert).
    #[error("reverted: {0}")]
    Reverted(String),
    /// The input cannot be expressed in the engine's number format.
    #[error("{0}")]
    Unrepresentable(String),
    /// The engine could not be invoked or returned garbage.
    #[error("invocation failed: {0}")]
    Invocation(String),
    /// The engine gave up on the call after its budget expired.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Why an adapter produced no output for a sample.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum ConversionFailure {
    /// The engine returned a fault.
    #[error("{engine} faulted: {message}")]
    Fault {
        /// Adapter name.
        engine: String,
        /// Fault description.
        message: String,
    },
    /// The engine cannot represent the input value.
    #[error("{engine} cannot represent input: {message}")]
    Unrepresentable {
        /// Adapter name.
        engine: String,
        /// Why the value is out of domain.
        message: String,
    },
    /// The call exceeded its per-call budget.
    #[error("{engine} timed out after {timeout_ms} ms")]
    TimedOut {
        /// Adapter name.
        engine: String,
        /// Budget that was exceeded.
        timeout_ms: u64,
    },
    /// The engine panicked.
    #[error("{engine} panicked: {message}")]
    Panicked {
        /// Adapter name.
        engine: String,
        /// Panic payload, if it was a string.
        message: String,
    },
}

/// Result of invoking one adapter on one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionOutcome {
    /// The engine produced a value.
    Converted(f64),
    /// The engine failed; the failure is kept verbatim.
    Failed(ConversionFailure),
}

impl ConversionOutcome {
    /// The converted value, if any.
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Converted(v) => Some(*v),
            Self::Failed(_) => None,
        }
    }

    /// The failure, if any.
    pub fn failure(&self) -> Option<&ConversionFailure> {
        match self {
            Self::Converted(_) => None,
            Self::Failed(f) => Some(f),
        }
    }

    /// Whether the adapter failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for ConversionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converted(v) => write!(f, "{}", v),
            Self::Failed(failure) => write!(f, "FAILED ({})", failure),
        }
    }
}

/// A raw N2R implementation.
pub trait ConversionEngine: Send + Sync + 'static {
    /// Convert one input value.
    fn convert(&self, input: f64) -> Result<f64, EngineFault>;

    /// Engine name for reporting.
    fn name(&self) -> &str;

    /// Whether [`ConversionEngine::convert_within`] enforces its budget
    /// itself. Engines that hold OS resources per call (child processes,
    /// sockets) should, so that nothing outlives a timed-out call.
    fn enforces_deadline(&self) -> bool {
        false
    }

    /// Convert within `budget`, failing with [`EngineFault::TimedOut`] once
    /// it expires. Only called when [`ConversionEngine::enforces_deadline`]
    /// is true.
    fn convert_within(&self, input: f64, budget: Duration) -> Result<f64, EngineFault> {
        let _ = budget;
        self.convert(input)
    }
}

/// The contract the comparison engine calls.
///
/// Implementations must never panic or return early: every problem is
/// reported through [`ConversionOutcome::Failed`].
pub trait ConversionAdapter: Send + Sync {
    /// Convert a sample.
    fn convert(&self, sample: &Sample) -> ConversionOutcome;

    /// Adapter name for reporting.
    fn name(&self) -> &str;
}

/// Adapter around a [`ConversionEngine`] with fault containment and an
/// optional per-call timeout.
pub struct EngineAdapter {
    engine: Arc<dyn ConversionEngine>,
    name: String,
    timeout: Option<Duration>,
}

impl EngineAdapter {
    /// Wrap an engine without a timeout.
    pub fn new(engine: Arc<dyn ConversionEngine>) -> Self {
        let name = engine.name().to_string();
        Self {
            engine,
            name,
            timeout: None,
        }
    }

    /// Bound every call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the reported name (e.g. "reference" / "target").
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Configured per-call timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn invoke_inline(&self, input: f64) -> Result<f64, ConversionFailure> {
        let engine = &self.engine;
        self.settle(panic::catch_unwind(AssertUnwindSafe(|| {
            engine.convert(input)
        })))
    }

    // The engine owns the deadline and cleans up after itself; no call
    // thread is left behind.
    fn invoke_with_deadline(&self, input: f64, timeout: Duration) -> Result<f64, ConversionFailure> {
        let engine = &self.engine;
        self.settle(panic::catch_unwind(AssertUnwindSafe(|| {
            engine.convert_within(input, timeout)
        })))
    }

    // A call that outlives its budget keeps running on a detached thread;
    // its late result is dropped with the channel.
    fn invoke_bounded(&self, input: f64, timeout: Duration) -> Result<f64, ConversionFailure> {
        let (tx, rx) = mpsc::channel();
        let engine = Arc::clone(&self.engine);

        let spawned = thread::Builder::new()
            .name(format!("{}-call", self.name))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| engine.convert(input)));
                let _ = tx.send(result);
            });
        if let Err(e) = spawned {
            return Err(ConversionFailure::Fault {
                engine: self.name.clone(),
                message: format!("could not spawn call thread: {}", e),
            });
        }

        match rx.recv_timeout(timeout) {
            Ok(result) => self.settle(result),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                debug!(engine = %self.name, input, "engine call timed out");
                Err(self.timed_out(timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ConversionFailure::Panicked {
                engine: self.name.clone(),
                message: "call thread exited without a result".to_string(),
            }),
        }
    }

    fn settle(
        &self,
        result: thread::Result<Result<f64, EngineFault>>,
    ) -> Result<f64, ConversionFailure> {
        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(EngineFault::Unrepresentable(message))) => {
                Err(ConversionFailure::Unrepresentable {
                    engine: self.name.clone(),
                    message,
                })
            }
            Ok(Err(EngineFault::TimedOut(budget))) => Err(self.timed_out(budget)),
            Ok(Err(fault)) => Err(ConversionFailure::Fault {
                engine: self.name.clone(),
                message: fault.to_string(),
            }),
            Err(payload) => Err(ConversionFailure::Panicked {
                engine: self.name.clone(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    fn timed_out(&self, budget: Duration) -> ConversionFailure {
        ConversionFailure::TimedOut {
            engine: self.name.clone(),
            timeout_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl ConversionAdapter for EngineAdapter {
    fn convert(&self, sample: &Sample) -> ConversionOutcome {
        let input = sample.value();
        let result = match self.timeout {
            Some(timeout) if self.engine.enforces_deadline() => {
                self.invoke_with_deadline(input, timeout)
            }
            Some(timeout) => self.invoke_bounded(input, timeout),
            None => self.invoke_inline(input),
        };
        match result {
            Ok(value) => ConversionOutcome::Converted(value),
            Err(failure) => ConversionOutcome::Failed(failure),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Engine backed by a closure.
pub struct FnEngine<F> {
    name: String,
    func: F,
}

impl<F> FnEngine<F>
where
    F: Fn(f64) -> Result<f64, EngineFault> + Send + Sync + 'static,
{
    /// Wrap a fallible closure.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> ConversionEngine for FnEngine<F>
where
    F: Fn(f64) -> Result<f64, EngineFault> + Send + Sync + 'static,
{
    fn convert(&self, input: f64) -> Result<f64, EngineFault> {
        (self.func)(input)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap an infallible closure as an engine.
pub fn infallible<G>(name: impl Into<String>, func: G) -> Arc<dyn ConversionEngine>
where
    G: Fn(f64) -> f64 + Send + Sync + 'static,
{
    Arc::new(FnEngine::new(name, move |x| Ok(func(x))))
}

/// The reference and target adapters for one run.
pub struct AdapterPair {
    /// Trusted baseline.
    pub reference: Box<dyn ConversionAdapter>,
    /// Implementation under test.
    pub target: Box<dyn ConversionAdapter>,
}

impl AdapterPair {
    /// Pair two adapters.
    pub fn new(reference: Box<dyn ConversionAdapter>, target: Box<dyn ConversionAdapter>) -> Self {
        Self { reference, target }
    }

    /// Pair two engines, bounding target calls by `target_timeout` if given.
    pub fn from_engines(
        reference: Arc<dyn ConversionEngine>,
        target: Arc<dyn ConversionEngine>,
        target_timeout: Option<Duration>,
    ) -> Self {
        let mut target = EngineAdapter::new(target);
        if let Some(timeout) = target_timeout {
            target = target.with_timeout(timeout);
        }
        Self::new(Box::new(EngineAdapter::new(reference)), Box::new(target))
    }

    /// Wire both sides to the same engine. Every comparison must match.
    pub fn mirrored(engine: Arc<dyn ConversionEngine>) -> Self {
        Self::from_engines(Arc::clone(&engine), engine, None)
    }
}

/// Which concrete engine an adapter is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "snake_case")]
pub enum EngineSpec {
    /// Real-valued curve model.
    Model,
    /// Integer fixed-point curve, on-chain style.
    FixedPoint,
    /// External executable; the sample value is appended as the last argument.
    Process {
        /// Executable path or name on `PATH`.
        program: PathBuf,
        /// Arguments placed before the sample value.
        #[serde(default)]
        args: Vec<String>,
    },
}

fn build_engine(spec: &EngineSpec, curve: &CurveParams) -> HarnessResult<Arc<dyn ConversionEngine>> {
    Ok(match spec {
        EngineSpec::Model => Arc::new(ModelEngine::new(*curve)?),
        EngineSpec::FixedPoint => Arc::new(FixedPointEngine::new(*curve)?),
        EngineSpec::Process { program, args } => {
            Arc::new(ProcessEngine::new(program.clone(), args.clone())?)
        }
    })
}

/// Build the adapter pair described by `config`.
///
/// Fails with [`HarnessError::SetupFailure`] when an engine cannot be
/// constructed (e.g. the external executable does not exist).
pub fn conversion_handler(config: &HarnessConfig) -> HarnessResult<AdapterPair> {
    let reference = build_engine(&config.reference, &config.curve)
        .map_err(|e| into_setup("reference", e))?;
    let target =
        build_engine(&config.target, &config.curve).map_err(|e| into_setup("target", e))?;

    let timeout = config.run.timeout_ms.map(Duration::from_millis);
    debug!(
        reference = reference.name(),
        target = target.name(),
        timeout_ms = ?config.run.timeout_ms,
        "adapters constructed"
    );
    Ok(AdapterPair::new(
        Box::new(EngineAdapter::new(reference).with_name("reference")),
        Box::new({
            let adapter = EngineAdapter::new(target).with_name("target");
            match timeout {
                Some(t) => adapter.with_timeout(t),
                None => adapter,
            }
        }),
    ))
}

fn into_setup(side: &str, err: HarnessError) -> HarnessError {
    match err {
        HarnessError::InvalidConfiguration(msg) => {
            HarnessError::invalid(format!("{} engine: {}", side, msg))
        }
        HarnessError::SetupFailure(msg) => HarnessError::setup(format!("{} engine: {}", side, msg)),
        other => HarnessError::setup(format!("{} engine: {}", side, other)),
    }
}
