//! Random input generation for differential runs.
//!
//! Samples are drawn from a configurable distribution into a lazy,
//! exact-length iterator. A seeded configuration uses `ChaCha8Rng`, so the
//! same seed and count give the same sequence on every platform.

use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use rand::distributions::Uniform;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp, Normal};
use serde::{Deserialize, Serialize};

/// A single generated input value.
///
/// Not `Clone`: each sample is moved into exactly one comparison.
#[derive(Debug, PartialEq, Serialize)]
pub struct Sample {
    index: u64,
    value: f64,
}

impl Sample {
    /// Create a sample at the given zero-based position in the run.
    pub fn new(index: u64, value: f64) -> Self {
        Self { index, value }
    }

    /// Zero-based position of this sample in its run.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// The input value handed to both engines.
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Statistical shape samples are drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionKind {
    /// Uniform on `[low, high)`.
    Uniform {
        /// Inclusive lower bound.
        low: f64,
        /// Exclusive upper bound.
        high: f64,
    },
    /// `offset + Exp(lambda)`.
    Exponential {
        /// Rate parameter, must be positive.
        lambda: f64,
        /// Shift added to every draw.
        #[serde(default)]
        offset: f64,
    },
    /// Gaussian with the given mean and standard deviation.
    Normal {
        /// Mean.
        mean: f64,
        /// Standard deviation, must be non-negative.
        std_dev: f64,
    },
    /// Log-uniform on `[low, high)`; spreads samples evenly across magnitudes.
    LogUniform {
        /// Inclusive lower bound, must be positive.
        low: f64,
        /// Exclusive upper bound.
        high: f64,
    },
}

impl Default for DistributionKind {
    fn default() -> Self {
        Self::Uniform {
            low: 1.0,
            high: 500_000.0,
        }
    }
}

/// Configuration for [`generate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    /// Distribution to draw from.
    pub shape: DistributionKind,
    /// Seed for reproducible runs. `None` draws from OS entropy.
    pub seed: Option<u64>,
    /// Round every sample down to a whole number.
    pub integral: bool,
    /// Clamp samples to at least this value.
    pub min: Option<f64>,
    /// Clamp samples to at most this value.
    pub max: Option<f64>,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            shape: DistributionKind::default(),
            seed: None,
            integral: true,
            min: None,
            max: None,
        }
    }
}

impl DistributionConfig {
    /// Check distribution parameters without drawing anything.
    pub fn validate(&self) -> HarnessResult<()> {
        self.sampler().map(|_| ())?;

        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(HarnessError::invalid(format!(
                    "clamp bounds inverted: min {} > max {}",
                    min, max
                )));
            }
        }
        for bound in [self.min, self.max].into_iter().flatten() {
            if !bound.is_finite() {
                return Err(HarnessError::invalid(format!(
                    "clamp bound must be finite, got {}",
                    bound
                )));
            }
        }
        Ok(())
    }

    fn sampler(&self) -> HarnessResult<Sampler> {
        match self.shape {
            DistributionKind::Uniform { low, high } => {
                check_range("uniform", low, high)?;
                Ok(Sampler::Uniform(Uniform::new(low, high)))
            }
            DistributionKind::Exponential { lambda, offset } => {
                if !offset.is_finite() {
                    return Err(HarnessError::invalid(format!(
                        "exponential offset must be finite, got {}",
                        offset
                    )));
                }
                if !(lambda.is_finite() && lambda > 0.0) {
                    return Err(HarnessError::invalid(format!(
                        "exponential lambda must be positive, got {}",
                        lambda
                    )));
                }
                let exp = Exp::new(lambda)
                    .map_err(|e| HarnessError::invalid(format!("exponential: {}", e)))?;
                Ok(Sampler::Exponential { exp, offset })
            }
            DistributionKind::Normal { mean, std_dev } => {
                if !mean.is_finite() || !std_dev.is_finite() || std_dev < 0.0 {
                    return Err(HarnessError::invalid(format!(
                        "normal needs finite mean and non-negative std_dev, got mean {} std_dev {}",
                        mean, std_dev
                    )));
                }
                let normal = Normal::new(mean, std_dev)
                    .map_err(|e| HarnessError::invalid(format!("normal: {}", e)))?;
                Ok(Sampler::Normal(normal))
            }
            DistributionKind::LogUniform { low, high } => {
                check_range("log_uniform", low, high)?;
                if low <= 0.0 {
                    return Err(HarnessError::invalid(format!(
                        "log_uniform low bound must be positive, got {}",
                        low
                    )));
                }
                Ok(Sampler::LogUniform(Uniform::new(low.ln(), high.ln())))
            }
        }
    }
}

fn check_range(name: &str, low: f64, high: f64) -> HarnessResult<()> {
    if !low.is_finite() || !high.is_finite() {
        return Err(HarnessError::invalid(format!(
            "{} bounds must be finite, got [{}, {})",
            name, low, high
        )));
    }
    if low >= high {
        return Err(HarnessError::invalid(format!(
            "{} needs low < high, got [{}, {})",
            name, low, high
        )));
    }
    Ok(())
}

/// Validate a requested sample count.
pub fn validate_count(count: i64) -> HarnessResult<u64> {
    u64::try_from(count)
        .ok()
        .filter(|&c| c > 0)
        .ok_or_else(|| {
            HarnessError::invalid(format!("sample count must be positive, got {}", count))
        })
}

/// Prebuilt distribution state.
#[derive(Debug, Clone)]
enum Sampler {
    Uniform(Uniform<f64>),
    Exponential { exp: Exp<f64>, offset: f64 },
    Normal(Normal<f64>),
    LogUniform(Uniform<f64>),
}

impl Sampler {
    fn draw(&self, rng: &mut ChaCha8Rng) -> f64 {
        match self {
            Self::Uniform(u) => u.sample(rng),
            Self::Exponential { exp, offset } => offset + exp.sample(rng),
            Self::Normal(n) => n.sample(rng),
            Self::LogUniform(u) => u.sample(rng).exp(),
        }
    }
}

/// Lazy, finite sequence of samples produced by [`generate`].
#[derive(Debug)]
pub struct Samples {
    rng: ChaCha8Rng,
    sampler: Sampler,
    integral: bool,
    min: Option<f64>,
    max: Option<f64>,
    next_index: u64,
    count: u64,
}

impl Iterator for Samples {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        if self.next_index >= self.count {
            return None;
        }
        let mut value = self.sampler.draw(&mut self.rng);
        if let Some(min) = self.min {
            value = value.max(min);
        }
        if let Some(max) = self.max {
            value = value.min(max);
        }
        if self.integral {
            value = value.floor();
        }

        let sample = Sample::new(self.next_index, value);
        self.next_index += 1;
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.count - self.next_index).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Samples {}

/// Produce exactly `count` samples from `config`.
///
/// Fails with [`HarnessError::InvalidConfiguration`] for a non-positive
/// count or invalid distribution parameters. Nothing is drawn until the
/// iterator is polled.
pub fn generate(count: i64, config: &DistributionConfig) -> HarnessResult<Samples> {
    let count = validate_count(count)?;
    config.validate()?;
    let sampler = config.sampler()?;

    let rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    Ok(Samples {
        rng,
        sampler,
        integral: config.integral,
        min: config.min,
        max: config.max,
        next_index: 0,
        count,
    })
}

/// Source of samples for a run.
///
/// The orchestrator depends only on this trait, so tests and replays can
/// substitute fixed inputs for random ones.
pub trait SampleGenerator {
    /// Produce exactly `count` samples.
    fn generate(&self, count: i64) -> HarnessResult<Box<dyn Iterator<Item = Sample> + Send>>;

    /// Seed that makes this generator reproducible, if any.
    fn seed(&self) -> Option<u64> {
        None
    }
}

/// Random generator backed by a [`DistributionConfig`].
#[derive(Debug, Clone)]
pub struct RandomDistribution {
    config: DistributionConfig,
}

impl RandomDistribution {
    /// Validate `config` and wrap it.
    pub fn new(config: DistributionConfig) -> HarnessResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The underlying configuration.
    pub fn config(&self) -> &DistributionConfig {
        &self.config
    }
}

impl SampleGenerator for RandomDistribution {
    fn generate(&self, count: i64) -> HarnessResult<Box<dyn Iterator<Item = Sample> + Send>> {
        Ok(Box::new(generate(count, &self.config)?))
    }

    fn seed(&self) -> Option<u64> {
        self.config.seed
    }
}

/// Generator that replays an explicit list of values.
#[derive(Debug, Clone, Default)]
pub struct FixedSamples {
    values: Vec<f64>,
}

impl FixedSamples {
    /// Replay `values` in order.
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Number of values available.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no values are available.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SampleGenerator for FixedSamples {
    fn generate(&self, count: i64) -> HarnessResult<Box<dyn Iterator<Item = Sample> + Send>> {
        let count = validate_count(count)?;
        if count > self.values.len() as u64 {
            return Err(HarnessError::invalid(format!(
                "requested {} samples but only {} fixed values are available",
                count,
                self.values.len()
            )));
        }

        let samples: Vec<Sample> = self
            .values
            .iter()
            .zip(0..count)
            .map(|(&value, index)| Sample::new(index, value))
            .collect();
        Ok(Box::new(samples.into_iter()))
    }
}

/// Build the configured random distribution.
pub fn distribution_function(config: &HarnessConfig) -> HarnessResult<RandomDistribution> {
    RandomDistribution::new(config.distribution.clone())
}
