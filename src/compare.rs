//! Comparison engine.
//!
//! Runs both adapters on one sample and judges the pair of outcomes under a
//! [`TolerancePolicy`]. The policy states two things explicitly: how far
//! apart two outputs may be, and which direction the reference value is
//! rounded before comparing. That second part matters when the target
//! truncates fixed-point results and the reference does not.

use crate::adapter::{ConversionAdapter, ConversionOutcome};
use crate::error::{HarnessError, HarnessResult};
use crate::generator::Sample;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How close two converted values must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceKind {
    /// Bit-for-bit equal.
    #[default]
    Exact,
    /// `|a - b| <= epsilon`.
    Absolute,
    /// `|a - b| <= epsilon * max(|a|, |b|)`.
    Relative,
}

/// Rounding applied to the reference output before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingRule {
    /// Compare the reference value as is.
    #[default]
    #[serde(rename = "none")]
    Unrounded,
    /// Round toward negative infinity.
    Floor,
    /// Round toward positive infinity.
    Ceil,
    /// Round half away from zero.
    Nearest,
    /// Truncate, as integer division does.
    TowardZero,
}

impl RoundingRule {
    /// Apply the rule.
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::Unrounded => value,
            Self::Floor => value.floor(),
            Self::Ceil => value.ceil(),
            Self::Nearest => value.round(),
            Self::TowardZero => value.trunc(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Unrounded => "none",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Nearest => "nearest",
            Self::TowardZero => "toward_zero",
        }
    }
}

/// Equality rule for a run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TolerancePolicy {
    /// Comparison mode.
    pub kind: ToleranceKind,
    /// Allowed difference for `absolute` and `relative`; ignored for `exact`.
    pub epsilon: f64,
    /// Rounding applied to the reference value first.
    pub rounding: RoundingRule,
}

impl TolerancePolicy {
    /// Exact equality, no rounding.
    pub fn exact() -> Self {
        Self::default()
    }

    /// Absolute epsilon, no rounding.
    pub fn absolute(epsilon: f64) -> Self {
        Self {
            kind: ToleranceKind::Absolute,
            epsilon,
            rounding: RoundingRule::Unrounded,
        }
    }

    /// Relative epsilon, no rounding.
    pub fn relative(epsilon: f64) -> Self {
        Self {
            kind: ToleranceKind::Relative,
            epsilon,
            rounding: RoundingRule::Unrounded,
        }
    }

    /// Set the rounding rule.
    pub fn with_rounding(mut self, rounding: RoundingRule) -> Self {
        self.rounding = rounding;
        self
    }

    /// Reject negative or non-finite epsilons.
    pub fn validate(&self) -> HarnessResult<()> {
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(HarnessError::invalid(format!(
                "tolerance epsilon must be finite and non-negative, got {}",
                self.epsilon
            )));
        }
        Ok(())
    }

    /// Whether `reference` (already rounded) and `target` agree.
    pub fn accepts(&self, reference: f64, target: f64) -> bool {
        if reference.is_nan() || target.is_nan() {
            return false;
        }
        if reference.is_infinite() || target.is_infinite() {
            return reference == target;
        }
        let diff = (reference - target).abs();
        match self.kind {
            ToleranceKind::Exact => reference == target,
            ToleranceKind::Absolute => diff <= self.epsilon,
            ToleranceKind::Relative => diff <= self.epsilon * reference.abs().max(target.abs()),
        }
    }

    /// One-line description for run headers and reports.
    pub fn describe(&self) -> String {
        let mode = match self.kind {
            ToleranceKind::Exact => "exact".to_string(),
            ToleranceKind::Absolute => format!("absolute(epsilon={})", self.epsilon),
            ToleranceKind::Relative => format!("relative(epsilon={})", self.epsilon),
        };
        format!("{}, reference rounding={}", mode, self.rounding.label())
    }
}

/// Which adapter failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Only the reference adapter failed.
    Reference,
    /// Only the target adapter failed.
    Target,
    /// Both adapters failed.
    Both,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reference => "reference",
            Self::Target => "target",
            Self::Both => "both",
        })
    }
}

/// Classification of an unmatched comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchKind {
    /// At least one adapter produced no value.
    AdapterInvocationFailure {
        /// The failing side.
        side: Side,
    },
    /// Both produced values that differ beyond tolerance.
    ComparisonMismatch,
}

/// Outcome of comparing one sample. Immutable once built.
#[derive(Debug, PartialEq, Serialize)]
pub struct ComparisonResult {
    input: Sample,
    reference: ConversionOutcome,
    target: ConversionOutcome,
    matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    divergence: Option<f64>,
}

impl ComparisonResult {
    /// Judge two outcomes for `input` under `policy`.
    pub fn judge(
        input: Sample,
        reference: ConversionOutcome,
        target: ConversionOutcome,
        policy: &TolerancePolicy,
    ) -> Self {
        let (matched, divergence) = match (reference.value(), target.value()) {
            (Some(r), Some(t)) => {
                let r = policy.rounding.apply(r);
                if policy.accepts(r, t) {
                    (true, None)
                } else {
                    let magnitude = (r.is_finite() && t.is_finite()).then(|| (r - t).abs());
                    (false, magnitude)
                }
            }
            _ => (false, None),
        };

        Self {
            input,
            reference,
            target,
            matched,
            divergence,
        }
    }

    /// The sample both adapters were given.
    pub fn input(&self) -> &Sample {
        &self.input
    }

    /// Reference adapter outcome.
    pub fn reference(&self) -> &ConversionOutcome {
        &self.reference
    }

    /// Target adapter outcome.
    pub fn target(&self) -> &ConversionOutcome {
        &self.target
    }

    /// Whether the outcomes agree under the policy.
    pub fn matched(&self) -> bool {
        self.matched
    }

    /// `|rounded reference - target|` for unmatched numeric outcomes.
    pub fn divergence(&self) -> Option<f64> {
        self.divergence
    }

    /// Why this comparison did not match, if it did not.
    pub fn mismatch_kind(&self) -> Option<MismatchKind> {
        if self.matched {
            return None;
        }
        let side = match (self.reference.is_failed(), self.target.is_failed()) {
            (true, true) => Side::Both,
            (true, false) => Side::Reference,
            (false, true) => Side::Target,
            (false, false) => return Some(MismatchKind::ComparisonMismatch),
        };
        Some(MismatchKind::AdapterInvocationFailure { side })
    }
}

/// Invoke both adapters on `sample` and judge the outcomes.
///
/// Adapters are pure in the sample, so invocation order does not matter.
/// Adapter failures are attached verbatim and count as mismatches.
pub fn compare(
    sample: Sample,
    reference: &dyn ConversionAdapter,
    target: &dyn ConversionAdapter,
    policy: &TolerancePolicy,
) -> ComparisonResult {
    let reference_outcome = reference.convert(&sample);
    let target_outcome = target.convert(&sample);
    ComparisonResult::judge(sample, reference_outcome, target_outcome, policy)
}
