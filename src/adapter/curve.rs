//! Built-in N2R engines over the linear-quadratic reserve curve.
//!
//! `r(n) = (alpha * n - beta * n^2) / scale`
//!
//! [`ModelEngine`] evaluates the curve over reals, as the off-chain model
//! does. [`FixedPointEngine`] evaluates it the way the contract does: `u128`
//! words, checked arithmetic that reverts instead of wrapping, and
//! truncating division.

use super::{ConversionEngine, EngineFault};
use crate::error::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};

/// Curve coefficients shared by both engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveParams {
    /// Linear coefficient.
    pub alpha: u64,
    /// Quadratic coefficient.
    pub beta: u64,
    /// Fixed-point divisor.
    pub scale: u64,
}

impl Default for CurveParams {
    fn default() -> Self {
        Self {
            alpha: 1_000_000,
            beta: 1,
            scale: 1_000,
        }
    }
}

impl CurveParams {
    /// Reject a zero divisor.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.scale == 0 {
            return Err(HarnessError::invalid("curve scale must be non-zero"));
        }
        Ok(())
    }

    /// Largest input for which the curve is non-negative, `alpha / beta`.
    pub fn domain_limit(&self) -> Option<f64> {
        (self.beta > 0).then(|| self.alpha as f64 / self.beta as f64)
    }
}

/// Reference engine: real-valued evaluation.
#[derive(Debug, Clone)]
pub struct ModelEngine {
    params: CurveParams,
}

impl ModelEngine {
    /// Create a model engine.
    pub fn new(params: CurveParams) -> HarnessResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }
}

impl ConversionEngine for ModelEngine {
    fn convert(&self, n: f64) -> Result<f64, EngineFault> {
        if !n.is_finite() {
            return Err(EngineFault::Unrepresentable(format!(
                "non-finite input {}",
                n
            )));
        }
        let p = &self.params;
        let r = (p.alpha as f64 * n - p.beta as f64 * n * n) / p.scale as f64;
        if !r.is_finite() {
            return Err(EngineFault::Reverted(format!(
                "result overflowed for input {}",
                n
            )));
        }
        if r < 0.0 {
            return Err(EngineFault::Reverted(format!(
                "curve is negative at {} (domain limit {:?})",
                n,
                p.domain_limit()
            )));
        }
        Ok(r)
    }

    fn name(&self) -> &str {
        "model"
    }
}

/// Target engine: on-chain style fixed-point evaluation.
#[derive(Debug, Clone)]
pub struct FixedPointEngine {
    params: CurveParams,
}

impl FixedPointEngine {
    /// Create a fixed-point engine.
    pub fn new(params: CurveParams) -> HarnessResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Evaluate the curve on an integer amount.
    pub fn convert_units(&self, n: u128) -> Result<u128, EngineFault> {
        let p = &self.params;
        let gain = u128::from(p.alpha)
            .checked_mul(n)
            .ok_or_else(|| EngineFault::Reverted("multiplication overflow".to_string()))?;
        let loss = n
            .checked_mul(n)
            .and_then(|sq| sq.checked_mul(u128::from(p.beta)))
            .ok_or_else(|| EngineFault::Reverted("multiplication overflow".to_string()))?;
        let net = gain
            .checked_sub(loss)
            .ok_or_else(|| EngineFault::Reverted("subtraction underflow".to_string()))?;
        net.checked_div(u128::from(p.scale))
            .ok_or_else(|| EngineFault::Reverted("division by zero".to_string()))
    }
}

impl ConversionEngine for FixedPointEngine {
    fn convert(&self, n: f64) -> Result<f64, EngineFault> {
        Ok(self.convert_units(to_units(n)?)? as f64)
    }

    fn name(&self) -> &str {
        "fixed_point"
    }
}

/// Whole, non-negative values up to 2^64 map onto contract units.
fn to_units(n: f64) -> Result<u128, EngineFault> {
    if !n.is_finite() || n < 0.0 {
        return Err(EngineFault::Unrepresentable(format!(
            "{} is not a non-negative finite amount",
            n
        )));
    }
    if n.fract() != 0.0 {
        return Err(EngineFault::Unrepresentable(format!(
            "{} is not a whole number of units",
            n
        )));
    }
    if n > u64::MAX as f64 {
        return Err(EngineFault::Unrepresentable(format!(
            "{} exceeds the 64-bit input word",
            n
        )));
    }
    Ok(n as u128)
}
