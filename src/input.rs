//! Sample-count input.

use crate::error::{HarnessError, HarnessResult};
use std::io::BufRead;

/// Read a sample count from the first line of `reader`.
///
/// End of input or a blank line yields `default`. Anything that is not an
/// integer is [`HarnessError::InvalidConfiguration`]. Range checks are left
/// to the orchestrator, so `0` and negative numbers are returned as read.
pub fn read_count<R: BufRead>(mut reader: R, default: i64) -> HarnessResult<i64> {
    let mut line = String::new();
    reader.read_line(&mut line)?;

    let text = line.trim();
    if text.is_empty() {
        return Ok(default);
    }
    text.parse::<i64>()
        .map_err(|_| HarnessError::invalid(format!("sample count is not an integer: {:?}", text)))
}
