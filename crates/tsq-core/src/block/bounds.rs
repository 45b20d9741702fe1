//! The time axis of a block.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Start time, step size and step count of a block. Timestamps are Unix
/// milliseconds; step `i` sits at `start_ms + i * step_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawBounds")]
pub struct Bounds {
    start_ms: i64,
    step_ms: i64,
    steps: usize,
}

#[derive(Deserialize)]
struct RawBounds {
    start_ms: i64,
    step_ms: i64,
    steps: usize,
}

impl TryFrom<RawBounds> for Bounds {
    type Error = Error;

    fn try_from(raw: RawBounds) -> Result<Self> {
        Bounds::new(raw.start_ms, raw.step_ms, raw.steps)
    }
}

impl Bounds {
    pub fn new(start_ms: i64, step_ms: i64, steps: usize) -> Result<Self> {
        if step_ms <= 0 {
            return Err(Error::Bounds(format!("step must be positive, got {step_ms}ms")));
        }
        let span = (steps as i64).checked_mul(step_ms);
        if span.and_then(|s| start_ms.checked_add(s)).is_none() {
            return Err(Error::Bounds(format!(
                "{steps} steps of {step_ms}ms from {start_ms} overflow the time axis"
            )));
        }
        Ok(Self {
            start_ms,
            step_ms,
            steps,
        })
    }

    pub fn start_ms(&self) -> i64 {
        self.start_ms
    }

    pub fn step_ms(&self) -> i64 {
        self.step_ms
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Exclusive end of the axis.
    pub fn end_ms(&self) -> i64 {
        self.start_ms + self.step_ms * self.steps as i64
    }

    pub fn timestamp_at(&self, step: usize) -> Option<i64> {
        (step < self.steps).then(|| self.start_ms + self.step_ms * step as i64)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.steps).map(move |i| self.start_ms + self.step_ms * i as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_follow_step() {
        let b = Bounds::new(1_000, 500, 3).unwrap();
        assert_eq!(b.timestamps().collect::<Vec<_>>(), vec![1_000, 1_500, 2_000]);
        assert_eq!(b.timestamp_at(2), Some(2_000));
        assert_eq!(b.timestamp_at(3), None);
        assert_eq!(b.end_ms(), 2_500);
    }

    #[test]
    fn rejects_bad_steps() {
        assert!(Bounds::new(0, 0, 3).is_err());
        assert!(Bounds::new(0, -10, 3).is_err());
        assert!(Bounds::new(i64::MAX - 5, 10, 3).is_err());
    }

    #[test]
    fn deserialize_validates() {
        let ok: Bounds =
            serde_json::from_str(r#"{"start_ms": 0, "step_ms": 1000, "steps": 3}"#).unwrap();
        assert_eq!(ok, Bounds::new(0, 1_000, 3).unwrap());

        let zero_step = serde_json::from_str::<Bounds>(r#"{"start_ms": 0, "step_ms": 0, "steps": 3}"#);
        assert!(zero_step.is_err());
        let overflow = serde_json::from_str::<Bounds>(&format!(
            r#"{{"start_ms": {}, "step_ms": 10, "steps": 3}}"#,
            i64::MAX - 5
        ));
        assert!(overflow.is_err());
    }
}
