//! Population size history for the single island deme.

use crate::common::ParameterSet;
use crate::error::SimError;

pub const BOTTLENECK_START: i64 = 40;
pub const BOTTLENECK_SIZE: i64 = 10;
pub const BOTTLENECK_END: i64 = 42;
pub const ANCESTRAL_TIME: i64 = 8012;
pub const ANCESTRAL_SIZE: i64 = 20000;

/// A change of population size, in generations before present.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Epoch {
    pub time: f64,
    pub size: f64,
}

impl Epoch {
    pub fn new(time: f64, size: f64) -> Self {
        Self { time, size }
    }
}

/// Size changes for population 0, plus the size in effect
/// from the present back to the first change.
#[derive(Clone, Debug, PartialEq)]
pub struct DemographicHistory {
    reference_size: f64,
    epochs: Vec<Epoch>,
}

impl DemographicHistory {
    /// Event times must be strictly increasing. Nothing
    /// is reordered.
    pub fn new(reference_size: f64, epochs: Vec<Epoch>) -> Result<Self, SimError> {
        check_size(reference_size)?;
        let mut previous: Option<f64> = None;
        for epoch in &epochs {
            if !epoch.time.is_finite() || epoch.time < 0.0 {
                return Err(SimError::InvalidParameter(format!(
                    "demographic event time must be finite and non-negative, got {}",
                    epoch.time
                )));
            }
            if let Some(previous) = previous {
                if epoch.time <= previous {
                    return Err(SimError::EventOrder {
                        previous,
                        time: epoch.time,
                    });
                }
            }
            check_size(epoch.size)?;
            previous = Some(epoch.time);
        }
        Ok(Self {
            reference_size,
            epochs,
        })
    }

    /// The San Nicolas model:
    ///
    /// | time | size |
    /// |------|------|
    /// | 40   | 10   |
    /// | 42   | Ne3  |
    /// | T    | Ne4  |
    /// | 8012 | 20000|
    ///
    /// with `Ne1` from the present back to time 40.
    /// `T` must fall strictly between 42 and 8012.
    pub fn san_nicolas(params: &ParameterSet) -> Result<Self, SimError> {
        let t = params.t();
        if t <= BOTTLENECK_END {
            return Err(SimError::EventOrder {
                previous: BOTTLENECK_END as f64,
                time: t as f64,
            });
        }
        if t >= ANCESTRAL_TIME {
            return Err(SimError::EventOrder {
                previous: t as f64,
                time: ANCESTRAL_TIME as f64,
            });
        }
        Self::new(
            params.ne1 as f64,
            vec![
                Epoch::new(BOTTLENECK_START as f64, BOTTLENECK_SIZE as f64),
                Epoch::new(BOTTLENECK_END as f64, params.ne3 as f64),
                Epoch::new(t as f64, params.ne4 as f64),
                Epoch::new(ANCESTRAL_TIME as f64, ANCESTRAL_SIZE as f64),
            ],
        )
    }

    pub fn reference_size(&self) -> f64 {
        self.reference_size
    }

    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    pub fn size_at(&self, time: f64) -> f64 {
        let n = self.epochs.partition_point(|e| e.time <= time);
        if n == 0 {
            self.reference_size
        } else {
            self.epochs[n - 1].size
        }
    }

    /// Time of the first size change strictly after `time`.
    pub fn next_change_after(&self, time: f64) -> Option<f64> {
        let n = self.epochs.partition_point(|e| e.time <= time);
        self.epochs.get(n).map(|e| e.time)
    }
}

fn check_size(size: f64) -> Result<(), SimError> {
    if size.is_finite() && size > 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidParameter(format!(
            "population size must be positive, got {size}"
        )))
    }
}
