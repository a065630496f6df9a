//! Cooling plans: ordered `(temperature, sweeps)` stages fed to
//! [`schedule`](crate::metropolis::schedule).

use itertools::Itertools;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use tap::Tap;

use crate::error::{IsingError, Result};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Plan(Vec<(f64, i64)>);

impl Plan {
    pub fn new(stages: Vec<(f64, i64)>) -> Self {
        Self(stages)
    }

    /// `stages` temperatures decreasing by a constant ratio from `start` to `end`.
    pub fn geometric(start: f64, end: f64, stages: usize, sweeps_per_stage: i64) -> Result<Self> {
        check_endpoints(start, end, stages)?;
        if start <= 0.0 || end <= 0.0 {
            return Err(IsingError::argument(
                "geometric cooling needs strictly positive temperatures",
            ));
        }
        if stages == 1 {
            return Ok(Self(vec![(end, sweeps_per_stage)]));
        }

        let step = (end / start).powf(1.0 / (stages - 1) as f64);
        let mut temperature = start;
        let stages = (0..stages)
            .map(|_| {
                let stage = (temperature, sweeps_per_stage);
                temperature *= step;
                stage
            })
            .collect::<Vec<_>>()
            .tap_mut(|v| {
                if let Some(last) = v.last_mut() {
                    last.0 = end;
                }
            });
        Ok(Self(stages))
    }

    /// `stages` evenly spaced temperatures from `start` to `end`.
    pub fn linear(start: f64, end: f64, stages: usize, sweeps_per_stage: i64) -> Result<Self> {
        check_endpoints(start, end, stages)?;
        if stages == 1 {
            return Ok(Self(vec![(end, sweeps_per_stage)]));
        }

        let step = (end - start) / (stages - 1) as f64;
        let stages = (0..stages)
            .map(|i| (start + step * i as f64, sweeps_per_stage))
            .collect::<Vec<_>>()
            .tap_mut(|v| {
                if let Some(last) = v.last_mut() {
                    last.0 = end;
                }
            });
        Ok(Self(stages))
    }

    pub fn stages(&self) -> &[(f64, i64)] {
        &self.0
    }

    pub fn total_sweeps(&self) -> i64 {
        self.0.iter().map(|(_, n)| *n).sum()
    }
}

fn check_endpoints(start: f64, end: f64, stages: usize) -> Result<()> {
    if stages == 0 {
        return Err(IsingError::argument("a cooling plan needs at least one stage"));
    }
    if !(start.is_finite() && end.is_finite() && start >= 0.0 && end >= 0.0) {
        return Err(IsingError::argument(format!(
            "cooling from {start} to {end}: temperatures must be finite and non-negative"
        )));
    }
    Ok(())
}

impl Deref for Plan {
    type Target = [(f64, i64)];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().map(|(t, n)| format!("{t}:{n}")).join(","))
    }
}

impl FromStr for Plan {
    type Err = IsingError;

    /// Parses `"3:100,2:100,1:50"`.
    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .map(str::trim)
            .filter(|stage| !stage.is_empty())
            .map(|stage| {
                let (t, n) = stage.split_once(':').ok_or_else(|| {
                    IsingError::argument(format!("stage {stage:?} is not of the form T:sweeps"))
                })?;
                let t = t.trim().parse::<f64>().map_err(|e| {
                    IsingError::argument(format!("bad temperature in {stage:?}: {e}"))
                })?;
                let n = n.trim().parse::<i64>().map_err(|e| {
                    IsingError::argument(format!("bad sweep count in {stage:?}: {e}"))
                })?;
                Ok((t, n))
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }
}
