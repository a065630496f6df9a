use crate::chain::Configuration;
use crate::error::{IsingError, Result};

/// Sample average of `s_0 * s_i` over `states`, for every site `i`.
pub fn compute(states: &[Configuration]) -> Result<Vec<f64>> {
    let first = states
        .first()
        .ok_or_else(|| IsingError::argument("cannot compute correlations of zero states"))?;
    let length = first.len();
    if let Some(other) = states.iter().find(|s| s.len() != length) {
        return Err(IsingError::argument(format!(
            "states have different lengths ({length} and {})",
            other.len()
        )));
    }

    if length == 0 {
        return Ok(Vec::new());
    }

    let mut sums = vec![0i64; length];
    for state in states {
        let s0 = state[0] as i64;
        for (sum, si) in sums.iter_mut().zip(state.iter()) {
            *sum += s0 * si as i64;
        }
    }

    let count = states.len() as f64;
    Ok(sums.into_iter().map(|sum| sum as f64 / count).collect())
}
