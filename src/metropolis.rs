use bitvec::prelude::{BitSlice, BitVec};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::{BitXor, BitXorAssign};

use crate::chain::{neighbor_value, SpinChain};
use crate::error::{IsingError, Result};

/// Site selection and acceptance decision of a single-spin-flip update.
pub trait UpdateRule {
    /// Site to try next, in `0..length`.
    fn pick_site(&mut self, length: usize) -> usize;

    fn accept(&mut self, delta_energy: f64, temperature: f64) -> bool;
}

/// Metropolis rule: uniformly random sites (with replacement), downhill
/// moves always accepted, uphill moves with probability `exp(-dE / T)`.
#[derive(Clone, Debug)]
pub struct Metropolis<R> {
    rng: R,
}

impl<R: Rng> Metropolis<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl Metropolis<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng> UpdateRule for Metropolis<R> {
    #[inline(always)]
    fn pick_site(&mut self, length: usize) -> usize {
        self.rng.gen_range(0..length)
    }

    #[inline(always)]
    fn accept(&mut self, delta_energy: f64, temperature: f64) -> bool {
        match acceptance_probability(delta_energy, temperature) {
            p if p >= 1.0 => true,
            p if p <= 0.0 => false,
            p => self.rng.gen::<f64>() < p,
        }
    }
}

/// Probability with which the Metropolis rule accepts a move of energy change `delta_energy`.
pub fn acceptance_probability(delta_energy: f64, temperature: f64) -> f64 {
    if delta_energy < 0.0 {
        1.0
    } else if temperature > 0.0 {
        (-delta_energy / temperature).exp()
    } else {
        0.0
    }
}

/// Sites whose spin changed, as a mask over the chain.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FlipSet(BitVec);

impl FlipSet {
    pub fn empty(length: usize) -> Self {
        Self(BitVec::repeat(false, length))
    }

    /// Sites at which `before` and `after` differ.
    pub fn between(before: &BitSlice, after: &BitSlice) -> Self {
        let mut mask = before.to_bitvec();
        *mask.as_mut_bitslice() ^= after;
        Self(mask)
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter_ones()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.0.get(index).map_or(false, |b| *b)
    }

    pub fn len(&self) -> usize {
        self.0.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.0.not_any()
    }
}

impl BitXorAssign<&FlipSet> for FlipSet {
    fn bitxor_assign(&mut self, rhs: &FlipSet) {
        *self.0.as_mut_bitslice() ^= rhs.0.as_bitslice();
    }
}

impl BitXor for FlipSet {
    type Output = FlipSet;

    fn bitxor(mut self, rhs: FlipSet) -> Self::Output {
        self ^= &rhs;
        self
    }
}

/// Energy change of flipping spin `index` in the current configuration.
///
/// # Panics
///
/// Panics if `index >= chain.length()`.
pub fn local_delta_energy(chain: &SpinChain, index: usize) -> f64 {
    let state = chain.system_state();
    let site = index as isize;
    let neighbors = neighbor_value(state, site - 1) + neighbor_value(state, site + 1);
    -2.0 * state[index] as f64 * (chain.coupling() * neighbors as f64 + chain.local_field(index))
}

pub(crate) fn check_temperature(temperature: f64) -> Result<()> {
    if temperature.is_finite() && temperature >= 0.0 {
        Ok(())
    } else {
        Err(IsingError::argument(format!(
            "temperature must be finite and non-negative, got {temperature}"
        )))
    }
}

pub(crate) fn check_sweeps(sweeps: i64) -> Result<()> {
    if sweeps < 0 {
        Err(IsingError::argument(format!(
            "cannot update a negative number of times ({sweeps})"
        )))
    } else {
        Ok(())
    }
}

/// One sweep of `length` trial flips. The pre-sweep configuration is
/// recorded into the chain history.
pub fn sweep(chain: &mut SpinChain, temperature: f64, rule: &mut impl UpdateRule) -> Result<FlipSet> {
    check_temperature(temperature)?;
    Ok(sweep_unchecked(chain, temperature, rule))
}

fn sweep_unchecked(chain: &mut SpinChain, temperature: f64, rule: &mut impl UpdateRule) -> FlipSet {
    let start = chain.current();
    chain.record(&start);

    let size = chain.length();
    for _ in 0..size {
        let spin = rule.pick_site(size);
        let de = local_delta_energy(chain, spin);
        if rule.accept(de, temperature) {
            chain.reverse_spin(spin);
        }
    }

    FlipSet::between(start.bits(), chain.system_state().bits())
}

/// `sweeps` consecutive sweeps. A site is in the result iff it was flipped
/// an odd number of times over all sweeps.
pub fn update(
    chain: &mut SpinChain,
    temperature: f64,
    sweeps: i64,
    rule: &mut impl UpdateRule,
) -> Result<FlipSet> {
    check_sweeps(sweeps)?;
    check_temperature(temperature)?;

    let mut flipped = FlipSet::empty(chain.length());
    for _ in 0..sweeps {
        flipped ^= &sweep_unchecked(chain, temperature, rule);
    }
    Ok(flipped)
}

/// Applies `update` for every `(temperature, sweeps)` stage in order. The
/// whole plan is validated before the chain is touched.
pub fn schedule(
    chain: &mut SpinChain,
    plan: &[(f64, i64)],
    rule: &mut impl UpdateRule,
) -> Result<FlipSet> {
    for (temperature, sweeps) in plan {
        check_sweeps(*sweeps)?;
        check_temperature(*temperature)?;
    }

    let mut flipped = FlipSet::empty(chain.length());
    for (stage, (temperature, sweeps)) in plan.iter().copied().enumerate() {
        tracing::debug!(stage, temperature, sweeps, "annealing stage");
        flipped ^= &update(chain, temperature, sweeps, rule)?;
    }
    Ok(flipped)
}
