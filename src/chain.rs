use bitvec::prelude::{BitSlice, BitVec};
use std::collections::{BTreeMap, VecDeque};
use std::fmt::{self, Write};
use std::ops::Index;
use std::str::FromStr;

use crate::error::{IsingError, Result};

/// Number of pre-sweep snapshots a chain keeps before evicting the oldest.
pub const HISTORY_CAPACITY: usize = 1000;

/// Coupling used when none is given: aligned neighbours are favoured.
pub const DEFAULT_COUPLING: f64 = -1.0;

const UP: i8 = 1;
const DOWN: i8 = -1;

/// Immutable spin configuration over the sites `0..len`.
///
/// A set bit is a `+1` spin and a cleared bit is a `-1` spin.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Configuration(BitVec);

impl Configuration {
    pub fn uniform(length: usize, spin: i8) -> Self {
        Self(BitVec::repeat(spin > 0, length))
    }

    pub fn from_spins(spins: &[i8]) -> Result<Self> {
        let mut bits = BitVec::with_capacity(spins.len());
        for (i, s) in spins.iter().enumerate() {
            match *s {
                UP => bits.push(true),
                DOWN => bits.push(false),
                other => {
                    return Err(IsingError::state(format!(
                        "spin {i} has value {other}, spins must be either 1 or -1"
                    )))
                }
            }
        }
        Ok(Self(bits))
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Spin at `index`, or `None` past the end. `config[index]` is the
    /// panicking form.
    #[inline(always)]
    pub fn get(&self, index: usize) -> Option<i8> {
        self.0.get(index).map(|b| if *b { UP } else { DOWN })
    }

    pub fn iter(&self) -> impl Iterator<Item = i8> + '_ {
        self.0.iter().map(|b| if *b { UP } else { DOWN })
    }

    pub fn to_vec(&self) -> Vec<i8> {
        self.iter().collect()
    }

    #[inline(always)]
    pub fn bits(&self) -> &BitSlice {
        &self.0
    }

    #[inline(always)]
    fn reverse_spin(&mut self, index: usize) {
        let new_spin = !self.0[index];
        self.0.set(index, new_spin);
    }
}

impl Index<usize> for Configuration {
    type Output = i8;

    fn index(&self, index: usize) -> &Self::Output {
        if self.0[index] {
            &UP
        } else {
            &DOWN
        }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter() {
            f.write_char(if *b { '+' } else { '-' })?;
        }
        Ok(())
    }
}

impl FromStr for Configuration {
    type Err = IsingError;

    /// Parses the `+`/`-` notation produced by `Display`.
    fn from_str(s: &str) -> Result<Self> {
        s.chars()
            .enumerate()
            .map(|(i, c)| match c {
                '+' => Ok(true),
                '-' => Ok(false),
                other => Err(IsingError::state(format!(
                    "site {i} is {other:?}, expected '+' or '-'"
                ))),
            })
            .collect::<Result<BitVec>>()
            .map(Self)
    }
}

/// Boundary policy of the open chain: sites outside `0..len` read as zero.
#[inline(always)]
pub fn neighbor_value(configuration: &Configuration, index: isize) -> i8 {
    usize::try_from(index)
        .ok()
        .and_then(|i| configuration.get(i))
        .unwrap_or(0)
}

/// Per-site external field. Sites without an entry have zero field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocalFields(BTreeMap<usize, f64>);

impl LocalFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dense(fields: &[f64]) -> Self {
        fields.iter().copied().enumerate().collect()
    }

    pub fn insert(&mut self, index: usize, field: f64) {
        self.0.insert(index, field);
    }

    #[inline(always)]
    pub fn get(&self, index: usize) -> f64 {
        self.0.get(&index).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.0.iter().map(|(i, h)| (*i, *h))
    }
}

impl FromIterator<(usize, f64)> for LocalFields {
    fn from_iter<T: IntoIterator<Item = (usize, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<&[f64]> for LocalFields {
    fn from(fields: &[f64]) -> Self {
        Self::from_dense(fields)
    }
}

impl From<Vec<f64>> for LocalFields {
    fn from(fields: Vec<f64>) -> Self {
        Self::from_dense(&fields)
    }
}

pub struct ChainBuilder {
    length: usize,
    coupling: f64,
    local_fields: LocalFields,
    initial: Option<Vec<i8>>,
}

impl ChainBuilder {
    pub fn coupling(mut self, coupling: f64) -> Self {
        self.coupling = coupling;
        self
    }

    pub fn local_fields(mut self, local_fields: impl Into<LocalFields>) -> Self {
        self.local_fields = local_fields.into();
        self
    }

    pub fn initial_configuration(mut self, spins: Vec<i8>) -> Self {
        self.initial = Some(spins);
        self
    }

    pub fn build(self) -> Result<SpinChain> {
        let Self { length, coupling, local_fields, initial } = self;

        if length == 0 {
            return Err(IsingError::argument("chain length must be positive"));
        }
        if !coupling.is_finite() {
            return Err(IsingError::argument(format!("coupling {coupling} is not finite")));
        }
        for (i, h) in local_fields.iter() {
            if i >= length {
                return Err(IsingError::argument(format!(
                    "local field at site {i} is outside a chain of length {length}"
                )));
            }
            if !h.is_finite() {
                return Err(IsingError::argument(format!("local field at site {i} is not finite")));
            }
        }

        let spins = match initial {
            None => Configuration::uniform(length, UP),
            Some(spins) => {
                if spins.len() != length {
                    return Err(IsingError::state(format!(
                        "initial configuration has {} spins, chain length is {length}",
                        spins.len()
                    )));
                }
                Configuration::from_spins(&spins)?
            }
        };

        Ok(SpinChain {
            coupling,
            local_fields,
            initial: spins.clone(),
            spins,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        })
    }
}

/// Open one-dimensional Ising chain with a bounded history of past states.
#[derive(Clone, Debug)]
pub struct SpinChain {
    coupling: f64,
    local_fields: LocalFields,
    spins: Configuration,
    initial: Configuration,
    history: VecDeque<Configuration>,
}

impl SpinChain {
    /// All-up chain with the default coupling and no field.
    pub fn new(length: usize) -> Result<Self> {
        Self::builder(length).build()
    }

    pub fn builder(length: usize) -> ChainBuilder {
        ChainBuilder {
            length,
            coupling: DEFAULT_COUPLING,
            local_fields: LocalFields::default(),
            initial: None,
        }
    }

    #[inline(always)]
    pub fn length(&self) -> usize {
        self.spins.len()
    }

    #[inline(always)]
    pub fn coupling(&self) -> f64 {
        self.coupling
    }

    #[inline(always)]
    pub fn local_field(&self, index: usize) -> f64 {
        self.local_fields.get(index)
    }

    pub fn local_fields(&self) -> &LocalFields {
        &self.local_fields
    }

    #[inline(always)]
    pub fn spin(&self, index: usize) -> i8 {
        self.spins[index]
    }

    /// Live configuration, borrowed.
    #[inline(always)]
    pub fn system_state(&self) -> &Configuration {
        &self.spins
    }

    /// Snapshot of the live configuration.
    pub fn current(&self) -> Configuration {
        self.spins.clone()
    }

    pub fn initial_configuration(&self) -> &Configuration {
        &self.initial
    }

    #[inline(always)]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Up to `count` most recent past snapshots, oldest first, followed by
    /// the current configuration.
    pub fn recent(&self, count: usize) -> Vec<Configuration> {
        let skip = self.history.len() - count.min(self.history.len());
        self.history
            .iter()
            .skip(skip)
            .cloned()
            .chain(std::iter::once(self.current()))
            .collect()
    }

    pub fn reset(&mut self) {
        tracing::trace!(length = self.length(), "resetting chain");
        self.spins = self.initial.clone();
        self.history.clear();
    }

    /// `J * Σ s_i s_{i+1} + Σ h_i s_i` over the open chain.
    pub fn energy(&self) -> f64 {
        let bonds: i64 = self
            .spins
            .iter()
            .zip(self.spins.iter().skip(1))
            .map(|(a, b)| (a * b) as i64)
            .sum();
        let field: f64 = self
            .local_fields
            .iter()
            .map(|(i, h)| h * self.spins[i] as f64)
            .sum();
        self.coupling * bonds as f64 + field
    }

    /// Spin excess: number of up spins minus number of down spins.
    pub fn magnetization(&self) -> i64 {
        let plus = self.spins.bits().count_ones() as i64;
        let minus = self.spins.bits().count_zeros() as i64;
        plus - minus
    }

    pub(crate) fn record(&mut self, snapshot: &Configuration) {
        self.history.push_back(snapshot.clone());
        if self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
    }

    #[inline(always)]
    pub(crate) fn reverse_spin(&mut self, index: usize) {
        self.spins.reverse_spin(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_chain_is_all_up() {
        for length in [1, 2, 7, 64, 65] {
            let chain = SpinChain::new(length).unwrap();
            let state = chain.current();
            assert_eq!(state.len(), length);
            assert!(state.iter().all(|s| s == 1));
            assert_eq!(chain.coupling(), DEFAULT_COUPLING);
            assert_eq!(chain.history_len(), 0);
        }
    }

    #[test]
    fn test_zero_length_is_rejected() {
        assert!(matches!(SpinChain::new(0), Err(IsingError::InvalidArgument(_))));
    }

    #[test]
    fn test_initial_configuration_with_bad_value_is_rejected() {
        let result = SpinChain::builder(3).initial_configuration(vec![1, 2, -1]).build();
        assert!(matches!(result, Err(IsingError::InvalidState(_))));

        let result = SpinChain::builder(3).initial_configuration(vec![1, 0, -1]).build();
        assert!(matches!(result, Err(IsingError::InvalidState(_))));
    }

    #[test]
    fn test_initial_configuration_must_cover_chain() {
        let result = SpinChain::builder(4).initial_configuration(vec![1, -1, 1]).build();
        assert!(matches!(result, Err(IsingError::InvalidState(_))));
    }

    #[test]
    fn test_uniform_initial_configuration_is_accepted() {
        let chain = SpinChain::builder(5).initial_configuration(vec![1; 5]).build().unwrap();
        assert_eq!(chain.current().to_vec(), vec![1; 5]);

        let chain = SpinChain::builder(3).initial_configuration(vec![-1; 3]).build().unwrap();
        assert_eq!(chain.current().to_vec(), vec![-1; 3]);
    }

    #[test]
    fn test_local_fields_default_to_zero() {
        let chain = SpinChain::builder(4)
            .local_fields([(1, 0.5), (3, -2.0)].into_iter().collect::<LocalFields>())
            .build()
            .unwrap();
        assert_eq!(chain.local_field(0), 0.0);
        assert_eq!(chain.local_field(1), 0.5);
        assert_eq!(chain.local_field(2), 0.0);
        assert_eq!(chain.local_field(3), -2.0);
    }

    #[test]
    fn test_local_fields_built_incrementally() {
        let mut fields = LocalFields::new();
        fields.insert(0, 0.25);
        fields.insert(2, -0.75);
        let chain = SpinChain::builder(3).local_fields(fields.clone()).build().unwrap();
        assert_eq!(chain.local_fields(), &fields);
        assert_eq!(chain.local_fields().iter().collect::<Vec<_>>(), vec![(0, 0.25), (2, -0.75)]);
        assert_eq!(chain.local_field(1), 0.0);
    }

    #[test]
    fn test_non_finite_parameters_are_rejected() {
        let result = SpinChain::builder(2).coupling(f64::NAN).build();
        assert!(matches!(result, Err(IsingError::InvalidArgument(_))));

        let result = SpinChain::builder(2).coupling(f64::NEG_INFINITY).build();
        assert!(matches!(result, Err(IsingError::InvalidArgument(_))));

        let result = SpinChain::builder(2).local_fields(vec![0.0, f64::INFINITY]).build();
        assert!(matches!(result, Err(IsingError::InvalidArgument(_))));

        let result = SpinChain::builder(2).local_fields(vec![f64::NAN]).build();
        assert!(matches!(result, Err(IsingError::InvalidArgument(_))));
    }

    #[test]
    fn test_local_field_outside_chain_is_rejected() {
        let result = SpinChain::builder(2).local_fields(vec![0.0, 1.0, 1.0]).build();
        assert!(matches!(result, Err(IsingError::InvalidArgument(_))));
    }

    #[test]
    fn test_neighbor_value_at_boundaries() {
        let state: Configuration = "+-+".parse().unwrap();
        assert_eq!(neighbor_value(&state, -1), 0);
        assert_eq!(neighbor_value(&state, 0), 1);
        assert_eq!(neighbor_value(&state, 1), -1);
        assert_eq!(neighbor_value(&state, 3), 0);
        assert_eq!(state.get(1), Some(-1));
        assert_eq!(state.get(3), None);
        assert_eq!(state[2], 1);
    }

    #[test]
    fn test_display_and_parse() {
        let state = Configuration::from_spins(&[1, -1, -1, 1]).unwrap();
        assert_eq!(state.to_string(), "+--+");
        assert_eq!("+--+".parse::<Configuration>().unwrap(), state);
        assert!(matches!("+x".parse::<Configuration>(), Err(IsingError::InvalidState(_))));
    }

    #[test]
    fn test_recent_returns_available_history() {
        let mut chain = SpinChain::new(3).unwrap();
        assert_eq!(chain.recent(10), vec![chain.current()]);
        assert_eq!(chain.recent(0), vec![chain.current()]);

        let first = chain.current();
        chain.record(&first);
        chain.reverse_spin(1);
        let second = chain.current();
        chain.record(&second);
        chain.reverse_spin(2);

        let recent = chain.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0], first);
        assert_eq!(recent[1], second);
        assert_eq!(recent[2].to_string(), "+--");

        let recent = chain.recent(1);
        assert_eq!(recent, vec![second, chain.current()]);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut chain = SpinChain::new(2).unwrap();
        for i in 0..HISTORY_CAPACITY + 5 {
            chain.reverse_spin(i % 2);
            let snapshot = chain.current();
            chain.record(&snapshot);
        }
        assert_eq!(chain.history_len(), HISTORY_CAPACITY);
        assert_eq!(chain.recent(usize::MAX).len(), HISTORY_CAPACITY + 1);
    }

    #[test]
    fn test_record_keeps_a_copy() {
        let mut chain = SpinChain::new(2).unwrap();
        let snapshot = chain.current();
        chain.record(&snapshot);
        chain.reverse_spin(0);
        assert_eq!(chain.recent(1)[0].to_string(), "++");
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut chain = SpinChain::builder(4)
            .coupling(0.5)
            .initial_configuration(vec![1, -1, 1, -1])
            .build()
            .unwrap();
        let snapshot = chain.current();
        chain.record(&snapshot);
        chain.reverse_spin(0);
        chain.reverse_spin(3);

        chain.reset();
        assert_eq!(chain.current().to_vec(), vec![1, -1, 1, -1]);
        assert_eq!(chain.history_len(), 0);
        assert_eq!(chain.coupling(), 0.5);
        assert_eq!(chain.length(), 4);
    }

    #[test]
    fn test_energy_and_magnetization() {
        let chain = SpinChain::new(4).unwrap();
        assert_relative_eq!(chain.energy(), -3.0);
        assert_eq!(chain.magnetization(), 4);

        let chain = SpinChain::builder(3)
            .coupling(1.0)
            .local_fields(vec![0.5, 0.0, -1.0])
            .initial_configuration(vec![1, -1, -1])
            .build()
            .unwrap();
        // bonds: (1)(-1) + (-1)(-1) = 0; field: 0.5 + 1.0
        assert_relative_eq!(chain.energy(), 1.5);
        assert_eq!(chain.magnetization(), -1);
    }
}
