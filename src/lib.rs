//! Metropolis Monte Carlo simulation of the open one-dimensional Ising chain.
//!
//! A [`SpinChain`] holds the spins, couplings and a bounded history of past
//! configurations. [`metropolis::update`] advances it at a temperature and
//! reports which sites changed, and [`correlation::compute`] turns a window of
//! history into the spin-0 correlation profile.

pub mod annealing;
pub mod chain;
pub mod correlation;
pub mod error;
pub mod metropolis;
pub mod runner;

pub use annealing::Plan;
pub use chain::{neighbor_value, ChainBuilder, Configuration, LocalFields, SpinChain, HISTORY_CAPACITY};
pub use error::{IsingError, Result};
pub use metropolis::{schedule, sweep, update, FlipSet, Metropolis, UpdateRule};
pub use runner::{Frame, FrameSink, Simulation, TemperatureSource, TextSink};
