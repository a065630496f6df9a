//! Headless driver: advances a chain tick by tick and hands each frame to
//! whatever is displaying it.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use crate::annealing::Plan;
use crate::chain::{Configuration, SpinChain};
use crate::correlation;
use crate::error::{IsingError, Result};
use crate::metropolis::{check_sweeps, check_temperature, update, FlipSet, UpdateRule};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Simulation(#[from] IsingError),

    #[error("failed to present frame: {0}")]
    Sink(#[from] std::io::Error),
}

/// What the display layer needs after each tick.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub tick: u64,
    pub temperature: f64,
    pub configuration: Configuration,
    pub correlation: Vec<f64>,
    /// Sites changed since the previous frame.
    pub flipped: FlipSet,
    pub energy: f64,
    pub magnetization: i64,
}

pub trait FrameSink {
    fn present(&mut self, frame: &Frame) -> std::io::Result<()>;
}

/// Temperature to simulate at for a given tick, e.g. a slider position.
pub trait TemperatureSource {
    fn temperature(&mut self, tick: u64) -> f64;
}

impl TemperatureSource for f64 {
    fn temperature(&mut self, _tick: u64) -> f64 {
        *self
    }
}

/// Temperature computed from the tick number.
pub struct FromFn<F>(pub F);

impl<F: FnMut(u64) -> f64> TemperatureSource for FromFn<F> {
    fn temperature(&mut self, tick: u64) -> f64 {
        (self.0)(tick)
    }
}

/// Writes one line per frame: tick, temperature, energy, spin excess and
/// the chain as `+`/`-`.
pub struct TextSink<W> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FrameSink for TextSink<W> {
    fn present(&mut self, frame: &Frame) -> std::io::Result<()> {
        writeln!(
            self.out,
            "{:>6} T={:<5.2} E={:>9.3} M={:>+5} {}",
            frame.tick, frame.temperature, frame.energy, frame.magnetization, frame.configuration
        )
    }
}

pub struct Simulation<U> {
    chain: SpinChain,
    rule: U,
    num_past_states: usize,
    coarse: i64,
    tick: u64,
}

impl<U: UpdateRule> Simulation<U> {
    /// `num_past_states` snapshots (the current one included) feed the
    /// correlation profile; `coarse` sweeps are run per tick.
    pub fn new(chain: SpinChain, rule: U, num_past_states: usize, coarse: i64) -> Result<Self> {
        check_sweeps(coarse)?;
        Ok(Self { chain, rule, num_past_states, coarse, tick: 0 })
    }

    pub fn chain(&self) -> &SpinChain {
        &self.chain
    }

    pub fn into_chain(self) -> SpinChain {
        self.chain
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn reset(&mut self) {
        self.chain.reset();
        self.tick = 0;
    }

    /// Frame of the present state without advancing.
    pub fn frame(&self, temperature: f64, flipped: FlipSet) -> Result<Frame> {
        let history = self.chain.recent(self.num_past_states.saturating_sub(1));
        Ok(Frame {
            tick: self.tick,
            temperature,
            configuration: self.chain.current(),
            correlation: correlation::compute(&history)?,
            flipped,
            energy: self.chain.energy(),
            magnetization: self.chain.magnetization(),
        })
    }

    pub fn tick(&mut self, temperature: f64) -> Result<Frame> {
        self.advance(temperature, self.coarse)
    }

    fn advance(&mut self, temperature: f64, sweeps: i64) -> Result<Frame> {
        let flipped = update(&mut self.chain, temperature, sweeps, &mut self.rule)?;
        self.tick += 1;
        self.frame(temperature, flipped)
    }

    /// Presents the starting frame, then up to `ticks` more, stopping early
    /// once `stop` is raised. Returns the number of ticks run.
    pub fn run(
        &mut self,
        source: &mut impl TemperatureSource,
        sink: &mut impl FrameSink,
        ticks: u64,
        stop: &AtomicBool,
    ) -> std::result::Result<u64, RunError> {
        let start = self.tick;
        let temperature = source.temperature(self.tick);
        sink.present(&self.frame(temperature, FlipSet::empty(self.chain.length()))?)?;

        for _ in 0..ticks {
            if stop.load(Ordering::Relaxed) {
                tracing::info!(tick = self.tick, "stop requested");
                break;
            }
            let temperature = source.temperature(self.tick);
            let frame = self.tick(temperature)?;
            sink.present(&frame)?;
        }
        Ok(self.tick - start)
    }

    /// Runs every stage of `plan`, presenting a frame after each block of at
    /// most `coarse` sweeps.
    pub fn run_plan(
        &mut self,
        plan: &Plan,
        sink: &mut impl FrameSink,
        stop: &AtomicBool,
    ) -> std::result::Result<u64, RunError> {
        for (temperature, sweeps) in plan.iter() {
            check_sweeps(*sweeps)?;
            check_temperature(*temperature)?;
        }

        let start = self.tick;
        let first = plan.first().map_or(0.0, |(t, _)| *t);
        sink.present(&self.frame(first, FlipSet::empty(self.chain.length()))?)?;

        let block = self.coarse.max(1);
        'stages: for (stage, (temperature, sweeps)) in plan.iter().copied().enumerate() {
            tracing::debug!(stage, temperature, sweeps, "annealing stage");
            let mut remaining = sweeps;
            while remaining > 0 {
                if stop.load(Ordering::Relaxed) {
                    tracing::info!(tick = self.tick, stage, "stop requested");
                    break 'stages;
                }
                let n = remaining.min(block);
                let frame = self.advance(temperature, n)?;
                sink.present(&frame)?;
                remaining -= n;
            }
        }
        Ok(self.tick - start)
    }
}
