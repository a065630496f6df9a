use anyhow::{anyhow, Context};
use ising_chain::runner::TextSink;
use ising_chain::{Configuration, FlipSet, Metropolis, Plan, Simulation, SpinChain};
use plotters::prelude::*;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, StructOpt)]
#[structopt(name = "ising-chain", about = "Metropolis simulation of the one-dimensional Ising chain")]
struct Args {
    /// number of spins in the chain
    length: usize,
    /// coupling J, negative favours aligned neighbours
    #[structopt(short = "J", long, default_value = "-1", allow_hyphen_values = true)]
    coupling: f64,
    /// number of recent states averaged into the correlation profile
    #[structopt(long, default_value = "100")]
    num_past_states: usize,
    /// sweeps between two displayed frames
    #[structopt(long, default_value = "5")]
    coarse: i64,
    #[structopt(short, long, default_value = "1.0")]
    temperature: f64,
    /// number of frames to run at --temperature
    #[structopt(long, default_value = "100")]
    ticks: u64,
    /// cooling plan "T:sweeps,T:sweeps,...", replaces --temperature and --ticks
    #[structopt(long)]
    schedule: Option<Plan>,
    /// seed for the random generator, drawn from the OS when absent
    #[structopt(long)]
    seed: Option<u64>,
    /// initial spins written as '+' and '-', all up when absent
    #[structopt(long)]
    initial: Option<Configuration>,
    /// comma separated local field per site
    #[structopt(long, use_delimiter = true, allow_hyphen_values = true)]
    fields: Vec<f64>,
    /// png file for the final correlation profile
    #[structopt(long, parse(from_os_str))]
    plot: Option<PathBuf>,
    /// tracing filter used when RUST_LOG is unset
    #[structopt(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::from_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut builder = SpinChain::builder(args.length).coupling(args.coupling);
    if !args.fields.is_empty() {
        builder = builder.local_fields(args.fields.clone());
    }
    if let Some(initial) = &args.initial {
        builder = builder.initial_configuration(initial.to_vec());
    }
    let chain = builder.build().context("building spin chain")?;

    let rule = match args.seed {
        Some(seed) => Metropolis::seeded(seed),
        None => Metropolis::from_entropy(),
    };

    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
        .context("installing Ctrl-C handler")?;

    tracing::info!(
        length = chain.length(),
        coupling = chain.coupling(),
        num_past_states = args.num_past_states,
        coarse = args.coarse,
        "starting simulation"
    );

    let mut sim = Simulation::new(chain, rule, args.num_past_states, args.coarse)?;
    let mut sink = TextSink::new(BufWriter::new(std::io::stdout().lock()));

    let (ticks, final_temperature) = {
        measure_time::print_time!("simulation");
        match &args.schedule {
            Some(plan) => {
                tracing::info!(%plan, sweeps = plan.total_sweeps(), "running cooling plan");
                let ticks = sim.run_plan(plan, &mut sink, &stop)?;
                (ticks, plan.last().map_or(args.temperature, |(t, _)| *t))
            }
            None => {
                let mut temperature = args.temperature;
                let ticks = sim.run(&mut temperature, &mut sink, args.ticks, &stop)?;
                (ticks, args.temperature)
            }
        }
    };
    sink.into_inner().flush().context("flushing output")?;

    let frame = sim.frame(final_temperature, FlipSet::empty(sim.chain().length()))?;
    tracing::info!(
        ticks,
        energy = frame.energy,
        magnetization = frame.magnetization,
        "simulation finished"
    );

    if let Some(path) = &args.plot {
        draw_correlation(path, &frame.correlation, final_temperature, sim.chain().coupling())?;
        tracing::info!(path = %path.display(), "correlation chart written");
    }

    Ok(())
}

fn draw_correlation(path: &Path, correlation: &[f64], temperature: f64, coupling: f64) -> anyhow::Result<()> {
    let plot_err = |e| anyhow!("drawing {}: {:?}", path.display(), e);

    let root_drawing_area = BitMapBackend::new(path, (1024, 768)).into_drawing_area();
    root_drawing_area.fill(&WHITE).map_err(plot_err)?;

    let mut ctx = ChartBuilder::on(&root_drawing_area)
        .caption(format!("Spin correlation, T = {temperature}, J = {coupling}"), ("sans-serif", 30))
        .set_label_area_size(LabelAreaPosition::Left, 50)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(0..correlation.len(), -1.05f64..1.05f64)
        .map_err(plot_err)?;

    ctx.configure_mesh()
        .y_desc("correlation")
        .x_desc("distance")
        .axis_desc_style(("sans-serif", 20))
        .draw()
        .map_err(plot_err)?;

    ctx.draw_series(LineSeries::new(correlation.iter().copied().enumerate(), &BLUE))
        .map_err(plot_err)?;

    ctx.draw_series(
        correlation
            .iter()
            .copied()
            .enumerate()
            .map(|p| Circle::new(p, 3, BLUE.filled())),
    )
    .map_err(plot_err)?;

    root_drawing_area.present().map_err(plot_err)?;
    Ok(())
}
