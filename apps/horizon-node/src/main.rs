//! horizon MPC node CLI.
//!
//! Provides three modes of operation:
//! - `serve`: Start a TCP MPC node for a remote control loop
//! - `demo`: Run a closed-loop double integrator in-process and print the
//!   tracking error
//! - `info`: Print workspace crate versions and the default configuration

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use horizon_comm::ChannelPublisher;
use horizon_core::{NodeConfig, Observation, TargetTrajectories};
use horizon_ddp::{DdpSolver, LinearQuadraticModel, OcpModel};
use horizon_mpc::{DdpMpc, MpcNode, PolicyPipeline};
use horizon_precond::WorkerPool;
use nalgebra::DVector;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn Error + Send + Sync>;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Real-time receding-horizon control node.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a TCP MPC node for a remote control loop.
    Serve {
        /// TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address to bind, overriding the configuration.
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Run a closed-loop double integrator and print the tracking error.
    Demo {
        /// Number of control steps.
        #[arg(short = 'n', long, default_value_t = 200)]
        steps: u32,

        /// Control period in seconds.
        #[arg(long, default_value_t = 0.01)]
        dt: f64,

        /// Target position.
        #[arg(short, long, default_value_t = 1.0)]
        target: f64,

        /// TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print crate information.
    Info,
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<NodeConfig, BoxError> {
    let config = match path {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn build_mpc(config: &NodeConfig) -> Result<DdpMpc<LinearQuadraticModel>, BoxError> {
    let mut solver = DdpSolver::new(
        LinearQuadraticModel::double_integrator(),
        config.ddp.clone(),
        &config.mpc,
    )?;
    if config.ddp.compute_scaling {
        solver = solver.with_worker_pool(WorkerPool::new(config.parallel.num_threads)?);
    }
    Ok(DdpMpc::new(solver, &config.mpc))
}

// ---------------------------------------------------------------------------
// Mode implementations
// ---------------------------------------------------------------------------

fn run_serve(config_path: Option<&Path>, address: Option<String>) -> Result<(), BoxError> {
    let mut config = load_config(config_path)?;
    if let Some(address) = address {
        config.address = address;
    }
    let mut mpc = build_mpc(&config)?;

    let node = MpcNode::bind(&config.address, config.pipeline.clone())?;
    let addr = node.local_addr()?;
    info!(%addr, horizon = config.mpc.time_horizon, "horizon node listening");

    loop {
        info!("Waiting for client");
        match node.serve_one(&mut mpc) {
            Ok(()) => info!("Client session ended"),
            Err(e) => warn!("Client session failed: {e}"),
        }
    }
}

fn run_demo(steps: u32, dt: f64, goal: f64, config_path: Option<&Path>) -> Result<(), BoxError> {
    let config = load_config(config_path)?;
    let mut mpc = build_mpc(&config)?;
    let plant = LinearQuadraticModel::double_integrator();
    let (publisher, policies) = ChannelPublisher::channel();

    let mut pipeline = PolicyPipeline::new(&mut mpc, config.pipeline.clone());
    pipeline.launch(publisher)?;
    let target = TargetTrajectories::constant(
        0.0,
        DVector::from_vec(vec![goal, 0.0]),
        DVector::zeros(plant.input_dim()),
    );
    pipeline.handle().update_target(target)?;

    let mut x = DVector::zeros(plant.state_dim());
    let report_every = (steps / 10).max(1);
    for k in 0..steps {
        let t = f64::from(k) * dt;
        let observation = Observation::new(t, x.clone(), DVector::zeros(plant.input_dim()));
        pipeline.on_observation(&observation)?;
        let policy = pipeline
            .current_policy()
            .ok_or("no policy after a successful solve")?;
        let u = policy
            .solution
            .controller
            .compute_input(t, &x)
            .ok_or("policy has an empty control law")?;
        x = plant.step(t, &x, &u, dt);
        if k % report_every == 0 {
            println!(
                "t={t:6.3}  position={:8.4}  velocity={:8.4}  error={:8.4}",
                x[0],
                x[1],
                goal - x[0]
            );
        }
    }
    let solves = pipeline.timer().num_intervals();
    let average_ms = pipeline.timer().average().as_secs_f64() * 1e3;
    pipeline.shutdown();

    let published = policies.try_iter().count();
    println!();
    println!("final position error: {:.4}", goal - x[0]);
    println!("solves={solves}, published={published}, average solve={average_ms:.3} ms");
    Ok(())
}

fn run_info() -> Result<(), BoxError> {
    println!("horizon v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("crates:");
    println!("  horizon-core     {}", env!("CARGO_PKG_VERSION"));
    println!("  horizon-precond  {}", env!("CARGO_PKG_VERSION"));
    println!("  horizon-ddp      {}", env!("CARGO_PKG_VERSION"));
    println!("  horizon-comm     {}", env!("CARGO_PKG_VERSION"));
    println!("  horizon-mpc      {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("edition: 2024");
    println!();
    println!("default configuration:");
    println!("{}", toml::to_string_pretty(&NodeConfig::default())?);
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Serve { config, address }) => run_serve(config.as_deref(), address),
        Some(Commands::Demo {
            steps,
            dt,
            target,
            config,
        }) => run_demo(steps, dt, target, config.as_deref()),
        Some(Commands::Info) => run_info(),
        None => run_demo(200, 0.01, 1.0, None),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
