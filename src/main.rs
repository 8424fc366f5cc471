//! pedaler-compile - compile and run a system description.
//!
//! # Usage
//!
//! ```bash
//! # Print the compiled routine
//! pedaler-compile system.ped --dump
//!
//! # Run 8 steps and print the outputs, one line per step
//! pedaler-compile system.ped --steps 8 --set gain=2
//!
//! # Stream raw f32 samples through the first input and output
//! ffmpeg -i input.wav -f f32le -ac 1 -ar 48000 - | pedaler-compile system.ped --stream | ffmpeg -f f32le -ac 1 -ar 48000 -i - output.wav
//! ```

use std::io;
use std::path::PathBuf;

use clap::Parser;
use pedaler_algebra::{
    compile::{DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE},
    dsl,
    error::{AlgebraError, Result},
    stream::process_stream,
    CompilerConfig, SystemDescription,
};
use tracing_subscriber::EnvFilter;

/// Symbolic circuit-equation compiler
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the system description file (.ped)
    #[arg(value_name = "SYSTEM_FILE")]
    system_file: PathBuf,

    /// Number of steps to run
    #[arg(short, long, default_value_t = 1)]
    steps: usize,

    /// Set a quantity before the first step (NAME=VALUE)
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    assignments: Vec<(String, f64)>,

    /// Print the compiled routine instead of running it
    #[arg(long)]
    dump: bool,

    /// Stream f32 LE samples from stdin to stdout
    #[arg(long, conflicts_with = "dump")]
    stream: bool,

    /// Bound on passes for each iteration block
    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,

    /// Convergence tolerance for iteration blocks
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    tolerance: f64,
}

fn parse_assignment(text: &str) -> std::result::Result<(String, f64), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", text))?;
    let value = dsl::parse_value(value).ok_or_else(|| format!("invalid value '{}'", value))?;
    Ok((name.trim().to_string(), value))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    // Parse and build the system
    let ast = dsl::parse_file(&args.system_file)?;
    let description = SystemDescription::from_ast(ast)?;

    let config = CompilerConfig::new()
        .with_max_iterations(args.max_iterations)
        .with_tolerance(args.tolerance);
    let mut simulator = description.simulate(config)?;

    if args.dump {
        print!("{}", simulator.routine());
        return Ok(());
    }

    for (name, value) in &args.assignments {
        if !simulator.set(name, *value) {
            return Err(AlgebraError::unresolved(name));
        }
    }

    if args.stream {
        process_stream(&mut simulator, io::stdin().lock(), io::stdout().lock())?;
        return Ok(());
    }

    for _ in 0..args.steps {
        simulator.step()?;
        let line: Vec<String> = simulator.outputs().iter().map(|v| v.to_string()).collect();
        println!("{}", line.join("\t"));
    }

    Ok(())
}
