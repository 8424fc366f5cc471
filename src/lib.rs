//! # Pedaler Algebra
//!
//! The symbolic core of a circuit-equation compiler.
//!
//! Devices describe themselves as symbolic equations; a solver turns them
//! into explicit formulas; a code generator lowers the formulas into one
//! flat routine that advances a state vector by one sample.
//!
//! ## Architecture
//!
//! - [`expr`] - Immutable expression trees with a canonical total order
//! - [`native`] - Bridge for wrapping Rust functions as symbolic functions
//! - [`substitute`] - Substitution maps, in evaluate and transform modes
//! - [`system`] - Constraint gathering and explicit solving
//! - [`components`] - Symbolic device models (resistor, diode, delay)
//! - [`compile`] - Scopes, lowering with CSE, and the compiled [`Routine`]
//! - [`dsl`] - Parser for the system description language
//! - [`description`] - Building, compiling and driving described systems
//! - [`stream`] - Raw sample streaming (CLI only)
//!
//! ## Usage
//!
//! ```no_run
//! use pedaler_algebra::{CompilerConfig, SystemDescription};
//!
//! let desc = SystemDescription::load(
//!     ".input in\n.output V_out(t)\nR1 in out 1k\nR2 out 0 1k\n",
//! )?;
//! let mut sim = desc.simulate(CompilerConfig::default())?;
//! sim.set_input(0, 1.0);
//! sim.step()?;
//! assert_eq!(sim.outputs(), vec![0.5]);
//! # Ok::<(), pedaler_algebra::AlgebraError>(())
//! ```
//!
//! ### Native CLI
//!
//! ```bash
//! ffmpeg -i input.wav -f f32le -ac 1 -ar 48000 - | pedaler-compile clipper.ped --stream | ffmpeg -f f32le -ac 1 -ar 48000 -i - output.wav
//! ```
//!
//! ## Compilation Method
//!
//! For each step the routine:
//!
//! 1. Evaluates every formula in dependency order, sharing repeated
//!    subexpressions through registers
//! 2. Runs bounded fixed-point iteration for groups of mutually dependent
//!    unknowns (damped Newton updates for nonlinear devices)
//! 3. Copies each current quantity into its one-sample history slot

pub mod compile;
pub mod components;
pub mod description;
pub mod dsl;
pub mod error;
pub mod expr;
pub mod native;
pub mod substitute;
pub mod system;

#[cfg(feature = "cli")]
pub mod stream;

// Re-export main types for convenience
pub use compile::{Compiler, CompilerConfig, Routine, StateLayout, StepReport};
pub use description::{Simulator, SystemDescription};
pub use error::{AlgebraError, Result};
pub use expr::Expr;
pub use native::NativeFunction;
pub use system::SolvedSystem;

// WASM bindings
#[cfg(feature = "wasm")]
mod wasm;

#[cfg(feature = "wasm")]
pub use wasm::WasmRoutine;

/// Thermal voltage at room temperature (approximately 26mV)
pub const THERMAL_VOLTAGE: f64 = 0.0258;
