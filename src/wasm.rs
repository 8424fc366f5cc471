//! WASM bindings for Pedaler Algebra.
//!
//! Compiles a system description in the browser and steps it from
//! JavaScript, for example inside an AudioWorklet.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { WasmRoutine } from 'pedaler_algebra';
//!
//! await init();
//!
//! const system = `
//!   .input in
//!   .output V_out(t)
//!   R1 in out 1k
//!   D1 out 0
//! `;
//!
//! const routine = new WasmRoutine(system);
//!
//! // In AudioWorkletProcessor.process():
//! routine.process_block(input, output);
//! ```

use wasm_bindgen::prelude::*;

use crate::compile::CompilerConfig;
use crate::description::{Simulator, SystemDescription};
use crate::error::AlgebraError;

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

fn to_js(err: AlgebraError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// A compiled system and its state.
#[wasm_bindgen]
pub struct WasmRoutine {
    simulator: Simulator,
}

#[wasm_bindgen]
impl WasmRoutine {
    /// Compile a description with the default configuration.
    #[wasm_bindgen(constructor)]
    pub fn new(description: &str) -> Result<WasmRoutine, JsValue> {
        Self::with_config(description, crate::compile::DEFAULT_MAX_ITERATIONS, crate::compile::DEFAULT_TOLERANCE)
    }

    /// Compile a description with custom iteration bounds.
    ///
    /// # Arguments
    /// * `description` - The system description text
    /// * `max_iterations` - Bound on passes for each iteration block (default: 50)
    /// * `tolerance` - Convergence tolerance (default: 1e-6)
    #[wasm_bindgen]
    pub fn with_config(
        description: &str,
        max_iterations: usize,
        tolerance: f64,
    ) -> Result<WasmRoutine, JsValue> {
        let description = SystemDescription::load(description).map_err(to_js)?;
        let config = CompilerConfig::new()
            .with_max_iterations(max_iterations)
            .with_tolerance(tolerance);
        let simulator = description.simulate(config).map_err(to_js)?;
        Ok(WasmRoutine { simulator })
    }

    /// Advance one sample and return every output.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<Vec<f64>, JsValue> {
        self.simulator.step().map_err(to_js)?;
        Ok(self.simulator.outputs())
    }

    /// Drive the first input with `input`, writing the first output into
    /// `output`. Samples that fail to compute are written as silence.
    #[wasm_bindgen]
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        if self.simulator.process_block(input, output).is_err() {
            output.fill(0.0);
        }
    }

    /// Overwrite a named quantity.
    #[wasm_bindgen]
    pub fn set(&mut self, name: &str, value: f64) -> Result<(), JsValue> {
        if self.simulator.set(name, value) {
            Ok(())
        } else {
            Err(to_js(AlgebraError::WasmError {
                message: format!("no quantity named '{}'", name),
            }))
        }
    }

    /// Read a named quantity, or `undefined`.
    #[wasm_bindgen]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.simulator.get(name)
    }

    /// Whether every iteration block converged on the last step.
    #[wasm_bindgen(getter)]
    pub fn converged(&self) -> bool {
        self.simulator.last_report().converged
    }
}

/// Get the library version.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
