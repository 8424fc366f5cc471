//! Sample-by-sample driver for a compiled description.

use crate::compile::{Routine, StepReport};
use crate::error::Result;
use crate::expr::Expr;

use super::SystemDescription;

/// A compiled routine together with its state vector.
pub struct Simulator {
    routine: Routine,
    state: Vec<f64>,
    /// State slots of the driven quantities
    inputs: Vec<usize>,
    outputs: Vec<Expr>,
    last: StepReport,
}

impl Simulator {
    /// Wrap a routine compiled from `description`.
    pub fn new(description: &SystemDescription, routine: Routine) -> Self {
        let layout = routine.layout();
        let mut state = layout.zeroed();
        // Slots allocated during compilation come after the description's own
        let n = description.initial.len().min(state.len());
        state[..n].copy_from_slice(&description.initial[..n]);

        let inputs = description
            .inputs
            .iter()
            .filter_map(|q| layout.index_of(q))
            .collect();

        Self {
            routine,
            state,
            inputs,
            outputs: description.outputs.clone(),
            last: StepReport::default(),
        }
    }

    /// Drive the `index`th input. Out-of-range indices are ignored.
    pub fn set_input(&mut self, index: usize, value: f64) {
        if let Some(&slot) = self.inputs.get(index) {
            self.state[slot] = value;
        }
    }

    /// Overwrite the quantity named `name`. False if there is no such slot.
    pub fn set(&mut self, name: &str, value: f64) -> bool {
        match self.routine.layout().index_of_name(name) {
            Some(slot) => {
                self.state[slot] = value;
                true
            }
            None => false,
        }
    }

    /// Read the quantity named `name`.
    pub fn get(&self, name: &str) -> Option<f64> {
        let slot = self.routine.layout().index_of_name(name)?;
        Some(self.state[slot])
    }

    /// Step the system by one sample.
    pub fn step(&mut self) -> Result<StepReport> {
        self.last = self.routine.run(&mut self.state)?;
        Ok(self.last)
    }

    /// Value of the `index`th output, if it can be computed from the state.
    pub fn output(&self, index: usize) -> Option<f64> {
        let layout = self.routine.layout();
        let state = &self.state;
        self.outputs
            .get(index)?
            .numeric(&|q: &Expr| layout.index_of(q).map(|slot| state[slot]))
    }

    /// All outputs, with `NaN` for any that cannot be computed.
    pub fn outputs(&self) -> Vec<f64> {
        (0..self.outputs.len())
            .map(|i| self.output(i).unwrap_or(f64::NAN))
            .collect()
    }

    /// Drive the first input with `input` and collect the first output,
    /// one sample at a time.
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
        for (sample, out) in input.iter().zip(output.iter_mut()) {
            self.set_input(0, *sample as f64);
            self.step()?;
            *out = self.output(0).unwrap_or(0.0) as f32;
        }
        Ok(())
    }

    /// The report of the most recent step.
    pub fn last_report(&self) -> StepReport {
        self.last
    }

    pub fn state(&self) -> &[f64] {
        &self.state
    }

    pub fn routine(&self) -> &Routine {
        &self.routine
    }
}
