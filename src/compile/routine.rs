//! Compiled routines.
//!
//! A routine is a flat list of register operations over the caller's state
//! vector and a private scratch file. Running it once advances the system
//! by one sample.

use std::fmt;

use smallvec::SmallVec;
use tracing::{trace, warn};

use super::StateLayout;
use crate::error::{AlgebraError, Result};
use crate::expr::BinaryOp;
use crate::native::Kernel;

/// Where a value lives while the routine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    /// Index into the caller's state vector
    State(usize),
    /// Index into the routine's scratch registers
    Temp(usize),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::State(i) => write!(f, "s{}", i),
            Slot::Temp(i) => write!(f, "r{}", i),
        }
    }
}

/// A bounded fixed-point iteration.
#[derive(Clone)]
pub struct IterateBlock {
    /// Evaluates every update formula of the group
    pub body: Vec<Op>,
    /// `(state index, slot holding its next value)`
    pub updates: Vec<(usize, Slot)>,
    pub max_iterations: usize,
    pub tolerance: f64,
}

/// One register operation.
#[derive(Clone)]
pub enum Op {
    Const { dst: Slot, value: f64 },
    Add { dst: Slot, lhs: Slot, rhs: Slot },
    Sub { dst: Slot, lhs: Slot, rhs: Slot },
    Mul { dst: Slot, lhs: Slot, rhs: Slot },
    Div { dst: Slot, lhs: Slot, rhs: Slot },
    Neg { dst: Slot, src: Slot },
    Recip { dst: Slot, src: Slot },
    Powi { dst: Slot, base: Slot, exp: i32 },
    Powf { dst: Slot, base: Slot, exp: Slot },
    /// `1.0` when the comparison holds, else `0.0`
    Compare { dst: Slot, op: BinaryOp, lhs: Slot, rhs: Slot },
    Not { dst: Slot, src: Slot },
    Call {
        dst: Slot,
        name: String,
        kernel: Kernel,
        args: SmallVec<[Slot; 4]>,
    },
    Store { dst: Slot, src: Slot },
    Iterate(Box<IterateBlock>),
}

/// What happened during one [`Routine::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepReport {
    /// Passes taken by iteration blocks, summed
    pub iterations: usize,
    /// False if any iteration block hit its bound first
    pub converged: bool,
}

/// A compiled update routine for one system.
#[derive(Clone)]
pub struct Routine {
    ops: Vec<Op>,
    registers: Vec<f64>,
    layout: StateLayout,
}

impl Routine {
    pub(crate) fn new(ops: Vec<Op>, registers: usize, layout: StateLayout) -> Self {
        Self {
            ops,
            registers: vec![0.0; registers],
            layout,
        }
    }

    /// The state layout this routine was compiled against. It may have
    /// grown during compilation if free symbols were allocated.
    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    /// Advance `state` by one sample.
    pub fn run(&mut self, state: &mut [f64]) -> Result<StepReport> {
        if state.len() != self.layout.len() {
            return Err(AlgebraError::StateSize {
                expected: self.layout.len(),
                actual: state.len(),
            });
        }
        let mut report = StepReport {
            iterations: 0,
            converged: true,
        };
        let Self { ops, registers, .. } = self;
        let mut frame = Frame { state, registers };
        frame.exec(ops, &mut report);
        Ok(report)
    }
}

struct Frame<'a> {
    state: &'a mut [f64],
    registers: &'a mut [f64],
}

impl Frame<'_> {
    #[inline]
    fn get(&self, slot: Slot) -> f64 {
        match slot {
            Slot::State(i) => self.state[i],
            Slot::Temp(i) => self.registers[i],
        }
    }

    #[inline]
    fn set(&mut self, slot: Slot, value: f64) {
        match slot {
            Slot::State(i) => self.state[i] = value,
            Slot::Temp(i) => self.registers[i] = value,
        }
    }

    fn exec(&mut self, ops: &[Op], report: &mut StepReport) {
        for op in ops {
            match op {
                Op::Const { dst, value } => self.set(*dst, *value),
                Op::Add { dst, lhs, rhs } => self.set(*dst, self.get(*lhs) + self.get(*rhs)),
                Op::Sub { dst, lhs, rhs } => self.set(*dst, self.get(*lhs) - self.get(*rhs)),
                Op::Mul { dst, lhs, rhs } => self.set(*dst, self.get(*lhs) * self.get(*rhs)),
                Op::Div { dst, lhs, rhs } => self.set(*dst, self.get(*lhs) / self.get(*rhs)),
                Op::Neg { dst, src } => self.set(*dst, -self.get(*src)),
                Op::Recip { dst, src } => self.set(*dst, 1.0 / self.get(*src)),
                Op::Powi { dst, base, exp } => self.set(*dst, self.get(*base).powi(*exp)),
                Op::Powf { dst, base, exp } => {
                    self.set(*dst, self.get(*base).powf(self.get(*exp)))
                }
                Op::Compare { dst, op, lhs, rhs } => {
                    let holds = op.apply(self.get(*lhs), self.get(*rhs));
                    self.set(*dst, if holds { 1.0 } else { 0.0 })
                }
                Op::Not { dst, src } => {
                    let value = if self.get(*src) == 0.0 { 1.0 } else { 0.0 };
                    self.set(*dst, value)
                }
                Op::Call {
                    dst, kernel, args, ..
                } => {
                    let values: SmallVec<[f64; 4]> = args.iter().map(|s| self.get(*s)).collect();
                    self.set(*dst, (**kernel)(&values))
                }
                Op::Store { dst, src } => self.set(*dst, self.get(*src)),
                Op::Iterate(block) => self.iterate(block, report),
            }
        }
    }

    fn iterate(&mut self, block: &IterateBlock, report: &mut StepReport) {
        let mut next: SmallVec<[f64; 8]> = SmallVec::with_capacity(block.updates.len());
        for pass in 1..=block.max_iterations {
            self.exec(&block.body, report);

            next.clear();
            next.extend(block.updates.iter().map(|(_, slot)| self.get(*slot)));

            let mut delta: f64 = 0.0;
            for ((index, _), value) in block.updates.iter().zip(&next) {
                let change = (value - self.state[*index]).abs();
                // A non-finite estimate never counts as settled.
                delta = if change.is_finite() { delta.max(change) } else { f64::INFINITY };
                self.state[*index] = *value;
            }

            report.iterations += 1;
            trace!(pass, delta, "iteration pass");
            if delta < block.tolerance {
                return;
            }
        }
        report.converged = false;
        warn!(
            max_iterations = block.max_iterations,
            "iteration did not converge, keeping last estimate"
        );
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Const { dst, value } => write!(f, "{} = {}", dst, value),
            Op::Add { dst, lhs, rhs } => write!(f, "{} = {} + {}", dst, lhs, rhs),
            Op::Sub { dst, lhs, rhs } => write!(f, "{} = {} - {}", dst, lhs, rhs),
            Op::Mul { dst, lhs, rhs } => write!(f, "{} = {} * {}", dst, lhs, rhs),
            Op::Div { dst, lhs, rhs } => write!(f, "{} = {} / {}", dst, lhs, rhs),
            Op::Neg { dst, src } => write!(f, "{} = -{}", dst, src),
            Op::Recip { dst, src } => write!(f, "{} = 1 / {}", dst, src),
            Op::Powi { dst, base, exp } => write!(f, "{} = {}^{}", dst, base, exp),
            Op::Powf { dst, base, exp } => write!(f, "{} = {}^{}", dst, base, exp),
            Op::Compare { dst, op, lhs, rhs } => {
                write!(f, "{} = {} {} {}", dst, lhs, op.symbol(), rhs)
            }
            Op::Not { dst, src } => write!(f, "{} = !{}", dst, src),
            Op::Call {
                dst, name, args, ..
            } => {
                write!(f, "{} = {}(", dst, name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Op::Store { dst, src } => write!(f, "{} <- {}", dst, src),
            Op::Iterate(block) => {
                writeln!(
                    f,
                    "iterate (max {}, tol {:e}) {{",
                    block.max_iterations, block.tolerance
                )?;
                for op in &block.body {
                    writeln!(f, "    {}", op)?;
                }
                for (index, slot) in &block.updates {
                    writeln!(f, "    s{} := {}", index, slot)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, quantity) in self.layout.iter().enumerate() {
            writeln!(f, "; s{} = {}", i, quantity)?;
        }
        for op in &self.ops {
            writeln!(f, "{}", op)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routine")
            .field("ops", &self.ops.len())
            .field("registers", &self.registers.len())
            .field("state", &self.layout.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use std::sync::Arc;

    fn layout(n: usize) -> StateLayout {
        (0..n).map(|i| Expr::var(format!("q{}", i))).collect()
    }

    #[test]
    fn test_run_arithmetic() {
        // s1 = (s0 + 2) * s0
        let ops = vec![
            Op::Const {
                dst: Slot::Temp(0),
                value: 2.0,
            },
            Op::Add {
                dst: Slot::Temp(1),
                lhs: Slot::State(0),
                rhs: Slot::Temp(0),
            },
            Op::Mul {
                dst: Slot::State(1),
                lhs: Slot::Temp(1),
                rhs: Slot::State(0),
            },
        ];
        let mut routine = Routine::new(ops, 2, layout(2));
        let mut state = [3.0, 0.0];
        let report = routine.run(&mut state).unwrap();
        assert_eq!(state[1], 15.0);
        assert!(report.converged);
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn test_state_size_mismatch() {
        let mut routine = Routine::new(Vec::new(), 0, layout(2));
        let err = routine.run(&mut [0.0; 3]).unwrap_err();
        assert!(matches!(
            err,
            AlgebraError::StateSize {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_iterate_converges() {
        // x <- (x + 2/x) / 2 converges to sqrt(2)
        let x = Slot::State(0);
        let body = vec![
            Op::Const {
                dst: Slot::Temp(0),
                value: 2.0,
            },
            Op::Div {
                dst: Slot::Temp(1),
                lhs: Slot::Temp(0),
                rhs: x,
            },
            Op::Add {
                dst: Slot::Temp(2),
                lhs: x,
                rhs: Slot::Temp(1),
            },
            Op::Div {
                dst: Slot::Temp(3),
                lhs: Slot::Temp(2),
                rhs: Slot::Temp(0),
            },
        ];
        let block = IterateBlock {
            body,
            updates: vec![(0, Slot::Temp(3))],
            max_iterations: 50,
            tolerance: 1e-12,
        };
        let mut routine = Routine::new(vec![Op::Iterate(Box::new(block))], 4, layout(1));
        let mut state = [1.0];
        let report = routine.run(&mut state).unwrap();
        approx::assert_relative_eq!(state[0], 2f64.sqrt(), epsilon = 1e-12);
        assert!(report.converged);
        assert!(report.iterations > 1 && report.iterations < 50);
    }

    #[test]
    fn test_iterate_bound() {
        // x <- x + 1 never settles
        let block = IterateBlock {
            body: vec![
                Op::Const {
                    dst: Slot::Temp(0),
                    value: 1.0,
                },
                Op::Add {
                    dst: Slot::Temp(1),
                    lhs: Slot::State(0),
                    rhs: Slot::Temp(0),
                },
            ],
            updates: vec![(0, Slot::Temp(1))],
            max_iterations: 5,
            tolerance: 1e-9,
        };
        let mut routine = Routine::new(vec![Op::Iterate(Box::new(block))], 2, layout(1));
        let mut state = [0.0];
        let report = routine.run(&mut state).unwrap();
        assert_eq!(state[0], 5.0);
        assert_eq!(report.iterations, 5);
        assert!(!report.converged);
    }

    #[test]
    fn test_iterate_non_finite_is_not_converged() {
        // x <- sqrt(x - 10) leaves the domain on the first pass
        let sqrt: Kernel = Arc::new(|args: &[f64]| args[0].sqrt());
        let block = IterateBlock {
            body: vec![
                Op::Const {
                    dst: Slot::Temp(0),
                    value: 10.0,
                },
                Op::Sub {
                    dst: Slot::Temp(1),
                    lhs: Slot::State(0),
                    rhs: Slot::Temp(0),
                },
                Op::Call {
                    dst: Slot::Temp(2),
                    name: "sqrt".into(),
                    kernel: sqrt,
                    args: SmallVec::from_slice(&[Slot::Temp(1)]),
                },
            ],
            updates: vec![(0, Slot::Temp(2))],
            max_iterations: 5,
            tolerance: 1e-9,
        };
        let mut routine = Routine::new(vec![Op::Iterate(Box::new(block))], 3, layout(1));
        let mut state = [1.0];
        let report = routine.run(&mut state).unwrap();
        assert!(state[0].is_nan());
        assert_eq!(report.iterations, 5);
        assert!(!report.converged);
    }
}
