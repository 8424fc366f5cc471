use approx::assert_relative_eq;
use pedaler_algebra::components::DiodeParams;
use pedaler_algebra::{AlgebraError, CompilerConfig, SystemDescription};

mod common;
use common::*;

const CLIPPER: &str = "
# Hard clipper: series resistor into a diode to ground
.input in
.output V_out(t)

R1 in out 1k
D1 out 0
";

/// Current balance at the clipper's output node.
fn clipper_kcl(v_in: f64, v_out: f64) -> f64 {
    let params = DiodeParams::default();
    (v_out - v_in) / 1000.0 + params.is * ((v_out / params.n_vt()).exp() - 1.0)
}

#[test]
fn test_diode_clipper_converges() {
    let mut sim = SystemDescription::load(CLIPPER)
        .unwrap()
        .simulate(CompilerConfig::default())
        .unwrap();

    // Cold start, forward biased
    sim.set_input(0, 5.0);
    let report = sim.step().unwrap();
    assert!(report.converged);
    assert!(report.iterations > 1);
    let v = sim.outputs()[0];
    assert!(v > 0.5 && v < 0.8, "forward voltage {}", v);
    assert!(clipper_kcl(5.0, v).abs() < EPSILON_PHYSICAL);

    // Warm start, reverse biased: the diode blocks
    sim.set_input(0, -5.0);
    assert!(sim.step().unwrap().converged);
    assert_relative_eq!(sim.outputs()[0], -5.0, max_relative = EPSILON_PHYSICAL);
}

#[test]
fn test_iteration_bound_is_reported() {
    let desc = SystemDescription::load(".state x\n.output x\n.iterate x\nx = x + 1\n").unwrap();
    let mut sim = desc
        .simulate(CompilerConfig::new().with_max_iterations(5))
        .unwrap();
    let report = sim.step().unwrap();
    assert!(!report.converged);
    assert_eq!(report.iterations, 5);
    assert_eq!(sim.get("x"), Some(5.0));
}

#[test]
fn test_fixed_point_group() {
    let desc =
        SystemDescription::load(".state a 2\n.state x 1\n.output x\n.iterate x\nx = (x + a / x) / 2\n")
            .unwrap();
    let mut sim = desc
        .simulate(CompilerConfig::new().with_tolerance(1e-12))
        .unwrap();
    assert!(sim.step().unwrap().converged);
    assert_relative_eq!(sim.outputs()[0], 2f64.sqrt(), epsilon = 1e-12);
}

#[test]
fn test_explicit_history_average() {
    let desc = SystemDescription::load(
        ".input in\n.state prev\n.output y\n.history V_in(t) prev\ny = (V_in(t) + prev) / 2\n",
    )
    .unwrap();
    let mut sim = desc.simulate(CompilerConfig::default()).unwrap();

    let mut out = Vec::new();
    for sample in [2.0, 4.0, 4.0] {
        sim.set_input(0, sample);
        sim.step().unwrap();
        out.push(sim.outputs()[0]);
    }
    assert_eq!(out, vec![1.0, 3.0, 4.0]);
}

#[test]
fn test_inlined_function() {
    let desc =
        SystemDescription::load(".func sq(p) = p * p\n.state a 3\n.output y\ny = sq(a + 1)\n")
            .unwrap();
    let mut sim = desc.simulate(CompilerConfig::default()).unwrap();
    sim.step().unwrap();
    assert_eq!(sim.get("y"), Some(16.0));
}

#[test]
fn test_free_symbols() {
    let desc = SystemDescription::load(".output y\ny = gain * 2\n").unwrap();
    let err = desc.compile(CompilerConfig::default()).unwrap_err();
    assert!(matches!(err, AlgebraError::UnresolvedSymbol { ref symbol } if symbol == "gain"));

    // Formulas may read free symbols when allocation is enabled
    let mut sim = desc
        .simulate(CompilerConfig::new().with_free_symbol_allocation(true))
        .unwrap();
    assert!(sim.set("gain", 1.5));
    sim.step().unwrap();
    assert_eq!(sim.outputs(), vec![3.0]);
}

#[test]
fn test_cycle_is_malformed() {
    let desc = SystemDescription::load(".output y\ny = z + 1\nz = y * 2\n").unwrap();
    let err = desc.compile(CompilerConfig::default()).unwrap_err();
    assert!(matches!(err, AlgebraError::MalformedSystem { .. }));
}
