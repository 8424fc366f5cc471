//! Diode model.
//!
//! Uses the Shockley diode equation:
//!   I = Is * (exp(V / (n * Vt)) - 1)
//!
//! The current is nonlinear in the junction voltage, so a circuit containing
//! diodes is solved with an iteration group. [`Diode::newton_update`] builds
//! the Newton step for a single junction voltage:
//!   G_d = dI/dV = Is/(n*Vt) * exp(V/(n*Vt))

use crate::expr::Expr;
use crate::native::builtins;
use crate::system::{newton_step, Analysis};
use crate::THERMAL_VOLTAGE;

/// Parameters for a diode model.
#[derive(Debug, Clone)]
pub struct DiodeParams {
    /// Saturation current (Is), typically 1e-14 to 1e-12 A
    pub is: f64,
    /// Ideality factor (n), typically 1.0 to 2.0
    pub n: f64,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self { is: 1e-14, n: 1.0 }
    }
}

impl DiodeParams {
    /// Create parameters for a germanium diode (lower forward voltage).
    pub fn germanium() -> Self {
        Self { is: 1e-9, n: 1.5 }
    }

    /// Thermal voltage times ideality factor.
    pub fn n_vt(&self) -> f64 {
        self.n * THERMAL_VOLTAGE
    }
}

/// A diode between an anode and a cathode node.
#[derive(Debug, Clone)]
pub struct Diode {
    pub name: String,
    pub nodes: [String; 2], // [anode, cathode]
    pub params: DiodeParams,
}

impl Diode {
    pub fn new(name: impl Into<String>, nodes: [&str; 2], params: DiodeParams) -> Self {
        Self {
            name: name.into(),
            nodes: [nodes[0].to_string(), nodes[1].to_string()],
            params,
        }
    }

    /// Current through the junction at voltage `v`.
    pub fn current(&self, v: &Expr) -> Expr {
        let exp = Expr::call(builtins::exp(), [v / self.params.n_vt()]);
        (exp - 1) * self.params.is
    }

    /// Small-signal conductance dI/dV at voltage `v`.
    pub fn conductance(&self, v: &Expr) -> Expr {
        let n_vt = self.params.n_vt();
        Expr::call(builtins::exp(), [v / n_vt]) * (self.params.is / n_vt)
    }

    /// Newton update for the junction voltage `v` given the rest of the
    /// node's current balance `external(v)` and its derivative.
    pub fn newton_update(&self, v: &Expr, external: &Expr, external_slope: &Expr) -> Expr {
        let residual = external - self.current(v);
        let slope = external_slope - self.conductance(v);
        newton_step(v, &residual, &slope)
    }

    pub fn analyze(&self, analysis: &mut Analysis) {
        let va = analysis.node_voltage(&self.nodes[0]);
        let vc = analysis.node_voltage(&self.nodes[1]);
        let i = self.current(&(va - vc));
        analysis.add_current(&self.nodes[0], i.clone());
        analysis.add_current(&self.nodes[1], -i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_diode_current() {
        let diode = Diode::new("D1", ["a", "0"], DiodeParams::default());
        let v = Expr::var("v");
        let i = diode.current(&v);

        let at = |x: f64| i.numeric(&|q: &Expr| if q == &v { Some(x) } else { None });
        assert_relative_eq!(at(0.0).unwrap(), 0.0);
        assert!(at(0.6).unwrap() > 0.0);
        assert!(at(-0.6).unwrap() < 0.0);
        assert!(at(-0.6).unwrap().abs() < diode.params.is * 1.01);
    }

    #[test]
    fn test_newton_update_clipper() {
        // 5 V through 1k into the diode: iterate the update numerically
        let diode = Diode::new("D1", ["out", "0"], DiodeParams::default());
        let v = Expr::var("v");
        let external = (Expr::real(5.0) - &v) / 1000.0;
        let slope = Expr::real(-1.0 / 1000.0);
        let update = diode.newton_update(&v, &external, &slope);

        let mut x = 0.7;
        for _ in 0..20 {
            x = update
                .numeric(&|q: &Expr| if q == &v { Some(x) } else { None })
                .unwrap();
        }
        let kcl = (5.0 - x) / 1000.0 - diode.params.is * ((x / diode.params.n_vt()).exp() - 1.0);
        assert!(kcl.abs() < 1e-9);
        assert!(x > 0.6 && x < 0.75);
    }

    #[test]
    fn test_conductance_positive() {
        let diode = Diode::new("D1", ["a", "0"], DiodeParams::germanium());
        let v = Expr::var("v");
        let g = diode
            .conductance(&v)
            .numeric(&|q: &Expr| if q == &v { Some(0.2) } else { None })
            .unwrap();
        assert!(g > 0.0);
    }
}
