//! Tape-based reverse-mode automatic differentiation.
//!
//! Records a computation graph (forward pass), then computes **all** gradients
//! in a single backward sweep.  Cost: one forward + one backward pass regardless
//! of the number of inputs.
//!
//! # Example
//! ```
//! use pf_ad::tape::Tape;
//!
//! let mut tape = Tape::new();
//! let x = tape.var(3.0);
//! let y = tape.var(5.0);
//! let z = tape.mul(x, y);       // z = x * y = 15
//! let w = tape.add(z, x);       // w = z + x = 18
//! tape.backward(w);
//! assert_eq!(tape.adjoint(x), 6.0);  // dw/dx = y + 1 = 6
//! assert_eq!(tape.adjoint(y), 3.0);  // dw/dy = x = 3
//! ```
//!
//! # Conditional expressions
//!
//! [`Tape::cond_lt`] and [`Tape::cond_ge`] record a single node holding both
//! candidate operands. The forward value is the selected operand; in the
//! backward sweep the adjoint flows to the selected operand only, and never
//! to the compared values.

/// Handle to a node on the tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Var(pub(crate) usize);

/// Comparison recorded by a conditional-expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Lt,
    Ge,
}

impl Cmp {
    #[inline]
    fn holds(self, left: f64, right: f64) -> bool {
        match self {
            Cmp::Lt => left < right,
            Cmp::Ge => left >= right,
        }
    }
}

/// Operation recorded on the tape.
#[derive(Debug, Clone, Copy)]
enum Op {
    /// Input variable (leaf).
    Input,
    /// Constant (adjoint never propagated).
    Const,
    // Binary ops
    Add(usize, usize),
    Sub(usize, usize),
    Mul(usize, usize),
    Div(usize, usize),
    // Unary ops
    Neg(usize),
    Ln(usize),
    Sqrt(usize),
    Powi(usize, i32),
    /// `cmp(left, right) ? if_true : if_false`
    CondExp { cmp: Cmp, left: usize, right: usize, if_true: usize, if_false: usize },
}

/// Node on the tape: value + operation that produced it.
#[derive(Debug, Clone)]
struct Node {
    val: f64,
    op: Op,
}

/// Reverse-mode AD tape.
///
/// Build a computation graph by calling methods (var, add, mul, ln, …),
/// then call [`backward`](Tape::backward) and read gradients with [`adjoint`](Tape::adjoint).
#[derive(Debug)]
pub struct Tape {
    nodes: Vec<Node>,
    adjoints: Vec<f64>,
}

impl Tape {
    /// Create an empty tape.
    pub fn new() -> Self {
        Self { nodes: Vec::new(), adjoints: Vec::new() }
    }

    /// Create a tape pre-allocated for `capacity` nodes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { nodes: Vec::with_capacity(capacity), adjoints: Vec::with_capacity(capacity) }
    }

    /// Clear the tape for reuse (avoids reallocation).
    #[inline]
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.adjoints.clear();
    }

    #[inline]
    fn push(&mut self, val: f64, op: Op) -> Var {
        let idx = self.nodes.len();
        self.nodes.push(Node { val, op });
        Var(idx)
    }

    // --- Leaf constructors ---

    /// Record an input variable.
    #[inline]
    pub fn var(&mut self, val: f64) -> Var {
        self.push(val, Op::Input)
    }

    /// Record a constant (gradient never flows through it).
    #[inline]
    pub fn constant(&mut self, val: f64) -> Var {
        self.push(val, Op::Const)
    }

    // --- Value access ---

    /// Get the primal value of a node.
    #[inline]
    pub fn val(&self, v: Var) -> f64 {
        self.nodes[v.0].val
    }

    // --- Binary operations ---

    /// `a + b`
    #[inline]
    pub fn add(&mut self, a: Var, b: Var) -> Var {
        let val = self.nodes[a.0].val + self.nodes[b.0].val;
        self.push(val, Op::Add(a.0, b.0))
    }

    /// `a - b`
    #[inline]
    pub fn sub(&mut self, a: Var, b: Var) -> Var {
        let val = self.nodes[a.0].val - self.nodes[b.0].val;
        self.push(val, Op::Sub(a.0, b.0))
    }

    /// `a * b`
    #[inline]
    pub fn mul(&mut self, a: Var, b: Var) -> Var {
        let val = self.nodes[a.0].val * self.nodes[b.0].val;
        self.push(val, Op::Mul(a.0, b.0))
    }

    /// `a / b`
    #[inline]
    pub fn div(&mut self, a: Var, b: Var) -> Var {
        let val = self.nodes[a.0].val / self.nodes[b.0].val;
        self.push(val, Op::Div(a.0, b.0))
    }

    // --- Unary operations ---

    /// `-a`
    #[inline]
    pub fn neg(&mut self, a: Var) -> Var {
        let val = -self.nodes[a.0].val;
        self.push(val, Op::Neg(a.0))
    }

    /// `ln(a)`
    #[inline]
    pub fn ln(&mut self, a: Var) -> Var {
        let val = self.nodes[a.0].val.ln();
        self.push(val, Op::Ln(a.0))
    }

    /// `sqrt(a)`
    #[inline]
    pub fn sqrt(&mut self, a: Var) -> Var {
        let val = self.nodes[a.0].val.sqrt();
        self.push(val, Op::Sqrt(a.0))
    }

    /// `a^n` (integer exponent)
    pub fn powi(&mut self, a: Var, n: i32) -> Var {
        let val = self.nodes[a.0].val.powi(n);
        self.push(val, Op::Powi(a.0, n))
    }

    // --- Conditional expressions ---

    /// `left < right ? if_true : if_false`
    pub fn cond_lt(&mut self, left: Var, right: Var, if_true: Var, if_false: Var) -> Var {
        self.cond_exp(Cmp::Lt, left, right, if_true, if_false)
    }

    /// `left >= right ? if_true : if_false`
    pub fn cond_ge(&mut self, left: Var, right: Var, if_true: Var, if_false: Var) -> Var {
        self.cond_exp(Cmp::Ge, left, right, if_true, if_false)
    }

    fn cond_exp(&mut self, cmp: Cmp, left: Var, right: Var, if_true: Var, if_false: Var) -> Var {
        let taken = if cmp.holds(self.nodes[left.0].val, self.nodes[right.0].val) {
            if_true
        } else {
            if_false
        };
        let val = self.nodes[taken.0].val;
        self.push(
            val,
            Op::CondExp {
                cmp,
                left: left.0,
                right: right.0,
                if_true: if_true.0,
                if_false: if_false.0,
            },
        )
    }

    // --- Convenience: scalar helpers ---

    /// `a + scalar`
    #[inline]
    pub fn add_f64(&mut self, a: Var, s: f64) -> Var {
        let c = self.constant(s);
        self.add(a, c)
    }

    /// `scalar - a`
    #[inline]
    pub fn f64_sub(&mut self, s: f64, a: Var) -> Var {
        let c = self.constant(s);
        self.sub(c, a)
    }

    /// `a * scalar`
    #[inline]
    pub fn mul_f64(&mut self, a: Var, s: f64) -> Var {
        let c = self.constant(s);
        self.mul(a, c)
    }

    // --- Backward pass ---

    /// Run reverse-mode AD from output node `out`.
    ///
    /// After calling this, use [`adjoint`](Tape::adjoint) to read ∂out/∂x
    /// for any input `x`.
    pub fn backward(&mut self, out: Var) {
        let n = self.nodes.len();
        self.adjoints.resize(n, 0.0);
        self.adjoints.fill(0.0);
        self.adjoints[out.0] = 1.0;

        for i in (0..n).rev() {
            let adj = self.adjoints[i];
            if adj == 0.0 {
                continue; // skip zero-adjoint nodes
            }

            match self.nodes[i].op {
                Op::Input | Op::Const => {}
                Op::Add(a, b) => {
                    self.adjoints[a] += adj;
                    self.adjoints[b] += adj;
                }
                Op::Sub(a, b) => {
                    self.adjoints[a] += adj;
                    self.adjoints[b] -= adj;
                }
                Op::Mul(a, b) => {
                    let va = self.nodes[a].val;
                    let vb = self.nodes[b].val;
                    self.adjoints[a] += adj * vb;
                    self.adjoints[b] += adj * va;
                }
                Op::Div(a, b) => {
                    let va = self.nodes[a].val;
                    let vb = self.nodes[b].val;
                    self.adjoints[a] += adj / vb;
                    self.adjoints[b] -= adj * va / (vb * vb);
                }
                Op::Neg(a) => {
                    self.adjoints[a] -= adj;
                }
                Op::Ln(a) => {
                    self.adjoints[a] += adj / self.nodes[a].val;
                }
                Op::Sqrt(a) => {
                    // d/da sqrt(a) = 1 / (2 sqrt(a))
                    self.adjoints[a] += adj / (2.0 * self.nodes[i].val);
                }
                Op::Powi(a, n) => {
                    self.adjoints[a] += adj * (n as f64) * self.nodes[a].val.powi(n - 1);
                }
                Op::CondExp { cmp, left, right, if_true, if_false } => {
                    let taken = if cmp.holds(self.nodes[left].val, self.nodes[right].val) {
                        if_true
                    } else {
                        if_false
                    };
                    self.adjoints[taken] += adj;
                }
            }
        }
    }

    /// Read ∂output/∂v after calling [`backward`](Tape::backward).
    #[inline]
    pub fn adjoint(&self, v: Var) -> f64 {
        self.adjoints.get(v.0).copied().unwrap_or(0.0)
    }
}

impl Default for Tape {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_add_sub() {
        // f = (x + y) - y, df/dx = 1, df/dy = 0
        let mut t = Tape::new();
        let x = t.var(3.0);
        let y = t.var(5.0);
        let s = t.add(x, y);
        let z = t.sub(s, y);
        assert_eq!(t.val(z), 3.0);

        t.backward(z);
        assert_relative_eq!(t.adjoint(x), 1.0, epsilon = 1e-12);
        assert_relative_eq!(t.adjoint(y), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mul() {
        let mut t = Tape::new();
        let x = t.var(3.0);
        let y = t.var(5.0);
        let z = t.mul(x, y);
        assert_eq!(t.val(z), 15.0);

        t.backward(z);
        assert_relative_eq!(t.adjoint(x), 5.0, epsilon = 1e-12);
        assert_relative_eq!(t.adjoint(y), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_div() {
        // f = x / y, df/dx = 1/y, df/dy = -x/y^2
        let mut t = Tape::new();
        let x = t.var(6.0);
        let y = t.var(3.0);
        let z = t.div(x, y);
        assert_eq!(t.val(z), 2.0);

        t.backward(z);
        assert_relative_eq!(t.adjoint(x), 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(t.adjoint(y), -6.0 / 9.0, epsilon = 1e-12);
    }

    #[test]
    fn test_neg_ln() {
        // f = -ln(x), df/dx = -1/x
        let mut t = Tape::new();
        let x = t.var(2.0);
        let l = t.ln(x);
        let z = t.neg(l);
        assert_relative_eq!(t.val(z), -(2.0_f64.ln()), epsilon = 1e-12);

        t.backward(z);
        assert_relative_eq!(t.adjoint(x), -0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_sqrt() {
        // f = sqrt(x), df/dx = 1/(2 sqrt(x))
        let mut t = Tape::new();
        let x = t.var(0.25);
        let z = t.sqrt(x);
        assert_relative_eq!(t.val(z), 0.5, epsilon = 1e-12);

        t.backward(z);
        assert_relative_eq!(t.adjoint(x), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_powi() {
        // f = x^5, df/dx = 5x^4
        let mut t = Tape::new();
        let x = t.var(2.0);
        let z = t.powi(x, 5);
        assert_relative_eq!(t.val(z), 32.0, epsilon = 1e-12);

        t.backward(z);
        assert_relative_eq!(t.adjoint(x), 80.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cond_lt_routes_adjoint_to_selected_operand() {
        // x = 0.5 < 1 => f = x^2, df/dx = 2x = 1; the 4x branch is recorded but idle.
        let mut t = Tape::new();
        let x = t.var(0.5);
        let one = t.constant(1.0);
        let sq = t.mul(x, x);
        let lin = t.mul_f64(x, 4.0);
        let f = t.cond_lt(x, one, sq, lin);
        assert_relative_eq!(t.val(f), 0.25, epsilon = 1e-12);

        t.backward(f);
        assert_relative_eq!(t.adjoint(x), 1.0, epsilon = 1e-12);
        assert_relative_eq!(t.adjoint(sq), 1.0, epsilon = 1e-12);
        assert_relative_eq!(t.adjoint(lin), 0.0, epsilon = 1e-12);
        assert_relative_eq!(t.adjoint(one), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cond_ge_boundary_takes_true_branch() {
        let mut t = Tape::new();
        let x = t.var(1.0);
        let one = t.constant(1.0);
        let lin = t.mul_f64(x, 3.0);
        let sq = t.mul(x, x);
        let f = t.cond_ge(x, one, lin, sq);
        assert_relative_eq!(t.val(f), 3.0, epsilon = 1e-12);

        t.backward(f);
        assert_relative_eq!(t.adjoint(x), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cond_exp_ignores_non_finite_idle_branch() {
        // The idle branch evaluates ln(-1) = NaN; it must not poison the gradient.
        let mut t = Tape::new();
        let x = t.var(-1.0);
        let zero = t.constant(0.0);
        let bad = t.ln(x);
        let good = t.mul_f64(x, 2.0);
        let f = t.cond_ge(x, zero, bad, good);
        assert_eq!(t.val(f), -2.0);

        t.backward(f);
        assert_relative_eq!(t.adjoint(x), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gaussian_logpdf_gradient() {
        // f(mu, s) = 0.5 ((x - mu)/s)^2 + ln(s)
        // df/dmu = -(x - mu)/s^2, df/ds = -(x - mu)^2/s^3 + 1/s
        let (xv, muv, sv) = (1.0, 0.5, 0.5);
        let mut t = Tape::new();
        let mu = t.var(muv);
        let s = t.var(sv);
        let diff = t.f64_sub(xv, mu);
        let z = t.div(diff, s);
        let z2 = t.mul(z, z);
        let half_z2 = t.mul_f64(z2, 0.5);
        let ln_s = t.ln(s);
        let f = t.add(half_z2, ln_s);

        t.backward(f);
        let r = xv - muv;
        assert_relative_eq!(t.adjoint(mu), -r / (sv * sv), epsilon = 1e-12);
        assert_relative_eq!(t.adjoint(s), -r * r / sv.powi(3) + 1.0 / sv, epsilon = 1e-12);
    }

    #[test]
    fn test_matches_forward_mode_dual() {
        use crate::dual::Dual;

        // f(x, y) = -x * (y^2 + ln(y)) + sqrt(x) / y
        let xv = 1.5;
        let yv = 2.0;

        let mut t = Tape::new();
        let x = t.var(xv);
        let y = t.var(yv);

        let neg_x = t.neg(x);
        let y2 = t.powi(y, 2);
        let ln_y = t.ln(y);
        let inner = t.add(y2, ln_y);
        let term1 = t.mul(neg_x, inner);
        let sqrt_x = t.sqrt(x);
        let term2 = t.div(sqrt_x, y);
        let f_rev = t.add(term1, term2);

        t.backward(f_rev);

        let f_dual =
            |xd: Dual, yd: Dual| -> Dual { -xd * (yd.powi(2) + yd.ln()) + xd.sqrt() / yd };
        let fwd_dx = f_dual(Dual::var(xv), Dual::constant(yv));
        let fwd_dy = f_dual(Dual::constant(xv), Dual::var(yv));

        assert_relative_eq!(t.val(f_rev), fwd_dx.val, epsilon = 1e-12);
        assert_relative_eq!(t.adjoint(x), fwd_dx.dot, epsilon = 1e-12);
        assert_relative_eq!(t.adjoint(y), fwd_dy.dot, epsilon = 1e-12);
    }

    #[test]
    fn test_tape_reuse() {
        let mut t = Tape::new();
        let x = t.var(2.0);
        let z = t.mul(x, x);
        t.backward(z);
        assert_relative_eq!(t.adjoint(x), 4.0, epsilon = 1e-12);

        t.clear();
        let x = t.var(5.0);
        let z = t.mul(x, x);
        t.backward(z);
        assert_relative_eq!(t.adjoint(x), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_scalar_helpers() {
        let mut t = Tape::new();
        let x = t.var(3.0);

        // 10 - (2*x + 1) => d/dx = -2
        let two_x = t.mul_f64(x, 2.0);
        let y = t.add_f64(two_x, 1.0);
        let y = t.f64_sub(10.0, y);
        assert_relative_eq!(t.val(y), 3.0, epsilon = 1e-12);

        t.backward(y);
        assert_relative_eq!(t.adjoint(x), -2.0, epsilon = 1e-12);
    }
}
