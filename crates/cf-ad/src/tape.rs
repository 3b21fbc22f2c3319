//! Tape-based reverse-mode automatic differentiation.
//!
//! A [`Tape`] records the expression graph of a derived quantity (a composed parameter, a shape
//! transformation, ...) node by node. Two questions can then be answered about any output node:
//!
//! - **gradients**: one backward sweep yields ∂out/∂leaf for every leaf;
//! - **dependencies**: which leaves the output is structurally connected to. This is what a fit
//!   needs to know which independent parameters a derived quantity actually depends on; leaves
//!   that were recorded but never reach the output are filtered out.
//!
//! # Example
//! ```
//! use cf_ad::tape::Tape;
//!
//! let mut tape = Tape::new();
//! let mu = tape.var(1.5);
//! let sigma = tape.var(0.3);
//! let unused = tape.var(7.0);
//! let shifted = tape.add(mu, sigma);
//! let out = tape.mul_f64(shifted, 2.0);
//!
//! assert_eq!(tape.dependencies(out, &[mu, sigma, unused]), vec![mu, sigma]);
//! tape.backward(out);
//! assert_eq!(tape.adjoint(sigma), 2.0);
//! ```

/// Handle to a node on the tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Var(pub(crate) usize);

impl Var {
    /// Position of the node on its tape.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Operation recorded on the tape.
#[derive(Debug, Clone, Copy)]
enum Op {
    /// Input variable (leaf).
    Input,
    /// Constant (leaf, adjoint never propagated).
    Const,
    Add(usize, usize),
    Sub(usize, usize),
    Mul(usize, usize),
    Div(usize, usize),
    /// Max(a, b): gradient flows to the winner only.
    Max(usize, usize),
    Neg(usize),
    Ln(usize),
    Exp(usize),
    Sqrt(usize),
    Powf(usize, f64),
    Powi(usize, i32),
}

impl Op {
    /// Operand node indices.
    fn operands(self) -> (Option<usize>, Option<usize>) {
        match self {
            Op::Input | Op::Const => (None, None),
            Op::Add(a, b) | Op::Sub(a, b) | Op::Mul(a, b) | Op::Div(a, b) | Op::Max(a, b) => {
                (Some(a), Some(b))
            }
            Op::Neg(a) | Op::Ln(a) | Op::Exp(a) | Op::Sqrt(a) | Op::Powf(a, _) | Op::Powi(a, _) => {
                (Some(a), None)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    val: f64,
    op: Op,
}

/// Reverse-mode AD tape.
///
/// Build a graph by calling methods (`var`, `add`, `mul`, `ln`, …), then either call
/// [`backward`](Tape::backward) and read gradients with [`adjoint`](Tape::adjoint), or ask for the
/// structural [`dependencies`](Tape::dependencies) of a node.
#[derive(Debug, Default)]
pub struct Tape {
    nodes: Vec<Node>,
    adjoints: Vec<f64>,
}

impl Tape {
    /// Create an empty tape.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tape pre-allocated for `capacity` nodes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { nodes: Vec::with_capacity(capacity), adjoints: Vec::with_capacity(capacity) }
    }

    /// Number of nodes on the tape.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tape is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Clear the tape for reuse (keeps the allocation).
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

    #[inline]
    fn v(&self, a: Var) -> f64 {
        self.nodes[a.0].val
    }

    /// Record an input variable (a leaf gradients are taken with respect to).
    #[inline]
    pub fn var(&mut self, val: f64) -> Var {
        self.push(val, Op::Input)
    }

    /// Record a constant.
    #[inline]
    pub fn constant(&mut self, val: f64) -> Var {
        self.push(val, Op::Const)
    }

    /// Whether `v` is an input leaf.
    pub fn is_input(&self, v: Var) -> bool {
        matches!(self.nodes.get(v.0).map(|n| n.op), Some(Op::Input))
    }

    /// Primal value of a node.
    #[inline]
    pub fn val(&self, v: Var) -> f64 {
        self.v(v)
    }

    /// `a + b`
    #[inline]
    pub fn add(&mut self, a: Var, b: Var) -> Var {
        self.push(self.v(a) + self.v(b), Op::Add(a.0, b.0))
    }

    /// `a - b`
    #[inline]
    pub fn sub(&mut self, a: Var, b: Var) -> Var {
        self.push(self.v(a) - self.v(b), Op::Sub(a.0, b.0))
    }

    /// `a * b`
    #[inline]
    pub fn mul(&mut self, a: Var, b: Var) -> Var {
        self.push(self.v(a) * self.v(b), Op::Mul(a.0, b.0))
    }

    /// `a / b`
    #[inline]
    pub fn div(&mut self, a: Var, b: Var) -> Var {
        self.push(self.v(a) / self.v(b), Op::Div(a.0, b.0))
    }

    /// `max(a, b)`; the gradient flows to the winner.
    #[inline]
    pub fn max(&mut self, a: Var, b: Var) -> Var {
        let (va, vb) = (self.v(a), self.v(b));
        self.push(if va >= vb { va } else { vb }, Op::Max(a.0, b.0))
    }

    /// `-a`
    #[inline]
    pub fn neg(&mut self, a: Var) -> Var {
        self.push(-self.v(a), Op::Neg(a.0))
    }

    /// `ln(a)`
    #[inline]
    pub fn ln(&mut self, a: Var) -> Var {
        self.push(self.v(a).ln(), Op::Ln(a.0))
    }

    /// `exp(a)`
    #[inline]
    pub fn exp(&mut self, a: Var) -> Var {
        self.push(self.v(a).exp(), Op::Exp(a.0))
    }

    /// `sqrt(a)`
    #[inline]
    pub fn sqrt(&mut self, a: Var) -> Var {
        self.push(self.v(a).sqrt(), Op::Sqrt(a.0))
    }

    /// `a^n` (float exponent)
    pub fn powf(&mut self, a: Var, n: f64) -> Var {
        self.push(self.v(a).powf(n), Op::Powf(a.0, n))
    }

    /// `a^n` (integer exponent)
    pub fn powi(&mut self, a: Var, n: i32) -> Var {
        self.push(self.v(a).powi(n), Op::Powi(a.0, n))
    }

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

    /// `a / scalar`
    #[inline]
    pub fn div_f64(&mut self, a: Var, s: f64) -> Var {
        let c = self.constant(s);
        self.div(a, c)
    }

    /// Run reverse-mode AD from output node `out`.
    ///
    /// Afterwards [`adjoint`](Tape::adjoint) returns ∂out/∂x for any node `x`.
    pub fn backward(&mut self, out: Var) {
        let n = self.nodes.len();
        self.adjoints.clear();
        self.adjoints.resize(n, 0.0);
        self.adjoints[out.0] = 1.0;

        for i in (0..=out.0).rev() {
            let adj = self.adjoints[i];
            if adj == 0.0 {
                continue;
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
                    let (va, vb) = (self.nodes[a].val, self.nodes[b].val);
                    self.adjoints[a] += adj * vb;
                    self.adjoints[b] += adj * va;
                }
                Op::Div(a, b) => {
                    let (va, vb) = (self.nodes[a].val, self.nodes[b].val);
                    self.adjoints[a] += adj / vb;
                    self.adjoints[b] -= adj * va / (vb * vb);
                }
                Op::Max(a, b) => {
                    if self.nodes[a].val >= self.nodes[b].val {
                        self.adjoints[a] += adj;
                    } else {
                        self.adjoints[b] += adj;
                    }
                }
                Op::Neg(a) => self.adjoints[a] -= adj,
                Op::Ln(a) => self.adjoints[a] += adj / self.nodes[a].val,
                Op::Exp(a) => self.adjoints[a] += adj * self.nodes[i].val,
                Op::Sqrt(a) => self.adjoints[a] += adj * 0.5 / self.nodes[i].val,
                Op::Powf(a, p) => {
                    self.adjoints[a] += adj * p * self.nodes[a].val.powf(p - 1.0);
                }
                Op::Powi(a, p) => {
                    self.adjoints[a] += adj * (p as f64) * self.nodes[a].val.powi(p - 1);
                }
            }
        }
    }

    /// ∂output/∂v after [`backward`](Tape::backward); zero for unrelated nodes.
    #[inline]
    pub fn adjoint(&self, v: Var) -> f64 {
        self.adjoints.get(v.0).copied().unwrap_or(0.0)
    }

    /// Mark every node `out` is computed from (including `out` itself).
    ///
    /// Operands always precede their result on the tape, so one reverse scan suffices.
    pub fn reachable(&self, out: Var) -> Vec<bool> {
        let mut seen = vec![false; self.nodes.len()];
        if out.0 >= self.nodes.len() {
            return seen;
        }
        seen[out.0] = true;
        for i in (0..=out.0).rev() {
            if !seen[i] {
                continue;
            }
            let (a, b) = self.nodes[i].op.operands();
            for j in [a, b].into_iter().flatten() {
                seen[j] = true;
            }
        }
        seen
    }

    /// Subset of `candidates` that `out` structurally depends on, in candidate order.
    ///
    /// Structural: a leaf connected only through a zero-valued factor still counts, a leaf that
    /// was recorded but never used by `out` does not.
    pub fn dependencies(&self, out: Var, candidates: &[Var]) -> Vec<Var> {
        let seen = self.reachable(out);
        candidates.iter().copied().filter(|v| seen.get(v.0).copied().unwrap_or(false)).collect()
    }
}
