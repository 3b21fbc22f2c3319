//! Fit parameters and the dependency graph between them.
//!
//! - [`Parameter`]: an independent, shared, lock-free scalar with bounds and a floating flag.
//! - [`ComposedParameter`]: a value derived from independent parameters through a rule recorded on
//!   a reverse-mode [`Tape`]. Value and gradient are recomputed from live inputs at every access.
//! - [`ComplexParameter`]: a real/imaginary pair with a derived modulus.
//! - [`ParamContext`]: the explicit set of live parameters a model is built from. Composing through
//!   a context extracts the dependencies of a derived value by reachability on the tape.

use cf_ad::{Tape, Var};
use cf_core::{Error, Result};
use rand::Rng;
use rustfft::num_complex::Complex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Name given to parameters created from bare numbers.
pub const FIXED_PARAM_NAME: &str = "FIXED_autoparam";

const AUTO_STEP: f64 = 1e-3;
const AUTO_STEP_UNBOUNDED: f64 = 1e-4;

#[derive(Debug)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(v: f64) -> Self {
        Self(AtomicU64::new(v.to_bits()))
    }

    #[inline]
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Release)
    }
}

#[derive(Debug)]
struct ParameterState {
    name: String,
    value: AtomicF64,
    lower: f64,
    upper: f64,
    /// NaN selects the automatic step size.
    step_size: AtomicF64,
    floating: AtomicBool,
    mutable: bool,
    init_value: f64,
}

/// Independent fit parameter.
///
/// Cloning yields another handle to the same storage, so a value assigned through one handle is
/// seen by every PDF holding another.
#[derive(Debug, Clone)]
pub struct Parameter {
    state: Arc<ParameterState>,
}

/// Builder for [`Parameter`].
#[derive(Debug, Clone)]
pub struct ParameterBuilder {
    name: String,
    value: f64,
    lower: f64,
    upper: f64,
    step_size: Option<f64>,
    floating: bool,
    mutable: bool,
}

impl ParameterBuilder {
    /// Lower and upper limits (defaults `-inf`, `+inf`).
    pub fn bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    /// Explicit step size for minimizers.
    pub fn step_size(mut self, step: f64) -> Self {
        self.step_size = Some(step);
        self
    }

    /// Whether a fit may vary the parameter (default `true`).
    pub fn floating(mut self, floating: bool) -> Self {
        self.floating = floating;
        self
    }

    /// Whether the storage accepts writes (default `true`).
    pub fn mutable(mut self, mutable: bool) -> Self {
        self.mutable = mutable;
        self
    }

    /// Validate and create the parameter.
    pub fn build(self) -> Result<Parameter> {
        if self.lower.is_nan() || self.upper.is_nan() || self.lower > self.upper {
            return Err(Error::Validation(format!(
                "parameter '{}' has invalid bounds ({}, {})",
                self.name, self.lower, self.upper
            )));
        }
        check_value(&self.name, self.value, self.lower, self.upper)?;
        if let Some(s) = self.step_size {
            if !s.is_finite() || s <= 0.0 {
                return Err(Error::Validation(format!(
                    "parameter '{}' step size must be finite and > 0, got {s}",
                    self.name
                )));
            }
        }
        Ok(Parameter {
            state: Arc::new(ParameterState {
                value: AtomicF64::new(self.value),
                lower: self.lower,
                upper: self.upper,
                step_size: AtomicF64::new(self.step_size.unwrap_or(f64::NAN)),
                floating: AtomicBool::new(self.floating),
                mutable: self.mutable,
                init_value: self.value,
                name: self.name,
            }),
        })
    }
}

fn check_value(name: &str, value: f64, lower: f64, upper: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::Validation(format!(
            "parameter '{name}' value must be finite, got {value}"
        )));
    }
    if value < lower || value > upper {
        return Err(Error::Validation(format!(
            "parameter '{name}' value {value} outside bounds ({lower}, {upper})"
        )));
    }
    Ok(())
}

impl Parameter {
    /// Floating, mutable, unbounded parameter.
    pub fn new(name: impl Into<String>, value: f64) -> Result<Self> {
        Self::builder(name, value).build()
    }

    /// Start building a parameter.
    pub fn builder(name: impl Into<String>, value: f64) -> ParameterBuilder {
        ParameterBuilder {
            name: name.into(),
            value,
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
            step_size: None,
            floating: true,
            mutable: true,
        }
    }

    /// Fixed parameter for a bare number: not floating, immutable storage.
    pub fn fixed(value: f64) -> Self {
        Parameter {
            state: Arc::new(ParameterState {
                name: FIXED_PARAM_NAME.to_string(),
                value: AtomicF64::new(value),
                lower: f64::NEG_INFINITY,
                upper: f64::INFINITY,
                step_size: AtomicF64::new(f64::NAN),
                floating: AtomicBool::new(false),
                mutable: false,
                init_value: value,
            }),
        }
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Current value.
    #[inline]
    pub fn value(&self) -> f64 {
        self.state.value.load()
    }

    /// Assign a new value.
    pub fn set_value(&self, value: f64) -> Result<()> {
        if !self.state.mutable {
            return Err(Error::Consistency(format!(
                "cannot assign to parameter '{}': storage is immutable",
                self.name()
            )));
        }
        check_value(self.name(), value, self.state.lower, self.state.upper)?;
        self.state.value.store(value);
        Ok(())
    }

    /// Lower limit.
    pub fn lower(&self) -> f64 {
        self.state.lower
    }

    /// Upper limit.
    pub fn upper(&self) -> f64 {
        self.state.upper
    }

    /// Whether either limit is finite.
    pub fn has_limits(&self) -> bool {
        self.state.lower.is_finite() || self.state.upper.is_finite()
    }

    /// Step size: the explicit one if set, otherwise `1e-3`, or `1e-4` with an infinite bound.
    pub fn step_size(&self) -> f64 {
        let s = self.state.step_size.load();
        if !s.is_nan() {
            return s;
        }
        if self.state.lower.is_infinite() || self.state.upper.is_infinite() {
            AUTO_STEP_UNBOUNDED
        } else {
            AUTO_STEP
        }
    }

    /// Set (`Some`) or clear (`None`) the explicit step size.
    pub fn set_step_size(&self, step: Option<f64>) -> Result<()> {
        match step {
            Some(s) if !s.is_finite() || s <= 0.0 => Err(Error::Validation(format!(
                "parameter '{}' step size must be finite and > 0, got {s}",
                self.name()
            ))),
            Some(s) => {
                self.state.step_size.store(s);
                Ok(())
            }
            None => {
                self.state.step_size.store(f64::NAN);
                Ok(())
            }
        }
    }

    /// Whether a fit may vary the parameter.
    ///
    /// Fails if the flag is set while the storage is immutable.
    pub fn floating(&self) -> Result<bool> {
        let floating = self.state.floating.load(Ordering::Acquire);
        if floating && !self.state.mutable {
            return Err(Error::Consistency(format!(
                "parameter '{}' is floating but its storage is immutable",
                self.name()
            )));
        }
        Ok(floating)
    }

    /// Set the floating flag. Consistency is checked when the flag is read.
    pub fn set_floating(&self, floating: bool) {
        self.state.floating.store(floating, Ordering::Release);
    }

    /// Whether the storage accepts writes.
    pub fn is_mutable(&self) -> bool {
        self.state.mutable
    }

    /// Value at construction.
    pub fn init_value(&self) -> f64 {
        self.state.init_value
    }

    /// Restore the value at construction.
    pub fn reset(&self) -> Result<()> {
        if !self.state.mutable {
            return Ok(());
        }
        self.state.value.store(self.state.init_value);
        Ok(())
    }

    /// Assign a value drawn uniformly between `min` and `max` (defaulting to the bounds) and
    /// return it.
    pub fn randomize<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<f64> {
        let lo = min.unwrap_or(self.state.lower);
        let hi = max.unwrap_or(self.state.upper);
        if !lo.is_finite() || !hi.is_finite() || lo > hi {
            return Err(Error::Validation(format!(
                "cannot randomize parameter '{}' between {lo} and {hi}",
                self.name()
            )));
        }
        let v = if lo == hi { lo } else { rng.random_range(lo..hi) };
        self.set_value(v)?;
        Ok(v)
    }

    /// Whether both handles refer to the same storage.
    pub fn ptr_eq(&self, other: &Parameter) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// Leaf variables recorded for a set of parameters on one tape.
#[derive(Debug, Clone, Default)]
pub struct ParamVars {
    entries: Vec<(Parameter, Var)>,
}

impl ParamVars {
    /// Record every parameter as a leaf at its current value.
    pub fn record(tape: &mut Tape, params: &[Parameter]) -> Self {
        let entries = params.iter().map(|p| (p.clone(), tape.var(p.value()))).collect();
        Self { entries }
    }

    /// Leaf of the parameter called `name`.
    pub fn get(&self, name: &str) -> Option<Var> {
        self.entries.iter().find(|(p, _)| p.name() == name).map(|&(_, v)| v)
    }

    /// Leaf of the parameter called `name`, or a validation error.
    pub fn require(&self, name: &str) -> Result<Var> {
        self.get(name).ok_or_else(|| {
            Error::Validation(format!("parameter '{name}' is not available to this rule"))
        })
    }

    /// Leaf of `param` (matched by identity).
    pub fn var_of(&self, param: &Parameter) -> Option<Var> {
        self.entries.iter().find(|(p, _)| p.ptr_eq(param)).map(|&(_, v)| v)
    }

    fn leaves(&self) -> Vec<Var> {
        self.entries.iter().map(|&(_, v)| v).collect()
    }

    fn push(&mut self, param: Parameter, var: Var) {
        self.entries.push((param, var));
    }
}

/// Rule deriving a composed value from recorded parameter leaves.
pub type ComposeRule = dyn Fn(&mut Tape, &ParamVars) -> Result<Var> + Send + Sync;

/// Parameter derived from independent parameters.
#[derive(Clone)]
pub struct ComposedParameter {
    name: String,
    inputs: Vec<Parameter>,
    params: BTreeMap<String, Parameter>,
    rule: Arc<ComposeRule>,
}

impl fmt::Debug for ComposedParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedParameter")
            .field("name", &self.name)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ComposedParameter {
    /// Compose from an explicit list of dependencies.
    ///
    /// Every parameter in `params` is treated as a dependency; use [`ParamContext::compose`] to
    /// have the dependencies extracted from the rule instead.
    pub fn new<F>(name: impl Into<String>, params: Vec<Parameter>, rule: F) -> Result<Self>
    where
        F: Fn(&mut Tape, &ParamVars) -> Result<Var> + Send + Sync + 'static,
    {
        let by_name = unique_by_name(&params)?;
        let composed =
            Self { name: name.into(), inputs: params, params: by_name, rule: Arc::new(rule) };
        // Fail early on rules that cannot be evaluated.
        composed.value()?;
        Ok(composed)
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Independent parameters the value depends on, by name.
    pub fn params(&self) -> &BTreeMap<String, Parameter> {
        &self.params
    }

    /// Record the rule on `tape`, reusing leaves already present in `vars` and adding the rest.
    ///
    /// This is how one composed parameter is used inside the rule of another.
    pub fn record(&self, tape: &mut Tape, vars: &ParamVars) -> Result<Var> {
        let mut local = ParamVars::default();
        for p in &self.inputs {
            let v = match vars.var_of(p) {
                Some(v) => v,
                None => tape.var(p.value()),
            };
            local.push(p.clone(), v);
        }
        (self.rule)(tape, &local)
    }

    /// Current value, computed from the live inputs.
    pub fn value(&self) -> Result<f64> {
        let mut tape = Tape::new();
        let vars = ParamVars::record(&mut tape, &self.inputs);
        let out = (self.rule)(&mut tape, &vars)?;
        Ok(tape.val(out))
    }

    /// `∂value/∂p` for every dependency `p`, by name.
    pub fn gradient(&self) -> Result<BTreeMap<String, f64>> {
        let mut tape = Tape::new();
        let vars = ParamVars::record(&mut tape, &self.inputs);
        let out = (self.rule)(&mut tape, &vars)?;
        tape.backward(out);
        self.params
            .iter()
            .map(|(name, p)| {
                let v = vars.var_of(p).ok_or_else(|| {
                    Error::Computation(format!("dependency '{name}' was not recorded"))
                })?;
                Ok((name.clone(), tape.adjoint(v)))
            })
            .collect()
    }
}

fn unique_by_name(params: &[Parameter]) -> Result<BTreeMap<String, Parameter>> {
    let mut out = BTreeMap::new();
    for p in params {
        if let Some(prev) = out.insert(p.name().to_string(), p.clone()) {
            if !prev.ptr_eq(p) {
                return Err(Error::Configuration(format!(
                    "two different parameters are named '{}'",
                    p.name()
                )));
            }
        }
    }
    Ok(out)
}

/// Independent or composed parameter, as accepted by PDFs.
#[derive(Debug, Clone)]
pub enum Param {
    /// Independent parameter.
    Independent(Parameter),
    /// Derived parameter.
    Composed(ComposedParameter),
}

impl Param {
    /// Name of the underlying parameter.
    pub fn name(&self) -> &str {
        match self {
            Param::Independent(p) => p.name(),
            Param::Composed(c) => c.name(),
        }
    }

    /// Current value.
    pub fn value(&self) -> Result<f64> {
        match self {
            Param::Independent(p) => Ok(p.value()),
            Param::Composed(c) => c.value(),
        }
    }

    /// Whether this is an independent parameter.
    pub fn is_independent(&self) -> bool {
        matches!(self, Param::Independent(_))
    }

    /// Independent parameters this one depends on (itself if independent).
    ///
    /// With `only_floating`, parameters that are not floating are skipped; inconsistent floating
    /// flags surface as errors.
    pub fn dependents(&self, only_floating: bool) -> Result<Vec<Parameter>> {
        let all: Vec<Parameter> = match self {
            Param::Independent(p) => vec![p.clone()],
            Param::Composed(c) => c.params().values().cloned().collect(),
        };
        if !only_floating {
            return Ok(all);
        }
        let mut out = Vec::with_capacity(all.len());
        for p in all {
            if p.floating()? {
                out.push(p);
            }
        }
        Ok(out)
    }
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Param::Independent(Parameter::fixed(value))
    }
}

impl From<Parameter> for Param {
    fn from(p: Parameter) -> Self {
        Param::Independent(p)
    }
}

impl From<&Parameter> for Param {
    fn from(p: &Parameter) -> Self {
        Param::Independent(p.clone())
    }
}

impl From<ComposedParameter> for Param {
    fn from(c: ComposedParameter) -> Self {
        Param::Composed(c)
    }
}

/// Explicit set of live independent parameters.
#[derive(Debug, Clone, Default)]
pub struct ParamContext {
    params: Vec<Parameter>,
}

impl ParamContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing parameter. Names are unique within a context.
    pub fn add(&mut self, param: Parameter) -> Result<Parameter> {
        if self.get(param.name()).is_some() {
            return Err(Error::Configuration(format!(
                "a parameter named '{}' already exists",
                param.name()
            )));
        }
        self.params.push(param.clone());
        Ok(param)
    }

    /// Create and register a floating, unbounded parameter.
    pub fn parameter(&mut self, name: impl Into<String>, value: f64) -> Result<Parameter> {
        self.add(Parameter::new(name, value)?)
    }

    /// Parameter called `name`.
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name() == name)
    }

    /// All registered parameters, in registration order.
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Registered parameters that are floating.
    pub fn floating(&self) -> Result<Vec<Parameter>> {
        let mut out = Vec::new();
        for p in &self.params {
            if p.floating()? {
                out.push(p.clone());
            }
        }
        Ok(out)
    }

    /// Build a composed parameter whose dependencies are the registered parameters its rule
    /// actually reaches on the tape.
    pub fn compose<F>(&self, name: impl Into<String>, rule: F) -> Result<ComposedParameter>
    where
        F: Fn(&mut Tape, &ParamVars) -> Result<Var> + Send + Sync + 'static,
    {
        let mut tape = Tape::new();
        let vars = ParamVars::record(&mut tape, &self.params);
        let out = rule(&mut tape, &vars)?;
        let reached = tape.dependencies(out, &vars.leaves());
        let deps: Vec<Parameter> = self
            .params
            .iter()
            .zip(vars.leaves())
            .filter(|(_, v)| reached.contains(v))
            .map(|(p, _)| p.clone())
            .collect();
        Ok(ComposedParameter {
            name: name.into(),
            inputs: self.params.clone(),
            params: unique_by_name(&deps)?,
            rule: Arc::new(rule),
        })
    }
}

/// Complex-valued parameter made of two independent parts.
#[derive(Debug, Clone)]
pub struct ComplexParameter {
    name: String,
    real: Parameter,
    imag: Parameter,
}

impl ComplexParameter {
    /// Create `<name>_real` and `<name>_imag` from `value`.
    pub fn new(name: impl Into<String>, value: Complex<f64>, floating: bool) -> Result<Self> {
        let name = name.into();
        let real = Parameter::builder(format!("{name}_real"), value.re).floating(floating).build()?;
        let imag = Parameter::builder(format!("{name}_imag"), value.im).floating(floating).build()?;
        Ok(Self { name, real, imag })
    }

    /// Assemble from existing parts.
    pub fn from_parts(name: impl Into<String>, real: Parameter, imag: Parameter) -> Self {
        Self { name: name.into(), real, imag }
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Real part.
    pub fn real(&self) -> &Parameter {
        &self.real
    }

    /// Imaginary part.
    pub fn imag(&self) -> &Parameter {
        &self.imag
    }

    /// Current value.
    pub fn value(&self) -> Complex<f64> {
        Complex::new(self.real.value(), self.imag.value())
    }

    /// Complex conjugate of the current value.
    pub fn conj(&self) -> Complex<f64> {
        self.value().conj()
    }

    /// Argument (phase) of the current value.
    pub fn arg(&self) -> f64 {
        self.value().arg()
    }

    /// `{"real": .., "imag": ..}`.
    pub fn params(&self) -> BTreeMap<String, Parameter> {
        BTreeMap::from([
            ("real".to_string(), self.real.clone()),
            ("imag".to_string(), self.imag.clone()),
        ])
    }

    /// Modulus `sqrt(re² + im²)` as a composed parameter of both parts.
    pub fn modulus(&self) -> Result<ComposedParameter> {
        let re_name = self.real.name().to_string();
        let im_name = self.imag.name().to_string();
        ComposedParameter::new(
            format!("{}_mod", self.name),
            vec![self.real.clone(), self.imag.clone()],
            move |t, v| {
                let re = v.require(&re_name)?;
                let im = v.require(&im_name)?;
                let re2 = t.mul(re, re);
                let im2 = t.mul(im, im);
                let s = t.add(re2, im2);
                Ok(t.sqrt(s))
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_auto_step_size() {
        let p = Parameter::new("a", 1.0).unwrap();
        assert_eq!(p.step_size(), 1e-4);
        let b = Parameter::builder("b", 1.0).bounds(0.0, 2.0).build().unwrap();
        assert_eq!(b.step_size(), 1e-3);
        let c = Parameter::builder("c", 1.0).bounds(0.0, 2.0).step_size(0.5).build().unwrap();
        assert_eq!(c.step_size(), 0.5);
        c.set_step_size(None).unwrap();
        assert_eq!(c.step_size(), 1e-3);
    }

    #[test]
    fn test_set_value_validates() {
        let p = Parameter::builder("p", 0.5).bounds(0.0, 1.0).build().unwrap();
        p.set_value(0.75).unwrap();
        assert_eq!(p.value(), 0.75);
        assert!(matches!(p.set_value(f64::NAN), Err(Error::Validation(_))));
        assert!(matches!(p.set_value(1.5), Err(Error::Validation(_))));
        p.reset().unwrap();
        assert_eq!(p.value(), 0.5);
    }

    #[test]
    fn test_handles_share_storage() {
        let p = Parameter::new("shared", 1.0).unwrap();
        let q = p.clone();
        q.set_value(3.0).unwrap();
        assert_eq!(p.value(), 3.0);
        assert!(p.ptr_eq(&q));
    }

    #[test]
    fn test_floating_over_immutable_storage_is_inconsistent() {
        let p = Parameter::builder("frozen", 1.0).mutable(false).floating(true).build().unwrap();
        assert!(matches!(p.floating(), Err(Error::Consistency(_))));
        assert!(matches!(p.set_value(2.0), Err(Error::Consistency(_))));
        p.set_floating(false);
        assert!(!p.floating().unwrap());
    }

    #[test]
    fn test_fixed_from_number() {
        let p = Param::from(0.3);
        assert_eq!(p.name(), FIXED_PARAM_NAME);
        assert_eq!(p.value().unwrap(), 0.3);
        assert!(p.dependents(true).unwrap().is_empty());
        match p {
            Param::Independent(p) => {
                assert!(!p.floating().unwrap());
                assert!(!p.is_mutable());
            }
            Param::Composed(_) => panic!("expected an independent parameter"),
        }
    }

    #[test]
    fn test_randomize_within_bounds() {
        let p = Parameter::builder("r", 0.0).bounds(-1.0, 2.0).build().unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let v = p.randomize(&mut rng, None, None).unwrap();
            assert!((-1.0..2.0).contains(&v));
            assert_eq!(p.value(), v);
        }
        let v = p.randomize(&mut rng, Some(0.5), Some(0.6)).unwrap();
        assert!((0.5..0.6).contains(&v));
        let unbounded = Parameter::new("u", 0.0).unwrap();
        assert!(matches!(unbounded.randomize(&mut rng, None, None), Err(Error::Validation(_))));
    }

    #[test]
    fn test_context_rejects_duplicate_names() {
        let mut ctx = ParamContext::new();
        ctx.parameter("mu", 0.0).unwrap();
        assert!(matches!(ctx.parameter("mu", 1.0), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_compose_extracts_only_reached_parameters() {
        let mut ctx = ParamContext::new();
        let a = ctx.parameter("a", 2.0).unwrap();
        ctx.parameter("unused", 5.0).unwrap();
        let b = ctx.parameter("b", 3.0).unwrap();

        let prod = ctx
            .compose("prod", |t, v| {
                let a = v.require("a")?;
                let b = v.require("b")?;
                Ok(t.mul(a, b))
            })
            .unwrap();
        assert_eq!(prod.params().keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_relative_eq!(prod.value().unwrap(), 6.0);

        // Values are live.
        a.set_value(4.0).unwrap();
        assert_relative_eq!(prod.value().unwrap(), 12.0);
        let g = prod.gradient().unwrap();
        assert_relative_eq!(g["a"], 3.0);
        assert_relative_eq!(g["b"], 4.0);
        b.set_value(1.0).unwrap();
        assert_relative_eq!(prod.gradient().unwrap()["a"], 1.0);
    }

    #[test]
    fn test_nested_composition_tracks_leaves() {
        let mut ctx = ParamContext::new();
        ctx.parameter("x", 1.5).unwrap();
        ctx.parameter("y", 0.5).unwrap();
        ctx.parameter("z", 9.0).unwrap();
        let sum = ctx
            .compose("sum", |t, v| {
                let x = v.require("x")?;
                let y = v.require("y")?;
                Ok(t.add(x, y))
            })
            .unwrap();
        let inner = sum.clone();
        let sq = ctx.compose("sq", move |t, v| {
            let s = inner.record(t, v)?;
            Ok(t.mul(s, s))
        });
        let sq = sq.unwrap();
        assert_eq!(sq.params().keys().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_relative_eq!(sq.value().unwrap(), 4.0);
        assert_relative_eq!(sq.gradient().unwrap()["x"], 4.0);
    }

    #[test]
    fn test_composed_dependents_filter_floating() {
        let mut ctx = ParamContext::new();
        let a = ctx.parameter("a", 1.0).unwrap();
        ctx.parameter("b", 2.0).unwrap();
        let c = ctx
            .compose("c", |t, v| {
                let a = v.require("a")?;
                let b = v.require("b")?;
                Ok(t.sub(a, b))
            })
            .unwrap();
        a.set_floating(false);
        let p = Param::from(c);
        assert_eq!(p.dependents(false).unwrap().len(), 2);
        let floating = p.dependents(true).unwrap();
        assert_eq!(floating.len(), 1);
        assert_eq!(floating[0].name(), "b");
        assert_eq!(ctx.floating().unwrap().len(), 1);
    }

    #[test]
    fn test_complex_parameter() {
        let c = ComplexParameter::new("amp", Complex::new(3.0, -4.0), true).unwrap();
        assert_eq!(c.real().name(), "amp_real");
        assert_eq!(c.conj(), Complex::new(3.0, 4.0));
        let m = c.modulus().unwrap();
        assert_relative_eq!(m.value().unwrap(), 5.0);
        let g = m.gradient().unwrap();
        assert_relative_eq!(g["amp_real"], 0.6);
        assert_relative_eq!(g["amp_imag"], -0.8);
        c.imag().set_value(0.0).unwrap();
        assert_relative_eq!(m.value().unwrap(), 3.0);
        assert_eq!(c.params().len(), 2);
    }
}
