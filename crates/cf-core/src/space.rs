//! Coordinate domains: named axes with rectangular limits.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One named axis with its `(lower, upper)` limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    /// Observable name.
    pub name: String,
    /// Lower limit (may be `-inf`).
    pub lower: f64,
    /// Upper limit (may be `+inf`).
    pub upper: f64,
}

impl Axis {
    /// Width `upper - lower`.
    #[inline]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Ordered set of named axes with rectangular limits.
///
/// A `Space` is immutable once constructed. Axis names are unique and every axis satisfies
/// `lower < upper`. Infinite limits are allowed; consumers that cannot handle them (analytic CDF
/// differencing, grid construction, uniform sampling) fail explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Axis>", into = "Vec<Axis>")]
pub struct Space {
    axes: Vec<Axis>,
}

impl Space {
    /// One-dimensional space.
    pub fn new(name: impl Into<String>, limits: (f64, f64)) -> Result<Self> {
        Self::from_axes(vec![(name.into(), limits)])
    }

    /// Space from ordered `(name, (lower, upper))` pairs.
    pub fn from_axes<S: Into<String>>(axes: Vec<(S, (f64, f64))>) -> Result<Self> {
        let axes = axes
            .into_iter()
            .map(|(name, (lower, upper))| Axis { name: name.into(), lower, upper })
            .collect::<Vec<_>>();
        Self::try_from(axes)
    }

    /// Number of axes.
    #[inline]
    pub fn n_obs(&self) -> usize {
        self.axes.len()
    }

    /// Axes in order.
    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Axis names in order.
    pub fn obs(&self) -> Vec<&str> {
        self.axes.iter().map(|a| a.name.as_str()).collect()
    }

    /// Position of the axis called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.axes.iter().position(|a| a.name == name)
    }

    /// `(lower, upper)` of axis `i`.
    pub fn limits(&self, i: usize) -> Option<(f64, f64)> {
        self.axes.get(i).map(|a| (a.lower, a.upper))
    }

    /// `(lower_vector, upper_vector)` with one entry per axis.
    pub fn rect_limits(&self) -> (Vec<f64>, Vec<f64>) {
        (self.axes.iter().map(|a| a.lower).collect(), self.axes.iter().map(|a| a.upper).collect())
    }

    /// Product of the axis widths. Infinite if any axis is unbounded.
    pub fn rect_area(&self) -> f64 {
        self.axes.iter().map(Axis::width).product()
    }

    /// Whether every limit is finite.
    pub fn is_finite(&self) -> bool {
        self.axes.iter().all(|a| a.lower.is_finite() && a.upper.is_finite())
    }

    /// Whether `point` (one coordinate per axis) lies inside the closed box.
    pub fn contains(&self, point: &[f64]) -> bool {
        point.len() == self.axes.len()
            && self.axes.iter().zip(point).all(|(a, &x)| x >= a.lower && x <= a.upper)
    }

    /// Whether both spaces carry the same axis names in the same order.
    pub fn same_obs(&self, other: &Space) -> bool {
        self.axes.len() == other.axes.len()
            && self.axes.iter().zip(&other.axes).all(|(a, b)| a.name == b.name)
    }

    /// Cartesian product: `self`'s axes followed by `other`'s, limits unchanged.
    pub fn product(&self, other: &Space) -> Result<Space> {
        let mut axes = self.axes.clone();
        axes.extend(other.axes.iter().cloned());
        Space::try_from(axes)
    }

    /// Sub-space made of the named axes, in the order given.
    pub fn subspace(&self, names: &[&str]) -> Result<Space> {
        let axes = names
            .iter()
            .map(|n| {
                self.index_of(n)
                    .map(|i| self.axes[i].clone())
                    .ok_or_else(|| Error::Validation(format!("space has no axis '{n}'")))
            })
            .collect::<Result<Vec<_>>>()?;
        Space::try_from(axes)
    }

    /// Same axes with new limits (one `(lower, upper)` per axis).
    pub fn with_limits(&self, limits: &[(f64, f64)]) -> Result<Space> {
        if limits.len() != self.axes.len() {
            return Err(Error::Validation(format!(
                "with_limits expects {} limits, got {}",
                self.axes.len(),
                limits.len()
            )));
        }
        let axes: Vec<Axis> = self
            .axes
            .iter()
            .zip(limits)
            .map(|(a, &(lower, upper))| Axis { name: a.name.clone(), lower, upper })
            .collect();
        Space::try_from(axes)
    }
}

impl TryFrom<Vec<Axis>> for Space {
    type Error = Error;

    fn try_from(axes: Vec<Axis>) -> Result<Self> {
        if axes.is_empty() {
            return Err(Error::Validation("Space requires at least one axis".into()));
        }
        let mut seen = HashSet::with_capacity(axes.len());
        for a in &axes {
            if !seen.insert(a.name.as_str()) {
                return Err(Error::Configuration(format!("duplicate axis name '{}'", a.name)));
            }
            if a.lower.is_nan() || a.upper.is_nan() || a.lower >= a.upper {
                return Err(Error::Validation(format!(
                    "invalid limits for axis '{}': expected lower < upper, got ({}, {})",
                    a.name, a.lower, a.upper
                )));
            }
        }
        Ok(Self { axes })
    }
}

impl From<Space> for Vec<Axis> {
    fn from(space: Space) -> Self {
        space.axes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rect_area_and_limits() {
        let s = Space::from_axes(vec![("x", (-5.0, 5.0)), ("y", (-6.0, 8.0))]).unwrap();
        assert_eq!(s.n_obs(), 2);
        assert_relative_eq!(s.rect_area(), 140.0, epsilon = 1e-12);
        let (lo, hi) = s.rect_limits();
        assert_eq!(lo, vec![-5.0, -6.0]);
        assert_eq!(hi, vec![5.0, 8.0]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Space::from_axes(vec![("x", (0.0, 1.0)), ("x", (0.0, 2.0))]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_invalid_limits_rejected() {
        assert!(matches!(Space::new("x", (1.0, 1.0)), Err(Error::Validation(_))));
        assert!(matches!(Space::new("x", (f64::NAN, 1.0)), Err(Error::Validation(_))));
    }

    #[test]
    fn test_product_concatenates_axes() {
        let a = Space::new("obs1", (-5.0, 5.0)).unwrap();
        let b = Space::new("obs2", (-6.0, 8.0)).unwrap();
        let ab = a.product(&b).unwrap();
        assert_eq!(ab.obs(), vec!["obs1", "obs2"]);
        assert_eq!(ab.limits(1), Some((-6.0, 8.0)));
        assert!(matches!(ab.product(&a), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_infinite_limits_allowed() {
        let s = Space::new("x", (f64::NEG_INFINITY, f64::INFINITY)).unwrap();
        assert!(!s.is_finite());
        assert!(s.rect_area().is_infinite());
    }

    #[test]
    fn test_subspace_and_contains() {
        let s = Space::from_axes(vec![("x", (0.0, 1.0)), ("y", (0.0, 2.0))]).unwrap();
        let y = s.subspace(&["y"]).unwrap();
        assert_eq!(y.limits(0), Some((0.0, 2.0)));
        assert!(s.contains(&[0.5, 1.5]));
        assert!(!s.contains(&[0.5, 2.5]));
        assert!(s.subspace(&["z"]).is_err());
    }

    #[test]
    fn test_with_limits_keeps_names() {
        let s = Space::from_axes(vec![("x", (0.0, 1.0)), ("y", (0.0, 2.0))]).unwrap();
        let wider = s.with_limits(&[(-1.0, 3.0), (-2.0, 4.0)]).unwrap();
        assert!(wider.same_obs(&s));
        assert_eq!(wider.rect_limits(), (vec![-1.0, -2.0], vec![3.0, 4.0]));
        assert!(matches!(s.with_limits(&[(0.0, 1.0)]), Err(Error::Validation(_))));
        assert!(matches!(s.with_limits(&[(0.0, 1.0), (2.0, 2.0)]), Err(Error::Validation(_))));
    }

    #[test]
    fn test_serde_validates() {
        let s: Space = serde_json::from_str(r#"[{"name":"x","lower":0.0,"upper":1.0}]"#).unwrap();
        assert_eq!(s.obs(), vec!["x"]);
        let bad = serde_json::from_str::<Space>(
            r#"[{"name":"x","lower":0.0,"upper":1.0},{"name":"x","lower":0.0,"upper":1.0}]"#,
        );
        assert!(bad.is_err());
    }
}
