//! Regular rectangular grids.

use crate::data::Data;
use cf_core::{Error, Result, Space};

/// `n` evenly spaced nodes from `lo` to `hi` inclusive.
pub(crate) fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lo],
        _ => {
            let h = (hi - lo) / (n - 1) as f64;
            (0..n).map(|i| if i + 1 == n { hi } else { lo + i as f64 * h }).collect()
        }
    }
}

/// Row-major strides (last axis fastest) for `shape`.
pub(crate) fn strides(shape: &[usize]) -> Vec<usize> {
    let mut s = vec![1usize; shape.len()];
    for a in (0..shape.len().saturating_sub(1)).rev() {
        s[a] = s[a + 1] * shape[a + 1];
    }
    s
}

/// Cartesian product of per-axis nodes as columnar data over `space` (last axis fastest).
pub(crate) fn cartesian(space: &Space, nodes: &[Vec<f64>]) -> Result<Data> {
    if nodes.len() != space.n_obs() {
        return Err(Error::Computation(format!(
            "grid has {} axes, space has {}",
            nodes.len(),
            space.n_obs()
        )));
    }
    let shape: Vec<usize> = nodes.iter().map(Vec::len).collect();
    let total: usize = shape.iter().product();
    let st = strides(&shape);
    let columns = nodes
        .iter()
        .enumerate()
        .map(|(a, axis)| (0..total).map(|flat| axis[(flat / st[a]) % shape[a]]).collect())
        .collect();
    Data::from_columns(space.clone(), columns, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linspace_endpoints_exact() {
        let xs = linspace(-5.0, 5.0, 100);
        assert_eq!(xs.len(), 100);
        assert_eq!(xs[0], -5.0);
        assert_eq!(xs[99], 5.0);
    }

    #[test]
    fn test_cartesian_last_axis_fastest() {
        let space = Space::from_axes(vec![("a", (0.0, 1.0)), ("b", (0.0, 1.0))]).unwrap();
        let d = cartesian(&space, &[vec![0.0, 1.0], vec![10.0, 20.0, 30.0]]).unwrap();
        assert_eq!(d.len(), 6);
        assert_eq!(d.point(1), Some(vec![0.0, 20.0]));
        assert_eq!(d.point(3), Some(vec![1.0, 10.0]));
        assert_eq!(strides(&[2, 3, 4]), vec![12, 4, 1]);
    }
}
