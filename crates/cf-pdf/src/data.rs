//! Columnar point storage for PDF evaluation and sampling.

use cf_core::{Error, Result, Space};
use rand::RngCore;
use rand::seq::SliceRandom;

/// Points in a [`Space`], one column per axis (Structure-of-Arrays / SoA).
///
/// Coordinates must be finite. Points are allowed to lie outside the space limits: evaluation grids
/// routinely extend past the declared domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Data {
    space: Space,
    columns: Vec<Vec<f64>>,
    weights: Option<Vec<f64>>,
}

impl Data {
    /// Create from one column per axis of `space`, in axis order.
    pub fn from_columns(
        space: Space,
        columns: Vec<Vec<f64>>,
        weights: Option<Vec<f64>>,
    ) -> Result<Self> {
        if columns.len() != space.n_obs() {
            return Err(Error::Validation(format!(
                "expected {} columns for obs {:?}, got {}",
                space.n_obs(),
                space.obs(),
                columns.len()
            )));
        }
        let n = columns.first().map_or(0, Vec::len);
        for (axis, col) in space.axes().iter().zip(&columns) {
            if col.len() != n {
                return Err(Error::Validation(format!(
                    "column length mismatch for '{}': expected {n}, got {}",
                    axis.name,
                    col.len()
                )));
            }
            if col.iter().any(|x| !x.is_finite()) {
                return Err(Error::Validation(format!(
                    "observable '{}' contains non-finite values",
                    axis.name
                )));
            }
        }
        if let Some(w) = &weights {
            validate_weights(w, n)?;
        }
        Ok(Self { space, columns, weights })
    }

    /// One-dimensional data.
    pub fn from_values(space: Space, values: Vec<f64>) -> Result<Self> {
        Self::from_columns(space, vec![values], None)
    }

    /// Create from row-major points, `n_obs` coordinates per point.
    pub fn from_rows(space: Space, rows: &[Vec<f64>]) -> Result<Self> {
        let d = space.n_obs();
        let mut columns = vec![Vec::with_capacity(rows.len()); d];
        for (i, row) in rows.iter().enumerate() {
            if row.len() != d {
                return Err(Error::Validation(format!(
                    "row {i} has {} coordinates, expected {d}",
                    row.len()
                )));
            }
            for (col, &x) in columns.iter_mut().zip(row) {
                col.push(x);
            }
        }
        Self::from_columns(space, columns, None)
    }

    /// Data with no points.
    pub fn empty(space: Space) -> Self {
        let columns = vec![Vec::new(); space.n_obs()];
        Self { space, columns, weights: None }
    }

    /// Attach per-point weights.
    pub fn with_weights(mut self, weights: Vec<f64>) -> Result<Self> {
        validate_weights(&weights, self.len())?;
        self.weights = Some(weights);
        Ok(self)
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Whether there are no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The space the coordinates refer to.
    pub fn space(&self) -> &Space {
        &self.space
    }

    /// Number of axes.
    pub fn n_obs(&self) -> usize {
        self.space.n_obs()
    }

    /// Column of axis `i`.
    pub fn column(&self, i: usize) -> Option<&[f64]> {
        self.columns.get(i).map(Vec::as_slice)
    }

    /// Column of the axis called `name`.
    pub fn column_by_name(&self, name: &str) -> Option<&[f64]> {
        self.space.index_of(name).and_then(|i| self.column(i))
    }

    /// Columns in the axis order of `space`, looked up by name.
    pub fn columns_for(&self, space: &Space) -> Result<Vec<&[f64]>> {
        space
            .obs()
            .into_iter()
            .map(|name| {
                self.column_by_name(name).ok_or_else(|| {
                    Error::Validation(format!(
                        "data with obs {:?} has no column '{name}'",
                        self.space.obs()
                    ))
                })
            })
            .collect()
    }

    /// All columns in axis order.
    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    /// Per-point weights, if any.
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    /// Coordinates of point `i`.
    pub fn point(&self, i: usize) -> Option<Vec<f64>> {
        if i >= self.len() {
            return None;
        }
        Some(self.columns.iter().map(|c| c[i]).collect())
    }

    /// Data restricted to the named axes (weights are kept).
    pub fn select(&self, names: &[&str]) -> Result<Data> {
        let space = self.space.subspace(names)?;
        let columns = self.columns_for(&space)?.into_iter().map(<[f64]>::to_vec).collect();
        Ok(Self { space, columns, weights: self.weights.clone() })
    }

    /// Side-by-side join: `self`'s axes followed by `other`'s. Both must hold the same number of
    /// points; weights are dropped.
    pub fn join_columns(self, other: Data) -> Result<Data> {
        if self.len() != other.len() {
            return Err(Error::Validation(format!(
                "cannot join data with {} and {} points",
                self.len(),
                other.len()
            )));
        }
        let space = self.space.product(&other.space)?;
        let mut columns = self.columns;
        columns.extend(other.columns);
        Ok(Self { space, columns, weights: None })
    }

    /// Append the points of `other`, matched by axis name. Weights are dropped.
    pub fn extend(&mut self, other: &Data) -> Result<()> {
        let cols = other.columns_for(&self.space)?;
        for (dst, src) in self.columns.iter_mut().zip(cols) {
            dst.extend_from_slice(src);
        }
        self.weights = None;
        Ok(())
    }

    /// Keep the points for which `keep(i)` is true.
    pub fn retain_by_index(&mut self, mut keep: impl FnMut(usize) -> bool) {
        let mask: Vec<bool> = (0..self.len()).map(&mut keep).collect();
        for col in &mut self.columns {
            let mut i = 0;
            col.retain(|_| {
                let k = mask[i];
                i += 1;
                k
            });
        }
        if let Some(w) = &mut self.weights {
            let mut i = 0;
            w.retain(|_| {
                let k = mask[i];
                i += 1;
                k
            });
        }
    }

    /// Keep only the points inside the closed box of `limits` (matched by axis name).
    pub fn retain_inside(&mut self, limits: &Space) -> Result<()> {
        let bounds = limits
            .axes()
            .iter()
            .map(|axis| {
                let i = self.space.index_of(&axis.name).ok_or_else(|| {
                    Error::Validation(format!("data has no column '{}' for limits", axis.name))
                })?;
                Ok((i, axis.lower, axis.upper))
            })
            .collect::<Result<Vec<_>>>()?;
        let columns = &self.columns;
        let mask: Vec<bool> = (0..self.len())
            .map(|p| bounds.iter().all(|&(i, lo, hi)| columns[i][p] >= lo && columns[i][p] <= hi))
            .collect();
        self.retain_by_index(|p| mask[p]);
        Ok(())
    }

    /// Drop every point past the first `n`.
    pub fn truncate(&mut self, n: usize) {
        for col in &mut self.columns {
            col.truncate(n);
        }
        if let Some(w) = &mut self.weights {
            w.truncate(n);
        }
    }

    /// Random permutation of the points.
    pub fn shuffle(&mut self, rng: &mut dyn RngCore) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        for col in &mut self.columns {
            *col = order.iter().map(|&i| col[i]).collect();
        }
        if let Some(w) = &mut self.weights {
            *w = order.iter().map(|&i| w[i]).collect();
        }
    }
}

fn validate_weights(w: &[f64], n: usize) -> Result<()> {
    if w.len() != n {
        return Err(Error::Validation(format!(
            "weights length mismatch: expected {n}, got {}",
            w.len()
        )));
    }
    if w.iter().any(|x| !x.is_finite()) {
        return Err(Error::Validation("weights must be finite".into()));
    }
    if w.iter().any(|x| *x < 0.0) {
        return Err(Error::Validation("negative weights are not supported".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn space_xy() -> Space {
        Space::from_axes(vec![("x", (0.0, 1.0)), ("y", (-1.0, 1.0))]).unwrap()
    }

    #[test]
    fn test_from_rows_is_columnar() {
        let d = Data::from_rows(space_xy(), &[vec![0.1, 0.2], vec![0.3, -0.4]]).unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d.column_by_name("y"), Some(&[0.2, -0.4][..]));
        assert_eq!(d.point(1), Some(vec![0.3, -0.4]));
        assert_eq!(d.point(2), None);
    }

    #[test]
    fn test_non_finite_rejected_outside_allowed() {
        let s = Space::new("x", (0.0, 1.0)).unwrap();
        assert!(Data::from_values(s.clone(), vec![0.5, f64::NAN]).is_err());
        let d = Data::from_values(s, vec![-3.0, 7.0]).unwrap();
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn test_weights_validated() {
        let s = Space::new("x", (0.0, 1.0)).unwrap();
        let d = Data::from_values(s, vec![0.1, 0.2]).unwrap();
        assert!(d.clone().with_weights(vec![1.0]).is_err());
        assert!(d.clone().with_weights(vec![1.0, -1.0]).is_err());
        assert_eq!(d.with_weights(vec![1.0, 2.0]).unwrap().weights(), Some(&[1.0, 2.0][..]));
    }

    #[test]
    fn test_select_and_join() {
        let d = Data::from_rows(space_xy(), &[vec![0.1, 0.2], vec![0.3, -0.4]]).unwrap();
        let y = d.select(&["y"]).unwrap();
        let x = d.select(&["x"]).unwrap();
        let yx = y.join_columns(x).unwrap();
        assert_eq!(yx.space().obs(), vec!["y", "x"]);
        assert_eq!(yx.point(0), Some(vec![0.2, 0.1]));
    }

    #[test]
    fn test_retain_inside_and_extend() {
        let mut d = Data::from_rows(
            space_xy(),
            &[vec![0.1, 0.2], vec![1.3, 0.0], vec![0.5, -2.0], vec![0.9, 0.9]],
        )
        .unwrap();
        d.retain_inside(&space_xy()).unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d.point(1), Some(vec![0.9, 0.9]));

        let other = d.clone();
        d.extend(&other).unwrap();
        assert_eq!(d.len(), 4);
        d.truncate(3);
        assert_eq!(d.len(), 3);
    }

    #[test]
    fn test_shuffle_keeps_rows_together() {
        let rows: Vec<Vec<f64>> =
            (0..50).map(|i| vec![i as f64 / 50.0, -(i as f64) / 50.0]).collect();
        let mut d = Data::from_rows(space_xy(), &rows).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        d.shuffle(&mut rng);
        for i in 0..d.len() {
            let p = d.point(i).unwrap();
            assert_eq!(p[0], -p[1]);
        }
    }
}
