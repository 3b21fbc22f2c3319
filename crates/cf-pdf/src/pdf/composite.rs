//! Sums and products of PDFs.

use crate::data::Data;
use crate::param::Param;
use crate::pdf::{Capability, Pdf, align_limits};
use cf_core::{Error, Result, Settings, Space};
use rand::RngCore;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Weighted sum `Σ f_i · p_i(x)` of normalized PDFs over the same observables.
///
/// With one fraction fewer than PDFs, the last fraction is `1 - Σ f_i`.
pub struct SumPdf {
    name: String,
    space: Space,
    pdfs: Vec<Arc<dyn Pdf>>,
    fracs: Vec<Param>,
    settings: Settings,
}

impl SumPdf {
    /// Combine `pdfs` with `fracs` (length `pdfs.len() - 1` or `pdfs.len()`).
    pub fn new(pdfs: Vec<Arc<dyn Pdf>>, fracs: Vec<Param>) -> Result<Self> {
        let first = pdfs
            .first()
            .ok_or_else(|| Error::Validation("SumPdf requires at least one PDF".into()))?;
        let space = first.space().clone();
        for p in &pdfs[1..] {
            align_limits(&space, p.space()).map_err(|_| {
                Error::Validation(format!(
                    "SumPdf components must share obs: {:?} vs {:?}",
                    space.obs(),
                    p.space().obs()
                ))
            })?;
        }
        let n = pdfs.len();
        if fracs.len() + 1 != n && fracs.len() != n {
            return Err(Error::Validation(format!(
                "SumPdf with {n} PDFs expects {} or {n} fractions, got {}",
                n - 1,
                fracs.len()
            )));
        }
        Ok(Self { name: "SumPdf".into(), space, pdfs, fracs, settings: Settings::default() })
    }

    /// Replace the numeric settings used by the fallbacks.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Current fraction of every component.
    pub fn frac_values(&self) -> Result<Vec<f64>> {
        let mut fracs = self.fracs.iter().map(Param::value).collect::<Result<Vec<_>>>()?;
        if fracs.len() + 1 == self.pdfs.len() {
            let rest = 1.0 - fracs.iter().sum::<f64>();
            fracs.push(rest);
        }
        Ok(fracs)
    }
}

impl Pdf for SumPdf {
    fn name(&self) -> &str {
        &self.name
    }

    fn space(&self) -> &Space {
        &self.space
    }

    fn params(&self) -> BTreeMap<String, Param> {
        self.fracs.iter().enumerate().map(|(i, f)| (format!("frac_{i}"), f.clone())).collect()
    }

    fn children(&self) -> Vec<Arc<dyn Pdf>> {
        self.pdfs.clone()
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn unnormalized_pdf(&self, x: &Data) -> Result<Vec<f64>> {
        let fracs = self.frac_values()?;
        let mut out = vec![0.0; x.len()];
        for (pdf, f) in self.pdfs.iter().zip(fracs) {
            for (o, v) in out.iter_mut().zip(pdf.pdf(x, None)?) {
                *o += f * v;
            }
        }
        Ok(out)
    }

    fn analytic_integrate(&self, limits: &Space) -> Result<Capability<f64>> {
        let fracs = self.frac_values()?;
        let mut total = 0.0;
        for (pdf, f) in self.pdfs.iter().zip(fracs) {
            total += f * pdf.integrate(limits, None)?;
        }
        Ok(Capability::Supported(total))
    }

    fn sample_with(
        &self,
        n: usize,
        limits: &Space,
        rng: &mut dyn RngCore,
    ) -> Result<Capability<Data>> {
        let fracs = self.frac_values()?;
        if fracs.iter().any(|f| *f < 0.0) {
            log::debug!("{}: negative fraction, no component sampling", self.name);
            return Ok(Capability::Unsupported);
        }
        let mut weights = Vec::with_capacity(fracs.len());
        for (pdf, f) in self.pdfs.iter().zip(&fracs) {
            weights.push(f * pdf.integrate(limits, None)?);
        }
        let total: f64 = weights.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(Error::NumericalInstability(format!(
                "{}: no probability mass inside the sampling limits",
                self.name
            )));
        }

        let index = WeightedIndex::new(&weights)
            .map_err(|e| Error::Computation(format!("{}: fraction weights: {e}", self.name)))?;
        let mut counts = vec![0usize; weights.len()];
        for _ in 0..n {
            counts[index.sample(&mut *rng)] += 1;
        }

        let mut out = Data::empty(limits.clone());
        for (pdf, &count) in self.pdfs.iter().zip(&counts) {
            if count > 0 {
                out.extend(&pdf.sample(count, Some(limits), rng)?)?;
            }
        }
        out.shuffle(rng);
        Ok(Capability::Supported(out))
    }
}

/// Product `Π p_i(x_i)` of normalized PDFs over disjoint observables.
pub struct ProductPdf {
    name: String,
    space: Space,
    pdfs: Vec<Arc<dyn Pdf>>,
    settings: Settings,
}

impl ProductPdf {
    /// Combine `pdfs`; the space is the Cartesian product of theirs, in order.
    pub fn new(pdfs: Vec<Arc<dyn Pdf>>) -> Result<Self> {
        let first = pdfs
            .first()
            .ok_or_else(|| Error::Validation("ProductPdf requires at least one PDF".into()))?;
        let mut space = first.space().clone();
        for p in &pdfs[1..] {
            space = space.product(p.space())?;
        }
        Ok(Self { name: "ProductPdf".into(), space, pdfs, settings: Settings::default() })
    }

    /// Replace the numeric settings used by the fallbacks.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    fn sub_limits(&self, pdf: &dyn Pdf, limits: &Space) -> Result<Space> {
        limits.subspace(&pdf.space().obs())
    }
}

impl Pdf for ProductPdf {
    fn name(&self) -> &str {
        &self.name
    }

    fn space(&self) -> &Space {
        &self.space
    }

    fn children(&self) -> Vec<Arc<dyn Pdf>> {
        self.pdfs.clone()
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn unnormalized_pdf(&self, x: &Data) -> Result<Vec<f64>> {
        let mut out = vec![1.0; x.len()];
        for pdf in &self.pdfs {
            for (o, v) in out.iter_mut().zip(pdf.pdf(x, None)?) {
                *o *= v;
            }
        }
        Ok(out)
    }

    fn analytic_integrate(&self, limits: &Space) -> Result<Capability<f64>> {
        let mut total = 1.0;
        for pdf in &self.pdfs {
            let sub = self.sub_limits(pdf.as_ref(), limits)?;
            total *= pdf.integrate(&sub, None)?;
        }
        Ok(Capability::Supported(total))
    }

    fn sample_with(
        &self,
        n: usize,
        limits: &Space,
        rng: &mut dyn RngCore,
    ) -> Result<Capability<Data>> {
        let mut joined: Option<Data> = None;
        for pdf in &self.pdfs {
            let sub = self.sub_limits(pdf.as_ref(), limits)?;
            let part = pdf.sample(n, Some(&sub), rng)?;
            joined = Some(match joined {
                Some(acc) => acc.join_columns(part)?,
                None => part,
            });
        }
        match joined {
            Some(d) => Ok(Capability::Supported(d.select(&limits.obs())?)),
            None => Ok(Capability::Unsupported),
        }
    }
}
