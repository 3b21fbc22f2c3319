//! Rejection sampling fallback for PDFs without a dedicated sampler.

use crate::data::Data;
use crate::pdf::Pdf;
use cf_core::{Error, Result, Space};
use rand::{Rng, RngCore};

/// `n` uniform points in the (finite) box `limits`.
pub(crate) fn uniform_points(limits: &Space, n: usize, rng: &mut dyn RngCore) -> Result<Data> {
    let columns = limits
        .axes()
        .iter()
        .map(|a| (0..n).map(|_| rng.random_range(a.lower..a.upper)).collect())
        .collect();
    Data::from_columns(limits.clone(), columns, None)
}

fn estimate_envelope<P: Pdf + ?Sized>(
    pdf: &P,
    limits: &Space,
    rng: &mut dyn RngCore,
) -> Result<f64> {
    let settings = &pdf.settings().sampling;
    if let Some(m) = pdf.max_density_hint(limits)? {
        if m.is_finite() && m > 0.0 {
            return Ok(m);
        }
    }
    let scan = uniform_points(limits, settings.scan_points, rng)?;
    let max = pdf
        .unnormalized_pdf(&scan)?
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(0.0f64, f64::max);
    if max <= 0.0 {
        return Err(Error::NumericalInstability(format!(
            "{}: density vanishes on {} scan points, cannot build a sampling envelope",
            pdf.name(),
            settings.scan_points
        )));
    }
    Ok(max * settings.envelope_factor)
}

/// Accept-reject sampling of `n` points inside `limits` against a constant envelope.
///
/// The envelope comes from [`Pdf::max_density_hint`] or, failing that, a uniform scan of the
/// unnormalized density. If a candidate exceeds the envelope it is raised for the following rounds.
pub fn rejection_sample<P: Pdf + ?Sized>(
    pdf: &P,
    n: usize,
    limits: &Space,
    rng: &mut dyn RngCore,
) -> Result<Data> {
    if !limits.is_finite() {
        return Err(Error::NumericalInstability(format!(
            "{}: rejection sampling requires finite limits, got {:?}",
            pdf.name(),
            limits.rect_limits()
        )));
    }
    let settings = pdf.settings().sampling.clone();
    let mut envelope = estimate_envelope(pdf, limits, rng)?;
    let mut out = Data::empty(limits.clone());

    for round in 0..settings.max_rounds {
        if out.len() >= n {
            break;
        }
        let mut candidates = uniform_points(limits, settings.batch_size, rng)?;
        let values = pdf.unnormalized_pdf(&candidates)?;
        let seen = values.iter().copied().filter(|v| v.is_finite()).fold(0.0f64, f64::max);
        let accept: Vec<bool> =
            values.iter().map(|&v| v.is_finite() && rng.random::<f64>() * envelope < v).collect();
        if seen > envelope {
            log::warn!(
                "{}: density {seen} exceeds envelope {envelope} in round {round}, raising it",
                pdf.name()
            );
            envelope = seen * settings.envelope_factor;
        }
        candidates.retain_by_index(|i| accept[i]);
        out.extend(&candidates)?;
    }

    if out.len() < n {
        return Err(Error::Computation(format!(
            "{}: rejection sampling produced {} of {n} points in {} rounds",
            pdf.name(),
            out.len(),
            settings.max_rounds
        )));
    }
    out.truncate(n);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{NoSampling, WrapDistribution};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_uniform_points_inside() {
        let s = Space::from_axes(vec![("x", (-1.0, 1.0)), ("y", (2.0, 3.0))]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let d = uniform_points(&s, 500, &mut rng).unwrap();
        assert_eq!(d.len(), 500);
        assert!((0..d.len()).all(|i| s.contains(&d.point(i).unwrap())));
    }

    #[test]
    fn test_rejection_matches_gauss_moments() {
        let obs = Space::new("x", (-5.0, 5.0)).unwrap();
        let gauss = NoSampling::new(WrapDistribution::gauss(1.0, 0.5, obs).unwrap());
        let mut rng = StdRng::seed_from_u64(42);
        let d = gauss.sample(20_000, None, &mut rng).unwrap();
        let xs = d.column(0).unwrap();
        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64;
        assert!((mean - 1.0).abs() < 0.02, "mean {mean}");
        assert!((var.sqrt() - 0.5).abs() < 0.02, "std {}", var.sqrt());
    }

    #[test]
    fn test_infinite_limits_rejected() {
        let obs = Space::new("x", (f64::NEG_INFINITY, f64::INFINITY)).unwrap();
        let gauss = WrapDistribution::gauss(0.0, 1.0, obs.clone()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let err = rejection_sample(&gauss, 10, &obs, &mut rng).unwrap_err();
        assert!(matches!(err, Error::NumericalInstability(_)));
    }
}
