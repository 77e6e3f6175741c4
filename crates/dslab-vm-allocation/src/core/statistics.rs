//! Statistics over host utilization history.

use dyn_clone::{clone_trait_object, DynClone};

/// Returns values which are not zero (samples recorded while the host was idle are ignored).
pub fn non_zero_samples<'a, I: IntoIterator<Item = &'a f64>>(samples: I) -> Vec<f64> {
    samples.into_iter().copied().filter(|&x| x != 0.).collect()
}

fn sorted(data: &[f64]) -> Vec<f64> {
    let mut data = data.to_vec();
    data.sort_by(|a, b| a.total_cmp(b));
    data
}

/// Returns the value at the specified quantile (0-1) of sorted data, interpolating linearly between neighbours.
fn quantile_sorted(data: &[f64], q: f64) -> f64 {
    if data.is_empty() {
        return 0.;
    }
    let pos = q * (data.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    data[lower] + (data[upper] - data[lower]) * (pos - lower as f64)
}

pub fn median(data: &[f64]) -> f64 {
    quantile_sorted(&sorted(data), 0.5)
}

/// Median absolute deviation: the median of absolute deviations from the data median.
pub fn median_absolute_deviation(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.;
    }
    let m = median(data);
    let deviations: Vec<f64> = data.iter().map(|x| (x - m).abs()).collect();
    median(&deviations)
}

/// Interquartile range: the difference between the third and the first quartiles.
pub fn interquartile_range(data: &[f64]) -> f64 {
    let data = sorted(data);
    quantile_sorted(&data, 0.75) - quantile_sorted(&data, 0.25)
}

/// Measure of statistical dispersion used by the dynamic threshold detector.
pub trait DispersionMeasure: DynClone {
    fn dispersion(&self, samples: &[f64]) -> f64;
}

clone_trait_object!(DispersionMeasure);

#[derive(Clone)]
pub struct MedianAbsoluteDeviation;

impl DispersionMeasure for MedianAbsoluteDeviation {
    fn dispersion(&self, samples: &[f64]) -> f64 {
        median_absolute_deviation(samples)
    }
}

#[derive(Clone)]
pub struct InterQuartileRange;

impl DispersionMeasure for InterQuartileRange {
    fn dispersion(&self, samples: &[f64]) -> f64 {
        interquartile_range(samples)
    }
}
