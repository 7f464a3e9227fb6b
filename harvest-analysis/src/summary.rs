//! Reduction of the tool's per-class output to summary metrics

use harvest_core::{AnalysisSummary, HarvestResult};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// One row of the tool's per-class report; extra columns are ignored
#[derive(Debug, Deserialize)]
struct ClassRow {
    cbo: f64,
    dit: f64,
    lcom: f64,
    loc: u64,
}

/// Reduce the per-class report at `path` to one summary.
///
/// An empty report (header only) yields a degraded summary, the same result
/// as a tool run that found nothing to analyze. A malformed report is an
/// error: the tool broke, it did not merely find nothing.
pub fn summarize_class_report(full_name: &str, path: &Path) -> HarvestResult<AnalysisSummary> {
    let mut reader = csv::Reader::from_path(path)?;

    let mut cbo = Vec::new();
    let mut dit = Vec::new();
    let mut lcom = Vec::new();
    let mut loc_total: u64 = 0;

    for row in reader.deserialize() {
        let row: ClassRow = row?;
        cbo.push(row.cbo);
        dit.push(row.dit);
        lcom.push(row.lcom);
        loc_total += row.loc;
    }

    if cbo.is_empty() {
        debug!(repo = %full_name, "Per-class report is empty");
        return Ok(AnalysisSummary::degraded(full_name));
    }

    let classes = cbo.len() as u64;
    let (cbo_median, cbo_mean, cbo_stddev) = reduce(&mut cbo);
    let (dit_median, dit_mean, dit_stddev) = reduce(&mut dit);
    let (lcom_median, lcom_mean, lcom_stddev) = reduce(&mut lcom);

    debug!(repo = %full_name, classes, loc_total, "Per-class report reduced");

    Ok(AnalysisSummary {
        full_name: full_name.to_string(),
        cbo_median,
        cbo_mean,
        cbo_stddev,
        dit_median,
        dit_mean,
        dit_stddev,
        lcom_median,
        lcom_mean,
        lcom_stddev,
        loc_total: Some(loc_total),
        classes: Some(classes),
    })
}

/// Median, mean and sample standard deviation of one metric.
///
/// The median of an even-sized set is the average of the two middle values.
/// The deviation is undefined below two observations.
fn reduce(values: &mut [f64]) -> (Option<f64>, Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None, None);
    }

    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();

    let median = if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    };

    let mean = values.iter().sum::<f64>() / n as f64;

    let stddev = if n < 2 {
        None
    } else {
        let variance =
            values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1) as f64;
        Some(variance.sqrt())
    };

    (Some(median), Some(mean), stddev)
}
