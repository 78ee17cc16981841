// Copyright (c) 2019 10x Genomics, Inc. All rights reserved.

//! Order-of-magnitude cell calling: keep every barcode within 10x of a
//! high-ranking barcode that very likely represents a cell.

use log::{debug, info, warn};
use rand::Rng;
use serde::Serialize;

use crate::config::{
    Umis, DEFAULT_RECOVERED_CELLS, MAX_RECOVERED_CELLS_MULTIPLE, ORDMAG_CUTOFF_FRACTION,
    ORDMAG_NUM_BOOTSTRAP_SAMPLES, ORDMAG_RECOVERED_CELLS_QUANTILE,
};
use crate::errors::{CellCallError, Result};

/// Summary of a barcode filtering run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FilterMetrics {
    /// Number of barcodes kept.
    pub filtered_bcs: usize,
    /// Variance of the kept-barcode count across bootstrap replicates.
    pub filtered_bcs_var: f64,
    /// Sanity ceiling on the number of cellular barcodes; 0 when no ceiling applies.
    pub max_filtered_bcs: usize,
    /// Bounds and coefficient of variation of the kept-barcode count. Only a fixed
    /// cutoff reports them, as the exact count with no spread.
    pub filtered_bcs_lb: Option<usize>,
    pub filtered_bcs_ub: Option<usize>,
    pub filtered_bcs_cv: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilterResult {
    /// Kept barcode indices, ascending.
    pub barcodes: Vec<usize>,
    pub metrics: FilterMetrics,
    /// Set when the input could not be filtered in a meaningful way.
    pub warning: Option<String>,
}

/// Upper bound on the number of cellular barcodes to consider.
pub fn determine_max_filtered_bcs(recovered_cells: usize) -> usize {
    recovered_cells * MAX_RECOVERED_CELLS_MULTIPLE
}

/// Number of values in `x` within an order of magnitude of the value at
/// `baseline_idx` counted from the top. Index 0 wraps to the smallest value and
/// indices past the end are clamped to `x.len() - 1`.
pub fn find_within_ordmag(x: &mut [Umis], baseline_idx: usize) -> usize {
    if x.is_empty() {
        return 0;
    }
    x.sort_unstable();
    let baseline_idx = baseline_idx.min(x.len() - 1);
    let baseline = x[(x.len() - baseline_idx) % x.len()];
    let cutoff = ((ORDMAG_CUTOFF_FRACTION * baseline as f64).round_ties_even() as Umis).max(1);
    // values >= cutoff sit at the end of the ascending slice
    x.len() - x.partition_point(|&v| v < cutoff)
}

/// Collapse bootstrap replicate results into the mean (rounded half to even) and
/// the population variance.
pub fn summarize_bootstrapped_top_n(top_n_boot: &[usize]) -> (usize, f64) {
    if top_n_boot.is_empty() {
        return (0, 0.0);
    }
    let n = top_n_boot.len() as f64;
    let mean = top_n_boot.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = top_n_boot
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    (mean.round_ties_even() as usize, var)
}

/// Indices of the `top_n` largest counts, returned in ascending index order.
/// Ties go to the later barcode.
pub fn top_n_barcodes(bc_counts: &[Umis], top_n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..bc_counts.len()).collect();
    order.sort_unstable_by(|&a, &b| bc_counts[b].cmp(&bc_counts[a]).then(b.cmp(&a)));
    order.truncate(top_n);
    order.sort_unstable();
    order
}

/// Keep all barcodes within an order of magnitude of the top
/// `recovered_cells * (1 - 0.99)`-th barcode, with the cutoff point estimated by
/// bootstrapping the nonzero counts. `recovered_cells` defaults to 3000.
///
/// An all-zero input is not an error: the result is empty and carries a warning.
pub fn filter_cellular_barcodes_ordmag<R: Rng>(
    bc_counts: &[Umis],
    recovered_cells: Option<usize>,
    rng: &mut R,
) -> Result<FilterResult> {
    let recovered_cells = recovered_cells.unwrap_or(DEFAULT_RECOVERED_CELLS);
    if recovered_cells == 0 {
        return Err(CellCallError::InvalidConfig(
            "recovered cells must be a positive number".to_string(),
        ));
    }

    let max_filtered_bcs = determine_max_filtered_bcs(recovered_cells);
    let mut metrics = FilterMetrics {
        max_filtered_bcs,
        ..FilterMetrics::default()
    };

    let nonzero_bc_counts: Vec<Umis> = bc_counts.iter().cloned().filter(|&c| c > 0).collect();
    if nonzero_bc_counts.is_empty() {
        let msg = "All barcodes do not have enough reads for ordmag, allowing no bcs through";
        warn!("{}", msg);
        return Ok(FilterResult {
            barcodes: Vec::new(),
            metrics,
            warning: Some(msg.to_string()),
        });
    }

    let baseline_bc_idx = (recovered_cells as f64 * (1.0 - ORDMAG_RECOVERED_CELLS_QUANTILE))
        .round_ties_even() as usize;
    let baseline_bc_idx = baseline_bc_idx.min(nonzero_bc_counts.len() - 1);
    if baseline_bc_idx >= max_filtered_bcs {
        return Err(CellCallError::InvariantViolation(format!(
            "baseline barcode index {} is not below the max filtered barcodes {}",
            baseline_bc_idx, max_filtered_bcs
        )));
    }
    debug!(
        "ordmag: {} nonzero barcodes, baseline index {}, max filtered barcodes {}",
        nonzero_bc_counts.len(),
        baseline_bc_idx,
        max_filtered_bcs
    );

    // Bootstrap sampling; run the estimate on many resamples of the data
    let n = nonzero_bc_counts.len();
    let mut sample = vec![0; n];
    let top_n_boot: Vec<usize> = (0..ORDMAG_NUM_BOOTSTRAP_SAMPLES)
        .map(|_| {
            for s in sample.iter_mut() {
                *s = nonzero_bc_counts[rng.random_range(0..n)];
            }
            find_within_ordmag(&mut sample, baseline_bc_idx)
        })
        .collect();

    let (filtered_bcs, filtered_bcs_var) = summarize_bootstrapped_top_n(&top_n_boot);
    metrics.filtered_bcs = filtered_bcs;
    metrics.filtered_bcs_var = filtered_bcs_var;
    info!(
        "ordmag: keeping {} barcodes (bootstrap variance {:.3})",
        filtered_bcs, filtered_bcs_var
    );

    Ok(FilterResult {
        barcodes: top_n_barcodes(bc_counts, filtered_bcs),
        metrics,
        warning: None,
    })
}

/// Keep the `cutoff` barcodes with the most UMIs, never more than the number of
/// barcodes with a nonzero count.
pub fn filter_cellular_barcodes_fixed_cutoff(bc_counts: &[Umis], cutoff: usize) -> FilterResult {
    let nonzero_bcs = bc_counts.iter().filter(|&&c| c > 0).count();
    let top_n = cutoff.min(nonzero_bcs);
    info!("fixed cutoff: keeping {} of {} requested barcodes", top_n, cutoff);

    FilterResult {
        barcodes: top_n_barcodes(bc_counts, top_n),
        metrics: FilterMetrics {
            filtered_bcs: top_n,
            filtered_bcs_var: 0.0,
            max_filtered_bcs: 0,
            filtered_bcs_lb: Some(top_n),
            filtered_bcs_ub: Some(top_n),
            filtered_bcs_cv: Some(0.0),
        },
        warning: None,
    }
}
