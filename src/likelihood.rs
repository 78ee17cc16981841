// Copyright (c) 2019 10x Genomics, Inc. All rights reserved.

use std::mem::size_of;

use log::debug;
use statrs::function::factorial::ln_factorial;

use crate::background::BackgroundProfile;
use crate::config::{CountMatrix, Umis};
use crate::errors::{CellCallError, Result};
use crate::matrix::select;

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

/// Log of the multinomial PMF of `counts` with N = sum(counts), given the log
/// probability of each category.
pub fn multinomial_log_pmf<C>(counts: &[C], log_p: &[f64]) -> f64
where
    C: Copy + Into<Umis>,
{
    let mut n: Umis = 0;
    let mut ll = 0.0;
    for (&c, &lp) in counts.iter().zip(log_p) {
        let c: Umis = c.into();
        if c > 0 {
            n += c;
            ll += c as f64 * lp - ln_factorial(c);
        }
    }
    ll + ln_factorial(n)
}

/// Number of barcodes whose dense count block fits into `max_mem_gb`. Always at
/// least 1, so a single barcode may exceed the budget when features are plentiful.
pub fn barcodes_per_chunk(num_features: usize, max_mem_gb: f64) -> usize {
    let gb_per_bc = (num_features.max(1) * size_of::<u32>()) as f64 / BYTES_PER_GB;
    ((max_mem_gb / gb_per_bc).round() as usize).max(1)
}

pub(crate) fn check_eval_inputs(profile: &BackgroundProfile, max_mem_gb: f64) -> Result<()> {
    if !(max_mem_gb > 0.0) {
        return Err(CellCallError::InvalidConfig(format!(
            "memory budget must be positive, got {} GB",
            max_mem_gb
        )));
    }
    if profile.is_empty() {
        return Err(CellCallError::InvalidInput("background profile is empty".to_string()));
    }
    Ok(())
}

/// Multinomial log-likelihood of every barcode under the profile.
///
/// Counts on features outside the profile are ignored, so each barcode's N is
/// its UMI total over the profile features. Barcodes are densified a chunk at a
/// time, the chunk size chosen to keep each dense block within `max_mem_gb`.
pub fn eval_multinomial_loglikelihoods(
    matrix: &CountMatrix,
    profile: &BackgroundProfile,
    max_mem_gb: f64,
) -> Result<Vec<f64>> {
    check_eval_inputs(profile, max_mem_gb)?;
    let all_barcodes: Vec<usize> = (0..matrix.cols()).collect();
    let matrix = select(matrix, Some(profile.features.as_slice()), &all_barcodes)?;
    Ok(eval_restricted_loglikelihoods(&matrix, profile, max_mem_gb))
}

/// Chunked evaluation over a matrix whose rows are already the profile
/// features, in profile order.
pub(crate) fn eval_restricted_loglikelihoods(
    matrix: &CountMatrix,
    profile: &BackgroundProfile,
    max_mem_gb: f64,
) -> Vec<f64> {
    let log_p: Vec<f64> = profile.probs.iter().map(|p| p.ln()).collect();
    let num_features = profile.len();
    let num_bcs = matrix.cols();
    let bcs_per_chunk = barcodes_per_chunk(num_features, max_mem_gb);
    debug!(
        "Evaluating {} barcodes over {} features, {} barcodes per chunk",
        num_bcs, num_features, bcs_per_chunk
    );

    let mut loglk = Vec::with_capacity(num_bcs);
    let mut dense = vec![0u32; bcs_per_chunk.min(num_bcs) * num_features];

    for chunk_start in (0..num_bcs).step_by(bcs_per_chunk) {
        let chunk_end = (chunk_start + bcs_per_chunk).min(num_bcs);
        let block = &mut dense[..(chunk_end - chunk_start) * num_features];
        for v in block.iter_mut() {
            *v = 0;
        }

        for (row, bc) in (chunk_start..chunk_end).enumerate() {
            if let Some(col) = matrix.outer_view(bc) {
                let row_counts = &mut block[row * num_features..(row + 1) * num_features];
                for (feature, &v) in col.iter() {
                    row_counts[feature] = v;
                }
            }
        }

        loglk.extend(
            block
                .chunks(num_features)
                .map(|row_counts| multinomial_log_pmf(row_counts, &log_p)),
        );
    }

    loglk
}
