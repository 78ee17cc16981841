// Copyright (c) 2019 10x Genomics, Inc. All rights reserved.

use crate::config::Umis;
use crate::errors::{CellCallError, Result};
use crate::simulate::NullDistribution;

/// Monte-Carlo p-value of each observed log-likelihood against the simulated
/// log-likelihoods for the same UMI total:
/// `(1 + #{simulated < observed}) / (1 + num_sims)`.
///
/// Every total must have a simulated row. Small p-values mark barcodes that are
/// unlikely to be ambient.
pub fn compute_ambient_pvalues(
    umis_per_bc: &[Umis],
    obs_loglk: &[f64],
    null: &NullDistribution,
) -> Result<Vec<f64>> {
    if umis_per_bc.len() != obs_loglk.len() {
        return Err(CellCallError::InvalidInput(format!(
            "{} UMI totals but {} log-likelihoods",
            umis_per_bc.len(),
            obs_loglk.len()
        )));
    }

    let denom = (1 + null.num_sims()) as f64;
    umis_per_bc
        .iter()
        .zip(obs_loglk)
        .map(|(&n, &obs)| -> Result<f64> {
            let row = null.row_index(n).ok_or_else(|| {
                CellCallError::InvalidInput(format!("no simulated log-likelihoods for N = {}", n))
            })?;
            let num_lower_loglk = null.row(row).iter().filter(|&&sim| sim < obs).count();
            Ok((1 + num_lower_loglk) as f64 / denom)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::{create_rng, simulate_multinomial_loglikelihoods, SimulationParams};

    fn null_for(totals: &[Umis], num_sims: usize) -> NullDistribution {
        let params = SimulationParams {
            num_sims,
            jump: 50,
            n_sample_feature_block: 256,
        };
        let mut rng = create_rng(Some(17));
        simulate_multinomial_loglikelihoods(&[0.6, 0.3, 0.1], totals, &params, &mut rng).unwrap()
    }

    #[test]
    fn laplace_bounds() {
        let null = null_for(&[10, 40], 99);
        let pv = compute_ambient_pvalues(&[10, 40], &[std::f64::NEG_INFINITY, std::f64::INFINITY], &null)
            .unwrap();
        assert!((pv[0] - 0.01).abs() < 1e-12);
        assert!((pv[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn never_zero_and_monotone() {
        let null = null_for(&[25], 200);
        let row = null.row(0);
        let lo = row.iter().cloned().fold(std::f64::INFINITY, f64::min);
        let hi = row.iter().cloned().fold(std::f64::NEG_INFINITY, f64::max);

        let obs: Vec<f64> = (0..=40).map(|i| lo - 1.0 + (hi - lo + 2.0) * i as f64 / 40.0).collect();
        let totals = vec![25; obs.len()];
        let pv = compute_ambient_pvalues(&totals, &obs, &null).unwrap();

        assert!(pv.iter().all(|&p| p > 0.0 && p <= 1.0));
        assert!(pv.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn missing_row_is_an_error() {
        let null = null_for(&[10], 10);
        assert!(compute_ambient_pvalues(&[11], &[-1.0], &null).is_err());
        assert!(compute_ambient_pvalues(&[10, 10], &[-1.0], &null).is_err());
    }
}
