// Copyright (c) 2019 10x Genomics, Inc. All rights reserved.

//! Test barcodes against the ambient RNA profile: estimate the profile from the
//! low-count barcodes, score each barcode under it and attach a simulated
//! p-value. Calling cells from the p-values is up to the caller.

use log::{debug, info};
use rand::Rng;

use crate::background::{est_background_profile_bottom, BackgroundProfile};
use crate::config::{CountMatrix, Umis, DEFAULT_BOTTOM_FRAC, DEFAULT_MAX_MEM_GB};
use crate::errors::Result;
use crate::likelihood::{check_eval_inputs, eval_restricted_loglikelihoods};
use crate::matrix::{barcode_totals, select};
use crate::pvalue::compute_ambient_pvalues;
use crate::simulate::{simulate_multinomial_loglikelihoods, SimulationParams};

#[derive(Clone, Debug, PartialEq)]
pub struct AmbientParams {
    /// Fraction of all UMIs, taken from the lowest-count barcodes, that make up the profile.
    pub bottom_frac: f64,
    /// Memory budget for densifying barcodes during likelihood evaluation.
    pub max_mem_gb: f64,
    pub simulation: SimulationParams,
}

impl Default for AmbientParams {
    fn default() -> Self {
        AmbientParams {
            bottom_frac: DEFAULT_BOTTOM_FRAC,
            max_mem_gb: DEFAULT_MAX_MEM_GB,
            simulation: SimulationParams::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AmbientTestResult {
    pub profile: BackgroundProfile,
    /// Tested barcode indices into the input matrix, in the order given. Barcodes
    /// without UMIs on the profile features have no likelihood to test and are
    /// left out.
    pub barcodes: Vec<usize>,
    /// UMIs of each tested barcode over the profile features.
    pub umis: Vec<Umis>,
    pub log_likelihoods: Vec<f64>,
    pub pvalues: Vec<f64>,
}

/// Run the ambient test on `test_barcodes` of a feature x barcode matrix.
pub fn run_ambient_test<R: Rng>(
    matrix: &CountMatrix,
    test_barcodes: &[usize],
    params: &AmbientParams,
    rng: &mut R,
) -> Result<AmbientTestResult> {
    let profile = est_background_profile_bottom(matrix, params.bottom_frac)?;
    check_eval_inputs(&profile, params.max_mem_gb)?;

    // one copy of the tested barcodes over the profile features serves both the
    // totals and the likelihoods
    let test_matrix = select(matrix, Some(profile.features.as_slice()), test_barcodes)?;
    let all_umis = barcode_totals(&test_matrix);
    let all_loglk = eval_restricted_loglikelihoods(&test_matrix, &profile, params.max_mem_gb);
    drop(test_matrix);

    let mut barcodes = Vec::with_capacity(test_barcodes.len());
    let mut umis = Vec::with_capacity(test_barcodes.len());
    let mut log_likelihoods = Vec::with_capacity(test_barcodes.len());
    for ((&bc, &n), &ll) in test_barcodes.iter().zip(&all_umis).zip(&all_loglk) {
        if n > 0 {
            barcodes.push(bc);
            umis.push(n);
            log_likelihoods.push(ll);
        }
    }
    if barcodes.len() < test_barcodes.len() {
        debug!(
            "Ambient test: skipping {} barcodes with no UMIs on the profile features",
            test_barcodes.len() - barcodes.len()
        );
    }

    let null = simulate_multinomial_loglikelihoods(&profile.probs, &umis, &params.simulation, rng)?;
    let pvalues = compute_ambient_pvalues(&umis, &log_likelihoods, &null)?;

    info!(
        "Ambient test: {} barcodes tested against {} profile features",
        barcodes.len(),
        profile.len()
    );

    Ok(AmbientTestResult {
        profile,
        barcodes,
        umis,
        log_likelihoods,
        pvalues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::{create_rng, sample_multinomial};
    use rand::Rng;
    use sprs::TriMat;

    fn random_profile<R: Rng>(n: usize, rng: &mut R) -> Vec<f64> {
        let w: Vec<f64> = (0..n).map(|_| rng.random_range(0.1..1.0)).collect();
        let s: f64 = w.iter().sum();
        w.iter().map(|x| x / s).collect()
    }

    #[test]
    fn cells_stand_out_from_background() {
        let mut rng = create_rng(Some(2024));
        let n_features = 100;
        let ambient = random_profile(n_features, &mut rng);
        // cells express a handful of features strongly
        let mut cell = vec![0.002; n_features];
        for p in cell.iter_mut().take(10) {
            *p = 0.08;
        }
        let s: f64 = cell.iter().sum();
        let cell: Vec<f64> = cell.iter().map(|p| p / s).collect();

        let mut tri = TriMat::new((n_features, 100));
        for bc in 0..100usize {
            let counts = if bc < 2 {
                sample_multinomial(1000 + bc as Umis * 7, &cell, &mut rng).unwrap()
            } else {
                sample_multinomial(80 + (bc as Umis % 40), &ambient, &mut rng).unwrap()
            };
            for (f, &c) in counts.iter().enumerate() {
                if c > 0 {
                    tri.add_triplet(f, bc, c as u32);
                }
            }
        }
        let matrix = tri.to_csc();

        let params = AmbientParams {
            bottom_frac: 0.8,
            ..AmbientParams::default()
        };
        let all: Vec<usize> = (0..100).collect();
        let res = run_ambient_test(&matrix, &all, &params, &mut rng).unwrap();

        assert_eq!(res.pvalues.len(), 100);
        assert!(res.pvalues.iter().all(|&p| p > 0.0));
        assert!(res.pvalues[0] < 0.01 && res.pvalues[1] < 0.01, "{:?}", &res.pvalues[..2]);

        let mut bg: Vec<f64> = res.pvalues[2..].to_vec();
        bg.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median = bg[bg.len() / 2];
        assert!(median > 0.3, "median background p-value {}", median);
    }

    #[test]
    fn tests_a_subset() {
        let mut rng = create_rng(Some(9));
        let profile = random_profile(20, &mut rng);
        let mut tri = TriMat::new((20, 30));
        for bc in 0..30usize {
            let counts = sample_multinomial(50, &profile, &mut rng).unwrap();
            for (f, &c) in counts.iter().enumerate() {
                if c > 0 {
                    tri.add_triplet(f, bc, c as u32);
                }
            }
        }
        let matrix = tri.to_csc();
        let params = AmbientParams {
            bottom_frac: 1.0,
            simulation: SimulationParams {
                num_sims: 100,
                ..SimulationParams::default()
            },
            ..AmbientParams::default()
        };
        let res = run_ambient_test(&matrix, &[4, 17, 2], &params, &mut rng).unwrap();
        assert_eq!(res.barcodes, vec![4, 17, 2]);
        assert_eq!(res.umis.len(), 3);
        // the whole matrix makes up the profile, so nothing is dropped
        assert!(res.umis.iter().all(|&u| u == 50));
        assert_eq!(res.log_likelihoods.len(), 3);
        assert!(res.pvalues.iter().all(|&p| p >= 1.0 / 101.0 && p <= 1.0));
    }

    #[test]
    fn barcodes_off_profile_are_not_tested() {
        // barcodes 0-4 only use features 0 and 1 and make up the profile;
        // barcode 5 has all of its UMIs on feature 2
        let mut tri = TriMat::new((3, 6));
        for bc in 0..5usize {
            tri.add_triplet(0, bc, 2 + bc as u32);
            tri.add_triplet(1, bc, 3u32);
        }
        tri.add_triplet(2, 5, 20u32);
        let matrix = tri.to_csc();

        let params = AmbientParams {
            bottom_frac: 0.5,
            simulation: SimulationParams {
                num_sims: 99,
                ..SimulationParams::default()
            },
            ..AmbientParams::default()
        };
        let mut rng = create_rng(Some(5));
        let all: Vec<usize> = (0..6).collect();
        let res = run_ambient_test(&matrix, &all, &params, &mut rng).unwrap();

        assert_eq!(res.profile.features, vec![0, 1]);
        assert_eq!(res.barcodes, vec![0, 1, 2, 3, 4]);
        assert_eq!(res.umis, vec![5, 6, 7, 8, 9]);
        assert_eq!(res.log_likelihoods.len(), 5);
        assert_eq!(res.pvalues.len(), 5);
    }

    #[test]
    fn nothing_on_profile_gives_empty_result() {
        let mut tri = TriMat::new((3, 4));
        for bc in 0..3usize {
            tri.add_triplet(0, bc, 1 + bc as u32);
        }
        tri.add_triplet(2, 3, 50u32);
        let matrix = tri.to_csc();
        let params = AmbientParams {
            bottom_frac: 0.1,
            ..AmbientParams::default()
        };
        let mut rng = create_rng(Some(3));
        let res = run_ambient_test(&matrix, &[3], &params, &mut rng).unwrap();
        assert!(res.barcodes.is_empty());
        assert!(res.pvalues.is_empty());
    }
}
