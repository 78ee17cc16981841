// Copyright (c) 2019 10x Genomics, Inc. All rights reserved.

use log::info;

use crate::config::{CountMatrix, Umis, PROFILE_SUM_ATOL, PROFILE_SUM_RTOL};
use crate::errors::{CellCallError, Result};
use crate::matrix::{barcode_totals, feature_totals};

/// Ambient expression profile: multinomial probabilities over the features that
/// received any background counts. Every other feature has probability 0.
#[derive(Clone, Debug, PartialEq)]
pub struct BackgroundProfile {
    /// Feature (row) indices with nonzero background mass, ascending.
    pub features: Vec<usize>,
    /// Probability of each entry of `features`; sums to 1.
    pub probs: Vec<f64>,
}

impl BackgroundProfile {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Construct a background expression profile from the barcodes that make up the
/// bottom `bottom_frac` of the UMI counts.
///
/// Barcodes are ranked by total UMIs, and the shortest prefix whose cumulative
/// share of all UMIs reaches `bottom_frac` is pooled. With `bottom_frac == 1` the
/// whole matrix is pooled.
pub fn est_background_profile_bottom(
    matrix: &CountMatrix,
    bottom_frac: f64,
) -> Result<BackgroundProfile> {
    if !(0.0..=1.0).contains(&bottom_frac) {
        return Err(CellCallError::InvalidConfig(format!(
            "bottom fraction must lie in [0, 1], got {}",
            bottom_frac
        )));
    }

    let umis_per_bc = barcode_totals(matrix);
    let total: Umis = umis_per_bc.iter().sum();
    if total == 0 {
        return Err(CellCallError::InvalidInput(
            "cannot estimate a background profile from an all-zero matrix".to_string(),
        ));
    }

    let mut barcode_order: Vec<usize> = (0..umis_per_bc.len()).collect();
    barcode_order.sort_by_key(|&bc| umis_per_bc[bc]);

    // cumulative sums are exact integers, so the last fraction is exactly 1
    let mut cum: Umis = 0;
    let mut n_bg = barcode_order.len();
    for (i, &bc) in barcode_order.iter().enumerate() {
        cum += umis_per_bc[bc];
        if cum as f64 / total as f64 >= bottom_frac {
            n_bg = i + 1;
            break;
        }
    }
    let bg_barcodes = &barcode_order[..n_bg];

    let bg_counts = feature_totals(matrix, bg_barcodes);
    let (features, counts): (Vec<usize>, Vec<Umis>) = bg_counts
        .into_iter()
        .enumerate()
        .filter(|&(_, c)| c > 0)
        .unzip();

    let bg_total: Umis = counts.iter().sum();
    if bg_total == 0 {
        return Err(CellCallError::InvalidInput(format!(
            "the bottom {} of barcodes carry no UMIs",
            bottom_frac
        )));
    }
    let probs: Vec<f64> = counts.iter().map(|&c| c as f64 / bg_total as f64).collect();

    let sum: f64 = probs.iter().sum();
    if (sum - 1.0).abs() > PROFILE_SUM_ATOL + PROFILE_SUM_RTOL {
        return Err(CellCallError::InvariantViolation(format!(
            "background profile sums to {}",
            sum
        )));
    }

    info!(
        "Background profile: {} of {} barcodes pooled ({} UMIs), {} features",
        n_bg,
        umis_per_bc.len(),
        bg_total,
        features.len()
    );

    Ok(BackgroundProfile { features, probs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::tests::small_matrix;
    use sprs::TriMat;

    #[test]
    fn whole_matrix_profile() {
        let m = small_matrix();
        let p = est_background_profile_bottom(&m, 1.0).unwrap();
        assert_eq!(p.features, vec![0, 1, 2]);
        let expected = [3.0 / 16.0, 4.0 / 16.0, 9.0 / 16.0];
        for (a, b) in p.probs.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn bottom_prefix_only() {
        // totals [5, 0, 5, 6] -> order [1, 0, 2, 3], cumulative [0, 5, 10, 16] / 16
        let m = small_matrix();
        let p = est_background_profile_bottom(&m, 0.3).unwrap();
        // barcodes 1 and 0 are pooled: features 0 and 2
        assert_eq!(p.features, vec![0, 2]);
        assert!((p.probs[0] - 0.2).abs() < 1e-12);
        assert!((p.probs[1] - 0.8).abs() < 1e-12);
        let sum: f64 = p.probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_bad_fraction() {
        let m = small_matrix();
        for f in &[-0.1, 1.5, std::f64::NAN] {
            match est_background_profile_bottom(&m, *f) {
                Err(CellCallError::InvalidConfig(_)) => {}
                other => panic!("unexpected result {:?}", other),
            }
        }
    }

    #[test]
    fn rejects_empty_matrix() {
        let tri: TriMat<u32> = TriMat::new((4, 3));
        assert!(est_background_profile_bottom(&tri.to_csc(), 0.5).is_err());
    }

    #[test]
    fn profile_sums_to_one() {
        let mut tri = TriMat::new((50, 40));
        for bc in 0..40usize {
            for f in 0..50usize {
                let v = ((bc * 31 + f * 17) % 13) as u32;
                if v > 6 {
                    tri.add_triplet(f, bc, v * (1 + bc as u32 % 5));
                }
            }
        }
        let m = tri.to_csc();
        for &frac in &[0.01, 0.1, 0.5, 0.9, 1.0] {
            let p = est_background_profile_bottom(&m, frac).unwrap();
            let sum: f64 = p.probs.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
            assert_eq!(p.features.len(), p.probs.len());
            assert!(p.probs.iter().all(|&x| x > 0.0));
        }
    }
}
