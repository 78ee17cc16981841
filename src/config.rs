// Copyright (c) 2019 10x Genomics, Inc. All rights reserved.

/* Constants */
pub const DEFAULT_RECOVERED_CELLS: usize = 3000;
pub const MAX_RECOVERED_CELLS_MULTIPLE: usize = 6;
pub const ORDMAG_RECOVERED_CELLS_QUANTILE: f64 = 0.99;
pub const ORDMAG_NUM_BOOTSTRAP_SAMPLES: usize = 100;
pub const ORDMAG_CUTOFF_FRACTION: f64 = 0.1;

pub const DEFAULT_BOTTOM_FRAC: f64 = 0.05;
pub const PROFILE_SUM_RTOL: f64 = 1e-5;
pub const PROFILE_SUM_ATOL: f64 = 1e-8;

pub const DEFAULT_MAX_MEM_GB: f64 = 0.1;

pub const DEFAULT_NUM_SIMS: usize = 1000;
pub const DEFAULT_JUMP: u64 = 1000;
pub const DEFAULT_SAMPLE_FEATURE_BLOCK: usize = 1_000_000;

/* Types */
use sprs::CsMat;

/// Feature x barcode UMI count matrix.
pub type CountMatrix = CsMat<u32>;
pub type Umis = u64;
