// Copyright (c) 2019 10x Genomics, Inc. All rights reserved.

//! Cell calling for droplet single-cell data. Two strategies are provided: an
//! order-of-magnitude UMI threshold with a bootstrapped cutoff (`ordmag`), and a
//! test of each barcode against the ambient RNA profile with simulated
//! multinomial p-values (`background`, `likelihood`, `simulate`, `pvalue`,
//! composed in `ambient`).

pub mod ambient;
pub mod background;
pub mod config;
pub mod errors;
pub mod io;
pub mod likelihood;
pub mod matrix;
pub mod ordmag;
pub mod pvalue;
pub mod simulate;

pub use ambient::{run_ambient_test, AmbientParams, AmbientTestResult};
pub use background::{est_background_profile_bottom, BackgroundProfile};
pub use errors::CellCallError;
pub use likelihood::eval_multinomial_loglikelihoods;
pub use ordmag::{
    filter_cellular_barcodes_fixed_cutoff, filter_cellular_barcodes_ordmag, FilterMetrics,
    FilterResult,
};
pub use pvalue::compute_ambient_pvalues;
pub use simulate::{
    create_rng, simulate_multinomial_loglikelihoods, NullDistribution, SimulationParams,
};
