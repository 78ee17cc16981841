// Copyright (c) 2019 10x Genomics, Inc. All rights reserved.

//! Simulation of the null distribution of multinomial log-likelihoods.
//!
//! A barcode that holds nothing but ambient RNA is a multinomial draw from the
//! background profile. For every distinct UMI total N under test we need many
//! such draws, and their log-likelihoods, to compare the observed barcodes
//! against. Drawing a fresh multinomial for every (N, replicate) pair is too slow
//! when the Ns are many and dense, so each replicate grows a single draw through
//! the sorted Ns instead (Lun et al., 2018): small gaps are filled one UMI at a
//! time with a closed-form update of the log-likelihood, large gaps with one
//! multinomial draw of the gap size.

use itertools::Itertools;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::weighted::WeightedAliasIndex;
use rand_distr::{Binomial, Distribution};

use crate::config::{Umis, DEFAULT_JUMP, DEFAULT_NUM_SIMS, DEFAULT_SAMPLE_FEATURE_BLOCK};
use crate::errors::{CellCallError, Result};
use crate::likelihood::multinomial_log_pmf;

/// Create a random number generator, seeded when a seed is given and from OS
/// entropy otherwise.
pub fn create_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_os_rng(),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimulationParams {
    /// Number of simulated log-likelihoods per distinct N.
    pub num_sims: usize,
    /// Gaps between consecutive Ns of at least this size are drawn in one go.
    pub jump: Umis,
    /// Number of feature draws generated at a time for unit steps.
    pub n_sample_feature_block: usize,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            num_sims: DEFAULT_NUM_SIMS,
            jump: DEFAULT_JUMP,
            n_sample_feature_block: DEFAULT_SAMPLE_FEATURE_BLOCK,
        }
    }
}

/// Simulated log-likelihoods: one row per distinct N (ascending), one column per
/// replicate.
#[derive(Clone, Debug, PartialEq)]
pub struct NullDistribution {
    distinct_n: Vec<Umis>,
    num_sims: usize,
    loglk: Vec<f64>,
}

impl NullDistribution {
    pub fn distinct_n(&self) -> &[Umis] {
        &self.distinct_n
    }

    pub fn num_sims(&self) -> usize {
        self.num_sims
    }

    /// Number of rows, i.e. distinct Ns.
    pub fn len(&self) -> usize {
        self.distinct_n.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distinct_n.is_empty()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.loglk[i * self.num_sims..(i + 1) * self.num_sims]
    }

    /// Row index of `n`, if it was simulated.
    pub fn row_index(&self, n: Umis) -> Option<usize> {
        self.distinct_n.binary_search(&n).ok()
    }
}

/// Draw one multinomial sample of size `n` by conditional binomials over the
/// categories.
pub fn sample_multinomial<R: Rng>(n: Umis, probs: &[f64], rng: &mut R) -> Result<Vec<Umis>> {
    let mut counts = vec![0; probs.len()];
    let mut remaining_n = n;
    let mut remaining_p = 1.0;

    for (i, &p) in probs.iter().enumerate() {
        if remaining_n == 0 {
            break;
        }
        if i + 1 == probs.len() {
            counts[i] = remaining_n;
            break;
        }
        let q = if remaining_p > 0.0 {
            (p / remaining_p).max(0.0).min(1.0)
        } else {
            1.0
        };
        let binom = Binomial::new(remaining_n, q).map_err(|e| {
            CellCallError::InvalidInput(format!("bad probability {} for feature {}: {}", p, i, e))
        })?;
        let x = binom.sample(rng);
        counts[i] = x;
        remaining_n -= x;
        remaining_p -= p;
    }
    Ok(counts)
}

/// Pool of i.i.d. feature draws from the profile, refilled a block at a time.
struct FeatureSampler {
    alias: WeightedAliasIndex<f64>,
    pool: Vec<usize>,
    pos: usize,
}

impl FeatureSampler {
    fn new<R: Rng>(probs: &[f64], block_size: usize, rng: &mut R) -> Result<FeatureSampler> {
        let alias = WeightedAliasIndex::new(probs.to_vec()).map_err(|e| {
            CellCallError::InvalidInput(format!("cannot sample from the profile: {}", e))
        })?;
        let mut sampler = FeatureSampler {
            alias,
            pool: vec![0; block_size],
            pos: 0,
        };
        sampler.refill(rng);
        Ok(sampler)
    }

    fn refill<R: Rng>(&mut self, rng: &mut R) {
        for slot in self.pool.iter_mut() {
            *slot = self.alias.sample(rng);
        }
        self.pos = 0;
    }

    fn next<R: Rng>(&mut self, rng: &mut R) -> usize {
        let j = self.pool[self.pos];
        self.pos += 1;
        if self.pos >= self.pool.len() {
            self.refill(rng);
        }
        j
    }
}

/// Running multinomial draw of one replicate and its log-likelihood.
struct NullWalk<'a> {
    log_p: &'a [f64],
    counts: Vec<Umis>,
    n: Umis,
    loglk: f64,
}

impl<'a> NullWalk<'a> {
    fn new(counts: Vec<Umis>, log_p: &'a [f64]) -> NullWalk<'a> {
        let n = counts.iter().sum();
        let loglk = multinomial_log_pmf(&counts, log_p);
        NullWalk {
            log_p,
            counts,
            n,
            loglk,
        }
    }

    /// Add one UMI to feature `j`.
    /// P(x + e_j | n + 1) / P(x | n) = p_j * (n + 1) / (x_j + 1)
    fn add_one(&mut self, j: usize) {
        self.n += 1;
        self.counts[j] += 1;
        self.loglk += self.log_p[j] + (self.n as f64 / self.counts[j] as f64).ln();
    }

    /// Add an independent multinomial draw and recompute the log-likelihood.
    fn add_sample(&mut self, sample: &[Umis]) -> Result<()> {
        for (c, &s) in self.counts.iter_mut().zip(sample) {
            *c += s;
        }
        self.n += sample.iter().sum::<Umis>();
        self.loglk = multinomial_log_pmf(&self.counts, self.log_p);
        if !self.loglk.is_finite() {
            return Err(CellCallError::InvariantViolation(format!(
                "non-finite simulated log-likelihood at N = {}",
                self.n
            )));
        }
        Ok(())
    }
}

/// Simulate multinomial log-likelihoods under `profile_p` for every distinct
/// value in `umis_per_bc`.
///
/// Each replicate starts from a draw at the smallest N and is grown to each
/// following N, either one UMI at a time or, when the gap is at least
/// `params.jump`, with a multinomial draw of the gap size (the sum of independent
/// multinomials with the same probabilities is multinomial).
pub fn simulate_multinomial_loglikelihoods<R: Rng>(
    profile_p: &[f64],
    umis_per_bc: &[Umis],
    params: &SimulationParams,
    rng: &mut R,
) -> Result<NullDistribution> {
    if params.num_sims == 0 {
        return Err(CellCallError::InvalidConfig(
            "number of simulations must be positive".to_string(),
        ));
    }
    if params.jump == 0 {
        return Err(CellCallError::InvalidConfig("jump must be positive".to_string()));
    }
    if params.n_sample_feature_block == 0 {
        return Err(CellCallError::InvalidConfig(
            "feature sampling block size must be positive".to_string(),
        ));
    }
    if profile_p.is_empty() {
        return Err(CellCallError::InvalidInput("background profile is empty".to_string()));
    }

    let distinct_n: Vec<Umis> = umis_per_bc.iter().cloned().sorted().dedup().collect();
    let num_sims = params.num_sims;
    let mut loglk = vec![0.0; distinct_n.len() * num_sims];

    if distinct_n.is_empty() {
        return Ok(NullDistribution {
            distinct_n,
            num_sims,
            loglk,
        });
    }

    info!("Number of distinct N supplied: {}", distinct_n.len());
    info!("Range of N: {}", distinct_n[distinct_n.len() - 1] - distinct_n[0]);
    info!("Number of features: {}", profile_p.len());

    let log_p: Vec<f64> = profile_p.iter().map(|p| p.ln()).collect();
    let mut sampler = FeatureSampler::new(profile_p, params.n_sample_feature_block, rng)?;

    for sim_idx in 0..num_sims {
        let counts = sample_multinomial(distinct_n[0], profile_p, rng)?;
        let mut walk = NullWalk::new(counts, &log_p);
        loglk[sim_idx] = walk.loglk;

        for i in 1..distinct_n.len() {
            let step = distinct_n[i] - distinct_n[i - 1];
            if step >= params.jump {
                let sample = sample_multinomial(step, profile_p, rng)?;
                walk.add_sample(&sample)?;
            } else {
                for _ in 0..step {
                    let j = sampler.next(rng);
                    walk.add_one(j);
                }
            }
            loglk[i * num_sims + sim_idx] = walk.loglk;
        }

        if sim_idx % 100 == 99 {
            debug!("Simulated {} of {} replicates", sim_idx + 1, num_sims);
        }
    }

    Ok(NullDistribution {
        distinct_n,
        num_sims,
        loglk,
    })
}
