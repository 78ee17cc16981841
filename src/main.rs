// Copyright (c) 2019 10x Genomics, Inc. All rights reserved.

use clap::{App, Arg, ArgMatches};
use failure::{format_err, Error};
use human_panic::setup_panic;
use log::{info, warn};
use serde::Serialize;
use simplelog::*;
use terminal_size::{terminal_size, Width};

use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;

use sc_cell_call::config::{
    DEFAULT_BOTTOM_FRAC, DEFAULT_JUMP, DEFAULT_MAX_MEM_GB, DEFAULT_NUM_SIMS,
    DEFAULT_RECOVERED_CELLS, DEFAULT_SAMPLE_FEATURE_BLOCK,
};
use sc_cell_call::io::{load_barcodes, load_matrix, write_csv};
use sc_cell_call::matrix::barcode_totals;
use sc_cell_call::{
    create_rng, filter_cellular_barcodes_fixed_cutoff, filter_cellular_barcodes_ordmag,
    run_ambient_test, AmbientParams, SimulationParams,
};

fn get_args() -> clap::App<'static, 'static> {
    App::new("sc_cell_call")
    .set_term_width(if let Some((Width(w), _)) = terminal_size() { w as usize } else { 120 })
    .version("DEV")
    .about("Cell calling for droplet single-cell RNA sequencing")
    // Required parameters
    .arg(Arg::with_name("matrix")
         .short("m")
         .long("matrix")
         .value_name("FILE")
         .help("Feature x barcode UMI count matrix in Matrix Market format (plain or gzipped)")
         .required(true))
    // Input parameters (optional)
    .arg(Arg::with_name("barcodes")
         .short("b")
         .long("barcodes")
         .value_name("FILE")
         .help("Barcode names, one per matrix column (plain or gzipped)"))
    // Output parameters (optional)
    .arg(Arg::with_name("out_dir")
         .short("o")
         .long("out-dir")
         .value_name("OUTPUT_DIR")
         .default_value("cell-calls"))
    // Configuration parameters (optional)
    .arg(Arg::with_name("recovered_cells")
         .long("recovered-cells")
         .value_name("N")
         .help("Expected number of recovered cells [default: 3000]"))
    .arg(Arg::with_name("force_cells")
         .long("force-cells")
         .value_name("N")
         .conflicts_with("recovered_cells")
         .help("Keep the top N barcodes by UMI count instead of estimating the cutoff"))
    .arg(Arg::with_name("bottom_frac")
         .long("bottom-frac")
         .value_name("FRACTION")
         .help("Fraction of all UMIs, from the lowest-count barcodes, used for the ambient profile [default: 0.05]"))
    .arg(Arg::with_name("min_umis")
         .long("min-umis")
         .value_name("N")
         .help("Only test barcodes with at least N UMIs against the ambient profile [default: 1]"))
    .arg(Arg::with_name("num_sims")
         .long("num-sims")
         .value_name("N")
         .help("Number of simulated log-likelihoods per distinct UMI count [default: 1000]"))
    .arg(Arg::with_name("jump")
         .long("jump")
         .value_name("N")
         .help("Simulate UMI count gaps of at least N with a single draw [default: 1000]"))
    .arg(Arg::with_name("max_mem_gb")
         .long("max-mem-gb")
         .value_name("GB")
         .help("Memory budget for densifying barcodes during likelihood evaluation [default: 0.1]"))
    .arg(Arg::with_name("seed")
         .long("seed")
         .value_name("N")
         .help("Random seed; drawn from the OS when omitted"))
    .arg(Arg::with_name("log_level")
         .long("log-level")
         .possible_values(&["info", "debug", "error"])
         .default_value("error")
         .help("Logging level"))
}

fn main() {
    setup_panic!();  // pretty panics for users
    let cli_args: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let res = _main(cli_args);
    if let Err(e) = res {
        println!("Failed with error: {}", e);
        process::exit(1);
    }
}

#[derive(Serialize)]
struct BarcodeCall<'a> {
    barcode: &'a str,
    umis: u64,
    ordmag_selected: bool,
    tested: bool,
    profile_umis: Option<u64>,
    log_likelihood: Option<f64>,
    pvalue: Option<f64>,
}

#[derive(Serialize)]
struct MetricsRow {
    method: &'static str,
    filtered_bcs: usize,
    filtered_bcs_var: f64,
    max_filtered_bcs: usize,
    filtered_bcs_lb: Option<usize>,
    filtered_bcs_ub: Option<usize>,
    filtered_bcs_cv: Option<f64>,
    warning: Option<String>,
}

#[derive(Serialize)]
struct ProfileRow {
    feature_index: usize,
    probability: f64,
}

fn parse_arg<T: FromStr>(args: &ArgMatches, name: &str, default: T) -> Result<T, Error> {
    match args.value_of(name) {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| format_err!("Invalid value for {}: {}", name, v)),
    }
}

// constructing a _main allows for us to run regression tests way more easily
fn _main(cli_args: Vec<String>) -> Result<(), Error> {
    let args = get_args().get_matches_from(cli_args);
    let matrix_file = args.value_of("matrix").expect("You must provide a matrix file");
    let barcodes_file = args.value_of("barcodes");
    let out_dir = args.value_of("out_dir").unwrap_or_default();
    let recovered_cells = parse_arg(&args, "recovered_cells", DEFAULT_RECOVERED_CELLS)?;
    let force_cells: Option<usize> = match args.value_of("force_cells") {
        Some(_) => Some(parse_arg(&args, "force_cells", 0)?),
        None => None,
    };
    let seed: Option<u64> = match args.value_of("seed") {
        Some(_) => Some(parse_arg(&args, "seed", 0)?),
        None => None,
    };
    let min_umis: u64 = parse_arg(&args, "min_umis", 1)?;
    let params = AmbientParams {
        bottom_frac: parse_arg(&args, "bottom_frac", DEFAULT_BOTTOM_FRAC)?,
        max_mem_gb: parse_arg(&args, "max_mem_gb", DEFAULT_MAX_MEM_GB)?,
        simulation: SimulationParams {
            num_sims: parse_arg(&args, "num_sims", DEFAULT_NUM_SIMS)?,
            jump: parse_arg(&args, "jump", DEFAULT_JUMP)?,
            n_sample_feature_block: DEFAULT_SAMPLE_FEATURE_BLOCK,
        },
    };
    let ll = args.value_of("log_level").unwrap_or("error");

    let ll = match ll {
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "error" => LevelFilter::Error,
        &_ => { return Err(format_err!("Log level must be 'info', 'debug', or 'error'")); }
    };
    let _ = SimpleLogger::init(ll, Config::default());

    check_inputs_exist(matrix_file, barcodes_file, out_dir)?;

    let matrix = load_matrix(matrix_file)?;
    let barcodes = match barcodes_file {
        Some(f) => load_barcodes(f)?,
        None => (0..matrix.cols()).map(|i| i.to_string()).collect(),
    };
    if barcodes.len() != matrix.cols() {
        return Err(format_err!(
            "Matrix has {} barcodes but {} barcode names were given",
            matrix.cols(),
            barcodes.len()
        ));
    }
    info!("Loaded a {} features x {} barcodes matrix", matrix.rows(), matrix.cols());

    let umis = barcode_totals(&matrix);
    let mut rng = create_rng(seed);

    let (method, filter) = match force_cells {
        Some(cutoff) => ("fixed_cutoff", filter_cellular_barcodes_fixed_cutoff(&umis, cutoff)),
        None => ("ordmag", filter_cellular_barcodes_ordmag(&umis, Some(recovered_cells), &mut rng)?),
    };
    if let Some(w) = &filter.warning {
        warn!("{}", w);
    }
    info!("Filter ({}) kept {} barcodes", method, filter.metrics.filtered_bcs);

    let mut selected = vec![false; matrix.cols()];
    for &bc in &filter.barcodes {
        selected[bc] = true;
    }

    let test_barcodes: Vec<usize> = (0..matrix.cols()).filter(|&bc| umis[bc] >= min_umis).collect();
    let ambient = if test_barcodes.is_empty() {
        warn!("No barcodes with at least {} UMIs, skipping the ambient test", min_umis);
        None
    } else {
        Some(run_ambient_test(&matrix, &test_barcodes, &params, &mut rng)?)
    };

    let mut tested: Vec<Option<usize>> = vec![None; matrix.cols()];
    if let Some(res) = &ambient {
        for (i, &bc) in res.barcodes.iter().enumerate() {
            tested[bc] = Some(i);
        }
    }

    let d: PathBuf = [out_dir, "barcode_calls.csv"].iter().collect();
    write_csv(
        d,
        (0..matrix.cols()).map(|bc| {
            let t = tested[bc].and_then(|i| ambient.as_ref().map(|res| (res, i)));
            BarcodeCall {
                barcode: &barcodes[bc],
                umis: umis[bc],
                ordmag_selected: selected[bc],
                tested: t.is_some(),
                profile_umis: t.map(|(res, i)| res.umis[i]),
                log_likelihood: t.map(|(res, i)| res.log_likelihoods[i]),
                pvalue: t.map(|(res, i)| res.pvalues[i]),
            }
        }),
    )?;

    let d: PathBuf = [out_dir, "filter_metrics.csv"].iter().collect();
    write_csv(
        d,
        vec![MetricsRow {
            method,
            filtered_bcs: filter.metrics.filtered_bcs,
            filtered_bcs_var: filter.metrics.filtered_bcs_var,
            max_filtered_bcs: filter.metrics.max_filtered_bcs,
            filtered_bcs_lb: filter.metrics.filtered_bcs_lb,
            filtered_bcs_ub: filter.metrics.filtered_bcs_ub,
            filtered_bcs_cv: filter.metrics.filtered_bcs_cv,
            warning: filter.warning.clone(),
        }],
    )?;

    if let Some(res) = &ambient {
        let d: PathBuf = [out_dir, "background_profile.csv"].iter().collect();
        write_csv(
            d,
            res.profile
                .features
                .iter()
                .zip(&res.profile.probs)
                .map(|(&feature_index, &probability)| ProfileRow {
                    feature_index,
                    probability,
                }),
        )?;
    }
    info!("Wrote results to {}", out_dir);
    Ok(())
}

/* Validate Input/Output Files/Paths */

pub fn check_inputs_exist(matrix_file: &str, barcodes_file: Option<&str>, out_dir: &str)
                          -> Result<(), Error> {
    for path in Some(matrix_file).iter().chain(barcodes_file.iter()) {
        if !Path::new(path).exists() {
            return Err(format_err!("Input {:?} does not exist", path));
        }
    }
    if !Path::new(&out_dir).exists() {
        match create_dir_all(&out_dir) {
            Err(_e) => { return Err(format_err!("Couldn't create results directory at {}", out_dir)); }
            _ => { info!("Created output directory at {}", out_dir);}
        }
    } else { return Err(format_err!("Specified output directory {} already exists", out_dir)); }
    Ok(())
}
