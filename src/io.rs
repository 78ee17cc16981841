// Copyright (c) 2019 10x Genomics, Inc. All rights reserved.

use failure::{format_err, Error, ResultExt};
use log::debug;
use serde::Serialize;
use sprs::io::read_matrix_market_from_bufread;
use sprs::{CsMat, TriMat};
use std::{
    fs::File,
    io::{BufRead, BufReader, Read, Seek, SeekFrom},
    path::Path,
};

use crate::config::CountMatrix;

/// Open a reader for a text or gzip file
pub fn open_file(p: impl AsRef<Path>) -> Result<Box<dyn BufRead + Send>, Error> {
    let p = p.as_ref();

    let mut file = File::open(p).with_context(|_| format!("Error opening file: {:?}", p))?;

    let mut magic = [0u8; 2];
    let n = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    if n == 2 && magic == [0x1F, 0x8B] {
        let gz = flate2::read::MultiGzDecoder::new(file);
        Ok(Box::new(BufReader::with_capacity(1 << 17, gz)))
    } else {
        Ok(Box::new(BufReader::with_capacity(32 * 1024, file)))
    }
}

/// Load a feature x barcode Matrix Market file (plain or gzipped).
///
/// The reader needs a signed value type, so entries are parsed as `i64` and
/// must fit a `u32` count once duplicates are summed.
pub fn load_matrix(p: impl AsRef<Path>) -> Result<CountMatrix, Error> {
    let p = p.as_ref();
    let mut reader = open_file(p)?;
    let tri: TriMat<i64> = read_matrix_market_from_bufread(&mut reader)
        .with_context(|_| format!("Error reading Matrix Market file: {:?}", p))?;
    let signed: CsMat<i64> = tri.to_csc();
    if let Some(&bad) = signed
        .data()
        .iter()
        .find(|&&v| v < 0 || v > i64::from(u32::MAX))
    {
        return Err(format_err!(
            "Matrix Market file {:?} holds {}, counts must be between 0 and {}",
            p,
            bad,
            u32::MAX
        ));
    }
    let matrix: CountMatrix = signed.map(|&v| v as u32);
    debug!(
        "Loaded a {} features x {} barcodes matrix with {} nonzero entries",
        matrix.rows(),
        matrix.cols(),
        matrix.nnz()
    );
    Ok(matrix)
}

/// Load barcode names, one per line, taking the first tab-separated field.
pub fn load_barcodes(p: impl AsRef<Path>) -> Result<Vec<String>, Error> {
    let reader = open_file(p.as_ref())?;

    let mut barcodes = Vec::new();
    for l in reader.lines() {
        let l = l?;
        let bc = l.split('\t').next().unwrap_or_default().trim();
        if !bc.is_empty() {
            barcodes.push(bc.to_string());
        }
    }
    if barcodes.is_empty() {
        return Err(format_err!("Loaded 0 barcodes from {:?}. Is the file empty?", p.as_ref()));
    }
    debug!("Loaded {} barcodes", barcodes.len());
    Ok(barcodes)
}

/// Write `rows` to a CSV file, with a header taken from the row type.
pub fn write_csv<T: Serialize>(
    p: impl AsRef<Path>,
    rows: impl IntoIterator<Item = T>,
) -> Result<(), Error> {
    let p = p.as_ref();
    let mut writer =
        csv::Writer::from_path(p).with_context(|_| format!("Error creating file: {:?}", p))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
