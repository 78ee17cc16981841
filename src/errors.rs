// Copyright (c) 2019 10x Genomics, Inc. All rights reserved.

use failure::Fail;

/// Failure modes of the cell-calling computations.
#[derive(Debug, Fail, Clone, PartialEq)]
pub enum CellCallError {
    /// A caller-supplied parameter is out of range. Raised before any work is done.
    #[fail(display = "invalid configuration: {}", _0)]
    InvalidConfig(String),

    /// The data handed in cannot be processed (shape mismatch, no counts, ...).
    #[fail(display = "invalid input: {}", _0)]
    InvalidInput(String),

    /// A statistical assumption did not hold mid-computation.
    #[fail(display = "invariant violated: {}", _0)]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, CellCallError>;
