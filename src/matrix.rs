// Copyright (c) 2019 10x Genomics, Inc. All rights reserved.

//! Helpers over the feature x barcode count matrix. All routines work on the
//! barcode-major (CSC) layout, where each outer vector is one barcode.

use std::borrow::Cow;

use sprs::CsMat;

use crate::config::{CountMatrix, Umis};
use crate::errors::{CellCallError, Result};

/// Borrow the matrix if it is already CSC, otherwise build a CSC copy.
pub fn barcode_major(matrix: &CountMatrix) -> Cow<'_, CountMatrix> {
    if matrix.is_csc() {
        Cow::Borrowed(matrix)
    } else {
        Cow::Owned(matrix.to_csc())
    }
}

/// Total UMIs of each barcode (column sums).
pub fn barcode_totals(matrix: &CountMatrix) -> Vec<Umis> {
    let matrix = barcode_major(matrix);
    matrix
        .outer_iterator()
        .map(|bc| bc.iter().map(|(_, &v)| Umis::from(v)).sum())
        .collect()
}

/// Total UMIs of each feature (row sums) over the given barcodes.
pub fn feature_totals(matrix: &CountMatrix, barcodes: &[usize]) -> Vec<Umis> {
    let matrix = barcode_major(matrix);
    let mut totals = vec![0; matrix.rows()];
    for &bc in barcodes {
        if let Some(col) = matrix.outer_view(bc) {
            for (feature, &v) in col.iter() {
                totals[feature] += Umis::from(v);
            }
        }
    }
    totals
}

/// Build a matrix holding only the requested barcodes (in the given order)
/// and only the requested features (rows are renumbered to their position in
/// `features`). `features` must be strictly increasing; `None` keeps every row.
pub fn select(
    matrix: &CountMatrix,
    features: Option<&[usize]>,
    barcodes: &[usize],
) -> Result<CountMatrix> {
    let matrix = barcode_major(matrix);

    let row_map: Option<Vec<Option<usize>>> = match features {
        Some(features) => {
            let mut map = vec![None; matrix.rows()];
            for (new_row, &feature) in features.iter().enumerate() {
                if feature >= matrix.rows() {
                    return Err(CellCallError::InvalidInput(format!(
                        "feature index {} out of range for a matrix with {} features",
                        feature,
                        matrix.rows()
                    )));
                }
                if new_row > 0 && features[new_row - 1] >= feature {
                    return Err(CellCallError::InvalidInput(
                        "feature indices must be strictly increasing".to_string(),
                    ));
                }
                map[feature] = Some(new_row);
            }
            Some(map)
        }
        None => None,
    };
    let nrows = features.map_or(matrix.rows(), |f| f.len());

    let mut indptr = Vec::with_capacity(barcodes.len() + 1);
    let mut indices = Vec::new();
    let mut data = Vec::new();
    indptr.push(0);

    for &bc in barcodes {
        let col = matrix.outer_view(bc).ok_or_else(|| {
            CellCallError::InvalidInput(format!(
                "barcode index {} out of range for a matrix with {} barcodes",
                bc,
                matrix.cols()
            ))
        })?;
        for (feature, &v) in col.iter() {
            let row = match &row_map {
                Some(map) => map[feature],
                None => Some(feature),
            };
            if let Some(row) = row {
                indices.push(row);
                data.push(v);
            }
        }
        indptr.push(indices.len());
    }

    Ok(CsMat::new_csc((nrows, barcodes.len()), indptr, indices, data))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sprs::TriMat;

    /// 3 features x 4 barcodes:
    /// ```text
    ///  1 0 2 0
    ///  0 0 3 1
    ///  4 0 0 5
    /// ```
    pub(crate) fn small_matrix() -> CountMatrix {
        let mut tri = TriMat::new((3, 4));
        tri.add_triplet(0, 0, 1u32);
        tri.add_triplet(2, 0, 4);
        tri.add_triplet(0, 2, 2);
        tri.add_triplet(1, 2, 3);
        tri.add_triplet(1, 3, 1);
        tri.add_triplet(2, 3, 5);
        tri.to_csc()
    }

    #[test]
    fn totals_per_barcode() {
        let m = small_matrix();
        assert_eq!(barcode_totals(&m), vec![5, 0, 5, 6]);
        assert_eq!(barcode_totals(&m.to_csr()), vec![5, 0, 5, 6]);
    }

    #[test]
    fn totals_per_feature() {
        let m = small_matrix();
        assert_eq!(feature_totals(&m, &[0, 1, 2, 3]), vec![3, 4, 9]);
        assert_eq!(feature_totals(&m, &[3]), vec![0, 1, 5]);
    }

    #[test]
    fn select_rows_and_columns() {
        let m = small_matrix();
        let sub = select(&m, Some(&[1, 2][..]), &[3, 0]).unwrap();
        assert_eq!(sub.shape(), (2, 2));
        assert_eq!(barcode_totals(&sub), vec![6, 4]);
        assert_eq!(sub.get(0, 0), Some(&1));
        assert_eq!(sub.get(1, 0), Some(&5));
        assert_eq!(sub.get(1, 1), Some(&4));
        assert_eq!(sub.get(0, 1), None);
    }

    #[test]
    fn select_rejects_bad_indices() {
        let m = small_matrix();
        assert!(select(&m, None, &[7]).is_err());
        assert!(select(&m, Some(&[2, 1][..]), &[0]).is_err());
        assert!(select(&m, Some(&[3][..]), &[0]).is_err());
    }
}
