//! Per-method assembly of token features into one document vector.

use ndarray::{Array1, Array2, Axis};

use crate::constants::methods::{
    JACOBI_EPSILON, JACOBI_MAX_SWEEPS, SINGULAR_VALUE_CUTOFF, UNIT_NORM_TOLERANCE,
};
use crate::errors::ScoringError;
use crate::methods::{MethodParams, PosBuckets, ScoringMethod, TokenFeatures, WeightedTokens};
use crate::types::Vector;

/// Assemble the document vector for `method`.
///
/// Empty documents yield the all-zero vector of the method's dimension. Every
/// returned vector is checked for non-finite values.
pub fn assemble(
    method: ScoringMethod,
    features: &TokenFeatures,
    dim: usize,
    params: &MethodParams,
) -> Result<Vector, ScoringError> {
    let expected = method
        .output_dim(dim, params)
        .ok_or(ScoringError::MethodNotImplemented(method))?;
    let vector = match (method, features) {
        (_, TokenFeatures::Empty) => vec![0.0; expected],
        (ScoringMethod::Unique | ScoringMethod::Simple, TokenFeatures::Weighted(tokens)) => {
            normalized_sum(method, tokens)?
        }
        (ScoringMethod::SvdStack, TokenFeatures::Weighted(tokens)) => {
            svd_stack(tokens, params.svd_rank)
        }
        (ScoringMethod::PosSplit, TokenFeatures::PosBuckets(buckets)) => pos_means(buckets),
        (method, _) => {
            return Err(ScoringError::NumericInvariant {
                method,
                details: "token features do not match the method".into(),
            });
        }
    };
    if vector.len() != expected {
        return Err(ScoringError::NumericInvariant {
            method,
            details: format!("expected {expected} components, produced {}", vector.len()),
        });
    }
    ensure_finite(method, &vector)?;
    Ok(vector)
}

/// Weighted sum of token vectors rescaled onto the unit sphere.
fn normalized_sum(method: ScoringMethod, tokens: &WeightedTokens) -> Result<Vector, ScoringError> {
    let weights = Array1::from(tokens.weights.clone());
    let vectors = tokens.vectors.mapv(f64::from);
    let sum = weights.dot(&vectors);
    let norm = sum.dot(&sum).sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return Err(ScoringError::NumericInvariant {
            method,
            details: format!("weighted sum has norm {norm}"),
        });
    }
    let unit: Vector = sum.iter().map(|value| (value / norm) as f32).collect();
    let check = unit
        .iter()
        .map(|value| f64::from(*value).powi(2))
        .sum::<f64>()
        .sqrt();
    if (check - 1.0).abs() > UNIT_NORM_TOLERANCE {
        return Err(ScoringError::NumericInvariant {
            method,
            details: format!("normalized vector has norm {check}"),
        });
    }
    Ok(unit)
}

/// Flattened top-`rank` right singular vectors followed by the top-`rank` singular values.
///
/// Rank-deficient slots are zero-filled so the length is always `rank * D + rank`.
fn svd_stack(tokens: &WeightedTokens, rank: usize) -> Vector {
    let mut matrix = tokens.vectors.mapv(f64::from);
    for (mut row, weight) in matrix.axis_iter_mut(Axis(0)).zip(&tokens.weights) {
        row *= *weight;
    }
    let dim = matrix.ncols();
    let (values, right_vectors) = top_singular(&matrix, rank);

    let mut out = Vec::with_capacity(rank * dim + rank);
    for vector in &right_vectors {
        out.extend(vector.iter().map(|value| *value as f32));
    }
    out.extend(values.iter().map(|value| *value as f32));
    out
}

fn pos_means(buckets: &PosBuckets) -> Vector {
    let mut out = Vec::with_capacity(buckets.sums.len());
    for (row, count) in buckets.sums.axis_iter(Axis(0)).zip(&buckets.counts) {
        if *count == 0 {
            out.extend(std::iter::repeat_n(0.0, row.len()));
        } else {
            out.extend(row.iter().map(|value| (value / *count as f64) as f32));
        }
    }
    out
}

fn ensure_finite(method: ScoringMethod, vector: &[f32]) -> Result<(), ScoringError> {
    match vector.iter().position(|value| !value.is_finite()) {
        None => Ok(()),
        Some(idx) => Err(ScoringError::NumericInvariant {
            method,
            details: format!("component {idx} is {}", vector[idx]),
        }),
    }
}

/// Top `rank` singular values and right singular vectors of `matrix` (rows = tokens).
///
/// Works on whichever Gram matrix is smaller. Each vector's largest-magnitude
/// component is made positive.
pub(crate) fn top_singular(matrix: &Array2<f64>, rank: usize) -> (Vec<f64>, Vec<Array1<f64>>) {
    let (rows, cols) = matrix.dim();
    let mut values = vec![0.0; rank];
    let mut vectors = vec![Array1::zeros(cols); rank];
    if rows == 0 || cols == 0 {
        return (values, vectors);
    }

    let row_space = rows <= cols;
    let gram = if row_space {
        matrix.dot(&matrix.t())
    } else {
        matrix.t().dot(matrix)
    };
    let (eigenvalues, eigenvectors) = symmetric_eigen(gram);
    let mut order: Vec<usize> = (0..eigenvalues.len()).collect();
    order.sort_by(|a, b| eigenvalues[*b].total_cmp(&eigenvalues[*a]).then(a.cmp(b)));

    let largest = eigenvalues[order[0]].max(0.0).sqrt();
    for (slot, &idx) in order.iter().take(rank).enumerate() {
        let sigma = eigenvalues[idx].max(0.0).sqrt();
        if sigma == 0.0 || sigma <= SINGULAR_VALUE_CUTOFF * largest {
            break;
        }
        let basis = eigenvectors.column(idx);
        let mut vector = if row_space {
            matrix.t().dot(&basis) / sigma
        } else {
            basis.to_owned()
        };
        let norm = vector.dot(&vector).sqrt();
        if norm > 0.0 {
            vector /= norm;
        }
        fix_sign(&mut vector);
        values[slot] = sigma;
        vectors[slot] = vector;
    }
    (values, vectors)
}

fn fix_sign(vector: &mut Array1<f64>) {
    let mut pivot = 0.0f64;
    for value in vector.iter() {
        if value.abs() > pivot.abs() {
            pivot = *value;
        }
    }
    if pivot < 0.0 {
        vector.mapv_inplace(|value| -value);
    }
}

/// Cyclic Jacobi eigen-decomposition of a symmetric matrix.
///
/// Returns the eigenvalues and a matrix whose columns are the matching eigenvectors.
fn symmetric_eigen(mut a: Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut v = Array2::<f64>::eye(n);
    let scale = a.iter().map(|value| value * value).sum::<f64>();
    if scale == 0.0 {
        return (vec![0.0; n], v);
    }

    for _ in 0..JACOBI_MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off.sqrt() <= JACOBI_EPSILON * scale.sqrt() {
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }
    ((0..n).map(|i| a[[i, i]]).collect(), v)
}
