//! Hungarian Assignment
//!
//! Minimum-cost perfect matching on a square cost matrix in O(n³), using
//! row/column potentials and shortest augmenting paths.
//!
//! # Algorithm
//! Rows are inserted one at a time. For each row a Dijkstra-like sweep over
//! the columns grows an alternating tree until a free column is reached, then
//! the assignment is flipped along the path recorded in `way`.
//!
//! # Memory Optimizations
//! - Visited columns tracked in a `BitVec`
//! - All work arrays allocated once per solve

use bitvec::prelude::*;

/// Solve the assignment problem for a square `cost` matrix.
///
/// Returns `assignment[row] = Some(column)`; every row of a non-empty
/// square matrix is assigned.
///
/// # Panics
/// Panics when `cost` is not square. Callers pad their matrices first.
pub fn solve(cost: &[Vec<f64>]) -> Vec<Option<usize>> {
    let n = cost.len();
    for (row, values) in cost.iter().enumerate() {
        assert_eq!(
            values.len(),
            n,
            "hungarian: row {} has {} columns, matrix must be {}x{}",
            row,
            values.len(),
            n,
            n
        );
    }
    if n == 0 {
        return Vec::new();
    }

    // 1-based potentials; index 0 is the virtual root.
    let mut u: Vec<f64> = vec![0.0; n + 1];
    let mut v: Vec<f64> = vec![0.0; n + 1];
    // p[column] = row assigned to column (0 = free).
    let mut p: Vec<usize> = vec![0; n + 1];
    let mut way: Vec<usize> = vec![0; n + 1];
    let mut minv: Vec<f64> = vec![f64::INFINITY; n + 1];
    let mut used: BitVec = bitvec![0; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0: usize = 0;
        minv.iter_mut().for_each(|m| *m = f64::INFINITY);
        used.fill(false);

        loop {
            used.set(j0, true);
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1: usize = 0;

            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let current = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if current < minv[j] {
                    minv[j] = current;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Flip the augmenting path.
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment: Vec<Option<usize>> = vec![None; n];
    for j in 1..=n {
        if p[j] != 0 {
            assignment[p[j] - 1] = Some(j - 1);
        }
    }
    assignment
}

/// Maximum-weight assignment: solves on `max_weight − weight`.
///
/// Non-finite weights count as 0.
pub fn maximize(weights: &[Vec<f64>]) -> Vec<Option<usize>> {
    let finite = |w: f64| if w.is_finite() { w } else { 0.0 };
    let max_weight = weights
        .iter()
        .flat_map(|row| row.iter().copied().map(finite))
        .fold(0.0f64, f64::max);
    let cost: Vec<Vec<f64>> = weights
        .iter()
        .map(|row| row.iter().map(|&w| max_weight - finite(w)).collect())
        .collect();
    solve(&cost)
}

/// Pad a `rows × cols` weight matrix to square with zero filler.
pub fn pad_square(mut weights: Vec<Vec<f64>>, cols: usize) -> Vec<Vec<f64>> {
    let n = weights.len().max(cols);
    for row in weights.iter_mut() {
        row.resize(n, 0.0);
    }
    weights.resize_with(n, || vec![0.0; n]);
    weights
}
