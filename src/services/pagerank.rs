//! Ratings from the vote graph
//!
//! Each vote `from -> to` is a step of a random walk towards `to`. The
//! rating of an image is its share of the walk's stationary distribution,
//! with a uniform teleport of weight [`DAMPING`]. Images without outgoing
//! votes leak their share; renormalising after every iteration puts it back.

use crate::models::{Edges, Ratings};
use std::collections::{BTreeSet, HashMap};

/// Teleport probability
pub const DAMPING: f64 = 0.15;
pub const ITERATIONS: usize = 50;

/// Rating per image, summing to 1. Every image appearing in `edges` as a
/// source or a target gets a rating.
pub fn pagerank(edges: &Edges) -> Ratings {
    let mut nodes: BTreeSet<u64> = edges.keys().copied().collect();
    for targets in edges.values() {
        nodes.extend(targets.keys().copied());
    }
    let ids: Vec<u64> = nodes.into_iter().collect();
    let n = ids.len();
    if n == 0 {
        return Ratings::new();
    }
    let index: HashMap<u64, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    // transition[to][from], one unit per vote
    let mut transition = vec![vec![0.0_f64; n]; n];
    for (from, targets) in edges {
        let column = index[from];
        for (to, weight) in targets {
            transition[index[to]][column] += *weight as f64;
        }
    }
    for column in 0..n {
        let total: f64 = transition.iter().map(|row| row[column]).sum();
        if total > 0.0 {
            for row in transition.iter_mut() {
                row[column] /= total;
            }
        }
    }

    let teleport = DAMPING / n as f64;
    let mut rank = vec![1.0 / n as f64; n];
    for _ in 0..ITERATIONS {
        let mass: f64 = rank.iter().sum();
        let mut next: Vec<f64> = transition
            .iter()
            .map(|row| {
                let walk: f64 = row.iter().zip(&rank).map(|(a, v)| a * v).sum();
                (1.0 - DAMPING) * walk + teleport * mass
            })
            .collect();

        let total: f64 = next.iter().sum();
        if total > 0.0 {
            next.iter_mut().for_each(|v| *v /= total);
        }
        rank = next;
    }

    ids.into_iter().zip(rank).collect()
}
