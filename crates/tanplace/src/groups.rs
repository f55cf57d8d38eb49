//! Construction-group clustering.
//!
//! Placed pieces whose polygon boundaries sit within the connection
//! threshold form an undirected contact graph; its connected components are
//! the construction groups. Groups are recomputed on every validation pass
//! and never persisted; the durable state they summarize (poses, motion
//! times, attempt counters) lives on the pieces and the engine.

use std::collections::BTreeMap;

use crate::config::GroupingParams;
use crate::geometry::{dist, polygon_centroid, transformed_vertices};
use crate::lifecycle::{PieceId, PieceInstance};

/// A transient cluster of spatially-connected resting pieces.
#[derive(Debug, Clone)]
pub struct ConstructionGroup {
    /// Index of this group within the current pass.
    pub id: usize,
    /// Member piece ids, ascending.
    pub members: Vec<PieceId>,
    /// Mean of member positions.
    pub centroid: [f64; 2],
    /// Maximum member distance from the centroid.
    pub radius: f64,
    /// Stability confidence in [0, 1]; grows while every member is
    /// motionless and collapses as soon as one moves. Gates nudges and
    /// anchor promotion only, never correctness.
    pub confidence: f64,
    /// Sum of member attempt counters.
    pub attempts: u32,
}

impl ConstructionGroup {
    pub fn contains(&self, id: PieceId) -> bool {
        self.members.binary_search(&id).is_ok()
    }
}

/// Cluster the resting pieces at time `now`.
pub fn build_groups(
    pieces: &BTreeMap<PieceId, PieceInstance>,
    attempts: &BTreeMap<PieceId, u32>,
    params: &GroupingParams,
    now: f64,
) -> Vec<ConstructionGroup> {
    let resting: Vec<&PieceInstance> = pieces
        .values()
        .filter(|p| p.state.is_resting())
        .collect();
    if resting.is_empty() {
        return Vec::new();
    }

    let polygons: Vec<Vec<[f64; 2]>> = resting
        .iter()
        .map(|p| transformed_vertices(p.shape, &p.pose))
        .collect();

    let mut parent: Vec<usize> = (0..resting.len()).collect();
    for i in 0..resting.len() {
        for j in (i + 1)..resting.len() {
            // Cheap centroid gate before the exact boundary distance.
            let reach = resting[i].shape.max_extent()
                + resting[j].shape.max_extent()
                + params.connection_threshold;
            if dist(resting[i].pose.position, resting[j].pose.position) > reach {
                continue;
            }
            if crate::geometry::polygon_min_distance(&polygons[i], &polygons[j])
                <= params.connection_threshold
            {
                union(&mut parent, i, j);
            }
        }
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..resting.len() {
        components.entry(find(&mut parent, i)).or_default().push(i);
    }

    let mut groups = Vec::with_capacity(components.len());
    for (group_id, indices) in components.into_values().enumerate() {
        let members: Vec<PieceId> = indices.iter().map(|&i| resting[i].id).collect();
        let positions: Vec<[f64; 2]> =
            indices.iter().map(|&i| resting[i].pose.position).collect();
        let centroid = polygon_centroid(&positions);
        let radius = positions
            .iter()
            .map(|p| dist(*p, centroid))
            .fold(0.0, f64::max);
        let stillness = indices
            .iter()
            .map(|&i| resting[i].still_for(now))
            .fold(f64::INFINITY, f64::min);
        let confidence = (stillness / params.confidence_ramp).clamp(0.0, 1.0);
        let attempts_sum = members
            .iter()
            .map(|id| attempts.get(id).copied().unwrap_or(0))
            .sum();
        groups.push(ConstructionGroup {
            id: group_id,
            members,
            centroid,
            radius,
            confidence,
            attempts: attempts_sum,
        });
    }

    tracing::trace!(
        n_resting = resting.len(),
        n_groups = groups.len(),
        "construction groups rebuilt"
    );
    groups
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[ra.max(rb)] = ra.min(rb);
    }
}
