use nalgebra::{Rotation2, Vector2};

use super::{PieceShape, Pose};

/// Apply a pose to a shape's canonical polygon.
///
/// Flip mirrors about the y axis before rotating, so a flipped pose with
/// rotation zero is the mirror image of the unflipped canonical polygon.
pub fn transformed_vertices(shape: PieceShape, pose: &Pose) -> Vec<[f64; 2]> {
    let rot = Rotation2::new(pose.rotation);
    shape
        .canonical_vertices()
        .iter()
        .map(|v| {
            let x = if pose.flip { -v[0] } else { v[0] };
            let p = rot * Vector2::new(x, v[1]);
            [pose.position[0] + p.x, pose.position[1] + p.y]
        })
        .collect()
}

/// Vertex mean of a polygon. Coincides with the area centroid for every
/// tan shape (triangles and parallelograms).
pub fn polygon_centroid(vertices: &[[f64; 2]]) -> [f64; 2] {
    if vertices.is_empty() {
        return [0.0, 0.0];
    }
    let n = vertices.len() as f64;
    let (sx, sy) = vertices
        .iter()
        .fold((0.0, 0.0), |(sx, sy), v| (sx + v[0], sy + v[1]));
    [sx / n, sy / n]
}

/// Minimum distance between the boundaries of two polygons.
///
/// Zero when any pair of edges touches or crosses. Interior containment
/// without boundary proximity still reports the boundary gap, which is the
/// quantity the contact checks care about.
pub fn polygon_min_distance(a: &[[f64; 2]], b: &[[f64; 2]]) -> f64 {
    let mut best = f64::INFINITY;
    for i in 0..a.len() {
        let a0 = a[i];
        let a1 = a[(i + 1) % a.len()];
        for j in 0..b.len() {
            let b0 = b[j];
            let b1 = b[(j + 1) % b.len()];
            let d = segment_distance(a0, a1, b0, b1);
            if d < best {
                best = d;
                if best == 0.0 {
                    return 0.0;
                }
            }
        }
    }
    best
}

/// How far two polygon outlines are from coinciding: the largest distance
/// from any vertex of one polygon to the other polygon's boundary, taken
/// symmetrically.
///
/// Zero when the outlines coincide; stays small when one outline merely
/// slides a little along the other. Unlike [`polygon_min_distance`] this is
/// a mismatch measure, not a contact measure: two overlapping but offset
/// polygons score their offset, not zero.
pub fn polygon_outline_gap(a: &[[f64; 2]], b: &[[f64; 2]]) -> f64 {
    directed_vertex_gap(a, b).max(directed_vertex_gap(b, a))
}

fn directed_vertex_gap(from: &[[f64; 2]], to: &[[f64; 2]]) -> f64 {
    let mut worst = 0.0f64;
    for v in from {
        let mut nearest = f64::INFINITY;
        for j in 0..to.len() {
            let d = point_segment_distance(*v, to[j], to[(j + 1) % to.len()]);
            if d < nearest {
                nearest = d;
            }
        }
        worst = worst.max(nearest);
    }
    worst
}

fn segment_distance(a0: [f64; 2], a1: [f64; 2], b0: [f64; 2], b1: [f64; 2]) -> f64 {
    if segments_intersect(a0, a1, b0, b1) {
        return 0.0;
    }
    point_segment_distance(a0, b0, b1)
        .min(point_segment_distance(a1, b0, b1))
        .min(point_segment_distance(b0, a0, a1))
        .min(point_segment_distance(b1, a0, a1))
}

fn point_segment_distance(p: [f64; 2], s0: [f64; 2], s1: [f64; 2]) -> f64 {
    let d = [s1[0] - s0[0], s1[1] - s0[1]];
    let len2 = d[0] * d[0] + d[1] * d[1];
    if len2 <= f64::EPSILON {
        return super::dist(p, s0);
    }
    let t = (((p[0] - s0[0]) * d[0] + (p[1] - s0[1]) * d[1]) / len2).clamp(0.0, 1.0);
    super::dist(p, [s0[0] + t * d[0], s0[1] + t * d[1]])
}

fn segments_intersect(a0: [f64; 2], a1: [f64; 2], b0: [f64; 2], b1: [f64; 2]) -> bool {
    let d1 = cross(b0, b1, a0);
    let d2 = cross(b0, b1, a1);
    let d3 = cross(a0, a1, b0);
    let d4 = cross(a0, a1, b1);
    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }
    // Collinear touching endpoints are handled by the point-segment
    // distances reaching zero, so only proper crossings matter here.
    false
}

#[inline]
fn cross(o: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}
