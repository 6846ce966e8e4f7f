//! Triangle geometry of the interval half-plane.
//!
//! An interval is the point `(x, y) = (start, end)`. Valid intervals satisfy
//! `x <= y`, so with timestamps in `[0, max]` they fill the right isosceles
//! triangle with its right angle (the *apex*) at `(0, max)`.
//!
//! A triangle is described by its apex, a depth, and a direction: the
//! compass direction of the altitude from the apex to the midpoint of the
//! hypotenuse, in steps of 45 degrees (`0 = E`, `1 = NE`, `2 = N`, ...,
//! `7 = SE`). Bisecting along that altitude yields two right isosceles
//! triangles whose apex is the hypotenuse midpoint and whose legs are
//! `sqrt(2)/2` times as long, so each level halves the area.

use std::f64::consts::FRAC_1_SQRT_2;

const H: f64 = FRAC_1_SQRT_2;

/// Direction of the root triangle's altitude (south-east).
pub const ROOT_DIRECTION: u8 = 7;

/// `(lower, higher)` child directions for each parent direction.
///
/// The lower child lies clockwise of the parent altitude. For the root this
/// is the western triangle touching `(0, 0)`.
const CHILD_DIRECTIONS: [(u8, u8); 8] = [
    (5, 3),
    (6, 4),
    (7, 5),
    (0, 6),
    (1, 7),
    (2, 0),
    (3, 1),
    (4, 2),
];

/// Unit vector of the altitude for each direction.
const ALTITUDE: [(f64, f64); 8] = [
    (1.0, 0.0),
    (H, H),
    (0.0, 1.0),
    (-H, H),
    (-1.0, 0.0),
    (-H, -H),
    (0.0, -1.0),
    (H, -H),
];

/// Unit vectors of the two legs (altitude rotated by +45 and -45 degrees).
const LEGS: [[(f64, f64); 2]; 8] = [
    [(H, H), (H, -H)],
    [(0.0, 1.0), (1.0, 0.0)],
    [(-H, H), (H, H)],
    [(-1.0, 0.0), (0.0, 1.0)],
    [(-H, -H), (-H, H)],
    [(0.0, -1.0), (-1.0, 0.0)],
    [(H, -H), (-H, -H)],
    [(1.0, 0.0), (0.0, -1.0)],
];

/// Child directions `(lower, higher)` of a triangle with direction `parent`.
pub fn child_direction(parent: u8) -> (u8, u8) {
    CHILD_DIRECTIONS[usize::from(parent & 7)]
}

/// Leg length of a triangle at `depth` (root = 1).
pub fn adjusted_length(max_value: f64, depth: u32) -> f64 {
    max_value * H.powi(depth as i32 - 1)
}

/// Apex shared by both children at `depth`, given their parent's direction
/// and apex.
pub fn child_apex(max_value: f64, depth: u32, parent_direction: u8, apex_x: f64, apex_y: f64) -> (f64, f64) {
    let len = adjusted_length(max_value, depth);
    let (ux, uy) = ALTITUDE[usize::from(parent_direction & 7)];
    (apex_x + len * ux, apex_y + len * uy)
}

/// The three vertices `[ax, ay, bx, by, cx, cy]` of a triangle, apex first.
pub fn vertices(adjusted_length: f64, direction: u8, apex_x: f64, apex_y: f64) -> [f64; 6] {
    let [(bx, by), (cx, cy)] = LEGS[usize::from(direction & 7)];
    [
        apex_x,
        apex_y,
        apex_x + adjusted_length * bx,
        apex_y + adjusted_length * by,
        apex_x + adjusted_length * cx,
        apex_y + adjusted_length * cy,
    ]
}

/// Sign-of-cross-product containment test. Points on an edge are inside.
pub fn point_in_triangle(x: f64, y: f64, v: &[f64; 6]) -> bool {
    let d1 = edge_sign(x, y, v[0], v[1], v[2], v[3]);
    let d2 = edge_sign(x, y, v[2], v[3], v[4], v[5]);
    let d3 = edge_sign(x, y, v[4], v[5], v[0], v[1]);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

fn edge_sign(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    (px - bx) * (ay - by) - (ax - bx) * (py - by)
}

/// How far `(x, y)` lies outside a triangle: the largest distance past any
/// edge line, or `0.0` for points inside or on an edge.
pub fn outside_distance(x: f64, y: f64, v: &[f64; 6]) -> f64 {
    let edges = [(0, 2, 4), (2, 4, 0), (4, 0, 2)];
    let mut worst = 0.0f64;
    for (a, b, c) in edges {
        let (ax, ay, bx, by) = (v[a], v[a + 1], v[b], v[b + 1]);
        let point = edge_sign(x, y, ax, ay, bx, by);
        let inner = edge_sign(v[c], v[c + 1], ax, ay, bx, by);
        if point * inner < 0.0 {
            worst = worst.max(point.abs() / (ax - bx).hypot(ay - by));
        }
    }
    worst
}

/// Whether `(x, y)` belongs to the lower of two sibling triangles.
///
/// Vertices drift with depth, so a point on the shared edge or a corner can
/// test as outside both siblings. It goes to whichever it is nearer; ties
/// go lower.
pub fn routes_lower(x: f64, y: f64, lower: &[f64; 6], higher: &[f64; 6]) -> bool {
    outside_distance(x, y, lower) <= outside_distance(x, y, higher)
}

/// Distance, in timestamp units, within which a point counts as touching a
/// triangle of a tree spanning `[0, max_value]`.
pub fn rounding_slack(max_value: f64) -> f64 {
    1.0 + max_value * f64::powi(2.0, -40)
}

/// Number of bits in a leaf id, i.e. its depth (root id 1 has depth 1).
pub fn depth_of(leaf_id: u64) -> u32 {
    64 - leaf_id.leading_zeros()
}

/// Axis-aligned bounds `(min_x, min_y, max_x, max_y)` of a triangle.
pub fn bounding_box(v: &[f64; 6]) -> (f64, f64, f64, f64) {
    let min_x = v[0].min(v[2]).min(v[4]);
    let max_x = v[0].max(v[2]).max(v[4]);
    let min_y = v[1].min(v[3]).min(v[5]);
    let max_y = v[1].max(v[3]).max(v[5]);
    (min_x, min_y, max_x, max_y)
}

/// Conservative test whether a triangle may hold an interval covering `t`,
/// i.e. a point with `x <= t <= y`.
///
/// `slack` absorbs rounding in apex arithmetic; false positives only cost a
/// leaf scan.
pub fn intersects_stab(v: &[f64; 6], t: f64, slack: f64) -> bool {
    let (min_x, _, _, max_y) = bounding_box(v);
    min_x <= t + slack && max_y >= t - slack
}

/// A triangle of the decomposition, addressed by depth.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub depth: u32,
    pub apex: (f64, f64),
    pub direction: u8,
}

impl Triangle {
    /// The triangle covering the whole half-plane up to `max_value`.
    pub fn root(max_value: f64) -> Self {
        Self {
            depth: 1,
            apex: (0.0, max_value),
            direction: ROOT_DIRECTION,
        }
    }

    pub fn vertices(&self, max_value: f64) -> [f64; 6] {
        vertices(
            adjusted_length(max_value, self.depth),
            self.direction,
            self.apex.0,
            self.apex.1,
        )
    }

    /// The `(lower, higher)` halves of this triangle.
    pub fn children(&self, max_value: f64) -> (Triangle, Triangle) {
        let depth = self.depth + 1;
        let apex = child_apex(max_value, depth, self.direction, self.apex.0, self.apex.1);
        let (lower, higher) = child_direction(self.direction);
        (
            Triangle {
                depth,
                apex,
                direction: lower,
            },
            Triangle {
                depth,
                apex,
                direction: higher,
            },
        )
    }

    pub fn contains(&self, max_value: f64, x: f64, y: f64) -> bool {
        point_in_triangle(x, y, &self.vertices(max_value))
    }

    /// The child `(x, y)` routes to, and whether it is the higher one.
    pub fn route(&self, max_value: f64, x: f64, y: f64) -> (Triangle, bool) {
        let (lower, higher) = self.children(max_value);
        if routes_lower(x, y, &lower.vertices(max_value), &higher.vertices(max_value)) {
            (lower, false)
        } else {
            (higher, true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: f64 = 1024.0;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() <= 1e-9 * a.abs().max(1.0), "{a} != {b}");
    }

    #[test]
    fn child_directions_cover_all_inputs() {
        for d in 0..8u8 {
            let (lo, hi) = child_direction(d);
            assert_eq!(lo, (d + 5) % 8);
            assert_eq!(hi, (d + 3) % 8);
        }
    }

    #[test]
    fn root_vertices_span_the_half_plane() {
        let v = Triangle::root(MAX).vertices(MAX);
        assert_eq!(v, [0.0, MAX, MAX, MAX, 0.0, 0.0]);
        assert!(point_in_triangle(10.0, 20.0, &v));
        assert!(point_in_triangle(5.0, 5.0, &v));
        assert!(!point_in_triangle(20.0, 10.0, &v));
    }

    #[test]
    fn root_children_meet_at_the_hypotenuse_midpoint() {
        let (lower, higher) = Triangle::root(MAX).children(MAX);
        assert_close(lower.apex.0, MAX / 2.0);
        assert_close(lower.apex.1, MAX / 2.0);
        assert_eq!(lower.direction, 4);
        assert_eq!(higher.direction, 2);

        // Lower child touches the origin, higher child the top-right corner.
        assert!(lower.contains(MAX, 1.0, 2.0));
        assert!(!higher.contains(MAX, 1.0, 2.0));
        assert!(higher.contains(MAX, 1000.0, 1010.0));
        assert!(!lower.contains(MAX, 1000.0, 1010.0));
    }

    #[test]
    fn leg_length_halves_area_per_level() {
        for depth in 1..20 {
            let a = adjusted_length(MAX, depth);
            let b = adjusted_length(MAX, depth + 1);
            assert_close(b * b * 2.0, a * a);
        }
    }

    #[test]
    fn children_partition_their_parent() {
        let mut tri = Triangle::root(MAX);
        for step in 0..12 {
            let (lower, higher) = tri.children(MAX);
            let (min_x, min_y, max_x, max_y) = bounding_box(&tri.vertices(MAX));
            let n = 16;
            // Offsets keep samples off the triangle edges.
            for i in 0..n {
                for j in 0..n {
                    let x = min_x + (max_x - min_x) * (i as f64 + 0.37) / n as f64;
                    let y = min_y + (max_y - min_y) * (j as f64 + 0.61) / n as f64;
                    if tri.contains(MAX, x, y) {
                        assert!(
                            lower.contains(MAX, x, y) || higher.contains(MAX, x, y),
                            "({x}, {y}) lost at depth {}",
                            step + 2
                        );
                    }
                }
            }
            tri = if step % 2 == 0 { lower } else { higher };
        }
    }

    #[test]
    fn outside_distance_measures_the_worst_edge() {
        let v = Triangle::root(MAX).vertices(MAX);
        assert_eq!(outside_distance(10.0, 20.0, &v), 0.0);
        assert_eq!(outside_distance(0.0, MAX, &v), 0.0);
        assert_close(outside_distance(20.0, 10.0, &v), 10.0 * FRAC_1_SQRT_2);
        assert_close(outside_distance(-3.0, 500.0, &v), 3.0);
    }

    #[test]
    fn corner_points_route_into_a_triangle_that_holds_them() {
        let max = (1u64 << 62) as f64;
        let slack = rounding_slack(max);
        for (x, y) in [(0.0, max), (0.0, 0.0), (max, max), (0.0, max / 2.0), (max / 4.0, max / 4.0)] {
            let mut tri = Triangle::root(max);
            for _ in 0..60 {
                tri = tri.route(max, x, y).0;
                let off = outside_distance(x, y, &tri.vertices(max));
                assert!(off <= slack, "({x}, {y}) is {off} outside at depth {}", tri.depth);
            }
        }
    }

    #[test]
    fn shared_apex_routes_lower() {
        let root = Triangle::root(MAX);
        let (lower, higher) = root.children(MAX);
        let (x, y) = lower.apex;
        assert_eq!(outside_distance(x, y, &lower.vertices(MAX)), 0.0);
        assert_eq!(outside_distance(x, y, &higher.vertices(MAX)), 0.0);
        assert_eq!(root.route(MAX, x, y), (lower, false));
        assert_eq!(root.route(MAX, 1000.0, 1010.0), (higher, true));
    }

    #[test]
    fn slack_grows_with_the_range() {
        assert!(rounding_slack(MAX) < 1.001);
        assert!(rounding_slack(1e18) > 1e5);
    }

    #[test]
    fn depth_counts_path_bits() {
        assert_eq!(depth_of(1), 1);
        assert_eq!(depth_of(2), 2);
        assert_eq!(depth_of(3), 2);
        assert_eq!(depth_of(4), 3);
        assert_eq!(depth_of(7), 3);
        assert_eq!(depth_of(1 << 40), 41);
    }

    #[test]
    fn stab_test_is_conservative() {
        let v = Triangle::root(MAX).vertices(MAX);
        assert!(intersects_stab(&v, 500.0, 0.0));

        let near_diagonal = [600.0, 700.0, 600.0, 800.0, 700.0, 800.0];
        assert!(!intersects_stab(&near_diagonal, 100.0, 0.0));
        assert!(intersects_stab(&near_diagonal, 650.0, 0.0));
        assert!(!intersects_stab(&near_diagonal, 900.0, 0.0));
        assert!(intersects_stab(&near_diagonal, 801.0, 1.0));
    }
}
