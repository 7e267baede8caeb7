//! Compliant contact between backend surfaces.
//!
//! Normal forces follow the Hunt-Crossley law `k d^1.5 (1 + 1.5 c d')`; friction
//! blends static, dynamic and viscous coefficients with a Stribeck-like curve
//! that ramps in over the transition velocity.

use glam::DVec3;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::core::{ContactMaterial, Transform};
use crate::utils::SpatialVec;

/// Exact or approximated backend geometry of one collision shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ContactGeometry {
    /// Solid occupying local `z <= 0`; the outward normal is local +Z.
    HalfSpace,
    Sphere { radius: f64 },
    Ellipsoid { radii: DVec3 },
    /// Solid below a height field sampled on a regular grid in local XY.
    Heightmap {
        rows: usize,
        cols: usize,
        size: DVec3,
        heights: Vec<f64>,
    },
    /// Triangle soup; contacts are resolved against the front faces.
    TriangleMesh {
        vertices: Vec<DVec3>,
        triangles: Vec<[u32; 3]>,
    },
}

impl ContactGeometry {
    pub fn name(&self) -> &'static str {
        match self {
            ContactGeometry::HalfSpace => "half-space",
            ContactGeometry::Sphere { .. } => "sphere",
            ContactGeometry::Ellipsoid { .. } => "ellipsoid",
            ContactGeometry::Heightmap { .. } => "heightmap",
            ContactGeometry::TriangleMesh { .. } => "triangle mesh",
        }
    }

    fn is_convex(&self) -> bool {
        matches!(
            self,
            ContactGeometry::Sphere { .. } | ContactGeometry::Ellipsoid { .. }
        )
    }

    /// Radii of a sphere or ellipsoid.
    fn radii(&self) -> Option<DVec3> {
        match self {
            ContactGeometry::Sphere { radius } => Some(DVec3::splat(*radius)),
            ContactGeometry::Ellipsoid { radii } => Some(*radii),
            _ => None,
        }
    }
}

/// Contact geometry fixed to one backend body.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactSurface {
    pub name: String,
    pub body: usize,
    /// Surface frame in the body frame.
    pub pose: Transform,
    pub geometry: ContactGeometry,
    pub material: ContactMaterial,
    /// Surfaces sharing a clique never touch each other.
    pub clique: Option<usize>,
}

/// Resolved contact between two surfaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    /// World point midway between the two surfaces.
    pub point: DVec3,
    /// Unit normal pointing from the first surface to the second.
    pub normal: DVec3,
    pub depth: f64,
}

/// Force on the second body of a pair; the first body receives its negation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairForce {
    pub body_a: usize,
    pub body_b: usize,
    pub force: SpatialVec,
}

/// Whether two surfaces may generate contact at all.
pub fn may_interact(a: &ContactSurface, b: &ContactSurface) -> bool {
    if a.body == b.body {
        return false;
    }
    if a.body == 0 && b.body == 0 {
        return false;
    }
    !matches!((a.clique, b.clique), (Some(x), Some(y)) if x == y)
}

/// Candidate pairs, in surface order.
pub fn contact_pairs(surfaces: &[ContactSurface]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for i in 0..surfaces.len() {
        for j in (i + 1)..surfaces.len() {
            if may_interact(&surfaces[i], &surfaces[j]) {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

/// Finds the contact between two posed surfaces, if they overlap.
pub fn detect(
    a: &ContactGeometry,
    pose_a: &Transform,
    b: &ContactGeometry,
    pose_b: &Transform,
) -> Option<ContactPoint> {
    if a.is_convex() && !b.is_convex() {
        return detect(b, pose_b, a, pose_a).map(flip);
    }
    match (a, b) {
        (ContactGeometry::HalfSpace, _) => {
            let radii = b.radii()?;
            let normal = pose_a.transform_vector(DVec3::Z);
            convex_against_plane(pose_a.position, normal, radii, pose_b)
        }
        (ContactGeometry::Heightmap { rows, cols, size, heights }, _) => {
            let radii = b.radii()?;
            let local_center = pose_a.inverse().transform_point(pose_b.position);
            let (height, gradient) = sample_heightmap(*rows, *cols, *size, heights, local_center)?;
            let origin = pose_a.transform_point(DVec3::new(local_center.x, local_center.y, height));
            let normal = pose_a
                .transform_vector(DVec3::new(-gradient.x, -gradient.y, 1.0))
                .normalize();
            convex_against_plane(origin, normal, radii, pose_b)
        }
        (ContactGeometry::TriangleMesh { vertices, triangles }, _) => {
            let radii = b.radii()?;
            convex_against_mesh(vertices, triangles, pose_a, radii, pose_b)
        }
        (ContactGeometry::Sphere { .. } | ContactGeometry::Ellipsoid { .. }, _) => {
            let radii_b = b.radii()?;
            let radii_a = a.radii()?;
            convex_against_convex(radii_a, pose_a, radii_b, pose_b)
        }
    }
}

fn flip(contact: ContactPoint) -> ContactPoint {
    ContactPoint {
        normal: -contact.normal,
        ..contact
    }
}

/// Point of an ellipsoid (at `pose`) furthest along world direction `dir`.
fn support_point(radii: DVec3, pose: &Transform, dir: DVec3) -> DVec3 {
    let local = pose.rotation.inverse() * dir;
    let scaled = local * radii;
    let len = scaled.length();
    if len < f64::EPSILON {
        return pose.position;
    }
    pose.transform_point(local * radii * radii / len)
}

fn convex_against_plane(
    origin: DVec3,
    normal: DVec3,
    radii: DVec3,
    pose: &Transform,
) -> Option<ContactPoint> {
    let deepest = support_point(radii, pose, -normal);
    let depth = -(deepest - origin).dot(normal);
    (depth > 0.0).then(|| ContactPoint {
        point: deepest + normal * (0.5 * depth),
        normal,
        depth,
    })
}

fn convex_against_convex(
    radii_a: DVec3,
    pose_a: &Transform,
    radii_b: DVec3,
    pose_b: &Transform,
) -> Option<ContactPoint> {
    let offset = pose_b.position - pose_a.position;
    let normal = offset.try_normalize().unwrap_or(DVec3::Z);
    let tip_a = support_point(radii_a, pose_a, normal);
    let tip_b = support_point(radii_b, pose_b, -normal);
    let depth = (tip_a - tip_b).dot(normal);
    (depth > 0.0).then(|| ContactPoint {
        point: (tip_a + tip_b) * 0.5,
        normal,
        depth,
    })
}

fn convex_against_mesh(
    vertices: &[DVec3],
    triangles: &[[u32; 3]],
    pose: &Transform,
    radii: DVec3,
    pose_b: &Transform,
) -> Option<ContactPoint> {
    let mut best: Option<ContactPoint> = None;
    // Convex bodies deeper than their own extent are treated as behind the face.
    let reach = radii.max_element();
    for tri in triangles {
        let [i0, i1, i2] = tri.map(|i| i as usize);
        let (Some(v0), Some(v1), Some(v2)) = (vertices.get(i0), vertices.get(i1), vertices.get(i2))
        else {
            continue;
        };
        let p0 = pose.transform_point(*v0);
        let p1 = pose.transform_point(*v1);
        let p2 = pose.transform_point(*v2);
        let Some(normal) = (p1 - p0).cross(p2 - p0).try_normalize() else {
            continue;
        };
        let deepest = support_point(radii, pose_b, -normal);
        let depth = -(deepest - p0).dot(normal);
        if depth <= 0.0 || depth > 2.0 * reach {
            continue;
        }
        let projected = deepest + normal * depth;
        if !inside_triangle(projected, p0, p1, p2, normal) {
            continue;
        }
        if best.map_or(true, |b| depth > b.depth) {
            best = Some(ContactPoint {
                point: deepest + normal * (0.5 * depth),
                normal,
                depth,
            });
        }
    }
    best
}

fn inside_triangle(p: DVec3, a: DVec3, b: DVec3, c: DVec3, normal: DVec3) -> bool {
    let edge = |from: DVec3, to: DVec3| (to - from).cross(p - from).dot(normal) >= 0.0;
    edge(a, b) && edge(b, c) && edge(c, a)
}

/// Bilinear height and gradient at a local XY position, `None` off the grid.
fn sample_heightmap(
    rows: usize,
    cols: usize,
    size: DVec3,
    heights: &[f64],
    local: DVec3,
) -> Option<(f64, glam::DVec2)> {
    if rows < 2 || cols < 2 || heights.len() < rows * cols {
        return None;
    }
    let dx = size.x / (cols - 1) as f64;
    let dy = size.y / (rows - 1) as f64;
    let gx = (local.x + 0.5 * size.x) / dx;
    let gy = (local.y + 0.5 * size.y) / dy;
    if gx < 0.0 || gy < 0.0 || gx > (cols - 1) as f64 || gy > (rows - 1) as f64 {
        return None;
    }
    let c0 = (gx.floor() as usize).min(cols - 2);
    let r0 = (gy.floor() as usize).min(rows - 2);
    let tx = gx - c0 as f64;
    let ty = gy - r0 as f64;
    let h = |r: usize, c: usize| heights[r * cols + c] * size.z;
    let (h00, h01, h10, h11) = (h(r0, c0), h(r0, c0 + 1), h(r0 + 1, c0), h(r0 + 1, c0 + 1));
    let height = h00 * (1.0 - tx) * (1.0 - ty) + h01 * tx * (1.0 - ty) + h10 * (1.0 - tx) * ty + h11 * tx * ty;
    let dhdx = ((h01 - h00) * (1.0 - ty) + (h11 - h10) * ty) / dx;
    let dhdy = ((h10 - h00) * (1.0 - tx) + (h11 - h01) * tx) / dy;
    Some((height, glam::DVec2::new(dhdx, dhdy)))
}

/// Normal force magnitude for `depth` penetrating at `depth_rate`.
pub fn hunt_crossley(material: &ContactMaterial, depth: f64, depth_rate: f64) -> f64 {
    if depth <= 0.0 {
        return 0.0;
    }
    let elastic = material.stiffness * depth.powf(1.5);
    (elastic * (1.0 + 1.5 * material.dissipation * depth_rate)).max(0.0)
}

/// Friction coefficient at slip speed `slip`.
pub fn friction_coefficient(material: &ContactMaterial, slip: f64, transition_velocity: f64) -> f64 {
    let vt = transition_velocity.max(f64::EPSILON);
    let ratio = slip / vt;
    let stribeck = material.dynamic_friction
        + 2.0 * (material.static_friction - material.dynamic_friction) / (1.0 + ratio * ratio);
    ratio.min(1.0) * stribeck + material.viscous_friction * slip
}

/// Per-step contact evaluator.
#[derive(Debug, Clone, Copy)]
pub struct ContactModel {
    pub transition_velocity: f64,
}

impl ContactModel {
    pub fn new(transition_velocity: f64) -> Self {
        Self {
            transition_velocity,
        }
    }

    fn pair_force(
        &self,
        a: &ContactSurface,
        b: &ContactSurface,
        poses: &[Transform],
        velocities: &[SpatialVec],
    ) -> Option<PairForce> {
        let pose_a = poses[a.body] * a.pose;
        let pose_b = poses[b.body] * b.pose;
        let contact = detect(&a.geometry, &pose_a, &b.geometry, &pose_b)?;
        let material = ContactMaterial::combine(&a.material, &b.material);

        let v_rel = velocities[b.body].point_velocity(contact.point)
            - velocities[a.body].point_velocity(contact.point);
        let normal_speed = v_rel.dot(contact.normal);
        let f_n = hunt_crossley(&material, contact.depth, -normal_speed);
        if f_n <= 0.0 {
            return None;
        }

        let tangential = v_rel - contact.normal * normal_speed;
        let slip = tangential.length();
        let mut force = contact.normal * f_n;
        if slip > f64::EPSILON {
            let mu = friction_coefficient(&material, slip, self.transition_velocity);
            force -= tangential * (mu * f_n / slip);
        }
        Some(PairForce {
            body_a: a.body,
            body_b: b.body,
            force: SpatialVec::force_at(force, contact.point),
        })
    }

    /// Adds contact forces to `body_forces` (ground-frame spatial forces per body).
    pub fn accumulate(
        &self,
        surfaces: &[ContactSurface],
        pairs: &[(usize, usize)],
        poses: &[Transform],
        velocities: &[SpatialVec],
        body_forces: &mut [SpatialVec],
    ) -> usize {
        let eval = |&(i, j): &(usize, usize)| {
            self.pair_force(&surfaces[i], &surfaces[j], poses, velocities)
        };

        #[cfg(feature = "parallel")]
        let forces: Vec<PairForce> = pairs.par_iter().filter_map(eval).collect();
        #[cfg(not(feature = "parallel"))]
        let forces: Vec<PairForce> = pairs.iter().filter_map(eval).collect();

        for pair in &forces {
            body_forces[pair.body_b] += pair.force;
            body_forces[pair.body_a] -= pair.force;
        }
        forces.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_resting_in_half_space() {
        let plane = Transform::IDENTITY;
        let sphere = Transform::from_position(DVec3::new(0.0, 0.0, 0.4));
        let contact = detect(
            &ContactGeometry::HalfSpace,
            &plane,
            &ContactGeometry::Sphere { radius: 0.5 },
            &sphere,
        )
        .expect("overlap");
        assert!((contact.depth - 0.1).abs() < 1e-12);
        assert!((contact.normal - DVec3::Z).length() < 1e-12);
    }

    #[test]
    fn reversed_pair_flips_normal() {
        let sphere = Transform::from_position(DVec3::new(0.0, 0.0, 0.4));
        let contact = detect(
            &ContactGeometry::Sphere { radius: 0.5 },
            &sphere,
            &ContactGeometry::HalfSpace,
            &Transform::IDENTITY,
        )
        .expect("overlap");
        assert!((contact.normal + DVec3::Z).length() < 1e-12);
    }

    #[test]
    fn friction_saturates_above_transition_velocity() {
        let material = ContactMaterial::new(1e6, 0.0, 0.7, 0.5, 0.0);
        assert_eq!(friction_coefficient(&material, 0.0, 0.1), 0.0);
        let fast = friction_coefficient(&material, 100.0, 0.1);
        assert!((fast - 0.5).abs() < 1e-3);
        let peak = friction_coefficient(&material, 0.1, 0.1);
        assert!((peak - 0.7).abs() < 1e-12);
    }

    #[test]
    fn separated_surfaces_produce_no_force() {
        let material = ContactMaterial::default();
        assert_eq!(hunt_crossley(&material, -0.01, 0.0), 0.0);
        assert!(hunt_crossley(&material, 0.01, 0.0) > 0.0);
    }

    fn heightmap(rows: usize, cols: usize, size: DVec3, heights: Vec<f64>) -> ContactGeometry {
        ContactGeometry::Heightmap {
            rows,
            cols,
            size,
            heights,
        }
    }

    fn ball_at(x: f64, y: f64, z: f64) -> Transform {
        Transform::from_position(DVec3::new(x, y, z))
    }

    #[test]
    fn sphere_on_flat_heightmap() {
        let terrain = heightmap(3, 3, DVec3::new(2.0, 2.0, 1.0), vec![0.2; 9]);
        let contact = detect(
            &terrain,
            &Transform::IDENTITY,
            &ContactGeometry::Sphere { radius: 0.5 },
            &ball_at(0.3, 0.1, 0.6),
        )
        .expect("overlap");
        assert!((contact.depth - 0.1).abs() < 1e-12);
        assert!((contact.normal - DVec3::Z).length() < 1e-12);
    }

    #[test]
    fn sphere_on_sloped_heightmap() {
        // Height rises from 0 at x = -1 to 2 at x = 1.
        let terrain = heightmap(2, 2, DVec3::new(2.0, 2.0, 2.0), vec![0.0, 1.0, 0.0, 1.0]);
        let contact = detect(
            &terrain,
            &Transform::IDENTITY,
            &ContactGeometry::Sphere { radius: 0.5 },
            &ball_at(0.0, 0.0, 1.2),
        )
        .expect("overlap");
        let expected = DVec3::new(-1.0, 0.0, 1.0).normalize();
        assert!((contact.normal - expected).length() < 1e-12);
        assert!((contact.depth - (0.5 - 0.2 * std::f64::consts::FRAC_1_SQRT_2)).abs() < 1e-12);
    }

    #[test]
    fn heightmap_off_grid_or_malformed_has_no_contact() {
        let size = DVec3::new(2.0, 2.0, 1.0);
        let ball = ContactGeometry::Sphere { radius: 0.5 };
        let flat = heightmap(3, 3, size, vec![0.0; 9]);
        assert!(detect(&flat, &Transform::IDENTITY, &ball, &ball_at(1.5, 0.0, 0.1)).is_none());
        assert!(detect(&flat, &Transform::IDENTITY, &ball, &ball_at(0.0, -1.2, 0.1)).is_none());

        let single_row = heightmap(1, 3, size, vec![0.0; 3]);
        assert!(detect(&single_row, &Transform::IDENTITY, &ball, &ball_at(0.0, 0.0, 0.1)).is_none());
        let short = heightmap(2, 2, size, vec![0.0; 3]);
        assert!(detect(&short, &Transform::IDENTITY, &ball, &ball_at(0.0, 0.0, 0.1)).is_none());
        assert!(sample_heightmap(2, 2, size, &[0.0; 3], DVec3::ZERO).is_none());
    }

    fn triangle() -> ContactGeometry {
        ContactGeometry::TriangleMesh {
            vertices: vec![
                DVec3::new(-1.0, -1.0, 0.0),
                DVec3::new(1.0, -1.0, 0.0),
                DVec3::new(0.0, 1.0, 0.0),
            ],
            triangles: vec![[0, 1, 2]],
        }
    }

    #[test]
    fn sphere_touching_triangle_front_face() {
        let contact = detect(
            &triangle(),
            &Transform::IDENTITY,
            &ContactGeometry::Sphere { radius: 0.5 },
            &ball_at(0.0, 0.0, 0.4),
        )
        .expect("overlap");
        assert!((contact.depth - 0.1).abs() < 1e-12);
        assert!((contact.normal - DVec3::Z).length() < 1e-12);
    }

    #[test]
    fn triangle_misses_behind_and_beside() {
        let ball = ContactGeometry::Sphere { radius: 0.5 };
        let mesh = triangle();
        assert!(detect(&mesh, &Transform::IDENTITY, &ball, &ball_at(0.0, 0.0, -0.6)).is_none());
        assert!(detect(&mesh, &Transform::IDENTITY, &ball, &ball_at(3.0, 0.0, 0.4)).is_none());
        assert!(detect(&mesh, &Transform::IDENTITY, &ball, &ball_at(0.0, 0.0, 0.6)).is_none());

        let dangling = ContactGeometry::TriangleMesh {
            vertices: vec![DVec3::ZERO, DVec3::X],
            triangles: vec![[0, 1, 2]],
        };
        assert!(detect(&dangling, &Transform::IDENTITY, &ball, &ball_at(0.0, 0.0, 0.4)).is_none());
    }
}
