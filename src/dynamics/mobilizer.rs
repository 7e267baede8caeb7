use glam::{DQuat, DVec3, EulerRot};

use crate::core::{JointType, Transform};
use crate::utils::SpatialVec;

/// Backend mobilizer kinds, each with its canonical motion between the
/// inboard frame F and the outboard frame M.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MobilizerKind {
    /// q = (qw, qx, qy, qz, px, py, pz); u = (angular velocity in M, linear velocity in F).
    Free,
    /// Rotation about Z.
    Pin,
    /// Translation along X.
    Slider,
    /// Rotation about Z coupled with `pitch` translation per radian along Z.
    Screw { pitch: f64 },
    /// Rotation about X followed by rotation about the rotated Y.
    Universal,
    /// q = (qw, qx, qy, qz); u = angular velocity in M.
    Ball,
    /// No relative motion.
    Weld,
}

/// Frame a mobility axis is fixed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    Inboard,
    Outboard,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AxisMotion {
    Rotation,
    Translation,
    /// Rotation carrying `pitch` translation per radian along the same axis.
    Helical(f64),
}

/// One generalized speed: a unit axis in the F or M frame, passing through
/// the M origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HingeAxis {
    pub axis: DVec3,
    pub frame: Attachment,
    pub motion: AxisMotion,
}

impl HingeAxis {
    const fn new(axis: DVec3, frame: Attachment, motion: AxisMotion) -> Self {
        Self {
            axis,
            frame,
            motion,
        }
    }

    /// Ground-frame twist of a unit speed given the F and M rotations and the
    /// world position of the M origin.
    pub fn twist(&self, f_rotation: DQuat, m_rotation: DQuat, m_origin: DVec3) -> SpatialVec {
        let axis = match self.frame {
            Attachment::Inboard => f_rotation * self.axis,
            Attachment::Outboard => m_rotation * self.axis,
        };
        match self.motion {
            AxisMotion::Rotation => SpatialVec::rotation_about(axis, m_origin),
            AxisMotion::Translation => SpatialVec::translation_along(axis),
            AxisMotion::Helical(pitch) => {
                SpatialVec::rotation_about(axis, m_origin) + SpatialVec::translation_along(axis * pitch)
            }
        }
    }
}

use Attachment::{Inboard, Outboard};
use AxisMotion::{Rotation, Translation};

const FREE_AXES: [HingeAxis; 6] = [
    HingeAxis::new(DVec3::X, Outboard, Rotation),
    HingeAxis::new(DVec3::Y, Outboard, Rotation),
    HingeAxis::new(DVec3::Z, Outboard, Rotation),
    HingeAxis::new(DVec3::X, Inboard, Translation),
    HingeAxis::new(DVec3::Y, Inboard, Translation),
    HingeAxis::new(DVec3::Z, Inboard, Translation),
];

const BALL_AXES: [HingeAxis; 3] = [
    HingeAxis::new(DVec3::X, Outboard, Rotation),
    HingeAxis::new(DVec3::Y, Outboard, Rotation),
    HingeAxis::new(DVec3::Z, Outboard, Rotation),
];

const PIN_AXES: [HingeAxis; 1] = [HingeAxis::new(DVec3::Z, Inboard, Rotation)];
const SLIDER_AXES: [HingeAxis; 1] = [HingeAxis::new(DVec3::X, Inboard, Translation)];
const SCREW_AXES: [HingeAxis; 1] = [HingeAxis::new(DVec3::Z, Inboard, AxisMotion::Helical(0.0))];
const UNIVERSAL_AXES: [HingeAxis; 2] = [
    HingeAxis::new(DVec3::X, Inboard, Rotation),
    HingeAxis::new(DVec3::Y, Outboard, Rotation),
];

impl MobilizerKind {
    /// Backend kind realizing a supported joint type; `None` for types the
    /// backend cannot mobilize.
    pub fn for_joint(joint_type: JointType, thread_pitch: f64) -> Option<Self> {
        match joint_type {
            JointType::Free => Some(MobilizerKind::Free),
            JointType::Revolute => Some(MobilizerKind::Pin),
            JointType::Prismatic => Some(MobilizerKind::Slider),
            JointType::Screw => Some(MobilizerKind::Screw {
                pitch: thread_pitch,
            }),
            JointType::Universal => Some(MobilizerKind::Universal),
            JointType::Ball => Some(MobilizerKind::Ball),
            JointType::Revolute2 => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MobilizerKind::Free => "free",
            MobilizerKind::Pin => "pin",
            MobilizerKind::Slider => "slider",
            MobilizerKind::Screw { .. } => "screw",
            MobilizerKind::Universal => "universal",
            MobilizerKind::Ball => "ball",
            MobilizerKind::Weld => "weld",
        }
    }

    pub fn nq(&self) -> usize {
        match self {
            MobilizerKind::Free => 7,
            MobilizerKind::Ball => 4,
            MobilizerKind::Universal => 2,
            MobilizerKind::Pin | MobilizerKind::Slider | MobilizerKind::Screw { .. } => 1,
            MobilizerKind::Weld => 0,
        }
    }

    pub fn nu(&self) -> usize {
        self.axes().len()
    }

    pub fn has_quaternion(&self) -> bool {
        matches!(self, MobilizerKind::Free | MobilizerKind::Ball)
    }

    /// Canonical direction in F and M that the joint axis is aligned with.
    pub fn canonical_axis(&self) -> DVec3 {
        match self {
            MobilizerKind::Slider => DVec3::X,
            _ => DVec3::Z,
        }
    }

    pub fn axes(&self) -> &'static [HingeAxis] {
        match self {
            MobilizerKind::Free => &FREE_AXES,
            MobilizerKind::Ball => &BALL_AXES,
            MobilizerKind::Pin => &PIN_AXES,
            MobilizerKind::Slider => &SLIDER_AXES,
            MobilizerKind::Universal => &UNIVERSAL_AXES,
            MobilizerKind::Screw { .. } => &SCREW_AXES,
            MobilizerKind::Weld => &[],
        }
    }

    /// Mobility axis `i`, with the screw pitch filled in.
    pub fn axis(&self, i: usize) -> HingeAxis {
        let mut axis = self.axes()[i];
        if let MobilizerKind::Screw { pitch } = self {
            axis.motion = AxisMotion::Helical(*pitch);
        }
        axis
    }

    /// Pose of M in F for coordinates `q`.
    pub fn transform(&self, q: &[f64]) -> Transform {
        match self {
            MobilizerKind::Free => Transform::new(
                DVec3::new(q[4], q[5], q[6]),
                quat_from_slice(q),
            ),
            MobilizerKind::Ball => Transform::from_rotation(quat_from_slice(q)),
            MobilizerKind::Pin => Transform::from_rotation(DQuat::from_rotation_z(q[0])),
            MobilizerKind::Slider => Transform::from_position(DVec3::X * q[0]),
            MobilizerKind::Screw { pitch } => {
                Transform::new(DVec3::Z * (pitch * q[0]), DQuat::from_rotation_z(q[0]))
            }
            MobilizerKind::Universal => Transform::from_rotation(
                DQuat::from_rotation_x(q[0]) * DQuat::from_rotation_y(q[1]),
            ),
            MobilizerKind::Weld => Transform::IDENTITY,
        }
    }

    /// Writes the coordinate derivative for speeds `u` into `q_dot`.
    pub fn q_dot(&self, q: &[f64], u: &[f64], q_dot: &mut [f64]) {
        match self {
            MobilizerKind::Free | MobilizerKind::Ball => {
                let rate = crate::utils::quat_derivative_body(
                    quat_from_slice(q),
                    DVec3::new(u[0], u[1], u[2]),
                );
                q_dot[0] = rate.w;
                q_dot[1] = rate.x;
                q_dot[2] = rate.y;
                q_dot[3] = rate.z;
                if matches!(self, MobilizerKind::Free) {
                    q_dot[4..7].copy_from_slice(&u[3..6]);
                }
            }
            MobilizerKind::Pin
            | MobilizerKind::Slider
            | MobilizerKind::Screw { .. }
            | MobilizerKind::Universal => q_dot.copy_from_slice(u),
            MobilizerKind::Weld => {}
        }
    }

    /// Coordinates that best reproduce the pose `x_fm`.
    ///
    /// Components the mobilizer cannot represent are dropped.
    pub fn coordinates_for(&self, x_fm: &Transform) -> Vec<f64> {
        match self {
            MobilizerKind::Free => {
                let r = x_fm.rotation.normalize();
                let p = x_fm.position;
                vec![r.w, r.x, r.y, r.z, p.x, p.y, p.z]
            }
            MobilizerKind::Ball => {
                let r = x_fm.rotation.normalize();
                vec![r.w, r.x, r.y, r.z]
            }
            MobilizerKind::Pin | MobilizerKind::Screw { .. } => {
                vec![twist_angle_z(x_fm.rotation)]
            }
            MobilizerKind::Slider => vec![x_fm.position.x],
            MobilizerKind::Universal => {
                let (a, b, _) = x_fm.rotation.normalize().to_euler(EulerRot::XYZ);
                vec![a, b]
            }
            MobilizerKind::Weld => Vec::new(),
        }
    }

    /// Re-normalises quaternion coordinates in place.
    pub fn normalize(&self, q: &mut [f64]) {
        if !self.has_quaternion() {
            return;
        }
        let norm = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
        if norm > f64::EPSILON {
            for c in &mut q[0..4] {
                *c /= norm;
            }
        } else {
            q[0] = 1.0;
            q[1..4].fill(0.0);
        }
    }
}

fn quat_from_slice(q: &[f64]) -> DQuat {
    DQuat::from_xyzw(q[1], q[2], q[3], q[0]).normalize()
}

/// Angle of the rotation component about Z.
fn twist_angle_z(r: DQuat) -> f64 {
    2.0 * r.z.atan2(r.w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_counts_match_kinds() {
        assert_eq!((MobilizerKind::Free.nq(), MobilizerKind::Free.nu()), (7, 6));
        assert_eq!((MobilizerKind::Ball.nq(), MobilizerKind::Ball.nu()), (4, 3));
        assert_eq!(MobilizerKind::Universal.nu(), 2);
        assert_eq!(MobilizerKind::Screw { pitch: 0.1 }.nu(), 1);
        assert_eq!(MobilizerKind::Weld.nu(), 0);
    }

    #[test]
    fn screw_couples_rotation_and_translation() {
        let kind = MobilizerKind::Screw { pitch: 0.5 };
        let x = kind.transform(&[2.0]);
        assert!((x.position - DVec3::new(0.0, 0.0, 1.0)).length() < 1e-12);
        assert!((kind.coordinates_for(&x)[0] - 2.0).abs() < 1e-12);
        assert_eq!(kind.axis(0).motion, AxisMotion::Helical(0.5));
    }

    #[test]
    fn universal_coordinates_recover_angles() {
        let kind = MobilizerKind::Universal;
        let q = kind.coordinates_for(&kind.transform(&[0.3, -0.4]));
        assert!((q[0] - 0.3).abs() < 1e-9);
        assert!((q[1] + 0.4).abs() < 1e-9);
    }
}
