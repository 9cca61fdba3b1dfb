use std::ops::Mul;

use glam::{DMat4, DQuat, DVec3, Mat4};
use serde::{Deserialize, Serialize};

/// Rigid transform: rotation followed by translation, no scale.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub translation: DVec3,
    pub rotation: DQuat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        translation: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
    };

    pub fn new(translation: DVec3, rotation: DQuat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn from_translation(translation: DVec3) -> Self {
        Self {
            translation,
            rotation: DQuat::IDENTITY,
        }
    }

    pub fn from_rotation(rotation: DQuat) -> Self {
        Self {
            translation: DVec3::ZERO,
            rotation,
        }
    }

    /// Builds a pose from raw message values. Returns `None` if any component is
    /// not finite or the quaternion has zero length.
    pub fn from_message(translation: [f64; 3], rotation: [f64; 4]) -> Option<Self> {
        let translation = DVec3::from_array(translation);
        let rotation = DQuat::from_xyzw(rotation[0], rotation[1], rotation[2], rotation[3]);
        if !translation.is_finite() || !rotation.is_finite() {
            return None;
        }
        let len = rotation.length();
        if len < 1e-9 {
            return None;
        }
        Some(Self {
            translation,
            rotation: rotation / len,
        })
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            translation: -(rotation * self.translation),
            rotation,
        }
    }

    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.rotation * point + self.translation
    }

    /// Lerp on translation, shortest-path slerp on rotation.
    pub fn interpolate(&self, other: &Pose, ratio: f64) -> Self {
        let mut end = other.rotation;
        if self.rotation.dot(end) < 0.0 {
            end = -end;
        }
        Self {
            translation: self.translation.lerp(other.translation, ratio),
            rotation: self.rotation.slerp(end, ratio).normalize(),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.translation.is_finite() && self.rotation.is_finite()
    }

    pub fn to_dmat4(&self) -> DMat4 {
        DMat4::from_rotation_translation(self.rotation, self.translation)
    }

    pub fn to_mat4(&self) -> Mat4 {
        self.to_dmat4().as_mat4()
    }

    pub fn abs_diff_eq(&self, other: &Pose, epsilon: f64) -> bool {
        let same_rotation = self.rotation.abs_diff_eq(other.rotation, epsilon)
            || self.rotation.abs_diff_eq(-other.rotation, epsilon);
        self.translation.abs_diff_eq(other.translation, epsilon) && same_rotation
    }
}

impl Mul for Pose {
    type Output = Pose;

    fn mul(self, rhs: Pose) -> Pose {
        Pose {
            translation: self.translation + self.rotation * rhs.translation,
            rotation: (self.rotation * rhs.rotation).normalize(),
        }
    }
}

impl Mul<&Pose> for &Pose {
    type Output = Pose;

    fn mul(self, rhs: &Pose) -> Pose {
        *self * *rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_compose_matches_matrices() {
        let a = Pose::new(DVec3::new(1.0, 2.0, 3.0), DQuat::from_rotation_z(FRAC_PI_2));
        let b = Pose::new(DVec3::new(0.0, 2.0, 0.0), DQuat::from_rotation_x(0.3));

        let composed = (a * b).to_dmat4();
        let expected = a.to_dmat4() * b.to_dmat4();
        for (c, e) in composed.to_cols_array().iter().zip(expected.to_cols_array()) {
            assert_relative_eq!(*c, e, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_inverse_round_trip() {
        let a = Pose::new(DVec3::new(-4.0, 0.5, 9.0), DQuat::from_rotation_y(1.1));
        let identity = a * a.inverse();
        assert!(identity.abs_diff_eq(&Pose::IDENTITY, 1e-9));
    }

    #[test]
    fn test_interpolate_takes_shortest_path() {
        let a = Pose::from_rotation(DQuat::from_rotation_z(0.1));
        let b = Pose::from_rotation(-DQuat::from_rotation_z(0.3));
        let mid = a.interpolate(&b, 0.5);
        let (axis, angle) = mid.rotation.to_axis_angle();
        assert_relative_eq!(angle * axis.z.signum(), 0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_from_message_rejects_degenerate() {
        assert!(Pose::from_message([0.0; 3], [0.0; 4]).is_none());
        assert!(Pose::from_message([f64::NAN, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]).is_none());

        let pose = Pose::from_message([1.0, 0.0, 0.0], [0.0, 0.0, 0.0, 2.0]);
        assert_eq!(pose.map(|p| p.rotation), Some(DQuat::IDENTITY));
    }
}
