use glam::{Mat4, Vec3};

/// Orbit camera around a target in the render frame, z up.
#[derive(Clone, Debug)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub distance: f32,
    /// Degrees around z.
    pub yaw: f32,
    /// Degrees above the xy plane.
    pub pitch: f32,
    /// Radians.
    pub fovy: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 15.0,
            yaw: -135.0,
            pitch: 35.0,
            fovy: 45f32.to_radians(),
            znear: 0.05,
            zfar: 1000.0,
        }
    }
}

impl OrbitCamera {
    pub fn eye(&self) -> Vec3 {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        let offset = Vec3::new(pitch.cos() * yaw.cos(), pitch.cos() * yaw.sin(), pitch.sin());
        self.target + offset * self.distance
    }

    /// Drag deltas in degrees.
    pub fn rotate(&mut self, d_yaw: f32, d_pitch: f32) {
        self.yaw = (self.yaw + d_yaw) % 360.0;
        self.pitch = (self.pitch + d_pitch).clamp(-89.0, 89.0);
    }

    pub fn zoom(&mut self, steps: f32) {
        self.distance = (self.distance * 0.9f32.powf(steps)).clamp(0.1, self.zfar * 0.5);
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        let aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            16.0 / 9.0
        };
        let view = Mat4::look_at_rh(self.eye(), self.target, Vec3::Z);
        let proj = Mat4::perspective_rh(self.fovy, aspect, self.znear, self.zfar);
        proj * view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_target_projects_to_center() {
        let camera = OrbitCamera {
            target: Vec3::new(1.0, 2.0, 0.5),
            ..OrbitCamera::default()
        };
        let clip = camera.view_proj(1.5).project_point3(camera.target);
        assert_relative_eq!(clip.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(clip.y, 0.0, epsilon = 1e-5);
        assert!(clip.z > 0.0 && clip.z < 1.0);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = OrbitCamera::default();
        camera.rotate(0.0, 500.0);
        assert_eq!(camera.pitch, 89.0);
        assert_relative_eq!(camera.eye().distance(camera.target), camera.distance, epsilon = 1e-4);
    }
}
