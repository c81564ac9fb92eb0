//! Core units, constants, and planar geometry shared across the jumping-robot workspace.

/// Physical constants expressed in SI units (unless stated otherwise).
pub mod constants {
    /// Gravitational acceleration used by the robot models (m/s²).
    pub const GRAVITY: f64 = 9.8;
    /// Standard sea-level atmospheric pressure (Pa).
    pub const ATMOSPHERIC_PRESSURE: f64 = 101_325.0;
    /// Specific gas constant of dry air (J/(kg·K)).
    pub const AIR_GAS_CONSTANT: f64 = 287.05;
    /// Room temperature used for isothermal gas models (K).
    pub const ROOM_TEMPERATURE: f64 = 293.15;
    /// Dynamic viscosity of air at room temperature (Pa·s).
    pub const AIR_VISCOSITY: f64 = 1.81e-5;
    /// Pascals per pound-force per square inch.
    pub const PA_PER_PSI: f64 = 6_894.757_293_168;
}

/// Basic unit conversion helpers.
pub mod units {
    use super::constants::PA_PER_PSI;

    /// Convert pounds per square inch to pascals.
    #[inline]
    pub fn psi_to_pa(v: f64) -> f64 {
        v * PA_PER_PSI
    }

}

/// Geometry of the sagittal plane: `x` forward, `y` up, angles counter-clockwise.
///
/// Poses, twists, accelerations, and wrenches share the component order
/// `(angular, x, y)`, so the time derivative of a pose vector is a twist vector.
pub mod planar {
    pub use nalgebra::{Vector2, Vector3};

    /// Rotate a vector by `theta` radians.
    #[inline]
    pub fn rotate(theta: f64, v: &Vector2<f64>) -> Vector2<f64> {
        let (s, c) = theta.sin_cos();
        Vector2::new(c * v.x - s * v.y, s * v.x + c * v.y)
    }

    /// Planar cross product of a vector with a unit angular rate: `ω × r = ω · perp(r)`.
    #[inline]
    pub fn perp(v: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(-v.y, v.x)
    }

    /// Scalar cross product `a × b` of two planar vectors.
    #[inline]
    pub fn cross(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
        a.x * b.y - a.y * b.x
    }

    /// Velocity of a body point at offset `r` from the reference point, given twist `(ω, vx, vy)`.
    #[inline]
    pub fn point_velocity(twist: &Vector3<f64>, r: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(twist[1], twist[2]) + perp(r) * twist[0]
    }

    /// Acceleration of a body point at offset `r`, including the centripetal term.
    #[inline]
    pub fn point_acceleration(
        accel: &Vector3<f64>,
        twist: &Vector3<f64>,
        r: &Vector2<f64>,
    ) -> Vector2<f64> {
        Vector2::new(accel[1], accel[2]) + perp(r) * accel[0] - r * (twist[0] * twist[0])
    }

    /// Planar rigid-body pose: orientation and centre-of-mass position.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct Pose2 {
        pub theta: f64,
        pub x: f64,
        pub y: f64,
    }

    impl Pose2 {
        pub const fn new(theta: f64, x: f64, y: f64) -> Self {
            Self { theta, x, y }
        }

        pub const fn identity() -> Self {
            Self::new(0.0, 0.0, 0.0)
        }

        pub fn translation(&self) -> Vector2<f64> {
            Vector2::new(self.x, self.y)
        }

        /// Vector from the origin of this pose to a body-fixed point, in world axes.
        pub fn rotate(&self, local: &Vector2<f64>) -> Vector2<f64> {
            rotate(self.theta, local)
        }

        /// World position of a body-fixed point.
        pub fn transform_point(&self, local: &Vector2<f64>) -> Vector2<f64> {
            self.translation() + self.rotate(local)
        }

        pub fn to_vector(&self) -> Vector3<f64> {
            Vector3::new(self.theta, self.x, self.y)
        }

        pub fn from_slice(v: &[f64]) -> Self {
            Self::new(v[0], v[1], v[2])
        }
    }

    impl Default for Pose2 {
        fn default() -> Self {
            Self::identity()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use approx::assert_relative_eq;
        use std::f64::consts::FRAC_PI_2;

        #[test]
        fn rotation_quarter_turn_maps_x_to_y() {
            let v = rotate(FRAC_PI_2, &Vector2::new(1.0, 0.0));
            assert_relative_eq!(v.x, 0.0, epsilon = 1e-15);
            assert_relative_eq!(v.y, 1.0, epsilon = 1e-15);
        }

        #[test]
        fn perp_matches_cross_with_unit_rate() {
            let r = Vector2::new(0.3, -0.7);
            let f = Vector2::new(2.0, 5.0);
            assert_relative_eq!(cross(&r, &f), perp(&r).dot(&f), epsilon = 1e-12);
            assert_relative_eq!(perp(&r).dot(&r), 0.0, epsilon = 1e-15);
        }

        #[test]
        fn transform_point_applies_rotation_then_translation() {
            let pose = Pose2::new(FRAC_PI_2, 1.0, 2.0);
            let p = pose.transform_point(&Vector2::new(0.0, 0.5));
            assert_relative_eq!(p.x, 0.5, epsilon = 1e-12);
            assert_relative_eq!(p.y, 2.0, epsilon = 1e-12);
        }
    }
}
