use nalgebra as na;

/// Skew-symmetric matrix such that `v.hat() * u == v.cross(&u)`.
pub trait Hat {
    fn hat(&self) -> na::Matrix3<f64>;
}

impl Hat for na::Vector3<f64> {
    fn hat(&self) -> na::Matrix3<f64> {
        na::Matrix3::new(
            0.0, -self.z, self.y, //
            self.z, 0.0, -self.x, //
            -self.y, self.x, 0.0,
        )
    }
}

/// se(3) -> SE(3). The tangent is ordered `[translation, rotation]`.
pub trait Exp {
    fn exp(&self) -> na::Isometry3<f64>;
}

impl Exp for na::Vector6<f64> {
    fn exp(&self) -> na::Isometry3<f64> {
        let upsilon = self.fixed_rows::<3>(0).into_owned();
        let omega = self.fixed_rows::<3>(3).into_owned();
        let theta = omega.norm();
        let omega_hat = omega.hat();
        let omega_hat2 = omega_hat * omega_hat;

        // left jacobian of SO(3)
        let v = if theta < 1e-8 {
            na::Matrix3::identity() + 0.5 * omega_hat + omega_hat2 / 6.0
        } else {
            let theta2 = theta * theta;
            na::Matrix3::identity()
                + (1.0 - theta.cos()) / theta2 * omega_hat
                + (theta - theta.sin()) / (theta2 * theta) * omega_hat2
        };

        na::Isometry3::from_parts(
            na::Translation3::from(v * upsilon),
            na::UnitQuaternion::from_scaled_axis(omega),
        )
    }
}

/// Geodesic interpolation from identity to `delta`: rotation scaled along its
/// axis, translation scaled linearly.
pub fn interpolate_from_identity(delta: &na::Isometry3<f64>, t: f64) -> na::Isometry3<f64> {
    na::Isometry3::from_parts(
        na::Translation3::from(delta.translation.vector * t),
        na::UnitQuaternion::from_scaled_axis(delta.rotation.scaled_axis() * t),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn hat_matches_cross_product() {
        let v = na::Vector3::new(0.3, -1.2, 2.0);
        let u = na::Vector3::new(-0.7, 0.4, 1.1);
        assert_relative_eq!(v.hat() * u, v.cross(&u), epsilon = 1e-12);
    }

    #[test]
    fn exp_of_zero_is_identity() {
        let pose = na::Vector6::<f64>::zeros().exp();
        assert_relative_eq!(pose, na::Isometry3::identity());
    }

    #[test]
    fn exp_of_pure_translation() {
        let pose = na::Vector6::new(1.0, -2.0, 0.5, 0.0, 0.0, 0.0).exp();
        assert_relative_eq!(
            pose.translation.vector,
            na::Vector3::new(1.0, -2.0, 0.5),
            epsilon = 1e-12
        );
        assert_relative_eq!(pose.rotation.angle(), 0.0);
    }

    #[test]
    fn exp_of_screw_motion() {
        // quarter turn about z while advancing along x traces a quarter circle
        let half_pi = std::f64::consts::FRAC_PI_2;
        let pose = na::Vector6::new(half_pi, 0.0, 0.0, 0.0, 0.0, half_pi).exp();
        assert_relative_eq!(pose.rotation.angle(), half_pi, epsilon = 1e-12);
        assert_relative_eq!(
            pose.translation.vector,
            na::Vector3::new(1.0, 1.0, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn interpolation_endpoints_and_midpoint() {
        let delta = na::Isometry3::new(
            na::Vector3::new(2.0, 0.0, 0.0),
            na::Vector3::new(0.0, 0.0, 0.4),
        );
        assert_relative_eq!(
            interpolate_from_identity(&delta, 0.0),
            na::Isometry3::identity(),
            epsilon = 1e-12
        );
        assert_relative_eq!(interpolate_from_identity(&delta, 1.0), delta, epsilon = 1e-12);
        let mid = interpolate_from_identity(&delta, 0.5);
        assert_relative_eq!(mid.translation.vector.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(mid.rotation.angle(), 0.2, epsilon = 1e-12);
    }
}
