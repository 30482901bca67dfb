use crate::{
    config::Config,
    lie_group::{Exp, Hat},
    local_map::LocalMap,
    point3d::{self, Point3d},
};
use nalgebra as na;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

/// Ratio between the maximum correspondence distance and the Geman-McClure
/// kernel scale. The distance spans 3σ of the model deviation and the
/// kernel σ/3.
const KERNEL_SCALE_DIVISOR: f64 = 9.0;

/// Smallest accepted ratio between the extreme eigenvalues of `JᵀWJ`.
const MIN_RECIPROCAL_CONDITION: f64 = 1e-10;

pub type Correspondence = (Point3d, Point3d);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    /// Nothing to align against; the initial guess was accepted.
    EmptyMap,
    /// The update fell below the convergence tolerance.
    Converged,
    /// Iteration budget spent; the last estimate was accepted.
    MaxIterations,
    /// Too few correspondences survived the threshold.
    Degenerate,
    /// The normal equations were too badly conditioned to solve.
    Singular,
}

#[derive(Debug, Clone)]
pub struct RegistrationResult {
    pub pose: na::Isometry3<f64>,
    /// `initial_guess⁻¹ * pose`
    pub correction: na::Isometry3<f64>,
    pub iterations: usize,
    pub num_correspondences: usize,
    pub status: RegistrationStatus,
}

impl RegistrationResult {
    fn unrefined(
        initial_guess: &na::Isometry3<f64>,
        iterations: usize,
        num_correspondences: usize,
        status: RegistrationStatus,
    ) -> RegistrationResult {
        RegistrationResult {
            pose: *initial_guess,
            correction: na::Isometry3::identity(),
            iterations,
            num_correspondences,
            status,
        }
    }

    /// Whether ICP actually refined the initial guess.
    pub fn is_refined(&self) -> bool {
        matches!(
            self.status,
            RegistrationStatus::Converged | RegistrationStatus::MaxIterations
        )
    }
}

/// Point-to-point ICP against a [`LocalMap`].
#[derive(Debug, Clone)]
pub struct Registration {
    max_iterations: usize,
    convergence_tolerance: f64,
    min_correspondences: usize,
}

impl Registration {
    pub fn new(
        max_iterations: usize,
        convergence_tolerance: f64,
        min_correspondences: usize,
    ) -> Registration {
        Registration {
            max_iterations,
            convergence_tolerance,
            min_correspondences,
        }
    }

    pub fn from_config(config: &Config) -> Registration {
        Registration::new(
            config.max_iterations,
            config.convergence_tolerance,
            config.min_correspondences,
        )
    }

    /// Aligns `frame` (sensor frame) to `local_map`, starting at
    /// `initial_guess`. Correspondences longer than
    /// `max_correspondence_distance` are rejected.
    pub fn align_points_to_map(
        &self,
        frame: &[Point3d],
        local_map: &LocalMap,
        initial_guess: &na::Isometry3<f64>,
        max_correspondence_distance: f64,
    ) -> RegistrationResult {
        if local_map.is_empty() {
            return RegistrationResult::unrefined(
                initial_guess,
                0,
                0,
                RegistrationStatus::EmptyMap,
            );
        }

        let kernel_scale = max_correspondence_distance / KERNEL_SCALE_DIVISOR;
        let mut source = point3d::transform_points(initial_guess, frame);
        let mut t_icp = na::Isometry3::<f64>::identity();
        let mut num_correspondences = 0;

        for iteration in 1..=self.max_iterations {
            let correspondences =
                point_association(&source, local_map, max_correspondence_distance);
            num_correspondences = correspondences.len();
            if num_correspondences < self.min_correspondences {
                log::warn!(
                    "only {} correspondences within {:.3}, keeping prediction",
                    num_correspondences,
                    max_correspondence_distance
                );
                return RegistrationResult::unrefined(
                    initial_guess,
                    iteration,
                    num_correspondences,
                    RegistrationStatus::Degenerate,
                );
            }

            let (jtj, jtr) = build_linear_system(&correspondences, kernel_scale);
            let Some(dx) = solve_linear_system(&jtj, &jtr) else {
                log::warn!(
                    "singular linear system with {} correspondences, keeping prediction",
                    num_correspondences
                );
                return RegistrationResult::unrefined(
                    initial_guess,
                    iteration,
                    num_correspondences,
                    RegistrationStatus::Singular,
                );
            };

            let estimation = dx.exp();
            point3d::transform_points_inplace(&estimation, &mut source);
            t_icp = estimation * t_icp;
            log::debug!(
                "icp iteration {} correspondences {} |dx| {:e}",
                iteration,
                num_correspondences,
                dx.norm()
            );

            if dx.norm() < self.convergence_tolerance {
                return RegistrationResult {
                    pose: t_icp * initial_guess,
                    correction: initial_guess.inverse() * t_icp * initial_guess,
                    iterations: iteration,
                    num_correspondences,
                    status: RegistrationStatus::Converged,
                };
            }
        }

        log::warn!(
            "icp did not converge within {} iterations",
            self.max_iterations
        );
        RegistrationResult {
            pose: t_icp * initial_guess,
            correction: initial_guess.inverse() * t_icp * initial_guess,
            iterations: self.max_iterations,
            num_correspondences,
            status: RegistrationStatus::MaxIterations,
        }
    }
}

pub fn point_association(
    points: &[Point3d],
    local_map: &LocalMap,
    max_correspondance_distance: f64,
) -> Vec<Correspondence> {
    points
        .par_iter()
        .filter_map(|pt| match local_map.nearest(pt) {
            Some((closest_neighbor, distance)) if distance < max_correspondance_distance => {
                Some((*pt, closest_neighbor))
            }
            _ => None,
        })
        .collect()
}

/// Geman-McClure weight; non-increasing in the squared residual.
#[inline]
pub fn geman_mcclure_weight(residual2: f64, kernel_scale: f64) -> f64 {
    let square = |x: f64| x * x;
    square(kernel_scale) / square(kernel_scale + residual2)
}

pub fn build_linear_system(
    correspondences: &[Correspondence],
    kernel_scale: f64,
) -> (na::Matrix6<f64>, na::Vector6<f64>) {
    let compute_jacobian_and_residual =
        |(source, target): &(na::Vector3<f64>, na::Vector3<f64>)| {
            let residual = source - target;

            // [trans 3, rotation 3]
            let mut j_r = na::Matrix3x6::identity();
            j_r.fixed_columns_mut::<3>(3)
                .copy_from(&(-1.0 * source.hat()));
            (j_r, residual)
        };

    correspondences
        .par_iter()
        .map(|(source, target)| {
            let corr = (source.to_na_vec(), target.to_na_vec());
            let (j_r, residual) = compute_jacobian_and_residual(&corr);
            let w = geman_mcclure_weight(residual.norm_squared(), kernel_scale);

            let j_tw = j_r.transpose() * w;
            (j_tw * j_r, j_tw * residual)
        })
        .reduce(
            || (na::Matrix6::zeros(), na::Vector6::zeros()),
            |(j_tj_a, j_tr_a), (j_tj_b, j_tr_b)| (j_tj_a + j_tj_b, j_tr_a + j_tr_b),
        )
}

/// Solves `JᵀWJ dx = -JᵀWr`, refusing ill-conditioned systems.
pub fn solve_linear_system(
    jtj: &na::Matrix6<f64>,
    jtr: &na::Vector6<f64>,
) -> Option<na::Vector6<f64>> {
    let eigenvalues = jtj.symmetric_eigenvalues();
    let (min, max) = (eigenvalues.min(), eigenvalues.max());
    if max.is_nan() || max <= 0.0 || min <= max * MIN_RECIPROCAL_CONDITION {
        return None;
    }
    jtj.cholesky().map(|cholesky| cholesky.solve(&(-jtr)))
}
