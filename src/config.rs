use crate::error::{OdometryError, Result};
use nalgebra as na;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    // map params
    pub voxel_size: f64,
    pub rough_scale_factor: f64,
    pub max_range: f64,
    pub min_range: f64,
    pub max_points_per_voxel: usize,

    // th params
    pub initial_threshold: f64,
    pub min_threshold: f64,
    pub threshold_multiplier: f64,
    pub min_motion_threshold: f64,

    // registration params
    pub max_iterations: usize,
    pub convergence_tolerance: f64,
    pub min_correspondences: usize,
    pub max_num_threads: usize,

    // Motion compensation
    pub deskew: bool,

    /// Pose of the first scan, identity when absent.
    pub initial_pose: Option<na::Isometry3<f64>>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            voxel_size: 1.0,
            rough_scale_factor: 1.5,
            max_range: 100.0,
            min_range: 0.0,
            max_points_per_voxel: 20,

            // th params
            initial_threshold: 2.0,
            min_threshold: 0.1,
            threshold_multiplier: 3.0,
            min_motion_threshold: 0.1,

            // registration params
            max_iterations: 500,
            convergence_tolerance: 0.0001,
            min_correspondences: 3,
            max_num_threads: 0,

            // Motion compensation
            deskew: false,

            initial_pose: None,
        }
    }
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(OdometryError::InvalidConfig(message()))
    }
}

impl Config {
    /// Checks every parameter once so that per-scan processing never has to.
    pub fn validate(&self) -> Result<()> {
        ensure(self.voxel_size.is_finite() && self.voxel_size > 0.0, || {
            format!("voxel_size must be positive, got {}", self.voxel_size)
        })?;
        ensure(
            self.rough_scale_factor.is_finite() && self.rough_scale_factor >= 1.0,
            || {
                format!(
                    "rough_scale_factor must be >= 1, got {}",
                    self.rough_scale_factor
                )
            },
        )?;
        ensure(self.max_range.is_finite() && self.max_range > 0.0, || {
            format!("max_range must be positive, got {}", self.max_range)
        })?;
        ensure(
            self.min_range >= 0.0 && self.min_range < self.max_range,
            || {
                format!(
                    "min_range must lie in [0, max_range), got {}",
                    self.min_range
                )
            },
        )?;
        ensure(self.max_points_per_voxel > 0, || {
            "max_points_per_voxel must be at least 1".to_string()
        })?;
        ensure(
            self.initial_threshold.is_finite() && self.initial_threshold > 0.0,
            || {
                format!(
                    "initial_threshold must be positive, got {}",
                    self.initial_threshold
                )
            },
        )?;
        ensure(
            self.min_threshold.is_finite() && self.min_threshold >= 0.0,
            || {
                format!(
                    "min_threshold must be non-negative, got {}",
                    self.min_threshold
                )
            },
        )?;
        ensure(
            self.threshold_multiplier.is_finite() && self.threshold_multiplier > 0.0,
            || {
                format!(
                    "threshold_multiplier must be positive, got {}",
                    self.threshold_multiplier
                )
            },
        )?;
        ensure(self.min_motion_threshold >= 0.0, || {
            format!(
                "min_motion_threshold must be non-negative, got {}",
                self.min_motion_threshold
            )
        })?;
        ensure(self.max_iterations > 0, || {
            "max_iterations must be at least 1".to_string()
        })?;
        ensure(self.convergence_tolerance > 0.0, || {
            format!(
                "convergence_tolerance must be positive, got {}",
                self.convergence_tolerance
            )
        })?;
        ensure(self.min_correspondences >= 3, || {
            format!(
                "min_correspondences must be at least 3, got {}",
                self.min_correspondences
            )
        })?;
        Ok(())
    }

    pub fn rough_voxel_size(&self) -> f64 {
        self.voxel_size * self.rough_scale_factor
    }
}
