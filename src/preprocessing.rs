use crate::{
    config::Config,
    error::{OdometryError, Result},
    lie_group::interpolate_from_identity,
    point3d::{self, Point3d, Scan},
    voxel_util,
};
use nalgebra as na;
use rayon::prelude::*;

/// Points of one scan at every stage of preprocessing.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Motion-compensated, range-cropped scan.
    pub deskewed: Vec<Point3d>,
    /// Map resolution subsample, used to grow the local map.
    pub fine: Vec<Point3d>,
    /// Registration resolution subsample, drawn from `fine`.
    pub rough: Vec<Point3d>,
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
    deskew: bool,
    min_range: f64,
    max_range: f64,
    voxel_size: f64,
    rough_voxel_size: f64,
}

impl Preprocessor {
    pub fn new(
        deskew: bool,
        min_range: f64,
        max_range: f64,
        voxel_size: f64,
        rough_scale_factor: f64,
    ) -> Preprocessor {
        Preprocessor {
            deskew,
            min_range,
            max_range,
            voxel_size,
            rough_voxel_size: voxel_size * rough_scale_factor,
        }
    }

    pub fn from_config(config: &Config) -> Preprocessor {
        Preprocessor {
            deskew: config.deskew,
            min_range: config.min_range,
            max_range: config.max_range,
            voxel_size: config.voxel_size,
            rough_voxel_size: config.rough_voxel_size(),
        }
    }

    /// Expresses every point in the scan-start frame, assuming the sensor
    /// moved by `t_start_end` over the sweep at constant velocity.
    ///
    /// Timestamps must already be normalized to `[0, 1]`, see
    /// [`Scan::validate`]. Scans without timestamps, or with deskewing
    /// disabled, come back as is.
    pub fn deskew(&self, scan: &Scan, t_start_end: &na::Isometry3<f64>) -> Vec<Point3d> {
        match (&scan.timestamps, self.deskew) {
            (Some(timestamps), true) => scan
                .points
                .par_iter()
                .zip(timestamps.par_iter())
                .map(|(pt, &t)| {
                    let t_start_point = interpolate_from_identity(t_start_end, t);
                    t_start_point.transform_point(&pt.to_na_point3()).into()
                })
                .collect(),
            _ => scan.points.clone(),
        }
    }

    /// Returns the fine subsample and the rough subsample taken from it.
    pub fn subsample(&self, points: &[Point3d]) -> (Vec<Point3d>, Vec<Point3d>) {
        let fine = voxel_util::voxel_downsample(points, self.voxel_size);
        let rough = voxel_util::voxel_downsample(&fine, self.rough_voxel_size);
        (fine, rough)
    }

    pub fn preprocess(&self, scan: &Scan, t_start_end: &na::Isometry3<f64>) -> Result<Frame> {
        let deskewed = point3d::clip_point_cloud_by_distance(
            &self.deskew(scan, t_start_end),
            self.min_range,
            self.max_range,
        );
        if deskewed.is_empty() {
            return Err(OdometryError::EmptyScan);
        }
        let (fine, rough) = self.subsample(&deskewed);
        Ok(Frame {
            deskewed,
            fine,
            rough,
        })
    }
}
