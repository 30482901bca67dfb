use crate::error::{OdometryError, Result};
use nalgebra as na;
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3d {
    pub fn new(x: f64, y: f64, z: f64) -> Point3d {
        Point3d { x, y, z }
    }
    pub fn square(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }
    pub fn to_na_vec(&self) -> na::Vector3<f64> {
        na::Vector3::<f64>::new(self.x, self.y, self.z)
    }
    pub fn to_na_point3(&self) -> na::Point3<f64> {
        na::Point3::<f64>::new(self.x, self.y, self.z)
    }
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<na::Point3<f64>> for Point3d {
    fn from(p: na::Point3<f64>) -> Self {
        Point3d::new(p.x, p.y, p.z)
    }
}

/// One sensor sweep.
///
/// `timestamps`, when present, holds one acquisition time per point
/// normalized to `[0, 1]` within the sweep. `stamp` is the absolute time of
/// the sweep in seconds.
#[derive(Debug, Clone, Default)]
pub struct Scan {
    pub points: Vec<Point3d>,
    pub timestamps: Option<Vec<f64>>,
    pub stamp: Option<f64>,
}

impl Scan {
    pub fn new(points: Vec<Point3d>) -> Scan {
        Scan {
            points,
            timestamps: None,
            stamp: None,
        }
    }

    pub fn with_timestamps(mut self, timestamps: Vec<f64>) -> Scan {
        self.timestamps = Some(timestamps);
        self
    }

    pub fn with_stamp(mut self, stamp: f64) -> Scan {
        self.stamp = Some(stamp);
        self
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Rejects scans the pipeline must not consume.
    pub fn validate(&self) -> Result<()> {
        if self.points.is_empty() {
            return Err(OdometryError::EmptyScan);
        }
        if let Some(timestamps) = &self.timestamps {
            if timestamps.len() != self.points.len() {
                return Err(OdometryError::TimestampMismatch {
                    points: self.points.len(),
                    timestamps: timestamps.len(),
                });
            }
            if let Some(bad) = timestamps.iter().find(|t| !(0.0..=1.0).contains(*t)) {
                return Err(OdometryError::InvalidTimestamp(*bad));
            }
        }
        Ok(())
    }
}

/// Maps absolute per-point times onto `[0, 1]`.
///
/// A sweep whose points all share one time maps to zeros.
pub fn normalize_timestamps(timestamps: &[f64]) -> Vec<f64> {
    let (min, max) = timestamps
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| {
            (lo.min(t), hi.max(t))
        });
    let span = max - min;
    if span.is_nan() || span <= 0.0 {
        return vec![0.0; timestamps.len()];
    }
    timestamps.iter().map(|t| (t - min) / span).collect()
}

pub fn clip_point_cloud_by_distance(
    point_cloud: &[Point3d],
    min_distance: f64,
    max_distance: f64,
) -> Vec<Point3d> {
    let min2 = min_distance * min_distance;
    let max2 = max_distance * max_distance;
    point_cloud
        .par_iter()
        .filter(|pt| {
            let s = pt.square();
            pt.is_finite() && s >= min2 && s <= max2
        })
        .copied()
        .collect()
}

pub fn transform_points(transform: &na::Isometry3<f64>, point_cloud: &[Point3d]) -> Vec<Point3d> {
    point_cloud
        .par_iter()
        .map(|pt| transform.transform_point(&pt.to_na_point3()).into())
        .collect()
}

pub fn transform_points_inplace(transform: &na::Isometry3<f64>, point_cloud: &mut [Point3d]) {
    point_cloud.par_iter_mut().for_each(|pt| {
        *pt = transform.transform_point(&pt.to_na_point3()).into();
    });
}
