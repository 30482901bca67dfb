use crate::{point3d, point3d::Point3d, voxel_hash_map::VoxelHashMap};
use nalgebra as na;

/// Registered environment around the sensor, in the world frame.
///
/// After every [`LocalMap::update`] no stored point lies farther than
/// `max_range` from the pose passed to that update.
#[derive(Debug, Clone)]
pub struct LocalMap {
    grid: VoxelHashMap,
    max_range: f64,
}

impl LocalMap {
    pub fn new(voxel_size: f64, max_range: f64, max_points_per_voxel: usize) -> LocalMap {
        LocalMap {
            grid: VoxelHashMap::new(voxel_size, max_points_per_voxel),
            max_range,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    pub fn len(&self) -> usize {
        self.grid.num_points()
    }

    pub fn grid(&self) -> &VoxelHashMap {
        &self.grid
    }

    pub fn points(&self) -> Vec<Point3d> {
        self.grid.points()
    }

    /// Inserts `points` (sensor frame) at `t_origin_current` and evicts
    /// everything out of range of that pose.
    pub fn update(&mut self, points: &[Point3d], t_origin_current: &na::Isometry3<f64>) {
        let transformed_points = point3d::transform_points(t_origin_current, points);
        self.grid.insert(&transformed_points);
        self.grid
            .remove_far_from(&t_origin_current.translation.vector, self.max_range);
    }

    pub fn nearest(&self, point: &Point3d) -> Option<(Point3d, f64)> {
        self.grid.nearest(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn update_places_points_in_world_frame() {
        let mut local_map = LocalMap::new(1.0, 100.0, 20);
        let pose = na::Isometry3::translation(10.0, 0.0, 0.0);
        local_map.update(&[Point3d::new(1.0, 0.0, 0.0)], &pose);
        let (closest, distance) = local_map
            .nearest(&Point3d::new(11.0, 0.0, 0.0))
            .expect("point was inserted");
        assert_relative_eq!(distance, 0.0);
        assert_eq!(closest, Point3d::new(11.0, 0.0, 0.0));
    }

    #[test]
    fn every_point_stays_within_range_of_latest_pose() {
        let mut local_map = LocalMap::new(0.5, 5.0, 20);
        let points: Vec<Point3d> = (0..40)
            .map(|i| Point3d::new(i as f64 * 0.25, 0.3, -0.2))
            .collect();
        for step in 0..6 {
            let pose = na::Isometry3::new(
                na::Vector3::new(step as f64 * 2.0, 0.0, 0.0),
                na::Vector3::new(0.0, 0.0, 0.1 * step as f64),
            );
            local_map.update(&points, &pose);
            let origin = pose.translation.vector;
            assert!(local_map
                .points()
                .iter()
                .all(|p| (p.to_na_vec() - origin).norm() <= 5.0));
        }
        assert!(!local_map.is_empty());
    }
}
