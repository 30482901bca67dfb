use nalgebra as na;
use rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};
use std::collections::{HashMap, VecDeque};

use crate::{
    point3d::Point3d,
    voxel_util::{self, Voxel},
};

type VoxelPoints = VecDeque<Point3d>;

/// Hashed voxel grid holding at most `max_points_per_voxel` points per voxel.
///
/// A full voxel drops its oldest point to make room for a new one.
#[derive(Debug, Clone)]
pub struct VoxelHashMap {
    voxel_size: f64,
    max_points_per_voxel: usize,
    map: HashMap<Voxel, VoxelPoints>,
}

impl VoxelHashMap {
    pub fn new(voxel_size: f64, max_points_per_voxel: usize) -> VoxelHashMap {
        VoxelHashMap {
            voxel_size,
            max_points_per_voxel: max_points_per_voxel.max(1),
            map: HashMap::new(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn num_voxels(&self) -> usize {
        self.map.len()
    }

    pub fn num_points(&self) -> usize {
        self.map.values().map(|v| v.len()).sum()
    }

    pub fn voxel_points(&self, voxel: &Voxel) -> Option<&VecDeque<Point3d>> {
        self.map.get(voxel)
    }

    pub fn voxels(&self) -> impl Iterator<Item = (&Voxel, &VecDeque<Point3d>)> {
        self.map.iter()
    }

    pub fn points(&self) -> Vec<Point3d> {
        self.map.values().flat_map(|v| v.iter().copied()).collect()
    }

    pub fn insert(&mut self, points: &[Point3d]) {
        let capacity = self.max_points_per_voxel;
        points.iter().for_each(|pt| {
            let voxel = voxel_util::point_to_voxel(pt, self.voxel_size);
            let voxel_points = self
                .map
                .entry(voxel)
                .or_insert_with(|| VecDeque::with_capacity(capacity));
            if voxel_points.len() >= capacity {
                voxel_points.pop_front();
            }
            voxel_points.push_back(*pt);
        });
    }

    /// Drops every point farther than `max_range` from `center`, then every
    /// voxel left empty.
    pub fn remove_far_from(&mut self, center: &na::Vector3<f64>, max_range: f64) {
        let max_distance2 = max_range * max_range;
        self.map.par_iter_mut().for_each(|(_, vps)| {
            vps.retain(|pt| (pt.to_na_vec() - center).norm_squared() <= max_distance2);
        });
        self.map.retain(|_, vps| !vps.is_empty());
    }

    /// Closest stored point within the 3x3x3 voxel block around `point`.
    pub fn nearest(&self, point: &Point3d) -> Option<(Point3d, f64)> {
        let voxel = voxel_util::point_to_voxel(point, self.voxel_size);
        let point_na = point.to_na_vec();
        voxel_util::get_adjacent_voxels(&voxel, 1)
            .iter()
            .filter_map(|query_voxel| self.map.get(query_voxel))
            .flat_map(|voxel_points| voxel_points.iter())
            .map(|pt| (*pt, (pt.to_na_vec() - point_na).norm_squared()))
            .fold(None, |closest: Option<(Point3d, f64)>, candidate| {
                match closest {
                    Some(best) if best.1 <= candidate.1 => Some(best),
                    _ => Some(candidate),
                }
            })
            .map(|(pt, distance2)| (pt, distance2.sqrt()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn voxel_cap_evicts_oldest_first() {
        let mut grid = VoxelHashMap::new(1.0, 5);
        let points: Vec<Point3d> = (0..100)
            .map(|i| Point3d::new(0.5, 0.5, i as f64 * 0.009))
            .collect();
        grid.insert(&points);
        assert_eq!(grid.num_voxels(), 1);
        let stored = grid
            .voxel_points(&Voxel::new(0, 0, 0))
            .expect("voxel should exist");
        assert_eq!(stored.len(), 5);
        assert_eq!(stored.iter().copied().collect::<Vec<_>>(), points[95..].to_vec());
    }

    #[test]
    fn cap_holds_after_repeated_inserts() {
        let mut grid = VoxelHashMap::new(0.5, 3);
        for round in 0..10 {
            let points: Vec<Point3d> = (0..50)
                .map(|i| {
                    Point3d::new(
                        (i % 7) as f64 * 0.3,
                        (i % 5) as f64 * 0.2,
                        round as f64 * 0.01,
                    )
                })
                .collect();
            grid.insert(&points);
            assert!(grid.voxels().all(|(_, v)| v.len() <= 3));
        }
    }

    #[test]
    fn nearest_searches_neighboring_voxels() {
        let mut grid = VoxelHashMap::new(1.0, 20);
        assert!(grid.nearest(&Point3d::default()).is_none());
        grid.insert(&[
            Point3d::new(1.2, 0.5, 0.5),
            Point3d::new(0.5, -0.7, 0.5),
            Point3d::new(5.0, 5.0, 5.0),
        ]);
        let (closest, distance) = grid
            .nearest(&Point3d::new(0.9, 0.5, 0.5))
            .expect("neighbor in adjacent voxel");
        assert_eq!(closest, Point3d::new(1.2, 0.5, 0.5));
        assert_relative_eq!(distance, 0.3, epsilon = 1e-12);

        // only the far point is left outside the 3x3x3 block
        assert!(grid.nearest(&Point3d::new(10.0, 10.0, 10.0)).is_none());
    }

    #[test]
    fn remove_far_from_drops_points_and_empty_voxels() {
        let mut grid = VoxelHashMap::new(1.0, 20);
        grid.insert(&[
            Point3d::new(0.5, 0.0, 0.0),
            Point3d::new(3.0, 0.0, 0.0),
            Point3d::new(3.9, 0.0, 0.0),
            Point3d::new(10.0, 0.0, 0.0),
        ]);
        grid.remove_far_from(&na::Vector3::zeros(), 3.5);
        assert_eq!(grid.num_points(), 2);
        assert_eq!(grid.num_voxels(), 2);
        assert!(grid.points().iter().all(|p| p.square().sqrt() <= 3.5));
    }
}
