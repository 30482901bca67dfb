use crate::point3d::Point3d;
use nalgebra as na;
use std::collections::HashSet;

pub type Voxel = na::Vector3<i32>;

/// Keeps the first point seen in every voxel, in input order.
pub fn voxel_downsample(point_cloud: &[Point3d], voxel_size: f64) -> Vec<Point3d> {
    let mut occupied: HashSet<Voxel> = HashSet::with_capacity(point_cloud.len());
    point_cloud
        .iter()
        .filter(|pt| occupied.insert(point_to_voxel(pt, voxel_size)))
        .copied()
        .collect()
}

pub fn point_to_voxel(point: &Point3d, voxel_size: f64) -> Voxel {
    Voxel::new(
        (point.x / voxel_size).floor() as i32,
        (point.y / voxel_size).floor() as i32,
        (point.z / voxel_size).floor() as i32,
    )
}

pub fn get_adjacent_voxels(voxel: &Voxel, adjacent_voxels: i32) -> Vec<Voxel> {
    let mut voxel_neighborhood = Vec::<Voxel>::new();
    for x in voxel.x - adjacent_voxels..voxel.x + adjacent_voxels + 1 {
        for y in voxel.y - adjacent_voxels..voxel.y + adjacent_voxels + 1 {
            for z in voxel.z - adjacent_voxels..voxel.z + adjacent_voxels + 1 {
                voxel_neighborhood.push(Voxel::new(x, y, z));
            }
        }
    }
    voxel_neighborhood
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_coordinates_floor_down() {
        assert_eq!(
            point_to_voxel(&Point3d::new(-0.1, 0.1, -1.0), 1.0),
            Voxel::new(-1, 0, -1)
        );
        assert_eq!(
            point_to_voxel(&Point3d::new(2.5, -2.5, 0.0), 2.0),
            Voxel::new(1, -2, 0)
        );
    }

    #[test]
    fn downsample_keeps_first_point_per_voxel() {
        let points = vec![
            Point3d::new(0.1, 0.1, 0.1),
            Point3d::new(1.5, 0.1, 0.1),
            Point3d::new(0.9, 0.9, 0.9),
            Point3d::new(1.1, 0.2, 0.3),
            Point3d::new(-0.5, 0.0, 0.0),
        ];
        let downsampled = voxel_downsample(&points, 1.0);
        assert_eq!(
            downsampled,
            vec![
                Point3d::new(0.1, 0.1, 0.1),
                Point3d::new(1.5, 0.1, 0.1),
                Point3d::new(-0.5, 0.0, 0.0),
            ]
        );
        assert_eq!(downsampled, voxel_downsample(&points, 1.0));
    }

    #[test]
    fn neighborhood_is_a_3x3x3_block() {
        let neighbors = get_adjacent_voxels(&Voxel::new(0, 0, 0), 1);
        assert_eq!(neighbors.len(), 27);
        assert!(neighbors.contains(&Voxel::new(-1, 1, -1)));
        assert!(neighbors.contains(&Voxel::new(0, 0, 0)));
    }
}
