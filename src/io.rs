use crate::{
    config,
    error::{OdometryError, Result},
    point3d::{Point3d, Scan},
};
use nalgebra as na;
use pcd_rs::PcdDeserialize;
use std::{
    fs,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

pub fn json_to_config<P: AsRef<Path>>(path: P) -> Result<config::Config> {
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

pub fn write_config_json<P: AsRef<Path>>(path: P, config: &config::Config) -> Result<()> {
    let j = serde_json::to_string_pretty(&config)?;
    let mut file = fs::File::create(path)?;
    file.write_all(j.as_bytes())?;
    Ok(())
}

#[derive(PcdDeserialize, Debug, Clone, Copy)]
pub struct PcdPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: f32,
}

/// Reads an `x y z intensity` PCD file into an untimed scan.
pub fn read_pcd_to_scan<P: AsRef<Path>>(pcd_path: P) -> Result<Scan> {
    let reader =
        pcd_rs::Reader::open(pcd_path).map_err(|e| OdometryError::Pcd(e.to_string()))?;
    let records: std::result::Result<Vec<PcdPoint>, _> = reader.collect();
    let points = records
        .map_err(|e| OdometryError::Pcd(e.to_string()))?
        .iter()
        .map(|p| Point3d::new(p.x as f64, p.y as f64, p.z as f64))
        .collect();
    Ok(Scan::new(points))
}

/// One `r00 r01 r02 tx r10 r11 r12 ty r20 r21 r22 tz` line per pose.
pub fn write_kitti_poses<P: AsRef<Path>>(path: P, poses: &[na::Isometry3<f64>]) -> Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    for pose in poses {
        let m = pose.to_homogeneous();
        let values: Vec<String> = (0..3)
            .flat_map(|r| (0..4).map(move |c| (r, c)))
            .map(|(r, c)| format!("{:.9e}", m[(r, c)]))
            .collect();
        writeln!(writer, "{}", values.join(" "))?;
    }
    writer.flush()?;
    Ok(())
}

/// One `stamp tx ty tz qx qy qz qw` line per pose. Scans without a stamp
/// fall back to their index.
pub fn write_tum_poses<P: AsRef<Path>>(
    path: P,
    poses: &[na::Isometry3<f64>],
    stamps: &[Option<f64>],
) -> Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    for (i, pose) in poses.iter().enumerate() {
        let stamp = stamps.get(i).copied().flatten().unwrap_or(i as f64);
        let t = pose.translation.vector;
        let q = pose.rotation;
        writeln!(
            writer,
            "{:.6} {} {} {} {} {} {} {}",
            stamp, t.x, t.y, t.z, q.i, q.j, q.k, q.w
        )?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_json() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        let config = config::Config {
            max_range: 42.0,
            deskew: true,
            initial_pose: Some(na::Isometry3::translation(1.0, 0.0, 0.0)),
            ..config::Config::default()
        };
        write_config_json(&path, &config)?;
        assert_eq!(json_to_config(&path)?, config);
        Ok(())
    }

    #[test]
    fn missing_config_is_an_io_error() {
        assert!(matches!(
            json_to_config("/nonexistent/config.json"),
            Err(OdometryError::Io(_))
        ));
    }

    #[test]
    fn kitti_lines_hold_the_top_three_rows() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("poses.txt");
        let poses = vec![
            na::Isometry3::identity(),
            na::Isometry3::translation(1.0, 2.0, 3.0),
        ];
        write_kitti_poses(&path, &poses)?;
        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let values: Vec<f64> = lines[1]
            .split_whitespace()
            .map(|v| v.parse::<f64>().expect("numeric field"))
            .collect();
        assert_eq!(values.len(), 12);
        assert_eq!(values[3], 1.0);
        assert_eq!(values[7], 2.0);
        assert_eq!(values[11], 3.0);
        assert_eq!(values[0], 1.0);
        Ok(())
    }

    #[test]
    fn tum_lines_fall_back_to_index() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("poses.tum");
        let poses = vec![na::Isometry3::identity(); 2];
        write_tum_poses(&path, &poses, &[Some(12.5), None])?;
        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[0].starts_with("12.500000 "));
        assert!(lines[1].starts_with("1.000000 "));
        assert!(lines[1].ends_with(" 1"));
        Ok(())
    }
}
