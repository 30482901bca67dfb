use adaptive_lidar_odometry::{
    icp_pipeline::OdometryPipeline, io, point3d, point3d::Point3d, Config, OdometryError, Scan,
};
use clap::Parser;
use glob::glob;
use nalgebra as na;
use std::collections::HashMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use unbag_rs::ros1::msg::{Msg, PointCloud2};
use unbag_rs::ros1::Ros1Bag;

pub fn get_colors_for_points(
    points: &[Point3d],
    min_val: f64,
    max_val: f64,
    alpha: u8,
) -> Vec<(u8, u8, u8, u8)> {
    let g = colorous::TURBO;
    points
        .iter()
        .map(|p| {
            let c = g.eval_continuous(((p.z - min_val) / (max_val - min_val)).clamp(0.0, 1.0));
            (c.r, c.g, c.b, alpha)
        })
        .collect()
}

fn na_to_rerun(transform: &na::Isometry3<f64>) -> rerun::Transform3D {
    rerun::Transform3D::from_translation_rotation(
        [
            transform.translation.x as f32,
            transform.translation.y as f32,
            transform.translation.z as f32,
        ],
        rerun::Quaternion::from_wxyz([
            transform.rotation.w as f32,
            transform.rotation.i as f32,
            transform.rotation.j as f32,
            transform.rotation.k as f32,
        ]),
    )
}

// sensor_msgs/PointField datatypes
const UINT32: u8 = 6;
const FLOAT32: u8 = 7;
const FLOAT64: u8 = 8;

/// Per-point time fields written by common LiDAR drivers.
const TIME_FIELDS: [&str; 3] = ["t", "time", "timestamp"];

fn read_u32(data: &[u8], idx: usize) -> Option<u32> {
    data.get(idx..idx + 4)?
        .try_into()
        .ok()
        .map(u32::from_le_bytes)
}

fn read_f32(data: &[u8], idx: usize) -> Option<f32> {
    data.get(idx..idx + 4)?
        .try_into()
        .ok()
        .map(f32::from_le_bytes)
}

fn read_f64(data: &[u8], idx: usize) -> Option<f64> {
    data.get(idx..idx + 8)?
        .try_into()
        .ok()
        .map(f64::from_le_bytes)
}

fn read_time(data: &[u8], idx: usize, datatype: u8) -> Option<f64> {
    match datatype {
        UINT32 => read_u32(data, idx).map(f64::from),
        FLOAT32 => read_f32(data, idx).map(f64::from),
        FLOAT64 => read_f64(data, idx),
        _ => None,
    }
}

fn pointcloud_to_scan(pcd: &PointCloud2) -> Option<Scan> {
    let name_to_offset: HashMap<&str, usize> = pcd
        .fields
        .iter()
        .map(|f| (f.name.as_str(), f.offset as usize))
        .collect();
    let (x, y, z) = (
        *name_to_offset.get("x")?,
        *name_to_offset.get("y")?,
        *name_to_offset.get("z")?,
    );
    let time_field = pcd
        .fields
        .iter()
        .find(|f| TIME_FIELDS.contains(&f.name.as_str()))
        .map(|f| (f.offset as usize, f.datatype));
    let point_step = pcd.point_step as usize;
    if point_step == 0 {
        return None;
    }

    let (points, times): (Vec<Point3d>, Vec<Option<f64>>) = (0..pcd.data.len() / point_step)
        .filter_map(|i| {
            let idx = i * point_step;
            let point = Point3d::new(
                read_f32(&pcd.data, idx + x)? as f64,
                read_f32(&pcd.data, idx + y)? as f64,
                read_f32(&pcd.data, idx + z)? as f64,
            );
            let time = time_field
                .and_then(|(offset, datatype)| read_time(&pcd.data, idx + offset, datatype));
            Some((point, time))
        })
        .unzip();
    let mut scan = Scan::new(points);
    if time_field.is_some() {
        if let Some(times) = times.into_iter().collect::<Option<Vec<f64>>>() {
            scan = scan.with_timestamps(point3d::normalize_timestamps(&times));
        }
    }
    let stamp = pcd.header.sec as f64 + (pcd.header.nsec as f64 / 1e9);
    Some(if stamp != 0.0 {
        scan.with_stamp(stamp)
    } else {
        scan
    })
}

/// PCD files named by their nanosecond timestamp carry it in the stem.
fn stamp_from_file_stem(path: &Path) -> Option<f64> {
    let timestamp_ns = path.file_stem()?.to_str()?.parse::<u64>().ok()?;
    Some(timestamp_ns as f64 / 1e9)
}

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct LidarOdometryCli {
    /// ROS1 bag file, or a directory of .pcd files
    path: String,

    /// json configuration, missing fields take default values
    #[arg(long)]
    config: Option<String>,

    /// number of scans to skip
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// number of scans to process, all by default
    #[arg(long)]
    n_scans: Option<usize>,

    #[arg(long)]
    topic: Option<String>,

    #[arg(long)]
    max_range: Option<f64>,

    /// motion-compensate scans carrying a `t`, `time` or `timestamp` field
    #[arg(long)]
    deskew: bool,

    /// stream the map and poses to a rerun viewer
    #[arg(long)]
    visualize: bool,

    /// write the trajectory in KITTI format
    #[arg(long)]
    output: Option<String>,

    /// write the trajectory in TUM format
    #[arg(long)]
    tum: Option<String>,

    /// write the effective configuration as json
    #[arg(long)]
    dump_config: Option<String>,
}

struct Runner {
    pipeline: OdometryPipeline,
    recording: Option<rerun::RecordingStream>,
    min_val: f64,
    max_val: f64,
    warned_untimed: bool,
}

impl Runner {
    fn process(&mut self, scan: &Scan) -> Result<(), Box<dyn Error>> {
        if self.pipeline.config().deskew && scan.timestamps.is_none() && !self.warned_untimed {
            log::warn!("deskew is enabled but scans carry no per-point times, skipping it");
            self.warned_untimed = true;
        }
        let result = match self.pipeline.process_scan(scan) {
            Ok(result) => result,
            Err(
                err @ (OdometryError::EmptyScan
                | OdometryError::TimestampMismatch { .. }
                | OdometryError::InvalidTimestamp(_)),
            ) => {
                log::warn!("skipping scan: {}", err);
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let t = result.pose.translation.vector;
        log::info!(
            "scan {} [{:.3}, {:.3}, {:.3}] {:?} threshold {:.3}",
            self.pipeline.trajectory().len() - 1,
            t.x,
            t.y,
            t.z,
            result.status,
            result.threshold
        );

        let Some(recording) = &self.recording else {
            return Ok(());
        };
        if let Some(stamp) = scan.stamp {
            recording.set_time_seconds("stable_time", stamp);
        }
        let points = point3d::transform_points(&result.pose, &self.pipeline.last_frame().fine);
        let colors = get_colors_for_points(&points, self.min_val, self.max_val, 255);
        recording.log(
            "world/frame",
            &rerun::Points3D::new(points.iter().map(|p| (p.x as f32, p.y as f32, p.z as f32)))
                .with_radii([0.05])
                .with_colors(colors),
        )?;
        recording.log(
            "world/lidar_pose",
            &na_to_rerun(&result.pose).with_axis_length(1.0),
        )?;
        Ok(())
    }
}

fn run(cli: LidarOdometryCli) -> Result<(), Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => io::json_to_config(path)?,
        None => Config::default(),
    };
    if let Some(max_range) = cli.max_range {
        config.max_range = max_range;
    }
    config.deskew |= cli.deskew;
    if let Some(path) = &cli.dump_config {
        io::write_config_json(path, &config)?;
    }

    let recording = if cli.visualize {
        Some(rerun::RecordingStreamBuilder::new("lidar odometry").spawn()?)
    } else {
        None
    };
    let mut runner = Runner {
        pipeline: OdometryPipeline::new(config)?,
        recording,
        min_val: -2.0,
        max_val: 10.0,
        warned_untimed: false,
    };
    let n_scans = cli.n_scans.unwrap_or(usize::MAX);

    let data_path = Path::new(&cli.path);
    if data_path.is_dir() {
        let pattern = data_path.join("*.pcd");
        let mut paths: Vec<PathBuf> = glob(&pattern.to_string_lossy())?
            .filter_map(|entry| entry.ok())
            .collect();
        paths.sort();
        for path in paths.into_iter().skip(cli.start).take(n_scans) {
            let mut scan = io::read_pcd_to_scan(&path)?;
            if let Some(stamp) = stamp_from_file_stem(&path) {
                scan = scan.with_stamp(stamp);
            }
            runner.process(&scan)?;
        }
    } else {
        let bag = Ros1Bag::new(&cli.path);
        let num_lidar_topics = bag
            .topic_to_type
            .values()
            .filter(|k| k.contains("sensor_msgs/PointCloud2"))
            .count();
        if num_lidar_topics > 1 && cli.topic.is_none() {
            log::error!(
                "More than one topic in the bag. Please use --topic to specify which lidar topic."
            );
            for (topic, msg_type) in &bag.topic_to_type {
                log::error!("{}: {}", topic, msg_type);
            }
            return Ok(());
        }
        let topics: Vec<String> = cli.topic.iter().cloned().collect();
        let scans = bag
            .read_messages(&topics)
            .filter_map(|msg| match msg {
                Msg::PointCloud2(pointcloud) => Some(pointcloud),
                _ => None,
            })
            .skip(cli.start)
            .take(n_scans);
        for pointcloud in scans {
            match pointcloud_to_scan(&pointcloud) {
                Some(scan) => runner.process(&scan)?,
                None => log::warn!("pointcloud without float x/y/z fields, skipped"),
            }
        }
    }

    let pipeline = &runner.pipeline;
    if let Some(path) = &cli.output {
        io::write_kitti_poses(path, pipeline.trajectory())?;
    }
    if let Some(path) = &cli.tum {
        io::write_tum_poses(path, pipeline.trajectory(), pipeline.stamps())?;
    }
    if let Some(recording) = &runner.recording {
        let map = pipeline.local_map().points();
        let colors = get_colors_for_points(&map, runner.min_val, runner.max_val, 255);
        recording.log(
            "world/local_map",
            &rerun::Points3D::new(map.iter().map(|p| (p.x as f32, p.y as f32, p.z as f32)))
                .with_radii([0.05])
                .with_colors(colors),
        )?;
    }
    log::info!("processed {} scans", pipeline.trajectory().len());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = LidarOdometryCli::parse();
    if let Err(err) = run(cli) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unbag_rs::ros1::msg::{Header, PointField};

    fn field(name: &str, offset: u32, datatype: u8) -> PointField {
        PointField {
            name: name.to_string(),
            offset,
            datatype,
            count: 1,
        }
    }

    fn cloud(fields: Vec<PointField>, point_step: u32, data: Vec<u8>) -> PointCloud2 {
        PointCloud2 {
            header: Header {
                sequence_id: 0,
                sec: 10,
                nsec: 500_000_000,
                frame_id: "lidar".to_string(),
            },
            height: 1,
            width: data.len() as u32 / point_step,
            fields,
            is_bigendian: 0,
            point_step,
            row_step: data.len() as u32,
            data,
            is_dense: 1,
        }
    }

    #[test]
    fn nanosecond_offsets_become_normalized_times() {
        let mut data = Vec::new();
        for (i, t_ns) in [0u32, 50_000_000, 100_000_000].iter().enumerate() {
            for v in [i as f32, 1.0, 2.0] {
                data.extend_from_slice(&v.to_le_bytes());
            }
            data.extend_from_slice(&t_ns.to_le_bytes());
        }
        let pcd = cloud(
            vec![
                field("x", 0, FLOAT32),
                field("y", 4, FLOAT32),
                field("z", 8, FLOAT32),
                field("t", 12, UINT32),
            ],
            16,
            data,
        );
        let scan = pointcloud_to_scan(&pcd).expect("xyz fields present");
        assert_eq!(scan.len(), 3);
        assert_eq!(scan.points[2], Point3d::new(2.0, 1.0, 2.0));
        assert_eq!(scan.timestamps, Some(vec![0.0, 0.5, 1.0]));
        assert_eq!(scan.stamp, Some(10.5));
        assert!(scan.validate().is_ok());
    }

    #[test]
    fn absolute_double_times_are_normalized() {
        let mut data = Vec::new();
        for t in [1.7e9, 1.7e9 + 0.1] {
            for v in [1.0f32, 0.0, 0.0] {
                data.extend_from_slice(&v.to_le_bytes());
            }
            data.extend_from_slice(&f64::to_le_bytes(t));
        }
        let pcd = cloud(
            vec![
                field("x", 0, FLOAT32),
                field("y", 4, FLOAT32),
                field("z", 8, FLOAT32),
                field("timestamp", 12, FLOAT64),
            ],
            20,
            data,
        );
        let scan = pointcloud_to_scan(&pcd).expect("xyz fields present");
        assert_eq!(scan.timestamps, Some(vec![0.0, 1.0]));
    }

    #[test]
    fn clouds_without_time_field_stay_untimed() {
        let data: Vec<u8> = [1.0f32, 2.0, 3.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let pcd = cloud(
            vec![
                field("x", 0, FLOAT32),
                field("y", 4, FLOAT32),
                field("z", 8, FLOAT32),
            ],
            12,
            data,
        );
        let scan = pointcloud_to_scan(&pcd).expect("xyz fields present");
        assert_eq!(scan.points, vec![Point3d::new(1.0, 2.0, 3.0)]);
        assert!(scan.timestamps.is_none());

        let no_xyz = cloud(vec![field("intensity", 0, FLOAT32)], 4, vec![0; 4]);
        assert!(pointcloud_to_scan(&no_xyz).is_none());
    }
}
