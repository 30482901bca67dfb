use crate::{
    adaptive_threshold::AdaptiveThreshold,
    config::Config,
    error::Result,
    local_map::LocalMap,
    point3d::Scan,
    preprocessing::{Frame, Preprocessor},
    registration::{Registration, RegistrationStatus},
};
use nalgebra as na;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No scan processed yet; the map is empty.
    Uninitialized,
    Running,
}

/// Outcome of one processed scan.
#[derive(Debug, Clone)]
pub struct FrameResult {
    pub pose: na::Isometry3<f64>,
    /// Correction ICP applied on top of the constant velocity prediction.
    pub correction: na::Isometry3<f64>,
    pub correction_magnitude: f64,
    /// Maximum correspondence distance used for this scan.
    pub threshold: f64,
    pub iterations: usize,
    pub num_correspondences: usize,
    pub status: RegistrationStatus,
}

/// Scan-to-map odometry for a single trajectory.
///
/// Scans must be fed in acquisition order. Every call leaves the pipeline in
/// a consistent state, so a caller may stop after any scan.
pub struct OdometryPipeline {
    config: Config,
    preprocessor: Preprocessor,
    registration: Registration,
    local_map: LocalMap,
    adaptive_threshold: AdaptiveThreshold,
    state: PipelineState,
    t_origin_current: na::Isometry3<f64>,
    t_prev_current: na::Isometry3<f64>,
    trajectory: Vec<na::Isometry3<f64>>,
    stamps: Vec<Option<f64>>,
    last_frame: Frame,
    thread_pool: Option<Arc<rayon::ThreadPool>>,
}

impl OdometryPipeline {
    pub fn new(config: Config) -> Result<OdometryPipeline> {
        config.validate()?;
        let thread_pool = if config.max_num_threads > 0 {
            Some(Arc::new(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.max_num_threads)
                    .build()?,
            ))
        } else {
            None
        };
        log::info!(
            "odometry pipeline voxel {} rough x{} max_range {} deskew {}",
            config.voxel_size,
            config.rough_scale_factor,
            config.max_range,
            config.deskew
        );
        Ok(OdometryPipeline {
            preprocessor: Preprocessor::from_config(&config),
            registration: Registration::from_config(&config),
            local_map: LocalMap::new(
                config.voxel_size,
                config.max_range,
                config.max_points_per_voxel,
            ),
            adaptive_threshold: AdaptiveThreshold::from_config(&config),
            state: PipelineState::Uninitialized,
            t_origin_current: config.initial_pose.unwrap_or_else(na::Isometry3::identity),
            t_prev_current: na::Isometry3::identity(),
            trajectory: Vec::new(),
            stamps: Vec::new(),
            last_frame: Frame::default(),
            thread_pool,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn trajectory(&self) -> &[na::Isometry3<f64>] {
        &self.trajectory
    }

    /// Absolute scan times, aligned with [`OdometryPipeline::trajectory`].
    pub fn stamps(&self) -> &[Option<f64>] {
        &self.stamps
    }

    pub fn last_pose(&self) -> Option<&na::Isometry3<f64>> {
        self.trajectory.last()
    }

    pub fn current_threshold(&self) -> f64 {
        self.adaptive_threshold.current_threshold()
    }

    pub fn local_map(&self) -> &LocalMap {
        &self.local_map
    }

    /// Deskewed and subsampled points of the most recent scan.
    pub fn last_frame(&self) -> &Frame {
        &self.last_frame
    }

    /// Runs one predict, deskew, subsample, register, update cycle.
    ///
    /// A rejected scan leaves the trajectory, map and threshold untouched.
    pub fn process_scan(&mut self, scan: &Scan) -> Result<FrameResult> {
        scan.validate()?;
        match self.thread_pool.clone() {
            Some(pool) => pool.install(|| self.register_scan(scan)),
            None => self.register_scan(scan),
        }
    }

    fn register_scan(&mut self, scan: &Scan) -> Result<FrameResult> {
        let frame = self.preprocessor.preprocess(scan, &self.t_prev_current)?;

        // constant velocity prediction
        let t_origin_next_init = self.t_origin_current * self.t_prev_current;
        let threshold = self.adaptive_threshold.current_threshold();

        let result = self.registration.align_points_to_map(
            &frame.rough,
            &self.local_map,
            &t_origin_next_init,
            threshold,
        );
        let t_origin_next = na::Isometry3::from_parts(
            result.pose.translation,
            na::UnitQuaternion::new_normalize(*result.pose.rotation.quaternion()),
        );

        // Update step: threshold, local map, delta, and the last pose
        let correction_magnitude = self.adaptive_threshold.model_error(&result.correction);
        self.adaptive_threshold.update(&result.correction);
        self.local_map.update(&frame.fine, &t_origin_next);
        self.t_prev_current = self.t_origin_current.inverse() * t_origin_next;
        self.t_origin_current = t_origin_next;
        self.trajectory.push(t_origin_next);
        self.stamps.push(scan.stamp);
        self.state = PipelineState::Running;

        log::debug!(
            "scan {} points {} fine {} rough {} status {:?} iterations {} threshold {:.3} map {}",
            self.trajectory.len() - 1,
            frame.deskewed.len(),
            frame.fine.len(),
            frame.rough.len(),
            result.status,
            result.iterations,
            threshold,
            self.local_map.len()
        );
        self.last_frame = frame;

        Ok(FrameResult {
            pose: t_origin_next,
            correction: result.correction,
            correction_magnitude,
            threshold,
            iterations: result.iterations,
            num_correspondences: result.num_correspondences,
            status: result.status,
        })
    }
}
