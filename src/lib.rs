pub mod adaptive_threshold;
pub mod config;
pub mod error;
pub mod icp_pipeline;
pub mod io;
pub mod lie_group;
pub mod local_map;
pub mod point3d;
pub mod preprocessing;
pub mod registration;
pub mod voxel_hash_map;
pub mod voxel_util;

pub use config::Config;
pub use error::{OdometryError, Result};
pub use icp_pipeline::{FrameResult, OdometryPipeline, PipelineState};
pub use point3d::{Point3d, Scan};
