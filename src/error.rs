/// Errors surfaced by the odometry pipeline and its ingestion helpers.
#[derive(thiserror::Error, Debug)]
pub enum OdometryError {
    /// The scan holds no points, or none survive range cropping.
    #[error("Scan contains no usable points")]
    EmptyScan,

    /// Per-point timestamps do not line up with the points.
    #[error("Scan has {points} points but {timestamps} timestamps")]
    TimestampMismatch { points: usize, timestamps: usize },

    /// A per-point timestamp lies outside `[0, 1]` or is not a number.
    #[error("Invalid point timestamp {0}")]
    InvalidTimestamp(f64),

    /// Configuration rejected at pipeline construction.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The dedicated worker pool could not be created.
    #[error("Failed to build thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Filesystem error while reading scans or writing results.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Malformed JSON configuration.
    #[error("Failed to parse json")]
    Json(#[from] serde_json::Error),

    /// Malformed point cloud file.
    #[error("Failed to read pcd file: {0}")]
    Pcd(String),
}

pub type Result<T> = std::result::Result<T, OdometryError>;
