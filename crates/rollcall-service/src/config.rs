use rollcall_core::DEFAULT_MATCH_THRESHOLD;
use std::path::PathBuf;

/// Service configuration, loaded once from environment variables and passed
/// into constructors — no process-wide mutable state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Euclidean distance threshold for a positive match.
    pub match_threshold: f32,
    /// Default session length in hours.
    pub session_duration_hours: i64,
    /// Default minutes after session start during which a check-in counts
    /// as present rather than late.
    pub grace_minutes: i64,
    /// Webcam snapshot timeout in seconds.
    pub capture_timeout_secs: u64,
    /// Accept check-ins for students with no stored embedding, recorded
    /// without a face-match score. An explicit escape hatch, off by default.
    pub allow_unenrolled_checkin: bool,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        Self {
            model_dir,
            db_path,
            match_threshold: env_f32("ROLLCALL_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD),
            session_duration_hours: env_i64("ROLLCALL_SESSION_HOURS", 2),
            grace_minutes: env_i64("ROLLCALL_GRACE_MINUTES", 30),
            capture_timeout_secs: env_u64("ROLLCALL_CAPTURE_TIMEOUT_SECS", 10),
            allow_unenrolled_checkin: std::env::var("ROLLCALL_ALLOW_UNENROLLED")
                .map(|v| v == "1")
                .unwrap_or(false),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir.join("det_500m.onnx").to_string_lossy().into_owned()
    }

    /// Path to the face encoder model.
    pub fn encoder_model_path(&self) -> String {
        self.model_dir.join("encoder_128.onnx").to_string_lossy().into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
