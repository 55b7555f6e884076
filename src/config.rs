use std::path::PathBuf;

/// Runtime configuration. Everything has a sensible default so the tool
/// works out of the box; env vars override for non-standard setups.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub motions_path: PathBuf,
    pub profiles_dir: PathBuf,
    pub pdf_output_path: PathBuf,
    pub fetch_timeout_secs: u64,
    pub api_base: String,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = PathBuf::from(
            std::env::var("MOTIEWIJZER_DATA").unwrap_or_else(|_| "./data".to_string()),
        );
        Self {
            motions_path: data_dir.join("motions.csv"),
            profiles_dir: data_dir.join("profiles"),
            pdf_output_path: data_dir.join("output.pdf"),
            fetch_timeout_secs: std::env::var("FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            api_base: std::env::var("TKAPI_BASE").unwrap_or_else(|_| {
                "https://gegevensmagazijn.tweedekamer.nl/OData/v4/2.0".to_string()
            }),
            data_dir,
        }
    }

    /// Create the data and profile directories if they do not exist yet.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.profiles_dir)
    }
}
