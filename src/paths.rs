use color_eyre::eyre::bail;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Paths {
    data_dir: PathBuf,
}

impl Paths {
    pub fn new() -> color_eyre::Result<Self> {
        if let Ok(path) = std::env::var("PMDASH_DATA_DIR") {
            return Ok(Self {
                data_dir: PathBuf::from(path),
            });
        }
        let Some(base) = dirs::data_dir() else {
            bail!("could not determine data directory");
        };
        Ok(Self {
            data_dir: base.join("pmdash"),
        })
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { data_dir: base }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("pmdash.toml")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir().join("pmdash.log")
    }
}

/// Socket of a pm3 supervisor running under the current user, which is where
/// the dashboard looks unless told otherwise.
pub fn default_socket() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("PM3_DATA_DIR") {
        return Some(PathBuf::from(dir).join("pm3.sock"));
    }
    dirs::data_dir().map(|base| base.join("pm3").join("pm3.sock"))
}
