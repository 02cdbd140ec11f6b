use serde_json::Value;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const ARTIFACT_PREFIX: &str = "extracted_";

/// Where extracted records end up.
pub trait ArtifactStore: Send + Sync {
    /// Persist `data` under `name`. Returns whether it was written.
    fn save(&self, name: &str, data: &Value) -> bool;
}

/// Artifact name for an extract target: spaces become underscores.
pub fn artifact_name(target: &str) -> String {
    let sanitized: String = target
        .trim()
        .chars()
        .map(|c| match c {
            ' ' => '_',
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c => c,
        })
        .collect();
    format!("{}{}", ARTIFACT_PREFIX, sanitized)
}

/// Pretty-printed JSON files, one per artifact, in a single directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    fn write(&self, name: &str, data: &Value) -> Result<PathBuf, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(name);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        serde_json::to_writer_pretty(file, data)?;
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<Option<Value>, Box<dyn std::error::Error>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(Some(serde_json::from_reader(reader)?))
    }
}

impl ArtifactStore for JsonFileStore {
    fn save(&self, name: &str, data: &Value) -> bool {
        match self.write(name, data) {
            Ok(path) => {
                info!("[Store] Saved {} to {}", name, path.display());
                true
            }
            Err(e) => {
                warn!("[Store] Failed to save {}: {}", name, e);
                false
            }
        }
    }
}
