use std::fmt;
use std::str::FromStr;

/// Content store backend types
///
/// Selects where the worker downloads referenced objects from. Defined in core
/// because configuration parses it and the storage factory matches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Any S3-compatible object store (AWS S3, MinIO, ...)
    S3,
    /// A directory tree laid out as `{root}/{bucket}/{key}`
    Local,
}

impl StorageBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Local => "local",
        }
    }
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    /// `minio` is accepted as an alias for `s3`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "s3" | "minio" => Ok(Self::S3),
            "local" => Ok(Self::Local),
            other => anyhow::bail!("unknown STORAGE_BACKEND '{}', expected s3 or local", other),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
