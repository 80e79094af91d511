use async_trait::async_trait;
use conflux_core::{
    bucket::Bucket,
    error::{ConfluxError, Result},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration for a file-based bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileBucketConfig {
    /// Root directory; each bucket keeps its `<key>.json` files in a
    /// subdirectory named after the bucket
    pub base_dir: PathBuf,

    /// Pretty-print stored documents (default: false)
    #[serde(default)]
    pub pretty: bool,
}

impl Default for FileBucketConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./data/buckets"),
            pretty: false,
        }
    }
}

impl FileBucketConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

/// Bucket storing JSON documents as files under `base_dir/<name>/`
pub struct FileBucket {
    name: String,
    dir: PathBuf,
    pretty: bool,
    // Serializes writers so a rename never races another write of the same key
    write_lock: Arc<Mutex<()>>,
}

impl FileBucket {
    /// Open or create the bucket's directory under `config.base_dir`
    pub fn open(name: impl Into<String>, config: FileBucketConfig) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfluxError::config("FileBucket requires a name"));
        }
        let dir = config.base_dir.join(encode_key(&name));
        std::fs::create_dir_all(&dir)?;
        tracing::debug!(bucket = %name, dir = %dir.display(), "Opened file bucket");
        Ok(Self {
            name,
            dir,
            pretty: config.pretty,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Directory holding this bucket's items
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys currently stored, in file name order
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let file_name = entry?.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(stem) = file_name.strip_suffix(".json") {
                keys.push(decode_key(stem)?);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn item_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

/// Run file IO on the blocking pool
async fn blocking<T, F>(op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| ConfluxError::operation(format!("File bucket task failed: {}", e)))?
}

#[async_trait]
impl Bucket for FileBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_item(&self, key: &str) -> Result<Option<Value>> {
        let path = self.item_path(key);
        let data = blocking(move || match std::fs::read_to_string(path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        })
        .await?;
        let Some(data) = data else {
            return Ok(None);
        };
        let value = serde_json::from_str(&data).map_err(|e| {
            ConfluxError::Serialization(format!(
                "Failed to parse item '{}' in bucket '{}': {}",
                key, self.name, e
            ))
        })?;
        Ok(Some(value))
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<()> {
        let data = if self.pretty {
            serde_json::to_string_pretty(&value)?
        } else {
            serde_json::to_string(&value)?
        };

        let path = self.item_path(key);
        let tmp_path = path.with_extension("json.tmp");
        let write_lock = Arc::clone(&self.write_lock);
        blocking(move || {
            let _guard = write_lock.lock();
            std::fs::write(&tmp_path, data)?;
            std::fs::rename(&tmp_path, &path)?;
            Ok(())
        })
        .await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.item_path(key);
        let write_lock = Arc::clone(&self.write_lock);
        blocking(move || {
            let _guard = write_lock.lock();
            match std::fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }
}

/// Escape a key into a file name: `[A-Za-z0-9_-]` pass through, every other
/// byte becomes `%XX`.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

fn decode_key(encoded: &str) -> Result<String> {
    let bytes = encoded.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded
                .get(i + 1..i + 3)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| {
                    ConfluxError::Serialization(format!("Invalid bucket file name '{}'", encoded))
                })?;
            decoded.push(hex);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).map_err(|e| ConfluxError::Serialization(e.to_string()))
}
