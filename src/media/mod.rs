#![forbid(unsafe_code)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use sha2::{Digest as _, Sha256};

/// Bounds the capture pipeline promises for every stored image. The pixel
/// dimension bound is enforced by the capture device before upload; the
/// store re-checks the byte bound on every write.
#[derive(Debug, Clone, Copy)]
pub struct ImageLimits {
    pub max_bytes: u64,
    pub max_dimension: u32,
}

/// Image capture pipeline contract: raw photo bytes in, opaque stored
/// reference out. A failure is per-slot; the lifecycle engine never sees a
/// partially filled photo set.
pub trait ImagePipeline {
    fn compress_and_store(&self, raw: &[u8]) -> anyhow::Result<String>;
}

/// Content-addressed blob store under the data directory. References are
/// stable for identical content, so re-submitting the same photo is a
/// no-op write.
#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
    limits: ImageLimits,
}

impl MediaStore {
    #[must_use]
    pub fn new(dir: PathBuf, limits: ImageLimits) -> Self {
        Self { dir, limits }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn limits(&self) -> ImageLimits {
        self.limits
    }

    pub fn store_file(&self, path: &Path) -> anyhow::Result<String> {
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read image {}", path.display()))?;
        self.compress_and_store(&raw)
            .with_context(|| format!("failed to store image {}", path.display()))
    }

    #[must_use]
    pub fn blob_path(&self, reference: &str) -> PathBuf {
        self.dir.join(reference)
    }
}

impl ImagePipeline for MediaStore {
    fn compress_and_store(&self, raw: &[u8]) -> anyhow::Result<String> {
        if raw.is_empty() {
            anyhow::bail!("image is empty");
        }
        let len = raw.len() as u64;
        if len > self.limits.max_bytes {
            anyhow::bail!(
                "image is {len} bytes, exceeds the {} byte bound",
                self.limits.max_bytes
            );
        }

        let reference = content_reference(raw);
        let path = self.dir.join(&reference);
        if path.exists() {
            return Ok(reference);
        }

        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create media dir {}", self.dir.display()))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, raw).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to rename {} -> {}", tmp.display(), path.display()))?;
        Ok(reference)
    }
}

fn content_reference(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    let digest = hasher.finalize();
    let mut s = String::with_capacity(4 + 16);
    s.push_str("img-");
    for b in &digest[..8] {
        let _ = write!(&mut s, "{b:02x}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(max_bytes: u64) -> (tempfile::TempDir, MediaStore) {
        let td = tempfile::tempdir().expect("tempdir");
        let store = MediaStore::new(
            td.path().join("media"),
            ImageLimits {
                max_bytes,
                max_dimension: 1920,
            },
        );
        (td, store)
    }

    #[test]
    fn stores_and_dedupes_by_content() {
        let (_td, store) = store(1024);
        let a = store.compress_and_store(b"photo-bytes").unwrap();
        let b = store.compress_and_store(b"photo-bytes").unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("img-"));
        assert!(store.blob_path(&a).exists());

        let c = store.compress_and_store(b"other-bytes").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn rejects_empty_and_oversized_input() {
        let (_td, store) = store(8);
        assert!(store.compress_and_store(b"").is_err());
        assert!(store.compress_and_store(b"123456789").is_err());
        assert!(store.compress_and_store(b"12345678").is_ok());
    }
}
