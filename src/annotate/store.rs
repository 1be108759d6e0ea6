use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};

/// Fixed local directory for annotated images.
pub const DEFAULT_STATIC_DIR: &str = "static";

/// Stable address of one camera's annotated image.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AnnotationKey {
    pub location_id: String,
    pub camera_index: usize,
}

impl AnnotationKey {
    pub fn new(location_id: impl Into<String>, camera_index: usize) -> Self {
        Self {
            location_id: location_id.into(),
            camera_index,
        }
    }

    /// `<location_id>_<camera_index>.jpg`, with the id reduced to `[a-z0-9_-]`.
    pub fn image_ref(&self) -> Result<String> {
        let id = sanitize_location_id(&self.location_id)?;
        Ok(format!("{}_{}.jpg", id, self.camera_index))
    }
}

/// Persistence for annotated JPEGs, keyed per camera.
///
/// `save` overwrites whatever was stored for the key and returns the
/// reference readers use with `load`.
pub trait AnnotationStore: Send + Sync {
    fn save(&self, key: &AnnotationKey, jpeg: &[u8]) -> Result<String>;

    fn load(&self, image_ref: &str) -> Result<Option<Vec<u8>>>;
}

/// Annotated images as files under one directory.
pub struct FilesystemAnnotationStore {
    root: PathBuf,
}

impl FilesystemAnnotationStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("create annotation directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AnnotationStore for FilesystemAnnotationStore {
    fn save(&self, key: &AnnotationKey, jpeg: &[u8]) -> Result<String> {
        let image_ref = key.image_ref()?;
        write_atomic(&self.root.join(&image_ref), jpeg)?;
        Ok(image_ref)
    }

    fn load(&self, image_ref: &str) -> Result<Option<Vec<u8>>> {
        validate_image_ref(image_ref)?;
        let path = self.root.join(image_ref);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(anyhow!("failed to read {}: {}", path.display(), err)),
        }
    }
}

/// Annotated images kept in memory.
#[derive(Default)]
pub struct InMemoryAnnotationStore {
    images: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryAnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.images.lock().map(|images| images.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AnnotationStore for InMemoryAnnotationStore {
    fn save(&self, key: &AnnotationKey, jpeg: &[u8]) -> Result<String> {
        let image_ref = key.image_ref()?;
        self.images
            .lock()
            .map_err(|_| anyhow!("annotation store lock poisoned"))?
            .insert(image_ref.clone(), jpeg.to_vec());
        Ok(image_ref)
    }

    fn load(&self, image_ref: &str) -> Result<Option<Vec<u8>>> {
        validate_image_ref(image_ref)?;
        Ok(self
            .images
            .lock()
            .map_err(|_| anyhow!("annotation store lock poisoned"))?
            .get(image_ref)
            .cloned())
    }
}

fn sanitize_location_id(location_id: &str) -> Result<String> {
    let trimmed = location_id.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("location id cannot be empty"));
    }
    Ok(trimmed
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect())
}

fn validate_image_ref(image_ref: &str) -> Result<()> {
    let Some(stem) = image_ref.strip_suffix(".jpg") else {
        return Err(anyhow!("image reference must end in .jpg"));
    };
    if stem.is_empty()
        || !stem
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(anyhow!("image reference must be [a-z0-9_-].jpg"));
    }
    Ok(())
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    let written = write_and_sync(&tmp_path, data).and_then(|()| {
        fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))
    });
    if written.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    written
}

fn write_and_sync(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    file.write_all(data)
        .with_context(|| format!("write {}", path.display()))?;
    file.sync_all().with_context(|| format!("sync {}", path.display()))?;
    Ok(())
}
