//! Image byte sources

use async_trait::async_trait;
use paperlink_common::errors::{AppError, Result};
use paperlink_common::models::ImageAsset;
use std::collections::HashMap;
use std::path::PathBuf;

/// Supplies the raw bytes of an extracted image
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn load(&self, image: &ImageAsset) -> Result<Vec<u8>>;
}

/// Reads `file_path` relative to a base directory
#[derive(Debug, Clone)]
pub struct FsImageSource {
    root: PathBuf,
}

impl FsImageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ImageSource for FsImageSource {
    async fn load(&self, image: &ImageAsset) -> Result<Vec<u8>> {
        let Some(relative) = image.file_path.as_deref() else {
            return Err(AppError::NotFound {
                resource_type: "image".to_string(),
                id: image.id.clone(),
            });
        };

        let path = self.root.join(relative);
        tokio::fs::read(&path).await.map_err(|e| AppError::Storage {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

/// Image bytes keyed by image id
#[derive(Debug, Clone, Default)]
pub struct InMemoryImageSource {
    images: HashMap<String, Vec<u8>>,
}

impl InMemoryImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.images.insert(id.into(), bytes.into());
        self
    }
}

#[async_trait]
impl ImageSource for InMemoryImageSource {
    async fn load(&self, image: &ImageAsset) -> Result<Vec<u8>> {
        self.images
            .get(&image.id)
            .cloned()
            .ok_or_else(|| AppError::NotFound {
                resource_type: "image".to_string(),
                id: image.id.clone(),
            })
    }
}
