//! Icons and backgrounds, stored as PNG files.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::{join_path, AssetError, AssetKind, Result};
use crate::zabbix::{ImageObject, IMAGE_TYPE_BACKGROUND, IMAGE_TYPE_ICON};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    Icon,
    Background,
}

impl ImageType {
    pub const ALL: [ImageType; 2] = [ImageType::Icon, ImageType::Background];

    /// Directory below the image prefix holding this type.
    pub fn dir_name(self) -> &'static str {
        match self {
            ImageType::Icon => "icons",
            ImageType::Background => "backgrounds",
        }
    }

    /// Directory below the image prefix holding generator sources.
    pub fn source_dir_name(self) -> &'static str {
        match self {
            ImageType::Icon => "source-icons",
            ImageType::Background => "source-backgrounds",
        }
    }

    pub fn api_code(self) -> &'static str {
        match self {
            ImageType::Icon => IMAGE_TYPE_ICON,
            ImageType::Background => IMAGE_TYPE_BACKGROUND,
        }
    }

    pub fn from_api_code(code: &str) -> Option<Self> {
        match code {
            IMAGE_TYPE_ICON => Some(ImageType::Icon),
            IMAGE_TYPE_BACKGROUND => Some(ImageType::Background),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub name: String,
    pub image_type: ImageType,
    /// Raw PNG bytes.
    pub data: Vec<u8>,
}

impl Image {
    pub fn from_zabbix(object: &ImageObject) -> Result<Self> {
        let invalid = |message: String| AssetError::Invalid {
            kind: AssetKind::Image,
            message: format!("'{}': {}", object.name, message),
        };

        let image_type = ImageType::from_api_code(&object.imagetype)
            .ok_or_else(|| invalid(format!("unknown imagetype '{}'", object.imagetype)))?;
        let encoded = object
            .image
            .as_deref()
            .ok_or_else(|| invalid("no image data".to_string()))?;
        let data = STANDARD
            .decode(encoded.trim())
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            name: object.name.clone(),
            image_type,
            data,
        })
    }

    /// Builds an image from a cache file at `<prefix>/<icons|backgrounds>/<name>.png`.
    pub fn open(path: &str, prefix: &str, data: Vec<u8>) -> Result<Self> {
        let (image_type, name) =
            Self::identify(path, prefix).ok_or_else(|| AssetError::UnexpectedPath {
                kind: AssetKind::Image,
                path: path.to_string(),
            })?;
        Ok(Self {
            name,
            image_type,
            data,
        })
    }

    /// Type and name encoded in a cache path, if it is an image path.
    pub fn identify(path: &str, prefix: &str) -> Option<(ImageType, String)> {
        let rest = if prefix.trim_matches('/').is_empty() {
            path
        } else {
            path.strip_prefix(prefix.trim_matches('/'))?.strip_prefix('/')?
        };
        let (dir, file) = rest.split_once('/')?;
        let image_type = ImageType::ALL.into_iter().find(|t| t.dir_name() == dir)?;
        let name = file.strip_suffix(".png")?;
        if name.is_empty() {
            return None;
        }
        Some((image_type, name.to_string()))
    }

    pub fn cache_path(&self, prefix: &str) -> String {
        let file = format!("{}.png", self.name);
        join_path(&[prefix, self.image_type.dir_name(), &file])
    }

    pub fn to_zabbix(&self, imageid: Option<String>) -> ImageObject {
        ImageObject {
            imageid,
            name: self.name.clone(),
            imagetype: self.image_type.api_code().to_string(),
            image: Some(STANDARD.encode(&self.data)),
        }
    }
}
