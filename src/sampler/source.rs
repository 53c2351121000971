use std::fmt;
use std::path::{Path, PathBuf};

use base64::Engine;
use image::RgbaImage;
use serde::de::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::error::Error;

const DATA_URI_PREFIX: &str = "data:";

/// Where a gallery or panel image comes from: a bundled file or a
/// user-supplied image embedded as a `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    DataUri(String),
}

impl ImageSource {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with(DATA_URI_PREFIX) {
            Self::DataUri(trimmed.to_string())
        } else {
            Self::Path(PathBuf::from(trimmed))
        }
    }

    /// Path to retry once when the primary load fails.
    ///
    /// Only relative paths have an alternate; they are re-resolved against
    /// `asset_root`.
    pub fn alternate(&self, asset_root: Option<&Path>) -> Option<PathBuf> {
        let Self::Path(path) = self else {
            return None;
        };
        if path.is_absolute() || path.starts_with(".") {
            return None;
        }
        let alt = asset_root?.join(path);
        (alt != *path).then_some(alt)
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::DataUri(uri) => {
                let head: String = uri.chars().take(32).collect();
                write!(f, "{head}... ({} bytes)", uri.len())
            }
        }
    }
}

impl<'de> Deserialize<'de> for ImageSource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Decode a source to an RGBA8 pixel buffer.
pub fn decode_rgba8(source: &ImageSource) -> Result<RgbaImage, Error> {
    match source {
        ImageSource::Path(path) => decode_path(path),
        ImageSource::DataUri(uri) => decode_data_uri(uri),
    }
}

/// Decode a source, retrying once with its alternate path before giving up.
pub fn load_with_retry(source: &ImageSource, asset_root: Option<&Path>) -> Result<RgbaImage, Error> {
    match decode_rgba8(source) {
        Ok(img) => Ok(img),
        Err(err) => {
            let Some(alt) = source.alternate(asset_root) else {
                return Err(err);
            };
            warn!(source = %source, retry = %alt.display(), error = %err, "image load failed; retrying alternate path");
            decode_path(&alt)
        }
    }
}

fn decode_path(path: &Path) -> Result<RgbaImage, Error> {
    let name = path.display().to_string();
    let img = image::ImageReader::open(path)
        .map_err(|err| Error::image_load(&name, err))?
        .with_guessed_format()
        .map_err(|err| Error::image_load(&name, err))?
        .decode()
        .map_err(|err| Error::image_load(&name, err))?;
    debug!(path = %name, width = img.width(), height = img.height(), "decoded image");
    Ok(img.to_rgba8())
}

fn decode_data_uri(uri: &str) -> Result<RgbaImage, Error> {
    let body = uri
        .strip_prefix(DATA_URI_PREFIX)
        .ok_or_else(|| Error::InvalidDataUri("missing data: prefix".to_string()))?;
    let (meta, payload) = body
        .split_once(',')
        .ok_or_else(|| Error::InvalidDataUri("missing ',' separator".to_string()))?;
    if !meta.ends_with(";base64") {
        return Err(Error::InvalidDataUri(format!(
            "unsupported encoding '{meta}', expected base64"
        )));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|err| Error::InvalidDataUri(err.to_string()))?;
    let img = image::load_from_memory(&bytes).map_err(|err| Error::image_load(meta, err))?;
    Ok(img.to_rgba8())
}
