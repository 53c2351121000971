use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, ensure};
use palette::Srgb;
use serde::Deserialize;

use crate::particles::GroupKind;
use crate::sampler::ImageSource;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Cone dimensions for the TREE layout.
    pub tree: TreeOptions,
    /// Radius of the EXPLODE sphere.
    pub explode_radius: f32,
    /// Radius of the photo panel orbit in EXPLODE.
    pub photo_orbit_radius: f32,
    /// Static particle groups (gold / red / gift).
    pub groups: GroupsConfig,
    /// Per-frame smoothing factors and spins.
    pub motion: MotionOptions,
    /// Gallery pool, image sampling and reveal timing.
    pub gallery: GalleryOptions,
    /// Landmark distance thresholds for the gesture classifier.
    pub gesture: GestureThresholds,
    /// Images shown on the orbiting photo panels.
    pub photos: Vec<PathBuf>,
    /// Directory watched for user-supplied gallery images.
    pub uploads: Option<PathBuf>,
    /// Perspective camera used by the viewer.
    pub camera: CameraOptions,
    /// Optional deterministic seed for all particle layouts.
    pub seed: Option<u64>,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(self.tree.height > 0.0, "tree.height must be positive");
        ensure!(
            self.tree.base_radius >= 0.0,
            "tree.base-radius must not be negative"
        );
        ensure!(self.explode_radius > 0.0, "explode-radius must be positive");
        ensure!(
            self.photo_orbit_radius > 0.0,
            "photo-orbit-radius must be positive"
        );
        for spec in self.groups.specs().context("invalid groups configuration")? {
            ensure!(spec.count > 0, "groups.{}.count must be greater than zero", spec.kind);
            ensure!(spec.size > 0.0, "groups.{}.size must be positive", spec.kind);
        }
        self.motion.validate()?;
        self.gallery.validate()?;
        self.gesture.validate()?;
        self.camera.validate()?;
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            tree: TreeOptions::default(),
            explode_radius: 65.0,
            photo_orbit_radius: 25.0,
            groups: GroupsConfig::default(),
            motion: MotionOptions::default(),
            gallery: GalleryOptions::default(),
            gesture: GestureThresholds::default(),
            photos: Vec::new(),
            uploads: None,
            camera: CameraOptions::default(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TreeOptions {
    pub height: f32,
    pub base_radius: f32,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            height: 70.0,
            base_radius: 35.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    Additive,
    Normal,
}

/// Raw per-group overrides; unset fields fall back to the group's own defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GroupOptions {
    pub count: Option<usize>,
    pub size: Option<f32>,
    pub color: Option<String>,
    pub blend: Option<BlendMode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GroupsConfig {
    pub gold: GroupOptions,
    pub red: GroupOptions,
    pub gift: GroupOptions,
}

/// Fully resolved settings for one static particle group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupSpec {
    pub kind: GroupKind,
    pub count: usize,
    pub size: f32,
    pub color: [f32; 3],
    pub blend: BlendMode,
}

impl GroupsConfig {
    /// Resolve the three groups in draw order: gold, red, gift.
    pub fn specs(&self) -> Result<[GroupSpec; 3]> {
        Ok([
            resolve_group(GroupKind::Gold, &self.gold)?,
            resolve_group(GroupKind::Red, &self.red)?,
            resolve_group(GroupKind::Gift, &self.gift)?,
        ])
    }
}

fn resolve_group(kind: GroupKind, raw: &GroupOptions) -> Result<GroupSpec> {
    let (count, size, color, blend) = match kind {
        GroupKind::Gold => (2000, 2.0, "#FFD700", BlendMode::Additive),
        GroupKind::Red => (300, 3.5, "#FF0000", BlendMode::Additive),
        GroupKind::Gift => (150, 3.0, "#FFFFFF", BlendMode::Normal),
    };
    let color_src = raw.color.as_deref().unwrap_or(color);
    let color = parse_hex_color(color_src)
        .ok_or_else(|| anyhow!("groups.{kind}.color '{color_src}' is not a hex colour"))?;
    Ok(GroupSpec {
        kind,
        count: raw.count.unwrap_or(count),
        size: raw.size.unwrap_or(size),
        color,
        blend: raw.blend.unwrap_or(blend),
    })
}

/// Parse `#RRGGBB` / `RRGGBB` into normalised sRGB components.
pub fn parse_hex_color(input: &str) -> Option<[f32; 3]> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let rgb = Srgb::<u8>::from_str(trimmed).ok()?;
    let rgb: Srgb<f32> = rgb.into_format();
    Some([rgb.red, rgb.green, rgb.blue])
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MotionOptions {
    /// Exponential smoothing factor per frame for gold/red/gift.
    pub static_speed: f32,
    /// Exponential smoothing factor per frame for the gallery pool.
    pub gallery_speed: f32,
    /// Radians per frame the groups spin while in TREE.
    pub tree_spin: f32,
    /// Smoothing factor for the hand-follow rotation in EXPLODE/PHOTO.
    pub hand_follow: f32,
}

impl MotionOptions {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("motion.static-speed", self.static_speed),
            ("motion.gallery-speed", self.gallery_speed),
            ("motion.hand-follow", self.hand_follow),
        ] {
            ensure!(
                value > 0.0 && value <= 1.0,
                "{name} must be within (0, 1], got {value}"
            );
        }
        Ok(())
    }
}

impl Default for MotionOptions {
    fn default() -> Self {
        Self {
            static_speed: 0.08,
            gallery_speed: 0.09,
            tree_spin: 0.003,
            hand_follow: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GalleryOptions {
    /// Total number of particles shared by all gallery images.
    pub count: usize,
    /// Base point size of a revealed gallery particle.
    pub size: f32,
    /// Random depth jitter applied to silhouette points.
    pub z_jitter: f32,
    /// Interval between two reveal steps.
    #[serde(with = "humantime_serde")]
    pub reveal_step: Duration,
    /// Delay between the last reveal step and the message becoming visible.
    #[serde(with = "humantime_serde")]
    pub message_delay: Duration,
    /// Pixels whose alpha is above this value belong to the silhouette.
    pub alpha_threshold: u8,
    /// Scan stride in pixels (1 = every pixel).
    pub pixel_step: u32,
    /// Padding kept around the cropped silhouette bounds.
    pub pad: u32,
    /// Horizontal distance between neighbouring image centres.
    pub spacing: f32,
    /// Pixel to world scale.
    pub scale: f32,
    /// World Y of every image centre.
    pub y: f32,
    /// Radius of the scatter cloud for unrevealed particles.
    pub scatter_spread: f32,
    /// Ordered gallery images: file paths or `data:` URIs.
    pub images: Vec<ImageSource>,
    /// Base directory used to retry relative image paths that fail to load.
    pub asset_root: Option<PathBuf>,
    /// Text revealed once every image has been shown.
    pub message: String,
}

impl GalleryOptions {
    fn validate(&self) -> Result<()> {
        ensure!(self.count > 0, "gallery.count must be greater than zero");
        ensure!(self.size > 0.0, "gallery.size must be positive");
        ensure!(self.z_jitter >= 0.0, "gallery.z-jitter must not be negative");
        ensure!(
            self.reveal_step > Duration::ZERO,
            "gallery.reveal-step must be greater than zero"
        );
        ensure!(self.pixel_step > 0, "gallery.pixel-step must be at least 1");
        ensure!(self.scale > 0.0, "gallery.scale must be positive");
        ensure!(
            self.scatter_spread > 0.0,
            "gallery.scatter-spread must be positive"
        );
        ensure!(
            !self.images.is_empty(),
            "gallery.images must list at least one image"
        );
        ensure!(
            self.count >= self.images.len(),
            "gallery.count ({}) must be at least the number of images ({})",
            self.count,
            self.images.len()
        );
        Ok(())
    }
}

impl Default for GalleryOptions {
    fn default() -> Self {
        Self {
            count: 128_000,
            size: 2.0,
            z_jitter: 0.0,
            reveal_step: Duration::from_millis(500),
            message_delay: Duration::from_millis(350),
            alpha_threshold: 8,
            pixel_step: 1,
            pad: 6,
            spacing: 20.0,
            scale: 0.15,
            y: 0.0,
            scatter_spread: 140.0,
            images: vec![ImageSource::Path(PathBuf::from("13.png"))],
            asset_root: None,
            message: "FOR AMBER".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GestureThresholds {
    /// Both index tips and both thumb tips closer than this select HEART.
    pub heart_distance: f32,
    /// Average fingertip-to-wrist distance below this is a fist (TREE).
    pub fist_distance: f32,
    /// Thumb-to-index distance below this is a pinch (PHOTO).
    pub pinch_distance: f32,
}

impl GestureThresholds {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.heart_distance > 0.0,
            "gesture.heart-distance must be positive"
        );
        ensure!(
            self.fist_distance > 0.0,
            "gesture.fist-distance must be positive"
        );
        ensure!(
            self.pinch_distance > 0.0,
            "gesture.pinch-distance must be positive"
        );
        Ok(())
    }
}

impl Default for GestureThresholds {
    fn default() -> Self {
        Self {
            heart_distance: 0.15,
            fist_distance: 0.25,
            pinch_distance: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CameraOptions {
    pub fov_degrees: f32,
    pub distance: f32,
    pub near: f32,
    pub far: f32,
}

impl CameraOptions {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.fov_degrees > 0.0 && self.fov_degrees < 180.0,
            "camera.fov-degrees must be within (0, 180)"
        );
        ensure!(
            self.near > 0.0 && self.far > self.near,
            "camera.near must be positive and smaller than camera.far"
        );
        Ok(())
    }
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            fov_degrees: 60.0,
            distance: 110.0,
            near: 0.1,
            far: 1400.0,
        }
    }
}
