//! Image to point-cloud sampling.
//!
//! An image is reduced to the bounding box of its non-transparent pixels,
//! then particles are drawn (with replacement) from the opaque pixels inside
//! that box and mapped to world coordinates around a centre point.

mod source;

pub use source::{ImageSource, decode_rgba8, load_with_retry};

use glam::{Vec2, Vec3};
use image::RgbaImage;
use rand::Rng;

use crate::config::GalleryOptions;

/// Below this many opaque pixels the silhouette is considered too sparse and
/// sampling falls back to the full cropped rectangle.
pub const MIN_SILHOUETTE_PIXELS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilhouetteOptions {
    pub alpha_threshold: u8,
    pub pad: u32,
    pub stride: u32,
    /// Pixel to world scale.
    pub scale: f32,
    pub z_jitter: f32,
}

impl From<&GalleryOptions> for SilhouetteOptions {
    fn from(opts: &GalleryOptions) -> Self {
        Self {
            alpha_threshold: opts.alpha_threshold,
            pad: opts.pad,
            stride: opts.pixel_step.max(1),
            scale: opts.scale,
            z_jitter: opts.z_jitter,
        }
    }
}

impl Default for SilhouetteOptions {
    fn default() -> Self {
        Self::from(&GalleryOptions::default())
    }
}

/// Pixel rectangle inside a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct AlphaCrop {
    /// Crop rectangle in source pixel coordinates.
    pub bounds: Bounds,
    /// The cropped pixels.
    pub image: RgbaImage,
    /// False when no pixel passed the alpha threshold and the crop is the full image.
    pub found: bool,
}

/// Crop `img` to the padded bounding box of every pixel whose alpha exceeds
/// `alpha_threshold`. Without any such pixel the full image is kept.
pub fn crop_alpha_bounds(img: &RgbaImage, alpha_threshold: u8, pad: u32, stride: u32) -> AlphaCrop {
    let (width, height) = img.dimensions();
    let stride = stride.max(1) as usize;

    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut found = false;

    for y in (0..height).step_by(stride) {
        for x in (0..width).step_by(stride) {
            if img.get_pixel(x, y).0[3] > alpha_threshold {
                found = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }

    if !found {
        return AlphaCrop {
            bounds: Bounds {
                x: 0,
                y: 0,
                width,
                height,
            },
            image: img.clone(),
            found: false,
        };
    }

    let min_x = min_x.saturating_sub(pad);
    let min_y = min_y.saturating_sub(pad);
    let max_x = max_x.saturating_add(pad).min(width - 1);
    let max_y = max_y.saturating_add(pad).min(height - 1);
    let bounds = Bounds {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    };
    let image =
        image::imageops::crop_imm(img, bounds.x, bounds.y, bounds.width, bounds.height).to_image();

    AlphaCrop {
        bounds,
        image,
        found: true,
    }
}

/// Coordinates of every (strided) pixel whose alpha exceeds the threshold.
pub fn opaque_pixels(img: &RgbaImage, alpha_threshold: u8, stride: u32) -> Vec<(u32, u32)> {
    let (width, height) = img.dimensions();
    let stride = stride.max(1) as usize;
    let mut out = Vec::new();
    for y in (0..height).step_by(stride) {
        for x in (0..width).step_by(stride) {
            if img.get_pixel(x, y).0[3] > alpha_threshold {
                out.push((x, y));
            }
        }
    }
    out
}

/// World-space point targets and colours sampled from one image.
#[derive(Debug, Clone)]
pub struct Silhouette {
    pub points: Vec<Vec3>,
    pub colors: Vec<[f32; 3]>,
    pub crop: Bounds,
    /// True when the opaque set was too sparse and the rectangle was sampled instead.
    pub fallback: bool,
}

impl Silhouette {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Produce exactly `count` points matching the silhouette of `img`, centred on `center`.
pub fn compute_silhouette<R: Rng + ?Sized>(
    img: &RgbaImage,
    count: usize,
    center: Vec2,
    opts: &SilhouetteOptions,
    rng: &mut R,
) -> Silhouette {
    let crop = crop_alpha_bounds(img, opts.alpha_threshold, opts.pad, opts.stride);
    let opaque = opaque_pixels(&crop.image, opts.alpha_threshold, opts.stride);
    let fallback = opaque.len() < MIN_SILHOUETTE_PIXELS;

    let (width, height) = crop.image.dimensions();
    let half_w = width as f32 / 2.0;
    let half_h = height as f32 / 2.0;

    let mut points = Vec::with_capacity(count);
    let mut colors = Vec::with_capacity(count);

    for _ in 0..count {
        let (px, py) = if !fallback {
            let (x, y) = opaque[rng.random_range(0..opaque.len())];
            (x as f32, y as f32)
        } else {
            (
                rng.random::<f32>() * width as f32,
                rng.random::<f32>() * height as f32,
            )
        };

        let z = if opts.z_jitter > 0.0 {
            (rng.random::<f32>() - 0.5) * opts.z_jitter
        } else {
            0.0
        };
        points.push(Vec3::new(
            (px - half_w) * opts.scale + center.x,
            (half_h - py) * opts.scale + center.y,
            z,
        ));
        colors.push(sample_rgb(&crop.image, px, py));
    }

    Silhouette {
        points,
        colors,
        crop: crop.bounds,
        fallback,
    }
}

fn sample_rgb(img: &RgbaImage, px: f32, py: f32) -> [f32; 3] {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return [0.0; 3];
    }
    let x = (px.floor().max(0.0) as u32).min(width - 1);
    let y = (py.floor().max(0.0) as u32).min(height - 1);
    let [r, g, b, _] = img.get_pixel(x, y).0;
    [
        f32::from(r) / 255.0,
        f32::from(g) / 255.0,
        f32::from(b) / 255.0,
    ]
}
