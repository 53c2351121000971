//! Photo panels circling the scene in EXPLODE and zooming in PHOTO.
//!
//! Five panels sit on a horizontal ring that follows the gold group's
//! rotation. The panel nearest the camera (largest z) is remembered as the
//! selection; PHOTO brings that one to the front and shrinks the rest.

use std::f32::consts::TAU;

use glam::Vec3;
use image::RgbaImage;

use crate::particles::{ease_toward, ease_vec_toward};
use crate::state::AppState;

pub const PANEL_COUNT: usize = 5;
/// Reference height of a panel at scale 1.
pub const PANEL_HEIGHT: f32 = 8.0;

const FOLLOW: f32 = 0.1;
const BOB: f32 = 3.0;
const FRONT_Z: f32 = 5.0;
const BACK_SCALE: f32 = 0.6;
const ZOOM_POSITION: Vec3 = Vec3::new(0.0, 0.0, 60.0);
const ZOOM_SCALE: f32 = 5.0;

/// How a panel looks: its aspect ratio and a flat colour standing in for the photo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelLook {
    pub aspect: f32,
    pub color: [f32; 3],
}

impl Default for PanelLook {
    fn default() -> Self {
        Self {
            aspect: 1.0,
            color: [0.85, 0.85, 0.85],
        }
    }
}

impl PanelLook {
    /// Aspect ratio and mean colour of a decoded photo.
    pub fn from_image(img: &RgbaImage) -> Self {
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 {
            return Self::default();
        }
        let mut sum = [0u64; 3];
        for px in img.pixels() {
            for (acc, c) in sum.iter_mut().zip(px.0) {
                *acc += u64::from(c);
            }
        }
        let n = u64::from(w) * u64::from(h) * 255;
        Self {
            aspect: w as f32 / h as f32,
            color: sum.map(|s| s as f32 / n as f32),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Panel {
    pub look: PanelLook,
    pub position: Vec3,
    pub scale: f32,
    pub visible: bool,
}

pub struct PhotoOrbit {
    panels: Vec<Panel>,
    radius: f32,
    selected: usize,
}

impl PhotoOrbit {
    /// Up to [`PANEL_COUNT`] looks are used; missing slots get the default look.
    pub fn new(radius: f32, looks: &[PanelLook]) -> Self {
        let panels = (0..PANEL_COUNT)
            .map(|i| Panel {
                look: looks.get(i).copied().unwrap_or_default(),
                position: Vec3::ZERO,
                scale: 0.0,
                visible: false,
            })
            .collect();
        Self {
            panels,
            radius,
            selected: 0,
        }
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Ring position of panel `i` for the given group rotation.
    pub fn ring_position(&self, i: usize, rotation: f32, time: f32) -> Vec3 {
        let angle = rotation + i as f32 * TAU / PANEL_COUNT as f32;
        Vec3::new(
            angle.sin() * self.radius,
            (time + i as f32).sin() * BOB,
            angle.cos() * self.radius,
        )
    }

    pub fn update(&mut self, state: AppState, rotation: f32, time: f32) {
        match state {
            AppState::Tree => {
                for p in &mut self.panels {
                    p.scale = ease_toward(p.scale, 0.0, FOLLOW);
                    p.visible = false;
                }
            }
            AppState::Heart => {
                for p in &mut self.panels {
                    p.visible = false;
                }
            }
            AppState::Explode => {
                let mut best = 0;
                let mut max_z = f32::NEG_INFINITY;
                for i in 0..self.panels.len() {
                    let target = self.ring_position(i, rotation, time);
                    // strict comparison keeps the first panel on ties
                    if target.z > max_z {
                        max_z = target.z;
                        best = i;
                    }
                    let scale = if target.z > FRONT_Z {
                        1.0 + (target.z / self.radius) * 0.8
                    } else {
                        BACK_SCALE
                    };
                    let p = &mut self.panels[i];
                    p.visible = true;
                    p.position = ease_vec_toward(p.position, target, FOLLOW);
                    p.scale = ease_toward(p.scale, scale, FOLLOW);
                }
                self.selected = best;
            }
            AppState::Photo => {
                let selected = self.selected;
                for (i, p) in self.panels.iter_mut().enumerate() {
                    if i == selected {
                        p.position = ease_vec_toward(p.position, ZOOM_POSITION, FOLLOW);
                        p.scale = ease_toward(p.scale, ZOOM_SCALE, FOLLOW);
                    } else {
                        p.scale = ease_toward(p.scale, 0.0, FOLLOW);
                    }
                }
            }
        }
    }
}
