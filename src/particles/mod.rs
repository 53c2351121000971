//! Static particle groups (gold / red / gift).
//!
//! Each group owns parallel per-particle arrays: current position, size,
//! colour, phase and one fixed target per layout. Targets are generated once
//! at construction; only positions move afterwards.

pub mod layout;

use std::f32::consts::TAU;
use std::fmt;

use glam::Vec3;
use rand::Rng;

use crate::config::{BlendMode, GroupSpec, MotionOptions, TreeOptions};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    Gold,
    Red,
    Gift,
}

impl GroupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gold => "gold",
            Self::Red => "red",
            Self::Gift => "gift",
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named per-particle target set of a static group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Tree,
    Explode,
    Heart,
}

impl Layout {
    /// PHOTO shares the explode layout; the photo panels carry that state.
    pub fn for_state(state: AppState) -> Self {
        match state {
            AppState::Tree => Self::Tree,
            AppState::Explode | AppState::Photo => Self::Explode,
            AppState::Heart => Self::Heart,
        }
    }
}

/// Shape parameters shared by every group.
#[derive(Debug, Clone, Copy)]
pub struct LayoutParams {
    pub tree: TreeOptions,
    pub explode_radius: f32,
}

/// Exponential smoothing step: move `speed` of the remaining distance.
#[inline]
pub fn ease_toward(current: f32, target: f32, speed: f32) -> f32 {
    current + (target - current) * speed
}

#[inline]
pub fn ease_vec_toward(current: Vec3, target: Vec3, speed: f32) -> Vec3 {
    current + (target - current) * speed
}

/// Cosmetic inputs for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput {
    pub state: AppState,
    /// Seconds since start.
    pub time: f32,
    /// Rotation the groups follow in EXPLODE/PHOTO, derived from hand X.
    pub hand_rotation: f32,
}

pub struct ParticleGroup {
    spec: GroupSpec,
    positions: Vec<Vec3>,
    sizes: Vec<f32>,
    colors: Vec<[f32; 3]>,
    phases: Vec<f32>,
    tree: Vec<Vec3>,
    explode: Vec<Vec3>,
    heart: Vec<Vec3>,
    rotation_y: f32,
    scale: f32,
    visible: bool,
}

impl ParticleGroup {
    pub fn new<R: Rng + ?Sized>(spec: GroupSpec, params: &LayoutParams, rng: &mut R) -> Self {
        let count = spec.count;
        let mut tree = Vec::with_capacity(count);
        let mut explode = Vec::with_capacity(count);
        let mut heart = Vec::with_capacity(count);
        let mut phases = Vec::with_capacity(count);

        for _ in 0..count {
            tree.push(layout::tree_target(spec.kind, &params.tree, rng));
            explode.push(layout::explode_target(spec.kind, params.explode_radius, rng));
            heart.push(layout::heart_target(rng));
            phases.push(rng.random::<f32>() * TAU);
        }

        Self {
            positions: tree.clone(),
            sizes: vec![spec.size; count],
            colors: vec![spec.color; count],
            phases,
            tree,
            explode,
            heart,
            rotation_y: 0.0,
            scale: 1.0,
            visible: true,
            spec,
        }
    }

    pub fn blend(&self) -> BlendMode {
        self.spec.blend
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn sizes(&self) -> &[f32] {
        &self.sizes
    }

    pub fn colors(&self) -> &[[f32; 3]] {
        &self.colors
    }

    pub fn phases(&self) -> &[f32] {
        &self.phases
    }

    pub fn targets(&self, layout: Layout) -> &[Vec3] {
        match layout {
            Layout::Tree => &self.tree,
            Layout::Explode => &self.explode,
            Layout::Heart => &self.heart,
        }
    }

    pub fn rotation_y(&self) -> f32 {
        self.rotation_y
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Ease positions toward the layout of `input.state` and refresh sizes,
    /// colours and the group transform.
    ///
    /// Groups are hidden in HEART and hold their positions, rotation and
    /// scale until another state is entered.
    pub fn update(&mut self, input: &FrameInput, motion: &MotionOptions) {
        let layout = Layout::for_state(input.state);
        let targets = match layout {
            Layout::Tree => &self.tree,
            Layout::Explode => &self.explode,
            Layout::Heart => return,
        };
        for (pos, target) in self.positions.iter_mut().zip(targets) {
            *pos = ease_vec_toward(*pos, *target, motion.static_speed);
        }

        let base = self.spec.color;
        let kind = self.spec.kind;
        let t = input.time;

        self.scale = 1.0;
        if layout == Layout::Tree {
            self.rotation_y += motion.tree_spin;
        } else {
            self.rotation_y = ease_toward(self.rotation_y, input.hand_rotation, motion.hand_follow);
        }
        self.sizes.fill(self.spec.size);
        for (color, phase) in self.colors.iter_mut().zip(&self.phases) {
            let brightness = match (layout, kind) {
                (_, GroupKind::Gift) => 1.0,
                (Layout::Tree, GroupKind::Red) => 0.5 + 0.5 * (t * 3.0 + phase).sin(),
                (Layout::Tree, _) => 0.8 + 0.4 * (t * 10.0 + phase).sin(),
                _ => 0.8 + 0.5 * (t * 12.0 + phase).sin(),
            };
            *color = scaled(base, brightness);
        }
    }
}

fn scaled(color: [f32; 3], brightness: f32) -> [f32; 3] {
    [
        color[0] * brightness,
        color[1] * brightness,
        color[2] * brightness,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupsConfig;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn params() -> LayoutParams {
        LayoutParams {
            tree: TreeOptions::default(),
            explode_radius: 65.0,
        }
    }

    fn gold(count: usize) -> ParticleGroup {
        let mut spec = GroupsConfig::default().specs().unwrap()[0];
        spec.count = count;
        let mut rng = StdRng::seed_from_u64(21);
        ParticleGroup::new(spec, &params(), &mut rng)
    }

    #[test]
    fn smoothing_step_moves_a_tenth() {
        assert!((ease_toward(0.0, 10.0, 0.1) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn smoothing_converges_without_overshoot() {
        for speed in [0.01, 0.08, 0.5, 1.0] {
            let mut x = 0.0f32;
            let mut prev = x;
            for _ in 0..500 {
                x = ease_toward(x, 10.0, speed);
                assert!(x >= prev, "speed {speed}: not monotonic");
                assert!(x <= 10.0, "speed {speed}: overshoot to {x}");
                prev = x;
            }
            assert!((10.0 - x).abs() < 0.1, "speed {speed}: stalled at {x}");
        }
    }

    #[test]
    fn starts_on_tree_targets() {
        let group = gold(64);
        assert_eq!(group.positions(), group.targets(Layout::Tree));
        assert_eq!(group.len(), 64);
        assert!(group.phases().iter().all(|p| (0.0..TAU).contains(p)));
    }

    #[test]
    fn photo_shares_explode_layout() {
        assert_eq!(Layout::for_state(AppState::Photo), Layout::Explode);
        assert_eq!(Layout::for_state(AppState::Explode), Layout::Explode);
        assert_eq!(Layout::for_state(AppState::Tree), Layout::Tree);
        assert_eq!(Layout::for_state(AppState::Heart), Layout::Heart);
    }

    #[test]
    fn update_eases_toward_explode_and_leaves_targets_alone() {
        let mut group = gold(32);
        let explode_before = group.targets(Layout::Explode).to_vec();
        let tree_before = group.targets(Layout::Tree).to_vec();
        let motion = MotionOptions::default();
        let input = FrameInput {
            state: AppState::Explode,
            time: 0.0,
            hand_rotation: 0.0,
        };
        let start = group.positions().to_vec();
        group.update(&input, &motion);
        for ((p, s), t) in group.positions().iter().zip(&start).zip(&explode_before) {
            let expected = *s + (*t - *s) * motion.static_speed;
            assert!((*p - expected).length() < 1e-4);
        }
        assert_eq!(group.targets(Layout::Explode), explode_before.as_slice());
        assert_eq!(group.targets(Layout::Tree), tree_before.as_slice());
    }

    #[test]
    fn tree_spins_and_explode_follows_hand() {
        let mut group = gold(8);
        let motion = MotionOptions::default();
        let mut input = FrameInput {
            state: AppState::Tree,
            time: 1.0,
            hand_rotation: 2.0,
        };
        group.update(&input, &motion);
        assert!((group.rotation_y() - motion.tree_spin).abs() < 1e-6);

        input.state = AppState::Explode;
        let before = group.rotation_y();
        group.update(&input, &motion);
        let expected = before + (2.0 - before) * motion.hand_follow;
        assert!((group.rotation_y() - expected).abs() < 1e-6);
    }

    #[test]
    fn heart_freezes_the_group_and_tree_restores_scale() {
        let mut group = gold(16);
        let motion = MotionOptions::default();
        let mut input = FrameInput {
            state: AppState::Explode,
            time: 0.0,
            hand_rotation: 2.0,
        };
        for _ in 0..100 {
            group.update(&input, &motion);
        }
        let rotation = group.rotation_y();
        let positions = group.positions().to_vec();
        assert!((rotation - 2.0).abs() < 1e-3);

        input.state = AppState::Heart;
        input.time = 0.5;
        group.update(&input, &motion);
        assert_eq!(group.rotation_y(), rotation);
        assert_eq!(group.positions(), positions.as_slice());
        assert_eq!(group.scale(), 1.0);

        input.state = AppState::Tree;
        for _ in 0..60 {
            group.update(&input, &motion);
        }
        assert_eq!(group.scale(), 1.0);
        let expected = rotation + 60.0 * motion.tree_spin;
        assert!((group.rotation_y() - expected).abs() < 1e-4);
    }
}
