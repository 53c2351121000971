//! The animation session owned by the render loop.
//!
//! `World` bundles everything that changes frame to frame: the static
//! groups, the gallery pool, the state machine, the reveal sequencer and the
//! photo orbit. Inputs (gestures, manual overrides, finished gallery builds)
//! are applied between frames; `frame` advances the animation by one step.

use std::time::Instant;

use anyhow::Result;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::{Configuration, GestureThresholds, MotionOptions};
use crate::error::Error;
use crate::events::GalleryBuilt;
use crate::gallery::{Completion, GalleryPool, RebuildGuard, RebuildTicket};
use crate::gesture::{self, GestureReading, Hand};
use crate::orbit::{PanelLook, PhotoOrbit};
use crate::particles::{FrameInput, LayoutParams, ParticleGroup};
use crate::reveal::RevealSequencer;
use crate::sampler::ImageSource;
use crate::state::{AppState, StateChange, StateMachine};

/// Summary of one [`World::frame`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub state: AppState,
    /// Seconds since the world was created.
    pub time: f32,
    pub reveal_progress: usize,
    pub message_revealed: bool,
}

pub struct World {
    motion: MotionOptions,
    thresholds: GestureThresholds,
    message: String,
    groups: Vec<ParticleGroup>,
    gallery: GalleryPool,
    gallery_images: Vec<ImageSource>,
    guard: RebuildGuard,
    outbox: Option<RebuildTicket>,
    retry_on_heart: bool,
    machine: StateMachine,
    reveal: RevealSequencer,
    orbit: PhotoOrbit,
    hand_x: f32,
    started: Instant,
}

impl World {
    /// Build every group from `cfg` and queue the initial gallery build.
    pub fn new<R: Rng + ?Sized>(
        cfg: &Configuration,
        panels: &[PanelLook],
        rng: &mut R,
        now: Instant,
    ) -> Result<Self> {
        let params = LayoutParams {
            tree: cfg.tree,
            explode_radius: cfg.explode_radius,
        };
        let groups = cfg
            .groups
            .specs()?
            .into_iter()
            .map(|spec| ParticleGroup::new(spec, &params, rng))
            .collect();
        let gallery = GalleryPool::new(
            cfg.gallery.count,
            cfg.gallery.scatter_spread,
            cfg.gallery.size,
            rng,
        );
        let reveal = RevealSequencer::new(
            cfg.gallery.images.len(),
            cfg.gallery.reveal_step,
            cfg.gallery.message_delay,
        );

        let mut world = Self {
            motion: cfg.motion,
            thresholds: cfg.gesture,
            message: cfg.gallery.message.clone(),
            groups,
            gallery,
            gallery_images: Vec::new(),
            guard: RebuildGuard::default(),
            outbox: None,
            retry_on_heart: false,
            machine: StateMachine::default(),
            reveal,
            orbit: PhotoOrbit::new(cfg.photo_orbit_radius, panels),
            hand_x: 0.5,
            started: now,
        };
        world.request_rebuild(cfg.gallery.images.clone());
        Ok(world)
    }

    pub fn state(&self) -> AppState {
        self.machine.current()
    }

    pub fn groups(&self) -> &[ParticleGroup] {
        &self.groups
    }

    pub fn gallery(&self) -> &GalleryPool {
        &self.gallery
    }

    pub fn gallery_images(&self) -> &[ImageSource] {
        &self.gallery_images
    }

    pub fn reveal(&self) -> &RevealSequencer {
        &self.reveal
    }

    pub fn orbit(&self) -> &PhotoOrbit {
        &self.orbit
    }

    pub fn hand_x(&self) -> f32 {
        self.hand_x
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn message_visible(&self) -> bool {
        self.reveal.message_visible()
    }

    pub fn is_building(&self) -> bool {
        self.guard.is_busy()
    }

    /// Next gallery build the caller should hand to the builder task.
    pub fn take_rebuild(&mut self) -> Option<RebuildTicket> {
        self.outbox.take()
    }

    /// Classify raw hands and apply the result.
    pub fn apply_hands(&mut self, hands: &[Hand]) -> Option<StateChange> {
        let reading = gesture::classify(hands, &self.thresholds);
        self.apply_gesture(reading)
    }

    pub fn apply_gesture(&mut self, reading: GestureReading) -> Option<StateChange> {
        if let Some(x) = reading.hand_x {
            self.hand_x = x;
        }
        self.set_state(reading.state)
    }

    /// Assign the application state. Edge effects run only when the value changes.
    pub fn set_state(&mut self, to: AppState) -> Option<StateChange> {
        let change = self.machine.set(to)?;
        info!(from = %change.from, to = %change.to, "state changed");

        if change.entered_heart() {
            self.reveal.stop();
            self.gallery.reset_to_scatter();
            if self.retry_on_heart && !self.gallery.is_ready() && !self.guard.is_busy() {
                self.retry_on_heart = false;
                self.request_rebuild(self.gallery_images.clone());
            }
        }
        if change.left_heart() {
            self.reveal.stop();
        }
        Some(change)
    }

    /// Replace the gallery image set and schedule a build for it.
    ///
    /// While another build is in flight the request is rejected but
    /// remembered; it is re-issued once the in-flight result comes back.
    pub fn request_rebuild(&mut self, images: Vec<ImageSource>) {
        self.gallery_images = images.clone();
        match self.guard.request(images) {
            Ok(ticket) => {
                info!(
                    generation = ticket.generation,
                    images = ticket.images.len(),
                    "gallery rebuild requested"
                );
                self.gallery.invalidate();
                self.reveal.stop();
                self.outbox = Some(ticket);
            }
            Err(err @ Error::ConcurrentRebuildRejected { .. }) => {
                info!("{err}; queued until the current build finishes");
                self.gallery.invalidate();
                self.reveal.stop();
            }
            Err(err) => warn!("{err}"),
        }
    }

    /// Apply a finished build, or drop it when a newer image set superseded it.
    pub fn on_gallery_built(&mut self, built: GalleryBuilt) {
        let GalleryBuilt { generation, result } = built;
        match self.guard.complete(generation) {
            Completion::Unknown => {
                debug!(generation, "ignoring result for a build that is not in flight");
            }
            Completion::Stale => {
                debug!(generation, "discarding stale gallery build");
                if let Some(pending) = self.guard.take_pending() {
                    self.request_rebuild(pending);
                }
            }
            Completion::Apply => match result {
                Ok(built) => {
                    let images = built.image_count();
                    if self.gallery.install(built) {
                        self.reveal.set_total(images);
                        self.gallery.reset_to_scatter();
                        self.retry_on_heart = false;
                    } else {
                        self.retry_on_heart = true;
                    }
                }
                Err(err) => {
                    warn!(generation, error = %err, "gallery build failed; gallery stays hidden");
                    self.retry_on_heart = true;
                }
            },
        }
    }

    /// Advance the animation by one display frame.
    pub fn frame(&mut self, now: Instant) -> FrameReport {
        let time = now.saturating_duration_since(self.started).as_secs_f32();
        let state = self.machine.current();
        let in_heart = state == AppState::Heart;

        let input = FrameInput {
            state,
            time,
            hand_rotation: gesture::hand_rotation(self.hand_x),
        };
        for group in &mut self.groups {
            group.set_visible(!in_heart);
            if !in_heart {
                group.update(&input, &self.motion);
            }
        }

        let show_gallery = in_heart && self.gallery.is_ready();
        self.gallery.set_visible(show_gallery);
        if show_gallery && self.reveal.start(now) {
            debug!(images = self.reveal.total(), "gallery reveal started");
        }
        let tick = self.reveal.tick(now, state);
        if tick.completed {
            info!(images = self.reveal.total(), "gallery reveal complete");
        }
        if tick.message_revealed {
            info!(message = %self.message, "message revealed");
        }
        if show_gallery {
            self.gallery
                .update(time, &self.reveal, self.motion.gallery_speed);
        }

        let rotation = self.groups.first().map_or(0.0, |g| g.rotation_y());
        self.orbit.update(state, rotation, time);

        FrameReport {
            state,
            time,
            reveal_progress: self.reveal.progress(),
            message_revealed: tick.message_revealed,
        }
    }
}
