//! The gallery pool: one large particle group split across N images.
//!
//! Particles are assigned to images in contiguous blocks. Targets for a new
//! image set are assembled off the render path in a [`GalleryBuilder`] and
//! only swapped into the [`GalleryPool`] once every image has been sampled.

use std::ops::Range;

use glam::{Vec2, Vec3};
use rand::Rng;
use tracing::{debug, info};

use crate::error::Error;
use crate::particles::{ease_vec_toward, layout};
use crate::reveal::RevealSequencer;
use crate::sampler::{ImageSource, Silhouette};

const DEFAULT_COLOR: [f32; 3] = [1.0, 215.0 / 255.0, 0.0];

/// Split `count` particles into `n` contiguous blocks whose sizes differ by at most one.
///
/// Block `i` is `[i*count/n, (i+1)*count/n)` with floor division, so the
/// blocks cover the whole range in order. The `count % n` leftover particles
/// are spread one per block by the rounding instead of all going to the last
/// block: `partition(10, 4)` gives sizes 2, 3, 2, 3.
pub fn partition(count: usize, n: usize) -> Vec<Range<usize>> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| (i * count / n)..((i + 1) * count / n))
        .collect()
}

/// Image centres laid out left to right, evenly spaced and centred as a group.
pub fn image_centers(n: usize, spacing: f32, y: f32) -> Vec<Vec2> {
    let start_x = -spacing * (n.saturating_sub(1) as f32 / 2.0);
    (0..n)
        .map(|i| Vec2::new(start_x + i as f32 * spacing, y))
        .collect()
}

/// A complete, validated set of gallery targets.
#[derive(Debug, Clone)]
pub struct BuiltGallery {
    pub generation: u64,
    pub targets: Vec<Vec3>,
    pub colors: Vec<[f32; 3]>,
    pub image_index: Vec<u32>,
    pub blocks: Vec<Range<usize>>,
    /// Number of images that used the sparse-silhouette fallback.
    pub fallbacks: usize,
}

impl BuiltGallery {
    pub fn image_count(&self) -> usize {
        self.blocks.len()
    }
}

/// Accumulates per-image silhouettes into disjoint blocks of fresh buffers.
pub struct GalleryBuilder {
    generation: u64,
    targets: Vec<Vec3>,
    colors: Vec<[f32; 3]>,
    image_index: Vec<u32>,
    blocks: Vec<Range<usize>>,
    written: Vec<bool>,
    fallbacks: usize,
}

impl GalleryBuilder {
    pub fn new(generation: u64, count: usize, images: usize) -> Self {
        let blocks = partition(count, images);
        let mut image_index = vec![0u32; count];
        for (idx, block) in blocks.iter().enumerate() {
            image_index[block.clone()].fill(idx as u32);
        }
        Self {
            generation,
            targets: vec![Vec3::ZERO; count],
            colors: vec![DEFAULT_COLOR; count],
            image_index,
            written: vec![false; blocks.len()],
            blocks,
            fallbacks: 0,
        }
    }

    pub fn blocks(&self) -> &[Range<usize>] {
        &self.blocks
    }

    /// Copy one image's silhouette into its block.
    pub fn write_block(&mut self, image: usize, silhouette: &Silhouette) {
        let block = self.blocks[image].clone();
        debug_assert_eq!(block.len(), silhouette.len());
        for (dst, src) in self.targets[block.clone()].iter_mut().zip(&silhouette.points) {
            *dst = *src;
        }
        for (dst, src) in self.colors[block].iter_mut().zip(&silhouette.colors) {
            *dst = *src;
        }
        if silhouette.fallback {
            self.fallbacks += 1;
        }
        self.written[image] = true;
    }

    /// Finish the build; `None` unless every block was written.
    pub fn finish(self) -> Option<BuiltGallery> {
        if !self.written.iter().all(|w| *w) {
            return None;
        }
        Some(BuiltGallery {
            generation: self.generation,
            targets: self.targets,
            colors: self.colors,
            image_index: self.image_index,
            blocks: self.blocks,
            fallbacks: self.fallbacks,
        })
    }
}

/// A rebuild the caller may now run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildTicket {
    pub generation: u64,
    pub images: Vec<ImageSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The finished build is for the newest request and may be installed.
    Apply,
    /// A newer request arrived while building; the result must be dropped.
    Stale,
    /// The generation was not in flight.
    Unknown,
}

/// Single in-flight guard for gallery rebuilds.
///
/// Every request bumps a generation counter. A request arriving while a
/// build is in flight is rejected, but its image set is kept as pending; the
/// in-flight result is then stale and the pending set should be re-requested.
#[derive(Debug, Default)]
pub struct RebuildGuard {
    generation: u64,
    in_flight: Option<u64>,
    pending: Option<Vec<ImageSource>>,
}

impl RebuildGuard {
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn request(&mut self, images: Vec<ImageSource>) -> Result<RebuildTicket, Error> {
        if images.is_empty() {
            return Err(Error::EmptyGallery);
        }
        self.generation += 1;
        if self.in_flight.is_some() {
            self.pending = Some(images);
            return Err(Error::ConcurrentRebuildRejected {
                generation: self.generation,
            });
        }
        self.in_flight = Some(self.generation);
        Ok(RebuildTicket {
            generation: self.generation,
            images,
        })
    }

    /// Mark `generation` finished, successfully or not.
    pub fn complete(&mut self, generation: u64) -> Completion {
        if self.in_flight != Some(generation) {
            return Completion::Unknown;
        }
        self.in_flight = None;
        if generation == self.generation {
            Completion::Apply
        } else {
            Completion::Stale
        }
    }

    pub fn take_pending(&mut self) -> Option<Vec<ImageSource>> {
        self.pending.take()
    }
}

/// The gallery particle group owned by the render loop.
pub struct GalleryPool {
    positions: Vec<Vec3>,
    sizes: Vec<f32>,
    colors: Vec<[f32; 3]>,
    scatter: Vec<Vec3>,
    targets: Vec<Vec3>,
    image_index: Vec<u32>,
    image_count: usize,
    base_size: f32,
    ready: bool,
    visible: bool,
}

impl GalleryPool {
    /// Pool of `count` particles parked, invisible, in a scatter cloud of radius `spread`.
    pub fn new<R: Rng + ?Sized>(count: usize, spread: f32, base_size: f32, rng: &mut R) -> Self {
        let scatter = layout::scatter_cloud(count, spread, rng);
        Self {
            positions: scatter.clone(),
            sizes: vec![0.0; count],
            colors: vec![DEFAULT_COLOR; count],
            targets: scatter.clone(),
            scatter,
            image_index: vec![0; count],
            image_count: 0,
            base_size,
            ready: false,
            visible: false,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn image_count(&self) -> usize {
        self.image_count
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

    pub fn scatter_targets(&self) -> &[Vec3] {
        &self.scatter
    }

    /// Drop readiness ahead of a rebuild; the current buffers stay untouched.
    pub fn invalidate(&mut self) {
        self.ready = false;
    }

    /// Swap in a finished build. Rejects builds whose size does not match the pool.
    pub fn install(&mut self, built: BuiltGallery) -> bool {
        let count = self.len();
        if built.targets.len() != count
            || built.colors.len() != count
            || built.image_index.len() != count
        {
            debug!(
                expected = count,
                got = built.targets.len(),
                "discarding gallery build with mismatched size"
            );
            return false;
        }
        self.targets = built.targets;
        self.colors = built.colors;
        self.image_index = built.image_index;
        self.image_count = built.blocks.len();
        self.ready = true;
        info!(
            generation = built.generation,
            images = self.image_count,
            fallbacks = built.fallbacks,
            "gallery targets installed"
        );
        true
    }

    /// Put every particle back in the scatter cloud, invisible.
    pub fn reset_to_scatter(&mut self) {
        self.positions.copy_from_slice(&self.scatter);
        self.sizes.fill(0.0);
    }

    /// Ease revealed images toward their silhouettes and the rest toward scatter.
    pub fn update(&mut self, time: f32, reveal: &RevealSequencer, speed: f32) {
        let base = self.base_size;
        for (i, ((pos, size), image)) in self
            .positions
            .iter_mut()
            .zip(&mut self.sizes)
            .zip(&self.image_index)
            .enumerate()
        {
            let revealed = reveal.is_revealed(*image as usize);
            let target = if revealed {
                self.targets[i]
            } else {
                self.scatter[i]
            };
            *pos = ease_vec_toward(*pos, target, speed);
            *size = if revealed {
                base * (0.85 + 0.15 * (time * 10.0 + i as f32 * 0.01).sin())
            } else {
                0.0
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::time::{Duration, Instant};

    fn silhouette(len: usize, at: Vec3, fallback: bool) -> Silhouette {
        Silhouette {
            points: vec![at; len],
            colors: vec![[0.5, 0.25, 1.0]; len],
            crop: crate::sampler::Bounds {
                x: 0,
                y: 0,
                width: 1,
                height: 1,
            },
            fallback,
        }
    }

    fn sources(n: usize) -> Vec<ImageSource> {
        (0..n)
            .map(|i| ImageSource::parse(&format!("{i}.png")))
            .collect()
    }

    #[test]
    fn partition_covers_pool_without_gaps() {
        for (count, n) in [(128_000, 5), (10, 3), (7, 7), (100, 1), (11, 4)] {
            let blocks = partition(count, n);
            assert_eq!(blocks.len(), n);
            assert_eq!(blocks[0].start, 0);
            assert_eq!(blocks[n - 1].end, count);
            for pair in blocks.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
            }
            let min = blocks.iter().map(|b| b.len()).min().unwrap();
            let max = blocks.iter().map(|b| b.len()).max().unwrap();
            assert!(max - min <= 1, "{count}/{n}: sizes {min}..{max}");
        }
        assert!(partition(10, 0).is_empty());
    }

    #[test]
    fn partition_spreads_the_remainder() {
        let sizes = |count, n| partition(count, n).iter().map(|b| b.len()).collect::<Vec<_>>();
        assert_eq!(sizes(10, 4), [2, 3, 2, 3]);
        assert_eq!(sizes(11, 3), [3, 4, 4]);
        assert_eq!(partition(10, 3), [0..3, 3..6, 6..10]);
    }

    #[test]
    fn centers_are_symmetric() {
        let centers = image_centers(5, 20.0, 3.0);
        let xs: Vec<f32> = centers.iter().map(|c| c.x).collect();
        assert_eq!(xs, vec![-40.0, -20.0, 0.0, 20.0, 40.0]);
        assert!(centers.iter().all(|c| c.y == 3.0));
        assert_eq!(image_centers(1, 20.0, 0.0), vec![Vec2::ZERO]);
    }

    #[test]
    fn builder_assigns_one_image_per_block() {
        let builder = GalleryBuilder::new(1, 10, 3);
        let blocks = builder.blocks().to_vec();
        let built = {
            let mut b = builder;
            for (i, block) in blocks.iter().enumerate() {
                b.write_block(i, &silhouette(block.len(), Vec3::splat(i as f32), false));
            }
            b.finish().unwrap()
        };
        for (i, block) in built.blocks.iter().enumerate() {
            for p in block.clone() {
                assert_eq!(built.image_index[p], i as u32);
                assert_eq!(built.targets[p], Vec3::splat(i as f32));
            }
        }
        assert_eq!(built.image_count(), 3);
    }

    #[test]
    fn partial_build_never_finishes() {
        let mut b = GalleryBuilder::new(1, 10, 2);
        let first = b.blocks()[0].len();
        b.write_block(0, &silhouette(first, Vec3::ONE, true));
        assert!(b.finish().is_none());
    }

    #[test]
    fn guard_rejects_concurrent_and_discards_stale() {
        let mut guard = RebuildGuard::default();
        let first = guard.request(sources(2)).unwrap();
        assert!(guard.is_busy());

        let err = guard.request(sources(3)).unwrap_err();
        assert!(matches!(err, Error::ConcurrentRebuildRejected { .. }));

        assert_eq!(guard.complete(first.generation), Completion::Stale);
        assert!(!guard.is_busy());
        let pending = guard.take_pending().unwrap();
        assert_eq!(pending.len(), 3);

        let second = guard.request(pending).unwrap();
        assert_eq!(guard.complete(second.generation), Completion::Apply);
        assert_eq!(guard.complete(second.generation), Completion::Unknown);
    }

    #[test]
    fn guard_allows_retry_after_failure() {
        let mut guard = RebuildGuard::default();
        let t = guard.request(sources(1)).unwrap();
        assert_eq!(guard.complete(t.generation), Completion::Apply);
        assert!(guard.request(sources(1)).is_ok());
        assert!(matches!(
            RebuildGuard::default().request(Vec::new()),
            Err(Error::EmptyGallery)
        ));
    }

    #[test]
    fn pool_starts_scattered_and_invisible() {
        let mut rng = StdRng::seed_from_u64(31);
        let pool = GalleryPool::new(500, 140.0, 2.0, &mut rng);
        assert!(!pool.is_ready());
        assert_eq!(pool.positions(), pool.scatter_targets());
        assert!(pool.sizes().iter().all(|s| *s == 0.0));
        assert_eq!(pool.colors().len(), pool.len());
    }

    #[test]
    fn install_rejects_mismatched_build() {
        let mut rng = StdRng::seed_from_u64(32);
        let mut pool = GalleryPool::new(10, 140.0, 2.0, &mut rng);
        let mut b = GalleryBuilder::new(1, 9, 1);
        b.write_block(0, &silhouette(9, Vec3::ZERO, false));
        assert!(!pool.install(b.finish().unwrap()));
        assert!(!pool.is_ready());
    }

    #[test]
    fn update_moves_only_revealed_images_to_targets() {
        let mut rng = StdRng::seed_from_u64(33);
        let mut pool = GalleryPool::new(100, 140.0, 2.0, &mut rng);
        let mut b = GalleryBuilder::new(1, 100, 2);
        let blocks = b.blocks().to_vec();
        b.write_block(0, &silhouette(blocks[0].len(), Vec3::new(5.0, 0.0, 0.0), false));
        b.write_block(1, &silhouette(blocks[1].len(), Vec3::new(-5.0, 0.0, 0.0), false));
        assert!(pool.install(b.finish().unwrap()));

        let t0 = Instant::now();
        let mut reveal =
            RevealSequencer::new(2, Duration::from_millis(500), Duration::from_millis(350));
        reveal.start(t0);
        reveal.tick(t0, AppState::Heart);

        for _ in 0..300 {
            pool.update(0.0, &reveal, 0.09);
        }
        for i in blocks[0].clone() {
            assert!((pool.positions()[i] - Vec3::new(5.0, 0.0, 0.0)).length() < 1e-3);
            assert!(pool.sizes()[i] > 0.0);
        }
        for i in blocks[1].clone() {
            assert!((pool.positions()[i] - pool.scatter_targets()[i]).length() < 1e-3);
            assert_eq!(pool.sizes()[i], 0.0);
        }

        pool.reset_to_scatter();
        assert_eq!(pool.positions(), pool.scatter_targets());
        assert!(pool.sizes().iter().all(|s| *s == 0.0));
    }
}
