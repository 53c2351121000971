use std::path::PathBuf;

use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::select;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::GalleryOptions;
use crate::error::Error;
use crate::events::{BuildGallery, GalleryBuilt};
use crate::gallery::{BuiltGallery, GalleryBuilder, RebuildTicket, image_centers};
use crate::sampler::{Silhouette, SilhouetteOptions, compute_silhouette, load_with_retry};

/// Everything a build needs besides the image list.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub count: usize,
    pub spacing: f32,
    pub y: f32,
    pub silhouette: SilhouetteOptions,
    pub asset_root: Option<PathBuf>,
    pub seed: Option<u64>,
}

impl BuildSettings {
    pub fn new(gallery: &GalleryOptions, seed: Option<u64>) -> Self {
        Self {
            count: gallery.count,
            spacing: gallery.spacing,
            y: gallery.y,
            silhouette: SilhouetteOptions::from(gallery),
            asset_root: gallery.asset_root.clone(),
            seed,
        }
    }

    fn rng_for(&self, generation: u64, image: usize) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(
                seed ^ generation.rotate_left(32) ^ (image as u64).wrapping_mul(0x9E37_79B9),
            ),
            None => StdRng::from_os_rng(),
        }
    }
}

/// Decode and sample one image of a build.
fn sample_image(
    ticket: &RebuildTicket,
    image: usize,
    len: usize,
    settings: &BuildSettings,
) -> Result<Silhouette, Error> {
    let source = &ticket.images[image];
    let rgba = load_with_retry(source, settings.asset_root.as_deref())?;
    let center = image_centers(ticket.images.len(), settings.spacing, settings.y)[image];
    let mut rng = settings.rng_for(ticket.generation, image);
    let silhouette = compute_silhouette(&rgba, len, center, &settings.silhouette, &mut rng);
    debug!(
        image,
        source = %source,
        points = silhouette.len(),
        fallback = silhouette.fallback,
        "sampled gallery image"
    );
    Ok(silhouette)
}

/// Build a gallery on the current thread. Any failing image aborts the build.
pub fn build_blocking(ticket: &RebuildTicket, settings: &BuildSettings) -> Result<BuiltGallery, Error> {
    if ticket.images.is_empty() {
        return Err(Error::EmptyGallery);
    }
    let mut builder = GalleryBuilder::new(ticket.generation, settings.count, ticket.images.len());
    let lens: Vec<usize> = builder.blocks().iter().map(|b| b.len()).collect();
    for (image, len) in lens.into_iter().enumerate() {
        let silhouette = sample_image(ticket, image, len, settings)?;
        builder.write_block(image, &silhouette);
    }
    builder.finish().ok_or(Error::EmptyGallery)
}

/// Build a gallery one image at a time, decoding each on the blocking pool.
///
/// Returns `None` when cancelled mid-build.
pub async fn build(
    ticket: &RebuildTicket,
    settings: &BuildSettings,
    cancel: &CancellationToken,
) -> Option<Result<BuiltGallery, Error>> {
    if ticket.images.is_empty() {
        return Some(Err(Error::EmptyGallery));
    }
    let mut builder = GalleryBuilder::new(ticket.generation, settings.count, ticket.images.len());
    let lens: Vec<usize> = builder.blocks().iter().map(|b| b.len()).collect();

    for (image, len) in lens.into_iter().enumerate() {
        let job = {
            let ticket = ticket.clone();
            let settings = settings.clone();
            tokio::task::spawn_blocking(move || sample_image(&ticket, image, len, &settings))
        };
        let joined = select! {
            _ = cancel.cancelled() => return None,
            joined = job => joined,
        };
        let silhouette = match joined {
            Ok(Ok(silhouette)) => silhouette,
            Ok(Err(err)) => return Some(Err(err)),
            Err(join_err) => {
                return Some(Err(Error::image_load(
                    ticket.images[image].to_string(),
                    join_err,
                )));
            }
        };
        builder.write_block(image, &silhouette);
    }
    Some(builder.finish().ok_or(Error::EmptyGallery))
}

/// Gallery builder task: runs one build per request, in arrival order.
#[instrument(skip_all, fields(count = settings.count))]
pub async fn run(
    mut requests: Receiver<BuildGallery>,
    results: Sender<GalleryBuilt>,
    settings: BuildSettings,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let BuildGallery(ticket) = select! {
            _ = cancel.cancelled() => break,
            req = requests.recv() => match req {
                Some(req) => req,
                None => break,
            },
        };

        info!(
            generation = ticket.generation,
            images = ticket.images.len(),
            "building gallery targets"
        );
        let Some(result) = build(&ticket, &settings, &cancel).await else {
            debug!(generation = ticket.generation, "gallery build cancelled");
            break;
        };
        match &result {
            Ok(built) => info!(
                generation = ticket.generation,
                images = built.image_count(),
                fallbacks = built.fallbacks,
                "gallery build finished"
            ),
            Err(err) => warn!(generation = ticket.generation, error = %err, "gallery build failed"),
        }
        if results
            .send(GalleryBuilt {
                generation: ticket.generation,
                result,
            })
            .await
            .is_err()
        {
            debug!("viewer gone; stopping gallery builder");
            break;
        }
    }
    Ok(())
}
