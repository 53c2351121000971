use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use particle_greeting::config::Configuration;
use particle_greeting::events::{BuildGallery, GalleryBuilt, ViewerCommand};
use particle_greeting::orbit::PanelLook;
use particle_greeting::sampler::{ImageSource, load_with_retry};
use particle_greeting::state::AppState;
use particle_greeting::tasks::builder::{self, BuildSettings};
use particle_greeting::tasks::gestures::{self, GestureFeed};
use particle_greeting::tasks::viewer::{self, ViewerLinks};
use particle_greeting::tasks::uploads;
use particle_greeting::world::World;

/// Simulated display refresh used by `--simulate`.
const SIM_FRAME: Duration = Duration::from_micros(16_667);

#[derive(Debug, Parser)]
#[command(
    name = "particle-greeting",
    version,
    about = "gesture-driven particle greeting"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// JSON-lines hand landmark feed; `-` reads stdin
    #[arg(long = "gesture-feed", value_name = "FILE|-")]
    gesture_feed: Option<String>,
    /// Run N frames headless, cycling TREE, EXPLODE, PHOTO and HEART, then exit
    #[arg(long = "simulate", value_name = "FRAMES")]
    simulate: Option<usize>,
    /// Deterministic RNG seed for particle layouts and gallery sampling
    #[arg(long = "seed", value_name = "SEED")]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // init tracing (RUST_LOG controls level, default = info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let Args {
        config,
        gesture_feed,
        simulate,
        seed,
    } = Args::parse();

    let mut cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .validated()
        .context("invalid configuration values")?;
    if cfg.gallery.asset_root.is_none() {
        cfg.gallery.asset_root = config.parent().map(Path::to_path_buf);
    }
    let seed = seed.or(cfg.seed);
    tracing::info!(
        "Loaded configuration from {}:\n{:#?}",
        config.display(),
        cfg
    );

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let panels = load_panel_looks(&cfg);
    let world = World::new(&cfg, &panels, &mut rng, Instant::now())
        .context("failed to build particle groups")?;
    let settings = BuildSettings::new(&cfg.gallery, seed);

    if let Some(frames) = simulate {
        return run_simulation(world, frames, &settings).await;
    }

    // Channels (small/bounded)
    let (control_tx, control_rx) = mpsc::channel::<ViewerCommand>(64); // Gestures/Uploads -> Viewer
    let (build_tx, build_rx) = mpsc::channel::<BuildGallery>(4); // Viewer -> Builder
    let (built_tx, built_rx) = mpsc::channel::<GalleryBuilt>(4); // Builder -> Viewer

    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let mut tasks = JoinSet::new();

    // GalleryBuilder
    tasks.spawn({
        let cancel = cancel.clone();
        let settings = settings.clone();
        async move {
            builder::run(build_rx, built_tx, settings, cancel)
                .await
                .context("gallery builder task failed")
        }
    });

    // GestureFeed
    if let Some(raw) = gesture_feed {
        let feed = GestureFeed::parse(&raw);
        let thresholds = cfg.gesture;
        let control = control_tx.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            gestures::run(feed, thresholds, control, cancel)
                .await
                .context("gesture feed task failed")
        });
    }

    // Uploads
    if let Some(dir) = cfg.uploads.clone() {
        let control = control_tx.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            uploads::run(dir, control, cancel)
                .await
                .context("uploads task failed")
        });
    }
    drop(control_tx);

    // Run the windowed viewer on the main thread (blocking) after spawning other tasks
    let links = ViewerLinks {
        control: control_rx,
        built: built_rx,
        to_builder: build_tx,
    };
    if let Err(e) =
        viewer::run_windowed(cfg.camera, world, links, cancel.clone()).context("viewer failed")
    {
        tracing::error!("{e:?}");
    }
    cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }

    Ok(())
}

fn load_panel_looks(cfg: &Configuration) -> Vec<PanelLook> {
    let root = cfg.gallery.asset_root.as_deref();
    cfg.photos
        .iter()
        .map(|path| {
            let source = ImageSource::Path(path.clone());
            match load_with_retry(&source, root) {
                Ok(img) => PanelLook::from_image(&img),
                Err(err) => {
                    tracing::warn!(error = %err, "photo panel image unavailable; using plain panel");
                    PanelLook::default()
                }
            }
        })
        .collect()
}

async fn run_simulation(mut world: World, frames: usize, settings: &BuildSettings) -> Result<()> {
    const SCRIPT: [AppState; 4] = [
        AppState::Tree,
        AppState::Explode,
        AppState::Photo,
        AppState::Heart,
    ];
    let segment = (frames / SCRIPT.len()).max(1);
    let cancel = CancellationToken::new();
    let start = Instant::now();

    println!(
        "# simulation\n# frames: {frames}\n# gallery particles: {}\n# gallery images: {}\n",
        world.gallery().len(),
        world.gallery_images().len()
    );

    let mut last = None;
    for i in 0..frames {
        let now = start + SIM_FRAME * i as u32;

        if let Some(ticket) = world.take_rebuild() {
            let generation = ticket.generation;
            let result = builder::build(&ticket, settings, &cancel)
                .await
                .context("simulation build cancelled")?;
            world.on_gallery_built(GalleryBuilt { generation, result });
        }

        let wanted = SCRIPT[(i / segment).min(SCRIPT.len() - 1)];
        world.set_state(wanted);
        let report = world.frame(now);

        if last != Some(report.state) || i + 1 == frames {
            last = Some(report.state);
            let visible: usize = world
                .groups()
                .iter()
                .filter(|g| g.is_visible())
                .map(|g| g.len())
                .sum();
            println!(
                "  frame {:>5} t={:>6.2}s state={:<7} static-visible={:>5} gallery-ready={} reveal={}/{} message={}",
                i,
                report.time,
                report.state.as_str(),
                visible,
                world.gallery().is_ready(),
                report.reveal_progress,
                world.reveal().total(),
                world.message_visible()
            );
        }
    }
    Ok(())
}
