use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, Rgba, RgbaImage};
use particle_greeting::Error;
use particle_greeting::config::GalleryOptions;
use particle_greeting::events::{BuildGallery, GalleryBuilt};
use particle_greeting::gallery::{RebuildTicket, partition};
use particle_greeting::sampler::ImageSource;
use particle_greeting::tasks::builder::{self, BuildSettings};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// 64x64 transparent canvas with a centred opaque 24x24 square.
fn square_png() -> RgbaImage {
    let mut img = RgbaImage::from_pixel(64, 64, Rgba([0, 0, 0, 0]));
    for y in 20..44 {
        for x in 20..44 {
            img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
        }
    }
    img
}

fn write_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    square_png().save_with_format(&path, ImageFormat::Png).unwrap();
    path
}

fn png_data_uri() -> String {
    let mut bytes = Cursor::new(Vec::new());
    square_png().write_to(&mut bytes, ImageFormat::Png).unwrap();
    format!(
        "data:image/png;base64,{}",
        STANDARD.encode(bytes.into_inner())
    )
}

fn settings(count: usize, asset_root: Option<PathBuf>) -> BuildSettings {
    let gallery = GalleryOptions {
        count,
        pad: 2,
        asset_root,
        ..GalleryOptions::default()
    };
    BuildSettings::new(&gallery, Some(7))
}

fn mean_x(points: &[glam::Vec3]) -> f32 {
    points.iter().map(|p| p.x).sum::<f32>() / points.len() as f32
}

#[test]
fn file_and_data_uri_images_fill_disjoint_blocks() {
    let tmp = tempdir().unwrap();
    let file = write_png(tmp.path(), "a.png");
    let ticket = RebuildTicket {
        generation: 1,
        images: vec![
            ImageSource::Path(file),
            ImageSource::DataUri(png_data_uri()),
        ],
    };

    let built = builder::build_blocking(&ticket, &settings(1001, None)).unwrap();

    assert_eq!(built.generation, 1);
    assert_eq!(built.targets.len(), 1001);
    assert_eq!(built.colors.len(), 1001);
    assert_eq!(built.image_index.len(), 1001);
    assert_eq!(built.blocks, partition(1001, 2));
    assert_eq!(built.image_count(), 2);
    assert_eq!(built.fallbacks, 0);

    for (i, block) in built.blocks.iter().enumerate() {
        assert!(built.image_index[block.clone()].iter().all(|&ix| ix as usize == i));
    }
    // image 0 sits left of image 1
    let left = mean_x(&built.targets[built.blocks[0].clone()]);
    let right = mean_x(&built.targets[built.blocks[1].clone()]);
    assert!(left < right, "left={left} right={right}");
    // every sample comes from the opaque red square
    assert!(built.colors.iter().all(|c| *c == [1.0, 0.0, 0.0]));
}

#[test]
fn relative_path_is_retried_against_asset_root() {
    let tmp = tempdir().unwrap();
    write_png(tmp.path(), "greeting-retry-only.png");
    let ticket = RebuildTicket {
        generation: 3,
        images: vec![ImageSource::Path(PathBuf::from("greeting-retry-only.png"))],
    };

    let built =
        builder::build_blocking(&ticket, &settings(200, Some(tmp.path().to_path_buf()))).unwrap();
    assert_eq!(built.targets.len(), 200);

    let err = builder::build_blocking(&ticket, &settings(200, None)).unwrap_err();
    assert!(matches!(err, Error::ImageLoad { .. }));
}

#[test]
fn one_missing_image_fails_the_whole_build() {
    let tmp = tempdir().unwrap();
    let ticket = RebuildTicket {
        generation: 1,
        images: vec![
            ImageSource::Path(write_png(tmp.path(), "ok.png")),
            ImageSource::Path(tmp.path().join("missing.png")),
        ],
    };
    let err = builder::build_blocking(&ticket, &settings(100, None)).unwrap_err();
    assert!(matches!(err, Error::ImageLoad { .. }));
}

#[test]
fn malformed_data_uri_is_reported() {
    let ticket = RebuildTicket {
        generation: 1,
        images: vec![ImageSource::DataUri("data:image/png;base64,@@@".to_string())],
    };
    assert!(builder::build_blocking(&ticket, &settings(100, None)).is_err());
}

#[test]
fn empty_image_list_is_an_error() {
    let ticket = RebuildTicket {
        generation: 1,
        images: Vec::new(),
    };
    let err = builder::build_blocking(&ticket, &settings(100, None)).unwrap_err();
    assert!(matches!(err, Error::EmptyGallery));
}

#[test]
fn same_seed_gives_same_targets() {
    let tmp = tempdir().unwrap();
    let ticket = RebuildTicket {
        generation: 2,
        images: vec![ImageSource::Path(write_png(tmp.path(), "a.png"))],
    };
    let a = builder::build_blocking(&ticket, &settings(300, None)).unwrap();
    let b = builder::build_blocking(&ticket, &settings(300, None)).unwrap();
    assert_eq!(a.targets, b.targets);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_build_matches_blocking_build() {
    let tmp = tempdir().unwrap();
    let ticket = RebuildTicket {
        generation: 5,
        images: vec![
            ImageSource::Path(write_png(tmp.path(), "a.png")),
            ImageSource::Path(write_png(tmp.path(), "b.png")),
        ],
    };
    let settings = settings(400, None);
    let cancel = CancellationToken::new();

    let async_built = builder::build(&ticket, &settings, &cancel)
        .await
        .expect("not cancelled")
        .unwrap();
    let blocking_built = builder::build_blocking(&ticket, &settings).unwrap();
    assert_eq!(async_built.targets, blocking_built.targets);
    assert_eq!(async_built.blocks, blocking_built.blocks);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn builder_task_answers_each_request() {
    let tmp = tempdir().unwrap();
    let good = ImageSource::Path(write_png(tmp.path(), "a.png"));
    let bad = ImageSource::Path(tmp.path().join("missing.png"));

    let (req_tx, req_rx) = mpsc::channel::<BuildGallery>(4);
    let (res_tx, mut res_rx) = mpsc::channel::<GalleryBuilt>(4);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(builder::run(
        req_rx,
        res_tx,
        settings(250, None),
        cancel.clone(),
    ));

    req_tx
        .send(BuildGallery(RebuildTicket {
            generation: 1,
            images: vec![good],
        }))
        .await
        .unwrap();
    req_tx
        .send(BuildGallery(RebuildTicket {
            generation: 2,
            images: vec![bad],
        }))
        .await
        .unwrap();

    let first = tokio::time::timeout(Duration::from_secs(10), res_rx.recv())
        .await
        .expect("timeout waiting for first build")
        .expect("builder closed");
    assert_eq!(first.generation, 1);
    assert_eq!(first.result.unwrap().targets.len(), 250);

    let second = tokio::time::timeout(Duration::from_secs(10), res_rx.recv())
        .await
        .expect("timeout waiting for second build")
        .expect("builder closed");
    assert_eq!(second.generation, 2);
    assert!(second.result.is_err());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("builder did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn builder_task_stops_when_requests_close() {
    let (req_tx, req_rx) = mpsc::channel::<BuildGallery>(1);
    let (res_tx, _res_rx) = mpsc::channel::<GalleryBuilt>(1);
    let handle = tokio::spawn(builder::run(
        req_rx,
        res_tx,
        settings(10, None),
        CancellationToken::new(),
    ));
    drop(req_tx);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("builder did not stop")
        .unwrap()
        .unwrap();
}
