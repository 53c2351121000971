use crate::error::Error;
use crate::gallery::{BuiltGallery, RebuildTicket};
use crate::gesture::GestureReading;
use crate::sampler::ImageSource;
use crate::state::AppState;

/// Viewer -> Builder: sample this image set into fresh gallery targets.
#[derive(Debug)]
pub struct BuildGallery(pub RebuildTicket);

/// Builder -> Viewer: outcome of one gallery build.
#[derive(Debug)]
pub struct GalleryBuilt {
    pub generation: u64,
    pub result: Result<BuiltGallery, Error>,
}

/// External inputs for the render loop.
#[derive(Debug)]
pub enum ViewerCommand {
    /// Classified hand landmarks from the gesture feed.
    Gesture(GestureReading),
    /// Manual override of the application state.
    SetState(AppState),
    /// Replace the gallery image set (uploads directory changed).
    SetGalleryImages(Vec<ImageSource>),
}
