pub mod config;
pub mod error;
pub mod events;
pub mod gallery;
pub mod gesture;
pub mod orbit;
pub mod particles;
pub mod reveal;
pub mod sampler;
pub mod state;
pub mod world;
pub mod tasks {
    pub mod builder;
    pub mod gestures;
    pub mod uploads;
    pub mod viewer;
}

pub use error::Error;
