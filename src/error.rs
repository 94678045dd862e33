use thiserror::Error;

use crate::config::ConfigError;
use crate::device::DeviceError;
use crate::scene::SceneError;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failure when reading the scene file: {0}")]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("Failed to write image: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
