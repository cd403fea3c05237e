mod adapters;
mod entity;
mod source;

pub use adapters::{build_image_source, DlinkCamera, GenericCamera};
pub use entity::{
    still_image_path, stream_path, Camera, StreamSession, STATE_IDLE, STATE_STREAMING,
};
pub use source::{
    join_url, normalize_base_url, Credentials, ImageSource, StillImage, DEFAULT_CONTENT_TYPE,
    DEFAULT_STILL_IMAGE_PATH,
};
