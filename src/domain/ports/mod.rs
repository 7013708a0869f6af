mod asset_source;
mod http_transport;
mod image_adapter;
mod image_target;
mod load_listener;

pub use asset_source::AssetSource;
pub use http_transport::{HttpBody, HttpTransport};
pub use image_adapter::ImageAdapter;
pub use image_target::{ImageTarget, TargetId};
pub use load_listener::{LoadListener, SimpleLoadListener};

#[cfg(test)]
pub use image_adapter::MockImageAdapter;
