//! Application layer with the decode pipeline and the worker facade.

/// Pipeline, binding and worker services.
pub mod services;

pub use services::binding::{BindingTable, CancellationFlag, TaskId};
pub use services::decode_pipeline::DecodePipeline;
pub use services::image_worker::{ImageWorker, LoadHandle, UiDispatcher};
