/// Widget bindings and cancellable tasks.
pub mod binding;
/// Fetch, decode, transform and cache steps.
pub mod decode_pipeline;
/// Worker facade and UI dispatcher.
pub mod image_worker;
