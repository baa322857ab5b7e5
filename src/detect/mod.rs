mod backend;
pub mod backends;
mod filter;
mod loader;
mod result;

pub use backend::DetectorBackend;
pub use backends::ScriptedBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use filter::{filter_detections, DetectionFilter};
pub use loader::load_backend;
pub use result::{AmbulanceSighting, BoundingBox, RawDetection};
