pub mod backend;
pub mod blob;
pub mod contours;
pub mod pool;
pub mod preprocessing;
pub mod validate;
pub mod visualize;

pub use backend::{check_contract, DetectionBackend, FixedBackend};
pub use blob::BlobBackend;
pub use pool::DetectionPool;
pub use preprocessing::{ImagePreprocessor, NormalizedImage};
pub use validate::ImageValidator;
