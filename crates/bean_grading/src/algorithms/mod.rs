pub mod preprocessing;
pub mod extraction;
pub mod segmentation;
pub mod features;

pub use preprocessing::*;
pub use extraction::*;
pub use segmentation::*;
pub use features::FeatureExtractor;
