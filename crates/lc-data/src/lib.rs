pub mod features;
pub mod loaders;
pub mod splitter;

pub use features::apply_features;
pub use loaders::*;
pub use splitter::*;
