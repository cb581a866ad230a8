pub mod scalar;
pub mod params;
pub mod task;
pub mod errors;

pub use scalar::*;
pub use params::*;
pub use task::*;
pub use errors::*;
