pub mod space;
pub mod config;
pub mod worker;
pub mod plan;
pub mod probe;

pub use space::*;
pub use config::*;
pub use worker::*;
pub use plan::*;
pub use probe::*;
