pub mod chunk;
pub mod context;
pub mod entity;
pub mod error;
pub mod port;

pub use chunk::*;
pub use context::*;
pub use entity::*;
pub use error::*;
pub use port::*;
