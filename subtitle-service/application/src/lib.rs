pub mod error;
pub mod session;
pub mod usecase;

pub use error::*;
pub use session::*;
pub use usecase::*;
