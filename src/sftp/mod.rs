pub mod attrs;
pub mod buffer;
pub mod constants;
pub mod engine;
pub mod error;
pub mod handles;
pub mod test_utils;
pub mod transport;

pub use engine::Engine;
pub use error::{EngineError, Status};
