pub mod sftp;

pub use sftp::{Engine, EngineError};
