//! Backends that feed a session with frames and carry out its requests.

pub mod replay;

pub use replay::{ModelLoader, Recording, ReplayConfig, ReplayError, WorkerMsg};
