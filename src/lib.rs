pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod runtime;
pub mod status;
pub mod store;
pub mod support;
pub mod tally;

pub use engine::{CastReceipt, EngineSettings, Retraction, VoteEngine};
pub use error::VoteError;
