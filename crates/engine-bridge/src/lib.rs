//! Bridge between matches and external move engines.
//!
//! Engines speak the BGS protocol: one JSON object per line over the
//! process's stdin/stdout. [`bot::EngineBot`] drives a seat with it,
//! [`eval::EvalStream`] keeps the per-ply evaluation history observers
//! subscribe to, and [`reference`] is a greedy engine speaking the same
//! protocol.

pub mod bot;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod protocol;
pub mod reference;

pub use config::{EngineConfig, EngineSource};
pub use error::BridgeError;
