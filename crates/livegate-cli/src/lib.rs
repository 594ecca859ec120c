//! livegate-cli: Session engine and trace replay for the `livegate` binary.
//!
//! The engine owns one liveness session, its camera and its feature source on
//! a dedicated thread; async callers drive it through a cloneable
//! [`engine::EngineHandle`].

pub mod config;
pub mod engine;
pub mod replay;

#[cfg(test)]
pub(crate) mod testutil;
