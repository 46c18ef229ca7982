//! Core channel/mode, server-linkage, and account+SASL engine for an ircd.
//!
//! This crate implements the distributed-state-machine core of an IRC
//! server: channel membership and modes, the mode-application pipeline,
//! server-to-server linkage lifecycle, and the account/SASL pipeline.
//!
//! Transport framing, the numeric-reply table, the on-disk database engine,
//! and process bootstrap are deliberately out of scope — this crate
//! consumes them through the traits in [`pool`] and [`db`].

pub mod account;
pub mod channel;
pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod linkage;
pub mod matcher;
pub mod mode;
pub mod pool;
pub mod sasl;
pub mod telemetry;

pub use error::{AccountError, ChannelError, LinkError, ModeError, SaslError};
