//! Data structures shared across the devnet channel-handshake orchestration.
//!
//! Nothing in this crate talks to a chain or a relayer. It describes what a running devnet
//! looks like ([`runtime::DevnetRuntime`]), what a channel is established between
//! ([`endpoint::Endpoint`], [`path::Path`]), the normalized shape every chain backend reports
//! events in ([`event::TxEvent`]) and the knobs of every wait loop ([`config`]).
#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(unused_import_braces, rust_2018_idioms)]

pub mod chain;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod msgs;
pub mod path;
pub mod relayer;
pub mod runtime;
