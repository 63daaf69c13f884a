//! Channel-handshake orchestration for a multi-chain IBC devnet.
//!
//! A devnet runs chains with native IBC support, a hub chain bridging chains without it
//! ("virtual" chains) into IBC, and relayer processes carrying messages between them. This crate
//! sets the relayers up ([`devnet::Devnet::setup_relayers`]) and drives the four-message channel
//! handshake between two endpoints ([`devnet::Devnet::create_channel`]):
//!
//! - [`chain`]: event, connection and transaction surfaces of a running chain, with clients for
//!   Tendermint RPC and EVM JSON-RPC;
//! - [`handshake`]: per-endpoint controllers issuing handshake messages and observing their
//!   effects;
//! - [`path`]: resolution of the client and connection identifiers a channel travels over;
//! - [`relayer`]: the relayer process surface and the coordination of which relayer serves which
//!   chain pair;
//! - [`flow`]: the handshake sequence for each combination of native and virtual endpoints.
#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(unused_import_braces, rust_2018_idioms)]

pub mod chain;
pub mod devnet;
pub mod error;
pub mod event;
pub mod flow;
pub mod handshake;
pub mod path;
pub mod poll;
pub mod relayer;
