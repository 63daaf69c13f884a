//! In-memory stand-ins for the chains, relayers and runtime store a devnet handshake talks to.
//!
//! [`fixtures::DevnetFixture`] wires them into a small devnet with a hub, two native chains and
//! one virtual chain.
#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(unused_import_braces, rust_2018_idioms)]

pub mod chains;
pub mod fixtures;
pub mod relayer;
