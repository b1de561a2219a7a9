// Lightning Network peer engine implementing the BOLT channel protocols.
//
// Written in 2022 by the lnpeer contributors.
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

//! Per-peer Lightning Network channel engine.
//!
//! The crate drives a single channel with a single counterparty through
//! its whole life: the encrypted transport handshake, `init` feature
//! exchange, channel establishment, normal HTLC operation and mutual
//! close. It is transport- and storage-agnostic: the host feeds it
//! decrypted message bytes through [`Channel::recv`], initiates
//! actions through the `compose_*` entry points, and observes effects
//! through the [`host::Host`] capability. Blockchain interaction is
//! reduced to a single suspension point: the host is asked to watch the
//! funding transaction and later calls
//! [`Channel::funding_tx_confirmed`].

#![recursion_limit = "256"]
// Coding conventions
#![deny(
    non_upper_case_globals,
    non_camel_case_types,
    non_snake_case,
    unused_mut,
    unused_imports,
    dead_code
)]

#[macro_use]
extern crate amplify;

pub mod channel;
pub mod commitment;
pub mod derkey;
pub mod host;
pub mod noise;
pub mod node;
pub mod onion;
pub mod wire;

pub use channel::{Channel, Direction, Lifecycle};
pub use host::Host;
pub use node::Node;

use bitcoin::hashes::{sha256, Hash};

/// Upper bound on simultaneously pending HTLCs a single channel tracks.
pub const HTLC_MAX: usize = 6;

/// Computes the payment hash for a payment preimage.
#[inline]
pub fn preimage_hash(preimage: &[u8; 32]) -> [u8; 32] {
    sha256::Hash::hash(preimage).into_inner()
}
