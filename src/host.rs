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

//! The host capability: every effect the engine has on the outside
//! world goes through this trait, invoked synchronously inside the
//! engine call that caused it.
//!
//! All methods except [`Host::funding_key_request`] and
//! [`Host::add_htlc_received`] are notifications; the engine never
//! retains any argument past the call.

use bitcoin::Transaction;
use secp256k1::{PublicKey, SecretKey};

use crate::onion::HopData;
use crate::wire::{HashLock, HashPreimage, ShortChannelId};

/// Details of the funding transaction the host must watch for
/// confirmation.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FundingWait {
    /// The funding transaction, if this side built it (opener only).
    pub funding_tx: Option<Transaction>,

    /// Txid of the funding transaction.
    pub funding_txid: bitcoin::Txid,

    /// Confirmations required before `funding_locked` may be sent.
    pub min_depth: u32,
}

/// Notification payload of a received `update_add_htlc`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AddHtlcNotice {
    /// HTLC id assigned by the peer.
    pub id: u64,

    /// Payment hash of the HTLC.
    pub payment_hash: HashLock,

    /// Peeled onion instructions for this hop.
    pub hop: HopData,

    /// HTLC value in millisatoshi.
    pub amount_msat: u64,

    /// Expiry block height.
    pub cltv_expiry: u32,
}

/// Notification payload of a received `update_fulfill_htlc`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FulfillHtlcNotice {
    /// HTLC id being settled.
    pub id: u64,

    /// The disclosed payment preimage.
    pub preimage: HashPreimage,

    /// The channel the settled HTLC was forwarded from, zero when it
    /// originated locally.
    pub origin_short_channel_id: u64,
}

/// Notification payload of a completed mutual close.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ClosedNotice {
    /// The final `closing_signed` answer to deliver to the peer.
    pub reply: Vec<u8>,

    /// The fully signed closing transaction to broadcast.
    pub closing_tx: Transaction,
}

/// Host capability with one method per callback reason.
///
/// Default implementations make every notification a no-op so hosts
/// only spell out what they care about; the two decision points have no
/// defaults.
pub trait Host {
    /// A protocol failure occurred; the channel is terminal.
    fn error(&mut self, message: &str) {
        let _ = message;
    }

    /// The peer's `init` was received and accepted.
    fn init_received(&mut self, features: u8) {
        let _ = features;
    }

    /// The engine needs the funding keypair to proceed with
    /// establishment. This is the only callback expected to mutate
    /// engine state, by returning the key to install.
    fn funding_key_request(&mut self) -> Option<SecretKey>;

    /// The host must watch the funding transaction and call
    /// `funding_tx_confirmed` once it has `min_depth` confirmations.
    fn funding_tx_wait(&mut self, funding: FundingWait) {
        let _ = funding;
    }

    /// Channel establishment completed; normal operation available.
    fn established(&mut self, funding_txid: bitcoin::Txid) {
        let _ = funding_txid;
    }

    /// A valid `node_announcement` was received.
    fn node_announcement_received(
        &mut self,
        node_id: PublicKey,
        short_channel_id: Option<ShortChannelId>,
    ) {
        let _ = (node_id, short_channel_id);
    }

    /// A valid `announcement_signatures` was received.
    fn announcement_signatures_received(
        &mut self,
        short_channel_id: ShortChannelId,
    ) {
        let _ = short_channel_id;
    }

    /// An `update_add_htlc` arrived and is about to be processed.
    fn add_htlc_preview(&mut self) {}

    /// An `update_add_htlc` passed protocol checks. Returning `false`
    /// rejects it: the engine rolls every staged change back.
    fn add_htlc_received(&mut self, htlc: AddHtlcNotice) -> bool;

    /// An `update_fulfill_htlc` settled one of our offered HTLCs.
    fn fulfill_htlc_received(&mut self, fulfill: FulfillHtlcNotice) {
        let _ = fulfill;
    }

    /// A `revoke_and_ack` concluded an update round; `settled` reports
    /// whether an outgoing fulfillment finished with it.
    fn htlc_changed(&mut self, settled: bool) {
        let _ = settled;
    }

    /// Mutual close completed.
    fn closed(&mut self, close: ClosedNotice) {
        let _ = close;
    }

    /// The engine asks for these bytes to be delivered to the peer.
    fn send_message(&mut self, message: Vec<u8>) {
        let _ = message;
    }

    /// A `commitment_signed` was verified; `settled` reports whether an
    /// incoming fulfillment finished with it.
    fn commitment_signed_received(&mut self, settled: bool) {
        let _ = settled;
    }
}
