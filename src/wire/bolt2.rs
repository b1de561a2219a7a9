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

//! Channel establishment, operation and closing messages (BOLT-2).

use std::io::{Read, Write};

use bitcoin::{Script, Txid};
use secp256k1::ecdsa::Signature;
use secp256k1::PublicKey;

use super::encoding::{Error, WireDecode, WireEncode};
use super::types::{ChannelId, HashLock, HashPreimage, TempChannelId};
use crate::onion::OnionPacket;

/// This message contains information about a node and indicates its
/// desire to set up a new channel. This is the first step toward
/// creating the funding transaction and both versions of the commitment
/// transaction.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display(
    "open_channel({temporary_channel_id}, {funding_satoshis}, {push_msat}, \
     ...)"
)]
pub struct OpenChannel {
    /// A temporary channel ID, until the funding outpoint is announced.
    pub temporary_channel_id: TempChannelId,

    /// The channel value.
    pub funding_satoshis: u64,

    /// The amount to push to the counterparty as part of the open, in
    /// millisatoshi.
    pub push_msat: u64,

    /// The threshold below which outputs on transactions broadcast by
    /// sender will be omitted.
    pub dust_limit_satoshis: u64,

    /// The maximum inbound HTLC value in flight towards sender, in
    /// millisatoshi.
    pub max_htlc_value_in_flight_msat: u64,

    /// The minimum value unencumbered by HTLCs for the counterparty to
    /// keep in the channel.
    pub channel_reserve_satoshis: u64,

    /// The minimum HTLC size incoming to sender, in millisatoshi.
    pub htlc_minimum_msat: u64,

    /// The fee rate per 1000-weight of sender generated transactions,
    /// until updated by `update_fee`.
    pub feerate_per_kw: u32,

    /// The number of blocks which the counterparty will have to wait to
    /// claim on-chain funds if they broadcast a commitment transaction.
    pub to_self_delay: u16,

    /// The maximum number of inbound HTLCs towards sender.
    pub max_accepted_htlcs: u16,

    /// The sender's key controlling the funding transaction.
    pub funding_pubkey: PublicKey,

    /// Used to derive a revocation key for transactions broadcast by
    /// counterparty.
    pub revocation_basepoint: PublicKey,

    /// A payment key to sender for transactions broadcast by
    /// counterparty.
    pub payment_basepoint: PublicKey,

    /// Used to derive a payment key to sender for transactions
    /// broadcast by sender.
    pub delayed_payment_basepoint: PublicKey,

    /// The first to-be-broadcast-by-sender transaction's per-commitment
    /// point.
    pub first_per_commitment_point: PublicKey,
}

impl WireEncode for OpenChannel {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.temporary_channel_id.wire_encode(&mut e)?;
        len += self.funding_satoshis.wire_encode(&mut e)?;
        len += self.push_msat.wire_encode(&mut e)?;
        len += self.dust_limit_satoshis.wire_encode(&mut e)?;
        len += self.max_htlc_value_in_flight_msat.wire_encode(&mut e)?;
        len += self.channel_reserve_satoshis.wire_encode(&mut e)?;
        len += self.htlc_minimum_msat.wire_encode(&mut e)?;
        len += self.feerate_per_kw.wire_encode(&mut e)?;
        len += self.to_self_delay.wire_encode(&mut e)?;
        len += self.max_accepted_htlcs.wire_encode(&mut e)?;
        len += self.funding_pubkey.wire_encode(&mut e)?;
        len += self.revocation_basepoint.wire_encode(&mut e)?;
        len += self.payment_basepoint.wire_encode(&mut e)?;
        len += self.delayed_payment_basepoint.wire_encode(&mut e)?;
        len += self.first_per_commitment_point.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for OpenChannel {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(OpenChannel {
            temporary_channel_id: TempChannelId::wire_decode(&mut d)?,
            funding_satoshis: u64::wire_decode(&mut d)?,
            push_msat: u64::wire_decode(&mut d)?,
            dust_limit_satoshis: u64::wire_decode(&mut d)?,
            max_htlc_value_in_flight_msat: u64::wire_decode(&mut d)?,
            channel_reserve_satoshis: u64::wire_decode(&mut d)?,
            htlc_minimum_msat: u64::wire_decode(&mut d)?,
            feerate_per_kw: u32::wire_decode(&mut d)?,
            to_self_delay: u16::wire_decode(&mut d)?,
            max_accepted_htlcs: u16::wire_decode(&mut d)?,
            funding_pubkey: PublicKey::wire_decode(&mut d)?,
            revocation_basepoint: PublicKey::wire_decode(&mut d)?,
            payment_basepoint: PublicKey::wire_decode(&mut d)?,
            delayed_payment_basepoint: PublicKey::wire_decode(&mut d)?,
            first_per_commitment_point: PublicKey::wire_decode(&mut d)?,
        })
    }
}

/// Sent by the receiver of an `open_channel` message, accepting the new
/// channel.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("accept_channel({temporary_channel_id}, {minimum_depth}, ...)")]
pub struct AcceptChannel {
    /// The same temporary channel ID as in `open_channel`.
    pub temporary_channel_id: TempChannelId,

    /// The threshold below which outputs on transactions broadcast by
    /// sender will be omitted.
    pub dust_limit_satoshis: u64,

    /// The maximum inbound HTLC value in flight towards sender, in
    /// millisatoshi.
    pub max_htlc_value_in_flight_msat: u64,

    /// The minimum value unencumbered by HTLCs for the counterparty to
    /// keep in the channel.
    pub channel_reserve_satoshis: u64,

    /// The minimum HTLC size incoming to sender, in millisatoshi.
    pub htlc_minimum_msat: u64,

    /// The number of confirmations the funding transaction needs before
    /// the channel is usable.
    pub minimum_depth: u32,

    /// The number of blocks which the counterparty will have to wait to
    /// claim on-chain funds if they broadcast a commitment transaction.
    pub to_self_delay: u16,

    /// The maximum number of inbound HTLCs towards sender.
    pub max_accepted_htlcs: u16,

    /// The sender's key controlling the funding transaction.
    pub funding_pubkey: PublicKey,

    /// Used to derive a revocation key for transactions broadcast by
    /// counterparty.
    pub revocation_basepoint: PublicKey,

    /// A payment key to sender for transactions broadcast by
    /// counterparty.
    pub payment_basepoint: PublicKey,

    /// Used to derive a payment key to sender for transactions
    /// broadcast by sender.
    pub delayed_payment_basepoint: PublicKey,

    /// The first to-be-broadcast-by-sender transaction's per-commitment
    /// point.
    pub first_per_commitment_point: PublicKey,
}

impl WireEncode for AcceptChannel {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.temporary_channel_id.wire_encode(&mut e)?;
        len += self.dust_limit_satoshis.wire_encode(&mut e)?;
        len += self.max_htlc_value_in_flight_msat.wire_encode(&mut e)?;
        len += self.channel_reserve_satoshis.wire_encode(&mut e)?;
        len += self.htlc_minimum_msat.wire_encode(&mut e)?;
        len += self.minimum_depth.wire_encode(&mut e)?;
        len += self.to_self_delay.wire_encode(&mut e)?;
        len += self.max_accepted_htlcs.wire_encode(&mut e)?;
        len += self.funding_pubkey.wire_encode(&mut e)?;
        len += self.revocation_basepoint.wire_encode(&mut e)?;
        len += self.payment_basepoint.wire_encode(&mut e)?;
        len += self.delayed_payment_basepoint.wire_encode(&mut e)?;
        len += self.first_per_commitment_point.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for AcceptChannel {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(AcceptChannel {
            temporary_channel_id: TempChannelId::wire_decode(&mut d)?,
            dust_limit_satoshis: u64::wire_decode(&mut d)?,
            max_htlc_value_in_flight_msat: u64::wire_decode(&mut d)?,
            channel_reserve_satoshis: u64::wire_decode(&mut d)?,
            htlc_minimum_msat: u64::wire_decode(&mut d)?,
            minimum_depth: u32::wire_decode(&mut d)?,
            to_self_delay: u16::wire_decode(&mut d)?,
            max_accepted_htlcs: u16::wire_decode(&mut d)?,
            funding_pubkey: PublicKey::wire_decode(&mut d)?,
            revocation_basepoint: PublicKey::wire_decode(&mut d)?,
            payment_basepoint: PublicKey::wire_decode(&mut d)?,
            delayed_payment_basepoint: PublicKey::wire_decode(&mut d)?,
            first_per_commitment_point: PublicKey::wire_decode(&mut d)?,
        })
    }
}

/// Sent by the channel opener and describes the funding outpoint,
/// together with the opener's signature for the acceptor's first
/// commitment transaction.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display(
    "funding_created({temporary_channel_id}, \
     {funding_txid}:{funding_output_index}, ...signature)"
)]
pub struct FundingCreated {
    /// The same temporary channel ID as in `open_channel`.
    pub temporary_channel_id: TempChannelId,

    /// The txid of the funding transaction.
    pub funding_txid: Txid,

    /// The output index of the funding output within the funding
    /// transaction.
    pub funding_output_index: u16,

    /// The signature of the funder for the acceptor's version of the
    /// initial commitment transaction.
    pub signature: Signature,
}

impl WireEncode for FundingCreated {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.temporary_channel_id.wire_encode(&mut e)?;
        len += self.funding_txid.wire_encode(&mut e)?;
        len += self.funding_output_index.wire_encode(&mut e)?;
        len += self.signature.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for FundingCreated {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(FundingCreated {
            temporary_channel_id: TempChannelId::wire_decode(&mut d)?,
            funding_txid: Txid::wire_decode(&mut d)?,
            funding_output_index: u16::wire_decode(&mut d)?,
            signature: Signature::wire_decode(&mut d)?,
        })
    }
}

/// Sent by the channel acceptor, carrying its signature for the
/// opener's first commitment transaction. From this point on the
/// channel is referred to by its permanent id.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("funding_signed({channel_id}, ...signature)")]
pub struct FundingSigned {
    /// The permanent channel id, derived from the funding outpoint.
    pub channel_id: ChannelId,

    /// The signature of the acceptor for the funder's version of the
    /// initial commitment transaction.
    pub signature: Signature,
}

impl WireEncode for FundingSigned {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.channel_id.wire_encode(&mut e)?;
        len += self.signature.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for FundingSigned {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(FundingSigned {
            channel_id: ChannelId::wire_decode(&mut d)?,
            signature: Signature::wire_decode(&mut d)?,
        })
    }
}

/// Sent by both parties once the funding transaction has reached the
/// required depth, unlocking normal operation.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("funding_locked({channel_id}, {next_per_commitment_point})")]
pub struct FundingLocked {
    /// The permanent channel id.
    pub channel_id: ChannelId,

    /// The per-commitment point to be used for the sender's next
    /// commitment transaction.
    pub next_per_commitment_point: PublicKey,
}

impl WireEncode for FundingLocked {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.channel_id.wire_encode(&mut e)?;
        len += self.next_per_commitment_point.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for FundingLocked {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(FundingLocked {
            channel_id: ChannelId::wire_decode(&mut d)?,
            next_per_commitment_point: PublicKey::wire_decode(&mut d)?,
        })
    }
}

/// Initiates (or answers) a cooperative close, committing to the
/// scriptpubkey the sender wants to be paid to.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("shutdown({channel_id}, ...)")]
pub struct Shutdown {
    /// The channel being closed.
    pub channel_id: ChannelId,

    /// The destination of the sender's funds within the closing
    /// transaction.
    pub scriptpubkey: Script,
}

impl WireEncode for Shutdown {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.channel_id.wire_encode(&mut e)?;
        len += self.scriptpubkey.to_bytes().wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for Shutdown {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(Shutdown {
            channel_id: ChannelId::wire_decode(&mut d)?,
            scriptpubkey: Script::from(Vec::<u8>::wire_decode(&mut d)?),
        })
    }
}

/// Fee negotiation round of the cooperative close: the sender signs the
/// closing transaction at the proposed fee.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("closing_signed({channel_id}, {fee_satoshis}, ...signature)")]
pub struct ClosingSigned {
    /// The channel being closed.
    pub channel_id: ChannelId,

    /// The proposed total fee of the closing transaction.
    pub fee_satoshis: u64,

    /// The sender's signature for the closing transaction at that fee.
    pub signature: Signature,
}

impl WireEncode for ClosingSigned {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.channel_id.wire_encode(&mut e)?;
        len += self.fee_satoshis.wire_encode(&mut e)?;
        len += self.signature.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for ClosingSigned {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(ClosingSigned {
            channel_id: ChannelId::wire_decode(&mut d)?,
            fee_satoshis: u64::wire_decode(&mut d)?,
            signature: Signature::wire_decode(&mut d)?,
        })
    }
}

/// Offers a new HTLC to the counterparty.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display(
    "update_add_htlc({channel_id}, {htlc_id}, {amount_msat}, \
     {payment_hash}, {cltv_expiry}, ...)"
)]
pub struct UpdateAddHtlc {
    /// The channel carrying the HTLC.
    pub channel_id: ChannelId,

    /// Sender-assigned HTLC id, monotonically increasing from 0 per
    /// direction.
    pub htlc_id: u64,

    /// The HTLC value in millisatoshi.
    pub amount_msat: u64,

    /// The payment hash locking the HTLC.
    pub payment_hash: HashLock,

    /// The expiry height after which the sender may time the HTLC out
    /// on-chain.
    pub cltv_expiry: u32,

    /// The onion routing packet with forwarding instructions.
    pub onion_routing_packet: OnionPacket,
}

impl WireEncode for UpdateAddHtlc {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.channel_id.wire_encode(&mut e)?;
        len += self.htlc_id.wire_encode(&mut e)?;
        len += self.amount_msat.wire_encode(&mut e)?;
        len += self.payment_hash.wire_encode(&mut e)?;
        len += self.cltv_expiry.wire_encode(&mut e)?;
        len += self.onion_routing_packet.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for UpdateAddHtlc {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(UpdateAddHtlc {
            channel_id: ChannelId::wire_decode(&mut d)?,
            htlc_id: u64::wire_decode(&mut d)?,
            amount_msat: u64::wire_decode(&mut d)?,
            payment_hash: HashLock::wire_decode(&mut d)?,
            cltv_expiry: u32::wire_decode(&mut d)?,
            onion_routing_packet: OnionPacket::wire_decode(&mut d)?,
        })
    }
}

/// Settles an incoming HTLC by disclosing its payment preimage.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("update_fulfill_htlc({channel_id}, {htlc_id}, ...)")]
pub struct UpdateFulfillHtlc {
    /// The channel carrying the HTLC.
    pub channel_id: ChannelId,

    /// The id the HTLC was added under.
    pub htlc_id: u64,

    /// The preimage hashing to the HTLC payment hash.
    pub payment_preimage: HashPreimage,
}

impl WireEncode for UpdateFulfillHtlc {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.channel_id.wire_encode(&mut e)?;
        len += self.htlc_id.wire_encode(&mut e)?;
        len += self.payment_preimage.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for UpdateFulfillHtlc {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(UpdateFulfillHtlc {
            channel_id: ChannelId::wire_decode(&mut d)?,
            htlc_id: u64::wire_decode(&mut d)?,
            payment_preimage: HashPreimage::wire_decode(&mut d)?,
        })
    }
}

/// Removes an incoming HTLC with an encrypted failure reason.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("update_fail_htlc({channel_id}, {htlc_id}, ...)")]
pub struct UpdateFailHtlc {
    /// The channel carrying the HTLC.
    pub channel_id: ChannelId,

    /// The id the HTLC was added under.
    pub htlc_id: u64,

    /// Opaque, onion-encrypted failure reason for the origin node.
    pub reason: Vec<u8>,
}

impl WireEncode for UpdateFailHtlc {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.channel_id.wire_encode(&mut e)?;
        len += self.htlc_id.wire_encode(&mut e)?;
        len += self.reason.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for UpdateFailHtlc {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(UpdateFailHtlc {
            channel_id: ChannelId::wire_decode(&mut d)?,
            htlc_id: u64::wire_decode(&mut d)?,
            reason: Vec::<u8>::wire_decode(&mut d)?,
        })
    }
}

/// Removes an incoming HTLC whose onion packet could not be parsed.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display(
    "update_fail_malformed_htlc({channel_id}, {htlc_id}, {failure_code})"
)]
pub struct UpdateFailMalformedHtlc {
    /// The channel carrying the HTLC.
    pub channel_id: ChannelId,

    /// The id the HTLC was added under.
    pub htlc_id: u64,

    /// SHA-256 of the onion blob that could not be processed.
    pub sha256_of_onion: [u8; 32],

    /// The BADONION failure code.
    pub failure_code: u16,
}

impl WireEncode for UpdateFailMalformedHtlc {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.channel_id.wire_encode(&mut e)?;
        len += self.htlc_id.wire_encode(&mut e)?;
        len += self.sha256_of_onion.wire_encode(&mut e)?;
        len += self.failure_code.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for UpdateFailMalformedHtlc {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(UpdateFailMalformedHtlc {
            channel_id: ChannelId::wire_decode(&mut d)?,
            htlc_id: u64::wire_decode(&mut d)?,
            sha256_of_onion: <[u8; 32]>::wire_decode(&mut d)?,
            failure_code: u16::wire_decode(&mut d)?,
        })
    }
}

/// Commits to the current set of staged updates: carries the funding
/// signature for the counterparty's next commitment transaction plus
/// one signature per non-dust HTLC second-tier transaction on it.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("commitment_signed({channel_id}, {htlc_signatures:?}, ...)")]
pub struct CommitmentSigned {
    /// The channel the commitment belongs to.
    pub channel_id: ChannelId,

    /// The funding-input signature for the counterparty's commitment
    /// transaction.
    pub signature: Signature,

    /// Signatures for the HTLC-timeout/HTLC-success transactions
    /// spending the non-dust HTLC outputs of that commitment, in
    /// BIP-69 output order.
    pub htlc_signatures: Vec<Signature>,
}

impl WireEncode for CommitmentSigned {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.channel_id.wire_encode(&mut e)?;
        len += self.signature.wire_encode(&mut e)?;
        len += (self.htlc_signatures.len() as u16).wire_encode(&mut e)?;
        for sig in &self.htlc_signatures {
            len += sig.wire_encode(&mut e)?;
        }
        Ok(len)
    }
}

impl WireDecode for CommitmentSigned {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let channel_id = ChannelId::wire_decode(&mut d)?;
        let signature = Signature::wire_decode(&mut d)?;
        let num_htlcs = u16::wire_decode(&mut d)?;
        let mut htlc_signatures = Vec::with_capacity(num_htlcs as usize);
        for _ in 0..num_htlcs {
            htlc_signatures.push(Signature::wire_decode(&mut d)?);
        }
        Ok(CommitmentSigned {
            channel_id,
            signature,
            htlc_signatures,
        })
    }
}

/// Revokes the previous commitment by disclosing its per-commitment
/// secret and announces the next per-commitment point.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("revoke_and_ack({channel_id}, ..., {next_per_commitment_point})")]
pub struct RevokeAndAck {
    /// The channel the revocation belongs to.
    pub channel_id: ChannelId,

    /// The secret of the revoked (previous) commitment.
    pub per_commitment_secret: [u8; 32],

    /// The per-commitment point for the sender's next commitment.
    pub next_per_commitment_point: PublicKey,
}

impl WireEncode for RevokeAndAck {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.channel_id.wire_encode(&mut e)?;
        len += self.per_commitment_secret.wire_encode(&mut e)?;
        len += self.next_per_commitment_point.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for RevokeAndAck {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(RevokeAndAck {
            channel_id: ChannelId::wire_decode(&mut d)?,
            per_commitment_secret: <[u8; 32]>::wire_decode(&mut d)?,
            next_per_commitment_point: PublicKey::wire_decode(&mut d)?,
        })
    }
}

/// Proposes a new commitment fee rate. Only the channel opener may send
/// it.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[display("update_fee({channel_id}, {feerate_per_kw})")]
pub struct UpdateFee {
    /// The channel whose fee rate changes.
    pub channel_id: ChannelId,

    /// The new fee rate in satoshi per 1000-weight.
    pub feerate_per_kw: u32,
}

impl WireEncode for UpdateFee {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.channel_id.wire_encode(&mut e)?;
        len += self.feerate_per_kw.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for UpdateFee {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(UpdateFee {
            channel_id: ChannelId::wire_decode(&mut d)?,
            feerate_per_kw: u32::wire_decode(&mut d)?,
        })
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;
    use crate::wire::Messages;

    fn pk(hex: &str) -> PublicKey {
        PublicKey::from_str(hex).unwrap()
    }

    fn sample_open_channel() -> OpenChannel {
        OpenChannel {
            temporary_channel_id: TempChannelId::random(),
            funding_satoshis: 1_000_000,
            push_msat: 100_000_000,
            dust_limit_satoshis: 546,
            max_htlc_value_in_flight_msat: 500_000_000,
            channel_reserve_satoshis: 10_000,
            htlc_minimum_msat: 1_000,
            feerate_per_kw: 500,
            to_self_delay: 144,
            max_accepted_htlcs: 6,
            funding_pubkey: pk("023da092f6980e58d2c037173180e9a465476026ee50f96695963e8efe436f54eb"),
            revocation_basepoint: pk("030e9f7b623d2ccc7c9bd44d66d5ce21ce504c0acf6385a132cec6d3c39fa711c1"),
            payment_basepoint: pk("034f355bdcb7cc0af728ef3cceb9615d90684bb5b2ca5f859ab0f0b704075871aa"),
            delayed_payment_basepoint: pk("032c0b7cf95324a07d05398b240174dc0c2be444d96b159aa6c7f7b1e668680991"),
            first_per_commitment_point: pk("025f7117a78150fe2ef97db7cfc83bd57b2e2c0d0dd25eaf467a4a1c2a45ce1486"),
        }
    }

    #[test]
    fn open_channel_roundtrip() {
        let msg = sample_open_channel();
        let encoded = msg.wire_serialize();
        // 32 + 6*8 + 4 + 2*2 + 5*33 = 253 bytes of payload
        assert_eq!(encoded.len(), 253);
        assert_eq!(OpenChannel::wire_deserialize(&encoded).unwrap(), msg);
    }

    #[test]
    fn open_channel_via_messages() {
        let msg = Messages::OpenChannel(sample_open_channel());
        let encoded = msg.serialize();
        assert_eq!(&encoded[..2], &[0x00, 0x20]);
        assert_eq!(Messages::deserialize(&encoded).unwrap(), msg);
    }

    #[test]
    fn commitment_signed_roundtrip() {
        let sig = Signature::from_compact(&[0x42u8; 64]).unwrap();
        let msg = CommitmentSigned {
            channel_id: ChannelId::default(),
            signature: sig,
            htlc_signatures: vec![sig, sig],
        };
        let encoded = msg.wire_serialize();
        assert_eq!(encoded.len(), 32 + 64 + 2 + 2 * 64);
        assert_eq!(CommitmentSigned::wire_deserialize(&encoded).unwrap(), msg);
    }

    #[test]
    fn shutdown_roundtrip() {
        let msg = Shutdown {
            channel_id: ChannelId::default(),
            scriptpubkey: Script::from(vec![0x00, 0x14, 0xab, 0xcd]),
        };
        let encoded = msg.wire_serialize();
        assert_eq!(Shutdown::wire_deserialize(&encoded).unwrap(), msg);
    }

    #[test]
    fn truncated_message_is_short_read() {
        let msg = sample_open_channel();
        let encoded = msg.wire_serialize();
        let err =
            OpenChannel::wire_deserialize(&encoded[..100]).unwrap_err();
        assert!(err.is_short_read());
    }
}
