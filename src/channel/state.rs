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

//! Byte-level snapshot of the channel entity.
//!
//! [`ChannelState`] captures everything the state machine needs to
//! resume identically across restarts. The transport is deliberately
//! excluded: a reconnecting host re-runs the Noise handshake and the
//! `init` exchange.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use amplify::Slice32;
use bitcoin::{Script, Transaction};
use secp256k1::ecdsa::Signature;
use secp256k1::{PublicKey, SecretKey};

use super::channel::{
    CommitParams, Direction, Funding, Htlc, HtlcDirection, Lifecycle,
};
use super::keyset::{Keypair, LocalKeyset, RemoteKeyset};
use super::policy::{CommonParams, PeerParams};
use crate::derkey::SecretStorage;
use crate::onion::OnionPacket;
use crate::wire::encoding::{Error, WireDecode, WireEncode};
use crate::wire::{ActiveChannelId, ChannelId, HashLock, ShortChannelId, TempChannelId};

/// Everything the channel state machine persists. Produced by
/// [`super::Channel::snapshot`] and consumed by
/// [`super::Channel::restore`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ChannelState {
    pub stage: Lifecycle,
    pub direction: Direction,
    pub active_channel_id: ActiveChannelId,
    pub short_channel_id: Option<ShortChannelId>,
    pub compat_zero_vout: bool,
    pub funding: Option<Funding>,
    pub funding_sat: u64,
    pub feerate_per_kw: u32,
    pub local_keys: LocalKeyset,
    pub remote_keys: Option<RemoteKeyset>,
    pub storage_seed: Slice32,
    pub storage_index: u64,
    pub peer_storage: SecretStorage,
    pub peer_storage_index: u64,
    pub remote_pcp_unrevoked: Option<PublicKey>,
    pub remote_pcp_next: Option<PublicKey>,
    pub local_msat: u64,
    pub remote_msat: u64,
    pub offered_htlcs: BTreeMap<u64, Htlc>,
    pub received_htlcs: BTreeMap<u64, Htlc>,
    pub htlc_id_num: u64,
    pub commit_local: CommitParams,
    pub commit_remote: CommitParams,
    pub commitment_number_local: u64,
    pub commitment_number_remote: u64,
    pub obscuring_factor: u64,
    pub local_params: PeerParams,
    pub common_params: CommonParams,
    pub min_depth: u32,
    pub remote_node_id: Option<PublicKey>,
    pub shutdown_flags: u8,
    pub close_fee_sat: u64,
    pub shutdown_script_local: Option<Script>,
    pub shutdown_script_remote: Option<Script>,
    pub htlc_changed: u8,
    pub awaiting_revoke: bool,
    pub funding_locked_sent: bool,
    pub funding_locked_received: bool,
    pub remote_announcement_sigs: Option<(Signature, Signature)>,
}

impl ChannelState {
    /// Serializes the snapshot into bytes for the host's store.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.wire_serialize()
    }

    /// Restores a snapshot from bytes, requiring full consumption.
    pub fn from_bytes(data: impl AsRef<[u8]>) -> Result<ChannelState, Error> {
        ChannelState::wire_deserialize(data)
    }
}

// Snapshot-only codec impls for types which never travel on the wire
// themselves.

impl WireEncode for bool {
    fn wire_encode<E: Write>(&self, e: E) -> Result<usize, Error> {
        (*self as u8).wire_encode(e)
    }
}

impl WireDecode for bool {
    fn wire_decode<D: Read>(d: D) -> Result<Self, Error> {
        match u8::wire_decode(d)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::DataIntegrity(format!(
                "invalid boolean encoding {}",
                other
            ))),
        }
    }
}

impl<T: WireEncode> WireEncode for Option<T> {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        match self {
            None => false.wire_encode(&mut e),
            Some(value) => {
                Ok(true.wire_encode(&mut e)? + value.wire_encode(&mut e)?)
            }
        }
    }
}

impl<T: WireDecode> WireDecode for Option<T> {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(match bool::wire_decode(&mut d)? {
            false => None,
            true => Some(T::wire_decode(&mut d)?),
        })
    }
}

impl WireEncode for SecretKey {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        e.write_all(&self.secret_bytes())?;
        Ok(32)
    }
}

impl WireDecode for SecretKey {
    fn wire_decode<D: Read>(d: D) -> Result<Self, Error> {
        let bytes = <[u8; 32]>::wire_decode(d)?;
        SecretKey::from_slice(&bytes)
            .map_err(|err| Error::DataIntegrity(err.to_string()))
    }
}

impl WireEncode for Script {
    fn wire_encode<E: Write>(&self, e: E) -> Result<usize, Error> {
        self.to_bytes().wire_encode(e)
    }
}

impl WireDecode for Script {
    fn wire_decode<D: Read>(d: D) -> Result<Self, Error> {
        Vec::<u8>::wire_decode(d).map(Script::from)
    }
}

impl WireEncode for Transaction {
    fn wire_encode<E: Write>(&self, e: E) -> Result<usize, Error> {
        bitcoin::consensus::serialize(self).wire_encode(e)
    }
}

impl WireDecode for Transaction {
    fn wire_decode<D: Read>(d: D) -> Result<Self, Error> {
        let raw = Vec::<u8>::wire_decode(d)?;
        bitcoin::consensus::deserialize(&raw)
            .map_err(|err| Error::DataIntegrity(err.to_string()))
    }
}

impl WireEncode for (Signature, Signature) {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        Ok(self.0.wire_encode(&mut e)? + self.1.wire_encode(&mut e)?)
    }
}

impl WireDecode for (Signature, Signature) {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok((
            Signature::wire_decode(&mut d)?,
            Signature::wire_decode(&mut d)?,
        ))
    }
}

impl WireEncode for ActiveChannelId {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        match self {
            ActiveChannelId::Temporary(id) => {
                Ok(0u8.wire_encode(&mut e)? + id.wire_encode(&mut e)?)
            }
            ActiveChannelId::Final(id) => {
                Ok(1u8.wire_encode(&mut e)? + id.wire_encode(&mut e)?)
            }
        }
    }
}

impl WireDecode for ActiveChannelId {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(match u8::wire_decode(&mut d)? {
            0 => ActiveChannelId::Temporary(TempChannelId::wire_decode(
                &mut d,
            )?),
            1 => ActiveChannelId::Final(ChannelId::wire_decode(&mut d)?),
            other => {
                return Err(Error::DataIntegrity(format!(
                    "invalid channel id discriminant {}",
                    other
                )))
            }
        })
    }
}

impl WireEncode for Lifecycle {
    fn wire_encode<E: Write>(&self, e: E) -> Result<usize, Error> {
        (*self as u8).wire_encode(e)
    }
}

impl WireDecode for Lifecycle {
    fn wire_decode<D: Read>(d: D) -> Result<Self, Error> {
        let value = u8::wire_decode(d)?;
        Lifecycle::from_u8(value).ok_or_else(|| {
            Error::DataIntegrity(format!("invalid lifecycle stage {}", value))
        })
    }
}

impl WireEncode for Direction {
    fn wire_encode<E: Write>(&self, e: E) -> Result<usize, Error> {
        (matches!(self, Direction::Inbound) as u8).wire_encode(e)
    }
}

impl WireDecode for Direction {
    fn wire_decode<D: Read>(d: D) -> Result<Self, Error> {
        Ok(if bool::wire_decode(d)? {
            Direction::Inbound
        } else {
            Direction::Outbound
        })
    }
}

impl WireEncode for HtlcDirection {
    fn wire_encode<E: Write>(&self, e: E) -> Result<usize, Error> {
        (matches!(self, HtlcDirection::Received) as u8).wire_encode(e)
    }
}

impl WireDecode for HtlcDirection {
    fn wire_decode<D: Read>(d: D) -> Result<Self, Error> {
        Ok(if bool::wire_decode(d)? {
            HtlcDirection::Received
        } else {
            HtlcDirection::Offered
        })
    }
}

impl WireEncode for Htlc {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.direction.wire_encode(&mut e)?;
        len += self.id.wire_encode(&mut e)?;
        len += self.amount_msat.wire_encode(&mut e)?;
        len += self.cltv_expiry.wire_encode(&mut e)?;
        len += self.payment_hash.wire_encode(&mut e)?;
        len += self.onion_packet.wire_encode(&mut e)?;
        len += self.signature.wire_encode(&mut e)?;
        len += self.origin_short_channel_id.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for Htlc {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(Htlc {
            direction: HtlcDirection::wire_decode(&mut d)?,
            id: u64::wire_decode(&mut d)?,
            amount_msat: u64::wire_decode(&mut d)?,
            cltv_expiry: u32::wire_decode(&mut d)?,
            payment_hash: HashLock::wire_decode(&mut d)?,
            onion_packet: OnionPacket::wire_decode(&mut d)?,
            signature: Option::<Signature>::wire_decode(&mut d)?,
            origin_short_channel_id: u64::wire_decode(&mut d)?,
        })
    }
}

impl WireEncode for BTreeMap<u64, Htlc> {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = (self.len() as u16).wire_encode(&mut e)?;
        for (id, htlc) in self {
            len += id.wire_encode(&mut e)?;
            len += htlc.wire_encode(&mut e)?;
        }
        Ok(len)
    }
}

impl WireDecode for BTreeMap<u64, Htlc> {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let count = u16::wire_decode(&mut d)?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let id = u64::wire_decode(&mut d)?;
            map.insert(id, Htlc::wire_decode(&mut d)?);
        }
        Ok(map)
    }
}

impl WireEncode for CommitParams {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.accept_htlcs.wire_encode(&mut e)?;
        len += self.to_self_delay.wire_encode(&mut e)?;
        len += self.htlc_minimum_msat.wire_encode(&mut e)?;
        len += self.max_htlc_in_flight_msat.wire_encode(&mut e)?;
        len += self.dust_limit_sat.wire_encode(&mut e)?;
        len += self.last_signature.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for CommitParams {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(CommitParams {
            accept_htlcs: u16::wire_decode(&mut d)?,
            to_self_delay: u16::wire_decode(&mut d)?,
            htlc_minimum_msat: u64::wire_decode(&mut d)?,
            max_htlc_in_flight_msat: u64::wire_decode(&mut d)?,
            dust_limit_sat: u64::wire_decode(&mut d)?,
            last_signature: Option::<Signature>::wire_decode(&mut d)?,
        })
    }
}

impl WireEncode for PeerParams {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.dust_limit_satoshis.wire_encode(&mut e)?;
        len += self.max_htlc_value_in_flight_msat.wire_encode(&mut e)?;
        len += self.channel_reserve_satoshis.wire_encode(&mut e)?;
        len += self.htlc_minimum_msat.wire_encode(&mut e)?;
        len += self.to_self_delay.wire_encode(&mut e)?;
        len += self.max_accepted_htlcs.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for PeerParams {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(PeerParams {
            dust_limit_satoshis: u64::wire_decode(&mut d)?,
            max_htlc_value_in_flight_msat: u64::wire_decode(&mut d)?,
            channel_reserve_satoshis: u64::wire_decode(&mut d)?,
            htlc_minimum_msat: u64::wire_decode(&mut d)?,
            to_self_delay: u16::wire_decode(&mut d)?,
            max_accepted_htlcs: u16::wire_decode(&mut d)?,
        })
    }
}

impl WireEncode for CommonParams {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.feerate_per_kw.wire_encode(&mut e)?;
        len += self.minimum_depth.wire_encode(&mut e)?;
        len += self.announce_channel.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for CommonParams {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(CommonParams {
            feerate_per_kw: u32::wire_decode(&mut d)?,
            minimum_depth: u32::wire_decode(&mut d)?,
            announce_channel: bool::wire_decode(&mut d)?,
        })
    }
}

impl WireEncode for Keypair {
    fn wire_encode<E: Write>(&self, e: E) -> Result<usize, Error> {
        self.sk.wire_encode(e)
    }
}

impl WireDecode for Keypair {
    fn wire_decode<D: Read>(d: D) -> Result<Self, Error> {
        Ok(Keypair::from_secret(SecretKey::wire_decode(d)?))
    }
}

impl WireEncode for LocalKeyset {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.funding.wire_encode(&mut e)?;
        len += self.revocation_basepoint.wire_encode(&mut e)?;
        len += self.payment_basepoint.wire_encode(&mut e)?;
        len += self.delayed_payment_basepoint.wire_encode(&mut e)?;
        len += self.per_commitment.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for LocalKeyset {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(LocalKeyset {
            funding: Option::<Keypair>::wire_decode(&mut d)?,
            revocation_basepoint: Keypair::wire_decode(&mut d)?,
            payment_basepoint: Keypair::wire_decode(&mut d)?,
            delayed_payment_basepoint: Keypair::wire_decode(&mut d)?,
            per_commitment: Keypair::wire_decode(&mut d)?,
        })
    }
}

impl WireEncode for RemoteKeyset {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.funding_pubkey.wire_encode(&mut e)?;
        len += self.revocation_basepoint.wire_encode(&mut e)?;
        len += self.payment_basepoint.wire_encode(&mut e)?;
        len += self.delayed_payment_basepoint.wire_encode(&mut e)?;
        len += self.per_commitment_point.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for RemoteKeyset {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(RemoteKeyset {
            funding_pubkey: PublicKey::wire_decode(&mut d)?,
            revocation_basepoint: PublicKey::wire_decode(&mut d)?,
            payment_basepoint: PublicKey::wire_decode(&mut d)?,
            delayed_payment_basepoint: PublicKey::wire_decode(&mut d)?,
            per_commitment_point: PublicKey::wire_decode(&mut d)?,
        })
    }
}

impl WireEncode for Funding {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.txid.wire_encode(&mut e)?;
        len += self.output_index.wire_encode(&mut e)?;
        len += self.amount_sat.wire_encode(&mut e)?;
        len += self.redeem_script.wire_encode(&mut e)?;
        len += self.local_first.wire_encode(&mut e)?;
        len += self.funding_tx.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for Funding {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(Funding {
            txid: bitcoin::Txid::wire_decode(&mut d)?,
            output_index: u16::wire_decode(&mut d)?,
            amount_sat: u64::wire_decode(&mut d)?,
            redeem_script: Script::wire_decode(&mut d)?,
            local_first: bool::wire_decode(&mut d)?,
            funding_tx: Option::<Transaction>::wire_decode(&mut d)?,
        })
    }
}

impl WireEncode for ChannelState {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.stage.wire_encode(&mut e)?;
        len += self.direction.wire_encode(&mut e)?;
        len += self.active_channel_id.wire_encode(&mut e)?;
        len += self.short_channel_id.wire_encode(&mut e)?;
        len += self.compat_zero_vout.wire_encode(&mut e)?;
        len += self.funding.wire_encode(&mut e)?;
        len += self.funding_sat.wire_encode(&mut e)?;
        len += self.feerate_per_kw.wire_encode(&mut e)?;
        len += self.local_keys.wire_encode(&mut e)?;
        len += self.remote_keys.wire_encode(&mut e)?;
        len += self.storage_seed.wire_encode(&mut e)?;
        len += self.storage_index.wire_encode(&mut e)?;
        len += self.peer_storage.wire_encode(&mut e)?;
        len += self.peer_storage_index.wire_encode(&mut e)?;
        len += self.remote_pcp_unrevoked.wire_encode(&mut e)?;
        len += self.remote_pcp_next.wire_encode(&mut e)?;
        len += self.local_msat.wire_encode(&mut e)?;
        len += self.remote_msat.wire_encode(&mut e)?;
        len += self.offered_htlcs.wire_encode(&mut e)?;
        len += self.received_htlcs.wire_encode(&mut e)?;
        len += self.htlc_id_num.wire_encode(&mut e)?;
        len += self.commit_local.wire_encode(&mut e)?;
        len += self.commit_remote.wire_encode(&mut e)?;
        len += self.commitment_number_local.wire_encode(&mut e)?;
        len += self.commitment_number_remote.wire_encode(&mut e)?;
        len += self.obscuring_factor.wire_encode(&mut e)?;
        len += self.local_params.wire_encode(&mut e)?;
        len += self.common_params.wire_encode(&mut e)?;
        len += self.min_depth.wire_encode(&mut e)?;
        len += self.remote_node_id.wire_encode(&mut e)?;
        len += self.shutdown_flags.wire_encode(&mut e)?;
        len += self.close_fee_sat.wire_encode(&mut e)?;
        len += self.shutdown_script_local.wire_encode(&mut e)?;
        len += self.shutdown_script_remote.wire_encode(&mut e)?;
        len += self.htlc_changed.wire_encode(&mut e)?;
        len += self.awaiting_revoke.wire_encode(&mut e)?;
        len += self.funding_locked_sent.wire_encode(&mut e)?;
        len += self.funding_locked_received.wire_encode(&mut e)?;
        len += self.remote_announcement_sigs.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for ChannelState {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(ChannelState {
            stage: Lifecycle::wire_decode(&mut d)?,
            direction: Direction::wire_decode(&mut d)?,
            active_channel_id: ActiveChannelId::wire_decode(&mut d)?,
            short_channel_id: Option::<ShortChannelId>::wire_decode(&mut d)?,
            compat_zero_vout: bool::wire_decode(&mut d)?,
            funding: Option::<Funding>::wire_decode(&mut d)?,
            funding_sat: u64::wire_decode(&mut d)?,
            feerate_per_kw: u32::wire_decode(&mut d)?,
            local_keys: LocalKeyset::wire_decode(&mut d)?,
            remote_keys: Option::<RemoteKeyset>::wire_decode(&mut d)?,
            storage_seed: Slice32::wire_decode(&mut d)?,
            storage_index: u64::wire_decode(&mut d)?,
            peer_storage: SecretStorage::wire_decode(&mut d)?,
            peer_storage_index: u64::wire_decode(&mut d)?,
            remote_pcp_unrevoked: Option::<PublicKey>::wire_decode(&mut d)?,
            remote_pcp_next: Option::<PublicKey>::wire_decode(&mut d)?,
            local_msat: u64::wire_decode(&mut d)?,
            remote_msat: u64::wire_decode(&mut d)?,
            offered_htlcs: BTreeMap::<u64, Htlc>::wire_decode(&mut d)?,
            received_htlcs: BTreeMap::<u64, Htlc>::wire_decode(&mut d)?,
            htlc_id_num: u64::wire_decode(&mut d)?,
            commit_local: CommitParams::wire_decode(&mut d)?,
            commit_remote: CommitParams::wire_decode(&mut d)?,
            commitment_number_local: u64::wire_decode(&mut d)?,
            commitment_number_remote: u64::wire_decode(&mut d)?,
            obscuring_factor: u64::wire_decode(&mut d)?,
            local_params: PeerParams::wire_decode(&mut d)?,
            common_params: CommonParams::wire_decode(&mut d)?,
            min_depth: u32::wire_decode(&mut d)?,
            remote_node_id: Option::<PublicKey>::wire_decode(&mut d)?,
            shutdown_flags: u8::wire_decode(&mut d)?,
            close_fee_sat: u64::wire_decode(&mut d)?,
            shutdown_script_local: Option::<Script>::wire_decode(&mut d)?,
            shutdown_script_remote: Option::<Script>::wire_decode(&mut d)?,
            htlc_changed: u8::wire_decode(&mut d)?,
            awaiting_revoke: bool::wire_decode(&mut d)?,
            funding_locked_sent: bool::wire_decode(&mut d)?,
            funding_locked_received: bool::wire_decode(&mut d)?,
            remote_announcement_sigs: Option::<(Signature, Signature)>::wire_decode(&mut d)?,
        })
    }
}

#[cfg(test)]
mod test {
    use amplify::Wrapper;
    use secp256k1::SECP256K1;

    use super::*;

    fn sample_state() -> ChannelState {
        let sk = SecretKey::from_slice(&[0x42; 32]).unwrap();
        let pk = PublicKey::from_secret_key(SECP256K1, &sk);
        let mut offered = BTreeMap::new();
        offered.insert(0u64, Htlc {
            direction: HtlcDirection::Offered,
            id: 0,
            amount_msat: 50_000_000,
            cltv_expiry: 500_010,
            payment_hash: HashLock::default(),
            onion_packet: OnionPacket::default(),
            signature: None,
            origin_short_channel_id: 0,
        });
        ChannelState {
            stage: Lifecycle::Active,
            direction: Direction::Outbound,
            active_channel_id: ActiveChannelId::Final(
                ChannelId::from_inner(Slice32::from_inner([7; 32])),
            ),
            short_channel_id: ShortChannelId::new(500_000, 17, 0),
            compat_zero_vout: false,
            funding: None,
            funding_sat: 1_000_000,
            feerate_per_kw: 500,
            local_keys: LocalKeyset {
                funding: Some(Keypair::from_secret(sk)),
                revocation_basepoint: Keypair::from_secret(sk),
                payment_basepoint: Keypair::from_secret(sk),
                delayed_payment_basepoint: Keypair::from_secret(sk),
                per_commitment: Keypair::from_secret(sk),
            },
            remote_keys: Some(RemoteKeyset {
                funding_pubkey: pk,
                revocation_basepoint: pk,
                payment_basepoint: pk,
                delayed_payment_basepoint: pk,
                per_commitment_point: pk,
            }),
            storage_seed: Slice32::from_inner([0xAA; 32]),
            storage_index: crate::derkey::FIRST_INDEX - 3,
            peer_storage: SecretStorage::new(),
            peer_storage_index: crate::derkey::FIRST_INDEX - 3,
            remote_pcp_unrevoked: Some(pk),
            remote_pcp_next: Some(pk),
            local_msat: 850_000_000,
            remote_msat: 100_000_000,
            offered_htlcs: offered,
            received_htlcs: BTreeMap::new(),
            htlc_id_num: 1,
            commit_local: CommitParams::default(),
            commit_remote: CommitParams::default(),
            commitment_number_local: 2,
            commitment_number_remote: 2,
            obscuring_factor: 0x2bb038521914,
            local_params: PeerParams::default(),
            common_params: CommonParams::default(),
            min_depth: 3,
            remote_node_id: Some(pk),
            shutdown_flags: 0,
            close_fee_sat: 0,
            shutdown_script_local: None,
            shutdown_script_remote: None,
            htlc_changed: 0,
            awaiting_revoke: false,
            funding_locked_sent: true,
            funding_locked_received: true,
            remote_announcement_sigs: None,
        }
    }

    #[test]
    fn state_roundtrip() {
        let state = sample_state();
        let bytes = state.to_bytes();
        assert_eq!(ChannelState::from_bytes(&bytes).unwrap(), state);
    }

    #[test]
    fn truncated_state_rejected() {
        let state = sample_state();
        let bytes = state.to_bytes();
        let err =
            ChannelState::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(err.is_short_read());
    }
}
