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

//! Opaque onion routing adapter.
//!
//! The engine does not construct or peel Sphinx packets itself; it
//! carries them as opaque [`OnionPacket`] blobs inside
//! `update_add_htlc` and hands them to a host-provided [`OnionReader`]
//! to learn whether an incoming HTLC terminates here or should be
//! forwarded.

use std::fmt::{self, Debug, Display, Formatter};
use std::io::{Read, Write};

use secp256k1::SecretKey;

use crate::wire::encoding::{Error, WireDecode, WireEncode};

/// Size of the onion routing packet carried by `update_add_htlc`:
/// version byte, 33-byte ephemeral key, 1300 bytes of hop payload and a
/// 32-byte HMAC.
pub const ONION_PACKET_LEN: usize = 1366;

/// Opaque Sphinx packet with forwarding instructions, carried verbatim.
#[derive(Clone)]
pub struct OnionPacket(Box<[u8; ONION_PACKET_LEN]>);

impl OnionPacket {
    /// Wraps raw packet bytes.
    pub fn from_bytes(bytes: [u8; ONION_PACKET_LEN]) -> Self {
        OnionPacket(Box::new(bytes))
    }

    /// Returns the raw packet bytes.
    pub fn as_bytes(&self) -> &[u8; ONION_PACKET_LEN] {
        &self.0
    }
}

impl Default for OnionPacket {
    fn default() -> Self {
        OnionPacket(Box::new([0u8; ONION_PACKET_LEN]))
    }
}

impl PartialEq for OnionPacket {
    fn eq(&self, other: &Self) -> bool {
        self.0[..] == other.0[..]
    }
}

impl Eq for OnionPacket {}

impl Debug for OnionPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "OnionPacket(version {}, ...)", self.0[0])
    }
}

impl Display for OnionPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "onion(...)")
    }
}

impl WireEncode for OnionPacket {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        e.write_all(&self.0[..])?;
        Ok(ONION_PACKET_LEN)
    }
}

impl WireDecode for OnionPacket {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = Box::new([0u8; ONION_PACKET_LEN]);
        d.read_exact(&mut buf[..])?;
        Ok(OnionPacket(buf))
    }
}

/// Result of peeling one layer of an onion packet: where the payment
/// goes next.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct HopData {
    /// `true` when this node is the final recipient.
    pub is_exit: bool,

    /// Channel to forward through when not the final hop.
    pub short_channel_id: u64,

    /// `amount_msat` for the forwarded `update_add_htlc`.
    pub amt_to_forward: u64,

    /// `cltv_expiry` for the forwarded `update_add_htlc`.
    pub outgoing_cltv_value: u32,
}

/// Capability for peeling onion packets, implemented outside of the
/// engine by an actual Sphinx library.
pub trait OnionReader {
    /// Peels the outer layer of `packet` using the node key, returning
    /// the hop instructions and the packet to forward to the next hop.
    fn read_packet(
        &self,
        node_key: &SecretKey,
        packet: &OnionPacket,
    ) -> Option<(HopData, OnionPacket)>;
}

/// Reader used where no onion library is wired in: treats every packet
/// as terminating at this node.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ExitOnionReader;

impl OnionReader for ExitOnionReader {
    fn read_packet(
        &self,
        _node_key: &SecretKey,
        packet: &OnionPacket,
    ) -> Option<(HopData, OnionPacket)> {
        Some((
            HopData {
                is_exit: true,
                short_channel_id: 0,
                amt_to_forward: 0,
                outgoing_cltv_value: 0,
            },
            packet.clone(),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn onion_packet_roundtrip() {
        let mut raw = [0u8; ONION_PACKET_LEN];
        raw[0] = 0;
        raw[1] = 0x02;
        raw[ONION_PACKET_LEN - 1] = 0xee;
        let packet = OnionPacket::from_bytes(raw);
        let encoded = packet.wire_serialize();
        assert_eq!(encoded.len(), ONION_PACKET_LEN);
        assert_eq!(OnionPacket::wire_deserialize(&encoded).unwrap(), packet);
    }

    #[test]
    fn exit_reader_terminates() {
        let key = SecretKey::from_slice(&[0x41; 32]).unwrap();
        let (hop, _) = ExitOnionReader
            .read_packet(&key, &OnionPacket::default())
            .unwrap();
        assert!(hop.is_exit);
    }
}
