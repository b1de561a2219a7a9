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

//! Gossip messages (BOLT-7): channel and node announcements.

use std::io::{Read, Write};

use amplify::Slice32;
use secp256k1::ecdsa::Signature;
use secp256k1::PublicKey;

use super::encoding::{Error, WireDecode, WireEncode};
use super::types::{ChannelId, ShortChannelId};

/// Exchanged between the two channel peers to assemble the four
/// signatures a `channel_announcement` requires.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("announcement_signatures({channel_id}, {short_channel_id}, ...)")]
pub struct AnnouncementSignatures {
    /// The channel being announced.
    pub channel_id: ChannelId,

    /// The confirmed location of the funding output.
    pub short_channel_id: ShortChannelId,

    /// Signature with the sender's node key over the future
    /// `channel_announcement`.
    pub node_signature: Signature,

    /// Signature with the sender's funding key over the future
    /// `channel_announcement`.
    pub bitcoin_signature: Signature,
}

impl WireEncode for AnnouncementSignatures {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.channel_id.wire_encode(&mut e)?;
        len += self.short_channel_id.wire_encode(&mut e)?;
        len += self.node_signature.wire_encode(&mut e)?;
        len += self.bitcoin_signature.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for AnnouncementSignatures {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(AnnouncementSignatures {
            channel_id: ChannelId::wire_decode(&mut d)?,
            short_channel_id: ShortChannelId::wire_decode(&mut d)?,
            node_signature: Signature::wire_decode(&mut d)?,
            bitcoin_signature: Signature::wire_decode(&mut d)?,
        })
    }
}

/// Proves the existence of a channel between two nodes to the rest of
/// the network. The four signatures cover the double-SHA256 of the
/// message body starting at `features`.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("channel_announcement({short_channel_id}, {node_id_1}, {node_id_2})")]
pub struct ChannelAnnouncement {
    /// Signature of `node_id_1` over the announcement body.
    pub node_signature_1: Signature,

    /// Signature of `node_id_2` over the announcement body.
    pub node_signature_2: Signature,

    /// Signature of `bitcoin_key_1` over the announcement body.
    pub bitcoin_signature_1: Signature,

    /// Signature of `bitcoin_key_2` over the announcement body.
    pub bitcoin_signature_2: Signature,

    /// Channel feature bits.
    pub features: Vec<u8>,

    /// Genesis hash of the chain the channel lives on.
    pub chain_hash: Slice32,

    /// Location of the funding output.
    pub short_channel_id: ShortChannelId,

    /// The lexicographically lesser of the two node ids.
    pub node_id_1: PublicKey,

    /// The lexicographically greater of the two node ids.
    pub node_id_2: PublicKey,

    /// Funding pubkey of `node_id_1`.
    pub bitcoin_key_1: PublicKey,

    /// Funding pubkey of `node_id_2`.
    pub bitcoin_key_2: PublicKey,
}

impl ChannelAnnouncement {
    /// Serializes the signed region of the announcement: everything
    /// after the four signatures.
    pub fn signed_part(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.features
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        self.chain_hash
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        self.short_channel_id
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        self.node_id_1
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        self.node_id_2
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        self.bitcoin_key_1
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        self.bitcoin_key_2
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        buf
    }
}

impl WireEncode for ChannelAnnouncement {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.node_signature_1.wire_encode(&mut e)?;
        len += self.node_signature_2.wire_encode(&mut e)?;
        len += self.bitcoin_signature_1.wire_encode(&mut e)?;
        len += self.bitcoin_signature_2.wire_encode(&mut e)?;
        let body = self.signed_part();
        e.write_all(&body)?;
        Ok(len + body.len())
    }
}

impl WireDecode for ChannelAnnouncement {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(ChannelAnnouncement {
            node_signature_1: Signature::wire_decode(&mut d)?,
            node_signature_2: Signature::wire_decode(&mut d)?,
            bitcoin_signature_1: Signature::wire_decode(&mut d)?,
            bitcoin_signature_2: Signature::wire_decode(&mut d)?,
            features: Vec::<u8>::wire_decode(&mut d)?,
            chain_hash: Slice32::wire_decode(&mut d)?,
            short_channel_id: ShortChannelId::wire_decode(&mut d)?,
            node_id_1: PublicKey::wire_decode(&mut d)?,
            node_id_2: PublicKey::wire_decode(&mut d)?,
            bitcoin_key_1: PublicKey::wire_decode(&mut d)?,
            bitcoin_key_2: PublicKey::wire_decode(&mut d)?,
        })
    }
}

/// Associates an alias, colour and network addresses with a node id.
/// The signature covers the double-SHA256 of the body starting at
/// `features`.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("node_announcement({node_id}, {timestamp})")]
pub struct NodeAnnouncement {
    /// Signature of `node_id` over the announcement body.
    pub signature: Signature,

    /// Node feature bits.
    pub features: Vec<u8>,

    /// Announcement creation time; a fresher timestamp supersedes
    /// earlier announcements.
    pub timestamp: u32,

    /// The announced node.
    pub node_id: PublicKey,

    /// Display colour.
    pub rgb_color: [u8; 3],

    /// Display alias, zero-padded to 32 bytes.
    pub alias: [u8; 32],

    /// Opaque address descriptors (type-prefixed, as per BOLT-7).
    pub addresses: Vec<u8>,
}

impl NodeAnnouncement {
    /// Serializes the signed region of the announcement: everything
    /// after the signature.
    pub fn signed_part(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.features
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        self.timestamp
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        self.node_id
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        buf.extend_from_slice(&self.rgb_color);
        buf.extend_from_slice(&self.alias);
        self.addresses
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        buf
    }

    /// The alias as a string, with zero padding stripped.
    pub fn alias_str(&self) -> String {
        let end = self
            .alias
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(self.alias.len());
        String::from_utf8_lossy(&self.alias[..end]).into_owned()
    }
}

impl WireEncode for NodeAnnouncement {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let len = self.signature.wire_encode(&mut e)?;
        let body = self.signed_part();
        e.write_all(&body)?;
        Ok(len + body.len())
    }
}

impl WireDecode for NodeAnnouncement {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let signature = Signature::wire_decode(&mut d)?;
        let features = Vec::<u8>::wire_decode(&mut d)?;
        let timestamp = u32::wire_decode(&mut d)?;
        let node_id = PublicKey::wire_decode(&mut d)?;
        let mut rgb_color = [0u8; 3];
        d.read_exact(&mut rgb_color)?;
        let alias = <[u8; 32]>::wire_decode(&mut d)?;
        let addresses = Vec::<u8>::wire_decode(&mut d)?;
        Ok(NodeAnnouncement {
            signature,
            features,
            timestamp,
            node_id,
            rgb_color,
            alias,
            addresses,
        })
    }
}

/// Announces the forwarding parameters of one direction of a channel.
/// The signature covers the double-SHA256 of the body starting at
/// `chain_hash`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[display("channel_update({short_channel_id}, {timestamp}, {channel_flags})")]
pub struct ChannelUpdate {
    /// Signature of the announcing node over the update body.
    pub signature: Signature,

    /// Genesis hash of the chain the channel lives on.
    pub chain_hash: Slice32,

    /// Location of the funding output.
    pub short_channel_id: ShortChannelId,

    /// Update creation time; a fresher timestamp supersedes earlier
    /// updates of the same direction.
    pub timestamp: u32,

    /// Presence bits for optional fields.
    pub message_flags: u8,

    /// Bit 0 selects the direction the update applies to; bit 1
    /// disables the channel.
    pub channel_flags: u8,

    /// Blocks added to the expiry when forwarding through this channel.
    pub cltv_expiry_delta: u16,

    /// Smallest forwardable HTLC, in millisatoshi.
    pub htlc_minimum_msat: u64,

    /// Flat fee charged for forwarding, in millisatoshi.
    pub fee_base_msat: u32,

    /// Proportional forwarding fee, in millionths.
    pub fee_proportional_millionths: u32,
}

impl ChannelUpdate {
    /// Serializes the signed region of the update: everything after the
    /// signature.
    pub fn signed_part(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.chain_hash
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        self.short_channel_id
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        self.timestamp
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        buf.push(self.message_flags);
        buf.push(self.channel_flags);
        self.cltv_expiry_delta
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        self.htlc_minimum_msat
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        self.fee_base_msat
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        self.fee_proportional_millionths
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        buf
    }
}

impl WireEncode for ChannelUpdate {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let len = self.signature.wire_encode(&mut e)?;
        let body = self.signed_part();
        e.write_all(&body)?;
        Ok(len + body.len())
    }
}

impl WireDecode for ChannelUpdate {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(ChannelUpdate {
            signature: Signature::wire_decode(&mut d)?,
            chain_hash: Slice32::wire_decode(&mut d)?,
            short_channel_id: ShortChannelId::wire_decode(&mut d)?,
            timestamp: u32::wire_decode(&mut d)?,
            message_flags: u8::wire_decode(&mut d)?,
            channel_flags: u8::wire_decode(&mut d)?,
            cltv_expiry_delta: u16::wire_decode(&mut d)?,
            htlc_minimum_msat: u64::wire_decode(&mut d)?,
            fee_base_msat: u32::wire_decode(&mut d)?,
            fee_proportional_millionths: u32::wire_decode(&mut d)?,
        })
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    fn sig() -> Signature {
        Signature::from_compact(&[0x43u8; 64]).unwrap()
    }

    fn pk(hex: &str) -> PublicKey {
        PublicKey::from_str(hex).unwrap()
    }

    #[test]
    fn announcement_signatures_roundtrip() {
        let msg = AnnouncementSignatures {
            channel_id: ChannelId::default(),
            short_channel_id: ShortChannelId::new(100, 2, 0).unwrap(),
            node_signature: sig(),
            bitcoin_signature: sig(),
        };
        let encoded = msg.wire_serialize();
        assert_eq!(encoded.len(), 32 + 8 + 64 + 64);
        assert_eq!(
            AnnouncementSignatures::wire_deserialize(&encoded).unwrap(),
            msg
        );
    }

    #[test]
    fn channel_announcement_roundtrip() {
        let msg = ChannelAnnouncement {
            node_signature_1: sig(),
            node_signature_2: sig(),
            bitcoin_signature_1: sig(),
            bitcoin_signature_2: sig(),
            features: vec![],
            chain_hash: Slice32::default(),
            short_channel_id: ShortChannelId::new(100, 2, 0).unwrap(),
            node_id_1: pk("023da092f6980e58d2c037173180e9a465476026ee50f96695963e8efe436f54eb"),
            node_id_2: pk("030e9f7b623d2ccc7c9bd44d66d5ce21ce504c0acf6385a132cec6d3c39fa711c1"),
            bitcoin_key_1: pk("034f355bdcb7cc0af728ef3cceb9615d90684bb5b2ca5f859ab0f0b704075871aa"),
            bitcoin_key_2: pk("032c0b7cf95324a07d05398b240174dc0c2be444d96b159aa6c7f7b1e668680991"),
        };
        let encoded = msg.wire_serialize();
        assert_eq!(
            ChannelAnnouncement::wire_deserialize(&encoded).unwrap(),
            msg
        );
        // signed region excludes exactly the four leading signatures
        assert_eq!(msg.signed_part(), encoded[4 * 64..].to_vec());
    }

    #[test]
    fn node_announcement_roundtrip() {
        let mut alias = [0u8; 32];
        alias[..4].copy_from_slice(b"node");
        let msg = NodeAnnouncement {
            signature: sig(),
            features: vec![],
            timestamp: 1234567,
            node_id: pk("023da092f6980e58d2c037173180e9a465476026ee50f96695963e8efe436f54eb"),
            rgb_color: [1, 2, 3],
            alias,
            addresses: vec![],
        };
        let encoded = msg.wire_serialize();
        assert_eq!(
            NodeAnnouncement::wire_deserialize(&encoded).unwrap(),
            msg
        );
        assert_eq!(msg.alias_str(), "node");
    }

    #[test]
    fn channel_update_roundtrip() {
        let msg = ChannelUpdate {
            signature: sig(),
            chain_hash: Slice32::default(),
            short_channel_id: ShortChannelId::new(100, 2, 0).unwrap(),
            timestamp: 1234567,
            message_flags: 0,
            channel_flags: 1,
            cltv_expiry_delta: 144,
            htlc_minimum_msat: 1000,
            fee_base_msat: 1000,
            fee_proportional_millionths: 100,
        };
        let encoded = msg.wire_serialize();
        assert_eq!(ChannelUpdate::wire_deserialize(&encoded).unwrap(), msg);
    }
}
