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

//! The process-wide node record: signing identity, alias, feature bits
//! and the bounded tables of gossiped peer nodes and channels.

use amplify::Slice32;
use bitcoin::hashes::{sha256d, Hash};
use log::{debug, trace};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};

use crate::channel::keyset::Keypair;
use crate::channel::Error;
use crate::host::Host;
use crate::onion::{ExitOnionReader, HopData, OnionPacket, OnionReader};
use crate::wire::{
    ChannelAnnouncement, ChannelUpdate, Messages, NodeAnnouncement,
    ShortChannelId,
};

/// Upper bound on tracked peer node records.
pub const NODE_MAX: usize = 4;

/// Upper bound on tracked announced channels.
pub const CHANNEL_MAX: usize = 8;

/// A gossiped peer node.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct NodeInfo {
    /// The node's identity key.
    pub node_id: PublicKey,

    /// Last announced alias.
    pub alias: String,

    /// Timestamp of the freshest accepted announcement.
    pub timestamp: u32,
}

/// A gossiped channel.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ChannelInfo {
    /// Location of the funding output.
    pub short_channel_id: ShortChannelId,

    /// The channel endpoints in announcement order.
    pub nodes: (PublicKey, PublicKey),

    /// Timestamp of the freshest `channel_update` per direction.
    pub update_timestamps: (Option<u32>, Option<u32>),
}

/// The local node: identity, features and gossip tables shared by all
/// channels of the process.
pub struct Node {
    keys: Keypair,
    alias: String,
    features: u8,
    chain_hash: Slice32,
    nodes: Vec<NodeInfo>,
    channels: Vec<ChannelInfo>,
    onion_reader: Box<dyn OnionReader>,
}

impl Node {
    /// Creates the node record for a signing key.
    pub fn with(node_key: SecretKey, alias: &str, features: u8) -> Node {
        Node {
            keys: Keypair::from_secret(node_key),
            alias: alias.to_owned(),
            features,
            chain_hash: Slice32::default(),
            nodes: Vec::new(),
            channels: Vec::new(),
            onion_reader: Box::new(ExitOnionReader),
        }
    }

    /// Installs the Sphinx library adapter used for incoming HTLCs.
    pub fn set_onion_reader(&mut self, reader: Box<dyn OnionReader>) {
        self.onion_reader = reader;
    }

    /// Sets the genesis hash of the chain announced in gossip.
    pub fn set_chain_hash(&mut self, chain_hash: Slice32) {
        self.chain_hash = chain_hash;
    }

    /// The node's identity key.
    #[inline]
    pub fn node_id(&self) -> PublicKey {
        self.keys.pk
    }

    /// The announced chain.
    #[inline]
    pub fn chain_hash(&self) -> Slice32 {
        self.chain_hash
    }

    /// Number of tracked peer node records.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of tracked announced channels.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Peels one onion layer with the node key.
    pub(crate) fn read_onion(
        &self,
        packet: &OnionPacket,
    ) -> Option<(HopData, OnionPacket)> {
        self.onion_reader.read_packet(&self.keys.sk, packet)
    }

    /// Signs a gossip message body with the node key (BOLT-7 signs the
    /// double-SHA256 of the body).
    pub fn sign_gossip(&self, body: &[u8]) -> Signature {
        Node::sign_gossip_with(&self.keys.sk, body)
    }

    /// Signs a gossip message body with an arbitrary key.
    pub fn sign_gossip_with(key: &SecretKey, body: &[u8]) -> Signature {
        let digest = sha256d::Hash::hash(body);
        let msg = Message::from_slice(&digest[..])
            .expect("double-SHA256 digests are valid messages");
        SECP256K1.sign_ecdsa(&msg, key)
    }

    fn verify_gossip(
        pubkey: &PublicKey,
        body: &[u8],
        signature: &Signature,
    ) -> Result<(), Error> {
        let digest = sha256d::Hash::hash(body);
        let msg = Message::from_slice(&digest[..])
            .expect("double-SHA256 digests are valid messages");
        SECP256K1
            .verify_ecdsa(&msg, signature, pubkey)
            .map_err(|_| Error::GossipInvalidSignature)
    }

    /// Composes our signed `node_announcement`.
    pub fn compose_node_announcement(
        &self,
        timestamp: u32,
    ) -> Result<Vec<u8>, Error> {
        let mut alias = [0u8; 32];
        let len = self.alias.len().min(32);
        alias[..len].copy_from_slice(&self.alias.as_bytes()[..len]);

        let mut announcement = NodeAnnouncement {
            signature: Signature::from_compact(&[1u8; 64])
                .expect("constant placeholder signature"),
            features: vec![self.features],
            timestamp,
            node_id: self.keys.pk,
            rgb_color: [0; 3],
            alias,
            addresses: vec![],
        };
        announcement.signature = self.sign_gossip(&announcement.signed_part());
        Ok(Messages::NodeAnnouncement(announcement).serialize())
    }

    /// Processes a received `node_announcement`: verifies the
    /// signature and refreshes the bounded node table.
    pub fn recv_node_announcement(
        &mut self,
        host: &mut dyn Host,
        announcement: &NodeAnnouncement,
    ) -> Result<(), Error> {
        Node::verify_gossip(
            &announcement.node_id,
            &announcement.signed_part(),
            &announcement.signature,
        )?;

        match self
            .nodes
            .iter_mut()
            .position(|info| info.node_id == announcement.node_id)
        {
            Some(idx) => {
                let info = &mut self.nodes[idx];
                if announcement.timestamp > info.timestamp {
                    info.alias = announcement.alias_str();
                    info.timestamp = announcement.timestamp;
                }
            }
            None if self.nodes.len() < NODE_MAX => {
                self.nodes.push(NodeInfo {
                    node_id: announcement.node_id,
                    alias: announcement.alias_str(),
                    timestamp: announcement.timestamp,
                });
            }
            None => {
                debug!(
                    "node table full; dropping announcement of {}",
                    announcement.node_id
                );
                return Ok(());
            }
        }

        let shared_channel = self
            .channels
            .iter()
            .find(|channel| {
                let (node_1, node_2) = channel.nodes;
                (node_1 == announcement.node_id && node_2 == self.keys.pk)
                    || (node_2 == announcement.node_id
                        && node_1 == self.keys.pk)
            })
            .map(|channel| channel.short_channel_id);
        host.node_announcement_received(announcement.node_id, shared_channel);
        Ok(())
    }

    /// Processes a received `channel_announcement`: verifies all four
    /// signatures and the node key ordering, then records the channel.
    pub fn recv_channel_announcement(
        &mut self,
        announcement: &ChannelAnnouncement,
    ) -> Result<(), Error> {
        // node ids must come in lexicographic order, with the bitcoin
        // keys attached to the matching node slots
        if announcement.node_id_1.serialize()
            >= announcement.node_id_2.serialize()
        {
            return Err(Error::GossipInvalidOrdering);
        }

        let body = announcement.signed_part();
        Node::verify_gossip(
            &announcement.node_id_1,
            &body,
            &announcement.node_signature_1,
        )?;
        Node::verify_gossip(
            &announcement.node_id_2,
            &body,
            &announcement.node_signature_2,
        )?;
        Node::verify_gossip(
            &announcement.bitcoin_key_1,
            &body,
            &announcement.bitcoin_signature_1,
        )?;
        Node::verify_gossip(
            &announcement.bitcoin_key_2,
            &body,
            &announcement.bitcoin_signature_2,
        )?;

        match self.channels.iter_mut().position(|channel| {
            channel.short_channel_id == announcement.short_channel_id
        }) {
            Some(idx) => {
                let channel = &mut self.channels[idx];
                channel.nodes =
                    (announcement.node_id_1, announcement.node_id_2);
            }
            None if self.channels.len() < CHANNEL_MAX => {
                self.channels.push(ChannelInfo {
                    short_channel_id: announcement.short_channel_id,
                    nodes: (announcement.node_id_1, announcement.node_id_2),
                    update_timestamps: (None, None),
                });
            }
            None => {
                debug!(
                    "channel table full; dropping announcement of {}",
                    announcement.short_channel_id
                );
            }
        }
        trace!(
            "recorded channel {} between {} and {}",
            announcement.short_channel_id,
            announcement.node_id_1,
            announcement.node_id_2
        );
        Ok(())
    }

    /// Processes a received `channel_update`: verifies the signature of
    /// the announcing direction against the recorded channel.
    pub fn recv_channel_update(
        &mut self,
        update: &ChannelUpdate,
    ) -> Result<(), Error> {
        let channel = match self.channels.iter_mut().find(|channel| {
            channel.short_channel_id == update.short_channel_id
        }) {
            Some(channel) => channel,
            None => {
                trace!(
                    "update for unknown channel {} ignored",
                    update.short_channel_id
                );
                return Ok(());
            }
        };

        let direction = (update.channel_flags & 0x01) as usize;
        let signer = if direction == 0 {
            channel.nodes.0
        } else {
            channel.nodes.1
        };
        Node::verify_gossip(&signer, &update.signed_part(), &update.signature)?;

        let timestamps = &mut channel.update_timestamps;
        let slot = if direction == 0 {
            &mut timestamps.0
        } else {
            &mut timestamps.1
        };
        if slot.map_or(true, |known| update.timestamp > known) {
            *slot = Some(update.timestamp);
        }
        Ok(())
    }

    /// Drops a channel from the gossip table once it closes.
    pub fn forget_channel(&mut self, short_channel_id: ShortChannelId) {
        self.channels
            .retain(|channel| channel.short_channel_id != short_channel_id);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn node(byte: u8, alias: &str) -> Node {
        Node::with(
            SecretKey::from_slice(&[byte; 32]).unwrap(),
            alias,
            0x08,
        )
    }

    struct NullHost {
        notices: Vec<(PublicKey, Option<ShortChannelId>)>,
    }

    impl Host for NullHost {
        fn funding_key_request(&mut self) -> Option<SecretKey> {
            None
        }

        fn add_htlc_received(
            &mut self,
            _htlc: crate::host::AddHtlcNotice,
        ) -> bool {
            false
        }

        fn node_announcement_received(
            &mut self,
            node_id: PublicKey,
            short_channel_id: Option<ShortChannelId>,
        ) {
            self.notices.push((node_id, short_channel_id));
        }
    }

    #[test]
    fn node_announcement_roundtrip_and_table() {
        let alice = node(0x71, "alice");
        let mut bob = node(0x72, "bob");
        let mut host = NullHost { notices: vec![] };

        let encoded = alice.compose_node_announcement(1_234_567).unwrap();
        let message = Messages::deserialize(&encoded).unwrap();
        let announcement = match message {
            Messages::NodeAnnouncement(announcement) => announcement,
            _ => panic!("expected node_announcement"),
        };
        bob.recv_node_announcement(&mut host, &announcement).unwrap();
        assert_eq!(bob.node_count(), 1);
        assert_eq!(bob.nodes[0].alias, "alice");
        assert_eq!(host.notices.len(), 1);

        // stale timestamps do not regress the table
        let mut stale = announcement;
        stale.timestamp = 1;
        stale.signature = alice.sign_gossip(&stale.signed_part());
        bob.recv_node_announcement(&mut host, &stale).unwrap();
        assert_eq!(bob.nodes[0].timestamp, 1_234_567);
    }

    #[test]
    fn tampered_node_announcement_rejected() {
        let alice = node(0x71, "alice");
        let mut bob = node(0x72, "bob");
        let mut host = NullHost { notices: vec![] };

        let encoded = alice.compose_node_announcement(1_234_567).unwrap();
        let mut announcement = match Messages::deserialize(&encoded).unwrap()
        {
            Messages::NodeAnnouncement(announcement) => announcement,
            _ => panic!("expected node_announcement"),
        };
        announcement.timestamp += 1; // invalidates the signature
        assert_eq!(
            bob.recv_node_announcement(&mut host, &announcement)
                .unwrap_err(),
            Error::GossipInvalidSignature
        );
        assert_eq!(bob.node_count(), 0);
    }

    #[test]
    fn node_table_is_bounded() {
        let mut observer = node(0x70, "observer");
        let mut host = NullHost { notices: vec![] };
        for byte in 1..=(NODE_MAX as u8 + 2) {
            let peer = node(byte, "peer");
            let encoded =
                peer.compose_node_announcement(byte as u32).unwrap();
            let announcement = match Messages::deserialize(&encoded).unwrap()
            {
                Messages::NodeAnnouncement(announcement) => announcement,
                _ => panic!("expected node_announcement"),
            };
            observer
                .recv_node_announcement(&mut host, &announcement)
                .unwrap();
        }
        assert_eq!(observer.node_count(), NODE_MAX);
    }

    #[test]
    fn channel_announcement_ordering_enforced() {
        let alice = node(0x71, "alice");
        let bob = node(0x72, "bob");
        let mut carol = node(0x73, "carol");

        let (first, second) =
            if alice.node_id().serialize() <= bob.node_id().serialize() {
                (&alice, &bob)
            } else {
                (&bob, &alice)
            };

        let mut announcement = ChannelAnnouncement {
            node_signature_1: Signature::from_compact(&[1u8; 64]).unwrap(),
            node_signature_2: Signature::from_compact(&[1u8; 64]).unwrap(),
            bitcoin_signature_1: Signature::from_compact(&[1u8; 64]).unwrap(),
            bitcoin_signature_2: Signature::from_compact(&[1u8; 64]).unwrap(),
            features: vec![],
            chain_hash: Slice32::default(),
            short_channel_id: ShortChannelId::new(100, 1, 0).unwrap(),
            node_id_1: first.node_id(),
            node_id_2: second.node_id(),
            bitcoin_key_1: first.node_id(),
            bitcoin_key_2: second.node_id(),
        };
        let body = announcement.signed_part();
        announcement.node_signature_1 = first.sign_gossip(&body);
        announcement.node_signature_2 = second.sign_gossip(&body);
        announcement.bitcoin_signature_1 = first.sign_gossip(&body);
        announcement.bitcoin_signature_2 = second.sign_gossip(&body);

        carol.recv_channel_announcement(&announcement).unwrap();
        assert_eq!(carol.channel_count(), 1);

        // swapped node keys sort inconsistently and are rejected
        let mut swapped = announcement.clone();
        std::mem::swap(&mut swapped.node_id_1, &mut swapped.node_id_2);
        assert_eq!(
            carol.recv_channel_announcement(&swapped).unwrap_err(),
            Error::GossipInvalidOrdering
        );

        // channel_update signed by the right direction is accepted
        let mut update = ChannelUpdate {
            signature: Signature::from_compact(&[1u8; 64]).unwrap(),
            chain_hash: Slice32::default(),
            short_channel_id: announcement.short_channel_id,
            timestamp: 100,
            message_flags: 0,
            channel_flags: 0,
            cltv_expiry_delta: 144,
            htlc_minimum_msat: 1000,
            fee_base_msat: 1000,
            fee_proportional_millionths: 100,
        };
        update.signature = first.sign_gossip(&update.signed_part());
        carol.recv_channel_update(&update).unwrap();
        assert_eq!(carol.channels[0].update_timestamps.0, Some(100));

        // but not when signed by the opposite node
        let mut wrong = update;
        wrong.timestamp = 200;
        wrong.signature = second.sign_gossip(&wrong.signed_part());
        assert_eq!(
            carol.recv_channel_update(&wrong).unwrap_err(),
            Error::GossipInvalidSignature
        );

        carol.forget_channel(announcement.short_channel_id);
        assert_eq!(carol.channel_count(), 0);
    }
}
