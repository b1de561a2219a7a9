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

//! The channel state machine.
//!
//! All state mutation happens inside [`Channel::recv`] or one of the
//! host-initiated `compose_*`/`set_*` entry points. Outbound messages
//! produced while handling an inbound one are delivered through
//! [`Host::send_message`] only after their effect on local state is
//! committed; messages produced by `compose_*` calls are returned to
//! the caller for delivery.

use std::collections::BTreeMap;

use amplify::{Slice32, Wrapper};
use bitcoin::blockdata::transaction::{OutPoint, TxIn, TxOut};
use bitcoin::{
    PackedLockTime, Script, Sequence, Transaction, Txid, Witness,
};
use log::{debug, trace, warn};
use secp256k1::ecdsa::Signature;
use secp256k1::PublicKey;

use super::keyset::{Keypair, LocalKeyset, RemoteKeyset, ScriptKeys};
use super::policy::{CommonParams, PeerParams, Policy, PolicyError};
use crate::commitment::{
    self, scripts, BuiltCommitment, CommitmentParams, HtlcView,
};
use crate::host::{
    AddHtlcNotice, ClosedNotice, FulfillHtlcNotice, FundingWait, Host,
};
use crate::onion::OnionPacket;
use crate::wire::{
    self, AcceptChannel, ActiveChannelId, AnnouncementSignatures,
    ChannelAnnouncement, ChannelId, ClosingSigned, CommitmentSigned,
    ErrorMessage, FundingCreated, FundingLocked, FundingSigned, HashLock,
    HashPreimage, Init, Messages, OpenChannel, Ping, Pong, RevokeAndAck,
    ShortChannelId, Shutdown, UpdateAddHtlc, UpdateFulfillHtlc,
};
use crate::{derkey, noise::NoiseTransport, Node};

/// `shutdown` has been sent by the local node.
const SHUTDOWN_SENT: u8 = 0b01;
/// `shutdown` has been received from the peer.
const SHUTDOWN_RECEIVED: u8 = 0b10;

/// A fulfillment we will send (an HTLC was added towards us) is still
/// being committed.
const FULFILL_SEND_PENDING: u8 = 0b01;
/// A fulfillment we will receive (we added an HTLC) is still being
/// committed.
const FULFILL_RECV_PENDING: u8 = 0b10;

/// Unanswered pings after which liveness is considered lost.
const MISSING_PONG_LIMIT: u16 = 5;

/// Errors of channel operations. Only some of them are terminal for
/// the channel; see [`Channel::is_closed`] after a failed call.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// wire message failure: {0}
    #[from]
    #[display(inner)]
    Wire(wire::Error),

    /// transaction failure: {0}
    #[from]
    #[display(inner)]
    Commitment(commitment::Error),

    /// revocation ratchet failure: {0}
    #[from]
    #[display(inner)]
    Ratchet(derkey::Error),

    /// channel negotiation failure: {0}
    #[from]
    #[display(inner)]
    Policy(PolicyError),

    /// no message other than `init` may be exchanged before both sides
    /// sent `init`
    NoInit,

    /// `init` has already been sent
    InitAlreadySent,

    /// peer requires a feature this implementation does not know
    UnknownRequiredFeature,

    /// channel is in state {current} incompatible with the operation
    LifecycleMismatch {
        current: Lifecycle,
        required: &'static [Lifecycle],
    },

    /// message was sent to the wrong side of the channel
    InvalidReceiver,

    /// channel id of the message does not match this channel
    ChannelIdMismatch,

    /// the channel does not have a permanent channel id yet
    NoChannelId,

    /// the host has not provided a funding key
    NoFundingKey,

    /// the funding outpoint is not known yet
    NoFunding,

    /// the remote keyset is not known yet
    NoRemoteKeys,

    /// no shutdown scriptpubkey was configured
    NoShutdownScript,

    /// the short channel id is not known yet
    NoShortChannelId,

    /// the remote node id is not known
    NoRemoteNodeId,

    /// funding input of {available} sat cannot cover {required} sat of
    /// funding and fees
    InsufficientFunding { required: u64, available: u64 },

    /// HTLC amount of {amount} msat is below the required minimum of
    /// {minimum} msat
    HtlcAmountTooSmall { amount: u64, minimum: u64 },

    /// the pending HTLC set is limited to {0} entries
    HtlcCountExceeded(u16),

    /// pending HTLCs of {pending} msat exceed the in-flight limit of
    /// {limit} msat
    HtlcInFlightExceeded { pending: u64, limit: u64 },

    /// balance of {balance} msat cannot carry an HTLC of {amount} msat
    InsufficientBalance { balance: u64, amount: u64 },

    /// no pending HTLC with id {0}
    UnknownHtlc(u64),

    /// preimage does not match the payment hash of HTLC {0}
    PreimageMismatch(u64),

    /// onion packet cannot be processed
    OnionFailure,

    /// the host rejected the incoming HTLC
    HostRejected,

    /// no staged changes to commit
    NothingToCommit,

    /// `shutdown` was already sent
    ShutdownAlreadySent,

    /// cooperative close requires an empty HTLC set; {0} pending
    HtlcsPending(usize),

    /// revealed per-commitment secret does not match the previously
    /// announced per-commitment point
    PrevSecretMismatch,

    /// pong length {got} does not answer the last ping requesting
    /// {expected} bytes
    UnexpectedPong { got: u16, expected: u16 },

    /// peer reported an error: {0}
    PeerError(String),

    /// gossip message carries an invalid signature
    GossipInvalidSignature,

    /// gossip message orders its node keys inconsistently
    GossipInvalidOrdering,

    /// receive path for this message is not implemented: {0}
    NotImplemented(&'static str),
}

/// Channel lifecycle: the states of the channel state machine.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[repr(u8)]
pub enum Lifecycle {
    /// Channel created; `init` not yet exchanged in both directions.
    #[display("INIT")]
    Initial = 0,

    /// Both sides exchanged `init`.
    #[display("INIT_EXCHANGED")]
    InitExchanged = 1,

    /// `open_channel` sent or received.
    #[display("OPENED")]
    Proposed = 2,

    /// `accept_channel` sent or received.
    #[display("ACCEPTED")]
    Accepted = 3,

    /// `funding_created` sent or received.
    #[display("FUNDING_CREATED")]
    Funding = 4,

    /// Waiting for the funding transaction to reach its depth.
    #[display("AWAIT_CONFIRM")]
    AwaitingConfirmation = 5,

    /// One side has sent `funding_locked`.
    #[display("LOCKED_ONE")]
    Locked = 6,

    /// Normal operation.
    #[display("NORMAL")]
    Active = 7,

    /// `shutdown` sent or received, close not yet negotiable.
    #[display("SHUTDOWN")]
    Shutdown = 8,

    /// Both shutdowns exchanged; `closing_signed` in flight.
    #[display("NEGOTIATING")]
    Negotiating = 9,

    /// Channel is non-operational.
    #[display("CLOSED")]
    Closed = 10,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle::Initial
    }
}

impl Lifecycle {
    pub(super) fn from_u8(value: u8) -> Option<Lifecycle> {
        Some(match value {
            0 => Lifecycle::Initial,
            1 => Lifecycle::InitExchanged,
            2 => Lifecycle::Proposed,
            3 => Lifecycle::Accepted,
            4 => Lifecycle::Funding,
            5 => Lifecycle::AwaitingConfirmation,
            6 => Lifecycle::Locked,
            7 => Lifecycle::Active,
            8 => Lifecycle::Shutdown,
            9 => Lifecycle::Negotiating,
            10 => Lifecycle::Closed,
            _ => return None,
        })
    }
}

/// Channel direction.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum Direction {
    /// Inbound channel, accepted by the local node in response to a
    /// received `open_channel`.
    #[display("inbound")]
    Inbound,

    /// Outbound channel, proposed to the remote node by sending
    /// `open_channel`.
    #[display("outbound")]
    Outbound,
}

impl Direction {
    /// Detects if the channel is inbound.
    #[inline]
    pub fn is_inbound(self) -> bool {
        self == Direction::Inbound
    }

    /// Detects if the channel is outbound.
    #[inline]
    pub fn is_outbound(self) -> bool {
        self == Direction::Outbound
    }
}

/// HTLC direction from the local perspective.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum HtlcDirection {
    /// HTLC we offered to the peer.
    #[display("offered")]
    Offered,

    /// HTLC the peer offered to us.
    #[display("received")]
    Received,
}

/// One pending HTLC.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Htlc {
    /// Direction from the local perspective.
    pub direction: HtlcDirection,

    /// Id within its direction, monotone from 0.
    pub id: u64,

    /// Value in millisatoshi.
    pub amount_msat: u64,

    /// Expiry block height.
    pub cltv_expiry: u32,

    /// Payment hash.
    pub payment_hash: HashLock,

    /// Onion routing packet the HTLC arrived or left with.
    pub onion_packet: OnionPacket,

    /// The peer's latest signature for the second-tier transaction of
    /// this HTLC on our commitment.
    pub signature: Option<Signature>,

    /// Channel the HTLC was forwarded from; zero when locally
    /// originated.
    pub origin_short_channel_id: u64,
}

/// Parameters governing one commitment transaction side, plus the
/// latest signature exchanged for it.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct CommitParams {
    /// Maximum number of HTLCs the owning side accepts.
    pub accept_htlcs: u16,

    /// Delay of the owning side's `to_local` output (imposed by its
    /// counterparty).
    pub to_self_delay: u16,

    /// Smallest HTLC the owning side accepts, in millisatoshi.
    pub htlc_minimum_msat: u64,

    /// In-flight limit towards the owning side, in millisatoshi.
    pub max_htlc_in_flight_msat: u64,

    /// Dust threshold of the owning side's commitment.
    pub dust_limit_sat: u64,

    /// For the local commitment: the peer's latest funding signature.
    /// For the remote commitment: our latest funding signature.
    pub last_signature: Option<Signature>,
}

/// The funding outpoint and its 2-of-2 parameters.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Funding {
    /// Funding transaction id.
    pub txid: Txid,

    /// Funding output index.
    pub output_index: u16,

    /// Funding value in satoshi.
    pub amount_sat: u64,

    /// The 2-of-2 witness script.
    pub redeem_script: Script,

    /// Whether the local funding key sorts first within the script.
    pub local_first: bool,

    /// The funding transaction itself, known on the opener side.
    pub funding_tx: Option<Transaction>,
}

impl Funding {
    /// The outpoint the commitment transactions spend.
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.output_index as u32)
    }
}

/// Wallet input the opener spends into the funding transaction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FundingInput {
    /// The output being spent.
    pub outpoint: OutPoint,

    /// Its value in satoshi.
    pub amount_sat: u64,

    /// Where the change above funding and fees goes.
    pub change_script: Script,
}

/// The channel with one peer.
pub struct Channel {
    stage: Lifecycle,
    direction: Direction,
    active_channel_id: ActiveChannelId,
    short_channel_id: Option<ShortChannelId>,
    /// Preserves the original engine's hardcoded funding vout of 0 in
    /// the short channel id when enabled.
    compat_zero_vout: bool,

    funding: Option<Funding>,
    funding_input: Option<FundingInput>,
    funding_sat: u64,
    feerate_per_kw: u32,

    local_keys: LocalKeyset,
    remote_keys: Option<RemoteKeyset>,
    storage_seed: Slice32,
    storage_index: u64,
    peer_storage: derkey::SecretStorage,
    peer_storage_index: u64,
    /// Per-commitment point of the peer's newest unrevoked commitment.
    remote_pcp_unrevoked: Option<PublicKey>,
    /// Per-commitment point for the next commitment we sign for the
    /// peer.
    remote_pcp_next: Option<PublicKey>,

    local_msat: u64,
    remote_msat: u64,

    offered_htlcs: BTreeMap<u64, Htlc>,
    received_htlcs: BTreeMap<u64, Htlc>,
    htlc_id_num: u64,

    commit_local: CommitParams,
    commit_remote: CommitParams,
    commitment_number_local: u64,
    commitment_number_remote: u64,
    obscuring_factor: u64,

    policy: Policy,
    local_params: PeerParams,
    common_params: CommonParams,
    min_depth: u32,

    init_sent: bool,
    remote_features: Option<u8>,
    remote_node_id: Option<PublicKey>,

    shutdown_flags: u8,
    close_fee_sat: u64,
    shutdown_script_local: Option<Script>,
    shutdown_script_remote: Option<Script>,

    htlc_changed: u8,
    /// A `commitment_signed` of ours is outstanding until the peer's
    /// `revoke_and_ack` arrives; no further commitment may be signed
    /// meanwhile.
    awaiting_revoke: bool,
    funding_locked_sent: bool,
    funding_locked_received: bool,

    missing_pong_cnt: u16,
    last_pong_bytes: u16,

    remote_announcement_sigs: Option<(Signature, Signature)>,

    transport: NoiseTransport,
}

impl Channel {
    /// Creates a channel bound to the given revocation ratchet seed.
    pub fn new(storage_seed: Slice32) -> Channel {
        let first_secret =
            derkey::secret_from_seed(&storage_seed, derkey::FIRST_INDEX);
        let per_commitment = Keypair::from_secret(
            secp256k1::SecretKey::from_slice(first_secret.as_inner())
                .expect("ratchet secrets are valid keys"),
        );
        Channel {
            stage: Lifecycle::Initial,
            direction: Direction::Outbound,
            active_channel_id: ActiveChannelId::random(),
            short_channel_id: None,
            compat_zero_vout: false,
            funding: None,
            funding_input: None,
            funding_sat: 0,
            feerate_per_kw: 0,
            local_keys: LocalKeyset::generate(per_commitment),
            remote_keys: None,
            storage_seed,
            storage_index: derkey::FIRST_INDEX,
            peer_storage: derkey::SecretStorage::new(),
            peer_storage_index: derkey::FIRST_INDEX,
            remote_pcp_unrevoked: None,
            remote_pcp_next: None,
            local_msat: 0,
            remote_msat: 0,
            offered_htlcs: BTreeMap::new(),
            received_htlcs: BTreeMap::new(),
            htlc_id_num: 0,
            commit_local: CommitParams::default(),
            commit_remote: CommitParams::default(),
            commitment_number_local: 0,
            commitment_number_remote: 0,
            obscuring_factor: 0,
            policy: Policy::default(),
            local_params: PeerParams::default(),
            common_params: CommonParams::default(),
            min_depth: CommonParams::default().minimum_depth,
            init_sent: false,
            remote_features: None,
            remote_node_id: None,
            shutdown_flags: 0,
            close_fee_sat: 0,
            shutdown_script_local: None,
            shutdown_script_remote: None,
            htlc_changed: 0,
            awaiting_revoke: false,
            funding_locked_sent: false,
            funding_locked_received: false,
            missing_pong_cnt: 0,
            last_pong_bytes: 0,
            remote_announcement_sigs: None,
            transport: NoiseTransport::new(),
        }
    }

    /// Configures negotiation policy, the parameters offered to the
    /// peer and, when known, the peer's node id.
    pub fn set_establish(
        &mut self,
        policy: Policy,
        local_params: PeerParams,
        common_params: CommonParams,
        remote_node_id: Option<PublicKey>,
    ) {
        self.policy = policy;
        self.local_params = local_params;
        self.common_params = common_params;
        self.min_depth = common_params.minimum_depth;
        if remote_node_id.is_some() {
            self.remote_node_id = remote_node_id;
        }
    }

    /// Installs the funding key. Usually provided through
    /// [`Host::funding_key_request`]; exposed for hosts that configure
    /// it up front.
    pub fn set_funding_key(&mut self, funding_key: secp256k1::SecretKey) {
        self.local_keys.funding = Some(Keypair::from_secret(funding_key));
    }

    /// Sets the confirmed location of the funding transaction, using
    /// the real funding output index.
    pub fn set_funding_info(&mut self, block_height: u32, tx_index: u32) {
        let vout = if self.compat_zero_vout {
            0
        } else {
            self.funding
                .as_ref()
                .map(|funding| funding.output_index)
                .unwrap_or(0)
        };
        self.short_channel_id =
            ShortChannelId::new(block_height, tx_index, vout);
    }

    /// Sets the confirmed location of the funding transaction with the
    /// funding output index pinned to 0, matching the behaviour of
    /// engines predating variable-vout support.
    pub fn set_funding_info_compat(
        &mut self,
        block_height: u32,
        tx_index: u32,
    ) {
        self.compat_zero_vout = true;
        self.short_channel_id = ShortChannelId::new(block_height, tx_index, 0);
    }

    /// Configures the scriptpubkey the mutual close pays us to.
    pub fn set_shutdown_script(&mut self, scriptpubkey: Script) {
        self.shutdown_script_local = Some(scriptpubkey);
    }

    /// Configures the mutual close payout as P2WPKH to the given key.
    pub fn set_shutdown_pubkey(&mut self, pubkey: PublicKey) {
        self.shutdown_script_local = Some(scripts::to_remote_script(&pubkey));
    }

    /// Updates the fee offered in the next `closing_signed`.
    pub fn update_shutdown_fee(&mut self, fee_sat: u64) {
        self.close_fee_sat = fee_sat;
    }

    // Accessors ------------------------------------------------------

    /// Current lifecycle stage.
    #[inline]
    pub fn stage(&self) -> Lifecycle {
        self.stage
    }

    /// Channel direction.
    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Detects whether the channel is terminally closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.stage == Lifecycle::Closed
    }

    /// Active (temporary or final) channel id.
    #[inline]
    pub fn active_channel_id(&self) -> ActiveChannelId {
        self.active_channel_id
    }

    /// The permanent channel id, if assigned.
    #[inline]
    pub fn channel_id(&self) -> Option<ChannelId> {
        self.active_channel_id.channel_id()
    }

    /// The short channel id, once the funding transaction confirmed.
    #[inline]
    pub fn short_channel_id(&self) -> Option<ShortChannelId> {
        self.short_channel_id
    }

    /// Local balance in millisatoshi.
    #[inline]
    pub fn local_msat(&self) -> u64 {
        self.local_msat
    }

    /// Remote balance in millisatoshi.
    #[inline]
    pub fn remote_msat(&self) -> u64 {
        self.remote_msat
    }

    /// Number of pending HTLCs.
    #[inline]
    pub fn htlc_count(&self) -> usize {
        self.offered_htlcs.len() + self.received_htlcs.len()
    }

    /// Local commitment number.
    #[inline]
    pub fn commitment_number(&self) -> u64 {
        self.commitment_number_local
    }

    /// Unanswered pings so far.
    #[inline]
    pub fn missing_pong_count(&self) -> u16 {
        self.missing_pong_cnt
    }

    /// Detects lost liveness: the missing-pong count passed its limit.
    /// Signalled but never auto-terminal.
    #[inline]
    pub fn liveness_lost(&self) -> bool {
        self.missing_pong_cnt >= MISSING_PONG_LIMIT
    }

    /// The encrypted transport of the peer connection.
    #[inline]
    pub fn transport(&mut self) -> &mut NoiseTransport {
        &mut self.transport
    }

    // Noise entry points ---------------------------------------------

    /// Starts the transport handshake; see
    /// [`NoiseTransport::handshake_start`]. Stores the peer's node id
    /// when acting as initiator.
    pub fn handshake_start(
        &mut self,
        local_node_key: secp256k1::SecretKey,
        remote_node_id: Option<PublicKey>,
    ) -> Option<Vec<u8>> {
        if remote_node_id.is_some() {
            self.remote_node_id = remote_node_id;
        }
        self.transport.handshake_start(local_node_key, remote_node_id)
    }

    /// Pumps a received handshake act; see
    /// [`NoiseTransport::handshake_recv`]. Learns the peer's node id
    /// when acting as responder.
    pub fn handshake_recv(
        &mut self,
        act: &[u8],
    ) -> Result<crate::noise::HandshakeAct, crate::noise::Error> {
        let progress = self.transport.handshake_recv(act)?;
        if self.remote_node_id.is_none() {
            self.remote_node_id = self.transport.remote_static();
        }
        Ok(progress)
    }

    /// Encrypts a message for the peer.
    pub fn noise_enc(
        &mut self,
        payload: &[u8],
    ) -> Result<Vec<u8>, crate::noise::Error> {
        self.transport.encrypt_message(payload)
    }

    /// Decrypts a frame header, returning the payload length.
    pub fn noise_dec_len(
        &mut self,
        header: &[u8],
    ) -> Result<u16, crate::noise::Error> {
        self.transport.decrypt_length(header)
    }

    /// Decrypts a frame body.
    pub fn noise_dec_msg(
        &mut self,
        body: &[u8],
    ) -> Result<Vec<u8>, crate::noise::Error> {
        self.transport.decrypt_message(body)
    }

    // Receive dispatch -----------------------------------------------

    /// Processes one decrypted peer message, invoking host callbacks
    /// and queueing responses through [`Host::send_message`].
    pub fn recv(
        &mut self,
        node: &mut Node,
        host: &mut dyn Host,
        payload: &[u8],
    ) -> Result<(), Error> {
        let message = Messages::deserialize(payload)?;
        trace!("received {}", message);

        if !matches!(message, Messages::Init(_))
            && (self.remote_features.is_none() || !self.init_sent)
        {
            return Err(Error::NoInit);
        }

        match message {
            Messages::Init(init) => self.recv_init(host, init),
            Messages::Error(error) => self.recv_error(host, error),
            Messages::Ping(ping) => self.recv_ping(host, ping),
            Messages::Pong(pong) => self.recv_pong(pong),
            Messages::OpenChannel(open_channel) => {
                self.recv_open_channel(host, open_channel)
            }
            Messages::AcceptChannel(accept_channel) => {
                self.recv_accept_channel(host, accept_channel)
            }
            Messages::FundingCreated(funding_created) => {
                self.recv_funding_created(host, funding_created)
            }
            Messages::FundingSigned(funding_signed) => {
                self.recv_funding_signed(host, funding_signed)
            }
            Messages::FundingLocked(funding_locked) => {
                self.recv_funding_locked(host, funding_locked)
            }
            Messages::Shutdown(shutdown) => self.recv_shutdown(host, shutdown),
            Messages::ClosingSigned(closing_signed) => {
                self.recv_closing_signed(node, host, closing_signed)
            }
            Messages::UpdateAddHtlc(update_add_htlc) => {
                self.recv_update_add_htlc(node, host, update_add_htlc)
            }
            Messages::UpdateFulfillHtlc(update_fulfill_htlc) => {
                self.recv_update_fulfill_htlc(host, update_fulfill_htlc)
            }
            Messages::UpdateFailHtlc(_) => {
                Err(Error::NotImplemented("update_fail_htlc"))
            }
            Messages::UpdateFailMalformedHtlc(_) => {
                Err(Error::NotImplemented("update_fail_malformed_htlc"))
            }
            Messages::CommitmentSigned(commitment_signed) => {
                self.recv_commitment_signed(host, commitment_signed)
            }
            Messages::RevokeAndAck(revoke_and_ack) => {
                self.recv_revoke_and_ack(host, revoke_and_ack)
            }
            Messages::UpdateFee(_) => Err(Error::NotImplemented("update_fee")),
            Messages::ChannelAnnouncement(announcement) => {
                node.recv_channel_announcement(&announcement)
            }
            Messages::NodeAnnouncement(announcement) => {
                node.recv_node_announcement(host, &announcement)
            }
            Messages::ChannelUpdate(update) => {
                node.recv_channel_update(&update)
            }
            Messages::AnnouncementSignatures(announcement_signatures) => {
                self.recv_announcement_signatures(host, announcement_signatures)
            }
        }
    }

    // Compose entry points -------------------------------------------

    /// Composes our `init`; must be the first message sent.
    pub fn compose_init(&mut self) -> Result<Vec<u8>, Error> {
        if self.init_sent {
            return Err(Error::InitAlreadySent);
        }
        self.init_sent = true;
        if self.remote_features.is_some()
            && self.stage == Lifecycle::Initial
        {
            self.stage = Lifecycle::InitExchanged;
        }
        Ok(Messages::Init(Init {
            global_features: vec![],
            local_features: vec![0x08],
        })
        .serialize())
    }

    /// Composes `open_channel`, making this side the channel opener.
    /// The funding input is retained until `accept_channel` arrives and
    /// the funding transaction can be assembled.
    pub fn compose_open_channel(
        &mut self,
        host: &mut dyn Host,
        funding_input: FundingInput,
        funding_sat: u64,
        push_msat: u64,
    ) -> Result<Vec<u8>, Error> {
        self.require_init()?;
        self.require_stage(&[Lifecycle::InitExchanged])?;

        self.request_funding_key(host)?;
        let funding_pubkey =
            self.local_keys.funding_pubkey().ok_or(Error::NoFundingKey)?;

        self.direction = Direction::Outbound;
        self.funding_input = Some(funding_input);
        self.funding_sat = funding_sat;
        self.feerate_per_kw = self.common_params.feerate_per_kw;
        self.local_msat = funding_sat * 1000 - push_msat;
        self.remote_msat = push_msat;
        self.commit_local = CommitParams {
            accept_htlcs: self.local_params.max_accepted_htlcs,
            to_self_delay: 0, // learnt from accept_channel
            htlc_minimum_msat: self.local_params.htlc_minimum_msat,
            max_htlc_in_flight_msat: self
                .local_params
                .max_htlc_value_in_flight_msat,
            dust_limit_sat: self.local_params.dust_limit_satoshis,
            last_signature: None,
        };
        self.stage = Lifecycle::Proposed;

        let temporary_channel_id = self
            .active_channel_id
            .temp_channel_id()
            .expect("a channel before establishment has a temporary id");
        Ok(Messages::OpenChannel(OpenChannel {
            temporary_channel_id,
            funding_satoshis: funding_sat,
            push_msat,
            dust_limit_satoshis: self.local_params.dust_limit_satoshis,
            max_htlc_value_in_flight_msat: self
                .local_params
                .max_htlc_value_in_flight_msat,
            channel_reserve_satoshis: self
                .local_params
                .channel_reserve_satoshis,
            htlc_minimum_msat: self.local_params.htlc_minimum_msat,
            feerate_per_kw: self.common_params.feerate_per_kw,
            to_self_delay: self.local_params.to_self_delay,
            max_accepted_htlcs: self.local_params.max_accepted_htlcs,
            funding_pubkey,
            revocation_basepoint: self.local_keys.revocation_basepoint.pk,
            payment_basepoint: self.local_keys.payment_basepoint.pk,
            delayed_payment_basepoint: self
                .local_keys
                .delayed_payment_basepoint
                .pk,
            first_per_commitment_point: self.local_keys.per_commitment.pk,
        })
        .serialize())
    }

    /// Resumes establishment after the funding transaction reached
    /// `min_depth` confirmations: advances the ratchet and sends
    /// `funding_locked`. [`Channel::set_funding_info`] must have been
    /// called with the confirmed location first.
    pub fn funding_tx_confirmed(
        &mut self,
        host: &mut dyn Host,
    ) -> Result<(), Error> {
        self.require_init()?;
        self.require_stage(&[
            Lifecycle::AwaitingConfirmation,
            Lifecycle::Locked,
        ])?;
        if self.short_channel_id.is_none() {
            return Err(Error::NoShortChannelId);
        }
        let channel_id = self.channel_id().ok_or(Error::NoChannelId)?;

        let next_per_commitment_point = self.advance_local_ratchet();
        self.funding_locked_sent = true;

        let message = Messages::FundingLocked(FundingLocked {
            channel_id,
            next_per_commitment_point,
        })
        .serialize();
        host.send_message(message);
        self.after_funding_locked_progress(host);
        Ok(())
    }

    /// Composes `shutdown`, beginning a cooperative close.
    pub fn compose_shutdown(&mut self) -> Result<Vec<u8>, Error> {
        self.require_init()?;
        if self.shutdown_flags & SHUTDOWN_SENT != 0 {
            return Err(Error::ShutdownAlreadySent);
        }
        if self.htlc_count() != 0 {
            return Err(Error::HtlcsPending(self.htlc_count()));
        }
        let channel_id = self.channel_id().ok_or(Error::NoChannelId)?;
        let scriptpubkey = self
            .shutdown_script_local
            .clone()
            .ok_or(Error::NoShutdownScript)?;

        self.shutdown_flags |= SHUTDOWN_SENT;
        self.stage = if self.shutdown_flags & SHUTDOWN_RECEIVED != 0 {
            Lifecycle::Negotiating
        } else {
            Lifecycle::Shutdown
        };
        Ok(Messages::Shutdown(Shutdown {
            channel_id,
            scriptpubkey,
        })
        .serialize())
    }

    /// Composes `update_add_htlc`, staging a new offered HTLC.
    pub fn compose_add_htlc(
        &mut self,
        amount_msat: u64,
        cltv_expiry: u32,
        payment_hash: HashLock,
        onion_packet: OnionPacket,
        origin_short_channel_id: u64,
    ) -> Result<Vec<u8>, Error> {
        self.require_init()?;
        self.require_stage(&[Lifecycle::Active])?;
        let channel_id = self.channel_id().ok_or(Error::NoChannelId)?;

        if amount_msat == 0
            || amount_msat < self.commit_remote.htlc_minimum_msat
        {
            return Err(Error::HtlcAmountTooSmall {
                amount: amount_msat,
                minimum: self.commit_remote.htlc_minimum_msat.max(1),
            });
        }
        let accept_limit = self
            .commit_local
            .accept_htlcs
            .min(self.commit_remote.accept_htlcs);
        if self.htlc_count() >= accept_limit as usize {
            return Err(Error::HtlcCountExceeded(accept_limit));
        }
        let pending: u64 = self.pending_msat() + amount_msat;
        if pending > self.commit_remote.max_htlc_in_flight_msat {
            return Err(Error::HtlcInFlightExceeded {
                pending,
                limit: self.commit_remote.max_htlc_in_flight_msat,
            });
        }
        if amount_msat > self.local_msat {
            return Err(Error::InsufficientBalance {
                balance: self.local_msat,
                amount: amount_msat,
            });
        }

        let htlc_id = self.htlc_id_num;
        let message = Messages::UpdateAddHtlc(UpdateAddHtlc {
            channel_id,
            htlc_id,
            amount_msat,
            payment_hash,
            cltv_expiry,
            onion_routing_packet: onion_packet.clone(),
        })
        .serialize();

        self.offered_htlcs.insert(htlc_id, Htlc {
            direction: HtlcDirection::Offered,
            id: htlc_id,
            amount_msat,
            cltv_expiry,
            payment_hash,
            onion_packet,
            signature: None,
            origin_short_channel_id,
        });
        self.local_msat -= amount_msat;
        self.htlc_id_num += 1;
        self.htlc_changed |= FULFILL_RECV_PENDING;
        debug!(
            "HTLC add: id={}, amount_msat={}, pending={}",
            htlc_id,
            amount_msat,
            self.htlc_count()
        );
        Ok(message)
    }

    /// Composes `update_fulfill_htlc`, settling a received HTLC whose
    /// preimage we know.
    pub fn compose_fulfill_htlc(
        &mut self,
        id: u64,
        preimage: HashPreimage,
    ) -> Result<Vec<u8>, Error> {
        self.require_init()?;
        let channel_id = self.channel_id().ok_or(Error::NoChannelId)?;

        let htlc = self
            .received_htlcs
            .get(&id)
            .ok_or(Error::UnknownHtlc(id))?;
        if HashLock::from_preimage(&preimage) != htlc.payment_hash {
            return Err(Error::PreimageMismatch(id));
        }

        let amount_msat = htlc.amount_msat;
        let message = Messages::UpdateFulfillHtlc(UpdateFulfillHtlc {
            channel_id,
            htlc_id: id,
            payment_preimage: preimage,
        })
        .serialize();

        self.received_htlcs.remove(&id);
        self.local_msat += amount_msat;
        self.htlc_changed |= FULFILL_SEND_PENDING;
        debug!(
            "HTLC fulfill: id={}, amount_msat={}, local_msat={}",
            id, amount_msat, self.local_msat
        );
        Ok(message)
    }

    /// Composes `commitment_signed` over the currently staged changes.
    pub fn compose_commit_signed(&mut self) -> Result<Vec<u8>, Error> {
        self.require_init()?;
        if self.htlc_changed == 0 {
            return Err(Error::NothingToCommit);
        }
        let message = self.make_commitment_signed()?;
        Ok(Messages::CommitmentSigned(message).serialize())
    }

    /// Composes a `ping`, counting it against the liveness budget.
    pub fn compose_ping(
        &mut self,
        num_pong_bytes: u16,
        byteslen: u16,
    ) -> Result<Vec<u8>, Error> {
        if num_pong_bytes >= wire::PING_MAX_BYTES
            || byteslen >= wire::PING_MAX_BYTES
        {
            return Err(Error::Wire(wire::Error::DataIntegrity(format!(
                "ping num_pong_bytes {} exceeds protocol bound",
                num_pong_bytes
            ))));
        }
        let encoded = Messages::Ping(Ping {
            num_pong_bytes,
            byteslen,
        })
        .serialize();
        self.last_pong_bytes = num_pong_bytes;
        self.missing_pong_cnt += 1;
        if self.liveness_lost() {
            warn!(
                "{} pings unanswered; peer liveness lost",
                self.missing_pong_cnt
            );
        }
        Ok(encoded)
    }

    /// Composes a `pong` carrying `byteslen` zero bytes.
    pub fn compose_pong(&mut self, byteslen: u16) -> Result<Vec<u8>, Error> {
        Ok(Messages::Pong(Pong { byteslen }).serialize())
    }

    /// Composes our half of the `announcement_signatures` exchange.
    pub fn compose_announcement_signatures(
        &mut self,
        node: &Node,
    ) -> Result<Vec<u8>, Error> {
        self.require_init()?;
        let channel_id = self.channel_id().ok_or(Error::NoChannelId)?;
        let short_channel_id =
            self.short_channel_id.ok_or(Error::NoShortChannelId)?;

        let announcement = self.unsigned_channel_announcement(node)?;
        let body = announcement.signed_part();
        let node_signature = node.sign_gossip(&body);
        let funding = self
            .local_keys
            .funding
            .as_ref()
            .ok_or(Error::NoFundingKey)?;
        let bitcoin_signature = Node::sign_gossip_with(&funding.sk, &body);

        Ok(Messages::AnnouncementSignatures(AnnouncementSignatures {
            channel_id,
            short_channel_id,
            node_signature,
            bitcoin_signature,
        })
        .serialize())
    }

    /// Assembles the full `channel_announcement` once the peer's
    /// signatures arrived through `announcement_signatures`.
    pub fn compose_channel_announcement(
        &self,
        node: &Node,
    ) -> Result<Vec<u8>, Error> {
        let (remote_node_sig, remote_bitcoin_sig) = self
            .remote_announcement_sigs
            .ok_or(Error::NotImplemented("announcement_signatures not seen"))?;
        let mut announcement = self.unsigned_channel_announcement(node)?;
        let body = announcement.signed_part();

        let local_node_sig = node.sign_gossip(&body);
        let funding = self
            .local_keys
            .funding
            .as_ref()
            .ok_or(Error::NoFundingKey)?;
        let local_bitcoin_sig = Node::sign_gossip_with(&funding.sk, &body);

        let local_is_node_1 =
            announcement.node_id_1 == node.node_id();
        if local_is_node_1 {
            announcement.node_signature_1 = local_node_sig;
            announcement.node_signature_2 = remote_node_sig;
            announcement.bitcoin_signature_1 = local_bitcoin_sig;
            announcement.bitcoin_signature_2 = remote_bitcoin_sig;
        } else {
            announcement.node_signature_1 = remote_node_sig;
            announcement.node_signature_2 = local_node_sig;
            announcement.bitcoin_signature_1 = remote_bitcoin_sig;
            announcement.bitcoin_signature_2 = local_bitcoin_sig;
        }
        Ok(Messages::ChannelAnnouncement(announcement).serialize())
    }

    // Receive handlers -----------------------------------------------

    fn recv_init(
        &mut self,
        host: &mut dyn Host,
        init: Init,
    ) -> Result<(), Error> {
        if init.has_unknown_required_features() {
            return Err(self.fail(host, Error::UnknownRequiredFeature));
        }
        let features = init.local_feature_byte();
        self.remote_features = Some(features);
        if self.init_sent && self.stage == Lifecycle::Initial {
            self.stage = Lifecycle::InitExchanged;
        }
        host.init_received(features);
        Ok(())
    }

    fn recv_error(
        &mut self,
        host: &mut dyn Host,
        error: ErrorMessage,
    ) -> Result<(), Error> {
        let description = error.to_string();
        warn!("{}", description);
        self.stage = Lifecycle::Closed;
        host.error(&description);
        Err(Error::PeerError(description))
    }

    fn recv_ping(
        &mut self,
        host: &mut dyn Host,
        ping: Ping,
    ) -> Result<(), Error> {
        let pong = self.compose_pong(ping.num_pong_bytes)?;
        host.send_message(pong);
        Ok(())
    }

    fn recv_pong(&mut self, pong: Pong) -> Result<(), Error> {
        if self.missing_pong_cnt > 0 && pong.byteslen != self.last_pong_bytes
        {
            return Err(Error::UnexpectedPong {
                got: pong.byteslen,
                expected: self.last_pong_bytes,
            });
        }
        self.missing_pong_cnt = 0;
        Ok(())
    }

    fn recv_open_channel(
        &mut self,
        host: &mut dyn Host,
        open_channel: OpenChannel,
    ) -> Result<(), Error> {
        self.require_stage(&[Lifecycle::InitExchanged])?;

        let remote_params = self.policy.validate_inbound(&open_channel)?;

        self.direction = Direction::Inbound;
        self.active_channel_id =
            ActiveChannelId::Temporary(open_channel.temporary_channel_id);
        self.funding_sat = open_channel.funding_satoshis;
        self.feerate_per_kw = open_channel.feerate_per_kw;
        self.remote_msat =
            open_channel.funding_satoshis * 1000 - open_channel.push_msat;
        self.local_msat = open_channel.push_msat;

        self.commit_remote = CommitParams {
            accept_htlcs: remote_params.max_accepted_htlcs,
            to_self_delay: self.local_params.to_self_delay,
            htlc_minimum_msat: remote_params.htlc_minimum_msat,
            max_htlc_in_flight_msat: remote_params
                .max_htlc_value_in_flight_msat,
            dust_limit_sat: remote_params.dust_limit_satoshis,
            last_signature: None,
        };
        self.commit_local = CommitParams {
            accept_htlcs: self.local_params.max_accepted_htlcs,
            to_self_delay: remote_params.to_self_delay,
            htlc_minimum_msat: self.local_params.htlc_minimum_msat,
            max_htlc_in_flight_msat: self
                .local_params
                .max_htlc_value_in_flight_msat,
            dust_limit_sat: self.local_params.dust_limit_satoshis,
            last_signature: None,
        };

        let remote_keys = RemoteKeyset::from(&open_channel);
        self.remote_pcp_unrevoked =
            Some(open_channel.first_per_commitment_point);
        self.remote_pcp_next = Some(open_channel.first_per_commitment_point);
        self.remote_keys = Some(remote_keys);

        self.request_funding_key(host)?;
        let funding_pubkey =
            self.local_keys.funding_pubkey().ok_or(Error::NoFundingKey)?;

        // both sides share one obscuring factor, opener basepoint first
        self.obscuring_factor = commitment::obscuring_factor(
            &open_channel.payment_basepoint,
            &self.local_keys.payment_basepoint.pk,
        );

        self.stage = Lifecycle::Accepted;
        let accept = Messages::AcceptChannel(AcceptChannel {
            temporary_channel_id: open_channel.temporary_channel_id,
            dust_limit_satoshis: self.local_params.dust_limit_satoshis,
            max_htlc_value_in_flight_msat: self
                .local_params
                .max_htlc_value_in_flight_msat,
            channel_reserve_satoshis: self
                .local_params
                .channel_reserve_satoshis,
            htlc_minimum_msat: self.local_params.htlc_minimum_msat,
            minimum_depth: self.common_params.minimum_depth,
            to_self_delay: self.local_params.to_self_delay,
            max_accepted_htlcs: self.local_params.max_accepted_htlcs,
            funding_pubkey,
            revocation_basepoint: self.local_keys.revocation_basepoint.pk,
            payment_basepoint: self.local_keys.payment_basepoint.pk,
            delayed_payment_basepoint: self
                .local_keys
                .delayed_payment_basepoint
                .pk,
            first_per_commitment_point: self.local_keys.per_commitment.pk,
        })
        .serialize();
        host.send_message(accept);
        Ok(())
    }

    fn recv_accept_channel(
        &mut self,
        host: &mut dyn Host,
        accept_channel: AcceptChannel,
    ) -> Result<(), Error> {
        self.require_stage(&[Lifecycle::Proposed])?;
        if !self.direction.is_outbound() {
            return Err(Error::InvalidReceiver);
        }
        if Some(accept_channel.temporary_channel_id)
            != self.active_channel_id.temp_channel_id()
        {
            return Err(self.fail(host, Error::ChannelIdMismatch));
        }

        let remote_params = self.policy.confirm_outbound(&accept_channel)?;
        self.commit_remote = CommitParams {
            accept_htlcs: remote_params.max_accepted_htlcs,
            to_self_delay: self.local_params.to_self_delay,
            htlc_minimum_msat: remote_params.htlc_minimum_msat,
            max_htlc_in_flight_msat: remote_params
                .max_htlc_value_in_flight_msat,
            dust_limit_sat: remote_params.dust_limit_satoshis,
            last_signature: None,
        };
        self.commit_local.to_self_delay = remote_params.to_self_delay;
        self.min_depth = accept_channel.minimum_depth;

        let remote_keys = RemoteKeyset::from(&accept_channel);
        self.remote_pcp_unrevoked =
            Some(accept_channel.first_per_commitment_point);
        self.remote_pcp_next =
            Some(accept_channel.first_per_commitment_point);
        self.remote_keys = Some(remote_keys);

        self.obscuring_factor = commitment::obscuring_factor(
            &self.local_keys.payment_basepoint.pk,
            &accept_channel.payment_basepoint,
        );

        // assemble the funding transaction from the registered input
        let funding_pubkey =
            self.local_keys.funding_pubkey().ok_or(Error::NoFundingKey)?;
        let redeem_script = scripts::funding_redeem_script(
            &funding_pubkey,
            &remote_keys.funding_pubkey,
        );
        let funding_input =
            self.funding_input.clone().ok_or(Error::NoFunding)?;
        let funding_tx = build_funding_tx(
            &funding_input,
            self.funding_sat,
            &redeem_script,
            self.feerate_per_kw,
        )?;
        let funding_txid = funding_tx.txid();
        self.funding = Some(Funding {
            txid: funding_txid,
            output_index: 0,
            amount_sat: self.funding_sat,
            redeem_script,
            local_first: scripts::funding_keys_local_first(
                &funding_pubkey,
                &remote_keys.funding_pubkey,
            ),
            funding_tx: Some(funding_tx.clone()),
        });

        // sign the acceptor's initial commitment
        let (built, signature) = self.sign_remote_commitment()?;
        debug_assert!(built.htlc_by_vout.iter().all(Option::is_none));
        self.commit_remote.last_signature = Some(signature);

        let temporary_channel_id = accept_channel.temporary_channel_id;
        self.stage = Lifecycle::Funding;
        host.send_message(
            Messages::FundingCreated(FundingCreated {
                temporary_channel_id,
                funding_txid,
                funding_output_index: 0,
                signature,
            })
            .serialize(),
        );
        host.funding_tx_wait(FundingWait {
            funding_tx: Some(funding_tx),
            funding_txid,
            min_depth: self.min_depth,
        });
        Ok(())
    }

    fn recv_funding_created(
        &mut self,
        host: &mut dyn Host,
        funding_created: FundingCreated,
    ) -> Result<(), Error> {
        self.require_stage(&[Lifecycle::Accepted])?;
        if !self.direction.is_inbound() {
            return Err(Error::InvalidReceiver);
        }
        if Some(funding_created.temporary_channel_id)
            != self.active_channel_id.temp_channel_id()
        {
            return Err(self.fail(host, Error::ChannelIdMismatch));
        }

        let funding_pubkey =
            self.local_keys.funding_pubkey().ok_or(Error::NoFundingKey)?;
        let remote_keys = self.remote_keys.ok_or(Error::NoRemoteKeys)?;
        let redeem_script = scripts::funding_redeem_script(
            &funding_pubkey,
            &remote_keys.funding_pubkey,
        );
        self.funding = Some(Funding {
            txid: funding_created.funding_txid,
            output_index: funding_created.funding_output_index,
            amount_sat: self.funding_sat,
            redeem_script,
            local_first: scripts::funding_keys_local_first(
                &funding_pubkey,
                &remote_keys.funding_pubkey,
            ),
            funding_tx: None,
        });

        // the opener's signature covers our initial commitment
        if let Err(err) =
            self.verify_local_commitment(&funding_created.signature)
        {
            self.funding = None;
            return Err(self.fail(host, err));
        }
        self.commit_local.last_signature = Some(funding_created.signature);

        // and we sign the opener's one
        let (_, signature) = self.sign_remote_commitment()?;
        self.commit_remote.last_signature = Some(signature);

        let channel_id = ChannelId::with(
            funding_created.funding_txid,
            funding_created.funding_output_index,
        );
        self.active_channel_id = ActiveChannelId::Final(channel_id);
        self.stage = Lifecycle::AwaitingConfirmation;

        host.send_message(
            Messages::FundingSigned(FundingSigned {
                channel_id,
                signature,
            })
            .serialize(),
        );
        host.funding_tx_wait(FundingWait {
            funding_tx: None,
            funding_txid: funding_created.funding_txid,
            min_depth: self.min_depth,
        });
        Ok(())
    }

    fn recv_funding_signed(
        &mut self,
        host: &mut dyn Host,
        funding_signed: FundingSigned,
    ) -> Result<(), Error> {
        self.require_stage(&[Lifecycle::Funding])?;
        if !self.direction.is_outbound() {
            return Err(Error::InvalidReceiver);
        }

        let funding = self.funding.as_ref().ok_or(Error::NoFunding)?;
        let channel_id =
            ChannelId::with(funding.txid, funding.output_index);
        if funding_signed.channel_id != channel_id {
            return Err(self.fail(host, Error::ChannelIdMismatch));
        }
        self.active_channel_id = ActiveChannelId::Final(channel_id);

        if let Err(err) =
            self.verify_local_commitment(&funding_signed.signature)
        {
            return Err(self.fail(host, err));
        }
        self.commit_local.last_signature = Some(funding_signed.signature);
        self.stage = Lifecycle::AwaitingConfirmation;
        Ok(())
    }

    fn recv_funding_locked(
        &mut self,
        host: &mut dyn Host,
        funding_locked: FundingLocked,
    ) -> Result<(), Error> {
        self.require_stage(&[
            Lifecycle::AwaitingConfirmation,
            Lifecycle::Locked,
        ])?;
        if Some(funding_locked.channel_id) != self.channel_id() {
            return Err(self.fail(host, Error::ChannelIdMismatch));
        }

        // the previously announced point now backs the peer's newest
        // commitment; the announced one backs the next
        self.remote_pcp_unrevoked = self.remote_pcp_next;
        self.remote_pcp_next =
            Some(funding_locked.next_per_commitment_point);
        self.funding_locked_received = true;

        self.commitment_number_local = 0;
        self.commitment_number_remote = 0;
        self.htlc_id_num = 0;
        self.htlc_changed = 0;
        self.awaiting_revoke = false;

        self.after_funding_locked_progress(host);
        Ok(())
    }

    fn recv_shutdown(
        &mut self,
        host: &mut dyn Host,
        shutdown: Shutdown,
    ) -> Result<(), Error> {
        if self.is_closed() {
            debug!("shutdown on closed channel ignored");
            return Ok(());
        }
        if self.shutdown_flags & SHUTDOWN_RECEIVED != 0 {
            debug!("duplicate shutdown ignored");
            return Ok(());
        }
        if Some(shutdown.channel_id) != self.channel_id() {
            return Err(self.fail(host, Error::ChannelIdMismatch));
        }

        self.shutdown_script_remote = Some(shutdown.scriptpubkey);
        self.shutdown_flags |= SHUTDOWN_RECEIVED;

        if self.shutdown_flags & SHUTDOWN_SENT == 0 {
            // the peer requests the close: answer with our shutdown
            let reply = self.compose_shutdown()?;
            host.send_message(reply);
        } else {
            // we requested the close: open fee negotiation
            self.stage = Lifecycle::Negotiating;
            let closing_signed = self.make_closing_signed()?;
            host.send_message(
                Messages::ClosingSigned(closing_signed).serialize(),
            );
        }
        if self.shutdown_flags == SHUTDOWN_SENT | SHUTDOWN_RECEIVED
            && self.stage != Lifecycle::Negotiating
        {
            self.stage = Lifecycle::Negotiating;
        }
        Ok(())
    }

    fn recv_closing_signed(
        &mut self,
        node: &mut Node,
        host: &mut dyn Host,
        closing_signed: ClosingSigned,
    ) -> Result<(), Error> {
        if self.is_closed() {
            debug!("closing_signed on closed channel ignored");
            return Ok(());
        }
        self.require_stage(&[Lifecycle::Negotiating])?;
        if Some(closing_signed.channel_id) != self.channel_id() {
            return Err(self.fail(host, Error::ChannelIdMismatch));
        }

        // accept the proposed fee, rebuild and cross-sign
        self.close_fee_sat = closing_signed.fee_satoshis;
        let funding = self.funding.clone().ok_or(Error::NoFunding)?;
        let mut closing_tx = self.build_closing_tx()?;
        let funding_keypair = self
            .local_keys
            .funding
            .as_ref()
            .ok_or(Error::NoFundingKey)?;
        let local_sig = commitment::sign_funding_input(
            &closing_tx,
            &funding.redeem_script,
            funding.amount_sat,
            &funding_keypair.sk,
        )?;
        let remote_keys = self.remote_keys.ok_or(Error::NoRemoteKeys)?;
        if let Err(err) = commitment::verify_funding_signature(
            &closing_tx,
            &funding.redeem_script,
            funding.amount_sat,
            &closing_signed.signature,
            &remote_keys.funding_pubkey,
        ) {
            return Err(self.fail(host, err.into()));
        }
        commitment::finalize_funding_input(
            &mut closing_tx,
            &funding.redeem_script,
            &local_sig,
            &closing_signed.signature,
            funding.local_first,
        );

        let reply = Messages::ClosingSigned(ClosingSigned {
            channel_id: closing_signed.channel_id,
            fee_satoshis: self.close_fee_sat,
            signature: local_sig,
        })
        .serialize();

        self.stage = Lifecycle::Closed;
        if let Some(short_channel_id) = self.short_channel_id {
            node.forget_channel(short_channel_id);
        }
        debug!("channel {} mutually closed", closing_signed.channel_id);
        host.closed(ClosedNotice { reply, closing_tx });
        Ok(())
    }

    fn recv_update_add_htlc(
        &mut self,
        node: &mut Node,
        host: &mut dyn Host,
        update_add_htlc: UpdateAddHtlc,
    ) -> Result<(), Error> {
        self.require_stage(&[Lifecycle::Active])?;
        if Some(update_add_htlc.channel_id) != self.channel_id() {
            return Err(self.fail(host, Error::ChannelIdMismatch));
        }

        host.add_htlc_preview();

        if update_add_htlc.amount_msat == 0
            || update_add_htlc.amount_msat
                < self.commit_local.htlc_minimum_msat
        {
            return Err(Error::HtlcAmountTooSmall {
                amount: update_add_htlc.amount_msat,
                minimum: self.commit_local.htlc_minimum_msat.max(1),
            });
        }
        let accept_limit = self
            .commit_local
            .accept_htlcs
            .min(self.commit_remote.accept_htlcs);
        if self.htlc_count() >= accept_limit as usize {
            return Err(Error::HtlcCountExceeded(accept_limit));
        }
        let pending = self.pending_msat() + update_add_htlc.amount_msat;
        if pending > self.commit_local.max_htlc_in_flight_msat {
            return Err(Error::HtlcInFlightExceeded {
                pending,
                limit: self.commit_local.max_htlc_in_flight_msat,
            });
        }
        if update_add_htlc.amount_msat > self.remote_msat {
            return Err(Error::InsufficientBalance {
                balance: self.remote_msat,
                amount: update_add_htlc.amount_msat,
            });
        }

        let (hop, _next_packet) = node
            .read_onion(&update_add_htlc.onion_routing_packet)
            .ok_or(Error::OnionFailure)?;

        // staged changes below are rolled back if the host rejects
        let backup_remote_msat = self.remote_msat;
        let backup_changed = self.htlc_changed;
        let id = update_add_htlc.htlc_id;
        self.received_htlcs.insert(id, Htlc {
            direction: HtlcDirection::Received,
            id,
            amount_msat: update_add_htlc.amount_msat,
            cltv_expiry: update_add_htlc.cltv_expiry,
            payment_hash: update_add_htlc.payment_hash,
            onion_packet: update_add_htlc.onion_routing_packet.clone(),
            signature: None,
            origin_short_channel_id: self
                .short_channel_id
                .map(|scid| scid.as_u64())
                .unwrap_or(0),
        });
        self.remote_msat -= update_add_htlc.amount_msat;
        self.htlc_changed |= FULFILL_SEND_PENDING;

        let accepted = host.add_htlc_received(AddHtlcNotice {
            id,
            payment_hash: update_add_htlc.payment_hash,
            hop,
            amount_msat: update_add_htlc.amount_msat,
            cltv_expiry: update_add_htlc.cltv_expiry,
        });
        if !accepted {
            debug!("host rejected HTLC {}; rolling back", id);
            self.received_htlcs.remove(&id);
            self.remote_msat = backup_remote_msat;
            self.htlc_changed = backup_changed;
            return Err(Error::HostRejected);
        }
        debug!(
            "HTLC recv: id={}, amount_msat={}, pending={}",
            id,
            update_add_htlc.amount_msat,
            self.htlc_count()
        );
        Ok(())
    }

    fn recv_update_fulfill_htlc(
        &mut self,
        host: &mut dyn Host,
        update_fulfill_htlc: UpdateFulfillHtlc,
    ) -> Result<(), Error> {
        self.require_stage(&[Lifecycle::Active])?;
        if Some(update_fulfill_htlc.channel_id) != self.channel_id() {
            return Err(self.fail(host, Error::ChannelIdMismatch));
        }

        let id = update_fulfill_htlc.htlc_id;
        let htlc = self
            .offered_htlcs
            .get(&id)
            .ok_or(Error::UnknownHtlc(id))?;
        if HashLock::from_preimage(&update_fulfill_htlc.payment_preimage)
            != htlc.payment_hash
        {
            return Err(self.fail(host, Error::PreimageMismatch(id)));
        }

        let amount_msat = htlc.amount_msat;
        let origin_short_channel_id = htlc.origin_short_channel_id;
        self.offered_htlcs.remove(&id);
        self.remote_msat += amount_msat;
        self.htlc_changed |= FULFILL_RECV_PENDING;
        debug!(
            "HTLC settled by peer: id={}, amount_msat={}, remote_msat={}",
            id, amount_msat, self.remote_msat
        );

        host.fulfill_htlc_received(FulfillHtlcNotice {
            id,
            preimage: update_fulfill_htlc.payment_preimage,
            origin_short_channel_id,
        });

        // the settlement starts a commitment round from our side,
        // unless one of our commitments is still awaiting revocation
        if !self.awaiting_revoke {
            let commitment_signed = self.make_commitment_signed()?;
            host.send_message(
                Messages::CommitmentSigned(commitment_signed).serialize(),
            );
        }
        Ok(())
    }

    fn recv_commitment_signed(
        &mut self,
        host: &mut dyn Host,
        commitment_signed: CommitmentSigned,
    ) -> Result<(), Error> {
        if Some(commitment_signed.channel_id) != self.channel_id() {
            return Err(self.fail(host, Error::ChannelIdMismatch));
        }

        // replayed round: already processed, nothing changes
        if self.commit_local.last_signature
            == Some(commitment_signed.signature)
        {
            debug!("replayed commitment_signed ignored");
            return Ok(());
        }

        let next_number = self.commitment_number_local + 1;
        let built = self.build_local_commitment(next_number)?;
        let remote_keys = self.remote_keys.ok_or(Error::NoRemoteKeys)?;
        let funding = self.funding.as_ref().ok_or(Error::NoFunding)?;

        if let Err(err) = commitment::verify_funding_signature(
            &built.tx,
            &funding.redeem_script,
            funding.amount_sat,
            &commitment_signed.signature,
            &remote_keys.funding_pubkey,
        ) {
            return Err(self.fail(host, err.into()));
        }

        // verify the second-tier signature of every non-dust HTLC
        let keys = self.local_script_keys()?;
        let views = self.local_htlc_views();
        let commit_txid = built.tx.txid();
        let mut htlc_refs = Vec::new();
        let mut sig_index = 0usize;
        for (vout, backing) in built.htlc_by_vout.iter().enumerate() {
            let index = match backing {
                Some(index) => *index,
                None => continue,
            };
            let view = &views[index];
            let signature = match commitment_signed
                .htlc_signatures
                .get(sig_index)
            {
                Some(signature) => *signature,
                None => {
                    return Err(self.fail(
                        host,
                        commitment::Error::HtlcSigCount {
                            carried: commitment_signed.htlc_signatures.len(),
                            expected: sig_index + 1,
                        }
                        .into(),
                    ))
                }
            };
            let htlc_tx = commitment::build_htlc_tx(
                commit_txid,
                vout as u32,
                &view.0,
                &keys,
                self.commit_local.to_self_delay,
                &built.fees,
            );
            let htlc_script = commitment::htlc_witness_script(&view.0, &keys);
            if let Err(err) = commitment::verify_htlc_signature(
                &htlc_tx,
                &htlc_script,
                built.tx.output[vout].value,
                &signature,
                &remote_keys.funding_pubkey,
                vout,
            ) {
                return Err(self.fail(host, err.into()));
            }
            htlc_refs.push((view.1, signature));
            sig_index += 1;
        }
        if sig_index != commitment_signed.htlc_signatures.len() {
            return Err(self.fail(
                host,
                commitment::Error::HtlcSigCount {
                    carried: commitment_signed.htlc_signatures.len(),
                    expected: sig_index,
                }
                .into(),
            ));
        }

        // everything verified: commit atomically
        self.commitment_number_local = next_number;
        self.commit_local.last_signature = Some(commitment_signed.signature);
        for ((direction, id), signature) in htlc_refs {
            let map = match direction {
                HtlcDirection::Offered => &mut self.offered_htlcs,
                HtlcDirection::Received => &mut self.received_htlcs,
            };
            if let Some(htlc) = map.get_mut(&id) {
                htlc.signature = Some(signature);
            }
        }

        // answer with the revocation of the superseded commitment
        let prev_secret = derkey::secret_from_seed(
            &self.storage_seed,
            self.storage_index + 1,
        );
        let next_per_commitment_point = self.advance_local_ratchet();
        let channel_id = commitment_signed.channel_id;
        host.send_message(
            Messages::RevokeAndAck(RevokeAndAck {
                channel_id,
                per_commitment_secret: prev_secret.into_inner(),
                next_per_commitment_point,
            })
            .serialize(),
        );

        // a round started by the peer's update is answered with our
        // own commitment, unless ours is already in flight
        if self.htlc_changed & FULFILL_SEND_PENDING != 0
            && !self.awaiting_revoke
        {
            let commitment_signed = self.make_commitment_signed()?;
            host.send_message(
                Messages::CommitmentSigned(commitment_signed).serialize(),
            );
        }
        let settled = self.htlc_changed & FULFILL_RECV_PENDING != 0;
        self.htlc_changed &= !FULFILL_RECV_PENDING;
        host.commitment_signed_received(settled);
        Ok(())
    }

    fn recv_revoke_and_ack(
        &mut self,
        host: &mut dyn Host,
        revoke_and_ack: RevokeAndAck,
    ) -> Result<(), Error> {
        if Some(revoke_and_ack.channel_id) != self.channel_id() {
            return Err(self.fail(host, Error::ChannelIdMismatch));
        }

        let secret =
            Slice32::from_inner(revoke_and_ack.per_commitment_secret);
        let revealed_point = derkey::point_from_secret(&secret);

        // replayed revocation: the secret is already in storage
        if self
            .peer_storage
            .secret_for(self.peer_storage_index + 1)
            .map(|stored| stored == secret)
            .unwrap_or(false)
        {
            debug!("replayed revoke_and_ack ignored");
            return Ok(());
        }

        if Some(revealed_point) != self.remote_pcp_unrevoked {
            return Err(self.fail(host, Error::PrevSecretMismatch));
        }
        if let Err(err) = self
            .peer_storage
            .insert(secret, self.peer_storage_index)
        {
            return Err(self.fail(host, err.into()));
        }
        self.peer_storage_index -= 1;

        self.remote_pcp_unrevoked = self.remote_pcp_next;
        self.remote_pcp_next =
            Some(revoke_and_ack.next_per_commitment_point);
        self.awaiting_revoke = false;

        let settled = self.htlc_changed & FULFILL_SEND_PENDING != 0;
        self.htlc_changed &= !FULFILL_SEND_PENDING;
        host.htlc_changed(settled);
        Ok(())
    }

    fn recv_announcement_signatures(
        &mut self,
        host: &mut dyn Host,
        announcement_signatures: AnnouncementSignatures,
    ) -> Result<(), Error> {
        if Some(announcement_signatures.channel_id) != self.channel_id() {
            return Err(self.fail(host, Error::ChannelIdMismatch));
        }
        self.remote_announcement_sigs = Some((
            announcement_signatures.node_signature,
            announcement_signatures.bitcoin_signature,
        ));
        host.announcement_signatures_received(
            announcement_signatures.short_channel_id,
        );
        Ok(())
    }

    // Commitment plumbing --------------------------------------------

    /// Snapshot of the channel's pending HTLCs as views onto the local
    /// commitment, paired with their identities.
    fn local_htlc_views(&self) -> Vec<(HtlcView, (HtlcDirection, u64))> {
        let mut views = Vec::with_capacity(self.htlc_count());
        for htlc in self.offered_htlcs.values() {
            views.push((
                HtlcView {
                    offered: true,
                    amount_msat: htlc.amount_msat,
                    cltv_expiry: htlc.cltv_expiry,
                    payment_hash: htlc.payment_hash,
                },
                (HtlcDirection::Offered, htlc.id),
            ));
        }
        for htlc in self.received_htlcs.values() {
            views.push((
                HtlcView {
                    offered: false,
                    amount_msat: htlc.amount_msat,
                    cltv_expiry: htlc.cltv_expiry,
                    payment_hash: htlc.payment_hash,
                },
                (HtlcDirection::Received, htlc.id),
            ));
        }
        views
    }

    /// The same set as views onto the remote commitment, where the
    /// directions flip.
    fn remote_htlc_views(&self) -> Vec<(HtlcView, (HtlcDirection, u64))> {
        self.local_htlc_views()
            .into_iter()
            .map(|(view, reference)| {
                (
                    HtlcView {
                        offered: !view.offered,
                        ..view
                    },
                    reference,
                )
            })
            .collect()
    }

    fn local_script_keys(&self) -> Result<ScriptKeys, Error> {
        let remote_keys = self.remote_keys.ok_or(Error::NoRemoteKeys)?;
        Ok(ScriptKeys::derive(
            &self.local_keys.per_commitment.pk,
            &self.local_keys.payment_basepoint.pk,
            &remote_keys.payment_basepoint,
            &remote_keys.revocation_basepoint,
            &self.local_keys.delayed_payment_basepoint.pk,
        ))
    }

    fn remote_script_keys(&self) -> Result<ScriptKeys, Error> {
        let remote_keys = self.remote_keys.ok_or(Error::NoRemoteKeys)?;
        let per_commitment_point =
            self.remote_pcp_next.ok_or(Error::NoRemoteKeys)?;
        Ok(ScriptKeys::derive(
            &per_commitment_point,
            &remote_keys.payment_basepoint,
            &self.local_keys.payment_basepoint.pk,
            &self.local_keys.revocation_basepoint.pk,
            &remote_keys.delayed_payment_basepoint,
        ))
    }

    fn build_local_commitment(
        &self,
        commitment_number: u64,
    ) -> Result<BuiltCommitment, Error> {
        let funding = self.funding.as_ref().ok_or(Error::NoFunding)?;
        let remote_keys = self.remote_keys.ok_or(Error::NoRemoteKeys)?;
        let params = CommitmentParams {
            funding_outpoint: funding.outpoint(),
            funding_sat: funding.amount_sat,
            obscured_commitment_number: commitment::obscure_commitment_number(
                commitment_number,
                self.obscuring_factor,
            ),
            to_local_msat: self.local_msat,
            to_remote_msat: self.remote_msat,
            holder_pays_fee: self.direction.is_outbound(),
            to_self_delay: self.commit_local.to_self_delay,
            dust_limit_sat: self.commit_local.dust_limit_sat,
            feerate_per_kw: self.feerate_per_kw,
            keys: self.local_script_keys()?,
            to_remote_key: remote_keys.payment_basepoint,
            htlcs: self
                .local_htlc_views()
                .into_iter()
                .map(|(view, _)| view)
                .collect(),
        };
        Ok(commitment::build_commitment(&params))
    }

    fn build_remote_commitment(
        &self,
        commitment_number: u64,
    ) -> Result<BuiltCommitment, Error> {
        let funding = self.funding.as_ref().ok_or(Error::NoFunding)?;
        let params = CommitmentParams {
            funding_outpoint: funding.outpoint(),
            funding_sat: funding.amount_sat,
            obscured_commitment_number: commitment::obscure_commitment_number(
                commitment_number,
                self.obscuring_factor,
            ),
            to_local_msat: self.remote_msat,
            to_remote_msat: self.local_msat,
            holder_pays_fee: self.direction.is_inbound(),
            to_self_delay: self.commit_remote.to_self_delay,
            dust_limit_sat: self.commit_remote.dust_limit_sat,
            feerate_per_kw: self.feerate_per_kw,
            keys: self.remote_script_keys()?,
            to_remote_key: self.local_keys.payment_basepoint.pk,
            htlcs: self
                .remote_htlc_views()
                .into_iter()
                .map(|(view, _)| view)
                .collect(),
        };
        Ok(commitment::build_commitment(&params))
    }

    /// Builds the peer's current commitment and signs its funding
    /// input. Used during establishment where no HTLCs exist.
    fn sign_remote_commitment(
        &self,
    ) -> Result<(BuiltCommitment, Signature), Error> {
        let built =
            self.build_remote_commitment(self.commitment_number_remote)?;
        let funding = self.funding.as_ref().ok_or(Error::NoFunding)?;
        let funding_keypair = self
            .local_keys
            .funding
            .as_ref()
            .ok_or(Error::NoFundingKey)?;
        let signature = commitment::sign_funding_input(
            &built.tx,
            &funding.redeem_script,
            funding.amount_sat,
            &funding_keypair.sk,
        )?;
        Ok((built, signature))
    }

    /// Verifies the peer's funding signature over our current
    /// commitment. Used during establishment.
    fn verify_local_commitment(
        &self,
        signature: &Signature,
    ) -> Result<(), Error> {
        let built =
            self.build_local_commitment(self.commitment_number_local)?;
        let funding = self.funding.as_ref().ok_or(Error::NoFunding)?;
        let remote_keys = self.remote_keys.ok_or(Error::NoRemoteKeys)?;
        commitment::verify_funding_signature(
            &built.tx,
            &funding.redeem_script,
            funding.amount_sat,
            signature,
            &remote_keys.funding_pubkey,
        )?;
        Ok(())
    }

    /// Builds, signs and records a `commitment_signed` for the peer's
    /// next commitment.
    fn make_commitment_signed(
        &mut self,
    ) -> Result<CommitmentSigned, Error> {
        let channel_id = self.channel_id().ok_or(Error::NoChannelId)?;
        let next_number = self.commitment_number_remote + 1;
        let built = self.build_remote_commitment(next_number)?;
        let funding = self.funding.as_ref().ok_or(Error::NoFunding)?;
        let funding_keypair = self
            .local_keys
            .funding
            .as_ref()
            .ok_or(Error::NoFundingKey)?;

        let signature = commitment::sign_funding_input(
            &built.tx,
            &funding.redeem_script,
            funding.amount_sat,
            &funding_keypair.sk,
        )?;

        let keys = self.remote_script_keys()?;
        let views = self.remote_htlc_views();
        let commit_txid = built.tx.txid();
        let mut htlc_signatures = Vec::new();
        for (vout, backing) in built.htlc_by_vout.iter().enumerate() {
            let index = match backing {
                Some(index) => *index,
                None => continue,
            };
            let htlc_tx = commitment::build_htlc_tx(
                commit_txid,
                vout as u32,
                &views[index].0,
                &keys,
                self.commit_remote.to_self_delay,
                &built.fees,
            );
            let htlc_script =
                commitment::htlc_witness_script(&views[index].0, &keys);
            htlc_signatures.push(commitment::sign_htlc_tx(
                &htlc_tx,
                &htlc_script,
                built.tx.output[vout].value,
                &funding_keypair.sk,
            )?);
        }

        self.commitment_number_remote = next_number;
        self.commit_remote.last_signature = Some(signature);
        self.awaiting_revoke = true;
        Ok(CommitmentSigned {
            channel_id,
            signature,
            htlc_signatures,
        })
    }

    fn make_closing_signed(&mut self) -> Result<ClosingSigned, Error> {
        let channel_id = self.channel_id().ok_or(Error::NoChannelId)?;
        let funding = self.funding.clone().ok_or(Error::NoFunding)?;
        let closing_tx = self.build_closing_tx()?;
        let funding_keypair = self
            .local_keys
            .funding
            .as_ref()
            .ok_or(Error::NoFundingKey)?;
        let signature = commitment::sign_funding_input(
            &closing_tx,
            &funding.redeem_script,
            funding.amount_sat,
            &funding_keypair.sk,
        )?;
        Ok(ClosingSigned {
            channel_id,
            fee_satoshis: self.close_fee_sat,
            signature,
        })
    }

    fn build_closing_tx(&self) -> Result<Transaction, Error> {
        let funding = self.funding.as_ref().ok_or(Error::NoFunding)?;
        let local_script = self
            .shutdown_script_local
            .as_ref()
            .ok_or(Error::NoShutdownScript)?;
        let remote_script = self
            .shutdown_script_remote
            .as_ref()
            .ok_or(Error::NoShutdownScript)?;
        Ok(commitment::build_closing_tx(
            funding.outpoint(),
            local_script,
            remote_script,
            self.local_msat,
            self.remote_msat,
            self.close_fee_sat,
            self.commit_local.dust_limit_sat,
        )?)
    }

    // Internal helpers -----------------------------------------------

    fn pending_msat(&self) -> u64 {
        self.offered_htlcs
            .values()
            .chain(self.received_htlcs.values())
            .map(|htlc| htlc.amount_msat)
            .sum()
    }

    /// Derives the next local per-commitment keypair: derive, publish,
    /// decrement.
    fn advance_local_ratchet(&mut self) -> PublicKey {
        self.storage_index -= 1;
        let secret =
            derkey::secret_from_seed(&self.storage_seed, self.storage_index);
        self.local_keys.per_commitment = Keypair::from_secret(
            secp256k1::SecretKey::from_slice(secret.as_inner())
                .expect("ratchet secrets are valid keys"),
        );
        trace!("ratchet advanced to index {:#x}", self.storage_index);
        self.local_keys.per_commitment.pk
    }

    fn after_funding_locked_progress(&mut self, host: &mut dyn Host) {
        if self.funding_locked_sent && self.funding_locked_received {
            self.stage = Lifecycle::Active;
            if let Some(funding) = &self.funding {
                host.established(funding.txid);
            }
            debug!("channel established; normal operation available");
        } else {
            self.stage = Lifecycle::Locked;
        }
    }

    fn request_funding_key(
        &mut self,
        host: &mut dyn Host,
    ) -> Result<(), Error> {
        if self.local_keys.funding.is_none() {
            let funding_key =
                host.funding_key_request().ok_or(Error::NoFundingKey)?;
            self.local_keys.funding =
                Some(Keypair::from_secret(funding_key));
        }
        Ok(())
    }

    fn require_init(&self) -> Result<(), Error> {
        if self.init_sent && self.remote_features.is_some() {
            Ok(())
        } else {
            Err(Error::NoInit)
        }
    }

    fn require_stage(
        &self,
        required: &'static [Lifecycle],
    ) -> Result<(), Error> {
        if required.contains(&self.stage) {
            Ok(())
        } else {
            Err(Error::LifecycleMismatch {
                current: self.stage,
                required,
            })
        }
    }

    /// Marks the channel terminally failed and surfaces the error to
    /// the host.
    fn fail(&mut self, host: &mut dyn Host, error: Error) -> Error {
        warn!("channel failed: {}", error);
        self.stage = Lifecycle::Closed;
        host.error(&error.to_string());
        error
    }

    fn unsigned_channel_announcement(
        &self,
        node: &Node,
    ) -> Result<ChannelAnnouncement, Error> {
        let short_channel_id =
            self.short_channel_id.ok_or(Error::NoShortChannelId)?;
        let remote_node_id =
            self.remote_node_id.ok_or(Error::NoRemoteNodeId)?;
        let remote_keys = self.remote_keys.ok_or(Error::NoRemoteKeys)?;
        let local_funding =
            self.local_keys.funding_pubkey().ok_or(Error::NoFundingKey)?;

        let local_node_id = node.node_id();
        let placeholder = Signature::from_compact(&[1u8; 64])
            .expect("constant placeholder signature");
        let local_is_node_1 =
            local_node_id.serialize() <= remote_node_id.serialize();
        let (node_id_1, node_id_2, bitcoin_key_1, bitcoin_key_2) =
            if local_is_node_1 {
                (
                    local_node_id,
                    remote_node_id,
                    local_funding,
                    remote_keys.funding_pubkey,
                )
            } else {
                (
                    remote_node_id,
                    local_node_id,
                    remote_keys.funding_pubkey,
                    local_funding,
                )
            };
        Ok(ChannelAnnouncement {
            node_signature_1: placeholder,
            node_signature_2: placeholder,
            bitcoin_signature_1: placeholder,
            bitcoin_signature_2: placeholder,
            features: vec![],
            chain_hash: node.chain_hash(),
            short_channel_id,
            node_id_1,
            node_id_2,
            bitcoin_key_1,
            bitcoin_key_2,
        })
    }
}

impl Channel {
    /// Captures the persistent channel state. Transport keys and the
    /// `init` exchange are connection-scoped and not part of the
    /// snapshot.
    pub fn snapshot(&self) -> super::ChannelState {
        super::ChannelState {
            stage: self.stage,
            direction: self.direction,
            active_channel_id: self.active_channel_id,
            short_channel_id: self.short_channel_id,
            compat_zero_vout: self.compat_zero_vout,
            funding: self.funding.clone(),
            funding_sat: self.funding_sat,
            feerate_per_kw: self.feerate_per_kw,
            local_keys: self.local_keys.clone(),
            remote_keys: self.remote_keys,
            storage_seed: self.storage_seed,
            storage_index: self.storage_index,
            peer_storage: self.peer_storage.clone(),
            peer_storage_index: self.peer_storage_index,
            remote_pcp_unrevoked: self.remote_pcp_unrevoked,
            remote_pcp_next: self.remote_pcp_next,
            local_msat: self.local_msat,
            remote_msat: self.remote_msat,
            offered_htlcs: self.offered_htlcs.clone(),
            received_htlcs: self.received_htlcs.clone(),
            htlc_id_num: self.htlc_id_num,
            commit_local: self.commit_local,
            commit_remote: self.commit_remote,
            commitment_number_local: self.commitment_number_local,
            commitment_number_remote: self.commitment_number_remote,
            obscuring_factor: self.obscuring_factor,
            local_params: self.local_params,
            common_params: self.common_params,
            min_depth: self.min_depth,
            remote_node_id: self.remote_node_id,
            shutdown_flags: self.shutdown_flags,
            close_fee_sat: self.close_fee_sat,
            shutdown_script_local: self.shutdown_script_local.clone(),
            shutdown_script_remote: self.shutdown_script_remote.clone(),
            htlc_changed: self.htlc_changed,
            awaiting_revoke: self.awaiting_revoke,
            funding_locked_sent: self.funding_locked_sent,
            funding_locked_received: self.funding_locked_received,
            remote_announcement_sigs: self.remote_announcement_sigs,
        }
    }

    /// Rebuilds a channel from a snapshot. The transport starts fresh:
    /// the host re-runs the handshake and `init` exchange before
    /// further messages are processed.
    pub fn restore(state: super::ChannelState) -> Channel {
        let mut channel = Channel::new(state.storage_seed);
        channel.stage = state.stage;
        channel.direction = state.direction;
        channel.active_channel_id = state.active_channel_id;
        channel.short_channel_id = state.short_channel_id;
        channel.compat_zero_vout = state.compat_zero_vout;
        channel.funding = state.funding;
        channel.funding_sat = state.funding_sat;
        channel.feerate_per_kw = state.feerate_per_kw;
        channel.local_keys = state.local_keys;
        channel.remote_keys = state.remote_keys;
        channel.storage_index = state.storage_index;
        channel.peer_storage = state.peer_storage;
        channel.peer_storage_index = state.peer_storage_index;
        channel.remote_pcp_unrevoked = state.remote_pcp_unrevoked;
        channel.remote_pcp_next = state.remote_pcp_next;
        channel.local_msat = state.local_msat;
        channel.remote_msat = state.remote_msat;
        channel.offered_htlcs = state.offered_htlcs;
        channel.received_htlcs = state.received_htlcs;
        channel.htlc_id_num = state.htlc_id_num;
        channel.commit_local = state.commit_local;
        channel.commit_remote = state.commit_remote;
        channel.commitment_number_local = state.commitment_number_local;
        channel.commitment_number_remote = state.commitment_number_remote;
        channel.obscuring_factor = state.obscuring_factor;
        channel.local_params = state.local_params;
        channel.common_params = state.common_params;
        channel.min_depth = state.min_depth;
        channel.remote_node_id = state.remote_node_id;
        channel.shutdown_flags = state.shutdown_flags;
        channel.close_fee_sat = state.close_fee_sat;
        channel.shutdown_script_local = state.shutdown_script_local;
        channel.shutdown_script_remote = state.shutdown_script_remote;
        channel.htlc_changed = state.htlc_changed;
        channel.awaiting_revoke = state.awaiting_revoke;
        channel.funding_locked_sent = state.funding_locked_sent;
        channel.funding_locked_received = state.funding_locked_received;
        channel.remote_announcement_sigs = state.remote_announcement_sigs;
        channel
    }
}

/// Assembles the unsigned funding transaction: the 2-of-2 output at
/// vout 0, change at vout 1. The estimated witness cost of the spent
/// P2WPKH input is included in the fee.
fn build_funding_tx(
    input: &FundingInput,
    funding_sat: u64,
    redeem_script: &Script,
    feerate_per_kw: u32,
) -> Result<Transaction, Error> {
    let mut tx = Transaction {
        version: 2,
        lock_time: PackedLockTime::ZERO,
        input: vec![TxIn {
            previous_output: input.outpoint,
            script_sig: Script::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![
            TxOut {
                value: funding_sat,
                script_pubkey: redeem_script.to_v0_p2wsh(),
            },
            TxOut {
                value: 0,
                script_pubkey: input.change_script.clone(),
            },
        ],
    };

    // base size + signature(72) and pubkey(33) pushes, in weight units
    let base_size = bitcoin::consensus::serialize(&tx).len() as u64;
    let fee = (base_size + 1 + 72 + 1 + 33) * 4 * feerate_per_kw as u64 / 1000;
    let required = funding_sat + fee;
    if input.amount_sat < required {
        return Err(Error::InsufficientFunding {
            required,
            available: input.amount_sat,
        });
    }
    tx.output[1].value = input.amount_sat - required;
    Ok(tx)
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use secp256k1::SecretKey;

    use super::*;
    use crate::preimage_hash;

    struct TestHost {
        funding_key: SecretKey,
        accept_htlcs: bool,
        sent: Vec<Vec<u8>>,
        errors: Vec<String>,
        established: bool,
        funding_waits: Vec<FundingWait>,
        closed: Option<ClosedNotice>,
        add_notices: Vec<AddHtlcNotice>,
        fulfill_notices: Vec<FulfillHtlcNotice>,
        preview_order_ok: bool,
        previewed: bool,
    }

    impl TestHost {
        fn new(key_byte: u8) -> TestHost {
            TestHost {
                funding_key: SecretKey::from_slice(&[key_byte; 32]).unwrap(),
                accept_htlcs: true,
                sent: vec![],
                errors: vec![],
                established: false,
                funding_waits: vec![],
                closed: None,
                add_notices: vec![],
                fulfill_notices: vec![],
                preview_order_ok: true,
                previewed: false,
            }
        }

        fn drain(&mut self) -> Vec<Vec<u8>> {
            std::mem::take(&mut self.sent)
        }
    }

    impl Host for TestHost {
        fn error(&mut self, message: &str) {
            self.errors.push(message.to_owned());
        }

        fn funding_key_request(&mut self) -> Option<SecretKey> {
            Some(self.funding_key)
        }

        fn funding_tx_wait(&mut self, funding: FundingWait) {
            self.funding_waits.push(funding);
        }

        fn established(&mut self, _funding_txid: Txid) {
            self.established = true;
        }

        fn add_htlc_preview(&mut self) {
            self.previewed = true;
        }

        fn add_htlc_received(&mut self, htlc: AddHtlcNotice) -> bool {
            if !self.previewed {
                self.preview_order_ok = false;
            }
            self.add_notices.push(htlc);
            self.accept_htlcs
        }

        fn fulfill_htlc_received(&mut self, fulfill: FulfillHtlcNotice) {
            self.fulfill_notices.push(fulfill);
        }

        fn closed(&mut self, close: ClosedNotice) {
            self.closed = Some(close);
        }

        fn send_message(&mut self, message: Vec<u8>) {
            self.sent.push(message);
        }
    }

    struct Pair {
        a: Channel,
        b: Channel,
        node_a: Node,
        node_b: Node,
        host_a: TestHost,
        host_b: TestHost,
    }

    fn new_pair() -> Pair {
        let node_a = Node::with(
            SecretKey::from_slice(&[0x77; 32]).unwrap(),
            "alice",
            0x08,
        );
        let node_b = Node::with(
            SecretKey::from_slice(&[0x78; 32]).unwrap(),
            "bob",
            0x08,
        );
        let mut a = Channel::new(Slice32::from_inner([0xAA; 32]));
        let mut b = Channel::new(Slice32::from_inner([0xBB; 32]));
        a.set_establish(
            Policy::default(),
            PeerParams::default(),
            CommonParams::default(),
            Some(node_b.node_id()),
        );
        b.set_establish(
            Policy::default(),
            PeerParams::default(),
            CommonParams::default(),
            Some(node_a.node_id()),
        );
        Pair {
            a,
            b,
            node_a,
            node_b,
            host_a: TestHost::new(0x51),
            host_b: TestHost::new(0x52),
        }
    }

    fn exchange_init(pair: &mut Pair) {
        let init_a = pair.a.compose_init().unwrap();
        let init_b = pair.b.compose_init().unwrap();
        pair.b
            .recv(&mut pair.node_b, &mut pair.host_b, &init_a)
            .unwrap();
        pair.a
            .recv(&mut pair.node_a, &mut pair.host_a, &init_b)
            .unwrap();
        assert_eq!(pair.a.stage(), Lifecycle::InitExchanged);
        assert_eq!(pair.b.stage(), Lifecycle::InitExchanged);
    }

    fn funding_input() -> FundingInput {
        FundingInput {
            outpoint: OutPoint::new(
                Txid::from_str(
                    "8984484a580b825b9972d7adb15050b3ab624ccd731946b3eeddb92f4e7ef6be",
                )
                .unwrap(),
                1,
            ),
            amount_sat: 2_000_000,
            change_script: Script::from(vec![
                0x00, 0x14, 0x3c, 0xa3, 0x3c, 0x2e, 0x44, 0x46, 0xf4, 0xa3,
                0x05, 0xf2, 0x3c, 0x80, 0xdf, 0x8a, 0xd1, 0xaf, 0xdc, 0xf6,
                0x52, 0xf9,
            ]),
        }
    }

    /// Drives both channels through establishment: open 1_000_000 sat
    /// with 100_000 sat pushed, min_depth 3 confirmations.
    fn establish(pair: &mut Pair) {
        exchange_init(pair);

        let open = pair
            .a
            .compose_open_channel(
                &mut pair.host_a,
                funding_input(),
                1_000_000,
                100_000_000,
            )
            .unwrap();
        pair.b
            .recv(&mut pair.node_b, &mut pair.host_b, &open)
            .unwrap();
        let accept = pair.host_b.drain().remove(0);

        pair.a
            .recv(&mut pair.node_a, &mut pair.host_a, &accept)
            .unwrap();
        let mut sent = pair.host_a.drain();
        let funding_created = sent.remove(0);
        assert_eq!(pair.host_a.funding_waits.len(), 1);
        assert_eq!(pair.host_a.funding_waits[0].min_depth, 3);

        pair.b
            .recv(&mut pair.node_b, &mut pair.host_b, &funding_created)
            .unwrap();
        let funding_signed = pair.host_b.drain().remove(0);
        assert_eq!(pair.host_b.funding_waits.len(), 1);

        pair.a
            .recv(&mut pair.node_a, &mut pair.host_a, &funding_signed)
            .unwrap();
        assert_eq!(pair.a.stage(), Lifecycle::AwaitingConfirmation);
        assert_eq!(pair.b.stage(), Lifecycle::AwaitingConfirmation);

        // both sides see min_depth confirmations
        pair.a.set_funding_info(500_000, 17);
        pair.a.funding_tx_confirmed(&mut pair.host_a).unwrap();
        let locked_a = pair.host_a.drain().remove(0);
        pair.b.set_funding_info(500_000, 17);
        pair.b.funding_tx_confirmed(&mut pair.host_b).unwrap();
        let locked_b = pair.host_b.drain().remove(0);

        pair.b
            .recv(&mut pair.node_b, &mut pair.host_b, &locked_a)
            .unwrap();
        pair.a
            .recv(&mut pair.node_a, &mut pair.host_a, &locked_b)
            .unwrap();

        assert_eq!(pair.a.stage(), Lifecycle::Active);
        assert_eq!(pair.b.stage(), Lifecycle::Active);
        assert!(pair.host_a.established && pair.host_b.established);
    }

    fn preimage(fill: &[u8]) -> HashPreimage {
        let mut raw = [0u8; 32];
        raw[..fill.len()].copy_from_slice(fill);
        HashPreimage::from_inner(Slice32::from_inner(raw))
    }

    /// Relays every queued message between the two peers until both
    /// queues run dry.
    fn pump(pair: &mut Pair) {
        loop {
            let to_b = pair.host_a.drain();
            for message in &to_b {
                pair.b
                    .recv(&mut pair.node_b, &mut pair.host_b, message)
                    .unwrap();
            }
            let to_a = pair.host_b.drain();
            for message in &to_a {
                pair.a
                    .recv(&mut pair.node_a, &mut pair.host_a, message)
                    .unwrap();
            }
            if to_b.is_empty() && to_a.is_empty() {
                break;
            }
        }
    }

    /// Runs the full HTLC round of a single payment from A to B:
    /// add + commit from A, the commit/revoke ping-pong, then B's
    /// fulfillment and the closing commitment round.
    fn pay(pair: &mut Pair, amount_msat: u64, pre: HashPreimage) {
        let hash = HashLock::from_preimage(&pre);
        let add = pair
            .a
            .compose_add_htlc(
                amount_msat,
                500_010,
                hash,
                OnionPacket::default(),
                0,
            )
            .unwrap();
        let commit_a = pair.a.compose_commit_signed().unwrap();
        pair.b
            .recv(&mut pair.node_b, &mut pair.host_b, &add)
            .unwrap();
        pair.b
            .recv(&mut pair.node_b, &mut pair.host_b, &commit_a)
            .unwrap();
        pump(pair);
        assert_eq!(pair.a.htlc_count(), 1);
        assert_eq!(pair.b.htlc_count(), 1);
        // balances plus the pending HTLC always add up to the funding
        assert_eq!(
            pair.a.local_msat() + pair.a.remote_msat() + amount_msat,
            1_000_000_000
        );
        assert_eq!(
            pair.b.local_msat() + pair.b.remote_msat() + amount_msat,
            1_000_000_000
        );

        // B settles the HTLC with the preimage
        let id = pair.host_b.add_notices.last().unwrap().id;
        let fulfill = pair.b.compose_fulfill_htlc(id, pre).unwrap();
        let commit_b = pair.b.compose_commit_signed().unwrap();
        pair.a
            .recv(&mut pair.node_a, &mut pair.host_a, &fulfill)
            .unwrap();
        pair.a
            .recv(&mut pair.node_a, &mut pair.host_a, &commit_b)
            .unwrap();
        pump(pair);

        assert_eq!(pair.a.htlc_count(), 0);
        assert_eq!(pair.b.htlc_count(), 0);
    }

    #[test]
    fn open_and_lock() {
        let mut pair = new_pair();
        establish(&mut pair);
        assert_eq!(pair.a.local_msat(), 900_000_000);
        assert_eq!(pair.a.remote_msat(), 100_000_000);
        assert_eq!(pair.b.local_msat(), 100_000_000);
        assert_eq!(pair.b.remote_msat(), 900_000_000);
        assert_eq!(pair.a.channel_id(), pair.b.channel_id());
    }

    #[test]
    fn no_message_before_init() {
        let mut pair = new_pair();
        let ping = Messages::Ping(Ping {
            num_pong_bytes: 1,
            byteslen: 0,
        })
        .serialize();
        let err = pair
            .b
            .recv(&mut pair.node_b, &mut pair.host_b, &ping)
            .unwrap_err();
        assert_eq!(err, Error::NoInit);
    }

    #[test]
    fn single_htlc_fulfillment() {
        let mut pair = new_pair();
        establish(&mut pair);
        pay(&mut pair, 50_000_000, preimage(b"pre"));

        assert_eq!(pair.a.local_msat(), 850_000_000);
        assert_eq!(pair.a.remote_msat(), 150_000_000);
        assert_eq!(pair.b.local_msat(), 150_000_000);
        assert_eq!(pair.b.remote_msat(), 850_000_000);
        assert!(pair.host_a.fulfill_notices.len() == 1);
        assert!(pair.host_b.preview_order_ok);

        // the disclosed preimage hashes to the payment hash
        let notice = &pair.host_a.fulfill_notices[0];
        assert_eq!(
            preimage_hash(notice.preimage.as_inner().as_inner()),
            *pair.host_b.add_notices[0]
                .payment_hash
                .as_inner()
                .as_inner(),
        );
    }

    #[test]
    fn balances_conserved_through_rounds() {
        let mut pair = new_pair();
        establish(&mut pair);
        for round in 0..3u8 {
            pay(&mut pair, 10_000_000, preimage(&[round + 1]));
            assert_eq!(
                pair.a.local_msat() + pair.a.remote_msat(),
                1_000_000_000
            );
            assert_eq!(
                pair.b.local_msat() + pair.b.remote_msat(),
                1_000_000_000
            );
        }
    }

    #[test]
    fn htlc_minimum_enforced() {
        let mut pair = new_pair();
        let mut params = PeerParams::default();
        params.htlc_minimum_msat = 1_000;
        pair.a.set_establish(
            Policy::default(),
            PeerParams::default(),
            CommonParams::default(),
            None,
        );
        pair.b.set_establish(
            Policy::default(),
            params,
            CommonParams::default(),
            None,
        );
        establish(&mut pair);

        // remote htlc_minimum_msat is 1_000: 999 rejected, 1_000 ok
        assert!(matches!(
            pair.a.compose_add_htlc(
                0,
                500_010,
                HashLock::default(),
                OnionPacket::default(),
                0
            ),
            Err(Error::HtlcAmountTooSmall { .. })
        ));
        assert!(matches!(
            pair.a.compose_add_htlc(
                999,
                500_010,
                HashLock::default(),
                OnionPacket::default(),
                0
            ),
            Err(Error::HtlcAmountTooSmall { .. })
        ));
        assert!(pair
            .a
            .compose_add_htlc(
                1_000,
                500_010,
                HashLock::default(),
                OnionPacket::default(),
                0
            )
            .is_ok());
    }

    #[test]
    fn htlc_count_limit() {
        let mut pair = new_pair();
        establish(&mut pair);
        let limit = PeerParams::default().max_accepted_htlcs as u64;
        for index in 0..limit {
            pair.a
                .compose_add_htlc(
                    1_000_000,
                    500_010 + index as u32,
                    HashLock::default(),
                    OnionPacket::default(),
                    0,
                )
                .unwrap();
        }
        // the table is full now
        assert!(matches!(
            pair.a.compose_add_htlc(
                1_000_000,
                500_020,
                HashLock::default(),
                OnionPacket::default(),
                0
            ),
            Err(Error::HtlcCountExceeded(_))
        ));

        // removing one frees a slot
        pair.a.offered_htlcs.remove(&0);
        assert!(pair
            .a
            .compose_add_htlc(
                1_000_000,
                500_021,
                HashLock::default(),
                OnionPacket::default(),
                0
            )
            .is_ok());
    }

    #[test]
    fn host_rejection_rolls_back() {
        let mut pair = new_pair();
        establish(&mut pair);
        pair.host_b.accept_htlcs = false;

        let add = pair
            .a
            .compose_add_htlc(
                50_000_000,
                500_010,
                HashLock::default(),
                OnionPacket::default(),
                0,
            )
            .unwrap();
        let before_msat = pair.b.remote_msat();
        let err = pair
            .b
            .recv(&mut pair.node_b, &mut pair.host_b, &add)
            .unwrap_err();
        assert_eq!(err, Error::HostRejected);
        assert_eq!(pair.b.remote_msat(), before_msat);
        assert_eq!(pair.b.htlc_count(), 0);
        assert!(!pair.b.is_closed());
    }

    #[test]
    fn commitment_replay_is_inert() {
        let mut pair = new_pair();
        establish(&mut pair);

        let add = pair
            .a
            .compose_add_htlc(
                50_000_000,
                500_010,
                HashLock::default(),
                OnionPacket::default(),
                0,
            )
            .unwrap();
        let commit_a = pair.a.compose_commit_signed().unwrap();
        pair.b
            .recv(&mut pair.node_b, &mut pair.host_b, &add)
            .unwrap();
        pair.b
            .recv(&mut pair.node_b, &mut pair.host_b, &commit_a)
            .unwrap();
        pair.host_b.drain();

        let number_before = pair.b.commitment_number();
        pair.b
            .recv(&mut pair.node_b, &mut pair.host_b, &commit_a)
            .unwrap();
        assert_eq!(pair.b.commitment_number(), number_before);
        assert!(pair.host_b.drain().is_empty());
        assert!(!pair.b.is_closed());
    }

    #[test]
    fn malformed_ping_is_isolated() {
        let mut pair = new_pair();
        establish(&mut pair);

        let mut ping = Messages::Ping(Ping {
            num_pong_bytes: 4,
            byteslen: 0,
        })
        .serialize();
        // forge num_pong_bytes = 65532
        ping[2..4].copy_from_slice(&65532u16.to_be_bytes());
        let err = pair
            .b
            .recv(&mut pair.node_b, &mut pair.host_b, &ping)
            .unwrap_err();
        assert!(matches!(err, Error::Wire(_)));
        assert_eq!(pair.b.stage(), Lifecycle::Active);
        assert!(pair.host_b.drain().is_empty());
    }

    #[test]
    fn ping_pong_liveness() {
        let mut pair = new_pair();
        establish(&mut pair);

        let ping = pair.a.compose_ping(8, 2).unwrap();
        assert_eq!(pair.a.missing_pong_count(), 1);
        pair.b
            .recv(&mut pair.node_b, &mut pair.host_b, &ping)
            .unwrap();
        let pong = pair.host_b.drain().remove(0);
        pair.a
            .recv(&mut pair.node_a, &mut pair.host_a, &pong)
            .unwrap();
        assert_eq!(pair.a.missing_pong_count(), 0);

        for _ in 0..MISSING_PONG_LIMIT {
            pair.a.compose_ping(8, 2).unwrap();
        }
        assert!(pair.a.liveness_lost());
        assert!(!pair.a.is_closed());
    }

    #[test]
    fn mutual_close() {
        let mut pair = new_pair();
        establish(&mut pair);
        pay(&mut pair, 50_000_000, preimage(b"pre"));

        pair.a.set_shutdown_script(Script::from(vec![
            0x00, 0x14, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11,
            0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11,
        ]));
        pair.b.set_shutdown_script(Script::from(vec![
            0x00, 0x14, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22,
            0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22,
        ]));
        pair.a.update_shutdown_fee(1_000);

        let shutdown_a = pair.a.compose_shutdown().unwrap();
        pair.b
            .recv(&mut pair.node_b, &mut pair.host_b, &shutdown_a)
            .unwrap();
        let shutdown_b = pair.host_b.drain().remove(0);
        pair.a
            .recv(&mut pair.node_a, &mut pair.host_a, &shutdown_b)
            .unwrap();
        let closing_signed_a = pair.host_a.drain().remove(0);

        pair.b
            .recv(&mut pair.node_b, &mut pair.host_b, &closing_signed_a)
            .unwrap();
        let closed_b = pair.host_b.closed.clone().unwrap();
        pair.a
            .recv(&mut pair.node_a, &mut pair.host_a, &closed_b.reply)
            .unwrap();
        let closed_a = pair.host_a.closed.clone().unwrap();

        // both parties derive the identical, BIP-69-sorted closing tx
        assert_eq!(closed_a.closing_tx.txid(), closed_b.closing_tx.txid());
        let values: Vec<u64> = closed_a
            .closing_tx
            .output
            .iter()
            .map(|out| out.value)
            .collect();
        let mut sorted = values.clone();
        sorted.sort_unstable();
        assert_eq!(values, sorted);
        let total: u64 = values.iter().sum();
        assert_eq!(total, 1_000_000 - 1_000);
        assert!(pair.a.is_closed() && pair.b.is_closed());
    }

    #[test]
    fn snapshot_restores_identically() {
        let mut pair = new_pair();
        establish(&mut pair);
        pay(&mut pair, 50_000_000, preimage(b"pre"));

        let state = pair.a.snapshot();
        let bytes = state.to_bytes();
        let restored_state =
            crate::channel::ChannelState::from_bytes(&bytes).unwrap();
        let restored = Channel::restore(restored_state);

        assert_eq!(restored.local_msat(), pair.a.local_msat());
        assert_eq!(restored.remote_msat(), pair.a.remote_msat());
        assert_eq!(restored.channel_id(), pair.a.channel_id());
        assert_eq!(restored.stage(), pair.a.stage());
        assert_eq!(
            restored.commitment_number(),
            pair.a.commitment_number()
        );
        assert_eq!(restored.short_channel_id(), pair.a.short_channel_id());
    }

    #[test]
    fn transport_carries_channel_messages() {
        let mut pair = new_pair();
        let key_a = SecretKey::from_slice(&[0x77; 32]).unwrap();
        let key_b = SecretKey::from_slice(&[0x78; 32]).unwrap();
        let node_id_b = pair.node_b.node_id();

        let act1 = pair.a.handshake_start(key_a, Some(node_id_b)).unwrap();
        assert!(pair.b.handshake_start(key_b, None).is_none());
        let act2 = match pair.b.handshake_recv(&act1).unwrap() {
            crate::noise::HandshakeAct::Respond(act2) => act2,
            act => panic!("unexpected handshake progress {:?}", act),
        };
        let act3 = match pair.a.handshake_recv(&act2).unwrap() {
            crate::noise::HandshakeAct::Complete(Some(act3)) => act3,
            act => panic!("unexpected handshake progress {:?}", act),
        };
        pair.b.handshake_recv(&act3).unwrap();

        // the responder learns the initiator's node id from act three
        assert_eq!(
            pair.b.transport().remote_static(),
            Some(pair.node_a.node_id())
        );

        // an init message travels encrypted from A to B
        let init = pair.a.compose_init().unwrap();
        pair.b.compose_init().unwrap();
        let frame = pair.a.noise_enc(&init).unwrap();
        let len = pair
            .b
            .noise_dec_len(&frame[..crate::noise::FRAME_HEADER_LEN])
            .unwrap() as usize;
        let payload = pair
            .b
            .noise_dec_msg(&frame[crate::noise::FRAME_HEADER_LEN..])
            .unwrap();
        assert_eq!(payload.len(), len);
        pair.b
            .recv(&mut pair.node_b, &mut pair.host_b, &payload)
            .unwrap();
        assert_eq!(pair.b.stage(), Lifecycle::InitExchanged);
    }

    #[test]
    fn announcement_signatures_flow() {
        let mut pair = new_pair();
        establish(&mut pair);

        let signs_a = pair
            .a
            .compose_announcement_signatures(&pair.node_a)
            .unwrap();
        pair.b
            .recv(&mut pair.node_b, &mut pair.host_b, &signs_a)
            .unwrap();
        let signs_b = pair
            .b
            .compose_announcement_signatures(&pair.node_b)
            .unwrap();
        pair.a
            .recv(&mut pair.node_a, &mut pair.host_a, &signs_b)
            .unwrap();

        let announcement_a =
            pair.a.compose_channel_announcement(&pair.node_a).unwrap();
        let announcement_b =
            pair.b.compose_channel_announcement(&pair.node_b).unwrap();
        assert_eq!(announcement_a, announcement_b);

        // a third node accepts the assembled announcement
        let mut node_c = Node::with(
            SecretKey::from_slice(&[0x79; 32]).unwrap(),
            "carol",
            0x08,
        );
        let message = Messages::deserialize(&announcement_a).unwrap();
        match message {
            Messages::ChannelAnnouncement(announcement) => {
                node_c.recv_channel_announcement(&announcement).unwrap()
            }
            _ => panic!("expected channel_announcement"),
        }
        assert_eq!(node_c.channel_count(), 1);
    }
}
