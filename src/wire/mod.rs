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

//! BOLT peer messages: typed structs and the bit-exact wire codec.
//!
//! Every message travels as `{2-byte big-endian type} ‖ payload`. The
//! message set is closed: [`Messages`] enumerates all 22 discriminants
//! this engine speaks, and dispatch is a single exhaustive `match` on
//! the type code.

mod bolt1;
mod bolt2;
mod bolt7;
pub mod encoding;
mod types;

pub use bolt1::{ErrorMessage, Init, Ping, Pong, PING_MAX_BYTES};
pub use bolt2::{
    AcceptChannel, ClosingSigned, CommitmentSigned, FundingCreated,
    FundingLocked, FundingSigned, OpenChannel, RevokeAndAck, Shutdown,
    UpdateAddHtlc, UpdateFailHtlc, UpdateFailMalformedHtlc,
    UpdateFulfillHtlc, UpdateFee,
};
pub use bolt7::{
    AnnouncementSignatures, ChannelAnnouncement, ChannelUpdate,
    NodeAnnouncement,
};
pub use encoding::{Error, WireDecode, WireEncode};
pub use types::{
    ActiveChannelId, ChannelId, HashLock, HashPreimage, ShortChannelId,
    TempChannelId,
};

use std::io;

/// Default Lightning peer port.
pub const LN_P2P_PORT: u16 = 9735;

/// The closed set of peer messages the engine processes.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display(inner)]
pub enum Messages {
    /// Feature negotiation; must be the first message in both
    /// directions.
    Init(Init),

    /// Failure report for one or all channels with the peer.
    Error(ErrorMessage),

    /// Liveness probe.
    Ping(Ping),

    /// Liveness probe answer.
    Pong(Pong),

    /// Channel opening proposal.
    OpenChannel(OpenChannel),

    /// Channel opening acceptance.
    AcceptChannel(AcceptChannel),

    /// Funding outpoint plus first commitment signature from the
    /// opener.
    FundingCreated(FundingCreated),

    /// First commitment signature from the acceptor.
    FundingSigned(FundingSigned),

    /// Funding depth reached; next per-commitment point.
    FundingLocked(FundingLocked),

    /// Cooperative close initiation.
    Shutdown(Shutdown),

    /// Cooperative close fee agreement and signature.
    ClosingSigned(ClosingSigned),

    /// New HTLC offer.
    UpdateAddHtlc(UpdateAddHtlc),

    /// HTLC settlement by preimage.
    UpdateFulfillHtlc(UpdateFulfillHtlc),

    /// HTLC failure.
    UpdateFailHtlc(UpdateFailHtlc),

    /// HTLC failure for an unparseable onion.
    UpdateFailMalformedHtlc(UpdateFailMalformedHtlc),

    /// Commitment over the staged update set.
    CommitmentSigned(CommitmentSigned),

    /// Revocation of the superseded commitment.
    RevokeAndAck(RevokeAndAck),

    /// Fee rate change proposal.
    UpdateFee(UpdateFee),

    /// Channel existence proof for gossip.
    ChannelAnnouncement(ChannelAnnouncement),

    /// Node metadata for gossip.
    NodeAnnouncement(NodeAnnouncement),

    /// Channel forwarding parameters for gossip.
    ChannelUpdate(ChannelUpdate),

    /// Peer-to-peer half of `channel_announcement` assembly.
    AnnouncementSignatures(AnnouncementSignatures),
}

/// Numeric message type codes; part of the external contract.
pub mod msg_type {
    pub const INIT: u16 = 16;
    pub const ERROR: u16 = 17;
    pub const PING: u16 = 18;
    pub const PONG: u16 = 19;
    pub const OPEN_CHANNEL: u16 = 32;
    pub const ACCEPT_CHANNEL: u16 = 33;
    pub const FUNDING_CREATED: u16 = 34;
    pub const FUNDING_SIGNED: u16 = 35;
    pub const FUNDING_LOCKED: u16 = 36;
    pub const SHUTDOWN: u16 = 38;
    pub const CLOSING_SIGNED: u16 = 39;
    pub const UPDATE_ADD_HTLC: u16 = 128;
    pub const UPDATE_FULFILL_HTLC: u16 = 130;
    pub const UPDATE_FAIL_HTLC: u16 = 131;
    pub const COMMITMENT_SIGNED: u16 = 132;
    pub const REVOKE_AND_ACK: u16 = 133;
    pub const UPDATE_FEE: u16 = 134;
    pub const UPDATE_FAIL_MALFORMED_HTLC: u16 = 135;
    pub const CHANNEL_ANNOUNCEMENT: u16 = 256;
    pub const NODE_ANNOUNCEMENT: u16 = 257;
    pub const CHANNEL_UPDATE: u16 = 258;
    pub const ANNOUNCEMENT_SIGNATURES: u16 = 259;
}

impl Messages {
    /// Returns the numeric type code of the message.
    pub fn msg_type(&self) -> u16 {
        match self {
            Messages::Init(_) => msg_type::INIT,
            Messages::Error(_) => msg_type::ERROR,
            Messages::Ping(_) => msg_type::PING,
            Messages::Pong(_) => msg_type::PONG,
            Messages::OpenChannel(_) => msg_type::OPEN_CHANNEL,
            Messages::AcceptChannel(_) => msg_type::ACCEPT_CHANNEL,
            Messages::FundingCreated(_) => msg_type::FUNDING_CREATED,
            Messages::FundingSigned(_) => msg_type::FUNDING_SIGNED,
            Messages::FundingLocked(_) => msg_type::FUNDING_LOCKED,
            Messages::Shutdown(_) => msg_type::SHUTDOWN,
            Messages::ClosingSigned(_) => msg_type::CLOSING_SIGNED,
            Messages::UpdateAddHtlc(_) => msg_type::UPDATE_ADD_HTLC,
            Messages::UpdateFulfillHtlc(_) => msg_type::UPDATE_FULFILL_HTLC,
            Messages::UpdateFailHtlc(_) => msg_type::UPDATE_FAIL_HTLC,
            Messages::UpdateFailMalformedHtlc(_) => {
                msg_type::UPDATE_FAIL_MALFORMED_HTLC
            }
            Messages::CommitmentSigned(_) => msg_type::COMMITMENT_SIGNED,
            Messages::RevokeAndAck(_) => msg_type::REVOKE_AND_ACK,
            Messages::UpdateFee(_) => msg_type::UPDATE_FEE,
            Messages::ChannelAnnouncement(_) => {
                msg_type::CHANNEL_ANNOUNCEMENT
            }
            Messages::NodeAnnouncement(_) => msg_type::NODE_ANNOUNCEMENT,
            Messages::ChannelUpdate(_) => msg_type::CHANNEL_UPDATE,
            Messages::AnnouncementSignatures(_) => {
                msg_type::ANNOUNCEMENT_SIGNATURES
            }
        }
    }

    /// Serializes the message into wire bytes, type code included.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.msg_type()
            .wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        let payload = match self {
            Messages::Init(msg) => msg.wire_encode(&mut buf),
            Messages::Error(msg) => msg.wire_encode(&mut buf),
            Messages::Ping(msg) => msg.wire_encode(&mut buf),
            Messages::Pong(msg) => msg.wire_encode(&mut buf),
            Messages::OpenChannel(msg) => msg.wire_encode(&mut buf),
            Messages::AcceptChannel(msg) => msg.wire_encode(&mut buf),
            Messages::FundingCreated(msg) => msg.wire_encode(&mut buf),
            Messages::FundingSigned(msg) => msg.wire_encode(&mut buf),
            Messages::FundingLocked(msg) => msg.wire_encode(&mut buf),
            Messages::Shutdown(msg) => msg.wire_encode(&mut buf),
            Messages::ClosingSigned(msg) => msg.wire_encode(&mut buf),
            Messages::UpdateAddHtlc(msg) => msg.wire_encode(&mut buf),
            Messages::UpdateFulfillHtlc(msg) => msg.wire_encode(&mut buf),
            Messages::UpdateFailHtlc(msg) => msg.wire_encode(&mut buf),
            Messages::UpdateFailMalformedHtlc(msg) => {
                msg.wire_encode(&mut buf)
            }
            Messages::CommitmentSigned(msg) => msg.wire_encode(&mut buf),
            Messages::RevokeAndAck(msg) => msg.wire_encode(&mut buf),
            Messages::UpdateFee(msg) => msg.wire_encode(&mut buf),
            Messages::ChannelAnnouncement(msg) => msg.wire_encode(&mut buf),
            Messages::NodeAnnouncement(msg) => msg.wire_encode(&mut buf),
            Messages::ChannelUpdate(msg) => msg.wire_encode(&mut buf),
            Messages::AnnouncementSignatures(msg) => {
                msg.wire_encode(&mut buf)
            }
        };
        payload.expect("in-memory encoding can't fail");
        buf
    }

    /// Parses a complete wire message, rejecting unknown type codes and
    /// trailing bytes.
    pub fn deserialize(data: impl AsRef<[u8]>) -> Result<Messages, Error> {
        let data = data.as_ref();
        let mut cursor = io::Cursor::new(data);
        let msg_type = u16::wire_decode(&mut cursor)?;
        let message = match msg_type {
            msg_type::INIT => Messages::Init(Init::wire_decode(&mut cursor)?),
            msg_type::ERROR => {
                Messages::Error(ErrorMessage::wire_decode(&mut cursor)?)
            }
            msg_type::PING => Messages::Ping(Ping::wire_decode(&mut cursor)?),
            msg_type::PONG => Messages::Pong(Pong::wire_decode(&mut cursor)?),
            msg_type::OPEN_CHANNEL => {
                Messages::OpenChannel(OpenChannel::wire_decode(&mut cursor)?)
            }
            msg_type::ACCEPT_CHANNEL => Messages::AcceptChannel(
                AcceptChannel::wire_decode(&mut cursor)?,
            ),
            msg_type::FUNDING_CREATED => Messages::FundingCreated(
                FundingCreated::wire_decode(&mut cursor)?,
            ),
            msg_type::FUNDING_SIGNED => Messages::FundingSigned(
                FundingSigned::wire_decode(&mut cursor)?,
            ),
            msg_type::FUNDING_LOCKED => Messages::FundingLocked(
                FundingLocked::wire_decode(&mut cursor)?,
            ),
            msg_type::SHUTDOWN => {
                Messages::Shutdown(Shutdown::wire_decode(&mut cursor)?)
            }
            msg_type::CLOSING_SIGNED => Messages::ClosingSigned(
                ClosingSigned::wire_decode(&mut cursor)?,
            ),
            msg_type::UPDATE_ADD_HTLC => Messages::UpdateAddHtlc(
                UpdateAddHtlc::wire_decode(&mut cursor)?,
            ),
            msg_type::UPDATE_FULFILL_HTLC => Messages::UpdateFulfillHtlc(
                UpdateFulfillHtlc::wire_decode(&mut cursor)?,
            ),
            msg_type::UPDATE_FAIL_HTLC => Messages::UpdateFailHtlc(
                UpdateFailHtlc::wire_decode(&mut cursor)?,
            ),
            msg_type::UPDATE_FAIL_MALFORMED_HTLC => {
                Messages::UpdateFailMalformedHtlc(
                    UpdateFailMalformedHtlc::wire_decode(&mut cursor)?,
                )
            }
            msg_type::COMMITMENT_SIGNED => Messages::CommitmentSigned(
                CommitmentSigned::wire_decode(&mut cursor)?,
            ),
            msg_type::REVOKE_AND_ACK => Messages::RevokeAndAck(
                RevokeAndAck::wire_decode(&mut cursor)?,
            ),
            msg_type::UPDATE_FEE => {
                Messages::UpdateFee(UpdateFee::wire_decode(&mut cursor)?)
            }
            msg_type::CHANNEL_ANNOUNCEMENT => Messages::ChannelAnnouncement(
                ChannelAnnouncement::wire_decode(&mut cursor)?,
            ),
            msg_type::NODE_ANNOUNCEMENT => Messages::NodeAnnouncement(
                NodeAnnouncement::wire_decode(&mut cursor)?,
            ),
            msg_type::CHANNEL_UPDATE => Messages::ChannelUpdate(
                ChannelUpdate::wire_decode(&mut cursor)?,
            ),
            msg_type::ANNOUNCEMENT_SIGNATURES => {
                Messages::AnnouncementSignatures(
                    AnnouncementSignatures::wire_decode(&mut cursor)?,
                )
            }
            unknown => return Err(Error::UnknownMessageType(unknown)),
        };
        if cursor.position() as usize != data.len() {
            return Err(Error::DataNotEntirelyConsumed);
        }
        Ok(message)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_type_rejected() {
        let err = Messages::deserialize([0x00u8, 0x7f]).unwrap_err();
        assert_eq!(err, Error::UnknownMessageType(0x7f));
    }

    #[test]
    fn ping_full_frame() {
        let msg = Messages::Ping(Ping {
            num_pong_bytes: 1,
            byteslen: 2,
        });
        let encoded = msg.serialize();
        assert_eq!(encoded, vec![0x00, 18, 0x00, 0x01, 0x00, 0x02, 0, 0]);
        assert_eq!(Messages::deserialize(&encoded).unwrap(), msg);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut encoded = Messages::Ping(Ping {
            num_pong_bytes: 0,
            byteslen: 0,
        })
        .serialize();
        encoded.push(0);
        assert_eq!(
            Messages::deserialize(&encoded).unwrap_err(),
            Error::DataNotEntirelyConsumed
        );
    }

    #[test]
    fn short_frame_reported_as_such() {
        let encoded = Messages::Ping(Ping {
            num_pong_bytes: 4,
            byteslen: 4,
        })
        .serialize();
        let err = Messages::deserialize(&encoded[..5]).unwrap_err();
        assert!(err.is_short_read());
    }
}
