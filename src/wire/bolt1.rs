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

//! Setup & control messages (BOLT-1): `init`, `error`, `ping`, `pong`.

use std::fmt::{self, Display, Formatter};
use std::io::{Read, Write};

use super::encoding::{read_zeroes, Error, WireDecode, WireEncode};
use super::types::ChannelId;

/// `num_pong_bytes` and `byteslen` of `ping` must stay below this bound
/// so that the pong always fits a lightning message.
pub const PING_MAX_BYTES: u16 = 65532;

/// Once authentication is complete, the first message reveals the
/// features supported or required by this node, even if this is a
/// reconnection.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("init({global_features:?}, {local_features:?})")]
pub struct Init {
    pub global_features: Vec<u8>,
    pub local_features: Vec<u8>,
}

impl Init {
    /// Returns the low feature byte of the local features vector, which
    /// carries every feature bit this engine interprets.
    pub fn local_feature_byte(&self) -> u8 {
        self.local_features.last().copied().unwrap_or_default()
    }

    /// Detects feature bits which are required (even bits) but unknown
    /// to this implementation. Odd (optional) bits are always
    /// tolerated.
    pub fn has_unknown_required_features(&self) -> bool {
        let known = 0b0000_1010u8; // initial_routing_sync, gossip opt
        let check = |features: &[u8]| {
            features.split_last().map_or(false, |(low, high)| {
                high.iter().any(|byte| *byte & 0x55 != 0)
                    || *low & !known & 0x55 != 0
            })
        };
        check(&self.global_features) || check(&self.local_features)
    }
}

impl WireEncode for Init {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.global_features.wire_encode(&mut e)?;
        len += self.local_features.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for Init {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(Init {
            global_features: Vec::<u8>::wire_decode(&mut d)?,
            local_features: Vec::<u8>::wire_decode(&mut d)?,
        })
    }
}

/// For simplicity of diagnosis, it's often useful to tell a peer that
/// something is incorrect.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ErrorMessage {
    /// The channel the error applies to; all zeros refers to all
    /// channels with the peer.
    pub channel_id: ChannelId,

    /// Error details, either as string or binary data.
    pub data: Vec<u8>,
}

impl Display for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("error")?;
        if self.channel_id.is_wildcard() {
            f.write_str(" on all channels")?;
        } else {
            write!(f, " on channel {}", self.channel_id)?;
        }
        // Only printable ASCII is echoed verbatim.
        if self.data.iter().all(|b| (32..=126).contains(b)) {
            if let Ok(msg) = std::str::from_utf8(&self.data) {
                write!(f, ": {}", msg)?;
            }
        }
        Ok(())
    }
}

impl WireEncode for ErrorMessage {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let mut len = self.channel_id.wire_encode(&mut e)?;
        len += self.data.wire_encode(&mut e)?;
        Ok(len)
    }
}

impl WireDecode for ErrorMessage {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        Ok(ErrorMessage {
            channel_id: ChannelId::wire_decode(&mut d)?,
            data: Vec::<u8>::wire_decode(&mut d)?,
        })
    }
}

/// Keep-alive request which also allows obfuscation of traffic
/// patterns. The ignored padding region must be all zero and both
/// length fields must stay below [`PING_MAX_BYTES`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[display("ping({num_pong_bytes}, {byteslen})")]
pub struct Ping {
    pub num_pong_bytes: u16,
    pub byteslen: u16,
}

impl WireEncode for Ping {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        if self.num_pong_bytes >= PING_MAX_BYTES {
            return Err(Error::DataIntegrity(format!(
                "ping num_pong_bytes {} exceeds protocol bound",
                self.num_pong_bytes
            )));
        }
        self.num_pong_bytes.wire_encode(&mut e)?;
        self.byteslen.wire_encode(&mut e)?;
        e.write_all(&vec![0u8; self.byteslen as usize])?;
        Ok(4 + self.byteslen as usize)
    }
}

impl WireDecode for Ping {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let num_pong_bytes = u16::wire_decode(&mut d)?;
        let byteslen = u16::wire_decode(&mut d)?;
        if num_pong_bytes >= PING_MAX_BYTES || byteslen >= PING_MAX_BYTES {
            return Err(Error::DataIntegrity(format!(
                "ping num_pong_bytes {} exceeds protocol bound",
                num_pong_bytes
            )));
        }
        read_zeroes(&mut d, byteslen as usize)?;
        Ok(Ping {
            num_pong_bytes,
            byteslen,
        })
    }
}

/// Reply to [`Ping`], sized as the ping requested; the padding region
/// must be all zero.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[display("pong({byteslen})")]
pub struct Pong {
    pub byteslen: u16,
}

impl Pong {
    /// Composes the pong answering a received ping.
    pub fn with(ping: &Ping) -> Pong {
        Pong {
            byteslen: ping.num_pong_bytes,
        }
    }
}

impl WireEncode for Pong {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        self.byteslen.wire_encode(&mut e)?;
        e.write_all(&vec![0u8; self.byteslen as usize])?;
        Ok(2 + self.byteslen as usize)
    }
}

impl WireDecode for Pong {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let byteslen = u16::wire_decode(&mut d)?;
        if byteslen >= PING_MAX_BYTES {
            return Err(Error::DataIntegrity(format!(
                "pong byteslen {} exceeds protocol bound",
                byteslen
            )));
        }
        read_zeroes(&mut d, byteslen as usize)?;
        Ok(Pong { byteslen })
    }
}

#[cfg(test)]
mod test {
    use amplify::hex::FromHex;

    use super::*;
    use crate::wire::Messages;

    #[test]
    fn init_testvec() {
        let init = Messages::Init(Init {
            global_features: vec![],
            local_features: vec![],
        });
        assert_eq!(
            init.serialize(),
            Vec::<u8>::from_hex("001000000000").unwrap()
        );
    }

    #[test]
    fn init_feature_byte() {
        let init = Init {
            global_features: vec![],
            local_features: vec![0x0a],
        };
        assert_eq!(init.local_feature_byte(), 0x0a);
        assert!(!init.has_unknown_required_features());

        let init = Init {
            global_features: vec![],
            local_features: vec![0x01],
        };
        assert!(init.has_unknown_required_features());
    }

    #[test]
    fn ping_boundaries() {
        // 65531 is the largest accepted value, 65532 is rejected.
        let accepted = Ping {
            num_pong_bytes: 65531,
            byteslen: 2,
        };
        let encoded = accepted.wire_serialize();
        assert_eq!(Ping::wire_deserialize(&encoded).unwrap(), accepted);

        let mut rejected = encoded;
        rejected[0..2].copy_from_slice(&65532u16.to_be_bytes());
        assert!(matches!(
            Ping::wire_deserialize(&rejected).unwrap_err(),
            Error::DataIntegrity(_)
        ));
    }

    #[test]
    fn ping_nonzero_padding_rejected() {
        let ping = Ping {
            num_pong_bytes: 4,
            byteslen: 4,
        };
        let mut encoded = ping.wire_serialize();
        encoded[5] = 0xff;
        assert_eq!(
            Ping::wire_deserialize(&encoded).unwrap_err(),
            Error::NonZeroPadding
        );
    }

    #[test]
    fn pong_answers_ping() {
        let ping = Ping {
            num_pong_bytes: 8,
            byteslen: 0,
        };
        let pong = Pong::with(&ping);
        assert_eq!(pong.byteslen, 8);
        let encoded = pong.wire_serialize();
        assert_eq!(encoded.len(), 2 + 8);
        assert_eq!(Pong::wire_deserialize(&encoded).unwrap(), pong);
    }

    #[test]
    fn error_message_display() {
        let err = ErrorMessage {
            channel_id: ChannelId::default(),
            data: b"sig mismatch".to_vec(),
        };
        assert_eq!(err.to_string(), "error on all channels: sig mismatch");
        let round = ErrorMessage::wire_deserialize(&err.wire_serialize());
        assert_eq!(round.unwrap(), err);
    }
}
