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

use std::io::{Read, Write};

use amplify::{Slice32, Wrapper};
use bitcoin::hashes::{sha256, Hash};
use bitcoin::Txid;

use super::encoding::{Error, WireDecode, WireEncode};

/// Channel id assigned once the funding transaction is known: the
/// funding txid with the funding output index XORed into its last two
/// bytes.
#[derive(
    Wrapper,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    Default,
    From,
)]
#[display(LowerHex)]
#[wrapper(FromStr, LowerHex, UpperHex)]
pub struct ChannelId(Slice32);

impl ChannelId {
    /// Derives the permanent channel id from the funding outpoint.
    pub fn with(funding_txid: Txid, funding_output_index: u16) -> Self {
        let mut slice = funding_txid.into_inner();
        let vout = funding_output_index.to_be_bytes();
        slice[30] ^= vout[0];
        slice[31] ^= vout[1];
        ChannelId::from_inner(Slice32::from_inner(slice))
    }

    /// A channel id of all zeros refers to all channels of the peer
    /// within `error` messages.
    pub fn is_wildcard(&self) -> bool {
        self.as_inner().as_inner() == &[0u8; 32]
    }
}

impl WireEncode for ChannelId {
    fn wire_encode<E: Write>(&self, e: E) -> Result<usize, Error> {
        self.as_inner().wire_encode(e)
    }
}

impl WireDecode for ChannelId {
    fn wire_decode<D: Read>(d: D) -> Result<Self, Error> {
        Slice32::wire_decode(d).map(ChannelId::from_inner)
    }
}

/// Random channel id identifying the channel on a per-peer basis until
/// the funding transaction is known.
#[derive(
    Wrapper, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display,
    From,
)]
#[display(LowerHex)]
#[wrapper(FromStr, LowerHex, UpperHex)]
pub struct TempChannelId(Slice32);

impl TempChannelId {
    /// Generates a fresh random temporary channel id.
    pub fn random() -> Self {
        TempChannelId::from_inner(Slice32::random())
    }
}

impl From<TempChannelId> for ChannelId {
    fn from(temp: TempChannelId) -> Self {
        ChannelId::from_inner(temp.into_inner())
    }
}

impl WireEncode for TempChannelId {
    fn wire_encode<E: Write>(&self, e: E) -> Result<usize, Error> {
        self.as_inner().wire_encode(e)
    }
}

impl WireDecode for TempChannelId {
    fn wire_decode<D: Read>(d: D) -> Result<Self, Error> {
        Slice32::wire_decode(d).map(TempChannelId::from_inner)
    }
}

/// Channel id used by the channel over its lifetime: first temporary
/// and later, once the funding transaction exists, final.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, From)]
#[display(inner)]
pub enum ActiveChannelId {
    /// Channel does not have a funding transaction yet
    #[from]
    Temporary(TempChannelId),

    /// Channel has an assigned permanent id
    #[from]
    Final(ChannelId),
}

impl ActiveChannelId {
    /// Generates a random temporary channel id.
    pub fn random() -> Self {
        ActiveChannelId::Temporary(TempChannelId::random())
    }

    /// Constructs the permanent variant from the funding outpoint.
    pub fn with(funding_txid: Txid, funding_output_index: u16) -> Self {
        ActiveChannelId::Final(ChannelId::with(
            funding_txid,
            funding_output_index,
        ))
    }

    /// Returns the raw 32 bytes of whichever id is active.
    pub fn as_slice32(&self) -> Slice32 {
        match self {
            ActiveChannelId::Temporary(id) => id.into_inner(),
            ActiveChannelId::Final(id) => id.into_inner(),
        }
    }

    /// Returns the permanent channel id, if already assigned.
    pub fn channel_id(&self) -> Option<ChannelId> {
        match self {
            ActiveChannelId::Temporary(_) => None,
            ActiveChannelId::Final(id) => Some(*id),
        }
    }

    /// Returns the temporary channel id before the permanent one is
    /// assigned, and `None` after.
    pub fn temp_channel_id(&self) -> Option<TempChannelId> {
        match self {
            ActiveChannelId::Temporary(id) => Some(*id),
            ActiveChannelId::Final(_) => None,
        }
    }
}

/// Short channel id as per BOLT-7: block height, transaction index
/// within the block and funding output index, packed into 8 bytes as
/// 3 ‖ 3 ‖ 2.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Default,
)]
#[display("{block_height}x{tx_index}x{output_index}")]
pub struct ShortChannelId {
    pub block_height: u32,
    pub tx_index: u32,
    pub output_index: u16,
}

impl ShortChannelId {
    /// Constructs a short channel id, failing on components exceeding
    /// their 24-bit wire width.
    pub fn new(
        block_height: u32,
        tx_index: u32,
        output_index: u16,
    ) -> Option<Self> {
        if block_height > 0xFF_FF_FF || tx_index > 0xFF_FF_FF {
            return None;
        }
        Some(ShortChannelId {
            block_height,
            tx_index,
            output_index,
        })
    }

    /// Packs the id into its 8-byte integer representation.
    pub fn as_u64(&self) -> u64 {
        ((self.block_height as u64) << 40)
            | ((self.tx_index as u64) << 16)
            | self.output_index as u64
    }

    /// Unpacks the 8-byte integer representation.
    pub fn from_u64(value: u64) -> Self {
        ShortChannelId {
            block_height: ((value >> 40) & 0xFF_FF_FF) as u32,
            tx_index: ((value >> 16) & 0xFF_FF_FF) as u32,
            output_index: (value & 0xFF_FF) as u16,
        }
    }
}

impl WireEncode for ShortChannelId {
    fn wire_encode<E: Write>(&self, e: E) -> Result<usize, Error> {
        self.as_u64().wire_encode(e)
    }
}

impl WireDecode for ShortChannelId {
    fn wire_decode<D: Read>(d: D) -> Result<Self, Error> {
        u64::wire_decode(d).map(ShortChannelId::from_u64)
    }
}

/// SHA-256 hash locking an HTLC output to its payment preimage.
#[derive(
    Wrapper,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    Default,
    From,
)]
#[display(LowerHex)]
#[wrapper(FromStr, LowerHex, UpperHex)]
pub struct HashLock(Slice32);

impl HashLock {
    /// Computes the hash lock committing to a preimage.
    pub fn from_preimage(preimage: &HashPreimage) -> Self {
        let hash = sha256::Hash::hash(preimage.as_inner().as_inner());
        HashLock::from_inner(Slice32::from_inner(hash.into_inner()))
    }
}

impl WireEncode for HashLock {
    fn wire_encode<E: Write>(&self, e: E) -> Result<usize, Error> {
        self.as_inner().wire_encode(e)
    }
}

impl WireDecode for HashLock {
    fn wire_decode<D: Read>(d: D) -> Result<Self, Error> {
        Slice32::wire_decode(d).map(HashLock::from_inner)
    }
}

/// Payment preimage whose knowledge settles an HTLC.
#[derive(
    Wrapper,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    Default,
    From,
)]
#[display(LowerHex)]
#[wrapper(FromStr, LowerHex, UpperHex)]
pub struct HashPreimage(Slice32);

impl WireEncode for HashPreimage {
    fn wire_encode<E: Write>(&self, e: E) -> Result<usize, Error> {
        self.as_inner().wire_encode(e)
    }
}

impl WireDecode for HashPreimage {
    fn wire_decode<D: Read>(d: D) -> Result<Self, Error> {
        Slice32::wire_decode(d).map(HashPreimage::from_inner)
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn channel_id_from_outpoint() {
        let txid = Txid::from_str(
            "fd2105607605d2302994ffea703b09f66b6351816ee737a93e42a841ea20bbad",
        )
        .unwrap();
        let channel_id = ChannelId::with(txid, 1);
        let mut expected = txid.into_inner();
        expected[31] ^= 1;
        assert_eq!(channel_id.as_inner().as_inner(), &expected);

        assert!(!channel_id.is_wildcard());
        assert!(ChannelId::default().is_wildcard());
    }

    #[test]
    fn short_channel_id_packing() {
        let scid = ShortChannelId::new(500_000, 1024, 3).unwrap();
        let packed = scid.as_u64();
        assert_eq!(ShortChannelId::from_u64(packed), scid);

        let bytes = scid.wire_serialize();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..3], &[0x07, 0xa1, 0x20]);
        assert_eq!(&bytes[3..6], &[0x00, 0x04, 0x00]);
        assert_eq!(&bytes[6..], &[0x00, 0x03]);
        assert_eq!(ShortChannelId::wire_deserialize(&bytes).unwrap(), scid);
    }

    #[test]
    fn short_channel_id_bounds() {
        assert!(ShortChannelId::new(0x01_00_00_00, 0, 0).is_none());
        assert!(ShortChannelId::new(0, 0x01_00_00_00, 0).is_none());
        assert!(ShortChannelId::new(0xFF_FF_FF, 0xFF_FF_FF, 0xFF_FF).is_some());
    }

    #[test]
    fn hash_lock_from_preimage() {
        let mut raw = [0u8; 32];
        raw[..3].copy_from_slice(b"pre");
        let preimage = HashPreimage::from_inner(Slice32::from_inner(raw));
        let lock = HashLock::from_preimage(&preimage);
        assert_eq!(
            lock.as_inner().as_inner(),
            &sha256::Hash::hash(&raw).into_inner()
        );
    }
}
