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

//! Bit-exact wire encoding for BOLT peer messages.
//!
//! Every field is big-endian. Encoders write into an [`io::Write`];
//! decoders read from an [`io::Read`]. A decoder hitting the end of the
//! input reports [`Error::Io`] wrapping `UnexpectedEof`, which callers
//! treat as "short frame, wait for more bytes"; every other error is a
//! terminal parse failure for the frame.

use std::io::{self, Read, Write};

use amplify::{Slice32, Wrapper};
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::Txid;
use secp256k1::ecdsa::Signature;
use secp256k1::PublicKey;

/// Errors from wire-level message encoding and decoding.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum Error {
    /// the input ended before the message was complete
    UnexpectedEof,

    /// I/O failure during message encoding or decoding
    Io,

    /// unknown message type {0:#06x}
    UnknownMessageType(u16),

    /// not all provided data were consumed during decoding process
    DataNotEntirelyConsumed,

    /// message field contains invalid data: {0}
    DataIntegrity(String),

    /// a reserved region which must be all zero contains non-zero bytes
    NonZeroPadding,

    /// data size {0} exceeds the maximum size of a lightning message
    TooLargeData(usize),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Error::UnexpectedEof,
            _ => Error::Io,
        }
    }
}

impl Error {
    /// Detects whether the error only indicates that the input ended
    /// before the message was complete, i.e. that decoding may succeed
    /// once more bytes have arrived.
    pub fn is_short_read(&self) -> bool {
        matches!(self, Error::UnexpectedEof)
    }
}

/// Encoding of a value into the BOLT wire format.
pub trait WireEncode {
    /// Encodes the value into the writer, returning the number of bytes
    /// written.
    fn wire_encode<E: Write>(&self, e: E) -> Result<usize, Error>;

    /// Serializes the value into a freshly allocated byte vector.
    fn wire_serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.wire_encode(&mut buf)
            .expect("in-memory encoding can't fail");
        buf
    }
}

/// Decoding of a value from the BOLT wire format.
pub trait WireDecode: Sized {
    /// Decodes a value from the reader.
    fn wire_decode<D: Read>(d: D) -> Result<Self, Error>;

    /// Deserializes a value from a byte slice, requiring the slice to
    /// be consumed entirely.
    fn wire_deserialize(data: impl AsRef<[u8]>) -> Result<Self, Error> {
        let mut cursor = io::Cursor::new(data.as_ref());
        let value = Self::wire_decode(&mut cursor)?;
        if cursor.position() as usize != data.as_ref().len() {
            return Err(Error::DataNotEntirelyConsumed);
        }
        Ok(value)
    }
}

impl WireEncode for u8 {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        e.write_all(&[*self])?;
        Ok(1)
    }
}

impl WireDecode for u8 {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = [0u8; 1];
        d.read_exact(&mut buf)?;
        Ok(buf[0])
    }
}

impl WireEncode for u16 {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let bytes = self.to_be_bytes();
        e.write_all(&bytes)?;
        Ok(bytes.len())
    }
}

impl WireDecode for u16 {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = [0u8; 2];
        d.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }
}

impl WireEncode for u32 {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let bytes = self.to_be_bytes();
        e.write_all(&bytes)?;
        Ok(bytes.len())
    }
}

impl WireDecode for u32 {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = [0u8; 4];
        d.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }
}

impl WireEncode for u64 {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        let bytes = self.to_be_bytes();
        e.write_all(&bytes)?;
        Ok(bytes.len())
    }
}

impl WireDecode for u64 {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = [0u8; 8];
        d.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }
}

impl WireEncode for [u8; 32] {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        e.write_all(self)?;
        Ok(32)
    }
}

impl WireDecode for [u8; 32] {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = [0u8; 32];
        d.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl WireEncode for Slice32 {
    fn wire_encode<E: Write>(&self, e: E) -> Result<usize, Error> {
        self.as_inner().wire_encode(e)
    }
}

impl WireDecode for Slice32 {
    fn wire_decode<D: Read>(d: D) -> Result<Self, Error> {
        <[u8; 32]>::wire_decode(d).map(Slice32::from_inner)
    }
}

/// Byte vectors are encoded with a 2-byte big-endian length prefix,
/// matching the `len ‖ data` convention used all over the BOLT wire
/// format (features, error data, ping padding).
impl WireEncode for Vec<u8> {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        if self.len() > u16::MAX as usize {
            return Err(Error::TooLargeData(self.len()));
        }
        (self.len() as u16).wire_encode(&mut e)?;
        e.write_all(self)?;
        Ok(2 + self.len())
    }
}

impl WireDecode for Vec<u8> {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let len = u16::wire_decode(&mut d)? as usize;
        let mut buf = vec![0u8; len];
        d.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Public keys travel in 33-byte compressed SEC form.
impl WireEncode for PublicKey {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        e.write_all(&self.serialize())?;
        Ok(33)
    }
}

impl WireDecode for PublicKey {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = [0u8; 33];
        d.read_exact(&mut buf)?;
        PublicKey::from_slice(&buf)
            .map_err(|err| Error::DataIntegrity(err.to_string()))
    }
}

/// Signatures travel in 64-byte compact (r ‖ s) form, not DER.
impl WireEncode for Signature {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        e.write_all(&self.serialize_compact())?;
        Ok(64)
    }
}

impl WireDecode for Signature {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, Error> {
        let mut buf = [0u8; 64];
        d.read_exact(&mut buf)?;
        Signature::from_compact(&buf)
            .map_err(|err| Error::DataIntegrity(err.to_string()))
    }
}

/// Transaction ids travel in their natural (internal) byte order.
impl WireEncode for Txid {
    fn wire_encode<E: Write>(&self, mut e: E) -> Result<usize, Error> {
        e.write_all(&self.into_inner())?;
        Ok(32)
    }
}

impl WireDecode for Txid {
    fn wire_decode<D: Read>(d: D) -> Result<Self, Error> {
        let bytes = <[u8; 32]>::wire_decode(d)?;
        Ok(Txid::from_hash(sha256d::Hash::from_inner(bytes)))
    }
}

/// Reads `len` bytes and verifies they are all zero, as required for
/// the ignored regions of `ping` and `pong`.
pub(crate) fn read_zeroes<D: Read>(mut d: D, len: usize) -> Result<(), Error> {
    let mut buf = vec![0u8; len];
    d.read_exact(&mut buf)?;
    if buf.iter().any(|byte| *byte != 0) {
        return Err(Error::NonZeroPadding);
    }
    Ok(())
}
