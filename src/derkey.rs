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

//! Per-commitment secret ratchet and compact secret storage.
//!
//! Each commitment number is associated with a secret drawn from a
//! deterministic SHA-256 tree rooted in a 32-byte seed. Secrets are
//! revealed in order of *decreasing* index, starting at 2⁴⁸−1. A
//! counterparty needs to remember at most 49 of the revealed secrets to
//! be able to recompute every earlier one.

use std::io::{Read, Write};

use amplify::{Slice32, Wrapper};
use bitcoin::hashes::{sha256, Hash};
use secp256k1::{PublicKey, SecretKey, SECP256K1};

use crate::wire::encoding::{self, WireDecode, WireEncode};

/// Number of index bits of the ratchet tree.
pub const INDEX_BITS: u32 = 48;

/// First (largest) per-commitment index; indices count down from here.
pub const FIRST_INDEX: u64 = (1 << INDEX_BITS) - 1;

/// Number of slots the receiver-side storage needs: one per possible
/// trailing-zero count, plus the all-free bucket.
const STORAGE_SLOTS: usize = INDEX_BITS as usize + 1;

/// Errors of the secret storage.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum Error {
    /// per-commitment secret for index {index} cannot reproduce a
    /// previously stored secret; the peer is cheating or corrupt
    InconsistentSecret { index: u64 },

    /// per-commitment secret for index {index} was never revealed and
    /// cannot be derived from storage
    UnknownIndex { index: u64 },
}

/// Derives the per-commitment secret for `index` from `seed`.
///
/// Walking from bit 47 down to bit 0, every set bit of `index` flips
/// the corresponding bit of the working value, which is then hashed
/// with SHA-256.
pub fn secret_from_seed(seed: &Slice32, index: u64) -> Slice32 {
    derive_secret(seed.as_inner(), INDEX_BITS, index)
}

/// Derives a descendant secret from a parent whose low `bits` index
/// bits are free.
fn derive_secret(base: &[u8; 32], bits: u32, index: u64) -> Slice32 {
    let mut value = *base;
    for bit in (0..bits).rev() {
        if index & (1 << bit) != 0 {
            value[(bit / 8) as usize] ^= 1 << (bit % 8);
            value = sha256::Hash::hash(&value).into_inner();
        }
    }
    Slice32::from_inner(value)
}

/// The per-commitment point corresponding to a per-commitment secret.
pub fn point_from_secret(secret: &Slice32) -> PublicKey {
    let sk = SecretKey::from_slice(secret.as_inner())
        .expect("ratchet secrets are hash outputs and thus valid keys");
    PublicKey::from_secret_key(SECP256K1, &sk)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Slot {
    secret: Slice32,
    index: u64,
}

/// Compact storage of the counterparty's revealed per-commitment
/// secrets.
///
/// A revealed secret whose index has `z` trailing zero bits can
/// re-derive every secret whose index differs from it only within
/// those `z` bits, so one slot per trailing-zero count suffices.
/// Insertion verifies the incoming secret against every lower slot;
/// retrieval walks the 49 slots and re-derives in at most 48 hashes.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SecretStorage {
    slots: [Option<Slot>; STORAGE_SLOTS],
}

impl Default for SecretStorage {
    fn default() -> Self {
        SecretStorage {
            slots: [None; STORAGE_SLOTS],
        }
    }
}

impl SecretStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        SecretStorage::default()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Detects whether no secret has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_none())
    }

    /// Inserts a newly revealed `(secret, index)` pair.
    ///
    /// The new secret must reproduce the secret held by every lower
    /// slot; any mismatch rejects the insertion and the channel must be
    /// failed.
    pub fn insert(&mut self, secret: Slice32, index: u64) -> Result<(), Error> {
        let bucket = trailing_zeros(index);
        for slot in self.slots[..bucket].iter().flatten() {
            let derived =
                derive_secret(secret.as_inner(), bucket as u32, slot.index);
            if derived != slot.secret {
                return Err(Error::InconsistentSecret { index });
            }
        }
        self.slots[bucket] = Some(Slot { secret, index });
        Ok(())
    }

    /// Recomputes the secret for a previously revealed `index`.
    pub fn secret_for(&self, index: u64) -> Result<Slice32, Error> {
        for (bucket, slot) in self.slots.iter().enumerate() {
            if let Some(slot) = slot {
                let mask = free_bits_mask(bucket);
                if slot.index & mask == index & mask {
                    return Ok(derive_secret(
                        slot.secret.as_inner(),
                        bucket as u32,
                        index,
                    ));
                }
            }
        }
        Err(Error::UnknownIndex { index })
    }
}

impl WireEncode for SecretStorage {
    fn wire_encode<E: Write>(
        &self,
        mut e: E,
    ) -> Result<usize, encoding::Error> {
        let mut len = (self.len() as u16).wire_encode(&mut e)?;
        for (bucket, slot) in self.slots.iter().enumerate() {
            if let Some(slot) = slot {
                len += (bucket as u8).wire_encode(&mut e)?;
                len += slot.secret.wire_encode(&mut e)?;
                len += slot.index.wire_encode(&mut e)?;
            }
        }
        Ok(len)
    }
}

impl WireDecode for SecretStorage {
    fn wire_decode<D: Read>(mut d: D) -> Result<Self, encoding::Error> {
        let count = u16::wire_decode(&mut d)? as usize;
        if count > STORAGE_SLOTS {
            return Err(encoding::Error::DataIntegrity(format!(
                "secret storage cannot hold {} slots",
                count
            )));
        }
        let mut storage = SecretStorage::new();
        for _ in 0..count {
            let bucket = u8::wire_decode(&mut d)? as usize;
            if bucket >= STORAGE_SLOTS {
                return Err(encoding::Error::DataIntegrity(format!(
                    "secret storage has no slot {}",
                    bucket
                )));
            }
            storage.slots[bucket] = Some(Slot {
                secret: Slice32::wire_decode(&mut d)?,
                index: u64::wire_decode(&mut d)?,
            });
        }
        Ok(storage)
    }
}

/// Mask selecting the index bits a slot's secret has *not* consumed.
fn free_bits_mask(bucket: usize) -> u64 {
    if bucket >= INDEX_BITS as usize {
        0
    } else {
        !((1u64 << bucket) - 1) & FIRST_INDEX
    }
}

fn trailing_zeros(index: u64) -> usize {
    (index.trailing_zeros().min(INDEX_BITS)) as usize
}

#[cfg(test)]
mod test {
    use super::*;

    fn seed(byte: u8) -> Slice32 {
        Slice32::from_inner([byte; 32])
    }

    #[test]
    fn derivation_depends_on_every_index_bit() {
        let seed = seed(0x35);
        let a = secret_from_seed(&seed, FIRST_INDEX);
        let b = secret_from_seed(&seed, FIRST_INDEX - 1);
        let c = secret_from_seed(&seed, FIRST_INDEX - 2);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn descending_insertion_succeeds() {
        let seed = seed(0x51);
        let mut storage = SecretStorage::new();
        for offset in 0..100 {
            let index = FIRST_INDEX - offset;
            storage
                .insert(secret_from_seed(&seed, index), index)
                .unwrap_or_else(|err| panic!("offset {}: {}", offset, err));
        }
        assert!(storage.len() <= STORAGE_SLOTS);

        // every previously revealed secret stays recomputable
        for offset in 0..100 {
            let index = FIRST_INDEX - offset;
            assert_eq!(
                storage.secret_for(index).unwrap(),
                secret_from_seed(&seed, index)
            );
        }
    }

    #[test]
    fn tampered_secret_rejected() {
        let seed = seed(0x51);
        for flipped in 0..99u64 {
            let mut storage = SecretStorage::new();
            let mut detected = false;
            for offset in 0..100 {
                let index = FIRST_INDEX - offset;
                let mut secret = secret_from_seed(&seed, index);
                if offset == flipped {
                    let mut raw = secret.into_inner();
                    raw[7] ^= 0x20;
                    secret = Slice32::from_inner(raw);
                }
                match storage.insert(secret, index) {
                    Ok(()) => {}
                    Err(Error::InconsistentSecret { .. }) => {
                        detected = true;
                        break;
                    }
                    Err(err) => panic!("unexpected error {}", err),
                }
            }
            assert!(
                detected,
                "bit flip at offset {} was never detected",
                flipped
            );
        }
    }

    #[test]
    fn unrevealed_index_unknown() {
        let seed = seed(0x51);
        let mut storage = SecretStorage::new();
        storage
            .insert(secret_from_seed(&seed, FIRST_INDEX), FIRST_INDEX)
            .unwrap();
        assert_eq!(
            storage.secret_for(FIRST_INDEX - 1).unwrap_err(),
            Error::UnknownIndex {
                index: FIRST_INDEX - 1
            }
        );
    }

    #[test]
    fn point_matches_secret() {
        let secret = secret_from_seed(&seed(7), FIRST_INDEX);
        let point = point_from_secret(&secret);
        let sk = SecretKey::from_slice(secret.as_inner()).unwrap();
        assert_eq!(point, PublicKey::from_secret_key(SECP256K1, &sk));
    }

    #[test]
    fn storage_roundtrip() {
        let seed = seed(0x51);
        let mut storage = SecretStorage::new();
        for offset in 0..10 {
            let index = FIRST_INDEX - offset;
            storage
                .insert(secret_from_seed(&seed, index), index)
                .unwrap();
        }
        let encoded = storage.wire_serialize();
        assert_eq!(
            SecretStorage::wire_deserialize(&encoded).unwrap(),
            storage
        );
    }
}
