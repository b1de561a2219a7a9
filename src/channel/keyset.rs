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

//! Channel key material: the five funding-index keypairs of each side
//! and the per-commitment script keys derived from them.

use bitcoin::hashes::{sha256, Hash, HashEngine};
use secp256k1::{PublicKey, Scalar, SecretKey, SECP256K1};

use crate::wire::{AcceptChannel, OpenChannel};

/// A secret key together with its public key.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Keypair {
    pub sk: SecretKey,
    pub pk: PublicKey,
}

impl Keypair {
    /// Generates a fresh random keypair.
    pub fn random() -> Self {
        Keypair::from_secret(SecretKey::new(&mut rand::thread_rng()))
    }

    /// Builds the keypair of a secret key.
    pub fn from_secret(sk: SecretKey) -> Self {
        Keypair {
            sk,
            pk: PublicKey::from_secret_key(SECP256K1, &sk),
        }
    }
}

/// The local side's channel key material. The funding key is provided
/// by the host when requested during establishment; the basepoints are
/// generated fresh per channel and the per-commitment keypair follows
/// the ratchet.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LocalKeyset {
    /// Key of the 2-of-2 funding output; set by the host.
    pub funding: Option<Keypair>,

    /// Base point for deriving keys of penalty spending paths.
    pub revocation_basepoint: Keypair,

    /// Base point for deriving `to_remote` and HTLC keys.
    pub payment_basepoint: Keypair,

    /// Base point for deriving `to_local` time-locked spending keys.
    pub delayed_payment_basepoint: Keypair,

    /// Current per-commitment keypair from the ratchet.
    pub per_commitment: Keypair,
}

impl LocalKeyset {
    /// Generates fresh basepoints, with the funding key left for the
    /// host and the per-commitment keypair for the ratchet.
    pub fn generate(first_per_commitment: Keypair) -> Self {
        LocalKeyset {
            funding: None,
            revocation_basepoint: Keypair::random(),
            payment_basepoint: Keypair::random(),
            delayed_payment_basepoint: Keypair::random(),
            per_commitment: first_per_commitment,
        }
    }

    /// The funding public key; the host must have provided the funding
    /// key beforehand.
    pub fn funding_pubkey(&self) -> Option<PublicKey> {
        self.funding.map(|keypair| keypair.pk)
    }
}

/// The remote side's channel key material as received in
/// `open_channel` or `accept_channel`, with the per-commitment point
/// rolling forward on each `revoke_and_ack` and `funding_locked`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RemoteKeyset {
    /// Key of the 2-of-2 funding output.
    pub funding_pubkey: PublicKey,

    /// Base point for deriving keys of penalty spending paths.
    pub revocation_basepoint: PublicKey,

    /// Base point for deriving `to_remote` and HTLC keys.
    pub payment_basepoint: PublicKey,

    /// Base point for deriving `to_local` time-locked spending keys.
    pub delayed_payment_basepoint: PublicKey,

    /// The peer's current per-commitment point.
    pub per_commitment_point: PublicKey,
}

impl From<&OpenChannel> for RemoteKeyset {
    fn from(open_channel: &OpenChannel) -> Self {
        RemoteKeyset {
            funding_pubkey: open_channel.funding_pubkey,
            revocation_basepoint: open_channel.revocation_basepoint,
            payment_basepoint: open_channel.payment_basepoint,
            delayed_payment_basepoint: open_channel.delayed_payment_basepoint,
            per_commitment_point: open_channel.first_per_commitment_point,
        }
    }
}

impl From<&AcceptChannel> for RemoteKeyset {
    fn from(accept_channel: &AcceptChannel) -> Self {
        RemoteKeyset {
            funding_pubkey: accept_channel.funding_pubkey,
            revocation_basepoint: accept_channel.revocation_basepoint,
            payment_basepoint: accept_channel.payment_basepoint,
            delayed_payment_basepoint: accept_channel
                .delayed_payment_basepoint,
            per_commitment_point: accept_channel.first_per_commitment_point,
        }
    }
}

/// Script keys of one commitment transaction, all derived from that
/// commitment's per-commitment point.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ScriptKeys {
    /// Key of the commitment holder within HTLC scripts.
    pub key: PublicKey,

    /// Key of the counterparty within HTLC scripts.
    pub remote_key: PublicKey,

    /// Penalty key of the `to_local` and HTLC outputs.
    pub revocation: PublicKey,

    /// Time-locked claim key of the `to_local` output.
    pub delayed: PublicKey,
}

impl ScriptKeys {
    /// Derives the script keys of the commitment owned by the side
    /// whose per-commitment point is `per_commitment_point`.
    ///
    /// `payment_base` and `delayed_base` belong to the commitment
    /// holder; `remote_payment_base` and `revocation_base` to its
    /// counterparty.
    pub fn derive(
        per_commitment_point: &PublicKey,
        payment_base: &PublicKey,
        remote_payment_base: &PublicKey,
        revocation_base: &PublicKey,
        delayed_base: &PublicKey,
    ) -> ScriptKeys {
        ScriptKeys {
            key: tweak_pubkey(payment_base, per_commitment_point),
            remote_key: tweak_pubkey(
                remote_payment_base,
                per_commitment_point,
            ),
            revocation: derive_revocation_pubkey(
                revocation_base,
                per_commitment_point,
            ),
            delayed: tweak_pubkey(delayed_base, per_commitment_point),
        }
    }
}

fn tweak_hash(first: &PublicKey, second: &PublicKey) -> Scalar {
    let mut engine = sha256::Hash::engine();
    engine.input(&first.serialize());
    engine.input(&second.serialize());
    let hash = sha256::Hash::from_engine(engine);
    Scalar::from_be_bytes(hash.into_inner())
        .expect("negligible probability")
}

/// `basepoint + SHA256(per_commitment_point ‖ basepoint)·G`
pub fn tweak_pubkey(
    basepoint: &PublicKey,
    per_commitment_point: &PublicKey,
) -> PublicKey {
    basepoint
        .add_exp_tweak(
            SECP256K1,
            &tweak_hash(per_commitment_point, basepoint),
        )
        .expect("negligible probability")
}

/// `basepoint_secret + SHA256(per_commitment_point ‖ basepoint)`
pub fn tweak_seckey(
    base: &SecretKey,
    per_commitment_point: &PublicKey,
) -> SecretKey {
    let basepoint = PublicKey::from_secret_key(SECP256K1, base);
    base.add_tweak(&tweak_hash(per_commitment_point, &basepoint))
        .expect("negligible probability")
}

/// `revocation_basepoint·SHA256(revocation_basepoint ‖ point) +
/// point·SHA256(point ‖ revocation_basepoint)`
pub fn derive_revocation_pubkey(
    revocation_basepoint: &PublicKey,
    per_commitment_point: &PublicKey,
) -> PublicKey {
    let tweaked_base = revocation_basepoint
        .mul_tweak(
            SECP256K1,
            &tweak_hash(revocation_basepoint, per_commitment_point),
        )
        .expect("negligible probability");
    let tweaked_point = per_commitment_point
        .mul_tweak(
            SECP256K1,
            &tweak_hash(per_commitment_point, revocation_basepoint),
        )
        .expect("negligible probability");
    tweaked_base
        .combine(&tweaked_point)
        .expect("negligible probability")
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    macro_rules! pk {
        ($hex:expr) => {
            PublicKey::from_str($hex).unwrap()
        };
    }

    #[test]
    fn localkey_derivation() {
        let base_point = pk!("036d6caac248af96f6afa7f904f550253a0f3ef3f5aa2fe6838a95b216691468e2");
        let per_commitment_point = pk!("025f7117a78150fe2ef97db7cfc83bd57b2e2c0d0dd25eaf467a4a1c2a45ce1486");
        assert_eq!(
            tweak_pubkey(&base_point, &per_commitment_point),
            pk!("0235f2dbfaa89b57ec7b055afe29849ef7ddfeb1cefdb9ebdc43f5494984db29e5")
        );
    }

    #[test]
    fn revocationkey_derivation() {
        let base_point = pk!("036d6caac248af96f6afa7f904f550253a0f3ef3f5aa2fe6838a95b216691468e2");
        let per_commitment_point = pk!("025f7117a78150fe2ef97db7cfc83bd57b2e2c0d0dd25eaf467a4a1c2a45ce1486");
        assert_eq!(
            derive_revocation_pubkey(&base_point, &per_commitment_point),
            pk!("02916e326636d19c33f13e8c0c3a03dd157f332f3e99c317c141dd865eb01f8ff0")
        );
    }

    #[test]
    fn secret_tweak_matches_pubkey_tweak() {
        let base = SecretKey::from_slice(&[0x24; 32]).unwrap();
        let per_commitment_point = PublicKey::from_secret_key(
            SECP256K1,
            &SecretKey::from_slice(&[0x42; 32]).unwrap(),
        );
        let tweaked_sk = tweak_seckey(&base, &per_commitment_point);
        let basepoint = PublicKey::from_secret_key(SECP256K1, &base);
        assert_eq!(
            PublicKey::from_secret_key(SECP256K1, &tweaked_sk),
            tweak_pubkey(&basepoint, &per_commitment_point)
        );
    }

    #[test]
    fn script_keys_are_side_symmetric() {
        // both parties must derive identical keys for a given
        // commitment from public data only
        let pcp = PublicKey::from_secret_key(
            SECP256K1,
            &SecretKey::from_slice(&[0x11; 32]).unwrap(),
        );
        let a_payment = Keypair::random();
        let b_payment = Keypair::random();
        let b_revocation = Keypair::random();
        let a_delayed = Keypair::random();

        let on_a = ScriptKeys::derive(
            &pcp,
            &a_payment.pk,
            &b_payment.pk,
            &b_revocation.pk,
            &a_delayed.pk,
        );
        let on_b = ScriptKeys::derive(
            &pcp,
            &a_payment.pk,
            &b_payment.pk,
            &b_revocation.pk,
            &a_delayed.pk,
        );
        assert_eq!(on_a, on_b);
        assert_ne!(on_a.key, on_a.remote_key);
    }
}
