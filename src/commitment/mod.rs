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

//! Commitment, HTLC and closing transaction construction, ordering,
//! fee accounting and signature handling.

pub mod scripts;

use bitcoin::blockdata::transaction::{OutPoint, TxIn, TxOut};
use bitcoin::hashes::{sha256, Hash, HashEngine};
use bitcoin::util::sighash::SighashCache;
use bitcoin::{
    EcdsaSighashType, PackedLockTime, Script, Sequence, Transaction, Txid,
    Witness,
};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};

use crate::channel::keyset::ScriptKeys;
use crate::wire::HashLock;

/// Weight of a commitment transaction without HTLC outputs.
pub const COMMIT_WEIGHT: u64 = 724;
/// Weight added per non-dust HTLC output.
pub const HTLC_OUTPUT_WEIGHT: u64 = 172;
/// Weight of an HTLC-timeout transaction.
pub const HTLC_TIMEOUT_WEIGHT: u64 = 663;
/// Weight of an HTLC-success transaction.
pub const HTLC_SUCCESS_WEIGHT: u64 = 703;

/// Mask of the 48 bits of a commitment number.
pub const COMMITMENT_NUMBER_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

/// Errors of transaction construction and signature verification.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum Error {
    /// signature does not match the commitment transaction
    CommitmentSigMismatch,

    /// signature for the HTLC transaction of output {vout} is invalid
    HtlcSigMismatch { vout: usize },

    /// commitment_signed carries {carried} HTLC signatures where
    /// {expected} are required
    HtlcSigCount { carried: usize, expected: usize },

    /// closing transaction has no output above the dust limit
    AllOutputsDust,

    /// transaction input cannot be signed
    Sighash,
}

/// Fee schedule of one commitment at a given fee rate.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct FeeSchedule {
    /// Fee on the commitment transaction itself.
    pub commit: u64,

    /// Fee paid by an HTLC-timeout second-tier transaction.
    pub htlc_timeout: u64,

    /// Fee paid by an HTLC-success second-tier transaction.
    pub htlc_success: u64,
}

impl FeeSchedule {
    /// Computes the schedule for a fee rate and a number of non-dust
    /// HTLC outputs.
    pub fn with(feerate_per_kw: u32, nondust_htlcs: usize) -> FeeSchedule {
        let feerate = feerate_per_kw as u64;
        FeeSchedule {
            commit: (COMMIT_WEIGHT
                + HTLC_OUTPUT_WEIGHT * nondust_htlcs as u64)
                * feerate
                / 1000,
            htlc_timeout: HTLC_TIMEOUT_WEIGHT * feerate / 1000,
            htlc_success: HTLC_SUCCESS_WEIGHT * feerate / 1000,
        }
    }

    /// Second-tier fee of one HTLC, depending on its direction.
    pub fn second_tier(&self, offered: bool) -> u64 {
        if offered {
            self.htlc_timeout
        } else {
            self.htlc_success
        }
    }
}

/// One HTLC as seen from the commitment holder: `offered` HTLCs flow
/// from the holder to its counterparty.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct HtlcView {
    /// Direction relative to the commitment holder.
    pub offered: bool,

    /// HTLC value in millisatoshi.
    pub amount_msat: u64,

    /// Expiry block height.
    pub cltv_expiry: u32,

    /// Payment hash.
    pub payment_hash: HashLock,
}

impl HtlcView {
    /// Whether the HTLC output survives the dust rule on a commitment
    /// with the given dust limit and fee schedule.
    pub fn is_nondust(&self, dust_limit_sat: u64, fees: &FeeSchedule) -> bool {
        self.amount_msat / 1000
            >= dust_limit_sat + fees.second_tier(self.offered)
    }
}

/// Everything needed to deterministically build one side's commitment
/// transaction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CommitmentParams {
    /// The funding outpoint being spent.
    pub funding_outpoint: OutPoint,

    /// Funding amount in satoshi.
    pub funding_sat: u64,

    /// Obscured 48-bit commitment number.
    pub obscured_commitment_number: u64,

    /// Balance of the commitment holder, in millisatoshi.
    pub to_local_msat: u64,

    /// Balance of the counterparty, in millisatoshi.
    pub to_remote_msat: u64,

    /// Whether the commitment holder funded the channel and therefore
    /// pays the commitment fee.
    pub holder_pays_fee: bool,

    /// Blocks the holder's main output is delayed.
    pub to_self_delay: u16,

    /// Dust limit applying to this commitment.
    pub dust_limit_sat: u64,

    /// Fee rate in satoshi per 1000-weight.
    pub feerate_per_kw: u32,

    /// Script keys of this commitment.
    pub keys: ScriptKeys,

    /// Destination key of the counterparty's main output.
    pub to_remote_key: PublicKey,

    /// HTLCs pending on this commitment, ordered by id.
    pub htlcs: Vec<HtlcView>,
}

/// A built commitment transaction plus the auxiliary table recording
/// which HTLC backs which output after BIP-69 sorting.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BuiltCommitment {
    /// The unsigned commitment transaction.
    pub tx: Transaction,

    /// For every output, the index into [`CommitmentParams::htlcs`] it
    /// carries, or `None` for the main outputs.
    pub htlc_by_vout: Vec<Option<usize>>,

    /// The fee schedule the transaction was built under.
    pub fees: FeeSchedule,
}

/// Derives the 48-bit factor obscuring commitment numbers from the two
/// payment basepoints, opener first.
pub fn obscuring_factor(
    open_payment_basepoint: &PublicKey,
    accept_payment_basepoint: &PublicKey,
) -> u64 {
    let mut engine = sha256::Hash::engine();
    engine.input(&open_payment_basepoint.serialize());
    engine.input(&accept_payment_basepoint.serialize());
    let hash = sha256::Hash::from_engine(engine);

    let mut buf = [0u8; 8];
    buf.copy_from_slice(&hash[24..]);
    u64::from_be_bytes(buf) & COMMITMENT_NUMBER_MASK
}

/// Blends a commitment number with the channel's obscuring factor;
/// involutive, so it unblends as well.
#[inline]
pub fn obscure_commitment_number(commitment_number: u64, factor: u64) -> u64 {
    (commitment_number & COMMITMENT_NUMBER_MASK) ^ factor
}

/// `nSequence` of the funding input carrying the upper 24 obscured
/// bits.
#[inline]
pub fn commitment_sequence(obscured: u64) -> Sequence {
    Sequence((0x80u32 << 24) | (obscured >> 24) as u32)
}

/// `nLockTime` carrying the lower 24 obscured bits.
#[inline]
pub fn commitment_locktime(obscured: u64) -> PackedLockTime {
    PackedLockTime((0x20u32 << 24) | (obscured as u32 & 0x00FF_FFFF))
}

/// Extracts the obscured commitment number back out of a commitment
/// transaction's sequence and locktime fields.
pub fn obscured_number_of_tx(tx: &Transaction) -> u64 {
    let sequence = tx.input[0].sequence.0 as u64;
    let locktime = tx.lock_time.0 as u64;
    ((sequence & 0x00FF_FFFF) << 24) | (locktime & 0x00FF_FFFF)
}

/// Builds one side's commitment transaction: main outputs, non-dust
/// HTLC outputs, fee deduction from the funder and BIP-69 ordering.
pub fn build_commitment(params: &CommitmentParams) -> BuiltCommitment {
    let nondust_probe = FeeSchedule::with(params.feerate_per_kw, 0);
    let nondust = params
        .htlcs
        .iter()
        .filter(|htlc| htlc.is_nondust(params.dust_limit_sat, &nondust_probe))
        .count();
    let fees = FeeSchedule::with(params.feerate_per_kw, nondust);

    let mut to_local_sat = params.to_local_msat / 1000;
    let mut to_remote_sat = params.to_remote_msat / 1000;
    if params.holder_pays_fee {
        to_local_sat = to_local_sat.saturating_sub(fees.commit);
    } else {
        to_remote_sat = to_remote_sat.saturating_sub(fees.commit);
    }

    // (value, script, backing HTLC, tie-break) before ordering
    let mut outputs: Vec<(u64, Script, Option<usize>, u32)> = Vec::new();
    if to_local_sat >= params.dust_limit_sat {
        outputs.push((
            to_local_sat,
            scripts::to_local_script(
                &params.keys.revocation,
                &params.keys.delayed,
                params.to_self_delay,
            )
            .to_v0_p2wsh(),
            None,
            0,
        ));
    }
    if to_remote_sat >= params.dust_limit_sat {
        outputs.push((
            to_remote_sat,
            scripts::to_remote_script(&params.to_remote_key),
            None,
            0,
        ));
    }
    for (index, htlc) in params.htlcs.iter().enumerate() {
        if !htlc.is_nondust(params.dust_limit_sat, &fees) {
            continue;
        }
        let script = htlc_witness_script(htlc, &params.keys);
        outputs.push((
            htlc.amount_msat / 1000,
            script.to_v0_p2wsh(),
            Some(index),
            htlc.cltv_expiry,
        ));
    }

    // BIP-69 lexicographic (value, scriptPubkey) output order; two
    // otherwise identical HTLC outputs fall back to their expiry so
    // both peers map signatures onto the same outputs
    outputs.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| a.1.as_bytes().cmp(b.1.as_bytes()))
            .then_with(|| a.3.cmp(&b.3))
    });

    let htlc_by_vout = outputs.iter().map(|output| output.2).collect();
    let tx = Transaction {
        version: 2,
        lock_time: commitment_locktime(params.obscured_commitment_number),
        input: vec![TxIn {
            previous_output: params.funding_outpoint,
            script_sig: Script::new(),
            sequence: commitment_sequence(params.obscured_commitment_number),
            witness: Witness::new(),
        }],
        output: outputs
            .into_iter()
            .map(|(value, script_pubkey, _, _)| TxOut {
                value,
                script_pubkey,
            })
            .collect(),
    };

    BuiltCommitment {
        tx,
        htlc_by_vout,
        fees,
    }
}

/// The witness script of an HTLC output on this commitment.
pub fn htlc_witness_script(htlc: &HtlcView, keys: &ScriptKeys) -> Script {
    if htlc.offered {
        scripts::offered_htlc_script(
            &keys.revocation,
            &keys.key,
            &keys.remote_key,
            &htlc.payment_hash,
        )
    } else {
        scripts::received_htlc_script(
            &keys.revocation,
            &keys.key,
            &keys.remote_key,
            htlc.cltv_expiry,
            &htlc.payment_hash,
        )
    }
}

/// Builds the second-tier transaction sweeping an HTLC output:
/// HTLC-timeout for offered HTLCs (locked to the expiry height),
/// HTLC-success for received ones.
pub fn build_htlc_tx(
    commit_txid: Txid,
    vout: u32,
    htlc: &HtlcView,
    keys: &ScriptKeys,
    to_self_delay: u16,
    fees: &FeeSchedule,
) -> Transaction {
    let output_value =
        (htlc.amount_msat / 1000).saturating_sub(fees.second_tier(htlc.offered));
    let lock_time = if htlc.offered { htlc.cltv_expiry } else { 0 };
    Transaction {
        version: 2,
        lock_time: PackedLockTime(lock_time),
        input: vec![TxIn {
            previous_output: OutPoint::new(commit_txid, vout),
            script_sig: Script::new(),
            sequence: Sequence::ZERO,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: output_value,
            script_pubkey: scripts::to_local_script(
                &keys.revocation,
                &keys.delayed,
                to_self_delay,
            )
            .to_v0_p2wsh(),
        }],
    }
}

/// Builds the mutual-close transaction. The fee is split evenly while
/// both payouts stay above the dust limit; once one side's payout is
/// dropped, the surviving side carries the whole fee. Outputs are
/// BIP-69 sorted.
pub fn build_closing_tx(
    funding_outpoint: OutPoint,
    local_script: &Script,
    remote_script: &Script,
    local_msat: u64,
    remote_msat: u64,
    fee_sat: u64,
    dust_limit_sat: u64,
) -> Result<Transaction, Error> {
    let mut fee = fee_sat / 2;
    let local_sat = local_msat / 1000;
    let remote_sat = remote_msat / 1000;
    let keep_local = local_sat > fee + dust_limit_sat;
    let keep_remote = remote_sat > fee + dust_limit_sat;
    if !keep_local || !keep_remote {
        fee = fee_sat;
    }
    if !keep_local && !keep_remote {
        return Err(Error::AllOutputsDust);
    }

    let mut outputs: Vec<(u64, Script)> = Vec::new();
    if keep_local {
        outputs.push((local_sat - fee, local_script.clone()));
    }
    if keep_remote {
        outputs.push((remote_sat - fee, remote_script.clone()));
    }
    outputs.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| a.1.as_bytes().cmp(b.1.as_bytes()))
    });

    Ok(Transaction {
        version: 2,
        lock_time: PackedLockTime::ZERO,
        input: vec![TxIn {
            previous_output: funding_outpoint,
            script_sig: Script::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: outputs
            .into_iter()
            .map(|(value, script_pubkey)| TxOut {
                value,
                script_pubkey,
            })
            .collect(),
    })
}

fn segwit_sighash(
    tx: &Transaction,
    script_code: &Script,
    value_sat: u64,
) -> Result<Message, Error> {
    let mut cache = SighashCache::new(tx);
    let sighash = cache
        .segwit_signature_hash(0, script_code, value_sat, EcdsaSighashType::All)
        .map_err(|_| Error::Sighash)?;
    Message::from_slice(&sighash[..]).map_err(|_| Error::Sighash)
}

/// Signs the funding input of a commitment or closing transaction.
pub fn sign_funding_input(
    tx: &Transaction,
    redeem_script: &Script,
    funding_sat: u64,
    funding_key: &SecretKey,
) -> Result<Signature, Error> {
    let msg = segwit_sighash(tx, redeem_script, funding_sat)?;
    Ok(SECP256K1.sign_ecdsa(&msg, funding_key))
}

/// Verifies a counterparty signature over the funding input.
pub fn verify_funding_signature(
    tx: &Transaction,
    redeem_script: &Script,
    funding_sat: u64,
    signature: &Signature,
    funding_pubkey: &PublicKey,
) -> Result<(), Error> {
    let msg = segwit_sighash(tx, redeem_script, funding_sat)?;
    SECP256K1
        .verify_ecdsa(&msg, signature, funding_pubkey)
        .map_err(|_| Error::CommitmentSigMismatch)
}

/// Signs a second-tier HTLC transaction against the HTLC output it
/// spends.
pub fn sign_htlc_tx(
    htlc_tx: &Transaction,
    htlc_script: &Script,
    htlc_value_sat: u64,
    funding_key: &SecretKey,
) -> Result<Signature, Error> {
    let msg = segwit_sighash(htlc_tx, htlc_script, htlc_value_sat)?;
    Ok(SECP256K1.sign_ecdsa(&msg, funding_key))
}

/// Verifies a counterparty signature over a second-tier HTLC
/// transaction.
pub fn verify_htlc_signature(
    htlc_tx: &Transaction,
    htlc_script: &Script,
    htlc_value_sat: u64,
    signature: &Signature,
    funding_pubkey: &PublicKey,
    vout: usize,
) -> Result<(), Error> {
    let msg = segwit_sighash(htlc_tx, htlc_script, htlc_value_sat)?;
    SECP256K1
        .verify_ecdsa(&msg, signature, funding_pubkey)
        .map_err(|_| Error::HtlcSigMismatch { vout })
}

/// Assembles the 2-of-2 witness of the funding input, ordering the two
/// signatures the way the funding keys are ordered in the redeem
/// script.
pub fn finalize_funding_input(
    tx: &mut Transaction,
    redeem_script: &Script,
    local_sig: &Signature,
    remote_sig: &Signature,
    local_first: bool,
) {
    let mut local = local_sig.serialize_der().to_vec();
    local.push(EcdsaSighashType::All as u8);
    let mut remote = remote_sig.serialize_der().to_vec();
    remote.push(EcdsaSighashType::All as u8);
    let (first, second) = if local_first {
        (local, remote)
    } else {
        (remote, local)
    };

    let mut witness = Witness::new();
    witness.push(Vec::new());
    witness.push(first);
    witness.push(second);
    witness.push(redeem_script.to_bytes());
    tx.input[0].witness = witness;
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use secp256k1::SecretKey;

    use super::*;
    use crate::channel::keyset::Keypair;

    fn keys_for_test() -> ScriptKeys {
        ScriptKeys {
            key: Keypair::from_secret(
                SecretKey::from_slice(&[0x31; 32]).unwrap(),
            )
            .pk,
            remote_key: Keypair::from_secret(
                SecretKey::from_slice(&[0x32; 32]).unwrap(),
            )
            .pk,
            revocation: Keypair::from_secret(
                SecretKey::from_slice(&[0x33; 32]).unwrap(),
            )
            .pk,
            delayed: Keypair::from_secret(
                SecretKey::from_slice(&[0x34; 32]).unwrap(),
            )
            .pk,
        }
    }

    fn params_for_test() -> CommitmentParams {
        CommitmentParams {
            funding_outpoint: OutPoint::new(
                Txid::from_str(
                    "fd2105607605d2302994ffea703b09f66b6351816ee737a93e42a841ea20bbad",
                )
                .unwrap(),
                0,
            ),
            funding_sat: 1_000_000,
            obscured_commitment_number: 0x2bb038521914 ^ 42,
            to_local_msat: 700_000_000,
            to_remote_msat: 300_000_000,
            holder_pays_fee: true,
            to_self_delay: 144,
            dust_limit_sat: 546,
            feerate_per_kw: 500,
            keys: keys_for_test(),
            to_remote_key: Keypair::from_secret(
                SecretKey::from_slice(&[0x35; 32]).unwrap(),
            )
            .pk,
            htlcs: vec![],
        }
    }

    #[test]
    fn obscuring_factor_testvec() {
        let open = PublicKey::from_str("034f355bdcb7cc0af728ef3cceb9615d90684bb5b2ca5f859ab0f0b704075871aa").unwrap();
        let accept = PublicKey::from_str("032c0b7cf95324a07d05398b240174dc0c2be444d96b159aa6c7f7b1e668680991").unwrap();
        assert_eq!(obscuring_factor(&open, &accept), 0x2bb038521914);
    }

    #[test]
    fn obscure_is_involutive() {
        let factor = 0x2bb038521914;
        for number in [0u64, 1, 42, COMMITMENT_NUMBER_MASK] {
            let obscured = obscure_commitment_number(number, factor);
            assert_eq!(
                obscure_commitment_number(obscured, factor),
                number & COMMITMENT_NUMBER_MASK
            );
        }
    }

    #[test]
    fn sequence_locktime_packing() {
        let params = params_for_test();
        let built = build_commitment(&params);
        assert_eq!(
            obscured_number_of_tx(&built.tx),
            params.obscured_commitment_number
        );
        assert_eq!(built.tx.input[0].sequence.0 >> 24, 0x80);
        assert_eq!(built.tx.lock_time.0 >> 24, 0x20);
    }

    #[test]
    fn funder_pays_commit_fee() {
        let params = params_for_test();
        let built = build_commitment(&params);
        let fee = FeeSchedule::with(500, 0).commit;
        let total: u64 = built.tx.output.iter().map(|out| out.value).sum();
        assert_eq!(total, 1_000_000 - fee);
        assert!(built
            .tx
            .output
            .iter()
            .any(|out| out.value == 700_000 - fee));
        assert!(built.tx.output.iter().any(|out| out.value == 300_000));
    }

    #[test]
    fn outputs_are_bip69_sorted() {
        let mut params = params_for_test();
        params.htlcs = vec![
            HtlcView {
                offered: true,
                amount_msat: 50_000_000,
                cltv_expiry: 500_010,
                payment_hash: HashLock::default(),
            },
            HtlcView {
                offered: false,
                amount_msat: 20_000_000,
                cltv_expiry: 500_020,
                payment_hash: HashLock::default(),
            },
        ];
        let built = build_commitment(&params);
        let values: Vec<u64> =
            built.tx.output.iter().map(|out| out.value).collect();
        let mut sorted = values.clone();
        sorted.sort_unstable();
        assert_eq!(values, sorted);

        // the auxiliary table tracks HTLC outputs through the sort
        for (vout, backing) in built.htlc_by_vout.iter().enumerate() {
            if let Some(index) = backing {
                assert_eq!(
                    built.tx.output[vout].value,
                    params.htlcs[*index].amount_msat / 1000
                );
            }
        }
    }

    #[test]
    fn dust_htlc_omitted() {
        let mut params = params_for_test();
        params.htlcs = vec![HtlcView {
            offered: true,
            amount_msat: 400_000, // 400 sat: below dust + timeout fee
            cltv_expiry: 500_010,
            payment_hash: HashLock::default(),
        }];
        let built = build_commitment(&params);
        assert_eq!(built.tx.output.len(), 2);
        assert!(built.htlc_by_vout.iter().all(Option::is_none));
    }

    #[test]
    fn funding_signature_verifies() {
        let params = params_for_test();
        let built = build_commitment(&params);
        let funding = Keypair::from_secret(
            SecretKey::from_slice(&[0x36; 32]).unwrap(),
        );
        let other = Keypair::from_secret(
            SecretKey::from_slice(&[0x37; 32]).unwrap(),
        );
        let redeem = scripts::funding_redeem_script(&funding.pk, &other.pk);

        let sig = sign_funding_input(
            &built.tx,
            &redeem,
            params.funding_sat,
            &funding.sk,
        )
        .unwrap();
        verify_funding_signature(
            &built.tx,
            &redeem,
            params.funding_sat,
            &sig,
            &funding.pk,
        )
        .unwrap();
        assert_eq!(
            verify_funding_signature(
                &built.tx,
                &redeem,
                params.funding_sat,
                &sig,
                &other.pk,
            )
            .unwrap_err(),
            Error::CommitmentSigMismatch
        );
    }

    #[test]
    fn htlc_tx_locktime_by_direction() {
        let keys = keys_for_test();
        let fees = FeeSchedule::with(500, 1);
        let offered = HtlcView {
            offered: true,
            amount_msat: 50_000_000,
            cltv_expiry: 500_010,
            payment_hash: HashLock::default(),
        };
        let received = HtlcView {
            offered: false,
            ..offered
        };
        let txid = Txid::from_str(
            "fd2105607605d2302994ffea703b09f66b6351816ee737a93e42a841ea20bbad",
        )
        .unwrap();

        let timeout_tx = build_htlc_tx(txid, 1, &offered, &keys, 144, &fees);
        assert_eq!(timeout_tx.lock_time.0, 500_010);
        assert_eq!(
            timeout_tx.output[0].value,
            50_000 - fees.htlc_timeout
        );

        let success_tx = build_htlc_tx(txid, 1, &received, &keys, 144, &fees);
        assert_eq!(success_tx.lock_time.0, 0);
        assert_eq!(
            success_tx.output[0].value,
            50_000 - fees.htlc_success
        );
    }

    #[test]
    fn closing_fee_split() {
        let outpoint = OutPoint::new(
            Txid::from_str(
                "fd2105607605d2302994ffea703b09f66b6351816ee737a93e42a841ea20bbad",
            )
            .unwrap(),
            0,
        );
        let local = Script::from(vec![0x00, 0x14, 0x11]);
        let remote = Script::from(vec![0x00, 0x14, 0x22]);

        let tx = build_closing_tx(
            outpoint,
            &local,
            &remote,
            900_000_000,
            100_000_000,
            1_000,
            546,
        )
        .unwrap();
        assert_eq!(tx.output.len(), 2);
        let total: u64 = tx.output.iter().map(|out| out.value).sum();
        assert_eq!(total, 1_000_000 - 1_000);

        // one side below dust: survivor pays the whole fee
        let tx = build_closing_tx(
            outpoint,
            &local,
            &remote,
            999_900_000,
            100_000,
            1_000,
            546,
        )
        .unwrap();
        assert_eq!(tx.output.len(), 1);
        assert_eq!(tx.output[0].value, 999_900 - 1_000);
    }
}
