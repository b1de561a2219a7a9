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

//! Witness scripts of the funding, commitment and HTLC outputs.

use bitcoin::blockdata::opcodes::all::*;
use bitcoin::blockdata::script;
use amplify::Wrapper;
use bitcoin::hashes::{ripemd160, Hash};
use bitcoin::Script;
use secp256k1::PublicKey;

use crate::wire::HashLock;

/// Orders the two funding keys lexicographically by their compressed
/// serialization; `true` when the local key sorts first.
pub fn funding_keys_local_first(
    local_pubkey: &PublicKey,
    remote_pubkey: &PublicKey,
) -> bool {
    local_pubkey.serialize() <= remote_pubkey.serialize()
}

/// The 2-of-2 multisig witness script of the funding output, with keys
/// in lexicographic order.
pub fn funding_redeem_script(
    local_pubkey: &PublicKey,
    remote_pubkey: &PublicKey,
) -> Script {
    let (first, second) = if funding_keys_local_first(local_pubkey, remote_pubkey)
    {
        (local_pubkey, remote_pubkey)
    } else {
        (remote_pubkey, local_pubkey)
    };
    script::Builder::new()
        .push_int(2)
        .push_key(&bitcoin::PublicKey::new(*first))
        .push_key(&bitcoin::PublicKey::new(*second))
        .push_int(2)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script()
}

/// The `to_local` witness script: immediately spendable through the
/// revocation key, and after `to_self_delay` blocks through the delayed
/// key.
pub fn to_local_script(
    revocation_pubkey: &PublicKey,
    delayed_pubkey: &PublicKey,
    to_self_delay: u16,
) -> Script {
    script::Builder::new()
        .push_opcode(OP_IF)
        .push_key(&bitcoin::PublicKey::new(*revocation_pubkey))
        .push_opcode(OP_ELSE)
        .push_int(to_self_delay as i64)
        .push_opcode(OP_CSV)
        .push_opcode(OP_DROP)
        .push_key(&bitcoin::PublicKey::new(*delayed_pubkey))
        .push_opcode(OP_ENDIF)
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

/// Witness script of an HTLC offered by the commitment holder: the
/// counterparty claims with the payment preimage, the holder recovers
/// through the HTLC-timeout transaction, and the revocation key sweeps
/// either way.
pub fn offered_htlc_script(
    revocation_pubkey: &PublicKey,
    local_key: &PublicKey,
    remote_key: &PublicKey,
    payment_hash: &HashLock,
) -> Script {
    let revocation_key_hash =
        bitcoin::PublicKey::new(*revocation_pubkey).pubkey_hash();
    let payment_ripemd = ripemd160::Hash::hash(payment_hash.as_inner().as_inner());
    script::Builder::new()
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(&revocation_key_hash[..])
        .push_opcode(OP_EQUAL)
        .push_opcode(OP_IF)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ELSE)
        .push_key(&bitcoin::PublicKey::new(*remote_key))
        .push_opcode(OP_SWAP)
        .push_opcode(OP_SIZE)
        .push_int(32)
        .push_opcode(OP_EQUAL)
        .push_opcode(OP_NOTIF)
        .push_opcode(OP_DROP)
        .push_int(2)
        .push_opcode(OP_SWAP)
        .push_key(&bitcoin::PublicKey::new(*local_key))
        .push_int(2)
        .push_opcode(OP_CHECKMULTISIG)
        .push_opcode(OP_ELSE)
        .push_opcode(OP_HASH160)
        .push_slice(&payment_ripemd[..])
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ENDIF)
        .push_opcode(OP_ENDIF)
        .into_script()
}

/// Witness script of an HTLC received by the commitment holder: the
/// holder claims with the payment preimage through the HTLC-success
/// transaction, the counterparty recovers after the CLTV expiry, and
/// the revocation key sweeps either way.
pub fn received_htlc_script(
    revocation_pubkey: &PublicKey,
    local_key: &PublicKey,
    remote_key: &PublicKey,
    cltv_expiry: u32,
    payment_hash: &HashLock,
) -> Script {
    let revocation_key_hash =
        bitcoin::PublicKey::new(*revocation_pubkey).pubkey_hash();
    let payment_ripemd = ripemd160::Hash::hash(payment_hash.as_inner().as_inner());
    script::Builder::new()
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(&revocation_key_hash[..])
        .push_opcode(OP_EQUAL)
        .push_opcode(OP_IF)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ELSE)
        .push_key(&bitcoin::PublicKey::new(*remote_key))
        .push_opcode(OP_SWAP)
        .push_opcode(OP_SIZE)
        .push_int(32)
        .push_opcode(OP_EQUAL)
        .push_opcode(OP_IF)
        .push_opcode(OP_HASH160)
        .push_slice(&payment_ripemd[..])
        .push_opcode(OP_EQUALVERIFY)
        .push_int(2)
        .push_opcode(OP_SWAP)
        .push_key(&bitcoin::PublicKey::new(*local_key))
        .push_int(2)
        .push_opcode(OP_CHECKMULTISIG)
        .push_opcode(OP_ELSE)
        .push_opcode(OP_DROP)
        .push_int(cltv_expiry as i64)
        .push_opcode(OP_CLTV)
        .push_opcode(OP_DROP)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ENDIF)
        .push_opcode(OP_ENDIF)
        .into_script()
}

/// P2WPKH script paying the counterparty's main output.
pub fn to_remote_script(payment_pubkey: &PublicKey) -> Script {
    Script::new_v0_p2wpkh(
        &bitcoin::PublicKey::new(*payment_pubkey)
            .wpubkey_hash()
            .expect("compressed key"),
    )
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use amplify::hex::ToHex;

    use super::*;

    macro_rules! pk {
        ($hex:expr) => {
            PublicKey::from_str($hex).unwrap()
        };
    }

    #[test]
    fn funding_witness_script() {
        let local = pk!("023da092f6980e58d2c037173180e9a465476026ee50f96695963e8efe436f54eb");
        let remote = pk!("030e9f7b623d2ccc7c9bd44d66d5ce21ce504c0acf6385a132cec6d3c39fa711c1");
        let witness_script = funding_redeem_script(&local, &remote);
        assert_eq!(
            witness_script.to_bytes().to_hex(),
            "5221023da092f6980e58d2c037173180e9a465476026ee50f96695963e8efe436f\
            54eb21030e9f7b623d2ccc7c9bd44d66d5ce21ce504c0acf6385a132cec6d3c39fa\
            711c152ae"
        );
        // key order is canonical regardless of which side is local
        assert_eq!(witness_script, funding_redeem_script(&remote, &local));
        assert!(funding_keys_local_first(&local, &remote));
        assert!(!funding_keys_local_first(&remote, &local));
    }

    #[test]
    fn to_local_script_shape() {
        let revocation = pk!("0212a140cd0c6539d07cd08dfe09984dec3251ea808b892efeac3ede9402bf2b19");
        let delayed = pk!("03fd5960528dc152014952efdb702a88f71e3c1653b2314431701ec77e57fde83c");
        let script = to_local_script(&revocation, &delayed, 144);
        let asm = script.asm();
        assert!(asm.starts_with("OP_IF"));
        assert!(asm.contains("OP_CSV"));
        assert!(asm.ends_with("OP_CHECKSIG"));
    }

    #[test]
    fn htlc_scripts_differ_by_direction() {
        let revocation = pk!("0212a140cd0c6539d07cd08dfe09984dec3251ea808b892efeac3ede9402bf2b19");
        let local = pk!("030d417a46946384f88d5f3337267c5e579765875dc4daca813e21734b140639e7");
        let remote = pk!("0394854aa6eab5b2a8122cc726e9dded053a2184d88256816826d6231c068d4a5b");
        let hash = HashLock::default();
        let offered = offered_htlc_script(&revocation, &local, &remote, &hash);
        let received =
            received_htlc_script(&revocation, &local, &remote, 500_010, &hash);
        assert_ne!(offered, received);
        assert!(received.asm().contains("OP_CLTV"));
        assert!(!offered.asm().contains("OP_CLTV"));
    }
}
