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

//! Authenticated encrypted peer transport: the Noise_XK handshake and
//! per-message AEAD framing of BOLT-8.
//!
//! The handshake is a three-act pattern (initiator 50 bytes, responder
//! 50 bytes, initiator 66 bytes) over secp256k1 ECDH,
//! ChaCha20-Poly1305 and SHA-256 with the `lightning` prologue. Each
//! transport frame is an encrypted 2-byte length header plus an
//! encrypted payload, both carrying a 16-byte MAC; the per-direction
//! sending key is rotated through HKDF every [`KEY_ROTATION_INTERVAL`]
//! frames.

use chacha20poly1305::aead::{Aead, NewAead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use secp256k1::ecdh::SharedSecret;
use secp256k1::{PublicKey, SecretKey, SECP256K1};
use sha2::{Digest, Sha256};

/// Bytes of act one and act two of the handshake.
pub const ACT_ONE_LEN: usize = 50;
/// Bytes of act three of the handshake.
pub const ACT_THREE_LEN: usize = 66;
/// Bytes of an encrypted frame length header: AEAD(2) ‖ MAC(16).
pub const FRAME_HEADER_LEN: usize = 18;
/// Bytes the AEAD appends to every ciphertext.
pub const MAC_LEN: usize = 16;
/// AEAD operations after which a direction's key is rotated.
pub const KEY_ROTATION_INTERVAL: u64 = 1000;

const PROTOCOL_NAME: &[u8] = b"Noise_XK_secp256k1_ChaChaPoly_SHA256";
const PROLOGUE: &[u8] = b"lightning";
const HANDSHAKE_VERSION: u8 = 0;

/// Errors of the Noise transport. Any of them closes the transport;
/// the channel itself is unaffected until re-handshake.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum Error {
    /// handshake act received out of order or after completion
    UnexpectedAct,

    /// handshake act has wrong length
    BadActLength,

    /// unsupported handshake version byte {0}
    BadVersion(u8),

    /// act carries an invalid public key
    BadPubkey,

    /// MAC verification failed
    MacMismatch,

    /// transport used before the handshake completed
    HandshakeIncomplete,

    /// encrypted frame is shorter than its MAC
    FrameTooShort,
}

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut engine = Sha256::new();
    for part in parts {
        engine.update(part);
    }
    engine.finalize().into()
}

/// `HKDF-SHA256(salt, ikm)` with empty info, producing two 32-byte
/// keys.
fn hkdf_two(salt: &[u8; 32], ikm: &[u8]) -> ([u8; 32], [u8; 32]) {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; 64];
    hk.expand(&[], &mut okm)
        .expect("64 bytes is a valid HKDF-SHA256 output length");
    let mut first = [0u8; 32];
    let mut second = [0u8; 32];
    first.copy_from_slice(&okm[..32]);
    second.copy_from_slice(&okm[32..]);
    (first, second)
}

fn aead_nonce(counter: u64) -> Nonce {
    let mut raw = [0u8; 12];
    raw[4..].copy_from_slice(&counter.to_le_bytes());
    *Nonce::from_slice(&raw)
}

fn encrypt_with_ad(
    key: &[u8; 32],
    counter: u64,
    ad: &[u8],
    plaintext: &[u8],
) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(
            &aead_nonce(counter),
            Payload {
                msg: plaintext,
                aad: ad,
            },
        )
        .expect("ChaCha20-Poly1305 encryption is infallible")
}

fn decrypt_with_ad(
    key: &[u8; 32],
    counter: u64,
    ad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, Error> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(
            &aead_nonce(counter),
            Payload {
                msg: ciphertext,
                aad: ad,
            },
        )
        .map_err(|_| Error::MacMismatch)
}

fn ecdh(sk: &SecretKey, pk: &PublicKey) -> [u8; 32] {
    SharedSecret::new(pk, sk).secret_bytes()
}

/// One direction of the established transport: AEAD key, frame nonce
/// and the chaining key feeding rotations.
#[derive(Clone)]
struct CipherState {
    key: [u8; 32],
    nonce: u64,
    ck: [u8; 32],
}

impl CipherState {
    fn with(key: [u8; 32], ck: [u8; 32]) -> Self {
        CipherState { key, nonce: 0, ck }
    }

    fn encrypt(&mut self, ad: &[u8], plaintext: &[u8]) -> Vec<u8> {
        let ciphertext = encrypt_with_ad(&self.key, self.nonce, ad, plaintext);
        self.advance();
        ciphertext
    }

    fn decrypt(
        &mut self,
        ad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let plaintext =
            decrypt_with_ad(&self.key, self.nonce, ad, ciphertext)?;
        self.advance();
        Ok(plaintext)
    }

    fn advance(&mut self) {
        self.nonce += 1;
        if self.nonce >= KEY_ROTATION_INTERVAL {
            let (ck, key) = hkdf_two(&self.ck, &self.key);
            self.ck = ck;
            self.key = key;
            self.nonce = 0;
        }
    }
}

/// Rolling handshake digest and chaining key.
#[derive(Clone)]
struct HandshakeDigest {
    h: [u8; 32],
    ck: [u8; 32],
}

impl HandshakeDigest {
    fn new(responder_static: &PublicKey) -> Self {
        let h = sha256(&[PROTOCOL_NAME]);
        let ck = h;
        let h = sha256(&[&h, PROLOGUE]);
        let h = sha256(&[&h, &responder_static.serialize()[..]]);
        HandshakeDigest { h, ck }
    }

    fn mix_hash(&mut self, data: &[u8]) {
        self.h = sha256(&[&self.h, data]);
    }

    /// Mixes an ECDH result into the chaining key, producing the next
    /// temporary encryption key.
    fn mix_key(&mut self, ikm: &[u8; 32]) -> [u8; 32] {
        let (ck, temp) = hkdf_two(&self.ck, ikm);
        self.ck = ck;
        temp
    }
}

enum State {
    /// No handshake started yet.
    Idle,

    /// Initiator sent act one, awaits act two.
    InitiatorAwaitsActTwo {
        digest: HandshakeDigest,
        local_static: SecretKey,
        remote_static: PublicKey,
        ephemeral: SecretKey,
    },

    /// Responder awaits act one.
    ResponderAwaitsActOne {
        digest: HandshakeDigest,
        local_static: SecretKey,
    },

    /// Responder sent act two, awaits act three.
    ResponderAwaitsActThree {
        digest: HandshakeDigest,
        ephemeral: SecretKey,
        temp_k2: [u8; 32],
    },

    /// Handshake complete; symmetric transport keys in place.
    Transport {
        send: CipherState,
        recv: CipherState,
        remote_static: PublicKey,
    },
}

/// Progress report of [`NoiseTransport::handshake_recv`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum HandshakeAct {
    /// Send these bytes and keep pumping acts into the handshake.
    Respond(Vec<u8>),

    /// Handshake complete; `Some` carries the final act to send.
    Complete(Option<Vec<u8>>),
}

/// Noise transport of one peer connection, living through the
/// handshake into the symmetric frame phase.
pub struct NoiseTransport {
    state: State,
}

impl Default for NoiseTransport {
    fn default() -> Self {
        NoiseTransport { state: State::Idle }
    }
}

impl NoiseTransport {
    /// Creates a transport with no handshake in progress.
    pub fn new() -> Self {
        NoiseTransport::default()
    }

    /// Detects whether the handshake has completed.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Transport { .. })
    }

    /// The peer's static public key, authenticated by the handshake.
    pub fn remote_static(&self) -> Option<PublicKey> {
        match &self.state {
            State::Transport { remote_static, .. } => Some(*remote_static),
            _ => None,
        }
    }

    /// Starts a handshake. Passing the peer's node id makes this side
    /// the initiator and returns act one; passing `None` prepares the
    /// responder role and returns `None`.
    pub fn handshake_start(
        &mut self,
        local_static: SecretKey,
        remote_static: Option<PublicKey>,
    ) -> Option<Vec<u8>> {
        match remote_static {
            Some(remote_static) => {
                let ephemeral = SecretKey::new(&mut rand::thread_rng());
                Some(self.start_initiator(
                    local_static,
                    remote_static,
                    ephemeral,
                ))
            }
            None => {
                let digest = HandshakeDigest::new(&PublicKey::from_secret_key(
                    SECP256K1,
                    &local_static,
                ));
                self.state = State::ResponderAwaitsActOne {
                    digest,
                    local_static,
                };
                None
            }
        }
    }

    fn start_initiator(
        &mut self,
        local_static: SecretKey,
        remote_static: PublicKey,
        ephemeral: SecretKey,
    ) -> Vec<u8> {
        let mut digest = HandshakeDigest::new(&remote_static);
        let e_pub = PublicKey::from_secret_key(SECP256K1, &ephemeral);
        digest.mix_hash(&e_pub.serialize());
        let es = ecdh(&ephemeral, &remote_static);
        let temp_k1 = digest.mix_key(&es);
        let tag = encrypt_with_ad(&temp_k1, 0, &digest.h, &[]);
        digest.mix_hash(&tag);

        let mut act = Vec::with_capacity(ACT_ONE_LEN);
        act.push(HANDSHAKE_VERSION);
        act.extend_from_slice(&e_pub.serialize());
        act.extend_from_slice(&tag);

        self.state = State::InitiatorAwaitsActTwo {
            digest,
            local_static,
            remote_static,
            ephemeral,
        };
        act
    }

    /// Feeds a received handshake act into the state machine,
    /// returning what to send next and whether more acts are expected.
    pub fn handshake_recv(
        &mut self,
        act: &[u8],
    ) -> Result<HandshakeAct, Error> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::ResponderAwaitsActOne {
                mut digest,
                local_static,
            } => {
                let re = read_act_keyed(act, ACT_ONE_LEN)?;
                digest.mix_hash(&re.serialize());
                let es = ecdh(&local_static, &re);
                let temp_k1 = digest.mix_key(&es);
                decrypt_with_ad(
                    &temp_k1,
                    0,
                    &digest.h,
                    &act[34..ACT_ONE_LEN],
                )?;
                digest.mix_hash(&act[34..ACT_ONE_LEN]);

                // act two mirrors act one over the ephemeral keys
                let ephemeral = SecretKey::new(&mut rand::thread_rng());
                let e_pub = PublicKey::from_secret_key(SECP256K1, &ephemeral);
                digest.mix_hash(&e_pub.serialize());
                let ee = ecdh(&ephemeral, &re);
                let temp_k2 = digest.mix_key(&ee);
                let tag = encrypt_with_ad(&temp_k2, 0, &digest.h, &[]);
                digest.mix_hash(&tag);

                let mut response = Vec::with_capacity(ACT_ONE_LEN);
                response.push(HANDSHAKE_VERSION);
                response.extend_from_slice(&e_pub.serialize());
                response.extend_from_slice(&tag);

                self.state = State::ResponderAwaitsActThree {
                    digest,
                    ephemeral,
                    temp_k2,
                };
                Ok(HandshakeAct::Respond(response))
            }

            State::InitiatorAwaitsActTwo {
                mut digest,
                local_static,
                remote_static,
                ephemeral,
            } => {
                let re = read_act_keyed(act, ACT_ONE_LEN)?;
                digest.mix_hash(&re.serialize());
                let ee = ecdh(&ephemeral, &re);
                let temp_k2 = digest.mix_key(&ee);
                decrypt_with_ad(
                    &temp_k2,
                    0,
                    &digest.h,
                    &act[34..ACT_ONE_LEN],
                )?;
                digest.mix_hash(&act[34..ACT_ONE_LEN]);

                // act three authenticates our static key
                let s_pub = PublicKey::from_secret_key(SECP256K1, &local_static);
                let ciphertext =
                    encrypt_with_ad(&temp_k2, 1, &digest.h, &s_pub.serialize());
                digest.mix_hash(&ciphertext);
                let se = ecdh(&local_static, &re);
                let temp_k3 = digest.mix_key(&se);
                let tag = encrypt_with_ad(&temp_k3, 0, &digest.h, &[]);
                let (send_key, recv_key) = hkdf_two(&digest.ck, &[]);

                let mut act3 = Vec::with_capacity(ACT_THREE_LEN);
                act3.push(HANDSHAKE_VERSION);
                act3.extend_from_slice(&ciphertext);
                act3.extend_from_slice(&tag);

                self.state = State::Transport {
                    send: CipherState::with(send_key, digest.ck),
                    recv: CipherState::with(recv_key, digest.ck),
                    remote_static,
                };
                Ok(HandshakeAct::Complete(Some(act3)))
            }

            State::ResponderAwaitsActThree {
                mut digest,
                ephemeral,
                temp_k2,
            } => {
                if act.len() != ACT_THREE_LEN {
                    return Err(Error::BadActLength);
                }
                if act[0] != HANDSHAKE_VERSION {
                    return Err(Error::BadVersion(act[0]));
                }
                let ciphertext = &act[1..50];
                let tag = &act[50..ACT_THREE_LEN];
                let rs_bytes = decrypt_with_ad(&temp_k2, 1, &digest.h, ciphertext)?;
                let remote_static = PublicKey::from_slice(&rs_bytes)
                    .map_err(|_| Error::BadPubkey)?;
                digest.mix_hash(ciphertext);
                let se = ecdh(&ephemeral, &remote_static);
                let temp_k3 = digest.mix_key(&se);
                decrypt_with_ad(&temp_k3, 0, &digest.h, tag)?;
                let (recv_key, send_key) = hkdf_two(&digest.ck, &[]);

                self.state = State::Transport {
                    send: CipherState::with(send_key, digest.ck),
                    recv: CipherState::with(recv_key, digest.ck),
                    remote_static,
                };
                Ok(HandshakeAct::Complete(None))
            }

            state => {
                self.state = state;
                Err(Error::UnexpectedAct)
            }
        }
    }

    /// Encrypts one message into a transport frame: encrypted length
    /// header followed by the encrypted payload.
    pub fn encrypt_message(
        &mut self,
        payload: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let send = match &mut self.state {
            State::Transport { send, .. } => send,
            _ => return Err(Error::HandshakeIncomplete),
        };
        let header = send.encrypt(&[], &(payload.len() as u16).to_be_bytes());
        let body = send.encrypt(&[], payload);
        let mut frame = Vec::with_capacity(header.len() + body.len());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decrypts the 18-byte frame header, returning the payload length.
    /// The caller must follow up with [`NoiseTransport::decrypt_message`]
    /// once `length + 16` more bytes have arrived.
    pub fn decrypt_length(&mut self, header: &[u8]) -> Result<u16, Error> {
        if header.len() != FRAME_HEADER_LEN {
            return Err(Error::FrameTooShort);
        }
        let recv = match &mut self.state {
            State::Transport { recv, .. } => recv,
            _ => return Err(Error::HandshakeIncomplete),
        };
        let plain = recv.decrypt(&[], header)?;
        let mut len = [0u8; 2];
        len.copy_from_slice(&plain);
        Ok(u16::from_be_bytes(len))
    }

    /// Decrypts a frame body of `length + 16` bytes.
    pub fn decrypt_message(&mut self, body: &[u8]) -> Result<Vec<u8>, Error> {
        if body.len() < MAC_LEN {
            return Err(Error::FrameTooShort);
        }
        let recv = match &mut self.state {
            State::Transport { recv, .. } => recv,
            _ => return Err(Error::HandshakeIncomplete),
        };
        recv.decrypt(&[], body)
    }
}

fn read_act_keyed(act: &[u8], expected_len: usize) -> Result<PublicKey, Error> {
    if act.len() != expected_len {
        return Err(Error::BadActLength);
    }
    if act[0] != HANDSHAKE_VERSION {
        return Err(Error::BadVersion(act[0]));
    }
    PublicKey::from_slice(&act[1..34]).map_err(|_| Error::BadPubkey)
}

#[cfg(test)]
mod test {
    use super::*;

    fn keypair(byte: u8) -> (SecretKey, PublicKey) {
        let sk = SecretKey::from_slice(&[byte; 32]).unwrap();
        (sk, PublicKey::from_secret_key(SECP256K1, &sk))
    }

    fn handshaken_pair() -> (NoiseTransport, NoiseTransport) {
        let (initiator_key, initiator_pub) = keypair(0x11);
        let (responder_key, responder_pub) = keypair(0x21);

        let mut alice = NoiseTransport::new();
        let mut bob = NoiseTransport::new();

        let act1 = alice
            .handshake_start(initiator_key, Some(responder_pub))
            .unwrap();
        assert_eq!(act1.len(), ACT_ONE_LEN);
        assert!(bob.handshake_start(responder_key, None).is_none());

        let act2 = match bob.handshake_recv(&act1).unwrap() {
            HandshakeAct::Respond(act2) => act2,
            act => panic!("responder must answer act one, got {:?}", act),
        };
        assert_eq!(act2.len(), ACT_ONE_LEN);

        let act3 = match alice.handshake_recv(&act2).unwrap() {
            HandshakeAct::Complete(Some(act3)) => act3,
            act => panic!("initiator must complete on act two, got {:?}", act),
        };
        assert_eq!(act3.len(), ACT_THREE_LEN);

        match bob.handshake_recv(&act3).unwrap() {
            HandshakeAct::Complete(None) => {}
            act => panic!("responder must complete on act three, got {:?}", act),
        }

        assert!(alice.is_ready() && bob.is_ready());
        assert_eq!(bob.remote_static(), Some(initiator_pub));
        assert_eq!(alice.remote_static(), Some(responder_pub));
        (alice, bob)
    }

    #[test]
    fn handshake_and_frame_roundtrip() {
        let (mut alice, mut bob) = handshaken_pair();

        let frame = alice.encrypt_message(b"hello bolt").unwrap();
        assert_eq!(frame.len(), FRAME_HEADER_LEN + 10 + MAC_LEN);

        let len = bob.decrypt_length(&frame[..FRAME_HEADER_LEN]).unwrap();
        assert_eq!(len, 10);
        let payload = bob.decrypt_message(&frame[FRAME_HEADER_LEN..]).unwrap();
        assert_eq!(payload, b"hello bolt");

        // and the reverse direction
        let frame = bob.encrypt_message(b"pong").unwrap();
        let len = alice.decrypt_length(&frame[..FRAME_HEADER_LEN]).unwrap();
        assert_eq!(len, 4);
        assert_eq!(
            alice.decrypt_message(&frame[FRAME_HEADER_LEN..]).unwrap(),
            b"pong"
        );
    }

    #[test]
    fn key_rotation_survives_thousand_frames() {
        let (mut alice, mut bob) = handshaken_pair();
        for i in 0..1200u32 {
            let payload = i.to_be_bytes();
            let frame = alice.encrypt_message(&payload).unwrap();
            let len = bob.decrypt_length(&frame[..FRAME_HEADER_LEN]).unwrap();
            assert_eq!(len, 4);
            let plain =
                bob.decrypt_message(&frame[FRAME_HEADER_LEN..]).unwrap();
            assert_eq!(plain, payload);
        }
    }

    #[test]
    fn corrupted_mac_detected() {
        let (mut alice, mut bob) = handshaken_pair();
        let mut frame = alice.encrypt_message(b"payload").unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        bob.decrypt_length(&frame[..FRAME_HEADER_LEN]).unwrap();
        assert_eq!(
            bob.decrypt_message(&frame[FRAME_HEADER_LEN..]).unwrap_err(),
            Error::MacMismatch
        );
    }

    #[test]
    fn act_before_handshake_rejected() {
        let mut idle = NoiseTransport::new();
        assert_eq!(
            idle.handshake_recv(&[0u8; ACT_ONE_LEN]).unwrap_err(),
            Error::UnexpectedAct
        );
    }

    #[test]
    fn act_with_wrong_length_rejected() {
        let (responder_key, _) = keypair(0x21);
        let mut bob = NoiseTransport::new();
        bob.handshake_start(responder_key, None);
        assert_eq!(
            bob.handshake_recv(&[0u8; ACT_THREE_LEN]).unwrap_err(),
            Error::BadActLength
        );
    }

    #[test]
    fn tampered_act_one_rejected() {
        let (initiator_key, _) = keypair(0x11);
        let (responder_key, responder_pub) = keypair(0x21);

        let mut alice = NoiseTransport::new();
        let mut bob = NoiseTransport::new();
        let mut act1 = alice
            .handshake_start(initiator_key, Some(responder_pub))
            .unwrap();
        bob.handshake_start(responder_key, None);
        act1[ACT_ONE_LEN - 1] ^= 0x80;
        assert_eq!(
            bob.handshake_recv(&act1).unwrap_err(),
            Error::MacMismatch
        );
    }
}
