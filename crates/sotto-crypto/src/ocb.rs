//! OCB2 authenticated encryption over AES-128.
//!
//! One pass over the message produces ciphertext of the same length as
//! the plaintext plus a 16-byte tag; the wire format truncates the tag
//! to 3 bytes. The block cipher is the `aes` crate's AES-128 — this
//! module implements only the mode.
//!
//! Blocks are handled as `u128` in big-endian interpretation, which makes
//! the GF(2^128) doubling and the XOR plumbing plain integer ops. The
//! known-answer vectors from draft-krovetz-ocb-00 are checked in the
//! tests below.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt};
use aes::Aes128;

/// AES block size in bytes.
pub(crate) const BLOCK_SIZE: usize = 16;

/// Full tag length produced by the transform.
pub(crate) const FULL_TAG_SIZE: usize = 16;

fn encipher(cipher: &Aes128, block: u128) -> u128 {
    let mut buf = GenericArray::from(block.to_be_bytes());
    cipher.encrypt_block(&mut buf);
    u128::from_be_bytes(buf.into())
}

fn decipher(cipher: &Aes128, block: u128) -> u128 {
    let mut buf = GenericArray::from(block.to_be_bytes());
    cipher.decrypt_block(&mut buf);
    u128::from_be_bytes(buf.into())
}

/// Doubling in GF(2^128) modulo x^128 + x^7 + x^2 + x + 1.
fn times2(block: u128) -> u128 {
    (block << 1) ^ (0x87 * (block >> 127))
}

fn times3(block: u128) -> u128 {
    times2(block) ^ block
}

/// Big-endian block view of up to 16 bytes, zero-padded on the right.
fn load(bytes: &[u8]) -> u128 {
    let mut block = [0u8; BLOCK_SIZE];
    block[..bytes.len()].copy_from_slice(bytes);
    u128::from_be_bytes(block)
}

/// Split a message so the tail holds the final block: 1..=16 bytes, or
/// empty only for the empty message.
fn split_final(message: &[u8]) -> (&[u8], &[u8]) {
    if message.is_empty() {
        return (message, message);
    }
    message.split_at((message.len() - 1) / BLOCK_SIZE * BLOCK_SIZE)
}

/// Encrypt `plain` under `nonce`, appending the ciphertext to `dst`.
/// Returns the full 16-byte tag.
pub(crate) fn encrypt(
    cipher: &Aes128,
    nonce: u128,
    plain: &[u8],
    dst: &mut Vec<u8>,
) -> [u8; FULL_TAG_SIZE] {
    let mut delta = encipher(cipher, nonce);
    let mut checksum = 0u128;

    let (full, last) = split_final(plain);
    for chunk in full.chunks_exact(BLOCK_SIZE) {
        delta = times2(delta);
        let block = load(chunk);
        checksum ^= block;
        let enc = encipher(cipher, block ^ delta) ^ delta;
        dst.extend_from_slice(&enc.to_be_bytes());
    }

    // Final block: encrypt the bit length under delta to get a pad,
    // XOR the message tail against it, and fold the pad-completed tail
    // into the checksum.
    delta = times2(delta);
    let pad = encipher(cipher, delta ^ (8 * last.len() as u128));
    let pad_bytes = pad.to_be_bytes();

    let mut tail = pad_bytes;
    tail[..last.len()].copy_from_slice(last);
    checksum ^= u128::from_be_bytes(tail);

    for (byte, pad_byte) in last.iter().zip(pad_bytes.iter()) {
        dst.push(byte ^ pad_byte);
    }

    delta = times3(delta);
    encipher(cipher, delta ^ checksum).to_be_bytes()
}

/// Decrypt `encrypted` under `nonce`, appending the plaintext to `dst`.
/// Returns the full 16-byte tag recomputed from the recovered plaintext;
/// the caller compares it against the transmitted truncation.
pub(crate) fn decrypt(
    cipher: &Aes128,
    nonce: u128,
    encrypted: &[u8],
    dst: &mut Vec<u8>,
) -> [u8; FULL_TAG_SIZE] {
    let mut delta = encipher(cipher, nonce);
    let mut checksum = 0u128;

    let (full, last) = split_final(encrypted);
    for chunk in full.chunks_exact(BLOCK_SIZE) {
        delta = times2(delta);
        let block = decipher(cipher, load(chunk) ^ delta) ^ delta;
        checksum ^= block;
        dst.extend_from_slice(&block.to_be_bytes());
    }

    delta = times2(delta);
    let pad = encipher(cipher, delta ^ (8 * last.len() as u128));
    let pad_bytes = pad.to_be_bytes();

    let mut tail = pad_bytes;
    for (i, byte) in last.iter().enumerate() {
        tail[i] = byte ^ pad_bytes[i];
    }
    dst.extend_from_slice(&tail[..last.len()]);
    checksum ^= u128::from_be_bytes(tail);

    delta = times3(delta);
    encipher(cipher, delta ^ checksum).to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::KeyInit;

    // Key and nonce from the draft-krovetz-ocb-00 AES-128 vectors.
    const KEY: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
        0x0F,
    ];

    fn cipher() -> Aes128 {
        Aes128::new(&GenericArray::from(KEY))
    }

    fn nonce() -> u128 {
        u128::from_be_bytes(KEY)
    }

    #[test]
    fn test_empty_message_vector() {
        let mut ct = Vec::new();
        let tag = encrypt(&cipher(), nonce(), &[], &mut ct);
        assert!(ct.is_empty());
        assert_eq!(hex::encode(tag), "bf3108130773ad5ec70ec69e7875a7b0");
    }

    #[test]
    fn test_40_byte_vector() {
        let plain: Vec<u8> = (0..40).collect();
        let mut ct = Vec::new();
        let tag = encrypt(&cipher(), nonce(), &plain, &mut ct);
        assert_eq!(
            hex::encode(&ct),
            "f75d6bc8b4dc8d66b836a2b08b32a636\
             9f1cd3c5228d79fd6c267f5f6aa7b231\
             c7dfb9d59951ae9c"
        );
        assert_eq!(hex::encode(tag), "9db0cdf880f73e3e10d4eb3217766688");
    }

    #[test]
    fn test_decrypt_recovers_plain_and_tag() {
        let plain: Vec<u8> = (0..40).collect();
        let mut ct = Vec::new();
        let enc_tag = encrypt(&cipher(), nonce(), &plain, &mut ct);

        let mut recovered = Vec::new();
        let dec_tag = decrypt(&cipher(), nonce(), &ct, &mut recovered);
        assert_eq!(recovered, plain);
        assert_eq!(enc_tag, dec_tag);
    }

    #[test]
    fn test_round_trip_all_lengths_near_block_boundary() {
        for len in [0usize, 1, 15, 16, 17, 31, 32, 33, 64, 100] {
            let plain: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let mut ct = Vec::new();
            let enc_tag = encrypt(&cipher(), nonce(), &plain, &mut ct);
            assert_eq!(ct.len(), plain.len());

            let mut recovered = Vec::new();
            let dec_tag = decrypt(&cipher(), nonce(), &ct, &mut recovered);
            assert_eq!(recovered, plain, "length {len}");
            assert_eq!(enc_tag, dec_tag, "length {len}");
        }
    }

    #[test]
    fn test_tampered_ciphertext_changes_tag() {
        let plain = b"four legs good, two legs bad";
        let mut ct = Vec::new();
        let tag = encrypt(&cipher(), nonce(), plain, &mut ct);

        ct[5] ^= 0x01;
        let mut recovered = Vec::new();
        let dec_tag = decrypt(&cipher(), nonce(), &ct, &mut recovered);
        assert_ne!(tag, dec_tag);
    }
}
