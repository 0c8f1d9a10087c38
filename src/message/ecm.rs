//! ECM decoding: unmasking, nano-TLV scanning and control-word derivation.
//!
//! ## Message layout
//! ```text
//! [0]      table id (0x80 even parity, 0x81 odd)
//! [1..3]   section length (low 12 bits; full size = length + 3)
//! [3]      high nibble: 0x50 while masked, 0x30 after unmasking;
//!          low nibble: high bits of the first nano length
//! [3..]    nano-TLV records: {len_hi, len_lo, tag, payload[len-1]}
//! [end-4..]big-endian Fletcher CRC-32
//! ```
//!
//! Nano 0x27 carries a convolved CW (an extra XOR layer for CSA services),
//! nano 0x20 the encrypted CW body. Everything else is skipped.
//!
//! ## Decode flow
//! 1. Unmask when the header says so: recover the two hash-mode tags via
//!    CRC-8, XOR the mask into the scattered body positions, rewrite the
//!    header nibble and the tail CRC.
//! 2. Verify the tail CRC.
//! 3. First nano pass collects convolved CWs (0x27).
//! 4. Second pass takes the CW body (0x20): trial-decrypt it against every
//!    candidate key, then derive per-class seeds and CWs.

use crate::checksum::{crc8, fletcher_crc32};
use crate::crypto::{block, hash, sbox};
use crate::error::{Error, Result};
use crate::keys::KeyStore;
use crate::message::cw::{self, CwParams, CwScope, CwSet, StreamClass};
use crate::queue::DelayedCwQueue;
use crate::utils::{be16, be32, get_bit, section_len, srvid_from_channel};

/// Body offsets gathered into the 24-byte unmask hash input.
const SOURCE_POS: [usize; 24] = [
    0x04, 0x05, 0x06, 0x07, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x17, 0x1C, 0x1D, 0x1F, 0x23,
    0x24, 0x25, 0x26, 0x27, 0x29, 0x2C, 0x2D, 0x2E,
];

/// Body offsets the 16-byte mask is XOR-ed into.
const DEST_POS: [usize; 16] = [
    0x08, 0x09, 0x11, 0x18, 0x19, 0x1A, 0x1B, 0x1E, 0x20, 0x21, 0x22, 0x28, 0x2A, 0x2B, 0x2F, 0x30,
];

/// Body offsets of the CW-seed bytes (feeds the CW hash-mode tag CRC).
const SEED_CW_POS: [usize; 11] = [0x07, 0x0A, 0x04, 0x0D, 0x05, 0x0E, 0x06, 0x0B, 0x10, 0x0C, 0x0F];

/// Mask mode 3 pre-correction: `body[dst] -= body[src]`, applied in order
/// (two of the destinations are corrected twice).
const MODE03_SUB: [(usize, usize); 8] = [
    (0x21, 0x07),
    (0x26, 0x05),
    (0x26, 0x08),
    (0x19, 0x06),
    (0x31, 0x09),
    (0x27, 0x0C),
    (0x21, 0x0B),
    (0x17, 0x04),
];

/// Mask mode 3 unmask: `body[offset] ^= mask[idx]`.
const MODE03_XOR: [(usize, usize); 29] = [
    (0x06, 0x02),
    (0x0B, 0x06),
    (0x0C, 0x07),
    (0x0D, 0x08),
    (0x0E, 0x09),
    (0x0F, 0x0A),
    (0x11, 0x0B),
    (0x18, 0x0C),
    (0x2D, 0x0A),
    (0x07, 0x03),
    (0x1B, 0x0D),
    (0x30, 0x0C),
    (0x1C, 0x0E),
    (0x1E, 0x00),
    (0x04, 0x00),
    (0x05, 0x01),
    (0x1F, 0x01),
    (0x2C, 0x09),
    (0x20, 0x02),
    (0x1D, 0x0F),
    (0x23, 0x04),
    (0x09, 0x05),
    (0x22, 0x03),
    (0x24, 0x05),
    (0x08, 0x04),
    (0x28, 0x06),
    (0x29, 0x07),
    (0x2A, 0x08),
    (0x2E, 0x0B),
];

/// Reduce the extra-data word to the CW construction variant (0..49).
fn mode_cw_of(extra: u32) -> u8 {
    let t1 = (u64::from(extra) * 0x76E9_DEA7) >> 50;
    (t1 - 50 * ((t1 * 0x51EB_851F) >> 36)) as u8
}

/// Reduce the extra-data word to the unmask variant (0..49).
fn mode_unmask_of(extra: u32) -> u8 {
    let t1 = (u64::from(extra) * 0xB9CD_6BE5) >> 45;
    (t1 - 50 * ((t1 * 0x51EB_851F) >> 36)) as u8
}

/// Gather `pos`-indexed bytes of `msg` at `base` into `data`.
pub(crate) fn gather(msg: &[u8], base: usize, pos: &[usize], data: &mut [u8]) {
    for (d, &p) in data.iter_mut().zip(pos.iter()) {
        *d = msg[base + p];
    }
}

/// Remove the masking layer of an ECM in place.
///
/// Returns the recovered CW hash mode, the CW construction variant and the
/// 16-byte seed-CW block (re-read after unmasking, since the XOR layer
/// moves the bytes under it).
fn unmask_ecm(ecm: &mut [u8]) -> Result<(u8, u8, [u8; 16])> {
    let extra = ecm[9] as usize;
    let start = 10 + extra;

    // The scatter tables reach 0x31 bytes past the body start.
    if ecm.len() < start + 0x32 {
        return Err(Error::NotSupported);
    }

    let mut seed_ecm_cw = [0u8; 16];
    gather(ecm, start, &SEED_CW_POS, &mut seed_ecm_cw[..11]);

    let mode_cw = if extra > 0 { mode_cw_of(be32(ecm, 10)) } else { 0 };

    // Both hash-mode tags travel XOR-ed with a CRC-8 over bytes they do
    // not cover themselves.
    let hash_mode_cw = ecm[28 + extra] ^ crc8(&seed_ecm_cw);

    let mut data = [0u8; 24];
    gather(ecm, start, &SOURCE_POS, &mut data);
    let hash_mode_ecm = ecm[8] ^ crc8(&data);

    let mode_unmask = if extra > 0 {
        mode_unmask_of(be32(ecm, 10))
    } else {
        0
    };

    if mode_unmask == 0x03 {
        for &(dst, src) in &MODE03_SUB {
            ecm[start + dst] = ecm[start + dst].wrapping_sub(ecm[start + src]);
        }

        let input = block::create_data_unmask_mode03(&ecm[start..]);
        let mask = block::create_hash_mode03(&input);

        for &(offset, idx) in &MODE03_XOR {
            ecm[start + offset] ^= mask[idx];
        }

        ecm[10..10 + extra].fill(0);
    } else if mode_unmask == 0x04 {
        // The body travels in the clear.
    } else {
        // An unknown hash mode leaves the body untouched; decode continues.
        if let Ok(mask) = hash::create_hash(&data, hash_mode_ecm) {
            for (i, &offset) in DEST_POS.iter().enumerate() {
                ecm[start + offset] ^= mask[i & 0x0F];
            }
        }
    }

    ecm[3] = (ecm[3] & 0x0F) | 0x30;
    ecm[8] = 0x00;
    ecm[28 + extra] = 0x00;

    // The mask covered the CRC positions too; rewrite the tail.
    let l = ecm.len() - 4;
    let crc = fletcher_crc32(&ecm[..l]);
    ecm[l..].copy_from_slice(&crc.to_be_bytes());

    gather(ecm, start, &SEED_CW_POS, &mut seed_ecm_cw[..11]);

    Ok((hash_mode_cw, mode_cw, seed_ecm_cw))
}

/// Parse the nano-TLV chain starting at offset 3 into `(tag, body_offset,
/// body_len)` triples. A record running past the section end fails the
/// whole message.
fn scan_nanos(msg: &[u8], len: usize) -> Result<Vec<(u8, usize, usize)>> {
    let mut nanos = Vec::new();
    let mut i = 3;

    while i + 3 < len {
        let mut nano_len = ((usize::from(msg[i]) & 0x0F) << 8) | usize::from(msg[i + 1]);
        i += 2;
        if nano_len > 0 {
            nano_len -= 1;
        }
        let tag = msg[i];
        i += 1;

        if i + nano_len > len {
            return Err(Error::NotSupported);
        }
        nanos.push((tag, i, nano_len));
        i += nano_len;
    }

    Ok(nanos)
}

/// Collect convolved CWs from every valid 0x27 nano.
fn collect_convolved(ecm: &[u8], nanos: &[(u8, usize, usize)]) -> [[u8; 8]; 8] {
    let mut convolved = [[0u8; 8]; 8];

    for &(tag, body, len) in nanos {
        if tag != 0x27 || len < 15 {
            continue;
        }

        let sum = ecm[body + 4..body + 15]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_add(b));
        if sum != 0 {
            continue;
        }

        let class = StreamClass::from_convcw_tag(ecm[body + 4]);
        convolved[class as usize].copy_from_slice(&ecm[body + 6..body + 14]);
    }

    convolved
}

/// Decode one ECM in place and derive its control words.
///
/// `srvid` is the service the caller received the ECM on (used only to
/// match streaming-queue slots). `scope` selects video-only or all-class
/// derivation; an attached [`DelayedCwQueue`] with a matching slot forces
/// all classes and receives the result as a delayed packet. The buffer is
/// scratch after this call, whatever the outcome.
pub fn decrypt_ecm(
    ecm: &mut [u8],
    srvid: u16,
    keys: &KeyStore,
    queue: Option<&DelayedCwQueue>,
    scope: CwScope,
) -> Result<CwSet> {
    if ecm.len() < 7 {
        return Err(Error::NotSupported);
    }
    let ecm_len = section_len(ecm);
    if ecm_len < 7 || ecm.len() < ecm_len {
        return Err(Error::NotSupported);
    }
    let ecm = &mut ecm[..ecm_len];

    let needs_unmasking = (ecm[3] & 0xF0) == 0x50;
    let (hash_mode_cw, mode_cw, seed_ecm_cw) = if needs_unmasking {
        unmask_ecm(ecm)?
    } else {
        (0, 0, [0u8; 16])
    };

    // Snapshot after unmasking, before key trials overwrite ciphertext:
    // mask mode 3 derives CWs from these bytes.
    let unmasked: Vec<u8> = ecm.to_vec();

    let ecm_len = ecm_len - 4;
    if fletcher_crc32(&ecm[..ecm_len]) != be32(ecm, ecm_len) {
        return Err(Error::ChecksumMismatch);
    }

    let nanos = scan_nanos(ecm, ecm_len)?;
    let convolved = collect_convolved(ecm, &nanos);

    let Some(&(_, body, _)) = nanos.iter().find(|&&(tag, _, len)| tag == 0x20 && len >= 54)
    else {
        return Err(Error::NotSupported);
    };

    let extra = ecm[body + 3] as usize;
    let offset_body = body + 4 + extra;
    let i = body + extra;
    if i + 54 > ecm_len {
        return Err(Error::NotSupported);
    }

    let csa_used = get_bit(ecm[i + 7], 7) != 0;
    let fixed_key = get_bit(ecm[i + 6], 5) == 0;
    let odd_key = get_bit(ecm[i + 6], 4);
    let xor_mode = get_bit(ecm[i + 6], 0);
    let bid = (get_bit(ecm[i + 7], 1) << 1) | get_bit(ecm[i + 7], 0);
    let bank = get_bit(ecm[i + 6], 3);

    let key_index = (u8::from(fixed_key) << 3) | (bid << 2) | odd_key;
    let channel_id = be16(ecm, i + 23);
    let ecm_srvid = srvid_from_channel(channel_id);

    log::debug!(
        "csa_used={csa_used}, xor_mode={xor_mode}, ecm_srvid={ecm_srvid:04X}, \
         hash_mode_cw={hash_mode_cw}, mode_cw={mode_cw}"
    );

    let part1: [u8; 14] = ecm[i + 8..i + 22].try_into().expect("length is fixed");
    let part2: [u8; 27] = ecm[i + 27..i + 54].try_into().expect("length is fixed");

    let mut key_ref1 = 0u32;
    let mut key_ref2 = 0u32;

    // Trial every candidate key; a mismatch restores the ciphertext so the
    // next candidate sees the original bytes.
    let ecm_key = loop {
        let candidate = if let Some(k) = keys.ecm_key(ecm_srvid, key_index, key_ref1) {
            key_ref1 += 1;
            k
        } else if let Some(k) = keys.ecm_key(channel_id, key_index, key_ref2) {
            key_ref2 += 1;
            k
        } else {
            log::warn!("key not found: P {ecm_srvid:04X} {key_index:02X}");
            return Err(Error::KeyNotFound);
        };

        let mut work = candidate;
        sbox::decrypt(&mut ecm[i + 8..i + 22], &mut work, bank);

        if ecm[i + 6] != ecm[i + 13] || ecm[i + 14] != ecm[i + 21] {
            ecm[i + 8..i + 22].copy_from_slice(&part1);
            continue;
        }

        // The register state after the first 14 bytes keys the seed
        // derivation.
        let mid_state = work;

        sbox::decrypt(&mut ecm[i + 27..i + 54], &mut work, bank);

        if ecm[i + 23] != ecm[i + 52] || ecm[i + 24] != ecm[i + 53] {
            ecm[i + 8..i + 22].copy_from_slice(&part1);
            ecm[i + 27..i + 54].copy_from_slice(&part2);
            continue;
        }

        break mid_state;
    };

    let seed_base: [u8; 4] = ecm[i + 8..i + 12].try_into().expect("length is fixed");
    let base_cw: [u8; 7] = ecm[i + 14..i + 21].try_into().expect("length is fixed");

    let all_classes = scope == CwScope::AllClasses || queue.is_some_and(|q| q.wants(srvid));
    let classes: &[StreamClass] = if all_classes {
        &StreamClass::ALL
    } else {
        &StreamClass::ALL[..1]
    };

    let params = CwParams {
        csa_used,
        xor_mode,
        hash_mode_cw,
        mode_cw,
        needs_unmasking,
    };

    let mut cws = [[0u8; 8]; 8];
    for &class in classes {
        let mut key = ecm_key;
        let mut seed = cw::calculate_seed(class, &ecm[i..], &seed_base, &mut key, bank);

        let mut cw = cw::calculate_cw(
            class,
            &mut seed,
            &convolved[class as usize],
            &base_cw,
            &seed_ecm_cw,
            &params,
            &unmasked[offset_body.min(unmasked.len())..],
        )?;

        if csa_used {
            for k in [0, 4] {
                cw[k + 3] = cw[k].wrapping_add(cw[k + 1]).wrapping_add(cw[k + 2]);
            }
        }

        log::debug!("calculated cw {}: {:02X?}", class as usize, cw);
        cws[class as usize] = cw;
    }

    let even = ecm[0] == 0x80;

    if all_classes && let Some(q) = queue {
        q.push(srvid, cws, csa_used, even);
    }

    let scope = if all_classes {
        CwScope::AllClasses
    } else {
        CwScope::VideoOnly
    };
    Ok(CwSet::new(cws, csa_used, even, scope))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a well-formed single-nano ECM: the first nano's length high
    /// nibble shares byte 3 with the masking indicator.
    fn build_ecm(table_id: u8, mask_nibbles: u8, nano_tag: u8, nano_body: &[u8]) -> Vec<u8> {
        let nano_len = nano_body.len() + 1; // tag is part of the length
        let sec_len = 2 + nano_len + 4;

        let mut ecm = vec![table_id, (sec_len >> 8) as u8, sec_len as u8];
        ecm.push((mask_nibbles & 0xF0) | ((nano_len >> 8) as u8 & 0x0F));
        ecm.push(nano_len as u8);
        ecm.push(nano_tag);
        ecm.extend_from_slice(nano_body);

        let l = ecm.len();
        let crc = fletcher_crc32(&ecm[..l]);
        ecm.extend_from_slice(&crc.to_be_bytes());
        ecm
    }

    #[test]
    fn rejects_short_ecm() {
        let mut ecm = [0x80, 0x00, 0x01, 0x30];
        assert_eq!(
            decrypt_ecm(&mut ecm, 0, &KeyStore::new(), None, CwScope::VideoOnly),
            Err(Error::NotSupported)
        );
    }

    #[test]
    fn rejects_bad_tail_crc() {
        let mut ecm = build_ecm(0x80, 0x30, 0x20, &[0u8; 60]);
        let l = ecm.len();
        ecm[l - 1] ^= 0xFF;
        assert_eq!(
            decrypt_ecm(&mut ecm, 0, &KeyStore::new(), None, CwScope::VideoOnly),
            Err(Error::ChecksumMismatch)
        );
    }

    #[test]
    fn rejects_missing_cw_nano() {
        // A lone convolved-CW nano is not decodable on its own.
        let mut body = [0u8; 20];
        body[4] = 0x80;
        let mut ecm = build_ecm(0x80, 0x30, 0x27, &body);
        assert_eq!(
            decrypt_ecm(&mut ecm, 0, &KeyStore::new(), None, CwScope::VideoOnly),
            Err(Error::NotSupported)
        );
    }

    #[test]
    fn rejects_truncated_nano() {
        let mut ecm = build_ecm(0x80, 0x30, 0x20, &[0u8; 60]);
        // Inflate the nano length high nibble past the section end.
        ecm[3] |= 0x0F;
        let l = ecm.len();
        let crc = fletcher_crc32(&ecm[..l - 4]);
        ecm[l - 4..].copy_from_slice(&crc.to_be_bytes());

        assert_eq!(
            decrypt_ecm(&mut ecm, 0, &KeyStore::new(), None, CwScope::VideoOnly),
            Err(Error::NotSupported)
        );
    }

    #[test]
    fn key_trials_restore_ciphertext() {
        // No key in the store validates an arbitrary body; the decoder must
        // trial each candidate and leave the ciphertext intact.
        let mut body = [0u8; 60];
        for (idx, b) in body.iter_mut().enumerate() {
            *b = (idx as u8).wrapping_mul(0x3B).wrapping_add(5);
        }
        body[3] = 0; // no extra data
        // Channel id 0x1234 files keys under srvid 0x4123.
        body[23] = 0x12;
        body[24] = 0x34;

        let keys = KeyStore::new();
        keys.set_key(0x0001_4123, "00", [1, 2, 3, 4, 5, 6, 7], "test");
        keys.set_key(0x0002_4123, "00", [8, 9, 10, 11, 12, 13, 14], "test");
        keys.set_key(0x0001_1234, "00", [15, 16, 17, 18, 19, 20, 21], "test");

        let mut ecm = build_ecm(0x80, 0x30, 0x20, &body);
        let before = ecm.clone();

        assert_eq!(
            decrypt_ecm(&mut ecm, 0, &keys, None, CwScope::VideoOnly),
            Err(Error::KeyNotFound)
        );
        assert_eq!(ecm, before, "failed trials must restore the buffer");
    }

    #[test]
    fn unmask_fixes_header_and_crc() {
        // Masked ECM with no extra bytes: the mask indicator rides the high
        // nibble of byte 3, the unmask hash mode in byte 8.
        let mut body = [0u8; 80];
        for (idx, b) in body.iter_mut().enumerate() {
            *b = (idx as u8).wrapping_mul(7).wrapping_add(3);
        }
        body[3] = 0; // extraBytesLen (message byte 9)

        let mut ecm = build_ecm(0x80, 0x50, 0x20, &body);
        let ecm_len = section_len(&ecm);

        let (_, mode_cw, _) = unmask_ecm(&mut ecm[..ecm_len]).unwrap();
        assert_eq!(mode_cw, 0, "no extra data means variant 0");

        assert_eq!(ecm[3] & 0xF0, 0x30, "mask nibble rewritten");
        assert_eq!(ecm[8], 0x00);
        assert_eq!(ecm[28], 0x00);

        // Tail CRC must hold over the unmasked body.
        let l = ecm_len - 4;
        assert_eq!(fletcher_crc32(&ecm[..l]), be32(&ecm, l));
    }

    #[test]
    fn unmask_rejects_short_masked_body() {
        let mut ecm = build_ecm(0x80, 0x50, 0x20, &[0u8; 30]);
        let ecm_len = section_len(&ecm);
        assert_eq!(unmask_ecm(&mut ecm[..ecm_len]), Err(Error::NotSupported));
    }

    #[test]
    fn mode_variants_match_reference_reduction() {
        assert_eq!(mode_cw_of(0), 0);
        assert_eq!(mode_unmask_of(0), 0);

        for x in [1u32, 0x1234, 0xDEAD_BEEF, 0xFFFF_FFFF, 0x8000_0001] {
            let t1 = (u64::from(x) * 0x76E9_DEA7) >> 50;
            assert_eq!(u64::from(mode_cw_of(x)), t1 % 50);

            let t1 = (u64::from(x) * 0xB9CD_6BE5) >> 45;
            assert_eq!(u64::from(mode_unmask_of(x)), t1 % 50);
        }
    }

    #[test]
    fn convolved_collection_checks_zero_sum() {
        let mut body = [0u8; 20];
        body[4] = 0x40; // HSD tag
        for (idx, b) in body[6..14].iter_mut().enumerate() {
            *b = 0x10 + idx as u8;
        }
        // Balance bytes 4..15 to a zero sum.
        let sum: u8 = body[4..15].iter().fold(0, |a, &b| a.wrapping_add(b));
        body[14] = body[14].wrapping_sub(sum);

        let ecm = build_ecm(0x80, 0x30, 0x27, &body);
        let ecm_len = section_len(&ecm) - 4;
        let nanos = scan_nanos(&ecm, ecm_len).unwrap();
        assert_eq!(nanos.len(), 1);

        let convolved = collect_convolved(&ecm, &nanos);
        assert_eq!(
            convolved[StreamClass::Hsd as usize],
            [0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17]
        );
        assert_eq!(convolved[StreamClass::Vid as usize], [0u8; 8]);

        // Breaking the sum drops the record.
        let mut bad = ecm.clone();
        bad[6 + 8] ^= 0x01;
        let nanos = scan_nanos(&bad, ecm_len).unwrap();
        let convolved = collect_convolved(&bad, &nanos);
        assert_eq!(convolved[StreamClass::Hsd as usize], [0u8; 8]);
    }
}
