//! EMM processing: key-update records addressed to one subscriber.
//!
//! ## Message layout
//! ```text
//! [0..3]   table id and section length (as for ECMs)
//! [3]      high nibble 0x50 while masked, rewritten to 0x10 after unmask
//! [12..16] unique address (big-endian u32)
//! [19..]   27-byte records, each gated by bit 7 of its first byte
//! [end-4..]Fletcher CRC-32 (advisory only; many transponders send it stale)
//! ```
//!
//! Each active record decrypts 26 bytes with the subscriber's EMM key -
//! first with S-box bank 0, then bank 1 - and validates against the
//! unencrypted unique-address bytes at 13..16. A validated record carries a
//! fresh 7-byte ECM key plus its key index; the key is installed for every
//! service of the subscriber's provider group.

use crate::checksum::{crc8, fletcher_crc32};
use crate::crypto::{hash, sbox};
use crate::error::{Error, Result};
use crate::keys::KeyStore;
use crate::message::ecm::gather;
use crate::utils::{be32, get_bit, section_len};

/// Body offsets gathered into the 30-byte unmask hash input (base 19).
const SOURCE_POS: [usize; 30] = [
    0x03, 0x0C, 0x0D, 0x11, 0x15, 0x18, 0x1D, 0x1F, 0x25, 0x2A, 0x32, 0x35, 0x3A, 0x3B, 0x3E, 0x42,
    0x47, 0x48, 0x53, 0x58, 0x5C, 0x61, 0x66, 0x69, 0x71, 0x72, 0x78, 0x7B, 0x81, 0x84,
];

/// Body offsets the mask is XOR-ed into (base 19).
const DEST_POS: [usize; 30] = [
    0x02, 0x08, 0x0B, 0x0E, 0x13, 0x16, 0x1E, 0x23, 0x28, 0x2B, 0x2F, 0x33, 0x38, 0x3C, 0x40, 0x44,
    0x4A, 0x4D, 0x54, 0x57, 0x5A, 0x63, 0x68, 0x6A, 0x70, 0x75, 0x76, 0x7D, 0x82, 0x85,
];

/// Remove the masking layer of an EMM in place.
fn unmask_emm(emm: &mut [u8]) -> Result<()> {
    // The scatter tables reach 0x85 bytes past the record area.
    if emm.len() < 19 + 0x86 {
        return Err(Error::NotSupported);
    }

    let mut data = [0u8; 30];
    gather(emm, 19, &SOURCE_POS, &mut data);
    let hash_mode_emm = emm[8] ^ crc8(&data);

    // An unknown hash mode leaves the body untouched; decode continues.
    let mask = hash::create_hash(&data, hash_mode_emm).unwrap_or([0u8; 16]);

    emm[3] = (emm[3] & 0x0F) | 0x10;
    emm[8] = 0x00;

    for (i, &offset) in DEST_POS.iter().enumerate() {
        emm[19 + offset] ^= mask[i & 0x0F];
    }

    let l = emm.len() - 4;
    let crc = fletcher_crc32(&emm[..l]);
    emm[l..].copy_from_slice(&crc.to_be_bytes());

    Ok(())
}

/// Process one EMM in place, installing any ECM keys it carries.
///
/// Candidate EMM keys for the addressed subscriber are trialled in store
/// order until one decrypts at least one record. Returns the number of ECM
/// keys extracted (an EMM that decrypts but carries only rejected records
/// still counts as processed, with `Ok(0)`).
pub fn process_emm(emm: &mut [u8], keys: &KeyStore) -> Result<u32> {
    if emm.len() < 50 {
        return Err(Error::NotSupported);
    }
    let emm_len = section_len(emm);
    if emm_len < 50 || emm.len() < emm_len {
        return Err(Error::NotSupported);
    }
    let emm = &mut emm[..emm_len];

    if (emm[3] & 0xF0) == 0x50 {
        unmask_emm(emm)?;
    }

    // The tail CRC is advisory for EMMs and deliberately not enforced.
    let emm_len = emm_len - 4;

    let unique_address = be32(emm, 12);
    let mut keys_added = 0u32;
    let mut key_ref = 0u32;

    loop {
        let Some((emm_key, group_id)) = keys.emm_key(unique_address, key_ref) else {
            log::debug!("EMM key for UA {unique_address:08X} is missing");
            return Err(Error::KeyNotFound);
        };
        key_ref += 1;

        let mut decrypt_ok = false;

        let mut i = 19;
        while i + 27 <= emm_len {
            let record_start = i;
            i += 27;

            if get_bit(emm[record_start], 7) == 0 {
                continue;
            }

            let saved: [u8; 26] = emm[record_start + 1..record_start + 27]
                .try_into()
                .expect("length is fixed");

            // Try both S-box banks, restoring the ciphertext in between.
            let mut matched = false;
            for bank in [0u8, 1] {
                let mut work = emm_key;
                sbox::decrypt(&mut emm[record_start + 1..record_start + 27], &mut work, bank);

                if emm[13..16] == emm[record_start + 24..record_start + 27] {
                    matched = true;
                    break;
                }
                emm[record_start + 1..record_start + 27].copy_from_slice(&saved);
            }
            if !matched {
                continue;
            }

            decrypt_ok = true;

            let emm_type = emm[record_start + 2] & 0x7F;
            if emm_type > 1 {
                continue;
            }

            let new_key: [u8; 7] = emm[record_start + 3..record_start + 10]
                .try_into()
                .expect("length is fixed");

            if new_key[0] == 0 && new_key[1] == 0 {
                log::info!(
                    "key found in EMM: P {group_id:04X}**** {emm_type:02X} {new_key:02X?} \
                     -> rejected (looks invalid), UA: {unique_address:08X}"
                );
                continue;
            }

            keys.install_ecm_key_by_group(group_id, emm_type, new_key, unique_address);
            keys_added += 1;
            log::info!(
                "key found in EMM: P {group_id:04X}**** {emm_type:02X} {new_key:02X?}; \
                 UA: {unique_address:08X}"
            );
        }

        if decrypt_ok {
            return Ok(keys_added);
        }
    }
}
