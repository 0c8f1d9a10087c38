//! End-to-end EMM processing scenarios against the public API.

use pvukit::checksum::fletcher_crc32;
use pvukit::message::emm::process_emm;
use pvukit::{Error, KeyStore};

fn build_emm(mask_nibble: u8, unique_address: u32, records: &[[u8; 27]]) -> Vec<u8> {
    let body_len = 16 + records.len() * 27 + 4;
    let mut emm = vec![0x82, (body_len >> 8) as u8, body_len as u8, mask_nibble];
    emm.resize(12, 0);
    emm.extend_from_slice(&unique_address.to_be_bytes());
    emm.resize(19, 0);
    for r in records {
        emm.extend_from_slice(r);
    }
    let l = emm.len();
    let crc = fletcher_crc32(&emm[..l]);
    emm.extend_from_slice(&crc.to_be_bytes());
    emm
}

fn scrambled_record() -> [u8; 27] {
    let mut record = [0u8; 27];
    record[0] = 0x80;
    for (i, b) in record[1..].iter_mut().enumerate() {
        *b = (i as u8).wrapping_mul(0x29).wrapping_add(0x77);
    }
    record
}

#[test]
fn short_emm_is_not_supported() {
    let mut emm = vec![0x82, 0x00, 0x20, 0x10];
    emm.resize(35, 0);
    assert_eq!(process_emm(&mut emm, &KeyStore::new()), Err(Error::NotSupported));
}

#[test]
fn unknown_subscriber_is_key_not_found() {
    let mut emm = build_emm(0x10, 0x1234_5678, &[scrambled_record(); 2]);

    let keys = KeyStore::new();
    keys.set_key(0x0028, "CAFEBABE", [1, 2, 3, 4, 5, 6, 7], "different UA");

    assert_eq!(process_emm(&mut emm, &keys), Err(Error::KeyNotFound));
}

#[test]
fn undecryptable_records_exhaust_every_ua_key() {
    // Both stored keys for the UA fail to validate any record; the trial
    // loop must terminate with a key-not-found, not spin.
    let mut emm = build_emm(0x10, 0x1234_5678, &[scrambled_record(); 3]);

    let keys = KeyStore::new();
    keys.set_key(0x0028, "12345678", [1, 2, 3, 4, 5, 6, 7], "candidate 1");
    keys.set_key(0x0031, "12345678", [8, 9, 1, 2, 3, 4, 5], "candidate 2");

    assert_eq!(process_emm(&mut emm, &keys), Err(Error::KeyNotFound));
    // The ECM key filings are untouched by the failure.
    assert!(keys.entries().iter().all(|e| e.name != "00" && e.name != "01"));
}

#[test]
fn garbage_input_never_panics() {
    let keys = KeyStore::new();
    keys.set_key(0x0028, "12345678", [1, 2, 3, 4, 5, 6, 7], "candidate");
    let mut pattern = 0x3Bu8;

    for len in [0usize, 4, 49, 50, 60, 105, 160, 300] {
        let mut emm = vec![0u8; len];
        for b in emm.iter_mut() {
            pattern = pattern.wrapping_mul(113).wrapping_add(29);
            *b = pattern;
        }
        let _ = process_emm(&mut emm, &keys);
    }
}
