//! Key management for the PowerVu conditional-access system.
//!
//! Two kinds of key live in the same store:
//!
//! * **ECM keys** (7 bytes) decrypt the CW-carrying nano of an ECM. They are
//!   filed under provider `(group_id << 16) | service_id` with name `"00"`
//!   or `"01"` selecting the key index.
//! * **EMM keys** (7 bytes) decrypt key-update records addressed to one
//!   subscriber. They are filed under provider `group_id` with the
//!   subscriber's unique address as an 8-hex-digit name.
//!
//! Lookups walk the store in insertion order; `key_ref` selects the Nth
//! match so decoders can trial every candidate. The store is shared between
//! ECM decoding (reads) and EMM processing (reads and writes) and is
//! serialized by a mutex held only for the duration of a call - never
//! across a message decode.
//!
//! ## Key file format
//! [`KeyStore::load_keys`] reads `SoftCam.Key`-style text: one entry per
//! line, `P <provider-hex> <name> <14-hex-digit key>`, comments prefixed
//! with `;` or `#`. Non-PowerVu identifiers are silently skipped.

use std::io::{BufRead, BufReader, Read};

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// One stored key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    /// Provider word; see the module docs for the two layouts.
    pub provider: u32,
    /// Key name: an index (`"00"`/`"01"`) or an 8-hex-digit unique address.
    pub name: String,
    /// 7-byte key material.
    pub key: [u8; 7],
}

/// Mutex-guarded in-memory key store.
#[derive(Debug, Default)]
pub struct KeyStore {
    entries: Mutex<Vec<KeyEntry>>,
}

impl KeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the `key_ref`-th key matching `name` and the provider bits
    /// not covered by `ignore_mask`.
    ///
    /// Returns the key and the full provider word of the matching entry.
    pub fn find_key(
        &self,
        provider: u32,
        ignore_mask: u32,
        name: &str,
        key_ref: u32,
    ) -> Option<([u8; 7], u32)> {
        let entries = self.entries.lock();
        entries
            .iter()
            .filter(|e| (e.provider & !ignore_mask) == (provider & !ignore_mask) && e.name == name)
            .nth(key_ref as usize)
            .map(|e| (e.key, e.provider))
    }

    /// Insert `key` under `(provider, name)`, replacing any existing entry.
    ///
    /// `info` is a free-form label recorded in the log (typically the
    /// unique address an EMM delivered the key under).
    pub fn set_key(&self, provider: u32, name: &str, key: [u8; 7], info: &str) -> bool {
        let mut entries = self.entries.lock();

        log::info!("set key: P {provider:08X} {name} ({info})");

        if let Some(entry) = entries
            .iter_mut()
            .find(|e| e.provider == provider && e.name == name)
        {
            entry.key = key;
        } else {
            entries.push(KeyEntry {
                provider,
                name: name.to_owned(),
                key,
            });
        }
        true
    }

    /// Snapshot of every entry, in insertion order.
    pub fn entries(&self) -> Vec<KeyEntry> {
        self.entries.lock().clone()
    }

    /// ECM key lookup: by service id and key index, `key_ref`-th candidate.
    pub(crate) fn ecm_key(&self, srvid: u16, key_index: u8, key_ref: u32) -> Option<[u8; 7]> {
        let name = if key_index == 1 { "01" } else { "00" };
        self.find_key(u32::from(srvid), 0xFFFF_0000, name, key_ref)
            .map(|(key, _)| key)
    }

    /// EMM key lookup: by unique address, `key_ref`-th candidate. Returns
    /// the key and the group id it belongs to.
    pub(crate) fn emm_key(&self, unique_address: u32, key_ref: u32) -> Option<([u8; 7], u32)> {
        let name = format!("{unique_address:08X}");
        self.find_key(0, 0xFFFF_FFFF, &name, key_ref)
    }

    /// Install a freshly extracted ECM key for every service whose provider
    /// group matches `group_id`. Entries already holding `key` are left
    /// alone. Returns true when at least one entry was written.
    pub(crate) fn install_ecm_key_by_group(
        &self,
        group_id: u32,
        emm_type: u8,
        key: [u8; 7],
        unique_address: u32,
    ) -> bool {
        let name = format!("{emm_type:02X}");
        let info = format!("UA: {unique_address:08X}");

        let providers: Vec<u32> = {
            let entries = self.entries.lock();
            entries
                .iter()
                .filter(|e| (e.provider & 0xFFFF_0000) == (group_id << 16) && e.name == name)
                .filter(|e| e.key != key)
                .map(|e| e.provider)
                .collect()
        };

        let mut updated = false;
        for provider in providers {
            updated |= self.set_key(provider, &name, key, &info);
        }
        updated
    }

    /// Unique-address serials whose group serves `srvid` (`0xFFFF` for
    /// all services), right-aligned into 4 bytes, deduplicated.
    pub fn hexserials(&self, srvid: u16) -> Vec<[u8; 4]> {
        let entries = self.entries.lock();
        let mut serials: Vec<[u8; 4]> = Vec::new();

        for ecm_entry in entries.iter().filter(|e| e.provider > 0xFFFF) {
            if srvid != 0xFFFF && (ecm_entry.provider & 0xFFFF) != u32::from(srvid) {
                continue;
            }
            let group_id = ecm_entry.provider >> 16;

            for ua_entry in entries.iter().filter(|e| e.provider == group_id) {
                let name = &ua_entry.name;
                if name.len() < 3 {
                    continue;
                }
                let name = &name[..name.len().min(8)];
                let Ok(ua) = u32::from_str_radix(name, 16) else {
                    continue;
                };
                let serial = ua.to_be_bytes();
                if !serials.contains(&serial) {
                    serials.push(serial);
                }
            }
        }

        serials
    }

    /// Load keys from a `SoftCam.Key`-style reader.
    ///
    /// Blank lines and comments (`;`, `#`) are ignored, as is any line whose
    /// identifier is not `P` or whose key is not 14 hex digits, so that
    /// mixed-system key files load cleanly.
    pub fn load_keys<R: Read>(&self, reader: R) -> Result<usize> {
        let buf = BufReader::new(reader);
        let mut loaded = 0usize;

        for line in buf.lines() {
            let line = line.map_err(|_| Error::Parse("unreadable key file"))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (Some(ident), Some(provider), Some(name), Some(value)) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                continue;
            };

            if !ident.eq_ignore_ascii_case("P") {
                continue;
            }
            let Ok(provider) = u32::from_str_radix(provider, 16) else {
                continue;
            };
            let Ok(key) = decode_hex_7(value) else {
                continue;
            };

            self.set_key(provider, name, key, "key file");
            loaded += 1;
        }

        Ok(loaded)
    }
}

fn decode_hex_7(s: &str) -> std::result::Result<[u8; 7], ()> {
    let s = s.trim();
    if s.len() != 14 {
        return Err(());
    }
    let mut out = [0u8; 7];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let hi = hex_nibble(chunk[0])?;
        let lo = hex_nibble(chunk[1])?;
        out[i] = (hi << 4) | lo;
    }
    Ok(out)
}

fn hex_nibble(b: u8) -> std::result::Result<u8, ()> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const K1: [u8; 7] = [1, 2, 3, 4, 5, 6, 7];
    const K2: [u8; 7] = [7, 6, 5, 4, 3, 2, 1];

    #[test]
    fn find_key_masks_provider_bits() {
        let store = KeyStore::new();
        store.set_key(0x0028_A110, "00", K1, "test");

        // ECM lookup ignores the group half of the provider word.
        assert_eq!(store.ecm_key(0xA110, 0, 0), Some(K1));
        assert_eq!(store.ecm_key(0xA110, 1, 0), None);
        assert_eq!(store.ecm_key(0xA111, 0, 0), None);
    }

    #[test]
    fn key_ref_walks_candidates() {
        let store = KeyStore::new();
        store.set_key(0x0011_A110, "00", K1, "test");
        store.set_key(0x0022_A110, "00", K2, "test");

        assert_eq!(store.ecm_key(0xA110, 0, 0), Some(K1));
        assert_eq!(store.ecm_key(0xA110, 0, 1), Some(K2));
        assert_eq!(store.ecm_key(0xA110, 0, 2), None);
    }

    #[test]
    fn emm_key_returns_group() {
        let store = KeyStore::new();
        store.set_key(0x0028, "12345678", K1, "test");

        assert_eq!(store.emm_key(0x1234_5678, 0), Some((K1, 0x0028)));
        assert_eq!(store.emm_key(0x1234_5678, 1), None);
        assert_eq!(store.emm_key(0x8765_4321, 0), None);
    }

    #[test]
    fn group_install_updates_every_service() {
        let store = KeyStore::new();
        store.set_key(0x0028_A110, "00", K1, "test");
        store.set_key(0x0028_B220, "00", K1, "test");
        store.set_key(0x0029_C330, "00", K1, "test"); // other group

        assert!(store.install_ecm_key_by_group(0x0028, 0, K2, 0x1234_5678));

        assert_eq!(store.ecm_key(0xA110, 0, 0), Some(K2));
        assert_eq!(store.ecm_key(0xB220, 0, 0), Some(K2));
        assert_eq!(store.ecm_key(0xC330, 0, 0), Some(K1));

        // Re-installing the same key touches nothing.
        assert!(!store.install_ecm_key_by_group(0x0028, 0, K2, 0x1234_5678));
    }

    #[test]
    fn hexserials_by_service() {
        let store = KeyStore::new();
        store.set_key(0x0028_A110, "00", K1, "test");
        store.set_key(0x0028, "12345678", K2, "test");
        store.set_key(0x0028, "0000ABCD", K2, "test");
        store.set_key(0x0029, "99999999", K2, "test"); // unrelated group

        let mut serials = store.hexserials(0xA110);
        serials.sort();
        assert_eq!(serials, vec![[0x00, 0x00, 0xAB, 0xCD], [0x12, 0x34, 0x56, 0x78]]);

        assert!(store.hexserials(0xBEEF).is_empty());
    }

    #[test]
    fn loads_softcam_style_files() {
        let text = b"; PowerVu keys\n\
                     P 0028A110 00 01020304050607\n\
                     P 0028 12345678 07060504030201\n\
                     F 1234 00 AABBCCDD ; other system\n\
                     P 0028A110 01 not_hex\n" as &[u8];

        let store = KeyStore::new();
        assert_eq!(store.load_keys(text).unwrap(), 2);
        assert_eq!(store.ecm_key(0xA110, 0, 0), Some(K1));
        assert_eq!(store.emm_key(0x1234_5678, 0), Some((K2, 0x0028)));
    }
}
