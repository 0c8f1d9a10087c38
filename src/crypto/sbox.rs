//! The PowerVu S-box stream cipher.
//!
//! A self-synchronizing cipher over a 7-byte key register. For every
//! ciphertext bit, eight selectors each pull a 4-bit index and a 3-bit
//! position out of fixed key-register taps, look up one bit in their S-box,
//! and the assembled 5-bit index / 3-bit position select the keystream bit
//! from a ninth 32-byte S-box. The decrypted bit is fed back into the key
//! register (with a tap into byte 3), which then rotates right by one bit.
//!
//! Two banks of tables exist; ECMs select the bank with a header flag
//! ("sbox bit"), EMMs try bank 0 first and fall back to bank 1.

use crate::utils::{get_bit, set_bit};

/// One bank of S-box tables.
struct SboxBank {
    s: [&'static [u8; 16]; 8],
    last: &'static [u8; 32],
}

const A0_S_1: [u8; 16] = [
    0x33, 0xA4, 0x44, 0x3C, 0xCA, 0x2E, 0x75, 0x7B, 0xBC, 0xE6, 0xE5, 0x35, 0xA0, 0x55, 0xC9, 0xA2,
];
const A0_S_2: [u8; 16] = [
    0x5A, 0xB0, 0x2C, 0xBC, 0xDA, 0x32, 0xE6, 0x92, 0x40, 0x53, 0x6E, 0xF9, 0x69, 0x11, 0x1E, 0xFB,
];
const A0_S_3: [u8; 16] = [
    0x4E, 0x18, 0x9B, 0x19, 0x79, 0xFB, 0x01, 0xFA, 0xE3, 0xE1, 0x28, 0x3D, 0x32, 0xE4, 0x92, 0xEA,
];
const A0_S_4: [u8; 16] = [
    0x05, 0x6F, 0x37, 0x66, 0x35, 0xE1, 0x58, 0xD0, 0xB4, 0x6A, 0x97, 0xAE, 0xD8, 0x91, 0x27, 0x56,
];
const A0_S_5: [u8; 16] = [
    0x7B, 0x26, 0xAD, 0x34, 0x3D, 0x77, 0x39, 0x51, 0xE0, 0xE0, 0x48, 0x8C, 0x39, 0xF5, 0xE8, 0x47,
];
const A0_S_6: [u8; 16] = [
    0x74, 0xFA, 0x4D, 0x79, 0x42, 0x39, 0xD1, 0xA4, 0x99, 0xA3, 0x97, 0x07, 0xDF, 0x14, 0x3A, 0xC4,
];
const A0_S_7: [u8; 16] = [
    0xC6, 0x1E, 0x3C, 0x24, 0x11, 0x08, 0x5D, 0x6A, 0xEB, 0x97, 0xB9, 0x25, 0xA7, 0xFA, 0xE9, 0x1A,
];
const A0_S_8: [u8; 16] = [
    0x9A, 0xAD, 0x72, 0xD7, 0x7C, 0x68, 0x3B, 0x55, 0x1D, 0x4A, 0xA2, 0xB0, 0x38, 0xB9, 0x56, 0xD0,
];
const A0_S_9: [u8; 32] = [
    0x61, 0xDA, 0x5F, 0xB7, 0xEB, 0xC6, 0x3F, 0x6C, 0x09, 0xF3, 0x64, 0x38, 0x33, 0x08, 0xAA, 0x15,
    0xCC, 0xEF, 0x22, 0x64, 0x01, 0x2C, 0x12, 0xDE, 0xF4, 0x6E, 0x3C, 0xCD, 0x1A, 0x64, 0x63, 0x7C,
];

const S00_S_1: [u8; 16] = [
    0x97, 0x13, 0xEB, 0x6B, 0x04, 0x5E, 0x60, 0x3A, 0xD9, 0xCC, 0x91, 0xC2, 0x5A, 0xFD, 0xBA, 0x0C,
];
const S00_S_2: [u8; 16] = [
    0x61, 0x3C, 0x03, 0xB0, 0xB5, 0x6F, 0xF8, 0x01, 0xED, 0xE0, 0xE5, 0xF3, 0x78, 0x0F, 0x0A, 0x73,
];
const S00_S_3: [u8; 16] = [
    0xFD, 0xDF, 0xD2, 0x97, 0x06, 0x14, 0x91, 0xB5, 0x36, 0xAD, 0xBC, 0xE1, 0xB3, 0x00, 0x66, 0x41,
];
const S00_S_4: [u8; 16] = [
    0x8B, 0xD9, 0x18, 0x0A, 0xED, 0xEE, 0x61, 0x34, 0x1A, 0x79, 0x80, 0x8C, 0x1E, 0x7F, 0xC5, 0x9F,
];
const S00_S_5: [u8; 16] = [
    0xB0, 0xA1, 0xF2, 0xB8, 0xEA, 0x72, 0xDD, 0xD3, 0x30, 0x65, 0x2B, 0x1E, 0xE9, 0xE1, 0x45, 0x29,
];
const S00_S_6: [u8; 16] = [
    0x5D, 0xCA, 0x53, 0x75, 0xB2, 0x24, 0xCE, 0xAF, 0x21, 0x54, 0x9E, 0xBE, 0x02, 0xA9, 0x4C, 0x5D,
];
const S00_S_7: [u8; 16] = [
    0x42, 0x66, 0x72, 0x83, 0x1B, 0x2D, 0x22, 0xC9, 0xF8, 0x4D, 0xBA, 0xCD, 0xBB, 0x20, 0xBD, 0x6B,
];
const S00_S_8: [u8; 16] = [
    0xC4, 0x0C, 0x6B, 0xD3, 0x6D, 0x94, 0x7E, 0x53, 0xCE, 0x96, 0xAC, 0x40, 0x2C, 0x7A, 0xD3, 0xA9,
];
const S00_S_9: [u8; 32] = [
    0x31, 0x82, 0x4F, 0x9B, 0xCB, 0x6F, 0x9D, 0xB7, 0xAE, 0x68, 0x0B, 0xA0, 0x93, 0x15, 0x32, 0xE2,
    0xED, 0xE9, 0x47, 0x29, 0xC2, 0xA8, 0x92, 0xEF, 0xBA, 0x27, 0x22, 0x57, 0x76, 0x54, 0xC0, 0x59,
];

const BANK_A0: SboxBank = SboxBank {
    s: [
        &A0_S_1, &A0_S_2, &A0_S_3, &A0_S_4, &A0_S_5, &A0_S_6, &A0_S_7, &A0_S_8,
    ],
    last: &A0_S_9,
};

const BANK_00: SboxBank = SboxBank {
    s: [
        &S00_S_1, &S00_S_2, &S00_S_3, &S00_S_4, &S00_S_5, &S00_S_6, &S00_S_7, &S00_S_8,
    ],
    last: &S00_S_9,
};

/// Tap wiring of one selector: `(index_taps, bit_taps)`, each tap a
/// `(key_byte, bit)` pair, listed most significant first.
type Taps = ([(usize, u8); 4], [(usize, u8); 3]);

/// The eight selectors. The first three assemble `last_bit`, the remaining
/// five assemble `last_index` (low bit first).
const SELECTOR_TAPS: [Taps; 8] = [
    ([(0, 0), (2, 6), (2, 4), (5, 7)], [(2, 0), (3, 4), (5, 3)]),
    ([(2, 1), (2, 2), (5, 5), (5, 1)], [(5, 0), (4, 0), (6, 2)]),
    ([(1, 3), (3, 7), (1, 5), (5, 2)], [(6, 0), (1, 7), (6, 7)]),
    ([(6, 3), (6, 4), (6, 6), (3, 5)], [(1, 0), (2, 7), (2, 5)]),
    ([(3, 1), (4, 5), (3, 0), (4, 7)], [(3, 3), (4, 6), (3, 2)]),
    ([(2, 3), (6, 5), (1, 4), (4, 1)], [(5, 4), (4, 4), (1, 2)]),
    ([(0, 5), (0, 3), (0, 1), (0, 2)], [(0, 6), (0, 7), (0, 4)]),
    ([(1, 6), (6, 1), (5, 6), (3, 6)], [(4, 2), (4, 3), (1, 1)]),
];

fn selector(key: &[u8; 7], taps: &Taps, table: &[u8; 16]) -> u8 {
    let (idx_taps, bit_taps) = taps;

    let mut s_index = 0u8;
    for &(byte, bit) in idx_taps {
        s_index = (s_index << 1) | get_bit(key[byte], bit);
    }

    let mut bit = 0u8;
    for &(byte, b) in bit_taps {
        bit = (bit << 1) | get_bit(key[byte], b);
    }

    get_bit(table[s_index as usize], 7 - bit)
}

/// One keystream bit for the current key register state. `bank` selects the
/// table bank (the ECM header's sbox flag).
pub fn sbox_eval(key: &[u8; 7], bank: u8) -> u8 {
    let tables = if bank != 0 { &BANK_A0 } else { &BANK_00 };

    let mut last_bit = 0u8;
    for i in 0..3 {
        last_bit |= selector(key, &SELECTOR_TAPS[i], tables.s[i]) << i;
    }

    let mut last_index = 0u8;
    for i in 0..5 {
        last_index |= selector(key, &SELECTOR_TAPS[3 + i], tables.s[3 + i]) << i;
    }

    get_bit(tables.last[(last_index & 0x1F) as usize], 7 - last_bit)
}

/// Decrypt `data` in place with the 7-byte key register `key`.
///
/// The register is consumed: every decrypted bit is fed back through the
/// byte-3 tap and rotated in as the new top bit, so a fresh copy of the key
/// is required per decryption.
pub fn decrypt(data: &mut [u8], key: &mut [u8; 7], bank: u8) {
    for i in 0..data.len() {
        let cur = data[i];

        for j in (0..8u8).rev() {
            let plain = get_bit(cur, j) ^ sbox_eval(key, bank) ^ get_bit(key[0], 7);
            data[i] = set_bit(data[i], j, plain != 0);

            let feedback = plain ^ get_bit(key[6], 0);
            if feedback != 0 {
                key[3] ^= 0x10;
            }

            // Rotate the whole register right one bit, feeding the new MSB.
            for k in (1..7).rev() {
                key[k] = (key[k] >> 1) | (key[k - 1] << 7);
            }
            key[0] >>= 1;
            key[0] = set_bit(key[0], 7, feedback != 0);
        }
    }
}
