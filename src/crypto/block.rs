//! The mode-03 block construction.
//!
//! Mask mode 3 replaces the hash suite with a 12-round keyed bijection on a
//! 16-byte state. The round key stream is the remainder of the 64-byte
//! input block, consumed as three 16-byte subkeys cycled over the rounds.
//! Each round substitutes through a fixed 256-byte table, diffuses with a
//! multiplicative byte mix and swaps half of the state lanes.
//!
//! Two builders assemble the 64-byte input: [`create_data_cw_mode03`] for
//! control-word derivation and [`create_data_unmask_mode03`] for body
//! unmasking. Both splice selected ECM body bytes over a fixed 56-byte pad.

/// Substitution table shared by every round.
const TABLE: [u8; 256] = [
    0x68, 0xCE, 0xE7, 0x71, 0xCC, 0x3A, 0x0B, 0x6E, 0x2A, 0x43, 0x17, 0x07, 0x5A, 0xD9, 0x14, 0x5B,
    0xB0, 0x8E, 0xA8, 0x7F, 0xD8, 0xA2, 0xCF, 0x73, 0xC2, 0xB9, 0x5D, 0x46, 0xDD, 0x2C, 0xE2, 0x2D,
    0xFD, 0x50, 0xE9, 0x7C, 0x28, 0x72, 0x9B, 0xAA, 0xEC, 0x24, 0x74, 0xAB, 0x00, 0x1C, 0x8B, 0x65,
    0x38, 0x13, 0x22, 0x82, 0xAC, 0x9A, 0x4D, 0x2B, 0xEA, 0x04, 0x31, 0x84, 0x32, 0x3D, 0x36, 0x53,
    0x5F, 0x42, 0x96, 0xDE, 0x47, 0x08, 0x51, 0x4B, 0x3E, 0xD1, 0x1E, 0x12, 0xD2, 0x1F, 0x7D, 0x26,
    0xCD, 0x57, 0x8C, 0xB6, 0xD3, 0xF8, 0x11, 0xAD, 0x6A, 0x88, 0x95, 0x21, 0xE8, 0xBF, 0x6B, 0x27,
    0xBE, 0xA3, 0x33, 0xB8, 0x9E, 0xB3, 0x6C, 0xC3, 0x06, 0xC7, 0x6F, 0x99, 0x97, 0xDA, 0x09, 0xAF,
    0xAE, 0xCB, 0x79, 0x37, 0x55, 0x85, 0x8D, 0x2F, 0x8A, 0x70, 0xA1, 0x7A, 0x66, 0x29, 0x67, 0x0F,
    0xEB, 0x9C, 0xC8, 0xC4, 0xD6, 0x4C, 0xDF, 0x1A, 0xC0, 0x01, 0x64, 0xBC, 0x4E, 0xE1, 0x54, 0xD7,
    0x4F, 0xB7, 0x5E, 0xCA, 0xF0, 0x91, 0xE4, 0x59, 0x4A, 0xC6, 0x83, 0x8F, 0xBD, 0x61, 0xFF, 0x56,
    0x92, 0xF1, 0x5C, 0x77, 0xC9, 0x20, 0xF4, 0xE5, 0x10, 0x69, 0x03, 0x1D, 0xD5, 0x45, 0xF6, 0x0E,
    0xEF, 0xA0, 0xE3, 0x58, 0xFC, 0xED, 0x80, 0x16, 0xEE, 0xFA, 0x02, 0xF5, 0xB4, 0x0A, 0xE0, 0x0C,
    0xF7, 0xF9, 0xBA, 0x7E, 0x18, 0x78, 0x19, 0xB5, 0x0D, 0x44, 0x34, 0xD4, 0xDC, 0x30, 0x6D, 0x3B,
    0x63, 0x41, 0x48, 0x40, 0xA7, 0xA5, 0xC5, 0x98, 0x76, 0x3F, 0xC1, 0x25, 0x93, 0x49, 0xD0, 0x62,
    0x2E, 0x75, 0xDB, 0x94, 0xF3, 0x52, 0x05, 0x81, 0xFB, 0xBB, 0xA6, 0x89, 0x39, 0xA4, 0xF2, 0xA9,
    0xFE, 0x60, 0x3C, 0x15, 0xB1, 0x35, 0x86, 0x9D, 0x9F, 0x90, 0x1B, 0xE6, 0x7B, 0x23, 0x87, 0xB2,
];

/// Run the 12-round block construction over `data` and return the 16-byte
/// result.
///
/// `data[0..16]` is the state (loaded with its 4-byte blocks reversed),
/// `data[16..64]` the round key material.
pub fn create_hash_mode03(data: &[u8; 64]) -> [u8; 16] {
    let mut state = [0u8; 16];
    for i in 0..4 {
        state[i] = data[12 + i];
        state[4 + i] = data[8 + i];
        state[8 + i] = data[4 + i];
        state[12 + i] = data[i];
    }

    for c in 0..12usize {
        let subkey = &data[16 + 16 * (c % 3)..32 + 16 * (c % 3)];

        let mut b1 = [0u8; 8];
        for i in 0..4 {
            b1[i] = state[8 + i] ^ state[12 + i];
            b1[4 + i] = state[i] ^ state[4 + i];
        }

        for i in 0..8 {
            b1[i] = TABLE[(b1[i] ^ subkey[i]) as usize];
        }

        // Multiplicative diffusion: every output byte mixes all eight
        // substituted bytes.
        let mut b2 = [0u8; 8];
        for (j, out) in b2.iter_mut().enumerate() {
            for (i, &b) in b1.iter().enumerate() {
                *out ^= b.wrapping_mul((j * i + 1) as u8);
            }
        }

        for i in 0..8 {
            b2[i] = TABLE[(b2[i] ^ subkey[8 + i]) as usize] ^ subkey[i];
        }

        for i in 0..4 {
            state[12 + i] ^= b2[i];
            state[8 + i] ^= b2[i];
            state[4 + i] ^= b2[4 + i];
            state[i] ^= b2[4 + i];
        }

        let top = [
            state[14],
            state[15],
            state[12] ^ state[14],
            state[13] ^ state[15],
        ];
        let mid = [state[6], state[7], state[4] ^ state[6], state[5] ^ state[7]];

        state[12..16].copy_from_slice(&top);
        state[4..8].copy_from_slice(&mid);
    }

    let mut hash = [0u8; 16];
    for i in 0..4 {
        hash[i] = state[12 + i] ^ data[i];
        hash[4 + i] = state[8 + i] ^ data[4 + i];
        hash[8 + i] = state[4 + i] ^ data[8 + i];
        hash[12 + i] = state[i] ^ data[12 + i];
    }
    hash
}

/// ECM body bytes spliced into the CW input block.
const CW_BODY_POS: [usize; 8] = [0x0F, 0x09, 0x10, 0x11, 0x05, 0x07, 0x08, 0x0A];

const CW_PAD: [u8; 56] = [
    0x4A, 0x56, 0x7F, 0x16, 0xFC, 0x1F, 0x5B, 0x95, 0x19, 0xEF, 0x75, 0x14, 0x0E, 0x9E, 0x17, 0x3C,
    0xF5, 0xB7, 0xA0, 0x93, 0xA3, 0x0F, 0xFA, 0x38, 0x7A, 0x34, 0x6C, 0xDC, 0xFB, 0xB0, 0x24, 0x42,
    0x74, 0x72, 0x1C, 0xDC, 0x1E, 0xA1, 0x6D, 0xAB, 0xC8, 0x44, 0x53, 0xEF, 0x56, 0x00, 0xE9, 0x97,
    0x48, 0x77, 0xF8, 0x00, 0x8E, 0x0B, 0x78, 0xA2,
];

/// Assemble the 64-byte CW derivation block for mask mode 3: eight ECM body
/// bytes, then the seed/base-CW interleave (with the stream-class marker
/// `val` injected before base bytes 0, 2 and 5) written over the fixed pad.
pub fn create_data_cw_mode03(
    seed: &[u8],
    base_cw: &[u8; 7],
    val: u8,
    ecm_body: &[u8],
) -> [u8; 64] {
    let mut data = [0u8; 64];
    data[8..].copy_from_slice(&CW_PAD);

    for (i, &pos) in CW_BODY_POS.iter().enumerate() {
        data[i] = ecm_body[pos];
    }

    let mut idx_data = 8;
    let mut idx_seed = 0;
    let mut idx_base = 0;
    while idx_base < 7 {
        if idx_base == 0 || idx_base == 2 || idx_base == 5 {
            data[idx_data] = val;
            idx_data += 1;
        }
        if idx_seed < seed.len() {
            data[idx_data] = seed[idx_seed];
            idx_data += 1;
            idx_seed += 1;
        }
        data[idx_data] = base_cw[idx_base];
        idx_data += 1;
        idx_base += 1;
    }

    data
}

/// ECM body bytes spliced into the unmask input block.
const UNMASK_BODY_POS: [usize; 8] = [0x17, 0x26, 0x19, 0x21, 0x26, 0x31, 0x21, 0x27];

const UNMASK_PAD: [u8; 56] = [
    0xB1, 0x7C, 0xD2, 0xA7, 0x5E, 0x45, 0x6C, 0x36, 0xF0, 0xB6, 0x81, 0xF3, 0x25, 0x06, 0x65, 0x06,
    0x6B, 0xBF, 0x4C, 0xE7, 0xED, 0x6E, 0x85, 0x00, 0xCC, 0xF2, 0x61, 0x48, 0x62, 0x24, 0x0E, 0x3C,
    0x05, 0x89, 0xA5, 0x39, 0x5A, 0x4E, 0x9B, 0xC8, 0x14, 0x78, 0xEA, 0xB6, 0xFB, 0xF8, 0x10, 0xE6,
    0x61, 0xF5, 0x3A, 0xBC, 0x5B, 0x79, 0x09, 0x97,
];

/// Assemble the 64-byte unmask block for mask mode 3: eight ECM body bytes
/// over the fixed pad.
pub fn create_data_unmask_mode03(ecm_body: &[u8]) -> [u8; 64] {
    let mut data = [0u8; 64];
    data[8..].copy_from_slice(&UNMASK_PAD);

    for (i, &pos) in UNMASK_BODY_POS.iter().enumerate() {
        data[i] = ecm_body[pos];
    }

    data
}
