//! DES key handling for derived control words.
//!
//! PowerVu transports DES keys in compressed 7-byte form; the descrambler
//! wants the classic 8-byte layout with an odd-parity bit in every LSB.
//! Control words built by the masked derivation path are instead forced to
//! odd parity byte-by-byte through a 256-entry table.

/// Odd-parity fix-up table: maps any byte to a nearby value with odd
/// parity. Every output is a fixed point (`FIX_PARITY[v] == v` for each
/// produced `v`), so applying the fix twice changes nothing.
const FIX_PARITY: [u8; 256] = [
    0x01, 0x01, 0x02, 0x02, 0x04, 0x04, 0x07, 0x07, 0x08, 0x08, 0x0B, 0x0B, 0x0D, 0x0D, 0x0E, 0x0E,
    0x10, 0x10, 0x13, 0x13, 0x15, 0x15, 0x16, 0x16, 0x19, 0x19, 0x1A, 0x1A, 0x1C, 0x1C, 0x1F, 0x1F,
    0x20, 0x20, 0x23, 0x23, 0x25, 0x25, 0x26, 0x26, 0x29, 0x29, 0x2A, 0x2A, 0x2C, 0x2C, 0x2F, 0x2F,
    0x31, 0x31, 0x32, 0x32, 0x34, 0x34, 0x37, 0x37, 0x38, 0x38, 0x3B, 0x3B, 0x3D, 0x3D, 0x3E, 0x3E,
    0x40, 0x40, 0x43, 0x43, 0x45, 0x45, 0x46, 0x46, 0x49, 0x49, 0x4A, 0x4A, 0x4C, 0x4C, 0x4F, 0x4F,
    0x51, 0x51, 0x52, 0x52, 0x54, 0x54, 0x57, 0x57, 0x58, 0x58, 0x5B, 0x5B, 0x5D, 0x5D, 0x5E, 0x5E,
    0x61, 0x61, 0x62, 0x62, 0x64, 0x64, 0x67, 0x67, 0x68, 0x68, 0x6B, 0x6B, 0x6D, 0x6D, 0x6E, 0x6E,
    0x70, 0x70, 0x73, 0x73, 0x75, 0x75, 0x76, 0x76, 0x79, 0x79, 0x7A, 0x7A, 0x7C, 0x7C, 0x7F, 0x7F,
    0x80, 0x80, 0x83, 0x83, 0x85, 0x85, 0x86, 0x86, 0x89, 0x89, 0x8A, 0x8A, 0x8C, 0x8C, 0x8F, 0x8F,
    0x91, 0x91, 0x92, 0x92, 0x94, 0x94, 0x97, 0x97, 0x98, 0x98, 0x9B, 0x9B, 0x9D, 0x9D, 0x9E, 0x9E,
    0xA1, 0xA1, 0xA2, 0xA2, 0xA4, 0xA4, 0xA7, 0xA7, 0xA8, 0xA8, 0xAB, 0xAB, 0xAD, 0xAD, 0xAE, 0xAE,
    0xB0, 0xB0, 0xB3, 0xB3, 0xB5, 0xB5, 0xB6, 0xB6, 0xB9, 0xB9, 0xBA, 0xBA, 0xBC, 0xBC, 0xBF, 0xBF,
    0xC1, 0xC1, 0xC2, 0xC2, 0xC4, 0xC4, 0xC7, 0xC7, 0xC8, 0xC8, 0xCB, 0xCB, 0xCD, 0xCD, 0xCE, 0xCE,
    0xD0, 0xD0, 0xD3, 0xD3, 0xD5, 0xD5, 0xD6, 0xD6, 0xD9, 0xD9, 0xDA, 0xDA, 0xDC, 0xDC, 0xDF, 0xDF,
    0xE0, 0xE0, 0xE3, 0xE3, 0xE5, 0xE5, 0xE6, 0xE6, 0xE9, 0xE9, 0xEA, 0xEA, 0xEC, 0xEC, 0xEF, 0xEF,
    0xF1, 0xF1, 0xF2, 0xF2, 0xF4, 0xF4, 0xF7, 0xF7, 0xF8, 0xF8, 0xFB, 0xFB, 0xFD, 0xFD, 0xFE, 0xFE,
];

/// Force every byte of a DES control word to odd parity.
pub fn fix_parity(cw: &mut [u8; 8]) {
    for b in cw.iter_mut() {
        *b = FIX_PARITY[*b as usize];
    }
}

/// Expand a compressed 7-byte DES key into the 8-byte register layout.
///
/// The 56 key bits are redistributed seven per byte, then the LSB of each
/// output byte is set so the byte has odd parity.
pub fn expand_des_key(cw: &mut [u8; 8]) {
    let k: [u8; 7] = cw[..7].try_into().expect("slice length is fixed");

    cw[0] = k[0] & 0xFE;
    cw[1] = (k[0] << 7) | ((k[1] >> 1) & 0xFE);
    cw[2] = (k[1] << 6) | ((k[2] >> 2) & 0xFE);
    cw[3] = (k[2] << 5) | ((k[3] >> 3) & 0xFE);
    cw[4] = (k[3] << 4) | ((k[4] >> 4) & 0xFE);
    cw[5] = (k[4] << 3) | ((k[5] >> 5) & 0xFE);
    cw[6] = (k[5] << 2) | ((k[6] >> 6) & 0xFE);
    cw[7] = k[6] << 1;

    for b in cw.iter_mut() {
        let upper_ones = (*b >> 1).count_ones();
        *b = (*b & 0xFE) | u8::from(upper_ones % 2 == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn odd_parity(b: u8) -> bool {
        b.count_ones() % 2 == 1
    }

    #[test]
    fn fix_parity_output_is_odd_and_idempotent() {
        for v in 0..=255u8 {
            let fixed = FIX_PARITY[v as usize];
            assert!(odd_parity(fixed), "0x{v:02X} -> 0x{fixed:02X}");
            assert_eq!(FIX_PARITY[fixed as usize], fixed);
        }
    }

    #[test]
    fn expanded_key_has_odd_parity_everywhere() {
        let samples: [[u8; 8]; 3] = [
            [0x00; 8],
            [0xFF; 8],
            [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0x00],
        ];
        for mut cw in samples {
            expand_des_key(&mut cw);
            for b in cw {
                assert!(odd_parity(b), "byte 0x{b:02X}");
            }
        }
    }

    #[test]
    fn expansion_keeps_all_56_key_bits() {
        // Flipping any compressed-key bit must flip exactly one of the
        // upper seven bits of some expanded byte.
        let base = [0xA5, 0x5A, 0x3C, 0xC3, 0x0F, 0xF0, 0x69, 0x00];
        let mut expanded_base = base;
        expand_des_key(&mut expanded_base);

        for byte in 0..7 {
            for bit in 0..8 {
                let mut cw = base;
                cw[byte] ^= 1 << bit;
                expand_des_key(&mut cw);

                let flipped: u32 = cw
                    .iter()
                    .zip(expanded_base.iter())
                    .map(|(a, b)| ((a ^ b) & 0xFE).count_ones())
                    .sum();
                assert_eq!(flipped, 1, "key bit {byte}/{bit} lost");
            }
        }
    }
}
