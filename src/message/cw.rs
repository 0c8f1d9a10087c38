//! Stream classes and control-word synthesis.
//!
//! A PowerVu service multiplexes up to eight scrambled elementary streams,
//! each keyed separately: video, high-speed data, four audio tracks, a
//! utility stream and VBI. The CW-carrying nano holds one 4-byte seed base
//! and one 7-byte base CW; everything class-specific is folded in through a
//! per-class IV, seed length and marker byte.

use crate::crypto::{block, des, hash, sbox};
use crate::error::{Error, Result};

/// The eight descrambled stream classes, in CW-bundle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamClass {
    /// Video.
    Vid = 0,
    /// High-speed data.
    Hsd = 1,
    /// Audio tracks 1-4.
    A1 = 2,
    A2 = 3,
    A3 = 4,
    A4 = 5,
    /// Utility stream.
    Utl = 6,
    /// Vertical blanking interval.
    Vbi = 7,
}

impl StreamClass {
    /// All classes, in bundle order.
    pub const ALL: [StreamClass; 8] = [
        StreamClass::Vid,
        StreamClass::Hsd,
        StreamClass::A1,
        StreamClass::A2,
        StreamClass::A3,
        StreamClass::A4,
        StreamClass::Utl,
        StreamClass::Vbi,
    ];

    /// Map a convolved-CW nano tag to its class. Unknown tags fall back to
    /// VBI.
    pub(crate) fn from_convcw_tag(tag: u8) -> StreamClass {
        match tag {
            0x80 => StreamClass::Vid,
            0x40 => StreamClass::Hsd,
            0x20 => StreamClass::A1,
            0x10 => StreamClass::A2,
            0x08 => StreamClass::A3,
            0x04 => StreamClass::A4,
            0x02 => StreamClass::Utl,
            _ => StreamClass::Vbi,
        }
    }

    /// Seed IV: class-specific bits of the nano body (`body` starts 23
    /// bytes into the nano) tagged with a class constant in the low bits.
    fn seed_iv(self, body: &[u8]) -> u16 {
        match self {
            StreamClass::Vid => (u16::from(body[0x10] & 0x1F) << 3) | 0,
            StreamClass::Hsd => (u16::from(body[0x12] & 0x1F) << 3) | 2,
            StreamClass::A1 => (u16::from(body[0x11] & 0x3F) << 3) | 1,
            StreamClass::A2 => (u16::from(body[0x13] & 0x3F) << 3) | 1,
            StreamClass::A3 => (u16::from(body[0x19] & 0x3F) << 3) | 1,
            StreamClass::A4 => (u16::from(body[0x1A] & 0x3F) << 3) | 1,
            StreamClass::Utl => (u16::from(body[0x14] & 0x0F) << 3) | 4,
            StreamClass::Vbi => (u16::from((body[0x15] & 0xF8) >> 3) << 3) | 5,
        }
    }

    /// Length of the class seed in bytes.
    fn seed_len(self) -> usize {
        match self {
            StreamClass::Vid | StreamClass::Hsd => 4,
            StreamClass::A1 | StreamClass::A2 | StreamClass::A3 | StreamClass::A4 => 3,
            StreamClass::Utl | StreamClass::Vbi => 2,
        }
    }

    /// Marker byte injected into the masked CW derivation input.
    fn marker(self) -> u8 {
        match self {
            StreamClass::Vid => 0,
            StreamClass::A1 | StreamClass::A2 | StreamClass::A3 | StreamClass::A4 => 1,
            StreamClass::Hsd => 2,
            StreamClass::Utl => 4,
            StreamClass::Vbi => 5,
        }
    }
}

/// Which classes an ECM decode should derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CwScope {
    /// Only the video CW (enough to fill the descrambler register pair).
    #[default]
    VideoOnly,
    /// All eight classes (audio/data/extended sinks attached).
    AllClasses,
}

/// One ECM's worth of derived control words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CwSet {
    cws: [[u8; 8]; 8],
    /// CSA descrambling (true) or DES (false).
    pub csa_used: bool,
    /// Even-parity ECM (`ecm[0] == 0x80`).
    pub even: bool,
    /// Classes actually derived; the others are zero.
    pub scope: CwScope,
}

impl CwSet {
    pub(crate) fn new(cws: [[u8; 8]; 8], csa_used: bool, even: bool, scope: CwScope) -> Self {
        CwSet {
            cws,
            csa_used,
            even,
            scope,
        }
    }

    /// CW of one stream class.
    pub fn cw(&self, class: StreamClass) -> &[u8; 8] {
        &self.cws[class as usize]
    }

    /// All eight CWs in bundle order.
    pub fn cws(&self) -> &[[u8; 8]; 8] {
        &self.cws
    }

    /// The video CW laid out for an even/odd descrambler register pair:
    /// bytes 0..8 for an even ECM, 8..16 for odd.
    pub fn dw(&self) -> [u8; 16] {
        let mut dw = [0u8; 16];
        let half = if self.even { 0 } else { 8 };
        dw[half..half + 8].copy_from_slice(&self.cws[StreamClass::Vid as usize]);
        dw
    }
}

/// Derive one class seed: pack the seed IV and the 4-byte seed base into
/// six bytes, decrypt them with the ECM key, and collapse the 2-bit
/// alignment. `nano` starts at the CW nano body; `key` is consumed.
pub(crate) fn calculate_seed(
    class: StreamClass,
    nano: &[u8],
    seed_base: &[u8; 4],
    key: &mut [u8; 7],
    bank: u8,
) -> [u8; 8] {
    let iv = class.seed_iv(&nano[23..]);

    let mut seed = [0u8; 8];
    seed[0] = (iv >> 2) as u8;
    seed[1] = (((iv & 0x3) as u8) << 6) | (seed_base[0] >> 2);
    seed[2] = (seed_base[0] << 6) | (seed_base[1] >> 2);
    seed[3] = (seed_base[1] << 6) | (seed_base[2] >> 2);
    seed[4] = (seed_base[2] << 6) | (seed_base[3] >> 2);
    seed[5] = seed_base[3] << 6;

    sbox::decrypt(&mut seed[..6], key, bank);

    seed[0] = (seed[1] << 2) | (seed[2] >> 6);
    seed[1] = (seed[2] << 2) | (seed[3] >> 6);
    seed[2] = (seed[3] << 2) | (seed[4] >> 6);
    seed[3] = (seed[4] << 2) | (seed[5] >> 6);
    seed
}

/// Repeat the class seed cyclically up to 7 bytes; returns the seed length.
fn expand_seed(class: StreamClass, seed: &mut [u8; 8]) -> usize {
    let len = class.seed_len();
    for i in len..7 {
        seed[i] = seed[i % len];
    }
    len
}

/// Assemble the masked-path CW derivation input:
/// seed ‖ base CW ‖ marker ‖ seed-CW bytes.
fn create_data_cw(
    seed: &[u8],
    base_cw: &[u8; 7],
    val: u8,
    seed_ecm_cw: &[u8; 16],
) -> ([u8; 64], usize) {
    let mut data = [0u8; 64];
    let len = seed.len();

    data[..len].copy_from_slice(seed);
    data[len..len + 7].copy_from_slice(base_cw);
    data[len + 7] = val;
    data[len + 8..len + 24].copy_from_slice(seed_ecm_cw);

    (data, len + 24)
}

/// Masked-path CW bytes picked from the mode-03 block output.
const MODE03_CW_PICK: [usize; 8] = [0x09, 0x01, 0x0F, 0x0E, 0x04, 0x02, 0x05, 0x0D];

/// Build one CW on the masked path and enforce its key discipline (DES
/// parity or CSA checksum).
#[allow(clippy::too_many_arguments)]
fn create_cw(
    seed: &[u8],
    base_cw: &[u8; 7],
    val: u8,
    seed_ecm_cw: &[u8; 16],
    csa_used: bool,
    hash_mode: u8,
    mode_cw: u8,
    ecm_body: &[u8],
) -> Result<[u8; 8]> {
    let mut cw = [0u8; 8];

    if mode_cw == 0x03 {
        if ecm_body.len() < 0x12 {
            return Err(Error::NotSupported);
        }
        let data = block::create_data_cw_mode03(seed, base_cw, val, ecm_body);
        let h = block::create_hash_mode03(&data);
        for (k, &pick) in MODE03_CW_PICK.iter().enumerate() {
            cw[k] = h[pick];
        }
    } else if mode_cw == 0x04 {
        // CW bytes stay clear; only the parity/checksum discipline applies.
    } else {
        let (data, len) = create_data_cw(seed, base_cw, val, seed_ecm_cw);
        let h = hash::create_hash(&data[..len], hash_mode)?;
        cw.copy_from_slice(&h[..8]);
    }

    if csa_used {
        cw[3] = cw[0].wrapping_add(cw[1]).wrapping_add(cw[2]);
        cw[7] = cw[4].wrapping_add(cw[5]).wrapping_add(cw[6]);
    } else {
        des::fix_parity(&mut cw);
    }

    Ok(cw)
}

/// Parameters shared by every class of one ECM's CW derivation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CwParams {
    pub csa_used: bool,
    pub xor_mode: u8,
    pub hash_mode_cw: u8,
    pub mode_cw: u8,
    pub needs_unmasking: bool,
}

impl CwParams {
    /// The masked derivation path applies when the ECM arrived masked and
    /// either a usable CW hash mode or mask mode 3/4 is in effect.
    fn masked_path(&self) -> bool {
        let usable_hash = self.hash_mode_cw > 0
            && self.hash_mode_cw <= 0x27
            && !(0x0B..=0x0E).contains(&self.hash_mode_cw);
        self.needs_unmasking && (usable_hash || self.mode_cw == 0x03 || self.mode_cw == 0x04)
    }
}

/// Derive the CW of one stream class from its expanded seed.
pub(crate) fn calculate_cw(
    class: StreamClass,
    seed: &mut [u8; 8],
    convolved_cw: &[u8; 8],
    base_cw: &[u8; 7],
    seed_ecm_cw: &[u8; 16],
    params: &CwParams,
    ecm_body: &[u8],
) -> Result<[u8; 8]> {
    let seed_len = expand_seed(class, seed);
    let mut cw = [0u8; 8];

    if params.masked_path() {
        cw = create_cw(
            &seed[..seed_len],
            base_cw,
            class.marker(),
            seed_ecm_cw,
            params.csa_used,
            params.hash_mode_cw,
            params.mode_cw,
            ecm_body,
        )?;

        if params.csa_used {
            for (c, &m) in cw.iter_mut().zip(convolved_cw.iter()) {
                *c ^= m;
            }
            cw[3] = cw[0].wrapping_add(cw[1]).wrapping_add(cw[2]);
            cw[7] = cw[4].wrapping_add(cw[5]).wrapping_add(cw[6]);
        }
    } else if params.csa_used {
        for k in 0..7 {
            seed[k] ^= base_cw[k];
        }
        // Seed byte 3 feeds both halves; its slot in each half is the
        // checksum byte.
        cw[0] = seed[0] ^ convolved_cw[0];
        cw[1] = seed[1] ^ convolved_cw[1];
        cw[2] = seed[2] ^ convolved_cw[2];
        cw[3] = seed[3] ^ convolved_cw[3];
        cw[4] = seed[3] ^ convolved_cw[4];
        cw[5] = seed[4] ^ convolved_cw[5];
        cw[6] = seed[5] ^ convolved_cw[6];
        cw[7] = seed[6] ^ convolved_cw[7];
    } else {
        match params.xor_mode {
            0 => {
                for k in 0..7 {
                    cw[k] = seed[k] ^ base_cw[k];
                }
            }
            _ => {
                for k in 0..3 {
                    cw[k] = seed[k] ^ base_cw[k];
                }
                cw[3..7].copy_from_slice(&base_cw[3..7]);
            }
        }
        des::expand_des_key(&mut cw);
    }

    Ok(cw)
}
