//! **pvukit** - a Rust library implementing the PowerVu conditional-access
//! cryptographic core: ECM/EMM unmasking, control-word derivation and key
//! management for DES and DVB-CSA descrambling pipelines.
//!
//! # Modules
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`message::ecm`] | ECM unmasking, nano-TLV decoding, CW derivation |
//! | [`message::emm`] | EMM unmasking, ECM-key extraction and installation |
//! | [`message::cw`]  | Stream classes, seed derivation, CW synthesis |
//! | [`crypto`]       | Hash suite, mode-03 block, S-box stream cipher, DES keys |
//! | [`checksum`]     | CRC-8 and the Fletcher message CRC-32 |
//! | [`keys`]         | Mutex-guarded ECM/EMM key store |
//! | [`queue`]        | Delayed per-slot CW delivery for streaming sinks |
//!
//! Messages are decoded **in place**: the caller hands a mutable buffer to
//! [`message::ecm::decrypt_ecm`] or [`message::emm::process_emm`] and must
//! treat the buffer as scratch afterwards (clone first if the original
//! bytes are still needed). Derived control words come back as a
//! [`message::cw::CwSet`]; key material lives in a shared
//! [`keys::KeyStore`].

pub mod checksum;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod message;
pub mod queue;
pub mod utils;

pub use error::{Error, Result};
pub use keys::KeyStore;
pub use message::cw::{CwScope, CwSet, StreamClass};
