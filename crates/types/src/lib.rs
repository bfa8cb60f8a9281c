//! Document registry data model.
//!
//! Fixed-width identifiers ([`Fingerprint`], [`AccountId`]) with their text
//! encodings, and the [`DocumentRecord`] stored per registration.

pub mod address;
pub mod encoding;
pub mod fingerprint;
pub mod record;

pub use address::AccountId;
pub use encoding::{ParseError, ID_BYTES, ID_HEX_LENGTH};
pub use fingerprint::Fingerprint;
pub use record::DocumentRecord;
