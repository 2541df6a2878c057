//! # dgram-core
//!
//! Platform-agnostic building blocks for the dgram crates.
//!
//! ## Modules
//!
//! - `bits` - Power-of-two rounding, alignment, bitfield scans
//! - `buf` - `Bin` (fixed capacity, truncating) and `Buf` (growable)
//! - `cursor` - Non-owning sequential reader over bytes
//! - `env` - Environment variable helpers

pub mod bits;
pub mod buf;
pub mod cursor;
pub mod env;

pub use buf::{Bin, Buf};
pub use cursor::Cursor;
pub use env::{env_get, env_get_bool, env_get_duration_ms, env_get_opt, env_is_set};
