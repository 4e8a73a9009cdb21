#![forbid(unsafe_code)]

pub mod hash;
pub mod types;
pub mod identity;
pub mod agreement;

pub mod codec;
pub mod framing;
pub mod utils;

#[cfg(test)]
mod proptests;

pub use types::{PeerId, SymmetricKey};
