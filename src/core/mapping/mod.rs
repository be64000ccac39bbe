// Resource identity mapping

pub mod canonical;
pub mod keys;
pub mod mapper;

pub use canonical::{CanonicalKey, CanonicalKeyBuilder, KeyError};
pub use mapper::IdentityMapper;
