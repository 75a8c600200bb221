pub mod error;
pub mod zset;
mod test;

pub use error::ZSetError;
pub use zset::{AddFlags, AddOutcome, ZSet};
