pub mod config;
pub mod dict;
pub mod skiplist;
pub mod value;
pub mod zset;

pub use config::Config;
pub use value::Value;
pub use zset::{AddFlags, AddOutcome, ZSet, ZSetError};
