pub mod dict;
pub mod error;
pub mod hash;
pub mod iter;
pub mod lib;
pub mod stats;

pub use dict::{Dict, DictEntry};
pub use error::HashError;
pub use iter::{DictIterator, IterState, RehashPause};
pub use lib::{DictResizeFlag, DictType};
