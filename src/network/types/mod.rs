//! Driver-level enumerations and constants shared by every component.

pub mod flags;
pub mod layer;
pub mod param;

pub use flags::{AddressFlags, ChecksumFlags, OpenFlags};
pub use layer::{Event, Layer, ShutdownMode};
pub use param::{Param, Version, BATCH_MAX, MTU_MAX};
