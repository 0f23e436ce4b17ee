use crate::error::{DivertError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Maximum number of events transferred by one batch call.
pub const BATCH_MAX: usize = 0xff;

/// Maximum size of a single packet, including the driver's 40 byte allowance.
pub const MTU_MAX: usize = 40 + 0xffff;

pub const PRIORITY_DEFAULT: i16 = 0;
pub const PRIORITY_HIGHEST: i16 = 30000;
pub const PRIORITY_LOWEST: i16 = -30000;

pub const QUEUE_LENGTH_DEFAULT: u64 = 512;
pub const QUEUE_LENGTH_MIN: u64 = 32;
pub const QUEUE_LENGTH_MAX: u64 = 16384;
pub const QUEUE_TIME_DEFAULT: u64 = 2000;
pub const QUEUE_TIME_MIN: u64 = 100;
pub const QUEUE_TIME_MAX: u64 = 16000;
pub const QUEUE_SIZE_DEFAULT: u64 = 4194304;
pub const QUEUE_SIZE_MIN: u64 = 65535;
pub const QUEUE_SIZE_MAX: u64 = 33554432;

/// Driver versions this crate can talk to.
pub const SUPPORTED_VERSIONS: [(u64, u64); 3] = [(2, 0), (2, 1), (2, 2)];

/// Handle parameters readable (and partly writable) through the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Param {
    /// Maximum number of packets queued (packets)
    QueueLength = 0,
    /// Maximum time a packet stays queued (milliseconds)
    QueueTime = 1,
    /// Maximum bytes queued
    QueueSize = 2,
    VersionMajor = 3,
    VersionMinor = 4,
}

impl Param {
    /// Accepted values for writable parameters, `None` for read-only ones.
    pub fn range(self) -> Option<RangeInclusive<u64>> {
        match self {
            Param::QueueLength => Some(QUEUE_LENGTH_MIN..=QUEUE_LENGTH_MAX),
            Param::QueueTime => Some(QUEUE_TIME_MIN..=QUEUE_TIME_MAX),
            Param::QueueSize => Some(QUEUE_SIZE_MIN..=QUEUE_SIZE_MAX),
            Param::VersionMajor | Param::VersionMinor => None,
        }
    }

    /// The value a freshly opened handle starts with.
    pub fn default_value(self) -> u64 {
        match self {
            Param::QueueLength => QUEUE_LENGTH_DEFAULT,
            Param::QueueTime => QUEUE_TIME_DEFAULT,
            Param::QueueSize => QUEUE_SIZE_DEFAULT,
            Param::VersionMajor => 2,
            Param::VersionMinor => 2,
        }
    }

    /// Checks `value` against the parameter's bounds.
    pub fn validate(self, value: u64) -> Result<()> {
        match self.range() {
            Some(range) if range.contains(&value) => Ok(()),
            _ => Err(DivertError::InvalidParam { param: self, value }),
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Param::QueueLength => "QueueLength",
            Param::QueueTime => "QueueTime",
            Param::QueueSize => "QueueSize",
            Param::VersionMajor => "VersionMajor",
            Param::VersionMinor => "VersionMinor",
        };
        f.write_str(name)
    }
}

/// Driver version as reported by the version parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
}

impl Version {
    pub fn is_supported(&self) -> bool {
        SUPPORTED_VERSIONS.contains(&(self.major, self.minor))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
