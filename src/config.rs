//! Codec configuration

use crate::sol::{DEFAULT_SOL_VERSION, MIN_SOL_VERSION};

/// Default nesting limit for decode and encode
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Default encoder buffer pre-allocation
pub const DEFAULT_INITIAL_CAPACITY: usize = 4 * 1024;

/// Options shared by the decoder and encoder
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Maximum nesting depth of composite values
    pub max_depth: usize,

    /// Version written into SOL headers (never below 3)
    pub sol_version: u32,

    /// Reject SOL files whose declared size disagrees with the body length
    pub verify_declared_size: bool,

    /// Initial capacity of the encoder output buffer
    pub initial_capacity: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            sol_version: DEFAULT_SOL_VERSION,
            verify_declared_size: false, // The original runtime never checks it
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }
}

impl CodecConfig {
    /// Set maximum nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    /// Set the version written into SOL headers
    pub fn sol_version(mut self, version: u32) -> Self {
        self.sol_version = version.max(MIN_SOL_VERSION);
        self
    }

    /// Reject files whose declared size is wrong instead of logging it
    pub fn verify_declared_size(mut self) -> Self {
        self.verify_declared_size = true;
        self
    }

    /// Set encoder buffer pre-allocation
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}
