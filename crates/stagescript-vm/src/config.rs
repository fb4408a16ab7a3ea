//! Machine configuration
//!
//! Limits and pool sizing for a [`crate::ScriptMachine`]. Configuration only
//! states the limits; the machine enforces them.

/// Machine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    /// Environments added to the pool each time it runs dry
    pub pool_chunk: usize,

    /// Environments allocated up front
    pub initial_environments: usize,

    /// Hard cap on live plus free environments. Running past it is treated
    /// as an allocation failure (fatal).
    pub max_environments: Option<usize>,

    /// Per-frame operand stack limit. Running past it is an ordinary fault.
    pub max_stack: Option<usize>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            pool_chunk: 1024,
            initial_environments: 1024,
            max_environments: None,
            max_stack: None,
        }
    }
}

impl MachineConfig {
    /// Create a new configuration with default limits
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool_chunk(mut self, chunk: usize) -> Self {
        self.pool_chunk = chunk.max(1);
        self
    }

    pub fn with_initial_environments(mut self, count: usize) -> Self {
        self.initial_environments = count;
        self
    }

    pub fn with_max_environments(mut self, max: usize) -> Self {
        self.max_environments = Some(max);
        self
    }

    pub fn with_max_stack(mut self, max: usize) -> Self {
        self.max_stack = Some(max);
        self
    }
}
