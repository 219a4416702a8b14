//! Heap configuration parameters.

use ember_core::layout::WORD_SIZE;

/// Configuration for the heap and collector.
///
/// # Example
///
/// ```ignore
/// use ember_gc::HeapConfig;
///
/// // Small pages for GC-heavy test workloads
/// let config = HeapConfig {
///     page_size: 64 * 1024,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct HeapConfig {
    /// Default page size for both spaces, in bytes.
    ///
    /// Oversized allocations get a page of their own, rounded up to a
    /// multiple of this.
    ///
    /// Default: 1MB
    pub page_size: usize,

    /// Generation at which a surviving object is promoted to old space.
    ///
    /// Old-tenured allocations start at this generation so that space
    /// membership reduces to a generation compare.
    ///
    /// Default: 5
    pub tenure_threshold: u32,

    /// Print a one-line summary of each collection cycle to stderr.
    ///
    /// Default: false
    pub trace: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            page_size: 1024 * 1024,
            tenure_threshold: 5,
            trace: false,
        }
    }
}

impl HeapConfig {
    /// Configuration for memory-constrained embeddings.
    pub fn low_memory() -> Self {
        Self {
            page_size: 64 * 1024,
            ..Default::default()
        }
    }

    /// Configuration for allocation-heavy batch workloads.
    pub fn high_throughput() -> Self {
        Self {
            page_size: 4 * 1024 * 1024,
            tenure_threshold: 8,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size < 1024 {
            return Err(ConfigError::PageTooSmall);
        }
        if self.page_size % WORD_SIZE != 0 {
            return Err(ConfigError::PageNotWordAligned);
        }
        if self.tenure_threshold == 0 {
            return Err(ConfigError::InvalidTenureThreshold);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Page size is too small (minimum 1KB).
    PageTooSmall,
    /// Page size must be a multiple of the word size.
    PageNotWordAligned,
    /// Tenure threshold must be at least 1.
    InvalidTenureThreshold,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::PageTooSmall => write!(f, "page size must be at least 1KB"),
            ConfigError::PageNotWordAligned => {
                write!(f, "page size must be a multiple of {} bytes", WORD_SIZE)
            }
            ConfigError::InvalidTenureThreshold => {
                write!(f, "tenure threshold must be at least 1")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
