//! Coarse error taxonomy shared by the dataset and acquisition errors.

use std::fmt;

/// Broad class of a failure, used by callers that only need to decide how to
/// react (abort, report, skip) rather than inspect a concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid user-supplied configuration; reported before any I/O.
    Config,
    /// Input data is unusable (no complete frames, no jobs, bad arrays).
    Data,
    /// A queried date or position is absent from the index.
    Lookup,
    /// A timestamp string failed strict parsing.
    Parse,
    /// Filesystem or cache I/O failed.
    Io,
    /// A single remote retrieval failed.
    TransientFetch,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Config => "config",
            ErrorCategory::Data => "data",
            ErrorCategory::Lookup => "lookup",
            ErrorCategory::Parse => "parse",
            ErrorCategory::Io => "io",
            ErrorCategory::TransientFetch => "transient-fetch",
        };
        f.write_str(s)
    }
}
