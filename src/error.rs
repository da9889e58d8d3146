//! Exit codes.

/// Process exit codes.
///
/// - 0: Completed (with or without duplicates, even if some files failed)
/// - 1: Fatal setup error (bad root, bad config, report not writable)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Run completed.
    Success = 0,
    /// A fatal error stopped the run.
    GeneralError = 1,
    /// Interrupted: the run was stopped by Ctrl+C.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix used in error lines.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DS000",
            Self::GeneralError => "DS001",
            Self::Interrupted => "DS130",
        }
    }
}
