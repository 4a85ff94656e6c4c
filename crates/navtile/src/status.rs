//! Status codes for navigation mesh operations
//!
//! A [`Status`] is a primary [`Outcome`] plus an independent set of
//! [`StatusDetail`] flags. Details combine freely, so a path search can report
//! `Success` with both `PARTIAL_RESULT` and `OUT_OF_NODES` set.

use std::fmt;

use bitflags::bitflags;

/// Result type for navigation mesh operations.
///
/// The error value always has a [`Outcome::Failure`] outcome.
pub type Result<T> = std::result::Result<T, Status>;

/// Primary outcome of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Operation completed
    Success,
    /// Operation failed
    Failure,
    /// Operation is still running and must be resumed
    InProgress,
}

bitflags! {
    /// Detail flags carried next to the primary outcome
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StatusDetail: u8 {
        /// The result is partial, e.g. the goal was not reached
        const PARTIAL_RESULT = 1 << 0;
        /// The output buffer was too small and the result was truncated
        const BUFFER_TOO_SMALL = 1 << 1;
        /// The search ran out of nodes
        const OUT_OF_NODES = 1 << 2;
        /// An input parameter was invalid
        const INVALID_PARAM = 1 << 3;
        /// A fixed-capacity pool was exhausted
        const OUT_OF_MEMORY = 1 << 4;
        /// A tile already occupies the requested location
        const ALREADY_OCCUPIED = 1 << 5;
    }
}

/// Tagged status of a navigation mesh operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status {
    /// Primary outcome
    pub outcome: Outcome,
    /// Detail flags
    pub details: StatusDetail,
}

impl Status {
    /// Plain success
    pub const SUCCESS: Status = Status::new(Outcome::Success, StatusDetail::empty());
    /// Plain failure
    pub const FAILURE: Status = Status::new(Outcome::Failure, StatusDetail::empty());
    /// Plain in-progress
    pub const IN_PROGRESS: Status = Status::new(Outcome::InProgress, StatusDetail::empty());

    /// Creates a status from an outcome and detail flags
    pub const fn new(outcome: Outcome, details: StatusDetail) -> Self {
        Self { outcome, details }
    }

    /// Success with the given details
    pub const fn success(details: StatusDetail) -> Self {
        Self::new(Outcome::Success, details)
    }

    /// Failure with the given details
    pub const fn failure(details: StatusDetail) -> Self {
        Self::new(Outcome::Failure, details)
    }

    /// `Failure | INVALID_PARAM`
    pub const fn invalid_param() -> Self {
        Self::failure(StatusDetail::INVALID_PARAM)
    }

    /// `Failure | OUT_OF_MEMORY`
    pub const fn out_of_memory() -> Self {
        Self::failure(StatusDetail::OUT_OF_MEMORY)
    }

    /// `Failure | ALREADY_OCCUPIED`
    pub const fn already_occupied() -> Self {
        Self::failure(StatusDetail::ALREADY_OCCUPIED)
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == Outcome::Failure
    }

    pub fn is_in_progress(&self) -> bool {
        self.outcome == Outcome::InProgress
    }

    /// Returns true if all of the given detail flags are set
    pub fn has_detail(&self, detail: StatusDetail) -> bool {
        self.details.contains(detail)
    }

    /// Same outcome with additional detail flags
    #[must_use]
    pub fn with_details(self, details: StatusDetail) -> Self {
        Self::new(self.outcome, self.details | details)
    }

    /// Same details with a different outcome
    #[must_use]
    pub fn with_outcome(self, outcome: Outcome) -> Self {
        Self::new(outcome, self.details)
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::SUCCESS
    }
}

impl std::ops::BitOr<StatusDetail> for Status {
    type Output = Status;

    fn bitor(self, rhs: StatusDetail) -> Status {
        self.with_details(rhs)
    }
}

impl std::ops::BitOrAssign<StatusDetail> for Status {
    fn bitor_assign(&mut self, rhs: StatusDetail) {
        self.details |= rhs;
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = match self.outcome {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::InProgress => "in progress",
        };
        f.write_str(outcome)?;
        for (name, _) in self.details.iter_names() {
            write!(f, " | {}", name.to_ascii_lowercase().replace('_', " "))?;
        }
        Ok(())
    }
}

impl std::error::Error for Status {}

impl From<navtile_common::Error> for Status {
    fn from(err: navtile_common::Error) -> Self {
        log::debug!("tile data rejected: {err}");
        Status::invalid_param()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_combine() {
        let mut status = Status::SUCCESS | StatusDetail::PARTIAL_RESULT;
        status |= StatusDetail::OUT_OF_NODES;

        assert!(status.is_success());
        assert!(status.has_detail(StatusDetail::PARTIAL_RESULT));
        assert!(status.has_detail(StatusDetail::OUT_OF_NODES));
        assert!(status.has_detail(StatusDetail::PARTIAL_RESULT | StatusDetail::OUT_OF_NODES));
        assert!(!status.has_detail(StatusDetail::BUFFER_TOO_SMALL));
    }

    #[test]
    fn test_outcome_change_keeps_details() {
        let status = Status::IN_PROGRESS | StatusDetail::OUT_OF_NODES;
        let done = status.with_outcome(Outcome::Success);
        assert!(done.is_success());
        assert!(done.has_detail(StatusDetail::OUT_OF_NODES));
    }

    #[test]
    fn test_display() {
        assert_eq!(Status::SUCCESS.to_string(), "success");
        assert_eq!(Status::invalid_param().to_string(), "failure | invalid param");
        let s = Status::SUCCESS | StatusDetail::PARTIAL_RESULT | StatusDetail::BUFFER_TOO_SMALL;
        assert_eq!(s.to_string(), "success | partial result | buffer too small");
    }

    #[test]
    fn test_from_common_error() {
        let status: Status = navtile_common::Error::InvalidMesh("empty".into()).into();
        assert!(status.is_failure());
        assert!(status.has_detail(StatusDetail::INVALID_PARAM));
    }
}
