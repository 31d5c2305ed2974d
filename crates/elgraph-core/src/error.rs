use std::fmt;

use crate::id::ElementId;

/// Errors surfaced by the replicated set and state exchange layers.
///
/// Structural no-ops on the graph (adding a present node, removing an
/// absent edge) are not errors; those operations return `false`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A tombstone was requested for an element this replica never saw added.
    #[error("element {0} was never observed as added")]
    NotObserved(ElementId),

    /// A serialized [`GraphState`](crate::GraphState) could not be encoded or decoded.
    #[error("graph state encode/decode error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

impl Error {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotObserved(_) => ErrorCode::NotObserved,
            Self::Snapshot(_) => ErrorCode::SnapshotDecodeFailed,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    NotObserved,
    SnapshotDecodeFailed,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::NotObserved => "E2001",
            Self::SnapshotDecodeFailed => "E3001",
        }
    }

    /// Short human-facing summary for logs.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Replica config parse error",
            Self::NotObserved => "Element not observed as added",
            Self::SnapshotDecodeFailed => "Graph state could not be decoded",
        }
    }

    /// Optional remediation hint.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix the TOML syntax in the replica config and retry."),
            Self::NotObserved => {
                Some("Merge the state of the replica that added the element before removing it.")
            }
            Self::SnapshotDecodeFailed => {
                Some("Check that both replicas run compatible elgraph versions.")
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
