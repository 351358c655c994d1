use ulid::Ulid;

use crate::model::Ms;

#[derive(Debug)]
pub enum EngineError {
    /// The requested window overlaps a confirmed booking.
    ConflictWithConfirmed(Ulid),
    /// An active provisional with an equal or larger party holds the window.
    HeldByLargerOrEqualParty { holder: Ulid, party_size: u32 },
    /// Legacy request overlaps an existing provisional booking.
    OverlapsExisting(Ulid),
    NotFound(Ulid),
    InvalidSpan { start: Ms, end: Ms },
    InvalidPartySize(u32),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Short stable label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::ConflictWithConfirmed(_) => "conflict_with_confirmed",
            EngineError::HeldByLargerOrEqualParty { .. } => "held_by_larger_or_equal_party",
            EngineError::OverlapsExisting(_) => "overlaps_existing",
            EngineError::NotFound(_) => "not_found",
            EngineError::InvalidSpan { .. } => "invalid_span",
            EngineError::InvalidPartySize(_) => "invalid_party_size",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal_error",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::ConflictWithConfirmed(id) => {
                write!(f, "requested time overlaps confirmed booking {id}")
            }
            EngineError::HeldByLargerOrEqualParty { holder, party_size } => write!(
                f,
                "requested time is provisionally held by booking {holder} (party of {party_size})"
            ),
            EngineError::OverlapsExisting(id) => {
                write!(f, "requested time overlaps existing booking {id}")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::InvalidSpan { start, end } => {
                write!(f, "invalid window [{start}, {end}): end must be after start")
            }
            EngineError::InvalidPartySize(n) => write!(f, "invalid party size {n}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::WalError(e.to_string())
    }
}
