use std::fmt;

/// Errors that can abort a consensus run.
#[derive(Debug)]
pub enum ConsensusError {
    /// A SAM data line could not be parsed.
    MalformedRecord { line: usize, reason: String },
    Io(std::io::Error),
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusError::MalformedRecord { line, reason } => {
                write!(f, "malformed SAM record at line {line}: {reason}")
            }
            ConsensusError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ConsensusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConsensusError::Io(e) => Some(e),
            ConsensusError::MalformedRecord { .. } => None,
        }
    }
}

impl From<std::io::Error> for ConsensusError {
    fn from(e: std::io::Error) -> Self {
        ConsensusError::Io(e)
    }
}

impl From<ConsensusError> for std::io::Error {
    fn from(e: ConsensusError) -> Self {
        match e {
            ConsensusError::Io(e) => e,
            other => std::io::Error::other(other.to_string()),
        }
    }
}
