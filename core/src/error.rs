// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::types::WorkerId;

/// Error code carried by [`ProtocolError::BadParameter`]
pub const ERROR_BAD_PARAMETER: u16 = 10;

/// Wire-level protocol violations, fatal to the offending packet
///
/// These are local errors: the packet is rejected, the execution as a
/// whole continues. Upstream must resend or consider the connection
/// corrupt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Malformed packet payload (e.g. an odd element count where
    /// key/value pairing is positional)
    BadParameter(String),
}

impl ProtocolError {
    /// Fixed numeric code for monitoring/reporting consumers
    pub fn code(&self) -> u16 {
        match self {
            ProtocolError::BadParameter(_) => ERROR_BAD_PARAMETER,
        }
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::BadParameter(msg) => {
                write!(f, "bad parameter (code {}): {}", ERROR_BAD_PARAMETER, msg)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Failures surfaced to the conductor while driving an execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConductorError {
    /// A worker stopped answering mid-execution. This is the condition
    /// that triggers the compensation protocol, not a local retry.
    WorkerUnreachable(WorkerId),

    /// A partition was lost but the algorithm registered no
    /// compensation, so the execution cannot recover
    NoCompensation,

    /// Sent and received message totals never converged while draining
    DrainTimeout { sent: u64, received: u64 },

    /// A packet was rejected by a worker's cache
    Protocol(ProtocolError),
}

impl std::fmt::Display for ConductorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConductorError::WorkerUnreachable(id) => {
                write!(f, "worker {} is unreachable", id)
            }
            ConductorError::NoCompensation => {
                write!(f, "partition lost and the algorithm cannot compensate")
            }
            ConductorError::DrainTimeout { sent, received } => {
                write!(
                    f,
                    "in-flight messages never drained: sent {}, received {}",
                    sent, received
                )
            }
            ConductorError::Protocol(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ConductorError {}

impl From<ProtocolError> for ConductorError {
    fn from(e: ProtocolError) -> Self {
        ConductorError::Protocol(e)
    }
}
