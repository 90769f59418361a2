//! Messages exchanged between participants and the authority.
//!
//! Requests travel from a participant to the authority, which validates and
//! executes them and answers with broadcasts that every participant applies.

use crate::domain::{Granularity, SpaceType, TransformationDomain, TransformationKind};
use crate::math::Transform;
use crate::scene::{NodeId, SessionId, TraceFilter};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),
    #[error("Rejected request: {0}")]
    Rejected(String),
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Participant to authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    TraceByFilter {
        start: Vec3,
        end: Vec3,
        #[serde(default)]
        filter: TraceFilter,
        append: bool,
    },
    SetDomain { domain: TransformationDomain },
    ClearDomain,
    ApplyDelta { transform: Transform },
    DeselectAll { destroy: bool },
    SetSpace { space: SpaceType },
    SetTransformationKind { kind: TransformationKind },
    SetGranularity { granularity: Granularity },
    SetRotateOnLocalAxis { enabled: bool },
    CloneSelected { select_new: bool, append: bool },
    /// Ask for the authoritative selection again.
    ResyncSelection,
}

impl Request {
    /// Reject requests carrying non-finite geometry.
    pub fn validate(&self) -> ProtocolResult<()> {
        match self {
            Request::TraceByFilter { start, end, .. } => {
                if !start.is_finite() || !end.is_finite() {
                    return Err(ProtocolError::Rejected("non-finite trace segment".into()));
                }
            }
            Request::ApplyDelta { transform } => {
                if !transform.is_finite() {
                    return Err(ProtocolError::Rejected("non-finite delta".into()));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Authority to every participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Broadcast {
    SetDomain { domain: TransformationDomain },
    ClearDomain,
    /// Canonical selection, in selection order.
    SetSelection { nodes: Vec<NodeId> },
    ApplyDelta { transform: Transform },
    DeselectAll { destroy: bool },
    SetSpace { space: SpaceType },
    SetTransformationKind { kind: TransformationKind },
    SetGranularity { granularity: Granularity },
    SetRotateOnLocalAxis { enabled: bool },
}

/// A message waiting to be sent by a [`super::ReplicatedSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// To the authority.
    Request(Request),
    /// From the authority to every participant.
    Broadcast(Broadcast),
}

/// A message tagged with the session it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<M> {
    pub session: SessionId,
    pub message: M,
}

impl<M: Serialize> Envelope<M> {
    pub fn new(session: SessionId, message: M) -> Self {
        Self { session, message }
    }

    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl<M: for<'de> Deserialize<'de>> Envelope<M> {
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
