//! Client/server replication of manipulation sessions.

mod coordinator;
mod poll;
mod protocol;

pub use coordinator::{ReplicatedSession, Role};
pub use poll::{PollTask, PollTick};
pub use protocol::{Broadcast, Envelope, Outgoing, ProtocolError, ProtocolResult, Request};
