use serde::{Deserialize, Serialize};
use std::fmt;

/// Session used when the transport has not negotiated one yet.
pub const DEFAULT_SESSION_ID: SessionId = SessionId(0);

/// Identifier of the session a monitor guards. Assigned by the session
/// registry, never changed by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u8);

impl SessionId {
    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        DEFAULT_SESSION_ID
    }
}

impl From<u8> for SessionId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
