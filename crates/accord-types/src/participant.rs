use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier of one network-connected contributor of patches.
///
/// Participant ids are short human-chosen names (`"player-2"`, `"east-node"`).
/// They must be non-empty, at most 64 bytes, and contain no control
/// characters, since they travel on the wire and appear in failure
/// broadcasts.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() || name.len() > 64 {
            return Err(TypeError::InvalidParticipantId(name));
        }
        if name.chars().any(|c| c.is_control()) {
            return Err(TypeError::InvalidParticipantId(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParticipantId({})", self.0)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names_accepted() {
        assert!(ParticipantId::new("player-2").is_ok());
        assert!(ParticipantId::new("east node 1").is_ok());
    }

    #[test]
    fn empty_rejected() {
        assert!(ParticipantId::new("").is_err());
    }

    #[test]
    fn control_chars_rejected() {
        assert!(ParticipantId::new("a\nb").is_err());
    }

    #[test]
    fn overlong_rejected() {
        assert!(ParticipantId::new("x".repeat(65)).is_err());
    }

    #[test]
    fn display_is_plain_name() {
        let id = ParticipantId::new("p1").unwrap();
        assert_eq!(format!("{id}"), "p1");
    }
}
