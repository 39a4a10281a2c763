use serde::Serialize;

/// Device connectivity state.
///
/// States are ordered by capability: a [`ConnectionState::Session`] implies
/// a link, a [`ConnectionState::Link`] implies nothing about the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No link.
    None,
    /// Link present, no bus session.
    Link,
    /// Link present and bus session established.
    Session,
}

impl ConnectionState {
    /// Derives a [`ConnectionState`] from the current link and session
    /// status.
    ///
    /// No previous state is involved, so a session can never be reported
    /// once the link is gone, even if the session status has not caught up
    /// yet.
    #[must_use]
    pub const fn from_status(link_up: bool, session_up: bool) -> Self {
        if !link_up {
            Self::None
        } else if !session_up {
            Self::Link
        } else {
            Self::Session
        }
    }

    /// Whether a link is present.
    #[must_use]
    pub const fn has_link(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether a bus session is established.
    #[must_use]
    pub const fn has_session(self) -> bool {
        matches!(self, Self::Session)
    }

    const fn description(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Link => "link",
            Self::Session => "session",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.description().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState;

    #[test]
    fn link_down() {
        assert_eq!(
            ConnectionState::from_status(false, false),
            ConnectionState::None
        );
        // A stale session never outlives the link.
        assert_eq!(
            ConnectionState::from_status(false, true),
            ConnectionState::None
        );
    }

    #[test]
    fn link_up() {
        assert_eq!(
            ConnectionState::from_status(true, false),
            ConnectionState::Link
        );
        assert_eq!(
            ConnectionState::from_status(true, true),
            ConnectionState::Session
        );
    }

    #[test]
    fn ordering() {
        assert!(ConnectionState::None < ConnectionState::Link);
        assert!(ConnectionState::Link < ConnectionState::Session);

        assert!(!ConnectionState::None.has_link());
        assert!(ConnectionState::Link.has_link());
        assert!(!ConnectionState::Link.has_session());
        assert!(ConnectionState::Session.has_session());
    }
}
