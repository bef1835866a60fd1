use crate::core::uri::Uri;

/// The reason given when a session is closed with GOODBYE.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    #[default]
    Normal,
    SystemShutdown,
    CloseRealm,
    /// Sent in reply to a GOODBYE initiated by the other side.
    GoodbyeAndOut,
}

impl CloseReason {
    /// URI for the close reason.
    pub fn uri(&self) -> Uri {
        Uri::from_known(match self {
            Self::Normal => "wamp.close.normal",
            Self::SystemShutdown => "wamp.close.system_shutdown",
            Self::CloseRealm => "wamp.close.close_realm",
            Self::GoodbyeAndOut => "wamp.close.goodbye_and_out",
        })
    }

    /// Checks if the reason a router gave when echoing our GOODBYE is acceptable.
    pub fn accepts_echo(&self, echoed: &Uri) -> bool {
        echoed == &self.uri() || echoed == &Self::GoodbyeAndOut.uri()
    }
}

#[cfg(test)]
mod close_test {
    use crate::core::{
        close::CloseReason,
        uri::Uri,
    };

    #[test]
    fn accepts_own_reason_or_goodbye_and_out() {
        let reason = CloseReason::SystemShutdown;
        assert!(reason.accepts_echo(&Uri::try_from("wamp.close.system_shutdown").unwrap()));
        assert!(reason.accepts_echo(&Uri::try_from("wamp.close.goodbye_and_out").unwrap()));
        assert!(!reason.accepts_echo(&Uri::try_from("wamp.close.normal").unwrap()));
    }
}
