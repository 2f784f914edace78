/// Session changes the hosting application may react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new access token was obtained with the refresh token.
    Refreshed,
    /// The session is gone; the user has to sign in again.
    Terminated { reason: TerminationReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    RefreshFailed,
    LoggedOut,
    Unauthorized,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::RefreshFailed => write!(f, "refresh failed"),
            TerminationReason::LoggedOut => write!(f, "logged out"),
            TerminationReason::Unauthorized => write!(f, "unauthorized"),
        }
    }
}
