use crate::error::Result;

/// Desktop-host bridge that shows a session in a secondary, floating window.
pub trait FloatingDisplay: Send + Sync {
    /// `token` is an opaque credential handed through untouched.
    fn open_floating_display(&self, session_code: &str, token: &str) -> Result<()>;
}
