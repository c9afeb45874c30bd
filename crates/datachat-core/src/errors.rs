/// Core error type for the assistant.
///
/// `EmptyInput`, `EngineBusy` and `SessionClosed` are rejections reported at the
/// `submit` call site; the caller keeps its input and may retry. `InvalidMessage`
/// guards the transcript store and should never reach an end user.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("message is empty")]
    EmptyInput,

    #[error("assistant is still composing a reply")]
    EngineBusy,

    #[error("session is closed")]
    SessionClosed,

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for rejections the caller can recover from by fixing the input or
    /// retrying once the current turn completes.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::EmptyInput | Error::EngineBusy)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_submit_rejections_are_recoverable() {
        assert!(Error::EmptyInput.is_recoverable());
        assert!(Error::EngineBusy.is_recoverable());
        assert!(!Error::SessionClosed.is_recoverable());
        assert!(!Error::InvalidMessage("x".to_string()).is_recoverable());
        assert!(!Error::Config("x".to_string()).is_recoverable());
    }
}
