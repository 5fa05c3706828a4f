use std::fmt;

#[derive(Debug)]
pub struct Error {
    msg: String,
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self { msg: msg.into() }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::msg(format!("http client error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why an outbound kiosk request did not yield a usable reply.
///
/// Each variant is handled where it occurs; none of them is fatal to the
/// kiosk process, only to the action or poll round that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
    /// Page data the action depends on was not embedded in the page.
    #[error("page data is missing {0}")]
    Configuration(&'static str),
    /// No response body was obtained at all.
    #[error("failed to reach server: {0}")]
    Transport(String),
    /// A response arrived but it was not the structure we expected.
    #[error("unexpected server reply (status {status}): {detail}")]
    Protocol { status: u16, detail: String },
}

impl Failure {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Failure::Configuration(_))
    }
}
