use core::fmt::{self, Display, Formatter};

/// Reply codes used by the capture server.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
pub enum Status {
    ServiceReady = 220,
    GoodBye = 221,
    AuthSuccessful = 235,
    Ok = 250,
    AuthContinue = 334,
    StartMailInput = 354,
    Unavailable = 421,
    ActionUnavailable = 451,
    InsufficientStorage = 452,
    SyntaxError = 500,
    ParameterError = 501,
    NotImplemented = 502,
    InvalidCommandSequence = 503,
    ParameterNotImplemented = 504,
    AuthRequired = 530,
    AuthFailed = 535,
    EncryptionRequired = 538,
    ExceededStorage = 552,
}

impl Status {
    /// Checks if the status is a permanent rejection
    pub const fn is_permanent(self) -> bool {
        self as u32 >= 500
    }

    /// Checks if the status is a temporary rejection
    pub const fn is_temporary(self) -> bool {
        let code = self as u32;
        code >= 400 && code < 500
    }
}

impl From<Status> for u32 {
    fn from(value: Status) -> Self {
        value as Self
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u32::from(*self))
    }
}
