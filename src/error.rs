use std::fmt;

/// Crate-wide error type for the few genuinely fallible, boundary-facing
/// operations. The register/port interface itself has no recoverable errors
/// (invalid host writes are clamped or ignored, per the hardware's own
/// behavior); this type exists for parsing host environment configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// `ULTRASND` did not have the expected `port,dma1,dma2,irq1,irq2` shape.
    MalformedUltrasnd { value: String },
    /// One field of `ULTRASND` was not a valid number in its expected radix.
    InvalidField { field: &'static str, value: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedUltrasnd { value } => {
                write!(
                    f,
                    "malformed ULTRASND value {value:?}, expected \"port,dma1,dma2,irq1,irq2\""
                )
            }
            Self::InvalidField { field, value } => {
                write!(f, "invalid {field} field: {value:?}")
            }
        }
    }
}

impl std::error::Error for Error {}
