//! Host environment configuration: the `ULTRASND`/`ULTRADIR` variables the
//! DOS-side shell sets before handing control to a GUS-aware program (§6
//! "Environment").

use std::env;
use std::path::PathBuf;

use tracing::debug;

use crate::error::Error;

/// Parsed `ULTRASND=<port(hex)>,<dma1>,<dma2>,<irq1>,<irq2>` plus the
/// `ULTRADIR` path, if present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GusConfig {
    pub port: u16,
    pub dma1: u8,
    pub dma2: u8,
    pub irq1: u8,
    pub irq2: u8,
    pub ultradir: Option<PathBuf>,
}

impl GusConfig {
    /// Read and parse `ULTRASND`/`ULTRADIR` from the process environment.
    /// Returns `Ok(None)` if `ULTRASND` is simply unset (a perfectly normal
    /// case when no GUS-aware program has been launched yet).
    pub fn from_env() -> Result<Option<Self>, Error> {
        let Ok(ultrasnd) = env::var("ULTRASND") else {
            return Ok(None);
        };
        let ultradir = env::var("ULTRADIR").ok().map(PathBuf::from);
        Self::parse(&ultrasnd, ultradir).map(Some)
    }

    pub fn parse(ultrasnd: &str, ultradir: Option<PathBuf>) -> Result<Self, Error> {
        let fields: Vec<&str> = ultrasnd.split(',').collect();
        let [port, dma1, dma2, irq1, irq2] = fields.as_slice() else {
            return Err(Error::MalformedUltrasnd { value: ultrasnd.to_string() });
        };

        let port = u16::from_str_radix(port, 16).map_err(|_| Error::InvalidField {
            field: "port",
            value: port.to_string(),
        })?;
        let dma1 = parse_decimal("dma1", dma1)?;
        let dma2 = parse_decimal("dma2", dma2)?;
        let irq1 = parse_decimal("irq1", irq1)?;
        let irq2 = parse_decimal("irq2", irq2)?;

        debug!(port, dma1, dma2, irq1, irq2, "parsed ULTRASND");
        Ok(Self { port, dma1, dma2, irq1, irq2, ultradir })
    }
}

fn parse_decimal(field: &'static str, value: &str) -> Result<u8, Error> {
    value.parse::<u8>().map_err(|_| Error::InvalidField {
        field,
        value: value.to_string(),
    })
}
