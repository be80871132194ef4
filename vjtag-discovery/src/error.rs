use std::{error::Error, fmt::Display};

/// Failure reported by the physical scan-chain engine when executing its
/// queue. Not recoverable at this layer; the engine's message is carried
/// verbatim.
#[derive(Debug)]
pub struct TransportError(String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> TransportError {
        TransportError(message.into())
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for TransportError {}

/// Errors that may occur while discovering the SLD topology or routing a
/// virtual-IR scan.
#[derive(Debug)]
pub enum DiscoveryError {
    /// A physical shift failed. `stage` names the protocol step that was in
    /// progress; the remaining steps were abandoned.
    Transport {
        stage: &'static str,
        source: TransportError,
    },
    /// Enumeration completed but no node carried the Virtual JTAG type tag.
    /// Discovery may be retried from scratch.
    NoVjtagFound { nodes_scanned: u8 },
    /// A virtual-IR scan was requested before any successful discovery.
    /// This is a caller contract violation; no shifts were issued.
    NotDiscovered,
}

impl Display for DiscoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryError::Transport { stage, source } => {
                write!(f, "transport failure during {}: {}", stage, source)
            }
            DiscoveryError::NoVjtagFound { nodes_scanned } => {
                write!(
                    f,
                    "no Virtual JTAG instance found among {} enumerated node(s)",
                    nodes_scanned
                )
            }
            DiscoveryError::NotDiscovered => {
                write!(f, "virtual IR scan requested before a successful discovery")
            }
        }
    }
}

impl Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DiscoveryError::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}
