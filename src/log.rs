//! Verbosity-gated session logging on top of `tracing`.
//!
//! Sessions never print; they emit `tracing` events and the embedding
//! application decides where those go by installing a subscriber.

use std::fmt;

use bytes::Bytes;

use crate::config::Verbosity;

/// Logger bound to one session identity.
#[derive(Debug, Clone)]
pub(crate) struct SessionLog {
    identity: String,
    verbosity: Verbosity,
}

impl SessionLog {
    pub(crate) fn new(identity: &str, verbosity: Verbosity) -> Self {
        Self {
            identity: identity.to_string(),
            verbosity,
        }
    }

    /// Lifecycle event (verbosity >= 1).
    pub(crate) fn event(&self, args: fmt::Arguments<'_>) {
        if self.verbosity >= Verbosity::Lifecycle {
            tracing::info!(identity = %self.identity, "{}", args);
        }
    }

    /// Lifecycle event followed by a dump of `frames` (verbosity 2).
    pub(crate) fn message(&self, args: fmt::Arguments<'_>, frames: &[Bytes]) {
        self.event(args);
        if self.verbosity >= Verbosity::Frames {
            for (index, frame) in frames.iter().enumerate() {
                tracing::debug!(
                    identity = %self.identity,
                    frame = index,
                    "{}",
                    render_frame(frame)
                );
            }
        }
    }

    /// Protocol violations are logged regardless of verbosity.
    pub(crate) fn fault(&self, err: &dyn fmt::Display) {
        tracing::error!(identity = %self.identity, "{}", err);
    }
}

/// Render a frame for logs: printable ASCII as quoted text, anything else as hex.
pub(crate) fn render_frame(frame: &[u8]) -> String {
    if frame.iter().all(|b| (0x20..=0x7e).contains(b)) {
        format!("[{:03}] \"{}\"", frame.len(), String::from_utf8_lossy(frame))
    } else {
        let hex: String = frame.iter().map(|b| format!("{:02X}", b)).collect();
        format!("[{:03}] 0x{}", frame.len(), hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_text_frame() {
        assert_eq!(render_frame(b"MDPW01"), "[006] \"MDPW01\"");
        assert_eq!(render_frame(b""), "[000] \"\"");
    }

    #[test]
    fn test_render_binary_frame() {
        assert_eq!(render_frame(&[0x04]), "[001] 0x04");
        assert_eq!(render_frame(&[0xDE, 0xAD, 0x00]), "[003] 0xDEAD00");
    }

    #[test]
    fn test_logging_without_subscriber_is_harmless() {
        let log = SessionLog::new("w-1", Verbosity::Frames);
        log.message(
            format_args!("sending {}", "heartbeat"),
            &[Bytes::new(), Bytes::from_static(b"MDPW01")],
        );
        log.fault(&"bad frame");
    }
}
