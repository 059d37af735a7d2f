//! Maps `Box<dyn Error>` from collaborator seams to typed `StationError`.
//!
//! The traits in `refill_traits` use `Box<dyn Error + Send + Sync>` so any
//! transport can plug in; this module converts those to our typed errors,
//! with an optional feature-gated path for `refill_hardware::HwError`
//! downcasting.

use crate::error::StationError;

/// How a failed tag poll should be treated by the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderFault {
    /// The tag source is gone for good (end of input, device removed).
    Closed,
    /// Transient failure; keep polling.
    Transient(String),
}

/// Map a per-block read failure to `BlockAuthFailed` / `BlockReadFailed`.
pub fn map_block_error(e: &(dyn std::error::Error + 'static), block: u8) -> StationError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<refill_hardware::error::HwError>() {
            return match hw {
                refill_hardware::error::HwError::BlockAuth(b) => {
                    StationError::BlockAuthFailed { block: *b }
                }
                refill_hardware::error::HwError::BlockRead(b) => {
                    StationError::BlockReadFailed { block: *b }
                }
                _ => StationError::BlockReadFailed { block },
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string().to_lowercase();
    if s.contains("auth") {
        StationError::BlockAuthFailed { block }
    } else {
        StationError::BlockReadFailed { block }
    }
}

/// Classify a failed `poll_for_tag`.
pub fn classify_reader_error(e: &(dyn std::error::Error + 'static)) -> ReaderFault {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(refill_hardware::error::HwError::Closed) =
            e.downcast_ref::<refill_hardware::error::HwError>()
        {
            return ReaderFault::Closed;
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("closed") {
        ReaderFault::Closed
    } else {
        ReaderFault::Transient(s)
    }
}

/// Map an output driver failure.
pub fn map_output_error(e: &(dyn std::error::Error + 'static), output: &str) -> StationError {
    StationError::Hardware(format!("output {output}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_fallback_distinguishes_auth_from_read() {
        let auth = std::io::Error::other("Authentication error");
        let read = std::io::Error::other("no response");
        assert_eq!(
            map_block_error(&auth, 5),
            StationError::BlockAuthFailed { block: 5 }
        );
        assert_eq!(
            map_block_error(&read, 5),
            StationError::BlockReadFailed { block: 5 }
        );
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn typed_hw_errors_map_precisely() {
        use refill_hardware::error::HwError;
        assert_eq!(
            map_block_error(&HwError::BlockAuth(9), 9),
            StationError::BlockAuthFailed { block: 9 }
        );
        assert_eq!(classify_reader_error(&HwError::Closed), ReaderFault::Closed);
        assert!(matches!(
            classify_reader_error(&HwError::Gpio("i2c nack".into())),
            ReaderFault::Transient(_)
        ));
    }
}
