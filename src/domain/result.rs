//! Crate-wide result alias

use super::errors::RelayError;

/// Result of any fallible relay operation outside the per-message pipeline
///
/// Pipeline stages report through [`ProcessingFailure`](super::ProcessingFailure)
/// instead, so a failed message never surfaces as an `Err` here.
///
/// ```rust
/// use hl7_relay::domain::{ChannelId, RelayError, Result};
///
/// fn parse_channel(text: &str) -> Result<ChannelId> {
///     text.parse()
///         .map_err(|_| RelayError::Configuration(format!("'{text}' is not a channel id")))
/// }
///
/// assert_eq!(parse_channel("7").unwrap(), ChannelId::new(7));
/// assert!(parse_channel("pas").is_err());
/// ```
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_attempt() -> Result<()> {
        Err(RelayError::State("Attempt 2 of message 7 not found".to_string()))
    }

    #[test]
    fn test_question_mark_propagates_relay_error() {
        fn outer() -> Result<u32> {
            missing_attempt()?;
            Ok(1)
        }
        assert!(matches!(outer(), Err(RelayError::State(_))));
    }
}
