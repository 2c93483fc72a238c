//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `chatwire` application: the shared error
//! types and logging initialisation.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests {
    use super::error::ProtocolError;
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        // Should not panic
        logging::init("info");
        logging::init("debug");
        logging::init("not a level");
    }

    #[test]
    fn only_fatal_protocol_errors_carry_close_codes() {
        assert_eq!(
            ProtocolError::DuplicateOperation("1".into()).close_code(),
            None
        );
        assert_eq!(ProtocolError::NotAcknowledged.close_code(), Some(4401));
        assert_eq!(ProtocolError::AlreadyInitialised.close_code(), Some(4429));
        assert_eq!(ProtocolError::InvalidMessage.close_code(), Some(4400));
    }
}
