//! Error types for channel operations.

use thiserror::Error;

/// Convenience alias for channel results.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Error type for channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// IO error from the OS (open, truncate, mmap, msync, unlink).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Attach was called on an endpoint that is already attached.
    #[error("in use")]
    InUse,

    /// The backing file reports a protocol version this build does not speak.
    #[error("unexpected version {major}.{minor}")]
    UnexpectedVersion {
        /// Major version found in the file.
        major: u8,
        /// Minor version found in the file.
        minor: u8,
    },

    /// The Master has not finished initializing the region.
    #[error("flags not initialized")]
    FlagsNotInitialized,

    /// The configuration block could not be read or is inconsistent.
    #[error("init config block mishap: {message}")]
    ConfigBlock {
        /// Error message.
        message: String,
    },

    /// Operation on a detached endpoint.
    #[error("not initialized")]
    NotInitialized,

    /// Write payload exceeds the maximum packet length.
    #[error("packet too big: {size} bytes exceeds maximum {max} bytes")]
    TooBig {
        /// Actual payload size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Read buffer is smaller than the next pending packet.
    #[error("short destination buffer: next packet is {need} bytes, buffer holds {got}")]
    ShortBuffer {
        /// Length of the pending packet.
        need: usize,
        /// Length of the buffer supplied by the caller.
        got: usize,
    },
}

impl ChannelError {
    /// Creates a config block error.
    pub fn config_block(message: impl Into<String>) -> Self {
        Self::ConfigBlock {
            message: message.into(),
        }
    }

    /// Creates a too-big error.
    pub fn too_big(size: usize, max: usize) -> Self {
        Self::TooBig { size, max }
    }

    /// Creates a short buffer error.
    pub fn short_buffer(need: usize, got: usize) -> Self {
        Self::ShortBuffer { need, got }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_use_display() {
        let err = ChannelError::InUse;
        assert_eq!(err.to_string(), "in use");

        let err = ChannelError::NotInitialized;
        assert_eq!(err.to_string(), "not initialized");

        let err = ChannelError::FlagsNotInitialized;
        assert_eq!(err.to_string(), "flags not initialized");
    }

    #[test]
    fn test_unexpected_version_display() {
        let err = ChannelError::UnexpectedVersion { major: 2, minor: 7 };
        let msg = err.to_string();
        assert!(msg.contains("unexpected version"));
        assert!(msg.contains("2.7"));
    }

    #[test]
    fn test_too_big_error() {
        let err = ChannelError::too_big(100000, 65553);
        let msg = err.to_string();
        assert!(msg.contains("100000"));
        assert!(msg.contains("65553"));
        assert!(msg.contains("too big"));
    }

    #[test]
    fn test_short_buffer_error() {
        let err = ChannelError::short_buffer(44, 10);
        let msg = err.to_string();
        assert!(msg.contains("44"));
        assert!(msg.contains("10"));
        assert!(msg.contains("short destination buffer"));
    }

    #[test]
    fn test_config_block_error() {
        let err = ChannelError::config_block("short read of config header");
        let msg = err.to_string();
        assert!(msg.contains("init config block mishap"));
        assert!(msg.contains("short read"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ChannelError = io_err.into();
        let msg = err.to_string();
        assert!(msg.contains("IO error"));
    }
}
