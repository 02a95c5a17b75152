/// Initial capacity of the [`Writer`](crate::Writer) buffer.
pub const DEFAULT_WRITE_BUFFER: usize = 4096;

/// Frame size limit of the [`codec`](crate::codec) when none is configured, 1 MiB.
///
/// The codec buffers whole frames, so it is never unbounded.
pub const MAX_PAYLOAD_READ: u64 = 1024 * 1024;

/// Configuration shared by the [`Reader`](crate::Reader) and the [`Writer`](crate::Writer).
///
/// # Example
/// ```rust
/// use wswire::Options;
///
/// let options = Options::default()
///     .with_max_frame_size(1024 * 1024)
///     .with_utf8()
///     .with_fragment_size(16 * 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Maximum payload length of a single frame accepted by the reader.
    ///
    /// Frames declaring a larger payload are rejected before any of it is read.
    /// `None` means no limit.
    pub max_frame_size: Option<u64>,

    /// Validates text messages as UTF-8 while they are read.
    pub check_utf8: bool,

    /// Payload size at which the writer emits a fragment.
    ///
    /// Zero means unbounded: every message is sent as a single frame.
    pub fragment_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_frame_size: None,
            check_utf8: false,
            fragment_size: 0,
        }
    }
}

impl Options {
    /// Sets the maximum payload length of a single frame.
    pub fn with_max_frame_size(self, size: u64) -> Self {
        Self {
            max_frame_size: Some(size),
            ..self
        }
    }

    /// Removes the frame size limit.
    pub fn without_max_frame_size(self) -> Self {
        Self {
            max_frame_size: None,
            ..self
        }
    }

    /// Enables UTF-8 validation of text messages.
    pub fn with_utf8(self) -> Self {
        Self {
            check_utf8: true,
            ..self
        }
    }

    /// Sets the fragment size of the writer. Zero disables fragmentation.
    pub fn with_fragment_size(self, fragment_size: usize) -> Self {
        Self {
            fragment_size,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.max_frame_size, None);
        assert!(!options.check_utf8);
        assert_eq!(options.fragment_size, 0);
    }

    #[test]
    fn test_builders() {
        let options = Options::default()
            .with_max_frame_size(100)
            .with_utf8()
            .with_fragment_size(512);
        assert_eq!(options.max_frame_size, Some(100));
        assert!(options.check_utf8);
        assert_eq!(options.fragment_size, 512);

        assert_eq!(options.without_max_frame_size().max_frame_size, None);
    }
}
