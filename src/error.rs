use core::fmt;

/// Errors returned by the link stack.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Packet specified an invalid length value or was too short.
    ///
    /// The enclosing buffer cannot be walked past a packet with a bogus
    /// length field, so the remaining chain is discarded.
    InvalidLength,

    /// Invalid value supplied for field.
    InvalidValue,

    /// Unexpectedly reached EOF while reading or writing data.
    ///
    /// This is returned when composing a frame that does not fit into the
    /// destination buffer, and when reaching EOF prematurely while reading
    /// data from a buffer.
    Eof,

    /// A bounded table (interfaces, links, overrides) is full.
    Capacity,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::InvalidLength => "invalid length value specified",
            Error::InvalidValue => "invalid value for field",
            Error::Eof => "end of buffer",
            Error::Capacity => "table capacity exceeded",
        })
    }
}
