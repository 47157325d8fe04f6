//! A dedicated error type for every failure mode the codec, transport,
//! resolver and agent can produce: I/O, DNS wire-format inconsistencies,
//! protocol-level conditions (timeout, truncation, missing resolvers).
use std::fmt;
use std::io;
use std::str;

#[derive(Debug)]
pub enum DnsError {
    /// Structural violation of the wire format: overlong label, cycling
    /// name pointer, a counter that claims more records than the buffer
    /// holds, a label length byte in the reserved 64..191 range.
    Malformed(String),
    /// TC=1 in a decoded message.
    Truncated,
    /// Buffer exhausted mid-field.
    UnexpectedEof,
    /// Encoded message would exceed the 512 octet UDP limit.
    TooLarge,
    /// A `receive` deadline elapsed.
    Timeout,
    /// The system resolver provider returned no addresses.
    NoResolver,
    /// Any unhandled OS-level socket error.
    Io(io::Error),
}

impl DnsError {
    pub fn malformed<S: Into<String>>(s: S) -> Self {
        DnsError::Malformed(s.into())
    }
}

/// A specific custom `Result` for all functions in this crate.
pub type DnsResult<T> = Result<T, DnsError>;

impl fmt::Display for DnsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsError::Malformed(msg) => write!(f, "malformed DNS message: {}", msg),
            DnsError::Truncated => write!(f, "message truncated (TC=1)"),
            DnsError::UnexpectedEof => write!(f, "unexpected end of buffer"),
            DnsError::TooLarge => write!(f, "encoded message exceeds 512 octets"),
            DnsError::Timeout => write!(f, "receive timed out"),
            DnsError::NoResolver => write!(f, "no system resolver available"),
            DnsError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for DnsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DnsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DnsError {
    fn from(err: io::Error) -> Self {
        // A timed-out read comes back from std/socket2 as WouldBlock or
        // TimedOut depending on platform; normalize both to our own
        // Timeout variant so callers never need to match on io::ErrorKind.
        // A cursor read running off the end of the buffer (byteorder's
        // `read_u16`/`read_exact` on a short slice) comes back as
        // `UnexpectedEof`; normalize that to our own variant too, so a
        // short buffer always surfaces the spec's dedicated error rather
        // than the generic `Io` catch-all. `InvalidData` is how the name
        // encoder signals a structural violation (an overlong label) that
        // it detects too late to return a `DnsError` directly, since
        // `ToFromNetworkOrder::to_network_bytes` returns `io::Result`.
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => DnsError::Timeout,
            io::ErrorKind::UnexpectedEof => DnsError::UnexpectedEof,
            io::ErrorKind::InvalidData => DnsError::Malformed(err.to_string()),
            _ => DnsError::Io(err),
        }
    }
}

impl From<str::Utf8Error> for DnsError {
    fn from(err: str::Utf8Error) -> Self {
        DnsError::Malformed(format!("invalid label bytes: {}", err))
    }
}
