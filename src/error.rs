//! Server errors.

use std::fmt;
use std::io;

/// A failure of the server itself, never of a request.
///
/// Requests always end in a [`Response`](crate::Response): a handler that
/// panics behind [`Recovery`](crate::middleware::recovery::Recovery) is
/// answered by the fallback handler. What is left is the socket layer, such
/// as an address that is already taken.
#[derive(Debug)]
pub struct Error(io::Error);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server socket: {}", self.0)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self(e)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn display_and_source_expose_the_io_error() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken"));
        assert_eq!(err.to_string(), "server socket: taken");
        assert!(err.source().is_some());
    }
}
