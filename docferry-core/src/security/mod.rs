//! Credential protection.
//!
//! Credentials are held in `Zeroizing` containers and are only exposed to
//! the connection profile when a URI is assembled.

mod credentials;

pub use credentials::Credentials;
