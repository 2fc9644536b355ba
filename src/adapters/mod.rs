pub mod credentials;
pub mod transport;

pub use credentials::{CachedTokenProvider, FreshToken, TokenSource};
pub use transport::{HttpTransport, RawResponse, Transport, TransportError};
