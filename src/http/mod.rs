//! Minimal HTTP/1.1 support for the proxy.
//!
//! Only what forwarding needs lives here:
//!
//! - **`connection`**: per-connection state machine {Reading → Matching → Forwarding → Closed}
//! - **`parser`**: parses the request line and headers from a byte buffer
//! - **`request`**: parsed request-head representation
//! - **`response`**: locally generated responses (default handler, gateway errors)
//! - **`writer`**: serializes and writes responses to the client
//!
//! Proxied traffic deliberately bypasses the response types: upstream
//! response bytes are relayed to the client verbatim as they arrive, so
//! event streams flow through without buffering or re-serialization.

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
