use std::collections::HashMap;

/// Status codes the proxy generates locally.
///
/// Proxied responses are relayed verbatim as bytes and never pass through
/// this type; it only covers the default handler and gateway errors:
/// - `Ok` (200): health/default responses
/// - `BadRequest` (400): malformed or unsupported client request
/// - `NotFound` (404): no proxy rule matched
/// - `BadGateway` (502): upstream unreachable or TLS failure
/// - `GatewayTimeout` (504): upstream connect timed out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    BadRequest,
    NotFound,
    InternalServerError,
    BadGateway,
    GatewayTimeout,
}

impl StatusCode {
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::InternalServerError => 500,
            StatusCode::BadGateway => 502,
            StatusCode::GatewayTimeout => 504,
        }
    }

    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::BadGateway => "Bad Gateway",
            StatusCode::GatewayTimeout => "Gateway Timeout",
        }
    }
}

/// A locally generated HTTP response ready to be serialized.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Builder for constructing responses in a fluent style.
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Builds the final Response, filling in Content-Length from the body
    /// if not already present.
    pub fn build(mut self) -> Response {
        self.headers
            .entry("Content-Length".to_string())
            .or_insert_with(|| self.body.len().to_string());

        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        ResponseBuilder::new(StatusCode::Ok)
            .body(body.into())
            .build()
    }

    pub fn bad_request(reason: &str) -> Self {
        ResponseBuilder::new(StatusCode::BadRequest)
            .header("Content-Type", "text/plain")
            .body(format!("400 Bad Request\r\n\r\n{}", reason).into_bytes())
            .build()
    }

    pub fn not_found() -> Self {
        ResponseBuilder::new(StatusCode::NotFound)
            .header("Content-Type", "text/plain")
            .body(b"404 Not Found".to_vec())
            .build()
    }

    pub fn bad_gateway() -> Self {
        ResponseBuilder::new(StatusCode::BadGateway)
            .header("Content-Type", "text/plain")
            .body(b"502 Bad Gateway\r\n\r\nFailed to connect to the upstream server.".to_vec())
            .build()
    }

    pub fn gateway_timeout() -> Self {
        ResponseBuilder::new(StatusCode::GatewayTimeout)
            .header("Content-Type", "text/plain")
            .body(b"504 Gateway Timeout\r\n\r\nThe upstream server did not respond in time.".to_vec())
            .build()
    }
}
