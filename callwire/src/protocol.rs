//! Protocol detection from the request's `Content-Type`.

use callwire_core::Encoding;
use http::HeaderMap;
use http::header::CONTENT_TYPE;

/// Protocol variant detected from an incoming HTTP request.
///
/// Determines the response content type, whether bodies are
/// envelope-framed, and the message encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestProtocol {
    /// Connect unary with JSON encoding (`application/json`)
    #[default]
    ConnectUnaryJson,

    /// Connect unary with protobuf encoding (`application/proto`)
    ConnectUnaryProto,

    /// Connect streaming with JSON encoding (`application/connect+json`)
    ConnectStreamJson,

    /// Connect streaming with protobuf encoding (`application/connect+proto`)
    ConnectStreamProto,

    /// Unsupported content type; such requests are rejected.
    Unknown,
}

impl RequestProtocol {
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("application/connect+proto") {
            Self::ConnectStreamProto
        } else if content_type.starts_with("application/connect+json") {
            Self::ConnectStreamJson
        } else if content_type.starts_with("application/proto") {
            Self::ConnectUnaryProto
        } else if content_type.starts_with("application/json") {
            Self::ConnectUnaryJson
        } else {
            Self::Unknown
        }
    }

    /// Detect the protocol from request headers; a missing header is `Unknown`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(Self::from_content_type)
            .unwrap_or(Self::Unknown)
    }

    /// Content type of successful responses (and of streaming error frames).
    pub fn response_content_type(&self) -> &'static str {
        match self {
            Self::ConnectUnaryJson | Self::Unknown => "application/json",
            Self::ConnectUnaryProto => "application/proto",
            Self::ConnectStreamJson => "application/connect+json",
            Self::ConnectStreamProto => "application/connect+proto",
        }
    }

    pub fn encoding(&self) -> Encoding {
        if self.is_proto() {
            Encoding::Proto
        } else {
            Encoding::Json
        }
    }

    pub fn is_proto(&self) -> bool {
        matches!(self, Self::ConnectUnaryProto | Self::ConnectStreamProto)
    }

    /// Whether request and response bodies are envelope-framed.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::ConnectStreamJson | Self::ConnectStreamProto)
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_from_content_type() {
        assert_eq!(
            RequestProtocol::from_content_type("application/json; charset=utf-8"),
            RequestProtocol::ConnectUnaryJson
        );
        assert_eq!(
            RequestProtocol::from_content_type("application/proto"),
            RequestProtocol::ConnectUnaryProto
        );
        assert_eq!(
            RequestProtocol::from_content_type("application/connect+json"),
            RequestProtocol::ConnectStreamJson
        );
        assert_eq!(
            RequestProtocol::from_content_type("application/connect+proto"),
            RequestProtocol::ConnectStreamProto
        );
        assert_eq!(
            RequestProtocol::from_content_type("text/plain"),
            RequestProtocol::Unknown
        );
    }

    #[test]
    fn test_from_headers_without_content_type() {
        assert_eq!(
            RequestProtocol::from_headers(&HeaderMap::new()),
            RequestProtocol::Unknown
        );

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/connect+proto"));
        let protocol = RequestProtocol::from_headers(&headers);
        assert!(protocol.is_streaming());
        assert_eq!(protocol.encoding(), Encoding::Proto);
    }
}
