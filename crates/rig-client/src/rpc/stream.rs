//! Streaming connections and Connect envelope framing.
//!
//! Every streamed message travels in an envelope: one flag byte, a 4-byte
//! big-endian payload length, then the payload. The last envelope of a
//! response carries the end-of-stream flag and a JSON trailer that may hold
//! an error.

use std::collections::{HashMap, VecDeque};

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use super::error::WireError;
use super::{RpcError, Spec};

pub const FLAG_COMPRESSED: u8 = 0b0000_0001;
pub const FLAG_END_STREAM: u8 = 0b0000_0010;

const ENVELOPE_PREFIX_LEN: usize = 5;

pub(crate) const CONTENT_TYPE_STREAM_JSON: &str = "application/connect+json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub flags: u8,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn is_end_stream(&self) -> bool {
        self.flags & FLAG_END_STREAM != 0
    }
}

/// Length prefix for a payload of `len` bytes.
fn envelope_len(len: usize) -> Result<u32, RpcError> {
    u32::try_from(len).map_err(|_| RpcError::MessageTooLarge(len))
}

pub fn encode_envelope(flags: u8, payload: &[u8], out: &mut Vec<u8>) -> Result<(), RpcError> {
    let len = envelope_len(payload.len())?;
    out.reserve(ENVELOPE_PREFIX_LEN + payload.len());
    out.push(flags);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(())
}

pub fn decode_envelopes(mut buf: &[u8]) -> Result<Vec<Envelope>, RpcError> {
    let mut envelopes = Vec::new();
    while !buf.is_empty() {
        if buf.len() < ENVELOPE_PREFIX_LEN {
            return Err(RpcError::InvalidResponse(format!(
                "truncated envelope prefix ({} bytes)",
                buf.len()
            )));
        }
        let flags = buf[0];
        let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        let rest = &buf[ENVELOPE_PREFIX_LEN..];
        if rest.len() < len {
            return Err(RpcError::InvalidResponse(format!(
                "envelope declares {} bytes but only {} remain",
                len,
                rest.len()
            )));
        }
        envelopes.push(Envelope {
            flags,
            payload: rest[..len].to_vec(),
        });
        buf = &rest[len..];
    }
    Ok(envelopes)
}

#[derive(Debug, Default, Deserialize)]
struct EndStream {
    error: Option<WireError>,
    #[serde(default)]
    metadata: HashMap<String, Vec<String>>,
}

/// Messages and trailers collected from a finished stream.
#[derive(Debug)]
pub struct StreamResponse<T> {
    pub headers: HeaderMap,
    pub messages: Vec<T>,
    pub trailers: HashMap<String, Vec<String>>,
}

/// Outgoing streaming call.
///
/// Interceptors see the connection before any message is sent, so headers
/// they add travel with the request.
pub struct StreamingClientConn {
    spec: Spec,
    url: String,
    http: reqwest::Client,
    request_headers: HeaderMap,
    outgoing: Vec<u8>,
}

impl StreamingClientConn {
    pub(crate) fn new(spec: Spec, url: String, http: reqwest::Client) -> Self {
        let mut request_headers = HeaderMap::new();
        request_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(CONTENT_TYPE_STREAM_JSON),
        );
        Self {
            spec,
            url,
            http,
            request_headers,
            outgoing: Vec::new(),
        }
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    pub fn request_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.request_headers
    }

    /// Queue a message on the stream.
    pub fn send<T: Serialize>(&mut self, message: &T) -> Result<(), RpcError> {
        let payload = serde_json::to_vec(message).map_err(RpcError::Encode)?;
        encode_envelope(0, &payload, &mut self.outgoing)
    }

    /// Close the send side and read every response message.
    pub async fn close_and_receive<T: DeserializeOwned>(
        self,
    ) -> Result<StreamResponse<T>, RpcError> {
        debug!(procedure = %self.spec.procedure, bytes = self.outgoing.len(), "Sending stream");

        let response = self
            .http
            .post(&self.url)
            .headers(self.request_headers)
            .body(self.outgoing)
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::from_status(status, &body));
        }

        let body = response.bytes().await?;
        let mut messages = Vec::new();
        let mut trailers = None;

        for envelope in decode_envelopes(&body)? {
            if envelope.flags & FLAG_COMPRESSED != 0 {
                return Err(RpcError::InvalidResponse(
                    "compressed envelopes are not supported".to_string(),
                ));
            }
            if envelope.is_end_stream() {
                let end: EndStream = if envelope.payload.is_empty() {
                    EndStream::default()
                } else {
                    serde_json::from_slice(&envelope.payload).map_err(RpcError::Decode)?
                };
                if let Some(err) = end.error {
                    return Err(RpcError::Status {
                        code: err.code,
                        message: err.message,
                    });
                }
                trailers = Some(end.metadata);
                break;
            }
            messages.push(serde_json::from_slice(&envelope.payload).map_err(RpcError::Decode)?);
        }

        let trailers = trailers.ok_or_else(|| {
            RpcError::InvalidResponse("stream ended without end-of-stream message".to_string())
        })?;

        Ok(StreamResponse {
            headers,
            messages,
            trailers,
        })
    }
}

/// Incoming streaming call being handled locally.
pub struct StreamingHandlerConn {
    spec: Spec,
    request_headers: HeaderMap,
    incoming: VecDeque<Envelope>,
}

impl StreamingHandlerConn {
    /// Build a handler connection from the raw enveloped request body.
    pub fn new(spec: Spec, request_headers: HeaderMap, body: &[u8]) -> Result<Self, RpcError> {
        Ok(Self {
            spec,
            request_headers,
            incoming: decode_envelopes(body)?.into(),
        })
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    pub fn request_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.request_headers
    }

    /// Next message from the peer, `None` once the stream is drained.
    pub fn receive<T: DeserializeOwned>(&mut self) -> Result<Option<T>, RpcError> {
        match self.incoming.pop_front() {
            Some(envelope) if envelope.is_end_stream() => {
                self.incoming.clear();
                Ok(None)
            }
            Some(envelope) => serde_json::from_slice(&envelope.payload)
                .map(Some)
                .map_err(RpcError::Decode),
            None => Ok(None),
        }
    }
}
