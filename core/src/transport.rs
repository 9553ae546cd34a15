//! Executes finished requests.
//!
//! # Design
//! `ElpisClient` only ever hands a `Transport` an `HttpRequest` and expects
//! an `HttpResponse` back, so tests can swap in a closure and production
//! code uses a blocking `ureq` agent. Non-2xx statuses come back as data;
//! only failures to complete the exchange are errors. The request is taken by
//! value so a streamed body can be consumed while it is sent.

use ureq::SendBody;

use crate::error::ElpisError;
use crate::http::{HttpBody, HttpMethod, HttpRequest, HttpResponse};

/// Sends one request and waits for the whole response.
pub trait Transport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ElpisError>;
}

impl<F> Transport for F
where
    F: Fn(HttpRequest) -> Result<HttpResponse, ElpisError>,
{
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ElpisError> {
        self(request)
    }
}

/// Blocking transport backed by a `ureq` agent. Uses the agent's default
/// connect and read timeouts.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

fn transport_error(err: ureq::Error) -> ElpisError {
    ElpisError::Transport(err.to_string())
}

impl Transport for UreqTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ElpisError> {
        let mut response = match request.method {
            HttpMethod::Get => {
                let mut builder = self.agent.get(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            HttpMethod::Post => {
                let mut builder = self.agent.post(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                match request.body {
                    Some(HttpBody::Bytes(body)) => builder.send(&body[..]),
                    // no length up front, so ureq sends it chunked
                    Some(HttpBody::Stream(mut reader)) => {
                        builder.send(SendBody::from_reader(&mut reader))
                    }
                    None => builder.send_empty(),
                }
            }
        }
        .map_err(transport_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()
            .map_err(transport_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
