//! HTTPS liveness check against a student cluster's API endpoint.
//!
//! A freshly installed cluster serves the API with a certificate signed by
//! its own CA, so the handshake is expected to fail verification. That
//! failure is the signal that something is listening.

use std::error::Error as StdError;

use async_trait::async_trait;
use stackfleet_config::ProbeConfig;
use tracing::debug;

use crate::error::Result;
use crate::ports::{ClusterProbe, Reachability};

#[derive(Debug, Clone)]
pub struct HttpsProbe {
    client: reqwest::Client,
}

impl HttpsProbe {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterProbe for HttpsProbe {
    async fn probe(&self, api_url: &str) -> Reachability {
        let reachability = match self.client.get(api_url).send().await {
            Ok(response) => Reachability::HttpStatus(response.status().as_u16()),
            Err(err) => classify_error(&err),
        };
        debug!(url = api_url, ?reachability, "cluster probed");
        reachability
    }
}

/// Maps a request failure onto reachability.
///
/// Only a certificate rejection counts as reachable; timeouts, refused
/// connections and every other TLS failure do not.
pub fn classify_error(err: &(dyn StdError + 'static)) -> Reachability {
    if has_invalid_certificate(err) {
        Reachability::UntrustedCertificate
    } else {
        Reachability::Unreachable(error_chain(err))
    }
}

fn has_invalid_certificate(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(error) = current {
        if let Some(rustls::Error::InvalidCertificate(_)) =
            error.downcast_ref::<rustls::Error>()
        {
            return true;
        }
        // io::Error hides its payload from `source()`
        if let Some(io) = error.downcast_ref::<std::io::Error>()
            && let Some(inner) = io.get_ref()
            && has_invalid_certificate(inner)
        {
            return true;
        }
        current = error.source();
    }
    false
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(error) = current {
        message.push_str(": ");
        message.push_str(&error.to_string());
        current = error.source();
    }
    message
}
