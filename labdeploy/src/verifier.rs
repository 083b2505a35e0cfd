//! Post-deployment verifier: best-effort HTTP probes against known service
//! endpoints on the lab hosts.
//!
//! Probes report, they never fail the run. Lab endpoints use self-signed
//! certificates, so certificate validation is disabled on the probe client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// What a probe must observe to count the endpoint as reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeExpectation {
    /// The response body must contain this substring.
    BodyMarker(String),
    /// The request must be rejected with HTTP 401.
    ///
    /// This only proves the service is listening and challenging, not that
    /// it is healthy; preserved for compatibility with the endpoints that
    /// require authentication.
    Unauthorized,
}

/// One probe to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSpec {
    /// Human-readable service name.
    pub service: String,
    /// The endpoint URL.
    pub url: String,
    /// What counts as reachable.
    pub expectation: ProbeExpectation,
}

impl ProbeSpec {
    /// Creates a body-marker probe.
    #[must_use]
    pub fn marker(
        service: impl Into<String>,
        url: impl Into<String>,
        marker: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            url: url.into(),
            expectation: ProbeExpectation::BodyMarker(marker.into()),
        }
    }

    /// Creates a probe satisfied by an HTTP 401 challenge.
    #[must_use]
    pub fn unauthorized(service: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            url: url.into(),
            expectation: ProbeExpectation::Unauthorized,
        }
    }

    /// The marker string recorded in the probe result.
    #[must_use]
    pub fn marker_text(&self) -> String {
        match &self.expectation {
            ProbeExpectation::BodyMarker(m) => m.clone(),
            ProbeExpectation::Unauthorized => "HTTP 401".to_string(),
        }
    }
}

/// Outcome of one probe. Purely observational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// The probed endpoint.
    pub endpoint: String,
    /// The marker that was looked for.
    pub expected_marker: String,
    /// Whether the endpoint answered as expected.
    pub reachable: bool,
}

/// The default probe set for a deployed lab, given the logger address.
#[must_use]
pub fn default_probes(logger: Ipv4Addr) -> Vec<ProbeSpec> {
    vec![
        ProbeSpec::marker(
            "splunk",
            format!("https://{logger}:8000/en-US/account/login"),
            "Splunk",
        ),
        ProbeSpec::unauthorized("fleet", format!("https://{logger}:8412")),
        ProbeSpec::marker(
            "velociraptor",
            format!("https://{logger}:9999"),
            "Velociraptor",
        ),
        ProbeSpec::marker(
            "guacamole",
            format!("http://{logger}:8080/guacamole"),
            "Guacamole",
        ),
    ]
}

/// A captured HTTP response, reduced to what probe decisions need.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

/// Transport seam for probes.
#[async_trait]
pub trait ProbeTransport: Send + Sync + Debug {
    /// Performs a GET and captures status and body.
    ///
    /// `Err` carries a transport-level description (connection refused,
    /// TLS handshake failure, timeout).
    async fn get(&self, url: &str) -> Result<ProbeResponse, String>;
}

/// [`ProbeTransport`] backed by an HTTPS client that skips certificate
/// validation.
#[derive(Debug, Clone)]
pub struct InsecureHttpTransport {
    client: reqwest::Client,
}

impl InsecureHttpTransport {
    /// Builds the transport. Falls back to default client settings if the
    /// insecure builder is rejected.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for InsecureHttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbeTransport for InsecureHttpTransport {
    async fn get(&self, url: &str) -> Result<ProbeResponse, String> {
        let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(ProbeResponse { status, body })
    }
}

/// Performs the probe list and reports each outcome.
#[derive(Debug, Clone)]
pub struct Verifier {
    transport: Arc<dyn ProbeTransport>,
}

impl Verifier {
    /// Creates a verifier over the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn ProbeTransport>) -> Self {
        Self { transport }
    }

    /// Runs every probe to completion, in order.
    ///
    /// Never aborts: network errors and missing markers are recorded as
    /// `reachable: false` and the remaining probes still run.
    pub async fn verify(&self, probes: &[ProbeSpec]) -> Vec<ProbeResult> {
        let mut results = Vec::with_capacity(probes.len());

        for probe in probes {
            let reachable = match self.transport.get(&probe.url).await {
                Ok(response) => Self::satisfied(probe, &response),
                Err(detail) => {
                    tracing::warn!(
                        service = %probe.service,
                        url = %probe.url,
                        detail,
                        "probe transport error"
                    );
                    false
                }
            };

            if reachable {
                tracing::info!(service = %probe.service, url = %probe.url, "probe ok");
            } else {
                tracing::warn!(service = %probe.service, url = %probe.url, "probe unreachable");
            }

            results.push(ProbeResult {
                endpoint: probe.url.clone(),
                expected_marker: probe.marker_text(),
                reachable,
            });
        }

        results
    }

    fn satisfied(probe: &ProbeSpec, response: &ProbeResponse) -> bool {
        match &probe.expectation {
            ProbeExpectation::BodyMarker(marker) => response.body.contains(marker.as_str()),
            ProbeExpectation::Unauthorized => response.status == 401,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProbeTransport;

    #[tokio::test]
    async fn test_marker_found_is_reachable() {
        let transport = Arc::new(MockProbeTransport::new());
        transport.respond(
            "https://lab:8000/login",
            Ok(ProbeResponse {
                status: 200,
                body: "Welcome to Splunk Web".to_string(),
            }),
        );

        let verifier = Verifier::new(transport);
        let probes = vec![ProbeSpec::marker("splunk", "https://lab:8000/login", "Splunk")];
        let results = verifier.verify(&probes).await;
        assert!(results[0].reachable);
    }

    #[tokio::test]
    async fn test_missing_marker_is_unreachable() {
        let transport = Arc::new(MockProbeTransport::new());
        transport.respond(
            "https://lab:8000/login",
            Ok(ProbeResponse {
                status: 200,
                body: "<html>placeholder</html>".to_string(),
            }),
        );

        let verifier = Verifier::new(transport);
        let probes = vec![ProbeSpec::marker("splunk", "https://lab:8000/login", "Splunk")];
        let results = verifier.verify(&probes).await;
        assert!(!results[0].reachable);
    }

    #[tokio::test]
    async fn test_401_counts_as_reachable_for_auth_endpoints() {
        let transport = Arc::new(MockProbeTransport::new());
        transport.respond(
            "https://lab:8412",
            Ok(ProbeResponse {
                status: 401,
                body: String::new(),
            }),
        );

        let verifier = Verifier::new(transport);
        let probes = vec![ProbeSpec::unauthorized("fleet", "https://lab:8412")];
        let results = verifier.verify(&probes).await;
        assert!(results[0].reachable);
        assert_eq!(results[0].expected_marker, "HTTP 401");
    }

    #[tokio::test]
    async fn test_200_does_not_satisfy_unauthorized_expectation() {
        let transport = Arc::new(MockProbeTransport::new());
        transport.respond(
            "https://lab:8412",
            Ok(ProbeResponse {
                status: 200,
                body: "ok".to_string(),
            }),
        );

        let verifier = Verifier::new(transport);
        let probes = vec![ProbeSpec::unauthorized("fleet", "https://lab:8412")];
        let results = verifier.verify(&probes).await;
        assert!(!results[0].reachable);
    }

    #[tokio::test]
    async fn test_network_error_never_aborts_remaining_probes() {
        let transport = Arc::new(MockProbeTransport::new());
        transport.respond("https://lab:8000", Err("connection refused".to_string()));
        transport.respond(
            "https://lab:9999",
            Ok(ProbeResponse {
                status: 200,
                body: "Velociraptor server".to_string(),
            }),
        );

        let verifier = Verifier::new(transport);
        let probes = vec![
            ProbeSpec::marker("splunk", "https://lab:8000", "Splunk"),
            ProbeSpec::marker("velociraptor", "https://lab:9999", "Velociraptor"),
        ];
        let results = verifier.verify(&probes).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].reachable);
        assert!(results[1].reachable);
    }

    #[test]
    fn test_default_probes_cover_logger_services() {
        let probes = default_probes(Ipv4Addr::new(192, 168, 56, 105));
        assert_eq!(probes.len(), 4);
        assert!(probes.iter().any(|p| p.url.contains(":8000")));
        assert!(probes
            .iter()
            .any(|p| p.expectation == ProbeExpectation::Unauthorized));
    }
}
