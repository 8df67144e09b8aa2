#![forbid(unsafe_code)]

use std::time::Duration;

use serde::Deserialize;

use crate::config::{GeocoderConfig, GeocoderProvider};
use crate::error::FleetError;

/// Reverse-geocoding contract: device coordinates in, human-readable
/// address out. Implementations may fail; callers treat that as a missing
/// optional field, never as a fatal error for the step.
pub trait AddressResolver {
    fn resolve_address(&self, latitude: f64, longitude: f64) -> Result<String, FleetError>;
}

/// OpenCage-backed resolver over plain blocking HTTP.
#[derive(Debug)]
pub struct OpenCageResolver {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
}

impl OpenCageResolver {
    /// Build from config. Returns `None` when geocoding is disabled or the
    /// API key env var is not set; the caller proceeds without enrichment.
    pub fn from_config(cfg: &GeocoderConfig) -> Option<Self> {
        if cfg.provider != GeocoderProvider::Opencage {
            return None;
        }
        let api_key = std::env::var(&cfg.api_key_env).unwrap_or_default();
        if api_key.trim().is_empty() {
            tracing::warn!(
                env = %cfg.api_key_env,
                "geocoder API key not set; address enrichment disabled"
            );
            return None;
        }
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_millis(cfg.timeout_ms)))
            .build();
        Some(Self {
            agent: config.new_agent(),
            endpoint: cfg.endpoint.clone(),
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted: String,
}

impl AddressResolver for OpenCageResolver {
    fn resolve_address(&self, latitude: f64, longitude: f64) -> Result<String, FleetError> {
        let url = format!(
            "{}?q={latitude},{longitude}&key={}&limit=1&no_annotations=1",
            self.endpoint, self.api_key
        );
        let mut res = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| FleetError::EnrichmentUnavailable(format!("geocoder request: {e}")))?;
        if !res.status().is_success() {
            return Err(FleetError::EnrichmentUnavailable(format!(
                "geocoder returned HTTP {}",
                res.status()
            )));
        }
        let parsed: GeocodeResponse = res
            .body_mut()
            .read_json()
            .map_err(|e| FleetError::EnrichmentUnavailable(format!("geocoder response: {e}")))?;
        parsed
            .results
            .into_iter()
            .map(|r| r.formatted)
            .find(|f| !f.trim().is_empty())
            .ok_or_else(|| {
                FleetError::EnrichmentUnavailable("geocoder returned no result".to_owned())
            })
    }
}

/// Resolve if both a resolver and coordinates are present; on failure log
/// and return `None` so the step proceeds with the field left empty.
pub fn resolve_best_effort<R: AddressResolver + ?Sized>(
    resolver: Option<&R>,
    coords: Option<(f64, f64)>,
) -> Option<String> {
    let resolver = resolver?;
    let (lat, lon) = coords?;
    match resolver.resolve_address(lat, lon) {
        Ok(address) => Some(address),
        Err(e) => {
            tracing::warn!(error = %e, "address enrichment skipped");
            None
        }
    }
}
