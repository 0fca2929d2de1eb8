use axum::http::{header, HeaderValue, Method};
use std::env;
use tower_http::cors::{AllowOrigin, CorsLayer};

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

const PREFLIGHT_MAX_AGE_SECS: u64 = 86400;

/// The storefront polls queue positions from the browser, so the API carries
/// a CORS layer. Methods mirror the API surface: reads, intent submission,
/// intent cancellation.
pub fn create_cors_layer() -> CorsLayer {
    let raw = env::var("CORS_ALLOWED_ORIGINS")
        .unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGINS.to_string());
    let origins = parse_origins(&raw);

    let allow_origin = if origins.is_empty() {
        tracing::warn!("CORS: no valid origins configured, allowing any origin");
        AllowOrigin::any()
    } else {
        tracing::info!(count = origins.len(), "CORS: allowed origins configured");
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(PREFLIGHT_MAX_AGE_SECS))
}

/// Splits a comma-separated origin list, dropping entries that do not parse
/// as header values.
fn parse_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("CORS: invalid origin '{}': {}", origin, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_origins_parse() {
        let origins = parse_origins(DEFAULT_ALLOWED_ORIGINS);
        assert_eq!(origins.len(), 2);
    }

    #[test]
    fn blank_and_invalid_entries_are_dropped() {
        let origins = parse_origins(" http://localhost:4000 ,, \u{7f}bad ,");
        assert_eq!(origins.len(), 1);
        assert_eq!(origins[0], "http://localhost:4000");
    }

    #[test]
    fn cors_layer_builds() {
        let _layer = create_cors_layer();
    }
}
