use http::request::Parts as ReqParts;
use http::{HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// CORS policy from `CORS_ALLOW_ORIGINS`: `*` allows any origin, otherwise a comma-separated
/// list of suffixes the `Origin` header must end with (e.g. `example.com` also covers
/// `https://www.example.com`).
///
/// Every `OPTIONS` request is answered here as a preflight and never reaches a route.
pub fn cors(allow_origins: &str) -> CorsLayer {
    let allowed = if allow_origins.trim() == "*" {
        AllowOrigin::any()
    } else {
        let suffixes: Vec<String> = allow_origins
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        AllowOrigin::predicate(move |org: &HeaderValue, _: &ReqParts| {
            suffixes
                .iter()
                .any(|suffix| org.as_bytes().ends_with(suffix.as_bytes()))
        })
    };

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(allowed)
}
