//! Static response headers.
//!
//! Every response carries the same fixed set of headers: a generic web server
//! banner, no-cache directives and an octet-stream content type. None of them
//! describe the tunnel itself.

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

pub const DISGUISE_HEADERS: [(&str, &str); 9] = [
    ("server", "Apache/2.4.41 (Ubuntu)"),
    ("x-powered-by", "PHP/7.4.33"),
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-xss-protection", "1; mode=block"),
    ("cache-control", "no-store, no-cache, must-revalidate"),
    ("pragma", "no-cache"),
    ("expires", "0"),
    ("content-type", "application/octet-stream"),
];

/// Wrap `router` so every response carries [`DISGUISE_HEADERS`].
pub fn with_disguise_headers<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    DISGUISE_HEADERS
        .into_iter()
        .fold(router, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::overriding(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            ))
        })
}
