//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4)
//! - Build the backend URI from an endpoint base URL and the relative path
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - An incoming `x-request-id` is kept and forwarded as-is

use axum::http::{HeaderName, HeaderValue, Request, Uri};
use tower_http::request_id::{MakeRequestId, RequestId};
use url::Url;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// UUID v4 request id generator for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Read the request id set by the middleware stack.
pub fn request_id<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Join `relative` onto the path of `base` and attach `query`.
///
/// `http://host/api` + `users/5` → `http://host/api/users/5`.
pub fn build_target_url(base: &Url, relative: &str, query: Option<&str>) -> Url {
    let mut url = base.clone();
    let base_path = base.path().trim_end_matches('/');
    let relative = relative.trim_start_matches('/');

    let path = match (base_path.is_empty(), relative.is_empty()) {
        (true, true) => "/".to_string(),
        (false, true) => base_path.to_string(),
        _ => format!("{}/{}", base_path, relative),
    };
    url.set_path(&path);
    url.set_query(query.filter(|q| !q.is_empty()));
    url
}

pub fn url_to_uri(url: &Url) -> Result<Uri, axum::http::uri::InvalidUri> {
    url.as_str().parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(base: &str, relative: &str, query: Option<&str>) -> String {
        build_target_url(&Url::parse(base).unwrap(), relative, query).to_string()
    }

    #[test]
    fn joins_relative_path_onto_base() {
        assert_eq!(target("http://h:1", "users/5", None), "http://h:1/users/5");
        assert_eq!(target("http://h:1/api", "users/5", None), "http://h:1/api/users/5");
        assert_eq!(target("http://h:1/api/", "/users", None), "http://h:1/api/users");
    }

    #[test]
    fn empty_relative_keeps_base_path() {
        assert_eq!(target("http://h:1", "", None), "http://h:1/");
        assert_eq!(target("http://h:1/api", "", None), "http://h:1/api");
    }

    #[test]
    fn carries_query_string() {
        assert_eq!(
            target("http://h:1", "search", Some("q=rust&page=2")),
            "http://h:1/search?q=rust&page=2"
        );
        assert_eq!(target("http://h:1", "search", Some("")), "http://h:1/search");
    }

    #[test]
    fn generated_request_ids_are_uuids() {
        let request = Request::builder().body(()).unwrap();
        let id = MakeRequestUuid.make_request_id(&request).unwrap();
        let value = id.header_value().to_str().unwrap();
        assert!(uuid::Uuid::parse_str(value).is_ok());
    }
}
