//! Admin access guard.
//!
//! Every admin route requires a localhost peer (unless external access is
//! allowed) and, when an operator key is configured, that key as a Bearer
//! token or `X-API-Key` header. Data-plane keys are checked by the registry,
//! not here.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, warn};

/// Admin guard configuration
#[derive(Clone, Default)]
pub struct AdminAuthConfig {
    /// Operator key (None = localhost check only)
    pub api_key: Option<String>,
    /// Accept non-localhost peers
    pub allow_external: bool,
}

impl From<&crate::domain::config::AdminConfig> for AdminAuthConfig {
    fn from(config: &crate::domain::config::AdminConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            allow_external: config.allow_external,
        }
    }
}

/// Layer guarding the admin router
#[derive(Clone)]
pub struct AdminAuthLayer {
    config: Arc<AdminAuthConfig>,
}

impl AdminAuthLayer {
    pub fn new(config: AdminAuthConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for AdminAuthLayer {
    type Service = AdminAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdminAuthService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

#[derive(Clone)]
pub struct AdminAuthService<S> {
    inner: S,
    config: Arc<AdminAuthConfig>,
}

impl<S> Service<Request<Body>> for AdminAuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let config = Arc::clone(&self.config);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match authorize(&req, &config) {
                Ok(()) => inner.call(req).await,
                Err(reason) => Ok(unauthorized_response(reason)),
            }
        })
    }
}

fn authorize<B>(req: &Request<B>, config: &AdminAuthConfig) -> Result<(), &'static str> {
    let is_localhost = is_request_from_localhost(req);
    let has_valid_key = check_api_key(req, config);

    debug!(
        path = %req.uri().path(),
        is_localhost,
        has_valid_key,
        "Checking admin authorization"
    );

    if !is_localhost && !config.allow_external {
        warn!(path = %req.uri().path(), "Admin access denied - localhost required");
        return Err("admin access requires localhost");
    }

    if !has_valid_key {
        warn!(path = %req.uri().path(), "Admin access denied - API key required");
        return Err("admin access requires API key");
    }

    Ok(())
}

/// True when the peer address is a loopback address.
///
/// Requests without connection info are treated as remote.
fn is_request_from_localhost<B>(req: &Request<B>) -> bool {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .is_some_and(|info| is_localhost_ip(info.0.ip()))
}

fn is_localhost_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback())
        }
    }
}

fn check_api_key<B>(req: &Request<B>, config: &AdminAuthConfig) -> bool {
    let Some(expected) = &config.api_key else {
        return true;
    };

    let headers = req.headers();
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return constant_time_compare(token, expected);
    }

    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|key| constant_time_compare(key, expected))
}

/// Constant-time string comparison.
///
/// Both inputs are padded to the longer length with different fill bytes,
/// and the length check is folded into the same constant-time result.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;

    let max_len = std::cmp::max(a.len(), b.len());
    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];
    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);
    (lengths_equal & contents_equal).into()
}

fn unauthorized_response(message: &'static str) -> Response {
    let mut response = (StatusCode::UNAUTHORIZED, message).into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn request_from(ip: IpAddr) -> Request<Body> {
        let mut req = Request::builder().uri("/admin/entities").body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::new(ip, 40000)));
        req
    }

    fn keyed(key: &str) -> AdminAuthConfig {
        AdminAuthConfig {
            api_key: Some(key.to_string()),
            allow_external: false,
        }
    }

    #[test]
    fn test_localhost_ip_detection() {
        assert!(is_localhost_ip(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(is_localhost_ip(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2))));
        assert!(is_localhost_ip(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(is_localhost_ip(IpAddr::V6(Ipv4Addr::LOCALHOST.to_ipv6_mapped())));
        assert!(!is_localhost_ip(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("secret", "secret"));
        assert!(!constant_time_compare("secret", "Secret"));
        assert!(!constant_time_compare("secret", "secre"));
        assert!(!constant_time_compare("", "x"));
    }

    #[test]
    fn test_remote_peer_rejected() {
        let req = request_from(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        assert!(authorize(&req, &AdminAuthConfig::default()).is_err());

        let open = AdminAuthConfig {
            api_key: None,
            allow_external: true,
        };
        assert!(authorize(&req, &open).is_ok());
    }

    #[test]
    fn test_missing_connect_info_is_remote() {
        let req = Request::builder().body(Body::empty()).unwrap();
        assert!(authorize(&req, &AdminAuthConfig::default()).is_err());
    }

    #[test]
    fn test_api_key_bearer_and_header() {
        let config = keyed("op-key");

        let mut req = request_from(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(authorize(&req, &config).is_err());

        req.headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer op-key"));
        assert!(authorize(&req, &config).is_ok());

        let mut req = request_from(IpAddr::V4(Ipv4Addr::LOCALHOST));
        req.headers_mut()
            .insert("x-api-key", HeaderValue::from_static("wrong"));
        assert!(authorize(&req, &config).is_err());
    }
}
