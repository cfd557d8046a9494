use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
};
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Route-level throttle keyed by client IP
pub type IpRateLimiter = Arc<RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>>;

/// Resolve the caller's address: first hop of `X-Forwarded-For`, else the socket peer.
pub fn resolve_client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> Option<IpAddr> {
    let forwarded_ip = headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok());

    forwarded_ip.or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip()))
}

/// Convenience wrapper over [`resolve_client_ip`] for a full request.
pub fn client_ip(request: &Request) -> Option<IpAddr> {
    resolve_client_ip(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
    )
}

/// Create a keyed rate limiter (by IP) allowing `attempts` per `window_seconds`
pub fn create_ip_rate_limiter(attempts: u32, window_seconds: u64) -> IpRateLimiter {
    let burst = NonZeroU32::new(attempts).unwrap_or(NonZeroU32::MIN);
    let period = Duration::from_millis((window_seconds * 1000) / burst.get() as u64);
    let quota = Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst);

    Arc::new(RateLimiter::dashmap(quota))
}

/// Middleware for IP-based rate limiting
pub async fn ip_rate_limit_middleware(
    State(limiter): State<IpRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match client_ip(&request) {
        Some(ip) => match limiter.check_key(&ip) {
            Ok(_) => Ok(next.run(request).await),
            Err(negative) => {
                let wait_time = negative.wait_time_from(DefaultClock::default().now());
                tracing::warn!(client_ip = %ip, "Route throttle rejected request");
                Err(AppError::TooManyRequests(
                    "Too many requests from this IP. Please try again later.".to_string(),
                    Some(wait_time.as_secs().max(1)),
                ))
            }
        },
        None => {
            tracing::warn!("Could not determine IP for rate limiting");
            Ok(next.run(request).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_first_hop_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR_HEADER,
            HeaderValue::from_static("1.2.3.4, 10.0.0.1"),
        );
        let peer = ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 5000)));

        let ip = resolve_client_ip(&headers, Some(&peer));
        assert_eq!(ip, Some("1.2.3.4".parse().unwrap()));
    }

    #[test]
    fn falls_back_to_peer_address() {
        let headers = HeaderMap::new();
        let peer = ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 5000)));

        let ip = resolve_client_ip(&headers, Some(&peer));
        assert_eq!(ip, Some("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn garbage_forwarded_header_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_static("not-an-ip"));

        assert_eq!(resolve_client_ip(&headers, None), None);
    }

    #[test]
    fn ip_limiter_allows_burst_then_rejects() {
        let limiter = create_ip_rate_limiter(3, 3600);
        let ip: IpAddr = "9.9.9.9".parse().unwrap();

        for _ in 0..3 {
            assert!(limiter.check_key(&ip).is_ok());
        }
        assert!(limiter.check_key(&ip).is_err());

        let other: IpAddr = "8.8.8.8".parse().unwrap();
        assert!(limiter.check_key(&other).is_ok());
    }
}
