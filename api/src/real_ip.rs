// Borrow a lot of code from crates.io
// https://github.com/rust-lang/crates.io/blob/986d296f910c2ed821be907b1e32a120c03338cb/src/real_ip.rs

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use ipnetwork::IpNetwork;
use std::net::{IpAddr, SocketAddr};

use crate::{App, error::AppError};

fn is_trusted(ip: &IpAddr, trusted_proxies: &[IpNetwork]) -> bool {
    trusted_proxies.iter().any(|proxy| proxy.contains(*ip))
}

fn forwarded_ips(headers: &HeaderMap) -> Vec<IpAddr> {
    headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(','))
        .filter_map(|ip| ip.trim().parse().ok())
        .collect()
}

/// The address of whoever sent the request. `X-Forwarded-For` is only
/// believed when the socket peer is one of our proxies; the client is then
/// the right-most address that isn't a proxy itself.
pub fn resolve_client_ip(
    headers: &HeaderMap,
    socket_ip: IpAddr,
    trusted_proxies: &[IpNetwork],
) -> IpAddr {
    if !is_trusted(&socket_ip, trusted_proxies) {
        return socket_ip;
    }

    forwarded_ips(headers)
        .into_iter()
        .rev()
        .find(|ip| !is_trusted(ip, trusted_proxies))
        .unwrap_or_else(|| {
            tracing::warn!(
                ?socket_ip,
                "No client IP found in X-Forwarded-For headers, using socket IP"
            );
            socket_ip
        })
}

pub struct ClientIp(pub IpAddr);

impl FromRequestParts<App> for ClientIp {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &App) -> Result<Self, Self::Rejection> {
        let ConnectInfo(socket) = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "no connect info on the request");
                AppError::from("couldn't get connecting socket IP")
            })?;
        let socket_ip = socket.ip();

        Ok(ClientIp(resolve_client_ip(
            &parts.headers,
            socket_ip,
            &state.config.trusted_proxies,
        )))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn headers(xff: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", xff.parse().unwrap());
        headers
    }

    #[test]
    fn test_untrusted_peer_is_the_client() {
        let ip = resolve_client_ip(
            &headers("1.2.3.4"),
            "9.9.9.9".parse().unwrap(),
            &["10.0.0.0/8".parse().unwrap()],
        );
        assert_eq!(ip, "9.9.9.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_trusted_proxy_chain_is_skipped() {
        let ip = resolve_client_ip(
            &headers("6.6.6.6, 1.2.3.4, 10.0.0.2"),
            "10.0.0.1".parse().unwrap(),
            &["10.0.0.0/8".parse().unwrap()],
        );
        assert_eq!(ip, "1.2.3.4".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_client_ip_from_mocked_connect_info() {
        use std::sync::Arc;

        use axum::{extract::connect_info::MockConnectInfo, http::Request};

        use crate::{config::ServerConfig, store::MemoryStore};

        let ctx = App::new(ServerConfig::default(), Arc::new(MemoryStore::new()));
        let (mut parts, ()) = Request::get("/")
            .extension(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
            .body(())
            .unwrap()
            .into_parts();

        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &ctx).await.unwrap();
        assert_eq!(ip, "127.0.0.1".parse::<IpAddr>().unwrap());

        let (mut bare, ()) = Request::get("/").body(()).unwrap().into_parts();
        assert!(ClientIp::from_request_parts(&mut bare, &ctx).await.is_err());
    }

    #[test]
    fn test_trusted_proxy_without_header() {
        let ip = resolve_client_ip(
            &HeaderMap::new(),
            "10.0.0.1".parse().unwrap(),
            &["10.0.0.0/8".parse().unwrap()],
        );
        assert_eq!(ip, "10.0.0.1".parse::<IpAddr>().unwrap());
    }
}
