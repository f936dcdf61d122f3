use std::net::IpAddr;
use std::time::Instant;

use bindery_core::probe::{ProbeError, ProbeRequest, ProbeResult, Prober};
use bindery_core::resource::HttpMethod;
use reqwest::{Client, Method, redirect};
use url::{Host, Url};

/// Endpoint prober using reqwest.
///
/// Each probe is exactly one HTTP exchange: redirects are reported, never
/// followed. The request's timeout is a hard deadline over the whole exchange
/// (connect, headers and body). Targets on private or reserved addresses are
/// refused unless [`allow_private_urls`](Self::allow_private_urls) is set
/// (e.g. for CLI usage where the user controls the machine).
#[derive(Clone)]
pub struct ReqwestProber {
    client: Client,
    public_only: bool,
}

impl ReqwestProber {
    pub fn new() -> Result<Self, ProbeError> {
        let client = Client::builder()
            .user_agent(concat!("Bindery/", env!("CARGO_PKG_VERSION"), " (API onboarding)"))
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| ProbeError::Transport {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            public_only: true,
        })
    }

    /// Allow probing loopback, private and other reserved addresses.
    ///
    /// Only use this where the operator controls the machine and network.
    pub fn allow_private_urls(mut self) -> Self {
        self.public_only = false;
        self
    }

    async fn send(&self, request: &ProbeRequest) -> Result<ProbeResult, ProbeError> {
        if self.public_only {
            ensure_public_target(&request.url).await?;
        }

        let started = Instant::now();
        let mut builder = self
            .client
            .request(method(request.method), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some((username, password)) = &request.basic_auth {
            builder = builder.basic_auth(username, Some(password));
        }

        let response = builder.send().await.map_err(|e| ProbeError::Transport {
            message: if e.is_connect() {
                format!("Connection failed: {e}")
            } else {
                e.to_string()
            },
        })?;
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("<missing>");
            return Err(ProbeError::HttpStatus {
                status: status.as_u16(),
                message: format!("Redirect to {location} not followed"),
                body: None,
            });
        }

        let body = response.bytes().await.map_err(|e| ProbeError::Transport {
            message: format!("Failed to read response body: {e}"),
        })?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        ProbeError::from_response(status.as_u16(), &body, elapsed_ms)
    }
}

impl Prober for ReqwestProber {
    async fn probe(&self, request: &ProbeRequest) -> Result<ProbeResult, ProbeError> {
        let seconds = request.timeout_secs();
        match tokio::time::timeout(request.timeout, self.send(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(url = %request.url.path(), seconds, "Probe deadline elapsed");
                Err(ProbeError::Timeout { seconds })
            }
        }
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

// ---------------------------------------------------------------------------
// Target address policy
// ---------------------------------------------------------------------------

fn refused(url: &Url, reason: impl std::fmt::Display) -> ProbeError {
    ProbeError::Transport {
        message: format!("Refused {}: {reason}", url.host_str().unwrap_or(url.as_str())),
    }
}

/// Refuse targets that are not plain http(s) on a public address.
///
/// Domain names are resolved up front and every resolved address must be
/// public.
async fn ensure_public_target(url: &Url) -> Result<(), ProbeError> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(refused(url, format!("scheme '{}' is not http(s)", url.scheme())));
    }

    let domain = match url.host() {
        Some(Host::Ipv4(ip)) => return check_address(url, IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => return check_address(url, IpAddr::V6(ip)),
        Some(Host::Domain(domain)) => domain,
        None => return Err(refused(url, "no host")),
    };

    let port = url.port_or_known_default().unwrap_or(80);
    let addresses: Vec<IpAddr> = tokio::net::lookup_host((domain, port))
        .await
        .map_err(|e| refused(url, format!("name resolution failed: {e}")))?
        .map(|addr| addr.ip())
        .collect();
    if addresses.is_empty() {
        return Err(refused(url, "name resolved to no addresses"));
    }
    addresses
        .into_iter()
        .try_for_each(|ip| check_address(url, ip))
}

fn check_address(url: &Url, ip: IpAddr) -> Result<(), ProbeError> {
    if is_reserved(ip) {
        Err(refused(url, format!("{ip} is a private or reserved address")))
    } else {
        Ok(())
    }
}

/// Loopback, private, link-local (cloud metadata), shared (CGN),
/// documentation, unspecified and broadcast ranges, plus their IPv4-mapped
/// IPv6 forms and IPv6 unique-local space.
fn is_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [first, second, ..] = v4.octets();
            let shared = first == 100 && (64..128).contains(&second);
            shared
                || v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_reserved(IpAddr::V4(v4));
            }
            let head = v6.segments()[0];
            let link_local = head & 0xffc0 == 0xfe80;
            let unique_local = head & 0xfe00 == 0xfc00;
            link_local || unique_local || v6.is_loopback() || v6.is_unspecified()
        }
    }
}
