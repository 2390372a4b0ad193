/**
 * Connect target parsing and validation.
 *
 * A target is either built from parts (host, port, and a secure flag for the
 * stream variant) or parsed from a URL string whose scheme prefix selects
 * the backend:
 *
 * - `udp://host:port`  → reliable-datagram backend
 * - `ws://host:port`   → plain WebSocket backend
 * - `wss://host:port`  → TLS WebSocket backend
 *
 * The scheme decides the concrete transport once, at construction time;
 * nothing downstream inspects the variant again.
 */
use crate::error::ClientError;

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/**
 * A validated connect target, carrying everything a backend needs to dial.
 *
 * Construct with [`Endpoint::datagram`], [`Endpoint::stream`] or
 * [`Endpoint::parse`]; `Client::init` re-validates before any thread is
 * started, so a hand-built endpoint with an empty host is rejected there.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Reliable-datagram backend over UDP.
    Datagram {
        /// Remote host name or address.
        host: String,
        /// Remote port.
        port: u16,
    },

    /// Stream backend: WebSocket, plain or over TLS.
    Stream {
        /// Full URL handed to the WebSocket handshake, e.g. `ws://host:9000`.
        url: String,
        /// Whether the URL selects the TLS variant (`wss://`).
        secure: bool,
    },
}

impl Endpoint {
    /**
     * Builds a datagram endpoint from host and port.
     */
    pub fn datagram(host: &str, port: u16) -> Self {
        Self::Datagram {
            host: host.to_string(),
            port,
        }
    }

    /**
     * Builds a stream endpoint from host, port, and the secure flag,
     * producing the URL `{ws|wss}://{host}:{port}`.
     */
    pub fn stream(host: &str, port: u16, secure: bool) -> Self {
        let scheme = if secure { "wss" } else { "ws" };
        Self::Stream {
            url: format!("{scheme}://{host}:{port}"),
            secure,
        }
    }

    /**
     * Parses a full URL string, selecting the backend from the scheme.
     *
     * # Returns
     * `Err(ClientError::InvalidEndpoint)` for an empty string, an unknown
     * scheme, a missing host, or a missing/invalid port (the datagram
     * scheme requires an explicit port; the stream schemes default to the
     * usual 80/443 when none is given).
     */
    pub fn parse(target: &str) -> Result<Self, ClientError> {
        if target.is_empty() {
            return Err(ClientError::InvalidEndpoint("empty target".into()));
        }

        if let Some(rest) = target.strip_prefix("udp://") {
            let (host, port) = split_host_port(rest)?;
            return Ok(Self::Datagram { host, port });
        }

        if let Some(rest) = target.strip_prefix("wss://") {
            check_authority(target, rest)?;
            return Ok(Self::Stream {
                url: target.to_string(),
                secure: true,
            });
        }

        if let Some(rest) = target.strip_prefix("ws://") {
            check_authority(target, rest)?;
            return Ok(Self::Stream {
                url: target.to_string(),
                secure: false,
            });
        }

        Err(ClientError::InvalidEndpoint(format!(
            "unsupported scheme in {target:?}"
        )))
    }

    /**
     * Re-checks an endpoint before the client starts any work.
     *
     * Catches hand-built values that never went through `parse`: empty
     * hosts, zero ports, or a stream URL whose scheme contradicts its
     * secure flag.
     */
    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        match self {
            Self::Datagram { host, port } => {
                if host.is_empty() {
                    Err(ClientError::InvalidEndpoint("empty host".into()))
                } else if *port == 0 {
                    Err(ClientError::InvalidEndpoint("port must be non-zero".into()))
                } else {
                    Ok(())
                }
            }
            Self::Stream { url, secure } => match Self::parse(url)? {
                Self::Stream {
                    secure: parsed_secure,
                    ..
                } if parsed_secure == *secure => Ok(()),
                _ => Err(ClientError::InvalidEndpoint(format!(
                    "scheme of {url:?} does not match the secure flag"
                ))),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/**
 * Splits `host:port` into its parts, requiring both.
 */
fn split_host_port(rest: &str) -> Result<(String, u16), ClientError> {
    let Some((host, port)) = rest.rsplit_once(':') else {
        return Err(ClientError::InvalidEndpoint(format!(
            "missing port in {rest:?}"
        )));
    };

    if host.is_empty() {
        return Err(ClientError::InvalidEndpoint(format!(
            "missing host in {rest:?}"
        )));
    }

    let port: u16 = port
        .parse()
        .map_err(|_| ClientError::InvalidEndpoint(format!("invalid port in {rest:?}")))?;
    if port == 0 {
        return Err(ClientError::InvalidEndpoint("port must be non-zero".into()));
    }

    Ok((host.to_string(), port))
}

/**
 * Validates the authority section of a stream URL: a host must be present,
 * and a port, when given, must parse.
 */
fn check_authority(url: &str, rest: &str) -> Result<(), ClientError> {
    let authority = rest.split('/').next().unwrap_or_default();
    if authority.is_empty() {
        return Err(ClientError::InvalidEndpoint(format!(
            "missing host in {url:?}"
        )));
    }

    if let Some((host, port)) = authority.rsplit_once(':') {
        if host.is_empty() {
            return Err(ClientError::InvalidEndpoint(format!(
                "missing host in {url:?}"
            )));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| ClientError::InvalidEndpoint(format!("invalid port in {url:?}")))?;
        if port == 0 {
            return Err(ClientError::InvalidEndpoint("port must be non-zero".into()));
        }
    }

    Ok(())
}
