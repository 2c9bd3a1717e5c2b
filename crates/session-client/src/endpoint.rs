//! Endpoint builders mapping session parameters to socket URLs.
//!
//! The session manager never builds URLs itself; it hands
//! [`EndpointParams`] to whatever [`EndpointBuilder`] the transport was
//! configured with.

use protocol::error::{ProtocolError, Result};
use protocol::EndpointParams;
use url::Url;

/// Maps endpoint parameters to a WebSocket URL.
pub trait EndpointBuilder: Send + Sync {
    /// Builds the socket URL for `params`.
    fn build(&self, params: &EndpointParams) -> Result<Url>;
}

/// Builds URLs under the dashboard's terminal API:
///
/// - exec: `{base}/api/v1/terminal/{namespace}/{pod}/ws?container=..&shell=..`
/// - debug: `{base}/api/v1/terminal/{namespace}/{pod}/debug/ws?image=..&target=..`
#[derive(Debug, Clone)]
pub struct PathEndpointBuilder {
    base_url: Url,
}

impl PathEndpointBuilder {
    /// Creates a builder rooted at `base_url`.
    ///
    /// `http` and `https` bases are rewritten to `ws` and `wss`.
    pub fn new(base_url: &str) -> Result<Self> {
        let mut url = Url::parse(base_url)
            .map_err(|e| ProtocolError::InvalidEndpoint(format!("{}: {}", base_url, e)))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ProtocolError::InvalidEndpoint(format!(
                    "unsupported scheme: {}",
                    other
                )))
            }
        };
        if url.scheme() != scheme {
            url.set_scheme(scheme).map_err(|_| {
                ProtocolError::InvalidEndpoint(format!("cannot switch {} to {}", base_url, scheme))
            })?;
        }
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self { base_url: url })
    }

    /// Returns the normalized base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn terminal_url(&self, namespace: &str, pod: &str, debug: bool) -> Result<Url> {
        for (name, value) in [("namespace", namespace), ("pod", pod)] {
            if value.is_empty() {
                return Err(ProtocolError::InvalidEndpoint(format!("{} is empty", name)));
            }
        }

        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ProtocolError::InvalidEndpoint("base URL cannot carry a path".to_string())
            })?;
            segments
                .pop_if_empty()
                .push("api")
                .push("v1")
                .push("terminal")
                .push(namespace)
                .push(pod);
            if debug {
                segments.push("debug");
            }
            segments.push("ws");
        }
        Ok(url)
    }
}

impl EndpointBuilder for PathEndpointBuilder {
    fn build(&self, params: &EndpointParams) -> Result<Url> {
        match params {
            EndpointParams::Exec {
                namespace,
                pod,
                container,
                shell,
            } => {
                let mut url = self.terminal_url(namespace, pod, false)?;
                url.query_pairs_mut()
                    .append_pair("container", container)
                    .append_pair("shell", shell);
                Ok(url)
            }
            EndpointParams::DebugAttach {
                namespace,
                pod,
                debug_image,
                target_container,
                ..
            } => {
                if debug_image.is_empty() {
                    return Err(ProtocolError::InvalidEndpoint(
                        "debug image is empty".to_string(),
                    ));
                }
                let mut url = self.terminal_url(namespace, pod, true)?;
                url.query_pairs_mut()
                    .append_pair("image", debug_image)
                    .append_pair("target", target_container);
                Ok(url)
            }
        }
    }
}
