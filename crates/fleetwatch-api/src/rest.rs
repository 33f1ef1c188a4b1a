// REST snapshot client
//
// The dashboard backend exposes the same entities over plain HTTP. This
// client is used for the initial snapshot and for fallback polling when the
// WebSocket feed is considered failed.

use serde::de::DeserializeOwned;
use secrecy::SecretString;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;
use crate::types::{AgentDto, ContainerDetailDto, ContainerDto};

/// HTTP client for the monitoring backend's REST API.
///
/// `base_url` is the API root, e.g. `https://monitor.example/api/`. Paths
/// are joined relative to it, so a missing trailing slash is added.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    /// Create a client, attaching `Authorization: Bearer` when a token is
    /// available.
    pub fn new(
        base_url: Url,
        token: Option<&SecretString>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = match token {
            Some(token) => transport.build_authorized_client(token)?,
            None => transport.build_client()?,
        };
        Ok(Self::with_client(http, base_url))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET containers`: the full container dashboard snapshot.
    pub async fn list_containers(&self) -> Result<Vec<ContainerDto>, Error> {
        self.get(&["containers"]).await
    }

    /// `GET agents`: every registered agent.
    pub async fn list_agents(&self) -> Result<Vec<AgentDto>, Error> {
        self.get(&["agents"]).await
    }

    /// `GET containers/{id}`: one container with detail fields. The id is
    /// percent-encoded as a single path segment.
    pub async fn container_detail(&self, id: &str) -> Result<ContainerDetailDto, Error> {
        self.get(&["containers", id]).await
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Append `segments` to the API root, escaping each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, Error> {
        let url = self.endpoint(segments)?;
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        Self::parse(resp).await
    }

    async fn parse<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Authentication {
                message: format!("token rejected (HTTP {})", status.as_u16()),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}
