use reqwest::Client;
use tracing::debug;

use crate::config::Config;
use crate::domain::Rulepack;
use crate::error::{GovernorError, Result};

/// HTTP client for the rulepack control plane.
pub struct ControlPlaneClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ControlPlaneClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| GovernorError::Config(format!("build http client: {}", e)))?;

        Ok(ControlPlaneClient {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Fetch a rulepack by id: GET `{base}/rulepacks/{id}` with bearer auth.
    ///
    /// Non-2xx responses and bodies that fail to decode are both fetch
    /// errors.
    pub async fn fetch_rulepack(&self, id: &str) -> Result<Rulepack> {
        let url = format!("{}/rulepacks/{}", self.base_url, id);
        debug!(rulepack_id = id, url = %url, "fetching rulepack");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| GovernorError::Fetch {
                rulepack_id: id.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GovernorError::FetchStatus {
                rulepack_id: id.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<Rulepack>()
            .await
            .map_err(|e| GovernorError::Fetch {
                rulepack_id: id.to_string(),
                source: e,
            })
    }
}
