use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use super::api::GitLabApi;
use super::types::{Group, NewVariable, Project, User, Variable, VariableOwner, VariableUpdate};
use crate::config::InstanceSettings;
use crate::error::SvmError;

/// Page size requested from list endpoints
pub const DEFAULT_PER_PAGE: u32 = 100;

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const NEXT_PAGE_HEADER: &str = "x-next-page";

/// GitLab REST API v4 client
#[derive(Clone)]
pub struct GitLabClient {
    client: Client,
    instance_url: String,
    api_base: Url,
    token: String,
}

impl GitLabClient {
    /// Create a new client for the given instance
    pub fn new(settings: &InstanceSettings, token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .danger_accept_invalid_certs(!settings.ssl_verify)
            .build()
            .context("Failed to create HTTP client")?;

        let api_base = api_base_url(&settings.url, settings.api_version)?;

        Ok(Self {
            client,
            instance_url: settings.url.trim_end_matches('/').to_string(),
            api_base,
            token,
        })
    }

    /// Build an API URL; every segment is percent-encoded on its own so that
    /// `group/project` paths stay one segment.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Invalid GitLab URL: {}", self.instance_url))?
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url).header(TOKEN_HEADER, &self.token)
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<Response> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to {}", action))?;
        check_status(response).await
    }

    async fn fetch<T: DeserializeOwned>(&self, url: Url, action: &str) -> Result<T> {
        debug!("GET {}", url);
        let response = self.send(self.request(Method::GET, url), action).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse GitLab response ({})", action))
    }

    /// Follow `X-Next-Page` until the server reports no further page
    async fn fetch_all<T: DeserializeOwned>(&self, url: Url, action: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = "1".to_string();

        loop {
            let mut page_url = url.clone();
            page_url
                .query_pairs_mut()
                .append_pair("per_page", &DEFAULT_PER_PAGE.to_string())
                .append_pair("page", &page);
            debug!("GET {}", page_url);

            let response = self.send(self.request(Method::GET, page_url), action).await?;
            let next_page = response
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);

            let batch: Vec<T> = response
                .json()
                .await
                .with_context(|| format!("Failed to parse GitLab response ({})", action))?;
            items.extend(batch);

            match next_page {
                Some(next) => page = next,
                None => break,
            }
        }

        Ok(items)
    }
}

fn api_base_url(instance_url: &str, api_version: u32) -> Result<Url> {
    let mut url = Url::parse(instance_url)
        .with_context(|| format!("Invalid GitLab URL: {}", instance_url))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("Invalid GitLab URL: {}", instance_url))?
        .pop_if_empty()
        .push("api")
        .push(&format!("v{}", api_version));
    Ok(url)
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        return Err(SvmError::Authentication(format!("server answered {}", status)).into());
    }
    Err(SvmError::Api {
        status: status.as_u16(),
        body,
    }
    .into())
}

#[async_trait::async_trait]
impl GitLabApi for GitLabClient {
    async fn get_project(&self, id_or_path: &str) -> Result<Project> {
        let url = self.endpoint(&["projects", id_or_path])?;
        self.fetch(url, &format!("get project {}", id_or_path)).await
    }

    async fn get_group(&self, id_or_path: &str) -> Result<Group> {
        let url = self.endpoint(&["groups", id_or_path])?;
        self.fetch(url, &format!("get group {}", id_or_path)).await
    }

    async fn list_group_projects(&self, group_id: u64) -> Result<Vec<Project>> {
        let url = self.endpoint(&["groups", &group_id.to_string(), "projects"])?;
        self.fetch_all(url, &format!("list projects of group {}", group_id))
            .await
    }

    async fn list_variables(&self, owner: VariableOwner) -> Result<Vec<Variable>> {
        let url = self.endpoint(&[owner.collection(), &owner.id().to_string(), "variables"])?;
        self.fetch_all(
            url,
            &format!("list variables of {} {}", owner.collection(), owner.id()),
        )
        .await
    }

    async fn create_variable(&self, project_id: u64, variable: &NewVariable) -> Result<Variable> {
        let url = self.endpoint(&["projects", &project_id.to_string(), "variables"])?;
        debug!("POST {}", url);

        let action = format!("create variable {} in project {}", variable.key, project_id);
        let response = self
            .send(self.request(Method::POST, url).json(variable), &action)
            .await?;
        let created: Variable = response
            .json()
            .await
            .context("Failed to parse created variable")?;

        info!(
            "Created variable {} (environment_scope={}) in project {}",
            created.key, created.environment_scope, project_id
        );
        Ok(created)
    }

    async fn update_variable(&self, project_id: u64, update: &VariableUpdate) -> Result<Variable> {
        let mut url =
            self.endpoint(&["projects", &project_id.to_string(), "variables", &update.key])?;
        url.query_pairs_mut()
            .append_pair("filter[environment_scope]", &update.environment_scope);
        debug!("PUT {}", url);

        let action = format!("update variable {} in project {}", update.key, project_id);
        let body = json!({ "value": update.value });
        let response = self
            .send(self.request(Method::PUT, url).json(&body), &action)
            .await?;
        let updated: Variable = response
            .json()
            .await
            .context("Failed to parse updated variable")?;

        info!(
            "Updated variable {} (environment_scope={}) in project {}",
            updated.key, updated.environment_scope, project_id
        );
        Ok(updated)
    }

    async fn delete_variable(&self, project_id: u64, key: &str) -> Result<()> {
        let url = self.endpoint(&["projects", &project_id.to_string(), "variables", key])?;
        debug!("DELETE {}", url);

        let action = format!("delete variable {} in project {}", key, project_id);
        self.send(self.request(Method::DELETE, url), &action).await?;

        info!("Deleted variable {} in project {}", key, project_id);
        Ok(())
    }

    async fn current_user(&self) -> Result<User> {
        let url = self.endpoint(&["user"])?;
        self.fetch(url, "verify access token").await
    }

    fn instance_url(&self) -> &str {
        &self.instance_url
    }
}
