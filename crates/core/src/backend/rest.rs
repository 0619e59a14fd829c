use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::RwLock;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use crate::config::PortalConfig;
use crate::errors::{CoreError, NO_ROWS_CODE};
use crate::models::record::Row;

use super::query::{Filter, Query};
use super::traits::{AuthUser, IdentityProvider, TableStore};

/// Backend speaking the hosted Postgres REST dialect (`/rest/v1`) and its
/// companion auth API (`/auth/v1`).
///
/// - Every request carries the project `apikey` header.
/// - After a successful sign-in the user's access token replaces the anon
///   key as bearer, so row-level permissions apply.
/// - A single-row fetch that finds nothing (`PGRST116`) is reported as
///   [`CoreError::NotFound`].
pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: RwLock<Option<String>>,
}

impl RestBackend {
    pub fn new(config: &PortalConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        let client = builder
            .build()
            .map_err(|e| CoreError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            api_key: config.anon_key.clone(),
            access_token: RwLock::new(None),
        })
    }

    /// Bearer token currently in use, if a user is signed in.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.access_token
            .read()
            .map(|t| t.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn set_access_token(&self, token: Option<String>) {
        match self.access_token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    fn url(&self, path: &str) -> Result<Url, CoreError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| CoreError::Config(format!("invalid backend URL: {e}")))
    }

    fn table_url(&self, table: &str, filter: &Filter) -> Result<Url, CoreError> {
        let mut url = self.url(&format!("/rest/v1/{table}"))?;
        if !filter.conditions.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (column, value) in &filter.conditions {
                pairs.append_pair(column, &filter_operand(value));
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let bearer = self.access_token().unwrap_or_else(|| self.api_key.clone());
        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(&self.api_key) {
            headers.insert("apikey", v);
        }
        if let Ok(v) = HeaderValue::from_str(&format!("Bearer {bearer}")) {
            headers.insert(AUTHORIZATION, v);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.client.request(method, url).headers(headers)
    }

    async fn rows(table: &str, response: Response) -> Result<Vec<Row>, CoreError> {
        let response = check(table, response).await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let value: Value = serde_json::from_str(&body).map_err(|e| CoreError::Store {
            table: table.to_string(),
            message: format!("Failed to parse response: {e}"),
        })?;
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    other => Err(CoreError::Store {
                        table: table.to_string(),
                        message: format!("expected a row object, got {other}"),
                    }),
                })
                .collect(),
            Value::Object(row) => Ok(vec![row]),
            other => Err(CoreError::Store {
                table: table.to_string(),
                message: format!("unexpected response body: {other}"),
            }),
        }
    }
}

/// `eq.` operand for a filter value; strings are sent unquoted.
fn filter_operand(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        Value::String(s) => format!("eq.{s}"),
        other => format!("eq.{other}"),
    }
}

// ── REST API error body ─────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

async fn check(table: &str, response: Response) -> Result<Response, CoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let parsed: RestErrorBody = serde_json::from_str(&body).unwrap_or_default();
    if parsed.code.as_deref() == Some(NO_ROWS_CODE) {
        return Err(CoreError::NotFound(format!("no row in '{table}'")));
    }
    let message = match (parsed.code, parsed.message) {
        (Some(code), Some(msg)) => format!("{code}: {msg}"),
        (None, Some(msg)) => msg,
        _ if !body.is_empty() => format!("HTTP {} - {}", status.as_u16(), body),
        _ => format!("HTTP {}", status.as_u16()),
    };
    let message = match parsed.details {
        Some(details) => format!("{message} ({details})"),
        None => message,
    };
    Err(CoreError::Store {
        table: table.to_string(),
        message,
    })
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl TableStore for RestBackend {
    fn name(&self) -> &str {
        "REST"
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, CoreError> {
        let mut url = self.table_url(table, &query.filter)?;
        {
            let mut pairs = url.query_pairs_mut();
            let columns = query
                .columns
                .as_ref()
                .map(|c| c.join(","))
                .unwrap_or_else(|| "*".to_string());
            pairs.append_pair("select", &columns);
            if let Some(order) = &query.order {
                let dir = if order.ascending { "asc" } else { "desc" };
                pairs.append_pair("order", &format!("{}.{dir}", order.column));
            }
        }
        let response = self.request(Method::GET, url).send().await?;
        Self::rows(table, response).await
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, CoreError> {
        let url = self.table_url(table, &Filter::all())?;
        let response = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(&rows)
            .send()
            .await?;
        Self::rows(table, response).await
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Row) -> Result<Vec<Row>, CoreError> {
        let url = self.table_url(table, filter)?;
        let response = self
            .request(Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        Self::rows(table, response).await
    }

    async fn upsert(
        &self,
        table: &str,
        rows: Vec<Row>,
        on_conflict: &str,
    ) -> Result<Vec<Row>, CoreError> {
        let mut url = self.table_url(table, &Filter::all())?;
        url.query_pairs_mut().append_pair("on_conflict", on_conflict);
        let response = self
            .request(Method::POST, url)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&rows)
            .send()
            .await?;
        Self::rows(table, response).await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<(), CoreError> {
        let url = self.table_url(table, filter)?;
        let response = self.request(Method::DELETE, url).send().await?;
        check(table, response).await?;
        Ok(())
    }
}

// ── Auth API response types ─────────────────────────────────────────

#[derive(Deserialize)]
struct UserBody {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct SessionBody {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<UserBody>,
    // Sign-up without auto-confirm returns the bare user object.
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize, Default)]
struct AuthErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

async fn auth_error(response: Response) -> CoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let parsed: AuthErrorBody = serde_json::from_str(&body).unwrap_or_default();
    let message = parsed
        .error_description
        .or(parsed.msg)
        .or(parsed.message)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    CoreError::Auth(message)
}

impl RestBackend {
    async fn session(&self, response: Response, email: &str) -> Result<AuthUser, CoreError> {
        if !response.status().is_success() {
            return Err(auth_error(response).await);
        }
        let body: SessionBody = response.json().await.map_err(|e| {
            CoreError::Auth(format!("Failed to parse auth response: {e}"))
        })?;
        if let Some(token) = body.access_token {
            self.set_access_token(Some(token));
        }
        let (id, returned_email) = match body.user {
            Some(user) => (user.id, user.email),
            None => (
                body.id
                    .ok_or_else(|| CoreError::Auth("User creation failed".into()))?,
                body.email,
            ),
        };
        Ok(AuthUser {
            id,
            email: returned_email.unwrap_or_else(|| email.to_string()),
        })
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl IdentityProvider for RestBackend {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthUser, CoreError> {
        let mut url = self.url("/auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        let response = self
            .request(Method::POST, url)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        self.session(response, email).await
    }

    async fn sign_up(&self, email: &str, password: &str, metadata: Row) -> Result<AuthUser, CoreError> {
        let url = self.url("/auth/v1/signup")?;
        let response = self
            .request(Method::POST, url)
            .json(&json!({ "email": email, "password": password, "data": metadata }))
            .send()
            .await?;
        self.session(response, email).await
    }

    async fn sign_out(&self) -> Result<(), CoreError> {
        if self.access_token().is_none() {
            return Ok(());
        }
        let url = self.url("/auth/v1/logout")?;
        let response = self.request(Method::POST, url).send().await?;
        let status = response.status();
        // An expired session is already signed out server-side.
        if !status.is_success() && status != StatusCode::UNAUTHORIZED {
            return Err(auth_error(response).await);
        }
        self.set_access_token(None);
        Ok(())
    }
}
