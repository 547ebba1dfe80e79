// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use bizdesk_app::{ListPage, ListQuery, RowId, ViewSet, ViewSetProvider};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Blocking client for a DRF-style REST backend.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    timeout: Duration,
    token: Option<String>,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration, token: Option<&str>) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            bail!("api.base_url must not be empty");
        }
        let base_url = Url::parse(trimmed)
            .with_context(|| format!("api.base_url {trimmed:?} is not a valid URL"))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            bail!("api.base_url {trimmed:?} must be an absolute http(s) URL");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            token: token
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_owned),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn view_set(&self, entity: &str) -> HttpViewSet<'_> {
        HttpViewSet {
            client: self,
            entity: entity.to_owned(),
        }
    }

    /// `<base_url>/<segments...>/`, with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| anyhow!("api.base_url cannot carry a path"))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
            path.push("");
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        tracing::debug!(%method, %url, "backend request");
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .map_err(|error| connection_error(self.base_url.as_str(), error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }
        Ok(response)
    }

    fn send_json(&self, request: RequestBuilder, what: &str) -> Result<Value> {
        let response = self.send(request)?;
        let body = response
            .text()
            .with_context(|| format!("read {what} response"))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).with_context(|| format!("decode {what} response"))
    }
}

impl ViewSetProvider for Client {
    fn view_set(&self, entity: &str) -> Box<dyn ViewSet + '_> {
        Box::new(Client::view_set(self, entity))
    }
}

/// One entity's endpoints on a [`Client`].
#[derive(Debug, Clone)]
pub struct HttpViewSet<'a> {
    client: &'a Client,
    entity: String,
}

impl ViewSet for HttpViewSet<'_> {
    fn entity(&self) -> &str {
        &self.entity
    }

    fn options(&self) -> Result<Value> {
        let url = self.client.endpoint(&[&self.entity])?;
        let request = self.client.request(Method::OPTIONS, url);
        self.client
            .send_json(request, &format!("{} schema", self.entity))
    }

    fn list(&self, query: &ListQuery) -> Result<ListPage> {
        let mut url = self.client.endpoint(&[&self.entity])?;
        let pairs = query.pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        let request = self.client.request(Method::GET, url);
        let body = self
            .client
            .send_json(request, &format!("{} list", self.entity))?;
        ListPage::from_response(body).with_context(|| format!("decode {} list", self.entity))
    }

    fn retrieve(&self, id: &RowId) -> Result<Value> {
        let url = self.client.endpoint(&[&self.entity, id.as_str()])?;
        let request = self.client.request(Method::GET, url);
        self.client
            .send_json(request, &format!("{} {id}", self.entity))
    }

    fn create(&self, data: &Value) -> Result<Value> {
        let url = self.client.endpoint(&[&self.entity])?;
        let request = self.client.request(Method::POST, url).json(data);
        self.client
            .send_json(request, &format!("{} create", self.entity))
    }

    fn update(&self, id: &RowId, data: &Value) -> Result<Value> {
        let url = self.client.endpoint(&[&self.entity, id.as_str()])?;
        let request = self.client.request(Method::PATCH, url).json(data);
        self.client
            .send_json(request, &format!("{} update", self.entity))
    }

    fn delete(&self, id: &RowId) -> Result<()> {
        let url = self.client.endpoint(&[&self.entity, id.as_str()])?;
        let request = self.client.request(Method::DELETE, url);
        self.client.send(request)?;
        Ok(())
    }
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    anyhow!(
        "cannot reach {} -- check [api].base_url and that the backend is running ({})",
        base_url.trim_end_matches('/'),
        error
    )
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<Value>(body)
        && let Some(detail) = error_detail(&parsed)
    {
        return anyhow!("server error ({}): {}", status.as_u16(), detail);
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() < 100 && !trimmed.contains('{') && !trimmed.contains('<')
    {
        return anyhow!("server error ({}): {}", status.as_u16(), trimmed);
    }

    anyhow!("server returned {}", status.as_u16())
}

/// Best-effort message from a DRF error payload.
fn error_detail(body: &Value) -> Option<String> {
    match body {
        Value::Object(map) => {
            if let Some(Value::String(detail)) = map.get("detail")
                && !detail.is_empty()
            {
                return Some(detail.clone());
            }
            if let Some(message) = map.get("non_field_errors").and_then(first_message) {
                return Some(message);
            }
            map.iter().find_map(|(field, errors)| {
                first_message(errors).map(|message| format!("{field}: {message}"))
            })
        }
        Value::Array(_) => first_message(body),
        _ => None,
    }
}

fn first_message(errors: &Value) -> Option<String> {
    match errors {
        Value::String(message) if !message.is_empty() => Some(message.clone()),
        Value::Array(items) => items.iter().find_map(first_message),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{Client, clean_error_response};
    use reqwest::StatusCode;
    use std::time::Duration;

    #[test]
    fn error_detail_prefers_detail_then_non_field_then_first_field() {
        let detail = clean_error_response(
            StatusCode::FORBIDDEN,
            r#"{"detail": "You do not have permission to perform this action."}"#,
        );
        assert_eq!(
            detail.to_string(),
            "server error (403): You do not have permission to perform this action."
        );

        let non_field = clean_error_response(
            StatusCode::BAD_REQUEST,
            r#"{"non_field_errors": ["Dates overlap."], "name": ["Too long."]}"#,
        );
        assert_eq!(non_field.to_string(), "server error (400): Dates overlap.");

        let field = clean_error_response(
            StatusCode::BAD_REQUEST,
            r#"{"account_name": ["This field is required."]}"#,
        );
        assert_eq!(
            field.to_string(),
            "server error (400): account_name: This field is required."
        );
    }

    #[test]
    fn plain_and_unusable_bodies() {
        let plain = clean_error_response(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(plain.to_string(), "server error (502): upstream down");

        let html = clean_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "<html><body>Server Error</body></html>",
        );
        assert_eq!(html.to_string(), "server returned 500");

        let empty_json = clean_error_response(StatusCode::NOT_FOUND, "{}");
        assert_eq!(empty_json.to_string(), "server returned 404");
    }

    #[test]
    fn endpoints_nest_under_base_path() -> anyhow::Result<()> {
        let client = Client::new("http://localhost:8000/api/", Duration::from_secs(1), None)?;
        assert_eq!(
            client.endpoint(&["accounts"])?.as_str(),
            "http://localhost:8000/api/accounts/"
        );
        assert_eq!(
            client.endpoint(&["accounts", "42"])?.as_str(),
            "http://localhost:8000/api/accounts/42/"
        );

        let bare = Client::new("http://localhost:8000", Duration::from_secs(1), None)?;
        assert_eq!(
            bare.endpoint(&["orders"])?.as_str(),
            "http://localhost:8000/orders/"
        );
        Ok(())
    }

    #[test]
    fn rejects_non_http_base_urls() {
        assert!(Client::new("", Duration::from_secs(1), None).is_err());
        assert!(Client::new("ftp://example.com", Duration::from_secs(1), None).is_err());
        assert!(Client::new("localhost:8000/api", Duration::from_secs(1), None).is_err());
    }
}
