//! HTTP connector gateway
//!
//! Resolves a registered connector plus per-node overrides into a single
//! outbound HTTP call: connector default headers merge under node headers,
//! auth is applied on top, and the response body is parsed as JSON when it
//! is JSON (raw text otherwise). Non-2xx responses come back as tagged
//! failures carrying the status code and body.
//!
//! JDBC connectors are declared in the model but rejected by this gateway;
//! a database-backed gateway is an integrator concern.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use skein_engine::{ConnectorGateway, ConnectorRequest, ConnectorResponse, JsonMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorKind {
    #[default]
    Rest,
    Jdbc,
}

/// Authentication applied to every call through a connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectorAuth {
    Bearer { token: String },
    Basic { username: String, password: String },
    Header { name: String, value: String },
}

/// A saved connector: base URL, default headers, auth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: ConnectorKind,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub default_headers: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<ConnectorAuth>,
}

impl Connector {
    pub fn rest(id: impl Into<String>, name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ConnectorKind::Rest,
            base_url: base_url.into(),
            default_headers: JsonMap::new(),
            auth: None,
        }
    }
}

/// Reqwest-backed [`ConnectorGateway`] over a fixed set of REST connectors.
pub struct HttpConnectorGateway {
    connectors: HashMap<String, Connector>,
    client: reqwest::Client,
}

impl HttpConnectorGateway {
    pub fn new(connectors: Vec<Connector>) -> Self {
        Self {
            connectors: connectors.into_iter().map(|c| (c.id.clone(), c)).collect(),
            client: reqwest::Client::new(),
        }
    }

    fn build_url(base_url: &str, path: &str) -> String {
        if path.is_empty() {
            return base_url.to_string();
        }
        format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ConnectorGateway for HttpConnectorGateway {
    async fn execute(&self, request: &ConnectorRequest) -> ConnectorResponse {
        let Some(connector) = self.connectors.get(&request.connector_id) else {
            return ConnectorResponse::error(format!("Connector not found: {}", request.connector_id));
        };
        if connector.kind == ConnectorKind::Jdbc {
            return ConnectorResponse::error(format!(
                "Connector '{}' is a JDBC connector; this gateway only handles REST",
                connector.name
            ));
        }

        let method = match request.method.to_ascii_uppercase().as_str() {
            "" | "GET" => reqwest::Method::GET,
            "POST" => reqwest::Method::POST,
            "PUT" => reqwest::Method::PUT,
            "PATCH" => reqwest::Method::PATCH,
            "DELETE" => reqwest::Method::DELETE,
            other => {
                return ConnectorResponse::error(format!("Unsupported HTTP method: {other}"));
            }
        };

        let url = Self::build_url(&connector.base_url, &request.path);
        let mut builder = self.client.request(method, &url);

        // Connector defaults first, node overrides on top.
        for (name, value) in connector.default_headers.iter().chain(request.headers.iter()) {
            builder = builder.header(name.as_str(), header_value(value));
        }
        match &connector.auth {
            Some(ConnectorAuth::Bearer { token }) => {
                builder = builder.bearer_auth(token);
            }
            Some(ConnectorAuth::Basic { username, password }) => {
                builder = builder.basic_auth(username, Some(password));
            }
            Some(ConnectorAuth::Header { name, value }) => {
                builder = builder.header(name.as_str(), value.as_str());
            }
            None => {}
        }
        if !request.body.is_empty() {
            builder = builder.json(&request.body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                log::error!("Connector {} request to {} failed: {}", connector.id, url, err);
                return ConnectorResponse::error(format!("Request failed: {err}"));
            }
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body = parse_body(&text);

        if status.is_success() {
            ConnectorResponse {
                success: true,
                status_code: Some(status.as_u16()),
                body,
                rows: None,
                error: None,
            }
        } else {
            ConnectorResponse {
                success: false,
                status_code: Some(status.as_u16()),
                body,
                rows: None,
                error: Some(format!("HTTP {status}")),
            }
        }
    }
}

fn header_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// JSON bodies parse; anything else comes back as the raw string.
fn parse_body(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_url_joins_slashes() {
        assert_eq!(
            HttpConnectorGateway::build_url("https://api.example.com/", "/users"),
            "https://api.example.com/users"
        );
        assert_eq!(
            HttpConnectorGateway::build_url("https://api.example.com", "users"),
            "https://api.example.com/users"
        );
        assert_eq!(
            HttpConnectorGateway::build_url("https://api.example.com", ""),
            "https://api.example.com"
        );
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body("{\"a\": 1}"), json!({ "a": 1 }));
        assert_eq!(parse_body("plain text"), json!("plain text"));
        assert_eq!(parse_body(""), Value::Null);
    }

    #[tokio::test]
    async fn test_unknown_connector() {
        let gateway = HttpConnectorGateway::new(vec![]);
        let response = gateway
            .execute(&ConnectorRequest {
                connector_id: "ghost".into(),
                ..ConnectorRequest::default()
            })
            .await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("Connector not found"));
    }

    #[tokio::test]
    async fn test_jdbc_connector_rejected() {
        let mut connector = Connector::rest("db", "Warehouse", "");
        connector.kind = ConnectorKind::Jdbc;
        let gateway = HttpConnectorGateway::new(vec![connector]);

        let response = gateway
            .execute(&ConnectorRequest {
                connector_id: "db".into(),
                ..ConnectorRequest::default()
            })
            .await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("JDBC"));
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let gateway = HttpConnectorGateway::new(vec![Connector::rest(
            "api",
            "API",
            "https://api.example.com",
        )]);
        let response = gateway
            .execute(&ConnectorRequest {
                connector_id: "api".into(),
                method: "TRACE".into(),
                ..ConnectorRequest::default()
            })
            .await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("Unsupported HTTP method"));
    }
}
