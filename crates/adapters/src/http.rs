use std::error::Error as _;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use rowscope_core::catalog::{BackendMode, CatalogBackend, ColumnDescriptor, TableDescriptor};
use rowscope_core::error::ApiError;
use rowscope_core::mutation::{MutationBackend, RowPayload};
use rowscope_core::pagination::{PageBackend, PageRequest, PageWindow};
use rowscope_core::query_runner::{QueryBackend, QueryResult};
use rowscope_core::row_identity::PrimaryKey;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpBackendError {
    #[error("invalid backend url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("backend url `{0}` cannot be used as a base")]
    NotABase(String),
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    sql: &'a str,
}

/// Talks to the JSON REST API under `<base>/api`. Requests carry no client
/// timeout; a slow backend answer is waited for.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, HttpBackendError> {
        let trimmed = base_url.trim();
        let parsed = Url::parse(trimmed).map_err(|error| HttpBackendError::InvalidUrl {
            url: trimmed.to_string(),
            reason: error.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(HttpBackendError::NotABase(trimmed.to_string()));
        }

        let client = Client::builder()
            .build()
            .map_err(HttpBackendError::Client)?;

        Ok(Self {
            client,
            base_url: parsed,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `<base>/api/<segments...>`, each segment percent-encoded.
    #[must_use]
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").extend(segments);
        }
        url
    }

    fn rows_endpoint(&self, table: &str) -> Url {
        self.endpoint(&["tables", table, "rows"])
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let (status, body) = execute(request).await?;
        decode_response(status, &body)
    }

    async fn submit(&self, request: RequestBuilder) -> Result<(), ApiError> {
        let (status, body) = execute(request).await?;
        check_status(status, &body)
    }
}

async fn execute(request: RequestBuilder) -> Result<(u16, Vec<u8>), ApiError> {
    let response = request.send().await.map_err(|error| transport_error(&error))?;
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|error| transport_error(&error))?;
    log::debug!("backend answered {status} ({} bytes)", body.len());
    Ok((status, body.to_vec()))
}

fn transport_error(error: &reqwest::Error) -> ApiError {
    let mut message = error.to_string();
    let mut cause = error.source();
    while let Some(inner) = cause {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        cause = inner.source();
    }
    ApiError::transport(message)
}

/// Non-2xx statuses become [`ApiError::Backend`] whatever the body holds.
pub fn check_status(status: u16, body: &[u8]) -> Result<(), ApiError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(ApiError::from_error_body(status, body))
    }
}

pub fn decode_response<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T, ApiError> {
    check_status(status, body)?;
    serde_json::from_slice(body).map_err(|error| ApiError::parse(error.to_string()))
}

#[async_trait]
impl CatalogBackend for HttpBackend {
    async fn list_tables(&self) -> Result<Vec<TableDescriptor>, ApiError> {
        let url = self.endpoint(&["tables"]);
        let tables: Option<Vec<TableDescriptor>> = self.fetch(self.client.get(url)).await?;
        Ok(tables.unwrap_or_default())
    }

    async fn fetch_schema(&self, table: &str) -> Result<Vec<ColumnDescriptor>, ApiError> {
        let url = self.endpoint(&["tables", table, "schema"]);
        let columns: Option<Vec<ColumnDescriptor>> = self.fetch(self.client.get(url)).await?;
        Ok(columns.unwrap_or_default())
    }

    async fn fetch_mode(&self) -> Result<BackendMode, ApiError> {
        self.fetch(self.client.get(self.endpoint(&["mode"]))).await
    }
}

#[async_trait]
impl PageBackend for HttpBackend {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageWindow, ApiError> {
        let url = self.endpoint(&["tables", request.table.as_str(), "data"]);
        let query = [
            ("page", request.page.to_string()),
            ("limit", request.limit.to_string()),
        ];
        self.fetch(self.client.get(url).query(&query)).await
    }
}

#[async_trait]
impl MutationBackend for HttpBackend {
    async fn insert_row(&self, table: &str, values: &RowPayload) -> Result<(), ApiError> {
        let request = self.client.post(self.rows_endpoint(table)).json(values);
        self.submit(request).await
    }

    async fn update_row(
        &self,
        table: &str,
        key: &PrimaryKey,
        values: &RowPayload,
    ) -> Result<(), ApiError> {
        let request = self
            .client
            .put(self.rows_endpoint(table))
            .query(&key_query(key))
            .json(values);
        self.submit(request).await
    }

    async fn delete_row(&self, table: &str, key: &PrimaryKey) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.rows_endpoint(table))
            .query(&key_query(key));
        self.submit(request).await
    }
}

#[async_trait]
impl QueryBackend for HttpBackend {
    async fn run_query(&self, sql: &str) -> Result<QueryResult, ApiError> {
        let request = self
            .client
            .post(self.endpoint(&["query"]))
            .json(&QueryRequest { sql });
        self.fetch(request).await
    }
}

fn key_query(key: &PrimaryKey) -> [(&'static str, String); 2] {
    [("pk", key.column.clone()), ("pk_value", key.value_param())]
}

#[cfg(test)]
mod tests {
    use rowscope_core::catalog::BackendMode;
    use rowscope_core::error::ApiError;
    use rowscope_core::pagination::PageWindow;
    use rowscope_core::row_identity::PrimaryKey;
    use serde_json::json;

    use super::{check_status, decode_response, key_query, HttpBackend, HttpBackendError};

    #[test]
    fn endpoints_nest_under_api_and_encode_table_names() {
        let backend = HttpBackend::new("http://localhost:8080").expect("valid url");
        assert_eq!(
            backend.endpoint(&["tables", "users", "data"]).as_str(),
            "http://localhost:8080/api/tables/users/data"
        );
        assert_eq!(
            backend.endpoint(&["tables", "order items", "rows"]).as_str(),
            "http://localhost:8080/api/tables/order%20items/rows"
        );
    }

    #[test]
    fn endpoints_keep_a_base_path_prefix() {
        let backend = HttpBackend::new(" https://db.example.com/admin/ ").expect("valid url");
        assert_eq!(
            backend.endpoint(&["mode"]).as_str(),
            "https://db.example.com/admin/api/mode"
        );
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(matches!(
            HttpBackend::new("localhost 8080"),
            Err(HttpBackendError::InvalidUrl { .. })
        ));
        assert!(matches!(
            HttpBackend::new("mailto:dba@example.com"),
            Err(HttpBackendError::NotABase(_))
        ));
    }

    #[test]
    fn error_bodies_become_backend_errors() {
        let err = check_status(400, br#"{"error":"duplicate key"}"#)
            .expect_err("400 should fail");
        assert_eq!(err, ApiError::backend(400, "duplicate key"));

        let err = check_status(502, b"<html>bad gateway</html>").expect_err("502 should fail");
        assert_eq!(err.user_message(), "request failed with status 502");

        assert!(check_status(201, br#"{"message":"Row inserted successfully"}"#).is_ok());
    }

    #[test]
    fn success_bodies_decode_or_report_parse_errors() {
        let mode: BackendMode =
            decode_response(200, br#"{"readonly":true}"#).expect("mode should decode");
        assert!(mode.readonly);

        let window: PageWindow = decode_response(
            200,
            br#"{"columns":["id"],"rows":null,"total":0,"page":1,"limit":50}"#,
        )
        .expect("empty page should decode");
        assert!(window.rows.is_empty());

        let err = decode_response::<PageWindow>(200, b"not json").expect_err("should fail");
        assert!(matches!(err, ApiError::Parse(_)));
    }

    #[test]
    fn key_query_uses_text_form_of_the_value() {
        assert_eq!(
            key_query(&PrimaryKey::new("id", json!(42))),
            [("pk", "id".to_string()), ("pk_value", "42".to_string())]
        );
        assert_eq!(
            key_query(&PrimaryKey::new("code", json!("a b"))),
            [("pk", "code".to_string()), ("pk_value", "a b".to_string())]
        );
    }
}
