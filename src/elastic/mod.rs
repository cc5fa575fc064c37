//! Façade over the Elasticsearch HTTP API: bulk, multiget, scroll, count and
//! update-by-query, plus ensure-once creation of indices, aliases, templates
//! and policies.

use crate::errors::IndexerError;
use anyhow::anyhow;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Mutex;
use url::Url;

/// Names of the chain indices.
pub mod indices {
    pub const BLOCKS: &str = "blocks";
    pub const MINIBLOCKS: &str = "miniblocks";
    pub const TRANSACTIONS: &str = "transactions";
    pub const SCRESULTS: &str = "scresults";
    pub const RECEIPTS: &str = "receipts";
    pub const ACCOUNTS: &str = "accounts";
    pub const ACCOUNTS_ESDT: &str = "accountsesdt";
    pub const ACCOUNTS_HISTORY: &str = "accountshistory";
    pub const ACCOUNTS_ESDT_HISTORY: &str = "accountsesdthistory";
    pub const TOKENS: &str = "tokens";
    pub const LOGS: &str = "logs";
    pub const EVENTS: &str = "events";
    pub const DELEGATORS: &str = "delegators";
    pub const ROUNDS: &str = "rounds";
    pub const RATING: &str = "rating";
    pub const VALIDATORS: &str = "validators";
    pub const EPOCH_INFO: &str = "epochinfo";
    pub const SC_DEPLOYS: &str = "scdeploys";
    pub const OPERATIONS: &str = "operations";
    pub const TOKENS_INFO: &str = "tokensinfo";
    pub const TAGS: &str = "tags";

    pub const ALL: &[&str] = &[
        BLOCKS,
        MINIBLOCKS,
        TRANSACTIONS,
        SCRESULTS,
        RECEIPTS,
        ACCOUNTS,
        ACCOUNTS_ESDT,
        ACCOUNTS_HISTORY,
        ACCOUNTS_ESDT_HISTORY,
        TOKENS,
        LOGS,
        EVENTS,
        DELEGATORS,
        ROUNDS,
        RATING,
        VALIDATORS,
        EPOCH_INFO,
        SC_DEPLOYS,
        OPERATIONS,
        TOKENS_INFO,
        TAGS,
    ];
}

/// One document of a multiget response, in request order.
#[derive(Clone, Debug, Deserialize)]
pub struct MultiGetDoc {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub found: bool,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

/// One hit collected while draining a scroll cursor.
#[derive(Clone, Debug, Deserialize)]
pub struct ScrollHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

/// The database seam the orchestrator writes through. Methods return boxed
/// futures so the trait stays object-safe.
pub trait DatabaseClient: Send + Sync {
    fn do_bulk_request<'a>(
        &'a self,
        index: &'a str,
        buffer: &'a [u8],
    ) -> BoxFuture<'a, Result<(), IndexerError>>;

    fn do_multi_get<'a>(
        &'a self,
        index: &'a str,
        ids: &'a [String],
        with_source: bool,
    ) -> BoxFuture<'a, Result<Vec<MultiGetDoc>, IndexerError>>;

    /// Runs a scrolled search and returns every hit. The adapter drives the
    /// cursor; callers only shape the query body.
    fn do_scroll<'a>(
        &'a self,
        index: &'a str,
        body: Value,
    ) -> BoxFuture<'a, Result<Vec<ScrollHit>, IndexerError>>;

    fn do_count<'a>(
        &'a self,
        index: &'a str,
        body: Value,
    ) -> BoxFuture<'a, Result<u64, IndexerError>>;

    fn update_by_query<'a>(
        &'a self,
        index: &'a str,
        body: Value,
    ) -> BoxFuture<'a, Result<(), IndexerError>>;

    fn check_and_create_index<'a>(&'a self, index: &'a str)
        -> BoxFuture<'a, Result<(), IndexerError>>;

    fn check_and_create_alias<'a>(
        &'a self,
        alias: &'a str,
        index: &'a str,
    ) -> BoxFuture<'a, Result<(), IndexerError>>;

    fn check_and_create_template<'a>(
        &'a self,
        name: &'a str,
        template: &'a Value,
    ) -> BoxFuture<'a, Result<(), IndexerError>>;

    fn check_and_create_policy<'a>(
        &'a self,
        name: &'a str,
        policy: &'a Value,
    ) -> BoxFuture<'a, Result<(), IndexerError>>;
}

/// HTTP-backed client. Safe for concurrent reads; bulk writes are issued
/// from the single dispatcher task.
pub struct ElasticClient {
    http: reqwest::Client,
    base: Url,
    /// Indices/aliases/templates/policies already verified this process.
    ensured: Mutex<HashSet<String>>,
}

impl ElasticClient {
    pub fn new(base: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
            ensured: Mutex::new(HashSet::new()),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, IndexerError> {
        self.base
            .join(path)
            .map_err(|err| IndexerError::Input(format!("bad endpoint {path}: {err}")))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, IndexerError> {
        let response = request
            .send()
            .await
            .map_err(|err| IndexerError::Backend(anyhow!(err)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(IndexerError::Backend(anyhow!("status {status}: {body}")));
        }
        Err(IndexerError::Input(format!("status {status}: {body}")))
    }

    async fn exists(&self, path: &str) -> Result<bool, IndexerError> {
        let response = self
            .http
            .head(self.endpoint(path)?)
            .send()
            .await
            .map_err(|err| IndexerError::Backend(anyhow!(err)))?;
        Ok(response.status().is_success())
    }

    /// Runs `create` unless the named resource was already verified by this
    /// process or exists on the backend.
    async fn ensure_once<F>(&self, key: String, check_path: &str, create: F) -> Result<(), IndexerError>
    where
        F: std::future::Future<Output = Result<(), IndexerError>>,
    {
        if self.ensured.lock().expect("not poisoned").contains(&key) {
            return Ok(());
        }
        if !self.exists(check_path).await? {
            create.await?;
        }
        self.ensured.lock().expect("not poisoned").insert(key);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

/// Digs the first per-item failure reason out of a bulk response.
fn first_bulk_error(items: &[Value]) -> Option<String> {
    items.iter().find_map(|item| {
        let (_, action) = item.as_object()?.iter().next()?;
        let error = action.get("error")?;
        Some(
            error
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
        )
    })
}

impl DatabaseClient for ElasticClient {
    fn do_bulk_request<'a>(
        &'a self,
        index: &'a str,
        buffer: &'a [u8],
    ) -> BoxFuture<'a, Result<(), IndexerError>> {
        async move {
            // Metas carry their own `_index`; an empty index targets the
            // top-level bulk endpoint.
            let path = if index.is_empty() {
                "_bulk".to_string()
            } else {
                format!("{index}/_bulk")
            };
            let url = self.endpoint(&path)?;
            let response = self
                .send(
                    self.http
                        .post(url)
                        .header("Content-Type", "application/x-ndjson")
                        .body(buffer.to_vec()),
                )
                .await?;

            let parsed: BulkResponse = response
                .json()
                .await
                .map_err(|err| IndexerError::Backend(anyhow!(err)))?;
            if parsed.errors {
                let reason = first_bulk_error(&parsed.items)
                    .unwrap_or_else(|| "unknown bulk failure".to_string());
                return Err(IndexerError::PartialBulk {
                    index: index.to_string(),
                    reason,
                });
            }
            Ok(())
        }
        .boxed()
    }

    fn do_multi_get<'a>(
        &'a self,
        index: &'a str,
        ids: &'a [String],
        with_source: bool,
    ) -> BoxFuture<'a, Result<Vec<MultiGetDoc>, IndexerError>> {
        async move {
            #[derive(Deserialize)]
            struct MultiGetResponse {
                docs: Vec<MultiGetDoc>,
            }

            let mut url = self.endpoint(&format!("{index}/_mget"))?;
            if !with_source {
                url.query_pairs_mut().append_pair("_source", "false");
            }
            let response = self.send(self.http.post(url).json(&json!({ "ids": ids }))).await?;
            let parsed: MultiGetResponse = response
                .json()
                .await
                .map_err(|err| IndexerError::Backend(anyhow!(err)))?;
            Ok(parsed.docs)
        }
        .boxed()
    }

    fn do_scroll<'a>(
        &'a self,
        index: &'a str,
        body: Value,
    ) -> BoxFuture<'a, Result<Vec<ScrollHit>, IndexerError>> {
        async move {
            #[derive(Deserialize)]
            struct SearchResponse {
                #[serde(rename = "_scroll_id")]
                scroll_id: Option<String>,
                hits: SearchHits,
            }
            #[derive(Deserialize)]
            struct SearchHits {
                hits: Vec<ScrollHit>,
            }

            let url = self.endpoint(&format!("{index}/_search?scroll=2m"))?;
            let response = self.send(self.http.post(url).json(&body)).await?;
            let mut page: SearchResponse = response
                .json()
                .await
                .map_err(|err| IndexerError::Backend(anyhow!(err)))?;

            let mut hits = Vec::new();
            loop {
                if page.hits.hits.is_empty() {
                    break;
                }
                hits.extend(page.hits.hits);

                let Some(scroll_id) = page.scroll_id.clone() else {
                    break;
                };
                let url = self.endpoint("_search/scroll")?;
                let response = self
                    .send(
                        self.http
                            .post(url)
                            .json(&json!({ "scroll": "2m", "scroll_id": scroll_id })),
                    )
                    .await?;
                page = response
                    .json()
                    .await
                    .map_err(|err| IndexerError::Backend(anyhow!(err)))?;
            }

            if let Some(scroll_id) = page.scroll_id {
                let url = self.endpoint("_search/scroll")?;
                // Cursor cleanup failures don't affect the collected hits.
                let _ = self
                    .http
                    .delete(url)
                    .json(&json!({ "scroll_id": scroll_id }))
                    .send()
                    .await;
            }
            Ok(hits)
        }
        .boxed()
    }

    fn do_count<'a>(
        &'a self,
        index: &'a str,
        body: Value,
    ) -> BoxFuture<'a, Result<u64, IndexerError>> {
        async move {
            #[derive(Deserialize)]
            struct CountResponse {
                count: u64,
            }

            let url = self.endpoint(&format!("{index}/_count"))?;
            let response = self.send(self.http.post(url).json(&body)).await?;
            let parsed: CountResponse = response
                .json()
                .await
                .map_err(|err| IndexerError::Backend(anyhow!(err)))?;
            Ok(parsed.count)
        }
        .boxed()
    }

    fn update_by_query<'a>(
        &'a self,
        index: &'a str,
        body: Value,
    ) -> BoxFuture<'a, Result<(), IndexerError>> {
        async move {
            let url = self.endpoint(&format!("{index}/_update_by_query"))?;
            self.send(self.http.post(url).json(&body)).await?;
            Ok(())
        }
        .boxed()
    }

    fn check_and_create_index<'a>(
        &'a self,
        index: &'a str,
    ) -> BoxFuture<'a, Result<(), IndexerError>> {
        async move {
            let create = async {
                tracing::debug!(%index, "creating index");
                let url = self.endpoint(index)?;
                self.send(self.http.put(url)).await?;
                Ok(())
            };
            self.ensure_once(format!("index:{index}"), index, create).await
        }
        .boxed()
    }

    fn check_and_create_alias<'a>(
        &'a self,
        alias: &'a str,
        index: &'a str,
    ) -> BoxFuture<'a, Result<(), IndexerError>> {
        async move {
            let create = async {
                tracing::debug!(%alias, %index, "creating alias");
                let url = self.endpoint("_aliases")?;
                let body = json!({ "actions": [{ "add": { "index": index, "alias": alias } }] });
                self.send(self.http.post(url).json(&body)).await?;
                Ok(())
            };
            self.ensure_once(format!("alias:{alias}"), &format!("_alias/{alias}"), create)
                .await
        }
        .boxed()
    }

    fn check_and_create_template<'a>(
        &'a self,
        name: &'a str,
        template: &'a Value,
    ) -> BoxFuture<'a, Result<(), IndexerError>> {
        async move {
            let path = format!("_template/{name}");
            let create = async {
                tracing::debug!(%name, "creating template");
                let url = self.endpoint(&path)?;
                self.send(self.http.put(url).json(template)).await?;
                Ok(())
            };
            self.ensure_once(format!("template:{name}"), &path, create).await
        }
        .boxed()
    }

    fn check_and_create_policy<'a>(
        &'a self,
        name: &'a str,
        policy: &'a Value,
    ) -> BoxFuture<'a, Result<(), IndexerError>> {
        async move {
            let path = format!("_ilm/policy/{name}");
            let create = async {
                tracing::debug!(%name, "creating policy");
                let url = self.endpoint(&path)?;
                self.send(self.http.put(url).json(policy)).await?;
                Ok(())
            };
            self.ensure_once(format!("policy:{name}"), &path, create).await
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_bulk_error_reason() {
        let items = vec![
            json!({ "update": { "_id": "a", "status": 200 } }),
            json!({ "index": { "_id": "b", "status": 400, "error": {
                "type": "mapper_parsing_exception",
                "reason": "failed to parse field [timestamp]"
            } } }),
            json!({ "index": { "_id": "c", "status": 400, "error": { "reason": "other" } } }),
        ];

        assert_eq!(
            first_bulk_error(&items).unwrap(),
            "failed to parse field [timestamp]"
        );
        assert_eq!(first_bulk_error(&[json!({ "index": { "_id": "a" } })]), None);
    }
}
