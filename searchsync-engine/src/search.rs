//! Read-side helpers: querying through the alias and forcing a refresh.
//!
//! The query string is passed to the engine untouched; parsing and ranking
//! stay with the search engine.

use crate::error::{IndexError, IndexResult};
use crate::retry::RetryExecutor;
use crate::transport::{HttpRequest, Method};
use crate::uri;
use searchsync_types::{CollectionDescriptor, SearchEndpoint};
use serde_json::{Value, json};

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Physical generation that served the hit.
    pub index: String,
    /// Document id.
    pub id: String,
    /// Stored document body.
    pub source: Value,
}

/// Result page of a search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHits {
    /// Total matching documents.
    pub total: u64,
    /// Returned hits.
    pub hits: Vec<SearchHit>,
}

/// Queries collections through their alias.
#[derive(Clone)]
pub struct SearchClient {
    executor: RetryExecutor,
}

impl SearchClient {
    /// Creates a search client.
    pub fn new(executor: RetryExecutor) -> Self {
        Self { executor }
    }

    /// Runs a `query_string` query against the live generation.
    pub async fn search(
        &self,
        collection: &CollectionDescriptor,
        query: &str,
    ) -> IndexResult<SearchHits> {
        let body = json!({ "query": { "query_string": { "query": query } } });
        let request = HttpRequest::json(
            Method::Post,
            uri::search_uri(collection),
            body.to_string(),
        );
        let reply = self.executor.execute(request).await?;
        if reply.is_error() {
            return Err(IndexError::unexpected("search", &reply.body));
        }
        parse_hits(&reply.body).ok_or_else(|| IndexError::unexpected("search", &reply.body))
    }

    /// Makes every write so far visible to searches.
    pub async fn refresh(&self, endpoint: &SearchEndpoint) -> IndexResult<()> {
        let request = HttpRequest::new(Method::Post, uri::refresh_uri(endpoint));
        let reply = self.executor.execute(request).await?;
        if reply.is_error() {
            return Err(IndexError::unexpected("refresh", &reply.body));
        }
        Ok(())
    }
}

fn parse_hits(body: &Value) -> Option<SearchHits> {
    let hits = body.get("hits")?;

    // Older engines report a bare number, newer ones `{ "value": n }`.
    let total = match hits.get("total")? {
        Value::Object(total) => total.get("value")?.as_u64()?,
        total => total.as_u64()?,
    };

    let hits = hits
        .get("hits")?
        .as_array()?
        .iter()
        .map(|hit| SearchHit {
            index: hit["_index"].as_str().unwrap_or_default().to_string(),
            id: hit["_id"].as_str().unwrap_or_default().to_string(),
            source: hit.get("_source").cloned().unwrap_or(Value::Null),
        })
        .collect();

    Some(SearchHits { total, hits })
}
