//! URI grammar of the search engine API.
//!
//! `{domain}` is `http://{host}:{port}`. Document and search URIs go through
//! the `type` alias so they always hit the live generation.

use searchsync_types::{CollectionDescriptor, DocumentId, SearchEndpoint};

/// `{domain}/{type}`
pub fn alias_uri(collection: &CollectionDescriptor) -> String {
    format!("{}/{}", collection.endpoint.domain(), collection.type_name)
}

/// `{domain}/{type}/{type}/{id}` with the id percent-encoded.
pub fn document_uri(collection: &CollectionDescriptor, id: &DocumentId) -> String {
    format!(
        "{}/{}/{}",
        alias_uri(collection),
        collection.type_name,
        urlencoding::encode(id.as_str())
    )
}

/// [`document_uri`] with `require_alias=true`, so a write made while no
/// generation is live fails instead of auto-creating a concrete index
/// named `{type}`.
pub fn indexing_uri(collection: &CollectionDescriptor, id: &DocumentId) -> String {
    format!("{}?require_alias=true", document_uri(collection, id))
}

/// `{domain}/{type}/_search`
pub fn search_uri(collection: &CollectionDescriptor) -> String {
    format!("{}/_search", alias_uri(collection))
}

/// `{domain}/_aliases`
pub fn aliases_uri(endpoint: &SearchEndpoint) -> String {
    format!("{}/_aliases", endpoint.domain())
}

/// `{domain}/{generation}`
pub fn generation_uri(endpoint: &SearchEndpoint, generation: &str) -> String {
    format!("{}/{}", endpoint.domain(), generation)
}

/// `{domain}/{generation}/_bulk`
pub fn bulk_uri(endpoint: &SearchEndpoint, generation: &str) -> String {
    format!("{}/_bulk", generation_uri(endpoint, generation))
}

/// `{domain}/_refresh`
pub fn refresh_uri(endpoint: &SearchEndpoint) -> String {
    format!("{}/_refresh", endpoint.domain())
}
