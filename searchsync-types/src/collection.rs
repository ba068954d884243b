//! Collection descriptors and index generation names.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters a search engine rejects in index and alias names.
const FORBIDDEN_NAME_CHARS: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ' ', ',', '#', ':'];

/// Length of the lower-cased generation timestamp, e.g. `20261016t120000123z`.
const GENERATION_STAMP_LEN: usize = 19;

/// Connection parameters of a search engine node plus the base index name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchEndpoint {
    /// Host name of the search node.
    pub host: String,
    /// HTTP port of the search node.
    pub port: u16,
    /// Base name every generation is prefixed with.
    pub index: String,
}

impl Default for SearchEndpoint {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9200,
            index: "index".to_string(),
        }
    }
}

impl SearchEndpoint {
    /// Returns `http://{host}:{port}`.
    #[must_use]
    pub fn domain(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Identifies a logical record type and where its search index lives.
///
/// `type_name` doubles as the search engine document type and as the alias
/// that always points at the current generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(flatten)]
    pub endpoint: SearchEndpoint,
}

impl CollectionDescriptor {
    /// Creates a descriptor with an explicit type name and endpoint.
    pub fn new(type_name: impl Into<String>, endpoint: SearchEndpoint) -> Self {
        Self {
            type_name: type_name.into(),
            endpoint,
        }
    }

    /// Creates a descriptor for a store collection with default endpoint
    /// settings. The lower-cased collection name becomes the type.
    pub fn for_collection(collection: &str) -> Self {
        Self::new(collection.to_lowercase(), SearchEndpoint::default())
    }

    /// Replaces the endpoint (builder style).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: SearchEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Checks that the type and base index are usable as index/alias names.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.type_name)?;
        validate_name(&self.endpoint.index)?;
        if self.endpoint.host.is_empty() {
            return Err(Error::InvalidName {
                name: self.endpoint.host.clone(),
                reason: "host must not be empty",
            });
        }
        Ok(())
    }

    /// Prefix shared by every generation of this collection.
    #[must_use]
    pub fn generation_prefix(&self) -> String {
        format!("{}-{}-", self.endpoint.index, self.type_name).to_lowercase()
    }
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(Error::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("must not be empty");
    }
    if name == "." || name == ".." {
        return invalid("must not be . or ..");
    }
    if name.starts_with(['-', '_', '+']) {
        return invalid("must not start with -, _ or +");
    }
    if name.chars().any(|c| c.is_uppercase()) {
        return invalid("must be lower case");
    }
    if name.contains(FORBIDDEN_NAME_CHARS) {
        return invalid("contains a forbidden character");
    }
    Ok(())
}

/// Physical name of one index generation:
/// `{baseIndex}-{type}-{timestamp}`, lower-cased.
///
/// The timestamp uses the ISO-8601 basic format with millisecond precision
/// (`20261016t120000123z`); colons are not allowed in index names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationName(String);

impl GenerationName {
    /// Names the generation of `collection` created at `at`.
    #[must_use]
    pub fn new(collection: &CollectionDescriptor, at: DateTime<Utc>) -> Self {
        let stamp = format!(
            "{}{:03}z",
            at.format("%Y%m%dt%H%M%S"),
            at.timestamp_subsec_millis().min(999)
        );
        Self(format!("{}{}", collection.generation_prefix(), stamp).to_lowercase())
    }

    /// Returns true if `index_name` is a generation of `collection`.
    ///
    /// Requires the exact generation prefix followed by a well-formed
    /// timestamp, so type `cat` never claims `index-catalog-…`.
    #[must_use]
    pub fn belongs_to(collection: &CollectionDescriptor, index_name: &str) -> bool {
        index_name
            .strip_prefix(&collection.generation_prefix())
            .is_some_and(parse_stamp)
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn parse_stamp(stamp: &str) -> bool {
    if !stamp.is_ascii() || stamp.len() != GENERATION_STAMP_LEN || !stamp.ends_with('z') {
        return false;
    }
    let (seconds, millis) = stamp[..GENERATION_STAMP_LEN - 1].split_at(15);
    millis.chars().all(|c| c.is_ascii_digit())
        && NaiveDateTime::parse_from_str(seconds, "%Y%m%dt%H%M%S").is_ok()
}

impl fmt::Display for GenerationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GenerationName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
