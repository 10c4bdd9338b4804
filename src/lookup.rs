//! Best-effort lookup of OSM tag keys and values.
//!
//! The rebuild asks a [`TagLookup`] whether an unknown column is a real tag
//! key and which keys carry an unknown mapping value. Answers are advisory:
//! any transport or decoding failure degrades to "not found".

use std::time::Duration;

use log::{debug, warn};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::Deserialize;

pub const DEFAULT_TAGFINDER_URL: &str = "http://tagfinder.herokuapp.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub trait TagLookup {
    /// Whether `key` is a known tag key.
    fn key_exists(&self, key: &str) -> bool;

    /// Keys `k` for which `k=value` is a known tag.
    fn keys_for_value(&self, value: &str) -> Vec<String>;
}

/// Lookup that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl TagLookup for NoLookup {
    fn key_exists(&self, _key: &str) -> bool {
        false
    }

    fn keys_for_value(&self, _value: &str) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    #[serde(rename = "isKey", default)]
    pub is_key: bool,
    #[serde(rename = "isTag", default)]
    pub is_tag: bool,
    #[serde(rename = "prefLabel", default)]
    pub pref_label: String,
}

/// Client for the tagfinder search API.
pub struct TagfinderClient {
    client: Option<Client>,
    base_url: String,
}

impl TagfinderClient {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| warn!("tag lookup disabled, HTTP client unavailable: {err}"))
            .ok();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn search(&self, query: &str) -> Vec<SearchResult> {
        let Some(client) = &self.client else {
            return Vec::new();
        };
        let endpoint = format!("{}/api/search", self.base_url);
        let url = match Url::parse_with_params(&endpoint, &[("query", query)]) {
            Ok(url) => url,
            Err(err) => {
                warn!("tag lookup endpoint {endpoint} is invalid: {err}");
                return Vec::new();
            }
        };
        debug!("tag lookup: {url}");
        let response = client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status());
        match response.and_then(|response| response.json::<Vec<SearchResult>>()) {
            Ok(results) => results,
            Err(err) => {
                warn!("tag lookup for '{query}' failed: {err}");
                Vec::new()
            }
        }
    }
}

impl TagLookup for TagfinderClient {
    fn key_exists(&self, key: &str) -> bool {
        key_in_results(&self.search(key), key)
    }

    fn keys_for_value(&self, value: &str) -> Vec<String> {
        candidate_keys(&self.search(value), value)
            .into_iter()
            .filter(|key| self.key_exists(key))
            .collect()
    }
}

pub fn key_in_results(results: &[SearchResult], key: &str) -> bool {
    results
        .iter()
        .any(|result| result.is_key && !result.is_tag && result.pref_label == key)
}

/// Plain (non-namespaced) keys of `key=value` tag results, deduplicated in
/// result order.
pub fn candidate_keys(results: &[SearchResult], value: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for result in results.iter().filter(|r| r.is_tag && !r.is_key) {
        let Some((key, tag_value)) = result.pref_label.split_once('=') else {
            continue;
        };
        if tag_value == value && !key.contains(':') && !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }
    keys
}
