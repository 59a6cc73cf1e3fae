//! Cache key generation.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::types::{CompletionRequest, Message};

/// SHA-256 digest over everything that can change a completion's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    hash: String,
}

#[derive(Serialize)]
struct Canonical<'a> {
    adapter: &'a str,
    model: Option<&'a str>,
    messages: &'a [Message],
    // Fixed precision so 0.7 and 0.70000001 share an entry.
    temperature: Option<String>,
    max_tokens: Option<u32>,
}

impl CacheKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }

    pub fn for_request(adapter: &str, request: &CompletionRequest) -> Self {
        let canonical = Canonical {
            adapter,
            model: request.model.as_deref(),
            messages: &request.messages,
            temperature: request.temperature.map(|t| format!("{:.2}", t)),
            max_tokens: request.max_tokens,
        };
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&canonical).unwrap_or_default());
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        Self { hash }
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_request_same_key() {
        let req = CompletionRequest::prompt("hi").with_model("m").with_temperature(0.7);
        let a = CacheKey::for_request("openai", &req);
        let b = CacheKey::for_request("openai", &req.clone());
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn adapter_and_parameters_change_the_key() {
        let req = CompletionRequest::prompt("hi");
        let base = CacheKey::for_request("a", &req);
        assert_ne!(base, CacheKey::for_request("b", &req));
        assert_ne!(base, CacheKey::for_request("a", &req.clone().with_temperature(0.2)));
        assert_ne!(base, CacheKey::for_request("a", &CompletionRequest::prompt("hello")));
    }

    #[test]
    fn streaming_flag_does_not_change_the_key() {
        let req = CompletionRequest::prompt("hi");
        assert_eq!(
            CacheKey::for_request("a", &req),
            CacheKey::for_request("a", &req.clone().streaming(true))
        );
    }
}
