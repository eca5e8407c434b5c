//! Client for the external hierarchical key-value store ("agency").
//!
//! The agency speaks an etcd-v2-style HTTP protocol: values are written
//! with form-encoded PUTs, directories with `dir=true`, and reads return a
//! JSON envelope whose `node.value` is itself a JSON-encoded string.

use serde_json::Value;
use slog::{debug, warn, Logger};
use std::fmt;
use std::time::Duration;
use url::form_urlencoded;

use crate::plan::endpoint_to_url;

const PUT_ATTEMPTS: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors reported by agency operations.
#[derive(Debug, Clone)]
pub enum AgencyError {
    /// The request never produced an HTTP response
    Request { url: String, reason: String },

    /// The store answered with an unexpected status, after the given number of attempts
    BadStatus {
        url: String,
        status: u16,
        attempts: u32,
    },

    /// A value in the tree is neither a string leaf nor a nested map
    UnsupportedValue { path: String },

    /// The response body did not have the expected envelope shape
    MalformedResponse { url: String, reason: String },
}

impl fmt::Display for AgencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgencyError::Request { url, reason } => {
                write!(f, "Agency request to {} failed: {}", url, reason)
            }
            AgencyError::BadStatus {
                url,
                status,
                attempts,
            } => write!(
                f,
                "Agency returned HTTP {} for {} after {} attempts",
                status, url, attempts
            ),
            AgencyError::UnsupportedValue { path } => {
                write!(f, "Value at {} is neither a string nor a map", path)
            }
            AgencyError::MalformedResponse { url, reason } => {
                write!(f, "Malformed agency response from {}: {}", url, reason)
            }
        }
    }
}

impl std::error::Error for AgencyError {}

/// A flattened write against the store.
#[derive(Debug, PartialEq)]
enum WriteOp {
    Leaf { path: String, value: String },
    Dir { path: String },
}

/// HTTP client bound to one agency endpoint and key prefix.
pub struct AgencyClient {
    client: reqwest::Client,
    base_url: String,
    logger: Logger,
}

impl AgencyClient {
    pub fn new(endpoint: &str, prefix: &str, logger: Logger) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        let base_url = format!("{}/v2/keys/{}", endpoint_to_url(endpoint), prefix);

        Self {
            client,
            base_url,
            logger,
        }
    }

    /// Escape a key so that it survives the store's own escaping rules.
    ///
    /// "@" doubles to "@@" and "_" becomes "@U"; decoding scans left to
    /// right, so no two keys over alphanumerics, "_" and "@" collide.
    fn escape_key(key: &str) -> String {
        let escaped = key.replace('@', "@@").replace('_', "@U");
        form_urlencoded::byte_serialize(escaped.as_bytes()).collect()
    }

    /// Materialize a nested configuration tree under `path`.
    ///
    /// Leaves (strings) become form-encoded value PUTs, empty maps become
    /// directory nodes, and non-empty maps recurse per key. Writes happen
    /// in key order and stop at the first failing entry.
    pub async fn put_tree(&self, path: &str, value: &Value) -> Result<(), AgencyError> {
        let mut ops = Vec::new();
        Self::flatten(path, value, &mut ops)?;

        debug!(self.logger, "pushing configuration tree";
            "base" => &self.base_url,
            "writes" => ops.len()
        );

        for op in &ops {
            match op {
                WriteOp::Leaf { path, value } => {
                    self.put_with_retry(path, &[("value", value.as_str())]).await?
                }
                WriteOp::Dir { path } => self.put_with_retry(path, &[("dir", "true")]).await?,
            }
        }

        Ok(())
    }

    /// Read a key and re-parse its JSON-encoded value.
    pub async fn get(&self, path: &str) -> Result<Value, AgencyError> {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AgencyError::Request {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() != 200 {
            return Err(AgencyError::BadStatus {
                url,
                status: status.as_u16(),
                attempts: 1,
            });
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| AgencyError::MalformedResponse {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let raw = envelope["node"]["value"]
            .as_str()
            .ok_or_else(|| AgencyError::MalformedResponse {
                url: url.clone(),
                reason: "missing node.value".to_string(),
            })?;

        serde_json::from_str(raw).map_err(|e| AgencyError::MalformedResponse {
            url,
            reason: format!("node.value is not JSON: {}", e),
        })
    }

    fn flatten(path: &str, value: &Value, out: &mut Vec<WriteOp>) -> Result<(), AgencyError> {
        match value {
            Value::String(leaf) => {
                out.push(WriteOp::Leaf {
                    path: path.to_string(),
                    value: leaf.clone(),
                });
                Ok(())
            }
            Value::Object(map) if map.is_empty() => {
                out.push(WriteOp::Dir {
                    path: path.to_string(),
                });
                Ok(())
            }
            Value::Object(map) => {
                for (key, child) in map {
                    let child_path = if path.is_empty() {
                        Self::escape_key(key)
                    } else {
                        format!("{}/{}", path, Self::escape_key(key))
                    };
                    Self::flatten(&child_path, child, out)?;
                }
                Ok(())
            }
            _ => Err(AgencyError::UnsupportedValue {
                path: path.to_string(),
            }),
        }
    }

    async fn put_with_retry(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<(), AgencyError> {
        let url = if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        };

        let mut last = AgencyError::Request {
            url: url.clone(),
            reason: "no attempt made".to_string(),
        };

        for attempt in 1..=PUT_ATTEMPTS {
            match self.client.put(&url).form(form).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if status == 200 || status == 201 {
                        return Ok(());
                    }
                    warn!(self.logger, "agency write rejected";
                        "url" => &url,
                        "status" => status,
                        "attempt" => attempt
                    );
                    last = AgencyError::BadStatus {
                        url: url.clone(),
                        status,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    warn!(self.logger, "agency write failed";
                        "url" => &url,
                        "error" => %e,
                        "attempt" => attempt
                    );
                    last = AgencyError::Request {
                        url: url.clone(),
                        reason: e.to_string(),
                    };
                }
            }
        }

        Err(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_escape_key_known_pairs() {
        assert_eq!(AgencyClient::escape_key("plain"), "plain");
        assert_eq!(AgencyClient::escape_key("a_b"), "a%40Ub");
        assert_eq!(AgencyClient::escape_key("a@b"), "a%40%40b");
        assert_eq!(AgencyClient::escape_key("@U"), "%40%40U");
    }

    #[test]
    fn test_escape_key_is_injective() {
        let keys = [
            "a", "a_", "a@", "a_b", "a@b", "a@Ub", "a@@b", "_", "@", "@U", "@@", "_U", "U",
            "Coordinator1", "DBServer_1", "map@id",
        ];
        let mut seen = std::collections::HashMap::new();
        for key in keys {
            let encoded = AgencyClient::escape_key(key);
            if let Some(prior) = seen.insert(encoded.clone(), key) {
                panic!("keys {:?} and {:?} both encode to {:?}", prior, key, encoded);
            }
        }
    }

    #[test]
    fn test_flatten_visits_leaves_in_key_order() {
        let tree = json!({"a": "1", "b": {"c": "2"}});
        let mut ops = Vec::new();
        AgencyClient::flatten("", &tree, &mut ops).expect("flatten failed");

        assert_eq!(
            ops,
            vec![
                WriteOp::Leaf {
                    path: "a".to_string(),
                    value: "1".to_string()
                },
                WriteOp::Leaf {
                    path: "b/c".to_string(),
                    value: "2".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_flatten_empty_map_is_directory() {
        let tree = json!({"b": {}});
        let mut ops = Vec::new();
        AgencyClient::flatten("", &tree, &mut ops).expect("flatten failed");

        assert_eq!(
            ops,
            vec![WriteOp::Dir {
                path: "b".to_string()
            }]
        );
    }

    #[test]
    fn test_flatten_rejects_non_string_leaf() {
        let tree = json!({"a": 1});
        let mut ops = Vec::new();
        assert!(matches!(
            AgencyClient::flatten("", &tree, &mut ops),
            Err(AgencyError::UnsupportedValue { .. })
        ));
    }
}
