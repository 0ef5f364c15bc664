//! Endpoint registry.
//!
//! Endpoint definitions live in a JSON file with two kinds of entries: a
//! bare endpoint, or a named group carrying a list of endpoints. The
//! registry flattens both forms into one list of [`EndpointSpec`]s, where
//! every endpoint carries its group name ("Other" for ungrouped entries),
//! and enforces that the `(name, group, url)` triple is unique since it is
//! also the metric label set.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use crate::errors::{Error, Result};

pub const DEFAULT_GROUP: &str = "Other";

/// Stable identity of a monitored endpoint. Doubles as the metric label set
/// and as the key for probe state, so two endpoints that differ in any of
/// the three fields are tracked independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId {
    pub name: String,
    pub group: String,
    pub url: String,
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.name)
    }
}

/// What a probe should consider a healthy response body.
///
/// A string expects a case-insensitive substring match; an object expects
/// the response to be JSON carrying (at least) the same keys, checked
/// recursively. Values are not compared, presence of the keys suffices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expectation {
    Substring(String),
    Shape(serde_json::Map<String, Value>),
}

/// One monitored endpoint, as flattened from the definitions file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub name: String,
    #[serde(default = "default_group")]
    pub group: String,
    pub url: String,
    /// When set, the probe issues a POST with this JSON body instead of a GET
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Expected response content; absent means any 2xx body passes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_response: Option<Expectation>,
    /// Extra request headers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

impl EndpointSpec {
    pub fn id(&self) -> EndpointId {
        EndpointId {
            name: self.name.clone(),
            group: self.group.clone(),
            url: self.url.clone(),
        }
    }
}

/// Raw file shape: `{ "urls": [ <entry>, ... ] }` where each entry is either
/// a group or a single endpoint.
#[derive(Debug, Deserialize)]
struct EndpointsFile {
    urls: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Entry {
    Group { group: String, servers: Vec<EndpointSpec> },
    Single(EndpointSpec),
}

/// The flattened, validated set of endpoints to monitor.
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    endpoints: Vec<EndpointSpec>,
}

impl EndpointRegistry {
    /// Load and flatten the definitions file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::InvalidEndpoints {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        let file: EndpointsFile = serde_json::from_str(&raw).map_err(|e| Error::InvalidEndpoints {
            reason: format!("cannot parse {}: {e}", path.display()),
        })?;
        Self::from_entries(file.urls)
    }

    fn from_entries(entries: Vec<Entry>) -> Result<Self> {
        let mut endpoints = Vec::new();
        for entry in entries {
            match entry {
                Entry::Group { group, servers } => {
                    for mut spec in servers {
                        spec.group = group.clone();
                        endpoints.push(spec);
                    }
                }
                Entry::Single(spec) => endpoints.push(spec),
            }
        }

        let mut seen = HashSet::new();
        for spec in &endpoints {
            if !seen.insert(spec.id()) {
                return Err(Error::InvalidEndpoints {
                    reason: format!(
                        "duplicate endpoint: name={} group={} url={}",
                        spec.name, spec.group, spec.url
                    ),
                });
            }
        }

        Ok(Self { endpoints })
    }

    pub fn endpoints(&self) -> &[EndpointSpec] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
