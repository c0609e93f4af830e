//! Deployment manifest parsing
//!
//! `pachctl deploy --dry-run` prints its Kubernetes objects as JSON
//! documents one after another with no separator. The raw text is applied
//! verbatim later, so [`ManifestSet`] keeps it next to the parsed documents.
//!
//! Boundaries are found with the pattern `}` newline(s) `{`. A string value
//! containing that exact sequence would be mis-split; the generator never
//! emits one.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

/// Closing brace, one or more newlines, opening brace
static DOCUMENT_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\}\n+\{").expect("document boundary pattern is valid"));

/// Component name of the dashboard container
pub const DASH_COMPONENT: &str = "dash";

/// Component name of the gRPC proxy container
pub const GRPC_PROXY_COMPONENT: &str = "grpc-proxy";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest is not a sequence of JSON documents: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("manifest component {0} has no image")]
    MissingImage(String),
}

/// Split concatenated documents at every boundary
///
/// Each returned slice is one document's text. A single document comes
/// back unchanged; blank input yields nothing.
pub fn split_documents(text: &str) -> Vec<&str> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut documents = Vec::new();
    let mut start = 0;
    for boundary in DOCUMENT_BOUNDARY.find_iter(text) {
        // Cut right after the closing brace
        let end = boundary.start() + 1;
        documents.push(&text[start..end]);
        // Resume at the opening brace
        start = boundary.end() - 1;
    }
    documents.push(&text[start..]);
    documents
}

/// Parse concatenated documents into structured values, in order
pub fn parse_documents(text: &str) -> Result<Vec<Value>, ManifestError> {
    let joined = DOCUMENT_BOUNDARY.replace_all(text, "},{");
    let array = format!("[{}]", joined);
    Ok(serde_json::from_str(&array)?)
}

/// Depth-first search for the first value satisfying `predicate`
///
/// The root is checked first, then mapping values and sequence elements
/// recursively. Sequences are searched in index order.
pub fn find<'a, P>(value: &'a Value, predicate: P) -> Option<&'a Value>
where
    P: Fn(&Value) -> bool,
{
    find_with(value, &predicate)
}

fn find_with<'a>(value: &'a Value, predicate: &dyn Fn(&Value) -> bool) -> Option<&'a Value> {
    if predicate(value) {
        return Some(value);
    }

    match value {
        Value::Object(map) => map.values().find_map(|child| find_with(child, predicate)),
        Value::Array(items) => items.iter().find_map(|child| find_with(child, predicate)),
        _ => None,
    }
}

/// Container entry discovered inside the manifest
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ComponentSpec {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// Images referenced by optional components of the deployment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuxiliaryImages {
    pub dash: Option<String>,
    pub grpc_proxy: Option<String>,
}

impl AuxiliaryImages {
    /// Discovered images, dashboard first
    pub fn to_vec(&self) -> Vec<String> {
        self.dash.iter().chain(self.grpc_proxy.iter()).cloned().collect()
    }
}

/// Raw manifest text plus its parsed documents
#[derive(Debug, Clone)]
pub struct ManifestSet {
    raw: String,
    documents: Vec<Value>,
}

impl ManifestSet {
    pub fn parse(raw: impl Into<String>) -> Result<Self, ManifestError> {
        let raw = raw.into();
        let documents = parse_documents(&raw)?;
        Ok(Self { raw, documents })
    }

    /// Text exactly as generated, for the apply step
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn documents(&self) -> &[Value] {
        &self.documents
    }

    /// Find the first object whose `name` equals `name`
    ///
    /// With `require_image`, objects whose `image` is absent or null are
    /// skipped.
    pub fn component(
        &self,
        name: &str,
        require_image: bool,
    ) -> Result<Option<ComponentSpec>, ManifestError> {
        let found = self.documents.iter().find_map(|document| {
            find(document, |value| {
                value.get("name").and_then(Value::as_str) == Some(name)
                    && (!require_image || value.get("image").is_some_and(|i| !i.is_null()))
            })
        });

        match found {
            Some(value) => Ok(Some(ComponentSpec::deserialize(value)?)),
            None => Ok(None),
        }
    }

    /// Images of the dashboard and gRPC proxy, if the manifest has them
    ///
    /// A proxy component without an image is an error: the image is needed
    /// to pull and push it.
    pub fn auxiliary_images(&self) -> Result<AuxiliaryImages, ManifestError> {
        let dash = self
            .component(DASH_COMPONENT, true)?
            .and_then(|spec| spec.image);

        let grpc_proxy = match self.component(GRPC_PROXY_COMPONENT, false)? {
            Some(ComponentSpec { image: Some(image), .. }) => Some(image),
            Some(spec) => return Err(ManifestError::MissingImage(spec.name)),
            None => None,
        };

        Ok(AuxiliaryImages { dash, grpc_proxy })
    }
}

#[cfg(test)]
#[path = "manifest_test.rs"]
mod tests;
