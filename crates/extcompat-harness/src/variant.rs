//! A named schema view (`generic`, `ext1`, `ext2`, `both`) bound to one
//! compiled binding.

use std::path::Path;
use std::sync::Arc;

use extcompat_core::{ContentDigest, DynamicMessage, MessageLayout};
use extcompat_schema::CompiledSchema;

use crate::config::HarnessConfig;
use crate::error::HarnessError;

#[derive(Debug, Clone)]
pub struct Variant {
    name: String,
    digest: ContentDigest,
    layout: Arc<MessageLayout>,
}

impl Variant {
    /// Load the binding configured for `name` and resolve the message layout.
    pub fn load(config: &HarnessConfig, name: &str) -> Result<Self, HarnessError> {
        let path = config.binding_path(name)?;
        Self::from_binding(name, &path, &config.message)
    }

    pub fn from_binding(name: &str, path: &Path, message: &str) -> Result<Self, HarnessError> {
        let binding = CompiledSchema::load(path).map_err(|source| HarnessError::Binding {
            variant: name.to_string(),
            source,
        })?;
        let pool = binding.pool().map_err(|source| HarnessError::Binding {
            variant: name.to_string(),
            source,
        })?;
        let layout = pool
            .layout(message)
            .map_err(|source| HarnessError::Descriptor {
                variant: name.to_string(),
                source,
            })?;
        tracing::debug!(
            variant = name,
            binding = %path.display(),
            digest = %binding.digest,
            extensions = layout.extensions().count(),
            "loaded variant"
        );
        Ok(Self {
            name: name.to_string(),
            digest: binding.digest,
            layout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn digest(&self) -> &ContentDigest {
        &self.digest
    }

    pub fn layout(&self) -> &Arc<MessageLayout> {
        &self.layout
    }

    /// An empty message of this variant's layout.
    pub fn new_message(&self) -> DynamicMessage {
        DynamicMessage::new(Arc::clone(&self.layout))
    }

    /// Whether this variant knows the field `number` under the same name.
    pub fn knows(&self, number: u32, lookup_name: &str) -> bool {
        self.layout
            .field(number)
            .is_some_and(|f| f.lookup_name() == lookup_name)
    }
}
