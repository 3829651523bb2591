use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// Registered types keyed by type name.
pub type MimeTypeMap<M = MimeType> = BTreeMap<String, M>;

/// Holder of one media type name and its file extensions.
///
/// Extensions are stored without the leading dot (`jpg`, not `.jpg`).
pub trait MimeTypeRecord: Clone + Debug + PartialEq + Send + Sync {
    fn name(&self) -> Option<&str>;
    fn set_name(&mut self, name: String);
    fn extensions(&self) -> &[String];
    fn set_extensions(&mut self, extensions: Vec<String>);

    fn has_extension(&self, ext: &str) -> bool {
        self.extensions().iter().any(|candidate| candidate == ext)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MimeType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    extensions: Vec<String>,
}

impl MimeType {
    #[must_use]
    pub fn new(name: impl Into<String>, extensions: Vec<String>) -> Self {
        Self {
            name: Some(name.into()),
            extensions,
        }
    }
}

impl MimeTypeRecord for MimeType {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn set_extensions(&mut self, extensions: Vec<String>) {
        self.extensions = extensions;
    }
}

/// Produces empty records for a source to populate.
pub trait MimeTypeFactory: Send + Sync {
    type Record: MimeTypeRecord;

    fn make_mime_type(&self) -> Self::Record;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMimeTypeFactory;

impl MimeTypeFactory for DefaultMimeTypeFactory {
    type Record = MimeType;

    fn make_mime_type(&self) -> MimeType {
        MimeType::default()
    }
}
