use std::fmt::{Debug, Formatter};
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::cache::{FileTtlCache, MimeTypesCache};
use crate::config::MimeDbConfig;
use crate::detect::{
    ContentSniffer, DetectionMethods, InferSniffer, file_extension, open_target, sniff_name,
};
use crate::error::{MimeError, Result};
use crate::mime::{MimeType, MimeTypeMap, MimeTypeRecord};
use crate::source::{CdnMimeTypesSrc, HttpMimeDbFetcher, MimeTypesProvider};

/// Read-only view over a loaded mime database.
///
/// The mapping is captured once at construction and never changes afterwards,
/// so queries are safe to share across threads.
pub struct MimeTypes<M = MimeType> {
    mime_types: MimeTypeMap<M>,
    sniffer: Box<dyn ContentSniffer>,
}

impl<M: MimeTypeRecord> Debug for MimeTypes<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MimeTypes")
            .field("entries", &self.mime_types.len())
            .finish_non_exhaustive()
    }
}

impl MimeTypes {
    /// Builds the registry described by `config`: CDN source over HTTP, fronted by
    /// a file cache when a cache directory is configured.
    pub fn from_config(config: &MimeDbConfig) -> Result<Self> {
        let fetcher = HttpMimeDbFetcher::new(config.url.clone(), config.timeout)?;
        let src = CdnMimeTypesSrc::with_default_factory(fetcher);
        match &config.cache_dir {
            Some(dir) => {
                let cache = FileTtlCache::new(dir, None);
                Self::load(&MimeTypesCache::new(cache, src, config.cache_ttl))
            }
            None => Self::load(&src),
        }
    }
}

impl<M: MimeTypeRecord> MimeTypes<M> {
    pub fn load<P>(provider: &P) -> Result<Self>
    where
        P: MimeTypesProvider<Record = M> + ?Sized,
    {
        let mime_types = provider.mime_types()?;
        debug!(entries = mime_types.len(), "loaded mime types");
        Ok(Self::from_map(mime_types))
    }

    #[must_use]
    pub fn from_map(mime_types: MimeTypeMap<M>) -> Self {
        Self {
            mime_types,
            sniffer: Box::new(InferSniffer),
        }
    }

    #[must_use]
    pub fn with_sniffer(mut self, sniffer: impl ContentSniffer + 'static) -> Self {
        self.sniffer = Box::new(sniffer);
        self
    }

    #[must_use]
    pub fn mime_types(&self) -> &MimeTypeMap<M> {
        &self.mime_types
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.mime_types.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mime_types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mime_types.is_empty()
    }

    #[must_use]
    pub fn mime_type(&self, name: &str) -> Option<&M> {
        self.mime_types.get(name)
    }

    /// First type, in name order, that lists `ext`.
    #[must_use]
    pub fn mime_type_name_from_file_extension(&self, ext: &str) -> Option<&str> {
        self.mime_types
            .iter()
            .find(|(_, record)| record.has_extension(ext))
            .map(|(name, _)| name.as_str())
    }

    /// Empty when `name` is not registered.
    #[must_use]
    pub fn file_extensions_from_mime_type_name(&self, name: &str) -> &[String] {
        self.mime_types
            .get(name)
            .map(MimeTypeRecord::extensions)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_valid_mime_type_name(&self, name: &str) -> bool {
        self.mime_types.contains_key(name)
    }

    #[must_use]
    pub fn is_valid_mime_type_file_extension(&self, ext: &str) -> bool {
        self.mime_types
            .values()
            .any(|record| record.has_extension(ext))
    }

    /// Resolves the type of the file at `path`.
    ///
    /// The target must exist and be readable before any strategy runs. A sniffed
    /// name missing from the registry is an error, while an unmatched extension
    /// only leaves that strategy without a result. When both strategies produce a
    /// type they must agree, and the content result wins otherwise.
    ///
    /// `Ok(None)` is only possible when extension lookup alone was requested and
    /// nothing claims the extension.
    pub fn detect(
        &self,
        path: impl AsRef<Path>,
        methods: DetectionMethods,
    ) -> Result<Option<&M>> {
        let methods = methods.validated()?;
        let path = path.as_ref();
        let mut file = open_target(path)?;

        let from_contents = if methods.contains(DetectionMethods::DETECT_FROM_CONTENTS) {
            Some(self.detect_from_contents(&mut file, Some(path))?)
        } else {
            None
        };
        let from_extension = if methods.contains(DetectionMethods::USE_FILE_EXTENSION) {
            file_extension(path).and_then(|ext| self.entry_for_extension(&ext))
        } else {
            None
        };

        let resolved = match (from_contents, from_extension) {
            (Some((content, _)), Some((extension, _))) if content != extension => {
                return Err(MimeError::ConflictingMimeTypes {
                    content: content.to_string(),
                    extension: extension.to_string(),
                });
            }
            (Some(found), _) | (None, Some(found)) => Some(found),
            (None, None) => None,
        };
        debug!(
            path = %path.display(),
            mime_type = resolved.map(|(name, _)| name),
            ?methods,
            "detected mime type"
        );
        Ok(resolved.map(|(_, record)| record))
    }

    /// Content-only detection over a caller-owned stream.
    ///
    /// A stream carries no extension, so `methods` must include
    /// `DETECT_FROM_CONTENTS`. The reader is left open.
    pub fn detect_reader<R: Read>(&self, reader: &mut R, methods: DetectionMethods) -> Result<&M> {
        let methods = methods.validated()?;
        if !methods.contains(DetectionMethods::DETECT_FROM_CONTENTS) {
            return Err(MimeError::InvalidDetectionMethod(methods.bits()));
        }
        let (name, record) = self.detect_from_contents(reader, None)?;
        debug!(mime_type = name, "detected mime type from stream");
        Ok(record)
    }

    fn detect_from_contents(
        &self,
        reader: &mut dyn Read,
        target: Option<&Path>,
    ) -> Result<(&str, &M)> {
        let sniffed = sniff_name(self.sniffer.as_ref(), reader, target)?;
        self.mime_types
            .get_key_value(sniffed.as_str())
            .map(|(name, record)| (name.as_str(), record))
            .ok_or(MimeError::UnknownMimeTypeDetected(sniffed))
    }

    fn entry_for_extension(&self, ext: &str) -> Option<(&str, &M)> {
        let name = self.mime_type_name_from_file_extension(ext)?;
        self.mime_type(name).map(|record| (name, record))
    }
}
