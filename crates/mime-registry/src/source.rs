use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MimeError, Result};
use crate::mime::{DefaultMimeTypeFactory, MimeTypeFactory, MimeTypeMap, MimeTypeRecord};

/// Compiled from apache, iana and nginx; see <https://www.jsdelivr.com/package/npm/mime-db>.
pub const DEFAULT_MIME_DB_URL: &str = "https://cdn.jsdelivr.net/gh/jshttp/mime-db@master/db.json";

/// One `db.json` value. Only `extensions` feeds the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMimeTypeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
}

pub type RawMimeDb = BTreeMap<String, RawMimeTypeEntry>;

/// Anything that can hand the registry a full name to record mapping.
pub trait MimeTypesProvider {
    type Record: MimeTypeRecord;

    fn mime_types(&self) -> Result<MimeTypeMap<Self::Record>>;
}

/// Retrieves the raw `db.json` document.
pub trait MimeDbFetcher: Send + Sync {
    fn location(&self) -> &str;

    /// Returns the document bytes. An empty document is `SourceUnavailable`.
    fn fetch(&self) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct HttpMimeDbFetcher {
    url: String,
    http: Client,
}

impl HttpMimeDbFetcher {
    /// `timeout` of `None` leaves the request unbounded.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let url = url.into();
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| MimeError::source_unavailable(&url, err.to_string()))?;
        Ok(Self { url, http })
    }
}

impl MimeDbFetcher for HttpMimeDbFetcher {
    fn location(&self) -> &str {
        &self.url
    }

    fn fetch(&self) -> Result<Vec<u8>> {
        debug!(url = %self.url, "fetching mime database");
        let response = self
            .http
            .get(&self.url)
            .send()
            .map_err(|err| MimeError::source_unavailable(&self.url, err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MimeError::source_unavailable(
                &self.url,
                format!("unexpected status {status}"),
            ));
        }
        let body = response
            .bytes()
            .map_err(|err| MimeError::source_unavailable(&self.url, err.to_string()))?;
        if body.is_empty() {
            return Err(MimeError::source_unavailable(&self.url, "empty response body"));
        }
        debug!(url = %self.url, bytes = body.len(), "fetched mime database");
        Ok(body.to_vec())
    }
}

/// Reads a local copy of `db.json`.
#[derive(Debug, Clone)]
pub struct FileMimeDbFetcher {
    path: PathBuf,
    location: String,
}

impl FileMimeDbFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let location = path.display().to_string();
        Self { path, location }
    }
}

impl MimeDbFetcher for FileMimeDbFetcher {
    fn location(&self) -> &str {
        &self.location
    }

    fn fetch(&self) -> Result<Vec<u8>> {
        let bytes = fs::read(&self.path)
            .map_err(|err| MimeError::source_unavailable(&self.location, err.to_string()))?;
        if bytes.is_empty() {
            return Err(MimeError::source_unavailable(&self.location, "empty file"));
        }
        debug!(path = %self.location, bytes = bytes.len(), "read mime database");
        Ok(bytes)
    }
}

pub fn decode_mime_db(location: &str, bytes: &[u8]) -> Result<RawMimeDb> {
    serde_json::from_slice::<RawMimeDb>(bytes).map_err(|source| MimeError::Decoding {
        location: location.to_string(),
        source,
    })
}

pub fn build_mime_types<F>(raw: &RawMimeDb, factory: &F) -> MimeTypeMap<F::Record>
where
    F: MimeTypeFactory,
{
    raw.iter()
        .map(|(name, entry)| {
            let mut record = factory.make_mime_type();
            record.set_name(name.clone());
            record.set_extensions(entry.extensions.clone().unwrap_or_default());
            (name.clone(), record)
        })
        .collect()
}

/// Loads the database once via [`MimeTypesSrc::initialize_data`] and converts on demand.
#[derive(Debug, Clone)]
pub struct MimeTypesSrc<D, F = DefaultMimeTypeFactory> {
    fetcher: D,
    factory: F,
    raw_data: RawMimeDb,
}

impl<D: MimeDbFetcher> MimeTypesSrc<D> {
    pub fn with_default_factory(fetcher: D) -> Self {
        Self::new(fetcher, DefaultMimeTypeFactory)
    }
}

impl<D, F> MimeTypesSrc<D, F>
where
    D: MimeDbFetcher,
    F: MimeTypeFactory,
{
    pub fn new(fetcher: D, factory: F) -> Self {
        Self {
            fetcher,
            factory,
            raw_data: RawMimeDb::new(),
        }
    }

    /// Replaces the raw buffer. On failure the previous buffer is kept as is.
    pub fn initialize_data(&mut self) -> Result<()> {
        let bytes = self.fetcher.fetch()?;
        let raw = decode_mime_db(self.fetcher.location(), &bytes)?;
        debug!(
            location = self.fetcher.location(),
            entries = raw.len(),
            "decoded mime database"
        );
        self.raw_data = raw;
        Ok(())
    }

    #[must_use]
    pub fn raw_data(&self) -> &RawMimeDb {
        &self.raw_data
    }
}

impl<D, F> MimeTypesProvider for MimeTypesSrc<D, F>
where
    D: MimeDbFetcher,
    F: MimeTypeFactory,
{
    type Record = F::Record;

    /// Empty until `initialize_data` has succeeded.
    fn mime_types(&self) -> Result<MimeTypeMap<F::Record>> {
        Ok(build_mime_types(&self.raw_data, &self.factory))
    }
}

/// Fetches and decodes the database on every `mime_types` call.
#[derive(Debug, Clone)]
pub struct CdnMimeTypesSrc<D, F = DefaultMimeTypeFactory> {
    fetcher: D,
    factory: F,
}

impl<D: MimeDbFetcher> CdnMimeTypesSrc<D> {
    pub fn with_default_factory(fetcher: D) -> Self {
        Self::new(fetcher, DefaultMimeTypeFactory)
    }
}

impl<D, F> CdnMimeTypesSrc<D, F>
where
    D: MimeDbFetcher,
    F: MimeTypeFactory,
{
    pub fn new(fetcher: D, factory: F) -> Self {
        Self { fetcher, factory }
    }
}

impl<D, F> MimeTypesProvider for CdnMimeTypesSrc<D, F>
where
    D: MimeDbFetcher,
    F: MimeTypeFactory,
{
    type Record = F::Record;

    fn mime_types(&self) -> Result<MimeTypeMap<F::Record>> {
        let bytes = self.fetcher.fetch()?;
        let raw = decode_mime_db(self.fetcher.location(), &bytes)?;
        Ok(build_mime_types(&raw, &self.factory))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use tempfile::tempdir;

    use super::*;
    use crate::mime::MimeType;

    struct StaticFetcher {
        body: Vec<u8>,
        calls: AtomicUsize,
    }

    impl StaticFetcher {
        fn new(body: &str) -> Self {
            Self {
                body: body.as_bytes().to_vec(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl MimeDbFetcher for StaticFetcher {
        fn location(&self) -> &str {
            "memory://db.json"
        }

        fn fetch(&self) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.body.is_empty() {
                return Err(MimeError::source_unavailable(self.location(), "empty"));
            }
            Ok(self.body.clone())
        }
    }

    const SAMPLE_DB: &str = r#"{
        "application/javascript": {"source": "iana", "charset": "UTF-8", "compressible": true, "extensions": ["js", "mjs"]},
        "application/x-empty": {"source": "apache"},
        "image/jpeg": {"source": "iana", "compressible": false, "extensions": ["jpeg", "jpg", "jpe"]}
    }"#;

    fn serve_once(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let mut request = Vec::new();
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = stream.write_all(response);
            }
        });
        format!("http://{addr}/db.json")
    }

    #[test]
    fn uninitialized_source_yields_empty_mapping() {
        let src = MimeTypesSrc::with_default_factory(StaticFetcher::new(SAMPLE_DB));
        assert!(src.raw_data().is_empty());
        assert!(src.mime_types().expect("mime types").is_empty());
        assert_eq!(src.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn initialize_data_converts_every_entry() {
        let mut src = MimeTypesSrc::with_default_factory(StaticFetcher::new(SAMPLE_DB));
        src.initialize_data().expect("initialize");
        assert_eq!(src.raw_data().len(), 3);
        assert_eq!(
            src.raw_data()["application/javascript"].charset.as_deref(),
            Some("UTF-8")
        );

        let mime_types = src.mime_types().expect("mime types");
        assert_eq!(
            mime_types["image/jpeg"],
            MimeType::new(
                "image/jpeg",
                vec!["jpeg".to_string(), "jpg".to_string(), "jpe".to_string()]
            )
        );
        assert!(mime_types["application/x-empty"].extensions().is_empty());
        assert_eq!(src.mime_types().expect("second call"), mime_types);
    }

    #[test]
    fn invalid_json_is_decoding_error_and_keeps_previous_buffer() {
        let mut src = MimeTypesSrc::with_default_factory(StaticFetcher::new(SAMPLE_DB));
        src.initialize_data().expect("initialize");

        src.fetcher = StaticFetcher::new("{not json");
        let err = src.initialize_data().expect_err("must reject invalid json");
        assert!(matches!(err, MimeError::Decoding { .. }));
        assert_eq!(src.raw_data().len(), 3);
    }

    #[test]
    fn empty_fetch_is_source_unavailable() {
        let mut src = MimeTypesSrc::with_default_factory(StaticFetcher::new(""));
        let err = src.initialize_data().expect_err("must reject empty source");
        assert_eq!(err.code(), "SOURCE_UNAVAILABLE");
    }

    #[test]
    fn cdn_source_fetches_on_every_call() {
        let src = CdnMimeTypesSrc::with_default_factory(StaticFetcher::new(SAMPLE_DB));
        let first = src.mime_types().expect("first");
        let second = src.mime_types().expect("second");
        assert_eq!(first, second);
        assert_eq!(src.fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn file_fetcher_reads_local_copy() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("db.json");
        fs::write(&path, SAMPLE_DB).expect("write db");

        let src = CdnMimeTypesSrc::with_default_factory(FileMimeDbFetcher::new(&path));
        let mime_types = src.mime_types().expect("mime types");
        assert!(mime_types.contains_key("application/javascript"));
    }

    #[test]
    fn file_fetcher_rejects_missing_and_empty_files() {
        let temp = tempdir().expect("tempdir");
        let missing = FileMimeDbFetcher::new(temp.path().join("missing.json"));
        assert!(matches!(
            missing.fetch(),
            Err(MimeError::SourceUnavailable { .. })
        ));

        let empty_path = temp.path().join("empty.json");
        fs::write(&empty_path, "").expect("write empty");
        let empty = FileMimeDbFetcher::new(&empty_path);
        assert!(matches!(
            empty.fetch(),
            Err(MimeError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn http_fetcher_reads_success_body() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 43\r\nConnection: close\r\n\r\n{\"text/html\":{\"extensions\":[\"html\",\"htm\"]}}",
        );
        let fetcher = HttpMimeDbFetcher::new(url, Some(Duration::from_secs(5))).expect("client");
        let bytes = fetcher.fetch().expect("fetch");
        let raw = decode_mime_db(fetcher.location(), &bytes).expect("decode");
        assert_eq!(
            raw["text/html"].extensions,
            Some(vec!["html".to_string(), "htm".to_string()])
        );
    }

    #[test]
    fn http_fetcher_maps_error_status_and_empty_body() {
        let not_found = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let fetcher =
            HttpMimeDbFetcher::new(not_found, Some(Duration::from_secs(5))).expect("client");
        assert!(matches!(
            fetcher.fetch(),
            Err(MimeError::SourceUnavailable { .. })
        ));

        let empty =
            serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        let fetcher = HttpMimeDbFetcher::new(empty, Some(Duration::from_secs(5))).expect("client");
        let err = fetcher.fetch().expect_err("empty body must fail");
        assert!(err.to_string().contains("empty response body"));
    }
}
