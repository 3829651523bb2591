use std::fmt::{Debug, Formatter};
use std::fs::{self, File};
use std::io::{self, ErrorKind, Read};
use std::ops::{BitOr, BitOrAssign};
use std::path::{Path, PathBuf};

use crate::error::{MimeError, Result};

/// Bytes read from the head of a target before sniffing.
pub const SNIFF_LEN: u64 = 8192;

const UNDETERMINED: &str = "(undetermined)";
const TEXT_PLAIN: &str = "text/plain";
const STREAM_TARGET: &str = "<stream>";

/// Bit-set of detection strategies for one `detect` call.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DetectionMethods(u8);

impl DetectionMethods {
    pub const DETECT_FROM_CONTENTS: Self = Self(0b01);
    pub const USE_FILE_EXTENSION: Self = Self(0b10);

    const KNOWN_BITS: u8 = 0b11;

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn all() -> Self {
        Self(Self::KNOWN_BITS)
    }

    /// Keeps the raw bits; unknown bits are rejected when detection runs.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub(crate) fn validated(self) -> Result<Self> {
        if self.is_empty() || self.0 & !Self::KNOWN_BITS != 0 {
            return Err(MimeError::InvalidDetectionMethod(self.0));
        }
        Ok(self)
    }
}

impl Debug for DetectionMethods {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::DETECT_FROM_CONTENTS) {
            names.push("DETECT_FROM_CONTENTS");
        }
        if self.contains(Self::USE_FILE_EXTENSION) {
            names.push("USE_FILE_EXTENSION");
        }
        write!(f, "DetectionMethods({:#04b}: {})", self.0, names.join(" | "))
    }
}

impl BitOr for DetectionMethods {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DetectionMethods {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Guesses a media type name from leading content bytes.
///
/// `Ok(None)` means the content could not be classified.
pub trait ContentSniffer: Send + Sync {
    fn sniff(&self, reader: &mut dyn Read) -> io::Result<Option<String>>;
}

/// Magic-number sniffing backed by the `infer` crate.
///
/// Content with no known signature is reported as `text/plain` when the head is
/// NUL-free UTF-8; anything else, including an empty stream, yields `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InferSniffer;

impl ContentSniffer for InferSniffer {
    fn sniff(&self, reader: &mut dyn Read) -> io::Result<Option<String>> {
        let mut head = Vec::new();
        reader.take(SNIFF_LEN).read_to_end(&mut head)?;
        if let Some(kind) = infer::get(&head) {
            return Ok(Some(kind.mime_type().to_string()));
        }
        Ok(looks_like_text(&head).then(|| TEXT_PLAIN.to_string()))
    }
}

fn looks_like_text(head: &[u8]) -> bool {
    if head.is_empty() || head.contains(&0) {
        return false;
    }
    // The head may stop inside a multi-byte character.
    match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(err) => err.error_len().is_none(),
    }
}

/// Checks existence, then readability, and hands back an open handle.
pub(crate) fn open_target(path: &Path) -> Result<File> {
    match fs::metadata(path) {
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(MimeError::TargetNotFound(path.to_path_buf()));
        }
        Err(err) => return Err(MimeError::not_readable(path, err)),
        Ok(meta) if meta.is_dir() => {
            return Err(MimeError::not_readable(path, "target is a directory"));
        }
        Ok(_) => {}
    }
    File::open(path).map_err(|err| MimeError::not_readable(path, err))
}

/// Lower-cased extension suffix without the dot.
pub(crate) fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_ascii_lowercase)
}

pub(crate) fn sniff_name(
    sniffer: &dyn ContentSniffer,
    reader: &mut dyn Read,
    target: Option<&Path>,
) -> Result<String> {
    let target = target.map_or_else(|| PathBuf::from(STREAM_TARGET), Path::to_path_buf);
    sniffer
        .sniff(reader)
        .map_err(|err| MimeError::not_readable(target, err))?
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| MimeError::UnknownMimeTypeDetected(UNDETERMINED.to_string()))
}
