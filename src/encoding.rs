//! Text decoding with a list of candidate encodings.
//!
//! Watched files are not always saved as UTF-8. The reader tries each
//! candidate in order and keeps the first one that decodes the bytes
//! without replacement characters.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use encoding_rs::{Encoding, UTF_8};
use thiserror::Error;

/// Errors from decoding a watched file.
#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("Unknown encoding label '{0}'")]
    UnknownLabel(String),

    #[error("No candidate encodings configured")]
    NoCandidates,

    #[error("None of [{tried}] could decode {path}")]
    NoEncodingMatched { path: PathBuf, tried: String },

    #[error("{path} no longer decodes as {encoding}; probing all candidates on the next change")]
    RememberedEncodingFailed {
        path: PathBuf,
        encoding: &'static str,
    },

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Content of a file together with the encoding that decoded it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub content: String,
    pub encoding: &'static Encoding,
}

/// Ordered candidate list used to decode files.
#[derive(Debug, Clone)]
pub struct EncodingReader {
    candidates: Vec<&'static Encoding>,
}

impl EncodingReader {
    pub fn new(candidates: Vec<&'static Encoding>) -> Result<Self, EncodingError> {
        if candidates.is_empty() {
            return Err(EncodingError::NoCandidates);
        }
        Ok(Self { candidates })
    }

    /// Resolve WHATWG labels such as `utf-8`, `cp1256` or `latin1`.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self, EncodingError> {
        let candidates = labels
            .iter()
            .map(|label| {
                let label = label.as_ref();
                Encoding::for_label(label.trim().as_bytes())
                    .ok_or_else(|| EncodingError::UnknownLabel(label.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(candidates)
    }

    /// Move UTF-8 ahead of legacy code pages.
    ///
    /// Single-byte code pages accept almost any byte sequence, so a
    /// successful decode with one of them says little. UTF-8 rejects
    /// malformed input and is tried first. UTF-16 accepts nearly any
    /// even-length input and keeps its configured position; a BOM still
    /// selects it directly.
    pub fn prefer_strict(mut self) -> Self {
        self.candidates.sort_by_key(|&encoding| encoding != UTF_8);
        self
    }

    pub fn candidates(&self) -> &[&'static Encoding] {
        &self.candidates
    }

    /// Read `path` and decode it with the first matching candidate.
    pub fn read(&self, path: &Path) -> Result<Decoded, EncodingError> {
        let bytes = read_bytes(path)?;
        self.decode(&bytes).ok_or_else(|| EncodingError::NoEncodingMatched {
            path: path.to_path_buf(),
            tried: self.tried(),
        })
    }

    /// Decode with a remembered encoding first.
    ///
    /// With nothing remembered this is a full probe whose winner is stored
    /// in `remembered`. A remembered encoding gets exactly one attempt; if
    /// it fails the memory is cleared and the error returned, so the next
    /// call probes every candidate again.
    pub fn read_remembered(
        &self,
        path: &Path,
        remembered: &mut Option<&'static Encoding>,
    ) -> Result<Decoded, EncodingError> {
        let Some(encoding) = *remembered else {
            let decoded = self.read(path)?;
            *remembered = Some(decoded.encoding);
            return Ok(decoded);
        };

        let bytes = read_bytes(path)?;
        match decode_with(encoding, strip_bom(&bytes, encoding)) {
            Some(content) => Ok(Decoded { content, encoding }),
            None => {
                *remembered = None;
                Err(EncodingError::RememberedEncodingFailed {
                    path: path.to_path_buf(),
                    encoding: encoding.name(),
                })
            }
        }
    }

    /// Decode raw bytes without touching the filesystem.
    pub fn decode(&self, bytes: &[u8]) -> Option<Decoded> {
        // A byte-order mark is authoritative when its encoding is a candidate
        if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
            if self.candidates.contains(&encoding) {
                if let Some(content) = decode_with(encoding, &bytes[bom_len..]) {
                    return Some(Decoded { content, encoding });
                }
            }
        }

        self.candidates.iter().find_map(|&encoding| {
            decode_with(encoding, bytes).map(|content| Decoded { content, encoding })
        })
    }

    fn tried(&self) -> String {
        self.candidates
            .iter()
            .map(|encoding| encoding.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, EncodingError> {
    std::fs::read(path).map_err(|source| EncodingError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn strip_bom<'a>(bytes: &'a [u8], encoding: &'static Encoding) -> &'a [u8] {
    match Encoding::for_bom(bytes) {
        Some((bom_encoding, bom_len)) if bom_encoding == encoding => &bytes[bom_len..],
        _ => bytes,
    }
}

fn decode_with(encoding: &'static Encoding, bytes: &[u8]) -> Option<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(Cow::into_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{UTF_16LE, WINDOWS_1251, WINDOWS_1252, WINDOWS_1256};
    use tempfile::TempDir;

    const ARABIC: &str = "مرحبا بالعالم";

    fn write_encoded(dir: &TempDir, name: &str, text: &str, encoding: &'static Encoding) -> PathBuf {
        let (bytes, _, unmappable) = encoding.encode(text);
        assert!(!unmappable, "fixture text must be representable");
        let path = dir.path().join(name);
        std::fs::write(&path, &bytes).unwrap();
        path
    }

    #[test]
    fn test_utf8_file_decodes_as_utf8() {
        let dir = TempDir::new().unwrap();
        let path = write_encoded(&dir, "plan.json", ARABIC, UTF_8);

        let reader = EncodingReader::new(vec![UTF_8, WINDOWS_1256]).unwrap();
        let decoded = reader.read(&path).unwrap();

        assert_eq!(decoded.content, ARABIC);
        assert_eq!(decoded.encoding, UTF_8);
    }

    #[test]
    fn test_legacy_file_falls_through_to_second_candidate() {
        let dir = TempDir::new().unwrap();
        let path = write_encoded(&dir, "plan.json", ARABIC, WINDOWS_1256);

        let reader = EncodingReader::new(vec![UTF_8, WINDOWS_1256]).unwrap();
        let decoded = reader.read(&path).unwrap();

        assert_eq!(decoded.content, ARABIC);
        assert_eq!(decoded.encoding, WINDOWS_1256);
    }

    #[test]
    fn test_no_candidate_matches() {
        let dir = TempDir::new().unwrap();
        let path = write_encoded(&dir, "plan.json", ARABIC, WINDOWS_1256);

        let reader = EncodingReader::new(vec![UTF_8]).unwrap();
        let err = reader.read(&path).unwrap_err();

        assert!(matches!(err, EncodingError::NoEncodingMatched { .. }));
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let reader = EncodingReader::new(vec![UTF_8]).unwrap();

        let err = reader.read(&dir.path().join("gone.json")).unwrap_err();
        assert!(matches!(err, EncodingError::Io { .. }));
    }

    #[test]
    fn test_from_labels() {
        let reader = EncodingReader::from_labels(&["utf-8", "cp1256", "latin1"]).unwrap();
        assert_eq!(reader.candidates(), &[UTF_8, WINDOWS_1256, WINDOWS_1252]);

        assert!(matches!(
            EncodingReader::from_labels(&["utf-8", "nope"]),
            Err(EncodingError::UnknownLabel(label)) if label == "nope"
        ));
        assert!(matches!(
            EncodingReader::from_labels::<&str>(&[]),
            Err(EncodingError::NoCandidates)
        ));
    }

    #[test]
    fn test_prefer_strict_moves_utf8_first() {
        let reader = EncodingReader::new(vec![WINDOWS_1256, UTF_8, WINDOWS_1251])
            .unwrap()
            .prefer_strict();
        assert_eq!(reader.candidates(), &[UTF_8, WINDOWS_1256, WINDOWS_1251]);

        // Without the reordering the legacy page wins and garbles UTF-8 input
        let greedy = EncodingReader::new(vec![WINDOWS_1256, UTF_8]).unwrap();
        let decoded = greedy.decode(ARABIC.as_bytes()).unwrap();
        assert_eq!(decoded.encoding, WINDOWS_1256);
        assert_ne!(decoded.content, ARABIC);
    }

    #[test]
    fn test_prefer_strict_keeps_utf16_in_place() {
        let reader = EncodingReader::from_labels(&["utf-8", "windows-1252", "utf-16le"])
            .unwrap()
            .prefer_strict();
        assert_eq!(reader.candidates(), &[UTF_8, WINDOWS_1252, UTF_16LE]);

        // Even length, so it would also decode as UTF-16LE
        let text = "{\"a\": \"café\"}!";
        let (bytes, _, _) = WINDOWS_1252.encode(text);
        assert_eq!(bytes.len() % 2, 0);

        let decoded = reader.decode(&bytes).unwrap();
        assert_eq!(decoded.encoding, WINDOWS_1252);
        assert_eq!(decoded.content, text);

        // With a BOM the UTF-16 file is still recognised
        let mut bytes = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let decoded = reader.decode(&bytes).unwrap();
        assert_eq!(decoded.encoding, UTF_16LE);
        assert_eq!(decoded.content, text);
    }

    #[test]
    fn test_bom_selects_encoding_and_is_stripped() {
        let reader = EncodingReader::new(vec![WINDOWS_1252, UTF_8]).unwrap();

        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("{\"a\": 1}".as_bytes());

        let decoded = reader.decode(&bytes).unwrap();
        assert_eq!(decoded.encoding, UTF_8);
        assert_eq!(decoded.content, "{\"a\": 1}");
    }

    #[test]
    fn test_remembered_encoding_is_stored_after_probe() {
        let dir = TempDir::new().unwrap();
        let path = write_encoded(&dir, "plan.json", ARABIC, WINDOWS_1256);
        let reader = EncodingReader::new(vec![UTF_8, WINDOWS_1256]).unwrap();

        let mut remembered = None;
        let decoded = reader.read_remembered(&path, &mut remembered).unwrap();

        assert_eq!(decoded.encoding, WINDOWS_1256);
        assert_eq!(remembered, Some(WINDOWS_1256));
    }

    #[test]
    fn test_remembered_encoding_failure_resets_memory() {
        let dir = TempDir::new().unwrap();
        let path = write_encoded(&dir, "plan.json", ARABIC, UTF_8);
        let reader = EncodingReader::new(vec![UTF_8, WINDOWS_1256]).unwrap();

        let mut remembered = None;
        reader.read_remembered(&path, &mut remembered).unwrap();
        assert_eq!(remembered, Some(UTF_8));

        // File re-saved in a legacy code page: the single remembered attempt fails
        write_encoded(&dir, "plan.json", ARABIC, WINDOWS_1256);
        let err = reader.read_remembered(&path, &mut remembered).unwrap_err();
        assert!(matches!(err, EncodingError::RememberedEncodingFailed { .. }));
        assert_eq!(remembered, None);

        // Next change probes the full list again
        let decoded = reader.read_remembered(&path, &mut remembered).unwrap();
        assert_eq!(decoded.encoding, WINDOWS_1256);
        assert_eq!(decoded.content, ARABIC);
        assert_eq!(remembered, Some(WINDOWS_1256));
    }
}
