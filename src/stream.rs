//! Streaming entity source
//!
//! Yields canonical entities from a parsed artifact as a bounded,
//! restartable sequence. JSON artifacts are scanned incrementally: a
//! depth-tracking, string-aware scanner isolates one top-level element
//! at a time, so memory stays proportional to the chunk size rather
//! than the file. Both root layouts are supported: a bare entity
//! array, and an object whose `OBJECTS` member holds the array (its
//! `HEADER` is harvested for scale variables on the way past).

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Bytes, Read};
use std::path::Path;

use serde_json::{json, Value};
use tracing::debug;

use crate::entity::CanonicalEntity;
use crate::error::{PipelineError, Result};
use crate::normalize::{decode_text, Normalizer, NormalizeStats, TextEncoding};
use crate::parser::{ParsedArtifact, RawRecord};

/// Header variables harvested into a synthetic `SCALE_INFO` record.
const HEADER_SCALE_KEYS: [&str; 4] = ["DIMSCALE", "LTSCALE", "CMLSCALE", "CELTSCALE"];

/// Counters for one pass over a source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStats {
    /// Top-level elements seen (before any filtering)
    pub elements_scanned: u64,
    /// Elements whose bytes did not parse as a JSON object
    pub malformed_skipped: u64,
    /// Elements that needed the Latin-1 rung of the decode ladder
    pub elements_recoded: u64,
    /// Whether a `SCALE_INFO` record was synthesized from the header
    pub scale_info_synthesized: bool,
}

/// A stream of canonical entities over a parsed artifact.
#[derive(Debug)]
pub struct EntityStream {
    source: StreamSource,
    pending: VecDeque<RawRecord>,
    normalizer: Normalizer,
    stats: StreamStats,
}

#[derive(Debug)]
enum StreamSource {
    Json(JsonElementScanner),
    Records(std::vec::IntoIter<RawRecord>),
}

impl EntityStream {
    /// Open a stream over an artifact.
    ///
    /// Fails with a source error when the artifact cannot be opened and
    /// a decode error when the root is neither supported layout.
    pub fn open(artifact: &ParsedArtifact) -> Result<Self> {
        let mut pending = VecDeque::new();
        let mut stats = StreamStats::default();
        let source = match artifact {
            ParsedArtifact::JsonFile(path) => {
                let mut scanner = JsonElementScanner::open(path)?;
                if let Some(header) = scanner.take_header() {
                    if let Some(record) = scale_info_from_header(&header) {
                        debug!("synthesized SCALE_INFO from artifact header");
                        stats.scale_info_synthesized = true;
                        pending.push_back(record);
                    }
                }
                StreamSource::Json(scanner)
            }
            ParsedArtifact::Records(records) => StreamSource::Records(records.clone().into_iter()),
        };
        Ok(EntityStream { source, pending, normalizer: Normalizer::new(), stats })
    }

    /// Count entities without materializing records.
    ///
    /// A separate pass; requires a restartable artifact for the actual
    /// transformation to follow.
    pub fn count_entities(artifact: &ParsedArtifact) -> Result<usize> {
        match artifact {
            ParsedArtifact::Records(records) => Ok(records.len()),
            ParsedArtifact::JsonFile(path) => {
                let mut scanner = JsonElementScanner::open(path)?;
                let mut count = 0usize;
                while scanner.next_element()?.is_some() {
                    count += 1;
                }
                Ok(count)
            }
        }
    }

    /// Yield up to `n` canonical entities.
    ///
    /// Records the Normalizer rejects do not count toward `n`; the
    /// stream keeps pulling until it has `n` entities or the source is
    /// exhausted. An empty result means end of stream.
    pub fn next_chunk(&mut self, n: usize) -> Result<Vec<CanonicalEntity>> {
        let mut chunk = Vec::with_capacity(n.min(4096));
        while chunk.len() < n {
            let raw = match self.next_raw()? {
                Some(raw) => raw,
                None => break,
            };
            if let Some(entity) = self.normalizer.normalize(&raw) {
                chunk.push(entity);
            }
        }
        Ok(chunk)
    }

    fn next_raw(&mut self) -> Result<Option<RawRecord>> {
        if let Some(pending) = self.pending.pop_front() {
            self.stats.elements_scanned += 1;
            return Ok(Some(pending));
        }
        loop {
            match &mut self.source {
                StreamSource::Records(iter) => {
                    return Ok(iter.next().map(|r| {
                        self.stats.elements_scanned += 1;
                        r
                    }))
                }
                StreamSource::Json(scanner) => {
                    let bytes = match scanner.next_element()? {
                        Some(bytes) => bytes,
                        None => return Ok(None),
                    };
                    self.stats.elements_scanned += 1;
                    let (text, encoding) = decode_text(&bytes);
                    if encoding == TextEncoding::Latin1 {
                        self.stats.elements_recoded += 1;
                    }
                    match serde_json::from_str::<Value>(&text) {
                        Ok(Value::Object(map)) => return Ok(Some(map)),
                        Ok(_) | Err(_) => {
                            // Balanced but unusable element: skip, keep streaming.
                            self.stats.malformed_skipped += 1;
                        }
                    }
                }
            }
        }
    }

    pub fn stream_stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn normalize_stats(&self) -> &NormalizeStats {
        self.normalizer.stats()
    }

    /// Tear down into the accumulated statistics.
    pub fn into_stats(self) -> (StreamStats, NormalizeStats) {
        (self.stats, self.normalizer.into_stats())
    }
}

/// Build the synthetic `SCALE_INFO` raw record from header variables.
fn scale_info_from_header(header: &serde_json::Map<String, Value>) -> Option<RawRecord> {
    if !HEADER_SCALE_KEYS.iter().any(|k| header.contains_key(*k)) {
        return None;
    }
    let mut scales = serde_json::Map::new();
    for key in HEADER_SCALE_KEYS {
        if let Some(v) = header.get(key) {
            scales.insert(key.to_string(), v.clone());
        }
    }
    let mut record = RawRecord::new();
    record.insert("type".to_string(), json!("SCALE_INFO"));
    record.insert("scales".to_string(), Value::Object(scales));
    Some(record)
}

/// Incremental scanner over a JSON artifact's entity array.
#[derive(Debug)]
struct JsonElementScanner {
    bytes: Bytes<BufReader<File>>,
    /// Single byte of lookahead for scalar boundary detection.
    pushback: Option<u8>,
    /// `HEADER` object captured while locating `OBJECTS` (object-root
    /// layout only); taken once by the caller.
    header: Option<serde_json::Map<String, Value>>,
    finished: bool,
}

impl JsonElementScanner {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            PipelineError::Source(format!("cannot open artifact {}: {e}", path.display()))
        })?;
        let mut scanner = JsonElementScanner {
            bytes: BufReader::new(file).bytes(),
            pushback: None,
            header: None,
            finished: false,
        };
        scanner.seek_entity_array()?;
        Ok(scanner)
    }

    fn take_header(&mut self) -> Option<serde_json::Map<String, Value>> {
        self.header.take()
    }

    /// Advance past the root to the opening `[` of the entity array.
    fn seek_entity_array(&mut self) -> Result<()> {
        match self.next_significant()? {
            Some(b'[') => Ok(()),
            Some(b'{') => self.seek_objects_member(),
            Some(other) => Err(PipelineError::Decode(format!(
                "unexpected artifact root byte 0x{other:02x}; expected array or object"
            ))),
            None => Err(PipelineError::Decode("empty artifact".to_string())),
        }
    }

    /// Inside an object root: walk members until the `OBJECTS` array.
    fn seek_objects_member(&mut self) -> Result<()> {
        loop {
            match self.next_significant()? {
                Some(b'"') => {
                    let key = self.read_string_body()?;
                    match self.next_significant()? {
                        Some(b':') => {}
                        _ => return Err(PipelineError::Decode("malformed object member".into())),
                    }
                    if key == "OBJECTS" {
                        match self.next_significant()? {
                            Some(b'[') => return Ok(()),
                            _ => {
                                return Err(PipelineError::Decode(
                                    "OBJECTS member is not an array".into(),
                                ))
                            }
                        }
                    } else if key == "HEADER" {
                        let value = self.capture_value()?;
                        let (text, _) = decode_text(&value);
                        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text) {
                            self.header = Some(map);
                        }
                    } else {
                        self.capture_value()?;
                    }
                }
                Some(b',') => {}
                Some(b'}') | None => {
                    return Err(PipelineError::Decode(
                        "artifact object has no OBJECTS array".into(),
                    ))
                }
                Some(other) => {
                    return Err(PipelineError::Decode(format!(
                        "unexpected byte 0x{other:02x} in artifact root"
                    )))
                }
            }
        }
    }

    /// The next element's bytes, or `None` at the array's end.
    fn next_element(&mut self) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            match self.next_significant()? {
                Some(b',') => {}
                Some(b']') => {
                    self.finished = true;
                    return Ok(None);
                }
                Some(first) => {
                    let mut buf = Vec::with_capacity(128);
                    buf.push(first);
                    self.capture_rest(first, &mut buf)?;
                    return Ok(Some(buf));
                }
                None => {
                    return Err(PipelineError::Decode(
                        "artifact truncated inside entity array".into(),
                    ))
                }
            }
        }
    }

    /// Capture one complete JSON value (any type), returning its bytes.
    fn capture_value(&mut self) -> Result<Vec<u8>> {
        match self.next_significant()? {
            Some(first) => {
                let mut buf = Vec::with_capacity(64);
                buf.push(first);
                self.capture_rest(first, &mut buf)?;
                Ok(buf)
            }
            None => Err(PipelineError::Decode("artifact truncated".into())),
        }
    }

    /// Having consumed `first`, append bytes until the value closes.
    fn capture_rest(&mut self, first: u8, buf: &mut Vec<u8>) -> Result<()> {
        match first {
            b'{' | b'[' => {
                let mut depth: u32 = 1;
                let mut in_string = false;
                let mut escaped = false;
                while depth > 0 {
                    let b = self.next_byte()?.ok_or_else(|| {
                        PipelineError::Decode("artifact truncated inside value".into())
                    })?;
                    buf.push(b);
                    if in_string {
                        if escaped {
                            escaped = false;
                        } else if b == b'\\' {
                            escaped = true;
                        } else if b == b'"' {
                            in_string = false;
                        }
                    } else {
                        match b {
                            b'"' => in_string = true,
                            b'{' | b'[' => depth += 1,
                            b'}' | b']' => depth -= 1,
                            _ => {}
                        }
                    }
                }
                Ok(())
            }
            b'"' => {
                let mut escaped = false;
                loop {
                    let b = self.next_byte()?.ok_or_else(|| {
                        PipelineError::Decode("artifact truncated inside string".into())
                    })?;
                    buf.push(b);
                    if escaped {
                        escaped = false;
                    } else if b == b'\\' {
                        escaped = true;
                    } else if b == b'"' {
                        return Ok(());
                    }
                }
            }
            _ => {
                // Scalar: runs to the next structural delimiter.
                loop {
                    match self.next_byte()? {
                        Some(b) if matches!(b, b',' | b']' | b'}') => {
                            self.pushback = Some(b);
                            return Ok(());
                        }
                        Some(b) => {
                            if !b.is_ascii_whitespace() {
                                buf.push(b);
                            }
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        if let Some(b) = self.pushback.take() {
            return Ok(Some(b));
        }
        match self.bytes.next() {
            Some(Ok(b)) => Ok(Some(b)),
            Some(Err(e)) => Err(PipelineError::Source(format!("artifact read failed: {e}"))),
            None => Ok(None),
        }
    }

    /// Next non-whitespace byte.
    fn next_significant(&mut self) -> Result<Option<u8>> {
        loop {
            match self.next_byte()? {
                Some(b) if b.is_ascii_whitespace() => {}
                other => return Ok(other),
            }
        }
    }

    /// Read the remainder of a string whose opening quote was consumed.
    fn read_string_body(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let mut escaped = false;
        loop {
            let b = self.next_byte()?.ok_or_else(|| {
                PipelineError::Decode("artifact truncated inside key".into())
            })?;
            if escaped {
                buf.push(b);
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                let (text, _) = decode_text(&buf);
                return Ok(text.into_owned());
            } else {
                buf.push(b);
            }
        }
    }
}
