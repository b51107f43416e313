//! CAD file format detection
//!
//! Sniffs the leading bytes of an upload: DWG files carry an `AC10xx`
//! release string, binary DXF files a fixed sentinel, and ASCII DXF
//! files open with a group-code / `SECTION` pair.

use std::path::Path;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::multispace0;
use nom::combinator::{map, recognize, verify};
use nom::sequence::{preceded, tuple};
use nom::IResult;

/// Binary DXF sentinel (fixed 22-byte prefix).
const BINARY_DXF_SENTINEL: &[u8] = b"AutoCAD Binary DXF\r\n\x1a\x00";

/// Detected CAD file format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileFormat {
    /// DWG with its release string (e.g. `AC1032`)
    Dwg(String),
    /// Binary DXF
    DxfBinary,
    /// ASCII DXF
    DxfAscii,
}

impl FileFormat {
    /// Canonical lowercase extension for the format.
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Dwg(_) => "dwg",
            FileFormat::DxfBinary | FileFormat::DxfAscii => "dxf",
        }
    }
}

/// Whether the path carries a supported extension (`dwg` or `dxf`,
/// case-insensitive).
pub fn extension_supported(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("dwg") | Some("dxf")
    )
}

fn dwg_signature(input: &[u8]) -> IResult<&[u8], FileFormat> {
    map(
        recognize(tuple((
            tag(b"AC10".as_slice()),
            verify(nom::bytes::complete::take(2usize), |digits: &[u8]| {
                digits.iter().all(u8::is_ascii_digit)
            }),
        ))),
        |release: &[u8]| FileFormat::Dwg(String::from_utf8_lossy(release).into_owned()),
    )(input)
}

fn binary_dxf_signature(input: &[u8]) -> IResult<&[u8], FileFormat> {
    map(tag(BINARY_DXF_SENTINEL), |_| FileFormat::DxfBinary)(input)
}

fn ascii_dxf_signature(input: &[u8]) -> IResult<&[u8], FileFormat> {
    // Every ASCII DXF opens with an integer group code on its own line
    // followed by a section keyword.
    map(
        tuple((
            preceded(multispace0, take_while1(|b: u8| b.is_ascii_digit())),
            preceded(
                multispace0,
                alt((tag(b"SECTION".as_slice()), tag(b"EOF".as_slice()))),
            ),
        )),
        |_| FileFormat::DxfAscii,
    )(input)
}

/// Detect the format from the leading bytes of a file.
///
/// Returns `None` when no known signature matches; the caller treats
/// that as an unsupported upload.
pub fn detect(bytes: &[u8]) -> Option<FileFormat> {
    // Strip a UTF-8 BOM before the ASCII probe.
    let stripped = bytes.strip_prefix(b"\xef\xbb\xbf".as_slice()).unwrap_or(bytes);
    alt((dwg_signature, binary_dxf_signature, ascii_dxf_signature))(stripped)
        .ok()
        .map(|(_, format)| format)
}
