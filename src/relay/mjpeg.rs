//! Multipart MJPEG framing.
//!
//! Wire layout:
//!
//! ```text
//! --jpgboundary\r\n
//! Content-Length: <n>\r\n
//! Content-Type: image/jpeg\r\n
//! \r\n
//! <n bytes of JPEG>\r\n
//! --jpgboundary\r\n
//! ...
//! ```

use bytes::Bytes;

/// Boundary parameter advertised in the response content type
pub const BOUNDARY: &str = "--jpgboundary";

/// Response content type for an MJPEG session
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=--jpgboundary";

const MARKER: &[u8] = b"--jpgboundary\r\n";
const TRAILER: &[u8] = b"\r\n--jpgboundary\r\n";

/// Marker written once before the first part
pub fn opening_marker() -> Bytes {
    Bytes::from_static(MARKER)
}

/// Header block preceding one JPEG part
pub fn part_header(content_length: usize) -> Bytes {
    Bytes::from(format!(
        "Content-Length: {}\r\nContent-Type: image/jpeg\r\n\r\n",
        content_length
    ))
}

/// Line break closing a part's body plus the next boundary marker
pub fn part_trailer() -> Bytes {
    Bytes::from_static(TRAILER)
}
