use async_trait::async_trait;
use image::DynamicImage;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

use super::DetectionError;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(10);

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Supplies one decoded frame per call.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn grab_frame(&self) -> Result<DynamicImage, DetectionError>;
}

/// Pulls a single frame from an HTTP camera endpoint.
///
/// Accepts a plain `image/*` response as well as a multipart MJPEG stream,
/// from which the first complete JPEG is taken and the connection dropped.
#[derive(Debug, Clone)]
pub struct MjpegFrameSource {
    client: Client,
    url: String,
    max_bytes: usize,
    timeout: Duration,
}

impl MjpegFrameSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            max_bytes: DEFAULT_MAX_FRAME_BYTES,
            timeout: DEFAULT_FRAME_TIMEOUT,
        }
    }

    pub fn with_limits(mut self, max_bytes: usize, timeout: Duration) -> Self {
        self.max_bytes = max_bytes;
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// `Content-Length` announced in the part headers that precede a frame.
fn announced_length(headers: &[u8]) -> Option<usize> {
    String::from_utf8_lossy(headers)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .filter(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .filter_map(|(_, value)| value.trim().parse().ok())
        .next_back()
}

/// Incremental reader for the first JPEG of a multipart MJPEG body.
///
/// The frame length comes from the part's `Content-Length` when one is
/// given. Otherwise SOI and EOI markers are paired, so a thumbnail embedded
/// in the frame's metadata does not end it early. Bytes are examined once.
#[derive(Debug, Default)]
pub struct FirstFrame {
    buf: Vec<u8>,
    pos: usize,
    start: Option<usize>,
    announced: Option<usize>,
    depth: usize,
    end: Option<usize>,
}

impl FirstFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Appends `chunk` and returns the frame once it is complete.
    pub fn push(&mut self, chunk: &[u8]) -> Option<&[u8]> {
        self.buf.extend_from_slice(chunk);
        if self.end.is_none() {
            self.advance();
        }
        let start = self.start?;
        let end = self.end?;
        Some(&self.buf[start..end])
    }

    fn advance(&mut self) {
        while self.announced.is_none() && self.pos + 1 < self.buf.len() {
            let pair = [self.buf[self.pos], self.buf[self.pos + 1]];
            match (self.start, pair) {
                (None, SOI) => {
                    self.start = Some(self.pos);
                    self.announced = announced_length(&self.buf[..self.pos]).filter(|&n| n >= 4);
                    self.depth = 1;
                    self.pos += 2;
                }
                (Some(_), SOI) => {
                    self.depth += 1;
                    self.pos += 2;
                }
                (Some(_), EOI) => {
                    self.depth -= 1;
                    self.pos += 2;
                    if self.depth == 0 {
                        self.end = Some(self.pos);
                        return;
                    }
                }
                _ => self.pos += 1,
            }
        }
        if let (Some(start), Some(len)) = (self.start, self.announced) {
            if self.buf.len() >= start + len {
                self.end = Some(start + len);
            }
        }
    }
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, DetectionError> {
    image::load_from_memory(bytes)
        .map_err(|e| DetectionError::Frame(format!("cannot decode frame: {e}")))
}

#[async_trait]
impl FrameSource for MjpegFrameSource {
    async fn grab_frame(&self) -> Result<DynamicImage, DetectionError> {
        let mut response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| DetectionError::Frame(format!("cannot open stream: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectionError::Frame(format!("stream returned HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.starts_with("image/") {
            let body = response
                .bytes()
                .await
                .map_err(|e| DetectionError::Frame(format!("cannot read frame: {e}")))?;
            if body.len() > self.max_bytes {
                return Err(DetectionError::Frame("frame too large".to_string()));
            }
            return decode(&body);
        }

        let mut frame = FirstFrame::new();
        loop {
            let chunk = response
                .chunk()
                .await
                .map_err(|e| DetectionError::Frame(format!("cannot read frame: {e}")))?;
            let Some(chunk) = chunk else {
                return Err(DetectionError::Frame(
                    "stream ended before a complete frame".to_string(),
                ));
            };
            if let Some(jpeg) = frame.push(&chunk) {
                debug!(bytes = jpeg.len(), "Grabbed frame from stream.");
                return decode(jpeg);
            }
            if frame.buffered() > self.max_bytes {
                return Err(DetectionError::Frame(format!(
                    "no complete frame within {} bytes",
                    self.max_bytes
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_frame(stream: &[u8]) -> Option<Vec<u8>> {
        FirstFrame::new().push(stream).map(<[u8]>::to_vec)
    }

    #[test]
    fn test_extracts_first_complete_jpeg() {
        let mut stream = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        stream.extend_from_slice(&[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);
        stream.extend_from_slice(b"\r\n--frame\r\n");
        stream.extend_from_slice(&[0xFF, 0xD8, 9, 0xFF, 0xD9]);

        assert_eq!(
            first_frame(&stream),
            Some(vec![0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9])
        );
    }

    #[test]
    fn test_incomplete_frame_is_not_returned() {
        assert_eq!(first_frame(&[0xFF, 0xD8, 1, 2]), None);
        assert_eq!(first_frame(b"no markers"), None);
        // An EOI before the SOI does not terminate the frame.
        assert_eq!(first_frame(&[0xFF, 0xD9, 0xFF, 0xD8, 0]), None);
    }

    #[test]
    fn test_embedded_thumbnail_does_not_end_the_frame() {
        let frame = [0xFF, 0xD8, 0xFF, 0xE1, 0xFF, 0xD8, 7, 0xFF, 0xD9, 5, 6, 0xFF, 0xD9];
        let mut stream = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        stream.extend_from_slice(&frame);
        assert_eq!(first_frame(&stream), Some(frame.to_vec()));
    }

    #[test]
    fn test_announced_length_wins_over_markers() {
        let frame = [0xFF, 0xD8, 0xFF, 0xD9, 1, 2, 0xFF, 0xD9];
        let mut stream = format!(
            "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            frame.len()
        )
        .into_bytes();
        stream.extend_from_slice(&frame);
        stream.extend_from_slice(b"\r\n--frame\r\n");
        assert_eq!(first_frame(&stream), Some(frame.to_vec()));
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut stream = b"--frame\r\nContent-Length: 7\r\n\r\n".to_vec();
        stream.extend_from_slice(&[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9, b'\r', b'\n']);

        let mut reader = FirstFrame::new();
        let mut found = None;
        for chunk in stream.chunks(3) {
            if let Some(frame) = reader.push(chunk) {
                found = Some(frame.to_vec());
                break;
            }
        }
        assert_eq!(found, Some(vec![0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]));

        // Markers split between chunks are still seen.
        let mut reader = FirstFrame::new();
        assert!(reader.push(&[0xFF]).is_none());
        assert!(reader.push(&[0xD8, 4, 0xFF]).is_none());
        assert_eq!(reader.push(&[0xD9]), Some(&[0xFF, 0xD8, 4, 0xFF, 0xD9][..]));
    }
}
