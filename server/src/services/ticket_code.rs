//! Scannable ticket payloads and their QR rendering.
//!
//! Payload layout: `TKT|<order_id>|<phone>` with an optional trailing
//! `|<ticket item uuid>` designating a single line item. `\` and `|` inside a
//! field are backslash-escaped, as are CR and LF (`\r`, `\n`), so an encoded
//! payload never ends in a line break and the terminator a scanner appends can
//! be stripped without touching field content. The payload is not signed;
//! redemption always re-checks the decoded identity against the stored order.

use std::future::Future;
use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageBuffer, ImageFormat, Luma};
use qrcode::{types::Color, QrCode};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::utils::error::AppError;

const PREFIX: &str = "TKT";
const DELIMITER: char = '|';
const ESCAPE: char = '\\';

const MODULE_PIXELS: u32 = 8;
const QUIET_ZONE: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCode {
    pub order_id: String,
    pub phone: String,
    pub item_id: Option<Uuid>,
}

pub fn encode(order_id: &str, phone: &str) -> Result<String, AppError> {
    join_fields(order_id, phone, None)
}

pub fn encode_item(order_id: &str, phone: &str, item_id: Uuid) -> Result<String, AppError> {
    join_fields(order_id, phone, Some(item_id))
}

fn join_fields(order_id: &str, phone: &str, item_id: Option<Uuid>) -> Result<String, AppError> {
    if order_id.is_empty() {
        return Err(AppError::MissingParameter("order_id".to_string()));
    }
    if phone.is_empty() {
        return Err(AppError::MissingParameter("phone".to_string()));
    }

    let mut payload = String::with_capacity(PREFIX.len() + order_id.len() + phone.len() + 40);
    payload.push_str(PREFIX);
    for field in [order_id, phone] {
        payload.push(DELIMITER);
        escape_into(&mut payload, field);
    }
    if let Some(id) = item_id {
        payload.push(DELIMITER);
        payload.push_str(&id.to_string());
    }
    Ok(payload)
}

fn escape_into(out: &mut String, field: &str) {
    for c in field.chars() {
        match c {
            DELIMITER | ESCAPE => {
                out.push(ESCAPE);
                out.push(c);
            }
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
}

pub fn decode(payload: &str) -> Result<DecodedCode, AppError> {
    let payload = payload.trim_end_matches(['\r', '\n']);
    let fields = split_fields(payload).ok_or(AppError::MalformedCode)?;

    let (order_id, phone, item) = match fields.as_slice() {
        [prefix, order_id, phone] if prefix == PREFIX => (order_id, phone, None),
        [prefix, order_id, phone, item] if prefix == PREFIX => (order_id, phone, Some(item)),
        _ => return Err(AppError::MalformedCode),
    };

    if order_id.is_empty() || phone.is_empty() {
        return Err(AppError::MalformedCode);
    }

    let item_id = item
        .map(|raw| Uuid::parse_str(raw).map_err(|_| AppError::MalformedCode))
        .transpose()?;

    Ok(DecodedCode {
        order_id: order_id.clone(),
        phone: phone.clone(),
        item_id,
    })
}

/// Split on unescaped delimiters. `None` on a dangling escape or an escape
/// that precedes anything other than a delimiter, another escape, `r` or `n`.
fn split_fields(payload: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = payload.chars();

    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some(next) if next == DELIMITER || next == ESCAPE => current.push(next),
                Some('r') => current.push('\r'),
                Some('n') => current.push('\n'),
                _ => return None,
            },
            DELIMITER => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    fields.push(current);
    Some(fields)
}

/// Render a payload as a PNG encoded QR code.
pub fn render_png(payload: &str) -> Result<Vec<u8>, AppError> {
    let code =
        QrCode::new(payload.as_bytes()).map_err(|e| AppError::Rendering(e.to_string()))?;

    let modules = code.width() as u32;
    let size = (modules + QUIET_ZONE * 2) * MODULE_PIXELS;
    let mut img = ImageBuffer::from_pixel(size, size, Luma([255u8]));
    let colors = code.to_colors();

    for y in 0..modules {
        for x in 0..modules {
            if colors[(y * modules + x) as usize] != Color::Dark {
                continue;
            }
            let x0 = (x + QUIET_ZONE) * MODULE_PIXELS;
            let y0 = (y + QUIET_ZONE) * MODULE_PIXELS;
            for dy in 0..MODULE_PIXELS {
                for dx in 0..MODULE_PIXELS {
                    img.put_pixel(x0 + dx, y0 + dy, Luma([0u8]));
                }
            }
        }
    }

    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img)
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| AppError::Rendering(e.to_string()))?;
    Ok(png.into_inner())
}

/// Durable home for rendered ticket images.
pub trait ImageSink: Send + Sync {
    /// Store the image for an order and return its retrieval URL.
    fn store(&self, order_id: &str, png: Vec<u8>)
        -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Writes `<dir>/<sha256(order_id)>.png`, so repeat lookups for the same
/// order hit the same file and arbitrary order ids stay path safe.
#[derive(Debug, Clone)]
pub struct FsImageSink {
    dir: PathBuf,
    base_url: String,
}

impl FsImageSink {
    pub fn new(dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn file_name(order_id: &str) -> String {
        format!("{}.png", hex::encode(Sha256::digest(order_id.as_bytes())))
    }
}

impl ImageSink for FsImageSink {
    async fn store(&self, order_id: &str, png: Vec<u8>) -> Result<String, AppError> {
        let name = Self::file_name(order_id);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::Rendering(format!("create image dir: {e}")))?;
        tokio::fs::write(self.dir.join(&name), png)
            .await
            .map_err(|e| AppError::Rendering(format!("write ticket image: {e}")))?;
        Ok(format!("{}/{}", self.base_url, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        assert_eq!(encode("ORD-1", "01012345678").unwrap(), "TKT|ORD-1|01012345678");
    }

    #[test]
    fn test_round_trip_with_delimiters_in_fields() {
        let cases = [
            ("ORD-1", "010-1234-5678"),
            ("a|b", "c\\d"),
            ("|", "\\"),
            ("주문-7", "+82 10 1234"),
        ];
        for (order_id, phone) in cases {
            let decoded = decode(&encode(order_id, phone).unwrap()).unwrap();
            assert_eq!(decoded.order_id, order_id);
            assert_eq!(decoded.phone, phone);
            assert_eq!(decoded.item_id, None);
        }
    }

    #[test]
    fn test_round_trip_keeps_whitespace_and_control_characters() {
        let cases = [
            ("ORD-1", "0101 "),
            ("ORD-1", " "),
            (" ORD-1", "\t0101"),
            ("ORD\n1", "0101\r\n"),
            ("\r", "\n"),
            ("ORD-1", "0101\\n"),
            ("ORD\u{0}1", "01\u{7f}01"),
        ];
        for (order_id, phone) in cases {
            let payload = encode(order_id, phone).unwrap();
            assert!(!payload.contains(['\r', '\n']), "{payload:?} contains a line break");

            let decoded = decode(&payload).unwrap();
            assert_eq!(decoded.order_id, order_id);
            assert_eq!(decoded.phone, phone);

            let scanned = decode(&format!("{payload}\r\n")).unwrap();
            assert_eq!(scanned.phone, phone);
        }
    }

    #[test]
    fn test_line_breaks_are_escaped() {
        assert_eq!(encode("A\nB", "0101\r").unwrap(), "TKT|A\\nB|0101\\r");
    }

    #[test]
    fn test_item_code_round_trip() {
        let id = Uuid::new_v4();
        let decoded = decode(&encode_item("ORD-1", "0101", id).unwrap()).unwrap();
        assert_eq!(decoded.item_id, Some(id));
    }

    #[test]
    fn test_scanner_trailing_newline_is_ignored() {
        let decoded = decode("TKT|ORD-1|0101\r\n").unwrap();
        assert_eq!(decoded.phone, "0101");
    }

    #[test]
    fn test_malformed_payloads() {
        for raw in [
            "",
            "hello",
            "TKT",
            "TKT|ORD-1",
            "XYZ|ORD-1|0101",
            "TKT||0101",
            "TKT|ORD-1|",
            "TKT|ORD-1|0101|not-a-uuid",
            "TKT|ORD-1|0101|x|y",
            "TKT|ORD-1|0101\\",
            "TKT|ORD\\x|0101",
            " TKT|ORD-1|0101",
            "TKT|ORD-1|0101\n|x",
        ] {
            assert!(
                matches!(decode(raw), Err(AppError::MalformedCode)),
                "{raw:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_encode_rejects_empty_fields() {
        assert!(matches!(encode("", "0101"), Err(AppError::MissingParameter(_))));
        assert!(matches!(encode("ORD-1", ""), Err(AppError::MissingParameter(_))));
    }

    #[test]
    fn test_render_png_signature() {
        let png = render_png("TKT|ORD-1|0101").unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_image_file_name_is_path_safe() {
        let name = FsImageSink::file_name("../../etc/passwd");
        assert!(!name.contains('/'));
        assert!(name.ends_with(".png"));
        assert_eq!(name, FsImageSink::file_name("../../etc/passwd"));
    }

    #[tokio::test]
    async fn test_fs_sink_writes_file() {
        let dir = std::env::temp_dir().join(format!("ticket-images-{}", Uuid::new_v4()));
        let sink = FsImageSink::new(&dir, "/ticket-images/");
        let url = sink.store("ORD-1", vec![1, 2, 3]).await.unwrap();

        let name = FsImageSink::file_name("ORD-1");
        assert_eq!(url, format!("/ticket-images/{name}"));
        assert_eq!(std::fs::read(dir.join(&name)).unwrap(), vec![1, 2, 3]);
        let _ = std::fs::remove_dir_all(dir);
    }
}
