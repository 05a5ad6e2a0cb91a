//! QR / Code 39 PNG generation
//!
//! Thin wrapper over the `qrcode` and `barcoders` encoders that writes
//! the rendered symbol to a PNG file. All symbol math lives in those
//! crates; this one only selects the symbology, renders, and handles
//! file I/O.

use barcoders::generators::image::Image as BarcodeRenderer;
use barcoders::sym::code39::Code39;
use image::Luma;
use qrcode::QrCode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum Error {
    /// Selector string names no supported symbology
    #[error("unknown symbology {0:?} (expected QRCode or Barcode39)")]
    UnknownSymbology(String),

    /// Value cannot be QR-encoded (e.g. too long for any version)
    #[error("QR encoding failed: {0}")]
    Qr(#[from] qrcode::types::QrError),

    /// Value contains characters outside the Code 39 charset
    #[error("Code 39 encoding failed: {0}")]
    Code39(#[from] barcoders::error::Error),

    #[error("PNG rendering failed: {0}")]
    Render(#[from] image::ImageError),

    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Supported symbologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Symbology {
    QrCode,
    Code39,
}

impl FromStr for Symbology {
    type Err = Error;

    /// Accepts the original selector strings (`"QRCode"`,
    /// `"Barcode39"`) case-insensitively, plus the natural short forms.
    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "qrcode" | "qr" => Ok(Self::QrCode),
            "barcode39" | "code39" | "39" => Ok(Self::Code39),
            _ => Err(Error::UnknownSymbology(s.to_string())),
        }
    }
}

/// Encode `value` in the given symbology and write the PNG to `out`.
pub fn generate(value: &str, symbology: Symbology, out: &Path) -> Result<(), Error> {
    let bytes = match symbology {
        Symbology::QrCode => render_qr(value)?,
        Symbology::Code39 => render_code39(value)?,
    };

    fs::write(out, &bytes).map_err(|source| Error::Io {
        path: out.to_path_buf(),
        source,
    })?;

    debug!(path = %out.display(), ?symbology, "symbol written");
    Ok(())
}

fn render_qr(value: &str) -> Result<Vec<u8>, Error> {
    let code = QrCode::new(value.as_bytes())?;
    let img = code.render::<Luma<u8>>().min_dimensions(200, 200).build();

    // Encode explicitly as PNG instead of save(): the output path is
    // caller-chosen and need not carry a .png extension.
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageOutputFormat::Png)?;
    Ok(buf.into_inner())
}

fn render_code39(value: &str) -> Result<Vec<u8>, Error> {
    let barcode = Code39::new(value)?;
    let renderer = BarcodeRenderer::png(80);
    let encoded = barcode.encode();
    Ok(renderer.generate(&encoded[..])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

    fn decode_qr(path: &Path) -> String {
        let img = image::open(path).unwrap().to_luma8();
        let (w, h) = img.dimensions();
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(w as usize, h as usize, |x, y| {
                img.get_pixel(x as u32, y as u32)[0]
            });
        let grids = prepared.detect_grids();
        assert_eq!(grids.len(), 1, "expected exactly one QR symbol");
        let (_meta, content) = grids[0].decode().unwrap();
        content
    }

    #[test]
    fn test_symbology_selector_strings() {
        assert_eq!("QRCode".parse::<Symbology>().unwrap(), Symbology::QrCode);
        assert_eq!("Barcode39".parse::<Symbology>().unwrap(), Symbology::Code39);

        // Short forms
        assert_eq!("qr".parse::<Symbology>().unwrap(), Symbology::QrCode);
        assert_eq!("code39".parse::<Symbology>().unwrap(), Symbology::Code39);

        assert!(matches!(
            "Barcode128".parse::<Symbology>(),
            Err(Error::UnknownSymbology(_))
        ));
    }

    #[test]
    fn test_generate_qr_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("qr.png");

        generate("HELLO", Symbology::QrCode, &out).unwrap();

        let bytes = fs::read(&out).unwrap();
        assert!(bytes.starts_with(PNG_MAGIC));
        assert_eq!(decode_qr(&out), "HELLO");
    }

    #[test]
    fn test_generate_code39_writes_png() {
        let tmp = TempDir::new().unwrap();
        let qr_out = tmp.path().join("qr.png");
        let c39_out = tmp.path().join("c39.png");

        generate("HELLO", Symbology::QrCode, &qr_out).unwrap();
        generate("HELLO", Symbology::Code39, &c39_out).unwrap();

        let bytes = fs::read(&c39_out).unwrap();
        assert!(bytes.starts_with(PNG_MAGIC));

        // Same value, different symbology, different rendering
        assert_ne!(bytes, fs::read(&qr_out).unwrap());
    }

    #[test]
    fn test_code39_rejects_invalid_charset() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("bad.png");

        // Code 39 has no lowercase letters
        let err = generate("hello", Symbology::Code39, &out).unwrap_err();
        assert!(matches!(err, Error::Code39(_)));
        assert!(!out.exists());
    }

    #[test]
    fn test_output_path_without_extension() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("symbol");

        generate("HELLO", Symbology::QrCode, &out).unwrap();
        assert!(fs::read(&out).unwrap().starts_with(PNG_MAGIC));
    }
}
