use super::TekTds5xx;
use crate::error::InstrumentError;
use byteorder::{LittleEndian, ReadBytesExt};
use image::{DynamicImage, ImageFormat};
use log::{debug, info};
use std::io::Cursor;
use std::path::Path;

/// BMP file header plus DIB header as sent by the scope
pub const BMP_HEADER_LEN: usize = 54;

/// Monochrome colour table that follows the header
const COLOR_TABLE_LEN: usize = 8;

/// Largest payload accepted from a header. A 640x480 screen at 1 bpp is 38 kB.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Screen capture in BMP format.
#[derive(Debug, Clone)]
pub struct Hardcopy {
    pub bytes: Vec<u8>,
}

impl Hardcopy {
    pub fn decode(&self) -> Result<DynamicImage, InstrumentError> {
        Ok(image::load_from_memory_with_format(
            &self.bytes,
            ImageFormat::Bmp,
        )?)
    }

    /// Write the capture to `path`. `.bmp` files get the bytes as received,
    /// any other extension is converted with the `image` crate.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), InstrumentError> {
        let path = path.as_ref();
        let is_bmp = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("bmp"));

        if is_bmp {
            std::fs::write(path, &self.bytes)
                .map_err(|e| InstrumentError::io(e, format!("writing {}", path.display())))?;
        } else {
            self.decode()?.save(path)?;
        }
        info!("Saved hardcopy to {}", path.display());
        Ok(())
    }
}

/// Length of the pixel data and colour table following a BMP header.
///
/// The file size field in the scope's header is unreliable, so the length is
/// computed from the DIB header: width · height · planes · bits per pixel / 8,
/// plus the colour table.
pub fn bmp_payload_length(header: &[u8]) -> Result<usize, InstrumentError> {
    if header.len() < 30 {
        return Err(InstrumentError::Protocol(format!(
            "BMP header too short: {} bytes",
            header.len()
        )));
    }

    let mut dib = Cursor::new(&header[18..30]);
    let width = dib.read_i32::<LittleEndian>()? as i64;
    let height = dib.read_i32::<LittleEndian>()? as i64;
    let planes = dib.read_i16::<LittleEndian>()? as i64;
    let bits_per_pixel = dib.read_i16::<LittleEndian>()? as i64;

    let invalid = || {
        InstrumentError::Protocol(format!(
            "Invalid BMP dimensions {width}x{height}, {planes} planes, {bits_per_pixel} bpp"
        ))
    };
    let bits = width
        .checked_mul(height)
        .and_then(|b| b.checked_mul(planes))
        .and_then(|b| b.checked_mul(bits_per_pixel))
        .filter(|&b| b > 0)
        .ok_or_else(invalid)?;

    let length = usize::try_from(bits / 8).map_err(|_| invalid())? + COLOR_TABLE_LEN;
    if length > MAX_PAYLOAD_LEN {
        return Err(InstrumentError::Protocol(format!(
            "BMP payload of {length} bytes exceeds the {MAX_PAYLOAD_LEN} byte limit"
        )));
    }
    Ok(length)
}

impl TekTds5xx {
    /// Capture the screen as a monochrome BMP.
    pub fn hardcopy(&mut self) -> Result<Hardcopy, InstrumentError> {
        self.sendcmd("HARDC:PORT GPI;HARDC:LAY PORT;:HARDC:FORM BMP")?;
        self.sendcmd("HARDC START")?;
        std::thread::sleep(self.hardcopy_wait);

        let mut bytes = self.inst.query_raw("", BMP_HEADER_LEN)?;
        let length = bmp_payload_length(&bytes)?;
        debug!("Hardcopy payload of {length} bytes");

        let data = self.inst.query_raw("", length)?;
        self.inst.flush_input()?;
        bytes.extend_from_slice(&data);
        Ok(Hardcopy { bytes })
    }
}
