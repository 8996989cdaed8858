/// Rotation math and embedded orientation tags
///
/// Rotations are kept in degrees in [0, 360). When an item is backed by a
/// local file the orientation is also written into the file's EXIF block so
/// other viewers agree with the store.
use crate::error::{MediaError, Result};
use image::ImageFormat;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// EXIF tag number for orientation
const TAG_ORIENTATION: u16 = 0x0112;
/// EXIF type SHORT
const TYPE_SHORT: u16 = 3;
const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Bring any angle into [0, 360)
pub fn normalize_degrees(degrees: f32) -> f32 {
    let mut angle = degrees % 360.0;
    if angle < 0.0 {
        angle += 360.0;
    }
    // -1e-6 + 360.0 rounds to 360.0 in f32
    if angle >= 360.0 {
        angle = 0.0;
    }
    angle
}

/// Translate a rotation into the EXIF orientation code.
/// Anything that is not a quarter turn maps to "normal".
pub fn degrees_to_exif(degrees: f32) -> u16 {
    match normalize_degrees(degrees).round() as i32 {
        90 => 6,
        180 => 3,
        270 => 8,
        _ => 1,
    }
}

/// Inverse of `degrees_to_exif` for the four rotation-only codes
pub fn exif_to_degrees(code: u16) -> f32 {
    match code {
        6 => 90.0,
        3 => 180.0,
        8 => 270.0,
        _ => 0.0,
    }
}

/// Read the orientation code of a file, `None` when it carries no tag
pub fn read_orientation(path: &Path) -> Result<Option<u16>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) => return Ok(None),
        Err(e) => return Err(MediaError::metadata(path, e.to_string())),
    };

    Ok(exif
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(|code| code as u16))
}

/// Write an orientation code into a JPEG or TIFF file.
///
/// Existing tags are patched in place. A JPEG without any EXIF block gets a
/// minimal one holding just the orientation. Every other format is rejected
/// with `UnsupportedFormat`.
pub fn write_orientation(path: &Path, code: u16) -> Result<()> {
    let format = ImageFormat::from_path(path)
        .map_err(|_| MediaError::UnsupportedFormat(path.to_path_buf()))?;

    let mut data = std::fs::read(path)?;
    match format {
        ImageFormat::Jpeg => write_jpeg_orientation(path, &mut data, code)?,
        ImageFormat::Tiff => {
            if !patch_tiff_orientation(&mut data, code)? {
                return Err(MediaError::metadata(path, "no orientation tag in IFD0"));
            }
        }
        _ => return Err(MediaError::UnsupportedFormat(path.to_path_buf())),
    }

    std::fs::write(path, &data)?;
    Ok(())
}

fn write_jpeg_orientation(path: &Path, data: &mut Vec<u8>, code: u16) -> Result<()> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(MediaError::metadata(path, "missing JPEG start of image"));
    }

    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return Err(MediaError::metadata(path, "corrupt JPEG segment marker"));
        }
        let marker = data[pos + 1];
        match marker {
            // Fill byte
            0xFF => {
                pos += 1;
                continue;
            }
            // Standalone markers carry no length
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            // Start of scan / end of image: no EXIF block found
            0xDA | 0xD9 => break,
            _ => {}
        }

        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let start = pos + 4;
        let end = pos + 2 + len;
        if len < 2 || end > data.len() {
            return Err(MediaError::metadata(path, "truncated JPEG segment"));
        }

        if marker == 0xE1 && data[start..end].starts_with(EXIF_HEADER) {
            let tiff = &mut data[start + EXIF_HEADER.len()..end];
            return if patch_tiff_orientation(tiff, code)? {
                Ok(())
            } else {
                Err(MediaError::metadata(path, "EXIF block has no orientation tag"))
            };
        }
        pos = end;
    }

    let rest = data.split_off(2);
    data.extend_from_slice(&minimal_exif_segment(code));
    data.extend_from_slice(&rest);
    Ok(())
}

/// APP1 segment with a big-endian TIFF block holding a single orientation entry
fn minimal_exif_segment(code: u16) -> Vec<u8> {
    let mut tiff = Vec::with_capacity(26);
    tiff.extend_from_slice(b"MM\0\x2A");
    tiff.extend_from_slice(&8u32.to_be_bytes());
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&TAG_ORIENTATION.to_be_bytes());
    tiff.extend_from_slice(&TYPE_SHORT.to_be_bytes());
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&code.to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes());

    let len = (2 + EXIF_HEADER.len() + tiff.len()) as u16;
    let mut segment = vec![0xFF, 0xE1];
    segment.extend_from_slice(&len.to_be_bytes());
    segment.extend_from_slice(EXIF_HEADER);
    segment.extend_from_slice(&tiff);
    segment
}

/// Patch the orientation entry of IFD0 in a TIFF structure.
/// Returns `Ok(false)` when IFD0 has no orientation entry.
fn patch_tiff_orientation(tiff: &mut [u8], code: u16) -> Result<bool> {
    let malformed = || MediaError::metadata("<tiff>", "malformed TIFF header");

    if tiff.len() < 8 {
        return Err(malformed());
    }
    let big_endian = match &tiff[0..2] {
        b"MM" => true,
        b"II" => false,
        _ => return Err(malformed()),
    };
    let read_u16 = |bytes: &[u8]| {
        let pair = [bytes[0], bytes[1]];
        if big_endian {
            u16::from_be_bytes(pair)
        } else {
            u16::from_le_bytes(pair)
        }
    };
    let read_u32 = |bytes: &[u8]| {
        let quad = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if big_endian {
            u32::from_be_bytes(quad)
        } else {
            u32::from_le_bytes(quad)
        }
    };

    if read_u16(&tiff[2..4]) != 42 {
        return Err(malformed());
    }
    let ifd = read_u32(&tiff[4..8]) as usize;
    if ifd + 2 > tiff.len() {
        return Err(malformed());
    }

    let count = read_u16(&tiff[ifd..ifd + 2]) as usize;
    for index in 0..count {
        let entry = ifd + 2 + index * 12;
        if entry + 12 > tiff.len() {
            return Err(malformed());
        }
        if read_u16(&tiff[entry..entry + 2]) != TAG_ORIENTATION {
            continue;
        }
        if read_u16(&tiff[entry + 2..entry + 4]) != TYPE_SHORT {
            return Err(MediaError::metadata("<tiff>", "orientation tag is not a SHORT"));
        }
        let value = if big_endian {
            code.to_be_bytes()
        } else {
            code.to_le_bytes()
        };
        tiff[entry + 8..entry + 10].copy_from_slice(&value);
        return Ok(true);
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(350.0 + 20.0), 10.0);
        assert_eq!(normalize_degrees(0.0 - 90.0), 270.0);
        assert_eq!(normalize_degrees(720.0), 0.0);
        assert_eq!(normalize_degrees(-720.0), 0.0);
        assert_eq!(normalize_degrees(45.5), 45.5);
        let tiny = normalize_degrees(-0.000_001);
        assert!((0.0..360.0).contains(&tiny));
    }

    #[test]
    fn test_degrees_to_exif() {
        assert_eq!(degrees_to_exif(0.0), 1);
        assert_eq!(degrees_to_exif(90.0), 6);
        assert_eq!(degrees_to_exif(-180.0), 3);
        assert_eq!(degrees_to_exif(270.0), 8);
        assert_eq!(degrees_to_exif(45.0), 1);
        for code in [1, 3, 6, 8] {
            assert_eq!(degrees_to_exif(exif_to_degrees(code)), code);
        }
    }

    #[test]
    fn test_write_then_patch_jpeg_orientation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        RgbImage::new(8, 8).save(&path).unwrap();
        assert_eq!(read_orientation(&path).unwrap(), None);

        // No EXIF block yet: one is inserted
        write_orientation(&path, 6).unwrap();
        assert_eq!(read_orientation(&path).unwrap(), Some(6));
        let len_after_insert = std::fs::metadata(&path).unwrap().len();

        // Existing tag: patched in place
        write_orientation(&path, 3).unwrap();
        assert_eq!(read_orientation(&path).unwrap(), Some(3));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), len_after_insert);

        // The image still decodes
        assert!(image::open(&path).is_ok());
    }

    #[test]
    fn test_unsupported_format_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphic.png");
        RgbImage::new(4, 4).save(&path).unwrap();
        let err = write_orientation(&path, 6).unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedFormat(_)));

        let unknown = dir.path().join("clip.xyz");
        std::fs::write(&unknown, b"data").unwrap();
        assert!(matches!(
            write_orientation(&unknown, 6),
            Err(MediaError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_patch_little_endian_tiff_block() {
        let mut tiff = vec![b'I', b'I', 42, 0, 8, 0, 0, 0];
        tiff.extend_from_slice(&1u16.to_le_bytes());
        tiff.extend_from_slice(&TAG_ORIENTATION.to_le_bytes());
        tiff.extend_from_slice(&TYPE_SHORT.to_le_bytes());
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&[1, 0, 0, 0]);
        tiff.extend_from_slice(&0u32.to_le_bytes());

        assert!(patch_tiff_orientation(&mut tiff, 8).unwrap());
        assert_eq!(&tiff[18..20], &8u16.to_le_bytes());
    }

    #[test]
    fn test_tiff_without_orientation_entry() {
        let mut tiff = vec![b'M', b'M', 0, 42, 0, 0, 0, 8, 0, 0, 0, 0, 0, 0];
        assert!(!patch_tiff_orientation(&mut tiff, 6).unwrap());
        let mut garbage = vec![0u8; 4];
        assert!(patch_tiff_orientation(&mut garbage, 6).is_err());
    }
}
