//! NumPy `.npz` voice archive reader.
//!
//! Only what voice packs need: NPY format 1.x/2.x, `float32` data in C order.
//! Kokoro packs store each voice as a `(N, 1, 256)` array; the shape is kept
//! but callers normally only want the flat data.

use std::{collections::HashMap, io::Read, path::Path};

use anyhow::{bail, ensure, Context, Result};
use zip::ZipArchive;

const MAGIC: &[u8] = b"\x93NUMPY";

/// One array from an archive: shape plus flat row-major `f32` data.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

#[derive(Debug)]
struct NpyHeader {
    big_endian: bool,
    shape: Vec<usize>,
}

/// Pull a field value out of the Python dict literal in an NPY header.
fn header_field<'a>(header: &'a str, field: &str) -> Option<&'a str> {
    let start = [format!("'{field}':"), format!("\"{field}\":")]
        .iter()
        .find_map(|key| header.find(key.as_str()).map(|p| p + key.len()))?;
    let rest = header[start..].trim_start();

    match rest.chars().next()? {
        '(' => rest.find(')').map(|end| &rest[..=end]),
        q @ ('\'' | '"') => {
            let inner = &rest[1..];
            inner.find(q).map(|end| &inner[..end])
        }
        _ => {
            let end = rest.find([',', '}']).unwrap_or(rest.len());
            Some(rest[..end].trim())
        }
    }
}

fn parse_header(header: &str) -> Result<NpyHeader> {
    let descr = header_field(header, "descr").context("NPY header missing 'descr'")?;
    let big_endian = match descr {
        "<f4" | "=f4" | "|f4" => false,
        ">f4" => true,
        other => bail!("Unsupported dtype '{}': voice arrays must be float32", other),
    };

    if header_field(header, "fortran_order").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        bail!("Fortran-order arrays are not supported");
    }

    let shape_literal = header_field(header, "shape").context("NPY header missing 'shape'")?;
    let shape = shape_literal
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<usize>().with_context(|| format!("Bad shape dim: '{}'", t)))
        .collect::<Result<Vec<_>>>()?;

    Ok(NpyHeader { big_endian, shape })
}

/// Decode one `.npy` member.
pub fn parse_npy(bytes: &[u8]) -> Result<NpyArray> {
    ensure!(bytes.len() >= 10 && bytes.starts_with(MAGIC), "Not a valid NPY file (bad magic)");

    let (header_len, header_start) = match bytes[6] {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            ensure!(bytes.len() >= 12, "NPY v{} file too short", bytes[6]);
            (u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize, 12)
        }
        v => bail!("Unsupported NPY version {}.{}", v, bytes[7]),
    };

    let body_start = header_start + header_len;
    ensure!(bytes.len() >= body_start, "NPY file truncated in header");
    let header = std::str::from_utf8(&bytes[header_start..body_start])
        .context("NPY header is not valid UTF-8")?;
    let NpyHeader { big_endian, shape } = parse_header(header)?;

    let count: usize = shape.iter().product();
    let body = &bytes[body_start..];
    ensure!(
        body.len() >= count * 4,
        "NPY data section too short: expected {} bytes, got {}",
        count * 4,
        body.len()
    );

    let data = body[..count * 4]
        .chunks_exact(4)
        .map(|b| {
            let raw = [b[0], b[1], b[2], b[3]];
            if big_endian {
                f32::from_be_bytes(raw)
            } else {
                f32::from_le_bytes(raw)
            }
        })
        .collect();

    Ok(NpyArray { shape, data })
}

/// Load every array in an `.npz` archive, keyed by member name without `.npy`.
pub fn load_npz(path: &Path) -> Result<HashMap<String, NpyArray>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Cannot open NPZ file: {}", path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Cannot open ZIP archive: {}", path.display()))?;

    let mut arrays = HashMap::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).context("Failed to read ZIP entry")?;
        let name = entry.name().trim_end_matches(".npy").to_string();

        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf).context("Failed to read NPY entry")?;

        let array =
            parse_npy(&buf).with_context(|| format!("Failed to parse voice '{}'", name))?;
        arrays.insert(name, array);
    }
    Ok(arrays)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal v1.0 NPY buffer, header padded to a 64-byte boundary.
    fn make_npy(shape: &[usize], values: &[f32]) -> Vec<u8> {
        let dims = shape.iter().map(|d| format!("{d}, ")).collect::<String>();
        let mut header = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': ({dims}), }}");
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');

        let mut buf = MAGIC.to_vec();
        buf.extend_from_slice(&[1, 0]);
        buf.extend_from_slice(&(header.len() as u16).to_le_bytes());
        buf.extend_from_slice(header.as_bytes());
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf
    }

    #[test]
    fn test_parse_voice_shaped_array() {
        let values: Vec<f32> = (0..12).map(|x| x as f32 * 0.5).collect();
        let arr = parse_npy(&make_npy(&[3, 1, 4], &values)).unwrap();
        assert_eq!(arr.shape, vec![3, 1, 4]);
        assert_eq!(arr.data, values);
    }

    #[test]
    fn test_header_field_forms() {
        let h = "{'descr': '<f4', 'fortran_order': False, 'shape': (2, 3), }";
        assert_eq!(header_field(h, "descr"), Some("<f4"));
        assert_eq!(header_field(h, "fortran_order"), Some("False"));
        assert_eq!(header_field(h, "shape"), Some("(2, 3)"));
        assert_eq!(header_field(h, "missing"), None);
    }

    #[test]
    fn test_rejects_non_float() {
        let mut buf = make_npy(&[1], &[1.0]);
        let pos = buf.windows(3).position(|w| w == b"<f4").unwrap();
        buf[pos + 1] = b'i';
        assert!(parse_npy(&buf).is_err());
    }

    #[test]
    fn test_truncated_data() {
        let mut buf = make_npy(&[4], &[1.0, 2.0, 3.0, 4.0]);
        buf.truncate(buf.len() - 4);
        assert!(parse_npy(&buf).is_err());
    }

    #[test]
    fn test_bad_magic() {
        assert!(parse_npy(b"NOTANPYFILE").is_err());
    }
}
