//! Output of the final pressure field.

use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::memory::Wavefield;

/// Field that was current after the last step.
///
/// For an even number of steps this is the first-allocated grid, for an odd
/// number the second.
pub fn final_pressure(field: &Wavefield) -> &[f32] {
    field.current()
}

/// Write `data` as headerless native-endian `f32` values.
pub fn write_raw(path: impl AsRef<Path>, data: &[f32]) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    writer.write_all(bytemuck::cast_slice(data))?;
    writer.flush()?;
    tracing::info!(path = %path.display(), bytes = data.len() * 4, "wrote pressure field");
    Ok(())
}

/// Sign map of the field, sampled every `scale` cells.
///
/// One text line per sampled inner index, one character per sampled outer
/// index: `0` for zero, `+` for positive and `-` for negative pressure.
pub fn ascii(data: &[f32], width: usize, height: usize, scale: usize) -> String {
    let scale = scale.max(1);
    let mut out = String::with_capacity((width / scale + 1) * (height / scale + 1));
    for j in (0..height).step_by(scale) {
        for i in (0..width).step_by(scale) {
            let v = data[i * height + j];
            out.push(if v == 0.0 {
                '0'
            } else if v > 0.0 {
                '+'
            } else {
                '-'
            });
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_orientation() {
        // width 3, height 2; idx = i * height + j
        let data = [0.0, 1.0, -1.0, 0.0, 2.0, -2.0];
        assert_eq!(ascii(&data, 3, 2, 1), "0-+\n+0-\n");
        assert_eq!(ascii(&data, 3, 2, 2), "0+\n");
    }

    #[test]
    fn test_write_raw_native_endian() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("field.bin");
        let data = [1.0f32, -0.5, 3.25];
        write_raw(&path, &data).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 12);
        let back: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(back, data);
    }
}
