use std::{fs::File, io, io::BufWriter, path::Path};

use speedgb_core::{SCREEN_HEIGHT, SCREEN_WIDTH};

/// Save a packed 0x00RRGGBB frame as an RGB PNG.
pub fn write_png(path: &Path, frame: &[u32]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(
        BufWriter::new(file),
        SCREEN_WIDTH as u32,
        SCREEN_HEIGHT as u32,
    );
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);

    let mut pixels = Vec::with_capacity(SCREEN_WIDTH * SCREEN_HEIGHT * 3);
    for c in frame.iter().take(SCREEN_WIDTH * SCREEN_HEIGHT) {
        pixels.push(((c >> 16) & 0xFF) as u8);
        pixels.push(((c >> 8) & 0xFF) as u8);
        pixels.push((c & 0xFF) as u8);
    }

    let mut writer = encoder.write_header().map_err(io::Error::other)?;
    writer.write_image_data(&pixels).map_err(io::Error::other)?;
    writer.finish().map_err(io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    #[test]
    fn png_holds_the_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let mut frame = vec![0x00FF_FFFFu32; SCREEN_WIDTH * SCREEN_HEIGHT];
        frame[1] = 0x0012_3456;
        write_png(&path, &frame).unwrap();

        let decoder = png::Decoder::new(BufReader::new(File::open(&path).unwrap()));
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0; reader.output_buffer_size().unwrap()];
        let info = reader.next_frame(&mut buf).unwrap();
        assert_eq!((info.width, info.height), (160, 144));
        assert_eq!(&buf[..6], &[0xFF, 0xFF, 0xFF, 0x12, 0x34, 0x56]);
    }
}
