use rayon::prelude::*;

use super::blend::CompositeOp;

/// Rows below this are blended on the calling thread.
const PARALLEL_MIN_ROWS: u32 = 64;

/// Owned RGBA8 render target (straight alpha, row-major, 4 bytes per pixel).
///
/// Plays the role of a canvas: effects draw into it, the compositor draws
/// it onto the main surface. Resizing to the current size keeps the pixels;
/// any other size reallocates and clears to transparent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width as usize) * (height as usize) * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns true when the buffer was reallocated.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height {
            return false;
        }
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize((width as usize) * (height as usize) * 4, 0);
        true
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(((y as usize) * (self.width as usize) + x as usize) * 4)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let i = self.offset(x, y)?;
        Some([self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        if let Some(i) = self.offset(x, y) {
            self.pixels[i..i + 4].copy_from_slice(&color);
        }
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    pub fn fill(&mut self, color: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    /// Fills the clipped rectangle, composited with source-over.
    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: [u8; 4]) {
        let x0 = x.max(0) as u32;
        let y0 = y.max(0) as u32;
        let x1 = ((x as i64 + w as i64).clamp(0, self.width as i64)) as u32;
        let y1 = ((y as i64 + h as i64).clamp(0, self.height as i64)) as u32;
        for py in y0..y1 {
            for px in x0..x1 {
                if let Some(i) = self.offset(px, py) {
                    CompositeOp::SourceOver.apply(&mut self.pixels[i..i + 4], &color, 1.0);
                }
            }
        }
    }

    /// Composites one pixel onto (x, y) with the given operator.
    pub fn blend_pixel(&mut self, x: i32, y: i32, color: [u8; 4], op: CompositeOp, alpha: f32) {
        if x < 0 || y < 0 {
            return;
        }
        if let Some(i) = self.offset(x as u32, y as u32) {
            op.apply(&mut self.pixels[i..i + 4], &color, alpha);
        }
    }

    /// Multiplies every alpha by `factor` (canvas "destination-out" fade).
    pub fn fade(&mut self, factor: f32) {
        let factor = factor.clamp(0.0, 1.0);
        for px in self.pixels.chunks_exact_mut(4) {
            px[3] = (px[3] as f32 * factor).round() as u8;
        }
    }

    /// Draws `src` stretched over this whole surface with nearest-neighbour
    /// sampling. Zero-area sources or targets draw nothing.
    pub fn draw(&mut self, src: &Surface, op: CompositeOp, alpha: f32) {
        if self.is_empty() || src.is_empty() || alpha <= 0.0 {
            return;
        }
        let (dw, dh) = (self.width as usize, self.height as usize);
        let (sw, sh) = (src.width as usize, src.height as usize);
        let row_bytes = dw * 4;

        let blend_row = |y: usize, row: &mut [u8]| {
            let sy = y * sh / dh;
            let src_row = &src.pixels[sy * sw * 4..(sy + 1) * sw * 4];
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let sx = x * sw / dw;
                op.apply(px, &src_row[sx * 4..sx * 4 + 4], alpha);
            }
        };

        if self.height >= PARALLEL_MIN_ROWS {
            self.pixels
                .par_chunks_mut(row_bytes)
                .enumerate()
                .for_each(|(y, row)| blend_row(y, row));
        } else {
            self.pixels
                .chunks_mut(row_bytes)
                .enumerate()
                .for_each(|(y, row)| blend_row(y, row));
        }
    }

    pub fn copy_from(&mut self, src: &Surface) {
        if self.width == src.width && self.height == src.height {
            self.pixels.copy_from_slice(&src.pixels);
        } else {
            self.clear();
            self.draw(src, CompositeOp::SourceOver, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_size_resize_keeps_pixels() {
        let mut s = Surface::new(4, 3);
        s.set_pixel(1, 1, [9, 8, 7, 255]);
        assert!(!s.resize(4, 3));
        assert!(!s.resize(4, 3));
        assert_eq!(s.pixel(1, 1), Some([9, 8, 7, 255]));
    }

    #[test]
    fn new_size_clears() {
        let mut s = Surface::new(2, 2);
        s.fill([1, 2, 3, 255]);
        assert!(s.resize(3, 2));
        assert_eq!(s.pixels().len(), 3 * 2 * 4);
        assert!(s.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn draw_scales_nearest() {
        let mut src = Surface::new(2, 1);
        src.set_pixel(0, 0, [255, 0, 0, 255]);
        src.set_pixel(1, 0, [0, 0, 255, 255]);

        let mut dst = Surface::new(4, 2);
        dst.fill([0, 0, 0, 255]);
        dst.draw(&src, CompositeOp::SourceOver, 1.0);
        assert_eq!(dst.pixel(1, 1), Some([255, 0, 0, 255]));
        assert_eq!(dst.pixel(2, 0), Some([0, 0, 255, 255]));
    }

    #[test]
    fn parallel_rows_match_serial() {
        let mut src = Surface::new(8, 8);
        for y in 0..8 {
            for x in 0..8 {
                src.set_pixel(x, y, [(x * 30) as u8, (y * 30) as u8, 77, 255]);
            }
        }
        let mut tall = Surface::new(8, 128);
        tall.fill([20, 40, 60, 255]);
        tall.draw(&src, CompositeOp::Difference, 1.0);

        let mut expected = [20, 40, 60, 255];
        CompositeOp::Difference.apply(&mut expected, &src.pixel(3, 5).unwrap(), 1.0);
        assert_eq!(tall.pixel(3, 5 * 16), Some(expected));
    }

    #[test]
    fn empty_surfaces_draw_nothing() {
        let mut dst = Surface::new(0, 0);
        dst.draw(&Surface::new(2, 2), CompositeOp::SourceOver, 1.0);
        let mut dst = Surface::new(2, 2);
        dst.draw(&Surface::new(0, 5), CompositeOp::SourceOver, 1.0);
        assert!(dst.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn fill_rect_clips() {
        let mut s = Surface::new(3, 3);
        s.fill_rect(-1, 2, 10, 10, [1, 1, 1, 255]);
        assert_eq!(s.pixel(0, 2), Some([1, 1, 1, 255]));
        assert_eq!(s.pixel(2, 2), Some([1, 1, 1, 255]));
        assert_eq!(s.pixel(0, 1), Some([0, 0, 0, 0]));
    }
}
