use image::{GrayImage, Luma, RgbaImage};

/// Converts a frame to binary by keeping only dark pixels.
///
/// Pixels whose BT.601 luminance falls below the threshold become black
/// (text); everything else becomes white (background). Quiz overlays render
/// dark text on a light panel, so this isolates the question from the page
/// behind it.
pub fn binarize_dark_text(img: &RgbaImage, threshold: u8) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut output = GrayImage::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let r = pixel[0] as f32;
        let g = pixel[1] as f32;
        let b = pixel[2] as f32;
        let luminance = 0.299 * r + 0.587 * g + 0.114 * b;

        let value = if luminance < threshold as f32 {
            0u8 // Black (text)
        } else {
            255u8 // White (background)
        };

        output.put_pixel(x, y, Luma([value]));
    }

    output
}
