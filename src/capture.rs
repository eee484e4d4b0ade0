//! Screen region capture.
//!
//! Grabs the configured screen rectangle into an RGBA buffer. The production
//! path uses a GDI BitBlt from the desktop device context; the watcher only
//! sees the [`CaptureSource`] trait, so tests substitute scripted frames.

use anyhow::Result;
use image::RgbaImage;

use crate::config::Region;

/// Strategy for producing frames of the watched region.
pub trait CaptureSource: Send {
    fn capture(&mut self, region: &Region) -> Result<RgbaImage>;
}

/// Captures the physical screen through the OS.
#[derive(Debug, Default)]
pub struct ScreenCapture;

impl ScreenCapture {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureSource for ScreenCapture {
    fn capture(&mut self, region: &Region) -> Result<RgbaImage> {
        capture_screen_region(region)
    }
}

/// Copies the given screen rectangle into an [`RgbaImage`].
#[cfg(windows)]
pub fn capture_screen_region(region: &Region) -> Result<RgbaImage> {
    use anyhow::anyhow;
    use windows::Win32::Graphics::Gdi::{
        BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC,
        GetDIBits, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
        DIB_RGB_COLORS, SRCCOPY,
    };

    let width = region.width;
    let height = region.height;

    unsafe {
        let screen_dc = GetDC(None);
        if screen_dc.is_invalid() {
            return Err(anyhow!("GetDC failed for the desktop"));
        }

        let mem_dc = CreateCompatibleDC(Some(screen_dc));
        let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
        let previous = SelectObject(mem_dc, bitmap.into());

        let blit = BitBlt(
            mem_dc,
            0,
            0,
            width,
            height,
            Some(screen_dc),
            region.left,
            region.top,
            SRCCOPY,
        );

        let mut pixels = vec![0u8; (width as usize) * (height as usize) * 4];
        let mut info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width,
                // Negative height = top-down row order.
                biHeight: -height,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };

        let copied = GetDIBits(
            mem_dc,
            bitmap,
            0,
            height as u32,
            Some(pixels.as_mut_ptr() as *mut _),
            &mut info,
            DIB_RGB_COLORS,
        );

        SelectObject(mem_dc, previous);
        let _ = DeleteObject(bitmap.into());
        let _ = DeleteDC(mem_dc);
        ReleaseDC(None, screen_dc);

        blit.map_err(|e| anyhow!("BitBlt failed: {}", e))?;
        if copied == 0 {
            return Err(anyhow!("GetDIBits returned no scanlines"));
        }

        // GDI hands back BGRA with an undefined alpha channel.
        for px in pixels.chunks_exact_mut(4) {
            px.swap(0, 2);
            px[3] = 255;
        }

        RgbaImage::from_raw(width as u32, height as u32, pixels)
            .ok_or_else(|| anyhow!("captured buffer did not match {}x{}", width, height))
    }
}

#[cfg(not(windows))]
pub fn capture_screen_region(region: &Region) -> Result<RgbaImage> {
    anyhow::bail!(
        "screen capture of {}x{} at ({}, {}) requires Windows",
        region.width,
        region.height,
        region.left,
        region.top
    )
}
