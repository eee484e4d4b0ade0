//! Answer-letter to screen-coordinate mapping and pointer clicks.
//!
//! The answer options are assumed to be stacked vertically inside the watched
//! region, one equal-height band per option. Clicking is done with
//! hardware-level SendInput events, which moves the real cursor; message-based
//! clicking is not reliable across applications.

use anyhow::Result;
use thiserror::Error;

use crate::config::Region;

/// Contract violation: the letter does not map to an option slot.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown answer letter '{letter}' for {option_count} options")]
pub struct UnknownLetter {
    pub letter: char,
    pub option_count: u8,
}

/// Maps an answer letter to the screen coordinates of its option band.
///
/// `region.height` is divided into `option_count` equal bands; the letter's
/// ordinal position ('A' = 0) selects the band, and the returned point is the
/// band's center offset by the region origin. Case-insensitive.
pub fn resolve_click(
    letter: char,
    region: &Region,
    option_count: u8,
) -> Result<(i32, i32), UnknownLetter> {
    let upper = letter.to_ascii_uppercase();
    if !upper.is_ascii_uppercase() {
        return Err(UnknownLetter { letter, option_count });
    }
    let row = (upper as u8) - b'A';
    if row >= option_count {
        return Err(UnknownLetter { letter, option_count });
    }

    let x = region.left + region.width / 2;
    let y = region.top + (region.height * (2 * i32::from(row) + 1)) / (2 * i32::from(option_count));
    Ok((x, y))
}

/// Performs a left click at the given screen coordinates.
///
/// Sends a move + down + up sequence with absolute coordinates normalized to
/// the 0-65535 range SendInput expects. The cursor visibly moves.
#[cfg(windows)]
pub fn click(x: i32, y: i32) -> Result<()> {
    use anyhow::anyhow;
    use std::time::Duration;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_MOUSE, MOUSEEVENTF_ABSOLUTE, MOUSEEVENTF_LEFTDOWN,
        MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MOVE, MOUSEINPUT,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

    let screen_width = unsafe { GetSystemMetrics(SM_CXSCREEN) };
    let screen_height = unsafe { GetSystemMetrics(SM_CYSCREEN) };
    if screen_width <= 0 || screen_height <= 0 {
        return Err(anyhow!("could not query screen dimensions"));
    }

    // Normalize to 0-65535 range (required by MOUSEEVENTF_ABSOLUTE)
    let norm_x = ((x as i64 * 65535) / screen_width as i64) as i32;
    let norm_y = ((y as i64 * 65535) / screen_height as i64) as i32;

    let event = |flags| INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: norm_x,
                dy: norm_y,
                dwFlags: flags,
                ..Default::default()
            },
        },
    };

    let sequence = [
        event(MOUSEEVENTF_MOVE | MOUSEEVENTF_ABSOLUTE),
        event(MOUSEEVENTF_LEFTDOWN | MOUSEEVENTF_ABSOLUTE | MOUSEEVENTF_MOVE),
        event(MOUSEEVENTF_LEFTUP | MOUSEEVENTF_ABSOLUTE | MOUSEEVENTF_MOVE),
    ];

    for input in &sequence {
        let sent = unsafe { SendInput(&[*input], std::mem::size_of::<INPUT>() as i32) };
        if sent != 1 {
            return Err(anyhow!("SendInput rejected mouse event at ({}, {})", x, y));
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    Ok(())
}

#[cfg(not(windows))]
pub fn click(x: i32, y: i32) -> Result<()> {
    anyhow::bail!("pointer clicks at ({}, {}) require Windows", x, y)
}
