//! Terminal rendering of pairing QR codes.

use wacli_core::error::WacliError;

/// Render QR data with Unicode half-blocks, two module rows per text line.
///
/// A one-module light border is kept on every side so terminal scanners
/// can find the finder patterns against dark backgrounds.
pub fn generate_qr_terminal(qr_data: &str) -> Result<String, WacliError> {
    use qrcode::{Color, EcLevel, QrCode};

    let code = QrCode::with_error_correction_level(qr_data.as_bytes(), EcLevel::L)
        .map_err(|e| WacliError::protocol(format!("QR generation failed: {e}")))?;

    let width = code.width();
    let colors: Vec<Color> = code.into_colors();
    // Coordinates include the border, so (0, 0) is outside the code.
    let is_dark = |row: usize, col: usize| -> bool {
        match (row.checked_sub(1), col.checked_sub(1)) {
            (Some(r), Some(c)) if r < width && c < width => colors[r * width + c] == Color::Dark,
            _ => false,
        }
    };

    let size = width + 2;
    let mut out = String::with_capacity((size + 1) * size.div_ceil(2) * 3);
    let mut row = 0;
    while row < size {
        for col in 0..size {
            out.push(match (is_dark(row, col), is_dark(row + 1, col)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push('\n');
        row += 2;
    }

    Ok(out)
}

/// Print a pairing code to stderr. Stdout carries only the JSON result.
#[cfg_attr(not(feature = "transport"), allow(dead_code))]
pub(crate) fn show_pairing_code(code: &str) {
    match generate_qr_terminal(code) {
        Ok(qr) => {
            eprintln!("Scan this QR code with WhatsApp (Linked Devices > Link a Device):");
            eprintln!("{qr}");
        }
        Err(e) => {
            tracing::warn!("{e}");
            eprintln!("Pairing code: {code}");
        }
    }
}
