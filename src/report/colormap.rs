use palette::{Hsl, IntoColor, Srgb};
use plotters::style::RGBColor;

// ---------------------------------------------------------------------------
// Categorical palette – one colour per channel line
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<RGBColor> {
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n.max(1) as f32) * 360.0;
            hsl_to_rgb(hue, 0.75, 0.45)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Sequential colormap – scalogram power → colour
// ---------------------------------------------------------------------------

/// Maps a value range onto a dark-blue → yellow gradient for the wavelet
/// power heatmap. Values outside the range clamp to the endpoints.
#[derive(Debug, Clone)]
pub struct SequentialMap {
    lo: f64,
    hi: f64,
}

impl SequentialMap {
    pub fn new(lo: f64, hi: f64) -> Self {
        // Degenerate ranges still render (single colour).
        let hi = if hi > lo { hi } else { lo + 1.0 };
        SequentialMap { lo, hi }
    }

    /// Build a map spanning the data's min..max.
    pub fn from_values(values: &[f64]) -> Self {
        let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if lo.is_finite() && hi.is_finite() {
            SequentialMap::new(lo, hi)
        } else {
            SequentialMap::new(0.0, 1.0)
        }
    }

    pub fn color_for(&self, value: f64) -> RGBColor {
        let t = ((value - self.lo) / (self.hi - self.lo)).clamp(0.0, 1.0) as f32;
        // Hue sweeps blue → orange while lightness rises.
        let hue = 250.0 - 210.0 * t;
        hsl_to_rgb(hue, 0.85, 0.15 + 0.45 * t)
    }
}

fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> RGBColor {
    let hsl = Hsl::new(hue, saturation, lightness);
    let rgb: Srgb = hsl.into_color();
    RGBColor(
        (rgb.red * 255.0) as u8,
        (rgb.green * 255.0) as u8,
        (rgb.blue * 255.0) as u8,
    )
}
