//! Seam to the external spectral analyzer.

/// Supplies one attack strength per tracked band for the current buffer.
///
/// `band_index` is the band's slot in the `BandRegistry`. Implementations
/// must answer without blocking; they are queried from the audio callback.
pub trait SpectralFeed {
    fn band_attack(&self, band_index: usize) -> f32;
}

/// Plain per-band strengths, in registry order. Missing bands read as silence.
impl SpectralFeed for [f32] {
    fn band_attack(&self, band_index: usize) -> f32 {
        self.get(band_index).copied().unwrap_or(0.0)
    }
}

impl<const N: usize> SpectralFeed for [f32; N] {
    fn band_attack(&self, band_index: usize) -> f32 {
        self.as_slice().band_attack(band_index)
    }
}

impl SpectralFeed for Vec<f32> {
    fn band_attack(&self, band_index: usize) -> f32 {
        self.as_slice().band_attack(band_index)
    }
}
