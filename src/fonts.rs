//! Text measurement for the reference renderer.
//!
//! Without a loaded face the measurer falls back to Helvetica-like average
//! advances, which keeps layout deterministic across machines. A TTF/OTF face
//! can be loaded for real glyph advances via `ttf-parser`.

use thiserror::Error;

/// A font that could not be loaded.
#[derive(Debug, Error)]
#[error("failed to parse font: {0}")]
pub struct FontError(#[from] ttf_parser::FaceParsingError);

/// Metrics of one loaded face.
#[derive(Clone)]
struct FaceData {
    /// Raw font bytes (kept alive for ttf-parser's zero-copy API).
    bytes: Vec<u8>,
    units_per_em: f32,
}

/// Measures and wraps text runs.
#[derive(Clone, Default)]
pub struct FontManager {
    regular: Option<FaceData>,
    bold: Option<FaceData>,
}

impl FontManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TTF/OTF face used for regular (or, with `bold`, bold) runs.
    pub fn load_font(&mut self, bytes: Vec<u8>, bold: bool) -> Result<(), FontError> {
        let face = ttf_parser::Face::parse(&bytes, 0)?;
        let data = FaceData {
            units_per_em: face.units_per_em() as f32,
            bytes,
        };
        if bold {
            self.bold = Some(data);
        } else {
            self.regular = Some(data);
        }
        Ok(())
    }

    pub fn has_real_fonts(&self) -> bool {
        self.regular.is_some()
    }

    /// Width of `text` in CSS pixels.
    pub fn measure_text_width(&self, text: &str, font_size: f32, bold: bool) -> f32 {
        let face = if bold {
            self.bold.as_ref().or(self.regular.as_ref())
        } else {
            self.regular.as_ref()
        };
        let heuristic = || {
            // Average advance of a proportional sans face; bold runs ~10% wider.
            let avg = if bold { 0.55 } else { 0.5 };
            text.chars().count() as f32 * font_size * avg
        };
        let Some(data) = face else {
            return heuristic();
        };
        let Ok(parsed) = ttf_parser::Face::parse(&data.bytes, 0) else {
            return heuristic();
        };
        let scale = font_size / data.units_per_em;
        text.chars()
            .map(|ch| {
                parsed
                    .glyph_index(ch)
                    .and_then(|gid| parsed.glyph_hor_advance(gid))
                    .map(|adv| adv as f32 * scale)
                    .unwrap_or(font_size * 0.5)
            })
            .sum()
    }

    pub fn line_height_px(&self, font_size: f32, line_height_factor: f32) -> f32 {
        font_size * line_height_factor
    }
}

/// Greedy word wrap to `max_width` CSS pixels. Hard newlines are kept.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    bold: bool,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    if max_width <= 0.0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
                continue;
            }
            let candidate = format!("{current} {word}");
            if fonts.measure_text_width(&candidate, font_size, bold) > max_width {
                lines.push(std::mem::replace(&mut current, word.to_string()));
            } else {
                current = candidate;
            }
        }
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_text_width() {
        let fonts = FontManager::default();
        // 5 chars × 16 × 0.5 = 40
        assert!((fonts.measure_text_width("Hello", 16.0, false) - 40.0).abs() < 0.1);
        assert!((fonts.measure_text_width("Hello", 16.0, true) - 44.0).abs() < 0.1);
    }

    #[test]
    fn word_wrap_basic() {
        let fonts = FontManager::default();
        let lines = wrap_text("Hello world foo bar", 16.0, false, 60.0, &fonts);
        assert_eq!(lines, vec!["Hello", "world", "foo bar"]);
    }

    #[test]
    fn hard_newlines_are_kept() {
        let fonts = FontManager::default();
        let lines = wrap_text("a\nb", 16.0, false, 500.0, &fonts);
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn garbage_font_is_rejected() {
        let mut fonts = FontManager::new();
        let err = fonts.load_font(vec![0, 1, 2, 3], false).unwrap_err();
        assert!(err.to_string().starts_with("failed to parse font"));
        assert!(!fonts.has_real_fonts());
    }
}
