//! Text metrics for cloud terms.
//!
//! The layout engine never rasterizes glyphs; it only needs the box a label
//! occupies at a given font size. Advances are in em units for a semibold
//! proportional sans-serif face, which is what the cloud is rendered with.

/// Horizontal metrics of one glyph.
#[derive(Debug, Clone, Copy)]
pub struct GlyphMetrics {
    /// Unicode codepoint
    pub codepoint: char,
    /// Horizontal advance (em units)
    pub advance: f32,
}

/// Glyph advance table plus vertical metrics.
#[derive(Debug, Clone)]
pub struct TextMetrics {
    /// Glyph table (printable ASCII)
    pub glyphs: Vec<GlyphMetrics>,
    /// Advance used for characters outside the table (em units)
    pub fallback_advance: f32,
    /// Box height as a multiple of the font size
    pub line_height: f32,
}

/// Width and height of a measured label, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextSize {
    pub width: f32,
    pub height: f32,
}

impl TextMetrics {
    /// Approximate metrics of a semibold system sans-serif face.
    pub fn semibold_sans() -> Self {
        let mut glyphs = Vec::with_capacity(95);
        for i in 32u8..=126 {
            let ch = i as char;
            glyphs.push(GlyphMetrics {
                codepoint: ch,
                advance: sans_advance(ch),
            });
        }
        Self {
            glyphs,
            fallback_advance: 0.6,
            line_height: 1.1,
        }
    }

    /// Look up a glyph by character.
    pub fn glyph(&self, ch: char) -> Option<&GlyphMetrics> {
        // Table is indexed from ' ' (32) upward.
        let idx = (ch as u32).checked_sub(32)? as usize;
        self.glyphs.get(idx).filter(|g| g.codepoint == ch)
    }

    /// Size of `text` set at `font_size` pixels.
    pub fn measure(&self, text: &str, font_size: f32) -> TextSize {
        let em: f32 = text
            .chars()
            .map(|ch| self.glyph(ch).map_or(self.fallback_advance, |g| g.advance))
            .sum();
        TextSize {
            width: em * font_size,
            height: self.line_height * font_size,
        }
    }
}

impl Default for TextMetrics {
    fn default() -> Self {
        Self::semibold_sans()
    }
}

/// Label shown for a term: first letter capitalized.
pub fn display_label(term: &str) -> String {
    let mut chars = term.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn sans_advance(ch: char) -> f32 {
    match ch {
        ' ' | '\'' | '!' | '|' | '.' | ',' | ':' | ';' => 0.28,
        'i' | 'j' | 'l' | 'I' => 0.28,
        'f' | 't' | 'r' | '-' | '(' | ')' => 0.36,
        'm' | 'w' => 0.86,
        'M' | 'W' => 0.9,
        'a'..='z' => 0.58,
        'A'..='Z' => 0.68,
        '0'..='9' => 0.58,
        _ => 0.6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyph_lookup() {
        let metrics = TextMetrics::semibold_sans();
        assert_eq!(metrics.glyph('a').map(|g| g.codepoint), Some('a'));
        assert!(metrics.glyph('\n').is_none());
        assert!(metrics.glyph('é').is_none());
    }

    #[test]
    fn measure_scales_with_font_size() {
        let metrics = TextMetrics::default();
        let small = metrics.measure("Newton", 16.0);
        let large = metrics.measure("Newton", 32.0);
        assert!((large.width - small.width * 2.0).abs() < 1e-3);
        assert!((large.height - 32.0 * 1.1).abs() < 1e-3);
    }

    #[test]
    fn wide_glyphs_measure_wider() {
        let metrics = TextMetrics::default();
        assert!(metrics.measure("mmm", 20.0).width > metrics.measure("iii", 20.0).width);
    }

    #[test]
    fn label_capitalized() {
        assert_eq!(display_label("crypto"), "Crypto");
        assert_eq!(display_label(""), "");
    }
}
