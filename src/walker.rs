//! The highlight walk: reading order, chunk slicing and the page overlay.

use anyhow::Result;
use image::{Rgba, RgbaImage, imageops};
use std::ops::Range;
use tracing::debug;

use crate::document::{PageSource, Token};
use crate::style::HighlightStyle;

/// Magnification used for both the page raster and the overlay rectangles.
pub const ZOOM: f32 = 2.0;

const CLEAR: Rgba<u8> = Rgba([255, 255, 255, 0]);

#[derive(Debug, Clone)]
pub struct Highlight {
    pub image: RgbaImage,
    pub phrase: String,
    pub chunk: Vec<Token>,
    /// Words on the whole page, used by the caller to decide when to wrap.
    pub token_count: usize,
}

/// Sorts top-to-bottom, then left-to-right, keyed on (bottom, left).
pub fn sort_reading_order(tokens: &mut [Token]) {
    tokens.sort_by(|a, b| {
        a.bottom
            .total_cmp(&b.bottom)
            .then_with(|| a.left.total_cmp(&b.left))
    });
}

pub fn chunk_bounds(len: usize, offset: usize, chunk_size: usize) -> Range<usize> {
    let start = offset.min(len);
    let end = offset.saturating_add(chunk_size).min(len);
    start..end
}

pub fn join_phrase(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|token| token.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Transparent layer with one filled rectangle per token. Corners are scaled
/// by `zoom` and truncated to pixels; both edges are inclusive.
pub fn paint_overlay(
    width: u32,
    height: u32,
    tokens: &[Token],
    style: &HighlightStyle,
    zoom: f32,
) -> RgbaImage {
    let mut overlay = RgbaImage::from_pixel(width, height, CLEAR);
    if width == 0 || height == 0 {
        return overlay;
    }
    let fill = style.fill();
    for token in tokens {
        let x0 = to_pixel(token.left * zoom, width);
        let y0 = to_pixel(token.top * zoom, height);
        let x1 = to_pixel(token.right * zoom, width);
        let y1 = to_pixel(token.bottom * zoom, height);
        for y in y0.min(y1)..=y0.max(y1) {
            for x in x0.min(x1)..=x0.max(x1) {
                overlay.put_pixel(x, y, fill);
            }
        }
    }
    overlay
}

fn to_pixel(value: f32, limit: u32) -> u32 {
    (value.max(0.0) as u32).min(limit - 1)
}

/// Alpha-composites `overlay` onto `base` in place.
pub fn composite(base: &mut RgbaImage, overlay: &RgbaImage) {
    imageops::overlay(base, overlay, 0, 0);
}

/// Highlights the chunk starting at `offset` on `page`.
///
/// Returns `Ok(None)` when the page has no extractable words. Extraction and
/// rasterization errors are returned as-is.
pub fn highlight<S: PageSource + ?Sized>(
    source: &S,
    page: usize,
    offset: usize,
    chunk_size: usize,
    style: &HighlightStyle,
) -> Result<Option<Highlight>> {
    let mut tokens = source.words(page)?;
    if tokens.is_empty() {
        return Ok(None);
    }
    sort_reading_order(&mut tokens);

    let range = chunk_bounds(tokens.len(), offset, chunk_size);
    debug!(
        "page {} chunk {}..{} of {}",
        page + 1,
        range.start,
        range.end,
        tokens.len()
    );
    let chunk = tokens[range].to_vec();
    let phrase = join_phrase(&chunk);

    let mut image = source.rasterize(page, ZOOM)?;
    let overlay = paint_overlay(image.width(), image.height(), &chunk, style, ZOOM);
    composite(&mut image, &overlay);

    Ok(Some(Highlight {
        image,
        phrase,
        chunk,
        token_count: tokens.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::HighlightColor;
    use crate::test_util::{MemoryDocument, line_of};

    fn style() -> HighlightStyle {
        HighlightStyle {
            color: HighlightColor::new(255, 241, 118),
            alpha: 40,
        }
    }

    #[test]
    fn tokens_sort_by_bottom_then_left() {
        let mut tokens = vec![
            Token::new(50.0, 30.0, 70.0, 40.0, "second-line-right"),
            Token::new(10.0, 30.0, 30.0, 40.0, "second-line-left"),
            Token::new(80.0, 0.0, 90.0, 12.0, "first-line"),
        ];
        sort_reading_order(&mut tokens);
        let order: Vec<_> = tokens.iter().map(|token| token.text.as_str()).collect();
        assert_eq!(
            order,
            vec!["first-line", "second-line-left", "second-line-right"]
        );
    }

    #[test]
    fn reading_order_is_stable_for_equal_keys() {
        let mut tokens = vec![
            Token::new(10.0, 0.0, 20.0, 10.0, "a"),
            Token::new(10.0, 2.0, 20.0, 10.0, "b"),
            Token::new(5.0, 0.0, 8.0, 10.0, "c"),
        ];
        sort_reading_order(&mut tokens);
        let once = tokens.clone();
        sort_reading_order(&mut tokens);
        assert_eq!(tokens, once);
        let order: Vec<_> = tokens.iter().map(|token| token.text.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn chunk_bounds_clamp_to_len() {
        assert_eq!(chunk_bounds(5, 0, 2), 0..2);
        assert_eq!(chunk_bounds(5, 4, 2), 4..5);
        assert_eq!(chunk_bounds(5, 9, 2), 5..5);
        assert_eq!(chunk_bounds(5, usize::MAX, 3), 5..5);
    }

    #[test]
    fn phrase_is_space_joined_sorted_slice() {
        let mut words = line_of(&["The", "quick", "brown", "fox", "jumps"], 50.0);
        words.reverse();
        let doc = MemoryDocument::new(vec![words]);

        let first = highlight(&doc, 0, 0, 2, &style()).unwrap().unwrap();
        assert_eq!(first.phrase, "The quick");
        assert_eq!(first.token_count, 5);

        let tail = highlight(&doc, 0, 4, 2, &style()).unwrap().unwrap();
        assert_eq!(tail.phrase, "jumps");
        assert_eq!(tail.chunk.len(), 1);
    }

    #[test]
    fn empty_page_yields_none() {
        let doc = MemoryDocument::new(vec![Vec::new()]);
        assert!(highlight(&doc, 0, 0, 4, &style()).unwrap().is_none());
    }

    #[test]
    fn extraction_errors_propagate() {
        let doc = MemoryDocument::new(vec![Vec::new()]);
        assert!(highlight(&doc, 3, 0, 4, &style()).is_err());
    }

    #[test]
    fn overlay_fills_scaled_boxes_with_style_color() {
        let tokens = vec![Token::new(10.0, 10.0, 20.0, 15.0, "word")];
        let overlay = paint_overlay(100, 100, &tokens, &style(), ZOOM);
        assert_eq!(*overlay.get_pixel(20, 20), Rgba([255, 241, 118, 40]));
        assert_eq!(*overlay.get_pixel(40, 30), Rgba([255, 241, 118, 40]));
        assert_eq!(*overlay.get_pixel(41, 25), CLEAR);
        assert_eq!(*overlay.get_pixel(19, 25), CLEAR);
        assert_eq!(*overlay.get_pixel(30, 31), CLEAR);
    }

    #[test]
    fn overlay_clips_boxes_past_the_edge() {
        let tokens = vec![Token::new(40.0, 40.0, 80.0, 80.0, "edge")];
        let overlay = paint_overlay(100, 100, &tokens, &style(), ZOOM);
        assert_eq!(*overlay.get_pixel(99, 99), Rgba([255, 241, 118, 40]));
        assert_eq!(*overlay.get_pixel(79, 79), CLEAR);
    }

    #[test]
    fn composite_tints_only_highlighted_words() {
        let words = line_of(&["alpha", "beta", "gamma", "delta", "omega"], 50.0);
        let doc = MemoryDocument::new(vec![words.clone()]);
        let result = highlight(&doc, 0, 0, 4, &style()).unwrap().unwrap();

        let inside = result.image.get_pixel(
            (words[0].left * ZOOM) as u32 + 2,
            (words[0].top * ZOOM) as u32 + 2,
        );
        assert_eq!(inside[3], 255);
        assert!(inside[2] < 255);

        let fifth = result.image.get_pixel(
            (words[4].left * ZOOM) as u32 + 2,
            (words[4].top * ZOOM) as u32 + 2,
        );
        assert_eq!(*fifth, Rgba([255, 255, 255, 255]));
    }
}
