//! Document data model: pages, their text layer, and candidates.
//!
//! Three coordinate spaces meet in this crate:
//!
//! | Space | Unit | Where it appears |
//! |-------|------|------------------|
//! | point | 1/72 inch, top-left origin | [`BBox`], [`PageSize`], text search |
//! | pixel | render DPI | display page images, highlight drawing |
//! | canvas | fixed 800 × 600 | standardized images fed to image QA |
//!
//! Everything in this module lives in point space. Conversion to pixel space
//! happens only in [`crate::pipeline::highlight`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// PDF user space: 72 points per inch.
pub const POINTS_PER_INCH: f64 = 72.0;

/// Axis-aligned rectangle in point space, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Multiply all four coordinates by `factor`.
    pub fn scaled(&self, factor: f64) -> BBox {
        BBox {
            x0: self.x0 * factor,
            y0: self.y0 * factor,
            x1: self.x1 * factor,
            y1: self.y1 * factor,
        }
    }

    /// Clip the rectangle to the page area.
    pub fn clamp_to(&self, size: PageSize) -> BBox {
        BBox {
            x0: self.x0.clamp(0.0, size.width),
            y0: self.y0.clamp(0.0, size.height),
            x1: self.x1.clamp(0.0, size.width),
            y1: self.y1.clamp(0.0, size.height),
        }
    }

    pub fn within(&self, size: PageSize) -> bool {
        self.x0 >= 0.0
            && self.y0 >= 0.0
            && self.x1 <= size.width
            && self.y1 <= size.height
            && self.x0 <= self.x1
            && self.y0 <= self.y1
    }

    fn vertical_center(&self) -> f64 {
        (self.y0 + self.y1) / 2.0
    }

    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (self.x0, self.y0, self.x1, self.y1)
    }
}

/// Page dimensions in points; independent of any render resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// US Letter, handy for fixtures.
    pub fn letter() -> Self {
        Self::new(612.0, 792.0)
    }

    /// Pixel dimensions of this page when rendered at `dpi`.
    pub fn pixel_size(&self, dpi: u32) -> (u32, u32) {
        let factor = f64::from(dpi) / POINTS_PER_INCH;
        (
            (self.width * factor).round().max(1.0) as u32,
            (self.height * factor).round().max(1.0) as u32,
        )
    }

    pub fn as_tuple(&self) -> (f64, f64) {
        (self.width, self.height)
    }
}

/// One character of the text layer with its loose bounds.
///
/// Generated characters (line breaks, synthesized spaces) have no bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChar {
    pub ch: char,
    pub bbox: Option<BBox>,
}

/// The text layer of a page, character by character.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageText {
    chars: Vec<TextChar>,
    text: String,
}

impl PageText {
    pub fn from_chars(chars: Vec<TextChar>) -> Self {
        let text = chars.iter().map(|c| c.ch).collect();
        Self { chars, text }
    }

    /// Lay `text` out on a fixed grid: line `i` starts at `(x, y + i·line_height)`
    /// and every character is `char_width` wide. Used for plain-text pages and
    /// fixtures where no real glyph geometry exists.
    pub fn monospaced(text: &str, x: f64, y: f64, char_width: f64, line_height: f64) -> Self {
        let mut chars = Vec::with_capacity(text.len());
        for (line_no, line) in text.split('\n').enumerate() {
            if line_no > 0 {
                chars.push(TextChar { ch: '\n', bbox: None });
            }
            let top = y + line_no as f64 * line_height;
            for (col, ch) in line.chars().enumerate() {
                let left = x + col as f64 * char_width;
                chars.push(TextChar {
                    ch,
                    bbox: Some(BBox::new(left, top, left + char_width, top + line_height)),
                });
            }
        }
        Self::from_chars(chars)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn chars(&self) -> &[TextChar] {
        &self.chars
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Whitespace-delimited tokens.
    pub fn tokens(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }

    /// Find every occurrence of `needle` and return its bounds.
    ///
    /// Matching is exact and case-sensitive; any run of whitespace on either
    /// side compares equal to a single space, so an answer that came out of a
    /// re-joined token window still matches the page it was cut from. A match
    /// spanning several lines yields one rectangle per line, in reading order.
    pub fn search(&self, needle: &str) -> Vec<BBox> {
        self.matches(needle).into_iter().flatten().collect()
    }

    /// Like [`PageText::search`], but keeps each occurrence's rectangles
    /// apart. An occurrence whose characters carry no bounds is an empty
    /// entry.
    pub fn matches(&self, needle: &str) -> Vec<Vec<BBox>> {
        let pattern: Vec<char> = needle
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .collect();
        if pattern.is_empty() {
            return Vec::new();
        }

        let haystack = self.normalized();
        let mut found = Vec::new();
        let mut start = 0;
        while start + pattern.len() <= haystack.len() {
            let window = &haystack[start..start + pattern.len()];
            if window.iter().map(|(c, _)| *c).eq(pattern.iter().copied()) {
                let first = window[0].1;
                let last = window[window.len() - 1].1;
                found.push(self.line_rects(first, last));
                start += pattern.len();
            } else {
                start += 1;
            }
        }
        found
    }

    /// Characters with whitespace runs collapsed to one space, each paired
    /// with the index of the character it came from.
    fn normalized(&self) -> Vec<(char, usize)> {
        let mut out: Vec<(char, usize)> = Vec::with_capacity(self.chars.len());
        for (idx, c) in self.chars.iter().enumerate() {
            if c.ch.is_whitespace() {
                if matches!(out.last(), Some((prev, _)) if *prev != ' ') {
                    out.push((' ', idx));
                }
            } else {
                out.push((c.ch, idx));
            }
        }
        if matches!(out.last(), Some((' ', _))) {
            out.pop();
        }
        out
    }

    fn line_rects(&self, first: usize, last: usize) -> Vec<BBox> {
        let mut lines: Vec<BBox> = Vec::new();
        let boxes = self.chars[first..=last]
            .iter()
            .filter(|c| !c.ch.is_whitespace())
            .filter_map(|c| c.bbox);
        for bbox in boxes {
            match lines.last_mut() {
                Some(line) if (line.y0..=line.y1).contains(&bbox.vertical_center()) => {
                    *line = line.union(&bbox);
                }
                _ => lines.push(bbox),
            }
        }
        lines
    }
}

/// One page of a loaded document. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 0-based position in the document.
    pub index: usize,
    pub size: PageSize,
    pub text: PageText,
}

impl Page {
    pub fn new(index: usize, size: PageSize, text: PageText) -> Self {
        Self { index, size, text }
    }

    /// First rectangle of the first exact match, clipped to the page.
    ///
    /// `None` when the first match has no glyph bounds; later occurrences
    /// are not consulted.
    pub fn locate(&self, answer: &str) -> Option<BBox> {
        self.text
            .matches(answer)
            .into_iter()
            .next()?
            .into_iter()
            .next()
            .map(|b| b.clamp_to(self.size))
    }
}

/// Ordered pages of one request's document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub pages: Vec<Page>,
}

impl Document {
    pub fn new(pages: Vec<Page>) -> Self {
        Self { pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }
}

/// Which extraction strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Image,
    TextWindow,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Image => f.write_str("image"),
            Strategy::TextWindow => f.write_str("text-window"),
        }
    }
}

/// A scored span under evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub text: String,
    pub score: f64,
    pub strategy: Strategy,
    pub page_index: usize,
    pub bbox: Option<BBox>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_size_at_dpi() {
        assert_eq!(PageSize::letter().pixel_size(72), (612, 792));
        assert_eq!(PageSize::letter().pixel_size(144), (1224, 1584));
    }

    #[test]
    fn bbox_new_normalises_corners() {
        let b = BBox::new(10.0, 20.0, 5.0, 2.0);
        assert_eq!(b.as_tuple(), (5.0, 2.0, 10.0, 20.0));
    }

    #[test]
    fn search_single_line() {
        let text = PageText::monospaced("Title: Quarterly Report", 10.0, 20.0, 5.0, 12.0);
        let hits = text.search("Quarterly Report");
        assert_eq!(hits.len(), 1);
        // "Title: " is 7 chars → match starts at x = 10 + 7·5
        assert_eq!(hits[0], BBox::new(45.0, 20.0, 125.0, 32.0));
    }

    #[test]
    fn search_is_case_sensitive() {
        let text = PageText::monospaced("Quarterly Report", 0.0, 0.0, 5.0, 10.0);
        assert!(text.search("quarterly report").is_empty());
    }

    #[test]
    fn search_collapses_whitespace_and_splits_lines() {
        let text = PageText::monospaced("total revenue\nrose sharply", 0.0, 0.0, 5.0, 10.0);
        let hits = text.search("revenue   rose");
        assert_eq!(hits.len(), 2, "one rect per line: {hits:?}");
        assert_eq!(hits[0], BBox::new(30.0, 0.0, 65.0, 10.0));
        assert_eq!(hits[1], BBox::new(0.0, 10.0, 20.0, 20.0));
    }

    #[test]
    fn search_finds_every_occurrence() {
        let text = PageText::monospaced("ab ab ab", 0.0, 0.0, 1.0, 1.0);
        assert_eq!(text.search("ab").len(), 3);
        assert!(text.search("   ").is_empty());
        assert!(text.search("abc").is_empty());
    }

    #[test]
    fn locate_clamps_to_page() {
        let size = PageSize::new(50.0, 50.0);
        let page = Page::new(0, size, PageText::monospaced("overflowing", 40.0, 45.0, 5.0, 10.0));
        let bbox = page.locate("overflowing").expect("should locate");
        assert!(bbox.within(size), "{bbox:?}");
    }

    #[test]
    fn locate_uses_the_first_occurrence_only() {
        let glyph = |x: f64| Some(BBox::new(x, 0.0, x + 5.0, 10.0));
        let chars = vec![
            TextChar { ch: 'o', bbox: None },
            TextChar { ch: 'k', bbox: None },
            TextChar { ch: ' ', bbox: None },
            TextChar { ch: 'o', bbox: glyph(20.0) },
            TextChar { ch: 'k', bbox: glyph(25.0) },
        ];
        let page = Page::new(0, PageSize::letter(), PageText::from_chars(chars));

        let found = page.text.matches("ok");
        assert_eq!(found.len(), 2);
        assert!(found[0].is_empty());
        assert_eq!(found[1], vec![BBox::new(20.0, 0.0, 30.0, 10.0)]);
        assert_eq!(page.locate("ok"), None);
    }

    #[test]
    fn tokens_split_on_whitespace() {
        let text = PageText::monospaced("a  b\nc", 0.0, 0.0, 1.0, 1.0);
        assert_eq!(text.tokens(), vec!["a", "b", "c"]);
    }
}
