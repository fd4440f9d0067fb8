//! Byte ranges and pending text edits

/// Half-open byte range `[start, end)` into the scanned buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Replace the bytes in `[start, end)` with `text`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextReplacement {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl TextReplacement {
    pub fn new(start: usize, end: usize, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Change in buffer length once this replacement is applied
    pub fn delta(&self) -> isize {
        self.text.len() as isize - (self.end - self.start) as isize
    }
}

/// Splice sorted, non-overlapping replacements into `html`
pub(crate) fn apply_replacements(html: &str, replacements: &[TextReplacement]) -> String {
    let mut output = String::with_capacity(html.len());
    let mut copied = 0;
    for replacement in replacements {
        output.push_str(&html[copied..replacement.start]);
        output.push_str(&replacement.text);
        copied = replacement.end;
    }
    output.push_str(&html[copied..]);
    output
}

/// Position of `at` once `replacements` have been applied.
///
/// `inclusive` decides whether an edit starting exactly at `at` moves it:
/// a span's start stays in front of an insertion made at its own offset,
/// its end follows it.
pub(crate) fn shift_offset(at: usize, replacements: &[TextReplacement], inclusive: bool) -> usize {
    let delta: isize = replacements
        .iter()
        .take_while(|r| r.start < at || (inclusive && r.start == at))
        .map(TextReplacement::delta)
        .sum();
    at.saturating_add_signed(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_replacements() {
        let html = "<div id=a class=b>";
        let replacements = vec![
            TextReplacement::new(4, 4, " hidden"),
            TextReplacement::new(5, 9, "id=\"c\""),
            TextReplacement::new(10, 17, ""),
        ];
        assert_eq!(apply_replacements(html, &replacements), "<div hidden id=\"c\" >");
    }

    #[test]
    fn test_shift_offset() {
        let replacements = vec![TextReplacement::new(2, 4, "abcd"), TextReplacement::new(10, 10, "xyz")];
        assert_eq!(shift_offset(1, &replacements, false), 1);
        assert_eq!(shift_offset(5, &replacements, false), 7);
        assert_eq!(shift_offset(10, &replacements, false), 12);
        assert_eq!(shift_offset(10, &replacements, true), 15);
    }

    #[test]
    fn test_delta() {
        assert_eq!(TextReplacement::new(3, 8, "ab").delta(), -3);
        assert_eq!(Span::new(3, 8).len(), 5);
    }
}
