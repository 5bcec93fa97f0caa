//! Formatted chat text
//!
//! The server sends chat as strings carrying `§` style codes (a color digit or
//! a formatting letter after the marker). Lines are compared and matched in
//! their coded form, since the dialogue markers are only recognizable by their
//! exact coloring.

use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Marker that introduces a style code
pub const STYLE_MARKER: char = '§';

/// A run of text sharing one style
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TextSegment {
    pub text: String,
    pub color: Option<char>, // '0'..='9' | 'a'..='f'
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub obfuscated: bool,
}

impl TextSegment {
    fn same_style(&self, other: &TextSegment) -> bool {
        self.color == other.color
            && self.bold == other.bold
            && self.italic == other.italic
            && self.underline == other.underline
            && self.strikethrough == other.strikethrough
            && self.obfuscated == other.obfuscated
    }

    fn styled_like(&self) -> TextSegment {
        TextSegment {
            text: String::new(),
            ..self.clone()
        }
    }
}

/// An immutable line of `§`-coded text.
///
/// Equality is style-aware rather than byte-wise: two lines are equal when they
/// render the same text with the same styles, so redundant codes such as
/// `§7§7` or a trailing `§r` do not make otherwise identical lines differ.
#[derive(Clone, Debug)]
pub struct FormattedLine {
    coded: String,
    segments: Vec<TextSegment>,
}

impl FormattedLine {
    pub fn new(coded: impl Into<String>) -> Self {
        let coded = coded.into();
        let segments = parse_segments(&coded);
        Self { coded, segments }
    }

    /// The raw text, style codes included
    pub fn as_coded(&self) -> &str {
        &self.coded
    }

    /// Text with every style code removed
    pub fn plain(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    /// Search the coded form for `pattern`
    pub fn find(&self, pattern: &Regex) -> bool {
        pattern.is_match(&self.coded)
    }

    /// Coded text with `§` swapped for `&`, so formatting survives in logs
    pub fn debug_string(&self) -> String {
        self.coded.replace(STYLE_MARKER, "&")
    }
}

impl PartialEq for FormattedLine {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for FormattedLine {}

impl Hash for FormattedLine {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl fmt::Display for FormattedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.coded)
    }
}

impl From<&str> for FormattedLine {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FormattedLine {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Serialize for FormattedLine {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.coded)
    }
}

/// Split coded text into normalized segments.
///
/// Empty runs are dropped and adjacent runs with the same style are merged.
/// An unknown code or a marker at end of line is kept as literal text.
fn parse_segments(coded: &str) -> Vec<TextSegment> {
    let mut segments: Vec<TextSegment> = Vec::new();
    let mut current = TextSegment::default();
    let mut chars = coded.chars().peekable();

    while let Some(c) = chars.next() {
        if c != STYLE_MARKER {
            current.text.push(c);
            continue;
        }

        let Some(&code) = chars.peek() else {
            current.text.push(c);
            break;
        };

        let code = code.to_ascii_lowercase();
        let mut next = current.styled_like();
        match code {
            '0'..='9' | 'a'..='f' => {
                // Colors reset every formatting flag
                next = TextSegment {
                    color: Some(code),
                    ..TextSegment::default()
                };
            }
            'k' => next.obfuscated = true,
            'l' => next.bold = true,
            'm' => next.strikethrough = true,
            'n' => next.underline = true,
            'o' => next.italic = true,
            'r' => next = TextSegment::default(),
            _ => {
                current.text.push(c);
                continue;
            }
        }
        chars.next();
        push_segment(&mut segments, std::mem::replace(&mut current, next));
    }
    push_segment(&mut segments, current);

    segments
}

fn push_segment(segments: &mut Vec<TextSegment>, segment: TextSegment) {
    if segment.text.is_empty() {
        return;
    }
    if let Some(last) = segments.last_mut() {
        if last.same_style(&segment) {
            last.text.push_str(&segment.text);
            return;
        }
    }
    segments.push(segment);
}
