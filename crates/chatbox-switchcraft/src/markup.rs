//! The `&`-code colour mini-language used in chat replies.
//!
//! `&` followed by one code character switches colour (`0`-`9`, `a`-`f`) or
//! style (`k`-`o`); `&r` resets. Anything else after `&` is literal text.

use std::fmt::{self, Write};

/// The sixteen chat colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Black,
    DarkBlue,
    DarkGreen,
    DarkAqua,
    DarkRed,
    DarkPurple,
    Gold,
    Gray,
    DarkGray,
    Blue,
    Green,
    Aqua,
    Red,
    LightPurple,
    Yellow,
    White,
}

impl Color {
    const ALL: [Color; 16] = [
        Color::Black,
        Color::DarkBlue,
        Color::DarkGreen,
        Color::DarkAqua,
        Color::DarkRed,
        Color::DarkPurple,
        Color::Gold,
        Color::Gray,
        Color::DarkGray,
        Color::Blue,
        Color::Green,
        Color::Aqua,
        Color::Red,
        Color::LightPurple,
        Color::Yellow,
        Color::White,
    ];

    /// The code character after `&`.
    pub fn code(self) -> char {
        let index = Self::ALL.iter().position(|c| *c == self).unwrap_or(15);
        char::from_digit(index as u32, 16).unwrap_or('f')
    }

    /// Parses a code character.
    pub fn from_code(code: char) -> Option<Self> {
        code.to_digit(16).map(|i| Self::ALL[i as usize])
    }

    /// Terminal colour as `(r, g, b)`.
    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            Self::Black => (0, 0, 0),
            Self::DarkBlue => (0, 0, 170),
            Self::DarkGreen => (0, 170, 0),
            Self::DarkAqua => (0, 170, 170),
            Self::DarkRed => (170, 0, 0),
            Self::DarkPurple => (170, 0, 170),
            Self::Gold => (255, 170, 0),
            Self::Gray => (170, 170, 170),
            Self::DarkGray => (85, 85, 85),
            Self::Blue => (85, 85, 255),
            Self::Green => (85, 255, 85),
            Self::Aqua => (85, 255, 255),
            Self::Red => (255, 85, 85),
            Self::LightPurple => (255, 85, 255),
            Self::Yellow => (255, 255, 85),
            Self::White => (255, 255, 255),
        }
    }
}

/// Text styles. `Reset` also resets colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Style {
    Obfuscated,
    Bold,
    Strikethrough,
    Underline,
    Italic,
    Reset,
}

impl Style {
    pub fn code(self) -> char {
        match self {
            Self::Obfuscated => 'k',
            Self::Bold => 'l',
            Self::Strikethrough => 'm',
            Self::Underline => 'n',
            Self::Italic => 'o',
            Self::Reset => 'r',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'k' => Self::Obfuscated,
            'l' => Self::Bold,
            'm' => Self::Strikethrough,
            'n' => Self::Underline,
            'o' => Self::Italic,
            'r' => Self::Reset,
            _ => return None,
        })
    }

    fn ansi(self) -> &'static str {
        match self {
            Self::Obfuscated => "\x1b[5m",
            Self::Bold => "\x1b[1m",
            Self::Strikethrough => "\x1b[9m",
            Self::Underline => "\x1b[4m",
            Self::Italic => "\x1b[3m",
            Self::Reset => "\x1b[0m",
        }
    }
}

/// Builder for a marked-up reply.
///
/// ```rust,ignore
/// let text = Markup::new()
///     .color(Color::Green).text("alice ")
///     .color(Color::Gray).text("last seen 5s ago")
///     .finish();
/// assert_eq!(text, "&aalice &7last seen 5s ago");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Markup {
    buf: String,
}

impl Markup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches colour.
    pub fn color(mut self, color: Color) -> Self {
        self.buf.push('&');
        self.buf.push(color.code());
        self
    }

    /// Switches style.
    pub fn style(mut self, style: Style) -> Self {
        self.buf.push('&');
        self.buf.push(style.code());
        self
    }

    /// Appends plain text.
    pub fn text(mut self, text: impl fmt::Display) -> Self {
        let _ = write!(self.buf, "{text}");
        self
    }

    /// Appends a newline.
    pub fn line(mut self) -> Self {
        self.buf.push('\n');
        self
    }

    /// Appends already marked-up text.
    pub fn raw(mut self, markup: &str) -> Self {
        self.buf.push_str(markup);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.buf)
    }
}

enum Token<'a> {
    Text(&'a str),
    Color(Color),
    Style(Style),
}

/// Splits marked-up text into runs of text and codes.
fn tokens(text: &str) -> impl Iterator<Item = Token<'_>> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let mut search_from = 0;
        loop {
            let Some(offset) = rest[search_from..].find('&') else {
                let run = rest;
                rest = "";
                return Some(Token::Text(run));
            };
            let at = search_from + offset;
            let code = rest[at + 1..].chars().next();
            let token = code.and_then(|c| {
                Color::from_code(c)
                    .map(Token::Color)
                    .or_else(|| Style::from_code(c).map(Token::Style))
            });
            match token {
                Some(token) if at == 0 => {
                    rest = &rest[2..];
                    return Some(token);
                }
                Some(_) => {
                    let run = &rest[..at];
                    rest = &rest[at..];
                    return Some(Token::Text(run));
                }
                None => search_from = at + 1,
            }
        }
    })
}

/// Removes every formatting code.
pub fn strip_codes(text: &str) -> String {
    tokens(text)
        .filter_map(|token| match token {
            Token::Text(run) => Some(run),
            _ => None,
        })
        .collect()
}

/// Renders marked-up text with ANSI escapes for console previews.
pub fn to_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for token in tokens(text) {
        match token {
            Token::Text(run) => out.push_str(run),
            Token::Color(color) => {
                let (r, g, b) = color.rgb();
                let _ = write!(out, "\x1b[38;2;{r};{g};{b}m");
            }
            Token::Style(style) => out.push_str(style.ansi()),
        }
    }
    out.push_str(Style::Reset.ansi());
    out
}
