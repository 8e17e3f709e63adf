//! Turns raw extracted PDF text into a single line that a speech engine can
//! read without spelling out layout glyphs or stuttering on punctuation.

use once_cell::sync::Lazy;
use regex::Regex;

/// Bullet, box, arrow and dash glyphs that list markers are made of, plus
/// slashes and pipes. Always blanked to a space so the words around them
/// stay apart.
static GLYPHS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[•●○◦▪▫■□►▶◆◇★☆✓✔→←↑↓⇒⇐➔➜–—―/\\|]").expect("glyph pattern")
});

/// Everything that is not a word character, whitespace, pause punctuation,
/// an apostrophe, a quotation mark or an accented Italian vowel.
static OUTSIDE_ALLOWED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[^\w\s.,:;?!àèéìòùÀÈÉÌÒÙ'"]"#).expect("allow-list pattern")
});

/// Two or more pause marks, with any whitespace before and between them.
static PAUSE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[.,:;?!](?:\s*[.,:;?!])+").expect("pause run pattern"));

static SPACE_BEFORE_PAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+([.,:;?!])").expect("space before pause pattern"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// What happens to a character outside the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Replacement {
    /// Replace it with a space (`a*b` reads as `a b`).
    #[default]
    Space,
    /// Drop it (`a*b` reads as `ab`).
    Delete,
}

impl Replacement {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "space" => Some(Replacement::Space),
            "delete" | "drop" => Some(Replacement::Delete),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Replacement::Space => " ",
            Replacement::Delete => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleaningPolicy {
    pub replacement: Replacement,
    pub strip_glyphs: bool,
}

impl Default for CleaningPolicy {
    fn default() -> Self {
        Self {
            replacement: Replacement::Space,
            strip_glyphs: true,
        }
    }
}

impl CleaningPolicy {
    /// Allow-list only, symbols become spaces. Used with the basic voice.
    pub fn basic() -> Self {
        Self {
            replacement: Replacement::Space,
            strip_glyphs: false,
        }
    }

    /// Deny-list first, then the allow-list deleting what is left.
    /// Used with the neural voices.
    pub fn aggressive() -> Self {
        Self {
            replacement: Replacement::Delete,
            strip_glyphs: true,
        }
    }
}

/// Normalize `text` for speech synthesis.
///
/// Line breaks become spaces and list glyphs and unspeakable symbols are
/// removed. Underscores and hyphens separate words, runs of pause
/// punctuation shrink to a single period, and punctuation sticks to the
/// word before it. The result is a single trimmed line and may be empty.
pub fn normalize(text: &str, policy: &CleaningPolicy) -> String {
    let text = text.replace("\r\n", " ").replace(['\r', '\n'], " ");
    let text = fold_typographic_quotes(&text);

    let text = if policy.strip_glyphs {
        GLYPHS.replace_all(&text, " ").into_owned()
    } else {
        text
    };
    let text = OUTSIDE_ALLOWED
        .replace_all(&text, policy.replacement.as_str())
        .into_owned();
    let text = text.replace(['_', '-'], " ");
    let text = PAUSE_RUN.replace_all(&text, ". ");
    let text = SPACE_BEFORE_PAUSE.replace_all(&text, "$1");

    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Normalize and decide whether anything is left to say.
///
/// Returns `None` when the cleaned text has no letters or digits; callers
/// must not invoke a synthesizer in that case.
pub fn prepare_for_speech(text: &str, policy: &CleaningPolicy) -> Option<String> {
    let cleaned = normalize(text, policy);
    if cleaned.chars().any(char::is_alphanumeric) {
        Some(cleaned)
    } else {
        None
    }
}

fn fold_typographic_quotes(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '\u{2018}' | '\u{2019}' | '\u{02BC}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{00AB}' | '\u{00BB}' => '"',
            other => other,
        })
        .collect()
}
