//! Prompt templates and the `{name}` placeholder syntax.
//!
//! A template is parsed exactly once, when it is loaded. Parsing splits the
//! text into literal runs and placeholders and records the set of
//! placeholder names, so missing parameters are detected before any
//! substitution happens.
//!
//! `{{` and `}}` stand for literal braces. Any other brace in a template is
//! a syntax error.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static RESIDUAL_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Prompts the pipelines and the diagnostic know about, with the
/// placeholders each one must declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKey {
    Short,
    Names,
    Intro,
    Text,
    Outro,
}

impl PromptKey {
    pub const ALL: [PromptKey; 5] = [
        PromptKey::Intro,
        PromptKey::Text,
        PromptKey::Outro,
        PromptKey::Names,
        PromptKey::Short,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKey::Short => "short_prompt",
            PromptKey::Names => "names_prompt",
            PromptKey::Intro => "intro_prompt",
            PromptKey::Text => "text_prompt",
            PromptKey::Outro => "outro_text",
        }
    }

    pub fn placeholders(&self) -> &'static [&'static str] {
        match self {
            PromptKey::Short => &["title", "time"],
            PromptKey::Names => &["title", "count", "language"],
            PromptKey::Intro => &["title", "language", "speakers"],
            PromptKey::Text => &["title", "section", "language", "speakers"],
            PromptKey::Outro => &["title", "language"],
        }
    }

    pub fn from_key(key: &str) -> Option<PromptKey> {
        PromptKey::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

impl fmt::Display for PromptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Syntax error found while parsing a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub offset: usize,
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte {}", self.message, self.offset)
    }
}

/// An immutable, parsed prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    key: String,
    source: String,
    segments: Vec<Segment>,
    placeholders: BTreeSet<String>,
}

impl Template {
    pub fn parse(key: impl Into<String>, source: impl Into<String>) -> Result<Self, SyntaxError> {
        let source = source.into();
        let segments = parse_segments(&source)?;
        let placeholders = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder(name) => Some(name.clone()),
                Segment::Literal(_) => None,
            })
            .collect();
        Ok(Self {
            key: key.into(),
            source,
            segments,
            placeholders,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Raw template text as written in the template file.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn placeholders(&self) -> &BTreeSet<String> {
        &self.placeholders
    }

    pub fn is_empty(&self) -> bool {
        self.source.trim().is_empty()
    }

    pub(crate) fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn parse_segments(source: &str) -> Result<Vec<Segment>, SyntaxError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = source.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                literal.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                literal.push('}');
            }
            '}' => {
                return Err(SyntaxError {
                    offset,
                    message: "unmatched '}' (write '}}' for a literal brace)".into(),
                });
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    name.push(n);
                }
                if !closed {
                    return Err(SyntaxError {
                        offset,
                        message: "unterminated placeholder".into(),
                    });
                }
                let valid = name.chars().next().is_some_and(is_ident_start)
                    && name.chars().all(is_ident_char);
                if !valid {
                    return Err(SyntaxError {
                        offset,
                        message: format!(
                            "'{{{name}}}' is not a placeholder (write '{{{{' for a literal brace)"
                        ),
                    });
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(name));
            }
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Names of every `{identifier}` sequence left in `text`.
///
/// Used on resolved prompts and generated scripts; neither is ever parsed
/// as a template.
pub fn residual_placeholders(text: &str) -> Vec<String> {
    RESIDUAL_PLACEHOLDER
        .captures_iter(text)
        .map(|cap| cap[1].to_string())
        .collect()
}
