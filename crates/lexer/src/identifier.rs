use crate::{is_id_continue, is_id_start, is_keyword};
use std::{borrow::Borrow, fmt, sync::Arc};

/// An identifier in canonical form
///
/// Sprig allows identifiers to be written in quoted form, e.g. `'if` or `'first\-name`, so that
/// reserved words and unusual characters can be used as names. The quote and escapes are lexical
/// details only; `'foo` and `foo` name the same thing.
///
/// Equality, ordering and hashing all use the canonical (unquoted, unescaped) text, so
/// `QuotedIdentifier` can be used directly as a map key. When displayed, the identifier is
/// re-quoted only when the canonical text couldn't be lexed as a plain identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QuotedIdentifier(Arc<str>);

impl QuotedIdentifier {
    /// Makes an identifier from its source spelling, which may be quoted
    ///
    /// Escapes in quoted identifiers are resolved, so `'a\-b` becomes `a-b`,
    /// and `'\u{61}` becomes `a`.
    pub fn new(spelling: impl AsRef<str>) -> Self {
        let spelling = spelling.as_ref();
        match spelling.strip_prefix('\'') {
            Some(quoted) => Self(unescape(quoted).into()),
            None => Self(spelling.into()),
        }
    }

    /// Makes an identifier that already has canonical form
    ///
    /// No unquoting or unescaping is performed.
    pub fn from_canonical(canonical: impl Into<Arc<str>>) -> Self {
        Self(canonical.into())
    }

    /// Returns the canonical text of the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier needs to be quoted to be lexed as a single identifier
    pub fn needs_quoting(&self) -> bool {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(c) if is_id_start(c) || c == '_' => {}
            _ => return true,
        }
        !chars.all(is_id_continue) || is_keyword(&self.0)
    }

    /// Returns the identifier as it would be written in source
    pub fn to_source(&self) -> String {
        if !self.needs_quoting() {
            return self.0.to_string();
        }

        let mut result = String::with_capacity(self.0.len() + 1);
        result.push('\'');
        for c in self.0.chars() {
            if !is_id_continue(c) {
                result.push('\\');
            }
            result.push(c);
        }
        result
    }
}

// Resolves escapes in the body of a quoted identifier
fn unescape(quoted: &str) -> String {
    let mut result = String::with_capacity(quoted.len());
    let mut chars = quoted.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }

        match chars.next() {
            Some('u') if chars.peek() == Some(&'{') => {
                chars.next();
                let mut hex = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    hex.push(c);
                }
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => result.push(decoded),
                    // Malformed escapes are kept verbatim, the lexer reports them
                    None => {
                        result.push_str("\\u{");
                        result.push_str(&hex);
                        result.push('}');
                    }
                }
            }
            Some(escaped) => result.push(escaped),
            None => result.push('\\'),
        }
    }

    result
}

impl fmt::Display for QuotedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_source())
    }
}

impl fmt::Debug for QuotedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl From<&str> for QuotedIdentifier {
    fn from(spelling: &str) -> Self {
        Self::new(spelling)
    }
}

impl From<String> for QuotedIdentifier {
    fn from(spelling: String) -> Self {
        Self::new(spelling)
    }
}

impl Borrow<str> for QuotedIdentifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for QuotedIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
