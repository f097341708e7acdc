use crate::{Position, Span};
use std::{collections::VecDeque, iter::Peekable, ops::Range, str::Chars};
use unicode_width::UnicodeWidthChar;
use unicode_xid::UnicodeXID;

/// The tokens that can emerge from the lexer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Token {
    Error,
    Whitespace,
    NewLine,
    CommentSingle,
    CommentMulti,
    Number,
    Id,
    QuotedId,
    Str,

    // Symbols
    Colon,
    Comma,
    Dot,
    Semicolon,
    Question,
    Pipe,
    RoundOpen,
    RoundClose,
    SquareOpen,
    SquareClose,
    CurlyOpen,
    CurlyClose,
    RangeExclusive,

    // Operators
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,

    Assign,
    AddAssign,
    SubtractAssign,
    MultiplyAssign,
    DivideAssign,
    RemainderAssign,

    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,

    And,
    Or,
    Not,

    // Keywords
    As,
    Break,
    Continue,
    Else,
    False,
    Final,
    Foreach,
    Function,
    If,
    Import,
    In,
    Nil,
    Return,
    Returns,
    True,
    Type,
    Var,
    While,
}

impl Token {
    /// Returns true if the token should be counted as whitespace
    pub fn is_whitespace(&self) -> bool {
        use Token::*;
        matches!(self, Whitespace | CommentMulti | CommentSingle)
    }

    /// Returns true if the token should be counted as whitespace, including newlines
    pub fn is_whitespace_including_newline(&self) -> bool {
        self.is_whitespace() || *self == Token::NewLine
    }

    /// Returns true if the token is a binary operator that expects a right-hand side
    pub fn is_binary_op(&self) -> bool {
        use Token::*;
        matches!(
            self,
            Add | Subtract
                | Multiply
                | Divide
                | Remainder
                | Equal
                | NotEqual
                | Greater
                | GreaterOrEqual
                | Less
                | LessOrEqual
                | And
                | Or
                | RangeExclusive
        )
    }
}

const KEYWORDS: &[(&str, Token)] = &[
    ("as", Token::As),
    ("break", Token::Break),
    ("continue", Token::Continue),
    ("else", Token::Else),
    ("false", Token::False),
    ("final", Token::Final),
    ("foreach", Token::Foreach),
    ("function", Token::Function),
    ("if", Token::If),
    ("import", Token::Import),
    ("in", Token::In),
    ("nil", Token::Nil),
    ("return", Token::Return),
    ("returns", Token::Returns),
    ("true", Token::True),
    ("type", Token::Type),
    ("var", Token::Var),
    ("while", Token::While),
];

/// Returns true if the given string is a reserved word
pub fn is_keyword(id: &str) -> bool {
    KEYWORDS.iter().any(|(keyword, _)| *keyword == id)
}

// Separates the input source into Tokens
//
// TokenLexer is the internal implementation, SprigLexer provides the external interface.
#[derive(Clone)]
struct TokenLexer<'a> {
    // The input source
    source: &'a str,
    // The current position in the source
    current_byte: usize,
    // Used to provide the token's slice
    previous_byte: usize,
    // The span represented by the current token
    span: Span,
}

impl<'a> TokenLexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            previous_byte: 0,
            current_byte: 0,
            span: Span::default(),
        }
    }

    fn source_bytes(&self) -> Range<usize> {
        self.previous_byte..self.current_byte
    }

    fn current_position(&self) -> Position {
        self.span.end
    }

    // Advance along the current line by a number of ASCII bytes
    fn advance_line(&mut self, char_bytes: usize) {
        self.advance_line_utf8(char_bytes, char_bytes);
    }

    // Advance along the current line by a number of bytes, with a UTF-8 character count
    fn advance_line_utf8(&mut self, char_bytes: usize, char_count: usize) {
        let previous_end = self.span.end;
        self.advance_to_position(
            char_bytes,
            Position {
                line: previous_end.line,
                column: previous_end.column + char_count as u32,
            },
        );
    }

    fn advance_to_position(&mut self, char_bytes: usize, position: Position) {
        self.previous_byte = self.current_byte;
        self.current_byte += char_bytes;

        self.span = Span {
            start: self.span.end,
            end: position,
        };
    }

    fn consume_newline(&mut self, mut chars: Peekable<Chars>) -> Token {
        let mut consumed_bytes = 1;

        if chars.peek() == Some(&'\r') {
            consumed_bytes += 1;
            chars.next();
        }

        match chars.next() {
            Some('\n') => {}
            _ => return Token::Error,
        }

        self.advance_to_position(
            consumed_bytes,
            Position {
                line: self.current_position().line + 1,
                column: 0,
            },
        );

        Token::NewLine
    }

    fn consume_comment(&mut self, mut chars: Peekable<Chars>) -> Token {
        // The leading '/' has already been matched
        chars.next();

        match chars.next() {
            Some('/') => {
                let (comment_bytes, comment_width) =
                    consume_and_count_utf8(&mut chars, |c| !matches!(c, '\r' | '\n'));
                self.advance_line_utf8(comment_bytes + 2, comment_width + 2);
                Token::CommentSingle
            }
            Some('*') => {
                let mut char_bytes = 2;
                let mut position = self.current_position();
                position.column += 2;

                while let Some(c) = chars.next() {
                    char_bytes += c.len_utf8();
                    match c {
                        '*' if chars.peek() == Some(&'/') => {
                            chars.next();
                            char_bytes += 1;
                            position.column += 2;
                            self.advance_to_position(char_bytes, position);
                            return Token::CommentMulti;
                        }
                        '\n' => {
                            position.line += 1;
                            position.column = 0;
                        }
                        _ => position.column += c.width().unwrap_or(0) as u32,
                    }
                }

                self.advance_to_position(char_bytes, position);
                Token::Error
            }
            _ => Token::Error,
        }
    }

    fn consume_string(&mut self, mut chars: Peekable<Chars>) -> Token {
        // The opening quote has already been matched
        chars.next();

        let mut string_bytes = 1;
        let mut string_width = 1;

        while let Some(c) = chars.next() {
            string_bytes += c.len_utf8();
            string_width += c.width().unwrap_or(0);

            match c {
                '"' => {
                    self.advance_line_utf8(string_bytes, string_width);
                    return Token::Str;
                }
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        string_bytes += escaped.len_utf8();
                        string_width += escaped.width().unwrap_or(0);
                    }
                }
                // Strings can't span lines
                '\r' | '\n' => {
                    string_bytes -= 1;
                    break;
                }
                _ => {}
            }
        }

        self.advance_line_utf8(string_bytes, string_width);
        Token::Error
    }

    fn consume_number(&mut self, mut chars: Peekable<Chars>) -> Token {
        let has_leading_zero = chars.peek() == Some(&'0');
        let mut char_bytes = consume_and_count(&mut chars, is_digit);

        match chars.peek() {
            Some(&'x') if has_leading_zero && char_bytes == 1 => {
                chars.next();
                char_bytes += 1 + consume_and_count(&mut chars, is_hex_digit);
                self.advance_line(char_bytes);
                return Token::Number;
            }
            Some(&'.') => {
                // A fractional part needs a digit after the dot, otherwise this is a range or
                // a trailing dot that the parser will reject.
                let mut lookahead = chars.clone();
                lookahead.next();
                if matches!(lookahead.peek(), Some(c) if is_digit(*c)) {
                    chars.next();
                    char_bytes += 1 + consume_and_count(&mut chars, is_digit);
                }
            }
            _ => {}
        }

        if chars.peek() == Some(&'e') {
            let mut lookahead = chars.clone();
            lookahead.next();
            let sign = matches!(lookahead.peek(), Some(&'+' | &'-'));
            if sign {
                lookahead.next();
            }
            if matches!(lookahead.peek(), Some(c) if is_digit(*c)) {
                chars.next();
                char_bytes += 1;
                if sign {
                    chars.next();
                    char_bytes += 1;
                }
                char_bytes += consume_and_count(&mut chars, is_digit);
            }
        }

        self.advance_line(char_bytes);
        Token::Number
    }

    fn consume_id_or_keyword(&mut self, mut chars: Peekable<Chars>) -> Token {
        let Some(c) = chars.next() else {
            return Token::Error;
        };

        let (char_bytes, char_count) = consume_and_count_utf8(&mut chars, is_id_continue);
        let char_bytes = c.len_utf8() + char_bytes;
        let char_count = 1 + char_count;

        let id = &self.source[self.current_byte..self.current_byte + char_bytes];
        self.advance_line_utf8(char_bytes, char_count);

        KEYWORDS
            .iter()
            .find_map(|(keyword, token)| (*keyword == id).then_some(*token))
            .unwrap_or(Token::Id)
    }

    fn consume_quoted_id(&mut self, mut chars: Peekable<Chars>) -> Token {
        // The quote has already been matched
        chars.next();

        let mut char_bytes = 1;
        let mut char_count = 1;

        while let Some(c) = chars.peek().cloned() {
            if is_id_continue(c) {
                chars.next();
                char_bytes += c.len_utf8();
                char_count += c.width().unwrap_or(0);
            } else if c == '\\' {
                chars.next();
                char_bytes += 1;
                char_count += 1;
                match chars.next() {
                    Some(escaped) if !matches!(escaped, '\r' | '\n') => {
                        char_bytes += escaped.len_utf8();
                        char_count += escaped.width().unwrap_or(0);
                        if escaped == 'u' && chars.peek() == Some(&'{') {
                            let (escape_bytes, escape_count) =
                                consume_and_count_utf8(&mut chars, |c| c != '}');
                            char_bytes += escape_bytes;
                            char_count += escape_count;
                            if chars.next() != Some('}') {
                                self.advance_line_utf8(char_bytes, char_count);
                                return Token::Error;
                            }
                            char_bytes += 1;
                            char_count += 1;
                        }
                    }
                    _ => {
                        self.advance_line_utf8(char_bytes, char_count);
                        return Token::Error;
                    }
                }
            } else {
                break;
            }
        }

        self.advance_line_utf8(char_bytes, char_count);

        if char_bytes == 1 {
            Token::Error
        } else {
            Token::QuotedId
        }
    }

    fn consume_symbol(&mut self, remaining: &str) -> Option<Token> {
        use Token::*;

        macro_rules! check_symbol {
            ($token_str:expr, $token:ident) => {
                if remaining.starts_with($token_str) {
                    self.advance_line($token_str.len());
                    return Some($token);
                }
            };
        }

        check_symbol!("..<", RangeExclusive);

        check_symbol!("==", Equal);
        check_symbol!("!=", NotEqual);
        check_symbol!(">=", GreaterOrEqual);
        check_symbol!("<=", LessOrEqual);
        check_symbol!("&&", And);
        check_symbol!("||", Or);
        check_symbol!("+=", AddAssign);
        check_symbol!("-=", SubtractAssign);
        check_symbol!("*=", MultiplyAssign);
        check_symbol!("/=", DivideAssign);
        check_symbol!("%=", RemainderAssign);

        check_symbol!(">", Greater);
        check_symbol!("<", Less);
        check_symbol!("=", Assign);
        check_symbol!("!", Not);

        check_symbol!("+", Add);
        check_symbol!("-", Subtract);
        check_symbol!("*", Multiply);
        check_symbol!("/", Divide);
        check_symbol!("%", Remainder);

        check_symbol!(":", Colon);
        check_symbol!(",", Comma);
        check_symbol!(".", Dot);
        check_symbol!(";", Semicolon);
        check_symbol!("?", Question);
        check_symbol!("|", Pipe);
        check_symbol!("(", RoundOpen);
        check_symbol!(")", RoundClose);
        check_symbol!("[", SquareOpen);
        check_symbol!("]", SquareClose);
        check_symbol!("{", CurlyOpen);
        check_symbol!("}", CurlyClose);

        None
    }

    fn get_next_token(&mut self) -> Option<Token> {
        let remaining = self.source.get(self.current_byte..)?;
        let mut chars = remaining.chars().peekable();
        let next_char = *chars.peek()?;

        let result = match next_char {
            c if is_whitespace(c) => {
                let count = consume_and_count(&mut chars, is_whitespace);
                self.advance_line(count);
                Token::Whitespace
            }
            '\r' | '\n' => self.consume_newline(chars),
            '/' if matches!(remaining.as_bytes().get(1), Some(b'/' | b'*')) => {
                self.consume_comment(chars)
            }
            '"' => self.consume_string(chars),
            '\'' => self.consume_quoted_id(chars),
            '0'..='9' => self.consume_number(chars),
            c if is_id_start(c) || c == '_' => self.consume_id_or_keyword(chars),
            c => match self.consume_symbol(remaining) {
                Some(result) => result,
                None => {
                    self.advance_line_utf8(c.len_utf8(), c.width().unwrap_or(1));
                    Token::Error
                }
            },
        };

        Some(result)
    }
}

impl Iterator for TokenLexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.get_next_token()
    }
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn is_hex_digit(c: char) -> bool {
    c.is_ascii_hexdigit()
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t')
}

/// Returns true if the character matches the XID_Start Unicode property
pub fn is_id_start(c: char) -> bool {
    UnicodeXID::is_xid_start(c)
}

/// Returns true if the character matches the XID_Continue Unicode property
pub fn is_id_continue(c: char) -> bool {
    UnicodeXID::is_xid_continue(c)
}

fn consume_and_count(chars: &mut Peekable<Chars>, predicate: impl Fn(char) -> bool) -> usize {
    let mut char_bytes = 0;

    while let Some(c) = chars.peek() {
        if !predicate(*c) {
            break;
        }
        char_bytes += 1;
        chars.next();
    }

    char_bytes
}

fn consume_and_count_utf8(
    chars: &mut Peekable<Chars>,
    predicate: impl Fn(char) -> bool,
) -> (usize, usize) {
    let mut char_bytes = 0;
    let mut char_count = 0;

    while let Some(c) = chars.peek() {
        if !predicate(*c) {
            break;
        }
        char_bytes += c.len_utf8();
        char_count += c.width().unwrap_or(0);
        chars.next();
    }

    (char_bytes, char_count)
}

/// A [Token] along with additional metadata
#[derive(Clone, PartialEq, Debug)]
pub struct LexedToken {
    /// The token
    pub token: Token,
    /// The byte positions in the source representing the token
    pub source_bytes: Range<usize>,
    /// The token's span
    pub span: Span,
}

impl LexedToken {
    /// A helper for getting the token's starting line
    pub fn line(&self) -> u32 {
        self.span.start.line
    }

    /// A helper for getting the token's string slice from the source
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.source_bytes.clone()]
    }
}

impl Default for LexedToken {
    fn default() -> Self {
        Self {
            token: Token::Error,
            source_bytes: Default::default(),
            span: Default::default(),
        }
    }
}

/// The lexer used by the Sprig parser
///
/// Wraps a TokenLexer with unbounded lookahead, see peek().
#[derive(Clone)]
pub struct SprigLexer<'a> {
    lexer: TokenLexer<'a>,
    token_queue: VecDeque<LexedToken>,
}

impl<'a> SprigLexer<'a> {
    /// Initializes a lexer with the given input script
    pub fn new(source: &'a str) -> Self {
        Self {
            lexer: TokenLexer::new(source),
            token_queue: VecDeque::new(),
        }
    }

    /// Returns the input source
    pub fn source(&self) -> &'a str {
        self.lexer.source
    }

    /// Peeks the nth token that will appear in the output stream
    ///
    /// peek(0) returns the next token, peek(1) the token after that, and so forth.
    pub fn peek(&mut self, n: usize) -> Option<&LexedToken> {
        while self.token_queue.len() <= n {
            match self.next_token() {
                Some(next) => self.token_queue.push_back(next),
                None => break,
            }
        }

        self.token_queue.get(n)
    }

    fn next_token(&mut self) -> Option<LexedToken> {
        self.lexer.next().map(|token| LexedToken {
            token,
            source_bytes: self.lexer.source_bytes(),
            span: self.lexer.span,
        })
    }
}

impl Iterator for SprigLexer<'_> {
    type Item = LexedToken;

    fn next(&mut self) -> Option<Self::Item> {
        match self.token_queue.pop_front() {
            Some(next) => Some(next),
            None => self.next_token(),
        }
    }
}
