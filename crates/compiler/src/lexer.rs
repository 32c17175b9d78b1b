//! Tokenizer for Prime source text (spec.md §4.1).
//!
//! Produces identifiers (including slash-prefixed paths), integer and
//! floating literals, string literals, punctuation, operators, and
//! strips comments. Positions are 0-indexed, matching the teacher's
//! `SourceLocation`/`Token` convention so downstream diagnostics read
//! the same way.

use prime_core::StringSuffix;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident,
    /// Parsed integer value, declared width (32/64), and signedness.
    Int { value: i64, width: u32, signed: bool },
    /// Raw decimal/exponent text, preserved verbatim, and declared width.
    Float { text: String, width: u32 },
    Bool(bool),
    Str { value: String, suffix: Option<StringSuffix> },
    /// Punctuation: one of `[ ] ( ) { } < > , ; . :`
    Punct,
    /// Operators: `+ - * / = == != < <= > >= && || !`
    Operator,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn is_punct(&self, p: &str) -> bool {
        matches!(self.kind, TokenKind::Punct) && self.text == p
    }

    pub fn is_operator(&self, op: &str) -> bool {
        matches!(self.kind, TokenKind::Operator) && self.text == op
    }

    pub fn is_ident(&self, name: &str) -> bool {
        matches!(self.kind, TokenKind::Ident) && self.text == name
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

const PUNCTUATION: &[char] = &['[', ']', '(', ')', '{', '}', '<', '>', ',', ';', '.', ':'];

impl Lexer {
    fn new(src: &str) -> Self {
        Lexer { chars: src.chars().collect(), pos: 0, line: 0, column: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), String> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let (start_line, start_col) = (self.line, self.column);
                    self.advance();
                    self.advance();
                    let mut closed = false;
                    while let Some(c) = self.peek() {
                        if c == '*' && self.peek_at(1) == Some('/') {
                            self.advance();
                            self.advance();
                            closed = true;
                            break;
                        }
                        self.advance();
                    }
                    if !closed {
                        return Err(format!(
                            "unterminated block comment starting at {start_line}:{start_col}"
                        ));
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn lex_number(&mut self) -> Result<Token, String> {
        let (line, column) = (self.line, self.column);
        let start = self.pos;
        let mut is_float = false;
        let mut is_hex = false;

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            is_hex = true;
            self.advance();
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit() || c == ',') {
                self.advance();
            }
        } else {
            while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == ',') {
                self.advance();
            }
            if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
                is_float = true;
                self.advance();
                while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == ',') {
                    self.advance();
                }
            }
            if matches!(self.peek(), Some('e') | Some('E')) {
                let save = self.pos;
                let mut lookahead = self.pos + 1;
                if matches!(self.chars.get(lookahead), Some('+') | Some('-')) {
                    lookahead += 1;
                }
                if matches!(self.chars.get(lookahead), Some(c) if c.is_ascii_digit()) {
                    is_float = true;
                    self.advance();
                    if matches!(self.peek(), Some('+') | Some('-')) {
                        self.advance();
                    }
                    while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                        self.advance();
                    }
                } else {
                    self.pos = save;
                }
            }
        }

        let digits_end = self.pos;
        let raw_digits: String = self.chars[start..digits_end].iter().collect();

        if is_float {
            // Optional f|f32|f64 suffix.
            let mut width = 64;
            if self.peek() == Some('f') {
                let suffix_start = self.pos;
                self.advance();
                if self.src_matches("32") {
                    self.advance();
                    self.advance();
                    width = 32;
                } else if self.src_matches("64") {
                    self.advance();
                    self.advance();
                    width = 64;
                } else {
                    width = 32;
                }
                let _ = suffix_start;
            }
            let clean: String = raw_digits.chars().filter(|c| *c != ',').collect();
            return Ok(Token { kind: TokenKind::Float { text: clean, width }, text: raw_digits, line, column });
        }

        // Integer. Strip comma separators before conversion (spec.md §4.1).
        let clean: String = raw_digits.chars().filter(|c| *c != ',').collect();
        let value: i64 = if is_hex {
            i64::from_str_radix(clean.trim_start_matches("0x").trim_start_matches("0X"), 16)
                .map_err(|e| format!("invalid hex literal '{clean}': {e}"))?
        } else {
            clean.parse().map_err(|e| format!("invalid integer literal '{clean}': {e}"))?
        };

        let mut width = 32;
        let mut signed = true;
        if self.src_matches("i32") {
            self.advance();
            self.advance();
            self.advance();
            width = 32;
            signed = true;
        } else if self.src_matches("i64") {
            self.advance();
            self.advance();
            self.advance();
            width = 64;
            signed = true;
        } else if self.src_matches("u64") {
            self.advance();
            self.advance();
            self.advance();
            width = 64;
            signed = false;
        }

        Ok(Token { kind: TokenKind::Int { value, width, signed }, text: raw_digits, line, column })
    }

    fn src_matches(&self, lit: &str) -> bool {
        lit.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn lex_string(&mut self) -> Result<Token, String> {
        let (line, column) = (self.line, self.column);
        let quote = self.advance().unwrap();
        let mut value = String::new();
        let interpret_escapes = quote == '"';
        loop {
            match self.advance() {
                None => return Err(format!("unterminated string literal starting at {line}:{column}")),
                Some(c) if c == quote => break,
                Some('\\') if interpret_escapes => {
                    let escaped = self
                        .advance()
                        .ok_or_else(|| format!("unterminated string literal starting at {line}:{column}"))?;
                    let decoded = match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '"' => '"',
                        '\'' => '\'',
                        '\\' => '\\',
                        '0' => '\0',
                        other => {
                            return Err(format!("unknown escape sequence '\\{other}' in string literal"));
                        }
                    };
                    value.push(decoded);
                }
                Some(c) => value.push(c),
            }
        }

        // Optional suffix token: utf8 | ascii | raw_utf8 (only for double-quoted strings;
        // single-quoted strings preserve backslashes literally and carry no suffix here —
        // `implicit-utf8` still applies to them in the text-transform pass).
        let mut suffix = None;
        if interpret_escapes {
            if self.src_matches("utf8") {
                for _ in 0.."utf8".len() {
                    self.advance();
                }
                suffix = Some(StringSuffix::Utf8);
            } else if self.src_matches("ascii") {
                for _ in 0.."ascii".len() {
                    self.advance();
                }
                suffix = Some(StringSuffix::Ascii);
            } else if self.src_matches("raw_utf8") {
                for _ in 0.."raw_utf8".len() {
                    self.advance();
                }
                suffix = Some(StringSuffix::RawUtf8);
            }
        }

        Ok(Token { kind: TokenKind::Str { value, suffix }, text: String::new(), line, column })
    }

    fn lex_ident(&mut self) -> Token {
        let (line, column) = (self.line, self.column);
        let start = self.pos;
        if self.peek() == Some('/') {
            self.advance();
        }
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_' || c == '-' || c == '/') {
            self.advance();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let kind = match text.as_str() {
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            _ => TokenKind::Ident,
        };
        Token { kind, text, line, column }
    }

    fn lex_operator(&mut self) -> Option<Token> {
        let (line, column) = (self.line, self.column);
        let two: String = [self.peek()?, self.peek_at(1).unwrap_or(' ')].iter().collect();
        for op in ["==", "!=", "<=", ">=", "&&", "||"] {
            if two == op {
                self.advance();
                self.advance();
                return Some(Token { kind: TokenKind::Operator, text: op.to_string(), line, column });
            }
        }
        let c = self.peek()?;
        if "+-*/=<>!".contains(c) {
            self.advance();
            return Some(Token { kind: TokenKind::Operator, text: c.to_string(), line, column });
        }
        None
    }

    fn tokenize(&mut self) -> Result<Vec<Token>, String> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            let (line, column) = (self.line, self.column);
            match self.peek() {
                None => {
                    tokens.push(Token { kind: TokenKind::Eof, text: String::new(), line, column });
                    break;
                }
                Some(c) if c.is_ascii_digit() => tokens.push(self.lex_number()?),
                Some('"') | Some('\'') => tokens.push(self.lex_string()?),
                Some(c) if c.is_alphabetic() || c == '_' || c == '/' => tokens.push(self.lex_ident()),
                Some(c) if PUNCTUATION.contains(&c) => {
                    self.advance();
                    tokens.push(Token { kind: TokenKind::Punct, text: c.to_string(), line, column });
                }
                Some(_) => {
                    let op = self
                        .lex_operator()
                        .ok_or_else(|| format!("unexpected character at {line}:{column}"))?;
                    tokens.push(op);
                }
            }
        }
        Ok(tokens)
    }
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    Lexer::new(src).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_integer_with_width_suffix_and_separators() {
        let tokens = tokenize("1,000i64").unwrap();
        match &tokens[0].kind {
            TokenKind::Int { value, width, signed } => {
                assert_eq!(*value, 1000);
                assert_eq!(*width, 64);
                assert!(signed);
            }
            other => panic!("expected Int, got {other:?}"),
        }
    }

    #[test]
    fn tokenizes_hex_literal() {
        let tokens = tokenize("0xFFu64").unwrap();
        match &tokens[0].kind {
            TokenKind::Int { value, width, signed } => {
                assert_eq!(*value, 255);
                assert_eq!(*width, 64);
                assert!(!signed);
            }
            other => panic!("expected Int, got {other:?}"),
        }
    }

    #[test]
    fn tokenizes_float_with_exponent() {
        let tokens = tokenize("1.5e10f32").unwrap();
        match &tokens[0].kind {
            TokenKind::Float { text, width } => {
                assert_eq!(text, "1.5e10");
                assert_eq!(*width, 32);
            }
            other => panic!("expected Float, got {other:?}"),
        }
    }

    #[test]
    fn double_quoted_string_interprets_escapes_and_suffix() {
        let tokens = tokenize("\"a\\nb\"utf8").unwrap();
        match &tokens[0].kind {
            TokenKind::Str { value, suffix } => {
                assert_eq!(value, "a\nb");
                assert_eq!(*suffix, Some(StringSuffix::Utf8));
            }
            other => panic!("expected Str, got {other:?}"),
        }
    }

    #[test]
    fn single_quoted_string_preserves_backslashes() {
        let tokens = tokenize("'a\\nb'").unwrap();
        match &tokens[0].kind {
            TokenKind::Str { value, .. } => assert_eq!(value, "a\\nb"),
            other => panic!("expected Str, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_string_fails() {
        assert!(tokenize("\"abc").is_err());
    }

    #[test]
    fn unknown_escape_fails() {
        assert!(tokenize("\"a\\qb\"").is_err());
    }

    #[test]
    fn slash_rooted_path_is_one_identifier() {
        let tokens = tokenize("/math/add").unwrap();
        assert_eq!(tokens[0].text, "/math/add");
    }

    #[test]
    fn line_comment_is_skipped() {
        let tokens = tokenize("1i32 // comment\n2i32").unwrap();
        assert!(matches!(tokens[0].kind, TokenKind::Int { .. }));
        assert!(matches!(tokens[1].kind, TokenKind::Int { .. }));
    }

    #[test]
    fn block_comment_is_skipped() {
        let tokens = tokenize("1i32 /* c\nomment */ 2i32").unwrap();
        assert!(matches!(tokens[0].kind, TokenKind::Int { .. }));
        assert!(matches!(tokens[1].kind, TokenKind::Int { .. }));
    }

    #[test]
    fn operators_are_tokenized_longest_match_first() {
        let tokens = tokenize("a <= b").unwrap();
        assert!(tokens[1].is_operator("<="));
    }
}
