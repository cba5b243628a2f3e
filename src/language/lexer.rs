use crate::language::{
    span::Span,
    token::{Token, TokenKind},
};

#[derive(Debug)]
pub struct LexError {
    pub message: String,
    pub span: Span,
    pub line: u32,
}

pub fn lex(source: &str) -> Result<Vec<Token>, Vec<LexError>> {
    let lexer = Lexer::new(source);
    lexer.run()
}

struct Lexer<'a> {
    src: &'a str,
    chars: std::str::Chars<'a>,
    current: Option<char>,
    offset: usize,
    line: u32,
    at_line_start: bool,
    indent_stack: Vec<usize>,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        let mut chars = src.chars();
        let current = chars.next();
        Self {
            src,
            chars,
            current,
            offset: 0,
            line: 1,
            at_line_start: true,
            indent_stack: vec![0],
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, Vec<LexError>> {
        while self.current.is_some() {
            if self.at_line_start {
                self.at_line_start = false;
                self.handle_indentation();
                if self.current.is_none() {
                    break;
                }
            }
            self.scan_token();
        }

        // Close every still-open block before EOF.
        while self.indent_stack.last().copied().unwrap_or(0) > 0 {
            self.indent_stack.pop();
            self.push_synthetic(TokenKind::Dedent);
        }
        self.push_synthetic(TokenKind::Eof);

        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(self.errors)
        }
    }

    /// Measures the leading whitespace of a line and synthesizes
    /// INDENT/DEDENT tokens against the indentation stack. Blank lines
    /// and comment-only lines leave the block structure untouched.
    fn handle_indentation(&mut self) {
        let mut spaces = 0usize;
        while let Some(ch) = self.current {
            match ch {
                ' ' => spaces += 1,
                '\t' => spaces += 4,
                _ => break,
            }
            self.bump();
        }

        match self.current {
            None => return,
            Some('\n') | Some('\r') => return,
            Some('/') if self.peek() == Some('/') => return,
            _ => {}
        }

        let top = self.indent_stack.last().copied().unwrap_or(0);
        if spaces > top {
            self.indent_stack.push(spaces);
            self.push_synthetic(TokenKind::Indent);
        } else if spaces < top {
            while spaces < self.indent_stack.last().copied().unwrap_or(0) {
                self.indent_stack.pop();
                self.push_synthetic(TokenKind::Dedent);
            }
            // A dedent run doubles as a statement separator.
            self.push_synthetic(TokenKind::Newline);

            if self.indent_stack.last().copied().unwrap_or(0) != spaces {
                self.error(self.offset, self.offset, "Inconsistent indentation.");
            }
        }
    }

    fn scan_token(&mut self) {
        let start = self.offset;
        let Some(c) = self.current else { return };
        match c {
            ' ' | '\r' | '\t' => {
                self.bump();
            }
            '\n' => {
                self.bump();
                self.line += 1;
                self.push_token(TokenKind::Newline, start, self.offset);
                self.at_line_start = true;
            }
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '{' => self.single(TokenKind::LBrace),
            '}' => self.single(TokenKind::RBrace),
            '[' => self.single(TokenKind::LBracket),
            ']' => self.single(TokenKind::RBracket),
            ',' => self.single(TokenKind::Comma),
            '.' => self.single(TokenKind::Dot),
            '-' => self.single(TokenKind::Minus),
            '+' => self.single(TokenKind::Plus),
            '*' => self.single(TokenKind::Star),
            ';' => self.single(TokenKind::Semicolon),
            ':' => self.single(TokenKind::Colon),
            '&' => self.single(TokenKind::Ampersand),
            '/' => {
                self.bump();
                if self.current == Some('/') {
                    while let Some(ch) = self.current {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                } else {
                    self.push_token(TokenKind::Slash, start, self.offset);
                }
            }
            '!' => {
                self.bump();
                if self.current == Some('=') {
                    self.bump();
                    self.push_token(TokenKind::BangEqual, start, self.offset);
                } else {
                    self.push_token(TokenKind::Bang, start, self.offset);
                }
            }
            '=' => {
                self.bump();
                if self.current == Some('=') {
                    self.bump();
                    self.push_token(TokenKind::EqualEqual, start, self.offset);
                } else if self.current == Some('>') {
                    self.bump();
                    self.push_token(TokenKind::Arrow, start, self.offset);
                } else {
                    self.push_token(TokenKind::Assign, start, self.offset);
                }
            }
            '<' => {
                self.bump();
                if self.current == Some('=') {
                    self.bump();
                    self.push_token(TokenKind::LessEqual, start, self.offset);
                } else {
                    self.push_token(TokenKind::Less, start, self.offset);
                }
            }
            '>' => {
                self.bump();
                if self.current == Some('=') {
                    self.bump();
                    self.push_token(TokenKind::GreaterEqual, start, self.offset);
                } else {
                    self.push_token(TokenKind::Greater, start, self.offset);
                }
            }
            '@' => {
                self.bump();
                if matches!(self.current, Some(ch) if is_ident_start(ch)) {
                    self.lex_atom(start);
                } else {
                    self.error(start, self.offset, "Unexpected character '@'.");
                }
            }
            '#' => {
                self.bump();
                if self.current == Some('{') {
                    self.bump();
                    self.push_token(TokenKind::MapStart, start, self.offset);
                } else {
                    self.error(start, self.offset, "Unexpected character '#'.");
                }
            }
            '"' => self.lex_string(start),
            ch if ch.is_ascii_digit() => self.lex_number(start),
            ch if is_ident_start(ch) => self.lex_identifier(start),
            ch => {
                self.bump();
                self.error(start, self.offset, format!("Unexpected character '{}'.", ch));
            }
        }
    }

    fn lex_identifier(&mut self, start: usize) {
        while matches!(self.current, Some(ch) if is_ident_char(ch)) {
            self.bump();
        }

        let end = self.offset;
        let slice = &self.src[start..end];
        let kind = match slice {
            "let" => TokenKind::Let,
            "mutable" => TokenKind::Mutable,
            "type" => TokenKind::Type,
            "struct" => TokenKind::Struct,
            "class" => TokenKind::Class,
            "new" => TokenKind::New,
            "delete" => TokenKind::Delete,
            "if" => TokenKind::If,
            "then" => TokenKind::Then,
            "else" => TokenKind::Else,
            "print" => TokenKind::Print,
            "impl" => TokenKind::Impl,
            "fun" => TokenKind::Fun,
            "return" => TokenKind::Return,
            "this" => TokenKind::This,
            "while" => TokenKind::While,
            "import" => TokenKind::Import,
            "as" => TokenKind::As,
            _ => TokenKind::Identifier(slice.to_string()),
        };
        self.push_token(kind, start, end);
    }

    fn lex_number(&mut self, start: usize) {
        while matches!(self.current, Some(ch) if ch.is_ascii_digit()) {
            self.bump();
        }

        let end = self.offset;
        let text = &self.src[start..end];
        match text.parse::<i32>() {
            Ok(value) => self.push_token(TokenKind::Number(value), start, end),
            Err(_) => self.error(start, end, "Invalid integer literal."),
        }
    }

    /// Strings carry their contents verbatim; escape sequences are
    /// interpreted at print time, not here. Newlines are allowed and
    /// advance the line counter.
    fn lex_string(&mut self, start: usize) {
        self.bump(); // opening quote
        loop {
            match self.current {
                None => {
                    self.error(start, self.offset, "Unterminated string literal.");
                    return;
                }
                Some('"') => {
                    self.bump();
                    let end = self.offset;
                    let value = self.src[start + 1..end - 1].to_string();
                    self.push_token(TokenKind::Str(value), start, end);
                    return;
                }
                Some('\n') => {
                    self.line += 1;
                    self.bump();
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn lex_atom(&mut self, start: usize) {
        while matches!(self.current, Some(ch) if is_ident_char(ch)) {
            self.bump();
        }
        let end = self.offset;
        // Skip the leading '@'.
        let name = self.src[start + 1..end].to_string();
        self.push_token(TokenKind::Atom(name), start, end);
    }

    fn bump(&mut self) -> Option<char> {
        if let Some(ch) = self.current {
            self.offset += ch.len_utf8();
        }
        self.current = self.chars.next();
        self.current
    }

    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn single(&mut self, kind: TokenKind) {
        let start = self.offset;
        self.bump();
        self.push_token(kind, start, self.offset);
    }

    fn push_token(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start, end),
            line: self.line,
        });
    }

    fn push_synthetic(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            span: Span::empty(self.offset),
            line: self.line,
        });
    }

    fn error(&mut self, start: usize, end: usize, message: impl Into<String>) {
        self.errors.push(LexError {
            message: message.into(),
            span: Span::new(start, end),
            line: self.line,
        });
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}
