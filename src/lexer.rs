use std::collections::VecDeque;
use std::{iter::Peekable, str::CharIndices};

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::token::{Span, Token, TokenKind};

/// Indentation-sensitive scanner.
///
/// Raw tokens are matched with maximal munch; on top of that sits the state
/// machine that turns physical line structure into `Newline`, `Indent`, and
/// `Dedent` tokens. Faults never stop the scan: they are recorded in the
/// diagnostics sink and the scanner keeps going.
pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    indent_stack: Vec<usize>,
    pending_tokens: VecDeque<Token<'a>>,
    bracket_depth: usize,
    may_indent: bool,
    eof_emitted: bool,
    line: usize,
    column: usize,
    pub(crate) diagnostics: Diagnostics,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            indent_stack: vec![0],
            pending_tokens: VecDeque::new(),
            bracket_depth: 0,
            may_indent: false,
            eof_emitted: false,
            line: 1,
            column: 0,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    pub fn next_token(&mut self) -> Token<'a> {
        if let Some(token) = self.pending_tokens.pop_front() {
            return self.deliver(token);
        }

        loop {
            self.skip_insignificant();

            let (start_idx, ch) = match self.chars.peek() {
                Some(&(idx, c)) => (idx, c),
                None => {
                    let span = self.here();
                    while self.indent_stack.len() > 1 {
                        self.indent_stack.pop();
                        self.pending_tokens
                            .push_back(Token::new(TokenKind::Dedent, span));
                    }
                    return match self.pending_tokens.pop_front() {
                        Some(token) => self.deliver(token),
                        None => Token::new(TokenKind::EOF, span),
                    };
                }
            };

            let line = self.line;
            let column = self.column;

            let token = match ch {
                '\n' => {
                    while let Some(&(_, '\n')) = self.chars.peek() {
                        self.advance_char();
                    }
                    if self.bracket_depth > 0 {
                        // Implicit line continuation inside an open bracket.
                        continue;
                    }
                    self.pending_tokens.push_back(Token::new(
                        TokenKind::Newline,
                        Span {
                            start: start_idx,
                            end: start_idx + 1,
                            line,
                            column,
                        },
                    ));
                    // A blank or comment-only line leaves the colon's indent
                    // permission pending for the next real line.
                    if self.measure_indentation() {
                        self.may_indent = false;
                    }
                    self.pending_tokens.pop_front().unwrap()
                }
                ';' => {
                    // Statement separator; the grammar sees a logical line end.
                    self.advance_char();
                    Token::new(
                        TokenKind::Newline,
                        Span {
                            start: start_idx,
                            end: start_idx + 1,
                            line,
                            column,
                        },
                    )
                }
                '+' => self.operator(start_idx, line, column, TokenKind::PlusEqual, TokenKind::Plus),
                '-' => {
                    self.operator(start_idx, line, column, TokenKind::MinusEqual, TokenKind::Minus)
                }
                '%' => self.operator(
                    start_idx,
                    line,
                    column,
                    TokenKind::PercentEqual,
                    TokenKind::Percent,
                ),
                '=' => {
                    self.operator(start_idx, line, column, TokenKind::EqualEqual, TokenKind::Equal)
                }
                '<' => {
                    self.operator(start_idx, line, column, TokenKind::LessEqual, TokenKind::Less)
                }
                '>' => self.operator(
                    start_idx,
                    line,
                    column,
                    TokenKind::GreaterEqual,
                    TokenKind::Greater,
                ),
                '*' => {
                    self.advance_char();
                    let kind = if matches!(self.chars.peek(), Some(&(_, '*'))) {
                        self.advance_char();
                        if matches!(self.chars.peek(), Some(&(_, '='))) {
                            self.advance_char();
                            TokenKind::DoubleStarEqual
                        } else {
                            TokenKind::DoubleStar
                        }
                    } else if matches!(self.chars.peek(), Some(&(_, '='))) {
                        self.advance_char();
                        TokenKind::StarEqual
                    } else {
                        TokenKind::Star
                    };
                    self.token_from(kind, start_idx, line, column)
                }
                '/' => {
                    self.advance_char();
                    let kind = if matches!(self.chars.peek(), Some(&(_, '/'))) {
                        self.advance_char();
                        if matches!(self.chars.peek(), Some(&(_, '='))) {
                            self.advance_char();
                            TokenKind::DoubleSlashEqual
                        } else {
                            TokenKind::DoubleSlash
                        }
                    } else if matches!(self.chars.peek(), Some(&(_, '='))) {
                        self.advance_char();
                        TokenKind::SlashEqual
                    } else {
                        TokenKind::Slash
                    };
                    self.token_from(kind, start_idx, line, column)
                }
                '!' => {
                    self.advance_char();
                    if matches!(self.chars.peek(), Some(&(_, '='))) {
                        self.advance_char();
                        self.token_from(TokenKind::NotEqual, start_idx, line, column)
                    } else {
                        self.report(DiagnosticKind::IllegalCharacter('!'), line, start_idx);
                        continue;
                    }
                }
                '(' => self.single(TokenKind::LParen, start_idx, line, column),
                ')' => self.single(TokenKind::RParen, start_idx, line, column),
                '[' => self.single(TokenKind::LBracket, start_idx, line, column),
                ']' => self.single(TokenKind::RBracket, start_idx, line, column),
                '{' => self.single(TokenKind::LBrace, start_idx, line, column),
                '}' => self.single(TokenKind::RBrace, start_idx, line, column),
                ':' => self.single(TokenKind::Colon, start_idx, line, column),
                ',' => self.single(TokenKind::Comma, start_idx, line, column),
                '.' => self.single(TokenKind::Dot, start_idx, line, column),
                '"' | '\'' => match self.read_string(ch, start_idx, line, column) {
                    Some(token) => token,
                    None => continue,
                },
                c if c.is_alphabetic() || c == '_' => {
                    self.read_identifier(start_idx, line, column)
                }
                c if c.is_ascii_digit() => self.read_number(start_idx, line, column),
                _ => {
                    self.report(DiagnosticKind::IllegalCharacter(ch), line, start_idx);
                    self.advance_char();
                    continue;
                }
            };

            return self.deliver(token);
        }
    }

    /// Bookkeeping applied to every token handed to the caller: bracket depth
    /// tracks unclosed grouping delimiters, and only a colon outside brackets
    /// licenses an indent on the next line.
    fn deliver(&mut self, token: Token<'a>) -> Token<'a> {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                self.bracket_depth += 1;
                self.may_indent = false;
            }
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                self.may_indent = false;
            }
            TokenKind::Colon => {
                self.may_indent = self.bracket_depth == 0;
            }
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::EOF => {}
            _ => {
                self.may_indent = false;
            }
        }
        token
    }

    /// Compare the upcoming line's leading whitespace width against the
    /// indent stack and enqueue `Indent`/`Dedent` tokens, reporting whether
    /// the line took part. Blank and comment-only lines do not participate.
    /// A tab in the leading run is reported and counted as one column.
    fn measure_indentation(&mut self) -> bool {
        let mut lookahead = self.chars.clone();
        let mut width = 0usize;
        let mut tab = None;
        while let Some(&(idx, c)) = lookahead.peek() {
            match c {
                ' ' => {}
                '\t' => {
                    if tab.is_none() {
                        tab = Some(idx);
                    }
                }
                _ => break,
            }
            lookahead.next();
            width += 1;
        }
        match lookahead.peek() {
            None | Some(&(_, '\n')) | Some(&(_, '\r')) | Some(&(_, '#')) => return false,
            _ => {}
        }
        if let Some(offset) = tab {
            self.report(DiagnosticKind::TabIndent, self.line, offset);
        }

        for _ in 0..width {
            self.advance_char();
        }
        let span = self.here();
        let top = *self.indent_stack.last().unwrap();
        if width > top {
            if self.may_indent {
                self.indent_stack.push(width);
                self.pending_tokens
                    .push_back(Token::new(TokenKind::Indent, span));
            } else {
                self.report(DiagnosticKind::UnexpectedIndent, span.line, span.start);
            }
        } else if width < top {
            while *self.indent_stack.last().unwrap() > width {
                self.indent_stack.pop();
                self.pending_tokens
                    .push_back(Token::new(TokenKind::Dedent, span));
            }
            if *self.indent_stack.last().unwrap() != width {
                self.report(DiagnosticKind::MismatchedDedent, span.line, span.start);
            }
        }
        true
    }

    fn skip_insignificant(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.advance_char();
                }
                '#' => {
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance_char();
                    }
                }
                _ => break,
            }
        }
    }

    fn read_identifier(&mut self, start: usize, line: usize, column: usize) -> Token<'a> {
        self.advance_char();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance_char();
            } else {
                break;
            }
        }

        let end = self.current_index();
        let ident = &self.input[start..end];
        let kind = match ident {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "elif" => TokenKind::Elif,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "pass" => TokenKind::Pass,
            "def" => TokenKind::Def,
            "return" => TokenKind::Return,
            "class" => TokenKind::Class,
            "True" => TokenKind::True,
            "False" => TokenKind::False,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "in" => TokenKind::In,
            _ => TokenKind::Identifier(ident),
        };
        Token::new(
            kind,
            Span {
                start,
                end,
                line,
                column,
            },
        )
    }

    fn read_number(&mut self, start: usize, line: usize, column: usize) -> Token<'a> {
        let input = self.input;
        self.advance_char();
        while matches!(self.chars.peek(), Some(&(_, c)) if c.is_ascii_digit()) {
            self.advance_char();
        }

        // The dot only belongs to the number when a digit follows it.
        let mut is_float = false;
        if matches!(self.chars.peek(), Some(&(_, '.'))) {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if matches!(lookahead.peek(), Some(&(_, c)) if c.is_ascii_digit()) {
                self.advance_char();
                while matches!(self.chars.peek(), Some(&(_, c)) if c.is_ascii_digit()) {
                    self.advance_char();
                }
                is_float = true;
            }
        }

        let end = self.current_index();
        let text = &input[start..end];
        let kind = if is_float {
            TokenKind::Float(text.parse().unwrap_or(f64::INFINITY))
        } else {
            match text.parse::<i64>() {
                Ok(value) => TokenKind::Integer(value),
                Err(_) => {
                    self.report(DiagnosticKind::IntegerOutOfRange(text.to_string()), line, start);
                    TokenKind::Integer(i64::MAX)
                }
            }
        };
        Token::new(
            kind,
            Span {
                start,
                end,
                line,
                column,
            },
        )
    }

    /// Match a string literal starting at the current quote. An escape
    /// consumes the following character; if no closing quote is found before
    /// the end of the line, the match falls back to the last escaped quote
    /// (so the literal ends with a bare backslash). Returns `None` when the
    /// quote opens no literal at all, in which case it has been skipped and
    /// reported.
    fn read_string(
        &mut self,
        quote: char,
        start: usize,
        line: usize,
        column: usize,
    ) -> Option<Token<'a>> {
        let input = self.input;
        let mut lookahead = self.chars.clone();
        lookahead.next();

        let mut closing = None;
        let mut fallback = None;
        while let Some(&(idx, c)) = lookahead.peek() {
            if c == quote {
                closing = Some(idx);
                break;
            }
            if c == '\n' {
                break;
            }
            lookahead.next();
            if c == '\\' {
                match lookahead.peek() {
                    Some(&(escaped_idx, escaped)) if escaped != '\n' => {
                        if escaped == quote {
                            fallback = Some(escaped_idx);
                        }
                        lookahead.next();
                    }
                    _ => break,
                }
            }
        }

        let close = match closing.or(fallback) {
            Some(idx) => idx,
            None => {
                self.report(DiagnosticKind::IllegalCharacter(quote), line, start);
                self.advance_char();
                return None;
            }
        };

        while let Some((idx, _)) = self.advance_char() {
            if idx == close {
                break;
            }
        }

        let end = close + quote.len_utf8();
        self.validate_escapes(start + quote.len_utf8(), close, line);
        Some(Token::new(
            TokenKind::String(&input[start..end]),
            Span {
                start,
                end,
                line,
                column,
            },
        ))
    }

    /// The allowed escape targets are exactly `n`, `t`, `\`, `"`, `'`.
    fn validate_escapes(&mut self, interior_start: usize, interior_end: usize, line: usize) {
        let input = self.input;
        let interior = &input[interior_start..interior_end];
        let mut iter = interior.char_indices();
        while let Some((idx, c)) = iter.next() {
            if c != '\\' {
                continue;
            }
            match iter.next() {
                Some((_, escaped)) if matches!(escaped, 'n' | 't' | '\\' | '"' | '\'') => {}
                Some((_, escaped)) => {
                    self.report(
                        DiagnosticKind::InvalidEscape(escaped),
                        line,
                        interior_start + idx,
                    );
                }
                None => {
                    self.report(
                        DiagnosticKind::TrailingBackslash,
                        line,
                        interior_start + idx,
                    );
                }
            }
        }
    }

    fn operator(
        &mut self,
        start: usize,
        line: usize,
        column: usize,
        with_eq: TokenKind<'a>,
        without: TokenKind<'a>,
    ) -> Token<'a> {
        self.advance_char();
        let kind = if matches!(self.chars.peek(), Some(&(_, '='))) {
            self.advance_char();
            with_eq
        } else {
            without
        };
        self.token_from(kind, start, line, column)
    }

    fn single(&mut self, kind: TokenKind<'a>, start: usize, line: usize, column: usize) -> Token<'a> {
        self.advance_char();
        self.token_from(kind, start, line, column)
    }

    fn token_from(&mut self, kind: TokenKind<'a>, start: usize, line: usize, column: usize) -> Token<'a> {
        Token::new(
            kind,
            Span {
                start,
                end: self.current_index(),
                line,
                column,
            },
        )
    }

    fn report(&mut self, kind: DiagnosticKind, line: usize, offset: usize) {
        self.diagnostics.push(kind, line, offset);
    }

    fn advance_char(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn current_index(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(idx, _)| *idx)
            .unwrap_or(self.input.len())
    }

    fn here(&mut self) -> Span {
        let index = self.current_index();
        Span {
            start: index,
            end: index,
            line: self.line,
            column: self.column,
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.eof_emitted {
            return None;
        }
        let token = self.next_token();
        if matches!(token.kind, TokenKind::EOF) {
            self.eof_emitted = true;
        }
        Some(token)
    }
}

/// Drive a fresh lexer over `input` and collect the whole token stream,
/// ending with the `EOF` sentinel, along with everything it diagnosed.
pub fn tokenize(input: &str) -> (Vec<Token<'_>>, Diagnostics) {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let is_eof = matches!(token.kind, TokenKind::EOF);
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    (tokens, lexer.into_diagnostics())
}
