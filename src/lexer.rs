use crate::error::{PascalError, Span};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    Colon,
    Dot,
    Semicolon,
    Plus,
    Minus,
    Star,
    Slash,
    Equal,
    Less,
    Greater,

    // Two character tokens
    Assign,
    Range,
    LessEqual,
    GreaterEqual,

    // Literals
    Identifier,
    Integer,
    Real,
    String,

    // Keywords
    Program,
    Begin,
    End,
    Const,
    Var,
    Function,
    Procedure,
    If,
    Then,
    Else,
    While,
    Do,
    For,
    To,
    Writeln,
    Div,
    Mod,
    And,
    Or,
    Not,
    True,
    False,
    Of,

    // Type names
    IntegerType,
    RealType,
    BooleanType,
    ArrayType,

    // Special
    Eof,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            TokenType::LeftParen => "'('",
            TokenType::RightParen => "')'",
            TokenType::LeftBracket => "'['",
            TokenType::RightBracket => "']'",
            TokenType::Comma => "','",
            TokenType::Colon => "':'",
            TokenType::Dot => "'.'",
            TokenType::Semicolon => "';'",
            TokenType::Plus => "'+'",
            TokenType::Minus => "'-'",
            TokenType::Star => "'*'",
            TokenType::Slash => "'/'",
            TokenType::Equal => "'='",
            TokenType::Less => "'<'",
            TokenType::Greater => "'>'",
            TokenType::Assign => "':='",
            TokenType::Range => "'..'",
            TokenType::LessEqual => "'<='",
            TokenType::GreaterEqual => "'>='",
            TokenType::Identifier => "identifier",
            TokenType::Integer => "integer literal",
            TokenType::Real => "real literal",
            TokenType::String => "string literal",
            TokenType::Program => "'program'",
            TokenType::Begin => "'begin'",
            TokenType::End => "'end'",
            TokenType::Const => "'const'",
            TokenType::Var => "'var'",
            TokenType::Function => "'function'",
            TokenType::Procedure => "'procedure'",
            TokenType::If => "'if'",
            TokenType::Then => "'then'",
            TokenType::Else => "'else'",
            TokenType::While => "'while'",
            TokenType::Do => "'do'",
            TokenType::For => "'for'",
            TokenType::To => "'to'",
            TokenType::Writeln => "'writeln'",
            TokenType::Div => "'div'",
            TokenType::Mod => "'mod'",
            TokenType::And => "'and'",
            TokenType::Or => "'or'",
            TokenType::Not => "'not'",
            TokenType::True => "'true'",
            TokenType::False => "'false'",
            TokenType::Of => "'of'",
            TokenType::IntegerType => "'Integer'",
            TokenType::RealType => "'Real'",
            TokenType::BooleanType => "'Boolean'",
            TokenType::ArrayType => "'Array'",
            TokenType::Eof => "end of input",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn new(token_type: TokenType, lexeme: String, span: Span) -> Self {
        Self {
            token_type,
            lexeme,
            span,
        }
    }
}

/// Scan position. Copying it out and back in is how `peek` looks ahead.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    offset: usize,
    line: usize,
    column: usize,
}

/// Produces tokens on demand; the parser pulls them one at a time.
pub struct Lexer {
    source: Vec<char>,
    cursor: Cursor,
    keywords: HashMap<&'static str, TokenType>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        let mut keywords = HashMap::new();
        keywords.insert("program", TokenType::Program);
        keywords.insert("begin", TokenType::Begin);
        keywords.insert("end", TokenType::End);
        keywords.insert("const", TokenType::Const);
        keywords.insert("var", TokenType::Var);
        keywords.insert("function", TokenType::Function);
        keywords.insert("procedure", TokenType::Procedure);
        keywords.insert("if", TokenType::If);
        keywords.insert("then", TokenType::Then);
        keywords.insert("else", TokenType::Else);
        keywords.insert("while", TokenType::While);
        keywords.insert("do", TokenType::Do);
        keywords.insert("for", TokenType::For);
        keywords.insert("to", TokenType::To);
        keywords.insert("writeln", TokenType::Writeln);
        keywords.insert("div", TokenType::Div);
        keywords.insert("mod", TokenType::Mod);
        keywords.insert("and", TokenType::And);
        keywords.insert("or", TokenType::Or);
        keywords.insert("not", TokenType::Not);
        keywords.insert("true", TokenType::True);
        keywords.insert("false", TokenType::False);
        keywords.insert("of", TokenType::Of);
        keywords.insert("Integer", TokenType::IntegerType);
        keywords.insert("Real", TokenType::RealType);
        keywords.insert("Boolean", TokenType::BooleanType);
        keywords.insert("Array", TokenType::ArrayType);

        Self {
            source: source.chars().collect(),
            cursor: Cursor {
                offset: 0,
                line: 1,
                column: 1,
            },
            keywords,
        }
    }

    /// Drains the whole stream, ending with a single `Eof` token.
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>, PascalError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.token_type == TokenType::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    pub fn peek(&mut self) -> Result<Token, PascalError> {
        let saved = self.cursor;
        let token = self.next_token();
        self.cursor = saved;
        token
    }

    pub fn expect(&mut self, token_type: TokenType) -> Result<Token, PascalError> {
        let token = self.next_token()?;
        if token.token_type != token_type {
            return Err(PascalError::syntax_error(
                token.span,
                &token_type.to_string(),
                &describe(&token),
            ));
        }
        Ok(token)
    }

    pub fn next_token(&mut self) -> Result<Token, PascalError> {
        self.skip_whitespace_and_comments()?;

        let start = self.cursor;
        if self.is_at_end() {
            return Ok(Token::new(
                TokenType::Eof,
                String::new(),
                Span::new(start.offset, start.offset, start.line, start.column),
            ));
        }

        let c = self.advance();
        let token_type = match c {
            '(' => TokenType::LeftParen,
            ')' => TokenType::RightParen,
            '[' => TokenType::LeftBracket,
            ']' => TokenType::RightBracket,
            ',' => TokenType::Comma,
            ';' => TokenType::Semicolon,
            '+' => TokenType::Plus,
            '-' => TokenType::Minus,
            '*' => TokenType::Star,
            '/' => TokenType::Slash,
            '=' => TokenType::Equal,
            ':' => {
                if self.match_char('=') {
                    TokenType::Assign
                } else {
                    TokenType::Colon
                }
            }
            '.' => {
                if self.match_char('.') {
                    TokenType::Range
                } else {
                    TokenType::Dot
                }
            }
            '<' => {
                if self.match_char('=') {
                    TokenType::LessEqual
                } else {
                    TokenType::Less
                }
            }
            '>' => {
                if self.match_char('=') {
                    TokenType::GreaterEqual
                } else {
                    TokenType::Greater
                }
            }
            '\'' => return self.string(start),
            c if c.is_ascii_digit() => return self.number(start),
            c if c.is_ascii_alphabetic() => return Ok(self.identifier(start)),
            _ => {
                return Err(PascalError::lex_error(
                    self.span_from(start),
                    format!("Unexpected character: '{}'", c),
                ));
            }
        };

        Ok(self.make_token(token_type, start))
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), PascalError> {
        loop {
            match self.peek_char() {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                '{' => {
                    let start = self.cursor;
                    self.advance();
                    while self.peek_char() != '}' && !self.is_at_end() {
                        self.advance();
                    }
                    if self.is_at_end() {
                        return Err(PascalError::lex_error(
                            self.span_from(start),
                            "Unterminated comment".to_string(),
                        ));
                    }
                    self.advance();
                }
                _ => return Ok(()),
            }
        }
    }

    fn is_at_end(&self) -> bool {
        self.cursor.offset >= self.source.len()
    }

    fn advance(&mut self) -> char {
        let c = self.peek_char();
        if self.is_at_end() {
            return c;
        }
        self.cursor.offset += 1;
        if c == '\n' {
            self.cursor.line += 1;
            self.cursor.column = 1;
        } else {
            self.cursor.column += 1;
        }
        c
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.peek_char() != expected {
            false
        } else {
            self.advance();
            true
        }
    }

    fn peek_char(&self) -> char {
        self.source.get(self.cursor.offset).copied().unwrap_or('\0')
    }

    fn peek_next_char(&self) -> char {
        self.source
            .get(self.cursor.offset + 1)
            .copied()
            .unwrap_or('\0')
    }

    fn string(&mut self, start: Cursor) -> Result<Token, PascalError> {
        while self.peek_char() != '\'' && !self.is_at_end() {
            self.advance();
        }

        if self.is_at_end() {
            return Err(PascalError::lex_error(
                self.span_from(start),
                "Unterminated string".to_string(),
            ));
        }

        // Closing quote
        self.advance();

        let content: String = self.source[start.offset + 1..self.cursor.offset - 1]
            .iter()
            .collect();
        Ok(Token::new(TokenType::String, content, self.span_from(start)))
    }

    fn number(&mut self, start: Cursor) -> Result<Token, PascalError> {
        while self.peek_char().is_ascii_digit() {
            self.advance();
        }

        // `1..5` is a range, so a fraction needs a digit after the dot.
        let mut is_real = false;
        if self.peek_char() == '.' && self.peek_next_char().is_ascii_digit() {
            is_real = true;
            self.advance();
            while self.peek_char().is_ascii_digit() {
                self.advance();
            }
        }

        let token = self.make_token(
            if is_real {
                TokenType::Real
            } else {
                TokenType::Integer
            },
            start,
        );

        let valid = if is_real {
            token.lexeme.parse::<f64>().is_ok()
        } else {
            token.lexeme.parse::<i64>().is_ok()
        };
        if !valid {
            return Err(PascalError::lex_error(
                token.span,
                format!("Invalid number literal: {}", token.lexeme),
            ));
        }

        Ok(token)
    }

    fn identifier(&mut self, start: Cursor) -> Token {
        while self.peek_char().is_ascii_alphanumeric() || self.peek_char() == '_' {
            self.advance();
        }

        let text: String = self.source[start.offset..self.cursor.offset]
            .iter()
            .collect();
        let token_type = self
            .keywords
            .get(text.as_str())
            .copied()
            .unwrap_or(TokenType::Identifier);

        Token::new(token_type, text, self.span_from(start))
    }

    fn make_token(&self, token_type: TokenType, start: Cursor) -> Token {
        let text: String = self.source[start.offset..self.cursor.offset]
            .iter()
            .collect();
        Token::new(token_type, text, self.span_from(start))
    }

    fn span_from(&self, start: Cursor) -> Span {
        Span::new(start.offset, self.cursor.offset, start.line, start.column)
    }
}

/// How a token is named in "expected X, found Y" messages.
pub fn describe(token: &Token) -> String {
    match token.token_type {
        TokenType::Identifier => format!("identifier '{}'", token.lexeme),
        TokenType::Integer | TokenType::Real => format!("number {}", token.lexeme),
        TokenType::String => format!("string '{}'", token.lexeme),
        other => other.to_string(),
    }
}
