//! Tokenizer and cursor for the host's directive block syntax.
//!
//! ```text
//! sqlite3 {
//!     dsn "sqlite:${DATA_DIR}/zones.db"
//!     ttl 60
//! }
//! ```
//!
//! Tokens are whitespace separated. Double quotes group a token that contains
//! whitespace, `#` starts a comment that runs to the end of the line, and
//! braces are only structural when they stand alone.

/// A single token and the line it was read from (1-based)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub line: usize,
}

pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut current_line = 1;
    let mut line = 1;
    let mut in_quotes = false;
    let mut quoted = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => in_quotes = false,
                '\\' if matches!(chars.peek(), Some('"') | Some('\\')) => {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                }
                '\n' => {
                    line += 1;
                    current.push(c);
                }
                _ => current.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                if current.is_empty() {
                    current_line = line;
                }
                in_quotes = true;
                quoted = true;
            }
            '#' if current.is_empty() && !quoted => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            c if c.is_whitespace() => {
                if !current.is_empty() || quoted {
                    tokens.push(Token {
                        text: std::mem::take(&mut current),
                        line: current_line,
                    });
                    quoted = false;
                }
                if c == '\n' {
                    line += 1;
                }
            }
            _ => {
                if current.is_empty() {
                    current_line = line;
                }
                current.push(c);
            }
        }
    }

    if !current.is_empty() || quoted {
        tokens.push(Token {
            text: current,
            line: current_line,
        });
    }

    tokens
}

/// Cursor over a token stream.
///
/// Mirrors the host's controller: `next` moves to the following token
/// wherever it is, `next_arg` only moves when the following token is on the
/// same line and is not a closing brace.
#[derive(Debug)]
pub struct Dispenser {
    tokens: Vec<Token>,
    cursor: Option<usize>,
}

impl Dispenser {
    pub fn new(input: &str) -> Self {
        Self::from_tokens(tokenize(input))
    }

    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            cursor: None,
        }
    }

    /// Advance to the next token. Returns false at the end of input.
    pub fn next(&mut self) -> bool {
        let next = self.cursor.map_or(0, |c| c + 1);
        if next < self.tokens.len() {
            self.cursor = Some(next);
            true
        } else {
            false
        }
    }

    /// Advance to the next token only if it is an argument of the current one
    pub fn next_arg(&mut self) -> bool {
        let Some(current) = self.current() else {
            return false;
        };
        let line = current.line;
        match self.peek() {
            Some(next) if next.line == line && next.text != "}" => self.next(),
            _ => false,
        }
    }

    /// Advance past an opening brace on the current line.
    /// Returns true when positioned on the first token inside the block.
    pub fn next_block(&mut self) -> bool {
        match (self.current(), self.peek()) {
            (Some(current), Some(next)) if next.text == "{" && next.line == current.line => {
                self.next();
                self.next()
            }
            _ => false,
        }
    }

    pub fn val(&self) -> &str {
        self.current().map_or("", |t| t.text.as_str())
    }

    pub fn line(&self) -> usize {
        self.current()
            .or_else(|| self.tokens.last())
            .map_or(0, |t| t.line)
    }

    pub fn peek(&self) -> Option<&Token> {
        let next = self.cursor.map_or(0, |c| c + 1);
        self.tokens.get(next)
    }

    fn current(&self) -> Option<&Token> {
        self.cursor.and_then(|c| self.tokens.get(c))
    }
}
