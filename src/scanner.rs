use std::iter::FusedIterator;

/// Everything from this character to the end of the line is a comment.
pub const COMMENT_CHAR: char = ';';
/// A word immediately followed by this character defines a label.
pub const LABEL_SUFFIX: char = ':';
const QUOTE_CHAR: char = '\'';

/// Scanner takes in a single source line and spits out tokens.
#[derive(Debug)]
pub struct Scanner<'a> {
    input: &'a str,
    // Same trick as a multi-line scanner: `input` is what is left of the line, and
    // scanned_input_len is how many bytes of it belong to the token being built.
    scanned_input_len: usize,
}

/// The lexical category of a token. Whether a word is a command, a register or a
/// number is decided later, by whoever consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    /// A maximal run of word characters.
    Word,
    /// A word with a trailing `:`, e.g. `loop:`.
    Label,
    /// A single-quoted literal. The raw text keeps both quotes.
    Quoted,
    /// Anything else that is neither whitespace nor a comma, e.g. `-5`.
    Other,
}

/// Token is a single token, borrowing the raw characters that constitute it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// What kind of token this is.
    pub typ: TokenType,
    /// The characters of the token, exactly as they appear in the line.
    pub raw: &'a str,
}

impl<'a> Token<'a> {
    /// The label name a `Label` token defines, without its `:`.
    pub fn label_name(&self) -> Option<&'a str> {
        match self.typ {
            TokenType::Label => self.raw.strip_suffix(LABEL_SUFFIX),
            _ => None,
        }
    }
}

impl<'a> Scanner<'a> {
    /// Returns a fresh Scanner for one line. The comment, if any, is dropped up front.
    pub fn new(line: &'a str) -> Scanner<'a> {
        let code = match line.find(COMMENT_CHAR) {
            Some(idx) => &line[..idx],
            None => line,
        };
        Scanner {
            input: code,
            scanned_input_len: 0,
        }
    }

    /// Returns the next token from the line, or None when the line is used up.
    pub fn next_token(&mut self) -> Option<Token<'a>> {
        self.skip_separators();
        let next_char = self.take_next_char()?;
        let token = match next_char {
            c if is_word_char(c) => self.scan_word(),
            QUOTE_CHAR => self.scan_quoted(),
            _ => self.scan_other(),
        };
        self.reset_scanned_input();
        Some(token)
    }

    fn unscanned_input(&self) -> &'a str {
        if self.scanned_input_len < self.input.len() {
            &self.input[self.scanned_input_len..]
        } else {
            ""
        }
    }

    fn peek_next_char(&self) -> Option<char> {
        self.unscanned_input().chars().next()
    }

    fn take_next_char(&mut self) -> Option<char> {
        let next_char = self.peek_next_char()?;
        self.scanned_input_len += next_char.len_utf8();
        Some(next_char)
    }

    fn take_while<F>(&mut self, pred: F)
    where
        F: Fn(char) -> bool,
    {
        while self.peek_next_char().map_or(false, &pred) {
            self.take_next_char();
        }
    }

    fn skip_separators(&mut self) {
        self.take_while(is_separator);
        self.reset_scanned_input();
    }

    fn make_token(&self, typ: TokenType) -> Token<'a> {
        Token {
            typ,
            raw: &self.input[0..self.scanned_input_len],
        }
    }

    fn reset_scanned_input(&mut self) {
        self.input = self.unscanned_input();
        self.scanned_input_len = 0;
    }

    // Assumes the first word character has been taken.
    fn scan_word(&mut self) -> Token<'a> {
        self.take_while(is_word_char);
        if self.peek_next_char() == Some(LABEL_SUFFIX) {
            self.take_next_char();
            self.make_token(TokenType::Label)
        } else {
            self.make_token(TokenType::Word)
        }
    }

    // Assumes the opening quote has been taken. Stops at the first closing quote;
    // without one the quote is just the start of an `Other` token.
    fn scan_quoted(&mut self) -> Token<'a> {
        match self.unscanned_input().find(QUOTE_CHAR) {
            Some(idx) => {
                self.scanned_input_len += idx + QUOTE_CHAR.len_utf8();
                self.make_token(TokenType::Quoted)
            }
            None => self.scan_other(),
        }
    }

    fn scan_other(&mut self) -> Token<'a> {
        self.take_while(|c| !is_separator(c));
        self.make_token(TokenType::Other)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == ','
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

impl<'a> FusedIterator for Scanner<'a> {}
