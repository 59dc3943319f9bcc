//! Splits a command line into words.

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word, with quotes already removed.
    Word(String),
    /// An unquoted `&` standing on its own.
    Ampersand,
}

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexingError {
    /// A closing single quote was not found.
    UnfinishedQuote,
}

impl std::fmt::Display for LexingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexingError::UnfinishedQuote => write!(f, "unmatched quote"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
}

struct LexingFSM<'a> {
    input: std::str::Chars<'a>,
    state: LexingState,
    buffer: String,
    quoted: bool,
}

impl<'a> LexingFSM<'a> {
    fn new(line: &'a str) -> Self {
        LexingFSM {
            input: line.chars(),
            state: LexingState::Start,
            buffer: String::new(),
            quoted: false,
        }
    }

    /// Runs the machine over the whole input.
    ///
    /// Words are separated by blanks. Text between single quotes is taken
    /// literally, blanks included, and may be glued to unquoted text.
    fn make_tokens(mut self) -> Result<Vec<Token>, LexingError> {
        let mut out = Vec::new();

        while let Some(ch) = self.input.next() {
            match self.state {
                LexingState::Start => self.handle_start(ch),
                LexingState::ReadingWord => self.handle_word(ch, &mut out),
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
            }
        }

        match self.state {
            LexingState::ReadingSingleQuote => Err(LexingError::UnfinishedQuote),
            LexingState::ReadingWord => {
                self.finish_word(&mut out);
                Ok(out)
            }
            LexingState::Start => Ok(out),
        }
    }

    fn handle_start(&mut self, ch: char) {
        match ch {
            ' ' | '\t' | '\n' | '\r' => {}
            '\'' => {
                self.quoted = true;
                self.state = LexingState::ReadingSingleQuote;
            }
            c => {
                self.buffer.push(c);
                self.state = LexingState::ReadingWord;
            }
        }
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<Token>) {
        match ch {
            ' ' | '\t' | '\n' | '\r' => {
                self.finish_word(out);
                self.state = LexingState::Start;
            }
            '\'' => {
                self.quoted = true;
                self.state = LexingState::ReadingSingleQuote;
            }
            c => self.buffer.push(c),
        }
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::ReadingWord,
            c => self.buffer.push(c),
        }
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        let word = std::mem::take(&mut self.buffer);
        if !self.quoted && word == "&" {
            out.push(Token::Ampersand);
        } else {
            out.push(Token::Word(word));
        }
        self.quoted = false;
    }
}

/// Performs lexical analysis of one command line.
pub fn split_into_tokens(line: &str) -> Result<Vec<Token>, LexingError> {
    LexingFSM::new(line).make_tokens()
}
