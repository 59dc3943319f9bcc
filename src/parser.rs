use crate::lexer::Token;

/// A command line ready to be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name followed by its arguments.
    pub argv: Vec<String>,
    /// The line ended with a bare `&`.
    pub background: bool,
    /// The line as typed, without its trailing newline.
    pub line: String,
}

impl Invocation {
    pub fn name(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> Vec<&str> {
        self.argv[1..].iter().map(String::as_str).collect()
    }
}

/// Builds an [`Invocation`] from the tokens of `line`.
///
/// Returns `None` for a line without words. Only a trailing `&` requests a
/// background job; anywhere else it is passed to the program as an argument.
pub fn construct_invocation(tokens: Vec<Token>, line: &str) -> Option<Invocation> {
    let mut tokens = tokens;
    let background = tokens.last() == Some(&Token::Ampersand);
    if background {
        tokens.pop();
    }

    let argv: Vec<String> = tokens
        .into_iter()
        .map(|token| match token {
            Token::Word(word) => word,
            Token::Ampersand => "&".to_string(),
        })
        .collect();

    if argv.is_empty() {
        return None;
    }

    Some(Invocation {
        argv,
        background,
        line: line.trim_end_matches(['\n', '\r']).to_string(),
    })
}
