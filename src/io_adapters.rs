use anyhow::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{BufRead, Write};

/// Prompt printed before each command line.
pub const PROMPT: &str = "tsh> ";

/// Source of command lines for the read-eval loop.
///
/// Interactive sessions go through `rustyline` for editing and history; with
/// the prompt disabled lines are read from plain standard input, which is what
/// scripted drivers feed.
pub enum LineReader {
    Editor(DefaultEditor),
    Plain(std::io::Stdin),
}

impl LineReader {
    pub fn new(emit_prompt: bool) -> Result<Self> {
        if emit_prompt {
            Ok(LineReader::Editor(
                DefaultEditor::new().context("line editor error")?,
            ))
        } else {
            Ok(LineReader::Plain(std::io::stdin()))
        }
    }

    /// Next line without its newline, or `None` at end of input.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        match self {
            LineReader::Editor(editor) => loop {
                match editor.readline(PROMPT) {
                    Ok(line) => {
                        if !line.trim().is_empty() {
                            let _ = editor.add_history_entry(line.as_str());
                        }
                        return Ok(Some(line));
                    }
                    // Ctrl-C at the prompt discards the line being edited.
                    Err(ReadlineError::Interrupted) => continue,
                    Err(ReadlineError::Eof) => return Ok(None),
                    Err(err) => return Err(err).context("readline error"),
                }
            },
            LineReader::Plain(stdin) => {
                std::io::stdout().flush()?;
                let mut line = String::new();
                if stdin.lock().read_line(&mut line).context("read error")? == 0 {
                    return Ok(None);
                }
                let len = line.trim_end_matches(['\n', '\r']).len();
                line.truncate(len);
                Ok(Some(line))
            }
        }
    }
}
