//! Line parser for the interactive client.

use thiserror::Error;

use crate::command::{Command, Request};

pub const OPTIONS: &str = "   Commands:
          upload <file> ...................... upload <file> to server
          download <file> .................... download <file> from server
          remove <file> ...................... remove <file> from server
          replace <old file> <new file>  ..... replace <old file> by <new file> on server
          list ............................... list all files stored on server
          options ............................ show options (this menu)
          close .............................. close application";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Run(Request),
    Options,
    Blank,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("`{command}` takes {expected} file name(s), got {got}")]
    Arguments {
        command: Command,
        expected: usize,
        got: usize,
    },
}

/// Parse one line; command words are case-insensitive.
pub fn parse_line(line: &str) -> Result<Input, ParseError> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(Input::Blank);
    };
    let command = match word.to_ascii_lowercase().as_str() {
        "upload" => Command::Upload,
        "download" => Command::Download,
        "remove" => Command::Remove,
        "replace" => Command::Replace,
        "list" => Command::List,
        "close" => Command::Close,
        "options" => return Ok(Input::Options),
        _ => return Err(ParseError::Unknown(word.to_string())),
    };
    let names: Vec<String> = words.map(str::to_string).collect();
    if names.len() != command.arity() {
        return Err(ParseError::Arguments {
            command,
            expected: command.arity(),
            got: names.len(),
        });
    }
    Ok(Input::Run(Request::new(command, names)))
}
