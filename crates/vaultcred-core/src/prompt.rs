//! Interactive input.
//!
//! Prompting is the last resort of the cascade. The `Prompter` trait lets the
//! CLI swap the terminal for a non-blocking implementation in automation, and
//! lets tests script answers.

use std::io::{self, BufRead, Write};

pub trait Prompter {
    /// Ask for a value, echoing what the operator types.
    fn prompt(&self, text: &str) -> io::Result<String>;

    /// Ask for a value without echoing it.
    fn prompt_hidden(&self, text: &str) -> io::Result<String>;
}

/// Reads from the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt(&self, text: &str) -> io::Result<String> {
        // stderr keeps stdout clean for the assembled output
        eprint!("{}: ", text);
        io::stderr().flush()?;

        let mut input = String::new();
        io::stdin().lock().read_line(&mut input)?;
        Ok(input.trim().to_string())
    }

    fn prompt_hidden(&self, text: &str) -> io::Result<String> {
        let input = rpassword::prompt_password(format!("{}: ", text))?;
        Ok(input.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Never blocks. Every prompt yields empty input, which the resolver turns
/// into `MissingRequiredSetting`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn prompt(&self, _text: &str) -> io::Result<String> {
        Ok(String::new())
    }

    fn prompt_hidden(&self, _text: &str) -> io::Result<String> {
        Ok(String::new())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_interactive_yields_empty() {
        assert_eq!(NonInteractive.prompt("Vault address").unwrap(), "");
        assert_eq!(NonInteractive.prompt_hidden("Password").unwrap(), "");
    }
}
