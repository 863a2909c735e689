//! Reading prompts from the command line and the terminal.

use std::io::Read;

use tokio::io::{AsyncBufRead, Lines};

use crate::error::{Error, Result};

/// A line holding only this marks the end of a chat turn.
pub const SENTINEL: &str = ".";

/// Separates piped input from the appended question.
const APPEND_SEPARATOR: &str = "\n\n\n";

/// Resolve the single-shot prompt.
///
/// A positional prompt is used as is, and a blank one is an error; stdin is
/// not consulted. Otherwise all of `stdin` is read and trimmed, and `append`
/// is added after it. Nothing at all is an error.
pub fn resolve_prompt<R: Read>(
    positional: Option<String>,
    mut stdin: R,
    append: Option<&str>,
) -> Result<String> {
    if let Some(prompt) = positional {
        if prompt.trim().is_empty() {
            return Err(Error::MissingPrompt);
        }
        return Ok(prompt);
    }

    let mut piped = String::new();
    stdin.read_to_string(&mut piped)?;

    let parts: Vec<&str> = [Some(piped.trim()), append.map(str::trim)]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        return Err(Error::MissingPrompt);
    }
    Ok(parts.join(APPEND_SEPARATOR))
}

/// Read one chat turn: lines up to the [`SENTINEL`], joined by newlines.
///
/// Returns `None` once input is exhausted and nothing was typed. Text typed
/// right before end of input is returned as a final turn.
pub async fn read_turn<R>(lines: &mut Lines<R>) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut turn: Vec<String> = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end_matches('\r');
        if line == SENTINEL {
            return Ok(Some(turn.join("\n")));
        }
        turn.push(line.to_string());
    }

    if turn.is_empty() {
        Ok(None)
    } else {
        Ok(Some(turn.join("\n")))
    }
}
