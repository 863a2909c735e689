//! Incremental rendering of streamed answers.
//!
//! The drawing strategy is picked once, when the [`Renderer`] is built:
//! - raw: every fragment is echoed as soon as it arrives
//! - words: only complete words are echoed, a partial word waits for more text
//! - markdown: the whole answer is re-formatted and redrawn on a fixed cadence

pub mod live;
pub mod markdown;

use std::io::{self, Write};
use std::time::Duration;

use crossterm::style::Stylize;
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::config::RenderMode;
use crate::error::Result;
use crate::protocol::{Endpoint, StreamRecord};
use live::LiveView;

/// Outcome of rendering one response.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// The full answer text, every fragment concatenated.
    pub text: String,
    /// Generation throughput from the final record, when computable.
    pub tokens_per_second: Option<f64>,
}

/// Splits streamed text into whole whitespace-terminated words.
#[derive(Debug, Default)]
pub struct WordSegmenter {
    pending: String,
}

impl WordSegmenter {
    /// Add a fragment and return the completed words it releases, if any.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        self.pending.push_str(fragment);
        let split = self
            .pending
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())?;
        let partial = self.pending.split_off(split);
        Some(std::mem::replace(&mut self.pending, partial))
    }

    /// Release whatever is still held back.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

enum Strategy {
    Raw,
    Words(WordSegmenter),
    Markdown(LiveView),
}

impl Strategy {
    fn new(mode: RenderMode, refresh: Duration) -> Self {
        match mode {
            RenderMode::Raw => Strategy::Raw,
            RenderMode::Words => Strategy::Words(WordSegmenter::default()),
            RenderMode::Markdown => Strategy::Markdown(LiveView::new(refresh)),
        }
    }

    fn push<W: Write>(&mut self, out: &mut W, fragment: &str, color: bool) -> io::Result<()> {
        match self {
            Strategy::Raw => echo(out, fragment, color),
            Strategy::Words(words) => match words.push(fragment) {
                Some(complete) => echo(out, &complete, color),
                None => Ok(()),
            },
            Strategy::Markdown(view) => view.push(out, fragment),
        }
    }

    fn finish<W: Write>(&mut self, out: &mut W, color: bool) -> io::Result<()> {
        match self {
            Strategy::Raw => out.write_all(b"\n"),
            Strategy::Words(words) => {
                if let Some(rest) = words.finish() {
                    echo(out, &rest, color)?;
                }
                out.write_all(b"\n")
            }
            Strategy::Markdown(view) => view.finish(out),
        }
    }
}

fn echo<W: Write>(out: &mut W, text: &str, color: bool) -> io::Result<()> {
    if color {
        write!(out, "{}", text.green())?;
    } else {
        out.write_all(text.as_bytes())?;
    }
    out.flush()
}

/// Draws streamed answers to a terminal (or any writer).
pub struct Renderer<W: Write> {
    out: W,
    mode: RenderMode,
    color: bool,
    refresh: Duration,
}

impl<W: Write> Renderer<W> {
    /// Build a renderer.
    ///
    /// `terminal` says whether `out` is an interactive terminal. Without one
    /// there is no color and the Markdown view falls back to raw output.
    pub fn new(out: W, mode: RenderMode, terminal: bool, refresh: Duration) -> Self {
        let mode = if !terminal && mode == RenderMode::Markdown {
            RenderMode::Raw
        } else {
            mode
        };
        Self {
            out,
            mode,
            color: terminal,
            refresh,
        }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Direct access to the output.
    pub fn out(&mut self) -> &mut W {
        &mut self.out
    }

    /// Write a dimmed one-line notice.
    pub fn notice(&mut self, text: &str) -> io::Result<()> {
        if self.color {
            writeln!(self.out, "{}", text.dark_grey())?;
        } else {
            writeln!(self.out, "{}", text)?;
        }
        self.out.flush()
    }

    /// Show the marker that asks for the next chat message.
    pub fn input_marker(&mut self) -> io::Result<()> {
        if self.color {
            write!(self.out, "{} ", ">>>".cyan())?;
        } else {
            write!(self.out, ">>> ")?;
        }
        self.out.flush()
    }

    /// Show the prompt and the model it is sent to.
    pub fn header(&mut self, model: &str, prompt: &str) -> io::Result<()> {
        let title = format!("── Prompt → {} ──", model);
        if self.color {
            writeln!(self.out, "{}", title.as_str().bold())?;
            writeln!(self.out, "{}", prompt.bold().cyan())?;
        } else {
            writeln!(self.out, "{}", title)?;
            writeln!(self.out, "{}", prompt)?;
        }
        writeln!(self.out)?;
        self.out.flush()
    }

    /// Consume a record stream, drawing fragments as they arrive.
    ///
    /// Records are drawn strictly in arrival order. A stream error aborts
    /// rendering and is returned as is.
    pub async fn render<S>(&mut self, records: S, endpoint: Endpoint) -> Result<Answer>
    where
        S: Stream<Item = Result<StreamRecord>>,
    {
        let mut records = std::pin::pin!(records);
        let mut strategy = Strategy::new(self.mode, self.refresh);
        let mut text = String::new();
        let mut last = None;

        while let Some(record) = records.next().await {
            let record = record?;
            let fragment = record.fragment(endpoint);
            if !fragment.is_empty() {
                text.push_str(fragment);
                strategy.push(&mut self.out, fragment, self.color)?;
            }
            last = Some(record);
        }
        strategy.finish(&mut self.out, self.color)?;

        let tokens_per_second = last.as_ref().and_then(StreamRecord::tokens_per_second);
        if let Some(tps) = tokens_per_second {
            let metric = format!("{:.1} tokens/s", tps);
            debug!("{} characters, {}", text.len(), metric);
            if self.color {
                writeln!(self.out, "{}", metric.as_str().dark_grey())?;
            } else {
                self.out.write_all(format!("{}\n", metric).as_bytes())?;
            }
        }
        self.out.flush()?;

        Ok(Answer {
            text,
            tokens_per_second,
        })
    }
}
