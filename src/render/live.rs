//! Live-updating Markdown view.
//!
//! The whole buffer is re-formatted and redrawn in place, at most once per
//! refresh interval. While streaming, only the tail that fits on screen is
//! drawn, since the cursor cannot move above the top of the terminal.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crossterm::{
    cursor::MoveToPreviousLine,
    queue,
    terminal::{self, Clear, ClearType},
};

use tracing::debug;

use super::markdown::{self, Line};

const FALLBACK_SIZE: (u16, u16) = (80, 24);

pub struct LiveView {
    buffer: String,
    refresh: Duration,
    last_draw: Instant,
    drawn_rows: u16,
    redraws: usize,
}

impl LiveView {
    pub fn new(refresh: Duration) -> Self {
        Self {
            buffer: String::new(),
            refresh,
            last_draw: Instant::now(),
            drawn_rows: 0,
            redraws: 0,
        }
    }

    /// Append a fragment and redraw if the refresh interval has passed.
    pub fn push<W: Write>(&mut self, out: &mut W, fragment: &str) -> io::Result<()> {
        self.buffer.push_str(fragment);
        if self.last_draw.elapsed() >= self.refresh {
            self.draw(out, false)?;
        }
        Ok(())
    }

    /// Draw the complete buffer one last time.
    pub fn finish<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        self.draw(out, true)?;
        debug!("Markdown view drawn {} times", self.redraws);
        Ok(())
    }

    #[cfg(test)]
    pub fn redraws(&self) -> usize {
        self.redraws
    }

    fn draw<W: Write>(&mut self, out: &mut W, full: bool) -> io::Result<()> {
        let (cols, rows) = terminal::size().unwrap_or(FALLBACK_SIZE);
        let lines = markdown::format(&self.buffer);
        let visible = if full {
            &lines[..]
        } else {
            tail(&lines, cols, usize::from(rows.saturating_sub(1)))
        };

        if self.drawn_rows > 0 {
            queue!(
                out,
                MoveToPreviousLine(self.drawn_rows),
                Clear(ClearType::FromCursorDown)
            )?;
        }
        markdown::write_lines(out, visible)?;
        out.flush()?;

        let drawn: usize = visible.iter().map(|line| line.rows(cols)).sum();
        self.drawn_rows = u16::try_from(drawn).unwrap_or(u16::MAX);
        self.last_draw = Instant::now();
        self.redraws += 1;
        Ok(())
    }
}

/// The longest suffix of `lines` that fits in `max_rows` terminal rows.
fn tail(lines: &[Line], cols: u16, max_rows: usize) -> &[Line] {
    let mut used = 0;
    let mut start = lines.len();
    for (i, line) in lines.iter().enumerate().rev() {
        used += line.rows(cols);
        if used > max_rows {
            break;
        }
        start = i;
    }
    &lines[start..]
}
