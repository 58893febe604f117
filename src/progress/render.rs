use std::io::{self, Write};

use indicatif::{DecimalBytes, ProgressBar, ProgressStyle};
use log::debug;

/// Draws the transfer status. Called only from the reporter's background
/// thread, except for [`Render::conclude`] which the owner calls once after
/// that thread has stopped.
pub trait Render: Send {
    fn render(&mut self, written: u64, total: u64);

    fn conclude(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RenderStyle {
    /// Single status line rewritten in place
    #[default]
    Line,
    /// indicatif progress bar
    Bar,
    /// No output
    Quiet,
}

impl RenderStyle {
    pub fn renderer(self, total: u64) -> Box<dyn Render> {
        match self {
            RenderStyle::Line => Box::new(LineRenderer::new(io::stdout())),
            RenderStyle::Bar => Box::new(BarRenderer::new(total)),
            RenderStyle::Quiet => Box::new(QuietRenderer),
        }
    }
}

pub fn status_line(written: u64, total: u64) -> String {
    if total > 0 {
        format!(
            "Downloading... {} of {} complete",
            DecimalBytes(written),
            DecimalBytes(total)
        )
    } else {
        format!("Downloading... {} complete", DecimalBytes(written))
    }
}

/// Rewrites one terminal line: return to column 0, blank the previous
/// status, return again and print the new one. No trailing newline until
/// [`Render::conclude`].
pub struct LineRenderer<W> {
    out: W,
    width: usize,
}

impl<W: Write + Send> LineRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, width: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn draw(&mut self, line: &str) -> io::Result<()> {
        write!(self.out, "\r{}\r{}", " ".repeat(self.width), line)?;
        self.out.flush()
    }
}

impl<W: Write + Send> Render for LineRenderer<W> {
    fn render(&mut self, written: u64, total: u64) {
        let line = status_line(written, total);
        if let Err(e) = self.draw(&line) {
            debug!("failed to draw progress line: {e}");
        }
        self.width = line.chars().count();
    }

    fn conclude(&mut self) {
        if self.width == 0 {
            return;
        }
        if let Err(e) = writeln!(self.out).and_then(|_| self.out.flush()) {
            debug!("failed to end progress line: {e}");
        }
    }
}

pub struct BarRenderer {
    pb: ProgressBar,
}

impl BarRenderer {
    pub fn new(total: u64) -> Self {
        let (pb, template) = if total > 0 {
            (
                ProgressBar::new(total),
                "{msg} {bar:40} {bytes}/{total_bytes} ({bytes_per_sec})",
            )
        } else {
            (
                ProgressBar::new_spinner(),
                "{spinner} {msg} {bytes} ({bytes_per_sec})",
            )
        };
        match ProgressStyle::with_template(template) {
            Ok(style) => pb.set_style(style.progress_chars("=>-")),
            Err(e) => debug!("invalid progress template: {e}"),
        }
        pb.set_message("Downloading...");
        Self { pb }
    }
}

impl Render for BarRenderer {
    fn render(&mut self, written: u64, _total: u64) {
        self.pb.set_position(written);
    }

    fn conclude(&mut self) {
        self.pb.finish();
    }
}

pub struct QuietRenderer;

impl Render for QuietRenderer {
    fn render(&mut self, _written: u64, _total: u64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_uses_human_units() {
        assert_eq!(status_line(100, 900), "Downloading... 100 B of 900 B complete");
        assert_eq!(
            status_line(12_300_000, 45_000_000),
            "Downloading... 12.30 MB of 45.00 MB complete"
        );
        assert_eq!(status_line(512, 0), "Downloading... 512 B complete");
    }

    #[test]
    fn line_renderer_overwrites_previous_status() {
        let mut renderer = LineRenderer::new(Vec::new());
        renderer.render(100, 900);
        renderer.render(900, 900);
        renderer.conclude();

        let first = status_line(100, 900);
        let second = status_line(900, 900);
        let expected = format!(
            "\r\r{first}\r{}\r{second}\n",
            " ".repeat(first.chars().count())
        );
        assert_eq!(String::from_utf8(renderer.into_inner()).unwrap(), expected);
    }

    #[test]
    fn line_renderer_without_frames_prints_nothing() {
        let mut renderer = LineRenderer::new(Vec::new());
        renderer.conclude();
        assert!(renderer.into_inner().is_empty());
    }
}
