//! Terminal plot sink
//!
//! Draws the tail of the corrected series as a one-line sparkline. Live mode
//! redraws the same line in place on every batch; one-shot mode draws once.

use breath_core::{BreathError, BreathResult, PlotSink};
use std::io::{self, Write};
use tracing::debug;

const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

pub struct LivePlot<W: Write + Send> {
    out: W,
    live: bool,
    width: usize,
    // Reused between redraws
    values: Vec<f64>,
    indices: Vec<u64>,
    line: String,
    renders: u64,
}

impl LivePlot<io::Stderr> {
    pub fn stderr(live: bool) -> Self {
        Self::new(io::stderr(), live, 72)
    }
}

impl<W: Write + Send> LivePlot<W> {
    pub fn new(out: W, live: bool, width: usize) -> Self {
        Self {
            out,
            live,
            width: width.max(1),
            values: Vec::with_capacity(width),
            indices: Vec::with_capacity(width),
            line: String::new(),
            renders: 0,
        }
    }

    pub fn renders(&self) -> u64 {
        self.renders
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn draw(&mut self) -> io::Result<()> {
        self.line.clear();
        sparkline(&self.values, &mut self.line);
        let (first, last) = match (self.indices.first(), self.indices.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => (0, 0),
        };
        if self.live {
            write!(self.out, "\r{} [{}..{}]", self.line, first, last)?;
        } else {
            writeln!(self.out, "{} [{}..{}]", self.line, first, last)?;
        }
        self.out.flush()
    }
}

impl<W: Write + Send> PlotSink for LivePlot<W> {
    fn render(&mut self, values: &[f64], indices: &[u64]) -> BreathResult<()> {
        if !self.live && self.renders > 0 {
            return Ok(());
        }
        if values.len() != indices.len() {
            return Err(BreathError::InvalidSignalData {
                reason: format!(
                    "plot got {} values for {} indices",
                    values.len(),
                    indices.len()
                ),
            });
        }

        let skip = values.len().saturating_sub(self.width);
        self.values.clear();
        self.values.extend_from_slice(&values[skip..]);
        self.indices.clear();
        self.indices.extend_from_slice(&indices[skip..]);

        self.draw().map_err(|e| BreathError::SinkError {
            sink: "plot".to_string(),
            reason: e.to_string(),
        })?;
        self.renders += 1;

        debug!(
            points = self.values.len(),
            first_index = ?self.indices.first(),
            last_index = ?self.indices.last(),
            renders = self.renders,
            "Plot redrawn"
        );
        Ok(())
    }
}

/// Append one level glyph per value, scaled to the values' own range
fn sparkline(values: &[f64], line: &mut String) {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = max - min;
    let top = (LEVELS.len() - 1) as f64;

    line.extend(values.iter().map(|&v| {
        let level = if span > f64::EPSILON && v.is_finite() {
            ((v - min) / span * top).round() as usize
        } else {
            LEVELS.len() / 2
        };
        LEVELS[level.min(LEVELS.len() - 1)]
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparkline_scales_to_range() {
        let mut line = String::new();
        sparkline(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0], &mut line);
        assert_eq!(line, "▁▂▃▄▅▆▇█");

        line.clear();
        sparkline(&[3.0, 3.0, 3.0], &mut line);
        assert_eq!(line, "▅▅▅");
    }

    #[test]
    fn test_live_redraws_in_place() {
        let mut plot = LivePlot::new(Vec::new(), true, 4);
        plot.render(&[0.0, 1.0], &[0, 1]).unwrap();
        plot.render(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0], &[0, 1, 2, 3, 4, 5]).unwrap();
        assert_eq!(plot.renders(), 2);

        let out = String::from_utf8(plot.into_inner()).unwrap();
        assert_eq!(out.matches('\r').count(), 2);
        assert!(!out.contains('\n'));
        // Only the last four points are drawn
        assert!(out.ends_with("▁▃▆█ [2..5]"));
    }

    #[test]
    fn test_one_shot_draws_once() {
        let mut plot = LivePlot::new(Vec::new(), false, 8);
        plot.render(&[1.0, 2.0], &[10, 11]).unwrap();
        plot.render(&[5.0, 6.0], &[12, 13]).unwrap();
        assert_eq!(plot.renders(), 1);

        let out = String::from_utf8(plot.into_inner()).unwrap();
        assert_eq!(out, "▁█ [10..11]\n");
    }

    #[test]
    fn test_mismatched_lengths() {
        let mut plot = LivePlot::new(Vec::new(), true, 8);
        assert!(plot.render(&[1.0, 2.0], &[0]).is_err());
    }
}
