//! ASCII plotting for data-vs-model overlays.
//!
//! Fixed-size character grid with deterministic output:
//! - data bins: `o`
//! - model curve: `-` line

use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::error::AppError;
use crate::fit::{Overlay, Renderer};

/// Writes overlays as text files named `<name>_<label>_<axis>.txt` under `dir`.
#[derive(Debug, Clone)]
pub struct AsciiRenderer {
    pub dir: PathBuf,
    pub width: usize,
    pub height: usize,
}

impl AsciiRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            width: 72,
            height: 20,
        }
    }
}

impl Renderer for AsciiRenderer {
    fn render(&self, overlay: &Overlay) -> Result<(), AppError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| AppError::Io(format!("Failed to create plot dir '{}': {e}", self.dir.display())))?;
        let path = self.dir.join(format!("{}_{}_{}.txt", overlay.name, overlay.label, overlay.axis));
        fs::write(&path, render_overlay(overlay, self.width, self.height))
            .map_err(|e| AppError::Io(format!("Failed to write plot '{}': {e}", path.display())))?;
        info!(path = %path.display(), "wrote overlay");
        Ok(())
    }
}

/// Render an overlay as a string.
pub fn render_overlay(overlay: &Overlay, width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (x_min, x_max) = x_range(overlay).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = y_range(overlay).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    let curve: Vec<(f64, f64)> = overlay.bins.iter().map(|b| (b.center, b.model)).collect();
    draw_curve(&mut grid, &curve, x_min, x_max, y_min, y_max);

    for b in &overlay.bins {
        let x = map_x(b.center, x_min, x_max, width);
        let y = map_y(b.data, y_min, y_max, height);
        grid[y][x] = 'o';
    }

    let mut out = format!(
        "Plot: {} ({}) | {}=[{x_min:.3}, {x_max:.3}] | events=[{y_min:.2}, {y_max:.2}]\n",
        overlay.name, overlay.label, overlay.axis
    );
    for row in grid {
        out.push_str(row.into_iter().collect::<String>().trim_end());
        out.push('\n');
    }
    out
}

fn x_range(overlay: &Overlay) -> Option<(f64, f64)> {
    let min = overlay.bins.iter().map(|b| b.center).fold(f64::INFINITY, f64::min);
    let max = overlay.bins.iter().map(|b| b.center).fold(f64::NEG_INFINITY, f64::max);
    (min.is_finite() && max.is_finite() && max > min).then_some((min, max))
}

fn y_range(overlay: &Overlay) -> Option<(f64, f64)> {
    let values = overlay.bins.iter().flat_map(|b| [b.data, b.model]);
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    (min.is_finite() && max.is_finite() && max > min).then_some((min, max))
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let pad = ((max - min).abs() * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // row 0 is the top
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], x_min: f64, x_max: f64, y_min: f64, y_max: f64) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in curve {
        let col = map_x(x, x_min, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        match prev {
            Some((c0, r0)) => draw_line(grid, c0, r0, col, row, '-'),
            None => grid[row][col] = '-',
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
