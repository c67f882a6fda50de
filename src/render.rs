//! Console drawing of the grid, the camera list and notices.

use std::io::{self, Write};

use crossterm::QueueableCommand;
use crossterm::style::{self, Attribute, Color, ResetColor, SetAttribute, SetForegroundColor};

use crate::camera::{Camera, CameraState};
use crate::grid::{GridLayout, Slot};
use crate::input::HELP;
use crate::notify::{Level, Notice};

/// Width of one grid cell in characters
const CELL_WIDTH: usize = 28;

/// Slots per row for each layout size
pub fn columns(layout: GridLayout) -> usize {
    match layout.size() {
        1 => 1,
        4 => 2,
        _ => 3,
    }
}

fn fit(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        format!("{:<width$}", text, width = width)
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('~');
        cut
    }
}

fn slot_cell(slot: &Slot) -> (String, Color) {
    match slot {
        Slot::Active { index, camera, name, .. } => {
            (format!("{} ● {} #{}", index + 1, name, camera), Color::Green)
        }
        Slot::Idle { index, camera, name, broken: true } => {
            (format!("{} ✖ {} #{} (failed)", index + 1, name, camera), Color::Red)
        }
        Slot::Idle { index, camera, name, broken: false } => {
            (format!("{} ○ {} #{}", index + 1, name, camera), Color::Grey)
        }
        Slot::Empty { index } => (format!("{} + add camera", index + 1), Color::DarkGrey),
    }
}

fn level_color(level: Level) -> Color {
    match level {
        Level::Info => Color::Cyan,
        Level::Success => Color::Green,
        Level::Warning => Color::Yellow,
        Level::Error => Color::Red,
    }
}

fn heading<W: Write>(out: &mut W, text: &str) -> io::Result<()> {
    out.queue(SetAttribute(Attribute::Bold))?;
    out.queue(style::Print(text))?;
    out.queue(SetAttribute(Attribute::Reset))?;
    out.queue(style::Print("\n"))?;
    Ok(())
}

/// `active` counts every streaming camera, including ones outside the grid
pub fn draw_grid<W: Write>(out: &mut W, slots: &[Slot], layout: GridLayout, active: usize) -> io::Result<()> {
    heading(out, &format!("Grid ({} slots, {} active)", layout, active))?;
    for row in slots.chunks(columns(layout)) {
        for (i, slot) in row.iter().enumerate() {
            if i > 0 {
                out.queue(style::Print(" │ "))?;
            }
            let (text, color) = slot_cell(slot);
            out.queue(SetForegroundColor(color))?;
            out.queue(style::Print(fit(&text, CELL_WIDTH)))?;
            out.queue(ResetColor)?;
        }
        out.queue(style::Print("\n"))?;
    }
    out.flush()
}

pub fn draw_cameras<W: Write>(out: &mut W, cameras: &[Camera]) -> io::Result<()> {
    heading(out, &format!("Cameras ({})", cameras.len()))?;
    if cameras.is_empty() {
        out.queue(style::Print("  (none)\n"))?;
    }
    for camera in cameras {
        let (status, color) = match camera.state {
            CameraState::Active => ("active", Color::Green),
            CameraState::Idle => ("idle", Color::Grey),
            CameraState::Error => ("error", Color::Red),
        };
        out.queue(style::Print(format!("  #{:<4} ", camera.id.to_string())))?;
        out.queue(SetForegroundColor(color))?;
        out.queue(style::Print(format!("{:<7}", status)))?;
        out.queue(ResetColor)?;
        out.queue(style::Print(format!(
            "{:<24} {:<5} {}{}\n",
            fit(&camera.name, 24),
            camera.source.kind().to_string(),
            camera.source.label(),
            if camera.auto_start { "  [auto]" } else { "" }
        )))?;
    }
    out.flush()
}

pub fn draw_notices<'a, W: Write>(out: &mut W, notices: impl Iterator<Item = &'a Notice>) -> io::Result<()> {
    for notice in notices {
        out.queue(SetForegroundColor(level_color(notice.level)))?;
        out.queue(style::Print(format!(
            "[{}] {}\n",
            notice.stamp.format("%H:%M:%S"),
            notice.message
        )))?;
        out.queue(ResetColor)?;
    }
    out.flush()
}

pub fn draw_help<W: Write>(out: &mut W) -> io::Result<()> {
    heading(out, "Commands")?;
    for line in HELP {
        out.queue(style::Print(format!("  {}\n", line)))?;
    }
    out.flush()
}
