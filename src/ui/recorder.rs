//! Terminal user interface for the microphone recorder.
//!
//! Shows the input device list, the live trace drawn by the render loop, and
//! a footer with the elapsed time and the start/stop controls.

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    style::{Color, Modifier, Style},
    symbols::Marker,
    widgets::{
        canvas::{Canvas as CanvasWidget, Line as CanvasLine},
        Block, Borders, List, ListItem, ListState, Paragraph,
    },
};
use std::error::Error;
use std::io::{stdout, Stdout};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::platform::DeviceInfo;
use crate::render::TraceCanvas;
use crate::session::{format_time, SessionView};

const ACCENT: Color = Color::Rgb(206, 224, 220);
const MUTED: Color = Color::Rgb(90, 100, 104);

/// User input command in the recorder screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderCommand {
    /// No key, or a key without a binding
    Continue,
    SelectPrevious,
    SelectNext,
    /// Start recording ('r' or Enter)
    Start,
    /// Stop recording ('s' or Space)
    Stop,
    /// Leave the recorder (Escape, 'q' or Ctrl+C)
    Quit,
}

#[derive(Debug, Clone)]
struct ControlState {
    start_enabled: bool,
    stop_enabled: bool,
    elapsed: String,
}

/// Control panel state the session controller writes to.
#[derive(Debug, Clone)]
pub struct PanelView {
    state: Arc<Mutex<ControlState>>,
}

impl Default for PanelView {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(ControlState {
                start_enabled: true,
                stop_enabled: false,
                elapsed: format_time(0),
            })),
        }
    }
}

impl PanelView {
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn start_enabled(&self) -> bool {
        self.lock().start_enabled
    }

    pub fn stop_enabled(&self) -> bool {
        self.lock().stop_enabled
    }

    pub fn elapsed(&self) -> String {
        self.lock().elapsed.clone()
    }
}

impl SessionView for PanelView {
    fn set_recording_controls(&self, recording: bool) {
        let mut state = self.lock();
        state.start_enabled = !recording;
        state.stop_enabled = recording;
    }

    fn show_elapsed(&self, text: &str) {
        self.lock().elapsed = text.to_string();
    }
}

/// Terminal UI of the recorder.
pub struct MicmonTui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    devices: Vec<DeviceInfo>,
    list_state: ListState,
    canvas: TraceCanvas,
    panel: PanelView,
    status: Option<String>,
}

impl MicmonTui {
    /// Creates a new TUI instance and enters alternate screen mode.
    ///
    /// # Errors
    /// - If terminal cannot be initialized
    /// - If raw mode cannot be enabled
    /// - If alternate screen cannot be entered
    pub fn new(
        devices: Vec<DeviceInfo>,
        selected: usize,
        canvas: TraceCanvas,
        panel: PanelView,
    ) -> Result<Self, Box<dyn Error>> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        let mut list_state = ListState::default();
        if !devices.is_empty() {
            list_state.select(Some(selected.min(devices.len() - 1)));
        }

        Ok(MicmonTui {
            terminal,
            devices,
            list_state,
            canvas,
            panel,
            status: None,
        })
    }

    /// The highlighted device, if the snapshot is not empty.
    pub fn selected_device(&self) -> Option<&DeviceInfo> {
        self.list_state.selected().and_then(|i| self.devices.get(i))
    }

    pub fn select_next(&mut self) {
        if let Some(i) = self.list_state.selected() {
            self.list_state.select(Some((i + 1) % self.devices.len()));
        }
    }

    pub fn select_previous(&mut self) {
        if let Some(i) = self.list_state.selected() {
            let len = self.devices.len();
            self.list_state.select(Some((i + len - 1) % len));
        }
    }

    /// Sets or clears the message shown above the footer.
    pub fn set_status(&mut self, status: Option<String>) {
        self.status = status;
    }

    /// Draws one frame.
    ///
    /// # Errors
    /// - If terminal rendering fails
    pub fn render(&mut self) -> Result<(), Box<dyn Error>> {
        let recording = self.panel.stop_enabled();
        let start_enabled = self.panel.start_enabled();
        let elapsed = self.panel.elapsed();
        let status = self.status.clone();
        let canvas = self.canvas.clone();

        let items: Vec<ListItem> = self
            .devices
            .iter()
            .map(|d| {
                let suffix = if d.is_default { " [DEFAULT]" } else { "" };
                ListItem::new(format!("{}{}", d.label, suffix))
            })
            .collect();
        let list_height = (items.len().max(1) as u16 + 2).min(8);

        self.terminal.draw(|frame| {
            let [devices_area, trace_area, status_area, footer_area] = Layout::vertical([
                Constraint::Length(list_height),
                Constraint::Min(3),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .areas(frame.area());

            let list_style = if recording {
                Style::default().fg(MUTED)
            } else {
                Style::default().fg(ACCENT)
            };
            let list = List::new(items)
                .block(Block::default().borders(Borders::ALL).title(" Input device "))
                .style(list_style)
                .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
                .highlight_symbol("> ");
            frame.render_stateful_widget(list, devices_area, &mut self.list_state);

            let block = Block::default().borders(Borders::ALL);
            let inner = block.inner(trace_area);
            canvas.resize(inner.width as f64, inner.height as f64);
            let points = canvas.points();
            let (width, height) = (inner.width.max(1) as f64, inner.height.max(1) as f64);
            let trace = CanvasWidget::default()
                .block(block)
                .marker(Marker::Braille)
                .x_bounds([0.0, width])
                .y_bounds([0.0, height])
                .paint(move |ctx| {
                    for pair in points.windows(2) {
                        ctx.draw(&CanvasLine {
                            x1: pair[0].0,
                            y1: pair[0].1,
                            x2: pair[1].0,
                            y2: pair[1].1,
                            color: ACCENT,
                        });
                    }
                });
            frame.render_widget(trace, trace_area);

            if let Some(message) = &status {
                let line = Paragraph::new(message.as_str()).style(Style::default().fg(Color::Red));
                frame.render_widget(line, status_area);
            }

            let indicator = if recording {
                Span::styled("● ", Style::default().fg(Color::Red))
            } else {
                Span::styled("○ ", Style::default().fg(MUTED))
            };
            let footer = Line::from(vec![
                indicator,
                Span::raw(elapsed),
                Span::raw("   "),
                affordance("[r] start", start_enabled),
                Span::raw("  "),
                affordance("[s] stop", recording),
                Span::raw("  "),
                Span::styled("[q] quit", Style::default().fg(MUTED)),
            ]);
            frame.render_widget(
                Paragraph::new(footer).style(Style::default().fg(ACCENT).bg(Color::Rgb(0, 0, 0))),
                footer_area,
            );
        })?;

        Ok(())
    }

    /// Waits up to `timeout` for a key and returns the matching command.
    ///
    /// # Errors
    /// - If event polling fails
    pub fn handle_input(&mut self, timeout: Duration) -> Result<RecorderCommand, Box<dyn Error>> {
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    return Ok(RecorderCommand::Continue);
                }
                return Ok(match key.code {
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        tracing::debug!("Ctrl+C pressed: leaving recorder");
                        RecorderCommand::Quit
                    }
                    KeyCode::Char('q') | KeyCode::Esc => {
                        tracing::debug!("Escape or 'q' pressed: leaving recorder");
                        RecorderCommand::Quit
                    }
                    KeyCode::Char('r') | KeyCode::Enter => RecorderCommand::Start,
                    KeyCode::Char('s') | KeyCode::Char(' ') => RecorderCommand::Stop,
                    KeyCode::Up | KeyCode::Char('k') => RecorderCommand::SelectPrevious,
                    KeyCode::Down | KeyCode::Char('j') => RecorderCommand::SelectNext,
                    _ => RecorderCommand::Continue,
                });
            }
        }
        Ok(RecorderCommand::Continue)
    }

    /// Cleans up terminal state and exits alternate screen mode.
    ///
    /// # Errors
    /// - If terminal mode cannot be disabled
    /// - If cursor cannot be shown
    pub fn cleanup(&mut self) -> Result<(), Box<dyn Error>> {
        disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            crossterm::terminal::LeaveAlternateScreen
        )?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

fn affordance(label: &'static str, enabled: bool) -> Span<'static> {
    if enabled {
        Span::styled(label, Style::default().fg(ACCENT).add_modifier(Modifier::BOLD))
    } else {
        Span::styled(label, Style::default().fg(MUTED))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_controls_are_mutually_exclusive() {
        let panel = PanelView::default();
        assert!(panel.start_enabled());
        assert!(!panel.stop_enabled());
        assert_eq!(panel.elapsed(), "00:00");

        panel.set_recording_controls(true);
        assert!(!panel.start_enabled());
        assert!(panel.stop_enabled());

        panel.show_elapsed("01:05");
        panel.set_recording_controls(false);
        assert!(panel.start_enabled());
        assert!(!panel.stop_enabled());
        assert_eq!(panel.elapsed(), "01:05");
    }
}
