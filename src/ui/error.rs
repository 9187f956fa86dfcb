//! Full-screen error display.

use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Paragraph, Wrap},
};
use std::io::{self, Stdout};

const ERROR_BG: Color = Color::Rgb(160, 20, 20);

/// Shows an error message on a red screen until a key is pressed.
pub struct ErrorScreen {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    restored: bool,
}

impl ErrorScreen {
    /// Enters raw mode and the alternate screen.
    ///
    /// # Errors
    /// - If the terminal cannot be initialized
    pub fn new() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(ErrorScreen {
            terminal,
            restored: false,
        })
    }

    /// Displays `message`, one paragraph per line, centered and wrapped to
    /// 80% of the screen width. Returns once a key is pressed.
    ///
    /// # Errors
    /// - If terminal rendering or event polling fails
    pub fn show_error(&mut self, message: &str) -> anyhow::Result<()> {
        let mut lines: Vec<Line> = message
            .lines()
            .map(|line| Line::from(line.to_string()))
            .collect();
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            "Press any key to continue",
            Style::default().add_modifier(Modifier::DIM),
        )));

        loop {
            self.terminal.draw(|frame| {
                let area = frame.area();
                frame.render_widget(
                    Paragraph::new("").style(Style::default().bg(ERROR_BG)),
                    area,
                );

                let text_height = (lines.len() as u16).min(area.height);
                let [_, middle, _] = Layout::vertical([
                    Constraint::Fill(1),
                    Constraint::Length(text_height.saturating_mul(2)),
                    Constraint::Fill(1),
                ])
                .areas(area);
                let [_, text_area, _] = Layout::horizontal([
                    Constraint::Percentage(10),
                    Constraint::Percentage(80),
                    Constraint::Percentage(10),
                ])
                .areas(middle);

                let paragraph = Paragraph::new(lines.clone())
                    .style(Style::default().fg(Color::White).bg(ERROR_BG))
                    .alignment(Alignment::Center)
                    .wrap(Wrap { trim: true });
                frame.render_widget(paragraph, text_area);
            })?;

            if event::poll(std::time::Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Leaves the alternate screen and restores the terminal. Only the first
    /// call has an effect.
    ///
    /// # Errors
    /// - If terminal mode cannot be restored
    pub fn cleanup(&mut self) -> anyhow::Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for ErrorScreen {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}
