use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::app::{ProgressEvent, ProgressSink, Stage};
use crate::error::GseaError;

const EVENTS_MAX: usize = 8;
const GENERAL: &str = "-";

#[derive(Debug, Clone)]
struct DatasetRow {
    stage: Stage,
    message: String,
    elapsed: Option<Duration>,
    attempts: u32,
}

#[derive(Debug)]
struct DashboardState {
    rows: BTreeMap<String, DatasetRow>,
    events: VecDeque<String>,
    started: Instant,
}

impl DashboardState {
    fn count(&self, stage: Stage) -> usize {
        self.rows.values().filter(|row| row.stage == stage).count()
    }
}

/// Full-screen batch dashboard. The work runs on a background thread and
/// reports through the [`ProgressSink`] handed to it.
pub struct Tui {
    title: String,
    state: Arc<Mutex<DashboardState>>,
}

struct TuiProgress {
    state: Arc<Mutex<DashboardState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let key = event
            .dataset
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| GENERAL.to_string());
        let message = event.message.trim().to_string();
        if event.dataset.is_some() {
            let row = state.rows.entry(key.clone()).or_insert(DatasetRow {
                stage: event.stage,
                message: String::new(),
                elapsed: None,
                attempts: 0,
            });
            if event.stage == Stage::Attempt {
                row.attempts = row.attempts.saturating_add(1);
            }
            row.stage = event.stage;
            row.message = message.clone();
            if event.elapsed.is_some() {
                row.elapsed = event.elapsed;
            }
        }
        let line = format!("[{}] {key}: {message}", chrono::Local::now().format("%H:%M:%S"));
        state.events.push_back(line);
        while state.events.len() > EVENTS_MAX {
            state.events.pop_front();
        }
    }
}

impl Tui {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            state: Arc::new(Mutex::new(DashboardState {
                rows: BTreeMap::new(),
                events: VecDeque::new(),
                started: Instant::now(),
            })),
        }
    }

    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, GseaError> + Send + 'static,
        R: Send + 'static,
    {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_dashboard(frame, &self.title, &state, tick))
                    .into_diagnostic()?;
            }

            if let Ok(result) = rx.try_recv() {
                restore_terminal()?;
                handle.join().ok();
                return result.map_err(miette::Report::new);
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if key.kind == KeyEventKind::Press
                        && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                    {
                        break;
                    }
                }
            }
            tick = tick.wrapping_add(1);
        }

        restore_terminal()?;
        Err(miette::Report::msg("aborted; running GSEA jobs were detached"))
    }
}

fn restore_terminal() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    io::stdout().execute(LeaveAlternateScreen).into_diagnostic()?;
    Ok(())
}

fn draw_dashboard(frame: &mut ratatui::Frame, title: &str, state: &DashboardState, tick: usize) {
    let area = frame.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(EVENTS_MAX as u16 + 2),
        ])
        .split(area);

    frame.render_widget(draw_header(title, state, tick), chunks[0]);
    frame.render_widget(draw_rows(state), chunks[1]);
    frame.render_widget(draw_events(state), chunks[2]);
}

fn draw_header(title: &str, state: &DashboardState, tick: usize) -> Paragraph<'static> {
    let hb = if tick % 2 == 0 { "*" } else { " " };
    let finished = state.count(Stage::Succeeded) + state.count(Stage::Failed) + state.count(Stage::Skipped);
    let header_line = Line::from(vec![
        Span::styled(
            "GSEA-BATCH",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw(format!("   {title}   ")),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]);
    let counts = Line::from(vec![
        Span::styled(
            format!("{finished}/{} done  ", state.rows.len()),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!("ok {}  ", state.count(Stage::Succeeded)),
            Style::default().fg(Color::Green),
        ),
        Span::styled(
            format!("failed {}  ", state.count(Stage::Failed)),
            Style::default().fg(Color::Red),
        ),
        Span::styled(
            format!("skipped {}  ", state.count(Stage::Skipped)),
            Style::default().fg(Color::Yellow),
        ),
        Span::styled(
            format!("elapsed {}s   q: abort", state.started.elapsed().as_secs()),
            Style::default().fg(Color::Gray),
        ),
    ]);
    Paragraph::new(vec![header_line, counts])
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_rows(state: &DashboardState) -> Paragraph<'static> {
    let mut lines = vec![Line::from(Span::styled(
        format!("{:<16} {:<10} {:>4} {:>8}  {}", "DATASET", "STAGE", "TRY", "TIME", "STATUS"),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    ))];
    for (id, row) in &state.rows {
        let elapsed = row
            .elapsed
            .map(|value| format!("{:.1}s", value.as_secs_f64()))
            .unwrap_or_else(|| "--".to_string());
        lines.push(Line::from(vec![
            Span::raw(format!("{id:<16} ")),
            Span::styled(
                format!("{:<10}", stage_label(row.stage)),
                Style::default().fg(stage_color(row.stage)),
            ),
            Span::raw(format!(" {:>4} {elapsed:>8}  {}", row.attempts, row.message)),
        ]));
    }
    Paragraph::new(lines).block(Block::default().borders(Borders::BOTTOM))
}

fn draw_events(state: &DashboardState) -> Paragraph<'static> {
    let mut lines = vec![Line::from(Span::styled(
        "Recent events:",
        Style::default().fg(Color::Gray),
    ))];
    for event in &state.events {
        lines.push(Line::from(format!("- {event}")));
    }
    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Queued => "queued",
        Stage::Prepare => "prepare",
        Stage::Attempt => "running",
        Stage::Succeeded => "ok",
        Stage::Failed => "failed",
        Stage::Skipped => "skipped",
        Stage::Info => "info",
    }
}

fn stage_color(stage: Stage) -> Color {
    match stage {
        Stage::Succeeded => Color::Green,
        Stage::Failed => Color::Red,
        Stage::Skipped => Color::Yellow,
        Stage::Attempt | Stage::Prepare => Color::Cyan,
        Stage::Queued | Stage::Info => Color::Gray,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DatasetId;

    #[test]
    fn progress_updates_rows_and_events() {
        let tui = Tui::new("run");
        let sink = TuiProgress {
            state: tui.state.clone(),
        };
        let id: DatasetId = "GSE1".parse().unwrap();
        sink.event(ProgressEvent::new(Some(&id), Stage::Queued, "queued"));
        sink.event(ProgressEvent::new(Some(&id), Stage::Attempt, "attempt 1/2"));
        sink.event(ProgressEvent::new(Some(&id), Stage::Attempt, "attempt 2/2"));
        sink.event(ProgressEvent::info("note"));

        let state = tui.state.lock().unwrap();
        let row = &state.rows["GSE1"];
        assert_eq!(row.stage, Stage::Attempt);
        assert_eq!(row.attempts, 2);
        assert_eq!(state.rows.len(), 1);
        assert_eq!(state.events.len(), 4);
    }
}
