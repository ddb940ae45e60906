mod export;
mod help;
mod state;

use crate::cli::{self, Cli};
use crate::model::{BatchEvent, LogEntry, LogLevel, RunResult, RunState};
use crate::orchestrator::{self, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Tabs},
    Terminal,
};
use state::{UiState, TAB_COUNT, TAB_DASHBOARD, TAB_HELP, TAB_LOG};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

const PAGE: usize = 10;

pub async fn run(args: Cli) -> Result<()> {
    let inputs = cli::collect_inputs(&args)?;
    let cfg = cli::build_config(&args, &inputs);

    // Unbounded channels avoid backpressure between the worker and the render loop.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<BatchEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let mut state = UiState::new(&cfg, inputs.scripts, inputs.scenes);
    for notice in inputs.notices {
        state.push_log(notice);
    }
    state.push_log(LogEntry::new(
        LogLevel::Info,
        format!(
            "Loaded {} script files and {} scene files.",
            cfg.scripts.len(),
            cfg.scenes.len()
        ),
    ));

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_args = args.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(ui_args, state, event_rx, cmd_tx));

    let hosts = cli::host_factory(&cfg);
    let res =
        orchestrator::run_controller(&cfg, hosts, args.start_on_launch, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(
    args: Cli,
    mut state: UiState,
    mut event_rx: UnboundedReceiver<BatchEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let mut quitting = false;
    let res = loop {
        let orchestrator_done = drain_events(&args, &mut state, &mut event_rx);
        if quitting && orchestrator_done {
            break Ok(());
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match (k.modifiers, k.code) {
                    (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                        // A second press while the run winds down leaves immediately.
                        if quitting || !state.run_state.is_active() {
                            let _ = cmd_tx.send(UiCommand::Quit);
                            break Ok(());
                        }
                        quitting = true;
                        state.info = "Stopping the current run before quitting… (q again to force)".into();
                        let _ = cmd_tx.send(UiCommand::Quit);
                    }
                    (_, KeyCode::Enter) | (_, KeyCode::Char('p')) => {
                        if state.run_state.is_active() {
                            state.info = "Already processing.".into();
                        } else {
                            state.info = "Start requested…".into();
                            let _ = cmd_tx.send(state.start_command());
                        }
                    }
                    (_, KeyCode::Char('x')) | (_, KeyCode::Esc) => {
                        if state.run_state == RunState::Running {
                            state.info = "Abort requested…".into();
                            let _ = cmd_tx.send(UiCommand::Abort);
                        }
                    }
                    (_, KeyCode::Char('s')) => state.toggle_save(),
                    (_, KeyCode::Char('c')) => state.clear_log(),
                    (_, KeyCode::Char('y')) => {
                        if state.log.is_empty() {
                            state.info = "Log is empty, nothing to copy.".into();
                        } else {
                            match export::copy_to_clipboard(&state.log.to_text()) {
                                Ok(_) => {
                                    state.info =
                                        format!("✓ Copied {} log lines to clipboard", state.log.len())
                                }
                                Err(e) => state.info = format!("Clipboard copy failed: {e:#}"),
                            }
                        }
                    }
                    (_, KeyCode::Char('e')) => match export::export_log(&state.log, &state.run_id) {
                        Ok(p) => state.info = format!("Exported log: {}", p.display()),
                        Err(e) => state.info = format!("Log export failed: {e:#}"),
                    },
                    (_, KeyCode::Tab) => {
                        state.tab = (state.tab + 1) % TAB_COUNT;
                    }
                    (_, KeyCode::Char('?')) => {
                        state.tab = TAB_HELP;
                    }
                    (_, KeyCode::Up) | (_, KeyCode::Char('k')) => {
                        if state.tab == TAB_DASHBOARD {
                            state.select_prev();
                        } else {
                            state.scroll_up(1);
                        }
                    }
                    (_, KeyCode::Down) | (_, KeyCode::Char('j')) => {
                        if state.tab == TAB_DASHBOARD {
                            state.select_next();
                        } else {
                            state.scroll_down(1);
                        }
                    }
                    (_, KeyCode::Left)
                    | (_, KeyCode::Right)
                    | (_, KeyCode::Char('h'))
                    | (_, KeyCode::Char('l')) => {
                        if state.tab == TAB_DASHBOARD {
                            state.switch_focus();
                        }
                    }
                    (_, KeyCode::Char('d')) | (_, KeyCode::Delete) => {
                        if state.tab == TAB_DASHBOARD {
                            state.remove_selected();
                        }
                    }
                    (_, KeyCode::Char('D')) => {
                        if state.tab == TAB_DASHBOARD {
                            state.clear_focused();
                        }
                    }
                    (_, KeyCode::PageUp) => state.scroll_up(PAGE),
                    (_, KeyCode::PageDown) => state.scroll_down(PAGE),
                    (_, KeyCode::End) => state.log_scroll = 0,
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

/// Apply every pending event without blocking. Returns `true` once the orchestrator has gone
/// away and nothing is left to read.
fn drain_events(args: &Cli, state: &mut UiState, event_rx: &mut UnboundedReceiver<BatchEvent>) -> bool {
    loop {
        match event_rx.try_recv() {
            Ok(BatchEvent::RunCompleted { result }) => handle_run_completed(args, state, *result),
            Ok(other) => state.apply_event(other),
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Disconnected) => return true,
        }
    }
}

fn handle_run_completed(args: &Cli, state: &mut UiState, r: RunResult) {
    let processed = orchestrator::process_run_completion(args, &state.log, &r);
    let level = if processed.export_failed {
        LogLevel::Error
    } else {
        LogLevel::Info
    };
    for msg in processed.export_messages {
        state.push_log(LogEntry::new(level, msg));
    }

    state.info = crate::text_summary::build_text_summary(&r)
        .lines
        .into_iter()
        .next()
        .unwrap_or_default();
    state.last_result = Some(r);
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![
        Line::from("Dashboard"),
        Line::from(format!("Log ({})", state.log.len())),
        Line::from("Help"),
    ])
    .select(state.tab)
    .block(Block::default().borders(Borders::ALL).title("scene-batch"))
    .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        TAB_DASHBOARD => draw_dashboard(chunks[1], f, state),
        TAB_LOG => draw_log(chunks[1], f, state, "Log"),
        _ => help::draw_help(chunks[1], f),
    }
}

fn draw_dashboard(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage(40), // Script and scene lists (side-by-side)
                Constraint::Length(3),      // Options
                Constraint::Length(3),      // Progress gauge
                Constraint::Min(5),         // Recent log
                Constraint::Length(3),      // Status
            ]
            .as_ref(),
        )
        .split(area);

    let lists = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(main[0]);

    for (list, title, area) in [
        (&state.scripts, "Scripts", lists[0]),
        (&state.scenes, "Scenes", lists[1]),
    ] {
        let focused = list.kind() == state.focus;
        let selected = focused.then_some(state.selected);
        let border = if focused {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        let p = Paragraph::new(state::file_lines(list.paths(), selected)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border)
                .title(format!("{title} - {}", list.len())),
        );
        f.render_widget(p, area);
    }

    let state_color = match state.run_state {
        RunState::Idle => Color::Gray,
        RunState::Running => Color::Green,
        RunState::Aborting => Color::Yellow,
        RunState::Completed => Color::Cyan,
        RunState::Aborted => Color::Red,
    };
    let mut option_spans = vec![
        Span::styled("Save after processing: ", Style::default().fg(Color::Gray)),
        Span::raw(if state.save_after { "[x]" } else { "[ ]" }),
        Span::styled("   Pairing: ", Style::default().fg(Color::Gray)),
        Span::raw(state::pairing_label(state.pairing)),
        Span::styled("   State: ", Style::default().fg(Color::Gray)),
        Span::styled(
            state.run_state.label(),
            Style::default()
                .fg(state_color)
                .add_modifier(Modifier::BOLD),
        ),
    ];
    if let Some(r) = state.last_result.as_ref() {
        option_spans.push(Span::styled("   Last run: ", Style::default().fg(Color::Gray)));
        option_spans.push(Span::raw(format!(
            "{}/{} processed, {} failed",
            r.processed_items,
            r.total_items,
            r.failed_items.len()
        )));
    }
    let options = Paragraph::new(Line::from(option_spans))
        .block(Block::default().borders(Borders::ALL).title("Options"));
    f.render_widget(options, main[1]);

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(state.progress_ratio())
        .label(state.progress_label());
    f.render_widget(gauge, main[2]);

    draw_log(main[3], f, state, "Recent log");

    let status = Paragraph::new(vec![
        Line::from(state.info.clone()),
        Line::from(vec![
            Span::styled("Enter", Style::default().fg(Color::Magenta)),
            Span::raw(" process  "),
            Span::styled("x", Style::default().fg(Color::Magenta)),
            Span::raw(" abort  "),
            Span::styled("s", Style::default().fg(Color::Magenta)),
            Span::raw(" save toggle  "),
            Span::styled("?", Style::default().fg(Color::Magenta)),
            Span::raw(" help  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" quit"),
        ]),
    ])
    .block(Block::default().borders(Borders::TOP));
    f.render_widget(status, main[4]);
}

fn draw_log(area: Rect, f: &mut ratatui::Frame, state: &UiState, title: &str) {
    let entries = state.log.entries();
    let height = area.height.saturating_sub(2) as usize;
    let end = entries.len().saturating_sub(state.log_scroll);
    let start = end.saturating_sub(height);
    let lines: Vec<Line> = entries[start..end].iter().map(state::log_line).collect();

    let errors = state.log.count(LogLevel::Error);
    let warnings = state.log.count(LogLevel::Warning);
    let mut title_spans = vec![Span::raw(format!("{title} "))];
    if errors > 0 {
        title_spans.push(Span::styled(
            format!("{errors} errors "),
            Style::default().fg(state::level_color(LogLevel::Error)),
        ));
    }
    if warnings > 0 {
        title_spans.push(Span::styled(
            format!("{warnings} warnings "),
            Style::default().fg(state::level_color(LogLevel::Warning)),
        ));
    }
    if state.log_scroll > 0 {
        title_spans.push(Span::styled(
            format!("(scrolled {} up, End to follow)", state.log_scroll),
            Style::default().fg(Color::Gray),
        ));
    }

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(Line::from(title_spans)));
    f.render_widget(p, area);
}
