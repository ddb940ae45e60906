use crate::lists::{FileKind, FileList};
use crate::logbook::LogBook;
use crate::model::{BatchEvent, LogEntry, LogLevel, Progress, RunConfig, RunResult, RunState};
use crate::orchestrator::UiCommand;
use crate::queue::Pairing;
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use std::path::PathBuf;

pub const TAB_DASHBOARD: usize = 0;
pub const TAB_LOG: usize = 1;
pub const TAB_HELP: usize = 2;
pub const TAB_COUNT: usize = 3;

pub struct UiState {
    pub tab: usize,
    pub run_id: String,
    pub run_state: RunState,
    pub save_after: bool,
    pub pairing: Pairing,
    pub scripts: FileList,
    pub scenes: FileList,
    /// List the selection keys act on.
    pub focus: FileKind,
    pub selected: usize,
    pub log: LogBook,
    /// Lines scrolled up from the newest entry; 0 follows the tail.
    pub log_scroll: usize,
    pub progress: Option<Progress>,
    pub info: String,
    pub last_result: Option<RunResult>,
}

impl UiState {
    pub fn new(cfg: &RunConfig, scripts: FileList, scenes: FileList) -> Self {
        Self {
            tab: TAB_DASHBOARD,
            run_id: cfg.run_id.clone(),
            run_state: RunState::Idle,
            save_after: cfg.save_after,
            pairing: cfg.pairing,
            scripts,
            scenes,
            focus: FileKind::Script,
            selected: 0,
            log: LogBook::default(),
            log_scroll: 0,
            progress: None,
            info: String::new(),
            last_result: None,
        }
    }

    pub fn apply_event(&mut self, ev: BatchEvent) {
        match ev {
            BatchEvent::StateChanged { state } => {
                if state == RunState::Running {
                    self.progress = None;
                    self.last_result = None;
                }
                self.info = format!("State: {}", state.label());
                self.run_state = state;
            }
            BatchEvent::Log(entry) => self.push_log(entry),
            BatchEvent::Progress(p) => self.progress = Some(p),
            BatchEvent::RunCompleted { result } => self.last_result = Some(*result),
        }
    }

    pub fn push_log(&mut self, entry: LogEntry) {
        // Keep the viewport anchored when the user has scrolled back.
        if self.log_scroll > 0 {
            self.log_scroll += 1;
        }
        self.log.push(entry);
    }

    pub fn toggle_save(&mut self) {
        if self.run_state.is_active() {
            self.info = "Save option is locked while processing.".into();
            return;
        }
        self.save_after = !self.save_after;
        let msg = if self.save_after {
            "Save scene files after processing is enabled."
        } else {
            "Save scene files after processing is disabled."
        };
        self.push_log(LogEntry::new(LogLevel::Info, msg));
    }

    pub fn start_command(&self) -> UiCommand {
        UiCommand::Start {
            scripts: self.scripts.paths().to_vec(),
            scenes: self.scenes.paths().to_vec(),
            save_after: self.save_after,
        }
    }

    pub fn focused(&self) -> &FileList {
        match self.focus {
            FileKind::Script => &self.scripts,
            FileKind::Scene => &self.scenes,
        }
    }

    fn focused_mut(&mut self) -> &mut FileList {
        match self.focus {
            FileKind::Script => &mut self.scripts,
            FileKind::Scene => &mut self.scenes,
        }
    }

    pub fn switch_focus(&mut self) {
        self.focus = match self.focus {
            FileKind::Script => FileKind::Scene,
            FileKind::Scene => FileKind::Script,
        };
        self.selected = 0;
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn select_next(&mut self) {
        let last = self.focused().len().saturating_sub(1);
        self.selected = (self.selected + 1).min(last);
    }

    fn lists_locked(&mut self) -> bool {
        if self.run_state.is_active() {
            self.info = "Lists are locked while processing.".into();
            return true;
        }
        false
    }

    pub fn remove_selected(&mut self) {
        if self.lists_locked() {
            return;
        }
        let index = self.selected;
        let Some(removed) = self.focused_mut().remove(index) else {
            return;
        };
        let label = self.focused().kind().label();
        self.push_log(LogEntry::new(
            LogLevel::Info,
            format!("Removed {} from {label}.", removed.display()),
        ));
        self.selected = self.selected.min(self.focused().len().saturating_sub(1));
    }

    pub fn clear_focused(&mut self) {
        if self.lists_locked() || self.focused().is_empty() {
            return;
        }
        self.focused_mut().clear();
        self.selected = 0;
        let label = self.focused().kind().label();
        self.push_log(LogEntry::new(LogLevel::Info, format!("Cleared {label}.")));
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
        self.log_scroll = 0;
        self.info = "Log cleared".into();
    }

    pub fn scroll_up(&mut self, n: usize) {
        let max = self.log.len().saturating_sub(1);
        self.log_scroll = (self.log_scroll + n).min(max);
    }

    pub fn scroll_down(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(n);
    }

    pub fn progress_label(&self) -> String {
        match self.progress.as_ref() {
            None => "Progress: 0%".into(),
            Some(p) => match p.eta {
                Some(eta) if p.processed < p.total => format!(
                    "Progress: {:.1}% ({}/{}) - Estimated time remaining: {}",
                    p.percent(),
                    p.processed,
                    p.total,
                    crate::metrics::format_hms(eta)
                ),
                _ => format!("Progress: {:.1}% ({}/{})", p.percent(), p.processed, p.total),
            },
        }
    }

    pub fn progress_ratio(&self) -> f64 {
        self.progress
            .as_ref()
            .map(|p| (p.percent() / 100.0).clamp(0.0, 1.0))
            .unwrap_or(0.0)
    }
}

pub fn pairing_label(p: Pairing) -> &'static str {
    match p {
        Pairing::Positional => "positional",
        Pairing::CrossProduct => "cross-product",
        Pairing::Strict => "strict",
    }
}

pub fn level_color(level: LogLevel) -> Color {
    match level {
        LogLevel::Info => Color::White,
        LogLevel::Loading => Color::Rgb(0x53, 0x9d, 0xd3),
        LogLevel::Running => Color::Green,
        LogLevel::Saving => Color::Rgb(0xc6, 0x87, 0xbe),
        LogLevel::Warning => Color::Rgb(0xff, 0xa5, 0x00),
        LogLevel::Error => Color::Rgb(0xf7, 0x40, 0x40),
    }
}

pub fn log_line(entry: &LogEntry) -> Line<'static> {
    let color = level_color(entry.level);
    Line::from(vec![
        Span::styled(
            format!("[{}] ", entry.timestamp),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!("{:<7} ", entry.level.as_str()),
            Style::default().fg(color),
        ),
        Span::styled(entry.message.clone(), Style::default().fg(color)),
    ])
}

/// File name padded to a common column, then the containing directory.
pub fn file_lines(paths: &[PathBuf], selected: Option<usize>) -> Vec<Line<'static>> {
    let names: Vec<String> = paths
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        })
        .collect();
    let width = names.iter().map(|n| n.chars().count()).max().unwrap_or(0) + 5;
    paths
        .iter()
        .zip(names)
        .enumerate()
        .map(|(i, (p, name))| {
            let dir = p
                .parent()
                .map(|d| d.display().to_string())
                .unwrap_or_default();
            let line = Line::from(vec![
                Span::raw(format!("{name:<width$}")),
                Span::styled(dir, Style::default().fg(Color::Gray)),
            ]);
            if selected == Some(i) {
                line.style(Style::default().add_modifier(Modifier::REVERSED))
            } else {
                line
            }
        })
        .collect()
}
