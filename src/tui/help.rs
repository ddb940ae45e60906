use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key_line(keys: &[&'static str], desc: &'static str) -> Line<'static> {
    let mut spans = vec![Span::raw("  ")];
    let mut width = 0;
    for (i, k) in keys.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" / "));
            width += 3;
        }
        spans.push(Span::styled(*k, Style::default().fg(Color::Magenta)));
        width += k.chars().count();
    }
    spans.push(Span::raw(" ".repeat(14usize.saturating_sub(width))));
    spans.push(Span::raw(desc));
    Line::from(spans)
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        key_line(&["q", "Ctrl-C"], "Quit (aborts a running batch and waits; press again to force)"),
        key_line(&["Enter", "p"], "Process all"),
        key_line(&["x", "Esc"], "Abort processing"),
        key_line(&["s"], "Toggle save scene files after processing"),
        key_line(&["←/→", "h/l"], "Switch between script and scene list"),
        key_line(&["↑/↓", "j/k"], "Select a file"),
        key_line(&["d", "Del"], "Remove selected file from the list"),
        key_line(&["D"], "Clear the focused list"),
        key_line(&["tab"], "Switch tabs"),
        key_line(&["?"], "Show this help"),
        Line::from(""),
        Line::from("Log tab:"),
        key_line(&["↑/↓", "j/k"], "Scroll"),
        key_line(&["PgUp/PgDn"], "Scroll a page"),
        key_line(&["End"], "Follow newest entries"),
        key_line(&["c"], "Clear log"),
        key_line(&["y"], "Copy log to clipboard"),
        key_line(&["e"], "Export log to a file"),
        Line::from(""),
        Line::from("Scripts:"),
        Line::from(vec![
            Span::raw("  The loaded scene is the map "),
            Span::styled("scene", Style::default().fg(Color::Cyan)),
            Span::raw(", its path the constant "),
            Span::styled("scene_path", Style::default().fg(Color::Cyan)),
            Span::raw("."),
        ]),
        Line::from(vec![
            Span::raw("  Long scripts should poll "),
            Span::styled("abort_requested()", Style::default().fg(Color::Cyan)),
            Span::raw(" and return early when it is true."),
        ]),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
