use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key_line(key: &'static str, pad: &'static str, desc: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(pad),
        Span::raw(desc),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        key_line("q", " / ", "Ctrl-C  Quit"),
        key_line("r", "           ", "Reset configuration"),
        key_line("k", "           ", "Close Cursor processes"),
        key_line("g", "           ", "Preview new identifiers (not saved)"),
        key_line("u", "           ", "Disable auto-update"),
        key_line("R", "           ", "Refresh status and configuration"),
        key_line("o", "           ", "Toggle read-only option for reset"),
        key_line("d", "           ", "Show/hide identifier values"),
        key_line("c", "           ", "Clear the activity log"),
        key_line("tab", "         ", "Switch tabs"),
        key_line("?", "           ", "Show this help"),
        Line::from(""),
        Line::from("Dialogs:"),
        key_line("y / n", "       ", "Answer confirmation and elevation prompts"),
        key_line("esc", "         ", "Dismiss the open dialog"),
        key_line("1-4", "         ", "Copy an identifier from the preview dialog"),
        Line::from(""),
        Line::from("Notes:"),
        Line::from("  Resetting while Cursor is running asks for confirmation first."),
        Line::from("  Operations that need administrator privileges offer an"),
        Line::from("  elevation prompt instead of failing outright."),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
