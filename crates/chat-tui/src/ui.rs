use chat_core::{NotificationKind, Speaker};
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, FocusPane, InputMode};

const TOAST_WIDTH: u16 = 44;
const TOAST_HEIGHT: u16 = 4;

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // Empty or unclosed, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
                if found_close {
                    current_text.push_str("**");
                }
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Mask a secret, showing at most the last four characters
fn mask_key(key: &str) -> String {
    let char_count = key.chars().count();
    if char_count <= 4 {
        "*".repeat(char_count)
    } else {
        let masked_len = char_count - 4;
        let last_four: String = key.chars().skip(masked_len).collect();
        format!("{}...{}", "*".repeat(masked_len.min(20)), last_four)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(frame, header_area);

    let form_height = if app.show_credential_form() { 7 } else { 0 };
    let [form_area, chat_area, input_area] = Layout::vertical([
        Constraint::Length(form_height),
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(body_area);

    if form_height > 0 {
        render_credential_form(app, frame, form_area);
    }
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    render_toasts(app, frame, area);
}

fn render_header(frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" AI Chat Assistant ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ])
    .alignment(Alignment::Center);

    let header = Paragraph::new(title).style(Style::default().bg(Color::Black));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" INSERT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    let hints = match app.input_mode {
        InputMode::Normal => " i: type  j/k: scroll  q: quit ",
        InputMode::Editing if app.show_credential_form() => " Enter: send/save  Tab: switch field  Esc: normal ",
        InputMode::Editing => " Enter: send  Esc: normal  Ctrl+C: quit ",
    };

    let footer = Line::from(vec![
        Span::styled(mode_text, mode_style),
        Span::styled(hints, Style::default().fg(Color::DarkGray)),
        Span::styled(format!(" {} ", app.model), Style::default().fg(Color::Magenta)),
    ]);

    frame.render_widget(Paragraph::new(footer), area);
}

fn render_credential_form(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Credential;
    let border_color = if focused { Color::Yellow } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Enter your Perplexity API Key ");

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [instructions_area, _, input_area, _, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(inner);

    let instructions = Paragraph::new("Paste your API key below and press Enter to save it.")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, instructions_area);

    let display_text = if app.api_key_input.is_empty() {
        Span::styled("pplx-...", Style::default().fg(Color::DarkGray))
    } else {
        Span::styled(mask_key(&app.api_key_input), Style::default().fg(Color::Cyan))
    };
    frame.render_widget(Paragraph::new(Line::from(display_text)), input_area);

    if focused && app.input_mode == InputMode::Editing {
        let masked_width = mask_key(&app.api_key_input).chars().count() as u16;
        let cursor_x = masked_width.min(input_area.width.saturating_sub(1));
        frame.set_cursor_position((input_area.x + cursor_x, input_area.y));
    }

    let status = Paragraph::new(format!(
        "{} characters  [Save API Key: Enter]",
        app.api_key_input.chars().count()
    ))
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(status, status_area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);
    // Inner size minus borders, for scroll calculations
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let turns = app.session.conversation().turns();
    let chat_text = if turns.is_empty() && !app.is_waiting() {
        Text::from(Span::styled(
            "Ask me anything...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for (idx, turn) in turns.iter().enumerate() {
            let fade = if app.is_fading(idx) {
                Style::default().add_modifier(Modifier::DIM)
            } else {
                Style::default()
            };

            match turn.speaker() {
                Speaker::User => {
                    lines.push(
                        Line::from(Span::styled(
                            "You:",
                            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                        ))
                        .alignment(Alignment::Right)
                        .patch_style(fade),
                    );
                    for line in turn.text().lines() {
                        lines.push(
                            Line::from(line.to_string())
                                .style(Style::default().fg(Color::Cyan))
                                .alignment(Alignment::Right)
                                .patch_style(fade),
                        );
                    }
                }
                Speaker::Assistant => {
                    lines.push(
                        Line::from(Span::styled(
                            "AI:",
                            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                        ))
                        .patch_style(fade),
                    );
                    for line in turn.text().lines() {
                        lines.push(parse_markdown_line(line).patch_style(fade));
                    }
                }
            }
            lines.push(Line::default());
        }

        if app.is_waiting() {
            lines.push(Line::from(Span::styled(
                "AI:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let waiting = app.is_waiting();
    let focused = app.focus == FocusPane::Input && app.input_mode == InputMode::Editing;

    let (border_color, title) = if waiting {
        (Color::DarkGray, " Waiting for response... ")
    } else if focused {
        (Color::Yellow, " Message (Enter to send) ")
    } else {
        (Color::DarkGray, " Message ")
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scrolling keeps the cursor visible
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.query_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .query_input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let text_color = if waiting { Color::DarkGray } else { Color::Cyan };
    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(text_color))
        .block(input_block);

    frame.render_widget(input, area);

    if focused && !waiting {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_toasts(app: &App, frame: &mut Frame, area: Rect) {
    let width = TOAST_WIDTH.min(area.width);
    let x = area.x + area.width.saturating_sub(width + 1);

    // Newest on top, below the header
    for (slot, toast) in app.toasts.iter().rev().enumerate() {
        let y = area.y + 1 + slot as u16 * TOAST_HEIGHT;
        if y + TOAST_HEIGHT > area.y + area.height {
            break;
        }
        let toast_area = Rect::new(x, y, width, TOAST_HEIGHT);

        let color = match toast.notification.kind {
            NotificationKind::Success => Color::Green,
            NotificationKind::Error => Color::Red,
        };

        frame.render_widget(Clear, toast_area);
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .title(Span::styled(
                format!(" {} ", toast.notification.title),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ));
        let body = Paragraph::new(toast.notification.description.as_str())
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(body, toast_area);
    }
}
