use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
};
use tabchat_core::{Card, ChatRole, ChatTarget, TextDirection};
use crate::app::{App, InputMode};
use crate::markdown::render_markdown;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let input_lines = app.input.split('\n').count().clamp(1, 6) as u16;

    // Main layout: header, tabs, chat, input, footer
    let [header_area, tabs_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(input_lines + 2),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_tabs(app, frame, tabs_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    if app.input_mode == InputMode::Naming {
        render_name_prompt(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" tabchat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("{} ", app.ollama.model()),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_tabs(app: &App, frame: &mut Frame, area: Rect) {
    let active_style = Style::default().bg(Color::Blue).fg(Color::White).bold();
    let tab_style = Style::default().bg(Color::Black).fg(Color::Gray);

    let mut spans: Vec<Span> = Vec::new();
    for (i, name) in app.session.tabs().iter().enumerate() {
        let style = if app.session.active_index() == Some(i) {
            active_style
        } else {
            tab_style
        };
        let label = if i < 9 {
            format!(" {} {} ", i + 1, name)
        } else {
            format!(" {} ", name)
        };
        spans.push(Span::styled(label, style));
        spans.push(Span::raw(" "));
    }

    if let ChatTarget::Temporary = app.session.active() {
        spans.push(Span::styled(
            " Temporary chat ",
            Style::default().bg(Color::Magenta).fg(Color::White).add_modifier(Modifier::ITALIC),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Lines for one card: author, rendered body, copy hint
fn card_lines(card: &Card, copy_hint: bool) -> Vec<Line<'static>> {
    let author_style = match card.role {
        ChatRole::User => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ChatRole::Assistant if card.is_error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ChatRole::Assistant => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    };
    let alignment = match card.direction {
        TextDirection::Ltr => Alignment::Left,
        TextDirection::Rtl => Alignment::Right,
    };

    let mut lines = vec![Line::from(Span::styled(format!("{}:", card.role.display_name()), author_style))
        .alignment(alignment)];

    if card.is_error {
        lines.push(
            Line::from(Span::styled(card.raw.clone(), Style::default().fg(Color::Red)))
                .alignment(alignment),
        );
    } else {
        lines.extend(render_markdown(&card.raw).into_iter().map(|l| l.alignment(alignment)));
    }

    if copy_hint {
        lines.push(
            Line::from(Span::styled("[y] copy", Style::default().fg(Color::Blue)))
                .alignment(alignment),
        );
    }
    lines.push(Line::default());
    lines
}

/// Rows the chat text takes up once word-wrapped to `width`, counted by
/// the same wrapper the chat paragraph renders with
fn wrapped_height(text: &Text, width: u16) -> u16 {
    let rows = Paragraph::new(text.clone())
        .wrap(Wrap { trim: false })
        .line_count(width.max(1));
    u16::try_from(rows).unwrap_or(u16::MAX)
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if app.input_mode == InputMode::Normal {
            Color::Cyan
        } else {
            Color::DarkGray
        }))
        .title(format!(" {} ", app.active_title()));

    // Inner size minus borders, for scroll calculations
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let view = app.session.view();
    let last_copyable = app.session.last_copyable_index();

    let text = if view.is_empty() && !app.session.is_pending() {
        let hint = match app.session.active() {
            ChatTarget::Tab(_) => "Type a message and press Enter...",
            ChatTarget::Temporary => "Temporary chat: nothing here is saved.",
        };
        Text::from(Span::styled(hint, Style::default().fg(Color::DarkGray)))
    } else {
        let mut lines: Vec<Line> = Vec::new();
        for (i, card) in view.cards().iter().enumerate() {
            lines.extend(card_lines(card, last_copyable == Some(i)));
        }

        if app.session.is_pending() {
            lines.push(Line::from(Span::styled(
                "Ollama:",
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

    app.total_chat_lines = wrapped_height(&text, app.chat_width);
    if app.session.view_mut().take_scroll_request() {
        app.scroll_to_bottom();
    }
    app.chat_scroll = app.chat_scroll.min(app.max_chat_scroll());

    let chat = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, area);

    if app.total_chat_lines > app.chat_height {
        let mut scrollbar_state = ScrollbarState::new(app.max_chat_scroll() as usize)
            .position(app.chat_scroll as usize);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area,
            &mut scrollbar_state,
        );
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let title = if app.session.is_pending() {
        " Waiting for reply... "
    } else {
        " Message "
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::DarkGray }))
        .title(title);

    let input = Paragraph::new(app.input.as_str())
        .block(block)
        .style(Style::default().fg(Color::White));
    frame.render_widget(input, area);

    if editing {
        // Cursor row and column from the text before it
        let before: String = app.input.chars().take(app.input_cursor).collect();
        let row = before.matches('\n').count() as u16;
        let col = before.rsplit('\n').next().map(|s| s.chars().count()).unwrap_or(0) as u16;
        let max_row = area.height.saturating_sub(3);
        frame.set_cursor_position((
            area.x + 1 + col.min(area.width.saturating_sub(3)),
            area.y + 1 + row.min(max_row),
        ));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" EDIT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
        InputMode::Naming => (" NEW TAB ", Style::default().bg(Color::Magenta).fg(Color::White)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = if let Some(status) = &app.status {
        vec![Span::styled(format!(" {} ", status), Style::default().bg(Color::Black).fg(Color::Yellow))]
    } else {
        match app.input_mode {
            InputMode::Normal => vec![
                Span::styled(" i ", key_style),
                Span::styled(" type ", label_style),
                Span::styled(" Tab ", key_style),
                Span::styled(" next tab ", label_style),
                Span::styled(" n ", key_style),
                Span::styled(" new ", label_style),
                Span::styled(" t ", key_style),
                Span::styled(" temporary ", label_style),
                Span::styled(" d ", key_style),
                Span::styled(" delete ", label_style),
                Span::styled(" y ", key_style),
                Span::styled(" copy ", label_style),
                Span::styled(" e ", key_style),
                Span::styled(" export ", label_style),
                Span::styled(" q ", key_style),
                Span::styled(" quit ", label_style),
            ],
            InputMode::Editing => vec![
                Span::styled(" Enter ", key_style),
                Span::styled(" send ", label_style),
                Span::styled(" Alt+Enter ", key_style),
                Span::styled(" newline ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" stop typing ", label_style),
            ],
            InputMode::Naming => vec![
                Span::styled(" Enter ", key_style),
                Span::styled(" create ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" cancel ", label_style),
            ],
        }
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_name_prompt(app: &App, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 50.min(area.width.saturating_sub(4));
    let popup_height = 5;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Enter chat tab name ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let input_area = Rect::new(inner.x, inner.y + 1, inner.width, 1);
    let input = Paragraph::new(app.name_input.as_str())
        .style(Style::default().fg(Color::Cyan));
    frame.render_widget(input, input_area);

    let cursor_x = app.name_input.chars().count().min(input_area.width as usize) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabchat_core::ChatMessage;

    #[test]
    fn test_wrapped_height() {
        let text = Text::from(vec![Line::from("a".repeat(25)), Line::default(), Line::from("short")]);
        assert_eq!(wrapped_height(&text, 10), 3 + 1 + 1);
        assert_eq!(wrapped_height(&text, 0), 25 + 1 + 5);
    }

    #[test]
    fn test_wrapped_height_breaks_on_words() {
        // 20 columns of text, but no word fits next to its neighbour in 10
        let text = Text::from(Line::from("aaaaaa bbbbbb cccccc"));
        assert_eq!(wrapped_height(&text, 10), 3);
    }

    #[test]
    fn test_rtl_card_is_right_aligned() {
        let card = Card::from_message(&ChatMessage::assistant("مرحبا"));
        let lines = card_lines(&card, true);

        assert!(lines[..lines.len() - 1]
            .iter()
            .all(|l| l.alignment == Some(Alignment::Right)));
        assert_eq!(lines[0].spans[0].content, "Ollama:");
    }

    #[test]
    fn test_copy_hint_only_when_requested() {
        let card = Card::from_message(&ChatMessage::assistant("hi"));
        let with_hint = card_lines(&card, true);
        let without = card_lines(&card, false);
        assert_eq!(with_hint.len(), without.len() + 1);
    }
}
