use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

/// Convert Markdown into styled terminal lines. Wrapping is left to the
/// `Paragraph` that displays them.
pub fn render_markdown(md: &str) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut style_stack: Vec<Style> = vec![Style::default()];
    let mut list_depth: usize = 0;
    let mut quote_depth: usize = 0;
    let mut in_code_block = false;

    let current = |stack: &[Style]| stack.last().copied().unwrap_or_default();

    fn flush(lines: &mut Vec<Line<'static>>, spans: &mut Vec<Span<'static>>) {
        if !spans.is_empty() {
            lines.push(Line::from(std::mem::take(spans)));
        }
    }

    fn blank(lines: &mut Vec<Line<'static>>) {
        if lines.last().is_some_and(|l| l.width() > 0) {
            lines.push(Line::default());
        }
    }

    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);

    for event in Parser::new_ext(md, options) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                flush(&mut lines, &mut spans);
                style_stack.push(heading_style(level));
            }
            Event::End(TagEnd::Heading(_)) => {
                style_stack.pop();
                flush(&mut lines, &mut spans);
                blank(&mut lines);
            }
            Event::Start(Tag::Paragraph) => {
                if quote_depth > 0 {
                    spans.push(Span::styled("│ ".repeat(quote_depth), Style::default().fg(Color::DarkGray)));
                }
            }
            Event::End(TagEnd::Paragraph) => {
                flush(&mut lines, &mut spans);
                if list_depth == 0 {
                    blank(&mut lines);
                }
            }
            Event::Start(Tag::Strong) => {
                let base = current(&style_stack);
                style_stack.push(base.add_modifier(Modifier::BOLD));
            }
            Event::Start(Tag::Emphasis) => {
                let base = current(&style_stack);
                style_stack.push(base.add_modifier(Modifier::ITALIC));
            }
            Event::Start(Tag::Strikethrough) => {
                let base = current(&style_stack);
                style_stack.push(base.add_modifier(Modifier::CROSSED_OUT));
            }
            Event::End(TagEnd::Strong | TagEnd::Emphasis | TagEnd::Strikethrough) => {
                style_stack.pop();
            }
            Event::Start(Tag::Link { .. }) => {
                let base = current(&style_stack);
                style_stack.push(base.fg(Color::Blue).add_modifier(Modifier::UNDERLINED));
            }
            Event::End(TagEnd::Link) => {
                style_stack.pop();
            }
            Event::Start(Tag::BlockQuote(_)) => {
                flush(&mut lines, &mut spans);
                quote_depth += 1;
            }
            Event::End(TagEnd::BlockQuote(_)) => {
                quote_depth = quote_depth.saturating_sub(1);
            }
            Event::Start(Tag::CodeBlock(_)) => {
                flush(&mut lines, &mut spans);
                in_code_block = true;
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                blank(&mut lines);
            }
            Event::Start(Tag::List(_)) => {
                flush(&mut lines, &mut spans);
                list_depth += 1;
            }
            Event::End(TagEnd::List(_)) => {
                list_depth = list_depth.saturating_sub(1);
                if list_depth == 0 {
                    blank(&mut lines);
                }
            }
            Event::Start(Tag::Item) => {
                flush(&mut lines, &mut spans);
                let indent = "  ".repeat(list_depth.saturating_sub(1));
                spans.push(Span::styled(format!("{indent}• "), Style::default().fg(Color::Yellow)));
            }
            Event::End(TagEnd::Item) => {
                flush(&mut lines, &mut spans);
            }
            Event::Text(text) if in_code_block => {
                for code_line in text.lines() {
                    lines.push(Line::from(Span::styled(
                        format!("  {code_line}"),
                        Style::default().fg(Color::Cyan),
                    )));
                }
            }
            Event::Text(text) => {
                spans.push(Span::styled(text.into_string(), current(&style_stack)));
            }
            Event::Code(code) => {
                spans.push(Span::styled(code.into_string(), Style::default().fg(Color::Cyan)));
            }
            Event::SoftBreak => spans.push(Span::raw(" ")),
            Event::HardBreak => flush(&mut lines, &mut spans),
            Event::Rule => {
                flush(&mut lines, &mut spans);
                lines.push(Line::from(Span::styled("─".repeat(24), Style::default().fg(Color::DarkGray))));
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                spans.push(Span::raw(html.into_string()));
            }
            _ => {}
        }
    }

    flush(&mut lines, &mut spans);
    while lines.last().is_some_and(|l| l.width() == 0) {
        lines.pop();
    }
    lines
}

fn heading_style(level: HeadingLevel) -> Style {
    let style = Style::default().add_modifier(Modifier::BOLD);
    match level {
        HeadingLevel::H1 => style.fg(Color::Magenta).add_modifier(Modifier::UNDERLINED),
        HeadingLevel::H2 => style.fg(Color::Magenta),
        _ => style.fg(Color::LightMagenta),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(lines: &[Line<'_>]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn test_bold_is_styled() {
        let lines = render_markdown("say **hi** now");
        assert_eq!(plain(&lines), vec!["say hi now"]);
        let bold = &lines[0].spans[1];
        assert_eq!(bold.content, "hi");
        assert!(bold.style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_list_items_get_bullets() {
        let lines = render_markdown("- one\n- two");
        assert_eq!(plain(&lines), vec!["• one", "• two"]);
    }

    #[test]
    fn test_code_block_lines_kept() {
        let lines = render_markdown("```\nfn main() {}\nlet x = 1;\n```");
        assert_eq!(plain(&lines), vec!["  fn main() {}", "  let x = 1;"]);
    }

    #[test]
    fn test_paragraphs_separated_by_blank_line() {
        let lines = render_markdown("first\n\nsecond");
        assert_eq!(plain(&lines), vec!["first", "", "second"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(render_markdown("").is_empty());
    }
}
