//! Message cards: text direction, Markdown to HTML, and the conversation view.

use pulldown_cmark::{html, Options, Parser};

use crate::state::{ChatMessage, ChatRole, Transcript};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDirection {
    Ltr,
    Rtl,
}

impl TextDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextDirection::Ltr => "ltr",
            TextDirection::Rtl => "rtl",
        }
    }
}

/// Right-to-left if the text contains any character from the Arabic block.
pub fn text_direction(text: &str) -> TextDirection {
    if text.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c)) {
        TextDirection::Rtl
    } else {
        TextDirection::Ltr
    }
}

pub fn markdown_to_html(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, Parser::new_ext(text, options));
    out
}

/// Escape text for use inside HTML element content or a double-quoted
/// attribute.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing into a String cannot fail
    let _ = pulldown_cmark_escape::escape_html(&mut out, text);
    out
}

/// One rendered message in the conversation view.
///
/// `raw` is the message text exactly as sent or received; it is only
/// escaped when the card is turned into markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub role: ChatRole,
    pub direction: TextDirection,
    pub raw: String,
    pub html: String,
    /// Error notices are shown like assistant replies but are not part of
    /// the transcript
    pub is_error: bool,
}

impl Card {
    pub fn from_message(message: &ChatMessage) -> Self {
        Self {
            role: message.role,
            direction: text_direction(&message.content),
            raw: message.content.clone(),
            html: markdown_to_html(&message.content),
            is_error: false,
        }
    }

    pub fn error(text: &str) -> Self {
        Self {
            role: ChatRole::Assistant,
            direction: text_direction(text),
            raw: text.to_string(),
            html: markdown_to_html(text),
            is_error: true,
        }
    }

    /// Assistant cards offer copying their raw text
    pub fn copyable(&self) -> bool {
        self.role == ChatRole::Assistant
    }

    pub fn to_html(&self) -> String {
        let role_class = match self.role {
            ChatRole::User => "card-user",
            ChatRole::Assistant if self.is_error => "card-error",
            ChatRole::Assistant => "card-assistant",
        };
        let copy_button = if self.copyable() {
            "\n    <button class=\"card-copy\" type=\"button\">Copy</button>"
        } else {
            ""
        };

        format!(
            "<div class=\"my-2\">\n  <div class=\"card {}\" dir=\"{}\" data-markdown=\"{}\">\n    <div class=\"card-author\">{}</div>\n    <div class=\"card-body\">{}</div>{}\n  </div>\n</div>\n",
            role_class,
            self.direction.as_str(),
            escape_html(&self.raw),
            self.role.display_name(),
            self.html,
            copy_button,
        )
    }
}

/// The scrollable list of cards for the active chat.
#[derive(Debug, Default)]
pub struct ConversationView {
    cards: Vec<Card>,
    follow_newest: bool,
}

impl ConversationView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, card: Card) {
        self.cards.push(card);
        self.follow_newest = true;
    }

    pub fn clear(&mut self) {
        self.cards.clear();
        self.follow_newest = false;
    }

    /// Throw away all cards and render the transcript from scratch
    pub fn rebuild(&mut self, transcript: &Transcript) {
        self.clear();
        for message in transcript.messages() {
            self.append(Card::from_message(message));
        }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// True once after a card was appended; front ends use it to jump
    /// to the bottom.
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.follow_newest)
    }

    pub fn to_html_document(&self, title: &str) -> String {
        let mut body = String::new();
        for card in &self.cards {
            body.push_str(&card.to_html());
        }

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
  body {{ font-family: sans-serif; background: #f3f4f6; max-width: 48rem; margin: 0 auto; padding: 1rem; }}
  .card {{ background: #fff; border-radius: 0.5rem; box-shadow: 0 1px 3px rgba(0,0,0,.1); padding: 1rem; margin-bottom: 0.5rem; }}
  .card-author {{ font-weight: bold; font-size: 1.125rem; }}
  .card-user .card-author {{ color: #2563eb; }}
  .card-error .card-body {{ color: #b91c1c; }}
  .card-copy {{ margin-top: 0.5rem; font-size: 0.875rem; color: #3b82f6; background: none; border: none; cursor: pointer; }}
</style>
</head>
<body>
<h1>{title}</h1>
<div id="chatbox">
{body}</div>
<script>
  document.querySelectorAll('.card-copy').forEach(function (button) {{
    button.addEventListener('click', function () {{
      navigator.clipboard.writeText(button.parentElement.dataset.markdown)
        .catch(function (err) {{ console.error('Failed to copy: ', err); }});
    }});
  }});
</script>
</body>
</html>
"#,
            title = escape_html(title),
            body = body,
        )
    }
}
