use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use crate::app::{App, AuthField, AuthMode, Screen, TextInput};
use refai_core::knowledge::{self, KnowledgeSource, SOURCE_DOCUMENTS, VALID_AS_OF};
use refai_core::{ChatRole, NotificationKind};

const LOADING_TEXT: &str = "Analyzing basketball rules";

/// Render `**bold**` spans; everything else is literal.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c != '*' || chars.peek() != Some(&'*') {
            current_text.push(c);
            continue;
        }
        chars.next();

        if !current_text.is_empty() {
            spans.push(Span::raw(std::mem::take(&mut current_text)));
        }

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
            spans.push(Span::styled(bold_text, Style::default().add_modifier(Modifier::BOLD)));
        } else {
            // No closing **, treat as literal
            current_text.push_str("**");
            current_text.push_str(&bold_text);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    Line::from(spans)
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(2));
    let height = height.min(area.height.saturating_sub(2));
    Rect::new(
        area.x + (area.width.saturating_sub(width)) / 2,
        area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    )
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

    let screen = app.screen();
    render_header(app, frame, header_area);

    match screen {
        Screen::SignIn => render_sign_in(app, frame, body_area),
        Screen::Checking => render_checking(frame, body_area),
        Screen::Paywall => render_paywall(app, frame, body_area),
        Screen::Chat => render_chat(app, frame, body_area),
        Screen::Subscription => render_subscription(app, frame, body_area),
    }

    render_footer(app, screen, frame, footer_area);

    if screen == Screen::Chat && app.show_sources {
        render_sources(app, frame, body_area);
    }
    render_toasts(app, frame, body_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![
        Span::styled(" 🏀 RefAI ", Style::default().fg(Color::Rgb(234, 88, 12)).bold()),
        Span::styled("Basketball Rules Assistant ", Style::default().fg(Color::White)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ];

    if let Some(session) = &app.session {
        let badge = match app.subscription.status() {
            Some(status) if status.is_trialing() => " [trial]",
            Some(status) if status.subscribed => " [premium]",
            _ => "",
        };
        spans.push(Span::styled(
            format!("  {}{}", session.email, badge),
            Style::default().fg(Color::Gray),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, screen: Screen, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let hint = |key: &'static str, label: &'static str| {
        [
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    };

    let (mode_text, mut hints): (&str, Vec<Span>) = match screen {
        Screen::SignIn => {
            let toggle = match app.auth_mode {
                AuthMode::SignIn => "create account",
                AuthMode::SignUp => "have an account",
            };
            (
                " SIGN IN ",
                [hint("Enter", "submit"), hint("Tab", "next field"), hint("^R", toggle)].concat(),
            )
        }
        Screen::Checking => (" CHECKING ", Vec::new()),
        Screen::Paywall => (
            " PREMIUM ",
            [hint("Enter", "subscribe"), hint("r", "refresh"), hint("^O", "sign out")].concat(),
        ),
        Screen::Subscription => (
            " SUBSCRIPTION ",
            [hint("m", "manage"), hint("r", "refresh"), hint("Esc", "back"), hint("^O", "sign out")].concat(),
        ),
        Screen::Chat if app.show_sources => (
            " SOURCES ",
            [hint("j/k", "scroll"), hint("Esc", "close")].concat(),
        ),
        Screen::Chat => {
            let mut hints = [
                hint("Enter", "send"),
                hint("^N", "new chat"),
                hint("^S", "sources"),
            ]
            .concat();
            if app.session.is_some() {
                hints.extend(hint("^B", "subscription"));
            }
            hints.extend(hint("/attach", "file"));
            (" CHAT ", hints)
        }
    };
    hints.extend(hint("^C", "quit"));

    let mode_style = Style::default().bg(Color::Blue).fg(Color::White);
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

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let attachment_height = if app.attachments.is_empty() { 0 } else { 1 };
    let [chat_area, attachment_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(attachment_height),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" FIBA Official Basketball Rules 2024 ");

    let mut lines: Vec<Line> = Vec::new();
    for msg in app.chat.messages() {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                if !msg.attachments.is_empty() {
                    let names: Vec<&str> = msg.attachments.iter().map(|a| a.name.as_str()).collect();
                    lines.push(Line::from(Span::styled(
                        format!("📎 {}", names.join(", ")),
                        Style::default().fg(Color::Magenta),
                    )));
                }
                for line in msg.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
            }
            ChatRole::Assistant => {
                lines.push(Line::from(Span::styled(
                    "RefAI:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(parse_markdown_line(line));
                }
            }
        }
        lines.push(Line::default());
    }

    if app.chat.is_loading() {
        lines.push(Line::from(Span::styled(
            "RefAI:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("{}{}", LOADING_TEXT, dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    if !app.attachments.is_empty() {
        let names: Vec<String> = app
            .attachments
            .iter()
            .map(|a| format!("{} ({} KB)", a.name, a.size_bytes.div_ceil(1024)))
            .collect();
        let pending = Paragraph::new(format!(" 📎 {}  (/detach to remove)", names.join(", ")))
            .style(Style::default().fg(Color::Magenta));
        frame.render_widget(pending, attachment_area);
    }

    let loading = app.chat.is_loading();
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if loading { Color::DarkGray } else { Color::Yellow }))
        .title(" Ask about rules, violations, fouls or equipment ");

    render_text_input(frame, &app.input, input_area, input_block, !loading, false);
}

/// Input box with horizontal scrolling that keeps the cursor visible
fn render_text_input(
    frame: &mut Frame,
    input: &TextInput,
    area: Rect,
    block: Block,
    focused: bool,
    masked: bool,
) {
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = input.cursor;

    let scroll_offset = if inner_width > 0 && cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = input
        .value
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .map(|c| if masked { '•' } else { c })
        .collect();

    let widget = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(widget, area);

    if focused {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_sign_in(app: &App, frame: &mut Frame, area: Rect) {
    let signing_up = app.auth_mode == AuthMode::SignUp;
    let field_count: u16 = if signing_up { 3 } else { 2 };
    let form_area = centered(area, 56, 6 + field_count * 3);

    let title = if signing_up { " Create your RefAI account " } else { " Sign in to RefAI " };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);
    let inner = block.inner(form_area);
    frame.render_widget(block, form_area);

    let tagline = Paragraph::new("Your expert basketball rules assistant")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(tagline, Rect::new(inner.x + 1, inner.y, inner.width.saturating_sub(2), 1));

    let mut fields = vec![
        (AuthField::Email, "Email", &app.email, false),
        (AuthField::Password, "Password", &app.password, true),
    ];
    if signing_up {
        fields.push((AuthField::Username, "Username", &app.username, false));
    }

    for (i, (field, label, input, masked)) in fields.into_iter().enumerate() {
        let focused = app.auth_field == field && !app.auth_pending;
        let field_area = Rect::new(inner.x, inner.y + 2 + i as u16 * 3, inner.width, 3);
        if field_area.bottom() > inner.bottom() {
            break;
        }
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(if focused { Color::Yellow } else { Color::DarkGray }))
            .title(format!(" {} ", label));
        render_text_input(frame, input, field_area, block, focused, masked);
    }

    let status = if app.auth_pending {
        Span::styled("Please wait...", Style::default().fg(Color::DarkGray).italic())
    } else if signing_up {
        Span::styled("Password must be at least 6 characters", Style::default().fg(Color::DarkGray))
    } else {
        Span::raw("")
    };
    let status_y = inner.bottom().saturating_sub(1);
    frame.render_widget(
        Paragraph::new(Line::from(status)),
        Rect::new(inner.x + 1, status_y, inner.width.saturating_sub(2), 1),
    );
}

fn render_checking(frame: &mut Frame, area: Rect) {
    let box_area = centered(area, 40, 3);
    let checking = Paragraph::new("Checking your subscription...")
        .style(Style::default().fg(Color::DarkGray).italic())
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(checking, box_area);
}

fn render_paywall(app: &App, frame: &mut Frame, area: Rect) {
    let box_area = centered(area, 60, 18);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Rgb(234, 88, 12)))
        .title(" 🏀 RefAI Premium ");

    let mut lines = vec![
        Line::from("Unlock unlimited access to basketball rules assistance"),
        Line::default(),
        Line::from(vec![
            Span::styled("€5", Style::default().bold()),
            Span::raw(" per month  "),
            Span::styled(" 3-day free trial ", Style::default().bg(Color::Blue).fg(Color::White)),
        ]),
        Line::default(),
        Line::from(Span::styled("What's included:", Style::default().bold())),
    ];
    for feature in [
        "Unlimited basketball rules questions",
        "Real-time AI-powered responses",
        "FIBA regulations knowledge base",
        "Source citations for every answer",
        "Priority support",
    ] {
        lines.push(Line::from(vec![
            Span::styled("  ✓ ", Style::default().fg(Color::Green)),
            Span::raw(feature),
        ]));
    }
    lines.push(Line::default());
    lines.push(Line::from(Span::styled(
        if app.url_pending { "Opening checkout..." } else { "Press Enter to start your free trial" },
        Style::default().fg(Color::Yellow),
    )));
    lines.push(Line::from(Span::styled(
        "Cancel anytime. No commitment required.",
        Style::default().fg(Color::DarkGray),
    )));

    let paywall = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(paywall, box_area);
}

fn render_subscription(app: &App, frame: &mut Frame, area: Rect) {
    let box_area = centered(area, 60, 12);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Subscription Status ");

    let label_style = Style::default().fg(Color::DarkGray);
    let mut lines = Vec::new();

    match app.subscription.status() {
        Some(status) => {
            let badge_style = if status.subscribed {
                Style::default().bg(Color::Green).fg(Color::Black)
            } else {
                Style::default().bg(Color::Red).fg(Color::White)
            };
            lines.push(Line::from(vec![
                Span::styled("Status:  ", label_style),
                Span::styled(format!(" {} ", status.badge()), badge_style),
            ]));
            if status.subscribed {
                lines.push(Line::from(vec![
                    Span::styled("Plan:    ", label_style),
                    Span::raw("RefAI Premium (€5/month)"),
                ]));
            }
            if let Some((label, date)) = status.renewal() {
                lines.push(Line::from(vec![
                    Span::styled(format!("{}: ", label), label_style),
                    Span::raw(date.to_string()),
                ]));
            }
            if status.is_trialing() {
                lines.push(Line::default());
                lines.push(Line::from(Span::styled(
                    "You're currently on your 3-day free trial.",
                    Style::default().fg(Color::Blue),
                )));
            }
        }
        None => lines.push(Line::from(Span::styled("Checking...", label_style.italic()))),
    }

    if app.subscription.is_checking() {
        lines.push(Line::from(Span::styled("Refreshing...", label_style.italic())));
    }
    if app.url_pending {
        lines.push(Line::from(Span::styled("Opening billing portal...", label_style.italic())));
    }

    let panel = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(panel, box_area);
}

fn render_sources(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup_area = centered(area, 80, area.height.saturating_sub(2));
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Source Data ");

    let heading = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let dim = Style::default().fg(Color::DarkGray);

    let mut lines = vec![
        Line::from(Span::styled("Knowledge Base", heading)),
        Line::from(Span::styled(
            format!(
                "{} official documents, {} pages total. Valid as of {}.",
                SOURCE_DOCUMENTS.len(),
                knowledge::total_pages(),
                VALID_AS_OF
            ),
            dim,
        )),
        Line::default(),
    ];

    for doc in SOURCE_DOCUMENTS.iter() {
        lines.push(Line::from(vec![
            Span::styled(doc.title, Style::default().bold()),
            Span::styled(format!("  {} pages", doc.pages), dim),
        ]));
        lines.push(Line::from(doc.description));
        lines.push(Line::from(Span::styled(doc.topics.join(" · "), Style::default().fg(Color::Cyan))));
        lines.push(Line::default());
    }

    let chunks = knowledge::knowledge_chunks();
    for source in [
        KnowledgeSource::Rules,
        KnowledgeSource::Interpretations,
        KnowledgeSource::Equipment,
        KnowledgeSource::General,
    ] {
        let titles: Vec<&str> = chunks
            .iter()
            .filter(|c| c.source == source)
            .map(|c| c.title())
            .collect();
        if titles.is_empty() {
            continue;
        }
        lines.push(Line::from(Span::styled(
            format!("{} ({} sections)", source.display_name(), titles.len()),
            heading,
        )));
        for title in titles {
            lines.push(Line::from(format!("  • {}", title)));
        }
        lines.push(Line::default());
    }

    // Clamp scroll so the last line stays reachable but not past it
    let max_scroll = (lines.len() as u16).saturating_sub(popup_area.height.saturating_sub(2));
    app.sources_scroll = app.sources_scroll.min(max_scroll);

    let panel = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.sources_scroll, 0));
    frame.render_widget(panel, popup_area);
}

fn render_toasts(app: &App, frame: &mut Frame, area: Rect) {
    let width = 48.min(area.width);
    let mut y = area.y;

    for toast in app.toasts.iter().rev().take(3) {
        let color = match toast.notification.kind {
            NotificationKind::Info => Color::Green,
            NotificationKind::Warning => Color::Yellow,
            NotificationKind::Error => Color::Red,
        };
        let height = 4;
        if y + height > area.bottom() {
            break;
        }
        let toast_area = Rect::new(area.right().saturating_sub(width), y, width, height);
        frame.render_widget(Clear, toast_area);

        let widget = Paragraph::new(toast.notification.description.as_str())
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(color))
                    .title(Span::styled(
                        format!(" {} ", toast.notification.title),
                        Style::default().fg(color).bold(),
                    )),
            );
        frame.render_widget(widget, toast_area);
        y += height;
    }
}
