use chrono::Utc;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};
use tokenwarden_core::auth::LifecycleState;

use crate::app::{App, AppState};
use crate::format;

use super::styles;

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(10),   // Session panel
            Constraint::Length(2), // Status bar
        ])
        .split(frame.area());

    render_title_bar(frame, chunks[0]);
    render_session(frame, app, chunks[1]);
    render_status_bar(frame, app, chunks[2]);

    if app.show_prompt() && matches!(app.state, AppState::Running) {
        render_prompt_overlay(frame, app);
    }

    if matches!(app.state, AppState::ShowingHelp) {
        render_help_overlay(frame);
    }

    if matches!(app.state, AppState::ConfirmingQuit) {
        render_quit_overlay(frame);
    }
}

fn render_title_bar(frame: &mut Frame, area: Rect) {
    let title = "  Tokenwarden";
    let help_hint = "[?] Help";

    let title_line = Line::from(vec![
        Span::styled(title, styles::title_style()),
        Span::raw(" ".repeat(
            area.width
                .saturating_sub(title.len() as u16 + help_hint.len() as u16 + 4)
                as usize,
        )),
        Span::styled(help_hint, styles::muted_style()),
    ]);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    frame.render_widget(Paragraph::new(title_line).block(block), area);
}

fn field(label: &str, value: impl Into<String>, style: Style) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("  {:<14}", label), styles::muted_style()),
        Span::styled(value.into(), style),
    ])
}

fn render_session(frame: &mut Frame, app: &App, area: Rect) {
    let status = &app.lifecycle;
    let now = Utc::now();

    let state_style = match status.state {
        LifecycleState::Active => styles::success_style(),
        LifecycleState::PromptingRefresh => styles::highlight_style(),
        LifecycleState::NoCredential | LifecycleState::LoggedOut => styles::error_style(),
    };

    let mut lines = vec![
        Line::from(""),
        field("Session", app.state_label(), state_style),
        field(
            "Issued",
            format::optional_time(status.issued_at),
            styles::list_item_style(),
        ),
        field(
            "Warning at",
            format::optional_time(status.warn_at),
            styles::list_item_style(),
        ),
    ];

    if let Some(warn_at) = status.warn_at {
        lines.push(field(
            "Renews in",
            format::countdown(warn_at, now),
            styles::list_item_style(),
        ));
    }

    lines.push(Line::from(""));
    lines.push(field(
        "Activity",
        if app.idle { "idle" } else { "active" },
        styles::list_item_style(),
    ));
    lines.push(field(
        "Terminal",
        if app.visible { "focused" } else { "in background" },
        styles::list_item_style(),
    ));

    if let Some((ref uri, ref code)) = app.consent {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "  Sign in to continue",
            styles::highlight_style(),
        )));
        lines.push(field("Visit", uri.clone(), styles::list_item_style()));
        lines.push(field("Enter code", code.clone(), styles::help_key_style()));
    } else if !status.state.holds_credential() && !status.renewing {
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled("  Press ", styles::muted_style()),
            Span::styled("[i]", styles::help_key_style()),
            Span::styled(" to sign in", styles::muted_style()),
        ]));
    }

    let block = Block::default()
        .title(" Credential ")
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let shortcuts = if app.lifecycle.state.holds_credential() {
        "[r]efresh | l[o]gout | [q]uit"
    } else {
        "s[i]gn in | [q]uit"
    };

    let left_text = match app.status_message {
        Some(ref msg) => format!(" {} ", format::truncate_string(msg, area.width as usize / 2)),
        None => String::new(),
    };
    let right_text = format!(" {} ", shortcuts);

    let padding_len = (area.width as usize)
        .saturating_sub(left_text.chars().count())
        .saturating_sub(right_text.len());
    let status_line = Line::from(vec![
        Span::styled(left_text, styles::muted_style()),
        Span::raw(" ".repeat(padding_len)),
        Span::styled(right_text, styles::muted_style()),
    ]);
    frame.render_widget(
        Paragraph::new(status_line).style(styles::status_bar_style()),
        area,
    );
}

fn render_prompt_overlay(frame: &mut Frame, app: &App) {
    let area = centered_rect_fixed(46, 9, frame.area());
    frame.render_widget(Clear, area);

    let due = format::optional_time(app.lifecycle.warn_at);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "   Your session is about to expire",
            styles::highlight_style(),
        )),
        Line::from(Span::styled(
            format!("   Renewal was due at {}", due),
            styles::muted_style(),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("   Press ", styles::muted_style()),
            Span::styled("[R]", styles::help_key_style()),
            Span::styled(" to stay signed in, ", styles::muted_style()),
            Span::styled("[D]", styles::help_key_style()),
            Span::styled(" to dismiss", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .title(" Session ")
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn help_line(key: &str, desc: &str) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("  {:<10}", key), styles::help_key_style()),
        Span::styled(desc.to_string(), styles::help_desc_style()),
    ])
}

fn render_help_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(52, 16, frame.area());
    frame.render_widget(Clear, area);

    let version = env!("CARGO_PKG_VERSION");

    let help_text = vec![
        Line::from(Span::styled("  Tokenwarden", styles::title_style())),
        Line::from(Span::styled(
            format!("  version {}", version),
            styles::muted_style(),
        )),
        Line::from(""),
        Line::from(Span::styled(" Session", styles::highlight_style())),
        help_line("r", "Renew the credential now"),
        help_line("d / Esc", "Dismiss the renewal prompt"),
        help_line("i", "Sign in"),
        help_line("o", "Sign out or cancel sign-in"),
        Line::from(""),
        Line::from(Span::styled(" General", styles::highlight_style())),
        help_line("?", "Toggle this help"),
        help_line("q", "Quit"),
        Line::from(""),
        Line::from(vec![
            Span::styled("       Press ", styles::muted_style()),
            Span::styled("?", styles::help_key_style()),
            Span::styled(" or ", styles::muted_style()),
            Span::styled("Esc", styles::help_key_style()),
            Span::styled(" to close", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(help_text).block(block), area);
}

/// Create a centered rectangle with fixed dimensions
fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(r.width), height.min(r.height))
}

fn render_quit_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(46, 7, frame.area());
    frame.render_widget(Clear, area);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "   Are you sure you want to quit?",
            styles::highlight_style(),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("   Press ", styles::muted_style()),
            Span::styled("[Y]", styles::help_key_style()),
            Span::styled(" to quit, ", styles::muted_style()),
            Span::styled("[N]", styles::help_key_style()),
            Span::styled(" to cancel", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(lines).block(block), area);
}
