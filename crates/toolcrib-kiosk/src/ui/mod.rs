use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::cursor::{Hide, Show};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, Clear, List, ListItem, Paragraph, Wrap};

use crate::api::KioskApi;
use crate::config::KioskConfig;
use crate::error::{Error, Result};
use crate::poller::Indicator;
use crate::routes::Screen;
use crate::submitter::ButtonState;
use crate::workflow::{Control, Kiosk, KioskKey, PageState};

const MAX_TICK: Duration = Duration::from_millis(100);

/// What a terminal key means to the kiosk, or `None` to quit.
fn translate(code: KeyCode, mods: KeyModifiers) -> Option<KioskKey> {
    if mods.contains(KeyModifiers::CONTROL) && matches!(code, KeyCode::Char('c') | KeyCode::Char('q')) {
        return None;
    }
    Some(match code {
        KeyCode::Up | KeyCode::Left | KeyCode::BackTab => KioskKey::Prev,
        KeyCode::Down | KeyCode::Right | KeyCode::Tab => KioskKey::Next,
        KeyCode::Char(' ') => KioskKey::Space,
        KeyCode::Enter => KioskKey::Enter,
        KeyCode::Esc => KioskKey::Escape,
        _ => KioskKey::Other,
    })
}

pub fn run_kiosk(api: Arc<dyn KioskApi>, cfg: KioskConfig) -> Result<()> {
    let mut stdout = io::stdout();
    enable_raw_mode().map_err(|e| Error::msg(e.to_string()))?;
    execute!(stdout, EnterAlternateScreen, Hide).map_err(|e| Error::msg(e.to_string()))?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).map_err(|e| Error::msg(e.to_string()))?;
    terminal
        .clear()
        .map_err(|e| Error::msg(format!("tui clear failed: {e}")))?;

    let mut kiosk = Kiosk::new(api, cfg);
    kiosk.start();
    let result = run_loop(&mut terminal, &mut kiosk);

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen, Show).ok();
    result
}

fn run_loop(terminal: &mut Terminal<CrosstermBackend<Stdout>>, kiosk: &mut Kiosk) -> Result<()> {
    loop {
        kiosk.drain();
        terminal
            .draw(|f| draw(f, kiosk))
            .map_err(|e| Error::msg(format!("draw failed: {e}")))?;

        let now = Instant::now();
        let wait = kiosk
            .next_deadline()
            .map(|d| d.saturating_duration_since(now).min(MAX_TICK))
            .unwrap_or(MAX_TICK);

        if event::poll(wait).map_err(|e| Error::msg(e.to_string()))? {
            if let Event::Key(k) = event::read().map_err(|e| Error::msg(e.to_string()))? {
                if k.kind == KeyEventKind::Press {
                    match translate(k.code, k.modifiers) {
                        Some(key) => {
                            kiosk.key(key);
                        }
                        None => break,
                    }
                }
            }
        }

        kiosk.tick(Instant::now());
    }
    tracing::info!("kiosk closed");
    Ok(())
}

fn draw(f: &mut ratatui::Frame, kiosk: &Kiosk) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(0),
            Constraint::Length(2),
        ])
        .split(f.area());

    draw_header(f, kiosk, chunks[0]);
    draw_main(f, kiosk, chunks[1]);
    draw_footer(f, kiosk, chunks[2]);
    draw_notice(f, kiosk);
}

fn draw_header(f: &mut ratatui::Frame, kiosk: &Kiosk, area: Rect) {
    let page = kiosk.page();
    let session = page
        .session()
        .map(|s| format!("session {s}"))
        .unwrap_or_default();
    let line = Line::from(vec![
        Span::styled("Tool Crib", Style::default().fg(Color::Cyan)),
        Span::raw("  "),
        Span::styled(page.screen.title(), Style::default().fg(Color::LightBlue)),
        Span::raw("  "),
        Span::styled(session, Style::default().fg(Color::Gray)),
        Span::raw("  "),
        Span::styled(
            kiosk.heartbeat().clock_text().to_string(),
            Style::default().fg(Color::Yellow),
        ),
    ]);
    let p = Paragraph::new(Text::from(line)).block(
        Block::default()
            .borders(Borders::BOTTOM)
            .border_type(BorderType::Plain),
    );
    f.render_widget(p, area);
}

fn draw_footer(f: &mut ratatui::Frame, kiosk: &Kiosk, area: Rect) {
    let hint = match kiosk.page().screen {
        Screen::Home => "Present your card at the reader  [Ctrl-C] Quit",
        Screen::Denied => "[any key] Back",
        Screen::Catalog { .. } => "[Tab/arrows] Move  [Space/Enter] Select  [Esc] Panel",
        Screen::Confirm { .. } => "[Enter] Confirm  [Esc] Panel",
        Screen::Panel { .. } | Screen::Unknown => "[Tab/arrows] Move  [Enter] Open  [Esc] Home",
    };
    let p = Paragraph::new(hint)
        .style(Style::default().fg(Color::Gray))
        .block(Block::default().borders(Borders::TOP));
    f.render_widget(p, area);
}

fn draw_main(f: &mut ratatui::Frame, kiosk: &Kiosk, area: Rect) {
    let page = kiosk.page();
    match &page.state {
        PageState::Loading => {
            let p = Paragraph::new("Loading...").alignment(Alignment::Center);
            f.render_widget(p, centered_rect(60, 20, area));
            return;
        }
        PageState::Unavailable(reason) => {
            let text = Text::from(vec![
                Line::styled("Page unavailable", Style::default().fg(Color::Red)),
                Line::raw(reason.clone()),
                Line::raw(""),
                controls_line(kiosk),
            ]);
            let p = Paragraph::new(text)
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true });
            f.render_widget(p, centered_rect(70, 40, area));
            return;
        }
        PageState::Ready => {}
    }

    match &page.screen {
        Screen::Home => draw_home(f, kiosk, area),
        Screen::Catalog { .. } => draw_catalog(f, kiosk, area),
        Screen::Confirm { .. } => draw_confirm(f, kiosk, area),
        Screen::Denied => {
            let text = Text::from(vec![
                Line::styled("Card not authorized", Style::default().fg(Color::Red)),
                Line::raw("Contact the crib attendant."),
            ]);
            f.render_widget(
                Paragraph::new(text).alignment(Alignment::Center),
                centered_rect(60, 30, area),
            );
        }
        Screen::Panel { .. } | Screen::Unknown => {
            let p = Paragraph::new(Text::from(vec![controls_line(kiosk)])).alignment(Alignment::Center);
            f.render_widget(p, centered_rect(70, 20, area));
        }
    }
}

fn draw_home(f: &mut ratatui::Frame, kiosk: &Kiosk, area: Rect) {
    let status = match kiosk.page().indicator() {
        Indicator::Idle => "Starting".to_string(),
        Indicator::Waiting => "Waiting for card".to_string(),
        Indicator::Unrecognized(s) => format!("Reader: {s}"),
    };
    let text = Text::from(vec![
        Line::styled(
            "Welcome",
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Line::raw(""),
        Line::raw(format!("{status}{}", kiosk.heartbeat().dots())),
    ]);
    f.render_widget(
        Paragraph::new(text).alignment(Alignment::Center),
        centered_rect(60, 30, area),
    );
}

fn draw_catalog(f: &mut ratatui::Frame, kiosk: &Kiosk, area: Rect) {
    let page = kiosk.page();
    let focus = page.focused(kiosk.config());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(area);

    let items: Vec<ListItem> = page
        .selection
        .cards()
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let mark = if v.pressed { "[x]" } else { "[ ]" };
            let mut style = Style::default();
            if v.highlighted {
                style = style.fg(Color::Green).add_modifier(Modifier::BOLD);
            }
            if focus == Some(Control::Card(i)) {
                style = style.add_modifier(Modifier::REVERSED);
            }
            ListItem::new(format!("{mark} {}", v.card.label)).style(style)
        })
        .collect();
    let empty = items.is_empty();
    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(if empty { "No tools available" } else { "Tools" }),
    );
    f.render_widget(list, chunks[0]);
    draw_action(f, kiosk, chunks[1], focus == Some(Control::Action));
}

fn draw_confirm(f: &mut ratatui::Frame, kiosk: &Kiosk, area: Rect) {
    let page = kiosk.page();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(area);

    let mut lines = vec![Line::styled(
        match page.drawer() {
            Some(d) => format!("Drawer {d}"),
            None => "No drawer pending".to_string(),
        },
        Style::default().add_modifier(Modifier::BOLD),
    )];
    lines.extend(page.data.items.iter().map(|i| Line::raw(format!("- {i}"))));
    let p = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    f.render_widget(p, chunks[0]);
    draw_action(f, kiosk, chunks[1], true);
}

fn draw_action(f: &mut ratatui::Frame, kiosk: &Kiosk, area: Rect, focused: bool) {
    let Some(button) = kiosk.page().action.as_ref() else {
        return;
    };
    let (label, color) = match button.state() {
        ButtonState::Ready => (button.kind().label().to_string(), Color::White),
        ButtonState::InFlight => (format!("{}...", button.kind().label()), Color::Yellow),
        ButtonState::Disabled => (button.kind().label().to_string(), Color::DarkGray),
    };
    let mut style = Style::default().fg(color);
    if focused && button.state() == ButtonState::Ready {
        style = style.add_modifier(Modifier::REVERSED);
    }
    let p = Paragraph::new(label)
        .alignment(Alignment::Center)
        .style(style)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(p, centered_rect(40, 100, area));
}

fn controls_line(kiosk: &Kiosk) -> Line<'static> {
    let page = kiosk.page();
    let mut spans = Vec::new();
    for (i, c) in page.controls(kiosk.config()).into_iter().enumerate() {
        let Control::Link { label, .. } = c else {
            continue;
        };
        let mut style = Style::default().fg(Color::White);
        if i == page.focus() {
            style = style.add_modifier(Modifier::REVERSED);
        }
        spans.push(Span::styled(format!(" {label} "), style));
        spans.push(Span::raw("   "));
    }
    Line::from(spans)
}

fn draw_notice(f: &mut ratatui::Frame, kiosk: &Kiosk) {
    let Some(notice) = kiosk.page().notice.as_deref() else {
        return;
    };
    let area = centered_rect(60, 30, f.area());
    f.render_widget(Clear, area);
    let text = Text::from(vec![
        Line::raw(notice.to_string()),
        Line::raw(""),
        Line::styled("[Enter] OK", Style::default().fg(Color::Gray)),
    ]);
    let p = Paragraph::new(text)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .title("Notice")
                .style(Style::default().fg(Color::Yellow)),
        );
    f.render_widget(p, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    let vertical = popup_layout[1];
    let popup_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical);
    popup_layout[1]
}
