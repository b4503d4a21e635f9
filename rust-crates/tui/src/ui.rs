use crate::client::AppSnapshot;
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEventKind,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use guess_client::notify::{
    Notice,
    NoticeLevel,
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;
use tokio::sync::mpsc;

const NO_GAME: &str = "The game is loading or no game is started yet";
const HELP: &str = "n new game | g guess | w switch wallet | r refresh | q/Esc quit";

#[derive(Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Redraw,
    NewGame { min: String, max: String },
    Guess(String),
    SwitchWallet,
    Refresh,
}

#[derive(Default)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    NewGameModal(NewGameForm),
    GuessModal(String),
    QuitModal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct NewGameForm {
    min: String,
    max: String,
    focus: Field,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Field {
    #[default]
    Min,
    Max,
}

impl NewGameForm {
    fn focused(&mut self) -> &mut String {
        match self.focus {
            Field::Min => &mut self.min,
            Field::Max => &mut self.max,
        }
    }
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

/// Terminal input read on a dedicated thread, since crossterm reads block.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let event = event::read();
            let failed = event.is_err();
            if tx.send(event).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(events: &mut InputEventReceiver) -> Result<Event> {
    let event = events
        .recv()
        .await
        .ok_or_else(|| eyre!("terminal input closed"))??;
    Ok(event)
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

/// Apply a key press to the UI state, returning what the app should do about it.
pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let k = match event {
        Event::Key(k) => k,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if k.kind != KeyEventKind::Press {
        return None;
    }

    match &mut state.mode {
        Mode::NewGameModal(form) => match k.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                form.focus = match form.focus {
                    Field::Min => Field::Max,
                    Field::Max => Field::Min,
                };
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let NewGameForm { min, max, .. } = std::mem::take(form);
                state.mode = Mode::Normal;
                Some(UserEvent::NewGame { min, max })
            }
            KeyCode::Backspace => {
                form.focused().pop();
                Some(UserEvent::Redraw)
            }
            KeyCode::Char(c) => {
                form.focused().push(c);
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::GuessModal(input) => match k.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let guess = std::mem::take(input);
                state.mode = Mode::Normal;
                Some(UserEvent::Guess(guess))
            }
            KeyCode::Backspace => {
                input.pop();
                Some(UserEvent::Redraw)
            }
            KeyCode::Char(c) => {
                input.push(c);
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::QuitModal => match k.code {
            KeyCode::Char('y') | KeyCode::Char('q') | KeyCode::Enter => Some(UserEvent::Quit),
            KeyCode::Char('n') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::Normal => match k.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                state.mode = Mode::QuitModal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Char('n') => {
                state.mode = Mode::NewGameModal(NewGameForm::default());
                Some(UserEvent::Redraw)
            }
            KeyCode::Char('g') => {
                state.mode = Mode::GuessModal(String::new());
                Some(UserEvent::Redraw)
            }
            KeyCode::Char('w') => Some(UserEvent::SwitchWallet),
            KeyCode::Char('r') => Some(UserEvent::Refresh),
            _ => None,
        },
    }
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // account + network
            Constraint::Length(3), // current game
            Constraint::Min(6),    // attempts
            Constraint::Length(8), // notifications
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_account_panel(f, chunks[0], snap);
    draw_game_panel(f, chunks[1], snap);
    draw_attempts(f, chunks[2], snap);
    draw_notices(f, chunks[3], snap);
    let help = Paragraph::new(HELP).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[4]);
    draw_modals(f, state);
}

fn draw_account_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let text = vec![
        Line::from(format!(
            "Wallet: {} ({}) | {} of {}",
            snap.account, snap.address, snap.account_index, snap.account_count
        )),
        Line::from(format!("Network: {} | Contract: {}", snap.network, snap.contract)),
    ];
    let widget =
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Account"));
    f.render_widget(widget, area);
}

fn draw_game_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let (text, style) = match &snap.game_line {
        Some(line) if snap.game_found => (line.as_str(), Style::default().fg(Color::Green)),
        Some(line) => (line.as_str(), Style::default()),
        None => (NO_GAME, Style::default().fg(Color::DarkGray)),
    };
    let widget = Paragraph::new(text)
        .style(style)
        .block(Block::default().borders(Borders::ALL).title("Game"));
    f.render_widget(widget, area);
}

fn draw_attempts(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let items: Vec<ListItem> = snap
        .attempts
        .iter()
        .rev()
        .map(|line| ListItem::new(line.clone()))
        .collect();
    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Attempts ({})", snap.attempts.len())),
    );
    f.render_widget(list, area);
}

fn draw_notices(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let lines: Vec<Line> = if snap.notices.is_empty() {
        vec![Line::from("Ready")]
    } else {
        snap.notices.iter().map(notice_line).collect()
    };
    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(widget, area);
}

fn notice_line(notice: &Notice) -> Line<'static> {
    let (marker, color) = match notice.level {
        NoticeLevel::Loading => ("…", Color::Yellow),
        NoticeLevel::Success => ("✔", Color::Green),
        NoticeLevel::Error => ("✖", Color::Red),
    };
    Line::from(format!("{marker} {}", notice.message)).style(Style::default().fg(color))
}

fn draw_modals(f: &mut Frame, state: &UiState) {
    match &state.mode {
        Mode::Normal => {}
        Mode::NewGameModal(form) => {
            let area = centered_rect(50, 30, f.area());
            let block = Block::default().borders(Borders::ALL).title("New Game");
            let cursor = |field: Field| if form.focus == field { ">" } else { " " };
            let p = Paragraph::new(vec![
                Line::from(format!("{} Min: {}", cursor(Field::Min), form.min)),
                Line::from(format!("{} Max: {}", cursor(Field::Max), form.max)),
                Line::from(""),
                Line::from("Tab=switch field Enter=start Esc=cancel"),
            ]);
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::GuessModal(input) => {
            let area = centered_rect(40, 25, f.area());
            let block = Block::default().borders(Borders::ALL).title("Make a Guess");
            let p = Paragraph::new(format!("Number: {input}\nEnter=submit Esc=cancel"));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::QuitModal => {
            let area = centered_rect(30, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Quit");
            let p = Paragraph::new("Quit the game? y=yes n=no");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}
