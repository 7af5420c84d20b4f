use std::io;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame, Terminal,
};

use dispatch_core::{hook_status, Console, ConsoleAction, Intent, StoreSnapshot, WorkItem};

use crate::app::Runtime;

const LOG_PANEL_HEIGHT: u16 = 10;

struct App {
    console: Console,
    should_quit: bool,
    message: Option<(String, Instant)>,
}

impl App {
    fn new() -> Self {
        Self {
            console: Console::default(),
            should_quit: false,
            message: None,
        }
    }

    fn set_message(&mut self, msg: impl Into<String>) {
        self.message = Some((msg.into(), Instant::now() + Duration::from_secs(2)));
    }

    /// Sends an intent, or explains why there was nothing to send.
    fn dispatch(&mut self, runtime: &Runtime, intent: Option<Intent>, unavailable: &str) {
        match intent {
            Some(intent) => {
                let label = match &intent {
                    Intent::Focus(id) => format!("Focused {id}"),
                    Intent::Kill(id) => format!("Killing {id}"),
                    Intent::Done(id) => format!("Marked {id} done"),
                };
                runtime.send(intent);
                self.set_message(label);
            }
            None => {
                if self.console.selected_item().is_some() {
                    self.set_message(unavailable.to_string());
                }
            }
        }
    }
}

pub fn run(runtime: &Runtime) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new();
    let result = run_app(&mut terminal, &mut app, runtime);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    runtime: &Runtime,
) -> io::Result<()> {
    loop {
        if let Some(snapshot) = runtime.latest_snapshot() {
            app.console.update(snapshot);
        }
        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, runtime, key.code);
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn handle_key(app: &mut App, runtime: &Runtime, code: KeyCode) {
    if app.console.show_actions() {
        match code {
            KeyCode::Esc | KeyCode::Char('a') => app.console.toggle_actions(),
            KeyCode::Left | KeyCode::Char('h') => app.console.prev_action(),
            KeyCode::Right | KeyCode::Char('l') => app.console.next_action(),
            KeyCode::Enter => {
                let intent = app.console.execute_action();
                app.dispatch(runtime, intent, "No agent attached");
            }
            KeyCode::Char('q') => app.should_quit = true,
            _ => {}
        }
        return;
    }

    match code {
        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
        KeyCode::Down | KeyCode::Char('j') => app.console.select_next(),
        KeyCode::Up | KeyCode::Char('k') => app.console.select_prev(),
        KeyCode::Enter => {
            let intent = app.console.focus_selected();
            app.dispatch(runtime, intent, "No agent attached");
        }
        KeyCode::Char('a') => app.console.toggle_actions(),
        KeyCode::Char('x') => {
            let intent = app.console.kill_selected();
            app.dispatch(runtime, intent, "No agent attached");
        }
        KeyCode::Char('d') => {
            let intent = app.console.mark_selected_done();
            app.dispatch(runtime, intent, "Nothing selected");
        }
        _ => {}
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let area = f.area();
    let console = &app.console;

    let main_block = Block::default()
        .title(Line::from(vec![
            Span::styled(" ◆ ", Style::default().fg(Color::Cyan)),
            Span::styled(
                "dispatchator ",
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(
                    "({}/{} busy, {} queued) ",
                    console.busy(),
                    console.max_agents(),
                    console.queued()
                ),
                Style::default().fg(Color::DarkGray),
            ),
        ]))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));

    let inner = main_block.inner(area);
    f.render_widget(main_block, area);

    let action_height = if console.show_actions() { 1 } else { 0 };
    let chunks = Layout::vertical([
        Constraint::Min(3),
        Constraint::Length(LOG_PANEL_HEIGHT),
        Constraint::Length(action_height),
        Constraint::Length(1),
    ])
    .split(inner);

    render_items(f, console, chunks[0]);
    render_logs(f, console.snapshot(), chunks[1]);
    if console.show_actions() {
        render_action_bar(f, console, chunks[2]);
    }

    let footer = match app.message {
        Some((ref msg, until)) if Instant::now() < until => {
            Line::from(Span::styled(format!(" {msg}"), Style::default().fg(Color::Cyan)))
        }
        _ => {
            app.message = None;
            default_footer()
        }
    };
    f.render_widget(Paragraph::new(footer), chunks[3]);
}

fn render_items(f: &mut Frame, console: &Console, area: Rect) {
    let snapshot = console.snapshot();
    if snapshot.work_items.is_empty() {
        let empty_msg = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(
                format!("No tickets in '{}'", snapshot.ready_status),
                Style::default().fg(Color::DarkGray),
            )),
        ]);
        f.render_widget(empty_msg, area);
        return;
    }

    // Keep the selection on screen.
    let height = area.height as usize;
    let offset = console.selected().saturating_sub(height.saturating_sub(1));
    let lines: Vec<Line> = snapshot
        .work_items
        .iter()
        .enumerate()
        .skip(offset)
        .take(height)
        .map(|(i, item)| item_line(snapshot, item, i == console.selected()))
        .collect();
    f.render_widget(Paragraph::new(lines), area);
}

fn item_line<'a>(snapshot: &'a StoreSnapshot, item: &'a WorkItem, selected: bool) -> Line<'a> {
    let status = snapshot.derived_status(&item.id);
    let (icon, color) = match status {
        Some(hook_status::WORKING) => ("◐", Color::Yellow),
        Some(hook_status::WAITING) => ("◉", Color::Blue),
        Some(hook_status::IDLE) => ("○", Color::Gray),
        Some(hook_status::DONE) => ("●", Color::Green),
        Some(_) => ("◌", Color::Magenta),
        None => ("·", Color::DarkGray),
    };

    let id_style = if selected {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::White)
    };
    let pointer = if selected { "▸ " } else { "  " };
    let status_label = status.unwrap_or(item.status.as_str());

    let mut spans = vec![
        Span::styled(pointer, Style::default().fg(Color::Cyan)),
        Span::styled(format!("{icon} "), Style::default().fg(color)),
        Span::styled(format!("{:<10}", item.id), id_style),
        Span::styled(format!("{:<9}", status_label), Style::default().fg(color)),
        Span::styled(item.summary.as_str(), Style::default().fg(Color::Gray)),
    ];
    if let Some(agent) = snapshot.agents.get(&item.id) {
        if !agent.title.is_empty() {
            spans.push(Span::styled(
                format!("  {}", agent.title),
                Style::default().fg(Color::DarkGray),
            ));
        }
    }
    Line::from(spans)
}

fn render_logs(f: &mut Frame, snapshot: &StoreSnapshot, area: Rect) {
    let block = Block::default()
        .title(Span::styled(" Log ", Style::default().fg(Color::DarkGray)))
        .borders(Borders::TOP)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let visible = inner.height as usize;
    let skip = snapshot.logs.len().saturating_sub(visible);
    let lines: Vec<Line> = snapshot
        .logs
        .iter()
        .skip(skip)
        .map(|line| {
            let at = line.at.with_timezone(&chrono::Local).format("%H:%M:%S");
            Line::from(vec![
                Span::styled(format!(" {at} "), Style::default().fg(Color::DarkGray)),
                Span::styled(line.message.as_str(), Style::default().fg(Color::Gray)),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn render_action_bar(f: &mut Frame, console: &Console, area: Rect) {
    let id = console
        .selected_item()
        .map(|item| item.id.as_str())
        .unwrap_or("");
    let mut spans = vec![Span::styled(
        format!(" {id}: "),
        Style::default().fg(Color::DarkGray),
    )];
    for (i, action) in ConsoleAction::ALL.iter().enumerate() {
        let style = if i == console.action_index() {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(format!(" {} ", action.label()), style));
        spans.push(Span::raw(" "));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn default_footer() -> Line<'static> {
    Line::from(vec![
        Span::styled(" [↑↓/jk]", Style::default().fg(Color::DarkGray)),
        Span::styled(" Nav ", Style::default().fg(Color::Gray)),
        Span::styled(" [Enter]", Style::default().fg(Color::DarkGray)),
        Span::styled(" Focus ", Style::default().fg(Color::Gray)),
        Span::styled(" [a]", Style::default().fg(Color::DarkGray)),
        Span::styled(" Actions ", Style::default().fg(Color::Gray)),
        Span::styled(" [x]", Style::default().fg(Color::DarkGray)),
        Span::styled(" Kill ", Style::default().fg(Color::Gray)),
        Span::styled(" [d]", Style::default().fg(Color::DarkGray)),
        Span::styled(" Done ", Style::default().fg(Color::Gray)),
        Span::styled(" [q]", Style::default().fg(Color::DarkGray)),
        Span::styled(" Quit ", Style::default().fg(Color::Gray)),
    ])
}
