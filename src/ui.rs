use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use dex_tracker::{CatalogEntry, EntryId, Notice, Snapshot, Tracker, View, MOVE_PREVIEW_LIMIT};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Mutex};

const STAT_BAR_WIDTH: usize = 20;

/// How long to wait for a key before redrawing
const TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// What a finished background operation reports back to the UI
#[derive(Debug)]
pub struct Outcome {
    pub notice: Option<Notice>,
    /// Entry to move the cursor to
    pub focus: Option<EntryId>,
}

pub struct App {
    tracker: Arc<Mutex<Tracker>>,
    snapshots: watch::Receiver<Arc<Snapshot>>,
    /// Latest published state; everything on screen comes from here
    pub current: Arc<Snapshot>,
    outcome_tx: mpsc::UnboundedSender<Outcome>,
    outcomes: mpsc::UnboundedReceiver<Outcome>,
    pub state: TableState,
    pub show_detail: bool,
    pub input_mode: InputMode,
    pub input: String,
    pub notice: Option<Notice>,
    pub cry_base_url: String,
}

impl App {
    pub fn new(tracker: Tracker, cry_base_url: String) -> Self {
        let mut snapshots = tracker.watch();
        let current = snapshots.borrow_and_update().clone();
        let (outcome_tx, outcomes) = mpsc::unbounded_channel();

        let mut app = Self {
            tracker: Arc::new(Mutex::new(tracker)),
            snapshots,
            current,
            outcome_tx,
            outcomes,
            state: TableState::default(),
            show_detail: false,
            input_mode: InputMode::Normal,
            input: String::new(),
            notice: None,
            cry_base_url,
        };
        app.clamp_selection();
        app
    }

    fn entry_count(&self) -> usize {
        self.current.cache().len()
    }

    pub fn selected_entry(&self) -> Option<&CatalogEntry> {
        let index = self.state.selected()?;
        let id = self.current.cache().entries().get(index)?.id;
        self.current.select(id)
    }

    fn clamp_selection(&mut self) {
        let len = self.entry_count();
        let selected = match self.state.selected() {
            _ if len == 0 => None,
            Some(i) if i >= len => Some(len - 1),
            Some(i) => Some(i),
            None => Some(0),
        };
        self.state.select(selected);
        if selected.is_none() {
            self.show_detail = false;
        }
    }

    fn focus(&mut self, id: EntryId) {
        let index = self.current.cache().entries().iter().position(|e| e.id == id);
        if index.is_some() {
            self.state.select(index);
        }
    }

    pub fn next(&mut self) {
        let len = self.entry_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.entry_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    /// Picks up the latest snapshot and any finished operations
    pub fn sync(&mut self) {
        if self.snapshots.has_changed().unwrap_or(false) {
            self.current = self.snapshots.borrow_and_update().clone();
        }
        while let Ok(outcome) = self.outcomes.try_recv() {
            self.apply(outcome);
        }
        self.clamp_selection();
    }

    fn apply(&mut self, outcome: Outcome) {
        self.notice = outcome.notice;
        if let Some(id) = outcome.focus {
            self.focus(id);
        }
    }

    /// Runs `op` on the runtime against the shared tracker. Operations queue
    /// on the tracker lock; the UI keeps drawing from snapshots meanwhile.
    fn spawn<F, Fut>(&self, rt: &Handle, op: F)
    where
        F: FnOnce(Arc<Mutex<Tracker>>) -> Fut,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let task = op(self.tracker.clone());
        let tx = self.outcome_tx.clone();
        rt.spawn(async move {
            // The receiver is gone once the UI has quit
            let _ = tx.send(task.await);
        });
    }

    pub fn mount(&self, rt: &Handle) {
        self.spawn(rt, |tracker| async move {
            let mut tracker = tracker.lock().await;
            let notice = tracker.mount().await.err().map(|e| Notice::refresh_failed(&e));
            Outcome { notice, focus: None }
        });
    }

    pub fn refresh(&self, rt: &Handle) {
        self.spawn(rt, |tracker| async move {
            let mut tracker = tracker.lock().await;
            let notice = tracker.refresh_all().await.err().map(|e| Notice::refresh_failed(&e));
            Outcome { notice, focus: None }
        });
    }

    /// Adds whatever is in the input box, then clears it
    pub fn submit(&mut self, rt: &Handle) {
        let name = std::mem::take(&mut self.input);
        self.input_mode = InputMode::Normal;
        if name.trim().is_empty() {
            return;
        }

        self.spawn(rt, |tracker| async move {
            let result = tracker.lock().await.add_by_name(&name).await;
            Outcome {
                notice: Some(Notice::from_add_result(&result)),
                focus: result.ok().map(|entry| entry.id),
            }
        });
    }

    pub fn remove_selected(&mut self, rt: &Handle) {
        let Some(id) = self.selected_entry().map(|entry| entry.id) else {
            return;
        };
        self.show_detail = false;

        self.spawn(rt, move |tracker| async move {
            let removed = tracker.lock().await.remove(id);
            Outcome {
                notice: removed.then(Notice::removed),
                focus: None,
            }
        });
    }
}

pub fn run_ui(app: &mut App, rt: &Handle) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app, rt);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rt: &Handle,
) -> io::Result<()> {
    // Cached entries (or the loading screen) stay on screen while the first refresh runs
    app.mount(rt);

    loop {
        app.sync();
        terminal.draw(|f| ui(f, app))?;

        if !event::poll(TICK)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            let quit = match app.input_mode {
                InputMode::Normal => handle_normal_key(app, key, rt),
                InputMode::Editing => {
                    handle_editing_key(app, key, rt);
                    false
                }
            };
            if quit {
                return Ok(());
            }
        }
    }
}

fn handle_normal_key(app: &mut App, key: KeyEvent, rt: &Handle) -> bool {
    match key.code {
        KeyCode::Esc if app.show_detail => app.show_detail = false,
        KeyCode::Char('q') | KeyCode::Esc => return true,
        KeyCode::Enter => {
            if app.selected_entry().is_some() {
                app.show_detail = !app.show_detail;
            }
        }
        KeyCode::Char('a') | KeyCode::Char('/') => {
            app.input_mode = InputMode::Editing;
            app.notice = None;
        }
        KeyCode::Char('d') | KeyCode::Delete => app.remove_selected(rt),
        KeyCode::Char('r') => app.refresh(rt),
        KeyCode::Down | KeyCode::Char('j') => app.next(),
        KeyCode::Up | KeyCode::Char('k') => app.previous(),
        KeyCode::Home => app.state.select(Some(0)),
        KeyCode::End => {
            if app.entry_count() > 0 {
                app.state.select(Some(app.entry_count() - 1));
            }
        }
        _ => {}
    }
    app.clamp_selection();
    false
}

fn handle_editing_key(app: &mut App, key: KeyEvent, rt: &Handle) {
    match key.code {
        KeyCode::Enter => app.submit(rt),
        KeyCode::Esc => {
            app.input.clear();
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Backspace => {
            app.input.pop();
        }
        KeyCode::Char(c) => app.input.push(c),
        _ => {}
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(3), // Name input
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);
    render_input(f, chunks[1], app);

    let message = match app.current.view() {
        View::Loading => Some(("Loading Pokémon...".to_string(), Color::White)),
        View::Blocked(err) => Some((
            format!("Failed to fetch Pokémon data\n\n{}", err),
            Color::Red,
        )),
        View::Entries { .. } => None,
    };

    if let Some((text, color)) = message {
        render_message(f, chunks[2], &text, color);
    } else if app.show_detail {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(50), // Entry list
                Constraint::Percentage(50), // Detail panel
            ])
            .split(chunks[2]);

        render_table(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        render_table(f, chunks[2], app);
    }

    render_status_bar(f, chunks[3], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![
        Span::styled(
            "Pokémon Selector",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Tracked: {}", app.current.ids().len()),
            Style::default().fg(Color::White),
        ),
    ];

    if let View::Entries {
        refreshing, stale, ..
    } = app.current.view()
    {
        if refreshing {
            spans.push(Span::raw("  |  "));
            spans.push(Span::styled("refreshing...", Style::default().fg(Color::Cyan)));
        }
        if stale.is_some() {
            spans.push(Span::raw("  |  "));
            spans.push(Span::styled(
                "stale data (refresh failed)",
                Style::default().fg(Color::Red),
            ));
        }
    }

    let header = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn render_input(f: &mut Frame, area: Rect, app: &App) {
    let (text, style) = match app.input_mode {
        InputMode::Editing => (
            format!("{}▏", app.input),
            Style::default().fg(Color::Yellow),
        ),
        InputMode::Normal if app.input.is_empty() => (
            "Enter Pokémon name (press a)".to_string(),
            Style::default().fg(Color::DarkGray),
        ),
        InputMode::Normal => (app.input.clone(), Style::default().fg(Color::White)),
    };

    let input = Paragraph::new(text).style(style).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Add Pokémon "),
    );

    f.render_widget(input, area);
}

fn render_message(f: &mut Frame, area: Rect, text: &str, color: Color) {
    let message = Paragraph::new(text.to_string())
        .style(Style::default().fg(color))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL));

    f.render_widget(message, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["#", "Name", "Height", "Weight", "Base Exp", "Abilities"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows: Vec<Row> = app
        .current
        .cache()
        .iter()
        .map(|entry| {
            let cells = vec![
                Cell::from(entry.id.to_string()),
                Cell::from(capitalize(&entry.name)),
                Cell::from(format!("{}m", entry.height_m())),
                Cell::from(format!("{}kg", entry.weight_kg())),
                Cell::from(
                    entry
                        .base_experience
                        .map(|xp| xp.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Cell::from(truncate(&entry.ability_names().join(", "), 32)),
            ];
            Row::new(cells).height(1)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(5),
            Constraint::Length(16),
            Constraint::Length(8),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Pokémon "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![];

    if let Some(notice) = &app.notice {
        let color = if notice.is_destructive() {
            Color::Red
        } else {
            Color::Green
        };
        status_spans.push(Span::styled(
            format!(" {}: ", notice.title),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));
        status_spans.push(Span::styled(
            notice.description.clone(),
            Style::default().fg(color),
        ));
        status_spans.push(Span::raw(" | "));
    }

    let keys: &[(&str, &str)] = match app.input_mode {
        InputMode::Editing => &[("Enter", " Add | "), ("Esc", " Cancel")],
        InputMode::Normal => &[
            ("a", " Add | "),
            ("Enter", " Full Info | "),
            ("d", " Remove | "),
            ("r", " Refresh | "),
            ("↑/↓", " Nav | "),
        ],
    };
    for (key, label) in keys {
        status_spans.push(Span::styled(*key, Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(*label));
    }
    if app.input_mode == InputMode::Normal {
        status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
        status_spans.push(Span::raw(" Quit"));
    }

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn section(title: &str) -> Line<'static> {
    Line::from(vec![Span::styled(
        format!("  {}", title),
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
    )])
}

fn field(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("  {}: ", label),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(value),
    ])
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let Some(entry) = app.selected_entry() else {
        return;
    };

    let mut content = vec![
        Line::from(""),
        field("Name", capitalize(&entry.name)),
        field("Types", entry.type_names().join(", ")),
        field("Height", format!("{}m", entry.height_m())),
        field("Weight", format!("{}kg", entry.weight_kg())),
        field(
            "Base Experience",
            entry
                .base_experience
                .map(|xp| xp.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ),
        field("Cry", entry.cry_url(&app.cry_base_url)),
        Line::from(""),
        section("SPRITES"),
    ];

    for (label, url) in entry.sprites.gallery() {
        content.push(Line::from(vec![
            Span::styled(format!("  {:<20}", label), Style::default().fg(Color::DarkGray)),
            Span::styled(url.to_string(), Style::default().fg(Color::Green)),
        ]));
    }

    content.push(Line::from(""));
    content.push(section("ABILITIES"));
    for slot in &entry.abilities {
        let mut spans = vec![Span::raw(format!("  • {}", capitalize(&slot.ability.name)))];
        if slot.is_hidden {
            spans.push(Span::styled(" (Hidden)", Style::default().fg(Color::DarkGray)));
        }
        content.push(Line::from(spans));
    }

    content.push(Line::from(""));
    content.push(section("STATS"));
    for stat in &entry.stats {
        let filled = (stat.fraction() * STAT_BAR_WIDTH as f64).round() as usize;
        content.push(Line::from(vec![
            Span::raw(format!("  {:<16}", capitalize(&stat.stat.name))),
            Span::styled("█".repeat(filled), Style::default().fg(Color::Blue)),
            Span::styled(
                "░".repeat(STAT_BAR_WIDTH - filled),
                Style::default().fg(Color::DarkGray),
            ),
            Span::raw(format!(" {}", stat.base_stat)),
        ]));
    }

    content.push(Line::from(""));
    content.push(section("MOVES"));
    let (moves, remaining) = entry.move_preview(MOVE_PREVIEW_LIMIT);
    let names: Vec<String> = moves.iter().map(|m| capitalize(&m.learned.name)).collect();
    content.push(Line::from(format!("  {}", names.join(", "))));
    if remaining > 0 {
        content.push(Line::from(Span::styled(
            format!("  And {} more moves...", remaining),
            Style::default().fg(Color::DarkGray),
        )));
    }

    content.push(Line::from(""));
    content.push(Line::from(Span::styled(
        "  Press Enter to close",
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    )));

    let detail_panel = Paragraph::new(content)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(format!(" {} ", capitalize(&entry.name))),
        );

    f.render_widget(detail_panel, area);
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dex_tracker::{open_tracker, TrackerConfig};
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn body(id: u32, name: &str) -> Value {
        json!({
            "id": id,
            "name": name,
            "sprites": {},
            "height": 4,
            "weight": 60,
            "base_experience": 112,
            "abilities": [],
            "types": [],
            "stats": [],
            "moves": []
        })
    }

    fn app_against(server: &MockServer, dir: &tempfile::TempDir) -> App {
        let config = TrackerConfig {
            api_base_url: server.uri(),
            data_dir: dir.path().to_path_buf(),
            ..TrackerConfig::default()
        };
        let tracker = open_tracker(&config, "tui").unwrap();
        App::new(tracker, config.cry_base_url)
    }

    /// Syncs until a background operation has reported back
    async fn wait_for_outcome(app: &mut App) {
        for _ in 0..100 {
            if let Ok(outcome) = app.outcomes.try_recv() {
                app.sync();
                app.apply(outcome);
                app.clamp_selection();
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no outcome within 2s");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_screen_updates_while_first_load_runs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon/25"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(body(25, "pikachu"))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_against(&server, &dir);

        app.mount(&Handle::current());
        tokio::time::sleep(Duration::from_millis(50)).await;
        app.sync();
        assert_eq!(app.current.view(), View::Loading, "first frame while the lookup hangs");

        // Keys are still handled while the load is in flight
        app.next();
        app.input_mode = InputMode::Editing;
        app.input.push('x');
        assert_eq!(app.input, "x");

        wait_for_outcome(&mut app).await;
        assert!(app.notice.is_none());
        match app.current.view() {
            View::Entries { entries, refreshing, stale } => {
                assert_eq!(entries.len(), 1);
                assert!(!refreshing);
                assert!(stale.is_none());
            }
            other => panic!("expected entries, got {:?}", other),
        }
        assert_eq!(app.state.selected(), Some(0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_add_runs_in_background_and_focuses_new_entry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon/25"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(25, "pikachu")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pokemon/charmander"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(body(4, "charmander"))
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_against(&server, &dir);

        app.mount(&Handle::current());
        wait_for_outcome(&mut app).await;

        app.input = "charmander".to_string();
        app.submit(&Handle::current());
        assert_eq!(app.input_mode, InputMode::Normal);
        assert!(app.input.is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        app.sync();
        assert!(
            matches!(app.current.view(), View::Entries { refreshing: true, .. }),
            "lookup in flight shows as refreshing"
        );

        wait_for_outcome(&mut app).await;
        let notice = app.notice.as_ref().unwrap();
        assert_eq!(notice.title, "Pokémon Added");
        assert_eq!(app.selected_entry().map(|e| e.name.as_str()), Some("charmander"));
        assert_eq!(app.current.cache().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove_selected_clears_detail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon/25"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(25, "pikachu")))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_against(&server, &dir);

        app.mount(&Handle::current());
        wait_for_outcome(&mut app).await;
        app.show_detail = true;

        app.remove_selected(&Handle::current());
        assert!(!app.show_detail);

        wait_for_outcome(&mut app).await;
        assert_eq!(app.notice.as_ref().map(|n| n.title.as_str()), Some("Pokémon Removed"));
        assert_eq!(app.current.cache().len(), 0);
        assert_eq!(app.state.selected(), None);
    }
}
