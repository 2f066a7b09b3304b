use std::io::{self, Stdout};
use std::time::Duration;

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};
use ratatui::{Frame, Terminal};
use rowscope_core::catalog::TableSchema;
use rowscope_core::preferences::{resolve_theme, toggle_theme, PreferenceStore, Theme};
use rowscope_core::session::{
    BrowserBackend, BrowserSession, Notice, NoticeLevel, PendingDelete, SessionError,
};
use rowscope_core::value::{cell_text, edited_value, editable_text};
use thiserror::Error;
use tokio::runtime::Runtime;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pane {
    Tables,
    Rows,
    Query,
}

impl Pane {
    fn next(self) -> Self {
        match self {
            Self::Tables => Self::Rows,
            Self::Rows => Self::Query,
            Self::Query => Self::Tables,
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Tables => "Tables",
            Self::Rows => "Rows",
            Self::Query => "Query",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormKind {
    Insert,
    Edit,
}

#[derive(Debug, Clone, PartialEq)]
enum Mode {
    Browse,
    Form { kind: FormKind, field: usize },
    ConfirmDelete(PendingDelete),
    QueryInput,
}

/// Which keymap applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Browse,
    Text,
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectionKey {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Msg {
    Quit,
    ToggleHelp,
    NextPane,
    Submit,
    Cancel,
    Navigate(DirectionKey),
    NextPage,
    PreviousPage,
    OpenInsert,
    OpenEdit,
    RequestDelete,
    Refresh,
    ToggleTheme,
    Confirm,
    Decline,
    NextField,
    PreviousField,
    Input(char),
    Backspace,
}

#[derive(Debug, Clone, Copy)]
struct Palette {
    text: Color,
    background: Color,
    accent: Color,
    muted: Color,
    error: Color,
}

impl Palette {
    fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                text: Color::White,
                background: Color::Reset,
                accent: Color::Yellow,
                muted: Color::DarkGray,
                error: Color::LightRed,
            },
            Theme::Light => Self {
                text: Color::Black,
                background: Color::White,
                accent: Color::Blue,
                muted: Color::Gray,
                error: Color::Red,
            },
        }
    }

    fn base(self) -> Style {
        Style::default().fg(self.text).bg(self.background)
    }
}

/// Light when `COLORFGBG` reports a light background, dark otherwise.
fn system_theme() -> Theme {
    let background = std::env::var("COLORFGBG")
        .ok()
        .and_then(|raw| raw.rsplit(';').next().map(str::to_string));
    match background.as_deref() {
        Some("7" | "15") => Theme::Light,
        _ => Theme::Dark,
    }
}

struct TuiApp<B: BrowserBackend> {
    runtime: Runtime,
    session: BrowserSession<B>,
    preferences: Box<dyn PreferenceStore>,
    theme: Theme,
    pane: Pane,
    mode: Mode,
    table_cursor: usize,
    row_cursor: usize,
    query_text: String,
    show_help: bool,
    should_quit: bool,
    status: Notice,
}

impl<B: BrowserBackend> TuiApp<B> {
    fn new(
        runtime: Runtime,
        session: BrowserSession<B>,
        preferences: Box<dyn PreferenceStore>,
    ) -> Self {
        let theme = resolve_theme(preferences.as_ref(), system_theme());
        Self {
            runtime,
            session,
            preferences,
            theme,
            pane: Pane::Tables,
            mode: Mode::Browse,
            table_cursor: 0,
            row_cursor: 0,
            query_text: String::new(),
            show_help: false,
            should_quit: false,
            status: Notice::info("Select a table and press Enter"),
        }
    }

    fn start(&mut self) {
        let result = self.runtime.block_on(self.session.start());
        self.settle(result);
    }

    fn input_kind(&self) -> InputKind {
        match self.mode {
            Mode::Browse => InputKind::Browse,
            Mode::Form { .. } | Mode::QueryInput => InputKind::Text,
            Mode::ConfirmDelete(_) => InputKind::Confirm,
        }
    }

    fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Quit => self.should_quit = true,
            Msg::ToggleHelp => self.show_help = !self.show_help,
            Msg::NextPane => self.pane = self.pane.next(),
            Msg::Submit => self.submit(),
            Msg::Cancel => self.cancel(),
            Msg::Navigate(direction) => self.navigate(direction),
            Msg::NextPage => {
                let result = self.runtime.block_on(self.session.next_page());
                self.settle_page(result);
            }
            Msg::PreviousPage => {
                let result = self.runtime.block_on(self.session.previous_page());
                self.settle_page(result);
            }
            Msg::OpenInsert => self.open_insert(),
            Msg::OpenEdit => self.open_edit(),
            Msg::RequestDelete => self.request_delete(),
            Msg::Refresh => self.refresh(),
            Msg::ToggleTheme => self.toggle_theme(),
            Msg::Confirm => self.confirm_delete(),
            Msg::Decline => {
                self.session.decline_delete();
                self.mode = Mode::Browse;
                self.pull_notice();
            }
            Msg::NextField => self.move_field(true),
            Msg::PreviousField => self.move_field(false),
            Msg::Input(ch) => self.edit_text(|text| text.push(ch)),
            Msg::Backspace => self.edit_text(|text| {
                text.pop();
            }),
        }
    }

    fn submit(&mut self) {
        match self.mode.clone() {
            Mode::Browse => match self.pane {
                Pane::Tables => self.select_table(),
                Pane::Rows => self.open_edit(),
                Pane::Query => self.mode = Mode::QueryInput,
            },
            Mode::Form { kind, .. } => {
                let result = match kind {
                    FormKind::Insert => self.runtime.block_on(self.session.submit_insert()),
                    FormKind::Edit => self.runtime.block_on(self.session.submit_edit()),
                };
                if result.is_ok() {
                    self.mode = Mode::Browse;
                    self.clamp_row_cursor();
                }
                self.settle(result);
            }
            Mode::QueryInput => {
                let sql = self.query_text.clone();
                let result = self.runtime.block_on(self.session.run_query(&sql));
                self.mode = Mode::Browse;
                self.settle(result);
            }
            Mode::ConfirmDelete(_) => self.confirm_delete(),
        }
    }

    fn cancel(&mut self) {
        match self.mode {
            Mode::Form {
                kind: FormKind::Insert,
                ..
            } => self.session.cancel_insert(),
            Mode::Form {
                kind: FormKind::Edit,
                ..
            } => self.session.cancel_edit(),
            Mode::ConfirmDelete(_) => {
                self.session.decline_delete();
                self.pull_notice();
            }
            Mode::QueryInput | Mode::Browse => {}
        }
        self.mode = Mode::Browse;
    }

    fn select_table(&mut self) {
        let Some(table) = self
            .session
            .state()
            .tables
            .get(self.table_cursor)
            .map(|table| table.name.clone())
        else {
            self.status = Notice::info("No tables available");
            return;
        };

        let result = self.runtime.block_on(self.session.select_table(&table));
        self.row_cursor = 0;
        if result.is_ok() {
            self.pane = Pane::Rows;
            self.status = Notice::info(format!("Showing `{table}`"));
        }
        self.settle(result);
    }

    fn navigate(&mut self, direction: DirectionKey) {
        let (cursor, len) = match self.pane {
            Pane::Tables => (&mut self.table_cursor, self.session.state().tables.len()),
            Pane::Rows => (&mut self.row_cursor, self.session.state().row_count()),
            Pane::Query => return,
        };
        if len == 0 {
            return;
        }
        *cursor = match direction {
            DirectionKey::Up => cursor.saturating_sub(1),
            DirectionKey::Down => (*cursor + 1).min(len - 1),
        };
    }

    fn open_insert(&mut self) {
        let result = self.session.open_insert();
        if result.is_ok() {
            self.mode = Mode::Form {
                kind: FormKind::Insert,
                field: 0,
            };
        }
        self.settle(result);
    }

    fn open_edit(&mut self) {
        let result = self.session.open_edit(self.row_cursor);
        if result.is_ok() {
            self.mode = Mode::Form {
                kind: FormKind::Edit,
                field: 0,
            };
        }
        self.settle(result);
    }

    fn request_delete(&mut self) {
        match self.session.request_delete(self.row_cursor) {
            Ok(pending) => self.mode = Mode::ConfirmDelete(pending),
            Err(error) => self.settle(Err(error)),
        }
    }

    fn confirm_delete(&mut self) {
        let Mode::ConfirmDelete(pending) = std::mem::replace(&mut self.mode, Mode::Browse) else {
            return;
        };
        let result = self
            .runtime
            .block_on(self.session.confirm_delete(&pending.token));
        self.clamp_row_cursor();
        self.settle(result);
    }

    /// Rows and Query retry the schema first when it failed to load.
    fn refresh(&mut self) {
        let state = self.session.state();
        let schema_missing = state.selected_table.is_some() && state.current_schema().is_none();
        let result = match self.pane {
            Pane::Tables => self.runtime.block_on(self.session.refresh_tables()),
            Pane::Rows | Pane::Query if schema_missing => {
                self.runtime.block_on(self.session.reload_schema())
            }
            Pane::Rows | Pane::Query => self.runtime.block_on(self.session.refresh_page()),
        };
        self.clamp_row_cursor();
        self.settle(result);
    }

    fn toggle_theme(&mut self) {
        match toggle_theme(self.preferences.as_mut(), self.theme) {
            Ok(theme) => {
                self.theme = theme;
                self.status = Notice::info(format!("Theme: {}", theme.as_str()));
            }
            Err(error) => {
                log::warn!("failed to save theme: {error}");
                self.theme = self.theme.toggled();
                self.status = Notice::error(format!("Theme not saved: {error}"));
            }
        }
    }

    fn move_field(&mut self, forward: bool) {
        let count = self
            .session
            .state()
            .current_schema()
            .map_or(0, |schema| schema.columns.len());
        if let Mode::Form { field, .. } = &mut self.mode {
            if count == 0 {
                return;
            }
            *field = if forward {
                (*field + 1) % count
            } else {
                (*field + count - 1) % count
            };
        }
    }

    fn edit_text(&mut self, edit: impl FnOnce(&mut String)) {
        let (kind, field) = match self.mode {
            Mode::Form { kind, field } => (kind, field),
            Mode::QueryInput => {
                edit(&mut self.query_text);
                return;
            }
            Mode::Browse | Mode::ConfirmDelete(_) => return,
        };

        let Some(column) = self
            .session
            .state()
            .current_schema()
            .and_then(|schema| schema.columns.get(field))
            .map(|column| column.name.clone())
        else {
            return;
        };
        let draft = match kind {
            FormKind::Insert => self.session.insert_draft_mut(),
            FormKind::Edit => self.session.edit_draft_mut(),
        };
        let Some(draft) = draft else {
            return;
        };

        let previous = draft.get(&column).cloned();
        let original = previous.as_ref().map(editable_text).unwrap_or_default();
        let mut text = original.clone();
        edit(&mut text);
        if text != original {
            draft.set(column, edited_value(previous.as_ref(), text));
        }
    }

    fn settle_page(&mut self, result: Result<bool, SessionError>) {
        match result {
            Ok(true) => self.row_cursor = 0,
            Ok(false) => self.status = Notice::info("No more pages in that direction"),
            Err(error) => self.settle(Err(error)),
        }
        self.pull_notice();
    }

    fn settle(&mut self, result: Result<(), SessionError>) {
        if let Err(error) = result {
            log::debug!("action failed: {error}");
        }
        self.pull_notice();
    }

    fn pull_notice(&mut self) {
        if let Some(notice) = self.session.take_notice() {
            self.status = notice;
        }
    }

    fn clamp_row_cursor(&mut self) {
        let len = self.session.state().row_count();
        self.row_cursor = self.row_cursor.min(len.saturating_sub(1));
    }
}

pub fn run<B: BrowserBackend>(
    session: BrowserSession<B>,
    preferences: Box<dyn PreferenceStore>,
) -> Result<(), TuiError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let mut app = TuiApp::new(runtime, session, preferences);
    app.start();

    let mut terminal = setup_terminal()?;
    let run_result = run_loop(&mut terminal, &mut app);
    let restore_result = restore_terminal(&mut terminal);

    if let Err(error) = run_result {
        restore_result?;
        return Err(error);
    }

    restore_result?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), TuiError> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop<B: BrowserBackend>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut TuiApp<B>,
) -> Result<(), TuiError> {
    while !app.should_quit {
        terminal.draw(|frame| render(frame, app))?;

        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(message) = map_key_event(app.input_kind(), key) {
                        app.handle(message);
                    }
                }
            }
        }
    }

    Ok(())
}

fn render<B: BrowserBackend>(frame: &mut Frame<'_>, app: &TuiApp<B>) {
    let palette = Palette::for_theme(app.theme);
    frame.render_widget(Block::default().style(palette.base()), frame.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(4),
        ])
        .split(frame.area());

    render_header(frame, app, palette, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(25), Constraint::Percentage(75)])
        .split(chunks[1]);
    render_tables(frame, app, palette, body[0]);
    if app.pane == Pane::Query {
        render_query(frame, app, palette, body[1]);
    } else {
        render_rows(frame, app, palette, body[1]);
    }

    render_footer(frame, app, palette, chunks[2]);

    match &app.mode {
        Mode::Form { kind, field } => render_form(frame, app, palette, *kind, *field),
        Mode::ConfirmDelete(pending) => render_confirm(frame, palette, pending),
        Mode::Browse | Mode::QueryInput => {}
    }
    if app.show_help {
        render_help_popup(frame, palette);
    }
}

fn pane_block(title: String, focused: bool, palette: Palette) -> Block<'static> {
    let border = if focused { palette.accent } else { palette.muted };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(title)
}

fn render_header<B: BrowserBackend>(
    frame: &mut Frame<'_>,
    app: &TuiApp<B>,
    palette: Palette,
    area: Rect,
) {
    let state = app.session.state();
    let page = state.window.as_ref().map_or_else(
        || "-".to_string(),
        |window| {
            format!(
                "{} of {} ({} rows)",
                window.page,
                window.page_count(),
                window.total
            )
        },
    );
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            format!(" {} ", app.pane.title()),
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::raw(format!(
            "Table: {}",
            state.selected_table.as_deref().unwrap_or("-")
        )),
        Span::raw(" | "),
        Span::raw(format!("Page: {page}")),
        Span::raw(" | "),
        Span::raw(if state.mode.readonly {
            "read-only"
        } else {
            "writable"
        }),
    ]))
    .style(palette.base())
    .block(Block::default().borders(Borders::ALL).title("rowscope"));
    frame.render_widget(header, area);
}

fn render_tables<B: BrowserBackend>(
    frame: &mut Frame<'_>,
    app: &TuiApp<B>,
    palette: Palette,
    area: Rect,
) {
    let state = app.session.state();
    let mut lines = Vec::with_capacity(state.tables.len().max(1));
    for (index, table) in state.tables.iter().enumerate() {
        let marker = if index == app.table_cursor { ">" } else { " " };
        let mut style = palette.base();
        if state.selected_table.as_deref() == Some(table.name.as_str()) {
            style = style.fg(palette.accent);
        }
        lines.push(Line::from(vec![
            Span::styled(format!("{marker} {}", table.name), style),
            Span::styled(
                format!(" ({})", table.row_count),
                Style::default().fg(palette.muted),
            ),
        ]));
    }
    if lines.is_empty() {
        lines.push(Line::from("No tables"));
    }

    let list = Paragraph::new(lines).style(palette.base()).block(pane_block(
        "Tables".to_string(),
        app.pane == Pane::Tables,
        palette,
    ));
    frame.render_widget(list, area);
}

fn header_cells(columns: &[String], schema: Option<&TableSchema>) -> Vec<Cell<'static>> {
    columns
        .iter()
        .map(|name| {
            let is_key = schema
                .and_then(|schema| schema.column(name))
                .is_some_and(|column| column.primary_key);
            if is_key {
                Cell::from(format!("{name} *"))
            } else {
                Cell::from(name.clone())
            }
        })
        .collect()
}

fn render_rows<B: BrowserBackend>(
    frame: &mut Frame<'_>,
    app: &TuiApp<B>,
    palette: Palette,
    area: Rect,
) {
    let state = app.session.state();
    let block = pane_block("Rows".to_string(), app.pane == Pane::Rows, palette);
    let Some(window) = &state.window else {
        let hint = if state.selected_table.is_some() {
            "Loading..."
        } else {
            "Select a table to browse its rows"
        };
        frame.render_widget(Paragraph::new(hint).style(palette.base()).block(block), area);
        return;
    };

    let widths = vec![Constraint::Fill(1); window.columns.len().max(1)];
    let rows = window
        .rows
        .iter()
        .map(|row| Row::new(row.iter().map(|value| Cell::from(cell_text(value)))));
    let table = Table::new(rows, widths)
        .header(
            Row::new(header_cells(&window.columns, state.current_schema()))
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .style(palette.base())
        .row_highlight_style(Style::default().fg(palette.background).bg(palette.accent))
        .block(block);

    let mut table_state = TableState::default().with_selected(Some(app.row_cursor));
    frame.render_stateful_widget(table, area, &mut table_state);
}

fn render_query<B: BrowserBackend>(
    frame: &mut Frame<'_>,
    app: &TuiApp<B>,
    palette: Palette,
    area: Rect,
) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(3)])
        .split(area);

    let editing = app.mode == Mode::QueryInput;
    let title = if editing {
        "SQL (Enter: run, Esc: stop editing)"
    } else {
        "SQL (Enter: edit)"
    };
    let editor = Paragraph::new(format!("{}{}", app.query_text, if editing { "_" } else { "" }))
        .style(palette.base())
        .wrap(Wrap { trim: false })
        .block(pane_block(title.to_string(), true, palette));
    frame.render_widget(editor, sections[0]);

    let Some(result) = &app.session.state().query_result else {
        frame.render_widget(
            Paragraph::new("No query run yet")
                .style(palette.base())
                .block(pane_block("Result".to_string(), false, palette)),
            sections[1],
        );
        return;
    };

    let widths = vec![Constraint::Fill(1); result.columns.len().max(1)];
    let rows = result
        .rows
        .iter()
        .map(|row| Row::new(row.iter().map(|value| Cell::from(cell_text(value)))));
    let table = Table::new(rows, widths)
        .header(
            Row::new(result.columns.iter().cloned().map(Cell::from))
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .style(palette.base())
        .block(pane_block(
            format!("Result ({} rows)", result.row_count()),
            false,
            palette,
        ));
    frame.render_widget(table, sections[1]);
}

fn render_footer<B: BrowserBackend>(
    frame: &mut Frame<'_>,
    app: &TuiApp<B>,
    palette: Palette,
    area: Rect,
) {
    let keys = match app.mode {
        Mode::Browse => {
            "Enter: open | i: insert | e: edit | d: delete | n/p: page | r: refresh | t: theme | ?: help"
        }
        Mode::Form { .. } => "Tab: next field | Enter: save | Esc: cancel",
        Mode::ConfirmDelete(_) => "y: delete | n: keep",
        Mode::QueryInput => "Enter: run | Esc: stop editing",
    };
    let status_color = match app.status.level {
        NoticeLevel::Info => palette.text,
        NoticeLevel::Error => palette.error,
    };
    let footer = Paragraph::new(vec![
        Line::from(Span::styled(keys, Style::default().fg(palette.muted))),
        Line::from(Span::styled(
            app.status.message.clone(),
            Style::default().fg(status_color),
        )),
    ])
    .style(palette.base())
    .block(Block::default().borders(Borders::ALL).title("Status"));
    frame.render_widget(footer, area);
}

fn render_form<B: BrowserBackend>(
    frame: &mut Frame<'_>,
    app: &TuiApp<B>,
    palette: Palette,
    kind: FormKind,
    active: usize,
) {
    let state = app.session.state();
    let (title, draft) = match kind {
        FormKind::Insert => ("Insert row", state.insert_draft.as_ref()),
        FormKind::Edit => ("Edit row", state.edit.as_ref().map(|flow| &flow.draft)),
    };

    let mut lines = Vec::new();
    if let Some(schema) = state.current_schema() {
        for (index, column) in schema.columns.iter().enumerate() {
            let marker = if index == active { ">" } else { " " };
            let value = draft
                .and_then(|draft| draft.get(&column.name))
                .map(editable_text)
                .unwrap_or_default();
            let mut flags = Vec::new();
            if column.primary_key {
                flags.push("pk".to_string());
            }
            if column.not_null {
                flags.push("not null".to_string());
            }
            if let Some(default) = &column.default_value {
                flags.push(format!("default {default}"));
            }

            let label_style = if index == active {
                Style::default()
                    .fg(palette.accent)
                    .add_modifier(Modifier::BOLD)
            } else {
                palette.base()
            };
            lines.push(Line::from(vec![
                Span::styled(format!("{marker} {} ", column.name), label_style),
                Span::styled(
                    format!("{} {}", column.data_type, flags.join(", ")),
                    Style::default().fg(palette.muted),
                ),
            ]));
            lines.push(Line::from(format!("    {value}")));
        }
    }
    if kind == FormKind::Insert {
        lines.push(Line::from(Span::styled(
            "Empty fields are left for the database to fill.",
            Style::default().fg(palette.muted),
        )));
    }

    let area = centered_rect(60, 70, frame.area());
    frame.render_widget(Clear, area);
    let form = Paragraph::new(lines)
        .style(palette.base())
        .block(pane_block(title.to_string(), true, palette));
    frame.render_widget(form, area);
}

fn render_confirm(frame: &mut Frame<'_>, palette: Palette, pending: &PendingDelete) {
    let area = centered_rect(50, 20, frame.area());
    frame.render_widget(Clear, area);
    let prompt = Paragraph::new(vec![
        Line::from(format!(
            "Delete row {} from `{}`?",
            pending.key, pending.table
        )),
        Line::from(""),
        Line::from("y: delete    n / Esc: keep"),
    ])
    .style(palette.base())
    .wrap(Wrap { trim: true })
    .block(pane_block("Confirm delete".to_string(), true, palette));
    frame.render_widget(prompt, area);
}

fn render_help_popup(frame: &mut Frame<'_>, palette: Palette) {
    let area = centered_rect(70, 70, frame.area());
    frame.render_widget(Clear, area);
    let help = Paragraph::new(vec![
        Line::from("Global keymap"),
        Line::from("q / Ctrl+C: quit"),
        Line::from("?: toggle help"),
        Line::from("Tab: cycle panes"),
        Line::from("Enter: open table, edit row, or edit query (by pane)"),
        Line::from("Arrows or j/k: move cursor"),
        Line::from("n / p (or Right / Left): next / previous page"),
        Line::from("i: insert row, e: edit row, d: delete row"),
        Line::from("r: refresh current pane (reloads a schema that failed to load)"),
        Line::from("t: toggle light / dark theme"),
        Line::from(""),
        Line::from("In forms: Tab / Shift+Tab move between fields, Esc cancels"),
        Line::from("Insert leaves empty fields out; edit sends a cleared field as \"\""),
        Line::from("Untouched fields keep their value, NULL included"),
    ])
    .style(palette.base())
    .block(pane_block("Help".to_string(), true, palette));
    frame.render_widget(help, area);
}

fn centered_rect(width_percent: u16, height_percent: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100_u16 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100_u16 - height_percent) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100_u16 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100_u16 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}

fn map_key_event(kind: InputKind, key: KeyEvent) -> Option<Msg> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Msg::Quit);
    }

    match kind {
        InputKind::Browse => map_browse_key(key),
        InputKind::Text => match key.code {
            KeyCode::Esc => Some(Msg::Cancel),
            KeyCode::Enter => Some(Msg::Submit),
            KeyCode::Tab | KeyCode::Down => Some(Msg::NextField),
            KeyCode::BackTab | KeyCode::Up => Some(Msg::PreviousField),
            KeyCode::Backspace => Some(Msg::Backspace),
            KeyCode::Char(ch) => Some(Msg::Input(ch)),
            _ => None,
        },
        InputKind::Confirm => match key.code {
            KeyCode::Char('y' | 'Y') => Some(Msg::Confirm),
            KeyCode::Char('n' | 'N') | KeyCode::Esc => Some(Msg::Decline),
            _ => None,
        },
    }
}

fn map_browse_key(key: KeyEvent) -> Option<Msg> {
    match key.code {
        KeyCode::Char('q') => Some(Msg::Quit),
        KeyCode::Char('?') => Some(Msg::ToggleHelp),
        KeyCode::Tab => Some(Msg::NextPane),
        KeyCode::Enter => Some(Msg::Submit),
        KeyCode::Esc => Some(Msg::Cancel),
        KeyCode::Up | KeyCode::Char('k') => Some(Msg::Navigate(DirectionKey::Up)),
        KeyCode::Down | KeyCode::Char('j') => Some(Msg::Navigate(DirectionKey::Down)),
        KeyCode::Right | KeyCode::Char('n') => Some(Msg::NextPage),
        KeyCode::Left | KeyCode::Char('p') => Some(Msg::PreviousPage),
        KeyCode::Char('i') => Some(Msg::OpenInsert),
        KeyCode::Char('e') => Some(Msg::OpenEdit),
        KeyCode::Char('d') => Some(Msg::RequestDelete),
        KeyCode::Char('r') => Some(Msg::Refresh),
        KeyCode::Char('t') => Some(Msg::ToggleTheme),
        _ => None,
    }
}
