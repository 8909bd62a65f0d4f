use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use parkinup::{
    detect_plate_with_timeout, format_currency, format_duration, format_timestamp, Config,
    Occupancy, ParkedDuration, ParkingController, PaymentRecord, PlateDetector, Receipt, Slot,
    VehicleSession,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use rust_decimal::Decimal;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Slots per row in the overview grid
const GRID_COLUMNS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    Slots,
    Vehicles,
    Payments,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Dashboard => Page::Slots,
            Page::Slots => Page::Vehicles,
            Page::Vehicles => Page::Payments,
            Page::Payments => Page::Dashboard,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Dashboard => Page::Payments,
            Page::Slots => Page::Dashboard,
            Page::Vehicles => Page::Slots,
            Page::Payments => Page::Vehicles,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Dashboard => "Dashboard",
            Page::Slots => "Slots",
            Page::Vehicles => "Vehicles",
            Page::Payments => "Payments",
        }
    }
}

/// Which form (if any) is capturing keystrokes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    CheckIn {
        plate: String,
        owner: String,
        editing_owner: bool,
    },
    CheckOut {
        plate: String,
    },
    Provision {
        total: String,
    },
    DetectPlate {
        path: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
}

pub struct App {
    controller: ParkingController,
    detector: Arc<dyn PlateDetector>,
    config: Config,
    pub current_page: Page,
    pub parked: Vec<ParkedDuration>,
    pub slots: Vec<Slot>,
    pub history: Vec<VehicleSession>,
    pub payments: Vec<PaymentRecord>,
    pub revenue: Decimal,
    pub occupancy: Occupancy,
    pub state: TableState,
    pub input: InputMode,
    pub message: Option<StatusMessage>,
    pub receipt: Option<Receipt>,
    last_tick: Instant,
}

impl App {
    pub fn new(
        controller: ParkingController,
        detector: Arc<dyn PlateDetector>,
        config: Config,
    ) -> Result<Self> {
        let mut app = Self {
            controller,
            detector,
            config,
            current_page: Page::Dashboard,
            parked: Vec::new(),
            slots: Vec::new(),
            history: Vec::new(),
            payments: Vec::new(),
            revenue: Decimal::ZERO,
            occupancy: Occupancy::default(),
            state: TableState::default(),
            input: InputMode::Normal,
            message: None,
            receipt: None,
            last_tick: Instant::now(),
        };
        app.refresh()?;
        Ok(app)
    }

    /// Reload everything shown on screen
    pub fn refresh(&mut self) -> Result<()> {
        self.parked = self.controller.parked_durations()?;
        self.slots = self.controller.list_slots()?;
        self.history = self.controller.vehicle_history()?;
        self.payments = self.controller.payments()?;
        self.revenue = self.controller.revenue_total()?;
        self.occupancy = self.controller.occupancy()?;
        self.clamp_selection();
        Ok(())
    }

    /// Timer tick: recompute elapsed durations only
    pub fn tick(&mut self) {
        match self.controller.parked_durations() {
            Ok(parked) => {
                self.parked = parked;
                self.clamp_selection();
            }
            Err(e) => self.set_error(format!("Refresh failed: {}", e)),
        }
        self.last_tick = Instant::now();
    }

    fn row_count(&self) -> usize {
        match self.current_page {
            Page::Dashboard => self.parked.len(),
            Page::Slots => self.slots.len(),
            Page::Vehicles => self.history.len(),
            Page::Payments => self.payments.len(),
        }
    }

    fn clamp_selection(&mut self) {
        let len = self.row_count();
        match self.state.selected() {
            _ if len == 0 => self.state.select(None),
            Some(i) if i >= len => self.state.select(Some(len - 1)),
            None => self.state.select(Some(0)),
            _ => {}
        }
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
        self.state.select(None);
        self.clamp_selection();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
        self.state.select(None);
        self.clamp_selection();
    }

    pub fn next(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    fn set_info(&mut self, text: String) {
        self.message = Some(StatusMessage { text, is_error: false });
    }

    fn set_error(&mut self, text: String) {
        self.message = Some(StatusMessage { text, is_error: true });
    }

    /// Plate of the highlighted parked vehicle, used to prefill check-out
    fn selected_parked_plate(&self) -> Option<String> {
        if self.current_page != Page::Dashboard {
            return None;
        }
        self.state
            .selected()
            .and_then(|i| self.parked.get(i))
            .map(|p| p.session.vehicle_number.clone())
    }

    // ========================================================================
    // ACTIONS
    // ========================================================================

    pub fn submit_check_in(&mut self, plate: &str, owner: &str) {
        let owner = if owner.trim().is_empty() { None } else { Some(owner) };
        match self.controller.check_in(plate, owner) {
            Ok(slot) => self.set_info(format!("Vehicle {} parked in {}", plate.trim(), slot)),
            Err(e) => self.set_error(e.to_string()),
        }
        self.refresh_or_report();
    }

    pub fn submit_check_out(&mut self, plate: &str) {
        match self.controller.check_out(plate) {
            Ok(receipt) => {
                self.set_info(format!(
                    "{} exited, paid {}",
                    receipt.vehicle_number,
                    format_currency(receipt.amount, &self.config.currency_symbol)
                ));
                self.receipt = Some(receipt);
            }
            Err(e) => self.set_error(e.to_string()),
        }
        self.refresh_or_report();
    }

    pub fn submit_provision(&mut self, raw: &str) {
        match raw.trim().parse::<u32>() {
            Ok(total) if total > 0 => match self.controller.provision_slots(total) {
                Ok(count) => self.set_info(format!("Slots updated! Total slots: {}", count)),
                Err(e) => self.set_error(e.to_string()),
            },
            _ => self.set_error("Enter a valid positive number.".to_string()),
        }
        self.refresh_or_report();
    }

    /// Run detection and, on success, open the check-in form prefilled
    pub fn submit_detect(&mut self, path: &str) {
        let plate = detect_plate_with_timeout(
            self.detector.clone(),
            PathBuf::from(path.trim()),
            self.config.ocr_timeout(),
        );

        match plate {
            Some(plate) => {
                self.set_info(format!("Detected Plate: {}", plate));
                self.input = InputMode::CheckIn {
                    plate,
                    owner: String::new(),
                    editing_owner: false,
                };
            }
            None => {
                self.set_error("Plate not detected; enter it manually.".to_string());
                self.input = InputMode::CheckIn {
                    plate: String::new(),
                    owner: String::new(),
                    editing_owner: false,
                };
            }
        }
    }

    fn refresh_or_report(&mut self) {
        if let Err(e) = self.refresh() {
            self.set_error(format!("Refresh failed: {}", e));
        }
    }

    // ========================================================================
    // KEY HANDLING
    // ========================================================================

    /// Returns false when the app should quit
    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> bool {
        if self.receipt.is_some() {
            self.receipt = None;
            return true;
        }

        let input = std::mem::replace(&mut self.input, InputMode::Normal);
        match input {
            InputMode::Normal => return self.handle_normal_key(code, modifiers),
            InputMode::CheckIn {
                mut plate,
                mut owner,
                editing_owner,
            } => match code {
                KeyCode::Esc => {}
                KeyCode::Tab => {
                    self.input = InputMode::CheckIn {
                        plate,
                        owner,
                        editing_owner: !editing_owner,
                    }
                }
                KeyCode::Enter => self.submit_check_in(&plate, &owner),
                _ => {
                    let field = if editing_owner { &mut owner } else { &mut plate };
                    edit_field(field, code);
                    self.input = InputMode::CheckIn {
                        plate,
                        owner,
                        editing_owner,
                    };
                }
            },
            InputMode::CheckOut { mut plate } => match code {
                KeyCode::Esc => {}
                KeyCode::Enter => self.submit_check_out(&plate),
                _ => {
                    edit_field(&mut plate, code);
                    self.input = InputMode::CheckOut { plate };
                }
            },
            InputMode::Provision { mut total } => match code {
                KeyCode::Esc => {}
                KeyCode::Enter => self.submit_provision(&total),
                _ => {
                    edit_field(&mut total, code);
                    self.input = InputMode::Provision { total };
                }
            },
            InputMode::DetectPlate { mut path } => match code {
                KeyCode::Esc => {}
                KeyCode::Enter => self.submit_detect(&path),
                _ => {
                    edit_field(&mut path, code);
                    self.input = InputMode::DetectPlate { path };
                }
            },
        }
        true
    }

    fn handle_normal_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return false,
            KeyCode::Tab => self.next_page(),
            KeyCode::BackTab => self.previous_page(),
            KeyCode::Char('i') => {
                self.input = InputMode::CheckIn {
                    plate: String::new(),
                    owner: String::new(),
                    editing_owner: false,
                }
            }
            KeyCode::Char('o') => {
                self.input = InputMode::CheckOut {
                    plate: self.selected_parked_plate().unwrap_or_default(),
                }
            }
            KeyCode::Char('p') => {
                self.input = InputMode::Provision {
                    total: self.occupancy.total.to_string(),
                }
            }
            KeyCode::Char('d') => self.input = InputMode::DetectPlate { path: String::new() },
            KeyCode::Char('r') => {
                self.refresh_or_report();
                self.set_info("Refreshed".to_string());
            }
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => return false,
            KeyCode::Down | KeyCode::Char('j') => self.next(),
            KeyCode::Up | KeyCode::Char('k') => self.previous(),
            KeyCode::Home => {
                if self.row_count() > 0 {
                    self.state.select(Some(0));
                }
            }
            KeyCode::End => {
                let len = self.row_count();
                if len > 0 {
                    self.state.select(Some(len - 1));
                }
            }
            _ => {}
        }
        true
    }
}

fn edit_field(field: &mut String, code: KeyCode) {
    match code {
        KeyCode::Backspace => {
            field.pop();
        }
        KeyCode::Char(c) => field.push(c),
        _ => {}
    }
}

// ============================================================================
// EVENT LOOP
// ============================================================================

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    let tick_rate = app.config.refresh_interval();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate.saturating_sub(app.last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && !app.handle_key(key.code, key.modifiers) {
                    return Ok(());
                }
            }
        }

        if app.last_tick.elapsed() >= tick_rate {
            app.tick();
        }
    }
}

// ============================================================================
// RENDERING
// ============================================================================

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Dashboard => render_dashboard(f, chunks[1], app),
        Page::Slots => render_slots(f, chunks[1], app),
        Page::Vehicles => render_vehicles(f, chunks[1], app),
        Page::Payments => render_payments(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);

    if app.input != InputMode::Normal {
        render_input_popup(f, app);
    }
    if let Some(receipt) = &app.receipt {
        render_receipt_popup(f, receipt, &app.config.currency_symbol);
    }
}

fn header_style() -> Style {
    Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD)
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    Row::new(titles.iter().map(|h| Cell::from(*h).style(header_style())))
        .style(Style::default().bg(Color::DarkGray))
        .height(1)
}

fn table_block(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(title)
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let pages = [Page::Dashboard, Page::Slots, Page::Vehicles, Page::Payments];

    let mut tab_spans = vec![Span::styled(
        "ParkinUP  ",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )];
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!(
            "🅿 Available Slots: {} / {}",
            app.occupancy.available, app.occupancy.total
        ),
        Style::default().fg(Color::Green),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!(
            "Rate: {}/hour",
            format_currency(app.controller.rate().hourly(), &app.config.currency_symbol)
        ),
        Style::default().fg(Color::White),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn render_dashboard(f: &mut Frame, area: Rect, app: &mut App) {
    let symbol = app.config.currency_symbol.clone();
    let rows = app.parked.iter().map(|p| {
        let running = app
            .controller
            .current_fee(&p.session.vehicle_number)
            .map(|q| format_currency(q.amount, &symbol))
            .unwrap_or_else(|_| "-".to_string());

        Row::new(vec![
            Cell::from(p.session.vehicle_number.clone()),
            Cell::from(p.session.slot_number.clone()),
            Cell::from(p.session.owner_name.clone().unwrap_or_default()),
            Cell::from(format_timestamp(&p.session.entry_time)),
            Cell::from(format_duration(p.elapsed_minutes)),
            Cell::from(running).style(Style::default().fg(Color::Green)),
        ])
    });

    let title = if app.parked.is_empty() {
        " No vehicles currently parked "
    } else {
        " Parked Vehicles "
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(14),
            Constraint::Length(10),
            Constraint::Length(20),
            Constraint::Length(21),
            Constraint::Length(14),
            Constraint::Length(12),
        ],
    )
    .header(header_row(&["Vehicle", "Slot", "Owner", "Entry", "Duration", "Fee so far"]))
    .block(table_block(title))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_slots(f: &mut Frame, area: Rect, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);

    // Grid overview
    let grid: Vec<Line> = app
        .slots
        .chunks(GRID_COLUMNS)
        .map(|row| {
            let mut spans = Vec::new();
            for slot in row {
                let number = slot
                    .slot_number
                    .strip_prefix(parkinup::db::SLOT_PREFIX)
                    .unwrap_or(&slot.slot_number);
                let style = if slot.occupied {
                    Style::default().fg(Color::Black).bg(Color::Red)
                } else {
                    Style::default().fg(Color::Black).bg(Color::Green)
                };
                spans.push(Span::styled(format!(" {:>3} ", number), style));
                spans.push(Span::raw(" "));
            }
            Line::from(spans)
        })
        .collect();

    let overview = Paragraph::new(grid).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(
                " Overview: {} occupied / {} available ",
                app.occupancy.occupied, app.occupancy.available
            )),
    );
    f.render_widget(overview, chunks[0]);

    // Slot table with the current occupant
    let rows = app.slots.iter().map(|slot| {
        let (status, color) = if slot.occupied {
            ("Occupied", Color::Red)
        } else {
            ("Available", Color::Green)
        };
        let occupant = app
            .parked
            .iter()
            .find(|p| p.session.slot_id == slot.slot_id)
            .map(|p| p.session.vehicle_number.clone())
            .unwrap_or_default();

        Row::new(vec![
            Cell::from(slot.slot_number.clone()),
            Cell::from(status).style(Style::default().fg(color)),
            Cell::from(occupant),
        ])
    });

    let table = Table::new(
        rows,
        [Constraint::Length(10), Constraint::Length(11), Constraint::Min(10)],
    )
    .header(header_row(&["Slot", "Status", "Vehicle"]))
    .block(table_block(" Slot Status "))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, chunks[1], &mut app.state);
}

fn render_vehicles(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.history.iter().map(|s| {
        let color = if s.is_active() { Color::Green } else { Color::DarkGray };
        Row::new(vec![
            Cell::from(s.owner_name.clone().unwrap_or_default()),
            Cell::from(s.vehicle_number.clone()),
            Cell::from(s.slot_number.clone()),
            Cell::from(format_timestamp(&s.entry_time)),
            Cell::from(
                s.exit_time
                    .map(|t| format_timestamp(&t))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::from(s.status()).style(Style::default().fg(color)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Length(14),
            Constraint::Length(10),
            Constraint::Length(21),
            Constraint::Length(21),
            Constraint::Length(8),
        ],
    )
    .header(header_row(&["Owner", "Vehicle", "Slot", "Entry", "Exit", "Status"]))
    .block(table_block(" Vehicles "))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_payments(f: &mut Frame, area: Rect, app: &mut App) {
    let symbol = app.config.currency_symbol.clone();
    let rows = app.payments.iter().map(|p| {
        Row::new(vec![
            Cell::from(p.vehicle_number.clone()),
            Cell::from(format_currency(p.amount, &symbol)).style(Style::default().fg(Color::Green)),
            Cell::from(format_timestamp(&p.payment_time)),
        ])
    });

    let title = format!(" Payments | Total Revenue: {} ", format_currency(app.revenue, &symbol));

    let table = Table::new(
        rows,
        [Constraint::Length(14), Constraint::Length(14), Constraint::Length(21)],
    )
    .header(header_row(&["Vehicle", "Amount", "Time"]))
    .block(table_block(&title))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = Vec::new();

    if let Some(message) = &app.message {
        let color = if message.is_error { Color::Red } else { Color::Green };
        status_spans.push(Span::styled(
            format!(" {} ", message.text),
            Style::default().fg(color),
        ));
        status_spans.push(Span::raw("|"));
    }

    for (key, label) in [
        ("i", " Park"),
        ("o", " Exit"),
        ("d", " Detect"),
        ("p", " Slots"),
        ("Tab", " Page"),
        ("r", " Refresh"),
    ] {
        status_spans.push(Span::raw(" "));
        status_spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(label));
        status_spans.push(Span::raw(" |"));
    }
    status_spans.push(Span::raw(" "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_input_popup(f: &mut Frame, app: &App) {
    let active = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let idle = Style::default().fg(Color::White);

    let (title, lines) = match &app.input {
        InputMode::Normal => return,
        InputMode::CheckIn {
            plate,
            owner,
            editing_owner,
        } => (
            " Park Vehicle ",
            vec![
                Line::from(Span::styled(
                    format!("License plate: {}", plate),
                    if *editing_owner { idle } else { active },
                )),
                Line::from(Span::styled(
                    format!("Owner (optional): {}", owner),
                    if *editing_owner { active } else { idle },
                )),
                Line::from(""),
                Line::from("Tab switch field | Enter park | Esc cancel"),
            ],
        ),
        InputMode::CheckOut { plate } => (
            " Exit Vehicle ",
            vec![
                Line::from(Span::styled(format!("License plate: {}", plate), active)),
                Line::from(""),
                Line::from("Enter process exit | Esc cancel"),
            ],
        ),
        InputMode::Provision { total } => (
            " Add or Update Total Slots ",
            vec![
                Line::from(Span::styled(format!("Total number of slots: {}", total), active)),
                Line::from(""),
                Line::from("Slots are only ever added, never removed"),
                Line::from("Enter update | Esc cancel"),
            ],
        ),
        InputMode::DetectPlate { path } => (
            " License Plate Detection ",
            vec![
                Line::from(Span::styled(format!("Image path: {}", path), active)),
                Line::from(""),
                Line::from("File name should contain the plate, e.g. plate_ABC1234.jpg"),
                Line::from("Leave empty to use a simulated plate"),
                Line::from("Enter detect | Esc cancel"),
            ],
        ),
    };

    let area = centered_rect(60, 9, f.size());
    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(title),
        ),
        area,
    );
}

fn render_receipt_popup(f: &mut Frame, receipt: &Receipt, symbol: &str) {
    let text = receipt.render(symbol);
    let mut lines: Vec<Line> = text.lines().map(|l| Line::from(l.to_string())).collect();
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Press any key to close",
        Style::default().fg(Color::DarkGray),
    )));

    let height = lines.len() as u16 + 2;
    let area = centered_rect(46, height, f.size());
    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Green))
                .title(" Receipt "),
        ),
        area,
    );
}

/// Rect of `width` columns and `height` rows centred in `area`
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parkinup::{FallbackDetector, FilenamePlateDetector, ManualClock, Rate};

    fn app_with(clock: Arc<ManualClock>, detector: Arc<dyn PlateDetector>) -> App {
        let mut controller = ParkingController::open_in_memory(Rate::default(), clock).unwrap();
        controller.provision_slots(3).unwrap();
        App::new(controller, detector, Config::default()).unwrap()
    }

    fn test_app() -> (App, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at("2024-01-01 10:00:00").unwrap());
        let detector = Arc::new(FallbackDetector::filename_or_simulated(clock.clone()));
        (app_with(clock.clone(), detector), clock)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(KeyCode::Char(c), KeyModifiers::NONE);
        }
    }

    #[test]
    fn test_page_cycle() {
        assert_eq!(Page::Dashboard.next(), Page::Slots);
        assert_eq!(Page::Dashboard.previous(), Page::Payments);
        assert_eq!(Page::Payments.next(), Page::Dashboard);
    }

    #[test]
    fn test_check_in_form_parks_vehicle() {
        let (mut app, _) = test_app();

        app.handle_key(KeyCode::Char('i'), KeyModifiers::NONE);
        type_text(&mut app, "ABC123");
        app.handle_key(KeyCode::Tab, KeyModifiers::NONE);
        type_text(&mut app, "Ana");
        app.handle_key(KeyCode::Enter, KeyModifiers::NONE);

        assert_eq!(app.input, InputMode::Normal);
        assert_eq!(app.parked.len(), 1);
        assert_eq!(app.parked[0].session.owner_name.as_deref(), Some("Ana"));
        assert_eq!(app.occupancy.available, 2);
        assert!(!app.message.as_ref().unwrap().is_error);
    }

    #[test]
    fn test_check_out_shows_receipt() {
        let (mut app, clock) = test_app();
        app.submit_check_in("ABC123", "");
        clock.advance(chrono::Duration::minutes(61));
        app.tick();
        assert_eq!(app.parked[0].elapsed_minutes, 61);

        // prefilled from the highlighted row
        app.handle_key(KeyCode::Char('o'), KeyModifiers::NONE);
        assert_eq!(app.input, InputMode::CheckOut { plate: "ABC123".to_string() });
        app.handle_key(KeyCode::Enter, KeyModifiers::NONE);

        let receipt = app.receipt.clone().unwrap();
        assert_eq!(receipt.billed_minutes, 61);
        assert!(app.parked.is_empty());
        assert_eq!(app.payments.len(), 1);

        // any key closes the receipt
        app.handle_key(KeyCode::Char('x'), KeyModifiers::NONE);
        assert!(app.receipt.is_none());
    }

    #[test]
    fn test_errors_go_to_status_line() {
        let (mut app, _) = test_app();
        app.submit_check_out("NOPE99");

        let message = app.message.clone().unwrap();
        assert!(message.is_error);
        assert!(message.text.contains("NOPE99"));
    }

    #[test]
    fn test_detect_prefills_check_in() {
        let (mut app, _) = test_app();
        app.submit_detect("/tmp/plate_XYZ789.jpg");

        assert_eq!(
            app.input,
            InputMode::CheckIn {
                plate: "XYZ789".to_string(),
                owner: String::new(),
                editing_owner: false,
            }
        );
    }

    #[test]
    fn test_detect_without_image_uses_simulated_plate() {
        let (mut app, clock) = test_app();
        clock.set(parkinup::parse_timestamp("2024-01-01 09:08:07").unwrap());

        app.handle_key(KeyCode::Char('d'), KeyModifiers::NONE);
        app.handle_key(KeyCode::Enter, KeyModifiers::NONE);

        assert_eq!(
            app.input,
            InputMode::CheckIn {
                plate: "SIM090807".to_string(),
                owner: String::new(),
                editing_owner: false,
            }
        );
        assert_eq!(app.message.clone().unwrap().text, "Detected Plate: SIM090807");
    }

    #[test]
    fn test_detect_miss_opens_empty_check_in() {
        let clock = Arc::new(ManualClock::at("2024-01-01 10:00:00").unwrap());
        let mut app = app_with(clock, Arc::new(FilenamePlateDetector));
        app.submit_detect("photo.jpg");

        assert!(app.message.as_ref().unwrap().is_error);
        assert!(matches!(app.input, InputMode::CheckIn { ref plate, .. } if plate.is_empty()));
    }

    #[test]
    fn test_provision_form_rejects_garbage() {
        let (mut app, _) = test_app();
        app.submit_provision("abc");
        assert!(app.message.as_ref().unwrap().is_error);

        app.submit_provision("10");
        assert_eq!(app.slots.len(), 10);
        assert_eq!(app.slots[9].slot_number, "Slot-10");
    }

    #[test]
    fn test_quit_keys() {
        let (mut app, _) = test_app();
        assert!(!app.handle_key(KeyCode::Char('q'), KeyModifiers::NONE));
    }
}
