// vita-monitor
//
// Full-screen dashboard for a vitals monitoring session: enter a session
// key, then watch the historical snapshot update live as new samples
// arrive on the realtime channel.
//
// Quit: q / Ctrl-C. Esc leaves the data screen back to the key entry.

use clap::Parser;
use crossbeam::channel;
use crossterm::cursor;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols;
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph, Row, Table,
};
use ratatui::{Frame, Terminal};

use chrono::{DateTime, Local, TimeZone};
use vitalink::api;
use vitalink::data::{Sample, SessionId};
use vitalink::session::{Action, DataScreen, EntryScreen, Phase, SessionKey};
use vitalink::sync::{self, ChannelEvent, ChannelStatus, Subscription};
use vitalink_tools::ServiceOpts;

use std::collections::VecDeque;
use std::io::{self, Stdout};
use std::thread;
use std::time::Duration;

const EVENT_LOG_SIZE: usize = 5;

// Clinical display range for blood-oxygen saturation.
const SPO2_AXIS: [f64; 2] = [85.0, 100.0];

#[derive(Parser, Debug)]
#[command(
    name = "vita-monitor",
    version,
    about = "Live terminal dashboard for vitals monitoring sessions"
)]
struct Cli {
    #[command(flatten)]
    service: ServiceOpts,

    /// Open this session directly, skipping the key entry screen
    #[arg(value_name = "KEY")]
    key: Option<String>,

    /// UI refresh rate (default 10)
    #[arg(long, default_value_t = 10)]
    fps: u64,
}

enum NetResult {
    Validation {
        key: SessionKey,
        ok: bool,
    },
    Snapshot {
        generation: u64,
        result: Result<Vec<Sample>, api::Error>,
    },
    Lookup {
        result: Result<Option<SessionId>, sync::Error>,
    },
    Subscribed {
        result: Result<Subscription, sync::Error>,
    },
}

/// Worker results are stamped with the screen epoch they were requested
/// under, so a response for a screen the user already left cannot touch the
/// one that replaced it.
struct NetMsg {
    epoch: u64,
    result: NetResult,
}

enum Screen {
    Entry(EntryScreen),
    Data(DataScreen),
}

struct App {
    screen: Screen,
    epoch: u64,
    api: api::Client,
    sync: sync::Client,
    net_tx: channel::Sender<NetMsg>,
    subscription: Option<Subscription>,
    events: VecDeque<(DateTime<Local>, String)>,
    quit: bool,
}

impl App {
    fn log_event(&mut self, message: String) {
        self.events.push_front((Local::now(), message));
        if self.events.len() > EVENT_LOG_SIZE {
            self.events.pop_back();
        }
    }

    fn perform(&mut self, action: Action) {
        let epoch = self.epoch;
        match action {
            Action::FetchSnapshot { key, generation } => {
                let api = self.api.clone();
                let tx = self.net_tx.clone();
                thread::spawn(move || {
                    let result = api.fetch_samples(&key);
                    let result = NetResult::Snapshot { generation, result };
                    let _ = tx.send(NetMsg { epoch, result });
                });
            }
            Action::LookupSession { key } => {
                let sync = self.sync.clone();
                let tx = self.net_tx.clone();
                thread::spawn(move || {
                    let result = sync.session_id(&key);
                    let result = NetResult::Lookup { result };
                    let _ = tx.send(NetMsg { epoch, result });
                });
            }
            Action::OpenChannel { session_id } => {
                let sync = self.sync.clone();
                let tx = self.net_tx.clone();
                thread::spawn(move || {
                    let result = sync.subscribe(session_id);
                    let result = NetResult::Subscribed { result };
                    let _ = tx.send(NetMsg { epoch, result });
                });
            }
            Action::CloseChannel { .. } => {
                if let Some(subscription) = self.subscription.take() {
                    subscription.close();
                }
            }
        }
    }

    fn enter_data_screen(&mut self, key: SessionKey) {
        self.epoch += 1;
        let mut data = DataScreen::new(key);
        let action = data.start();
        self.screen = Screen::Data(data);
        if let Some(action) = action {
            self.perform(action);
        }
    }

    fn leave_data_screen(&mut self) {
        let close = match &mut self.screen {
            Screen::Data(data) => data.teardown(),
            Screen::Entry(_) => None,
        };
        if let Some(close) = close {
            self.perform(close);
        }
        self.epoch += 1;
        self.screen = Screen::Entry(EntryScreen::new());
    }

    fn request_quit(&mut self) {
        let close = match &mut self.screen {
            Screen::Data(data) => data.teardown(),
            Screen::Entry(_) => None,
        };
        if let Some(close) = close {
            self.perform(close);
        }
        self.quit = true;
    }

    fn on_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.request_quit();
            return;
        }

        match &mut self.screen {
            Screen::Entry(entry) => match key.code {
                KeyCode::Char(c) if c.is_ascii_alphanumeric() => entry.push_char(c),
                KeyCode::Backspace => entry.pop_char(),
                KeyCode::Enter => {
                    if let Some(submitted) = entry.submit() {
                        let api = self.api.clone();
                        let tx = self.net_tx.clone();
                        let epoch = self.epoch;
                        thread::spawn(move || {
                            let ok = api.check_session(&submitted).is_ok();
                            let result = NetResult::Validation { key: submitted, ok };
                            let _ = tx.send(NetMsg { epoch, result });
                        });
                    }
                }
                KeyCode::Esc => self.request_quit(),
                _ => {}
            },
            Screen::Data(_) => match key.code {
                KeyCode::Esc => self.leave_data_screen(),
                KeyCode::Char('q') => self.request_quit(),
                _ => {}
            },
        }
    }

    fn on_net(&mut self, msg: NetMsg) {
        if msg.epoch != self.epoch {
            // Result for a screen the user already left. Release anything it
            // carries instead of letting it touch the current screen.
            if let NetResult::Subscribed {
                result: Ok(subscription),
            } = msg.result
            {
                subscription.close();
            }
            return;
        }
        match msg.result {
            NetResult::Validation { key, ok } => {
                let navigate = match &mut self.screen {
                    Screen::Entry(entry) => {
                        if ok {
                            entry.validation_passed();
                            true
                        } else {
                            entry.validation_failed();
                            false
                        }
                    }
                    Screen::Data(_) => false,
                };
                if navigate {
                    self.enter_data_screen(key);
                }
            }
            NetResult::Snapshot { generation, result } => {
                let (action, note) = match &mut self.screen {
                    Screen::Data(data) => match result {
                        Ok(rows) => (data.snapshot_loaded(generation, rows), None),
                        Err(e) => {
                            data.snapshot_failed(generation);
                            (None, Some(format!("snapshot failed: {}", e)))
                        }
                    },
                    Screen::Entry(_) => (None, None),
                };
                if let Some(note) = note {
                    self.log_event(note);
                }
                if let Some(action) = action {
                    self.perform(action);
                }
            }
            NetResult::Lookup { result } => {
                let (action, note) = match &mut self.screen {
                    Screen::Data(data) => match result {
                        Ok(resolved) => (data.lookup_resolved(resolved), None),
                        Err(e) => (None, Some(format!("registry lookup failed: {}", e))),
                    },
                    Screen::Entry(_) => (None, None),
                };
                if let Some(note) = note {
                    self.log_event(note);
                }
                if let Some(action) = action {
                    self.perform(action);
                }
            }
            NetResult::Subscribed { result } => match result {
                Ok(subscription) => {
                    let session_id = subscription.session_id();
                    if let Screen::Data(data) = &mut self.screen {
                        data.channel_opened(session_id);
                        self.subscription = Some(subscription);
                        self.log_event(format!("channel open for session {}", session_id));
                    } else {
                        // The user already left the data screen; release the
                        // channel right away instead of keeping it dangling.
                        subscription.close();
                    }
                }
                Err(e) => self.log_event(format!("subscribe failed: {}", e)),
            },
        }
    }

    fn drain_live(&mut self) {
        let mut inserts = Vec::new();
        let mut statuses = Vec::new();
        if let Some(subscription) = &self.subscription {
            while let Ok(event) = subscription.events().try_recv() {
                match event {
                    ChannelEvent::Insert(sample) => inserts.push(sample),
                    ChannelEvent::Status(status) => statuses.push(status),
                }
            }
        }

        if let Screen::Data(data) = &mut self.screen {
            for sample in inserts {
                data.live_insert(sample);
            }
            if statuses.iter().any(|s| *s == ChannelStatus::Joined) {
                data.channel_joined();
            }
        }
        for status in statuses {
            let note = match status {
                ChannelStatus::Joined => "channel joined".to_string(),
                ChannelStatus::Closed => "channel closed".to_string(),
                ChannelStatus::ProtocolError(msg) => format!("channel protocol error: {}", msg),
                ChannelStatus::TransportError(msg) => format!("channel transport error: {}", msg),
            };
            self.log_event(note);
        }
    }
}

fn fmt_timestamp(ts: f64) -> String {
    match Local.timestamp_opt(ts as i64, 0).single() {
        Some(dt) => dt.format("%H:%M:%S").to_string(),
        None => format!("{:.0}", ts),
    }
}

fn draw(frame: &mut Frame, app: &App) {
    match &app.screen {
        Screen::Entry(entry) => draw_entry(frame, entry),
        Screen::Data(data) => draw_data(frame, data, &app.events),
    }
}

fn draw_entry(frame: &mut Frame, entry: &EntryScreen) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(7),
            Constraint::Min(0),
        ])
        .split(frame.area());

    let mut lines = vec![
        Line::from("Enter a session key to watch live vitals."),
        Line::from(""),
        Line::from(vec![
            Span::raw("Session key: "),
            Span::styled(
                entry.input().to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::styled("_", Style::default().fg(Color::DarkGray)),
        ]),
        Line::from(""),
    ];
    if entry.busy() {
        lines.push(Line::from(Span::styled(
            "Checking...",
            Style::default().fg(Color::Yellow),
        )));
    } else if let Some(error) = entry.error() {
        lines.push(Line::from(Span::styled(
            error,
            Style::default().fg(Color::Red),
        )));
    } else {
        lines.push(Line::from(Span::styled(
            "Press Enter to connect, Esc to quit",
            Style::default().fg(Color::DarkGray),
        )));
    }

    let block = Block::default().borders(Borders::ALL).title(" vitals monitor ");
    frame.render_widget(
        Paragraph::new(lines).alignment(Alignment::Center).block(block),
        rows[1],
    );
}

fn draw_data(frame: &mut Frame, data: &DataScreen, events: &VecDeque<(DateTime<Local>, String)>) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Percentage(45),
            Constraint::Min(8),
            Constraint::Length(EVENT_LOG_SIZE as u16 + 2),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_header(frame, rows[0], data);

    if data.phase() == Phase::Failed {
        // Sticky fetch failure: the error message and nothing else.
        let message = Paragraph::new(Line::from(Span::styled(
            "Could not load session data.",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )))
        .alignment(Alignment::Center);
        frame.render_widget(message, rows[1]);
    } else if data.waiting_for_data() {
        let message = Paragraph::new(Line::from(Span::styled(
            "Waiting for data...",
            Style::default().fg(Color::Yellow),
        )))
        .alignment(Alignment::Center);
        frame.render_widget(message, rows[1]);
    } else {
        draw_charts(frame, rows[1], data);
        draw_table(frame, rows[2], data);
    }

    draw_events(frame, rows[3], events);

    let footer = Paragraph::new(Line::from(Span::styled(
        "Esc back to key entry   q quit",
        Style::default().fg(Color::DarkGray),
    )));
    frame.render_widget(footer, rows[4]);
}

fn draw_header(frame: &mut Frame, area: Rect, data: &DataScreen) {
    let status = match data.phase() {
        Phase::Idle | Phase::FetchingSnapshot => ("fetching history", Color::Yellow),
        Phase::ResolvingId => ("waiting for data", Color::Yellow),
        Phase::Subscribing => ("connecting live", Color::Yellow),
        Phase::Active => ("LIVE", Color::Green),
        Phase::Failed => ("ERROR", Color::Red),
    };
    let header = Line::from(vec![
        Span::styled(
            format!(" session {} ", data.key()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(status.0, Style::default().fg(status.1)),
        Span::raw(format!("   {} samples buffered", data.sample_count())),
    ]);
    frame.render_widget(Paragraph::new(header), area);
}

fn draw_charts(frame: &mut Frame, area: Rect, data: &DataScreen) {
    let rows = data.chronological();
    let spo2: Vec<(f64, f64)> = rows.iter().map(|s| (s.timestamp, s.spo2)).collect();
    let pulse: Vec<(f64, f64)> = rows.iter().map(|s| (s.timestamp, s.pulse)).collect();

    let (x_min, x_max) = match (rows.first(), rows.last()) {
        (Some(first), Some(last)) if last.timestamp > first.timestamp => {
            (first.timestamp, last.timestamp)
        }
        (Some(first), _) => (first.timestamp - 1.0, first.timestamp + 1.0),
        _ => (0.0, 1.0),
    };
    let x_labels = vec![fmt_timestamp(x_min), fmt_timestamp(x_max)];

    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let spo2_dataset = vec![Dataset::default()
        .name("SpO2 %")
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Cyan))
        .data(&spo2)];
    let spo2_chart = Chart::new(spo2_dataset)
        .block(Block::default().borders(Borders::ALL).title(" SpO2 "))
        .x_axis(
            Axis::default()
                .bounds([x_min, x_max])
                .labels(x_labels.clone())
                .style(Style::default().fg(Color::DarkGray)),
        )
        .y_axis(
            Axis::default()
                .bounds(SPO2_AXIS)
                .labels(vec!["85".to_string(), "92".to_string(), "100".to_string()])
                .style(Style::default().fg(Color::DarkGray)),
        );
    frame.render_widget(spo2_chart, halves[0]);

    // The pulse axis tracks the data instead of a fixed clinical range.
    let (mut y_min, mut y_max) = pulse.iter().fold((f64::MAX, f64::MIN), |(lo, hi), p| {
        (lo.min(p.1), hi.max(p.1))
    });
    if pulse.is_empty() || y_min > y_max {
        y_min = 40.0;
        y_max = 140.0;
    }
    let y_min = (y_min - 5.0).floor();
    let y_max = (y_max + 5.0).ceil();
    let y_labels = vec![
        format!("{:.0}", y_min),
        format!("{:.0}", (y_min + y_max) / 2.0),
        format!("{:.0}", y_max),
    ];

    let pulse_dataset = vec![Dataset::default()
        .name("bpm")
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Magenta))
        .data(&pulse)];
    let pulse_chart = Chart::new(pulse_dataset)
        .block(Block::default().borders(Borders::ALL).title(" Pulse "))
        .x_axis(
            Axis::default()
                .bounds([x_min, x_max])
                .labels(x_labels)
                .style(Style::default().fg(Color::DarkGray)),
        )
        .y_axis(
            Axis::default()
                .bounds([y_min, y_max])
                .labels(y_labels)
                .style(Style::default().fg(Color::DarkGray)),
        );
    frame.render_widget(pulse_chart, halves[1]);
}

fn draw_table(frame: &mut Frame, area: Rect, data: &DataScreen) {
    let rows: Vec<Row> = data
        .table_rows()
        .iter()
        .map(|s| {
            Row::new(vec![
                fmt_timestamp(s.timestamp),
                format!("{:.0}", s.spo2),
                format!("{:.0}", s.pulse),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(6),
            Constraint::Length(6),
        ],
    )
    .header(
        Row::new(vec!["time", "SpO2", "pulse"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title(" recent "));
    frame.render_widget(table, area);
}

fn draw_events(frame: &mut Frame, area: Rect, events: &VecDeque<(DateTime<Local>, String)>) {
    let lines: Vec<Line> = events
        .iter()
        .map(|(at, message)| {
            Line::from(vec![
                Span::styled(
                    format!("[{}] ", at.format("%H:%M:%S")),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(message.clone()),
            ])
        })
        .collect();
    let block = Block::default().borders(Borders::ALL).title(" events ");
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

struct Tui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Tui {
    fn setup() -> io::Result<Tui> {
        enable_raw_mode()?;
        io::stdout().execute(EnterAlternateScreen)?;
        io::stdout().execute(cursor::Hide)?;
        let terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        Ok(Tui { terminal })
    }

    fn teardown() {
        let _ = io::stdout().execute(cursor::Show);
        let _ = io::stdout().execute(LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();

    let api = match cli.service.api_client() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("failed to set up the API client: {}", e);
            std::process::exit(1);
        }
    };
    let sync = match cli.service.sync_client() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("failed to set up the data-sync client: {}", e);
            std::process::exit(1);
        }
    };

    let initial_key = match &cli.key {
        Some(raw) => match SessionKey::parse(raw) {
            Ok(key) => Some(key),
            Err(_) => {
                eprintln!("invalid session key: {:?}", raw);
                std::process::exit(1);
            }
        },
        None => None,
    };

    let (net_tx, net_rx) = channel::unbounded();
    let mut app = App {
        screen: Screen::Entry(EntryScreen::new()),
        epoch: 0,
        api,
        sync,
        net_tx,
        subscription: None,
        events: VecDeque::new(),
        quit: false,
    };
    if let Some(key) = initial_key {
        app.enter_data_screen(key);
    }

    let mut tui = Tui::setup()?;
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        Tui::teardown();
        original_hook(panic_info);
    }));

    let (key_tx, key_rx) = channel::unbounded();
    thread::spawn(move || loop {
        match event::read() {
            Ok(ev) => {
                if key_tx.send(ev).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });

    let frame_time = Duration::from_millis(1000 / cli.fps.max(1));
    let tick = channel::tick(frame_time);

    loop {
        crossbeam::select! {
            recv(key_rx) -> ev => {
                if let Ok(Event::Key(key)) = ev {
                    if key.kind == KeyEventKind::Press {
                        app.on_key(key);
                    }
                }
            }
            recv(net_rx) -> msg => {
                if let Ok(msg) = msg {
                    app.on_net(msg);
                }
            }
            recv(tick) -> _ => {
                app.drain_live();
                tui.terminal.draw(|frame| draw(frame, &app))?;
            }
        }
        if app.quit {
            break;
        }
    }

    // The quit path already tore the channel down via the state machine; a
    // subscription opened after that is closed by its Drop impl when `app`
    // goes out of scope.
    drop(app);
    Tui::teardown();
    Ok(())
}
