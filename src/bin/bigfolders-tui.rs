use anyhow::Context;
use bigfolders::{
    format_size, init_logging, open_folder, CancelHandle, FolderScanner, FolderSize,
    ProgressReporter, ScanArgs, ScanConfig, ScanPhase, ScanProgress, ScanReport,
};
use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Row, Table, TableState};
use ratatui::{Frame, Terminal};
use std::io::{self, stdout, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(400);

#[derive(Parser, Debug)]
#[command(author, version, about = "Find the largest folders on your drives (terminal UI)")]
struct Cli {
    #[command(flatten)]
    scan: ScanArgs,

    /// Scan once and print a ranked table instead of opening the UI
    #[arg(long)]
    plain: bool,

    /// Scan once and print the full report as JSON
    #[arg(long, conflicts_with = "plain")]
    json: bool,
}

enum ScanEvent {
    Progress(ScanProgress),
    Completed(Result<ScanReport, String>),
}

#[derive(Default, Clone, Copy)]
struct UiLayoutState {
    table_area: Option<Rect>,
}

struct App {
    config: ScanConfig,
    status: String,
    is_scanning: bool,
    scan_progress: Option<ScanProgress>,
    scan_rx: Option<Receiver<ScanEvent>>,
    cancel: Option<CancelHandle>,
    last_scan_finished_at: Option<Instant>,

    folders: Vec<FolderSize>,
    table_state: TableState,
    last_click: Option<(usize, Instant)>,
    ui_layout: UiLayoutState,

    should_quit: bool,
}

impl App {
    fn new(config: ScanConfig) -> Self {
        Self {
            config,
            status: String::from("Press s to scan for the largest folders"),
            is_scanning: false,
            scan_progress: None,
            scan_rx: None,
            cancel: None,
            last_scan_finished_at: None,
            folders: Vec::new(),
            table_state: TableState::default(),
            last_click: None,
            ui_layout: UiLayoutState::default(),
            should_quit: false,
        }
    }

    fn start_scan(&mut self) {
        if self.is_scanning {
            return;
        }

        self.status = "Starting scan...".to_string();
        self.is_scanning = true;
        self.scan_progress = Some(ScanProgress::starting());

        let scanner = FolderScanner::new(self.config.clone());
        self.cancel = Some(scanner.cancel_handle());

        let (tx, rx) = mpsc::channel::<ScanEvent>();
        self.scan_rx = Some(rx);

        thread::spawn(move || {
            let progress_tx = tx.clone();
            let reporter: ProgressReporter = Arc::new(move |progress: ScanProgress| {
                let _ = progress_tx.send(ScanEvent::Progress(progress));
            });

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                scanner.scan(Some(reporter)).map_err(|err| err.to_string())
            }))
            .unwrap_or_else(|_| Err("Scan thread panicked".to_string()));

            let _ = tx.send(ScanEvent::Completed(result));
        });
    }

    fn poll_scan_updates(&mut self) {
        let mut done: Option<Result<ScanReport, String>> = None;
        let mut disconnected = false;

        if let Some(rx) = self.scan_rx.as_ref() {
            loop {
                match rx.try_recv() {
                    Ok(ScanEvent::Progress(progress)) => {
                        self.scan_progress = Some(progress);
                    }
                    Ok(ScanEvent::Completed(result)) => {
                        done = Some(result);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }

        if disconnected && done.is_none() {
            self.finish_scan();
            self.status = "Scan channel disconnected".to_string();
        }

        if let Some(result) = done {
            self.finish_scan();

            match result {
                Ok(report) => {
                    self.last_scan_finished_at = Some(Instant::now());
                    self.status = format!(
                        "{}: {} folders, {} measured",
                        if report.cancelled { "Scan cancelled" } else { "Scan complete" },
                        report.measured_folders,
                        format_size(report.total_bytes),
                    );
                    self.folders = report.folders;
                    self.table_state
                        .select(if self.folders.is_empty() { None } else { Some(0) });
                }
                Err(err) => {
                    self.status = format!("Scan failed: {}", err);
                }
            }
        }
    }

    fn finish_scan(&mut self) {
        self.scan_rx = None;
        self.cancel = None;
        self.is_scanning = false;
        self.scan_progress = None;
    }

    /// Rows on screen: the live ranking while scanning, else the last result.
    fn shown_folders(&self) -> &[FolderSize] {
        match self.scan_progress.as_ref() {
            Some(progress) if self.is_scanning => &progress.leaders,
            _ => &self.folders,
        }
    }

    fn selected_folder(&self) -> Option<&FolderSize> {
        self.table_state
            .selected()
            .and_then(|idx| self.shown_folders().get(idx))
    }

    fn on_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c')) {
            self.should_quit = true;
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('s') | KeyCode::Char('r') => self.start_scan(),
            KeyCode::Char('x') => self.cancel_scan(),
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Enter | KeyCode::Char('o') => self.open_selected(),
            KeyCode::Esc => self.table_state.select(None),
            _ => {}
        }
    }

    fn on_mouse(&mut self, event: MouseEvent) {
        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                let Some(idx) = self.row_at(event.column, event.row) else {
                    return;
                };
                self.table_state.select(Some(idx));

                let now = Instant::now();
                let is_double = matches!(
                    self.last_click,
                    Some((last_idx, at))
                        if last_idx == idx && now.duration_since(at) <= DOUBLE_CLICK_WINDOW
                );
                if is_double {
                    self.last_click = None;
                    self.open_selected();
                } else {
                    self.last_click = Some((idx, now));
                }
            }
            MouseEventKind::ScrollUp => self.move_selection(-1),
            MouseEventKind::ScrollDown => self.move_selection(1),
            _ => {}
        }
    }

    fn cancel_scan(&mut self) {
        if let Some(cancel) = self.cancel.as_ref() {
            cancel.cancel();
            self.status = "Cancelling...".to_string();
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let shown = self.shown_folders().len();
        if shown == 0 {
            return;
        }
        let last = shown - 1;
        let next = match self.table_state.selected() {
            Some(current) => current.saturating_add_signed(delta).min(last),
            None => 0,
        };
        self.table_state.select(Some(next));
    }

    fn open_selected(&mut self) {
        let Some(path) = self.selected_folder().map(|folder| folder.path.clone()) else {
            return;
        };
        self.status = match open_folder(&path) {
            Ok(()) => format!("Opened {}", path.display()),
            Err(err) => format!("Could not open folder: {}", err),
        };
    }

    /// Result row under a terminal cell, accounting for the header line.
    fn row_at(&self, x: u16, y: u16) -> Option<usize> {
        let area = self.ui_layout.table_area?;
        if !point_in_rect(area, x, y) || y <= area.y {
            return None;
        }
        let idx = (y - area.y - 1) as usize + self.table_state.offset();
        (idx < self.shown_folders().len()).then_some(idx)
    }
}

fn point_in_rect(rect: Rect, x: u16, y: u16) -> bool {
    x >= rect.x
        && x < rect.x.saturating_add(rect.width)
        && y >= rect.y
        && y < rect.y.saturating_add(rect.height)
}

fn progress_status(progress: &ScanProgress) -> String {
    match progress.phase {
        ScanPhase::Enumerating => format!("Listing {} volumes...", progress.volumes_total),
        ScanPhase::Measuring => format!(
            "Measuring {}/{} folders | {}",
            progress.folders_done,
            progress.folders_total.unwrap_or(0),
            format_size(progress.bytes_measured),
        ),
    }
}

fn folder_rows(folders: &[FolderSize]) -> Vec<Row<'static>> {
    folders
        .iter()
        .enumerate()
        .map(|(i, folder)| {
            Row::new(vec![
                (i + 1).to_string(),
                folder.size_label(),
                folder.path.display().to_string(),
            ])
        })
        .collect()
}

fn draw_ui(frame: &mut Frame, app: &mut App) {
    let rows = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(6),
        Constraint::Length(3),
    ])
    .split(frame.area());

    let status_block = Block::default()
        .title(" Folder Size Scanner ")
        .borders(Borders::ALL);
    match app.scan_progress.as_ref() {
        Some(progress) if app.is_scanning => {
            let gauge = Gauge::default()
                .block(status_block)
                .gauge_style(Style::default().fg(Color::Rgb(0, 120, 212)))
                .ratio(progress.fraction().unwrap_or(0.0) as f64)
                .label(progress_status(progress));
            frame.render_widget(gauge, rows[0]);
        }
        _ => {
            let mut status = app.status.clone();
            if let Some(instant) = app.last_scan_finished_at {
                status.push_str(&format!(" ({}s ago)", instant.elapsed().as_secs()));
            }
            frame.render_widget(Paragraph::new(status).block(status_block), rows[0]);
        }
    }

    let shown_rows = folder_rows(app.shown_folders());

    let results_block = Block::default()
        .title(" Largest folders (Enter / double-click: open) ")
        .borders(Borders::ALL);
    let table_area = results_block.inner(rows[1]);
    app.ui_layout.table_area = Some(table_area);

    if shown_rows.is_empty() {
        frame.render_widget(
            Paragraph::new("No results yet. Press s to scan.")
                .style(Style::default().fg(Color::Gray))
                .block(results_block),
            rows[1],
        );
    } else {
        let table = Table::new(
            shown_rows,
            [Constraint::Length(4), Constraint::Length(14), Constraint::Min(20)],
        )
        .header(
            Row::new(vec!["#", "Size", "Folder Path"])
                .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Rgb(64, 64, 64))
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ")
        .block(results_block);
        frame.render_stateful_widget(table, rows[1], &mut app.table_state);
    }

    let help = Line::from("s/r: scan   x: cancel   ↑/↓: select   Enter: open folder   q: quit");
    frame.render_widget(
        Paragraph::new(help).block(Block::default().title(" Controls ").borders(Borders::ALL)),
        rows[2],
    );
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    config: ScanConfig,
) -> io::Result<()> {
    let mut app = App::new(config);
    app.start_scan();

    loop {
        app.poll_scan_updates();

        terminal.draw(|frame| {
            draw_ui(frame, &mut app);
        })?;

        if app.should_quit {
            if let Some(cancel) = app.cancel.as_ref() {
                cancel.cancel();
            }
            break;
        }

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) => app.on_key(key),
                Event::Mouse(mouse) => app.on_mouse(mouse),
                Event::Resize(_, _) => {}
                Event::FocusGained | Event::FocusLost | Event::Paste(_) => {}
            }
        }
    }

    Ok(())
}

fn run_interactive(config: ScanConfig) -> io::Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(stdout(), EnterAlternateScreen, EnableMouseCapture)?;

    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let app_result = run_app(&mut terminal, config);

    disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    app_result
}

fn print_plain(report: &ScanReport, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{:<6}{:<16}Folder Path", "Rank", "Size")?;
    for (i, folder) in report.folders.iter().enumerate() {
        writeln!(
            out,
            "{:<6}{:<16}{}",
            i + 1,
            folder.size_label(),
            folder.path.display()
        )?;
    }
    if report.folders.is_empty() {
        writeln!(out, "(no non-empty folders found)")?;
    }
    writeln!(
        out,
        "\nScanned {} folders on {} volume(s) in {} ms",
        report.measured_folders,
        report.volumes.len(),
        report.duration_ms
    )?;
    for volume in &report.unreadable {
        writeln!(out, "Could not read {}", volume.display())?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let report_only = cli.plain || cli.json;
    init_logging(if report_only { "info" } else { "off" });

    let config = cli.scan.into_config().context("invalid scan options")?;

    if !report_only {
        return run_interactive(config).context("terminal UI failed");
    }

    let report = FolderScanner::new(config).scan(None).context("scan failed")?;
    let mut out = stdout().lock();
    if cli.json {
        serde_json::to_writer_pretty(&mut out, &report).context("failed to write JSON report")?;
        writeln!(out)?;
    } else {
        print_plain(&report, &mut out)?;
    }
    Ok(())
}
