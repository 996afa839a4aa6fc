use anyhow::Context;
use bigfolders::{
    init_logging, open_folder, CancelHandle, FolderScanner, FolderSize,
    ProgressReporter, ScanArgs, ScanConfig, ScanPhase, ScanProgress, ScanReport,
};
use clap::Parser;
use eframe::egui;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Find the largest folders on your drives")]
struct Cli {
    #[command(flatten)]
    scan: ScanArgs,
}

fn main() -> anyhow::Result<()> {
    init_logging("info");
    let config = Cli::parse().scan.into_config().context("invalid scan options")?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 700.0])
            .with_min_inner_size([800.0, 600.0])
            .with_title("Folder Size Scanner - Find Largest Folders"),
        ..Default::default()
    };

    eframe::run_native(
        "Folder Size Scanner",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            Box::new(FolderScannerApp::new(config))
        }),
    )
    .map_err(|err| anyhow::anyhow!("GUI failed: {err}"))
}

enum ScanEvent {
    Progress(ScanProgress),
    Completed(Result<ScanReport, String>),
}

struct FolderScannerApp {
    config: ScanConfig,
    is_scanning: bool,
    status: String,
    scan_progress: Option<ScanProgress>,
    scan_rx: Option<Receiver<ScanEvent>>,
    cancel: Option<CancelHandle>,
    folders: Vec<FolderSize>,
    selected: Option<usize>,
    error: Option<String>,
}

impl FolderScannerApp {
    fn new(config: ScanConfig) -> Self {
        Self {
            config,
            is_scanning: false,
            status: "Ready to scan".to_string(),
            scan_progress: None,
            scan_rx: None,
            cancel: None,
            folders: Vec::new(),
            selected: None,
            error: None,
        }
    }

    fn start_scan(&mut self, ctx: &egui::Context) {
        if self.is_scanning {
            return;
        }

        self.is_scanning = true;
        self.status = "Starting scan...".to_string();
        self.scan_progress = Some(ScanProgress::starting());

        let scanner = FolderScanner::new(self.config.clone());
        self.cancel = Some(scanner.cancel_handle());

        let (tx, rx) = mpsc::channel::<ScanEvent>();
        self.scan_rx = Some(rx);

        let repaint = ctx.clone();
        thread::spawn(move || {
            let progress_tx = tx.clone();
            let progress_repaint = repaint.clone();
            let reporter: ProgressReporter = Arc::new(move |progress: ScanProgress| {
                let _ = progress_tx.send(ScanEvent::Progress(progress));
                progress_repaint.request_repaint();
            });

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                scanner.scan(Some(reporter)).map_err(|err| err.to_string())
            }))
            .unwrap_or_else(|_| Err("Scan thread panicked".to_string()));

            let _ = tx.send(ScanEvent::Completed(result));
            repaint.request_repaint();
        });
    }

    fn cancel_scan(&mut self) {
        if let Some(cancel) = self.cancel.as_ref() {
            cancel.cancel();
            self.status = "Cancelling...".to_string();
        }
    }

    fn poll_scan_updates(&mut self) {
        let mut done: Option<Result<ScanReport, String>> = None;
        let mut disconnected = false;

        if let Some(rx) = self.scan_rx.as_ref() {
            loop {
                match rx.try_recv() {
                    Ok(ScanEvent::Progress(progress)) => {
                        self.status = progress_status(&progress);
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
                    self.status = completion_status(&report);
                    self.folders = report.folders;
                    self.selected = None;
                }
                Err(err) => {
                    self.status = "Scan failed".to_string();
                    self.error = Some(format!("Error during scan: {}", err));
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

    fn open(&mut self, path: &Path) {
        if let Err(err) = open_folder(path) {
            self.error = Some(format!("Could not open folder: {}", err));
        }
    }

    fn results_grid(&mut self, ui: &mut egui::Ui) {
        let mut to_open: Option<PathBuf> = None;

        egui::ScrollArea::vertical().show(ui, |ui| {
            egui::Grid::new("results")
                .num_columns(3)
                .striped(true)
                .spacing([24.0, 8.0])
                .min_col_width(80.0)
                .show(ui, |ui| {
                    ui.strong("Folder Path");
                    ui.strong("Size");
                    ui.strong("Action");
                    ui.end_row();

                    for (idx, folder) in self.folders.iter().enumerate() {
                        let label = folder.path.display().to_string();
                        let response = ui
                            .add(egui::SelectableLabel::new(self.selected == Some(idx), label))
                            .on_hover_text("Double-click to open");
                        if response.clicked() {
                            self.selected = Some(idx);
                        }
                        if response.double_clicked() {
                            to_open = Some(folder.path.clone());
                        }

                        ui.label(folder.size_label());

                        if ui.button("Open Folder").clicked() {
                            to_open = Some(folder.path.clone());
                        }
                        ui.end_row();
                    }
                });
        });

        if let Some(path) = to_open {
            self.open(&path);
        }
    }
}

impl eframe::App for FolderScannerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_scan_updates();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.heading("Folder Size Scanner");
            });
            ui.add_space(12.0);

            ui.horizontal(|ui| {
                let scan_label = if self.is_scanning {
                    "Scanning..."
                } else {
                    "Scan for Largest Folders"
                };
                if ui
                    .add_enabled(!self.is_scanning, egui::Button::new(scan_label))
                    .clicked()
                {
                    self.start_scan(ctx);
                }
                if ui
                    .add_enabled(!self.is_scanning, egui::Button::new("Refresh"))
                    .clicked()
                {
                    self.start_scan(ctx);
                }
                if ui
                    .add_enabled(self.is_scanning, egui::Button::new("Cancel"))
                    .clicked()
                {
                    self.cancel_scan();
                }
                if self.is_scanning {
                    ui.spinner();
                }
            });
            ui.add_space(8.0);

            if let Some(progress) = self.scan_progress.as_ref() {
                let bar = match progress.fraction() {
                    Some(fraction) => egui::ProgressBar::new(fraction).show_percentage(),
                    None => egui::ProgressBar::new(0.0).animate(true),
                };
                ui.add(bar);
            }
            ui.label(self.status.as_str());
            ui.separator();

            self.results_grid(ui);
        });

        if let Some(message) = self.error.clone() {
            let mut open = true;
            egui::Window::new("Error")
                .collapsible(false)
                .resizable(false)
                .open(&mut open)
                .show(ctx, |ui| {
                    ui.label(message);
                });
            if !open {
                self.error = None;
            }
        }

        if self.is_scanning {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}

fn progress_status(progress: &ScanProgress) -> String {
    match progress.phase {
        ScanPhase::Enumerating => format!("Scanning {} drives...", progress.volumes_total),
        ScanPhase::Measuring => match progress.current.as_ref() {
            Some(path) => format!(
                "Scanned: {} ({}/{})",
                path.display(),
                progress.folders_done,
                progress.folders_total.unwrap_or(0)
            ),
            None => format!("Measuring {} folders...", progress.folders_total.unwrap_or(0)),
        },
    }
}

fn completion_status(report: &ScanReport) -> String {
    let mut status = if report.cancelled {
        "Scan cancelled".to_string()
    } else {
        "Scan complete".to_string()
    };
    status.push_str(&format!(
        ": {} folders in {:.1}s",
        report.measured_folders,
        report.duration_ms as f64 / 1000.0
    ));
    if report.timed_out > 0 {
        status.push_str(&format!(", {} hit the time budget", report.timed_out));
    }
    status
}
