mod preview;
mod settings;

use anyhow::{Context, Result};
use directories_next::ProjectDirs;
use eframe::{App, Frame, egui};
use mole_core::upload::IMAGE_EXTENSIONS;
use mole_core::{
    AnalysisClient, ClientConfig, HealthStatus, Outcome, Session, Ticket, UploadCandidate,
};
use preview::Preview;
use rfd::FileDialog;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use tokio::runtime::Runtime;

const PREVIEW_WIDTH: f32 = 320.0;
const BENIGN_COLOR: egui::Color32 = egui::Color32::from_rgb(46, 160, 67);
const MALIGNANT_COLOR: egui::Color32 = egui::Color32::from_rgb(218, 54, 51);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Panel {
    Results,
    Settings,
}

pub(crate) struct UiApp {
    runtime: Runtime,
    session: Session,
    config: ClientConfig,
    config_path: Option<PathBuf>,
    panel: Panel,
    status: String,
    health: Option<HealthStatus>,
    health_rx: Option<Receiver<HealthStatus>>,
    outcome_rx: Option<Receiver<(Ticket, Outcome)>>,
    overlay: Option<Preview>,
    preprocessed: Option<Preview>,
    preview_seq: u64,
    // Settings form, applied on demand.
    pending_endpoint: String,
    pending_max_mib: f64,
    pending_timeout_secs: u64,
    app_version: &'static str,
}

impl UiApp {
    pub(crate) fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context("cannot start async runtime")?;

        let config_path = ProjectDirs::from("app", "CheckYourMole", "CheckYourMole")
            .map(|dirs| dirs.config_dir().join("config.toml"));
        let config = match &config_path {
            Some(path) => ClientConfig::load(path).unwrap_or_else(|e| {
                tracing::warn!("ignoring config {}: {e:#}", path.display());
                ClientConfig::default()
            }),
            None => ClientConfig::default(),
        };
        let client = AnalysisClient::new(&config)?;
        tracing::info!(endpoint = %client.endpoint(), "client ready");

        let mut app = Self {
            runtime,
            session: Session::new(Arc::new(client)),
            config: config.clone(),
            config_path,
            panel: Panel::Results,
            status: String::new(),
            health: None,
            health_rx: None,
            outcome_rx: None,
            overlay: None,
            preprocessed: None,
            preview_seq: 0,
            pending_endpoint: String::new(),
            pending_max_mib: 0.0,
            pending_timeout_secs: 0,
            app_version: env!("CHECKYOURMOLE_VERSION"),
        };
        app.reset_settings_form();
        Ok(app)
    }

    fn busy(&self) -> bool {
        self.session.is_busy() || self.outcome_rx.is_some()
    }

    fn pick_image(&mut self, ctx: &egui::Context) {
        let Some(path) = FileDialog::new()
            .add_filter("Images", IMAGE_EXTENSIONS)
            .pick_file()
        else {
            return;
        };
        self.clear_previews(ctx);
        let candidate = match UploadCandidate::from_path(&path) {
            Ok(candidate) => candidate,
            Err(e) => {
                self.status = format!("Cannot open file: {e:#}");
                return;
            }
        };
        self.status = match self.session.select(candidate) {
            Ok(upload) => format!(
                "Selected {} ({:.1} KiB)",
                upload.file_name,
                upload.size as f64 / 1024.0
            ),
            Err(e) => e.user_message(),
        };
    }

    fn start_analysis(&mut self, ctx: &egui::Context) {
        let (ticket, pending) = match self.session.begin_analysis() {
            Ok(armed) => armed,
            Err(e) => {
                self.status = e.user_message();
                self.session.record(Err(e));
                return;
            }
        };
        self.clear_previews(ctx);
        self.status = "Analyzing image...".to_string();
        let (tx, rx) = mpsc::channel();
        self.outcome_rx = Some(rx);
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let outcome = pending.await;
            let _ = tx.send((ticket, outcome));
            ctx.request_repaint();
        });
    }

    fn poll_outcome(&mut self, ctx: &egui::Context) {
        let Some(rx) = &self.outcome_rx else {
            return;
        };
        let (ticket, outcome) = match rx.try_recv() {
            Ok(received) => received,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => {
                self.outcome_rx = None;
                self.status = "Analysis was interrupted.".to_string();
                return;
            }
        };
        self.outcome_rx = None;
        if !self.session.record_analysis(ticket, outcome.clone()) {
            return;
        }
        match &outcome {
            Ok(result) => {
                self.preview_seq += 1;
                self.overlay = Some(Preview::from_ref(&result.overlay, "gradcam", self.preview_seq));
                self.preprocessed = result
                    .preprocessed
                    .as_ref()
                    .map(|img| Preview::from_ref(img, "preprocessed", self.preview_seq));
                self.status = "Analysis complete.".to_string();
                self.panel = Panel::Results;
            }
            Err(e) => self.status = e.user_message(),
        }
        ctx.request_repaint();
    }

    fn check_health(&mut self, ctx: &egui::Context) {
        let (tx, rx) = mpsc::channel();
        self.health = None;
        self.health_rx = Some(rx);
        let client = Arc::clone(self.session.client());
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let _ = tx.send(client.check_health().await);
            ctx.request_repaint();
        });
    }

    fn poll_health(&mut self) {
        if let Some(rx) = &self.health_rx {
            match rx.try_recv() {
                Ok(status) => {
                    if !status.is_healthy() {
                        tracing::warn!(?status, "analysis service not healthy");
                    }
                    self.health = Some(status);
                    self.health_rx = None;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => self.health_rx = None,
            }
        }
    }

    fn clear_previews(&mut self, ctx: &egui::Context) {
        for preview in [self.overlay.take(), self.preprocessed.take()]
            .into_iter()
            .flatten()
        {
            preview.forget(ctx);
        }
    }

    fn render_health(&self, ui: &mut egui::Ui) {
        let (color, text) = match &self.health {
            None if self.health_rx.is_some() => (egui::Color32::GRAY, "Checking service...".to_string()),
            None => (egui::Color32::GRAY, "Service status unknown".to_string()),
            Some(HealthStatus::Healthy) => (BENIGN_COLOR, "Service online".to_string()),
            Some(HealthStatus::Unhealthy(status)) => {
                (egui::Color32::YELLOW, format!("Service degraded: {status}"))
            }
            Some(HealthStatus::Unreachable(_)) => (MALIGNANT_COLOR, "Service unreachable".to_string()),
        };
        ui.colored_label(color, text);
    }

    fn render_results_panel(&mut self, ui: &mut egui::Ui) {
        if let Some(upload) = self.session.selected() {
            ui.label(format!("Image: {}", upload.file_name));
        } else {
            ui.heading("Choose an image of the skin spot to begin");
            ui.label(format!(
                "Images up to {:.0} MiB are accepted.",
                self.config.max_upload_bytes as f64 / (1024.0 * 1024.0)
            ));
        }

        if self.busy() {
            ui.add_space(8.0);
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Waiting for the analysis service...");
            });
            return;
        }

        if let Some(error) = self.session.error() {
            ui.add_space(8.0);
            ui.colored_label(MALIGNANT_COLOR, error.user_message());
            return;
        }

        let Some(result) = self.session.result() else {
            return;
        };
        let color = if result.diagnosis.is_malignant() {
            MALIGNANT_COLOR
        } else {
            BENIGN_COLOR
        };
        ui.add_space(8.0);
        ui.label(
            egui::RichText::new(format!("Diagnosis: {}", result.diagnosis.headline()))
                .heading()
                .strong()
                .color(color),
        );
        ui.label(
            egui::RichText::new(format!("Confidence: {}", result.confidence_percent()))
                .color(color),
        );
        ui.add_space(12.0);
        egui::ScrollArea::vertical()
            .auto_shrink([false; 2])
            .show(ui, |ui| {
                ui.horizontal_wrapped(|ui| {
                    if let Some(preview) = &self.preprocessed {
                        ui.vertical(|ui| {
                            ui.label("Analyzed image");
                            preview.show(ui, PREVIEW_WIDTH);
                        });
                    }
                    if let Some(preview) = &self.overlay {
                        ui.vertical(|ui| {
                            ui.label("Grad-CAM heat map");
                            preview.show(ui, PREVIEW_WIDTH);
                        });
                    }
                });
                ui.add_space(8.0);
                ui.small(
                    "This result is produced by a machine learning model and is not a medical diagnosis.",
                );
            });
    }
}

impl App for UiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        if self.health.is_none() && self.health_rx.is_none() {
            self.check_health(ctx);
        }
        self.poll_health();
        self.poll_outcome(ctx);

        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui
                    .add_enabled(!self.busy(), egui::Button::new("Choose image..."))
                    .clicked()
                {
                    self.pick_image(ctx);
                }

                let can_analyze = self.session.can_analyze() && !self.busy();
                if ui
                    .add_enabled(can_analyze, egui::Button::new("Analyze"))
                    .clicked()
                {
                    self.start_analysis(ctx);
                }
                if self.busy() {
                    ui.spinner();
                }

                ui.separator();
                ui.selectable_value(&mut self.panel, Panel::Results, "Results");
                ui.selectable_value(&mut self.panel, Panel::Settings, "Settings");
                ui.separator();
                self.render_health(ui);

                if !self.status.is_empty() {
                    ui.separator();
                    ui.label(&self.status);
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| match self.panel {
            Panel::Results => self.render_results_panel(ui),
            Panel::Settings => self.render_settings_panel(ui),
        });
    }
}
