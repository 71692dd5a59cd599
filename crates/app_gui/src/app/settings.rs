//! Settings panel rendering for the service endpoint, upload limit, and timeout.

use super::{Panel, UiApp};
use anyhow::Result;
use eframe::egui;
use mole_core::config::DEFAULT_TIMEOUT_SECS;
use mole_core::{AnalysisClient, ClientConfig};
use std::sync::Arc;

const MIB: f64 = 1024.0 * 1024.0;

impl UiApp {
    /// Renders the settings screen.
    pub(super) fn render_settings_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Settings");
        ui.add_space(8.0);
        ui.horizontal(|ui| {
            ui.label("Analysis endpoint");
            ui.add(egui::TextEdit::singleline(&mut self.pending_endpoint).desired_width(420.0));
        });
        ui.add_space(12.0);
        ui.horizontal(|ui| {
            let slider = egui::Slider::new(&mut self.pending_max_mib, 1.0..=50.0)
                .text("Maximum image size")
                .custom_formatter(|v, _| format!("{v:.0} MiB"));
            ui.add(slider);
        });
        ui.add_space(12.0);
        ui.horizontal(|ui| {
            ui.label("Request timeout (seconds, 0 = none)");
            ui.add(
                egui::DragValue::new(&mut self.pending_timeout_secs)
                    .range(0..=600)
                    .speed(1),
            );
        });

        ui.add_space(12.0);
        ui.horizontal(|ui| {
            let idle = !self.busy();
            if ui.add_enabled(idle, egui::Button::new("Apply")).clicked() {
                match self.apply_settings() {
                    Ok(()) => {
                        self.status = "Settings applied.".to_string();
                        self.check_health(ui.ctx());
                        self.panel = Panel::Results;
                    }
                    Err(e) => self.status = format!("Settings not applied: {e:#}"),
                }
            }
            if ui.button("Reset to defaults").clicked() {
                let defaults = ClientConfig::default();
                self.pending_endpoint = defaults.endpoint;
                self.pending_max_mib = defaults.max_upload_bytes as f64 / MIB;
                self.pending_timeout_secs = DEFAULT_TIMEOUT_SECS;
            }
            if ui.button("Check connection").clicked() {
                self.check_health(ui.ctx());
            }
        });

        ui.add_space(16.0);
        ui.separator();
        ui.add_space(6.0);
        ui.heading("About");
        ui.label(format!("App version: {}", self.app_version));
        ui.label(format!("Service: {}", self.session.client().endpoint()));
        if let Some(path) = &self.config_path {
            ui.label(format!("Config file: {}", path.display()));
        }
    }

    pub(super) fn reset_settings_form(&mut self) {
        self.pending_endpoint = self.config.endpoint.clone();
        self.pending_max_mib = self.config.max_upload_bytes as f64 / MIB;
        self.pending_timeout_secs = self.config.request_timeout_secs;
    }

    /// Builds a client from the form, swaps it into the session and persists
    /// the new settings.
    fn apply_settings(&mut self) -> Result<()> {
        let config = settings_to_config(
            &self.config,
            &self.pending_endpoint,
            self.pending_max_mib,
            self.pending_timeout_secs,
        );
        let client = AnalysisClient::new(&config)?;
        self.session.replace_client(Arc::new(client))?;
        if let Some(path) = &self.config_path {
            config.save(path)?;
        }
        tracing::info!(endpoint = %config.endpoint, "settings applied");
        self.config = config;
        self.reset_settings_form();
        Ok(())
    }
}

fn settings_to_config(
    current: &ClientConfig,
    endpoint: &str,
    max_mib: f64,
    timeout_secs: u64,
) -> ClientConfig {
    ClientConfig {
        endpoint: endpoint.trim().to_string(),
        health_endpoint: current.health_endpoint.clone(),
        max_upload_bytes: (max_mib.max(0.0) * MIB).round() as u64,
        request_timeout_secs: timeout_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(10.0, 10_485_760)]
    #[case(1.0, 1_048_576)]
    #[case(2.5, 2_621_440)]
    fn form_sizes_convert_to_bytes(#[case] mib: f64, #[case] bytes: u64) {
        let cfg = settings_to_config(&ClientConfig::default(), "https://svc.example/analyze", mib, 30);
        assert_eq!(cfg.max_upload_bytes, bytes);
        assert_eq!(cfg.request_timeout_secs, 30);
    }

    #[test]
    fn form_keeps_explicit_health_endpoint_and_trims_url() {
        let current = ClientConfig {
            health_endpoint: Some("https://status.example/ping".into()),
            ..ClientConfig::default()
        };
        let cfg = settings_to_config(&current, "  https://svc.example/analyze \n", 10.0, 0);
        assert_eq!(cfg.endpoint, "https://svc.example/analyze");
        assert_eq!(cfg.health_endpoint, current.health_endpoint);
        assert!(cfg.validate().is_ok());
    }
}
