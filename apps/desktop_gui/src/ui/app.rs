use std::{path::PathBuf, sync::Arc, time::Instant};

use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use egui::TextureHandle;
use vision_core::{NoticeLevel, ViewPhase, ViewSnapshot};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{PreviewImage, UiErrorContext, UiEvent};
use crate::controller::orchestration::dispatch_backend_command;
use crate::ui::toasts::ToastQueue;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];
const ACCENT: egui::Color32 = egui::Color32::from_rgb(99, 102, 241);

#[derive(Debug, Clone, Default)]
pub struct StartupConfig {
    pub backend_url: String,
    pub access_token: Option<String>,
}

struct PreviewTexture {
    source: Arc<str>,
    texture: TextureHandle,
    size: egui::Vec2,
}

pub struct VisionDesktopApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,
    backend_url: String,
    snapshot: Option<ViewSnapshot>,
    token_input: String,
    question_draft: String,
    preview: Option<PreviewTexture>,
    toasts: ToastQueue,
    status: String,
    login_banner: Option<String>,
}

impl VisionDesktopApp {
    pub fn new(
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
        startup: StartupConfig,
    ) -> Self {
        Self {
            cmd_tx,
            ui_rx,
            backend_url: startup.backend_url,
            snapshot: None,
            token_input: startup.access_token.unwrap_or_default(),
            question_draft: String::new(),
            preview: None,
            toasts: ToastQueue::default(),
            status: "Starting backend worker".to_string(),
            login_banner: None,
        }
    }

    fn send(&mut self, cmd: BackendCommand) {
        dispatch_backend_command(&self.cmd_tx, cmd, &mut self.status);
    }

    fn process_ui_events(&mut self, ctx: &egui::Context) {
        while let Ok(event) = self.ui_rx.try_recv() {
            match event {
                UiEvent::Snapshot(snapshot) => self.apply_snapshot(snapshot),
                UiEvent::Notice(notice) => {
                    if notice.level == NoticeLevel::Error {
                        self.status = notice.message.clone();
                    }
                    self.toasts.push(notice, Instant::now());
                }
                UiEvent::PreviewDecoded { source, image } => {
                    let current = self
                        .snapshot
                        .as_ref()
                        .and_then(|snapshot| snapshot.preview.as_ref());
                    if current.is_some_and(|current| Arc::ptr_eq(current, &source)) {
                        self.preview = Some(load_preview_texture(ctx, source, &image));
                    }
                }
                UiEvent::PreviewFailed { source, reason } => {
                    let current = self
                        .snapshot
                        .as_ref()
                        .and_then(|snapshot| snapshot.preview.as_ref());
                    if current.is_some_and(|current| Arc::ptr_eq(current, &source)) {
                        self.status = format!("Preview unavailable: {reason}");
                    }
                }
                UiEvent::Error(err) => {
                    self.status = err.display_message();
                    if err.context() == UiErrorContext::Login
                        || err.context() == UiErrorContext::BackendStartup
                        || err.requires_reauth()
                    {
                        self.login_banner = Some(err.display_message());
                    }
                }
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: ViewSnapshot) {
        // Seeded once; afterwards the text field owns the draft.
        if self.snapshot.is_none() {
            self.question_draft = snapshot.custom_question.clone();
        }
        let keep_preview = match (&self.preview, &snapshot.preview) {
            (Some(preview), Some(source)) => Arc::ptr_eq(&preview.source, source),
            _ => false,
        };
        if !keep_preview {
            self.preview = None;
        }
        match snapshot.phase {
            ViewPhase::Initializing => self.status = "Checking session".to_string(),
            ViewPhase::Unauthenticated => {
                if self.status == "Checking session" || self.status.starts_with("Starting") {
                    self.status = "Signed out".to_string();
                }
            }
            ViewPhase::Authenticated(_) => {
                self.login_banner = None;
                if !matches!(
                    self.snapshot.as_ref().map(|s| s.phase),
                    Some(ViewPhase::Authenticated(_))
                ) {
                    self.status = "Signed in".to_string();
                }
            }
        }
        self.snapshot = Some(snapshot);
    }

    fn try_login(&mut self) {
        let token = self.token_input.trim().to_string();
        self.login_banner = None;
        self.status = "Signing in".to_string();
        self.send(BackendCommand::Login {
            access_token: (!token.is_empty()).then_some(token),
        });
    }

    fn select_image(&mut self, path: PathBuf) {
        self.status = format!("Uploading {}", path.display());
        self.send(BackendCommand::SelectImage { path });
    }

    fn pick_image(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", IMAGE_EXTENSIONS)
            .pick_file()
        {
            self.select_image(path);
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .find_map(|file| file.path.clone())
        });
        if let Some(path) = dropped {
            self.select_image(path);
        }
    }

    fn show_loading_screen(&self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.centered_and_justified(|ui| {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(&self.status);
                });
            });
        });
    }

    fn show_login_screen(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let avail = ui.available_size();
            let card_width = avail.x.clamp(380.0, 480.0);
            ui.add_space((avail.y * 0.18).clamp(18.0, 140.0));

            ui.vertical_centered(|ui| {
                ui.set_width(card_width);
                egui::Frame::NONE
                    .fill(ui.visuals().faint_bg_color)
                    .corner_radius(14.0)
                    .stroke(egui::Stroke::new(
                        1.0,
                        ui.visuals().widgets.noninteractive.bg_stroke.color,
                    ))
                    .inner_margin(egui::Margin::symmetric(24, 22))
                    .show(ui, |ui| {
                        ui.style_mut().spacing.item_spacing = egui::vec2(10.0, 10.0);
                        ui.heading(egui::RichText::new("AI Vision Pro").strong().size(26.0));
                        ui.weak("Upload an image and get an instant AI description.");

                        if let Some(banner) = self.login_banner.clone() {
                            egui::Frame::NONE
                                .fill(egui::Color32::from_rgb(111, 53, 53))
                                .corner_radius(8.0)
                                .inner_margin(egui::Margin::symmetric(10, 8))
                                .show(ui, |ui| {
                                    ui.horizontal_wrapped(|ui| {
                                        ui.label(
                                            egui::RichText::new(&banner)
                                                .color(egui::Color32::WHITE),
                                        );
                                        if ui.small_button("Dismiss").clicked() {
                                            self.login_banner = None;
                                        }
                                    });
                                });
                        }

                        ui.label(egui::RichText::new("Access token").strong());
                        let response = ui.add(
                            egui::TextEdit::singleline(&mut self.token_input)
                                .password(true)
                                .hint_text("Leave empty to reuse the configured token")
                                .desired_width(f32::INFINITY),
                        );
                        let enter_pressed = ctx.input(|i| i.key_pressed(egui::Key::Enter));
                        if response.lost_focus() && enter_pressed {
                            self.try_login();
                        }

                        let button = egui::Button::new(
                            egui::RichText::new("Get Started")
                                .strong()
                                .size(16.0)
                                .color(egui::Color32::WHITE),
                        )
                        .fill(ACCENT)
                        .min_size(egui::vec2(ui.available_width(), 40.0));
                        if ui.add(button).clicked() {
                            self.try_login();
                        }

                        ui.separator();
                        ui.horizontal_wrapped(|ui| {
                            ui.small(format!("Backend: {}", self.backend_url));
                        });
                        ui.horizontal_wrapped(|ui| {
                            ui.small("Status:");
                            ui.small(egui::RichText::new(&self.status).weak());
                        });
                    });
            });
        });
    }

    fn show_main_workspace(&mut self, ctx: &egui::Context, snapshot: &ViewSnapshot) {
        self.handle_dropped_files(ctx);

        egui::TopBottomPanel::top("workspace_header")
            .frame(
                egui::Frame::NONE
                    .fill(ctx.style().visuals.panel_fill)
                    .inner_margin(egui::Margin::symmetric(16, 10)),
            )
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading(egui::RichText::new("AI Vision Pro").strong());
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("Sign Out").clicked() {
                            self.status = "Signing out".to_string();
                            self.question_draft.clear();
                            self.send(BackendCommand::Logout);
                        }
                        if let Some(email) = snapshot.user.as_ref().and_then(|u| u.email.as_deref())
                        {
                            ui.label(egui::RichText::new(email).weak());
                        }
                    });
                });
            });

        egui::TopBottomPanel::bottom("workspace_status").show(ctx, |ui| {
            ui.small(egui::RichText::new(&self.status).weak());
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.columns(2, |columns| {
                    self.show_upload_card(&mut columns[0], snapshot);
                    self.show_result_card(&mut columns[1], snapshot);
                });
            });
        });
    }

    fn show_upload_card(&mut self, ui: &mut egui::Ui, snapshot: &ViewSnapshot) {
        card_frame(ui).show(ui, |ui| {
            ui.set_width(ui.available_width());
            ui.label(egui::RichText::new("Upload Image").strong().size(18.0));
            ui.add_space(6.0);

            match &snapshot.selected {
                None => {
                    let drop_zone = egui::Button::new(
                        egui::RichText::new("Click to upload or drop an image here").size(15.0),
                    )
                    .min_size(egui::vec2(ui.available_width(), 160.0));
                    if ui
                        .add_enabled(!snapshot.is_uploading(), drop_zone)
                        .clicked()
                    {
                        self.pick_image();
                    }
                    ui.small(egui::RichText::new("Supports JPG, PNG, WebP formats up to 10MB").weak());
                }
                Some(selected) => {
                    if let Some(preview) = &self.preview {
                        let max_width = ui.available_width();
                        let scale = (max_width / preview.size.x).min(320.0 / preview.size.y);
                        let size = preview.size * scale.min(1.0);
                        ui.add(egui::Image::new(&preview.texture).fit_to_exact_size(size));
                    } else {
                        ui.spinner();
                    }
                    ui.horizontal(|ui| {
                        ui.label(egui::RichText::new(&selected.file_name).strong());
                        ui.weak(human_readable_bytes(selected.size_bytes));
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if ui.button("Clear").clicked() {
                                self.question_draft.clear();
                                self.send(BackendCommand::Clear);
                            }
                        });
                    });
                }
            }

            if !shows_analysis_controls(snapshot) {
                return;
            }
            ui.add_space(10.0);
            ui.label(egui::RichText::new("Custom question").strong());
            let question = ui.add(
                egui::TextEdit::multiline(&mut self.question_draft)
                    .hint_text("Ask a specific question about the image (optional)")
                    .desired_rows(3)
                    .desired_width(f32::INFINITY),
            );
            if question.changed() {
                let text = self.question_draft.clone();
                self.send(BackendCommand::SetCustomQuestion { text });
            }

            ui.add_space(10.0);
            let analyze = egui::Button::new(
                egui::RichText::new(analyze_button_label(snapshot))
                    .strong()
                    .size(16.0)
                    .color(egui::Color32::WHITE),
            )
            .fill(ACCENT)
            .min_size(egui::vec2(ui.available_width(), 40.0));
            if ui.add_enabled(snapshot.can_analyze(), analyze).clicked() {
                self.status = "Analyzing image".to_string();
                self.send(BackendCommand::Analyze);
            }
        });
    }

    fn show_result_card(&mut self, ui: &mut egui::Ui, snapshot: &ViewSnapshot) {
        card_frame(ui).show(ui, |ui| {
            ui.set_width(ui.available_width());
            match &snapshot.result {
                Some(result) => {
                    ui.horizontal(|ui| {
                        ui.label(egui::RichText::new("Analysis Complete").strong().size(18.0));
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if ui.button("Copy Analysis").clicked() {
                                self.send(BackendCommand::CopyResult);
                            }
                        });
                    });
                    ui.small(
                        egui::RichText::new(
                            result
                                .timestamp
                                .with_timezone(&chrono::Local)
                                .format("%b %e, %Y %H:%M:%S")
                                .to_string(),
                        )
                        .weak(),
                    );
                    ui.add_space(6.0);
                    ui.add(egui::Label::new(result.analysis.as_str()).wrap());
                }
                None if snapshot.is_analyzing() => {
                    ui.add_space(40.0);
                    ui.vertical_centered(|ui| {
                        ui.spinner();
                        ui.label("Analyzing your image...");
                    });
                    ui.add_space(40.0);
                }
                None => {
                    ui.add_space(40.0);
                    ui.vertical_centered(|ui| {
                        ui.label(egui::RichText::new("Ready to analyze").strong());
                        ui.weak("Upload an image and click Analyze to see AI insights");
                    });
                    ui.add_space(40.0);
                }
            }
        });
    }

    fn show_toasts(&mut self, ctx: &egui::Context) {
        if !self.toasts.prune(Instant::now()) {
            return;
        }
        egui::Area::new(egui::Id::new("notice_toasts"))
            .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-16.0, -36.0))
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                for toast in self.toasts.iter() {
                    let fill = match toast.level {
                        NoticeLevel::Success => egui::Color32::from_rgb(36, 99, 64),
                        NoticeLevel::Error => egui::Color32::from_rgb(111, 53, 53),
                    };
                    egui::Frame::NONE
                        .fill(fill)
                        .corner_radius(8.0)
                        .inner_margin(egui::Margin::symmetric(12, 8))
                        .show(ui, |ui| {
                            ui.label(
                                egui::RichText::new(&toast.message).color(egui::Color32::WHITE),
                            );
                        });
                    ui.add_space(6.0);
                }
            });
    }
}

impl eframe::App for VisionDesktopApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events(ctx);

        match self.snapshot.clone() {
            None => self.show_loading_screen(ctx),
            Some(snapshot) => match snapshot.phase {
                ViewPhase::Initializing => self.show_loading_screen(ctx),
                ViewPhase::Unauthenticated => self.show_login_screen(ctx),
                ViewPhase::Authenticated(_) => self.show_main_workspace(ctx, &snapshot),
            },
        }
        self.show_toasts(ctx);

        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }
}

/// The question field and Analyze button only appear once a preview exists.
fn shows_analysis_controls(snapshot: &ViewSnapshot) -> bool {
    snapshot.preview.is_some()
}

fn analyze_button_label(snapshot: &ViewSnapshot) -> &'static str {
    if snapshot.is_uploading() {
        "Uploading image..."
    } else if snapshot.is_analyzing() {
        "Analyzing with AI..."
    } else {
        "Analyze Image"
    }
}

fn card_frame(ui: &egui::Ui) -> egui::Frame {
    egui::Frame::NONE
        .fill(ui.visuals().faint_bg_color)
        .corner_radius(12.0)
        .stroke(egui::Stroke::new(
            1.0,
            ui.visuals().widgets.noninteractive.bg_stroke.color,
        ))
        .inner_margin(egui::Margin::symmetric(16, 14))
}

fn load_preview_texture(
    ctx: &egui::Context,
    source: Arc<str>,
    image: &PreviewImage,
) -> PreviewTexture {
    let color_image =
        egui::ColorImage::from_rgba_unmultiplied([image.width, image.height], &image.rgba);
    let texture = ctx.load_texture("selected-image-preview", color_image, egui::TextureOptions::LINEAR);
    PreviewTexture {
        source,
        texture,
        size: egui::vec2(image.width.max(1) as f32, image.height.max(1) as f32),
    }
}

fn human_readable_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes < KB {
        return format!("{bytes} B");
    }
    let (unit_size, unit_label) = if bytes < MB { (KB, "KB") } else { (MB, "MB") };
    let value_text = format!("{:.1}", bytes as f64 / unit_size as f64);
    let compact_value = value_text.strip_suffix(".0").unwrap_or(&value_text);
    format!("{compact_value} {unit_label}")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vision_core::{Activity, SelectedImage, ViewPhase, ViewSnapshot, WorkspacePhase};

    use super::{analyze_button_label, human_readable_bytes, shows_analysis_controls};

    fn workspace(activity: Activity, preview: Option<&str>) -> ViewSnapshot {
        ViewSnapshot {
            phase: ViewPhase::Authenticated(WorkspacePhase::Idle),
            user: None,
            selected: preview.map(|_| SelectedImage {
                file_name: "cat.png".to_string(),
                content_type: "image/png".to_string(),
                size_bytes: 4,
            }),
            preview: preview.map(Arc::from),
            image_url: None,
            result: None,
            custom_question: String::new(),
            activity,
        }
    }

    #[test]
    fn analysis_controls_wait_for_a_preview() {
        assert!(!shows_analysis_controls(&workspace(Activity::Idle, None)));
        assert!(!shows_analysis_controls(&workspace(Activity::Uploading, None)));
        assert!(shows_analysis_controls(&workspace(
            Activity::Uploading,
            Some("data:image/png;base64,iVBO")
        )));
    }

    #[test]
    fn analyze_button_reports_current_activity() {
        let preview = Some("data:image/png;base64,iVBO");
        assert_eq!(
            analyze_button_label(&workspace(Activity::Uploading, preview)),
            "Uploading image..."
        );
        assert_eq!(
            analyze_button_label(&workspace(Activity::Analyzing, preview)),
            "Analyzing with AI..."
        );
        assert_eq!(
            analyze_button_label(&workspace(Activity::Idle, preview)),
            "Analyze Image"
        );
    }

    #[test]
    fn formats_image_sizes_readably() {
        assert_eq!(human_readable_bytes(0), "0 B");
        assert_eq!(human_readable_bytes(1023), "1023 B");
        assert_eq!(human_readable_bytes(1536), "1.5 KB");
        assert_eq!(human_readable_bytes(10 * 1024 * 1024), "10 MB");
    }
}
