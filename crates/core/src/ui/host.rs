//! The egui overlay host.
//!
//! winit wants its event loop on the main thread, while the session lives on
//! the async runtime. [`EguiOverlayHost`] only queues launch requests;
//! [`OverlayPump::run`] drains them on the main thread and runs one
//! `eframe` window at a time, reporting `Closed` after each one returns.

use super::overlay_app::OverlayApp;
use super::{
    ChannelWindow, OverlayCommand, OverlayEvent, OverlayEventSender, OverlayHost, OverlaySpec, OverlayWindow,
    WindowHandle,
};
use crate::capture::PointerTracker;
use crate::error::{AppError, Result};
use eframe::egui;
use std::sync::mpsc::{channel, Receiver, Sender};

struct Launch {
    spec: OverlaySpec,
    commands: Receiver<OverlayCommand>,
    events: OverlayEventSender,
}

/// Creates a connected host/pump pair.
pub fn overlay_pump(pointer: PointerTracker) -> (EguiOverlayHost, OverlayPump) {
    let (launches_tx, launches_rx) = channel();
    (
        EguiOverlayHost { launches: launches_tx },
        OverlayPump {
            launches: launches_rx,
            pointer,
        },
    )
}

#[derive(Clone)]
pub struct EguiOverlayHost {
    launches: Sender<Launch>,
}

impl OverlayHost for EguiOverlayHost {
    fn open(&self, spec: OverlaySpec, events: OverlayEventSender) -> Result<Box<dyn OverlayWindow>> {
        let (commands_tx, commands_rx) = channel();
        let handle = WindowHandle::new(spec.id);
        self.launches
            .send(Launch {
                spec,
                commands: commands_rx,
                events,
            })
            .map_err(|_| AppError::ui("overlay pump is not running"))?;
        Ok(Box::new(ChannelWindow::new(handle, commands_tx)))
    }
}

pub struct OverlayPump {
    launches: Receiver<Launch>,
    pointer: PointerTracker,
}

impl OverlayPump {
    /// Runs overlays on the calling thread until every host is dropped.
    ///
    /// Must be called from the main thread.
    pub fn run(self) {
        log::debug!("Overlay pump started");
        while let Ok(launch) = self.launches.recv() {
            self.run_window(launch);
        }
        log::debug!("Overlay pump stopped");
    }

    fn run_window(&self, launch: Launch) {
        let Launch { spec, commands, events } = launch;
        let id = spec.id;
        let mode = spec.mode;
        let title = format!("clipcap {}", mode);

        // Visible and transparent from the start; the app paints nothing until Show.
        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_title(&title)
                .with_position(egui::pos2(spec.bounds.x, spec.bounds.y))
                .with_inner_size(egui::vec2(spec.bounds.width, spec.bounds.height))
                .with_decorations(false)
                .with_transparent(true)
                .with_resizable(false)
                .with_taskbar(false)
                .with_always_on_top()
                .with_mouse_passthrough(true),
            ..Default::default()
        };

        let app_events = events.clone();
        let pointer = self.pointer.clone();
        let result = eframe::run_native(
            &title,
            options,
            Box::new(move |cc| {
                cc.egui_ctx.set_visuals(egui::Visuals::dark());
                Ok(Box::new(OverlayApp::new(id, mode, commands, app_events, pointer)) as Box<dyn eframe::App>)
            }),
        );
        if let Err(e) = result {
            log::error!("{} failed: {}", id, e);
        }

        if events.send(OverlayEvent::Closed(id)).is_err() {
            log::debug!("{} closed after the session went away", id);
        }
    }
}
