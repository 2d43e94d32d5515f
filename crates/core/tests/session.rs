mod common;

use clipcap_core::capture::SourceHandle;
use clipcap_core::geometry::Rect;
use clipcap_core::image_processing::ImageProcessor;
use clipcap_core::notify::Severity;
use clipcap_core::permissions::{PermissionStatus, PromptChoice};
use clipcap_core::recording::chunk_channel;
use clipcap_core::session::{CaptureSession, SessionHandle, SessionPhase};
use clipcap_core::ui::OverlayMessage;
use clipcap_core::{CaptureMode, StartOutcome};
use common::*;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

struct Rig {
    session: SessionHandle,
    host: Arc<FakeHost>,
    displays: Arc<FakeDisplays>,
    permissions: Arc<FakePermissions>,
    fakes: Fakes,
    temp: TempDir,
}

fn rig_with(displays: FakeDisplays, permissions: FakePermissions, fakes: Fakes) -> Rig {
    let temp = tempfile::tempdir().unwrap();
    let displays = Arc::new(displays);
    let permissions = Arc::new(permissions);
    let host = Arc::new(FakeHost::default());
    let services = fakes.services(displays.clone(), permissions.clone(), host.clone(), temp.path());
    Rig {
        session: CaptureSession::spawn(services),
        host,
        displays,
        permissions,
        fakes,
        temp,
    }
}

fn rig(dialog_answer: Option<&Path>) -> Rig {
    rig_with(
        FakeDisplays::with_frame(display(200.0, 150.0), gradient(200, 150)),
        FakePermissions::granted(),
        Fakes::new(FakeRecognizer::answering(Ok("")), FakeDialogs::answering(dialog_answer)),
    )
}

fn temp_videos(dir: &Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("temp_video_"))
        })
        .collect()
}

#[tokio::test]
async fn draw_copy_puts_the_exact_crop_on_the_clipboard() {
    // 100x75 logical display at 2x; the frame is 200x150 physical pixels
    let rig = rig_with(
        FakeDisplays::with_frame(display_scaled(100.0, 75.0, 2.0), gradient(200, 150)),
        FakePermissions::granted(),
        Fakes::new(FakeRecognizer::answering(Ok("")), FakeDialogs::answering(None)),
    );

    assert_eq!(within(rig.session.start_capture(CaptureMode::Draw)).await, StartOutcome::Started);
    assert_eq!(*rig.displays.requested.lock().unwrap(), vec![(200, 150)]);

    eventually("overlay shown", || rig.host.has_command("SetMousePassthrough(false)")).await;
    assert_eq!(
        rig.host.commands(),
        vec!["Deliver", "Show", "SetMousePassthrough(false)"]
    );

    let status = rig.session.status().await.unwrap();
    assert_eq!(status.phase, SessionPhase::OverlayActive);
    assert!(status.capturing);
    assert_eq!(status.mode, Some(CaptureMode::Draw));
    assert_eq!(status.display, Some(1));
    assert_eq!(status.source, Some(SourceHandle::for_display(1)));
    assert_eq!(status.window, Some(rig.host.window_id()));

    let payload = rig.host.delivered.lock().unwrap().clone().unwrap();
    assert_eq!(payload.mode, CaptureMode::Draw);
    assert_eq!((payload.frame.width(), payload.frame.height()), (200, 150));

    let crop = ImageProcessor::crop_selection(&payload.frame, Rect::new(10.0, 20.0, 50.0, 40.0), 2.0).unwrap();
    let expected = image::imageops::crop_imm(&gradient(200, 150), 20, 40, 100, 80).to_image();
    assert_eq!(crop, expected);

    let png = ImageProcessor::encode_png(&crop).unwrap();
    rig.host.user(OverlayMessage::CopyImage(png.clone()));
    within(rig.session.wait_idle()).await;

    assert_eq!(*rig.fakes.clipboard.images.lock().unwrap(), vec![png]);
    assert!(rig.fakes.notifier.saw(Severity::Success, "copied"));
    assert_eq!(rig.host.commands().last().map(String::as_str), Some("Close"));

    let status = rig.session.status().await.unwrap();
    assert!(!status.capturing);
    assert_eq!(status.window, None);
    assert_eq!(status.mode, None);
}

#[tokio::test]
async fn second_start_is_busy_while_acquiring_and_while_overlay_is_open() {
    let gate = Arc::new(Notify::new());
    let mut displays = FakeDisplays::with_frame(display(200.0, 150.0), gradient(200, 150));
    displays.gate = Some(gate.clone());
    let rig = rig_with(
        displays,
        FakePermissions::granted(),
        Fakes::new(FakeRecognizer::answering(Ok("")), FakeDialogs::answering(None)),
    );

    let first = {
        let session = rig.session.clone();
        tokio::spawn(async move { session.start_capture(CaptureMode::Ocr).await })
    };
    eventually("acquiring", || rig.session.phase() == SessionPhase::Acquiring).await;

    assert_eq!(within(rig.session.start_capture(CaptureMode::Draw)).await, StartOutcome::Busy);
    assert!(rig.fakes.notifier.saw(Severity::Warning, "already in progress"));
    assert_eq!(rig.session.status().await.unwrap().mode, Some(CaptureMode::Ocr));

    gate.notify_one();
    assert_eq!(within(first).await.unwrap(), StartOutcome::Started);
    assert_eq!(rig.session.phase(), SessionPhase::OverlayActive);

    assert_eq!(within(rig.session.start_capture(CaptureMode::Video)).await, StartOutcome::Busy);
    assert_eq!(rig.host.opened.lock().unwrap().len(), 1);

    rig.session.cancel().await;
    within(rig.session.wait_idle()).await;
    assert!(rig.host.has_command("Close"));
}

#[tokio::test]
async fn denied_permission_offers_settings_and_opens_nothing() {
    let rig = rig_with(
        FakeDisplays::with_frame(display(200.0, 150.0), gradient(200, 150)),
        FakePermissions::new(PermissionStatus::Denied, PromptChoice::OpenSettings),
        Fakes::new(FakeRecognizer::answering(Ok("")), FakeDialogs::answering(None)),
    );

    assert_eq!(
        within(rig.session.start_capture(CaptureMode::Draw)).await,
        StartOutcome::PermissionDenied
    );
    assert_eq!(rig.permissions.prompts.load(Ordering::SeqCst), 1);
    assert_eq!(rig.permissions.opened.load(Ordering::SeqCst), 1);
    assert!(rig.displays.requested.lock().unwrap().is_empty());
    assert!(rig.host.opened.lock().unwrap().is_empty());
    assert_eq!(rig.session.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn dismissed_permission_prompt_leaves_settings_closed() {
    let rig = rig_with(
        FakeDisplays::with_frame(display(200.0, 150.0), gradient(200, 150)),
        FakePermissions::new(PermissionStatus::Denied, PromptChoice::Dismiss),
        Fakes::new(FakeRecognizer::answering(Ok("")), FakeDialogs::answering(None)),
    );

    assert_eq!(
        within(rig.session.start_capture(CaptureMode::Video)).await,
        StartOutcome::PermissionDenied
    );
    assert_eq!(rig.permissions.prompts.load(Ordering::SeqCst), 1);
    assert_eq!(rig.permissions.opened.load(Ordering::SeqCst), 0);

    let status = rig.session.status().await.unwrap();
    assert!(!status.capturing);
    assert_eq!(status.phase, SessionPhase::Idle);
}

#[tokio::test]
async fn missing_source_returns_to_idle_without_an_overlay() {
    let rig = rig_with(
        FakeDisplays::failing(display(200.0, 150.0), Frame::NoSource),
        FakePermissions::granted(),
        Fakes::new(FakeRecognizer::answering(Ok("")), FakeDialogs::answering(None)),
    );

    assert_eq!(
        within(rig.session.start_capture(CaptureMode::Draw)).await,
        StartOutcome::SourceUnavailable
    );
    assert!(rig.host.opened.lock().unwrap().is_empty());
    assert!(!rig.session.status().await.unwrap().capturing);

    // the next attempt is not refused as busy
    assert_eq!(
        within(rig.session.start_capture(CaptureMode::Draw)).await,
        StartOutcome::SourceUnavailable
    );
}

#[tokio::test]
async fn acquisition_failure_is_reported() {
    let rig = rig_with(
        FakeDisplays::failing(display(200.0, 150.0), Frame::Fails("display went away".into())),
        FakePermissions::granted(),
        Fakes::new(FakeRecognizer::answering(Ok("")), FakeDialogs::answering(None)),
    );

    match within(rig.session.start_capture(CaptureMode::Ocr)).await {
        StartOutcome::Failed(reason) => assert!(reason.contains("display went away"), "{}", reason),
        other => panic!("unexpected {:?}", other),
    }
    assert!(rig.fakes.notifier.saw(Severity::Error, "Capture failed"));
    assert_eq!(rig.session.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn overlay_open_failure_resets_the_session() {
    let rig = rig(None);
    rig.host.refuse.store(true, Ordering::SeqCst);

    assert!(matches!(
        within(rig.session.start_capture(CaptureMode::Draw)).await,
        StartOutcome::Failed(_)
    ));
    assert!(rig.fakes.notifier.saw(Severity::Error, "Could not open capture overlay"));
    assert_eq!(rig.session.phase(), SessionPhase::Idle);

    rig.host.refuse.store(false, Ordering::SeqCst);
    assert_eq!(within(rig.session.start_capture(CaptureMode::Draw)).await, StartOutcome::Started);
}

#[tokio::test]
async fn closing_the_overlay_by_hand_ends_the_session() {
    let rig = rig(None);
    assert_eq!(within(rig.session.start_capture(CaptureMode::Draw)).await, StartOutcome::Started);

    rig.host.window_closed();
    within(rig.session.wait_idle()).await;
    assert!(rig.fakes.clipboard.images.lock().unwrap().is_empty());

    // a late message from the dead window changes nothing
    rig.host.user(OverlayMessage::CopyImage(vec![1, 2, 3]));
    let status = rig.session.status().await.unwrap();
    assert_eq!(status.phase, SessionPhase::Idle);
    assert!(rig.fakes.clipboard.images.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancel_without_a_session_is_harmless() {
    let rig = rig(None);
    rig.session.cancel().await;
    assert_eq!(rig.session.status().await.unwrap().phase, SessionPhase::Idle);
    assert!(rig.host.commands().is_empty());
}

#[tokio::test]
async fn ocr_closes_the_overlay_and_stores_trimmed_text() {
    let rig = rig_with(
        FakeDisplays::with_frame(display(200.0, 150.0), gradient(200, 150)),
        FakePermissions::granted(),
        Fakes::new(
            FakeRecognizer::answering(Ok("  hello world \n")),
            FakeDialogs::answering(None),
        ),
    );
    assert_eq!(within(rig.session.start_capture(CaptureMode::Ocr)).await, StartOutcome::Started);

    rig.host.user(OverlayMessage::OcrRequest(vec![0x89, b'P', b'N', b'G']));
    within(rig.session.wait_idle()).await;
    eventually("text stored", || !rig.fakes.history.entries().is_empty()).await;

    assert_eq!(rig.fakes.history.entries(), vec!["hello world"]);
    assert_eq!(rig.fakes.clipboard.last_text().as_deref(), Some("hello world"));
    assert_eq!(rig.fakes.notifier.refreshes.load(Ordering::SeqCst), 1);

    let calls = rig.fakes.recognizer.calls.lock().unwrap().clone();
    assert_eq!(calls, vec![(4, vec!["eng".to_string(), "tur".to_string()])]);
}

#[tokio::test]
async fn save_cancel_keeps_the_overlay_open() {
    let rig = rig(None);
    assert_eq!(within(rig.session.start_capture(CaptureMode::Draw)).await, StartOutcome::Started);

    rig.host.user(OverlayMessage::SaveImage(vec![1, 2, 3]));
    eventually("overlay back on top", || rig.host.has_command("SetAlwaysOnTop(true)")).await;

    let commands = rig.host.commands();
    let lowered = commands.iter().position(|c| c == "SetAlwaysOnTop(false)").unwrap();
    let raised = commands.iter().position(|c| c == "SetAlwaysOnTop(true)").unwrap();
    assert!(lowered < raised);
    assert!(!rig.host.has_command("Close"));
    assert_eq!(rig.session.phase(), SessionPhase::OverlayActive);
    assert!(rig.fakes.notifier.saw(Severity::Info, "Save cancelled"));

    rig.session.cancel().await;
    within(rig.session.wait_idle()).await;
}

#[tokio::test]
async fn save_writes_the_file_and_closes() {
    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("shot.png");
    let rig = rig(Some(dest.as_path()));
    assert_eq!(within(rig.session.start_capture(CaptureMode::Draw)).await, StartOutcome::Started);

    let png = ImageProcessor::encode_png(&gradient(8, 8)).unwrap();
    rig.host.user(OverlayMessage::SaveImage(png.clone()));
    within(rig.session.wait_idle()).await;

    assert_eq!(std::fs::read(&dest).unwrap(), png);
    let requests = rig.fakes.dialogs.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].file_name.ends_with(".png"));
}

#[tokio::test]
async fn stopped_recording_is_moved_to_the_chosen_file() {
    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("clip.webm");
    let rig = rig(Some(dest.as_path()));
    assert_eq!(within(rig.session.start_capture(CaptureMode::Video)).await, StartOutcome::Started);

    let (chunks, stream) = chunk_channel();
    rig.host.user(OverlayMessage::RecordStart { chunks: stream });
    chunks.send(b"webm-head".to_vec()).await.unwrap();
    chunks.send(b"-cluster".to_vec()).await.unwrap();
    drop(chunks);
    rig.host.user(OverlayMessage::RecordStop);

    within(rig.session.wait_idle()).await;

    assert_eq!(std::fs::read(&dest).unwrap(), b"webm-head-cluster");
    assert!(temp_videos(rig.temp.path()).is_empty());
    assert!(rig.host.has_command("Hide"));
    assert!(rig.fakes.clipboard.last_text().is_none());
    let requests = rig.fakes.dialogs.requests.lock().unwrap().clone();
    assert_eq!(requests[0].extensions, vec!["webm".to_string()]);
}

#[tokio::test]
async fn recording_cut_short_by_a_closed_window_is_preserved() {
    let rig = rig(None);
    assert_eq!(within(rig.session.start_capture(CaptureMode::Video)).await, StartOutcome::Started);

    let (chunks, stream) = chunk_channel();
    rig.host.user(OverlayMessage::RecordStart { chunks: stream });
    chunks.send(b"partial".to_vec()).await.unwrap();
    drop(chunks);
    rig.host.window_closed();

    within(rig.session.wait_idle()).await;
    eventually("path on clipboard", || rig.fakes.clipboard.last_text().is_some()).await;

    let kept = temp_videos(rig.temp.path());
    assert_eq!(kept.len(), 1);
    assert_eq!(std::fs::read(&kept[0]).unwrap(), b"partial");
    let shown = kept[0].display().to_string();
    assert_eq!(rig.fakes.clipboard.last_text(), Some(shown.clone()));
    assert_eq!(rig.fakes.history.entries(), vec![shown]);
    assert!(rig.fakes.dialogs.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn shutdown_waits_for_text_recognition_to_finish() {
    let rig = rig_with(
        FakeDisplays::with_frame(display(200.0, 150.0), gradient(200, 150)),
        FakePermissions::granted(),
        Fakes::new(
            FakeRecognizer::answering(Ok("late text")).slow(Duration::from_millis(300)),
            FakeDialogs::answering(None),
        ),
    );
    assert_eq!(within(rig.session.start_capture(CaptureMode::Ocr)).await, StartOutcome::Started);

    // the same sequence a one-shot capture runs before its runtime goes away
    rig.host.user(OverlayMessage::OcrRequest(vec![1, 2, 3]));
    within(rig.session.wait_idle()).await;
    assert!(rig.fakes.history.entries().is_empty());
    within(rig.session.shutdown()).await;

    assert_eq!(rig.fakes.history.entries(), vec!["late text"]);
    assert_eq!(rig.fakes.clipboard.last_text().as_deref(), Some("late text"));
    assert!(rig.fakes.notifier.saw(Severity::Success, "Text copied"));
}

#[tokio::test]
async fn shutdown_during_a_recording_keeps_the_file() {
    let rig = rig(None);
    assert_eq!(within(rig.session.start_capture(CaptureMode::Video)).await, StartOutcome::Started);

    let (chunks, stream) = chunk_channel();
    rig.host.user(OverlayMessage::RecordStart { chunks: stream });
    chunks.send(b"first second".to_vec()).await.unwrap();
    drop(chunks);
    eventually("recording file", || temp_videos(rig.temp.path()).len() == 1).await;

    within(rig.session.shutdown()).await;

    let kept = temp_videos(rig.temp.path());
    assert_eq!(std::fs::read(&kept[0]).unwrap(), b"first second");
    assert_eq!(rig.fakes.clipboard.last_text(), Some(kept[0].display().to_string()));
    assert!(rig.fakes.notifier.saw(Severity::Info, "Recording interrupted"));
    assert!(rig.host.has_command("Close"));
}

#[tokio::test]
async fn recording_survives_an_overlay_that_stops_responding() {
    let rig = rig(None);
    assert_eq!(within(rig.session.start_capture(CaptureMode::Video)).await, StartOutcome::Started);

    let (chunks, stream) = chunk_channel();
    rig.host.user(OverlayMessage::RecordStart { chunks: stream });
    chunks.send(b"frames".to_vec()).await.unwrap();
    drop(chunks);
    eventually("recording file", || temp_videos(rig.temp.path()).len() == 1).await;

    // hiding the window before the save dialog fails
    rig.host.hang();
    rig.host.user(OverlayMessage::RecordStop);
    within(rig.session.wait_idle()).await;
    eventually("path on clipboard", || rig.fakes.clipboard.last_text().is_some()).await;

    let kept = temp_videos(rig.temp.path());
    assert_eq!(kept.len(), 1);
    assert_eq!(std::fs::read(&kept[0]).unwrap(), b"frames");
    assert_eq!(rig.fakes.history.entries(), vec![kept[0].display().to_string()]);
    assert!(rig.fakes.dialogs.requests.lock().unwrap().is_empty());
    assert!(!rig.session.status().await.unwrap().capturing);
}

#[tokio::test]
async fn failed_cancel_still_keeps_the_recording() {
    let rig = rig(None);
    assert_eq!(within(rig.session.start_capture(CaptureMode::Video)).await, StartOutcome::Started);

    let (chunks, stream) = chunk_channel();
    rig.host.user(OverlayMessage::RecordStart { chunks: stream });
    chunks.send(b"frames".to_vec()).await.unwrap();
    drop(chunks);
    eventually("recording file", || temp_videos(rig.temp.path()).len() == 1).await;

    rig.host.hang();
    rig.session.cancel().await;
    within(rig.session.wait_idle()).await;
    eventually("path on clipboard", || rig.fakes.clipboard.last_text().is_some()).await;

    let kept = temp_videos(rig.temp.path());
    assert_eq!(rig.fakes.clipboard.last_text(), Some(kept[0].display().to_string()));
    assert!(rig.fakes.notifier.saw(Severity::Info, "Recording interrupted"));
}
