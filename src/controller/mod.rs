//! Device lifecycle controller
//!
//! Owns the single active capture stream and everything attached to it: the
//! preview, the loudness meter, the recorders and the in-progress recording
//! session. Bind requests issued while a bind is running are coalesced
//! (latest request wins), and unbind requests that cannot be honored yet are
//! deferred to the next safe point.
//!
//! State lives behind a synchronous mutex that is never held across an
//! `.await`; the only suspension points are acquisition and preview calls.

mod meter;
mod sinks;

pub use meter::{average_level, LevelMeter};
pub use sinks::{NullPreview, OverlaySource, PreviewSink};

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::device::{BindingSettings, MediaRecorder, MediaStream, StreamAcquirer};
use crate::error::CaptureResult;
use crate::notify::{Notification, NotificationSink};
use crate::recording::{
    ChunkSink, ClosedSession, EventKind, Record, RecordAssembler, RecordEvent, RecordedChunk, RecordingSession,
    Track,
};

/// Binding state of the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "settings", rename_all = "lowercase")]
pub enum BindState {
    Idle,
    Binding,
    Bound(BindingSettings),
}

/// What happened to a `bind` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindOutcome {
    /// The device is bound with the latest requested settings
    Bound,
    /// A bind was running; these settings will be applied when it finishes
    Queued,
    /// An unbind arrived during the bind and the stream was released
    Released,
}

/// What happened to an `unbind` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnbindOutcome {
    Released,
    /// Nothing bound yet, or a bind is running; honored at the next safe point
    Deferred,
}

#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    /// Premium accounts also record the pointer overlay
    pub premium: bool,
}

/// Snapshot of the controller for status queries
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    #[serde(flatten)]
    pub state: BindState,
    pub stream_id: Option<String>,
    pub recording: bool,
    pub pending_rebind: bool,
    pub pending_unbind: bool,
    pub premium: bool,
}

struct ActiveStream {
    settings: BindingSettings,
    stream: Box<dyn MediaStream>,
    recorder: Option<Box<dyn MediaRecorder>>,
    overlay_recorder: Option<Box<dyn MediaRecorder>>,
    meter: Option<LevelMeter>,
}

impl ActiveStream {
    fn new(settings: BindingSettings, stream: Box<dyn MediaStream>) -> Self {
        Self {
            settings,
            stream,
            recorder: None,
            overlay_recorder: None,
            meter: None,
        }
    }

    fn release(mut self) {
        self.meter.take();
        self.recorder.take();
        self.overlay_recorder.take();
        self.stream.stop();
    }
}

struct ActiveRecording {
    session: RecordingSession,
    primary: bool,
    overlay: bool,
    existing: Option<Record>,
}

/// Puts the controller back to `Idle` if a bind future is dropped mid-flight
struct BindingReset<'a> {
    controller: &'a DeviceController,
}

impl Drop for BindingReset<'_> {
    fn drop(&mut self) {
        let mut inner = self.controller.inner.lock();
        if !matches!(inner.state, BindState::Binding) {
            return;
        }

        warn!("Bind cancelled before completion, releasing device");
        self.controller.release_locked(&mut inner);
        if inner.pending_rebind.take().is_some() {
            warn!("Dropping settings queued behind the cancelled bind");
        }
        inner.pending_unbind = false;
        inner.state = BindState::Idle;
    }
}

struct Inner {
    state: BindState,
    active: Option<ActiveStream>,
    pending_rebind: Option<BindingSettings>,
    pending_unbind: bool,
    recording: Option<ActiveRecording>,
    pointer_used: bool,
}

pub struct DeviceController {
    acquirer: Arc<StreamAcquirer>,
    preview: Arc<dyn PreviewSink>,
    overlay: Option<Arc<dyn OverlaySource>>,
    notifier: Arc<dyn NotificationSink>,
    options: ControllerOptions,
    epoch: Instant,
    chunk_tx: mpsc::UnboundedSender<RecordedChunk>,
    assembler: Arc<Mutex<RecordAssembler>>,
    inner: Mutex<Inner>,
}

impl DeviceController {
    /// Create the controller and its chunk pump
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        acquirer: Arc<StreamAcquirer>,
        preview: Arc<dyn PreviewSink>,
        overlay: Option<Arc<dyn OverlaySource>>,
        notifier: Arc<dyn NotificationSink>,
        options: ControllerOptions,
    ) -> Self {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let assembler = Arc::new(Mutex::new(RecordAssembler::new()));

        spawn_chunk_pump(chunk_rx, Arc::clone(&assembler), Arc::clone(&notifier));

        info!("Device controller initialized (premium={})", options.premium);

        Self {
            acquirer,
            preview,
            overlay,
            notifier,
            options,
            epoch: Instant::now(),
            chunk_tx,
            assembler,
            inner: Mutex::new(Inner {
                state: BindState::Idle,
                active: None,
                pending_rebind: None,
                pending_unbind: false,
                recording: None,
                pointer_used: false,
            }),
        }
    }

    /// Bind the device described by `settings`
    ///
    /// Only the final settings of a burst of overlapping calls produce a
    /// `deviceBound` notification.
    pub async fn bind(&self, settings: BindingSettings) -> CaptureResult<BindOutcome> {
        {
            let mut inner = self.inner.lock();
            if matches!(inner.state, BindState::Binding) {
                debug!("Bind in progress, queueing new settings");
                inner.pending_rebind = Some(settings);
                inner.pending_unbind = false;
                return Ok(BindOutcome::Queued);
            }
            // A fresh bind cancels an unbind requested while nothing was bound
            inner.pending_unbind = false;
            inner.state = BindState::Binding;
        }

        let _reset = BindingReset { controller: self };
        let mut settings = settings;

        loop {
            if let Err(e) = self.bind_once(&settings).await {
                let next = {
                    let mut inner = self.inner.lock();
                    self.release_locked(&mut inner);
                    inner.pending_unbind = false;
                    let next = inner.pending_rebind.take();
                    if next.is_none() {
                        inner.state = BindState::Idle;
                    }
                    next
                };

                match next {
                    Some(next) => {
                        warn!("Superseded bind failed ({}), binding newer settings", e);
                        settings = next;
                        continue;
                    }
                    None => {
                        error!("Failed to bind device: {}", e);
                        self.notifier.notify(Notification::BindingDeviceFailed);
                        return Err(e);
                    }
                }
            }

            let mut inner = self.inner.lock();

            if let Some(next) = inner.pending_rebind.take() {
                debug!("Settings changed during bind, rebinding");
                drop(inner);
                settings = next;
                continue;
            }

            let outcome = if inner.pending_unbind {
                info!("Unbind requested during bind, releasing device");
                inner.pending_unbind = false;
                self.release_locked(&mut inner);
                inner.state = BindState::Idle;
                BindOutcome::Released
            } else {
                inner.state = BindState::Bound(settings);
                BindOutcome::Bound
            };
            drop(inner);

            info!("Device bound");
            self.notifier.notify(Notification::DeviceBound);
            return Ok(outcome);
        }
    }

    async fn bind_once(&self, settings: &BindingSettings) -> CaptureResult<()> {
        let reuse = {
            let mut inner = self.inner.lock();
            let reuse = inner.active.as_ref().is_some_and(|a| a.settings == *settings);
            if !reuse && inner.active.is_some() {
                info!("Settings changed, unbinding previous device");
                self.release_locked(&mut inner);
            }
            reuse
        };

        if !reuse {
            info!("Binding device");
            let stream = self.acquirer.acquire(&settings.device).await?;
            self.inner.lock().active = Some(ActiveStream::new(settings.clone(), stream));
        } else {
            debug!("Settings unchanged, reusing stream");
        }

        let stream_id = self
            .inner
            .lock()
            .active
            .as_ref()
            .map(|a| a.stream.id().to_string());

        if let Some(stream_id) = stream_id {
            // The preview may have gone away; the stream is still usable
            if let Err(e) = self.preview.attach(&stream_id, true).await {
                warn!("Failed to attach preview: {}", e);
            }
        }

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(active) = inner.active.as_mut() else {
            return Ok(());
        };

        active.meter = active
            .stream
            .audio_frames()
            .map(|frames| LevelMeter::start(frames, Arc::clone(&self.notifier)));

        // Swapping recorders mid-take would lose the chunk
        if inner.recording.is_none() {
            let sink = ChunkSink::new(Track::Primary, self.chunk_tx.clone());
            active.recorder = Some(active.stream.recorder(&settings.recording, sink)?);

            active.overlay_recorder = match (&self.overlay, self.options.premium) {
                (Some(overlay), true) => {
                    let sink = ChunkSink::new(Track::Overlay, self.chunk_tx.clone());
                    Some(overlay.recorder(&settings.recording, sink)?)
                }
                _ => None,
            };
        }

        Ok(())
    }

    /// Release the bound device
    pub fn unbind(&self) -> UnbindOutcome {
        let mut inner = self.inner.lock();

        if inner.active.is_none() || matches!(inner.state, BindState::Binding) {
            debug!("Device not unbindable yet, deferring unbind");
            inner.pending_unbind = true;
            inner.pending_rebind = None;
            return UnbindOutcome::Deferred;
        }

        self.release_locked(&mut inner);
        inner.state = BindState::Idle;
        UnbindOutcome::Released
    }

    fn release_locked(&self, inner: &mut Inner) {
        if inner.recording.is_some() {
            info!("Stopping recording before releasing device");
            self.stop_recording_locked(inner);
        }

        if let Some(active) = inner.active.take() {
            info!("Unbinding device");
            active.release();
        }
    }

    /// Start a take on the bound device; `false` if not possible or already recording
    pub fn start_recording(&self) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.recording.is_some() {
            debug!("Already recording");
            return false;
        }

        let Some(active) = inner.active.as_mut() else {
            warn!("Cannot start recording: no device bound");
            return false;
        };

        let Some(recorder) = active.recorder.as_mut() else {
            warn!("Cannot start recording: no recorder");
            return false;
        };

        if let Err(e) = recorder.start() {
            error!("Failed to start recorder: {}", e);
            return false;
        }

        let overlay = match active.overlay_recorder.as_mut() {
            Some(overlay) => match overlay.start() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to start pointer recorder: {}", e);
                    false
                }
            },
            None => false,
        };

        inner.pointer_used = false;
        inner.recording = Some(ActiveRecording {
            session: RecordingSession::start(self.epoch, Instant::now()),
            primary: true,
            overlay,
            existing: None,
        });

        info!("Recording started");
        true
    }

    /// Record only the pointer over an already uploaded record
    pub fn start_pointer_recording(&self, existing: Record) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.recording.is_some() {
            debug!("Already recording");
            return false;
        }

        let Some(overlay) = inner
            .active
            .as_mut()
            .and_then(|a| a.overlay_recorder.as_mut())
        else {
            warn!("Cannot record pointer: no pointer recorder bound");
            return false;
        };

        if let Err(e) = overlay.start() {
            error!("Failed to start pointer recorder: {}", e);
            return false;
        }

        inner.pointer_used = false;
        inner.recording = Some(ActiveRecording {
            session: RecordingSession::start(self.epoch, Instant::now()),
            primary: false,
            overlay: true,
            existing: Some(existing),
        });

        info!("Pointer recording started");
        true
    }

    /// Stop the take and return its zero-based event log
    pub fn stop_recording(&self) -> Option<Vec<RecordEvent>> {
        let mut inner = self.inner.lock();
        self.stop_recording_locked(&mut inner)
    }

    fn stop_recording_locked(&self, inner: &mut Inner) -> Option<Vec<RecordEvent>> {
        let recording = inner.recording.take()?;
        let events = recording.session.finish(Instant::now());

        let ready = self.assembler.lock().close_session(ClosedSession {
            events: events.clone(),
            expects_overlay: recording.overlay,
            pointer_used: inner.pointer_used,
            existing: recording.existing,
        });

        if let Some(active) = inner.active.as_mut() {
            if recording.primary {
                if let Some(recorder) = active.recorder.as_mut() {
                    if let Err(e) = recorder.stop() {
                        error!("Failed to stop recorder: {}", e);
                    }
                }
            }
            if recording.overlay {
                if let Some(recorder) = active.overlay_recorder.as_mut() {
                    if let Err(e) = recorder.stop() {
                        error!("Failed to stop pointer recorder: {}", e);
                    }
                }
            }
        }

        if let Some(record) = ready {
            self.notifier.notify(Notification::RecordArrived(record));
        }

        info!(
            "Recording stopped ({} events, {} ms)",
            events.len(),
            events.last().map(|e| e.time).unwrap_or(0)
        );

        Some(events)
    }

    /// Log a semantic event in the running take
    pub fn register_event(&self, ty: EventKind) -> bool {
        let mut inner = self.inner.lock();
        match inner.recording.as_mut() {
            Some(recording) => {
                recording.session.register(ty, Instant::now());
                true
            }
            None => {
                debug!("Ignoring {:?} event: not recording", ty);
                false
            }
        }
    }

    /// Note that the pointer was drawn during the running take
    pub fn mark_pointer_used(&self) {
        let mut inner = self.inner.lock();
        if inner.recording.is_some() {
            inner.pointer_used = true;
        }
    }

    /// Replay a record, then rebind the live device
    pub async fn play_record(&self, record: &Record) -> CaptureResult<()> {
        self.preview.play(record).await?;
        self.finish_playback().await
    }

    /// Abort a replay and rebind the live device
    pub async fn stop_playback(&self) -> CaptureResult<()> {
        self.finish_playback().await
    }

    async fn finish_playback(&self) -> CaptureResult<()> {
        self.notifier.notify(Notification::PlayRecordFinished);

        if let Some(settings) = self.current_settings() {
            self.bind(settings).await?;
        }

        Ok(())
    }

    /// Settings of the stream currently held
    pub fn current_settings(&self) -> Option<BindingSettings> {
        self.inner.lock().active.as_ref().map(|a| a.settings.clone())
    }

    pub fn is_recording(&self) -> bool {
        self.inner.lock().recording.is_some()
    }

    pub fn state(&self) -> BindState {
        self.inner.lock().state.clone()
    }

    pub fn status(&self) -> ControllerStatus {
        let inner = self.inner.lock();
        ControllerStatus {
            state: inner.state.clone(),
            stream_id: inner.active.as_ref().map(|a| a.stream.id().to_string()),
            recording: inner.recording.is_some(),
            pending_rebind: inner.pending_rebind.is_some(),
            pending_unbind: inner.pending_unbind,
            premium: self.options.premium,
        }
    }
}

fn spawn_chunk_pump(
    mut chunks: mpsc::UnboundedReceiver<RecordedChunk>,
    assembler: Arc<Mutex<RecordAssembler>>,
    notifier: Arc<dyn NotificationSink>,
) {
    tokio::spawn(async move {
        while let Some(chunk) = chunks.recv().await {
            let ready = assembler.lock().offer(chunk);
            if let Some(record) = ready {
                info!("Record arrived ({} events)", record.events.len());
                notifier.notify(Notification::RecordArrived(record));
            }
        }
        debug!("Chunk pump stopped");
    });
}
