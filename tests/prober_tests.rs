mod common;

use anyhow::Result;
use capsule_capture::device::{
    DetectRequest, Device, DeviceList, DeviceProber, MediaConstraints, MediaKind, Resolution, StreamAcquirer,
    DEFAULT_CANDIDATES,
};
use capsule_capture::notify::NotificationSink;
use capsule_capture::storage::ClientConfigStore;
use common::{wait_until, CollectingSink, MockBackend};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

const HD: Resolution = Resolution::new(1280, 720);
const VGA: Resolution = Resolution::new(640, 480);

struct Harness {
    _dir: TempDir,
    backend: Arc<MockBackend>,
    store: Arc<ClientConfigStore>,
    sink: Arc<CollectingSink>,
    prober: Arc<DeviceProber>,
}

fn harness(backend: MockBackend) -> Result<Harness> {
    let dir = TempDir::new()?;
    let store = Arc::new(ClientConfigStore::open(dir.path().join("client.json"))?);
    let backend = Arc::new(backend);
    let sink = Arc::new(CollectingSink::default());

    let prober = Arc::new(DeviceProber::new(
        Arc::new(StreamAcquirer::new(backend.clone())),
        store.clone(),
        sink.clone() as Arc<dyn NotificationSink>,
        DEFAULT_CANDIDATES.to_vec(),
    ));

    Ok(Harness {
        _dir: dir,
        backend,
        store,
        sink,
        prober,
    })
}

fn cached_camera(id: &str, resolutions: Vec<Resolution>) -> Device {
    Device {
        device_id: id.to_string(),
        group_id: "group".to_string(),
        label: "old label".to_string(),
        kind: MediaKind::Video,
        resolutions,
        available: true,
    }
}

#[tokio::test]
async fn test_cached_camera_is_not_probed() -> Result<()> {
    let h = harness(MockBackend::open().with_microphone("mic").with_camera("cam1", &[HD, VGA]))?;

    h.store.save(&json!({ "preferredDevice": { "audio": "mic" } }))?;
    h.store.store_devices(&DeviceList {
        audio: Vec::new(),
        video: vec![cached_camera("cam1", vec![VGA])],
    })?;

    let detected = h
        .prober
        .detect(DetectRequest::explicit(false, None))
        .await?
        .expect("detection ran");

    assert_eq!(h.backend.acquisition_count(), 0);
    assert_eq!(detected.devices.video.len(), 1);
    assert_eq!(detected.devices.video[0].resolutions, vec![VGA]);
    // Labels come from the fresh enumeration
    assert_eq!(detected.devices.video[0].label, "video cam1");
    assert_eq!(detected.devices.audio.len(), 1);
    assert!(detected.devices.audio[0].available);

    assert_eq!(h.sink.count("detectDevicesResponse"), 1);
    assert_eq!(h.sink.count("detectDevicesFinished"), 1);

    Ok(())
}

#[tokio::test]
async fn test_new_camera_tries_every_candidate_in_order() -> Result<()> {
    let h = harness(MockBackend::open().with_microphone("mic").with_camera("cam1", &[HD, VGA]))?;

    let detected = h
        .prober
        .detect(DetectRequest::explicit(false, None))
        .await?
        .expect("detection ran");

    // One permission stream, then one trial per candidate
    let acquisitions = h.backend.acquisitions();
    assert_eq!(acquisitions.len(), 1 + DEFAULT_CANDIDATES.len());

    let trials: Vec<MediaConstraints> = DEFAULT_CANDIDATES
        .iter()
        .map(|&r| MediaConstraints::exact_video("cam1", r))
        .collect();
    assert_eq!(acquisitions[1..], trials[..]);

    assert_eq!(detected.devices.video[0].resolutions, vec![HD, VGA]);
    assert_eq!(h.backend.open_streams(), 0);

    let preferred = detected.preferred_device.expect("permission was granted");
    assert_eq!(preferred.audio.map(|d| d.device_id), Some("mic".to_string()));
    let (camera, resolution) = preferred.video.expect("camera granted");
    assert_eq!(camera.device_id, "cam1");
    assert_eq!(resolution, Some(HD));

    // Results are cached for the next pass
    assert_eq!(h.store.cached_devices()?.video[0].resolutions, vec![HD, VGA]);

    Ok(())
}

#[tokio::test]
async fn test_force_refresh_ignores_cache() -> Result<()> {
    let h = harness(MockBackend::open().with_microphone("mic").with_camera("cam1", &[VGA]))?;

    h.store.save(&json!({ "preferredDevice": { "audio": "mic" } }))?;
    h.store.store_devices(&DeviceList {
        audio: Vec::new(),
        video: vec![cached_camera("cam1", vec![HD])],
    })?;

    let detected = h
        .prober
        .detect(DetectRequest::explicit(true, None))
        .await?
        .expect("detection ran");

    assert_eq!(h.backend.acquisition_count(), DEFAULT_CANDIDATES.len());
    assert_eq!(detected.devices.video[0].resolutions, vec![VGA]);

    Ok(())
}

#[tokio::test]
async fn test_camera_cached_without_resolutions_is_probed() -> Result<()> {
    let h = harness(MockBackend::open().with_camera("cam1", &[VGA]))?;

    h.store.save(&json!({ "preferredDevice": {} }))?;
    h.store.store_devices(&DeviceList {
        audio: Vec::new(),
        video: vec![cached_camera("cam1", Vec::new())],
    })?;

    let detected = h
        .prober
        .detect(DetectRequest::device_change())
        .await?
        .expect("detection ran");

    assert_eq!(h.backend.acquisition_count(), DEFAULT_CANDIDATES.len());
    assert_eq!(detected.devices.video[0].resolutions, vec![VGA]);

    // Device-change passes are not explicit
    assert_eq!(h.sink.count("detectDevicesResponse"), 1);
    assert_eq!(h.sink.count("detectDevicesFinished"), 0);

    Ok(())
}

#[tokio::test]
async fn test_denied_kind_is_dropped_from_report() -> Result<()> {
    let h = harness(MockBackend::open().with_microphone("mic").with_camera("cam1", &[VGA]))?;
    h.backend.deny(MediaKind::Video);

    let detected = h
        .prober
        .detect(DetectRequest::explicit(false, None))
        .await?
        .expect("detection ran");

    assert!(detected.devices.video.is_empty());
    assert_eq!(detected.devices.audio.len(), 1);
    assert!(detected.preferred_device.is_none());

    // No trial streams for a denied kind
    assert_eq!(h.backend.acquisition_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_denial_keeps_cached_resolutions() -> Result<()> {
    let h = harness(MockBackend::open().with_microphone("mic").with_camera("cam1", &[HD, VGA]))?;
    h.store.store_devices(&DeviceList {
        audio: Vec::new(),
        video: vec![cached_camera("cam1", vec![VGA])],
    })?;

    h.backend.deny(MediaKind::Video);
    let denied = h
        .prober
        .detect(DetectRequest::explicit(false, None))
        .await?
        .expect("detection ran");
    assert!(denied.devices.video.is_empty());
    assert_eq!(h.store.cached_devices()?.video, vec![cached_camera("cam1", vec![VGA])]);

    h.backend.allow(MediaKind::Video);
    let before = h.backend.acquisition_count();
    let granted = h
        .prober
        .detect(DetectRequest::explicit(false, None))
        .await?
        .expect("detection ran");

    // Only the permission stream, no resolution trials
    assert_eq!(h.backend.acquisition_count() - before, 1);
    assert_eq!(granted.devices.video[0].resolutions, vec![VGA]);

    Ok(())
}

#[tokio::test]
async fn test_grant_without_camera_has_no_preferred_device() -> Result<()> {
    let h = harness(MockBackend::open().with_microphone("mic"))?;

    let detected = h
        .prober
        .detect(DetectRequest::explicit(false, None))
        .await?
        .expect("detection ran");

    assert_eq!(detected.devices.audio.len(), 1);
    assert!(detected.preferred_device.is_none());

    Ok(())
}

#[tokio::test]
async fn test_pinned_camera_is_always_probed() -> Result<()> {
    let h = harness(
        MockBackend::open()
            .with_microphone("mic")
            .with_camera("cam1", &[VGA])
            .with_camera("cam2", &[HD]),
    )?;

    h.store.save(&json!({ "preferredDevice": { "audio": "mic" } }))?;
    h.store.store_devices(&DeviceList {
        audio: Vec::new(),
        video: vec![cached_camera("cam1", vec![VGA]), cached_camera("cam2", vec![VGA])],
    })?;

    let detected = h
        .prober
        .detect(DetectRequest::explicit(false, Some("cam2".to_string())))
        .await?
        .expect("detection ran");

    // Permission stream for the pin, then trials for cam2 only
    let acquisitions = h.backend.acquisitions();
    assert_eq!(acquisitions.len(), 1 + DEFAULT_CANDIDATES.len());
    assert!(!acquisitions[0].audio.is_requested());
    assert_eq!(acquisitions[0].video.device_id(), Some("cam2"));

    assert_eq!(detected.devices.video[0].resolutions, vec![VGA]);
    assert_eq!(detected.devices.video[1].resolutions, vec![HD]);

    Ok(())
}

#[tokio::test]
async fn test_overlapping_detections_coalesce_into_one_rerun() -> Result<()> {
    let h = harness(MockBackend::gated().with_microphone("mic"))?;

    let prober = h.prober.clone();
    let first = tokio::spawn(async move { prober.detect(DetectRequest::explicit(false, None)).await });

    let backend = h.backend.clone();
    wait_until(|| backend.acquisition_count() == 1).await;

    assert!(h.prober.detect(DetectRequest::device_change()).await?.is_none());
    assert!(h.prober.detect(DetectRequest::device_change()).await?.is_none());

    h.backend.open_gate();
    assert!(first.await??.is_some());

    // The original pass plus a single trailing re-run
    assert_eq!(h.sink.count("detectDevicesResponse"), 2);
    assert_eq!(h.sink.count("detectDevicesFinished"), 1);

    Ok(())
}
