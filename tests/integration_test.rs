// Integration tests for the polyvoice engine
//
// These drive the public AudioEngine API against the NullBackend with a
// manual clock, covering the lifecycle, handle validity, timing and
// thread-affinity guarantees end to end.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use polyvoice::config::{DispatcherConfig, EngineConfig};
use polyvoice::engine::backend::{factory_from, ManualTimeSource, NullBackend, NullBackendProbe};
use polyvoice::{
    AudioEngine, AudioFormat, EngineError, EngineState, PlayOptions, PlaybackHandle,
    PlaybackState, Sound, SoundData,
};

fn test_config() -> EngineConfig {
    EngineConfig {
        dispatcher: DispatcherConfig {
            startup_timeout_ms: 2000,
            shutdown_timeout_ms: 2000,
            thread_name: "polyvoice-it".to_string(),
        },
        ..EngineConfig::default()
    }
}

fn running_engine() -> (AudioEngine, NullBackendProbe, Arc<ManualTimeSource>) {
    let (backend, probe) = NullBackend::with_probe();
    let clock = Arc::new(ManualTimeSource::new());
    let engine = AudioEngine::with_config(backend, test_config()).with_time_source(clock.clone());
    engine.start().expect("engine should start");
    (engine, probe, clock)
}

fn sound_of(duration_ms: u32) -> Sound {
    let format = AudioFormat::pcm(48000, 2, 16);
    let frames = 48 * duration_ms as usize;
    let data = SoundData::new(format, vec![0u8; frames * 4]).unwrap();
    Sound::from_data(data)
}

#[test]
fn test_volume_and_pan_round_trip() {
    let (engine, probe, _) = running_engine();
    let handle = engine.play(&sound_of(1000), PlayOptions::default()).unwrap();

    for &(volume, pan) in &[(0.0, -1.0), (0.5, 0.0), (1.0, 1.0), (0.123, -0.456)] {
        engine.set_volume(handle, volume).unwrap();
        engine.set_pan(handle, pan).unwrap();
        let info = engine.playback_info(handle).unwrap();
        assert_eq!(info.volume, volume);
        assert_eq!(info.pan, pan);

        let voice = probe.voice(info.voice).unwrap();
        assert_eq!(voice.volume, volume);
        assert_eq!(voice.pan, pan);
    }
}

#[test]
fn test_invalid_parameters_leave_record_unchanged() {
    let (engine, probe, _) = running_engine();
    let handle = engine
        .play(&sound_of(1000), PlayOptions::default().volume(0.7).pan(0.2))
        .unwrap();
    let calls_before = probe.calls().len();

    for volume in [-0.1, 1.1, f32::NAN] {
        assert!(matches!(
            engine.set_volume(handle, volume),
            Err(EngineError::Validation {
                parameter: "volume",
                ..
            })
        ));
    }
    for pan in [-1.1, 1.1, f32::NAN] {
        assert!(matches!(
            engine.set_pan(handle, pan),
            Err(EngineError::Validation {
                parameter: "pan",
                ..
            })
        ));
    }

    let info = engine.playback_info(handle).unwrap();
    assert_eq!(info.volume, 0.7);
    assert_eq!(info.pan, 0.2);
    assert_eq!(probe.calls().len(), calls_before);
}

#[test]
fn test_play_rejects_invalid_options() {
    let (engine, probe, _) = running_engine();
    assert!(matches!(
        engine.play(&sound_of(100), PlayOptions::default().pan(2.0)),
        Err(EngineError::Validation { .. })
    ));
    assert_eq!(probe.count("create_voice"), 0);
    assert!(engine.active_playbacks().unwrap().is_empty());
}

#[test]
fn test_non_looping_is_playing_follows_duration() {
    let (engine, _, clock) = running_engine();
    let handle = engine.play(&sound_of(2000), PlayOptions::default()).unwrap();

    assert!(engine.is_playing(handle).unwrap());
    clock.advance(Duration::from_millis(1900));
    assert!(engine.is_playing(handle).unwrap());
    clock.advance(Duration::from_millis(200));
    assert!(!engine.is_playing(handle).unwrap());
}

#[test]
fn test_pause_pushes_completion_later() {
    let (engine, _, clock) = running_engine();
    let handle = engine.play(&sound_of(2000), PlayOptions::default()).unwrap();

    clock.advance(Duration::from_millis(500));
    engine.pause(handle).unwrap();
    assert_eq!(engine.playback_state(handle).unwrap(), PlaybackState::Paused);

    // 3 s paused
    clock.advance(Duration::from_secs(3));
    assert!(engine.is_playing(handle).unwrap());
    engine.resume(handle).unwrap();

    // 1.4 s more of active time: total 1.9 s < 2 s
    clock.advance(Duration::from_millis(1400));
    assert!(engine.is_playing(handle).unwrap());
    clock.advance(Duration::from_millis(200));
    assert!(!engine.is_playing(handle).unwrap());
    assert_eq!(
        engine.playback_state(handle).unwrap(),
        PlaybackState::Finished
    );
}

#[test]
fn test_looping_plays_until_stopped() {
    let (engine, _, clock) = running_engine();
    let handle = engine
        .play(&sound_of(250), PlayOptions::default().looping(true))
        .unwrap();

    clock.advance(Duration::from_secs(60));
    assert!(engine.is_playing(handle).unwrap());

    engine.stop(handle).unwrap();
    assert_eq!(
        engine.is_playing(handle).unwrap_err(),
        EngineError::PlaybackNotFound { handle }
    );
}

#[test]
fn test_unknown_and_stopped_handles_not_found() {
    let (engine, _, _) = running_engine();
    let unknown = PlaybackHandle::from_raw(u64::MAX);
    let stopped = engine.play(&sound_of(500), PlayOptions::default()).unwrap();
    engine.stop(stopped).unwrap();

    for handle in [unknown, stopped] {
        let not_found = EngineError::PlaybackNotFound { handle };
        assert_eq!(engine.stop(handle).unwrap_err(), not_found);
        assert_eq!(engine.pause(handle).unwrap_err(), not_found);
        assert_eq!(engine.resume(handle).unwrap_err(), not_found);
        assert_eq!(engine.set_volume(handle, 0.5).unwrap_err(), not_found);
        assert_eq!(engine.set_pan(handle, 0.0).unwrap_err(), not_found);
        assert_eq!(engine.is_playing(handle).unwrap_err(), not_found);
        assert_eq!(engine.playback_state(handle).unwrap_err(), not_found);
    }
}

#[test]
fn test_operations_before_start_and_after_shutdown() {
    let (backend, _) = NullBackend::with_probe();
    let engine = AudioEngine::with_config(backend, test_config());
    let sound = sound_of(100);
    let handle = PlaybackHandle::from_raw(1);

    let check = |engine: &AudioEngine| {
        assert!(matches!(
            engine.play(&sound, PlayOptions::default()),
            Err(EngineError::EngineNotStarted { operation: "play" })
        ));
        assert!(matches!(
            engine.stop(handle),
            Err(EngineError::EngineNotStarted { .. })
        ));
        assert!(matches!(
            engine.pause(handle),
            Err(EngineError::EngineNotStarted { .. })
        ));
        assert!(matches!(
            engine.set_volume(handle, 0.5),
            Err(EngineError::EngineNotStarted { .. })
        ));
        assert!(matches!(
            engine.is_playing(handle),
            Err(EngineError::EngineNotStarted { .. })
        ));
    };

    check(&engine);
    engine.start().unwrap();
    engine.shutdown().unwrap();
    check(&engine);
}

#[test]
fn test_concurrent_play_from_threads() {
    let (engine, probe, _) = running_engine();
    let engine = Arc::new(engine);

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let handle = engine.play(&sound_of(1000), PlayOptions::default()).unwrap();
                let volume = 0.1 * (i + 1) as f32;
                engine.set_volume(handle, volume).unwrap();
                (handle, volume)
            })
        })
        .collect();
    let results: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    let mut handles: Vec<_> = results.iter().map(|(h, _)| *h).collect();
    handles.sort();
    handles.dedup();
    assert_eq!(handles.len(), 4);

    for (handle, volume) in &results {
        assert_eq!(engine.playback_info(*handle).unwrap().volume, *volume);
    }

    // independently controllable
    engine.stop(results[0].0).unwrap();
    assert!(engine.is_playing(results[1].0).unwrap());
    assert_eq!(probe.live_voices(), 3);
}

#[test]
fn test_double_shutdown_is_noop() {
    let (engine, probe, _) = running_engine();
    engine.shutdown().unwrap();
    let calls = probe.calls().len();
    engine.shutdown().unwrap();
    assert_eq!(engine.state(), EngineState::Stopped);
    assert_eq!(probe.calls().len(), calls);
}

#[test]
fn test_finished_playback_lingers_until_stop() {
    let (engine, probe, clock) = running_engine();
    let handle = engine.play(&sound_of(2000), PlayOptions::default()).unwrap();
    assert!(engine.is_playing(handle).unwrap());

    clock.advance(Duration::from_millis(2500));
    assert!(!engine.is_playing(handle).unwrap());
    assert_eq!(engine.active_playbacks().unwrap(), vec![handle]);

    engine.stop(handle).unwrap();
    assert_eq!(probe.live_voices(), 0);
    assert_eq!(
        engine.stop(handle).unwrap_err(),
        EngineError::PlaybackNotFound { handle }
    );
}

#[test]
fn test_backend_runs_on_single_dispatcher_thread() {
    let (engine, probe, _) = running_engine();
    let engine = Arc::new(engine);
    let caller = thread::current().id();

    let workers: Vec<_> = (0..3)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let handle = engine.play(&sound_of(100), PlayOptions::default()).unwrap();
                engine.pause(handle).unwrap();
                engine.stop(handle).unwrap();
                thread::current().id()
            })
        })
        .collect();
    let worker_threads: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    engine.shutdown().unwrap();

    let threads = probe.call_threads();
    assert_eq!(threads.len(), 1);
    let backend_thread = *threads.iter().next().unwrap();
    assert_ne!(backend_thread, caller);
    assert!(!worker_threads.contains(&backend_thread));
}

#[test]
fn test_backend_error_propagates_and_engine_keeps_serving() {
    let (engine, probe, _) = running_engine();
    let handle = engine.play(&sound_of(1000), PlayOptions::default()).unwrap();

    probe.fail_on("set_voice_pan", 0x8889_0008);
    assert_eq!(
        engine.set_pan(handle, 0.5).unwrap_err(),
        EngineError::Backend {
            code: 0x8889_0008,
            message: "injected failure in set_voice_pan".to_string()
        }
    );
    assert_eq!(engine.playback_info(handle).unwrap().pan, 0.0);

    probe.clear_failure("set_voice_pan");
    engine.set_pan(handle, 0.5).unwrap();
    assert_eq!(engine.playback_info(handle).unwrap().pan, 0.5);
}

#[test]
fn test_init_failure_surfaces_startup_error() {
    let (backend, probe) = NullBackend::with_probe();
    probe.fail_on("initialize", 0x8889_0004);
    let engine = AudioEngine::with_config(backend, test_config());

    match engine.start() {
        Err(EngineError::EngineStartup { reason }) => assert!(reason.contains("0x88890004")),
        other => panic!("Expected EngineStartup, got {:?}", other),
    }
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(matches!(
        engine.play(&sound_of(100), PlayOptions::default()),
        Err(EngineError::EngineNotStarted { .. })
    ));
}

#[test]
fn test_startup_timeout_surfaces_startup_error() {
    let (backend, probe) = NullBackend::with_probe();
    probe.set_init_delay(Duration::from_millis(400));
    let mut config = test_config();
    config.dispatcher.startup_timeout_ms = 50;
    let engine = AudioEngine::with_config(backend, config);

    assert!(matches!(
        engine.start(),
        Err(EngineError::EngineStartup { .. })
    ));
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[test]
fn test_start_after_shutdown_fails() {
    let (engine, _, _) = running_engine();
    engine.start().unwrap();
    engine.shutdown().unwrap();
    assert!(matches!(
        engine.start(),
        Err(EngineError::EngineStartup { .. })
    ));
}

#[test]
fn test_scoped_shuts_down_on_error() {
    let (backend, probe) = NullBackend::with_probe();
    let result: Result<(), EngineError> = AudioEngine::scoped(backend, test_config(), |engine| {
        engine.play(&sound_of(1000), PlayOptions::default().looping(true))?;
        engine.set_volume(PlaybackHandle::from_raw(u64::MAX), 0.5)
    });

    assert!(matches!(result, Err(EngineError::PlaybackNotFound { .. })));
    assert!(probe.is_shut_down());
    assert_eq!(probe.live_voices(), 0);
}

#[test]
fn test_scoped_shuts_down_on_panic() {
    let (backend, probe) = NullBackend::with_probe();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _: Result<(), EngineError> = AudioEngine::scoped(backend, test_config(), |_| {
            panic!("caller failure");
        });
    }));

    assert!(outcome.is_err());
    assert!(probe.is_shut_down());
}

#[test]
fn test_factory_builds_backend_on_dispatcher_thread() {
    let (backend, probe) = NullBackend::with_probe();
    let built_on = Arc::new(std::sync::Mutex::new(None));
    let record = Arc::clone(&built_on);
    let factory: polyvoice::engine::BackendFactory = Box::new(move || {
        *record.lock().unwrap() = Some(thread::current().id());
        factory_from(backend)()
    });

    let engine = AudioEngine::with_factory(factory, test_config());
    engine.start().unwrap();
    let built_on = built_on.lock().unwrap().expect("factory ran");
    assert_ne!(built_on, thread::current().id());
    assert!(probe.call_threads().contains(&built_on));
    engine.shutdown().unwrap();
}
