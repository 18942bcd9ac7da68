//! CLI entry point: parses flags, loads configuration, wires the capture →
//! broadcaster → VAD / hotword detection → event bus → session manager →
//! speaker pipeline together, and blocks until interrupted.
//!
//! Grounded on the teacher's own `src/main.rs` (clap `Args`, `env_logger`
//! initialization keyed off `--verbose`, `--list-devices` early-exit) adapted
//! to start the full engine rather than a capture-only smoke test.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use voxcore::audio::AudioSource;
use voxcore::audio_broadcaster::AudioBroadcaster;
use voxcore::config::{load_api_config, Config};
use voxcore::detection::pipeline::{DetectionPipeline, PipelineConfig};
use voxcore::detection_loop::DetectionLoop;
use voxcore::event_bus::{EventBus, DEFAULT_WORKER_COUNT};
use voxcore::hotword::PipelineHotwordDetector;
use voxcore::session::{RemoteAIClient, SessionManager};
use voxcore::speaker::SpeakerService;
use voxcore::vad::VoiceActivityTracker;

#[derive(Parser)]
#[command(name = "voxcore")]
#[command(about = "Event-driven voice interaction engine")]
struct Args {
    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// Input device name (substring match; default device if unspecified)
    #[arg(short, long)]
    device: Option<String>,

    /// Output device name (substring match; default device if unspecified)
    #[arg(long)]
    output_device: Option<String>,

    /// List available audio input and output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Remote realtime AI model name
    #[arg(long, default_value = "gpt-4o-realtime-preview")]
    model: String,

    /// Directory containing melspectrogram.tflite, embedding_model.tflite and
    /// the wakeword model
    #[arg(long, default_value = "models")]
    model_dir: String,

    /// Wakeword to listen for, used to name the loaded model file
    /// (`<model_dir>/<hotword>.tflite`) and to label `hotword_detected` events
    #[arg(long, default_value = "hey_mycroft")]
    hotword: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if args.list_devices {
        println!("Input devices:");
        for (name, is_default) in
            AudioSource::list_input_devices().context("listing input devices")?
        {
            println!("  {}{}", name, if is_default { " (default)" } else { "" });
        }
        println!("Output devices:");
        for (name, is_default) in
            SpeakerService::list_output_devices().context("listing output devices")?
        {
            println!("  {}{}", name, if is_default { " (default)" } else { "" });
        }
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new().context("building tokio runtime")?;
    let api_config = load_api_config().context("loading remote AI API configuration")?;
    let config = Config::with_defaults(args.model);

    log::info!(
        "starting voxcore (sample_rate={} Hz, frame={} samples, hotword={})",
        config.sample_rate,
        config.frame_samples,
        args.hotword
    );

    let (broadcaster, hotword_rx, utterance_rx) = AudioBroadcaster::new();

    let _audio_source = AudioSource::start(
        config
            .input_device_name
            .as_deref()
            .or(args.device.as_deref()),
        config.sample_rate,
        config.frame_samples,
        broadcaster.clone(),
    )
    .context("starting audio capture")?;

    let event_bus = EventBus::new(DEFAULT_WORKER_COUNT);

    spawn_vad_tracker(broadcaster.clone(), &config, event_bus.clone());

    let pipeline_config = PipelineConfig {
        melspectrogram_model_path: format!("{}/melspectrogram.tflite", args.model_dir),
        embedding_model_path: format!("{}/embedding_model.tflite", args.model_dir),
        wakeword_model_path: format!("{}/{}.tflite", args.model_dir, args.hotword),
        chunk_size: config.frame_samples,
        sample_rate: config.sample_rate,
        confidence_threshold: config.hotword_threshold,
        ..Default::default()
    };
    let pipeline = DetectionPipeline::new(pipeline_config).context("loading wakeword models")?;
    let detector = Box::new(PipelineHotwordDetector::new(pipeline, args.hotword.clone()));

    let utterance_depth_rx = utterance_rx.clone();
    let _detection_loop = DetectionLoop::start(
        hotword_rx,
        detector,
        config.hotword_threshold,
        std::time::Duration::from_secs_f32(config.hotword_cooldown_seconds),
        event_bus.clone(),
        move || utterance_depth_rx.len(),
    );

    let speaker = Arc::new(
        SpeakerService::start(args.output_device.clone(), 24_000, event_bus.clone())
            .context("starting speaker service")?,
    );

    let remote = Arc::new(RemoteAIClient::new(
        secrecy::SecretBox::new(Box::new(api_config.remote_api_key().to_string())),
        config.remote_model_name.clone(),
        runtime.handle().clone(),
    ));

    let session_manager = SessionManager::new(
        event_bus.clone(),
        broadcaster.clone(),
        utterance_rx,
        remote,
        speaker,
    );

    log::info!("voxcore running, say the hotword to start a conversation; ctrl-c to exit");
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("waiting for shutdown signal")?;
    log::info!("shutting down");
    session_manager.shutdown();
    Ok(())
}

/// Runs VAD off a dedicated FIFO queue registered on the broadcaster (not the
/// session manager's utterance queue, so the tracker never competes with
/// utterance collection for frames). Publishes
/// `voice_activity_started`/`voice_activity_stopped` directly to the bus.
fn spawn_vad_tracker(broadcaster: Arc<AudioBroadcaster>, config: &Config, event_bus: Arc<EventBus>) {
    use voxcore::audio_broadcaster::QueuePolicy;
    use voxcore::event_bus::{Event, TOPIC_VOICE_ACTIVITY_STARTED, TOPIC_VOICE_ACTIVITY_STOPPED};
    use voxcore::model::{frame_to_i16, VoiceActivityKind};

    let (_queue_id, rx) = broadcaster.register_queue(QueuePolicy::Fifo, 16);
    let mut tracker = match VoiceActivityTracker::new(
        config.sample_rate,
        config.vad_aggressiveness,
        config.silence_threshold_frames,
        config.frame_samples,
    ) {
        Ok(t) => t,
        Err(e) => {
            log::error!("failed to start voice activity tracker: {}", e);
            return;
        }
    };

    std::thread::Builder::new()
        .name("vad-tracker".to_string())
        .spawn(move || loop {
            match rx.recv_timeout(std::time::Duration::from_millis(500)) {
                Ok(frame) => {
                    let samples = frame_to_i16(&frame);
                    if let Some(vad_event) = tracker.process_frame(&samples) {
                        let topic = match vad_event.kind {
                            VoiceActivityKind::Started => TOPIC_VOICE_ACTIVITY_STARTED,
                            VoiceActivityKind::Stopped => TOPIC_VOICE_ACTIVITY_STOPPED,
                        };
                        event_bus.publish(topic, Event::VoiceActivity(vad_event));
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        })
        .expect("failed to spawn vad tracker thread");
}
