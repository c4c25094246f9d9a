use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    live: Live,
    genai: GenAi,
    audio: Audio,
    storage: Storage,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Live {
    ws_url: String,
    model: String,
    input_sample_rate: u32,
    output_sample_rate: u32,
    output_channels: u16,
    capture_frame_size: usize,
    reconnect_attempts: u32,
}

#[derive(Deserialize)]
struct GenAi {
    api_base: String,
    text_model: String,
    mentor_temperature: f32,
}

#[derive(Deserialize)]
struct Audio {
    capture_device: String,
    playback_device: String,
    playback_period_size: usize,
    chunk_error_policy: String,
}

#[derive(Deserialize)]
struct Storage {
    path: String,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // Live (streaming audio) service
    println!("cargo:rustc-env=LIVE_WS_URL={}", config.live.ws_url);
    println!("cargo:rustc-env=LIVE_MODEL={}", config.live.model);
    println!("cargo:rustc-env=LIVE_INPUT_SAMPLE_RATE={}", config.live.input_sample_rate);
    println!("cargo:rustc-env=LIVE_OUTPUT_SAMPLE_RATE={}", config.live.output_sample_rate);
    println!("cargo:rustc-env=LIVE_OUTPUT_CHANNELS={}", config.live.output_channels);
    println!("cargo:rustc-env=LIVE_CAPTURE_FRAME_SIZE={}", config.live.capture_frame_size);
    println!("cargo:rustc-env=LIVE_RECONNECT_ATTEMPTS={}", config.live.reconnect_attempts);

    // Text generation service
    println!("cargo:rustc-env=GENAI_API_BASE={}", config.genai.api_base);
    println!("cargo:rustc-env=GENAI_TEXT_MODEL={}", config.genai.text_model);
    println!("cargo:rustc-env=GENAI_MENTOR_TEMPERATURE={}", config.genai.mentor_temperature);

    // Audio devices
    println!("cargo:rustc-env=AUDIO_CAPTURE_DEVICE={}", config.audio.capture_device);
    println!("cargo:rustc-env=AUDIO_PLAYBACK_DEVICE={}", config.audio.playback_device);
    println!("cargo:rustc-env=AUDIO_PLAYBACK_PERIOD_SIZE={}", config.audio.playback_period_size);
    println!("cargo:rustc-env=AUDIO_CHUNK_ERROR_POLICY={}", config.audio.chunk_error_policy);

    println!("cargo:rustc-env=STORAGE_PATH={}", config.storage.path);
}
