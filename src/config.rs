use crate::audio::ChunkErrorPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: &'static str,
    pub app_version: &'static str,

    // 实时语音服务
    pub live_ws_url: &'static str,
    pub live_model: &'static str,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub output_channels: u16,
    pub capture_frame_size: usize,
    pub reconnect_attempts: u32,

    // 文本生成服务
    pub genai_api_base: &'static str,
    pub text_model: &'static str,
    pub mentor_temperature: f32,

    // 音频设备
    pub capture_device: String,
    pub playback_device: String,
    pub playback_period_size: usize,
    pub chunk_error_policy: ChunkErrorPolicy,

    // 运行时参数（不在编译时写入）
    pub api_key: String,
    pub storage_path: String,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            app_name: env!("APP_NAME"),
            app_version: env!("APP_VERSION"),

            live_ws_url: env!("LIVE_WS_URL"),
            live_model: env!("LIVE_MODEL"),
            input_sample_rate: env!("LIVE_INPUT_SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse LIVE_INPUT_SAMPLE_RATE")?,
            output_sample_rate: env!("LIVE_OUTPUT_SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse LIVE_OUTPUT_SAMPLE_RATE")?,
            output_channels: env!("LIVE_OUTPUT_CHANNELS").parse()
                .map_err(|_| "Failed to parse LIVE_OUTPUT_CHANNELS")?,
            capture_frame_size: env!("LIVE_CAPTURE_FRAME_SIZE").parse()
                .map_err(|_| "Failed to parse LIVE_CAPTURE_FRAME_SIZE")?,
            reconnect_attempts: env!("LIVE_RECONNECT_ATTEMPTS").parse()
                .map_err(|_| "Failed to parse LIVE_RECONNECT_ATTEMPTS")?,

            genai_api_base: env!("GENAI_API_BASE"),
            text_model: env!("GENAI_TEXT_MODEL"),
            mentor_temperature: env!("GENAI_MENTOR_TEMPERATURE").parse()
                .map_err(|_| "Failed to parse GENAI_MENTOR_TEMPERATURE")?,

            capture_device: env!("AUDIO_CAPTURE_DEVICE").to_string(),
            playback_device: env!("AUDIO_PLAYBACK_DEVICE").to_string(),
            playback_period_size: env!("AUDIO_PLAYBACK_PERIOD_SIZE").parse()
                .map_err(|_| "Failed to parse AUDIO_PLAYBACK_PERIOD_SIZE")?,
            chunk_error_policy: env!("AUDIO_CHUNK_ERROR_POLICY").parse()
                .map_err(|_| "Failed to parse AUDIO_CHUNK_ERROR_POLICY")?,

            api_key: String::new(),
            storage_path: env!("STORAGE_PATH").to_string(),
        })
    }

    /// Apply runtime overrides. The API key is only ever taken from the environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.api_key = key.trim().to_string();
        }
        if let Some(path) = lookup("MARGDARSHAK_STORAGE").filter(|p| !p.trim().is_empty()) {
            self.storage_path = path;
        }
        if let Some(policy) = lookup("MARGDARSHAK_CHUNK_ERRORS") {
            match policy.parse() {
                Ok(p) => self.chunk_error_policy = p,
                Err(_) => log::warn!("Ignoring unknown MARGDARSHAK_CHUNK_ERRORS value: {}", policy),
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new().expect("Failed to create default Config from build-time environment variables")
    }
}
