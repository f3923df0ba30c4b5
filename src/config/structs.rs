use serde::{Deserialize, Serialize};

/// 静态配置（从 TOML 加载，启动时使用）
///
/// - server: 监听地址、端口、worker 数量
/// - database: 数据库连接与重试
/// - logging: 日志输出
/// - numbering: 流水号分配的重试策略
/// - patients: 重复患者判定与建档锁
/// - reports: 报告渲染
/// - api: 访问令牌与 CORS
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub numbering: NumberingConfig,
    #[serde(default)]
    pub patients: PatientsConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > config.toml > 默认值
    /// ENV 前缀：LD，分隔符：__
    /// 示例：LD__SERVER__PORT=9999
    pub fn load(path: Option<&str>) -> Self {
        use config::{Config, Environment, File};

        let path = path.unwrap_or("config.toml");

        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("LD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<StaticConfig>() {
                Ok(config) => {
                    if std::path::Path::new(path).exists() {
                        eprintln!("[INFO] Configuration loaded from: {}", path);
                    }
                    config
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("[ERROR] Failed to build config: {}", e);
                Self::default()
            }
        }
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_cpu_count")]
    pub cpu_count: usize,
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Ignored for SQLite, which always runs a single writer connection
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_database_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

/// 流水号分配配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumberingConfig {
    /// Attempts before giving up with a contention error
    #[serde(default = "default_numbering_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_numbering_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_numbering_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// 患者建档配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientsConfig {
    /// Mixed into the advisory lock key so other applications sharing the
    /// database don't collide with ours
    #[serde(default = "default_advisory_lock_namespace")]
    pub advisory_lock_namespace: String,
    /// Name similarity at or above which a same-phone match is probable
    #[serde(default = "default_probable_threshold")]
    pub probable_threshold: f64,
    /// Upper bound on candidate rows considered per match
    #[serde(default = "default_max_candidates")]
    pub max_candidates: u64,
}

/// 报告渲染配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    #[serde(default = "default_lab_name")]
    pub lab_name: String,
    /// Free-text result values containing one of these words are flagged ABNORMAL
    #[serde(default = "default_abnormal_keywords")]
    pub abnormal_keywords: Vec<String>,
}

/// API 访问配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bearer token for `/api/v1`; empty disables authentication
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub cors_enabled: bool,
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
    #[serde(default = "default_cors_max_age")]
    pub cors_max_age: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

// ============================================================
// Default value functions for static config
// ============================================================

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_cpu_count() -> usize {
    num_cpus::get()
}

fn default_database_url() -> String {
    "sqlite://labdesk.db?mode=rwc".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_database_timeout() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

fn default_numbering_max_attempts() -> u32 {
    8
}

fn default_numbering_base_delay_ms() -> u64 {
    10
}

fn default_numbering_max_delay_ms() -> u64 {
    250
}

fn default_advisory_lock_namespace() -> String {
    "labdesk:patient".to_string()
}

fn default_probable_threshold() -> f64 {
    0.8
}

fn default_max_candidates() -> u64 {
    50
}

fn default_lab_name() -> String {
    "Labdesk Diagnostics".to_string()
}

fn default_abnormal_keywords() -> Vec<String> {
    ["positive", "reactive", "detected", "abnormal", "present"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_cors_max_age() -> u64 {
    3600
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            cpu_count: default_cpu_count(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            timeout: default_database_timeout(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_numbering_max_attempts(),
            base_delay_ms: default_numbering_base_delay_ms(),
            max_delay_ms: default_numbering_max_delay_ms(),
        }
    }
}

impl Default for PatientsConfig {
    fn default() -> Self {
        Self {
            advisory_lock_namespace: default_advisory_lock_namespace(),
            probable_threshold: default_probable_threshold(),
            max_candidates: default_max_candidates(),
        }
    }
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            lab_name: default_lab_name(),
            abnormal_keywords: default_abnormal_keywords(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            cors_enabled: false,
            cors_allowed_origins: Vec::new(),
            cors_max_age: default_cors_max_age(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}
