use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct GigaChatConfig {
    pub base_url: String,
    pub auth_url: String,
    pub credentials: Option<String>,
    pub scope: String,
    pub model: String,
    pub verify_tls: bool,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub guide_dir: PathBuf,
    pub guide_files: Vec<String>,
    pub rebuild_on_start: bool,
    pub question_count: usize,
    pub section_scan_limit: i64,
    pub synonyms_path: Option<PathBuf>,
    pub gigachat: GigaChatConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = env::var("TRAINER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let guide_files = env::var("TRAINER_GUIDE_FILES")
            .unwrap_or_else(|_| "digital_literacy_guide.pdf".to_string())
            .split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();

        Self {
            bind_addr: env::var("TRAINER_BIND").unwrap_or_else(|_| "127.0.0.1:5000".to_string()),
            data_dir,
            guide_dir: env::var("TRAINER_GUIDE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./guide")),
            guide_files,
            rebuild_on_start: env::var("TRAINER_REBUILD")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            question_count: env::var("TRAINER_QUESTION_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            section_scan_limit: env::var("TRAINER_SECTION_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(200),
            synonyms_path: env::var("TRAINER_SYNONYMS_FILE").map(PathBuf::from).ok(),
            gigachat: GigaChatConfig {
                base_url: env::var("GIGACHAT_BASE_URL")
                    .unwrap_or_else(|_| "https://gigachat.devices.sberbank.ru".to_string()),
                auth_url: env::var("GIGACHAT_AUTH_URL").unwrap_or_else(|_| {
                    "https://ngw.devices.sberbank.ru:9443/api/v2/oauth".to_string()
                }),
                credentials: env::var("GIGACHAT_CREDENTIALS").ok(),
                scope: env::var("GIGACHAT_SCOPE")
                    .unwrap_or_else(|_| "GIGACHAT_API_PERS".to_string()),
                model: env::var("GIGACHAT_MODEL").unwrap_or_else(|_| "GigaChat".to_string()),
                // Sber serves the API with certificates from the Russian trust
                // chain, which stock rustls roots do not include.
                verify_tls: env::var("GIGACHAT_VERIFY_TLS")
                    .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false),
                timeout_secs: env::var("GIGACHAT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            },
        }
    }

    pub fn sqlite_dsn(&self) -> String {
        format!(
            "sqlite://{}",
            self.data_dir.join("digital_trainer.sqlite3").display()
        )
    }

    pub fn guide_path(&self, file_name: &str) -> PathBuf {
        self.guide_dir.join(file_name)
    }
}
