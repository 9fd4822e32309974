use crate::shared::errors::{AppError, AppResult};
use std::path::PathBuf;
use std::time::Duration;

/// 一覧取得の既定件数
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// データベースのビジータイムアウト既定値（ミリ秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// アプリケーションの実行環境を表す列挙型
#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    /// 開発環境
    Development,
    /// プロダクション環境
    Production,
}

/// 環境設定を管理する構造体
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// 実行環境
    pub environment: Environment,
    /// デバッグモードの有効/無効
    pub debug_mode: bool,
    /// ログレベル
    pub log_level: String,
    /// データベースファイルのパス
    pub database_path: PathBuf,
    /// 書き込みロック待ちの上限
    pub busy_timeout: Duration,
    /// 一覧取得でlimitが指定されなかった場合の件数
    pub default_list_limit: i64,
}

impl EnvironmentConfig {
    /// 環境変数から設定を読み込む
    ///
    /// # 戻り値
    /// 環境設定、または数値の形式が不正な場合は設定エラー
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意の参照関数から設定を組み立てる
    ///
    /// # 引数
    /// * `lookup` - 変数名から値を返す関数
    ///
    /// # 戻り値
    /// 環境設定、または失敗時は設定エラー
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = get_environment(&lookup);
        let debug_mode = environment == Environment::Development;

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| {
            if debug_mode {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

        let database_path = lookup("DATABASE_PATH")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(get_database_filename(&environment)));

        let busy_timeout_ms = match lookup("DB_BUSY_TIMEOUT_MS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                AppError::configuration(format!("DB_BUSY_TIMEOUT_MSが不正です ({raw}): {e}"))
            })?,
            None => DEFAULT_BUSY_TIMEOUT_MS,
        };

        let default_list_limit = match lookup("DEFAULT_LIST_LIMIT") {
            Some(raw) => {
                let limit = raw.trim().parse::<i64>().map_err(|e| {
                    AppError::configuration(format!("DEFAULT_LIST_LIMITが不正です ({raw}): {e}"))
                })?;
                if limit <= 0 {
                    return Err(AppError::configuration(
                        "DEFAULT_LIST_LIMITは1以上である必要があります",
                    ));
                }
                limit
            }
            None => DEFAULT_LIST_LIMIT,
        };

        Ok(Self {
            environment,
            debug_mode,
            log_level,
            database_path,
            busy_timeout: Duration::from_millis(busy_timeout_ms),
            default_list_limit,
        })
    }

    /// プロダクション環境かどうかを判定
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// 開発環境かどうかを判定
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

/// 現在の実行環境を判定する
///
/// # 判定ロジック
/// 1. コンパイル時埋め込み環境変数を最優先
/// 2. 実行時環境変数 ENVIRONMENT を確認
/// 3. デバッグビルドの場合は Development
/// 4. リリースビルドの場合は Production
fn get_environment<F>(lookup: &F) -> Environment
where
    F: Fn(&str) -> Option<String>,
{
    // コンパイル時埋め込み環境変数を最優先
    if let Some(embedded_env) = option_env!("EMBEDDED_ENVIRONMENT") {
        let env = parse_environment(embedded_env);
        log::debug!("環境判定: コンパイル時埋め込み値を使用 -> {embedded_env} -> {env:?}");
        return env;
    }

    // 実行時環境変数を確認
    if let Some(env_var) = lookup("ENVIRONMENT") {
        let env = parse_environment(&env_var);
        log::debug!("環境判定: 実行時環境変数を使用 -> {env_var} -> {env:?}");
        return env;
    }

    // フォールバック: ビルド設定に基づく判定
    let env = if cfg!(debug_assertions) {
        Environment::Development
    } else {
        Environment::Production
    };
    log::debug!(
        "環境判定: ビルド設定を使用 -> debug_assertions={} -> {env:?}",
        cfg!(debug_assertions)
    );
    env
}

fn parse_environment(value: &str) -> Environment {
    match value {
        "production" => Environment::Production,
        _ => Environment::Development,
    }
}

/// 環境に応じたデータベースファイル名を取得する
///
/// # ファイル名の規則
/// - 開発環境: "dev_subscriptions.db"
/// - プロダクション環境: "subscriptions.db"
pub fn get_database_filename(env: &Environment) -> &'static str {
    match env {
        Environment::Development => "dev_subscriptions.db",
        Environment::Production => "subscriptions.db",
    }
}

/// 環境に応じた.envファイルを読み込む
///
/// ENVIRONMENT=production の場合は `.env.production` を優先し、
/// 見つからなければデフォルトの `.env` を試行する。
pub fn load_environment_variables() {
    let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

    let env_file = match environment.as_str() {
        "production" => ".env.production",
        _ => ".env",
    };

    match dotenv::from_filename(env_file) {
        Ok(_) => {
            log::info!("{env_file}ファイルを読み込みました");
        }
        Err(_) => {
            if env_file != ".env" && dotenv::dotenv().is_ok() {
                log::warn!("{env_file}が見つからないため、デフォルトの.envファイルを読み込みました");
            } else {
                log::warn!(".envファイルが見つかりません。直接設定された環境変数を使用します。");
            }
        }
    }
}

/// ログシステムを初期化する
///
/// 既にロガーが登録されている場合は何もしない。
///
/// # 引数
/// * `config` - 環境設定
pub fn initialize_logging_system(config: &EnvironmentConfig) {
    let log_level = match config.log_level.to_lowercase().as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    let initialized = env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .try_init()
        .is_ok();

    if initialized {
        log::info!(
            "ログシステムを初期化しました: level={}, environment={:?}",
            config.log_level,
            config.environment
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_for_development() {
        if option_env!("EMBEDDED_ENVIRONMENT").is_some() {
            return;
        }
        let config =
            EnvironmentConfig::from_lookup(lookup_from(&[("ENVIRONMENT", "development")]))
                .unwrap();

        assert!(config.is_development());
        assert!(config.debug_mode);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.database_path, PathBuf::from("dev_subscriptions.db"));
        assert_eq!(
            config.busy_timeout,
            Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS)
        );
        assert_eq!(config.default_list_limit, DEFAULT_LIST_LIMIT);
    }

    #[test]
    fn test_production_values() {
        if option_env!("EMBEDDED_ENVIRONMENT").is_some() {
            return;
        }
        let config = EnvironmentConfig::from_lookup(lookup_from(&[
            ("ENVIRONMENT", "production"),
            ("DATABASE_PATH", "/var/lib/tracker/subs.db"),
            ("DB_BUSY_TIMEOUT_MS", "250"),
            ("DEFAULT_LIST_LIMIT", "20"),
        ]))
        .unwrap();

        assert!(config.is_production());
        assert_eq!(config.log_level, "info");
        assert_eq!(
            config.database_path,
            PathBuf::from("/var/lib/tracker/subs.db")
        );
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.default_list_limit, 20);
    }

    #[test]
    fn test_invalid_numbers_are_configuration_errors() {
        let result =
            EnvironmentConfig::from_lookup(lookup_from(&[("DB_BUSY_TIMEOUT_MS", "soon")]));
        assert!(matches!(result, Err(AppError::Configuration(_))));

        let result = EnvironmentConfig::from_lookup(lookup_from(&[("DEFAULT_LIST_LIMIT", "0")]));
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_get_database_filename() {
        assert_eq!(
            get_database_filename(&Environment::Development),
            "dev_subscriptions.db"
        );
        assert_eq!(
            get_database_filename(&Environment::Production),
            "subscriptions.db"
        );
    }
}
