use super::environment::{
    initialize_logging_system, load_environment_variables, Environment, EnvironmentConfig,
};
use crate::features::subscriptions::SubscriptionService;
use crate::shared::database::Database;
use crate::shared::errors::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};

/// アプリケーション初期化の結果を表す構造体
#[derive(Debug)]
pub struct InitializationResult {
    /// 初回起動かどうか
    pub is_first_run: bool,
    /// データベースファイルのパス
    pub database_path: PathBuf,
    /// 実行環境
    pub environment: Environment,
    /// 利用可能になったサービス
    pub service: SubscriptionService,
}

/// アプリケーションの初期化を実行する
///
/// # 処理内容
/// 1. .envファイルの読み込み
/// 2. 環境設定の読み込みとログシステムの初期化
/// 3. データベースファイルの初期化（テーブル作成）
/// 4. サービスの組み立て
///
/// # 戻り値
/// 初期化結果、または失敗時はエラー
pub fn initialize_application() -> AppResult<InitializationResult> {
    load_environment_variables();

    let config = EnvironmentConfig::from_env()?;
    initialize_logging_system(&config);

    initialize_with_config(&config)
}

/// 読み込み済みの設定で初期化する
///
/// # 引数
/// * `config` - 環境設定
///
/// # 戻り値
/// 初期化結果、または失敗時はエラー
pub fn initialize_with_config(config: &EnvironmentConfig) -> AppResult<InitializationResult> {
    let database_path = config.database_path.clone();

    ensure_parent_directory(&database_path)?;

    // 初回起動かどうかを判定（データベースファイルの存在で判定）
    let is_first_run = !database_path.exists();
    if is_first_run {
        log::info!(
            "初回起動です: environment={:?}, database={:?}",
            config.environment,
            database_path
        );
    }

    let database = Database::new(&database_path, config.busy_timeout);
    database.initialize()?;

    let service =
        SubscriptionService::new(database).with_default_list_limit(config.default_list_limit);

    log::info!(
        "アプリケーションの初期化が完了しました: environment={:?}, database={:?}",
        config.environment,
        database_path
    );

    Ok(InitializationResult {
        is_first_run,
        database_path,
        environment: config.environment.clone(),
        service,
    })
}

/// データベースファイルの親ディレクトリを確実に作成する
fn ensure_parent_directory(database_path: &Path) -> AppResult<()> {
    if let Some(parent) = database_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::configuration(format!("データディレクトリの作成に失敗しました: {e}"))
            })?;
            log::info!("データディレクトリを作成しました: {:?}", parent);
        }
    }

    Ok(())
}
