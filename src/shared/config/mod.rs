/// 環境設定とログ初期化
pub mod environment;

/// アプリケーション初期化
pub mod initialization;

pub use environment::{
    get_database_filename, initialize_logging_system, load_environment_variables, Environment,
    EnvironmentConfig, DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_LIST_LIMIT,
};
pub use initialization::{initialize_application, initialize_with_config, InitializationResult};
