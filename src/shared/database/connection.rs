use crate::shared::errors::{AppError, AppResult};
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// データベース接続の取得元
///
/// 接続はプールせず、リクエスト（トランザクション）ごとに開いて
/// スコープを抜けた時点で閉じる。
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Database {
    /// 新しい接続元を作成する
    ///
    /// # 引数
    /// * `path` - データベースファイルのパス
    /// * `busy_timeout` - 他の書き込みトランザクションを待つ上限
    pub fn new<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout,
        }
    }

    /// データベースファイルのパスを取得する
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 新しい接続を開く
    ///
    /// # 戻り値
    /// データベース接続、または失敗時はエラー
    pub fn connect(&self) -> AppResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        register_functions(&conn)?;
        Ok(conn)
    }

    /// データベースを初期化する（ファイル作成とテーブル作成）
    ///
    /// # 戻り値
    /// 成功時はOk(())、失敗時はエラー
    pub fn initialize(&self) -> AppResult<()> {
        let conn = self.connect()?;
        create_tables(&conn)?;

        log::info!("データベースを初期化しました: {:?}", self.path);

        Ok(())
    }
}

/// 接続ごとのSQL関数を登録する
///
/// - `unicode_lower(text)`: Unicodeの小文字化（組み込みの`lower`はASCIIのみ）
///
/// # 引数
/// * `conn` - データベース接続
///
/// # 戻り値
/// 成功時はOk(())、失敗時はエラー
pub fn register_functions(conn: &Connection) -> AppResult<()> {
    conn.create_scalar_function(
        "unicode_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|text| text.to_lowercase()))
        },
    )
    .map_err(|e| AppError::Database(format!("SQL関数の登録に失敗しました: {e}")))?;

    Ok(())
}

/// テスト用のインメモリデータベースを開く（関数登録とテーブル作成済み）
#[cfg(test)]
pub(crate) fn open_in_memory() -> AppResult<Connection> {
    let conn = Connection::open_in_memory()?;
    register_functions(&conn)?;
    create_tables(&conn)?;
    Ok(conn)
}

/// データベーステーブルを作成する
///
/// 何度呼び出しても安全（`IF NOT EXISTS`）。
///
/// # 引数
/// * `conn` - データベース接続
///
/// # 戻り値
/// 成功時はOk(())、失敗時はエラー
pub fn create_tables(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS subscriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service_name TEXT NOT NULL CHECK(length(trim(service_name)) > 0),
            price INTEGER NOT NULL CHECK(price > 0),
            user_id BLOB NOT NULL,
            start_period TEXT NOT NULL,
            end_period TEXT,
            start_ordinal INTEGER NOT NULL,
            end_ordinal INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_subscriptions_live_triple
            ON subscriptions(user_id, service_name, start_period)
            WHERE deleted_at IS NULL;
        CREATE INDEX IF NOT EXISTS idx_subscriptions_user_id ON subscriptions(user_id);
        CREATE INDEX IF NOT EXISTS idx_subscriptions_deleted_at ON subscriptions(deleted_at);
        CREATE INDEX IF NOT EXISTS idx_subscriptions_ordinals
            ON subscriptions(start_ordinal, end_ordinal);",
    )
    .map_err(|e| AppError::Database(format!("テーブル作成に失敗しました: {e}")))?;

    Ok(())
}

/// トランザクション内で処理を実行する
///
/// `BEGIN IMMEDIATE` で開始するため、書き込みロックは開始時点で確保され、
/// 同じ行を検査・更新する他のトランザクションとは直列化される。
///
/// - クロージャが`Ok`を返した場合はコミットする
/// - `Err`を返した場合はロールバックしてから元のエラーを返す
/// - パニックした場合は`Transaction`のドロップでロールバックされ、
///   パニックはそのまま伝播する
///
/// # 引数
/// * `conn` - データベース接続
/// * `operation` - トランザクション内で実行する処理
///
/// # 戻り値
/// 処理結果、または失敗時はエラー
pub fn with_transaction<T, F>(conn: &mut Connection, operation: F) -> AppResult<T>
where
    F: FnOnce(&Transaction<'_>) -> AppResult<T>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    match operation(&tx) {
        Ok(value) => {
            tx.commit()
                .map_err(|e| AppError::Database(format!("コミットに失敗しました: {e}")))?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = tx.rollback() {
                log::error!(
                    "ロールバックに失敗しました: {rollback_error} (元のエラー: {error})"
                );
            }
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use tempfile::TempDir;

    fn create_test_database() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let database = Database::new(temp_dir.path().join("test.db"), Duration::from_secs(5));
        database.initialize().unwrap();
        (temp_dir, database)
    }

    fn count_rows(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM subscriptions", [], |row| row.get(0))
            .unwrap()
    }

    fn insert_row(tx: &Transaction<'_>, service_name: &str) -> rusqlite::Result<usize> {
        tx.execute(
            "INSERT INTO subscriptions (service_name, price, user_id, start_period, start_ordinal, created_at, updated_at)
             VALUES (?1, 100, x'00', '01-2024', 24288, 'now', 'now')",
            [service_name],
        )
    }

    #[test]
    fn test_initialize_creates_database_file() {
        let (_temp_dir, database) = create_test_database();
        assert!(database.path().exists());

        // 二回目の初期化も成功する
        assert!(database.initialize().is_ok());
    }

    #[test]
    fn test_commit_on_success() {
        let (_temp_dir, database) = create_test_database();
        let mut conn = database.connect().unwrap();

        with_transaction(&mut conn, |tx| {
            insert_row(tx, "Netflix")?;
            Ok(())
        })
        .unwrap();

        assert_eq!(count_rows(&conn), 1);
    }

    #[test]
    fn test_rollback_on_error() {
        let (_temp_dir, database) = create_test_database();
        let mut conn = database.connect().unwrap();

        let result: AppResult<()> = with_transaction(&mut conn, |tx| {
            insert_row(tx, "Netflix")?;
            Err(AppError::validation("途中で失敗"))
        });

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(count_rows(&conn), 0);
    }

    #[test]
    fn test_rollback_on_panic() {
        let (_temp_dir, database) = create_test_database();
        let mut conn = database.connect().unwrap();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _: AppResult<()> = with_transaction(&mut conn, |tx| {
                insert_row(tx, "Netflix").unwrap();
                panic!("処理中の予期しない障害");
            });
        }));

        assert!(outcome.is_err());

        // 別の接続から見ても書き込みは残っていない
        let other = database.connect().unwrap();
        assert_eq!(count_rows(&other), 0);
        // 元の接続も再利用できる
        assert_eq!(count_rows(&conn), 0);
    }

    #[test]
    fn test_backstop_unique_index() {
        let (_temp_dir, database) = create_test_database();
        let mut conn = database.connect().unwrap();

        let result = with_transaction(&mut conn, |tx| {
            insert_row(tx, "Netflix")?;
            insert_row(tx, "Netflix")?;
            Ok(())
        });

        assert!(matches!(result, Err(AppError::Database(_))));
        assert_eq!(count_rows(&conn), 0);
    }

    #[test]
    fn test_check_constraints() {
        let (_temp_dir, database) = create_test_database();
        let conn = database.connect().unwrap();

        let result = conn.execute(
            "INSERT INTO subscriptions (service_name, price, user_id, start_period, start_ordinal, created_at, updated_at)
             VALUES ('Netflix', 0, x'00', '01-2024', 24288, 'now', 'now')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unicode_lower_is_registered_on_connect() {
        let (_temp_dir, database) = create_test_database();
        let conn = database.connect().unwrap();

        let lowered: String = conn
            .query_row("SELECT unicode_lower('КиноПоиск Netflix')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(lowered, "кинопоиск netflix");

        let null: Option<String> = conn
            .query_row("SELECT unicode_lower(NULL)", [], |row| row.get(0))
            .unwrap();
        assert_eq!(null, None);
    }
}
