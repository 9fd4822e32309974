//! 重複チェック（ユーザー・サービス名・開始期間の組の一意性）
//!
//! 書き込みと同じトランザクション内で呼び出すこと。トランザクションは
//! `BEGIN IMMEDIATE`で開始されるため、チェックと書き込みの間に別の
//! 書き込みが割り込むことはない。部分一意インデックス
//! `idx_subscriptions_live_triple` が最後の砦として残る。

use super::period::Period;
use crate::shared::errors::AppResult;
use rusqlite::{params, Transaction};
use uuid::Uuid;

/// 削除されていない同じ組のレコードが存在するかどうか
///
/// # 引数
/// * `tx` - 書き込みと共有するトランザクション
/// * `user_id` - ユーザーID
/// * `service_name` - サービス名（完全一致）
/// * `start_period` - 開始期間
/// * `exclude_id` - 比較から除外するID（更新中のレコード自身）
///
/// # 戻り値
/// 衝突するレコードがあればtrue
pub fn conflict_exists(
    tx: &Transaction<'_>,
    user_id: Uuid,
    service_name: &str,
    start_period: Period,
    exclude_id: Option<i64>,
) -> AppResult<bool> {
    let exists: bool = tx.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM subscriptions
            WHERE user_id = ?1 AND service_name = ?2 AND start_period = ?3
              AND deleted_at IS NULL
              AND (?4 IS NULL OR id != ?4)
        )",
        params![user_id, service_name, start_period, exclude_id],
        |row| row.get(0),
    )?;

    if exists {
        log::debug!(
            "重複するサブスクリプションがあります: user_id={user_id}, service_name={service_name}, start_period={start_period}"
        );
    }

    Ok(exists)
}
