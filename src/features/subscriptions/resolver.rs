use super::models::{Subscription, SubscriptionFilter};
use super::period::Period;
use super::repository;
use crate::shared::errors::{AppError, AppResult};
use rusqlite::Connection;

/// 問い合わせ範囲と重なるサブスクリプションを取得する
///
/// 重なり判定は通し月番号（暦の順序と一致）で行うため、"MM-YYYY"の
/// 文字列順に左右されない。
///
/// # 引数
/// * `conn` - データベース接続（トランザクション外の読み取り）
/// * `filter` - ユーザーID・サービス名の絞り込み条件
/// * `query_start` - 問い合わせ開始期間
/// * `query_end` - 問い合わせ終了期間（開始と同じ月も可）
///
/// # 戻り値
/// ID順のサブスクリプション、または開始が終了より後の場合はバリデーションエラー
pub fn resolve(
    conn: &Connection,
    filter: &SubscriptionFilter,
    query_start: Period,
    query_end: Period,
) -> AppResult<Vec<Subscription>> {
    if query_start > query_end {
        return Err(AppError::validation(format!(
            "問い合わせ開始期間({query_start})は終了期間({query_end})以前である必要があります"
        )));
    }

    let resolved = repository::find_overlapping(conn, filter, &query_start, &query_end)?;

    debug_assert!(resolved.iter().all(|subscription| Period::overlaps(
        &subscription.start_period,
        subscription.end_period.as_ref(),
        &query_start,
        &query_end,
    )));

    log::debug!(
        "期間 {query_start}〜{query_end} に重なるサブスクリプション: {}件",
        resolved.len()
    );

    Ok(resolved)
}
