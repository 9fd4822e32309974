use super::models::{NewSubscription, Subscription, SubscriptionFilter};
use super::period::Period;
use crate::shared::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

const SELECT_COLUMNS: &str = "SELECT id, service_name, price, user_id, start_period, end_period, created_at, updated_at, deleted_at
     FROM subscriptions";

fn map_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: row.get(0)?,
        service_name: row.get(1)?,
        price: row.get(2)?,
        user_id: row.get(3)?,
        start_period: row.get(4)?,
        end_period: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        deleted_at: row.get(8)?,
    })
}

fn not_found(id: i64) -> AppError {
    AppError::not_found(format!("ID {id} のサブスクリプション"))
}

/// サブスクリプションを挿入する
///
/// # 引数
/// * `tx` - トランザクション
/// * `subscription` - 検証済みの新規サブスクリプション
///
/// # 戻り値
/// 採番されたID、または失敗時はエラー
pub fn insert(tx: &Transaction<'_>, subscription: &NewSubscription) -> AppResult<i64> {
    let now = Utc::now();

    tx.execute(
        "INSERT INTO subscriptions (service_name, price, user_id, start_period, end_period, start_ordinal, end_ordinal, created_at, updated_at, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL)",
        params![
            subscription.service_name,
            subscription.price,
            subscription.user_id,
            subscription.start_period,
            subscription.end_period,
            subscription.start_period.ordinal(),
            subscription.end_period.as_ref().map(Period::ordinal),
            now,
            now
        ],
    )?;

    Ok(tx.last_insert_rowid())
}

/// IDでサブスクリプションを取得する（削除済みは対象外）
///
/// トランザクション内では`&Transaction`をそのまま渡せる。
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
///
/// # 戻り値
/// サブスクリプション、または見つからない場合はNotFoundエラー
pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Subscription> {
    let query = format!("{SELECT_COLUMNS} WHERE id = ?1 AND deleted_at IS NULL");

    conn.query_row(&query, params![id], map_row)
        .optional()?
        .ok_or_else(|| not_found(id))
}

/// 削除されていないサブスクリプションが存在するかどうか
pub fn exists_by_id(conn: &Connection, id: i64) -> AppResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM subscriptions WHERE id = ?1 AND deleted_at IS NULL)",
        params![id],
        |row| row.get(0),
    )?;

    Ok(exists)
}

/// サブスクリプションの内容を保存する
///
/// `updated_at`は呼び出し時点の時刻で上書きする。
///
/// # 引数
/// * `tx` - トランザクション
/// * `subscription` - 保存するサブスクリプション
///
/// # 戻り値
/// 保存後の更新日時、または失敗時はエラー
pub fn save(tx: &Transaction<'_>, subscription: &Subscription) -> AppResult<DateTime<Utc>> {
    let now = Utc::now();

    let rows_affected = tx.execute(
        "UPDATE subscriptions
         SET service_name = ?1, price = ?2, start_period = ?3, end_period = ?4,
             start_ordinal = ?5, end_ordinal = ?6, updated_at = ?7
         WHERE id = ?8 AND deleted_at IS NULL",
        params![
            subscription.service_name,
            subscription.price,
            subscription.start_period,
            subscription.end_period,
            subscription.start_period.ordinal(),
            subscription.end_period.as_ref().map(Period::ordinal),
            now,
            subscription.id
        ],
    )?;

    if rows_affected == 0 {
        return Err(not_found(subscription.id));
    }

    Ok(now)
}

/// サブスクリプションを論理削除する
///
/// # 引数
/// * `tx` - トランザクション
/// * `id` - サブスクリプションID
///
/// # 戻り値
/// 成功時はOk(())、対象がない場合はNotFoundエラー
pub fn soft_delete(tx: &Transaction<'_>, id: i64) -> AppResult<()> {
    let now = Utc::now();

    let rows_affected = tx.execute(
        "UPDATE subscriptions SET deleted_at = ?1, updated_at = ?1
         WHERE id = ?2 AND deleted_at IS NULL",
        params![now, id],
    )?;

    if rows_affected == 0 {
        return Err(not_found(id));
    }

    Ok(())
}

/// LIKEの特殊文字をエスケープする
fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn query_filtered(
    conn: &Connection,
    filter: &SubscriptionFilter,
    range: Option<(&Period, &Period)>,
    page: Option<(i64, i64)>,
) -> AppResult<Vec<Subscription>> {
    let mut query = format!("{SELECT_COLUMNS} WHERE deleted_at IS NULL");

    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    // ユーザーIDフィルター
    if let Some(user_id) = filter.user_id {
        query.push_str(" AND user_id = ?");
        params.push(Box::new(user_id));
    }

    // サービス名フィルター（部分一致、Unicodeの大文字小文字は区別しない）
    if let Some(ref service_name) = filter.service_name {
        query.push_str(" AND unicode_lower(service_name) LIKE ? ESCAPE '\\'");
        params.push(Box::new(format!(
            "%{}%",
            escape_like(&service_name.to_lowercase())
        )));
    }

    // 期間フィルター（通し月番号で比較）
    if let Some((query_start, query_end)) = range {
        query.push_str(" AND start_ordinal <= ? AND (end_ordinal IS NULL OR end_ordinal >= ?)");
        params.push(Box::new(query_end.ordinal()));
        params.push(Box::new(query_start.ordinal()));
    }

    query.push_str(" ORDER BY id");

    if let Some((limit, offset)) = page {
        query.push_str(" LIMIT ? OFFSET ?");
        params.push(Box::new(limit));
        params.push(Box::new(offset));
    }

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let subscriptions = stmt.query_map(param_refs.as_slice(), map_row)?;

    Ok(subscriptions.collect::<Result<Vec<_>, _>>()?)
}

/// 条件に一致する削除されていないサブスクリプションをすべて取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `filter` - 絞り込み条件
///
/// # 戻り値
/// ID順のサブスクリプションのリスト
pub fn find_many(conn: &Connection, filter: &SubscriptionFilter) -> AppResult<Vec<Subscription>> {
    query_filtered(conn, filter, None, None)
}

/// 条件に一致し、問い合わせ範囲と有効期間が重なるサブスクリプションを取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `filter` - 絞り込み条件
/// * `query_start` - 問い合わせ開始期間
/// * `query_end` - 問い合わせ終了期間
///
/// # 戻り値
/// ID順のサブスクリプションのリスト
pub fn find_overlapping(
    conn: &Connection,
    filter: &SubscriptionFilter,
    query_start: &Period,
    query_end: &Period,
) -> AppResult<Vec<Subscription>> {
    query_filtered(conn, filter, Some((query_start, query_end)), None)
}

/// 条件に一致するサブスクリプションをlimit/offsetで取得する
pub fn find_page(
    conn: &Connection,
    filter: &SubscriptionFilter,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<Subscription>> {
    query_filtered(conn, filter, None, Some((limit, offset)))
}
