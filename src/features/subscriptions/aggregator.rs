use super::models::{CostCalculationRequest, CostCalculationResult, Subscription, SubscriptionFilter};
use super::period::Period;
use super::resolver;
use crate::shared::errors::{AppError, AppResult};
use rusqlite::Connection;

/// 1件のサブスクリプションが問い合わせ範囲内で支払う金額
///
/// 月額 × 自身の有効期間と問い合わせ範囲が重なる月数。
pub fn contribution(
    subscription: &Subscription,
    query_start: &Period,
    query_end: &Period,
) -> AppResult<i64> {
    let months = Period::months_overlapping(
        &subscription.start_period,
        subscription.end_period.as_ref(),
        query_start,
        query_end,
    );

    subscription
        .price
        .checked_mul(i64::from(months))
        .ok_or_else(|| {
            AppError::validation(format!(
                "ID {} の金額計算で桁あふれが発生しました",
                subscription.id
            ))
        })
}

/// サブスクリプション群の合計金額を計算する
pub fn sum_cost(
    subscriptions: &[Subscription],
    query_start: &Period,
    query_end: &Period,
) -> AppResult<i64> {
    subscriptions.iter().try_fold(0i64, |total, subscription| {
        let amount = contribution(subscription, query_start, query_end)?;
        total
            .checked_add(amount)
            .ok_or_else(|| AppError::validation("合計金額の計算で桁あふれが発生しました"))
    })
}

/// 指定期間のサブスクリプション合計金額を計算する
///
/// # 引数
/// * `conn` - データベース接続
/// * `request` - 合計金額計算のリクエスト
///
/// # 戻り値
/// 合計金額と集計対象のサブスクリプション、または失敗時はエラー
/// （期間の形式不正・終了が開始以前: Validation）
pub fn total_cost(
    conn: &Connection,
    request: &CostCalculationRequest,
) -> AppResult<CostCalculationResult> {
    let start_period = Period::parse(&request.start_period)?;
    let end_period = Period::parse(&request.end_period)?;

    if end_period <= start_period {
        return Err(AppError::validation(format!(
            "終了期間({end_period})は開始期間({start_period})より後である必要があります"
        )));
    }

    let total_months = Period::months_between(&start_period, &end_period).ok_or_else(|| {
        AppError::validation("問い合わせ範囲の月数を計算できません")
    })?;

    let filter = SubscriptionFilter::new(request.user_id, request.service_name.clone());
    let subscriptions = resolver::resolve(conn, &filter, start_period, end_period)?;
    let total = sum_cost(&subscriptions, &start_period, &end_period)?;

    log::info!(
        "合計金額を計算しました: user_id={:?}, service_name={:?}, period={}〜{}, total_months={}, subscriptions={}, total_cost={}",
        request.user_id,
        filter.service_name,
        start_period,
        end_period,
        total_months,
        subscriptions.len(),
        total
    );

    Ok(CostCalculationResult {
        total_cost: total,
        start_period,
        end_period,
        user_id: request.user_id,
        service_name: filter.service_name,
        total_months,
        subscriptions,
    })
}
