//! サブスクリプションの作成・更新・削除
//!
//! 各操作は `Validating → GuardChecking → Writing → Committed` の順に進み、
//! どの段階からでも `Aborted` に遷移しうる。トランザクション開始後の失敗は
//! すべてロールバックされてから呼び出し元へ返る。

use super::guard;
use super::models::{CreateSubscriptionDto, NewSubscription, Subscription, UpdateSubscriptionDto};
use super::period::Period;
use super::repository;
use crate::shared::database::with_transaction;
use crate::shared::errors::{AppError, AppResult};
use rusqlite::Connection;
use uuid::Uuid;

/// 変更操作の進行段階（ログ出力用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStage {
    Validating,
    GuardChecking,
    Writing,
    Committed,
    Aborted,
}

fn trace_stage(operation: &str, stage: MutationStage) {
    log::debug!("{operation}: {stage:?}");
}

/// 結果に応じてCommitted/Abortedを記録する
fn finish<T>(operation: &str, result: AppResult<T>) -> AppResult<T> {
    match &result {
        Ok(_) => trace_stage(operation, MutationStage::Committed),
        Err(e) => {
            trace_stage(operation, MutationStage::Aborted);
            match e {
                AppError::Database(_) => log::error!("{operation} に失敗しました: {e}"),
                _ => log::warn!("{operation} を中断しました: {e}"),
            }
        }
    }
    result
}

fn validate_service_name(service_name: &str) -> AppResult<String> {
    let trimmed = service_name.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("サービス名を入力してください"));
    }
    Ok(trimmed.to_string())
}

fn validate_price(price: i64) -> AppResult<i64> {
    if price <= 0 {
        return Err(AppError::validation("金額は正の整数である必要があります"));
    }
    Ok(price)
}

fn validate_user_id(user_id: Uuid) -> AppResult<Uuid> {
    if user_id.is_nil() {
        return Err(AppError::validation("ユーザーIDを指定してください"));
    }
    Ok(user_id)
}

/// 終了期間を解析する（空文字列は終了なし）
fn parse_end_period(text: Option<&str>) -> AppResult<Option<Period>> {
    match text {
        None => Ok(None),
        Some(text) if text.is_empty() => Ok(None),
        Some(text) => Period::parse(text).map(Some),
    }
}

fn ensure_end_after_start(start: &Period, end: Option<&Period>) -> AppResult<()> {
    match end {
        Some(end) if end <= start => Err(AppError::validation(format!(
            "終了期間({end})は開始期間({start})より後である必要があります"
        ))),
        _ => Ok(()),
    }
}

/// 作成用DTOを検証する
///
/// # 戻り値
/// 検証済みの新規サブスクリプション、または失敗時はバリデーションエラー
pub fn validate_create(dto: &CreateSubscriptionDto) -> AppResult<NewSubscription> {
    let service_name = validate_service_name(&dto.service_name)?;
    let price = validate_price(dto.price)?;
    let user_id = validate_user_id(dto.user_id)?;
    let start_period = Period::parse(&dto.start_period)?;
    let end_period = parse_end_period(dto.end_period.as_deref())?;
    ensure_end_after_start(&start_period, end_period.as_ref())?;

    Ok(NewSubscription {
        service_name,
        price,
        user_id,
        start_period,
        end_period,
    })
}

/// サブスクリプションを作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `dto` - サブスクリプション作成用DTO
///
/// # 戻り値
/// 作成されたサブスクリプション、または失敗時はエラー
/// （入力不正: Validation、同じ組が既に存在: Conflict）
pub fn create(conn: &mut Connection, dto: &CreateSubscriptionDto) -> AppResult<Subscription> {
    const OPERATION: &str = "サブスクリプション作成";

    trace_stage(OPERATION, MutationStage::Validating);
    let result = validate_create(dto).and_then(|subscription| {
        with_transaction(conn, |tx| {
            trace_stage(OPERATION, MutationStage::GuardChecking);
            if guard::conflict_exists(
                tx,
                subscription.user_id,
                &subscription.service_name,
                subscription.start_period,
                None,
            )? {
                return Err(AppError::conflict(
                    "同じユーザー・サービス・開始期間のサブスクリプションが既に存在します",
                ));
            }

            trace_stage(OPERATION, MutationStage::Writing);
            let id = repository::insert(tx, &subscription)?;
            repository::find_by_id(tx, id)
        })
    });

    let created = finish(OPERATION, result)?;
    log::info!(
        "サブスクリプションを作成しました: id={}, user_id={}, service_name={}",
        created.id,
        created.user_id,
        created.service_name
    );

    Ok(created)
}

/// 部分更新を現在のレコードに適用する
///
/// 指定されたフィールドはそれぞれ個別に検証する。
fn apply_patch(current: &Subscription, dto: &UpdateSubscriptionDto) -> AppResult<Subscription> {
    let mut next = current.clone();

    if let Some(ref service_name) = dto.service_name {
        next.service_name = validate_service_name(service_name)?;
    }

    if let Some(price) = dto.price {
        next.price = validate_price(price)?;
    }

    if let Some(ref start_period) = dto.start_period {
        next.start_period = Period::parse(start_period)?;
    }

    if let Some(ref end_period) = dto.end_period {
        next.end_period = parse_end_period(end_period.as_deref())?;
    }

    Ok(next)
}

fn has_changes(current: &Subscription, next: &Subscription) -> bool {
    current.service_name != next.service_name
        || current.price != next.price
        || current.start_period != next.start_period
        || current.end_period != next.end_period
}

/// サブスクリプションを更新する
///
/// 値が実際に変わらない場合は書き込みを行わず、現在のレコードをそのまま返す
/// （`updated_at`も変わらない）。
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
/// * `dto` - サブスクリプション更新用DTO
///
/// # 戻り値
/// 更新後のサブスクリプション、または失敗時はエラー
pub fn update(
    conn: &mut Connection,
    id: i64,
    dto: &UpdateSubscriptionDto,
) -> AppResult<Subscription> {
    const OPERATION: &str = "サブスクリプション更新";

    let result = with_transaction(conn, |tx| {
        trace_stage(OPERATION, MutationStage::Validating);
        let current = repository::find_by_id(tx, id)?;
        let next = apply_patch(&current, dto)?;

        if next.service_name != current.service_name || next.start_period != current.start_period
        {
            trace_stage(OPERATION, MutationStage::GuardChecking);
            if guard::conflict_exists(
                tx,
                next.user_id,
                &next.service_name,
                next.start_period,
                Some(id),
            )? {
                return Err(AppError::conflict(
                    "更新後のユーザー・サービス・開始期間の組が他のサブスクリプションと重複します",
                ));
            }
        }

        ensure_end_after_start(&next.start_period, next.end_period.as_ref())?;

        if !has_changes(&current, &next) {
            log::debug!("変更がないため書き込みを省略します: id={id}");
            return Ok(current);
        }

        trace_stage(OPERATION, MutationStage::Writing);
        repository::save(tx, &next)?;
        repository::find_by_id(tx, id)
    });

    let updated = finish(OPERATION, result)?;
    log::info!("サブスクリプションを更新しました: id={id}");

    Ok(updated)
}

/// サブスクリプションを論理削除する
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
///
/// # 戻り値
/// 成功時はOk(())、存在しないか削除済みの場合はNotFoundエラー
pub fn delete(conn: &mut Connection, id: i64) -> AppResult<()> {
    const OPERATION: &str = "サブスクリプション削除";

    let result = with_transaction(conn, |tx| {
        trace_stage(OPERATION, MutationStage::Validating);
        if !repository::exists_by_id(tx, id)? {
            return Err(AppError::not_found(format!("ID {id} のサブスクリプション")));
        }

        trace_stage(OPERATION, MutationStage::Writing);
        repository::soft_delete(tx, id)
    });

    finish(OPERATION, result)?;
    log::info!("サブスクリプションを削除しました: id={id}");

    Ok(())
}
