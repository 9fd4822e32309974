use super::period::Period;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// サブスクリプションデータモデル
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Subscription {
    pub id: i64,
    pub service_name: String,
    /// 月額（通貨の最小単位）
    pub price: i64,
    pub user_id: Uuid,
    pub start_period: Period,
    /// Noneの場合は継続中
    pub end_period: Option<Period>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// 論理削除日時（削除済みのレコードはどの検索にも現れない）
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// 検証済みの新規サブスクリプション（挿入用）
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscription {
    pub service_name: String,
    pub price: i64,
    pub user_id: Uuid,
    pub start_period: Period,
    pub end_period: Option<Period>,
}

/// サブスクリプション作成用DTO
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscriptionDto {
    pub service_name: String,
    pub price: i64,
    pub user_id: Uuid,
    /// MM-YYYY形式
    pub start_period: String,
    /// MM-YYYY形式（省略または空文字列で継続中）
    #[serde(default)]
    pub end_period: Option<String>,
}

/// サブスクリプション更新用DTO
///
/// 指定されたフィールドのみを更新する。`end_period`は
/// 省略（`None`）と明示的なクリア（`Some(None)`、JSONでは`null`）を区別する。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSubscriptionDto {
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub start_period: Option<String>,
    #[serde(default, deserialize_with = "deserialize_present")]
    pub end_period: Option<Option<String>>,
}

/// フィールドが存在する場合は`null`も含めて`Some`で包む
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// 一覧・範囲検索の絞り込み条件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionFilter {
    /// ユーザーIDの完全一致
    pub user_id: Option<Uuid>,
    /// サービス名の部分一致（大文字小文字を区別しない）
    pub service_name: Option<String>,
}

impl SubscriptionFilter {
    pub fn new(user_id: Option<Uuid>, service_name: Option<String>) -> Self {
        Self {
            user_id,
            // 空文字列は絞り込みなしとして扱う
            service_name: service_name.filter(|name| !name.is_empty()),
        }
    }
}

/// 一覧取得用クエリ
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListSubscriptionsQuery {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// 合計金額計算のリクエスト
#[derive(Debug, Clone, Deserialize)]
pub struct CostCalculationRequest {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub service_name: Option<String>,
    /// MM-YYYY形式
    pub start_period: String,
    /// MM-YYYY形式
    pub end_period: String,
}

/// 合計金額計算の結果
#[derive(Debug, Clone, Serialize)]
pub struct CostCalculationResult {
    pub total_cost: i64,
    pub start_period: Period,
    pub end_period: Period,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// 問い合わせ範囲の月数（両端を含む）
    pub total_months: u32,
    /// 集計対象となったサブスクリプション
    pub subscriptions: Vec<Subscription>,
}
