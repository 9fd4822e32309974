/// サブスクリプション機能モジュール
///
/// このモジュールは、サブスクリプション管理に関連するすべての機能を提供します：
/// - 暦月（MM-YYYY）の解析と月数計算
/// - サブスクリプションの作成、取得、更新、論理削除
/// - ユーザー・サービス名・開始期間の組の重複防止
/// - 指定期間に重なるサブスクリプションの検索と合計金額の計算
pub mod aggregator;
pub mod guard;
pub mod models;
pub mod mutator;
pub mod period;
pub mod repository;
pub mod resolver;
pub mod service;


// 公開インターフェース
pub use models::{
    CostCalculationRequest, CostCalculationResult, CreateSubscriptionDto, ListSubscriptionsQuery,
    NewSubscription, Subscription, SubscriptionFilter, UpdateSubscriptionDto,
};

pub use period::Period;

pub use service::SubscriptionService;
