// 機能モジュール構造
pub mod features;
pub mod shared;

pub use features::subscriptions::{
    CostCalculationRequest, CostCalculationResult, CreateSubscriptionDto, ListSubscriptionsQuery,
    Period, Subscription, SubscriptionFilter, SubscriptionService, UpdateSubscriptionDto,
};
pub use shared::{
    initialize_application, AppError, AppResult, Database, EnvironmentConfig,
    InitializationResult,
};
