use super::aggregator;
use super::models::{
    CostCalculationRequest, CostCalculationResult, CreateSubscriptionDto, ListSubscriptionsQuery,
    Subscription, SubscriptionFilter, UpdateSubscriptionDto,
};
use super::mutator;
use super::repository;
use crate::shared::config::DEFAULT_LIST_LIMIT;
use crate::shared::database::Database;
use crate::shared::errors::AppResult;

/// リクエスト境界から呼び出されるサブスクリプションサービス
///
/// 各メソッドは呼び出しごとに接続を取得し、処理を抜けると接続は閉じられる。
/// 複数のスレッドから同時に呼び出してよい（排他はトランザクションに委ねる）。
#[derive(Debug, Clone)]
pub struct SubscriptionService {
    database: Database,
    default_list_limit: i64,
}

impl SubscriptionService {
    /// 新しいサービスを作成する
    ///
    /// # 引数
    /// * `database` - 接続の取得元
    pub fn new(database: Database) -> Self {
        Self {
            database,
            default_list_limit: DEFAULT_LIST_LIMIT,
        }
    }

    /// 一覧取得の既定件数を変更する
    pub fn with_default_list_limit(mut self, limit: i64) -> Self {
        if limit > 0 {
            self.default_list_limit = limit;
        }
        self
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// サブスクリプションを作成する
    pub fn create_subscription(&self, dto: CreateSubscriptionDto) -> AppResult<Subscription> {
        let mut conn = self.database.connect()?;
        mutator::create(&mut conn, &dto)
    }

    /// IDでサブスクリプションを取得する（トランザクションを使わない読み取り）
    pub fn get_subscription(&self, id: i64) -> AppResult<Subscription> {
        let conn = self.database.connect()?;
        repository::find_by_id(&conn, id)
    }

    /// サブスクリプションを部分更新する
    pub fn update_subscription(
        &self,
        id: i64,
        dto: UpdateSubscriptionDto,
    ) -> AppResult<Subscription> {
        let mut conn = self.database.connect()?;
        mutator::update(&mut conn, id, &dto)
    }

    /// サブスクリプションを論理削除する
    pub fn delete_subscription(&self, id: i64) -> AppResult<()> {
        let mut conn = self.database.connect()?;
        mutator::delete(&mut conn, id)
    }

    /// サブスクリプション一覧を取得する
    ///
    /// limitが未指定または0以下の場合は既定件数、offsetが負の場合は0とする。
    pub fn list_subscriptions(&self, query: ListSubscriptionsQuery) -> AppResult<Vec<Subscription>> {
        let limit = query
            .limit
            .filter(|limit| *limit > 0)
            .unwrap_or(self.default_list_limit);
        let offset = query.offset.unwrap_or(0).max(0);

        let filter = SubscriptionFilter::new(query.user_id, query.service_name);
        let conn = self.database.connect()?;
        let subscriptions = repository::find_page(&conn, &filter, limit, offset)?;

        log::debug!(
            "サブスクリプション一覧を取得しました: {}件 (limit={limit}, offset={offset})",
            subscriptions.len()
        );

        Ok(subscriptions)
    }

    /// 指定期間の合計金額を計算する
    pub fn calculate_total_cost(
        &self,
        request: CostCalculationRequest,
    ) -> AppResult<CostCalculationResult> {
        let conn = self.database.connect()?;
        aggregator::total_cost(&conn, &request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::errors::AppError;
    use std::time::Duration;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn create_test_service() -> (TempDir, SubscriptionService) {
        let temp_dir = TempDir::new().unwrap();
        let database = Database::new(temp_dir.path().join("service.db"), Duration::from_secs(5));
        database.initialize().unwrap();
        (temp_dir, SubscriptionService::new(database))
    }

    fn dto(user_id: Uuid, service_name: &str, start: &str) -> CreateSubscriptionDto {
        CreateSubscriptionDto {
            service_name: service_name.to_string(),
            price: 999,
            user_id,
            start_period: start.to_string(),
            end_period: None,
        }
    }

    #[test]
    fn test_create_then_get() {
        let (_temp_dir, service) = create_test_service();
        let user_id = Uuid::new_v4();

        let created = service
            .create_subscription(dto(user_id, "Netflix", "01-2024"))
            .unwrap();
        let fetched = service.get_subscription(created.id).unwrap();

        assert_eq!(fetched, created);
        assert!(fetched.price > 0);
        assert_eq!(fetched.end_period, None);
    }

    #[test]
    fn test_full_lifecycle() {
        let (_temp_dir, service) = create_test_service();
        let user_id = Uuid::new_v4();

        let created = service
            .create_subscription(dto(user_id, "Netflix", "01-2024"))
            .unwrap();

        let updated = service
            .update_subscription(
                created.id,
                UpdateSubscriptionDto {
                    end_period: Some(Some("03-2024".to_string())),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.end_period.unwrap().to_string(), "03-2024");

        let cost = service
            .calculate_total_cost(CostCalculationRequest {
                user_id: Some(user_id),
                service_name: None,
                start_period: "01-2024".to_string(),
                end_period: "12-2024".to_string(),
            })
            .unwrap();
        assert_eq!(cost.total_cost, 999 * 3);

        service.delete_subscription(created.id).unwrap();
        assert!(matches!(
            service.get_subscription(created.id),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_subscription(created.id),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_pagination_defaults() {
        let (_temp_dir, service) = create_test_service();
        let service = service.with_default_list_limit(3);
        let user_id = Uuid::new_v4();

        for month in 1..=5 {
            service
                .create_subscription(dto(user_id, "Netflix", &format!("{month:02}-2024")))
                .unwrap();
        }

        // limit未指定は既定件数
        let first = service
            .list_subscriptions(ListSubscriptionsQuery::default())
            .unwrap();
        assert_eq!(first.len(), 3);

        // 0以下のlimitも既定件数、負のoffsetは0
        let same = service
            .list_subscriptions(ListSubscriptionsQuery {
                limit: Some(0),
                offset: Some(-5),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(same, first);

        let rest = service
            .list_subscriptions(ListSubscriptionsQuery {
                limit: Some(10),
                offset: Some(3),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn test_list_filters() {
        let (_temp_dir, service) = create_test_service();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        service
            .create_subscription(dto(alice, "Netflix", "01-2024"))
            .unwrap();
        service
            .create_subscription(dto(alice, "Spotify", "01-2024"))
            .unwrap();
        service
            .create_subscription(dto(bob, "Spotify Family", "01-2024"))
            .unwrap();

        let spotify = service
            .list_subscriptions(ListSubscriptionsQuery {
                service_name: Some("spotify".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(spotify.len(), 2);

        let alice_spotify = service
            .list_subscriptions(ListSubscriptionsQuery {
                user_id: Some(alice),
                service_name: Some("spotify".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(alice_spotify.len(), 1);
        assert_eq!(alice_spotify[0].user_id, alice);
    }
}
