/// 日当機能が利用するAPIサーバーのエンドポイント
///
/// 状態遷移や検証はすべてサーバー側で行われ、ここでは呼び出すだけ
use crate::features::per_diem::models::{
    DailyDescription, MileageEntry, MonthlyRule, PerDiemRule, PeriodQuery, Receipt,
    ReceiptPayload, TimeEntry,
};
use crate::shared::api_client::{build_query, ApiClient};
use crate::shared::errors::AppResult;
use async_trait::async_trait;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;

pub const DAILY_RULES_ENDPOINT: &str = "/api/per-diem-rules";
pub const MONTHLY_RULES_ENDPOINT: &str = "/api/per-diem-monthly-rules";
pub const RECEIPTS_ENDPOINT: &str = "/api/receipts";
pub const TIME_TRACKING_ENDPOINT: &str = "/api/time-tracking";
pub const MILEAGE_ENDPOINT: &str = "/api/mileage-entries";
pub const DAILY_DESCRIPTIONS_ENDPOINT: &str = "/api/daily-descriptions";

/// 日当機能のバックエンド
#[async_trait]
pub trait PerDiemBackend: Send + Sync {
    /// 日当ルールの一覧
    async fn fetch_daily_rules(&self) -> AppResult<Vec<PerDiemRule>>;

    /// 月間上限の一覧
    async fn fetch_monthly_rules(&self) -> AppResult<Vec<MonthlyRule>>;

    /// 従業員・月別の領収書
    async fn fetch_receipts(&self, query: &PeriodQuery) -> AppResult<Vec<Receipt>>;

    async fn fetch_time_entries(&self, query: &PeriodQuery) -> AppResult<Vec<TimeEntry>>;

    async fn fetch_mileage_entries(&self, query: &PeriodQuery) -> AppResult<Vec<MileageEntry>>;

    async fn fetch_daily_descriptions(
        &self,
        query: &PeriodQuery,
    ) -> AppResult<Vec<DailyDescription>>;

    /// 領収書を作成する
    ///
    /// # 戻り値
    /// サーバーが返したID（返さない場合はNone）
    async fn create_receipt(&self, payload: &ReceiptPayload) -> AppResult<Option<String>>;

    async fn update_receipt(&self, receipt_id: &str, payload: &ReceiptPayload) -> AppResult<()>;

    async fn delete_receipt(&self, receipt_id: &str) -> AppResult<()>;
}

/// 一覧レスポンス（配列そのもの、または`data`で包まれた形式）
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListResponse<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> ListResponse<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ListResponse::Bare(items) => items,
            ListResponse::Wrapped { data } => data,
        }
    }
}

/// 一覧の各行を変換する
///
/// 変換できない行は警告を出して読み飛ばし、残りの行は使用する
pub fn decode_rows<T>(endpoint: &str, rows: Vec<serde_json::Value>) -> Vec<T>
where
    T: DeserializeOwned,
{
    let total = rows.len();
    let items: Vec<T> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| match serde_json::from_value::<T>(row) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("変換できない行を読み飛ばします: endpoint={endpoint}, index={index}, error={e}");
                None
            }
        })
        .collect();

    if items.len() < total {
        warn!(
            "一覧の一部を読み飛ばしました: endpoint={endpoint}, skipped={}, total={total}",
            total - items.len()
        );
    }
    items
}

/// 作成レスポンスからIDを取り出す
///
/// `{"id": ...}`、`{"data": {"id": ...}}`、`{"receipt": {"id": ...}}` に対応
pub fn created_id(response: &serde_json::Value) -> Option<String> {
    let candidates = [
        response.get("id"),
        response.get("data").and_then(|data| data.get("id")),
        response.get("receipt").and_then(|receipt| receipt.get("id")),
    ];

    candidates.into_iter().flatten().find_map(|id| match id {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// APIサーバー経由のバックエンド
#[derive(Clone)]
pub struct ApiPerDiemBackend {
    client: ApiClient,
}

impl ApiPerDiemBackend {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    async fn get_list<T>(&self, endpoint: &str) -> AppResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let response: ListResponse<serde_json::Value> = self.client.get(endpoint).await?;
        let items: Vec<T> = decode_rows(endpoint, response.into_vec());
        debug!("一覧取得: endpoint={endpoint}, count={}", items.len());
        Ok(items)
    }

    fn period_endpoint(base: &str, query: &PeriodQuery) -> String {
        format!("{base}{}", build_query(&query.query_params()))
    }

    fn receipt_endpoint(receipt_id: &str) -> String {
        format!("{RECEIPTS_ENDPOINT}/{}", urlencoding::encode(receipt_id))
    }
}

#[async_trait]
impl PerDiemBackend for ApiPerDiemBackend {
    async fn fetch_daily_rules(&self) -> AppResult<Vec<PerDiemRule>> {
        self.get_list(DAILY_RULES_ENDPOINT).await
    }

    async fn fetch_monthly_rules(&self) -> AppResult<Vec<MonthlyRule>> {
        self.get_list(MONTHLY_RULES_ENDPOINT).await
    }

    async fn fetch_receipts(&self, query: &PeriodQuery) -> AppResult<Vec<Receipt>> {
        self.get_list(&Self::period_endpoint(RECEIPTS_ENDPOINT, query))
            .await
    }

    async fn fetch_time_entries(&self, query: &PeriodQuery) -> AppResult<Vec<TimeEntry>> {
        self.get_list(&Self::period_endpoint(TIME_TRACKING_ENDPOINT, query))
            .await
    }

    async fn fetch_mileage_entries(&self, query: &PeriodQuery) -> AppResult<Vec<MileageEntry>> {
        self.get_list(&Self::period_endpoint(MILEAGE_ENDPOINT, query))
            .await
    }

    async fn fetch_daily_descriptions(
        &self,
        query: &PeriodQuery,
    ) -> AppResult<Vec<DailyDescription>> {
        self.get_list(&Self::period_endpoint(DAILY_DESCRIPTIONS_ENDPOINT, query))
            .await
    }

    async fn create_receipt(&self, payload: &ReceiptPayload) -> AppResult<Option<String>> {
        let response = self.client.post(RECEIPTS_ENDPOINT, payload).await?;
        Ok(created_id(&response))
    }

    async fn update_receipt(&self, receipt_id: &str, payload: &ReceiptPayload) -> AppResult<()> {
        self.client
            .put(&Self::receipt_endpoint(receipt_id), payload)
            .await?;
        Ok(())
    }

    async fn delete_receipt(&self, receipt_id: &str) -> AppResult<()> {
        self.client
            .delete(&Self::receipt_endpoint(receipt_id))
            .await
    }
}
