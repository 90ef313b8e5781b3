#![allow(dead_code)]
// テスト用のインメモリバックエンド

use crate::features::per_diem::backend::PerDiemBackend;
use crate::features::per_diem::models::{
    DailyDescription, MileageEntry, MonthlyRule, PerDiemRule, PeriodQuery, Receipt,
    ReceiptPayload, TimeEntry,
};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::DateKey;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) fn date(value: &str) -> DateKey {
    DateKey::parse(value).unwrap()
}

pub(crate) fn work(value: &str, hours: f64) -> TimeEntry {
    TimeEntry {
        id: None,
        date: date(value),
        hours,
        category: Some("Working Hours".to_string()),
    }
}

pub(crate) fn drive(value: &str, miles: f64) -> MileageEntry {
    MileageEntry {
        id: None,
        date: date(value),
        miles,
    }
}

pub(crate) fn overnight(value: &str) -> DailyDescription {
    DailyDescription {
        id: None,
        date: date(value),
        stayed_overnight: Some(true),
    }
}

pub(crate) fn per_diem_receipt(id: &str, value: &str, amount: f64) -> Receipt {
    Receipt {
        id: id.to_string(),
        employee_id: Some("emp-1".to_string()),
        date: date(value),
        amount,
        vendor: Some("Per Diem".to_string()),
        description: Some("Per Diem".to_string()),
        category: Some("Per Diem".to_string()),
    }
}

/// インメモリのバックエンド
///
/// 書き込みは`receipts`に反映され、呼び出しは`calls`に記録される
#[derive(Default)]
pub(crate) struct InMemoryBackend {
    pub daily_rules: Mutex<Vec<PerDiemRule>>,
    pub monthly_rules: Mutex<Vec<MonthlyRule>>,
    pub receipts: Mutex<Vec<Receipt>>,
    pub time_entries: Mutex<Vec<TimeEntry>>,
    pub mileage_entries: Mutex<Vec<MileageEntry>>,
    pub daily_descriptions: Mutex<Vec<DailyDescription>>,
    pub calls: Mutex<Vec<String>>,
    /// 指定した回数目の書き込み（1始まり）を失敗させる
    pub fail_on_write: Mutex<Vec<usize>>,
    /// 書き込みごとの遅延
    pub write_delay: Mutex<Option<Duration>>,
    /// 読み込み失敗させるエンドポイント名
    pub fail_fetch: Mutex<Option<&'static str>>,
    /// サーバー側でIDを採番するか
    pub assign_server_ids: bool,
    /// 月ごとの読み込み遅延
    pub fetch_delays: Mutex<HashMap<u32, Duration>>,
    write_count: AtomicUsize,
    daily_rule_fetches: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(self, cost_center: &str, daily_max: f64, monthly_limit: f64) -> Self {
        self.daily_rules.lock().unwrap().push(PerDiemRule {
            id: Some("rule-1".to_string()),
            cost_center: cost_center.to_string(),
            max_amount: daily_max,
        });
        self.monthly_rules.lock().unwrap().push(MonthlyRule {
            cost_center: cost_center.to_string(),
            max_amount: monthly_limit,
        });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn write_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| !call.starts_with("GET"))
            .collect()
    }

    pub fn stored_receipts(&self) -> Vec<Receipt> {
        self.receipts.lock().unwrap().clone()
    }

    pub fn daily_rule_fetches(&self) -> usize {
        self.daily_rule_fetches.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn check_write(&self) -> AppResult<()> {
        let count = self.write_count.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on_write.lock().unwrap().contains(&count) {
            return Err(AppError::external_service(
                Some(500),
                "Receipt service unavailable",
            ));
        }
        Ok(())
    }

    async fn before_fetch(&self, name: &'static str, query: Option<&PeriodQuery>) -> AppResult<()> {
        let delay = query.and_then(|q| {
            self.fetch_delays
                .lock()
                .unwrap()
                .get(&q.period.month)
                .copied()
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_fetch.lock().unwrap() == Some(name) {
            return Err(AppError::external_service(Some(503), "Service unavailable"));
        }
        Ok(())
    }

    fn in_period<T>(items: &[T], query: &PeriodQuery, date_of: impl Fn(&T) -> DateKey) -> Vec<T>
    where
        T: Clone,
    {
        items
            .iter()
            .filter(|item| query.period.contains(&date_of(item)))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PerDiemBackend for InMemoryBackend {
    async fn fetch_daily_rules(&self) -> AppResult<Vec<PerDiemRule>> {
        self.daily_rule_fetches.fetch_add(1, Ordering::SeqCst);
        self.record("GET /api/per-diem-rules".to_string());
        self.before_fetch("daily-rules", None).await?;
        Ok(self.daily_rules.lock().unwrap().clone())
    }

    async fn fetch_monthly_rules(&self) -> AppResult<Vec<MonthlyRule>> {
        self.record("GET /api/per-diem-monthly-rules".to_string());
        self.before_fetch("monthly-rules", None).await?;
        Ok(self.monthly_rules.lock().unwrap().clone())
    }

    async fn fetch_receipts(&self, query: &PeriodQuery) -> AppResult<Vec<Receipt>> {
        self.record(format!("GET /api/receipts {}", query.period));
        self.before_fetch("receipts", Some(query)).await?;
        let receipts = self.receipts.lock().unwrap().clone();
        Ok(Self::in_period(&receipts, query, |r| r.date))
    }

    async fn fetch_time_entries(&self, query: &PeriodQuery) -> AppResult<Vec<TimeEntry>> {
        self.record(format!("GET /api/time-tracking {}", query.period));
        self.before_fetch("time-tracking", Some(query)).await?;
        let entries = self.time_entries.lock().unwrap().clone();
        Ok(Self::in_period(&entries, query, |e| e.date))
    }

    async fn fetch_mileage_entries(&self, query: &PeriodQuery) -> AppResult<Vec<MileageEntry>> {
        self.record(format!("GET /api/mileage-entries {}", query.period));
        self.before_fetch("mileage", Some(query)).await?;
        let entries = self.mileage_entries.lock().unwrap().clone();
        Ok(Self::in_period(&entries, query, |e| e.date))
    }

    async fn fetch_daily_descriptions(
        &self,
        query: &PeriodQuery,
    ) -> AppResult<Vec<DailyDescription>> {
        self.record(format!("GET /api/daily-descriptions {}", query.period));
        self.before_fetch("daily-descriptions", Some(query)).await?;
        let entries = self.daily_descriptions.lock().unwrap().clone();
        Ok(Self::in_period(&entries, query, |e| e.date))
    }

    async fn create_receipt(&self, payload: &ReceiptPayload) -> AppResult<Option<String>> {
        self.record(format!("POST /api/receipts {}", payload.date));
        self.check_write().await?;

        let mut receipts = self.receipts.lock().unwrap();
        let id = if self.assign_server_ids {
            format!("srv-{}", receipts.len() + 1)
        } else {
            payload.id.clone().unwrap_or_default()
        };
        receipts.push(Receipt {
            id: id.clone(),
            employee_id: Some(payload.employee_id.clone()),
            date: payload.date,
            amount: payload.amount,
            vendor: Some(payload.vendor.clone()),
            description: Some(payload.description.clone()),
            category: Some(payload.category.clone()),
        });

        Ok(self.assign_server_ids.then_some(id))
    }

    async fn update_receipt(&self, receipt_id: &str, payload: &ReceiptPayload) -> AppResult<()> {
        self.record(format!("PUT /api/receipts/{receipt_id}"));
        self.check_write().await?;

        let mut receipts = self.receipts.lock().unwrap();
        let receipt = receipts
            .iter_mut()
            .find(|r| r.id == receipt_id)
            .ok_or_else(|| AppError::external_service(Some(404), "Receipt not found"))?;
        receipt.amount = payload.amount;
        Ok(())
    }

    async fn delete_receipt(&self, receipt_id: &str) -> AppResult<()> {
        self.record(format!("DELETE /api/receipts/{receipt_id}"));
        self.check_write().await?;

        let mut receipts = self.receipts.lock().unwrap();
        let before = receipts.len();
        receipts.retain(|r| r.id != receipt_id);
        if receipts.len() == before {
            return Err(AppError::external_service(Some(404), "Receipt not found"));
        }
        Ok(())
    }
}
