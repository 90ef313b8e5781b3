use crate::features::per_diem::backend::PerDiemBackend;
use crate::features::per_diem::models::{PeriodQuery, TrackerRequest};
use crate::features::per_diem::service::{LoadOutcome, PerDiemTracker, SaveReport, TrackerSnapshot};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{validate_amount, DateKey, YearMonth};
use log::{info, warn};
use serde::Serialize;
use std::str::FromStr;

/// 請求する日の指定（`YYYY-MM-DD` または `YYYY-MM-DD=金額`）
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimEdit {
    pub date_key: DateKey,
    pub amount: Option<f64>,
}

impl FromStr for ClaimEdit {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (date_part, amount_part) = match value.split_once('=') {
            Some((date, amount)) => (date, Some(amount)),
            None => (value, None),
        };

        let date_key = DateKey::parse(date_part)?;
        let amount = amount_part
            .map(|raw| {
                raw.trim()
                    .trim_start_matches('$')
                    .parse::<f64>()
                    .map_err(|_| AppError::validation(format!("Invalid amount: {raw}")))
            })
            .transpose()?;

        // 0円の請求は日額上限に置き換わるため明示的な指定としては受け付けない
        if let Some(amount) = amount {
            validate_amount(amount)?;
            if amount == 0.0 {
                return Err(AppError::validation(
                    "Claim amount must be greater than $0.00",
                ));
            }
        }

        Ok(Self { date_key, amount })
    }
}

/// 月表示の結果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthView {
    pub snapshot: TrackerSnapshot,
    /// 別の読み込みに追い越された場合はfalse
    pub applied: bool,
}

/// 請求・保存の結果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimOutcome {
    pub claimed: Vec<DateKey>,
    pub unclaimed: Vec<DateKey>,
    /// 上限により拒否された日とメッセージ
    pub rejected: Vec<(DateKey, String)>,
    pub report: SaveReport,
    pub snapshot: TrackerSnapshot,
}

/// 読み込み要求を検証して作成する
///
/// # 引数
/// * `employee_id` - 従業員ID
/// * `cost_center` - コストセンター
/// * `month` - 月（1〜12）
/// * `year` - 年
pub fn validate_request(
    employee_id: &str,
    cost_center: &str,
    month: u32,
    year: i32,
) -> AppResult<TrackerRequest> {
    if employee_id.trim().is_empty() {
        return Err(AppError::validation("Employee id is required"));
    }
    if cost_center.trim().is_empty() {
        return Err(AppError::validation("Cost center is required"));
    }
    let period = YearMonth::new(year, month)?;

    Ok(TrackerRequest {
        query: PeriodQuery::new(employee_id.trim(), period),
        cost_center: cost_center.trim().to_string(),
    })
}

/// 指定した従業員・月の適格判定と台帳を表示する
///
/// # 戻り値
/// 表示用のスナップショット、または失敗時はエラーメッセージ
pub async fn show_month<B: PerDiemBackend>(
    tracker: &PerDiemTracker<B>,
    request: TrackerRequest,
    force_refresh: bool,
) -> Result<MonthView, String> {
    let outcome = tracker.load(request, force_refresh).await?;
    let snapshot = tracker.snapshot()?;

    Ok(MonthView {
        applied: matches!(outcome, LoadOutcome::Applied(_)),
        snapshot,
    })
}

/// 日当を請求・取り消しして保存する
///
/// 上限を超える請求はその日だけ拒否し、他の変更は保存する。
///
/// # 引数
/// * `edits` - 請求する日（金額指定は任意）
/// * `unclaims` - 請求を取り消す日
/// * `all_eligible` - 適格な日をすべて請求する
///
/// # 戻り値
/// 保存結果、または失敗時はエラーメッセージ
pub async fn claim_days<B: PerDiemBackend>(
    tracker: &PerDiemTracker<B>,
    request: TrackerRequest,
    edits: &[ClaimEdit],
    unclaims: &[DateKey],
    all_eligible: bool,
) -> Result<ClaimOutcome, String> {
    if let LoadOutcome::Superseded { generation } = tracker.load(request, false).await? {
        return Err(AppError::StaleResponse(generation).into());
    }

    let mut claimed = Vec::new();
    let mut unclaimed = Vec::new();
    let mut rejected = Vec::new();

    for date_key in unclaims {
        tracker.toggle_day(*date_key, false)?;
        unclaimed.push(*date_key);
    }

    for edit in edits {
        match apply_claim(tracker, edit) {
            Ok(()) => claimed.push(edit.date_key),
            Err(AppError::BudgetExceeded { limit, remaining }) => {
                let message = AppError::BudgetExceeded { limit, remaining }.user_message();
                warn!("請求を拒否しました: date={}, {message}", edit.date_key);
                rejected.push((edit.date_key, message));
            }
            Err(e) => return Err(e.into()),
        }
    }

    if all_eligible {
        let (newly_claimed, over_budget) = tracker.claim_all_eligible()?;
        claimed.extend(newly_claimed);
        if !over_budget.is_empty() {
            let message = tracker.notice()?.unwrap_or_default();
            rejected.extend(over_budget.into_iter().map(|date_key| (date_key, message.clone())));
        }
    }

    let report = tracker.save().await.map_err(|e| e.user_message())?;
    info!(
        "日当の請求を保存しました: claimed={}, unclaimed={}, rejected={}",
        claimed.len(),
        unclaimed.len(),
        rejected.len()
    );

    Ok(ClaimOutcome {
        claimed,
        unclaimed,
        rejected,
        report,
        snapshot: tracker.snapshot()?,
    })
}

/// 金額指定があれば先に金額を設定してから請求する
fn apply_claim<B: PerDiemBackend>(tracker: &PerDiemTracker<B>, edit: &ClaimEdit) -> AppResult<()> {
    if let Some(amount) = edit.amount {
        tracker.set_amount(edit.date_key, amount)?;
    }
    tracker.toggle_day(edit.date_key, true)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::per_diem::cache::PerDiemCache;
    use crate::features::per_diem::config::PerDiemSettings;
    use crate::features::per_diem::test_utils::{date, drive, per_diem_receipt, work, InMemoryBackend};
    use std::sync::Arc;

    fn tracker(backend: InMemoryBackend) -> (Arc<InMemoryBackend>, PerDiemTracker<InMemoryBackend>) {
        let backend = Arc::new(backend);
        let settings = PerDiemSettings::default();
        let cache = Arc::new(PerDiemCache::new(settings.cache_ttl));
        (
            backend.clone(),
            PerDiemTracker::new(backend, cache, settings),
        )
    }

    #[test]
    fn test_claim_edit_parsing() {
        assert_eq!(
            "2024-03-05".parse::<ClaimEdit>().unwrap(),
            ClaimEdit {
                date_key: date("2024-03-05"),
                amount: None
            }
        );
        assert_eq!(
            "2024-03-05=$20.50".parse::<ClaimEdit>().unwrap().amount,
            Some(20.5)
        );
        assert!("2024-03-05=abc".parse::<ClaimEdit>().is_err());
        assert!("March 5".parse::<ClaimEdit>().is_err());
    }

    #[test]
    fn test_claim_edit_rejects_non_positive_amounts() {
        let zero = "2024-03-05=0".parse::<ClaimEdit>().unwrap_err();
        assert_eq!(zero.user_message(), "Claim amount must be greater than $0.00");
        assert!("2024-03-05=$0.00".parse::<ClaimEdit>().is_err());

        let negative = "2024-03-05=-5".parse::<ClaimEdit>().unwrap_err();
        assert_eq!(negative.user_message(), "Amount cannot be negative");
        assert!("2024-03-05=NaN".parse::<ClaimEdit>().is_err());
    }

    #[test]
    fn test_validate_request() {
        let request = validate_request(" emp-1 ", "CC-100", 3, 2024).unwrap();
        assert_eq!(request.query.employee_id, "emp-1");
        assert_eq!(request.query.period.to_string(), "2024-03");

        assert!(validate_request("", "CC-100", 3, 2024).is_err());
        assert!(validate_request("emp-1", " ", 3, 2024).is_err());
        assert!(validate_request("emp-1", "CC-100", 13, 2024).is_err());
    }

    #[tokio::test]
    async fn test_show_month() {
        let backend = InMemoryBackend::new().with_rules("CC-100", 40.0, 400.0);
        backend
            .time_entries
            .lock()
            .unwrap()
            .push(work("2024-03-05", 9.0));
        backend
            .mileage_entries
            .lock()
            .unwrap()
            .push(drive("2024-03-05", 150.0));
        let (_backend, tracker) = tracker(backend);

        let request = validate_request("emp-1", "CC-100", 3, 2024).unwrap();
        let view = show_month(&tracker, request, false).await.unwrap();
        assert!(view.applied);
        assert_eq!(view.snapshot.limits.unwrap().daily_max, 40.0);
        assert_eq!(
            view.snapshot
                .eligibility
                .iter()
                .filter(|d| d.is_eligible)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_show_month_reports_load_error() {
        let backend = InMemoryBackend::new();
        *backend.fail_fetch.lock().unwrap() = Some("receipts");
        let (_backend, tracker) = tracker(backend);

        let request = validate_request("emp-1", "CC-100", 3, 2024).unwrap();
        let error = show_month(&tracker, request, false).await.unwrap_err();
        assert_eq!(error, "Service unavailable");
    }

    #[tokio::test]
    async fn test_claim_days_saves_and_reports_rejections() {
        let backend = InMemoryBackend::new().with_rules("CC-100", 35.0, 50.0);
        backend
            .receipts
            .lock()
            .unwrap()
            .push(per_diem_receipt("old", "2024-03-01", 35.0));
        let (backend, tracker) = tracker(backend);

        let request = validate_request("emp-1", "CC-100", 3, 2024).unwrap();
        let edits = vec![
            "2024-03-02=15".parse::<ClaimEdit>().unwrap(),
            "2024-03-03".parse::<ClaimEdit>().unwrap(),
        ];
        let outcome = claim_days(&tracker, request, &edits, &[date("2024-03-01")], false)
            .await
            .unwrap();

        assert_eq!(outcome.unclaimed, vec![date("2024-03-01")]);
        assert_eq!(outcome.claimed, vec![date("2024-03-02"), date("2024-03-03")]);
        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.report.deleted, 1);
        assert_eq!(outcome.report.created, 2);
        assert_eq!(outcome.snapshot.total_claimed, 50.0);
        assert_eq!(backend.stored_receipts().len(), 2);
    }

    #[tokio::test]
    async fn test_claim_days_rejects_over_budget_day() {
        let backend = InMemoryBackend::new().with_rules("CC-100", 35.0, 50.0);
        let (backend, tracker) = tracker(backend);

        let request = validate_request("emp-1", "CC-100", 3, 2024).unwrap();
        let edits = vec![
            "2024-03-02".parse::<ClaimEdit>().unwrap(),
            "2024-03-03".parse::<ClaimEdit>().unwrap(),
        ];
        let outcome = claim_days(&tracker, request, &edits, &[], false)
            .await
            .unwrap();

        assert_eq!(outcome.claimed, vec![date("2024-03-02")]);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(
            outcome.rejected[0].1,
            "Monthly per diem limit of $50.00 reached. Remaining budget: $15.00"
        );
        assert_eq!(backend.stored_receipts().len(), 1);
    }
}
