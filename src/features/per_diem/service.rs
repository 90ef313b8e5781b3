use crate::features::per_diem::backend::PerDiemBackend;
use crate::features::per_diem::cache::PerDiemCache;
use crate::features::per_diem::config::PerDiemSettings;
use crate::features::per_diem::eligibility::{compute_month_eligibility, EligibilityRule};
use crate::features::per_diem::ledger::{PerDiemLedger, ReceiptWrite};
use crate::features::per_diem::models::{
    DailyDescription, DayEligibility, MileageEntry, PerDiemEntry, PerDiemLimits, PeriodQuery,
    Receipt, ReceiptPayload, TimeEntry, TrackerRequest,
};
use crate::shared::errors::{AppError, AppResult, ErrorSeverity};
use crate::shared::utils::{generate_receipt_id, DateKey};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

/// 画面上部に表示するエラーバナーの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BannerKind {
    Load,
    Save,
}

/// 閉じるまで表示されるエラーバナー
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Banner {
    pub kind: BannerKind,
    pub message: String,
}

/// 一定時間で消える通知（月間上限超過など）
#[derive(Debug, Clone)]
pub struct TransientNotice {
    pub message: String,
    shown_at: Instant,
    duration: Duration,
}

impl TransientNotice {
    pub fn new(message: String, duration: Duration) -> Self {
        Self {
            message,
            shown_at: Instant::now(),
            duration,
        }
    }

    pub fn is_visible_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.shown_at) < self.duration
    }
}

/// 読み込み結果
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// 状態に反映された
    Applied(LoadSummary),
    /// より新しい読み込みが開始されていたため破棄された
    Superseded { generation: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSummary {
    pub generation: u64,
    pub days: usize,
    pub eligible_days: usize,
    pub claimed_days: usize,
    pub total_claimed: f64,
    pub limits: PerDiemLimits,
}

/// 保存結果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport {
    pub deleted: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// 保存失敗時の取り消し結果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationReport {
    /// 取り消しに成功した書き込み
    pub undone: Vec<String>,
    /// 取り消しに失敗した書き込みとエラーメッセージ
    pub failed: Vec<(String, String)>,
}

impl CompensationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 保存エラー
#[derive(Debug, Error)]
pub enum SaveError {
    /// 保存を開始できなかった
    #[error(transparent)]
    Precondition(#[from] AppError),

    /// 書き込みに失敗した（それ以降の書き込みは行わない）
    #[error("{operation} {date_key} failed: {message}")]
    WriteFailed {
        operation: &'static str,
        date_key: DateKey,
        message: String,
        applied: usize,
        compensation: CompensationReport,
    },
}

impl SaveError {
    /// バナーに表示するメッセージ
    pub fn user_message(&self) -> String {
        match self {
            SaveError::Precondition(e) => e.user_message(),
            SaveError::WriteFailed {
                message,
                compensation,
                applied,
                ..
            } => {
                if *applied == 0 || compensation.is_complete() {
                    message.clone()
                } else {
                    format!(
                        "{message} ({} change(s) could not be undone; reload to see the saved state)",
                        compensation.failed.len()
                    )
                }
            }
        }
    }
}

/// 反映済みの書き込み（取り消し用）
#[derive(Debug, Clone)]
struct AppliedWrite {
    write: ReceiptWrite,
    /// 作成時はサーバーまたはクライアントが採番したID
    receipt_id: String,
}

impl AppliedWrite {
    fn describe(&self) -> String {
        format!(
            "{} {} ({})",
            self.write.verb(),
            self.write.date_key(),
            self.receipt_id
        )
    }
}

/// 表示用のスナップショット
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    pub employee_id: Option<String>,
    pub cost_center: Option<String>,
    pub period: Option<String>,
    pub loading: bool,
    pub limits: Option<PerDiemLimits>,
    pub total_claimed: f64,
    pub remaining_budget: f64,
    pub eligibility: Vec<DayEligibility>,
    pub entries: Vec<PerDiemEntry>,
    pub banner: Option<Banner>,
    pub notice: Option<String>,
}

#[derive(Debug, Default)]
struct TrackerState {
    request: Option<TrackerRequest>,
    loading: bool,
    saving: bool,
    eligibility: BTreeMap<DateKey, DayEligibility>,
    ledger: Option<PerDiemLedger>,
    banner: Option<Banner>,
    notice: Option<TransientNotice>,
}

/// 1ヶ月分の取得結果
struct MonthData {
    daily_max: Option<f64>,
    monthly_limit: Option<f64>,
    receipts: Vec<Receipt>,
    time_entries: Vec<TimeEntry>,
    mileage_entries: Vec<MileageEntry>,
    daily_descriptions: Vec<DailyDescription>,
}

/// 日当の適格判定と予算管理
///
/// 読み込みごとに世代番号を採番し、古い世代のレスポンスは反映しない。
pub struct PerDiemTracker<B: PerDiemBackend> {
    backend: Arc<B>,
    cache: Arc<PerDiemCache>,
    settings: PerDiemSettings,
    generation: AtomicU64,
    state: Mutex<TrackerState>,
}

impl<B: PerDiemBackend> PerDiemTracker<B> {
    pub fn new(backend: Arc<B>, cache: Arc<PerDiemCache>, settings: PerDiemSettings) -> Self {
        Self {
            backend,
            cache,
            settings,
            generation: AtomicU64::new(0),
            state: Mutex::new(TrackerState::default()),
        }
    }

    fn lock_state(&self) -> AppResult<MutexGuard<'_, TrackerState>> {
        self.state
            .lock()
            .map_err(|e| AppError::concurrency(format!("状態のロック取得失敗: {e}")))
    }

    fn eligibility_rule(&self) -> EligibilityRule {
        EligibilityRule {
            min_hours: self.settings.min_hours,
            min_miles: self.settings.min_miles,
        }
    }

    /// 現在の世代番号
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// 従業員・月を読み込み、適格判定と台帳を作り直す
    ///
    /// # 引数
    /// * `request` - 従業員・コストセンター・対象月
    /// * `force_refresh` - キャッシュを使わずに取得する
    ///
    /// # 戻り値
    /// 反映された場合は`Applied`、新しい読み込みに追い越された場合は`Superseded`
    pub async fn load(&self, request: TrackerRequest, force_refresh: bool) -> AppResult<LoadOutcome> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "日当の読み込みを開始: generation={generation}, employee_id={}, period={}, cost_center={}",
            request.query.employee_id, request.query.period, request.cost_center
        );

        {
            let mut state = self.lock_state()?;
            state.loading = true;
            state.request = Some(request.clone());
            state.banner = None;
        }

        let result = self.fetch_month(&request, force_refresh).await;

        if generation != self.current_generation() {
            warn!(
                "新しい読み込みが開始されたため結果を破棄します: generation={generation}, latest={}",
                self.current_generation()
            );
            return Ok(LoadOutcome::Superseded { generation });
        }

        let mut state = self.lock_state()?;
        state.loading = false;

        match result {
            Ok(data) => {
                let limits = self
                    .settings
                    .limits_from_rules(data.daily_max, data.monthly_limit);
                let eligibility = compute_month_eligibility(
                    &self.eligibility_rule(),
                    request.query.period,
                    &data.time_entries,
                    &data.mileage_entries,
                    &data.daily_descriptions,
                );
                let ledger = PerDiemLedger::build(request.query.period, limits, &data.receipts);

                let summary = LoadSummary {
                    generation,
                    days: eligibility.len(),
                    eligible_days: eligibility.values().filter(|d| d.is_eligible).count(),
                    claimed_days: ledger.claimed_days(),
                    total_claimed: ledger.total_claimed(),
                    limits,
                };
                info!(
                    "日当の読み込み完了: generation={generation}, eligible_days={}, claimed_days={}",
                    summary.eligible_days, summary.claimed_days
                );

                state.eligibility = eligibility;
                state.ledger = Some(ledger);
                state.notice = None;
                Ok(LoadOutcome::Applied(summary))
            }
            Err(e) => {
                log_by_severity(&format!("日当の読み込みに失敗: generation={generation}"), &e);
                state.eligibility.clear();
                state.ledger = None;
                state.banner = Some(Banner {
                    kind: BannerKind::Load,
                    message: e.user_message(),
                });
                Err(e)
            }
        }
    }

    /// ルール・領収書・勤怠・走行距離・日次記述を並行して取得する
    async fn fetch_month(&self, request: &TrackerRequest, force_refresh: bool) -> AppResult<MonthData> {
        let query = &request.query;
        let (daily_max, monthly_limit, receipts, time_entries, mileage_entries, daily_descriptions) =
            futures::try_join!(
                self.resolve_daily_max(&request.cost_center, force_refresh),
                self.resolve_monthly_limit(&request.cost_center, force_refresh),
                self.resolve_receipts(query, force_refresh),
                self.backend.fetch_time_entries(query),
                self.backend.fetch_mileage_entries(query),
                self.backend.fetch_daily_descriptions(query),
            )?;

        Ok(MonthData {
            daily_max,
            monthly_limit,
            receipts,
            time_entries,
            mileage_entries,
            daily_descriptions,
        })
    }

    /// コストセンターの日額上限（キャッシュ経由）
    async fn resolve_daily_max(&self, cost_center: &str, force_refresh: bool) -> AppResult<Option<f64>> {
        let key = cost_center.to_string();
        if !force_refresh {
            if let Some(rule) = self.cache.daily_rules.get(&key)? {
                debug!("日当ルールをキャッシュから取得: cost_center={cost_center}");
                return Ok(rule.map(|r| r.max_amount));
            }
        }

        let rule = self
            .backend
            .fetch_daily_rules()
            .await?
            .into_iter()
            .find(|rule| rule.cost_center == cost_center);
        if rule.is_none() {
            debug!("日当ルールが未設定のためデフォルト値を使用: cost_center={cost_center}");
        }
        let max_amount = rule.as_ref().map(|r| r.max_amount);
        self.cache.daily_rules.insert(key, rule)?;
        Ok(max_amount)
    }

    /// コストセンターの月間上限（キャッシュ経由）
    async fn resolve_monthly_limit(
        &self,
        cost_center: &str,
        force_refresh: bool,
    ) -> AppResult<Option<f64>> {
        let cached = if force_refresh {
            None
        } else {
            self.cache.monthly_rules.get(&())?
        };

        let rules = match cached {
            Some(rules) => rules,
            None => {
                let rules = self.backend.fetch_monthly_rules().await?;
                self.cache.monthly_rules.insert((), rules.clone())?;
                rules
            }
        };

        Ok(rules
            .iter()
            .find(|rule| rule.cost_center == cost_center)
            .map(|rule| rule.max_amount))
    }

    /// 従業員・月の領収書（キャッシュ経由）
    async fn resolve_receipts(&self, query: &PeriodQuery, force_refresh: bool) -> AppResult<Vec<Receipt>> {
        if !force_refresh {
            if let Some(receipts) = self.cache.receipts.get(query)? {
                return Ok(receipts);
            }
        }

        let receipts = self.backend.fetch_receipts(query).await?;
        self.cache.receipts.insert(query.clone(), receipts.clone())?;
        Ok(receipts)
    }

    fn ensure_editable(state: &TrackerState) -> AppResult<()> {
        if state.loading {
            return Err(AppError::validation("Per diem data is still loading"));
        }
        if state.saving {
            return Err(AppError::validation("Per diem changes are being saved"));
        }
        if state.ledger.is_none() {
            return Err(AppError::validation("No per diem month is loaded"));
        }
        Ok(())
    }

    /// 上限超過エラーの場合は一時通知を表示する
    fn note_rejection(&self, state: &mut TrackerState, error: &AppError) {
        if matches!(error, AppError::BudgetExceeded { .. }) {
            state.notice = Some(TransientNotice::new(
                error.user_message(),
                self.settings.notice_duration,
            ));
        }
    }

    /// 請求チェックを切り替える
    pub fn toggle_day(&self, date_key: DateKey, claim: bool) -> AppResult<PerDiemEntry> {
        let mut state = self.lock_state()?;
        Self::ensure_editable(&state)?;

        let result = match state.ledger.as_mut() {
            Some(ledger) => ledger.set_claim(date_key, claim).map(|entry| entry.clone()),
            None => Err(AppError::validation("No per diem month is loaded")),
        };
        if let Err(e) = &result {
            self.note_rejection(&mut state, e);
        }
        result
    }

    /// 金額を変更する
    ///
    /// # 戻り値
    /// 日額上限に収めた後の金額
    pub fn set_amount(&self, date_key: DateKey, amount: f64) -> AppResult<f64> {
        let mut state = self.lock_state()?;
        Self::ensure_editable(&state)?;

        let result = match state.ledger.as_mut() {
            Some(ledger) => ledger.set_amount(date_key, amount),
            None => Err(AppError::validation("No per diem month is loaded")),
        };
        if let Err(e) = &result {
            self.note_rejection(&mut state, e);
        }
        result
    }

    /// 適格な日をすべて上限まで請求する
    pub fn claim_all_eligible(&self) -> AppResult<(Vec<DateKey>, Vec<DateKey>)> {
        let mut state = self.lock_state()?;
        Self::ensure_editable(&state)?;

        let TrackerState {
            eligibility,
            ledger,
            ..
        } = &mut *state;
        let (claimed, rejected) = match ledger.as_mut() {
            Some(ledger) => ledger.claim_eligible_days(eligibility.values()),
            None => (Vec::new(), Vec::new()),
        };

        let rejection = match state.ledger.as_ref() {
            Some(ledger) if !rejected.is_empty() => Some(AppError::BudgetExceeded {
                limit: ledger.limits().monthly_limit,
                remaining: ledger.remaining_budget(),
            }),
            _ => None,
        };
        if let Some(error) = rejection {
            self.note_rejection(&mut state, &error);
        }
        Ok((claimed, rejected))
    }

    /// 表示中の一時通知（期限切れなら消去してNone）
    pub fn notice(&self) -> AppResult<Option<String>> {
        let mut state = self.lock_state()?;
        Ok(Self::visible_notice(&mut state))
    }

    fn visible_notice(state: &mut TrackerState) -> Option<String> {
        let now = Instant::now();
        match &state.notice {
            Some(notice) if notice.is_visible_at(now) => Some(notice.message.clone()),
            Some(_) => {
                state.notice = None;
                None
            }
            None => None,
        }
    }

    pub fn banner(&self) -> AppResult<Option<Banner>> {
        Ok(self.lock_state()?.banner.clone())
    }

    /// エラーバナーを閉じる
    pub fn dismiss_banner(&self) -> AppResult<()> {
        self.lock_state()?.banner = None;
        Ok(())
    }

    /// 表示用のスナップショット
    pub fn snapshot(&self) -> AppResult<TrackerSnapshot> {
        let mut state = self.lock_state()?;
        let notice = Self::visible_notice(&mut state);
        let ledger = state.ledger.as_ref();

        Ok(TrackerSnapshot {
            employee_id: state.request.as_ref().map(|r| r.query.employee_id.clone()),
            cost_center: state.request.as_ref().map(|r| r.cost_center.clone()),
            period: state.request.as_ref().map(|r| r.query.period.to_string()),
            loading: state.loading,
            limits: ledger.map(|l| l.limits()),
            total_claimed: ledger.map(|l| l.total_claimed()).unwrap_or(0.0),
            remaining_budget: ledger.map(|l| l.remaining_budget()).unwrap_or(0.0),
            eligibility: state.eligibility.values().cloned().collect(),
            entries: ledger
                .map(|l| l.entries().cloned().collect())
                .unwrap_or_default(),
            banner: state.banner.clone(),
            notice,
        })
    }

    /// 台帳をサーバーの領収書と突き合わせて保存する
    ///
    /// 削除を先に行い、その後作成・更新を順に送信する。
    /// 途中で失敗した場合は残りを送信せず、反映済みの書き込みを逆順に取り消す。
    /// 成功時は関連キャッシュを破棄するが、再取得は行わない。
    pub async fn save(&self) -> Result<SaveReport, SaveError> {
        let (request, plan, generation) = {
            let mut state = self.lock_state()?;
            Self::ensure_editable(&state)?;
            let (request, ledger) = match (&state.request, &state.ledger) {
                (Some(request), Some(ledger)) => (request.clone(), ledger),
                _ => return Err(AppError::validation("No per diem month is loaded").into()),
            };
            let plan = ledger.plan_save();
            state.saving = true;
            state.banner = None;
            (request, plan, self.current_generation())
        };

        info!(
            "日当の保存を開始: employee_id={}, period={}, writes={}, unchanged={}",
            request.query.employee_id,
            request.query.period,
            plan.writes.len(),
            plan.unchanged
        );

        let mut report = SaveReport {
            unchanged: plan.unchanged,
            ..SaveReport::default()
        };
        if plan.is_empty() {
            info!("保存する変更はありません");
            self.finish_save(None);
            return Ok(report);
        }
        let mut applied: Vec<AppliedWrite> = Vec::new();

        for write in plan.writes {
            match self.execute(&request, &write).await {
                Ok(receipt_id) => {
                    match &write {
                        ReceiptWrite::Delete { .. } => report.deleted += 1,
                        ReceiptWrite::Update { .. } => report.updated += 1,
                        ReceiptWrite::Create { .. } => report.created += 1,
                    }
                    self.apply_to_ledger(generation, |ledger| match &write {
                        ReceiptWrite::Delete { date_key, .. } => ledger.mark_deleted(date_key),
                        ReceiptWrite::Update {
                            date_key, amount, ..
                        }
                        | ReceiptWrite::Create { date_key, amount } => {
                            ledger.mark_persisted(date_key, receipt_id.clone(), *amount)
                        }
                    });
                    applied.push(AppliedWrite { write, receipt_id });
                }
                Err(e) => {
                    log_by_severity(
                        &format!(
                            "日当の保存に失敗: {} {}, applied={}",
                            write.verb(),
                            write.date_key(),
                            applied.len()
                        ),
                        &e,
                    );
                    let applied_count = applied.len();
                    let compensation = self.compensate(&request, generation, applied).await;

                    let save_error = SaveError::WriteFailed {
                        operation: write.verb(),
                        date_key: write.date_key(),
                        message: e.user_message(),
                        applied: applied_count,
                        compensation,
                    };
                    self.finish_save(Some(save_error.user_message()));
                    if applied_count > 0 {
                        if let Err(e) = self.cache.invalidate_after_save(&request.query) {
                            error!("保存失敗後のキャッシュ破棄に失敗: {e}");
                        }
                    }
                    return Err(save_error);
                }
            }
        }

        if let Err(e) = self.cache.invalidate_after_save(&request.query) {
            log_by_severity("保存後のキャッシュ破棄に失敗", &e);
            self.finish_save(Some(e.user_message()));
            return Err(e.into());
        }
        self.finish_save(None);

        info!(
            "日当の保存完了: deleted={}, created={}, updated={}, unchanged={}",
            report.deleted, report.created, report.updated, report.unchanged
        );
        Ok(report)
    }

    /// 保存中フラグを解除し、失敗時はバナーを表示する
    fn finish_save(&self, failure: Option<String>) {
        match self.lock_state() {
            Ok(mut state) => {
                state.saving = false;
                if let Some(message) = failure {
                    state.banner = Some(Banner {
                        kind: BannerKind::Save,
                        message,
                    });
                }
            }
            Err(e) => error!("保存状態の更新に失敗: {e}"),
        }
    }

    /// 1件の書き込みを送信する
    ///
    /// # 戻り値
    /// 対象の領収書ID
    async fn execute(&self, request: &TrackerRequest, write: &ReceiptWrite) -> AppResult<String> {
        let employee_id = &request.query.employee_id;
        match write {
            ReceiptWrite::Delete { receipt_id, .. } => {
                self.backend.delete_receipt(receipt_id).await?;
                Ok(receipt_id.clone())
            }
            ReceiptWrite::Update {
                date_key,
                receipt_id,
                amount,
                ..
            } => {
                let payload = ReceiptPayload::per_diem(employee_id, *date_key, *amount, None);
                self.backend.update_receipt(receipt_id, &payload).await?;
                Ok(receipt_id.clone())
            }
            ReceiptWrite::Create { date_key, amount } => {
                let client_id = generate_receipt_id();
                let payload =
                    ReceiptPayload::per_diem(employee_id, *date_key, *amount, Some(client_id.clone()));
                let server_id = self.backend.create_receipt(&payload).await?;
                Ok(server_id.unwrap_or(client_id))
            }
        }
    }

    /// 反映済みの書き込みを逆順に取り消す
    async fn compensate(
        &self,
        request: &TrackerRequest,
        generation: u64,
        applied: Vec<AppliedWrite>,
    ) -> CompensationReport {
        let employee_id = &request.query.employee_id;
        let mut report = CompensationReport::default();

        for item in applied.into_iter().rev() {
            let description = item.describe();
            let result = match &item.write {
                ReceiptWrite::Create { date_key, .. } => self
                    .backend
                    .delete_receipt(&item.receipt_id)
                    .await
                    .map(|_| {
                        self.apply_to_ledger(generation, |ledger| ledger.mark_deleted(date_key));
                    }),
                ReceiptWrite::Update {
                    date_key,
                    receipt_id,
                    previous_amount,
                    ..
                } => {
                    let payload =
                        ReceiptPayload::per_diem(employee_id, *date_key, *previous_amount, None);
                    self.backend
                        .update_receipt(receipt_id, &payload)
                        .await
                        .map(|_| {
                            self.apply_to_ledger(generation, |ledger| {
                                ledger.mark_persisted(date_key, receipt_id.clone(), *previous_amount)
                            });
                        })
                }
                ReceiptWrite::Delete {
                    date_key,
                    receipt_id,
                    previous_amount,
                } => {
                    let payload = ReceiptPayload::per_diem(
                        employee_id,
                        *date_key,
                        *previous_amount,
                        Some(receipt_id.clone()),
                    );
                    self.backend.create_receipt(&payload).await.map(|server_id| {
                        let restored_id = server_id.unwrap_or_else(|| receipt_id.clone());
                        self.apply_to_ledger(generation, |ledger| {
                            ledger.mark_persisted(date_key, restored_id, *previous_amount)
                        });
                    })
                }
            };

            match result {
                Ok(()) => {
                    info!("書き込みを取り消しました: {description}");
                    report.undone.push(description);
                }
                Err(e) => {
                    error!("書き込みの取り消しに失敗: {description}, error={e}");
                    report.failed.push((description, e.user_message()));
                }
            }
        }

        report
    }

    /// 保存開始時と同じ世代の台帳にのみ反映する
    fn apply_to_ledger<F>(&self, generation: u64, apply: F)
    where
        F: FnOnce(&mut PerDiemLedger),
    {
        if generation != self.current_generation() {
            debug!("保存中に別の月が読み込まれたため台帳への反映をスキップします");
            return;
        }
        match self.lock_state() {
            Ok(mut state) => {
                if let Some(ledger) = state.ledger.as_mut() {
                    apply(ledger);
                }
            }
            Err(e) => error!("台帳への反映に失敗: {e}"),
        }
    }
}

/// 重要度に応じたレベルでエラーを記録する
fn log_by_severity(context: &str, error: &AppError) {
    match error.severity() {
        ErrorSeverity::High | ErrorSeverity::Critical => error!("{context}: {error}"),
        ErrorSeverity::Medium => warn!("{context}: {error}"),
        ErrorSeverity::Low => info!("{context}: {error}"),
    }
}
