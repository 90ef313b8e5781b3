use crate::features::per_diem::models::{
    DayEligibility, PerDiemEntry, PerDiemLimits, Receipt,
};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{clamp_amount, DateKey, YearMonth};
use log::{debug, info, warn};
use std::collections::BTreeMap;

/// 金額をセント単位の整数に変換（浮動小数点誤差を避けて比較するため）
fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// 保存時に発行する書き込み
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiptWrite {
    /// チェックが外された保存済みの日
    Delete {
        date_key: DateKey,
        receipt_id: String,
        previous_amount: f64,
    },
    /// 保存済みで金額が変更された日
    Update {
        date_key: DateKey,
        receipt_id: String,
        amount: f64,
        previous_amount: f64,
    },
    /// 新たにチェックされた日
    Create { date_key: DateKey, amount: f64 },
}

impl ReceiptWrite {
    pub fn date_key(&self) -> DateKey {
        match self {
            ReceiptWrite::Delete { date_key, .. }
            | ReceiptWrite::Update { date_key, .. }
            | ReceiptWrite::Create { date_key, .. } => *date_key,
        }
    }

    /// ログ・表示用の操作名
    pub fn verb(&self) -> &'static str {
        match self {
            ReceiptWrite::Delete { .. } => "DELETE",
            ReceiptWrite::Update { .. } => "PUT",
            ReceiptWrite::Create { .. } => "POST",
        }
    }
}

/// 保存計画（削除を先に、その後日付順に作成・更新）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SavePlan {
    pub writes: Vec<ReceiptWrite>,
    /// 変更がないため送信しない保存済みの日数
    pub unchanged: usize,
}

impl SavePlan {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn count(&self, verb: &str) -> usize {
        self.writes.iter().filter(|w| w.verb() == verb).count()
    }
}

/// 月間の日当台帳
///
/// 対象月の全日分のエントリを保持し、編集時に日額上限と月間上限を適用する
#[derive(Debug, Clone, PartialEq)]
pub struct PerDiemLedger {
    period: YearMonth,
    limits: PerDiemLimits,
    entries: BTreeMap<DateKey, PerDiemEntry>,
}

impl PerDiemLedger {
    /// 対象月の台帳を作成し、既存の日当領収書を反映する
    ///
    /// 未請求の日の金額は日額上限で初期化する
    pub fn build(period: YearMonth, limits: PerDiemLimits, receipts: &[Receipt]) -> Self {
        let mut entries: BTreeMap<DateKey, PerDiemEntry> = period
            .days()
            .into_iter()
            .map(|date_key| {
                (
                    date_key,
                    PerDiemEntry {
                        date_key,
                        amount: limits.daily_max,
                        is_eligible: false,
                        receipt_id: None,
                        persisted_amount: None,
                    },
                )
            })
            .collect();

        for receipt in receipts.iter().filter(|r| r.is_per_diem()) {
            let Some(entry) = entries.get_mut(&receipt.date) else {
                debug!(
                    "対象月外の日当領収書を無視します: id={}, date={}",
                    receipt.id, receipt.date
                );
                continue;
            };

            if let Some(existing) = &entry.receipt_id {
                warn!(
                    "同じ日に複数の日当領収書があります: date={}, kept={existing}, ignored={}",
                    receipt.date, receipt.id
                );
                continue;
            }

            entry.is_eligible = true;
            entry.amount = clamp_amount(receipt.amount, limits.daily_max);
            entry.receipt_id = Some(receipt.id.clone());
            entry.persisted_amount = Some(receipt.amount);
        }

        Self {
            period,
            limits,
            entries,
        }
    }

    pub fn limits(&self) -> PerDiemLimits {
        self.limits
    }

    /// 日付順のエントリ
    pub fn entries(&self) -> impl Iterator<Item = &PerDiemEntry> {
        self.entries.values()
    }

    pub fn entry(&self, date_key: &DateKey) -> Option<&PerDiemEntry> {
        self.entries.get(date_key)
    }

    /// 請求中の合計金額
    pub fn total_claimed(&self) -> f64 {
        self.sum_claimed_excluding(None)
    }

    /// 請求中の日数
    pub fn claimed_days(&self) -> usize {
        self.entries.values().filter(|e| e.is_eligible).count()
    }

    /// 月間上限までの残額
    pub fn remaining_budget(&self) -> f64 {
        (self.limits.monthly_limit - self.total_claimed()).max(0.0)
    }

    fn sum_claimed_excluding(&self, excluded: Option<&DateKey>) -> f64 {
        let cents: i64 = self
            .entries
            .values()
            .filter(|e| e.is_eligible && Some(&e.date_key) != excluded)
            .map(|e| to_cents(e.amount))
            .sum();
        cents as f64 / 100.0
    }

    fn entry_mut(&mut self, date_key: &DateKey) -> AppResult<&mut PerDiemEntry> {
        let period = self.period;
        self.entries.get_mut(date_key).ok_or_else(|| {
            AppError::validation(format!("{date_key} is not in {period}"))
        })
    }

    /// 他の請求日の合計に候補金額を加えても月間上限を超えないか確認する
    fn check_budget(&self, date_key: &DateKey, candidate: f64) -> AppResult<()> {
        let other_total = self.sum_claimed_excluding(Some(date_key));
        if to_cents(other_total) + to_cents(candidate) > to_cents(self.limits.monthly_limit) {
            let remaining = (self.limits.monthly_limit - other_total).max(0.0);
            info!(
                "月間上限を超えるため変更を拒否しました: date={date_key}, candidate={candidate}, other_total={other_total}, limit={}",
                self.limits.monthly_limit
            );
            return Err(AppError::BudgetExceeded {
                limit: self.limits.monthly_limit,
                remaining,
            });
        }
        Ok(())
    }

    /// 請求チェックを切り替える
    ///
    /// チェックを付ける場合のみ月間上限を確認し、超える場合は変更しない。
    /// 適格判定とは独立しており、不適格の日もチェックできる。
    pub fn set_claim(&mut self, date_key: DateKey, claim: bool) -> AppResult<&PerDiemEntry> {
        let daily_max = self.limits.daily_max;
        let current = self.entry_mut(&date_key)?.clone();

        if claim && !current.is_eligible {
            let candidate = if current.amount > 0.0 {
                clamp_amount(current.amount, daily_max)
            } else {
                daily_max
            };
            self.check_budget(&date_key, candidate)?;

            let entry = self.entry_mut(&date_key)?;
            entry.amount = candidate;
            entry.is_eligible = true;
        } else if !claim {
            self.entry_mut(&date_key)?.is_eligible = false;
        }

        self.entry_mut(&date_key).map(|entry| &*entry)
    }

    /// 金額を変更する
    ///
    /// 金額は`[0, 日額上限]`に収めてから月間上限を確認する。
    /// 請求中でない日は合計に含まれないため上限確認を行わない。
    ///
    /// # 戻り値
    /// 適用された金額
    pub fn set_amount(&mut self, date_key: DateKey, amount: f64) -> AppResult<f64> {
        let clamped = clamp_amount(amount, self.limits.daily_max);
        let is_claimed = self.entry_mut(&date_key)?.is_eligible;

        if is_claimed {
            self.check_budget(&date_key, clamped)?;
        }

        self.entry_mut(&date_key)?.amount = clamped;
        Ok(clamped)
    }

    /// 適格な日を日付順に上限まで請求する
    ///
    /// # 戻り値
    /// (新たに請求した日, 上限により請求できなかった日)
    pub fn claim_eligible_days<'a, I>(&mut self, eligibility: I) -> (Vec<DateKey>, Vec<DateKey>)
    where
        I: IntoIterator<Item = &'a DayEligibility>,
    {
        let mut claimed = Vec::new();
        let mut rejected = Vec::new();

        for day in eligibility.into_iter().filter(|d| d.is_eligible) {
            let already = self
                .entry(&day.date_key)
                .map(|e| e.is_eligible)
                .unwrap_or(true);
            if already {
                continue;
            }
            match self.set_claim(day.date_key, true) {
                Ok(_) => claimed.push(day.date_key),
                Err(_) => rejected.push(day.date_key),
            }
        }

        (claimed, rejected)
    }

    /// 現在のエントリから保存計画を作成する
    pub fn plan_save(&self) -> SavePlan {
        let mut deletes = Vec::new();
        let mut saves = Vec::new();
        let mut unchanged = 0;

        for entry in self.entries.values() {
            match (&entry.receipt_id, entry.is_eligible) {
                (Some(receipt_id), false) => deletes.push(ReceiptWrite::Delete {
                    date_key: entry.date_key,
                    receipt_id: receipt_id.clone(),
                    previous_amount: entry.persisted_amount.unwrap_or(entry.amount),
                }),
                (Some(receipt_id), true) => {
                    let previous_amount = entry.persisted_amount.unwrap_or(entry.amount);
                    if to_cents(previous_amount) == to_cents(entry.amount) {
                        unchanged += 1;
                    } else {
                        saves.push(ReceiptWrite::Update {
                            date_key: entry.date_key,
                            receipt_id: receipt_id.clone(),
                            amount: entry.amount,
                            previous_amount,
                        });
                    }
                }
                (None, true) => saves.push(ReceiptWrite::Create {
                    date_key: entry.date_key,
                    amount: entry.amount,
                }),
                (None, false) => {}
            }
        }

        deletes.extend(saves);
        SavePlan {
            writes: deletes,
            unchanged,
        }
    }

    /// 削除成功を反映
    pub fn mark_deleted(&mut self, date_key: &DateKey) {
        if let Some(entry) = self.entries.get_mut(date_key) {
            entry.receipt_id = None;
            entry.persisted_amount = None;
        }
    }

    /// 作成・更新成功を反映
    pub fn mark_persisted(&mut self, date_key: &DateKey, receipt_id: String, amount: f64) {
        if let Some(entry) = self.entries.get_mut(date_key) {
            entry.receipt_id = Some(receipt_id);
            entry.persisted_amount = Some(amount);
        }
    }
}
