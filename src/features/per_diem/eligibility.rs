//! 日当の適格判定
//!
//! 「勤務8時間以上、かつ（走行100マイル以上 または 宿泊あり）」を日ごとに判定する。

use crate::features::per_diem::models::{
    DailyDescription, DayEligibility, MileageEntry, TimeEntry,
};
use crate::shared::utils::{DateKey, YearMonth};
use std::collections::{BTreeMap, HashMap};

/// 適格判定の閾値
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EligibilityRule {
    pub min_hours: f64,
    pub min_miles: f64,
}

impl Default for EligibilityRule {
    fn default() -> Self {
        Self {
            min_hours: 8.0,
            min_miles: 100.0,
        }
    }
}

/// 1日分の集計値
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DayFacts {
    pub hours_worked: f64,
    pub miles_driven: f64,
    pub stayed_overnight: bool,
}

impl EligibilityRule {
    /// 1日分の集計値から適格判定を行う
    pub fn evaluate(&self, date_key: DateKey, facts: DayFacts) -> DayEligibility {
        let meets_hours = facts.hours_worked >= self.min_hours;
        let meets_miles = facts.miles_driven >= self.min_miles;
        let is_eligible = meets_hours && (meets_miles || facts.stayed_overnight);

        // 勤務時間不足のメッセージを最優先
        let reason = if !meets_hours {
            format!("Under {} hours", trim_number(self.min_hours))
        } else if meets_miles {
            format!("{:.1}h, {:.0} mi", facts.hours_worked, facts.miles_driven)
        } else if facts.stayed_overnight {
            format!("{:.1}h, stayed overnight", facts.hours_worked)
        } else {
            format!(
                "{:.1}h, {:.0} mi, no overnight stay (needs {}+ mi or overnight)",
                facts.hours_worked,
                facts.miles_driven,
                trim_number(self.min_miles)
            )
        };

        DayEligibility {
            date_key,
            is_eligible,
            reason,
            hours_worked: facts.hours_worked,
            miles_driven: facts.miles_driven,
            stayed_overnight: facts.stayed_overnight,
        }
    }
}

/// 整数なら小数点なしで表示
fn trim_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

/// 勤怠・走行距離・日次記述を日付ごとに集計する
///
/// 勤怠は勤務カテゴリのみ合計し、日次記述が無い日は宿泊なしとして扱う
pub fn aggregate_day_facts(
    time_entries: &[TimeEntry],
    mileage_entries: &[MileageEntry],
    daily_descriptions: &[DailyDescription],
) -> HashMap<DateKey, DayFacts> {
    let mut facts: HashMap<DateKey, DayFacts> = HashMap::new();

    for entry in time_entries.iter().filter(|entry| entry.counts_as_work()) {
        facts.entry(entry.date).or_default().hours_worked += entry.hours;
    }

    for entry in mileage_entries {
        facts.entry(entry.date).or_default().miles_driven += entry.miles;
    }

    for description in daily_descriptions {
        if description.stayed_overnight.unwrap_or(false) {
            facts.entry(description.date).or_default().stayed_overnight = true;
        }
    }

    facts
}

/// 対象月の全日について適格判定を行う
pub fn compute_month_eligibility(
    rule: &EligibilityRule,
    period: YearMonth,
    time_entries: &[TimeEntry],
    mileage_entries: &[MileageEntry],
    daily_descriptions: &[DailyDescription],
) -> BTreeMap<DateKey, DayEligibility> {
    let facts = aggregate_day_facts(time_entries, mileage_entries, daily_descriptions);

    period
        .days()
        .into_iter()
        .map(|date_key| {
            let day_facts = facts.get(&date_key).copied().unwrap_or_default();
            (date_key, rule.evaluate(date_key, day_facts))
        })
        .collect()
}
