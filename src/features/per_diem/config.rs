use crate::features::per_diem::models::PerDiemLimits;
use log::debug;
use std::time::Duration;

/// 日当機能の設定
#[derive(Debug, Clone, PartialEq)]
pub struct PerDiemSettings {
    /// ルール未設定時の日額上限
    pub default_daily_max: f64,
    /// ルール未設定時の月間上限
    pub default_monthly_limit: f64,
    /// 適格となる最低勤務時間
    pub min_hours: f64,
    /// 適格となる最低走行距離（マイル）
    pub min_miles: f64,
    /// ルール・領収書キャッシュの有効期間
    pub cache_ttl: Duration,
    /// 上限超過メッセージの表示時間
    pub notice_duration: Duration,
}

impl Default for PerDiemSettings {
    fn default() -> Self {
        Self {
            default_daily_max: 35.0,
            default_monthly_limit: 350.0,
            min_hours: 8.0,
            min_miles: 100.0,
            cache_ttl: Duration::from_secs(300), // 5分間キャッシュ
            notice_duration: Duration::from_secs(5),
        }
    }
}

impl PerDiemSettings {
    /// 環境変数から設定を読み込む（未設定の項目はデフォルト値）
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let settings = Self {
            default_daily_max: crate::get_env_number_or_default!(
                "PER_DIEM_DEFAULT_DAILY_MAX",
                defaults.default_daily_max
            ),
            default_monthly_limit: crate::get_env_number_or_default!(
                "PER_DIEM_DEFAULT_MONTHLY_LIMIT",
                defaults.default_monthly_limit
            ),
            min_hours: crate::get_env_number_or_default!("PER_DIEM_MIN_HOURS", defaults.min_hours),
            min_miles: crate::get_env_number_or_default!("PER_DIEM_MIN_MILES", defaults.min_miles),
            cache_ttl: Duration::from_secs(crate::get_env_number_or_default!(
                "PER_DIEM_CACHE_TTL_SECONDS",
                300u64
            )),
            notice_duration: Duration::from_secs(crate::get_env_number_or_default!(
                "PER_DIEM_NOTICE_SECONDS",
                5u64
            )),
        };
        debug!("日当設定を読み込みました: {settings:?}");
        settings
    }

    /// ルール値を適用した上限を返す
    ///
    /// 値が無い、または0以下の場合はデフォルト値を使用する
    pub fn limits_from_rules(&self, daily_max: Option<f64>, monthly_limit: Option<f64>) -> PerDiemLimits {
        let positive = |value: Option<f64>| value.filter(|v| v.is_finite() && *v > 0.0);
        PerDiemLimits {
            daily_max: positive(daily_max).unwrap_or(self.default_daily_max),
            monthly_limit: positive(monthly_limit).unwrap_or(self.default_monthly_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = PerDiemSettings::default();
        assert_eq!(settings.default_daily_max, 35.0);
        assert_eq!(settings.default_monthly_limit, 350.0);
        assert_eq!(settings.min_hours, 8.0);
        assert_eq!(settings.min_miles, 100.0);
        assert_eq!(settings.notice_duration, Duration::from_secs(5));
    }

    #[test]
    fn test_limits_from_rules() {
        let settings = PerDiemSettings::default();

        let limits = settings.limits_from_rules(Some(50.0), Some(500.0));
        assert_eq!(limits.daily_max, 50.0);
        assert_eq!(limits.monthly_limit, 500.0);

        // 未設定・不正値はデフォルト
        let limits = settings.limits_from_rules(None, Some(0.0));
        assert_eq!(limits.daily_max, 35.0);
        assert_eq!(limits.monthly_limit, 350.0);
    }
}
