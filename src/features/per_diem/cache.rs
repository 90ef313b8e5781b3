// 日当ルール・領収書の読み取りキャッシュ

use crate::features::per_diem::models::{MonthlyRule, PerDiemRule, PeriodQuery, Receipt};
use crate::shared::errors::{AppError, AppResult};
use log::debug;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 取得時刻付きのキャッシュ値
#[derive(Debug, Clone)]
struct CachedValue<V> {
    value: V,
    fetched_at: Instant,
}

/// 有効期間付きのキャッシュ
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, CachedValue<V>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<K, CachedValue<V>>>> {
        self.entries
            .lock()
            .map_err(|e| AppError::concurrency(format!("キャッシュのロック取得失敗: {e}")))
    }

    /// 有効期間内の値を取得
    pub fn get(&self, key: &K) -> AppResult<Option<V>> {
        let mut entries = self.lock()?;
        let is_fresh = match entries.get(key) {
            Some(cached) => cached.fetched_at.elapsed() < self.ttl,
            None => return Ok(None),
        };

        if is_fresh {
            Ok(entries.get(key).map(|cached| cached.value.clone()))
        } else {
            entries.remove(key);
            Ok(None)
        }
    }

    pub fn insert(&self, key: K, value: V) -> AppResult<()> {
        self.lock()?.insert(
            key,
            CachedValue {
                value,
                fetched_at: Instant::now(),
            },
        );
        Ok(())
    }

    pub fn invalidate(&self, key: &K) -> AppResult<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }

    pub fn clear(&self) -> AppResult<()> {
        self.lock()?.clear();
        Ok(())
    }

    pub fn len(&self) -> AppResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> AppResult<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// ロック保持中にパニックさせてMutexを使用不能にする（テスト用）
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = self.entries.lock();
            panic!("poison cache lock");
        }));
    }
}

/// 日当機能の読み取りキャッシュ
///
/// アプリケーション状態が所有し、参照で受け渡す。
/// 保存成功後は`invalidate_after_save`で明示的に破棄する。
#[derive(Debug)]
pub struct PerDiemCache {
    /// コストセンター別の日当ルール（ルール未設定はNone）
    pub daily_rules: TtlCache<String, Option<PerDiemRule>>,
    /// 月間上限の一覧
    pub monthly_rules: TtlCache<(), Vec<MonthlyRule>>,
    /// 従業員・月別の領収書
    pub receipts: TtlCache<PeriodQuery, Vec<Receipt>>,
}

impl PerDiemCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            daily_rules: TtlCache::new(ttl),
            monthly_rules: TtlCache::new(ttl),
            receipts: TtlCache::new(ttl),
        }
    }

    /// 保存後に関連する読み取りキャッシュを破棄する
    pub fn invalidate_after_save(&self, query: &PeriodQuery) -> AppResult<()> {
        self.receipts.invalidate(query)?;
        self.monthly_rules.clear()?;
        debug!(
            "保存後のキャッシュを破棄しました: employee_id={}, period={}",
            query.employee_id, query.period
        );
        Ok(())
    }

    /// 全てのキャッシュを破棄する
    pub fn invalidate_all(&self) -> AppResult<()> {
        self.daily_rules.clear()?;
        self.monthly_rules.clear()?;
        self.receipts.clear()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::utils::YearMonth;

    #[test]
    fn test_get_within_ttl() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        cache.insert("a".to_string(), 1).unwrap();
        assert_eq!(cache.get(&"a".to_string()).unwrap(), Some(1));
        assert_eq!(cache.get(&"b".to_string()).unwrap(), None);
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::ZERO);
        cache.insert("a".to_string(), 1).unwrap();
        assert_eq!(cache.get(&"a".to_string()).unwrap(), None);
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_invalidate_after_save_keeps_daily_rules() {
        let cache = PerDiemCache::new(Duration::from_secs(60));
        let query = PeriodQuery::new("emp-1", YearMonth::new(2024, 3).unwrap());
        let other = PeriodQuery::new("emp-1", YearMonth::new(2024, 4).unwrap());

        cache.receipts.insert(query.clone(), Vec::new()).unwrap();
        cache.receipts.insert(other.clone(), Vec::new()).unwrap();
        cache.monthly_rules.insert((), Vec::new()).unwrap();
        cache.daily_rules.insert("CC-100".to_string(), None).unwrap();

        cache.invalidate_after_save(&query).unwrap();

        assert!(cache.receipts.get(&query).unwrap().is_none());
        assert!(cache.receipts.get(&other).unwrap().is_some());
        assert!(cache.monthly_rules.get(&()).unwrap().is_none());
        assert_eq!(cache.daily_rules.len().unwrap(), 1);

        cache.invalidate_all().unwrap();
        assert!(cache.daily_rules.is_empty().unwrap());
    }

    #[test]
    fn test_poisoned_lock_reports_concurrency_error() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        cache.poison();
        assert!(matches!(
            cache.invalidate(&"a".to_string()),
            Err(AppError::Concurrency(_))
        ));
    }
}
