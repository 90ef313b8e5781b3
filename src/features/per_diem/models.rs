use crate::shared::utils::{DateKey, YearMonth};
use serde::{Deserialize, Deserializer, Serialize};

/// 日当として扱う領収書のカテゴリ
pub const PER_DIEM_CATEGORY: &str = "Per Diem";

/// 日当の領収書に固定で設定される値
pub const PER_DIEM_VENDOR: &str = "Per Diem";
pub const PER_DIEM_DESCRIPTION: &str = "Per Diem";
pub const PER_DIEM_FILE_TYPE: &str = "image";

/// 勤務時間として集計する勤怠カテゴリ（空文字も含む）
pub const WORKING_HOUR_CATEGORIES: [&str; 2] = ["Working Hours", "Regular Hours"];

/// 数値または数値文字列を受け付ける
///
/// APIサーバーはDECIMAL列を文字列で返すことがある
fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number out of range")),
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(0.0),
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid number: {s}"))),
        serde_json::Value::Null => Ok(0.0),
        other => Err(serde::de::Error::custom(format!(
            "expected number, got {other}"
        ))),
    }
}

/// 文字列または数値のIDを文字列として受け付ける
fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected id, got {other}"
        ))),
    }
}

/// 真偽値を緩やかに受け付ける
///
/// `true`/`false` のほか、0/1 や "true"/"false"/"1"/"0" を返すAPIサーバーがある。
/// nullは未設定としてNoneを返す
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::Bool(b)) => Some(b),
        Some(serde_json::Value::Number(n)) => Some(n.as_f64().map(|v| v != 0.0).unwrap_or(false)),
        Some(serde_json::Value::String(s)) => {
            let normalized = s.trim().to_ascii_lowercase();
            Some(matches!(normalized.as_str(), "true" | "1" | "yes" | "y"))
        }
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected boolean, got {other}"
            )))
        }
    })
}

fn required_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    optional_id(deserializer)?.ok_or_else(|| serde::de::Error::custom("missing id"))
}

/// 勤怠エントリ（`/api/time-tracking`）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    #[serde(default, deserialize_with = "optional_id")]
    pub id: Option<String>,
    pub date: DateKey,
    #[serde(deserialize_with = "number_or_string")]
    pub hours: f64,
    #[serde(default)]
    pub category: Option<String>,
}

impl TimeEntry {
    /// 勤務時間として集計対象のカテゴリか
    ///
    /// カテゴリが空、"Working Hours"、"Regular Hours" の場合のみ対象（PTOなどは除外）
    pub fn counts_as_work(&self) -> bool {
        match self.category.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(category) => WORKING_HOUR_CATEGORIES.contains(&category),
        }
    }
}

/// 走行距離エントリ（`/api/mileage-entries`）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MileageEntry {
    #[serde(default, deserialize_with = "optional_id")]
    pub id: Option<String>,
    pub date: DateKey,
    #[serde(deserialize_with = "number_or_string")]
    pub miles: f64,
}

/// 日次の業務記述（`/api/daily-descriptions`）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyDescription {
    #[serde(default, deserialize_with = "optional_id")]
    pub id: Option<String>,
    pub date: DateKey,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub stayed_overnight: Option<bool>,
}

/// 領収書（`/api/receipts`）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    #[serde(deserialize_with = "required_id")]
    pub id: String,
    #[serde(default, deserialize_with = "optional_id")]
    pub employee_id: Option<String>,
    pub date: DateKey,
    #[serde(deserialize_with = "number_or_string")]
    pub amount: f64,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl Receipt {
    /// 日当の領収書かどうか
    pub fn is_per_diem(&self) -> bool {
        self.category.as_deref() == Some(PER_DIEM_CATEGORY)
    }
}

/// コストセンター別の月間上限（`/api/per-diem-monthly-rules`）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRule {
    pub cost_center: String,
    #[serde(deserialize_with = "number_or_string")]
    pub max_amount: f64,
}

/// コストセンター別の日当ルール（`/api/per-diem-rules`）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerDiemRule {
    #[serde(default, deserialize_with = "optional_id")]
    pub id: Option<String>,
    pub cost_center: String,
    #[serde(deserialize_with = "number_or_string")]
    pub max_amount: f64,
}

/// 領収書の作成・更新リクエストボディ
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub employee_id: String,
    pub date: DateKey,
    pub amount: f64,
    pub vendor: String,
    pub description: String,
    pub category: String,
    pub image_uri: String,
    pub file_type: String,
}

impl ReceiptPayload {
    /// 日当の領収書ボディを作成
    ///
    /// `id`は新規作成時のみ指定する
    pub fn per_diem(employee_id: &str, date: DateKey, amount: f64, id: Option<String>) -> Self {
        Self {
            id,
            employee_id: employee_id.to_string(),
            date,
            amount,
            vendor: PER_DIEM_VENDOR.to_string(),
            description: PER_DIEM_DESCRIPTION.to_string(),
            category: PER_DIEM_CATEGORY.to_string(),
            image_uri: String::new(),
            file_type: PER_DIEM_FILE_TYPE.to_string(),
        }
    }
}

/// 従業員・対象月の指定
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeriodQuery {
    pub employee_id: String,
    pub period: YearMonth,
}

impl PeriodQuery {
    pub fn new(employee_id: impl Into<String>, period: YearMonth) -> Self {
        Self {
            employee_id: employee_id.into(),
            period,
        }
    }

    /// `employeeId`、`month`、`year` のクエリパラメータ
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("employeeId", self.employee_id.clone()),
            ("month", self.period.month.to_string()),
            ("year", self.period.year.to_string()),
        ]
    }
}

/// 日当を読み込む単位（従業員・コストセンター・対象月）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackerRequest {
    pub query: PeriodQuery,
    pub cost_center: String,
}

/// 日ごとの適格判定結果（保存しない派生データ）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayEligibility {
    pub date_key: DateKey,
    pub is_eligible: bool,
    pub reason: String,
    pub hours_worked: f64,
    pub miles_driven: f64,
    pub stayed_overnight: bool,
}

impl DayEligibility {
    /// 表示用のステータス
    pub fn label(&self) -> &'static str {
        if self.is_eligible {
            "Eligible"
        } else {
            "Not eligible"
        }
    }
}

/// 日額上限と月間上限
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerDiemLimits {
    pub daily_max: f64,
    pub monthly_limit: f64,
}

/// 台帳の1日分
///
/// `is_eligible`はユーザーが請求するかどうかのチェックであり、
/// 日ごとの適格判定（`DayEligibility`）とは独立している
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerDiemEntry {
    pub date_key: DateKey,
    pub amount: f64,
    pub is_eligible: bool,
    pub receipt_id: Option<String>,
    /// サーバーに保存済みの金額（未保存ならNone）
    #[serde(skip)]
    pub persisted_amount: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_entry_accepts_string_hours_and_timestamp_date() {
        let json = r#"{"id": 7, "date": "2024-03-05T00:00:00.000Z", "hours": "8.5", "category": "Working Hours"}"#;
        let entry: TimeEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id.as_deref(), Some("7"));
        assert_eq!(entry.date.to_string(), "2024-03-05");
        assert_eq!(entry.hours, 8.5);
        assert!(entry.counts_as_work());
    }

    #[test]
    fn test_time_entry_categories() {
        let entry = |category: Option<&str>| TimeEntry {
            id: None,
            date: DateKey::parse("2024-03-05").unwrap(),
            hours: 8.0,
            category: category.map(str::to_string),
        };
        assert!(entry(None).counts_as_work());
        assert!(entry(Some("")).counts_as_work());
        assert!(entry(Some("Regular Hours")).counts_as_work());
        assert!(!entry(Some("PTO")).counts_as_work());
        assert!(!entry(Some("Holiday")).counts_as_work());
    }

    #[test]
    fn test_receipt_is_per_diem() {
        let json = r#"{"id": "r1", "employeeId": "e1", "date": "2024-03-05", "amount": 35, "category": "Per Diem"}"#;
        let receipt: Receipt = serde_json::from_str(json).unwrap();
        assert!(receipt.is_per_diem());

        let json = r#"{"id": 9, "date": "2024-03-05", "amount": "12.40", "category": "Meals"}"#;
        let receipt: Receipt = serde_json::from_str(json).unwrap();
        assert_eq!(receipt.id, "9");
        assert_eq!(receipt.amount, 12.4);
        assert!(!receipt.is_per_diem());
    }

    #[test]
    fn test_receipt_requires_id() {
        let json = r#"{"date": "2024-03-05", "amount": 35}"#;
        assert!(serde_json::from_str::<Receipt>(json).is_err());
    }

    #[test]
    fn test_receipt_payload_body() {
        let payload = ReceiptPayload::per_diem(
            "emp-1",
            DateKey::parse("2024-03-05").unwrap(),
            35.0,
            None,
        );
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "employeeId": "emp-1",
                "date": "2024-03-05",
                "amount": 35.0,
                "vendor": "Per Diem",
                "description": "Per Diem",
                "category": "Per Diem",
                "imageUri": "",
                "fileType": "image"
            })
        );

        let with_id = ReceiptPayload::per_diem(
            "emp-1",
            DateKey::parse("2024-03-05").unwrap(),
            35.0,
            Some("1709600000000-abc123xyz".to_string()),
        );
        let value = serde_json::to_value(&with_id).unwrap();
        assert_eq!(value["id"], "1709600000000-abc123xyz");
    }

    #[test]
    fn test_period_query_params() {
        let query = PeriodQuery::new("emp-1", YearMonth::new(2024, 3).unwrap());
        assert_eq!(
            query.query_params(),
            vec![
                ("employeeId", "emp-1".to_string()),
                ("month", "3".to_string()),
                ("year", "2024".to_string()),
            ]
        );
    }

    #[test]
    fn test_daily_description_defaults() {
        let json = r#"{"date": "2024-03-06"}"#;
        let description: DailyDescription = serde_json::from_str(json).unwrap();
        assert_eq!(description.stayed_overnight, None);
    }

    #[test]
    fn test_daily_description_accepts_integer_and_string_flags() {
        let json = r#"[
            {"id": 1, "date": "2024-03-06", "stayedOvernight": 1},
            {"id": 2, "date": "2024-03-07", "stayedOvernight": 0},
            {"id": 3, "date": "2024-03-08", "stayedOvernight": "true"},
            {"id": 4, "date": "2024-03-09", "stayedOvernight": "false"},
            {"id": 5, "date": "2024-03-10", "stayedOvernight": null}
        ]"#;
        let descriptions: Vec<DailyDescription> = serde_json::from_str(json).unwrap();
        let flags: Vec<Option<bool>> = descriptions.iter().map(|d| d.stayed_overnight).collect();
        assert_eq!(
            flags,
            vec![Some(true), Some(false), Some(true), Some(false), None]
        );
    }
}
