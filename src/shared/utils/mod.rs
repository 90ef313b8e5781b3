pub mod calendar;
pub mod receipt_id;

use crate::shared::errors::{AppError, AppResult};

pub use calendar::{DateKey, YearMonth};
pub use receipt_id::generate_receipt_id;

/// 金額のバリデーション
///
/// # バリデーション規則
/// - 有限の数値であること
/// - 0以上であること
pub fn validate_amount(amount: f64) -> AppResult<()> {
    if !amount.is_finite() {
        return Err(AppError::validation("Amount must be a number"));
    }
    if amount < 0.0 {
        return Err(AppError::validation("Amount cannot be negative"));
    }
    Ok(())
}

/// 金額を`[0, max]`に収める
///
/// NaNは0として扱う
pub fn clamp_amount(amount: f64, max: f64) -> f64 {
    if amount.is_nan() {
        return 0.0;
    }
    round_cents(amount.clamp(0.0, max.max(0.0)))
}

/// セント単位に丸める
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// 通貨表示（`$1,234.50`形式）
pub fn format_currency(amount: f64) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let fraction = cents % 100;

    let mut grouped = String::new();
    for (index, ch) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}${grouped}.{fraction:02}")
}
