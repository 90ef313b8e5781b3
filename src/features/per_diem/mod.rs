/// 日当機能モジュール
///
/// このモジュールは日当の適格判定と予算管理に関連する機能を提供します：
/// - 勤務時間・走行距離・宿泊の有無による日別の適格判定
/// - 日額上限・月間上限を適用した請求台帳の編集
/// - 領収書APIとの突き合わせ保存（失敗時の取り消しを含む）
/// - ルール・領収書の読み取りキャッシュ
// サブモジュールの宣言
pub mod backend;
pub mod cache;
pub mod commands;
pub mod config;
pub mod eligibility;
pub mod ledger;
pub mod models;
pub mod service;

#[cfg(test)]
pub(crate) mod test_utils;

// 公開インターフェース：外部から使用可能な型と関数をエクスポート

// モデル
pub use models::{
    DailyDescription, DayEligibility, MileageEntry, MonthlyRule, PerDiemEntry, PerDiemLimits,
    PerDiemRule, PeriodQuery, Receipt, ReceiptPayload, TimeEntry, TrackerRequest,
};

// 判定・台帳
pub use eligibility::{aggregate_day_facts, compute_month_eligibility, DayFacts, EligibilityRule};
pub use ledger::{PerDiemLedger, ReceiptWrite, SavePlan};

// サービス
pub use backend::{ApiPerDiemBackend, PerDiemBackend};
pub use cache::{PerDiemCache, TtlCache};
pub use config::PerDiemSettings;
pub use service::{
    Banner, BannerKind, CompensationReport, LoadOutcome, LoadSummary, PerDiemTracker,
    SaveError, SaveReport, TrackerSnapshot,
};

// コマンド
pub use commands::{claim_days, show_month, validate_request, ClaimEdit, ClaimOutcome, MonthView};
