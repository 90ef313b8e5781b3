/// 経費精算書モジュール
///
/// 承認ワークフローのステータス表示と、ロールごとの操作ボタンの出し分けを提供します
pub mod models;

pub use models::{available_actions, BadgeTone, ReportAction, ReportStatus, Role, STAGE_COUNT};
