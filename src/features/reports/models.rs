// 経費精算書の承認ワークフロー表示モデル
//
// 状態遷移はサーバー側で行われる。ここでは表示内容と操作ボタンの出し分けのみを決める。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 精算書のステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Draft,
    Submitted,
    PendingSupervisor,
    PendingSeniorStaff,
    PendingFinance,
    Approved,
    Rejected,
    NeedsRevision,
}

/// 進捗表示の段階数（下書き〜完了）
pub const STAGE_COUNT: usize = 6;

/// バッジの色調
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeTone {
    Neutral,
    Info,
    Warning,
    Success,
    Danger,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 8] = [
        ReportStatus::Draft,
        ReportStatus::Submitted,
        ReportStatus::PendingSupervisor,
        ReportStatus::PendingSeniorStaff,
        ReportStatus::PendingFinance,
        ReportStatus::Approved,
        ReportStatus::Rejected,
        ReportStatus::NeedsRevision,
    ];

    /// APIの値から変換（未知の値はNone）
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.wire_value() == value.trim())
    }

    pub fn wire_value(&self) -> &'static str {
        match self {
            ReportStatus::Draft => "draft",
            ReportStatus::Submitted => "submitted",
            ReportStatus::PendingSupervisor => "pending_supervisor",
            ReportStatus::PendingSeniorStaff => "pending_senior_staff",
            ReportStatus::PendingFinance => "pending_finance",
            ReportStatus::Approved => "approved",
            ReportStatus::Rejected => "rejected",
            ReportStatus::NeedsRevision => "needs_revision",
        }
    }

    /// 表示ラベルと色調
    pub fn badge(&self) -> (&'static str, BadgeTone) {
        match self {
            ReportStatus::Draft => ("Draft", BadgeTone::Neutral),
            ReportStatus::Submitted => ("Submitted", BadgeTone::Info),
            ReportStatus::PendingSupervisor => ("Pending Supervisor", BadgeTone::Warning),
            ReportStatus::PendingSeniorStaff => ("Pending Senior Staff", BadgeTone::Warning),
            ReportStatus::PendingFinance => ("Pending Finance", BadgeTone::Warning),
            ReportStatus::Approved => ("Approved", BadgeTone::Success),
            ReportStatus::Rejected => ("Rejected", BadgeTone::Danger),
            ReportStatus::NeedsRevision => ("Needs Revision", BadgeTone::Danger),
        }
    }

    /// これ以上承認フローが進まない状態か
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Approved | ReportStatus::Rejected)
    }

    /// 承認待ちの状態か
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ReportStatus::Submitted
                | ReportStatus::PendingSupervisor
                | ReportStatus::PendingSeniorStaff
                | ReportStatus::PendingFinance
        )
    }

    /// 進捗表示の段階（0始まり）
    ///
    /// 差し戻しは下書きの段階、却下は完了の段階として扱う
    pub fn stage_index(&self) -> usize {
        match self {
            ReportStatus::Draft | ReportStatus::NeedsRevision => 0,
            ReportStatus::Submitted => 1,
            ReportStatus::PendingSupervisor => 2,
            ReportStatus::PendingSeniorStaff => 3,
            ReportStatus::PendingFinance => 4,
            ReportStatus::Approved | ReportStatus::Rejected => 5,
        }
    }

    /// この状態を承認できる担当ロール
    pub fn reviewer(&self) -> Option<Role> {
        match self {
            ReportStatus::PendingSupervisor => Some(Role::Supervisor),
            ReportStatus::PendingSeniorStaff => Some(Role::SeniorStaff),
            ReportStatus::PendingFinance => Some(Role::Finance),
            _ => None,
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.badge().0)
    }
}

/// 利用者のロール（ポータル）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Finance,
    Supervisor,
    SeniorStaff,
    Employee,
}

/// 精算書に対する操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportAction {
    Approve,
    Reject,
    RequestRevision,
    Delegate,
    Submit,
    Export,
    Print,
}

/// ロールとステータスから表示する操作ボタンを決める
///
/// 実際の状態遷移はサーバーが行うため、ここでは表示可否のみを返す
pub fn available_actions(status: ReportStatus, role: Role) -> Vec<ReportAction> {
    let mut actions = Vec::new();

    if role == Role::Employee
        && matches!(status, ReportStatus::Draft | ReportStatus::NeedsRevision)
    {
        actions.push(ReportAction::Submit);
    }

    let is_reviewer = status.reviewer() == Some(role) || (role == Role::Admin && status.is_pending());
    if is_reviewer {
        actions.extend([
            ReportAction::Approve,
            ReportAction::Reject,
            ReportAction::RequestRevision,
        ]);
        if role != Role::Finance {
            actions.push(ReportAction::Delegate);
        }
    }

    if status == ReportStatus::Approved && matches!(role, Role::Admin | Role::Finance) {
        actions.push(ReportAction::Export);
    }

    if status != ReportStatus::Draft {
        actions.push(ReportAction::Print);
    }

    actions
}
