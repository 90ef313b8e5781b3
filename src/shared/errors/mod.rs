use thiserror::Error;

/// アプリケーション全体で使用される統一エラー型
#[derive(Debug, Error)]
pub enum AppError {
    /// バリデーション関連のエラー
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// 外部サービス（APIサーバー）連携でのエラー
    ///
    /// `message` にはサーバーが返したメッセージをそのまま保持する
    #[error("外部サービスエラー: {message}")]
    ExternalService {
        status: Option<u16>,
        message: String,
    },

    /// 月間上限を超える編集
    #[error("{}", budget_message(*limit, *remaining))]
    BudgetExceeded { limit: f64, remaining: f64 },

    /// 新しい読み込みに追い越されたレスポンス
    #[error("古いレスポンスを破棄しました: generation={0}")]
    StaleResponse(u64),

    /// 設定関連のエラー
    #[error("設定エラー: {0}")]
    Configuration(String),

    /// 並行処理関連のエラー
    #[error("並行処理エラー: {0}")]
    Concurrency(String),

    /// JSON解析エラー
    #[error("JSON解析エラー: {0}")]
    Json(#[from] serde_json::Error),
}

/// 月間上限超過時にユーザーへ表示するメッセージ
pub fn budget_message(limit: f64, remaining: f64) -> String {
    format!(
        "Monthly per diem limit of ${limit:.2} reached. Remaining budget: ${:.2}",
        remaining.max(0.0)
    )
}

/// エラーの重要度を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    /// 低重要度（ユーザー入力エラーなど）
    Low,
    /// 中重要度（外部サービス一時的エラーなど）
    Medium,
    /// 高重要度（設定エラーなど）
    High,
    /// 最重要
    Critical,
}

impl AppError {
    /// ユーザーに表示するためのメッセージを取得
    ///
    /// サーバーのメッセージがある場合はそれをそのまま返す
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::ExternalService { message, .. } => message.clone(),
            AppError::BudgetExceeded { limit, remaining } => budget_message(*limit, *remaining),
            AppError::StaleResponse(_) => "Data changed while loading. Please reload.".to_string(),
            AppError::Configuration(_) => "Configuration error".to_string(),
            AppError::Concurrency(_) => "Internal state error".to_string(),
            AppError::Json(_) => "Unexpected data format".to_string(),
        }
    }

    /// エラーの詳細情報を取得（ログ出力用）
    pub fn details(&self) -> String {
        format!("{self}")
    }

    /// エラーの重要度を取得
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AppError::Validation(_) => ErrorSeverity::Low,
            AppError::BudgetExceeded { .. } => ErrorSeverity::Low,
            AppError::StaleResponse(_) => ErrorSeverity::Low,
            AppError::ExternalService { .. } => ErrorSeverity::Medium,
            AppError::Json(_) => ErrorSeverity::Medium,
            AppError::Configuration(_) => ErrorSeverity::High,
            AppError::Concurrency(_) => ErrorSeverity::Critical,
        }
    }

    /// バリデーションエラーを作成するヘルパー関数
    pub fn validation<S: Into<String>>(message: S) -> Self {
        AppError::Validation(message.into())
    }

    /// 外部サービスエラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `status` - HTTPステータス（通信自体に失敗した場合はNone）
    /// * `message` - サーバーまたはクライアントのメッセージ
    pub fn external_service<S: Into<String>>(status: Option<u16>, message: S) -> Self {
        AppError::ExternalService {
            status,
            message: message.into(),
        }
    }

    /// 設定エラーを作成するヘルパー関数
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        AppError::Configuration(message.into())
    }

    /// 並行処理エラーを作成するヘルパー関数
    pub fn concurrency<S: Into<String>>(message: S) -> Self {
        AppError::Concurrency(message.into())
    }
}

/// AppErrorからStringへの変換（コマンド層での使用のため）
impl From<AppError> for String {
    fn from(error: AppError) -> Self {
        error.user_message()
    }
}

/// Result型のエイリアス（アプリケーション全体で使用）
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity() {
        assert_eq!(AppError::validation("test").severity(), ErrorSeverity::Low);
        assert_eq!(
            AppError::BudgetExceeded {
                limit: 350.0,
                remaining: 0.0
            }
            .severity(),
            ErrorSeverity::Low
        );
        assert_eq!(
            AppError::external_service(Some(500), "boom").severity(),
            ErrorSeverity::Medium
        );
        assert_eq!(
            AppError::configuration("bad url").severity(),
            ErrorSeverity::High
        );
    }

    #[test]
    fn test_user_message_keeps_server_text() {
        // サーバーのメッセージがそのまま表示されることを確認
        let error = AppError::external_service(Some(409), "Receipt already exists");
        assert_eq!(error.user_message(), "Receipt already exists");
    }

    #[test]
    fn test_budget_message_quotes_remaining() {
        let error = AppError::BudgetExceeded {
            limit: 350.0,
            remaining: 0.0,
        };
        let message = error.user_message();
        assert!(message.contains("$350.00"));
        assert!(message.contains("$0.00"));
        assert_eq!(message, error.to_string());
    }

    #[test]
    fn test_budget_message_never_negative() {
        assert!(budget_message(100.0, -5.0).ends_with("$0.00"));
    }

    #[test]
    fn test_string_conversion() {
        let error = AppError::validation("Amount must be a number");
        let error_string: String = error.into();
        assert_eq!(error_string, "Amount must be a number");
    }
}
