/// 汎用APIクライアント
///
/// 経費ポータルのAPIサーバーとの通信を行う。
/// 日当、領収書、勤怠、走行距離などのエンドポイントで共通して使用する。
use crate::shared::config::environment::ApiConfig;
use crate::shared::errors::{AppError, AppResult};
use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

/// APIサーバーからの構造化エラーレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: Option<String>,
    pub message: String,
    pub details: Option<serde_json::Value>,
    #[serde(rename = "requestId")]
    pub request_id: Option<String>,
}

/// 汎用APIクライアント
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
}

impl ApiClient {
    /// 環境変数の設定からAPIクライアントを作成
    pub fn new() -> AppResult<Self> {
        Self::new_with_config(ApiConfig::from_env())
    }

    /// 設定を指定してAPIクライアントを作成
    pub fn new_with_config(config: ApiConfig) -> AppResult<Self> {
        config.validate().map_err(AppError::Configuration)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::configuration(format!("HTTPクライアント初期化失敗: {e}")))?;

        Ok(Self { client, config })
    }

    /// 現在の設定を取得
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// エンドポイントから完全なURLを組み立てる
    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.config.base_url)
    }

    /// GETリクエストを送信
    pub async fn get<T>(&self, endpoint: &str) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        info!("GETリクエスト送信: endpoint={endpoint}");
        let request = self.client.get(self.url_for(endpoint));
        let body = self.send_with_retry(request, "GET", endpoint).await?;
        serde_json::from_str(&body).map_err(|e| {
            AppError::external_service(None, format!("Unexpected response from {endpoint}: {e}"))
        })
    }

    /// POSTリクエストを送信
    ///
    /// レスポンスボディが空の場合は`Value::Null`を返す
    pub async fn post<B>(&self, endpoint: &str, body: &B) -> AppResult<serde_json::Value>
    where
        B: Serialize,
    {
        info!("POSTリクエスト送信: endpoint={endpoint}");
        let request = self.client.post(self.url_for(endpoint)).json(body);
        let text = self.send_with_retry(request, "POST", endpoint).await?;
        parse_optional_json(&text)
    }

    /// PUTリクエストを送信
    pub async fn put<B>(&self, endpoint: &str, body: &B) -> AppResult<serde_json::Value>
    where
        B: Serialize,
    {
        info!("PUTリクエスト送信: endpoint={endpoint}");
        let request = self.client.put(self.url_for(endpoint)).json(body);
        let text = self.send_with_retry(request, "PUT", endpoint).await?;
        parse_optional_json(&text)
    }

    /// DELETEリクエストを送信
    ///
    /// DELETEは通常レスポンスボディがないため、成功ステータスのみチェック
    pub async fn delete(&self, endpoint: &str) -> AppResult<()> {
        info!("DELETEリクエスト送信: endpoint={endpoint}");
        let request = self.client.delete(self.url_for(endpoint));
        self.send_with_retry(request, "DELETE", endpoint).await?;
        Ok(())
    }

    /// 認証ヘッダーを付与
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    /// リクエストを送信し、成功時はレスポンスボディを返す
    ///
    /// リトライは通信失敗時のみ。HTTPエラーステータスはリトライしない。
    async fn send_with_retry(
        &self,
        request: RequestBuilder,
        method: &str,
        endpoint: &str,
    ) -> AppResult<String> {
        let request = self.authorize(request);
        let mut attempts = 0;
        loop {
            let cloned_request = request.try_clone().ok_or_else(|| {
                AppError::external_service(None, "リクエストのクローンに失敗しました")
            })?;

            match cloned_request.send().await {
                Ok(response) => {
                    if response.status().is_success() {
                        let text = response.text().await.map_err(|e| {
                            AppError::external_service(None, format!("レスポンス読み取りエラー: {e}"))
                        })?;
                        info!("{method}リクエスト成功: endpoint={endpoint}");
                        return Ok(text);
                    }
                    return Err(self.handle_error_response(response, method, endpoint).await);
                }
                Err(e) => {
                    if attempts < self.config.max_retries {
                        attempts += 1;
                        let delay = Duration::from_secs(2_u64.pow(attempts));
                        warn!(
                            "APIリクエスト失敗、リトライします: attempt={attempts}/{}, delay={delay:?}",
                            self.config.max_retries
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(AppError::external_service(
                        None,
                        format!("Could not reach the server: {e}"),
                    ));
                }
            }
        }
    }

    /// エラーレスポンスを処理し、サーバーのメッセージを保持したエラーに変換
    async fn handle_error_response(
        &self,
        response: Response,
        method: &str,
        endpoint: &str,
    ) -> AppError {
        let status_code = response.status().as_u16();
        let response_text = response.text().await.unwrap_or_default();

        let message = error_message_from_body(status_code, &response_text);
        warn!("{method}リクエスト失敗: endpoint={endpoint}, status={status_code}, message={message}");

        AppError::external_service(Some(status_code), message)
    }
}

/// 空のボディを許容してJSONとして解析
fn parse_optional_json(text: &str) -> AppResult<serde_json::Value> {
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    Ok(serde_json::from_str(text)?)
}

/// エラーレスポンスのボディからユーザー向けメッセージを取り出す
///
/// # 解析順序
/// 1. `{"error": {"code": ..., "message": ...}}` 形式
/// 2. `{"error": "..."}` または `{"message": "..."}` 形式
/// 3. 空でないテキストはそのまま
/// 4. それ以外はステータスコードに応じた汎用メッセージ
pub fn error_message_from_body(status_code: u16, body: &str) -> String {
    if let Ok(structured) = serde_json::from_str::<ErrorResponse>(body) {
        debug!(
            "構造化エラーレスポンスを受信: code={:?}, request_id={:?}",
            structured.error.code, structured.error.request_id
        );
        return structured.error.message;
    }

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "message"] {
            if let Some(serde_json::Value::String(message)) = map.get(key) {
                if !message.trim().is_empty() {
                    return message.clone();
                }
            }
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    let fallback = match status_code {
        400 => "Bad request",
        401 => "Authentication failed. Please sign in again.",
        403 => "You do not have permission to perform this action",
        404 => "The requested resource was not found",
        409 => "The record was changed by someone else",
        429 => "Too many requests. Please wait and try again.",
        500 => "Internal server error",
        502 => "Bad gateway",
        503 => "Service temporarily unavailable",
        504 => "The server did not respond in time",
        _ => "Unknown error",
    };
    format!("HTTP {status_code}: {fallback}")
}

/// クエリ文字列を組み立てる（値はURLエンコードする）
pub fn build_query(params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect();
    format!("?{}", pairs.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_error_message() {
        let body = r#"{"error":{"code":"CONFLICT","message":"Receipt is locked","details":null,"requestId":"r-1"}}"#;
        assert_eq!(error_message_from_body(409, body), "Receipt is locked");
    }

    #[test]
    fn test_flat_error_message() {
        assert_eq!(
            error_message_from_body(400, r#"{"error":"Amount exceeds daily max"}"#),
            "Amount exceeds daily max"
        );
        assert_eq!(
            error_message_from_body(500, r#"{"message":"Database unavailable"}"#),
            "Database unavailable"
        );
    }

    #[test]
    fn test_raw_text_error_message() {
        assert_eq!(
            error_message_from_body(502, "upstream timed out\n"),
            "upstream timed out"
        );
    }

    #[test]
    fn test_empty_body_falls_back_to_status() {
        assert_eq!(
            error_message_from_body(404, ""),
            "HTTP 404: The requested resource was not found"
        );
        assert_eq!(error_message_from_body(418, "  "), "HTTP 418: Unknown error");
    }

    #[test]
    fn test_build_query_encodes_values() {
        let query = build_query(&[
            ("employeeId", "emp 42".to_string()),
            ("month", "3".to_string()),
        ]);
        assert_eq!(query, "?employeeId=emp%2042&month=3");
        assert_eq!(build_query(&[]), "");
    }

    #[test]
    fn test_parse_optional_json() {
        assert_eq!(parse_optional_json("").unwrap(), serde_json::Value::Null);
        assert_eq!(
            parse_optional_json(r#"{"id":"abc"}"#).unwrap()["id"],
            serde_json::json!("abc")
        );
        assert!(parse_optional_json("not json").is_err());
    }

    #[test]
    fn test_client_rejects_invalid_config() {
        let config = ApiConfig {
            base_url: "".to_string(),
            ..ApiConfig::default()
        };
        assert!(matches!(
            ApiClient::new_with_config(config),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_url_for() {
        let client = ApiClient::new_with_config(ApiConfig {
            base_url: "http://localhost:3000".to_string(),
            ..ApiConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.url_for("/api/receipts/abc"),
            "http://localhost:3000/api/receipts/abc"
        );
    }
}
