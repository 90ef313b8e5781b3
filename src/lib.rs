pub mod features;
pub mod shared;

use features::per_diem::{ApiPerDiemBackend, PerDiemCache, PerDiemSettings, PerDiemTracker};
use log::{error, info, warn};
use shared::api_client::ApiClient;
use shared::config::{initialize_logging_system, load_environment_variables, ApiConfig, EnvironmentConfig};
use shared::errors::AppResult;
use std::sync::Arc;

/// アプリケーション状態（APIクライアントと読み取りキャッシュを保持）
pub struct AppState {
    pub env_config: EnvironmentConfig,
    pub api_client: ApiClient,
    pub per_diem_cache: Arc<PerDiemCache>,
    pub per_diem_settings: PerDiemSettings,
}

impl AppState {
    /// 環境変数から設定を読み込み、アプリケーション状態を作成する
    pub fn from_env() -> AppResult<Self> {
        let env_config = EnvironmentConfig::from_env();
        let api_config = ApiConfig::from_env();

        if api_config.is_localhost() && env_config.is_production() {
            warn!(
                "本番環境でローカルのAPIサーバーが設定されています: {}",
                api_config.base_url
            );
        }

        let api_client = ApiClient::new_with_config(api_config).map_err(|e| {
            error!("APIクライアントの初期化に失敗しました: {e}");
            e
        })?;

        let per_diem_settings = PerDiemSettings::from_env();
        let per_diem_cache = Arc::new(PerDiemCache::new(per_diem_settings.cache_ttl));

        Ok(Self {
            env_config,
            api_client,
            per_diem_cache,
            per_diem_settings,
        })
    }

    /// 日当トラッカーを作成する（キャッシュはアプリケーション状態と共有）
    pub fn per_diem_tracker(&self) -> PerDiemTracker<ApiPerDiemBackend> {
        PerDiemTracker::new(
            Arc::new(ApiPerDiemBackend::new(self.api_client.clone())),
            Arc::clone(&self.per_diem_cache),
            self.per_diem_settings.clone(),
        )
    }
}

/// 環境変数・ログを初期化してアプリケーション状態を作成する
pub fn bootstrap() -> AppResult<AppState> {
    load_environment_variables();
    initialize_logging_system();

    info!("アプリケーション初期化を開始します...");
    let state = AppState::from_env()?;
    info!(
        "アプリケーション初期化が完了しました: environment={}, api={}",
        state.env_config.environment,
        state.api_client.config().base_url
    );
    Ok(state)
}
