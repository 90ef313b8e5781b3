use std::env;

fn main() {
    // ビルド時に環境変数を設定
    // 開発環境では .env ファイルから読み込み、実行時の環境変数が常に優先される
    let _ = dotenv::dotenv();

    println!("cargo:rerun-if-env-changed=API_SERVER_URL");
    println!("cargo:rerun-if-env-changed=API_TIMEOUT_SECONDS");
    println!("cargo:rerun-if-env-changed=API_MAX_RETRIES");
    println!("cargo:rerun-if-env-changed=LOG_LEVEL");

    // API設定
    let api_server_url =
        env::var("API_SERVER_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let api_timeout = env::var("API_TIMEOUT_SECONDS").unwrap_or_else(|_| "30".to_string());
    // 日当の保存処理はリトライしないため、デフォルトは0回
    let api_max_retries = env::var("API_MAX_RETRIES").unwrap_or_else(|_| "0".to_string());

    println!("cargo:rustc-env=API_SERVER_URL={}", api_server_url);
    println!("cargo:rustc-env=API_TIMEOUT_SECONDS={}", api_timeout);
    println!("cargo:rustc-env=API_MAX_RETRIES={}", api_max_retries);

    // ログレベル
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    println!("cargo:rustc-env=LOG_LEVEL={}", log_level);
}
