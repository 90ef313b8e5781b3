/// 機能横断で使用する共通モジュール
pub mod api_client;
pub mod config;
pub mod errors;
pub mod utils;
