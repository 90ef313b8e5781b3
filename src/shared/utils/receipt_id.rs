use nanoid::nanoid;

/// 乱数サフィックスに使う文字セット（小文字英数字）
const SUFFIX_ALPHABET: [char; 36] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// 乱数サフィックスの長さ
const SUFFIX_LENGTH: usize = 9;

/// クライアント側で領収書IDを生成する
///
/// # 戻り値
/// `{ミリ秒タイムスタンプ}-{9文字の乱数}` 形式のID
pub fn generate_receipt_id() -> String {
    generate_receipt_id_at(chrono::Utc::now().timestamp_millis())
}

/// 指定したタイムスタンプで領収書IDを生成する（テスト用）
pub fn generate_receipt_id_at(epoch_millis: i64) -> String {
    format!(
        "{epoch_millis}-{}",
        nanoid!(SUFFIX_LENGTH, &SUFFIX_ALPHABET)
    )
}
