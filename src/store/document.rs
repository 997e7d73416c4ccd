//! 翻訳ドキュメントの解析とマージ

use serde_json::{
    Map,
    Value,
};

use super::ReadError;

/// 翻訳ファイル（キーまたはネストしたキーパスから値への JSON オブジェクト）
pub type TranslationDocument = Map<String, Value>;

/// 先頭の BOM
const BYTE_ORDER_MARK: char = '\u{feff}';

/// ファイルの生の内容をドキュメントに解析する
///
/// 先頭の BOM は無視します。JSON オブジェクト以外は解析エラーです。
///
/// # Errors
/// パスとパーサーのメッセージを持つ [`ReadError::Parse`]
pub fn parse_document(path: &str, raw: &[u8]) -> Result<TranslationDocument, ReadError> {
    let text = String::from_utf8_lossy(raw);
    let text = text.strip_prefix(BYTE_ORDER_MARK).unwrap_or(&text);

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(other) => Err(ReadError::Parse {
            path: path.to_string(),
            message: format!("expected a JSON object, found {}", value_kind(&other)),
        }),
        Err(e) => Err(ReadError::Parse { path: path.to_string(), message: e.to_string() }),
    }
}

/// エラーメッセージ用の値の種類
const fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// ディスクに保存する形式（コンパクトな JSON）にシリアライズする
///
/// # Errors
/// シリアライザーのエラー（文字列キーのマップでは発生しない）
pub fn serialize_document(document: &TranslationDocument) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(document)
}

/// `key` に `value` を記録する
///
/// 区切り文字がなければキーをそのまま使います。区切り文字があればキーをパスに分割して
/// ディープマージします。経路上の兄弟キーは残し、途中のオブジェクト以外の値は
/// オブジェクトで置き換えます。
pub fn apply_missing_key(
    document: &mut TranslationDocument,
    key: &str,
    value: &str,
    key_separator: Option<&str>,
) {
    let Some(separator) = key_separator.filter(|s| !s.is_empty()) else {
        document.insert(key.to_string(), Value::String(value.to_string()));
        return;
    };

    let mut tokens: Vec<&str> = key.split(separator).collect();
    let leaf = tokens.pop().unwrap_or(key);

    let mut current = document;
    for token in tokens {
        let entry =
            current.entry(token.to_string()).or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(child) = entry else {
            return;
        };
        current = child;
    }
    current.insert(leaf.to_string(), Value::String(value.to_string()));
}

/// `path` の親ディレクトリ
///
/// パスに `\` が含まれていればそれを、なければ `/` を区切り文字とします。OS の区切り文字は
/// 前提にしません。作成するディレクトリ部分がなければ `None` を返します。
#[must_use]
pub fn parent_dir(path: &str) -> Option<&str> {
    let separator = if path.contains('\\') { '\\' } else { '/' };
    let (parent, _) = path.rsplit_once(separator)?;
    (!parent.is_empty()).then_some(parent)
}
