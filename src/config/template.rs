//! パステンプレートの解析と展開
//!
//! `{{lng}}` と `{{ns}}` のみをサポートします（空白を含む `{{ lng }}` も可）。

use thiserror::Error;

/// テンプレート関連のエラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpolationError {
    /// 未対応のトークン
    #[error("unknown token '{{{{{0}}}}}', expected '{{{{lng}}}}' or '{{{{ns}}}}'")]
    UnknownToken(String),

    /// `{{` が閉じられていない
    #[error("unterminated '{{{{' at byte {0}")]
    Unterminated(usize),

    /// 展開する値が空
    #[error("empty value for '{{{{{0}}}}}'")]
    EmptyValue(&'static str),
}

/// テンプレートの構成要素
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// そのまま出力する文字列
    Literal(String),
    /// `{{lng}}`
    Language,
    /// `{{ns}}`
    Namespace,
}

/// 解析済みのパステンプレート
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    /// 先頭から順に並んだ部品
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// テンプレート文字列を解析する
    ///
    /// # Errors
    /// - 未対応のトークン
    /// - 閉じられていない `{{`
    pub fn parse(template: &str) -> Result<Self, InterpolationError> {
        let mut segments = Vec::new();
        let mut rest = template;
        let mut offset = 0;

        while let Some((literal, after_open)) = rest.split_once("{{") {
            if !literal.is_empty() {
                segments.push(Segment::Literal(literal.to_string()));
            }
            let Some((token, after_close)) = after_open.split_once("}}") else {
                return Err(InterpolationError::Unterminated(offset + literal.len()));
            };
            segments.push(match token.trim() {
                "lng" => Segment::Language,
                "ns" => Segment::Namespace,
                other => return Err(InterpolationError::UnknownToken(other.to_string())),
            });

            offset += rest.len() - after_close.len();
            rest = after_close;
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// 言語と名前空間でテンプレートを展開する
    ///
    /// # Errors
    /// テンプレートが参照する値が空の場合
    pub fn render(&self, language: &str, namespace: &str) -> Result<String, InterpolationError> {
        let mut path = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => path.push_str(text),
                Segment::Language if language.is_empty() => {
                    return Err(InterpolationError::EmptyValue("lng"));
                }
                Segment::Language => path.push_str(language),
                Segment::Namespace if namespace.is_empty() => {
                    return Err(InterpolationError::EmptyValue("ns"));
                }
                Segment::Namespace => path.push_str(namespace),
            }
        }
        Ok(path)
    }
}
