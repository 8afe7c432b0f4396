//! 识别文本清洗：只保留 ASCII 字母、数字、逗号、空格，丢弃长度 ≤ 2 的词
//!
//! 不做大小写折叠，"Paris" 与 "PARIS" 视为不同结果。

use once_cell::sync::Lazy;
use regex::Regex;

static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9, ]").unwrap());

/// 最短保留词长
const MIN_TOKEN_LEN: usize = 3;

pub fn normalize(raw: &str) -> String {
    let kept = DISALLOWED.replace_all(raw, "");
    kept.split_whitespace()
        .filter(|token| token.len() >= MIN_TOKEN_LEN)
        .collect::<Vec<_>>()
        .join(" ")
}
