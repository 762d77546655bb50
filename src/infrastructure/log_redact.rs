//! 日志脱敏
//! API key 等秘密不得进入日志；地址和哈希只显示首尾

use once_cell::sync::Lazy;
use regex::Regex;

static API_KEY_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(api[_-]?key=)[^&\s]+").unwrap());

/// 脱敏十六进制字符串（显示前缀和后缀）
pub fn redact_hex_string(hex: &str, show_chars: usize) -> String {
    if hex.len() <= show_chars * 2 {
        return "*".repeat(hex.len());
    }

    let prefix = &hex[..show_chars];
    let suffix = &hex[hex.len() - show_chars..];
    format!("{}...{}", prefix, suffix)
}

/// 脱敏地址（显示前6位和后4位）
pub fn redact_address(address: &str) -> String {
    if address.len() < 10 {
        return "*".repeat(address.len());
    }

    let prefix = &address[..6];
    let suffix = &address[address.len() - 4..];
    format!("{}...{}", prefix, suffix)
}

/// 屏蔽 URL 或错误消息里的 `apikey=...` 参数
pub fn redact_url_secrets(text: &str) -> String {
    API_KEY_PARAM.replace_all(text, "${1}***").into_owned()
}
