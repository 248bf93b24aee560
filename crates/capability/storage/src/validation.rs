//! 验证辅助函数
//!
//! 属性字段写入前的校验：
//! - ensure_key：字段名非空且长度受限
//! - ensure_value_size：文本类值长度受限

use crate::error::StorageError;
use domain::DynamicValue;

/// 字段名最大长度（与 `key_name` 列一致）。
pub const MAX_KEY_LEN: usize = 255;

/// 验证字段名
pub fn ensure_key(key: &str) -> Result<(), StorageError> {
    if key.trim().is_empty() {
        return Err(StorageError::new("key_name required"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(StorageError::new(format!(
            "key_name too long: {} > {}",
            key.len(),
            MAX_KEY_LEN
        )));
    }
    Ok(())
}

/// 验证文本类值长度
pub fn ensure_value_size(value: &DynamicValue, max_text_len: Option<usize>) -> Result<(), StorageError> {
    let Some(limit) = max_text_len else {
        return Ok(());
    };
    let len = match value {
        DynamicValue::String(text) | DynamicValue::RawStructured(text) => text.len(),
        _ => return Ok(()),
    };
    if len > limit {
        return Err(StorageError::new(format!("value too long: {} > {}", len, limit)));
    }
    Ok(())
}
