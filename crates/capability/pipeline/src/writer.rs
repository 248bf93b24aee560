//! 属性写入：整个集合一次 upsert，逐字段收集失败。

use crate::PipelineError;
use domain::{AttributeSet, RawMessage};
use ds_normalize::raw_text;
use ds_storage::AttributeStore;
use std::collections::BTreeMap;
use std::sync::Arc;

/// 单个字段的写入失败。
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFailure {
    /// 存储给出的错误详情
    pub error: String,
    /// 字段规整前的序列化文本
    pub raw_value: String,
}

/// 一次写入的结果，返回后不再修改。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteResult {
    pub succeeded_count: usize,
    pub failures: BTreeMap<String, FieldFailure>,
}

impl WriteResult {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone)]
pub struct AttributeWriter {
    store: Arc<dyn AttributeStore>,
}

impl AttributeWriter {
    pub fn new(store: Arc<dyn AttributeStore>) -> Self {
        Self { store }
    }

    /// 写入规整后的属性集合。
    ///
    /// 字段级拒绝是正常结果；只有存储整体不可用时返回 `Err`。
    pub async fn write(
        &self,
        message: &RawMessage,
        attrs: &AttributeSet,
    ) -> Result<WriteResult, PipelineError> {
        let outcome = self
            .store
            .upsert_attributes(message.device_id, message.data_side, attrs)
            .await
            .map_err(|err| PipelineError::Store(err.to_string()))?;
        let failures = outcome
            .rejected
            .into_iter()
            .map(|(key, error)| {
                let raw_value = message.body.get(&key).map(raw_text).unwrap_or_default();
                (key, FieldFailure { error, raw_value })
            })
            .collect();
        Ok(WriteResult {
            succeeded_count: outcome.succeeded,
            failures,
        })
    }
}
