//! 分发决策：设备有规则组则整条遥测交给规则引擎，否则进入兜底存储。
//!
//! 二选一，不按规则组过滤字段；字段级适用性由规则引擎负责。

use domain::RuleGroupId;
use std::collections::BTreeSet;
use std::sync::Arc;

/// 遥测消息的去向。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchTarget {
    /// 交给规则引擎，携带完整的规则组集合。
    RuleEngine(Arc<BTreeSet<RuleGroupId>>),
    FallbackStore,
}

pub fn decide(membership: Arc<BTreeSet<RuleGroupId>>) -> DispatchTarget {
    if membership.is_empty() {
        DispatchTarget::FallbackStore
    } else {
        DispatchTarget::RuleEngine(membership)
    }
}
