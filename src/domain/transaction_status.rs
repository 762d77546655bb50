//! 赞助交易状态机
//!
//! 发送器阶段与交给展示层的交易结果。

use std::fmt;

use chrono::{DateTime, Utc};
use ethers::types::H256;
use serde::{Deserialize, Serialize};

use crate::{
    domain::user_operation::UserOperationReceipt,
    error::{CoreError, ErrorDetail},
};

/// 发送器阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitterPhase {
    /// 空闲，可以发送
    Idle,

    /// 正在估价、申请赞助并提交
    Submitting,

    /// 已拿到操作哈希，等待收据
    AwaitingReceipt,

    /// 收据已确认
    Confirmed,

    /// 失败（不会自动重试）
    Failed,
}

impl SubmitterPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::AwaitingReceipt => "awaiting_receipt",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }

    /// 终态：新的发送会把它重新置为 Idle
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }

    /// 是否有发送正在进行
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Submitting | Self::AwaitingReceipt)
    }

    /// 验证状态转换合法性
    pub fn can_transition_to(&self, target: &Self) -> bool {
        use SubmitterPhase::*;

        match (self, target) {
            // 新的发送
            (Idle, Submitting) => true,

            (Submitting, AwaitingReceipt) | (Submitting, Failed) => true,

            (AwaitingReceipt, Confirmed) | (AwaitingReceipt, Failed) => true,

            // 终态重新武装
            (Confirmed, Idle) | (Failed, Idle) => true,

            _ => false,
        }
    }

    pub fn outcome_status(&self) -> OutcomeStatus {
        match self {
            Self::Confirmed => OutcomeStatus::Confirmed,
            Self::Failed => OutcomeStatus::Failed,
            Self::Idle | Self::Submitting | Self::AwaitingReceipt => OutcomeStatus::Pending,
        }
    }
}

impl fmt::Display for SubmitterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 展示层读取的结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Pending,
    Confirmed,
    Failed,
}

/// 状态转换记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseTransition {
    pub from: SubmitterPhase,
    pub to: SubmitterPhase,
    pub at: DateTime<Utc>,
}

/// 一次发送的结果
///
/// `operation_hash` 提交后设置；`receipt` 只在确认后设置；`error` 只在失败时设置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutcome {
    phase: SubmitterPhase,
    pub operation_hash: Option<H256>,
    pub receipt: Option<UserOperationReceipt>,
    pub error: Option<CoreError>,
    pub transitions: Vec<PhaseTransition>,
}

impl TransactionOutcome {
    pub fn idle() -> Self {
        Self {
            phase: SubmitterPhase::Idle,
            operation_hash: None,
            receipt: None,
            error: None,
            transitions: Vec::new(),
        }
    }

    pub fn phase(&self) -> SubmitterPhase {
        self.phase
    }

    pub fn status(&self) -> OutcomeStatus {
        self.phase.outcome_status()
    }

    pub fn error_detail(&self) -> Option<ErrorDetail> {
        self.error.as_ref().map(ErrorDetail::from)
    }

    /// 按合法转换推进阶段，非法转换返回 false 且不修改
    pub(crate) fn advance(&mut self, to: SubmitterPhase) -> bool {
        if !self.phase.can_transition_to(&to) {
            tracing::error!(
                from = %self.phase,
                to = %to,
                "Rejected invalid submitter phase transition"
            );
            return false;
        }

        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            at: Utc::now(),
        });
        self.phase = to;
        true
    }

    /// 转到 Failed，失败结果不保留收据
    pub(crate) fn fail(&mut self, error: CoreError) {
        if self.advance(SubmitterPhase::Failed) {
            self.receipt = None;
            self.error = Some(error);
        }
    }

    /// 已经过的阶段序列（含起点）
    pub fn phase_history(&self) -> Vec<SubmitterPhase> {
        let mut phases = Vec::with_capacity(self.transitions.len() + 1);
        if let Some(first) = self.transitions.first() {
            phases.push(first.from);
        } else {
            phases.push(self.phase);
        }
        phases.extend(self.transitions.iter().map(|t| t.to));
        phases
    }
}

impl Default for TransactionOutcome {
    fn default() -> Self {
        Self::idle()
    }
}

/// 展示层使用的可序列化快照
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeView {
    pub status: OutcomeStatus,
    pub phase: SubmitterPhase,
    pub operation_hash: Option<H256>,
    pub transaction_hash: Option<H256>,
    pub error: Option<ErrorDetail>,
}

impl From<&TransactionOutcome> for OutcomeView {
    fn from(outcome: &TransactionOutcome) -> Self {
        Self {
            status: outcome.status(),
            phase: outcome.phase(),
            operation_hash: outcome.operation_hash,
            transaction_hash: outcome.receipt.as_ref().map(|r| r.receipt.transaction_hash),
            error: outcome.error_detail(),
        }
    }
}
