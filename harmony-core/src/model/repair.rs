use crate::handle::Handle;
use crate::types::{RepairId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Two-aggregate operations that may leave a repair record behind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaOperation {
    Create,
    Join,
    Leave,
    DeleteCommunity,
    DeleteAccount,
}

impl SagaOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaOperation::Create => "create",
            SagaOperation::Join => "join",
            SagaOperation::Leave => "leave",
            SagaOperation::DeleteCommunity => "delete_community",
            SagaOperation::DeleteAccount => "delete_account",
        }
    }
}

impl fmt::Display for SagaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SagaOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(SagaOperation::Create),
            "join" => Ok(SagaOperation::Join),
            "leave" => Ok(SagaOperation::Leave),
            "delete_community" => Ok(SagaOperation::DeleteCommunity),
            "delete_account" => Ok(SagaOperation::DeleteAccount),
            other => Err(format!("unknown saga operation `{}`", other)),
        }
    }
}

/// Journal entry for a membership whose account side was not brought in
/// line with the community side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repair {
    pub id: RepairId,
    pub operation: SagaOperation,
    pub community: Handle,
    pub account: Handle,
    pub recorded_at: Timestamp,
}

impl Repair {
    pub fn new(operation: SagaOperation, community: Handle, account: Handle, recorded_at: Timestamp) -> Self {
        Self {
            id: RepairId::generate(),
            operation,
            community,
            account,
            recorded_at,
        }
    }
}
