use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::EntityId;

/// Response to a create request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Created {
    pub success: bool,
    #[serde(default)]
    pub id: Option<EntityId>,
}

impl Created {
    /// The assigned id, or `Rejected` when the backend refused or omitted it
    pub fn into_id(self, resource: &'static str) -> ApiResult<EntityId> {
        match (self.success, self.id) {
            (true, Some(id)) => Ok(id),
            _ => Err(ApiError::Rejected {
                resource,
                action: "create",
            }),
        }
    }
}

/// Acknowledgement for update and delete requests
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { success: true }
    }

    pub fn into_result(self, resource: &'static str, action: &'static str) -> ApiResult<()> {
        if self.success {
            Ok(())
        } else {
            Err(ApiError::Rejected { resource, action })
        }
    }
}
