//! Serializable results returned to collaborators.
//!
//! Every operation resolves to one of these shapes; failures never escape
//! as errors. Optional fields are omitted from the JSON when absent.

use provider_gmail::ResourceSummary;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Result of `beginAuthorization`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuthorizationResponse {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }
}

/// Result of `checkAuthorization`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationStatus {
    pub authorized: bool,
}

/// Result of `listResources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ResourceSummary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ListResourcesResponse {
    pub fn succeeded(items: Vec<ResourceSummary>) -> Self {
        Self {
            success: true,
            items: Some(items),
            error: None,
            message: None,
        }
    }
}

/// Result of `getResource`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetResourceResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<ResourceSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GetResourceResponse {
    pub fn succeeded(item: ResourceSummary) -> Self {
        Self {
            success: true,
            item: Some(item),
            error: None,
            message: None,
        }
    }
}

/// Result of `signOut`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignOutResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SignOutResponse {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            error: None,
            message: None,
        }
    }
}

impl From<CoreError> for AuthorizationResponse {
    fn from(err: CoreError) -> Self {
        Self {
            success: false,
            message: Some(err.to_string()),
            error: Some(err.code().to_string()),
        }
    }
}

impl From<CoreError> for ListResourcesResponse {
    fn from(err: CoreError) -> Self {
        Self {
            success: false,
            items: None,
            error: Some(err.code().to_string()),
            message: Some(err.to_string()),
        }
    }
}

impl From<CoreError> for GetResourceResponse {
    fn from(err: CoreError) -> Self {
        Self {
            success: false,
            item: None,
            error: Some(err.code().to_string()),
            message: Some(err.to_string()),
        }
    }
}

impl From<CoreError> for SignOutResponse {
    fn from(err: CoreError) -> Self {
        Self {
            success: false,
            error: Some(err.code().to_string()),
            message: Some(err.to_string()),
        }
    }
}
