//! Typed arguments and results of the server tools reached through `tools/call`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Spreadsheet family an analysis or a sheet listing refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetSource {
    Master,
    Siklus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

/// Options of `trigger_analysis`. Every analysis step is enabled by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    pub sheet_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SheetSource>,
    pub data_overview: bool,
    pub check_duplicates: bool,
    pub summarize: bool,
    pub insight: bool,
    pub financial_analysis: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            sheet_name: String::from("MasterDataAsset"),
            source: None,
            data_overview: true,
            check_duplicates: true,
            summarize: true,
            insight: true,
            financial_analysis: true,
        }
    }
}

/// Filters of `query_assets`. Unset members are not sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_asset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nama_aset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufaktur: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kode_lokasi_sap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kondisi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kondisi_not: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hasil_inventory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nilai_aset_min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nilai_aset_max: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// A server tool invocation, serialized as `{"name": .., "arguments": {..}}`.
///
/// ## Example
///
/// ```rust
/// use phr_mcp::protocol::ToolCall;
///
/// let call = ToolCall::GetDashboardData { area: Some("Semua Area".into()) };
/// assert_eq!(
///     serde_json::to_value(&call).unwrap(),
///     serde_json::json!({"name": "get_dashboard_data", "arguments": {"area": "Semua Area"}})
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    /// Starts a background analysis. The server never answers this request;
    /// progress arrives as `analysis/progress` notifications.
    TriggerAnalysis(AnalysisOptions),
    SaveAnalysis {
        auth_token: String,
    },
    GetDashboardData {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        area: Option<String>,
    },
    GetStatsData {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        area: Option<String>,
    },
    GetHistory {},
    DeleteHistory {
        timestamp: String,
    },
    GetSheetNames {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<SheetSource>,
    },
    GetMasterData {
        sheet_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<SheetSource>,
    },
    GetAllUsers {},
    CreateUser {
        email: String,
        password: String,
        role: Role,
    },
    UpdateUserEmail {
        user_id: i64,
        new_email: String,
    },
    UpdateUserRole {
        user_id: i64,
        new_role: Role,
    },
    DeleteUser {
        user_id: i64,
    },
    QueryAssets(AssetQuery),
    QueryResource {
        resource_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        area: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kondisi: Option<String>,
    },
}

impl ToolCall {
    /// Whether the server answers this call. Calls that get no answer only
    /// complete through notifications, a timeout or a closed connection.
    pub fn expects_response(&self) -> bool {
        !matches!(self, ToolCall::TriggerAnalysis(_))
    }
}

/// Result of a successful `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default)]
    pub content: Value,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Starting,
    Progress,
    Completed,
    Error,
}

/// Params of an `analysis/progress` notification.
///
/// A `status` of [`ProgressStatus::Error`] reports a failed analysis as
/// data; it is not a transport error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisProgress {
    pub status: ProgressStatus,
    #[serde(default)]
    pub message: String,
}

impl AnalysisProgress {
    /// `true` once the analysis has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ProgressStatus::Completed | ProgressStatus::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trigger_analysis_flattens_options() {
        let call = ToolCall::TriggerAnalysis(AnalysisOptions {
            sheet_name: "MASTER-SHEET".into(),
            source: Some(SheetSource::Master),
            ..Default::default()
        });
        assert_eq!(
            serde_json::to_value(&call).unwrap(),
            json!({
                "name": "trigger_analysis",
                "arguments": {
                    "sheet_name": "MASTER-SHEET",
                    "source": "master",
                    "data_overview": true,
                    "check_duplicates": true,
                    "summarize": true,
                    "insight": true,
                    "financial_analysis": true,
                }
            })
        );
        assert!(!call.expects_response());
    }

    #[test]
    fn argumentless_tools_send_empty_object() {
        assert_eq!(
            serde_json::to_value(ToolCall::GetHistory {}).unwrap(),
            json!({"name": "get_history", "arguments": {}})
        );
        assert_eq!(
            serde_json::to_value(ToolCall::GetAllUsers {}).unwrap(),
            json!({"name": "get_all_users", "arguments": {}})
        );
    }

    #[test]
    fn user_management_arguments() {
        let call = ToolCall::CreateUser {
            email: "a@b.c".into(),
            password: "secret".into(),
            role: Role::Admin,
        };
        assert_eq!(
            serde_json::to_value(&call).unwrap(),
            json!({"name": "create_user", "arguments": {"email": "a@b.c", "password": "secret", "role": "admin"}})
        );
        assert_eq!(
            serde_json::to_value(ToolCall::DeleteUser { user_id: 9 }).unwrap(),
            json!({"name": "delete_user", "arguments": {"user_id": 9}})
        );
    }

    #[test]
    fn query_assets_skips_unset_filters() {
        let call = ToolCall::QueryAssets(AssetQuery {
            task: Some("filter".into()),
            area: Some("DURI".into()),
            limit: Some(5),
            ..Default::default()
        });
        assert_eq!(
            serde_json::to_value(&call).unwrap(),
            json!({"name": "query_assets", "arguments": {"task": "filter", "area": "DURI", "limit": 5}})
        );
    }

    #[test]
    fn tool_result_decodes() {
        let result: ToolResult =
            serde_json::from_value(json!({"content": [{"id": 1}], "isError": false})).unwrap();
        assert_eq!(result.content, json!([{"id": 1}]));
        assert!(!result.is_error);
    }

    #[test]
    fn progress_decodes() {
        let progress: AnalysisProgress =
            serde_json::from_value(json!({"status": "completed", "message": "Done"})).unwrap();
        assert_eq!(progress.status, ProgressStatus::Completed);
        assert!(progress.is_terminal());

        let progress: AnalysisProgress =
            serde_json::from_value(json!({"status": "progress", "message": "50%"})).unwrap();
        assert!(!progress.is_terminal());
    }
}
