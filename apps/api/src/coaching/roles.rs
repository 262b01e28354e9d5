use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Supported job roles for role-specific elaboration questions.
/// Anything outside this set is coached with the `Generic` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRole {
    SoftwareEngineer,
    ProductManager,
    DataScientist,
    Designer,
    Sales,
    Marketing,
    Operations,
    #[default]
    Generic,
}

impl JobRole {
    pub fn as_str(self) -> &'static str {
        match self {
            JobRole::SoftwareEngineer => "software_engineer",
            JobRole::ProductManager => "product_manager",
            JobRole::DataScientist => "data_scientist",
            JobRole::Designer => "designer",
            JobRole::Sales => "sales",
            JobRole::Marketing => "marketing",
            JobRole::Operations => "operations",
            JobRole::Generic => "generic",
        }
    }

    /// Maps a free-text declared role onto the closed set. Unknown roles fall
    /// back to `Generic` and are logged.
    pub fn from_declared(declared: &str) -> JobRole {
        let normalized = declared.trim().to_lowercase().replace(['-', ' '], "_");
        if normalized.is_empty() {
            return JobRole::Generic;
        }
        if let Ok(role) = normalized.parse() {
            return role;
        }
        let alias = match normalized.as_str() {
            "engineer" | "developer" | "software_developer" | "swe" | "backend_engineer"
            | "frontend_engineer" | "devops_engineer" => Some(JobRole::SoftwareEngineer),
            "pm" | "product_owner" | "product" => Some(JobRole::ProductManager),
            "data_analyst" | "ml_engineer" | "analyst" => Some(JobRole::DataScientist),
            "ux_designer" | "ui_designer" | "product_designer" => Some(JobRole::Designer),
            "account_executive" | "sales_manager" | "business_development" => Some(JobRole::Sales),
            "marketer" | "growth" | "marketing_manager" => Some(JobRole::Marketing),
            "ops" | "operations_manager" | "program_manager" => Some(JobRole::Operations),
            _ => None,
        };
        alias.unwrap_or_else(|| {
            warn!("Unrecognized declared role '{declared}', using generic question table");
            JobRole::Generic
        })
    }
}

impl fmt::Display for JobRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown job role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for JobRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "software_engineer" => Ok(JobRole::SoftwareEngineer),
            "product_manager" => Ok(JobRole::ProductManager),
            "data_scientist" => Ok(JobRole::DataScientist),
            "designer" => Ok(JobRole::Designer),
            "sales" => Ok(JobRole::Sales),
            "marketing" => Ok(JobRole::Marketing),
            "operations" => Ok(JobRole::Operations),
            "generic" => Ok(JobRole::Generic),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}
