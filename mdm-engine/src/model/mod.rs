//! Core data model
//!
//! Typed records over the tabular store: cell values, request status enums
//! with their case-sensitive wire strings, the request-type taxonomy and the
//! four-level approval chain.

mod cell;
pub mod columns;
mod record;

pub use cell::CellValue;
pub use columns::*;
pub use record::{LevelRecord, RequestRecord, RowValues};

use crate::constants;
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Requester (level 0) status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequesterStatus {
    /// Requester portion of the attachment passed validation
    #[serde(rename = "Completed")]
    Completed,
    /// Request aged out before the chain finished
    #[serde(rename = "Expired")]
    Expired,
    /// Sync found an unusable cell value
    #[serde(rename = "Invalid")]
    Invalid,
    /// Sent back; the requester must rework the attachment
    #[serde(rename = "Need Review")]
    NeedReview,
}

impl fmt::Display for RequesterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequesterStatus::Completed => "Completed",
            RequesterStatus::Expired => "Expired",
            RequesterStatus::Invalid => "Invalid",
            RequesterStatus::NeedReview => "Need Review",
        };
        f.write_str(s)
    }
}

impl FromStr for RequesterStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s {
            "Completed" => Ok(RequesterStatus::Completed),
            "Expired" => Ok(RequesterStatus::Expired),
            "Invalid" => Ok(RequesterStatus::Invalid),
            "Need Review" => Ok(RequesterStatus::NeedReview),
            other => Err(EngineError::InvalidValue {
                what: "requester status",
                value: other.to_string(),
            }),
        }
    }
}

/// Approver (levels 1..3) status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApproverStatus {
    #[serde(rename = "Approved")]
    Approved,
    #[serde(rename = "Rejected")]
    Rejected,
    #[serde(rename = "Partially Rejected")]
    PartiallyRejected,
    #[serde(rename = "Send Back")]
    SendBack,
}

impl fmt::Display for ApproverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApproverStatus::Approved => "Approved",
            ApproverStatus::Rejected => "Rejected",
            ApproverStatus::PartiallyRejected => "Partially Rejected",
            ApproverStatus::SendBack => "Send Back",
        };
        f.write_str(s)
    }
}

impl FromStr for ApproverStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s {
            "Approved" => Ok(ApproverStatus::Approved),
            "Rejected" => Ok(ApproverStatus::Rejected),
            "Partially Rejected" => Ok(ApproverStatus::PartiallyRejected),
            "Send Back" => Ok(ApproverStatus::SendBack),
            other => Err(EngineError::InvalidValue {
                what: "approver status",
                value: other.to_string(),
            }),
        }
    }
}

/// Execution-phase status on the assignee's row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessStatus {
    #[serde(rename = "On Going")]
    OnGoing,
    #[serde(rename = "Completed")]
    Completed,
    #[serde(rename = "Partially Rejected")]
    PartiallyRejected,
    #[serde(rename = "Rejected")]
    Rejected,
    #[serde(rename = "Send Back")]
    SendBack,
}

impl ProcessStatus {
    /// Terminal statuses close the request; only `OnGoing` and `SendBack`
    /// leave it open.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessStatus::Completed | ProcessStatus::Rejected | ProcessStatus::PartiallyRejected
        )
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessStatus::OnGoing => "On Going",
            ProcessStatus::Completed => "Completed",
            ProcessStatus::PartiallyRejected => "Partially Rejected",
            ProcessStatus::Rejected => "Rejected",
            ProcessStatus::SendBack => "Send Back",
        };
        f.write_str(s)
    }
}

impl FromStr for ProcessStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s {
            "On Going" => Ok(ProcessStatus::OnGoing),
            "Completed" => Ok(ProcessStatus::Completed),
            "Partially Rejected" => Ok(ProcessStatus::PartiallyRejected),
            "Rejected" => Ok(ProcessStatus::Rejected),
            "Send Back" => Ok(ProcessStatus::SendBack),
            other => Err(EngineError::InvalidValue {
                what: "process status",
                value: other.to_string(),
            }),
        }
    }
}

/// Actor recorded on a send-back audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SendBackActor {
    /// Attachment validation or another automated check
    System,
    /// An approver used the send-back action
    Approver,
    /// The assignee sent the task back during execution
    Mdm,
}

impl fmt::Display for SendBackActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SendBackActor::System => "SYSTEM",
            SendBackActor::Approver => "APPROVER",
            SendBackActor::Mdm => "MDM",
        };
        f.write_str(s)
    }
}

/// Fixed request-type taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    #[serde(rename = "BOM Create")]
    BomCreate,
    #[serde(rename = "BOM Change")]
    BomChange,
    #[serde(rename = "Pricing Create")]
    PricingCreate,
    #[serde(rename = "Pricing Change")]
    PricingChange,
    #[serde(rename = "Promo Create")]
    PromoCreate,
    #[serde(rename = "Customer Create")]
    CustomerCreate,
    #[serde(rename = "Customer Change")]
    CustomerChange,
    #[serde(rename = "Vendor Create")]
    VendorCreate,
    #[serde(rename = "Vendor Change")]
    VendorChange,
}

impl RequestType {
    /// All taxonomy members
    pub fn all() -> &'static [RequestType] {
        &[
            RequestType::BomCreate,
            RequestType::BomChange,
            RequestType::PricingCreate,
            RequestType::PricingChange,
            RequestType::PromoCreate,
            RequestType::CustomerCreate,
            RequestType::CustomerChange,
            RequestType::VendorCreate,
            RequestType::VendorChange,
        ]
    }

    /// Master table holding rows of this type
    pub fn master_table(self) -> &'static str {
        match self {
            RequestType::BomCreate | RequestType::BomChange => "BOM",
            RequestType::PricingCreate | RequestType::PricingChange => "Pricing",
            RequestType::PromoCreate => "Promo",
            RequestType::CustomerCreate | RequestType::CustomerChange => "Customer",
            RequestType::VendorCreate | RequestType::VendorChange => "Vendor",
        }
    }

    /// Table abbreviation used as the request-number prefix
    pub fn abbreviation(self) -> &'static str {
        match self {
            RequestType::BomCreate | RequestType::BomChange => "BOM",
            RequestType::PricingCreate | RequestType::PricingChange => "PRC",
            RequestType::PromoCreate => "PRM",
            RequestType::CustomerCreate | RequestType::CustomerChange => "CUS",
            RequestType::VendorCreate | RequestType::VendorChange => "VEN",
        }
    }

    /// First data row on this type's attachment task sheets
    pub fn task_start_row(self) -> usize {
        match self {
            RequestType::PromoCreate => constants::PROMO_TASK_START_ROW,
            _ => constants::DEFAULT_TASK_START_ROW,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestType::BomCreate => "BOM Create",
            RequestType::BomChange => "BOM Change",
            RequestType::PricingCreate => "Pricing Create",
            RequestType::PricingChange => "Pricing Change",
            RequestType::PromoCreate => "Promo Create",
            RequestType::CustomerCreate => "Customer Create",
            RequestType::CustomerChange => "Customer Change",
            RequestType::VendorCreate => "Vendor Create",
            RequestType::VendorChange => "Vendor Change",
        };
        f.write_str(s)
    }
}

impl FromStr for RequestType {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s {
            "BOM Create" => Ok(RequestType::BomCreate),
            "BOM Change" => Ok(RequestType::BomChange),
            "Pricing Create" => Ok(RequestType::PricingCreate),
            "Pricing Change" => Ok(RequestType::PricingChange),
            "Promo Create" => Ok(RequestType::PromoCreate),
            "Customer Create" => Ok(RequestType::CustomerCreate),
            "Customer Change" => Ok(RequestType::CustomerChange),
            "Vendor Create" => Ok(RequestType::VendorCreate),
            "Vendor Change" => Ok(RequestType::VendorChange),
            other => Err(EngineError::InvalidValue {
                what: "request type",
                value: other.to_string(),
            }),
        }
    }
}

/// One of the four ordinal approval positions. Level 0 is the requester,
/// levels 1..3 are the approver tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalLevel(u8);

impl ApprovalLevel {
    /// Level 0, the requester
    pub const REQUESTER: ApprovalLevel = ApprovalLevel(0);

    /// Construct from an index 0..=3
    pub fn new(index: u8) -> EngineResult<Self> {
        if index > 3 {
            return Err(EngineError::InvalidValue {
                what: "approval level",
                value: index.to_string(),
            });
        }
        Ok(ApprovalLevel(index))
    }

    /// All four levels in ascending order
    pub fn all() -> impl Iterator<Item = ApprovalLevel> {
        (0..=3).map(ApprovalLevel)
    }

    /// The approver tiers (levels 1..=3) in ascending order
    pub fn approvers() -> impl Iterator<Item = ApprovalLevel> {
        (1..=3).map(ApprovalLevel)
    }

    /// Ordinal index 0..=3
    pub fn index(self) -> u8 {
        self.0
    }

    /// Whether this is the requester level
    pub fn is_requester(self) -> bool {
        self.0 == 0
    }

    /// The next level up the chain, if any
    pub fn next(self) -> Option<ApprovalLevel> {
        if self.0 < 3 {
            Some(ApprovalLevel(self.0 + 1))
        } else {
            None
        }
    }

    /// Row column carrying this level's status
    pub fn status_column(self) -> &'static str {
        match self.0 {
            0 => columns::RESPON_REQUESTER,
            1 => columns::RESPON_APPROVER,
            2 => columns::RESPON_APPROVER_II,
            _ => columns::RESPON_APPROVER_III,
        }
    }

    /// Row column carrying this level's actor name
    pub fn name_column(self) -> &'static str {
        match self.0 {
            0 => columns::NAME_REQUESTER,
            1 => columns::NAME_APPROVER,
            2 => columns::NAME_APPROVER_II,
            _ => columns::NAME_APPROVER_III,
        }
    }

    /// Row column carrying this level's action timestamp
    pub fn timestamp_column(self) -> &'static str {
        match self.0 {
            0 => columns::TIMESTAMP_REQUESTER,
            1 => columns::TIMESTAMP_APPROVER,
            2 => columns::TIMESTAMP_APPROVER_II,
            _ => columns::TIMESTAMP_APPROVER_III,
        }
    }

    /// Row column guarding the one-shot approval request email, approver
    /// levels only.
    pub fn ask_status_column(self) -> Option<&'static str> {
        match self.0 {
            1 => Some(columns::ASK_APPROVER_STATUS),
            2 => Some(columns::ASK_APPROVER_II_STATUS),
            3 => Some(columns::ASK_APPROVER_III_STATUS),
            _ => None,
        }
    }

    /// Attachment cell holding this level's status
    pub fn status_cell(self) -> String {
        format!(
            "{}{}",
            constants::LEVEL_CELL_COLUMNS[self.0 as usize],
            constants::LEVEL_STATUS_ROW
        )
    }

    /// Attachment cell holding this level's actor name
    pub fn name_cell(self) -> String {
        format!(
            "{}{}",
            constants::LEVEL_CELL_COLUMNS[self.0 as usize],
            constants::LEVEL_NAME_ROW
        )
    }

    /// Attachment cell holding this level's notes
    pub fn notes_cell(self) -> String {
        format!(
            "{}{}",
            constants::LEVEL_CELL_COLUMNS[self.0 as usize],
            constants::LEVEL_NOTES_ROW
        )
    }
}

impl fmt::Display for ApprovalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_requester() {
            f.write_str("Requester")
        } else {
            write!(f, "Approver {}", self.0)
        }
    }
}
