//! Column vocabulary of the master and assignee tables

/// Primary key column
pub const REQUEST_NUMBER: &str = "Request Number";

pub const TIMESTAMP: &str = "Timestamp";
pub const REQUEST_TYPE: &str = "Request Type";
pub const DEPARTMENT: &str = "Department";
pub const BUSINESS_UNIT: &str = "Business Unit";
pub const COMPANY_CODE: &str = "Company Code";
pub const EMAIL_ADDRESS: &str = "Email Address";
pub const ATTACHMENT: &str = "Attachment";

// Type-specific detail columns carried through from submission
pub const DOCUMENT_NUMBER: &str = "Document Number";
pub const ADDITIONAL_ATTACHMENT: &str = "Additional Attachment";
pub const VALID_FROM: &str = "Valid From";
pub const VALID_TO: &str = "Valid To";
pub const PROMO_TYPE: &str = "Promo Type";
pub const TOTAL_PROMO: &str = "Total Promo";
pub const MODIFY_TYPE: &str = "Modify Type";
pub const BY_PHONE_CONFIRMATION: &str = "By Phone Confirmation";
pub const TRANSACTION_SECTION: &str = "Transaction Section";
pub const UPDATE_TO: &str = "Update To";
pub const BANK_TYPE: &str = "Bank Type";

pub const RESPON_REQUESTER: &str = "Respon Requester";
pub const RESPON_APPROVER: &str = "Respon Approver";
pub const RESPON_APPROVER_II: &str = "Respon Approver II";
pub const RESPON_APPROVER_III: &str = "Respon Approver III";

pub const NAME_REQUESTER: &str = "Name Requester";
pub const NAME_APPROVER: &str = "Name Approver";
pub const NAME_APPROVER_II: &str = "Name Approver II";
pub const NAME_APPROVER_III: &str = "Name Approver III";

pub const TIMESTAMP_REQUESTER: &str = "Timestamp Requester";
pub const TIMESTAMP_APPROVER: &str = "Timestamp Approver";
pub const TIMESTAMP_APPROVER_II: &str = "Timestamp Approver II";
pub const TIMESTAMP_APPROVER_III: &str = "Timestamp Approver III";

/// Anchor column: everything from here to the end of the row is approval
/// sync state and is cleared on a send-back.
pub const NEW_SUBMISSION_STATUS: &str = "New Submission Status";

pub const ASK_APPROVER_STATUS: &str = "Ask Approver Status";
pub const ASK_APPROVER_II_STATUS: &str = "Ask Approver II Status";
pub const ASK_APPROVER_III_STATUS: &str = "Ask Approver III Status";

pub const TOTAL_TASK: &str = "Total Task";
pub const BASELINE: &str = "Baseline";
pub const ESTIMATED_TIME: &str = "Estimated Time";
pub const ESTIMATED_TIME_FINISHED: &str = "Estimated Time Finished";
pub const PROCESSED_BY: &str = "Processed By";
pub const PROCESS_STATUS: &str = "Process Status";
pub const TAKEN_DATE: &str = "Taken Date";
pub const PROCESSED_DATE: &str = "Processed Date";
pub const FEEDBACK_STATUS: &str = "Feedback Status";

pub const SYSTEM_SENT_BACK_COUNT: &str = "System Sent Back Count";
pub const SYSTEM_SENT_BACK_EMAIL_STATUS: &str = "System Sent Back Email Status";

/// Canonical column order for a master table
pub const MASTER_COLUMNS: &[&str] = &[
    REQUEST_NUMBER,
    TIMESTAMP,
    REQUEST_TYPE,
    DEPARTMENT,
    BUSINESS_UNIT,
    COMPANY_CODE,
    EMAIL_ADDRESS,
    ATTACHMENT,
    DOCUMENT_NUMBER,
    ADDITIONAL_ATTACHMENT,
    VALID_FROM,
    VALID_TO,
    PROMO_TYPE,
    TOTAL_PROMO,
    MODIFY_TYPE,
    BY_PHONE_CONFIRMATION,
    TRANSACTION_SECTION,
    UPDATE_TO,
    BANK_TYPE,
    TOTAL_TASK,
    BASELINE,
    ESTIMATED_TIME,
    ESTIMATED_TIME_FINISHED,
    PROCESSED_BY,
    PROCESS_STATUS,
    TAKEN_DATE,
    PROCESSED_DATE,
    FEEDBACK_STATUS,
    NEW_SUBMISSION_STATUS,
    RESPON_REQUESTER,
    NAME_REQUESTER,
    TIMESTAMP_REQUESTER,
    ASK_APPROVER_STATUS,
    RESPON_APPROVER,
    NAME_APPROVER,
    TIMESTAMP_APPROVER,
    ASK_APPROVER_II_STATUS,
    RESPON_APPROVER_II,
    NAME_APPROVER_II,
    TIMESTAMP_APPROVER_II,
    ASK_APPROVER_III_STATUS,
    RESPON_APPROVER_III,
    NAME_APPROVER_III,
    TIMESTAMP_APPROVER_III,
    SYSTEM_SENT_BACK_COUNT,
    SYSTEM_SENT_BACK_EMAIL_STATUS,
];
