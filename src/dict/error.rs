#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("[Dict]Dict Key Has Exist")]
    DictEntryDup,
    #[error("[Dict]Dict Key Is Not Exist")]
    DictNoKey,
    #[error("[Dict]Dict Is Busy: {0}")]
    DictBusy(String),
    #[error("[Dict]Iterator fingerprint mismatch (expected {expected:#x}, found {found:#x})")]
    FingerprintMismatch { expected: u64, found: u64 },
}
