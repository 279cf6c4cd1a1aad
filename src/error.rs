//! Unified error type carrying JVS's stable error codes (§6).
//!
//! Every variant's [`Display`] ends in an actionable "To fix: ..." line,
//! following the same shape as a unified agent-facing CLI error: callers at
//! the CLI boundary map variants to exit-code classes and print the code
//! alongside the message; lower layers never format for humans themselves.

use std::fmt;
use std::path::PathBuf;

use crate::ids::ValidationError;

/// Stable error code returned in JSON output and embedded in human text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NameInvalid,
    PathEscape,
    DescriptorCorrupt,
    PayloadHashMismatch,
    LineageBroken,
    PartialSnapshot,
    GcPlanMismatch,
    FormatUnsupported,
    AuditChainBroken,
    NotFound,
    Ambiguous,
    Detached,
    Io,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NameInvalid => "E_NAME_INVALID",
            Self::PathEscape => "E_PATH_ESCAPE",
            Self::DescriptorCorrupt => "E_DESCRIPTOR_CORRUPT",
            Self::PayloadHashMismatch => "E_PAYLOAD_HASH_MISMATCH",
            Self::LineageBroken => "E_LINEAGE_BROKEN",
            Self::PartialSnapshot => "E_PARTIAL_SNAPSHOT",
            Self::GcPlanMismatch => "E_GC_PLAN_MISMATCH",
            Self::FormatUnsupported => "E_FORMAT_UNSUPPORTED",
            Self::AuditChainBroken => "E_AUDIT_CHAIN_BROKEN",
            Self::NotFound => "E_NOT_FOUND",
            Self::Ambiguous => "E_AMBIGUOUS",
            Self::Detached => "E_DETACHED",
            Self::Io => "E_IO",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unified JVS error type.
#[derive(Debug)]
pub enum JvsError {
    /// A worktree/tag name or path failed validation.
    InvalidName { value: String, reason: String },
    /// A resolved path escaped the repository root.
    PathEscape { path: PathBuf },
    /// A descriptor's checksum did not match its recomputed value.
    DescriptorCorrupt { snapshot_id: String, detail: String },
    /// A snapshot's payload root hash did not match the descriptor.
    PayloadHashMismatch {
        snapshot_id: String,
        expected: String,
        actual: String,
    },
    /// A lineage walk hit a missing or unparsable ancestor.
    LineageBroken { snapshot_id: String, detail: String },
    /// A `paths` argument to snapshot/restore referenced something invalid.
    PartialSnapshot { detail: String },
    /// A GC plan's candidate set intersected the protected set at run time.
    GcPlanMismatch { plan_id: String },
    /// The repository's on-disk format is newer than this binary supports.
    FormatUnsupported { found: u32, supported: u32 },
    /// The audit log's hash chain is broken.
    AuditChainBroken { at_index: usize, detail: String },
    /// No snapshot/worktree matched a reference.
    NotFound { what: String, reference: String },
    /// More than one snapshot/worktree matched a reference at the same
    /// resolution priority.
    Ambiguous { reference: String, candidates: Vec<String> },
    /// The worktree is DETACHED and the operation requires HEAD.
    Detached { worktree: String },
    /// `main`-only operation was attempted on the `main` worktree.
    MainProtected { operation: String },
    /// Underlying I/O failure with added context.
    Io { context: String, source: std::io::Error },
    /// A JSON document failed to parse or serialize.
    Json { context: String, source: serde_json::Error },
}

impl JvsError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidName { .. } => ErrorCode::NameInvalid,
            Self::PathEscape { .. } => ErrorCode::PathEscape,
            Self::DescriptorCorrupt { .. } => ErrorCode::DescriptorCorrupt,
            Self::PayloadHashMismatch { .. } => ErrorCode::PayloadHashMismatch,
            Self::LineageBroken { .. } => ErrorCode::LineageBroken,
            Self::PartialSnapshot { .. } => ErrorCode::PartialSnapshot,
            Self::GcPlanMismatch { .. } => ErrorCode::GcPlanMismatch,
            Self::FormatUnsupported { .. } => ErrorCode::FormatUnsupported,
            Self::AuditChainBroken { .. } => ErrorCode::AuditChainBroken,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Ambiguous { .. } => ErrorCode::Ambiguous,
            Self::Detached { .. } | Self::MainProtected { .. } => ErrorCode::Detached,
            Self::Io { .. } | Self::Json { .. } => ErrorCode::Io,
        }
    }
}

impl fmt::Display for JvsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName { value, reason } => write!(
                f,
                "[{}] {value:?} is not a valid name: {reason}\n  To fix: use only \
                 [A-Za-z0-9._-], avoid '.', '..', and path separators.",
                self.code()
            ),
            Self::PathEscape { path } => write!(
                f,
                "[{}] path {} escapes the repository root\n  To fix: use a path \
                 confined to the worktree; symlinks that point outside the repo \
                 are rejected.",
                self.code(),
                path.display()
            ),
            Self::DescriptorCorrupt {
                snapshot_id,
                detail,
            } => write!(
                f,
                "[{}] descriptor for snapshot {snapshot_id} is corrupt: {detail}\n  \
                 To fix: run `jvs doctor --strict`; if unrecoverable, the snapshot \
                 payload may still be intact under .jvs/snapshots/{snapshot_id}/.",
                self.code()
            ),
            Self::PayloadHashMismatch {
                snapshot_id,
                expected,
                actual,
            } => write!(
                f,
                "[{}] payload root hash mismatch for snapshot {snapshot_id}: \
                 expected {expected}, got {actual}\n  To fix: the payload has been \
                 tampered with or corrupted; restore from a different snapshot or \
                 an external backup.",
                self.code()
            ),
            Self::LineageBroken {
                snapshot_id,
                detail,
            } => write!(
                f,
                "[{}] lineage broken at snapshot {snapshot_id}: {detail}\n  To fix: \
                 run `jvs doctor` to classify the break.",
                self.code()
            ),
            Self::PartialSnapshot { detail } => write!(
                f,
                "[{}] invalid partial snapshot paths: {detail}\n  To fix: pass \
                 paths relative to the worktree root that exist and contain no '..'.",
                self.code()
            ),
            Self::GcPlanMismatch { plan_id } => write!(
                f,
                "[{}] gc plan {plan_id} is stale: a candidate became protected \
                 since the plan was made\n  To fix: run `jvs gc plan` again and \
                 re-run with the new plan id.",
                self.code()
            ),
            Self::FormatUnsupported { found, supported } => write!(
                f,
                "[{}] repository format version {found} is newer than the {supported} \
                 this binary supports\n  To fix: upgrade jvs.",
                self.code()
            ),
            Self::AuditChainBroken { at_index, detail } => write!(
                f,
                "[{}] audit chain broken at record {at_index}: {detail}\n  To fix: \
                 run `jvs doctor --strict`, which reports and can rebuild the chain \
                 over the records still present.",
                self.code()
            ),
            Self::NotFound { what, reference } => write!(
                f,
                "[{}] no {what} matches {reference:?}\n  To fix: check `jvs history` \
                 or `jvs worktree list` for valid references.",
                self.code()
            ),
            Self::Ambiguous {
                reference,
                candidates,
            } => write!(
                f,
                "[{}] {reference:?} matches {} snapshots: {}\n  To fix: use a \
                 longer ID prefix or a unique tag.",
                self.code(),
                candidates.len(),
                candidates.join(", ")
            ),
            Self::Detached { worktree } => write!(
                f,
                "[{}] worktree {worktree:?} is DETACHED; snapshot creation is \
                 rejected\n  To fix: `jvs restore HEAD` to reattach, or `jvs \
                 worktree fork` to branch from the current detached state.",
                self.code()
            ),
            Self::MainProtected { operation } => write!(
                f,
                "[{}] {operation} is not permitted on the `main` worktree\n  To \
                 fix: operate on a named worktree instead.",
                self.code()
            ),
            Self::Io { context, source } => write!(f, "[{}] {context}: {source}", self.code()),
            Self::Json { context, source } => write!(f, "[{}] {context}: {source}", self.code()),
        }
    }
}

impl std::error::Error for JvsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ValidationError> for JvsError {
    fn from(e: ValidationError) -> Self {
        Self::InvalidName {
            value: e.value,
            reason: e.reason,
        }
    }
}

impl From<serde_json::Error> for JvsError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json {
            context: "decoding JSON".to_owned(),
            source: e,
        }
    }
}

impl From<std::io::Error> for JvsError {
    /// Generic conversion for call sites with no more specific context to
    /// attach. Prefer [`IoContext::io_context`] when a descriptive context
    /// string is available; this impl exists so `?` works against a bare
    /// `std::io::Error` at the few call sites (e.g. `From` chains through
    /// other error types) that have none to give.
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            context: "I/O operation failed".to_owned(),
            source,
        }
    }
}

/// Helper for attaching file-operation context to an [`std::io::Error`].
pub trait IoContext<T> {
    /// Attach a human-readable description of the failed operation.
    ///
    /// # Errors
    /// Returns [`JvsError::Io`] wrapping the original error.
    fn io_context(self, context: impl Into<String>) -> Result<T, JvsError>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context(self, context: impl Into<String>) -> Result<T, JvsError> {
        self.map_err(|source| JvsError::Io {
            context: context.into(),
            source,
        })
    }
}
