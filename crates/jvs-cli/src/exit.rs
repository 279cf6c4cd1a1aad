//! Maps errors to the stable exit-code classes documented for the CLI:
//! `0` success, `1` generic failure, `2` validation, `3` integrity,
//! `4` I/O/environment. Only the CLI boundary makes this decision — the
//! core crate only ever returns a `JvsError`/`anyhow::Error`.

use jvs::JvsError;

#[must_use]
pub fn code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<JvsError>() {
        Some(e) => code_for_jvs_error(e),
        None => 1,
    }
}

const fn code_for_jvs_error(err: &JvsError) -> i32 {
    match err {
        JvsError::InvalidName { .. }
        | JvsError::PathEscape { .. }
        | JvsError::PartialSnapshot { .. }
        | JvsError::NotFound { .. }
        | JvsError::Ambiguous { .. }
        | JvsError::Detached { .. }
        | JvsError::MainProtected { .. }
        | JvsError::GcPlanMismatch { .. } => 2,
        JvsError::DescriptorCorrupt { .. }
        | JvsError::PayloadHashMismatch { .. }
        | JvsError::LineageBroken { .. }
        | JvsError::AuditChainBroken { .. }
        | JvsError::FormatUnsupported { .. } => 3,
        JvsError::Io { .. } | JvsError::Json { .. } => 4,
    }
}
