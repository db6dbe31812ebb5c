//! Copy of stored functions, views and procedures.

use tracing::{info, warn};

use crate::core::identifier::quote_mysql;
use crate::core::schema::RoutineKind;
use crate::core::traits::{SourceReader, TargetWriter};
use crate::swap::{strip_definer, SwapProtocol};

/// Outcome of copying one kind of routine.
#[derive(Debug, Default)]
pub struct RoutineReport {
    pub copied: usize,
    pub warnings: Vec<String>,
}

/// Drop and recreate every routine of `kind` on the destination.
///
/// Best effort: each failure becomes a warning and the next routine is tried.
pub async fn copy_routines(
    source: &dyn SourceReader,
    target: &dyn TargetWriter,
    protocol: &SwapProtocol,
    kind: RoutineKind,
) -> RoutineReport {
    let mut report = RoutineReport::default();

    let names = match source.list_routines(kind).await {
        Ok(names) => names,
        Err(e) => {
            let msg = format!("failed to list {}s: {}", kind, e);
            warn!("{}", msg);
            report.warnings.push(msg);
            return report;
        }
    };

    for name in names {
        match copy_one(source, target, protocol, kind, &name).await {
            Ok(()) => report.copied += 1,
            Err(msg) => {
                warn!("{}", msg);
                report.warnings.push(msg);
            }
        }
    }

    info!("Copied {} {}(s)", report.copied, kind);
    report
}

async fn copy_one(
    source: &dyn SourceReader,
    target: &dyn TargetWriter,
    protocol: &SwapProtocol,
    kind: RoutineKind,
    name: &str,
) -> std::result::Result<(), String> {
    let fail = |step: &str, e: crate::error::CopyError| format!("{} {}: {} failed: {}", kind, name, step, e);

    let create = source
        .show_create_routine(kind, name)
        .await
        .map_err(|e| fail("show create", e))?;
    let quoted = quote_mysql(name).map_err(|e| fail("quote", e))?;

    protocol
        .run(target, &format!("DROP {} IF EXISTS {}", kind.keyword(), quoted))
        .await
        .map_err(|e| fail("drop", e))?;
    protocol
        .run(target, &strip_definer(&create))
        .await
        .map_err(|e| fail("create", e))?;
    Ok(())
}
