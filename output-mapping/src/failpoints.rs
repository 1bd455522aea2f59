use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, OutputResult};

pub const SLICE_BEFORE_SWAP: &str = "slice.before_swap";

pub const SLICE_DURING_SWAP: &str = "slice.during_swap";

pub fn output_fail_point(name: &str) -> OutputResult<()> {
    fail_point!(name, |parameter| {
        let error_kind = match parameter.as_deref() {
            Some("io") => ErrorKind::IoError,
            Some("slice") => ErrorKind::SliceFailed,
            _ => ErrorKind::InjectedFailure,
        };

        bail!(
            error_kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
