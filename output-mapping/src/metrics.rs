//! Metrics definitions for output mapping.

/// Label for the destination table id in metrics.
pub const TABLE_ID_LABEL: &str = "table_id";

/// Label for error kind in metrics.
pub const ERROR_KIND_LABEL: &str = "error_kind";

// Load task metrics

/// Counter for load jobs submitted to storage.
pub const OUTPUT_LOAD_TASKS_SUBMITTED_TOTAL: &str = "output_load_tasks_submitted_total";

/// Counter for load jobs that finished successfully.
pub const OUTPUT_LOAD_TASKS_SUCCEEDED_TOTAL: &str = "output_load_tasks_succeeded_total";

/// Counter for load tasks that failed, before or after submission.
pub const OUTPUT_LOAD_TASKS_FAILED_TOTAL: &str = "output_load_tasks_failed_total";

/// Counter for freshly created tables dropped after a failed load.
pub const OUTPUT_COMPENSATING_TABLE_DROPS_TOTAL: &str = "output_compensating_table_drops_total";

// Slicing metrics

/// Counter for sources split into parts.
pub const OUTPUT_SLICES_CREATED_TOTAL: &str = "output_slices_created_total";

/// Counter for sources left untouched by the slicer.
pub const OUTPUT_SLICES_SKIPPED_TOTAL: &str = "output_slices_skipped_total";

// File metrics

/// Counter for files uploaded to storage.
pub const OUTPUT_FILES_UPLOADED_TOTAL: &str = "output_files_uploaded_total";
