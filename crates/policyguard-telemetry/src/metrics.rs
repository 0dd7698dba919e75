//! Metric names and descriptions
//!
//! Values are recorded through the `metrics` facade wherever the event
//! happens; the installed exporter (Prometheus in the server) collects them.

use ::metrics::{describe_counter, describe_histogram, Unit};

/// Decisions issued, labelled by `label` and `path`
pub const DECISIONS_TOTAL: &str = "policyguard_decisions_total";

/// Stage fallbacks, labelled by `stage` and failure `kind`
pub const STAGE_DEGRADED_TOTAL: &str = "policyguard_stage_degraded_total";

/// Per-stage latency, labelled by `stage`
pub const STAGE_LATENCY_US: &str = "policyguard_stage_latency_us";

/// Requests rejected before the pipeline, labelled by `reason`
pub const REJECTED_TOTAL: &str = "policyguard_rejected_total";

/// Records sealed into the audit chain
pub const AUDIT_RECORDS_TOTAL: &str = "policyguard_audit_records_total";

/// Audit log write or flush failures
pub const AUDIT_WRITE_ERRORS_TOTAL: &str = "policyguard_audit_write_errors_total";

/// Register descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(DECISIONS_TOTAL, Unit::Count, "Moderation decisions issued");
    describe_counter!(
        STAGE_DEGRADED_TOTAL,
        Unit::Count,
        "Pipeline stages that fell back to their fail-safe output"
    );
    describe_histogram!(
        STAGE_LATENCY_US,
        Unit::Microseconds,
        "Latency of each executed pipeline stage"
    );
    describe_counter!(REJECTED_TOTAL, Unit::Count, "Requests rejected by input validation");
    describe_counter!(AUDIT_RECORDS_TOTAL, Unit::Count, "Decisions sealed into the audit chain");
    describe_counter!(
        AUDIT_WRITE_ERRORS_TOTAL,
        Unit::Count,
        "Failures writing the audit log"
    );
}
