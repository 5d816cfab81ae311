//! Metric names and descriptions
//!
//! Counters are emitted through the `metrics` facade. Nothing here installs a
//! recorder; without one the macros are no-ops.

use metrics::describe_counter;

pub const HANDLE_ALLOCATIONS: &str = "handles.allocations.total";
pub const HANDLE_CONFLICTS: &str = "handles.allocations.conflicts";
pub const HANDLE_EXHAUSTED: &str = "handles.allocations.exhausted";
pub const STORE_TIMEOUTS: &str = "store.operations.timeouts";
pub const SAGA_RETRIES: &str = "membership.saga.retries";
pub const SAGA_PARTIAL: &str = "membership.saga.partially_applied";
pub const REPAIRS_RESOLVED: &str = "membership.repairs.resolved";
pub const INVITES_ISSUED: &str = "invites.issued";
pub const INVITES_REJECTED: &str = "invites.rejected";
pub const AUTH_DENIED: &str = "auth.denied";

/// Register descriptions with whatever recorder is installed
pub fn describe_metrics() {
    describe_counter!(HANDLE_ALLOCATIONS, "Handles issued, labelled by namespace");
    describe_counter!(HANDLE_CONFLICTS, "Reservation commits lost to a concurrent writer");
    describe_counter!(HANDLE_EXHAUSTED, "Allocations refused because every code was issued");
    describe_counter!(STORE_TIMEOUTS, "Store calls that exceeded their deadline");
    describe_counter!(SAGA_RETRIES, "Account-side membership writes retried");
    describe_counter!(SAGA_PARTIAL, "Operations that committed only the community side");
    describe_counter!(REPAIRS_RESOLVED, "Repair records cleared by reconciliation");
    describe_counter!(INVITES_ISSUED, "Invite links minted");
    describe_counter!(INVITES_REJECTED, "Join attempts refused for a missing or expired invite");
    describe_counter!(AUTH_DENIED, "Requests refused by the role guard");
}
