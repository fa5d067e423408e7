//! Integration workloads running against an in-memory database.

mod api_workload;
mod team_workload;
