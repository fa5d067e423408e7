//! Repository layer: one module per entity, typed load/insert/update
//! operations over the Diesel schema. Handlers call into these inside a
//! single per-request transaction; nothing here commits on its own.

pub mod access_codes;
pub mod answers;
pub mod attempts;
pub mod error_log;
pub mod hints;
pub mod participations;
pub mod round_tasks;
pub mod rounds;
pub mod task_instances;
pub mod tasks;
pub mod team_members;
pub mod teams;
pub mod users;
pub mod workspace_revisions;
pub mod workspaces;
