//! Backend for a team-based cryptanalysis contest: team formation, round
//! registration, attempt lifecycle, task allocation, hints, grading and
//! shared workspaces, exposed as a JSON API.

use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub mod api;
pub mod auth;
pub mod backend;
pub mod codes;
pub mod config;
pub mod error;
pub mod model;
pub mod schema;
pub mod state;

#[cfg(test)]
mod test;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
