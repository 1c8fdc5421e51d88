//! Remote mainframe file tree cache and copy/move engine.
//!
//! Maps datasets, members and USS entries onto a lazily populated virtual file system
//! ([`vfs`], [`attributes`]), caches listings per query ([`fetch`]), shows them as tree nodes
//! ([`tree`]) and runs pastes with name conflict resolution ([`paste`], [`resolver`]). Remote
//! I/O goes through the [`remote::RemoteBackend`] seam; dialogs through
//! [`paste::PasteDialogs`].

// Warn on unused code to catch dead code early
#![warn(unused)]
// Warn on unused dependencies
#![warn(unused_crate_dependencies)]
// Warn on redundant path prefixes (e.g., std::sync::Arc when Arc is imported)
#![warn(unused_qualifications)]
// Use log::* macros instead of println!/eprintln! for proper log level control
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod attributes;
pub mod config;
pub mod fetch;
pub(crate) mod ignore_poison;
pub mod operations;
pub mod paste;
pub mod remote;
pub mod resolver;
pub mod tree;
pub mod vfs;
