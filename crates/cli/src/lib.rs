//! Public library modules for the CLI crate
pub mod apply;
pub mod fs_apply;
pub mod paths;
pub mod undo;
