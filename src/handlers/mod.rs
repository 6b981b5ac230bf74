//! Command handler modules
//!
//! This module contains the command handlers invoked from main.rs,
//! organized by functionality area.

pub mod connection;
pub mod sync;

pub use connection::{
    handle_setup_local_connection, handle_setup_remote_connection, handle_test_connection,
};
pub use sync::{
    handle_clone, handle_list_backups, handle_list_databases, handle_push, handle_synchronize,
    RunOptions,
};
