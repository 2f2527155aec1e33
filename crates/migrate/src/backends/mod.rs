//! Database backends
//!
//! The engine talks to the database through [`ConnectionProvider`] and
//! [`DatabaseSession`]. [`SqlxConnectionProvider`] implements them over
//! sqlx's driver-agnostic `Any` connection.

pub mod any;
pub mod core;

pub use self::any::{SqlxConnectionProvider, SqlxSession};
pub use self::core::*;
