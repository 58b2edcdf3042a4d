//! MySQL/MariaDB driver: source reader.
//!
//! MySQL is supported on the source side only; it cannot host the staging
//! table because the comparison relies on the target engine's EXCEPT
//! support.

mod reader;

pub use reader::MysqlReader;
