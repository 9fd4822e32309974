/// データベース接続とトランザクション管理
pub mod connection;

pub use connection::{create_tables, register_functions, with_transaction, Database};

#[cfg(test)]
pub(crate) use connection::open_in_memory;
