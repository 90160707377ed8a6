mod memory_log;
pub use memory_log::MemoryLog;

mod memory_table;
pub use memory_table::MemoryTable;

#[cfg(test)]
mod memory_table_test;
