//! Routability checking from precomputed routing tables.

pub mod checker;
pub mod routing_table;

pub use checker::TableRoutabilityChecker;
pub use routing_table::{Row, RoutingTable, SinkPinEntry, SourcePinEntry, TemplateTables};
