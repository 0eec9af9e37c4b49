pub mod chat;
pub mod ingest;
pub mod migrate;
pub mod serve;
pub mod tools;
