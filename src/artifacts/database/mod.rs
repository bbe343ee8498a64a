//! Entry types handed out by the object database

pub mod database_entry;
