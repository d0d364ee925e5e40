//! `gk`: sync extracted document triples into a remote SPARQL store

pub mod cli;
pub mod commands;
pub mod input;
