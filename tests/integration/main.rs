//! Integration tests for fathost

mod cli;
mod deploy;
