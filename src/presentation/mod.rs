pub mod shell;
pub mod views;
