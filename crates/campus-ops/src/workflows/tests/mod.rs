mod common;

mod billing;
mod revenue;
