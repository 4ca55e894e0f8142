mod common;
mod memory;
mod rollup;
