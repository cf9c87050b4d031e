use anyhow::Error;

pub mod alignment;
pub mod bootstrap;
pub mod io;
pub mod pipeline;
pub mod tree;

mod macros;

type Result<T> = std::result::Result<T, Error>;
