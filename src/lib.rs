// This file is part of h5cloud.

pub mod buffer;
pub mod catalog;
pub mod config;
pub mod datatype;
pub mod error;
pub mod fetch;
pub mod filters;
pub mod format;
pub mod io;
pub mod reader;

pub use config::ReaderOptions;
pub use datatype::DType;
pub use error::{Error, Result};
pub use filters::decode::DecodedArray;
pub use reader::{DatasetEndpoints, Reader};
